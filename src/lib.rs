//! # reschunk
//!
//! Walks the chunk structure of Android compiled resource files (a binary
//! `AndroidManifest.xml`, compiled layouts, `resources.arsc`) and decodes the string
//! pools found among the root chunk's children.
//!
//! Every other chunk is classified by type and skipped by its declared size, so files
//! containing chunk types this crate does not know still walk to the end.
//!
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[macro_use]
pub mod error;
pub mod android;
#[cfg(test)]
mod tests;

pub use crate::android::apk::ApkArchive;
pub use crate::android::chunk::{ChunkClass, ChunkHeader, ChunkType};
pub use crate::android::source::{ByteSource, ByteView, SeekSource};
pub use crate::android::string_pool::{ResStringPool, StringEncoding, StringPoolFlags, StringPoolHeader};
pub use crate::android::walker::{walk, walk_with_options, ChunkBody, ChunkWalker, DecodedChunk, Document, WalkOptions};
pub use crate::error::{ChunkError, ChunkResult};

/// Walks an in-memory compiled resource file.
///
/// # Examples
///
/// ```
/// use reschunk::{decode_bytes, ChunkBody};
///
/// // An empty RES_XML_TYPE document holding one unknown 8-byte chunk.
/// let bytes = [
///     0x03, 0x00, 0x08, 0x00, 0x10, 0x00, 0x00, 0x00,
///     0x99, 0x00, 0x08, 0x00, 0x08, 0x00, 0x00, 0x00,
/// ];
/// let doc = decode_bytes(&bytes).unwrap();
/// assert_eq!(doc.chunks.len(), 1);
/// assert!(matches!(doc.chunks[0].body, ChunkBody::Opaque(0x0099)));
/// ```
pub fn decode_bytes(bytes: &[u8]) -> ChunkResult<Document> {
    walk(bytes)
}

/// Walks a compiled resource file on disk, reading it through a seekable source.
///
/// ```no_run
///  let doc = reschunk::decode_file("AndroidManifest.xml").unwrap();
///  println!("{} chunks", doc.chunks.len());
/// ```
pub fn decode_file(path: impl AsRef<Path>) -> ChunkResult<Document> {
    let file = File::open(path.as_ref())?;
    let source = SeekSource::new(BufReader::new(file))?;
    walk(&source)
}

/// Pulls `AndroidManifest.xml` out of an APK and walks it.
pub fn decode_apk_manifest(path: impl AsRef<Path>) -> ChunkResult<Document> {
    let mut apk = ApkArchive::open(path)?;
    let manifest = apk.manifest_bytes()?;
    walk(manifest.as_slice())
}
