//! Top-level traversal of a compiled resource file.
//!
//! The root chunk's body is a run of sibling chunks. Their boundaries are only known
//! from each chunk's declared size, so traversal is sequential: read a header, hand
//! the chunk's bytes to its decoder, advance by the declared size.

use std::collections::BTreeMap;

use log::{debug, warn};
use serde::{Deserialize, Serialize, Serializer};

use crate::android::chunk::{ChunkClass, ChunkHeader, ChunkType};
use crate::android::source::{ByteSource, ByteView};
use crate::android::string_pool::ResStringPool;
use crate::error::{ChunkError, ChunkResult};

/// Traversal settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkOptions {
    /// Required root chunk type code, e.g. [`RES_XML_TYPE`](crate::android::chunk::RES_XML_TYPE).
    pub expected_root: Option<u16>,
    /// Abort on the first chunk whose payload fails to decode instead of recording it.
    pub stop_on_chunk_error: bool,
    /// Upper bound on the number of child chunks visited.
    pub max_chunks: Option<usize>,
}

impl WalkOptions {
    pub fn expect_root(mut self, chunk_type: u16) -> Self {
        self.expected_root = Some(chunk_type);
        self
    }

    pub fn stop_on_chunk_error(mut self, stop: bool) -> Self {
        self.stop_on_chunk_error = stop;
        self
    }

    pub fn max_chunks(mut self, max: usize) -> Self {
        self.max_chunks = Some(max);
        self
    }
}

/// What the walker produced for one child chunk.
#[derive(Debug, Serialize)]
pub enum ChunkBody {
    StringPool(ResStringPool),
    /// `RES_XML_RESOURCE_MAP_TYPE`: recognized, payload not decoded.
    ResourceMap,
    /// Another recognized type whose payload is not decoded.
    Skipped(ChunkType),
    /// A type code outside every known range.
    Opaque(u16),
    /// The payload failed to decode; traversal continued past it.
    Failed(#[serde(serialize_with = "serialize_error")] ChunkError),
}

fn serialize_error<S: Serializer>(err: &ChunkError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(err)
}

/// One dispatched child of the root chunk.
#[derive(Debug, Serialize)]
pub struct DecodedChunk {
    /// Absolute offset of the chunk header in the source.
    pub offset: u64,
    pub header: ChunkHeader,
    pub kind: ChunkType,
    pub class: ChunkClass,
    pub body: ChunkBody,
}

impl DecodedChunk {
    pub fn string_pool(&self) -> Option<&ResStringPool> {
        match &self.body {
            ChunkBody::StringPool(pool) => Some(pool),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ChunkError> {
        match &self.body {
            ChunkBody::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// The result of walking a whole file.
#[derive(Debug, Serialize)]
pub struct Document {
    pub root: ChunkHeader,
    pub chunks: Vec<DecodedChunk>,
}

impl Document {
    pub fn string_pools(&self) -> impl Iterator<Item = &ResStringPool> {
        self.chunks.iter().filter_map(DecodedChunk::string_pool)
    }

    pub fn first_string_pool(&self) -> Option<&ResStringPool> {
        self.string_pools().next()
    }

    pub fn failures(&self) -> impl Iterator<Item = &DecodedChunk> {
        self.chunks.iter().filter(|chunk| chunk.error().is_some())
    }

    pub fn class_counts(&self) -> BTreeMap<ChunkClass, usize> {
        let mut counts = BTreeMap::new();
        for chunk in &self.chunks {
            *counts.entry(chunk.class).or_insert(0) += 1;
        }
        counts
    }

    /// Sum of the declared sizes of all children.
    pub fn consumed_bytes(&self) -> u64 {
        self.chunks
            .iter()
            .map(|chunk| u64::from(chunk.header.chunk_size))
            .sum()
    }
}

/// Iterates the children of the root chunk, decoding each as it is reached.
///
/// Structural errors (a child header that cannot be read, or a child extending past
/// the root) end the iteration after being yielded once.
pub struct ChunkWalker<'a, S: ?Sized> {
    root_view: ByteView<'a, S>,
    root: ChunkHeader,
    cursor: u64,
    visited: usize,
    options: WalkOptions,
    finished: bool,
}

impl<'a, S: ByteSource + ?Sized> ChunkWalker<'a, S> {
    pub fn new(source: &'a S) -> ChunkResult<Self> {
        Self::with_options(source, WalkOptions::default())
    }

    pub fn with_options(source: &'a S, options: WalkOptions) -> ChunkResult<Self> {
        let whole = ByteView::whole(source);
        let root = ChunkHeader::read(whole, 0)?;
        root.check_type_header_size(0)?;
        if let Some(expected) = options.expected_root {
            if root.chunk_type != expected {
                return Err(ChunkError::malformed(
                    0,
                    root.chunk_type,
                    format!("expected root chunk type 0x{expected:04x}"),
                ));
            }
        }
        let root_len = u64::from(root.chunk_size);
        if root_len > whole.len() {
            fail!(TruncatedRead {
                offset: 0,
                needed: root_len,
                available: whole.len(),
            });
        }
        let root_view = whole.sub_view(0, root_len)?;
        debug!(
            "root {} header_size={} size={}",
            root.kind(),
            root.header_size,
            root.chunk_size
        );

        Ok(ChunkWalker {
            root_view,
            root,
            cursor: u64::from(root.header_size),
            visited: 0,
            options,
            finished: false,
        })
    }

    pub fn root(&self) -> &ChunkHeader {
        &self.root
    }

    /// Offset of the next child relative to the root.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    fn next_chunk(&mut self) -> ChunkResult<Option<DecodedChunk>> {
        let end = self.root_view.len();
        if self.cursor >= end {
            return Ok(None);
        }
        if let Some(max) = self.options.max_chunks {
            if self.visited >= max {
                fail!(BoundsViolation {
                    what: "chunk count",
                    offset: self.root_view.base() + self.cursor,
                    limit: self.root_view.end(),
                });
            }
        }

        let offset = self.cursor;
        let header = ChunkHeader::read(self.root_view, offset)?;
        let chunk_end = offset + u64::from(header.chunk_size);
        if chunk_end > end {
            fail!(BoundsViolation {
                what: "child chunk",
                offset: self.root_view.base() + chunk_end,
                limit: self.root_view.end(),
            });
        }
        let view = self.root_view.sub_view(offset, u64::from(header.chunk_size))?;
        let kind = header.kind();
        debug!(
            "chunk {} at 0x{:x} header_size={} size={}",
            kind,
            view.base(),
            header.header_size,
            header.chunk_size
        );

        let body = match dispatch(&header, view) {
            Ok(body) => body,
            Err(err) => {
                let err = err.in_chunk(header.chunk_type, view.base());
                if self.options.stop_on_chunk_error {
                    return Err(err);
                }
                warn!("{}", err);
                ChunkBody::Failed(err)
            }
        };

        self.cursor = chunk_end;
        self.visited += 1;
        Ok(Some(DecodedChunk {
            offset: view.base(),
            header,
            kind,
            class: kind.class(),
            body,
        }))
    }
}

impl<S: ByteSource + ?Sized> Iterator for ChunkWalker<'_, S> {
    type Item = ChunkResult<DecodedChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

fn dispatch<S: ByteSource + ?Sized>(
    header: &ChunkHeader,
    view: ByteView<'_, S>,
) -> ChunkResult<ChunkBody> {
    header.check_type_header_size(view.base())?;
    match header.kind() {
        ChunkType::StringPool => ResStringPool::decode(view).map(ChunkBody::StringPool),
        ChunkType::XmlResourceMap => Ok(ChunkBody::ResourceMap),
        ChunkType::Opaque(code) => {
            warn!("skipping unknown chunk type 0x{:04x} at 0x{:x}", code, view.base());
            Ok(ChunkBody::Opaque(code))
        }
        other => Ok(ChunkBody::Skipped(other)),
    }
}

/// Walk every child of the root chunk of `source`.
pub fn walk<S: ByteSource + ?Sized>(source: &S) -> ChunkResult<Document> {
    walk_with_options(source, WalkOptions::default())
}

pub fn walk_with_options<S: ByteSource + ?Sized>(
    source: &S,
    options: WalkOptions,
) -> ChunkResult<Document> {
    let walker = ChunkWalker::with_options(source, options)?;
    let root = *walker.root();
    let chunks = walker.collect::<ChunkResult<Vec<_>>>()?;
    Ok(Document { root, chunks })
}
