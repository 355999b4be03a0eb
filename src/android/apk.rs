use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use log::debug;
use zip::read::ZipArchive;
use zip::result::ZipError;

use crate::error::{ChunkError, ChunkResult};

/// Where an APK keeps its compiled manifest.
pub const MANIFEST_ENTRY: &str = "AndroidManifest.xml";

/// Compiled resource table entry.
pub const RESOURCES_ENTRY: &str = "resources.arsc";

// Entry sizes come from the archive, so they only size the initial buffer up to this.
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

/// Read access to the entries of an APK (ZIP) archive.
pub struct ApkArchive<R> {
    archive: ZipArchive<R>,
}

impl ApkArchive<File> {
    /// Open an APK on disk.
    pub fn open(path: impl AsRef<Path>) -> ChunkResult<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(file)
    }
}

impl<R: Read + Seek> ApkArchive<R> {
    pub fn from_reader(reader: R) -> ChunkResult<Self> {
        let archive = ZipArchive::new(reader)?;
        debug!("opened APK with {} entries", archive.len());
        Ok(ApkArchive { archive })
    }

    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.archive.file_names()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.archive.index_for_name(name).is_some()
    }

    /// Decompress the named entry into memory.
    pub fn entry_bytes(&mut self, name: &str) -> ChunkResult<Vec<u8>> {
        let mut entry = match self.archive.by_name(name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Err(ChunkError::MissingEntry(name.to_string())),
            Err(err) => return Err(err.into()),
        };
        let mut data = Vec::with_capacity(entry.size().min(MAX_PREALLOC) as usize);
        entry.read_to_end(&mut data)?;
        debug!("read {} ({} bytes)", name, data.len());
        Ok(data)
    }

    /// The compiled `AndroidManifest.xml`.
    pub fn manifest_bytes(&mut self) -> ChunkResult<Vec<u8>> {
        self.entry_bytes(MANIFEST_ENTRY)
    }
}
