use thiserror::Error;

/// Returns early with the named [`ChunkError`] variant.
macro_rules! fail {
    ($variant:ident { $($body:tt)* }) => {
        return Err($crate::error::ChunkError::$variant { $($body)* })
    };
}

/// Result alias for chunk decoding operations.
pub type ChunkResult<T> = Result<T, ChunkError>;

/// Errors surfaced while walking chunks or decoding their payloads.
///
/// Every offset carried by an error is absolute, i.e. measured from the start of
/// the underlying byte source rather than from the chunk being decoded.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// Fewer bytes were available than a fixed-size field or declared length requires.
    #[error("truncated read at 0x{offset:x}: needed {needed} bytes, {available} available")]
    TruncatedRead { offset: u64, needed: u64, available: u64 },

    /// A computed offset fell outside the extent of the enclosing chunk.
    #[error("{what} reaches 0x{offset:x}, past the boundary at 0x{limit:x}")]
    BoundsViolation {
        what: &'static str,
        offset: u64,
        limit: u64,
    },

    /// A chunk header is inconsistent with itself or with its declared type.
    #[error("malformed header for chunk type 0x{chunk_type:04x} at 0x{offset:x}: {reason}")]
    MalformedHeader {
        offset: u64,
        chunk_type: u16,
        reason: String,
    },

    /// Reserved for string pool encodings beyond UTF-8 / UTF-16.
    #[error("unsupported string pool encoding flags 0x{flags:08x}")]
    UnsupportedEncoding { flags: u32 },

    /// A string payload is not valid text in its declared encoding.
    #[error("invalid text at 0x{offset:x}: {reason}")]
    InvalidText { offset: u64, reason: String },

    /// Wraps an error with the chunk it was raised in.
    #[error("in chunk 0x{chunk_type:04x} at 0x{offset:x}: {source}")]
    InChunk {
        chunk_type: u16,
        offset: u64,
        source: Box<ChunkError>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("archive entry '{0}' not found")]
    MissingEntry(String),
}

impl ChunkError {
    pub(crate) fn malformed(offset: u64, chunk_type: u16, reason: impl Into<String>) -> Self {
        ChunkError::MalformedHeader {
            offset,
            chunk_type,
            reason: reason.into(),
        }
    }

    /// Attaches the chunk type and absolute chunk offset, unless already attached.
    pub fn in_chunk(self, chunk_type: u16, offset: u64) -> Self {
        match self {
            ChunkError::InChunk { .. } => self,
            other => ChunkError::InChunk {
                chunk_type,
                offset,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, with any chunk context stripped.
    pub fn root_cause(&self) -> &ChunkError {
        match self {
            ChunkError::InChunk { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_bounds_violation(&self) -> bool {
        matches!(self.root_cause(), ChunkError::BoundsViolation { .. })
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self.root_cause(), ChunkError::TruncatedRead { .. })
    }

    pub fn is_malformed_header(&self) -> bool {
        matches!(self.root_cause(), ChunkError::MalformedHeader { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_attached_once() {
        let base = ChunkError::BoundsViolation {
            what: "string payload",
            offset: 0x40,
            limit: 0x30,
        };
        let wrapped = base.in_chunk(0x0001, 0x10).in_chunk(0x0003, 0);
        match &wrapped {
            ChunkError::InChunk {
                chunk_type, offset, ..
            } => {
                assert_eq!(*chunk_type, 0x0001);
                assert_eq!(*offset, 0x10);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(wrapped.is_bounds_violation());
        assert!(!wrapped.is_truncated());
    }

    #[test]
    fn display_includes_location() {
        let err = ChunkError::malformed(0x24, 0x0001, "header size 12 below minimum 28")
            .in_chunk(0x0001, 0x24);
        let text = err.to_string();
        assert!(text.starts_with("in chunk 0x0001 at 0x24"));
        assert!(text.contains("below minimum 28"));
    }
}
