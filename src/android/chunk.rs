//! Chunk headers and chunk type classification.

use std::fmt;

use log::trace;
use nom::number::complete::{le_u16, le_u32};
use nom::sequence::tuple;
use nom::IResult;
use once_cell::sync::Lazy;
use rangemap::RangeInclusiveMap;
use serde::{Deserialize, Serialize};

use crate::android::source::{ByteSource, ByteView};
use crate::error::{ChunkError, ChunkResult};

pub const RES_NULL_TYPE: u16 = 0x0000;
pub const RES_STRING_POOL_TYPE: u16 = 0x0001;
pub const RES_TABLE_TYPE: u16 = 0x0002;
pub const RES_XML_TYPE: u16 = 0x0003;

// Chunk types in RES_XML_TYPE
pub const RES_XML_FIRST_CHUNK_TYPE: u16 = 0x0100;
pub const RES_XML_START_NAMESPACE_TYPE: u16 = 0x0100;
pub const RES_XML_END_NAMESPACE_TYPE: u16 = 0x0101;
pub const RES_XML_START_ELEMENT_TYPE: u16 = 0x0102;
pub const RES_XML_END_ELEMENT_TYPE: u16 = 0x0103;
pub const RES_XML_CDATA_TYPE: u16 = 0x0104;
pub const RES_XML_LAST_CHUNK_TYPE: u16 = 0x017f;
pub const RES_XML_RESOURCE_MAP_TYPE: u16 = 0x0180;

// Chunk types in RES_TABLE_TYPE
pub const RES_TABLE_PACKAGE_TYPE: u16 = 0x0200;
pub const RES_TABLE_TYPE_TYPE: u16 = 0x0201;
pub const RES_TABLE_TYPE_SPEC_TYPE: u16 = 0x0202;

/// Size of the generic `type, headerSize, size` header every chunk starts with.
pub const CHUNK_HEADER_SIZE: u16 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ChunkFamily {
    Core,
    XmlNode,
    XmlResourceMap,
    TableEntry,
}

static CHUNK_FAMILIES: Lazy<RangeInclusiveMap<u16, ChunkFamily>> = Lazy::new(|| {
    let mut families = RangeInclusiveMap::new();
    families.insert(RES_NULL_TYPE..=RES_XML_TYPE, ChunkFamily::Core);
    families.insert(
        RES_XML_FIRST_CHUNK_TYPE..=RES_XML_LAST_CHUNK_TYPE,
        ChunkFamily::XmlNode,
    );
    families.insert(
        RES_XML_RESOURCE_MAP_TYPE..=RES_XML_RESOURCE_MAP_TYPE,
        ChunkFamily::XmlResourceMap,
    );
    families.insert(
        RES_TABLE_PACKAGE_TYPE..=RES_TABLE_TYPE_SPEC_TYPE,
        ChunkFamily::TableEntry,
    );
    families
});

/// How the walker treats a chunk type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChunkClass {
    /// The payload is decoded.
    Handled,
    /// A known type whose payload is left undecoded.
    Unhandled,
    /// A type code outside every known range.
    Unknown,
}

/// Every chunk type this crate can name, plus a catch-all carrying the raw code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChunkType {
    Null,
    StringPool,
    Table,
    Xml,
    XmlStartNamespace,
    XmlEndNamespace,
    XmlStartElement,
    XmlEndElement,
    XmlCdata,
    /// Any other code in the XML node range.
    XmlNode(u16),
    XmlResourceMap,
    TablePackage,
    TableType,
    TableTypeSpec,
    Opaque(u16),
}

impl ChunkType {
    pub fn from_code(code: u16) -> Self {
        match CHUNK_FAMILIES.get(&code) {
            Some(ChunkFamily::Core) => match code {
                RES_NULL_TYPE => ChunkType::Null,
                RES_STRING_POOL_TYPE => ChunkType::StringPool,
                RES_TABLE_TYPE => ChunkType::Table,
                _ => ChunkType::Xml,
            },
            Some(ChunkFamily::XmlNode) => match code {
                RES_XML_START_NAMESPACE_TYPE => ChunkType::XmlStartNamespace,
                RES_XML_END_NAMESPACE_TYPE => ChunkType::XmlEndNamespace,
                RES_XML_START_ELEMENT_TYPE => ChunkType::XmlStartElement,
                RES_XML_END_ELEMENT_TYPE => ChunkType::XmlEndElement,
                RES_XML_CDATA_TYPE => ChunkType::XmlCdata,
                other => ChunkType::XmlNode(other),
            },
            Some(ChunkFamily::XmlResourceMap) => ChunkType::XmlResourceMap,
            Some(ChunkFamily::TableEntry) => match code {
                RES_TABLE_PACKAGE_TYPE => ChunkType::TablePackage,
                RES_TABLE_TYPE_TYPE => ChunkType::TableType,
                _ => ChunkType::TableTypeSpec,
            },
            None => ChunkType::Opaque(code),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            ChunkType::Null => RES_NULL_TYPE,
            ChunkType::StringPool => RES_STRING_POOL_TYPE,
            ChunkType::Table => RES_TABLE_TYPE,
            ChunkType::Xml => RES_XML_TYPE,
            ChunkType::XmlStartNamespace => RES_XML_START_NAMESPACE_TYPE,
            ChunkType::XmlEndNamespace => RES_XML_END_NAMESPACE_TYPE,
            ChunkType::XmlStartElement => RES_XML_START_ELEMENT_TYPE,
            ChunkType::XmlEndElement => RES_XML_END_ELEMENT_TYPE,
            ChunkType::XmlCdata => RES_XML_CDATA_TYPE,
            ChunkType::XmlNode(code) => code,
            ChunkType::XmlResourceMap => RES_XML_RESOURCE_MAP_TYPE,
            ChunkType::TablePackage => RES_TABLE_PACKAGE_TYPE,
            ChunkType::TableType => RES_TABLE_TYPE_TYPE,
            ChunkType::TableTypeSpec => RES_TABLE_TYPE_SPEC_TYPE,
            ChunkType::Opaque(code) => code,
        }
    }

    pub fn class(self) -> ChunkClass {
        match self {
            ChunkType::StringPool => ChunkClass::Handled,
            ChunkType::Opaque(_) => ChunkClass::Unknown,
            _ => ChunkClass::Unhandled,
        }
    }

    /// Smallest `headerSize` a chunk of this type can legally declare.
    pub fn min_header_size(self) -> u16 {
        match self {
            ChunkType::StringPool => 28,
            ChunkType::Table => 12,
            ChunkType::XmlStartNamespace
            | ChunkType::XmlEndNamespace
            | ChunkType::XmlStartElement
            | ChunkType::XmlEndElement
            | ChunkType::XmlCdata
            | ChunkType::XmlNode(_) => 16,
            ChunkType::TablePackage => 284,
            ChunkType::TableType => 20,
            ChunkType::TableTypeSpec => 16,
            _ => CHUNK_HEADER_SIZE,
        }
    }

    pub fn is_xml_node(self) -> bool {
        matches!(
            self,
            ChunkType::XmlStartNamespace
                | ChunkType::XmlEndNamespace
                | ChunkType::XmlStartElement
                | ChunkType::XmlEndElement
                | ChunkType::XmlCdata
                | ChunkType::XmlNode(_)
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ChunkType::Null => "RES_NULL_TYPE",
            ChunkType::StringPool => "RES_STRING_POOL_TYPE",
            ChunkType::Table => "RES_TABLE_TYPE",
            ChunkType::Xml => "RES_XML_TYPE",
            ChunkType::XmlStartNamespace => "RES_XML_START_NAMESPACE_TYPE",
            ChunkType::XmlEndNamespace => "RES_XML_END_NAMESPACE_TYPE",
            ChunkType::XmlStartElement => "RES_XML_START_ELEMENT_TYPE",
            ChunkType::XmlEndElement => "RES_XML_END_ELEMENT_TYPE",
            ChunkType::XmlCdata => "RES_XML_CDATA_TYPE",
            ChunkType::XmlNode(_) => "RES_XML_NODE",
            ChunkType::XmlResourceMap => "RES_XML_RESOURCE_MAP_TYPE",
            ChunkType::TablePackage => "RES_TABLE_PACKAGE_TYPE",
            ChunkType::TableType => "RES_TABLE_TYPE_TYPE",
            ChunkType::TableTypeSpec => "RES_TABLE_TYPE_SPEC_TYPE",
            ChunkType::Opaque(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:04x})", self.name(), self.code())
    }
}

/// The fixed header at the start of every chunk.
///
/// `chunk_size` covers the header itself plus everything nested inside the chunk;
/// `header_size` may exceed [`CHUNK_HEADER_SIZE`] when the type defines extra fixed fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkHeader {
    pub chunk_type: u16,
    pub header_size: u16,
    pub chunk_size: u32,
}

fn header_fields(input: &[u8]) -> IResult<&[u8], (u16, u16, u32)> {
    tuple((le_u16, le_u16, le_u32))(input)
}

impl ChunkHeader {
    pub fn kind(&self) -> ChunkType {
        ChunkType::from_code(self.chunk_type)
    }

    /// Bytes following the fixed header; zero when `header_size` exceeds `chunk_size`.
    pub fn body_len(&self) -> u32 {
        self.chunk_size.saturating_sub(u32::from(self.header_size))
    }

    /// Read and validate the header at `offset` (relative to `view`).
    ///
    /// Only the generic invariants are checked here: the header is at least
    /// [`CHUNK_HEADER_SIZE`] bytes and no larger than the chunk. Whether the chunk fits
    /// its parent is the caller's concern.
    pub fn read<S: ByteSource + ?Sized>(view: ByteView<'_, S>, offset: u64) -> ChunkResult<Self> {
        let mut raw = [0u8; CHUNK_HEADER_SIZE as usize];
        view.read_exact_at(offset, &mut raw)?;
        let absolute = view.base() + offset;
        let (_, (chunk_type, header_size, chunk_size)) =
            header_fields(&raw).map_err(|_| ChunkError::TruncatedRead {
                offset: absolute,
                needed: u64::from(CHUNK_HEADER_SIZE),
                available: raw.len() as u64,
            })?;
        trace!(
            "chunk header at 0x{:x}: type=0x{:04x} header_size={} size={}",
            absolute,
            chunk_type,
            header_size,
            chunk_size
        );

        if header_size < CHUNK_HEADER_SIZE {
            return Err(ChunkError::malformed(
                absolute,
                chunk_type,
                format!("header size {header_size} is smaller than the {CHUNK_HEADER_SIZE} byte chunk header"),
            ));
        }
        if u32::from(header_size) > chunk_size {
            return Err(ChunkError::malformed(
                absolute,
                chunk_type,
                format!("header size {header_size} exceeds chunk size {chunk_size}"),
            ));
        }
        Ok(ChunkHeader {
            chunk_type,
            header_size,
            chunk_size,
        })
    }

    /// Check `header_size` against the minimum for the declared type.
    pub fn check_type_header_size(&self, absolute_offset: u64) -> ChunkResult<()> {
        let minimum = self.kind().min_header_size();
        if self.header_size < minimum {
            return Err(ChunkError::malformed(
                absolute_offset,
                self.chunk_type,
                format!(
                    "header size {} below the minimum {} for {}",
                    self.header_size,
                    minimum,
                    self.kind()
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_codes() {
        assert_eq!(ChunkType::from_code(0x0001), ChunkType::StringPool);
        assert_eq!(ChunkType::from_code(0x0003), ChunkType::Xml);
        assert_eq!(ChunkType::from_code(0x0102), ChunkType::XmlStartElement);
        assert_eq!(ChunkType::from_code(0x0150), ChunkType::XmlNode(0x0150));
        assert_eq!(ChunkType::from_code(0x0180), ChunkType::XmlResourceMap);
        assert_eq!(ChunkType::from_code(0x0201), ChunkType::TableType);
        assert_eq!(ChunkType::from_code(0x0099), ChunkType::Opaque(0x0099));
        assert_eq!(ChunkType::from_code(0x0203), ChunkType::Opaque(0x0203));
        assert_eq!(ChunkType::from_code(0x0004), ChunkType::Opaque(0x0004));
    }

    #[test]
    fn codes_survive_classification() {
        for code in [0x0000u16, 0x0001, 0x0002, 0x0003, 0x0100, 0x0104, 0x0123, 0x017f, 0x0180, 0x0200, 0x0202, 0x0099, 0xffff] {
            assert_eq!(ChunkType::from_code(code).code(), code);
        }
    }

    #[test]
    fn classes() {
        assert_eq!(ChunkType::StringPool.class(), ChunkClass::Handled);
        assert_eq!(ChunkType::XmlResourceMap.class(), ChunkClass::Unhandled);
        assert_eq!(ChunkType::XmlCdata.class(), ChunkClass::Unhandled);
        assert_eq!(ChunkType::Opaque(0x99).class(), ChunkClass::Unknown);
        assert!(ChunkType::XmlNode(0x0170).is_xml_node());
        assert!(!ChunkType::XmlResourceMap.is_xml_node());
        assert_eq!(ChunkType::Opaque(0x99).to_string(), "UNKNOWN(0x0099)");
    }

    #[test]
    fn reads_header() {
        let data = [0x03, 0x00, 0x08, 0x00, 0x20, 0x00, 0x00, 0x00];
        let header = ChunkHeader::read(ByteView::whole(&data[..]), 0).unwrap();
        assert_eq!(header.kind(), ChunkType::Xml);
        assert_eq!(header.header_size, 8);
        assert_eq!(header.chunk_size, 0x20);
        assert_eq!(header.body_len(), 0x18);
    }

    #[test]
    fn rejects_inconsistent_header_sizes() {
        // headerSize larger than size
        let data = [0x01, 0x00, 0x1c, 0x00, 0x10, 0x00, 0x00, 0x00];
        let err = ChunkHeader::read(ByteView::whole(&data[..]), 0).unwrap_err();
        assert!(err.is_malformed_header());

        // headerSize smaller than the generic header
        let data = [0x99, 0x00, 0x04, 0x00, 0x10, 0x00, 0x00, 0x00];
        let err = ChunkHeader::read(ByteView::whole(&data[..]), 0).unwrap_err();
        assert!(err.is_malformed_header());

        let data = [0x01, 0x00, 0x08];
        let err = ChunkHeader::read(ByteView::whole(&data[..]), 0).unwrap_err();
        assert!(err.is_truncated());
    }

    #[test]
    fn type_specific_minimum() {
        let pool = ChunkHeader {
            chunk_type: RES_STRING_POOL_TYPE,
            header_size: 8,
            chunk_size: 64,
        };
        assert!(pool.check_type_header_size(0).unwrap_err().is_malformed_header());

        let opaque = ChunkHeader {
            chunk_type: 0x0099,
            header_size: 8,
            chunk_size: 8,
        };
        assert!(opaque.check_type_header_size(0).is_ok());
    }

    #[test]
    fn body_len_never_underflows() {
        let header = ChunkHeader {
            chunk_type: RES_XML_TYPE,
            header_size: 16,
            chunk_size: 8,
        };
        assert_eq!(header.body_len(), 0);
    }
}
