//! `RES_STRING_POOL_TYPE` decoding and canonical re-encoding.
//!
//! A pool is laid out as:
//!
//! ```text
//! +----------------------+  0
//! | chunk header (8)     |
//! | stringCount          |
//! | styleCount           |
//! | flags                |
//! | stringsStart         |
//! | stylesStart          |
//! +----------------------+  headerSize
//! | u32[stringCount]     |  string offsets, relative to stringsStart
//! | u32[styleCount]      |  style offsets, relative to stylesStart
//! +----------------------+
//! | u16 len + payload... |  at stringsStart + offset[i]
//! +----------------------+  size
//! ```
//!
//! `stringsStart` and `stylesStart` are measured from the start of the pool chunk.
//! The length prefix counts UTF-16 code units in a UTF-16 pool and bytes in a UTF-8 pool.

use bitflags::bitflags;
use log::{debug, trace};
use nom::multi::count;
use nom::number::complete::le_u32;
use nom::sequence::tuple;
use nom::IResult;
use serde::{Deserialize, Serialize};

use crate::android::chunk::{ChunkHeader, CHUNK_HEADER_SIZE, RES_STRING_POOL_TYPE};
use crate::android::source::{ByteSource, ByteView};
use crate::error::{ChunkError, ChunkResult};

/// String index meaning "no string".
pub const NO_ENTRY_INDEX: u32 = 0xFFFF_FFFF;

bitflags! {
    /// The `flags` word of a string pool header. Unknown bits are kept as-is.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct StringPoolFlags: u32 {
        const SORTED = 1 << 0;
        const UTF8 = 1 << 8;
    }
}

/// Encoding shared by every entry of one pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StringEncoding {
    Utf16,
    Utf8,
}

type TextDecoder = fn(&[u8]) -> Result<String, String>;

impl StringEncoding {
    pub fn from_flags(flags: StringPoolFlags) -> Self {
        if flags.contains(StringPoolFlags::UTF8) {
            StringEncoding::Utf8
        } else {
            StringEncoding::Utf16
        }
    }

    /// Bytes per unit counted by the length prefix.
    pub fn unit_width(self) -> u64 {
        match self {
            StringEncoding::Utf16 => 2,
            StringEncoding::Utf8 => 1,
        }
    }

    fn text_decoder(self) -> TextDecoder {
        match self {
            StringEncoding::Utf16 => decode_utf16,
            StringEncoding::Utf8 => decode_utf8,
        }
    }

    /// Encoded payload and the unit count for its length prefix.
    fn encode_text(self, text: &str) -> (Vec<u8>, usize) {
        match self {
            StringEncoding::Utf16 => {
                let units: Vec<u16> = text.encode_utf16().collect();
                let payload = units.iter().flat_map(|unit| unit.to_le_bytes()).collect();
                (payload, units.len())
            }
            StringEncoding::Utf8 => (text.as_bytes().to_vec(), text.len()),
        }
    }
}

fn decode_utf16(payload: &[u8]) -> Result<String, String> {
    let units: Vec<u16> = payload
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|err| err.to_string())
}

fn decode_utf8(payload: &[u8]) -> Result<String, String> {
    std::str::from_utf8(payload)
        .map(str::to_owned)
        .map_err(|err| err.to_string())
}

/// Header of a string pool chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringPoolHeader {
    pub header: ChunkHeader,
    pub string_count: u32,
    pub style_count: u32,
    pub flags: StringPoolFlags,
    pub strings_start: u32,
    pub styles_start: u32,
}

fn pool_fields(input: &[u8]) -> IResult<&[u8], (u32, u32, u32, u32, u32)> {
    tuple((le_u32, le_u32, le_u32, le_u32, le_u32))(input)
}

fn offset_table(input: &[u8], entries: usize) -> IResult<&[u8], Vec<u32>> {
    count(le_u32, entries)(input)
}

impl StringPoolHeader {
    /// Bytes occupied by the fixed header fields.
    pub const SIZE: u16 = 28;

    /// Parse the header at the start of `view`.
    pub fn read<S: ByteSource + ?Sized>(view: ByteView<'_, S>) -> ChunkResult<Self> {
        let header = ChunkHeader::read(view, 0)?;
        if header.chunk_type != RES_STRING_POOL_TYPE {
            return Err(ChunkError::malformed(
                view.base(),
                header.chunk_type,
                "chunk is not a string pool",
            ));
        }
        header.check_type_header_size(view.base())?;
        if u64::from(header.chunk_size) > view.len() {
            fail!(BoundsViolation {
                what: "string pool chunk",
                offset: view.base() + u64::from(header.chunk_size),
                limit: view.end(),
            });
        }

        let mut reader = view.reader_at(u64::from(CHUNK_HEADER_SIZE))?;
        let raw = reader.read_bytes(u64::from(Self::SIZE - CHUNK_HEADER_SIZE))?;
        let (_, (string_count, style_count, flags, strings_start, styles_start)) =
            pool_fields(&raw).map_err(|_| ChunkError::TruncatedRead {
                offset: view.base() + u64::from(CHUNK_HEADER_SIZE),
                needed: u64::from(Self::SIZE - CHUNK_HEADER_SIZE),
                available: raw.len() as u64,
            })?;

        Ok(StringPoolHeader {
            header,
            string_count,
            style_count,
            flags: StringPoolFlags::from_bits_retain(flags),
            strings_start,
            styles_start,
        })
    }

    pub fn encoding(&self) -> StringEncoding {
        StringEncoding::from_flags(self.flags)
    }
}

/// A decoded string pool.
///
/// `strings[i]` is the entry named by string offset `i`, `styles[i]` the entry named by
/// style offset `i`. Zero-length entries decode to empty strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResStringPool {
    pub header: StringPoolHeader,
    pub strings: Vec<String>,
    pub styles: Vec<String>,
}

impl ResStringPool {
    /// Decode the pool occupying `view`.
    ///
    /// The view is a hard boundary: an offset, count or length that would reach past
    /// the declared chunk size fails with a bounds error even if the source has more
    /// bytes.
    pub fn decode<S: ByteSource + ?Sized>(view: ByteView<'_, S>) -> ChunkResult<Self> {
        let header = StringPoolHeader::read(view)?;
        let view = view.sub_view(0, u64::from(header.header.chunk_size))?;

        let tables_start = u64::from(header.header.header_size);
        let table_entries = u64::from(header.string_count) + u64::from(header.style_count);
        let tables_end = tables_start + table_entries * 4;
        if tables_end > view.len() {
            fail!(BoundsViolation {
                what: "string pool offset tables",
                offset: view.base() + tables_end,
                limit: view.end(),
            });
        }

        // Tables follow the declared headerSize, which may exceed 28.
        let mut reader = view.reader_at(tables_start)?;
        let raw_tables = reader.read_bytes(table_entries * 4)?;
        let (rest, string_offsets) = offset_table(&raw_tables, header.string_count as usize)
            .map_err(|_| ChunkError::TruncatedRead {
                offset: view.base() + tables_start,
                needed: u64::from(header.string_count) * 4,
                available: raw_tables.len() as u64,
            })?;
        let (_, style_offsets) = offset_table(rest, header.style_count as usize).map_err(|_| {
            ChunkError::TruncatedRead {
                offset: view.base() + tables_start + u64::from(header.string_count) * 4,
                needed: u64::from(header.style_count) * 4,
                available: rest.len() as u64,
            }
        })?;

        let encoding = header.encoding();
        debug!(
            "string pool at 0x{:x}: {} strings, {} styles, {:?}",
            view.base(),
            header.string_count,
            header.style_count,
            encoding
        );

        let entries = EntryReader::new(view, encoding);
        let strings = entries.read_all(header.strings_start, &string_offsets, EntryKind::String)?;
        let styles = entries.read_all(header.styles_start, &style_offsets, EntryKind::Style)?;

        Ok(ResStringPool {
            header,
            strings,
            styles,
        })
    }

    pub fn encoding(&self) -> StringEncoding {
        self.header.encoding()
    }

    pub fn is_utf8(&self) -> bool {
        self.encoding() == StringEncoding::Utf8
    }

    pub fn is_sorted(&self) -> bool {
        self.header.flags.contains(StringPoolFlags::SORTED)
    }

    /// The string at `idx`, or `None` for [`NO_ENTRY_INDEX`] and out-of-range indices.
    pub fn get(&self, idx: u32) -> Option<&str> {
        if idx == NO_ENTRY_INDEX {
            return None;
        }
        self.strings.get(idx as usize).map(|s| s.as_str())
    }

    pub fn style(&self, idx: u32) -> Option<&str> {
        if idx == NO_ENTRY_INDEX {
            return None;
        }
        self.styles.get(idx as usize).map(|s| s.as_str())
    }

    /// Encode the pool in canonical layout: packed offset tables, string entries,
    /// then style entries, each data block padded to four bytes.
    ///
    /// The flags word is written back unchanged, so the entry encoding is preserved.
    /// With no styles `stylesStart` is unused and keeps its decoded value, and a chunk
    /// that declared more bytes than its entries need keeps that size as zero padding.
    pub fn to_bytes(&self) -> ChunkResult<Vec<u8>> {
        let encoding = self.encoding();
        let (string_offsets, string_data) = encode_entries(&self.strings, encoding)?;
        let (style_offsets, style_data) = encode_entries(&self.styles, encoding)?;

        let header_size = StringPoolHeader::SIZE;
        let strings_start = usize::from(header_size) + 4 * (self.strings.len() + self.styles.len());
        let styles_start = if self.styles.is_empty() {
            self.header.styles_start as usize
        } else {
            strings_start + string_data.len()
        };
        let packed = strings_start + string_data.len() + style_data.len();
        let total = packed.max(self.header.header.chunk_size as usize);
        let chunk_size = u32::try_from(total).map_err(|_| ChunkError::BoundsViolation {
            what: "encoded string pool",
            offset: total as u64,
            limit: u64::from(u32::MAX),
        })?;

        let mut chunk = Vec::with_capacity(total);
        write_u16(&mut chunk, RES_STRING_POOL_TYPE);
        write_u16(&mut chunk, header_size);
        write_u32(&mut chunk, chunk_size);
        write_u32(&mut chunk, self.strings.len() as u32);
        write_u32(&mut chunk, self.styles.len() as u32);
        write_u32(&mut chunk, self.header.flags.bits());
        write_u32(&mut chunk, strings_start as u32);
        write_u32(&mut chunk, styles_start as u32);
        for offset in string_offsets.iter().chain(style_offsets.iter()) {
            write_u32(&mut chunk, *offset);
        }
        chunk.extend_from_slice(&string_data);
        chunk.extend_from_slice(&style_data);
        chunk.resize(total, 0);
        Ok(chunk)
    }
}

#[derive(Clone, Copy, Debug)]
enum EntryKind {
    String,
    Style,
}

impl EntryKind {
    fn prefix_label(self) -> &'static str {
        match self {
            EntryKind::String => "string length prefix",
            EntryKind::Style => "style length prefix",
        }
    }

    fn payload_label(self) -> &'static str {
        match self {
            EntryKind::String => "string payload",
            EntryKind::Style => "style payload",
        }
    }
}

/// Decodes length-prefixed entries of one pool; the encoding is fixed at construction.
struct EntryReader<'a, S: ?Sized> {
    view: ByteView<'a, S>,
    unit_width: u64,
    decode_text: TextDecoder,
}

impl<'a, S: ByteSource + ?Sized> EntryReader<'a, S> {
    fn new(view: ByteView<'a, S>, encoding: StringEncoding) -> Self {
        EntryReader {
            view,
            unit_width: encoding.unit_width(),
            decode_text: encoding.text_decoder(),
        }
    }

    fn read_all(&self, base: u32, offsets: &[u32], kind: EntryKind) -> ChunkResult<Vec<String>> {
        let mut entries = Vec::with_capacity(offsets.len());
        for (idx, offset) in offsets.iter().enumerate() {
            let position = u64::from(base) + u64::from(*offset);
            trace!("{:?} #{} at pool offset 0x{:x}", kind, idx, position);
            entries.push(self.read_entry(position, kind)?);
        }
        Ok(entries)
    }

    fn read_entry(&self, position: u64, kind: EntryKind) -> ChunkResult<String> {
        let limit = self.view.len();
        let payload_start = position + 2;
        if payload_start > limit {
            fail!(BoundsViolation {
                what: kind.prefix_label(),
                offset: self.view.base() + payload_start,
                limit: self.view.end(),
            });
        }
        let units = self.view.read_u16_at(position)?;
        let payload_len = u64::from(units) * self.unit_width;
        let payload_end = payload_start + payload_len;
        if payload_end > limit {
            fail!(BoundsViolation {
                what: kind.payload_label(),
                offset: self.view.base() + payload_end,
                limit: self.view.end(),
            });
        }
        let payload = self.view.read_bytes(payload_start, payload_len)?;
        (self.decode_text)(&payload).map_err(|reason| ChunkError::InvalidText {
            offset: self.view.base() + payload_start,
            reason,
        })
    }
}

fn encode_entries(texts: &[String], encoding: StringEncoding) -> ChunkResult<(Vec<u32>, Vec<u8>)> {
    let mut offsets = Vec::with_capacity(texts.len());
    let mut data = Vec::new();
    for text in texts {
        offsets.push(data.len() as u32);
        let (payload, units) = encoding.encode_text(text);
        let units = u16::try_from(units).map_err(|_| ChunkError::BoundsViolation {
            what: "string length prefix",
            offset: units as u64,
            limit: u64::from(u16::MAX),
        })?;
        write_u16(&mut data, units);
        data.extend_from_slice(&payload);
    }
    align_to_four(&mut data);
    Ok((offsets, data))
}

fn write_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn write_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn align_to_four(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}
