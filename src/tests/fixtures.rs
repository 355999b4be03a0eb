//! Byte-level builders for chunk streams used by the scenario tests.

use crate::android::chunk::{
    ChunkType, RES_STRING_POOL_TYPE, RES_XML_RESOURCE_MAP_TYPE, RES_XML_TYPE,
};

pub(crate) fn write_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

pub(crate) fn patch_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn align_to_four(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

pub(crate) fn begin_chunk(buf: &mut Vec<u8>, chunk_type: u16, header_size: u16) -> usize {
    let start = buf.len();
    write_u16(buf, chunk_type);
    write_u16(buf, header_size);
    write_u32(buf, 0); // placeholder for chunk size
    start
}

pub(crate) fn finalize_chunk(buf: &mut Vec<u8>, chunk_start: usize) {
    align_to_four(buf);
    let size = (buf.len() - chunk_start) as u32;
    patch_u32(buf, chunk_start + 4, size);
}

fn push_entry(buf: &mut Vec<u8>, text: &str, utf8: bool) {
    if utf8 {
        write_u16(buf, text.len() as u16);
        buf.extend_from_slice(text.as_bytes());
    } else {
        let units: Vec<u16> = text.encode_utf16().collect();
        write_u16(buf, units.len() as u16);
        for unit in units {
            write_u16(buf, unit);
        }
    }
}

fn entry_block(texts: &[&str], utf8: bool) -> (Vec<u32>, Vec<u8>) {
    let mut offsets = Vec::new();
    let mut data = Vec::new();
    for text in texts {
        offsets.push(data.len() as u32);
        push_entry(&mut data, text, utf8);
    }
    align_to_four(&mut data);
    (offsets, data)
}

/// A string pool in the canonical layout: packed tables, strings, then styles.
pub(crate) fn string_pool(strings: &[&str], styles: &[&str], utf8: bool) -> Vec<u8> {
    let (string_offsets, string_data) = entry_block(strings, utf8);
    let (style_offsets, style_data) = entry_block(styles, utf8);
    let strings_start = 28 + 4 * (strings.len() + styles.len()) as u32;
    let styles_start = if styles.is_empty() {
        0
    } else {
        strings_start + string_data.len() as u32
    };

    let mut buf = Vec::new();
    let start = begin_chunk(&mut buf, RES_STRING_POOL_TYPE, 28);
    write_u32(&mut buf, strings.len() as u32);
    write_u32(&mut buf, styles.len() as u32);
    write_u32(&mut buf, if utf8 { 0x100 } else { 0 });
    write_u32(&mut buf, strings_start);
    write_u32(&mut buf, styles_start);
    for offset in string_offsets.iter().chain(style_offsets.iter()) {
        write_u32(&mut buf, *offset);
    }
    buf.extend_from_slice(&string_data);
    buf.extend_from_slice(&style_data);
    finalize_chunk(&mut buf, start);
    buf
}

/// A chunk whose header and body are zero-filled apart from the generic header.
pub(crate) fn opaque_chunk(chunk_type: u16, header_size: u16, body_len: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    let start = begin_chunk(&mut buf, chunk_type, header_size);
    buf.resize(usize::from(header_size) + body_len, 0);
    finalize_chunk(&mut buf, start);
    buf
}

pub(crate) fn resource_map(ids: &[u32]) -> Vec<u8> {
    let mut buf = Vec::new();
    let start = begin_chunk(&mut buf, RES_XML_RESOURCE_MAP_TYPE, 8);
    for id in ids {
        write_u32(&mut buf, *id);
    }
    finalize_chunk(&mut buf, start);
    buf
}

/// A root chunk of `root_type` wrapping `children`. The header has the type's minimum
/// size, its extra fields zero-filled.
pub(crate) fn document_of(root_type: u16, children: &[Vec<u8>]) -> Vec<u8> {
    let header_size = ChunkType::from_code(root_type).min_header_size();
    let mut buf = Vec::new();
    let start = begin_chunk(&mut buf, root_type, header_size);
    buf.resize(usize::from(header_size), 0);
    for child in children {
        buf.extend_from_slice(child);
    }
    finalize_chunk(&mut buf, start);
    buf
}

pub(crate) fn xml_document(children: &[Vec<u8>]) -> Vec<u8> {
    document_of(RES_XML_TYPE, children)
}
