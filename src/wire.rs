//! Little-endian byte packing and the small buffer utilities the frame codec
//! is built on. Everything on the wire is little-endian; fixed-width string
//! fields are right-padded with NULs.

use byteorder::{ByteOrder, ReadBytesExt, LE};
use bytes::Bytes;
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug, Eq, PartialEq)]
pub enum WireError {
    #[error("Buffer too short: need {0:#x} bytes at offset {1:#x}, have {2:#x}")]
    ShortBuffer(usize, usize, usize),
    #[error("Invalid hex string: {0}")]
    BadHex(String),
}

pub fn pack_u8(n: u8) -> [u8; 1] {
    [n]
}

pub fn pack_u16(n: u16) -> [u8; 2] {
    let mut buf = [0u8; 2];
    LE::write_u16(&mut buf, n);
    buf
}

pub fn pack_u32(n: u32) -> [u8; 4] {
    let mut buf = [0u8; 4];
    LE::write_u32(&mut buf, n);
    buf
}

pub fn unpack_u8(buf: &[u8], offset: usize) -> Result<u8, WireError> {
    reader_at(buf, offset)
        .read_u8()
        .map_err(|_| WireError::ShortBuffer(1, offset, buf.len()))
}

pub fn unpack_u16(buf: &[u8], offset: usize) -> Result<u16, WireError> {
    reader_at(buf, offset)
        .read_u16::<LE>()
        .map_err(|_| WireError::ShortBuffer(2, offset, buf.len()))
}

pub fn unpack_u32(buf: &[u8], offset: usize) -> Result<u32, WireError> {
    reader_at(buf, offset)
        .read_u32::<LE>()
        .map_err(|_| WireError::ShortBuffer(4, offset, buf.len()))
}

fn reader_at(buf: &[u8], offset: usize) -> Cursor<&[u8]> {
    let mut reader = Cursor::new(buf);
    // Past-the-end positions make the next read fail as a short buffer
    reader.set_position(offset as u64);
    reader
}

/// Returns exactly `n` bytes: the input NUL-padded on the right, or truncated.
pub fn pad_or_truncate(s: &[u8], n: usize) -> Vec<u8> {
    let mut out = vec![0u8; n];
    let len = s.len().min(n);
    out[..len].copy_from_slice(&s[..len]);
    out
}

/// Splits `buf` into ordered `chunk_size` slices, the last possibly shorter.
/// Empty input yields no chunks. The slices share the input's storage.
pub fn split_chunks(buf: &Bytes, chunk_size: usize) -> Vec<Bytes> {
    assert!(chunk_size > 0);
    let mut chunks = Vec::with_capacity(buf.len().div_ceil(chunk_size));
    let mut start = 0;
    while start < buf.len() {
        let end = (start + chunk_size).min(buf.len());
        chunks.push(buf.slice(start..end));
        start = end;
    }
    chunks
}

/// Case-insensitive hex decoding. Requires an even number of hex digits.
pub fn hex_to_bytes(s: &str) -> Result<Vec<u8>, WireError> {
    hex::decode(s.to_ascii_lowercase()).map_err(|e| WireError::BadHex(e.to_string()))
}

/// Strips ASCII space/tab/CR/LF from both ends.
pub fn trim_ws(s: &str) -> &str {
    s.trim_matches([' ', '\t', '\r', '\n'])
}

/// Truncates at the first NUL byte; input without NULs is returned unchanged.
pub fn strip_trailing_nul(s: &[u8]) -> &[u8] {
    match s.iter().position(|&b| b == 0) {
        Some(pos) => &s[..pos],
        None => s,
    }
}
