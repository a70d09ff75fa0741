//! Deterministic little-endian wire encoding.
//!
//! All persisted and gossiped consensus objects share one hand-rolled codec:
//! fixed-width integers are little-endian, byte strings carry an explicit
//! length prefix, and optional-slot arrays are written as a prefix bitmap
//! followed by the non-null entries in index order. Reads are checked; a
//! truncated buffer yields [`CodecError::EndOfBuffer`], never a panic.

use bytes::{Buf, BufMut};
use thiserror::Error;

/// Errors produced while decoding wire bytes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The buffer ended before the value was fully read.
    #[error("unexpected end of buffer")]
    EndOfBuffer,

    /// Bytes remained after a complete top-level decode.
    #[error("{0} trailing bytes after decode")]
    TrailingData(usize),

    /// An enum tag byte did not match any known variant.
    #[error("unknown tag byte 0x{0:02x}")]
    UnknownTag(u8),

    /// A length prefix exceeded the allowed maximum.
    #[error("length {length} exceeds limit {limit}")]
    LengthOutOfRange { length: usize, limit: usize },

    /// A field held a structurally invalid value.
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),
}

/// A value with a deterministic byte encoding.
pub trait Encode {
    /// Append this value's encoding to `buf`.
    fn write<B: BufMut>(&self, buf: &mut B);

    /// Encode this value into a fresh byte vector.
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write(&mut buf);
        buf
    }
}

/// A value decodable from its [`Encode`] representation.
pub trait Decode: Sized {
    /// Read one value from the front of `buf`.
    fn read<B: Buf>(buf: &mut B) -> Result<Self, CodecError>;

    /// Decode a value that must consume the entire slice.
    fn from_bytes(mut bytes: &[u8]) -> Result<Self, CodecError> {
        let value = Self::read(&mut bytes)?;
        if !bytes.is_empty() {
            return Err(CodecError::TrailingData(bytes.len()));
        }
        Ok(value)
    }
}

/// Fail with [`CodecError::EndOfBuffer`] unless `len` bytes remain.
pub fn ensure<B: Buf>(buf: &B, len: usize) -> Result<(), CodecError> {
    if buf.remaining() < len {
        return Err(CodecError::EndOfBuffer);
    }
    Ok(())
}

/// Read a single byte.
pub fn read_u8<B: Buf>(buf: &mut B) -> Result<u8, CodecError> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

/// Read a little-endian u16.
pub fn read_u16<B: Buf>(buf: &mut B) -> Result<u16, CodecError> {
    ensure(buf, 2)?;
    Ok(buf.get_u16_le())
}

/// Read a little-endian u32.
pub fn read_u32<B: Buf>(buf: &mut B) -> Result<u32, CodecError> {
    ensure(buf, 4)?;
    Ok(buf.get_u32_le())
}

/// Read a little-endian u64.
pub fn read_u64<B: Buf>(buf: &mut B) -> Result<u64, CodecError> {
    ensure(buf, 8)?;
    Ok(buf.get_u64_le())
}

/// Read exactly `N` bytes into a fixed array.
pub fn read_array<const N: usize, B: Buf>(buf: &mut B) -> Result<[u8; N], CodecError> {
    ensure(buf, N)?;
    let mut out = [0u8; N];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

/// Write a byte string with a u8 length prefix. Panics if longer than 255.
pub fn write_bytes_u8<B: BufMut>(bytes: &[u8], buf: &mut B) {
    debug_assert!(bytes.len() <= u8::MAX as usize);
    buf.put_u8(bytes.len() as u8);
    buf.put_slice(bytes);
}

/// Read a u8-length-prefixed byte string.
pub fn read_bytes_u8<B: Buf>(buf: &mut B) -> Result<Vec<u8>, CodecError> {
    let len = read_u8(buf)? as usize;
    ensure(buf, len)?;
    let mut out = vec![0u8; len];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

/// Write a byte string with a u16 length prefix.
pub fn write_bytes_u16<B: BufMut>(bytes: &[u8], buf: &mut B) {
    debug_assert!(bytes.len() <= u16::MAX as usize);
    buf.put_u16_le(bytes.len() as u16);
    buf.put_slice(bytes);
}

/// Read a u16-length-prefixed byte string.
pub fn read_bytes_u16<B: Buf>(buf: &mut B) -> Result<Vec<u8>, CodecError> {
    let len = read_u16(buf)? as usize;
    ensure(buf, len)?;
    let mut out = vec![0u8; len];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

/// Write a byte string with a u32 length prefix.
pub fn write_bytes_u32<B: BufMut>(bytes: &[u8], buf: &mut B) {
    debug_assert!(bytes.len() <= u32::MAX as usize);
    buf.put_u32_le(bytes.len() as u32);
    buf.put_slice(bytes);
}

/// Read a u32-length-prefixed byte string, bounded by `limit`.
pub fn read_bytes_u32<B: Buf>(buf: &mut B, limit: usize) -> Result<Vec<u8>, CodecError> {
    let len = read_u32(buf)? as usize;
    if len > limit {
        return Err(CodecError::LengthOutOfRange { length: len, limit });
    }
    ensure(buf, len)?;
    let mut out = vec![0u8; len];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

/// Write a list with a u16 count prefix followed by each element.
pub fn write_list_u16<T: Encode, B: BufMut>(items: &[T], buf: &mut B) {
    debug_assert!(items.len() <= u16::MAX as usize);
    buf.put_u16_le(items.len() as u16);
    for item in items {
        item.write(buf);
    }
}

/// Read a u16-count-prefixed list.
pub fn read_list_u16<T: Decode, B: Buf>(buf: &mut B) -> Result<Vec<T>, CodecError> {
    let count = read_u16(buf)? as usize;
    let mut items = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        items.push(T::read(buf)?);
    }
    Ok(items)
}

/// Write a fixed-width optional-slot array as a prefix bitmap
/// (`ceil(len / 8)` bytes, bit `i` set ⇔ slot `i` occupied) followed by the
/// occupied entries in index order.
pub fn write_nullable_array<T: Encode, B: BufMut>(slots: &[Option<T>], buf: &mut B) {
    let mut bitmap = vec![0u8; slots.len().div_ceil(8)];
    for (i, slot) in slots.iter().enumerate() {
        if slot.is_some() {
            bitmap[i / 8] |= 1 << (i % 8);
        }
    }
    buf.put_slice(&bitmap);
    for slot in slots.iter().flatten() {
        slot.write(buf);
    }
}

/// Read a fixed-width optional-slot array written by [`write_nullable_array`].
/// `len` is the slot count, which the caller knows from context.
pub fn read_nullable_array<T: Decode, B: Buf>(
    buf: &mut B,
    len: usize,
) -> Result<Vec<Option<T>>, CodecError> {
    let bitmap: Vec<u8> = {
        let bytes = len.div_ceil(8);
        ensure(buf, bytes)?;
        let mut out = vec![0u8; bytes];
        buf.copy_to_slice(&mut out);
        out
    };
    let mut slots = Vec::with_capacity(len);
    for i in 0..len {
        if bitmap[i / 8] & (1 << (i % 8)) != 0 {
            slots.push(Some(T::read(buf)?));
        } else {
            slots.push(None);
        }
    }
    Ok(slots)
}
