//! Fixed-offset frame codec
//!
//! Every Nomad command and response is a fixed-size byte buffer with
//! fields at known offsets. Integers are little-endian; names are either
//! NUL-terminated byte strings or zero-terminated UTF-16LE code units.
//!
//! Decoders are bounds-checked and report [`FrameError::Truncated`]
//! instead of panicking, so a firmware that answers with a shorter layout
//! than expected surfaces as a malformed frame.

use crate::error::{FrameError, ValidationError};

/// Check that `width` bytes starting at `offset` fit in `buf`
fn field(buf: &[u8], offset: usize, width: usize) -> Result<&[u8], FrameError> {
    offset
        .checked_add(width)
        .and_then(|end| buf.get(offset..end))
        .ok_or(FrameError::Truncated {
            offset,
            width,
            len: buf.len(),
        })
}

fn field_mut(buf: &mut [u8], offset: usize, width: usize) -> Result<&mut [u8], FrameError> {
    let len = buf.len();
    offset
        .checked_add(width)
        .and_then(|end| buf.get_mut(offset..end))
        .ok_or(FrameError::Truncated { offset, width, len })
}

/// Encode a 16-bit value in wire order
pub fn encode_u16_le(value: u16) -> [u8; 2] {
    value.to_le_bytes()
}

/// Encode a 32-bit value in wire order
pub fn encode_u32_le(value: u32) -> [u8; 4] {
    value.to_le_bytes()
}

/// Read a little-endian u16 at `offset`
pub fn get_u16(buf: &[u8], offset: usize) -> Result<u16, FrameError> {
    let bytes = field(buf, offset, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Read a little-endian u32 at `offset`
pub fn get_u32(buf: &[u8], offset: usize) -> Result<u32, FrameError> {
    let bytes = field(buf, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Write a little-endian u16 at `offset`
pub fn put_u16(buf: &mut [u8], offset: usize, value: u16) -> Result<(), FrameError> {
    field_mut(buf, offset, 2)?.copy_from_slice(&encode_u16_le(value));
    Ok(())
}

/// Write a little-endian u32 at `offset`
pub fn put_u32(buf: &mut [u8], offset: usize, value: u32) -> Result<(), FrameError> {
    field_mut(buf, offset, 4)?.copy_from_slice(&encode_u32_le(value));
    Ok(())
}

/// Copy a fixed-width raw byte field out of `buf`
pub fn get_array<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N], FrameError> {
    let mut out = [0u8; N];
    out.copy_from_slice(field(buf, offset, N)?);
    Ok(out)
}

/// Copy raw bytes into `buf` at `offset`
pub fn put_bytes(buf: &mut [u8], offset: usize, bytes: &[u8]) -> Result<(), FrameError> {
    field_mut(buf, offset, bytes.len())?.copy_from_slice(bytes);
    Ok(())
}

/// Encode text as UTF-16LE code units followed by one zero unit
///
/// The field holds `max_units` units including the terminator, so at most
/// `max_units - 1` units of text fit.
pub fn encode_utf16_field(text: &str, max_units: usize) -> Result<Vec<u8>, ValidationError> {
    let units: Vec<u16> = text.encode_utf16().collect();
    if units.len() >= max_units {
        return Err(ValidationError::NameTooLong {
            units: units.len(),
            max: max_units.saturating_sub(1),
        });
    }

    let mut out = Vec::with_capacity((units.len() + 1) * 2);
    for unit in units.into_iter().chain(std::iter::once(0)) {
        out.extend_from_slice(&encode_u16_le(unit));
    }
    Ok(out)
}

/// Encode text as bare UTF-16LE code units, no terminator
pub fn encode_utf16_units(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(encode_u16_le).collect()
}

/// Decode a zero-terminated UTF-16LE field of at most `max_units` units
///
/// Stops at the first zero unit or after `max_units` units, whichever
/// comes first. Unpaired surrogates decode as U+FFFD.
pub fn decode_utf16_field(
    buf: &[u8],
    offset: usize,
    max_units: usize,
) -> Result<String, FrameError> {
    let mut units = Vec::new();
    for i in 0..max_units {
        let unit = get_u16(buf, offset + i * 2)?;
        if unit == 0 {
            break;
        }
        units.push(unit);
    }

    Ok(char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect())
}

/// Decode a NUL-terminated byte string of at most `max_len` bytes
///
/// A field with no terminator inside `max_len` is taken whole.
pub fn decode_cstr(buf: &[u8], offset: usize, max_len: usize) -> Result<String, FrameError> {
    let len = buf.len();
    let tail = match buf.get(offset..) {
        Some(tail) if !tail.is_empty() => tail,
        _ => {
            return Err(FrameError::Truncated {
                offset,
                width: 1,
                len,
            })
        }
    };
    let bytes = &tail[..tail.len().min(max_len)];
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
}

/// Round `size` up to the next multiple of `align` (a power of two)
pub fn round_up(size: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (size + align - 1) & !(align - 1)
}
