//! Fixed-width little-endian helpers for reading and patching fields at known
//! offsets inside a byte buffer.
//!
//! 64-bit values split into two 32-bit halves are always recombined with
//! integer shifts, so offsets and sizes keep full precision.

use byteorder::{ByteOrder, LittleEndian};

use super::*;

/// Combine the low and high 32-bit halves of a 64-bit value.
pub const fn join_u64(low: u32, high: u32) -> u64 {
    ((high as u64) << 32) | low as u64
}

/// Split a 64-bit value into its low and high 32-bit halves.
pub const fn split_u64(value: u64) -> (u32, u32) {
    (value as u32, (value >> 32) as u32)
}

fn field(data: &[u8], offset: usize, size: usize) -> NdbResult<&[u8]> {
    offset
        .checked_add(size)
        .and_then(|end| data.get(offset..end))
        .ok_or(NdbError::OutOfBounds {
            offset,
            size,
            len: data.len(),
        })
}

fn field_mut(data: &mut [u8], offset: usize, size: usize) -> NdbResult<&mut [u8]> {
    let len = data.len();
    offset
        .checked_add(size)
        .and_then(|end| data.get_mut(offset..end))
        .ok_or(NdbError::OutOfBounds { offset, size, len })
}

pub fn read_u8_at(data: &[u8], offset: usize) -> NdbResult<u8> {
    Ok(field(data, offset, 1)?[0])
}

pub fn read_u16_at(data: &[u8], offset: usize) -> NdbResult<u16> {
    Ok(LittleEndian::read_u16(field(data, offset, 2)?))
}

pub fn read_u32_at(data: &[u8], offset: usize) -> NdbResult<u32> {
    Ok(LittleEndian::read_u32(field(data, offset, 4)?))
}

pub fn read_u64_at(data: &[u8], offset: usize) -> NdbResult<u64> {
    Ok(LittleEndian::read_u64(field(data, offset, 8)?))
}

pub fn write_u8_at(data: &mut [u8], offset: usize, value: u8) -> NdbResult<()> {
    field_mut(data, offset, 1)?[0] = value;
    Ok(())
}

pub fn write_u16_at(data: &mut [u8], offset: usize, value: u16) -> NdbResult<()> {
    LittleEndian::write_u16(field_mut(data, offset, 2)?, value);
    Ok(())
}

pub fn write_u32_at(data: &mut [u8], offset: usize, value: u32) -> NdbResult<()> {
    LittleEndian::write_u32(field_mut(data, offset, 4)?, value);
    Ok(())
}

pub fn write_u64_at(data: &mut [u8], offset: usize, value: u64) -> NdbResult<()> {
    LittleEndian::write_u64(field_mut(data, offset, 8)?, value);
    Ok(())
}
