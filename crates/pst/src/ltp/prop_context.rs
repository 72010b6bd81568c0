//! ## Property Sets
//!
//! A node's payload is a `u32` record count followed by `(tag, value)` records. The low 16 bits
//! of the tag select the value encoding:
//!
//! | Type                      | Encoding                                  |
//! |---------------------------|-------------------------------------------|
//! | [PropertyType::Unicode]   | `u32` byte length, then UTF-16LE          |
//! | [PropertyType::Integer32] | `u32`                                     |
//! | [PropertyType::Time]      | `i64` FILETIME ticks                      |
//! | anything else             | `u32` byte length, then UTF-8             |

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};
use std::{
    collections::BTreeMap,
    io::{self, Cursor, Read, Write},
};
use tracing::warn;

use super::{prop_type::*, *};

/// Milliseconds between 1601-01-01 and 1970-01-01.
pub const UNIX_EPOCH_OFFSET_MILLIS: i64 = 11_644_473_600_000;

/// FILETIME ticks are 100ns intervals.
pub const TICKS_PER_MILLI: i64 = 10_000;

/// `PtypTime`: 100-nanosecond intervals since January 1, 1601 (UTC).
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileTime(i64);

impl FileTime {
    pub fn from_unix_millis(millis: i64) -> Self {
        Self(
            millis
                .saturating_add(UNIX_EPOCH_OFFSET_MILLIS)
                .saturating_mul(TICKS_PER_MILLI),
        )
    }

    pub fn from_datetime(time: DateTime<Utc>) -> Self {
        Self::from_unix_millis(time.timestamp_millis())
    }

    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn ticks(&self) -> i64 {
        self.0
    }

    pub fn to_datetime(&self) -> LtpResult<DateTime<Utc>> {
        let millis = self.0.div_euclid(TICKS_PER_MILLI) - UNIX_EPOCH_OFFSET_MILLIS;
        DateTime::from_timestamp_millis(millis).ok_or(LtpError::FileTimeOutOfRange(self.0))
    }
}

impl From<i64> for FileTime {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<FileTime> for i64 {
    fn from(value: FileTime) -> Self {
        value.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PropertyValue {
    Unicode(String),
    Integer32(u32),
    Time(FileTime),
}

impl PropertyValue {
    pub fn property_type(&self) -> PropertyType {
        match self {
            PropertyValue::Unicode(_) => PropertyType::Unicode,
            PropertyValue::Integer32(_) => PropertyType::Integer32,
            PropertyValue::Time(_) => PropertyType::Time,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Unicode(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            PropertyValue::Integer32(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<FileTime> {
        match self {
            PropertyValue::Time(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Unicode(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Unicode(value)
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        Self::Integer32(value)
    }
}

impl From<FileTime> for PropertyValue {
    fn from(value: FileTime) -> Self {
        Self::Time(value)
    }
}

/// Bounds applied while serializing a [PropertySet].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PropertyLimits {
    /// Longest Unicode value kept, in UTF-16 code units.
    pub max_unicode_units: usize,
    /// Longest fallback value kept, in UTF-8 bytes.
    pub max_fallback_bytes: usize,
    /// Largest serialized payload, including the record count.
    pub max_payload: usize,
}

impl Default for PropertyLimits {
    fn default() -> Self {
        Self {
            max_unicode_units: 1000,
            max_fallback_bytes: 500,
            max_payload: 64 * 1024,
        }
    }
}

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct PropertySet {
    properties: BTreeMap<PropertyTag, PropertyValue>,
}

impl PropertySet {
    pub fn new() -> Self {
        Default::default()
    }

    /// Insert or replace a property. Tags with a known type only accept values of that type;
    /// any other tag takes a string, which is stored as UTF-8.
    pub fn insert(&mut self, tag: PropertyTag, value: impl Into<PropertyValue>) -> LtpResult<()> {
        let value = value.into();
        let expected = tag.property_type().unwrap_or(PropertyType::Unicode);
        if value.property_type() != expected {
            return Err(LtpError::PropertyTypeMismatch { tag, expected });
        }

        self.properties.insert(tag, value);
        Ok(())
    }

    pub fn get(&self, tag: PropertyTag) -> Option<&PropertyValue> {
        self.properties.get(&tag)
    }

    pub fn unicode(&self, tag: PropertyTag) -> Option<&str> {
        self.get(tag).and_then(PropertyValue::as_str)
    }

    pub fn integer32(&self, tag: PropertyTag) -> Option<u32> {
        self.get(tag).and_then(PropertyValue::as_u32)
    }

    pub fn time(&self, tag: PropertyTag) -> Option<FileTime> {
        self.get(tag).and_then(PropertyValue::as_time)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PropertyTag, &PropertyValue)> {
        self.properties.iter().map(|(tag, value)| (*tag, value))
    }

    /// Encode every property that fits in `limits.max_payload`. A record that would overflow is
    /// dropped, and the count prefix only includes records actually written.
    pub fn serialize(&self, limits: &PropertyLimits) -> io::Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        cursor.write_u32::<LittleEndian>(0)?;
        let mut count = 0_u32;

        for (tag, value) in self.iter() {
            let mut record = Vec::new();
            write_record(&mut record, tag, value, limits)?;
            if cursor.get_ref().len() + record.len() > limits.max_payload {
                warn!(
                    name: "PstPropertyDropped",
                    ?tag,
                    size = record.len(),
                    "Property does not fit in the block payload"
                );
                continue;
            }

            cursor.write_all(&record)?;
            count += 1;
        }

        cursor.set_position(0);
        cursor.write_u32::<LittleEndian>(count)?;
        Ok(cursor.into_inner())
    }

    pub fn deserialize(data: &[u8]) -> LtpResult<Self> {
        let mut cursor = Cursor::new(data);
        let count = read_field(&mut cursor, 4, |f| f.read_u32::<LittleEndian>())?;

        let mut properties = BTreeMap::new();
        for _ in 0..count {
            let tag = read_field(&mut cursor, 4, |f| f.read_u32::<LittleEndian>())?;
            let tag = PropertyTag::from(tag);
            let value = match tag.property_type() {
                Some(PropertyType::Integer32) => {
                    let value = read_field(&mut cursor, 4, |f| f.read_u32::<LittleEndian>())?;
                    PropertyValue::Integer32(value)
                }
                Some(PropertyType::Time) => {
                    let ticks = read_field(&mut cursor, 8, |f| f.read_i64::<LittleEndian>())?;
                    PropertyValue::Time(FileTime::from(ticks))
                }
                Some(PropertyType::Unicode) => {
                    let bytes = read_counted(&mut cursor)?;
                    if bytes.len() % 2 != 0 {
                        return Err(LtpError::InvalidUnicodeString(tag));
                    }
                    let units: Vec<u16> = bytes
                        .chunks_exact(2)
                        .map(|unit| u16::from_le_bytes([unit[0], unit[1]]))
                        .collect();
                    let value = String::from_utf16(&units)
                        .map_err(|_| LtpError::InvalidUnicodeString(tag))?;
                    PropertyValue::Unicode(value)
                }
                None => {
                    let value = String::from_utf8(read_counted(&mut cursor)?)
                        .map_err(|_| LtpError::InvalidUtf8String(tag))?;
                    PropertyValue::Unicode(value)
                }
            };
            properties.insert(tag, value);
        }

        Ok(Self { properties })
    }
}

/// Reads from a slice only fail at the end of the data, so every error is a truncation at the
/// position the field started.
fn read_field<'a, T>(
    cursor: &mut Cursor<&'a [u8]>,
    size: usize,
    read: impl FnOnce(&mut Cursor<&'a [u8]>) -> io::Result<T>,
) -> LtpResult<T> {
    let offset = cursor.position() as usize;
    read(cursor).map_err(|_| LtpError::TruncatedPropertyRecord {
        offset,
        expected: size,
        actual: cursor.get_ref().len().saturating_sub(offset),
    })
}

/// A `u32` byte length followed by that many bytes.
fn read_counted(cursor: &mut Cursor<&[u8]>) -> LtpResult<Vec<u8>> {
    let length = read_field(cursor, 4, |f| f.read_u32::<LittleEndian>())? as usize;

    // Check before allocating, the length comes straight from the file.
    let offset = cursor.position() as usize;
    let remaining = cursor.get_ref().len().saturating_sub(offset);
    if remaining < length {
        return Err(LtpError::TruncatedPropertyRecord {
            offset,
            expected: length,
            actual: remaining,
        });
    }

    let mut buffer = vec![0; length];
    read_field(cursor, length, |f| f.read_exact(&mut buffer))?;
    Ok(buffer)
}

fn write_record(
    f: &mut dyn Write,
    tag: PropertyTag,
    value: &PropertyValue,
    limits: &PropertyLimits,
) -> io::Result<()> {
    f.write_u32::<LittleEndian>(u32::from(tag))?;

    match (tag.property_type(), value) {
        (_, PropertyValue::Integer32(value)) => f.write_u32::<LittleEndian>(*value),
        (_, PropertyValue::Time(value)) => f.write_i64::<LittleEndian>(value.ticks()),
        (Some(PropertyType::Unicode), PropertyValue::Unicode(value)) => {
            let units = truncate_utf16(value, limits.max_unicode_units);
            f.write_u32::<LittleEndian>((units.len() * 2) as u32)?;
            for unit in units {
                f.write_u16::<LittleEndian>(unit)?;
            }
            Ok(())
        }
        (_, PropertyValue::Unicode(value)) => {
            let value = truncate_utf8(value, limits.max_fallback_bytes);
            f.write_u32::<LittleEndian>(value.len() as u32)?;
            f.write_all(value.as_bytes())
        }
    }
}

/// Keep whole characters up to `max_units` UTF-16 code units.
fn truncate_utf16(value: &str, max_units: usize) -> Vec<u16> {
    let mut units = Vec::with_capacity(value.len().min(max_units));
    let mut buffer = [0_u16; 2];
    for ch in value.chars() {
        if units.len() + ch.len_utf16() > max_units {
            break;
        }
        units.extend_from_slice(ch.encode_utf16(&mut buffer));
    }
    units
}

/// Cut at the last character boundary at or before `max_bytes`.
fn truncate_utf8(value: &str, max_bytes: usize) -> &str {
    let mut end = max_bytes.min(value.len());
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
