//! [IB (Byte Index)](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/7d53d413-b492-4483-b624-4e2fa2a08cf3)
//!
//! Offsets, sizes and block ids are 64-bit in memory. On disk they take 4 bytes in the ANSI
//! layout and 8 bytes in the Unicode layout.

use super::{read_write::*, *};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IndexWidth {
    /// 32-bit ANSI field
    Narrow,
    /// 64-bit Unicode field
    Wide,
}

impl IndexWidth {
    pub const fn size(&self) -> usize {
        match self {
            IndexWidth::Narrow => 4,
            IndexWidth::Wide => 8,
        }
    }

    /// Check that `value` can be stored in a field of this width.
    pub fn check(&self, value: u64) -> NdbResult<u64> {
        match self {
            IndexWidth::Narrow if value > u64::from(u32::MAX) => {
                Err(NdbError::IndexOutOfRange(value))
            }
            _ => Ok(value),
        }
    }

    pub fn read_at(&self, data: &[u8], offset: usize) -> NdbResult<u64> {
        match self {
            IndexWidth::Narrow => Ok(u64::from(read_u32_at(data, offset)?)),
            IndexWidth::Wide => read_u64_at(data, offset),
        }
    }

    pub fn write_at(&self, data: &mut [u8], offset: usize, value: u64) -> NdbResult<()> {
        let value = self.check(value)?;
        match self {
            IndexWidth::Narrow => write_u32_at(data, offset, value as u32),
            IndexWidth::Wide => write_u64_at(data, offset, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narrow_overflow() {
        let mut data = [0_u8; 8];
        let Err(NdbError::IndexOutOfRange(value)) =
            IndexWidth::Narrow.write_at(&mut data, 0, u64::from(u32::MAX) + 1)
        else {
            panic!("Value should not fit an ANSI field");
        };
        assert_eq!(value, u64::from(u32::MAX) + 1);
        assert_eq!(data, [0; 8]);
    }

    #[test]
    fn test_wide_precision() {
        let value = (1_u64 << 62) + 1;
        let mut data = [0_u8; 12];
        IndexWidth::Wide.write_at(&mut data, 4, value).unwrap();
        assert_eq!(IndexWidth::Wide.read_at(&data, 4).unwrap(), value);
        assert_eq!(
            IndexWidth::Narrow.read_at(&data, 4).unwrap(),
            u64::from(value as u32)
        );
    }
}
