//! [BREF](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/844a5ebf-488a-45fd-8fce-92a84d8e24a3)

/// Position and framed length of a block inside the file.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct BlockLocator {
    offset: u64,
    size: u64,
}

impl BlockLocator {
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// One past the last byte, saturating instead of wrapping on corrupt values.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }

    pub fn overlaps(&self, other: &BlockLocator) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}
