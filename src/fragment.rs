//! Data Fragment support

use deku::prelude::*;

use crate::data::DataSize;

/// On-disk size of one fragment table entry
pub(crate) const FRAGMENT_SIZE: usize = 16;

#[derive(Copy, Clone, Debug, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "little")]
pub struct Fragment {
    /// Absolute byte position of the fragment data block
    pub start: u64,
    /// Same encoding as a block-list entry
    pub size: u32,
    pub unused: u32,
}

impl Fragment {
    pub fn data_size(&self) -> DataSize {
        DataSize(self.size)
    }
}
