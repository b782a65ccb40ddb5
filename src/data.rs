//! File Data

use std::io::{Read, Seek, SeekFrom};

use deku::prelude::*;

use crate::compressor::{self, Compressor};
use crate::error::SquashError;
use crate::superblock::SuperBlock;

// bitflag for data size field in inode for signifying that the data is uncompressed
const DATA_STORED_UNCOMPRESSED: u32 = 1 << 24;

/// One entry of a regular file's block list: low 24 bits are the on-disk
/// size, bit 24 marks the block as stored uncompressed. A zero entry is a
/// sparse block.
#[derive(Copy, Clone, Debug, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "little")]
pub struct DataSize(pub u32);

impl DataSize {
    #[inline]
    pub fn new(size: u32, uncompressed: bool) -> Self {
        assert!(size < DATA_STORED_UNCOMPRESSED, "value is too big");
        let mut value = size;
        if uncompressed {
            value |= DATA_STORED_UNCOMPRESSED;
        }
        Self(value)
    }

    #[inline]
    pub fn new_compressed(size: u32) -> Self {
        Self::new(size, false)
    }

    #[inline]
    pub fn new_uncompressed(size: u32) -> Self {
        Self::new(size, true)
    }

    #[inline]
    pub fn uncompressed(&self) -> bool {
        self.0 & DATA_STORED_UNCOMPRESSED != 0
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.0 & !DATA_STORED_UNCOMPRESSED
    }

    /// A zero entry with the compressed bit clear: a full block of zeros
    /// that occupies no space in the data region.
    #[inline]
    pub fn is_sparse(&self) -> bool {
        self.0 == 0
    }
}

/// Read one data or fragment block at the absolute position `offset`,
/// returning the decompressed bytes (at most `block_size`).
pub(crate) fn read_data_block<R: Read + Seek>(
    reader: &mut R,
    superblock: &SuperBlock,
    compressor: Compressor,
    offset: u64,
    size: DataSize,
) -> Result<Vec<u8>, SquashError> {
    let compressed_len = size.size();
    if compressed_len == 0 || compressed_len > superblock.block_size {
        return Err(SquashError::InvalidBlock);
    }
    if offset + u64::from(compressed_len) > superblock.bytes_used {
        return Err(SquashError::InvalidBlock);
    }

    reader.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; compressed_len as usize];
    reader.read_exact(&mut buf)?;

    if size.uncompressed() {
        return Ok(buf);
    }

    let limit = superblock.block_size as usize;
    let mut out = Vec::with_capacity(limit);
    compressor::decompress(&buf, &mut out, limit, compressor)?;
    Ok(out)
}
