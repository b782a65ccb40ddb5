//! Image superblock

use deku::prelude::*;

use crate::compressor::Compressor;
use crate::error::SquashError;
use crate::inode::InodeRef;
use crate::metadata::METADATA_MAXSIZE;

/// "hsqs" on disk
pub const MAGIC: u32 = 0x7371_7368;

pub const VERSION_MAJOR: u16 = 4;

/// Value of a table pointer that is not present in the image
pub const NOT_SET: u64 = 0xffff_ffff_ffff_ffff;

/// Contains important information about the archive, including the locations of other sections
#[derive(Debug, Copy, Clone, DekuRead, DekuWrite, PartialEq, Eq)]
#[deku(endian = "little")]
pub struct SuperBlock {
    /// Must be set to 0x73717368 ("hsqs" on disk).
    pub magic: u32,
    /// The number of inodes stored in the archive.
    pub inode_count: u32,
    /// Last modification time of the archive. Count seconds since 00:00, Jan 1st 1970 UTC (not counting leap seconds).
    pub mod_time: u32,
    /// The size of a data block in bytes. Must be a power of two.
    pub block_size: u32,
    /// The number of entries in the fragment table.
    pub frag_count: u32,
    /// Compressor id used for both data and metadata blocks.
    pub compression: u16,
    /// The log2 of the block size. If the two fields do not agree, the archive is considered corrupted.
    pub block_log: u16,
    /// Bit wise OR of the flag bits
    pub flags: u16,
    /// The number of entries in the ID lookup table.
    pub id_count: u16,
    /// Major version of the format. Must be set to 4.
    pub version_major: u16,
    /// Minor version of the format. 0 or 1.
    pub version_minor: u16,
    /// A reference to the inode of the root directory.
    pub root_inode: u64,
    /// The number of bytes used by the archive.
    /// Because SquashFS archives must be padded to a multiple of the underlying device block size, this can be less than the actual file size.
    pub bytes_used: u64,
    pub id_table: u64,
    pub xattr_table: u64,
    pub inode_table: u64,
    pub dir_table: u64,
    pub frag_table: u64,
    pub export_table: u64,
}

impl SuperBlock {
    /// Validate the freshly parsed superblock, in the order a reader can
    /// report the most specific failure.
    pub(crate) fn validate(&self) -> Result<(), SquashError> {
        if self.magic != MAGIC {
            return Err(SquashError::InvalidMagic { found: self.magic });
        }

        if self.version_major != VERSION_MAJOR || self.version_minor > 1 {
            return Err(SquashError::UnsupportedVersion {
                major: self.version_major,
                minor: self.version_minor,
            });
        }

        if self.inode_table >= self.bytes_used {
            return Err(SquashError::CorruptedOrInvalidSquashfs);
        }

        if Compressor::from_id(self.compression).is_none() {
            return Err(SquashError::UnsupportedCompression(self.compression));
        }

        if self.block_log >= 32 || self.block_size != 1u32 << self.block_log {
            return Err(SquashError::CorruptedOrInvalidSquashfs);
        }

        // the root reference must land inside the inode table region
        let root = InodeRef(self.root_inode);
        let inode_region = self
            .dir_table
            .checked_sub(self.inode_table)
            .ok_or(SquashError::CorruptedOrInvalidSquashfs)?;
        if root.block_start() >= inode_region || usize::from(root.offset()) >= METADATA_MAXSIZE {
            return Err(SquashError::InvalidInode);
        }

        Ok(())
    }

    pub fn root_inode_ref(&self) -> InodeRef {
        InodeRef(self.root_inode)
    }

    /// flag value
    pub fn inodes_uncompressed(&self) -> bool {
        self.flags & Flags::InodesStoredUncompressed as u16 != 0
    }

    /// flag value
    pub fn data_block_stored_uncompressed(&self) -> bool {
        self.flags & Flags::DataBlockStoredUncompressed as u16 != 0
    }

    /// flag value
    pub fn fragments_stored_uncompressed(&self) -> bool {
        self.flags & Flags::FragmentsStoredUncompressed as u16 != 0
    }

    /// flag value
    pub fn fragments_are_not_used(&self) -> bool {
        self.flags & Flags::FragmentsAreNotUsed as u16 != 0
    }

    /// flag value
    pub fn fragments_are_always_generated(&self) -> bool {
        self.flags & Flags::FragmentsAreAlwaysGenerated as u16 != 0
    }

    /// flag value
    pub fn data_has_been_deduplicated(&self) -> bool {
        self.flags & Flags::DataHasBeenDeduplicated as u16 != 0
    }

    /// flag value
    pub fn nfs_export_table_exists(&self) -> bool {
        self.flags & Flags::NFSExportTableExists as u16 != 0
    }

    /// flag value
    pub fn xattrs_are_stored_uncompressed(&self) -> bool {
        self.flags & Flags::XattrsAreStoredUncompressed as u16 != 0
    }

    /// flag value
    pub fn no_xattrs_in_archive(&self) -> bool {
        self.flags & Flags::NoXattrsInArchive as u16 != 0
    }

    /// flag value
    pub fn compressor_options_are_present(&self) -> bool {
        self.flags & Flags::CompressorOptionsArePresent as u16 != 0
    }
}

#[rustfmt::skip]
#[allow(dead_code)]
#[derive(Debug, Copy, Clone)]
pub enum Flags {
    InodesStoredUncompressed    = 0b0000_0000_0000_0001,
    DataBlockStoredUncompressed = 0b0000_0000_0000_0010,
    Unused                      = 0b0000_0000_0000_0100,
    FragmentsStoredUncompressed = 0b0000_0000_0000_1000,
    FragmentsAreNotUsed         = 0b0000_0000_0001_0000,
    FragmentsAreAlwaysGenerated = 0b0000_0000_0010_0000,
    DataHasBeenDeduplicated     = 0b0000_0000_0100_0000,
    NFSExportTableExists        = 0b0000_0000_1000_0000,
    XattrsAreStoredUncompressed = 0b0000_0001_0000_0000,
    NoXattrsInArchive           = 0b0000_0010_0000_0000,
    CompressorOptionsArePresent = 0b0000_0100_0000_0000,
}
