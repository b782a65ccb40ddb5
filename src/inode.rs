//! Index Node for file or directory

use std::io::{Read, Seek};

use deku::prelude::*;
use tracing::trace;

use crate::data::DataSize;
use crate::error::SquashError;
use crate::metadata::MetaStream;
use crate::superblock::SuperBlock;

/// Fragment index of a file that has no fragment tail
pub const NO_FRAGMENT: u32 = 0xffff_ffff;

/// Reference to an inode inside the inode table: upper 48 bits are the byte
/// offset of a metadata block relative to the start of the table, lower 16
/// bits the byte offset inside that block's decompressed payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct InodeRef(pub u64);

impl InodeRef {
    pub fn new(block_start: u64, offset: u16) -> Self {
        Self((block_start << 16) | u64::from(offset))
    }

    pub fn block_start(self) -> u64 {
        self.0 >> 16
    }

    pub fn offset(self) -> u16 {
        (self.0 & 0xffff) as u16
    }
}

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq)]
#[deku(id_type = "u16", endian = "little")]
#[repr(u16)]
#[rustfmt::skip]
pub enum InodeId {
    BasicDirectory          = 1,
    BasicFile               = 2,
    BasicSymlink            = 3,
    BasicBlockDevice        = 4,
    BasicCharacterDevice    = 5,
    BasicFifo               = 6,
    BasicSocket             = 7,
    ExtendedDirectory       = 8,
    ExtendedFile            = 9,
    ExtendedSymlink         = 10,
    ExtendedBlockDevice     = 11,
    ExtendedCharacterDevice = 12,
    ExtendedFifo            = 13,
    ExtendedSocket          = 14,
}

impl InodeId {
    /// Map an on-disk type code, as found in inode records and directory
    /// entries, to a known variant.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::BasicDirectory),
            2 => Some(Self::BasicFile),
            3 => Some(Self::BasicSymlink),
            4 => Some(Self::BasicBlockDevice),
            5 => Some(Self::BasicCharacterDevice),
            6 => Some(Self::BasicFifo),
            7 => Some(Self::BasicSocket),
            8 => Some(Self::ExtendedDirectory),
            9 => Some(Self::ExtendedFile),
            10 => Some(Self::ExtendedSymlink),
            11 => Some(Self::ExtendedBlockDevice),
            12 => Some(Self::ExtendedCharacterDevice),
            13 => Some(Self::ExtendedFifo),
            14 => Some(Self::ExtendedSocket),
            _ => None,
        }
    }

    pub fn is_dir(self) -> bool {
        matches!(self, Self::BasicDirectory | Self::ExtendedDirectory)
    }

    pub fn is_file(self) -> bool {
        matches!(self, Self::BasicFile | Self::ExtendedFile)
    }

    pub fn is_symlink(self) -> bool {
        matches!(self, Self::BasicSymlink | Self::ExtendedSymlink)
    }
}

/// Common 14-byte header following the 2-byte type code
#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq, Default)]
#[deku(endian = "little")]
pub struct InodeHeader {
    pub permissions: u16,
    /// index into id table
    pub uid: u16,
    /// index into id table
    pub gid: u16,
    pub mtime: u32,
    pub inode_number: u32,
}

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq)]
#[deku(endian = "little")]
pub struct BasicDirectory {
    /// Byte offset of the listing's first metadata block, relative to the
    /// start of the directory table
    pub block_index: u32,
    pub link_count: u32,
    /// Logical byte length of the listing (plus the 3 virtual bytes for
    /// "." and "..")
    pub file_size: u16,
    /// Byte offset of the listing inside the first decompressed block
    pub block_offset: u16,
    pub parent_inode: u32,
}

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq)]
#[deku(endian = "little")]
pub struct ExtendedDirectory {
    pub link_count: u32,
    pub file_size: u32,
    pub block_index: u32,
    pub parent_inode: u32,
    /// Count of trailing directory-index records. They are a lookup
    /// optimization only and are not materialized here.
    pub index_count: u16,
    pub block_offset: u16,
    pub xattr_index: u32,
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq, Eq)]
#[deku(endian = "little")]
pub struct BasicFile {
    /// Absolute byte offset of the first data block
    pub blocks_start: u32,
    pub frag_index: u32,
    /// Byte offset of this file's tail inside the fragment block
    pub block_offset: u32,
    pub file_size: u32,
    #[deku(skip)]
    pub block_sizes: Vec<DataSize>,
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq, Eq)]
#[deku(endian = "little")]
pub struct ExtendedFile {
    pub blocks_start: u64,
    pub file_size: u64,
    pub sparse: u64,
    pub link_count: u32,
    pub frag_index: u32,
    pub block_offset: u32,
    pub xattr_index: u32,
    #[deku(skip)]
    pub block_sizes: Vec<DataSize>,
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq, Eq)]
#[deku(endian = "little")]
pub struct BasicSymlink {
    pub link_count: u32,
    pub target_size: u32,
    #[deku(skip)]
    pub target_path: Vec<u8>,
}

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq)]
#[deku(endian = "little")]
pub struct BasicDeviceSpecialFile {
    pub link_count: u32,
    pub device_number: u32,
}

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq)]
#[deku(endian = "little")]
pub struct ExtendedDeviceSpecialFile {
    pub link_count: u32,
    pub device_number: u32,
    pub xattr_index: u32,
}

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq)]
#[deku(endian = "little")]
pub struct BasicIpc {
    pub link_count: u32,
}

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq)]
#[deku(endian = "little")]
pub struct ExtendedIpc {
    pub link_count: u32,
    pub xattr_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InodeInner {
    BasicDirectory(BasicDirectory),
    BasicFile(BasicFile),
    BasicSymlink(BasicSymlink),
    BasicBlockDevice(BasicDeviceSpecialFile),
    BasicCharacterDevice(BasicDeviceSpecialFile),
    BasicFifo(BasicIpc),
    BasicSocket(BasicIpc),
    ExtendedDirectory(ExtendedDirectory),
    ExtendedFile(ExtendedFile),
    ExtendedSymlink(BasicSymlink),
    ExtendedBlockDevice(ExtendedDeviceSpecialFile),
    ExtendedCharacterDevice(ExtendedDeviceSpecialFile),
    ExtendedFifo(ExtendedIpc),
    ExtendedSocket(ExtendedIpc),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub id: InodeId,
    pub header: InodeHeader,
    pub inner: InodeInner,
}

/// Borrowed view over the fields shared by `BasicFile` and `ExtendedFile`
pub(crate) struct FileView<'a> {
    pub blocks_start: u64,
    pub frag_index: u32,
    pub block_offset: u32,
    pub file_size: u64,
    pub block_sizes: &'a [DataSize],
}

/// Borrowed view over the fields shared by both directory variants
pub(crate) struct DirView {
    pub block_index: u32,
    pub block_offset: u16,
    pub file_size: u32,
}

impl Inode {
    pub fn is_file(&self) -> bool {
        self.id.is_file()
    }

    pub fn is_dir(&self) -> bool {
        self.id.is_dir()
    }

    pub fn is_symlink(&self) -> bool {
        self.id.is_symlink()
    }

    /// Logical size of a regular file
    pub fn file_size(&self) -> Result<u64, SquashError> {
        match &self.inner {
            InodeInner::BasicFile(file) => Ok(u64::from(file.file_size)),
            InodeInner::ExtendedFile(file) => Ok(file.file_size),
            _ => Err(SquashError::NotAFile),
        }
    }

    pub fn symlink_target(&self) -> Option<&[u8]> {
        match &self.inner {
            InodeInner::BasicSymlink(link) | InodeInner::ExtendedSymlink(link) => {
                Some(&link.target_path)
            }
            _ => None,
        }
    }

    pub(crate) fn as_file(&self) -> Option<FileView<'_>> {
        match &self.inner {
            InodeInner::BasicFile(file) => Some(FileView {
                blocks_start: u64::from(file.blocks_start),
                frag_index: file.frag_index,
                block_offset: file.block_offset,
                file_size: u64::from(file.file_size),
                block_sizes: &file.block_sizes,
            }),
            InodeInner::ExtendedFile(file) => Some(FileView {
                blocks_start: file.blocks_start,
                frag_index: file.frag_index,
                block_offset: file.block_offset,
                file_size: file.file_size,
                block_sizes: &file.block_sizes,
            }),
            _ => None,
        }
    }

    pub(crate) fn as_dir(&self) -> Option<DirView> {
        match &self.inner {
            InodeInner::BasicDirectory(dir) => Some(DirView {
                block_index: dir.block_index,
                block_offset: dir.block_offset,
                file_size: u32::from(dir.file_size),
            }),
            InodeInner::ExtendedDirectory(dir) => Some(DirView {
                block_index: dir.block_index,
                block_offset: dir.block_offset,
                file_size: dir.file_size,
            }),
            _ => None,
        }
    }
}

/// Parse one fixed-size record out of the metastream
fn record<R, T, const N: usize>(stream: &mut MetaStream<'_, R>) -> Result<T, SquashError>
where
    R: Read + Seek,
    T: for<'a> DekuContainerRead<'a>,
{
    let mut buf = [0u8; N];
    stream.read_exact(&mut buf)?;
    let (_, value) = T::from_bytes((&buf[..], 0))?;
    Ok(value)
}

/// Block-list length of a regular file. A file that fits entirely inside
/// its fragment has no block list; a fragment holding a partial tail
/// removes the final entry.
fn block_count(block_size: u32, block_log: u16, frag_index: u32, file_size: u64) -> u64 {
    let block_size = u64::from(block_size);
    if frag_index != NO_FRAGMENT && file_size <= block_size {
        return 0;
    }
    let mut blocks = (file_size + block_size - 1) >> block_log;
    if frag_index != NO_FRAGMENT && file_size % block_size != 0 {
        blocks -= 1;
    }
    blocks
}

fn read_block_sizes<R: Read + Seek>(
    stream: &mut MetaStream<'_, R>,
    blocks: u64,
) -> Result<Vec<DataSize>, SquashError> {
    let len = blocks
        .checked_mul(4)
        .and_then(|len| usize::try_from(len).ok())
        .ok_or(SquashError::InvalidInode)?;
    let raw = stream.read_vec(len)?;
    Ok(raw
        .chunks_exact(4)
        .map(|chunk| DataSize(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])))
        .collect())
}

fn read_symlink<R: Read + Seek>(
    stream: &mut MetaStream<'_, R>,
) -> Result<BasicSymlink, SquashError> {
    let mut link: BasicSymlink = record::<_, _, 8>(stream)?;
    link.target_path = stream.read_vec(link.target_size as usize)?;
    Ok(link)
}

impl Inode {
    /// Decode the inode at the current metastream position. Variant tails
    /// (block lists, symlink targets) may span further metadata blocks.
    pub(crate) fn read<R: Read + Seek>(
        stream: &mut MetaStream<'_, R>,
        superblock: &SuperBlock,
    ) -> Result<Inode, SquashError> {
        let mut type_code = [0u8; 2];
        stream.read_exact(&mut type_code)?;
        let id = InodeId::from_u16(u16::from_le_bytes(type_code)).ok_or(SquashError::InvalidInode)?;
        let header: InodeHeader = record::<_, _, 14>(stream)?;
        trace!("inode {}: {id:?}", header.inode_number);

        let inner = match id {
            InodeId::BasicDirectory => InodeInner::BasicDirectory(record::<_, _, 16>(stream)?),
            InodeId::ExtendedDirectory => InodeInner::ExtendedDirectory(record::<_, _, 24>(stream)?),
            InodeId::BasicFile => {
                let mut file: BasicFile = record::<_, _, 16>(stream)?;
                if file.frag_index != NO_FRAGMENT && file.frag_index >= superblock.frag_count {
                    return Err(SquashError::InvalidInode);
                }
                if u64::from(file.blocks_start) >= superblock.bytes_used {
                    return Err(SquashError::InvalidInode);
                }
                let blocks = block_count(
                    superblock.block_size,
                    superblock.block_log,
                    file.frag_index,
                    u64::from(file.file_size),
                );
                file.block_sizes = read_block_sizes(stream, blocks)?;
                InodeInner::BasicFile(file)
            }
            InodeId::ExtendedFile => {
                let mut file: ExtendedFile = record::<_, _, 40>(stream)?;
                if file.frag_index != NO_FRAGMENT && file.frag_index >= superblock.frag_count {
                    return Err(SquashError::InvalidInode);
                }
                if file.blocks_start >= superblock.bytes_used {
                    return Err(SquashError::InvalidInode);
                }
                let blocks = block_count(
                    superblock.block_size,
                    superblock.block_log,
                    file.frag_index,
                    file.file_size,
                );
                file.block_sizes = read_block_sizes(stream, blocks)?;
                InodeInner::ExtendedFile(file)
            }
            InodeId::BasicSymlink => InodeInner::BasicSymlink(read_symlink(stream)?),
            // the trailing xattr index of an extended symlink is not read
            InodeId::ExtendedSymlink => InodeInner::ExtendedSymlink(read_symlink(stream)?),
            InodeId::BasicBlockDevice => InodeInner::BasicBlockDevice(record::<_, _, 8>(stream)?),
            InodeId::BasicCharacterDevice => {
                InodeInner::BasicCharacterDevice(record::<_, _, 8>(stream)?)
            }
            InodeId::BasicFifo => InodeInner::BasicFifo(record::<_, _, 4>(stream)?),
            InodeId::BasicSocket => InodeInner::BasicSocket(record::<_, _, 4>(stream)?),
            InodeId::ExtendedBlockDevice => {
                InodeInner::ExtendedBlockDevice(record::<_, _, 12>(stream)?)
            }
            InodeId::ExtendedCharacterDevice => {
                InodeInner::ExtendedCharacterDevice(record::<_, _, 12>(stream)?)
            }
            InodeId::ExtendedFifo => InodeInner::ExtendedFifo(record::<_, _, 8>(stream)?),
            InodeId::ExtendedSocket => InodeInner::ExtendedSocket(record::<_, _, 8>(stream)?),
        };

        Ok(Inode { id, header, inner })
    }
}
