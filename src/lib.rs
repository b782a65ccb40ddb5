#![doc = include_str!("../README.md")]

pub mod compressor;
mod data;
mod dir;
pub mod error;
mod extract;
mod fragment;
mod inode;
mod metadata;
mod path;
mod reader;
mod squashfs;
mod superblock;

pub use crate::compressor::{compression_name, Compressor};
pub use crate::data::DataSize;
pub use crate::dir::{Dir, DirEntry, DirEntryHeader, DirHeader};
pub use crate::error::SquashError;
pub use crate::fragment::Fragment;
pub use crate::inode::{
    BasicDeviceSpecialFile, BasicDirectory, BasicFile, BasicIpc, BasicSymlink,
    ExtendedDeviceSpecialFile, ExtendedDirectory, ExtendedFile, ExtendedIpc, Inode, InodeHeader,
    InodeId, InodeInner, InodeRef, NO_FRAGMENT,
};
pub use crate::metadata::METADATA_MAXSIZE;
pub use crate::squashfs::SquashFs;
pub use crate::superblock::{Flags, SuperBlock, MAGIC, NOT_SET};
