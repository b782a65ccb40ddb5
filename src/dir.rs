//! Directory listings

use std::borrow::Cow;
use std::io::{Read, Seek};

use deku::prelude::*;
use tracing::trace;

use crate::error::SquashError;
use crate::inode::{InodeId, InodeRef};
use crate::metadata::MetaStream;

/// 12-byte header starting a run of entries that share an inode block
#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq)]
#[deku(endian = "little")]
pub struct DirHeader {
    /// One less than the number of entries following
    pub count: u32,
    /// Byte offset of the shared inode metadata block, relative to the
    /// start of the inode table
    pub start: u32,
    /// Base inode number the entries' deltas are applied to
    pub inode_num: u32,
}

/// Fixed part of one entry, followed by `name_size + 1` name bytes
#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq)]
#[deku(endian = "little")]
pub struct DirEntryHeader {
    /// Byte offset of the inode inside the shared metadata block
    pub offset: u16,
    pub inode_offset: i16,
    pub t: u16,
    /// One less than the name length in bytes
    pub name_size: u16,
}

/// One decoded directory entry, owning its name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub inode_ref: InodeRef,
    pub inode_number: u32,
    pub kind: InodeId,
    pub name: Vec<u8>,
}

impl DirEntry {
    /// Entry name for display. Names are raw bytes on disk; invalid UTF-8
    /// is replaced.
    pub fn name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }
}

/// A fully materialized directory listing, in on-disk order.
///
/// All entries are decoded when the directory is opened; iteration is
/// stable across repeated passes. Entries own their storage, independent
/// of the listing they came from.
#[derive(Debug, Clone, Default)]
pub struct Dir {
    entries: Vec<DirEntry>,
}

impl Dir {
    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DirEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for Dir {
    type Item = DirEntry;
    type IntoIter = std::vec::IntoIter<DirEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Dir {
    type Item = &'a DirEntry;
    type IntoIter = std::slice::Iter<'a, DirEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

const HEADER_LEN: u64 = 12;
const ENTRY_LEN: u64 = 8;

/// Decode a listing of `file_size` logical bytes from the metastream.
///
/// The listing is a sequence of groups: a [`DirHeader`] followed by
/// `count + 1` entries. The trailing virtual bytes for "." and ".." leave
/// `file_size` slightly larger than the stored data, so every read is
/// gated on the bytes still owed to the listing and a short remainder
/// ends it cleanly.
pub(crate) fn read_dir<R: Read + Seek>(
    stream: &mut MetaStream<'_, R>,
    file_size: u32,
) -> Result<Dir, SquashError> {
    let mut entries = Vec::new();
    let mut remaining = u64::from(file_size);

    while remaining >= HEADER_LEN {
        let mut buf = [0u8; HEADER_LEN as usize];
        stream.read_exact(&mut buf)?;
        let (_, header) = DirHeader::from_bytes((&buf[..], 0))?;
        remaining -= HEADER_LEN;
        trace!(
            "group: {} entries, inode block {:#x}, base {}",
            u64::from(header.count) + 1,
            header.start,
            header.inode_num
        );

        for _ in 0..=u64::from(header.count) {
            if remaining < ENTRY_LEN {
                break;
            }
            let mut buf = [0u8; ENTRY_LEN as usize];
            stream.read_exact(&mut buf)?;
            let (_, entry) = DirEntryHeader::from_bytes((&buf[..], 0))?;
            remaining -= ENTRY_LEN;

            let kind =
                InodeId::from_u16(entry.t).ok_or(SquashError::CorruptedOrInvalidSquashfs)?;
            let name_size = usize::from(entry.name_size) + 1;
            if name_size > 256 {
                return Err(SquashError::CorruptedOrInvalidSquashfs);
            }
            if remaining < name_size as u64 {
                break;
            }
            let name = stream.read_vec(name_size)?;
            remaining -= name_size as u64;

            // "." and ".." are not stored in well-formed listings
            if name == b"." || name == b".." {
                continue;
            }

            let inode_number = (i64::from(header.inode_num) + i64::from(entry.inode_offset)) as u32;
            entries.push(DirEntry {
                inode_ref: InodeRef::new(u64::from(header.start), entry.offset),
                inode_number,
                kind,
                name,
            });
        }
    }

    Ok(Dir { entries })
}
