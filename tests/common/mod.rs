//! In-memory image assembly for the integration tests.
//!
//! Images are laid out as: superblock, data region (blocks + fragment
//! blocks), inode table, directory table, fragment table blocks + index,
//! optional export table. Metadata streams are chunked into 8 KiB blocks,
//! so inode references can be derived from plain stream offsets.

#![allow(dead_code)]

use std::io::Write;

use deku::DekuContainerWrite;
use libsquash::{
    BasicDirectory, BasicFile, BasicSymlink, DataSize, DirEntryHeader, DirHeader, Fragment, Inode,
    InodeHeader, InodeId, InodeRef, SuperBlock, MAGIC, NOT_SET,
};

pub const BLOCK_SIZE: u32 = 0x1000;
pub const BLOCK_LOG: u16 = 12;

const META_CHUNK: usize = 8192;
const SUPERBLOCK_LEN: usize = 96;

/// Raw deflate, as stored in gzip-compressed images
pub fn deflate(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// One metadata block storing `payload` uncompressed (bit 15 set)
pub fn metablock_uncompressed(payload: &[u8]) -> Vec<u8> {
    assert!(!payload.is_empty() && payload.len() <= META_CHUNK);
    let mut out = ((payload.len() as u16) | 0x8000).to_le_bytes().to_vec();
    out.extend_from_slice(payload);
    out
}

/// One metadata block storing `payload` deflate-compressed
pub fn metablock_deflate(payload: &[u8]) -> Vec<u8> {
    let compressed = deflate(payload);
    assert!(compressed.len() <= META_CHUNK);
    let mut out = (compressed.len() as u16).to_le_bytes().to_vec();
    out.extend_from_slice(&compressed);
    out
}

/// Chunk a metadata stream into successive blocks
fn pack_metadata(stream: &[u8], compress: bool) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in stream.chunks(META_CHUNK) {
        if compress {
            out.extend_from_slice(&metablock_deflate(chunk));
        } else {
            out.extend_from_slice(&metablock_uncompressed(chunk));
        }
    }
    out
}

/// Inode reference for a record starting at `stream_offset` in the inode
/// stream. Valid for uncompressed packing, where every full block occupies
/// `2 + 8192` bytes on disk, and for any single-block stream.
fn ref_for_offset(stream_offset: usize) -> InodeRef {
    let block_index = stream_offset / META_CHUNK;
    InodeRef::new(
        (block_index * (2 + META_CHUNK)) as u64,
        (stream_offset % META_CHUNK) as u16,
    )
}

pub fn header(inode_number: u32) -> InodeHeader {
    InodeHeader {
        permissions: 0o644,
        uid: 0,
        gid: 0,
        mtime: 0x5f00_0000,
        inode_number,
    }
}

/// Serialized basic directory inode record
pub fn dir_inode(
    inode_number: u32,
    listing_len: u32,
    block_index: u32,
    block_offset: u16,
    parent_inode: u32,
) -> Vec<u8> {
    let mut out = InodeId::BasicDirectory.to_bytes().unwrap();
    out.extend(header(inode_number).to_bytes().unwrap());
    out.extend(
        BasicDirectory {
            block_index,
            link_count: 2,
            // on-disk size counts the 3 virtual bytes for "." and ".."
            file_size: (listing_len + 3) as u16,
            block_offset,
            parent_inode,
        }
        .to_bytes()
        .unwrap(),
    );
    out
}

/// Serialized basic file inode record plus its block list
pub fn file_inode(
    inode_number: u32,
    blocks_start: u32,
    frag_index: u32,
    frag_offset: u32,
    file_size: u32,
    block_sizes: &[DataSize],
) -> Vec<u8> {
    let mut out = InodeId::BasicFile.to_bytes().unwrap();
    out.extend(header(inode_number).to_bytes().unwrap());
    out.extend(
        BasicFile {
            blocks_start,
            frag_index,
            block_offset: frag_offset,
            file_size,
            block_sizes: vec![],
        }
        .to_bytes()
        .unwrap(),
    );
    for size in block_sizes {
        out.extend(size.to_bytes().unwrap());
    }
    out
}

/// Serialized extended file inode record plus its block list
pub fn ext_file_inode(
    inode_number: u32,
    blocks_start: u64,
    frag_index: u32,
    frag_offset: u32,
    file_size: u64,
    block_sizes: &[DataSize],
) -> Vec<u8> {
    let mut out = InodeId::ExtendedFile.to_bytes().unwrap();
    out.extend(header(inode_number).to_bytes().unwrap());
    out.extend(
        libsquash::ExtendedFile {
            blocks_start,
            file_size,
            sparse: 0,
            link_count: 1,
            frag_index,
            block_offset: frag_offset,
            xattr_index: 0,
            block_sizes: vec![],
        }
        .to_bytes()
        .unwrap(),
    );
    for size in block_sizes {
        out.extend(size.to_bytes().unwrap());
    }
    out
}

/// Serialized symlink inode record
pub fn symlink_inode(inode_number: u32, target: &[u8]) -> Vec<u8> {
    let mut out = InodeId::BasicSymlink.to_bytes().unwrap();
    out.extend(header(inode_number).to_bytes().unwrap());
    out.extend(
        BasicSymlink {
            link_count: 1,
            target_size: target.len() as u32,
            target_path: vec![],
        }
        .to_bytes()
        .unwrap(),
    );
    out.extend_from_slice(target);
    out
}

/// One listing entry to serialize
pub struct Entry<'a> {
    pub inode_ref: InodeRef,
    pub inode_number: u32,
    pub t: u16,
    pub name: &'a [u8],
}

/// Serialize a listing: groups of at most 256 entries, each headed by the
/// shared inode block offset and a base inode number.
pub fn listing(base_inode: u32, entries: &[Entry<'_>]) -> Vec<u8> {
    let mut out = Vec::new();
    for group in entries.chunks(256) {
        let start = group[0].inode_ref.block_start() as u32;
        let dir_header = DirHeader {
            count: (group.len() - 1) as u32,
            start,
            inode_num: base_inode,
        };
        out.extend(dir_header.to_bytes().unwrap());
        for entry in group {
            assert_eq!(entry.inode_ref.block_start() as u32, start);
            let entry_header = DirEntryHeader {
                offset: entry.inode_ref.offset(),
                inode_offset: (entry.inode_number as i64 - i64::from(base_inode)) as i16,
                t: entry.t,
                name_size: (entry.name.len() - 1) as u16,
            };
            out.extend(entry_header.to_bytes().unwrap());
            out.extend_from_slice(entry.name);
        }
    }
    out
}

#[derive(Default)]
pub struct ImageBuilder {
    data: Vec<u8>,
    inode_stream: Vec<u8>,
    dir_stream: Vec<u8>,
    fragments: Vec<Fragment>,
    inode_refs: Vec<u64>,
    /// deflate-compress metadata blocks; keep streams within one block
    /// when set, since multi-block references assume uncompressed packing
    pub compress_metadata: bool,
    /// emit an export table holding every inode reference
    pub with_export_table: bool,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes to the data region, returning their absolute offset
    pub fn add_data(&mut self, bytes: &[u8]) -> u64 {
        let offset = (SUPERBLOCK_LEN + self.data.len()) as u64;
        self.data.extend_from_slice(bytes);
        offset
    }

    /// Append one data block holding `content` as-is
    pub fn add_block_uncompressed(&mut self, content: &[u8]) -> (u64, DataSize) {
        let offset = self.add_data(content);
        (offset, DataSize::new_uncompressed(content.len() as u32))
    }

    /// Append one deflate-compressed data block of `content`
    pub fn add_block_deflate(&mut self, content: &[u8]) -> (u64, DataSize) {
        let compressed = deflate(content);
        let offset = self.add_data(&compressed);
        (offset, DataSize::new_compressed(compressed.len() as u32))
    }

    /// Append a fragment block and its table entry, returning the fragment
    /// index
    pub fn add_fragment(&mut self, content: &[u8], compress: bool) -> u32 {
        let (start, size) = if compress {
            self.add_block_deflate(content)
        } else {
            self.add_block_uncompressed(content)
        };
        self.fragments.push(Fragment {
            start,
            size: size.0,
            unused: 0,
        });
        (self.fragments.len() - 1) as u32
    }

    /// Append one inode record to the inode stream
    pub fn add_inode(&mut self, record: &[u8]) -> InodeRef {
        let inode_ref = ref_for_offset(self.inode_stream.len());
        self.inode_stream.extend_from_slice(record);
        self.inode_refs.push(inode_ref.0);
        inode_ref
    }

    /// Append a listing to the directory stream, returning the
    /// `(block_index, block_offset)` pair a directory inode stores
    pub fn add_listing(&mut self, listing: &[u8]) -> (u32, u16) {
        let offset = self.dir_stream.len();
        let block_index = (offset / META_CHUNK) * (2 + META_CHUNK);
        self.dir_stream.extend_from_slice(listing);
        (block_index as u32, (offset % META_CHUNK) as u16)
    }

    /// Assemble the image with `root` as the root directory reference
    pub fn build(mut self, root: InodeRef) -> Vec<u8> {
        // an empty directory table would put the table pointer at the end
        // of the image; keep one placeholder block so offsets stay in
        // bounds
        if self.dir_stream.is_empty() {
            self.dir_stream.push(0);
        }

        let mut image = vec![0u8; SUPERBLOCK_LEN];
        image.extend_from_slice(&self.data);

        let inode_table = image.len() as u64;
        image.extend(pack_metadata(&self.inode_stream, self.compress_metadata));

        let dir_table = image.len() as u64;
        image.extend(pack_metadata(&self.dir_stream, self.compress_metadata));

        let frag_table = if self.fragments.is_empty() {
            NOT_SET
        } else {
            let mut entries = Vec::new();
            for fragment in &self.fragments {
                entries.extend(fragment.to_bytes().unwrap());
            }
            let mut block_starts = Vec::new();
            for chunk in entries.chunks(META_CHUNK) {
                block_starts.push(image.len() as u64);
                image.extend(metablock_uncompressed(chunk));
            }
            let index_start = image.len() as u64;
            for start in block_starts {
                image.extend(start.to_le_bytes());
            }
            index_start
        };

        let export_table = if self.with_export_table {
            let mut entries = Vec::new();
            for inode_ref in &self.inode_refs {
                entries.extend(inode_ref.to_le_bytes());
            }
            let mut block_starts = Vec::new();
            for chunk in entries.chunks(META_CHUNK) {
                block_starts.push(image.len() as u64);
                image.extend(metablock_uncompressed(chunk));
            }
            let index_start = image.len() as u64;
            for start in block_starts {
                image.extend(start.to_le_bytes());
            }
            index_start
        } else {
            NOT_SET
        };

        let superblock = SuperBlock {
            magic: MAGIC,
            inode_count: self.inode_refs.len() as u32,
            mod_time: 0,
            block_size: BLOCK_SIZE,
            frag_count: self.fragments.len() as u32,
            compression: 1,
            block_log: BLOCK_LOG,
            flags: 0,
            id_count: 0,
            version_major: 4,
            version_minor: 0,
            root_inode: root.0,
            bytes_used: image.len() as u64,
            id_table: NOT_SET,
            xattr_table: NOT_SET,
            inode_table,
            dir_table,
            frag_table,
            export_table,
        };
        image[..SUPERBLOCK_LEN].copy_from_slice(&superblock.to_bytes().unwrap());
        image
    }
}

/// Deterministic pseudo-random file content
pub fn test_bytes(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            (state >> 24) as u8
        })
        .collect()
}

/// Open a built image directly from memory
pub fn open(image: Vec<u8>) -> libsquash::SquashFs<std::io::Cursor<Vec<u8>>> {
    libsquash::SquashFs::from_reader(std::io::Cursor::new(image)).unwrap()
}

/// Shorthand: resolve a path and read the inode behind it
pub fn inode_at(
    fs: &libsquash::SquashFs<std::io::Cursor<Vec<u8>>>,
    path: &str,
) -> Inode {
    let inode_ref = fs.lookup_path(path).unwrap();
    fs.read_inode(inode_ref).unwrap()
}
