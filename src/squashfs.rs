//! Read-only handle over an image

use std::cell::RefCell;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use deku::prelude::*;
use tracing::{info, instrument, trace};

use crate::compressor::Compressor;
use crate::data;
use crate::dir::{self, Dir};
use crate::error::SquashError;
use crate::fragment::Fragment;
use crate::inode::{FileView, Inode, InodeRef, NO_FRAGMENT};
use crate::metadata::MetaStream;
use crate::reader::SquashFsReader;
use crate::superblock::SuperBlock;

/// An opened image.
///
/// Owns the backing reader for its whole lifetime; dropping the handle
/// releases it. Every read seeks the shared cursor, so a handle is not for
/// concurrent use — open the image once per thread instead.
pub struct SquashFs<R: Read + Seek> {
    superblock: SuperBlock,
    compressor: Compressor,
    fragments: Vec<Fragment>,
    lookup_table: Option<Vec<u64>>,
    reader: RefCell<R>,
}

impl SquashFs<BufReader<File>> {
    /// Open an image file
    #[instrument(skip_all)]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SquashError> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }
}

impl<R: Read + Seek> SquashFs<R> {
    /// Read and validate the superblock, then load the inode lookup and
    /// fragment tables.
    #[instrument(skip_all)]
    pub fn from_reader(mut reader: R) -> Result<Self, SquashError> {
        let mut raw_super = [0u8; 96];
        reader.seek(SeekFrom::Start(0))?;
        reader.read_exact(&mut raw_super)?;
        let (_, superblock) = SuperBlock::from_bytes((&raw_super[..], 0))?;
        trace!("{superblock:#x?}");
        superblock.validate()?;

        let compressor = Compressor::from_id(superblock.compression)
            .ok_or(SquashError::UnsupportedCompression(superblock.compression))?;

        info!("reading inode lookup table");
        let lookup_table = reader.inode_lookup_table(&superblock, compressor)?;
        info!("reading fragment table");
        let fragments = reader.fragments(&superblock, compressor)?;

        Ok(Self {
            superblock,
            compressor,
            fragments,
            lookup_table,
            reader: RefCell::new(reader),
        })
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.superblock
    }

    pub fn compressor(&self) -> Compressor {
        self.compressor
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Export table contents, when the image carries one
    pub fn inode_lookup_table(&self) -> Option<&[u64]> {
        self.lookup_table.as_deref()
    }

    pub fn root_inode_ref(&self) -> InodeRef {
        self.superblock.root_inode_ref()
    }

    pub fn root_inode(&self) -> Result<Inode, SquashError> {
        self.read_inode(self.root_inode_ref())
    }

    fn metastream(&self, block_start: u64, offset: u16, region_end: u64) -> MetaStream<'_, R> {
        MetaStream::new(
            &self.reader,
            self.compressor,
            self.superblock.bytes_used,
            region_end,
            block_start,
            offset,
        )
    }

    /// Decode the inode behind `inode_ref` into an owned value
    #[instrument(skip_all)]
    pub fn read_inode(&self, inode_ref: InodeRef) -> Result<Inode, SquashError> {
        // dir_table > inode_table was checked when the superblock was
        // validated
        let inode_region = self.superblock.dir_table - self.superblock.inode_table;
        if inode_ref.block_start() >= inode_region {
            return Err(SquashError::InvalidInode);
        }

        // variant tails may pull successor blocks, but never past the
        // end of the inode table
        let mut stream = self.metastream(
            self.superblock.inode_table + inode_ref.block_start(),
            inode_ref.offset(),
            self.superblock.dir_table,
        );
        Inode::read(&mut stream, &self.superblock)
    }

    /// Materialize the listing of a directory inode, in on-disk order
    #[instrument(skip_all)]
    pub fn opendir(&self, inode: &Inode) -> Result<Dir, SquashError> {
        let dir = inode.as_dir().ok_or(SquashError::NotADirectory)?;
        let base = self.superblock.dir_table + u64::from(dir.block_index);
        if base >= self.superblock.bytes_used {
            return Err(SquashError::CorruptedOrInvalidSquashfs);
        }
        trace!(
            "listing at {base:#x}+{:#x}, {} bytes",
            dir.block_offset,
            dir.file_size
        );

        let mut stream = self.metastream(base, dir.block_offset, self.superblock.bytes_used);
        dir::read_dir(&mut stream, dir.file_size)
    }

    /// Copy up to `buf.len()` bytes of a regular file starting at byte
    /// `offset`, returning the number of bytes copied. Reads past the end
    /// of the file return 0.
    #[instrument(skip_all)]
    pub fn read_file(
        &self,
        inode: &Inode,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize, SquashError> {
        let file = inode.as_file().ok_or(SquashError::NotAFile)?;
        if offset >= file.file_size {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(file.file_size - offset) as usize;

        let block_size = u64::from(self.superblock.block_size);
        let nblocks = file.block_sizes.len();
        let has_fragment = file.frag_index != NO_FRAGMENT;
        let fragment_only = has_fragment && file.file_size <= block_size;

        let mut block_idx = (offset / block_size) as usize;
        let mut in_block = (offset % block_size) as usize;

        // absolute position of the first block touched
        let mut pos = file.blocks_start;
        for entry in file.block_sizes.iter().take(block_idx.min(nblocks)) {
            pos += u64::from(entry.size());
        }

        let mut filled = 0;
        while filled < want {
            let remaining = want - filled;
            if has_fragment && (fragment_only || block_idx >= nblocks) {
                filled += self.read_fragment_tail(&file, in_block, &mut buf[filled..want])?;
                break;
            } else if block_idx < nblocks {
                let entry = file.block_sizes[block_idx];
                let expected =
                    block_size.min(file.file_size - block_idx as u64 * block_size) as usize;

                if entry.is_sparse() {
                    // a full block of zeros, occupying no backing storage
                    let n = remaining.min(expected - in_block);
                    buf[filled..filled + n].fill(0);
                    filled += n;
                } else {
                    let data = {
                        let mut reader = self.reader.borrow_mut();
                        data::read_data_block(
                            &mut *reader,
                            &self.superblock,
                            self.compressor,
                            pos,
                            entry,
                        )?
                    };
                    if data.len() <= in_block {
                        return Err(SquashError::CorruptedOrInvalidSquashfs);
                    }
                    let n = (data.len() - in_block).min(remaining).min(expected);
                    buf[filled..filled + n].copy_from_slice(&data[in_block..in_block + n]);
                    filled += n;
                    pos += u64::from(entry.size());
                }
                block_idx += 1;
                in_block = 0;
            } else {
                return Err(SquashError::CorruptedOrInvalidSquashfs);
            }
        }

        if filled < want {
            return Err(SquashError::CorruptedOrInvalidSquashfs);
        }
        Ok(filled)
    }

    /// Whole-file convenience read
    pub fn read_file_to_end(&self, inode: &Inode) -> Result<Vec<u8>, SquashError> {
        let size = usize::try_from(inode.file_size()?)
            .map_err(|_| SquashError::CorruptedOrInvalidSquashfs)?;
        let mut out = Vec::new();
        out.try_reserve(size)?;
        out.resize(size, 0);
        let n = self.read_file(inode, 0, &mut out)?;
        out.truncate(n);
        Ok(out)
    }

    /// Copy from the fragment block holding this file's tail. `in_tail` is
    /// the byte position inside the tail where the read starts; it is only
    /// nonzero when the requested offset itself lands inside the tail.
    fn read_fragment_tail(
        &self,
        file: &FileView<'_>,
        in_tail: usize,
        out: &mut [u8],
    ) -> Result<usize, SquashError> {
        let fragment = self
            .fragments
            .get(file.frag_index as usize)
            .ok_or(SquashError::CorruptedOrInvalidSquashfs)?;
        trace!("fragment {}: {fragment:x?}", file.frag_index);

        let data = {
            let mut reader = self.reader.borrow_mut();
            data::read_data_block(
                &mut *reader,
                &self.superblock,
                self.compressor,
                fragment.start,
                fragment.data_size(),
            )?
        };

        let block_size = u64::from(self.superblock.block_size);
        let tail_len = if file.file_size <= block_size {
            file.file_size as usize
        } else {
            (file.file_size % block_size) as usize
        };
        if in_tail >= tail_len {
            return Err(SquashError::CorruptedOrInvalidSquashfs);
        }

        let start = file.block_offset as usize + in_tail;
        let n = (tail_len - in_tail).min(out.len());
        if data.len() < start + n {
            return Err(SquashError::CorruptedOrInvalidSquashfs);
        }
        out[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }
}
