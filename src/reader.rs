//! Reader traits and table extraction

use std::io::{Read, Seek, SeekFrom};

use deku::prelude::*;
use tracing::{instrument, trace};

use crate::compressor::Compressor;
use crate::error::SquashError;
use crate::fragment::{Fragment, FRAGMENT_SIZE};
use crate::metadata::{self, METADATA_MAXSIZE};
use crate::superblock::{SuperBlock, NOT_SET};

/// Table extraction over the backing reader, used once while opening an
/// image
pub(crate) trait SquashFsReader: Read + Seek + Sized {
    /// Parse the fragment table: an array of u64 pointers to metadata
    /// blocks holding packed [`Fragment`] records.
    #[instrument(skip_all)]
    fn fragments(
        &mut self,
        superblock: &SuperBlock,
        compressor: Compressor,
    ) -> Result<Vec<Fragment>, SquashError> {
        if superblock.frag_count == 0 || superblock.frag_table == NOT_SET {
            return Ok(vec![]);
        }

        let size = u64::from(superblock.frag_count) * FRAGMENT_SIZE as u64;
        let bytes = self.lookup_table(superblock, compressor, superblock.frag_table, size)?;

        let count = superblock.frag_count as usize;
        let mut table = Vec::with_capacity(count);
        let mut rest = bytes.as_slice();
        while table.len() < count {
            let ((next, _), fragment) = Fragment::from_bytes((rest, 0))
                .map_err(|_| SquashError::CorruptedOrInvalidSquashfs)?;
            table.push(fragment);
            rest = next;
        }
        trace!("{} fragment entries", table.len());
        Ok(table)
    }

    /// Parse the inode lookup (export) table if present. The table is an
    /// optimization, so out-of-range pointers make it ignored (`None`)
    /// rather than failing the open.
    #[instrument(skip_all)]
    fn inode_lookup_table(
        &mut self,
        superblock: &SuperBlock,
        compressor: Compressor,
    ) -> Result<Option<Vec<u64>>, SquashError> {
        if superblock.export_table == NOT_SET
            || superblock.export_table >= superblock.bytes_used
            || superblock.inode_count == 0
        {
            return Ok(None);
        }

        let size = u64::from(superblock.inode_count) * 8;
        let block_count = size.div_ceil(METADATA_MAXSIZE as u64);

        self.seek(SeekFrom::Start(superblock.export_table))?;
        let mut pointers = Vec::with_capacity(block_count as usize);
        for _ in 0..block_count {
            let mut buf = [0u8; 8];
            self.read_exact(&mut buf)?;
            pointers.push(u64::from_le_bytes(buf));
        }

        for &pointer in &pointers {
            if pointer < superblock.inode_table || pointer >= superblock.bytes_used {
                trace!("lookup table pointer {pointer:#x} out of range, ignoring table");
                return Ok(None);
            }
        }

        let mut bytes = Vec::new();
        for pointer in pointers {
            let (mut block, _) =
                metadata::read_block(self, compressor, pointer, superblock.bytes_used)?;
            bytes.append(&mut block);
        }

        let mut table = Vec::with_capacity(superblock.inode_count as usize);
        for chunk in bytes.chunks_exact(8) {
            if table.len() == superblock.inode_count as usize {
                break;
            }
            table.push(u64::from_le_bytes([
                chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6], chunk[7],
            ]));
        }
        if table.len() < superblock.inode_count as usize {
            return Err(SquashError::CorruptedOrInvalidSquashfs);
        }
        Ok(Some(table))
    }

    /// Read `size` logical bytes of a lookup table: `ceil(size / 8192)`
    /// u64 block pointers at `seek`, each naming one metadata block.
    #[instrument(skip_all)]
    fn lookup_table(
        &mut self,
        superblock: &SuperBlock,
        compressor: Compressor,
        seek: u64,
        size: u64,
    ) -> Result<Vec<u8>, SquashError> {
        let block_count = size.div_ceil(METADATA_MAXSIZE as u64);
        trace!("lookup table at {seek:#x}: {size:#x} bytes, {block_count} blocks");

        self.seek(SeekFrom::Start(seek))?;
        let mut pointers = Vec::with_capacity(block_count as usize);
        for _ in 0..block_count {
            let mut buf = [0u8; 8];
            self.read_exact(&mut buf)?;
            pointers.push(u64::from_le_bytes(buf));
        }

        let mut bytes = Vec::new();
        for pointer in pointers {
            let (mut block, _) =
                metadata::read_block(self, compressor, pointer, superblock.bytes_used)?;
            bytes.append(&mut block);
        }
        Ok(bytes)
    }
}

impl<T: Read + Seek> SquashFsReader for T {}
