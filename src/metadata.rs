//! Metadata block framing and the metastream cursor

use std::cell::RefCell;
use std::io::{Read, Seek, SeekFrom};

use tracing::trace;

use crate::compressor::{self, Compressor};
use crate::error::SquashError;

/// Maximum decompressed size of a single metadata block
pub const METADATA_MAXSIZE: usize = 0x2000;

const METADATA_UNCOMPRESSED: u16 = 1 << 15;

/// Check is_compressed bit within raw `len`
pub fn is_compressed(len: u16) -> bool {
    len & METADATA_UNCOMPRESSED == 0
}

/// Get actual length of `data` following `len` from unedited `len`
pub fn len(len: u16) -> u16 {
    len & !(METADATA_UNCOMPRESSED)
}

pub fn set_if_uncompressed(len: u16) -> u16 {
    len | METADATA_UNCOMPRESSED
}

/// Read one metadata block at `offset`, returning the decompressed payload
/// and the on-disk compressed payload length.
pub(crate) fn read_block<R: Read + Seek>(
    reader: &mut R,
    compressor: Compressor,
    offset: u64,
    bytes_used: u64,
) -> Result<(Vec<u8>, u16), SquashError> {
    if offset >= bytes_used {
        return Err(SquashError::InvalidBlock);
    }
    reader.seek(SeekFrom::Start(offset))?;

    let mut header = [0u8; 2];
    reader.read_exact(&mut header)?;
    let header = u16::from_le_bytes(header);

    let byte_len = len(header);
    trace!("block at {offset:#x}: len {byte_len:#x}");
    if byte_len == 0
        || usize::from(byte_len) > METADATA_MAXSIZE
        || offset + 2 + u64::from(byte_len) > bytes_used
    {
        return Err(SquashError::InvalidBlock);
    }

    let mut buf = vec![0u8; byte_len.into()];
    reader.read_exact(&mut buf)?;

    let bytes = if is_compressed(header) {
        let mut out = Vec::with_capacity(METADATA_MAXSIZE);
        compressor::decompress(&buf, &mut out, METADATA_MAXSIZE, compressor)?;
        out
    } else {
        buf
    };

    if bytes.is_empty() {
        return Err(SquashError::DecompressionFailed);
    }
    Ok((bytes, byte_len))
}

/// Cursor over the concatenation of metadata blocks.
///
/// Records of unknown length (inode tails, directory listings) may straddle
/// any number of 8 KiB blocks; this reader hands out exactly the bytes asked
/// for and loads successor blocks on demand, so record decoders stay
/// straight-line code.
pub(crate) struct MetaStream<'a, R: Read + Seek> {
    reader: &'a RefCell<R>,
    compressor: Compressor,
    bytes_used: u64,
    /// first offset past the caller's table region; every block must
    /// start before it
    region_end: u64,
    /// absolute offset of the next block to load
    next_block: u64,
    data: Vec<u8>,
    pos: usize,
}

impl<'a, R: Read + Seek> MetaStream<'a, R> {
    /// Start a cursor at byte `offset` inside the decompressed payload of
    /// the metadata block found at absolute position `block_start`.
    /// Successor blocks are loaded only while they start inside
    /// `[block_start, region_end)`; the caller picks the bound for its
    /// table region.
    pub fn new(
        reader: &'a RefCell<R>,
        compressor: Compressor,
        bytes_used: u64,
        region_end: u64,
        block_start: u64,
        offset: u16,
    ) -> Self {
        Self {
            reader,
            compressor,
            bytes_used,
            region_end,
            next_block: block_start,
            data: Vec::new(),
            pos: offset.into(),
        }
    }

    fn load_next(&mut self) -> Result<(), SquashError> {
        if self.next_block >= self.region_end {
            return Err(SquashError::InvalidBlock);
        }
        let mut reader = self.reader.borrow_mut();
        let (data, compressed_len) = read_block(
            &mut *reader,
            self.compressor,
            self.next_block,
            self.bytes_used,
        )?;
        self.next_block += 2 + u64::from(compressed_len);
        self.data = data;
        Ok(())
    }

    /// Yield exactly `out.len()` bytes from the stream.
    pub fn read_exact(&mut self, out: &mut [u8]) -> Result<(), SquashError> {
        let mut filled = 0;
        while filled < out.len() {
            if self.data.is_empty() {
                // first block: `pos` is the offset taken from an inode
                // reference and must land inside the decompressed payload
                self.load_next()?;
                if self.pos >= self.data.len() {
                    return Err(SquashError::InvalidBlock);
                }
            } else if self.pos >= self.data.len() {
                self.load_next()?;
                self.pos = 0;
            }

            let avail = self.data.len() - self.pos;
            let n = (out.len() - filled).min(avail);
            out[filled..filled + n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            filled += n;
            self.pos += n;
        }
        Ok(())
    }

    /// Yield exactly `n` bytes as an owned buffer.
    ///
    /// Reads in block-sized chunks so a corrupt record length cannot force
    /// an allocation larger than what the stream can actually produce.
    pub fn read_vec(&mut self, n: usize) -> Result<Vec<u8>, SquashError> {
        let mut out = Vec::new();
        out.try_reserve(n.min(METADATA_MAXSIZE))?;

        let mut chunk = [0u8; METADATA_MAXSIZE];
        let mut remaining = n;
        while remaining > 0 {
            let take = remaining.min(METADATA_MAXSIZE);
            self.read_exact(&mut chunk[..take])?;
            out.try_reserve(take)?;
            out.extend_from_slice(&chunk[..take]);
            remaining -= take;
        }
        Ok(out)
    }
}
