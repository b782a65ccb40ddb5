//! Types of supported compression algorithms

#[cfg(any(feature = "gzip", feature = "xz"))]
use std::io::Read;

use tracing::instrument;

use crate::error::SquashError;

/// Compressor id stored in the superblock
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u16)]
#[rustfmt::skip]
pub enum Compressor {
    Gzip = 1,
    Lzma = 2,
    Lzo =  3,
    Xz =   4,
    Lz4 =  5,
    Zstd = 6,
}

impl Compressor {
    /// Map the on-disk compression id to a known compressor
    pub fn from_id(id: u16) -> Option<Self> {
        match id {
            1 => Some(Self::Gzip),
            2 => Some(Self::Lzma),
            3 => Some(Self::Lzo),
            4 => Some(Self::Xz),
            5 => Some(Self::Lz4),
            6 => Some(Self::Zstd),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Lzma => "lzma",
            Self::Lzo => "lzo",
            Self::Xz => "xz",
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
        }
    }
}

/// Human-readable name for an on-disk compression id
pub fn compression_name(id: u16) -> &'static str {
    match Compressor::from_id(id) {
        Some(compressor) => compressor.name(),
        None => "unknown",
    }
}

/// Using the current compressor from the superblock, decompress bytes
///
/// `out` receives at most `limit` bytes (`8192` for metadata blocks,
/// `block_size` for data blocks). Larger output is a hard failure.
#[instrument(skip_all)]
#[allow(unreachable_patterns, unused_variables)]
pub(crate) fn decompress(
    bytes: &[u8],
    out: &mut Vec<u8>,
    limit: usize,
    compressor: Compressor,
) -> Result<(), SquashError> {
    match compressor {
        #[cfg(feature = "gzip")]
        Compressor::Gzip => {
            // raw deflate, no zlib envelope
            let decoder = flate2::read::DeflateDecoder::new(bytes);
            decoder
                .take(limit as u64 + 1)
                .read_to_end(out)
                .map_err(|_| SquashError::DecompressionFailed)?;
        }
        #[cfg(feature = "xz")]
        Compressor::Lzma => {
            let stream = xz2::stream::Stream::new_lzma_decoder(u64::MAX)
                .map_err(|_| SquashError::DecompressionFailed)?;
            let decoder = xz2::read::XzDecoder::new_stream(bytes, stream);
            decoder
                .take(limit as u64 + 1)
                .read_to_end(out)
                .map_err(|_| SquashError::DecompressionFailed)?;
        }
        #[cfg(feature = "xz")]
        Compressor::Xz => {
            let stream = xz2::stream::Stream::new_auto_decoder(u64::MAX, 0)
                .map_err(|_| SquashError::DecompressionFailed)?;
            let decoder = xz2::read::XzDecoder::new_stream(bytes, stream);
            decoder
                .take(limit as u64 + 1)
                .read_to_end(out)
                .map_err(|_| SquashError::DecompressionFailed)?;
        }
        #[cfg(feature = "lzo")]
        Compressor::Lzo => {
            out.resize(limit, 0);
            let (out_slice, error) = rust_lzo::LZOContext::decompress_to_slice(bytes, out);
            let out_size = out_slice.len();
            out.truncate(out_size);
            if error != rust_lzo::LZOError::OK {
                return Err(SquashError::DecompressionFailed);
            }
        }
        #[cfg(feature = "lz4")]
        Compressor::Lz4 => {
            out.resize(limit, 0);
            let out_size = lz4_flex::decompress_into(bytes, out.as_mut_slice())
                .map_err(|_| SquashError::DecompressionFailed)?;
            out.truncate(out_size);
        }
        #[cfg(feature = "zstd")]
        Compressor::Zstd => {
            let mut decoder = zstd::bulk::Decompressor::new()
                .map_err(|_| SquashError::DecompressionFailed)?;
            out.reserve(limit);
            decoder
                .decompress_to_buffer(bytes, out)
                .map_err(|_| SquashError::DecompressionFailed)?;
        }
        _ => return Err(SquashError::CompressionNotSupported(compressor)),
    }

    if out.len() > limit {
        return Err(SquashError::DecompressionFailed);
    }
    Ok(())
}
