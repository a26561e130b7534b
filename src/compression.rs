//! Compression framing for tile buffers.
//!
//! Tiles may arrive raw, gzip-framed, or zlib-framed; the framing is
//! detected from magic bytes, never guessed from context. Output
//! compression is opt-in through [`crate::options::GetDataOptions`].

use std::io::{Read, Write};

use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;

use crate::error::{Error, Result};
use crate::options::CompressionStrategy;

/// Returns true when `data` starts with the gzip magic bytes.
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() > 2 && data[0] == 0x1f && data[1] == 0x8b
}

/// Returns true when `data` starts with a zlib header.
///
/// A zlib header is a deflate CMF byte followed by a flag byte such that the
/// pair is a multiple of 31.
pub fn is_zlib(data: &[u8]) -> bool {
    data.len() > 2
        && (data[0] & 0x0f) == 0x08
        && (u16::from(data[0]) << 8 | u16::from(data[1])) % 31 == 0
}

/// Inflates gzip- or zlib-framed `data`; raw data is returned unchanged.
pub fn decompress_if_needed(data: &[u8]) -> Result<Vec<u8>> {
    if is_gzip(data) {
        let mut out = Vec::with_capacity(data.len() * 4);
        GzDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| Error::CorruptInput(format!("gzip inflate failed: {e}")))?;
        Ok(out)
    } else if is_zlib(data) {
        let mut out = Vec::with_capacity(data.len() * 4);
        ZlibDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| Error::CorruptInput(format!("zlib inflate failed: {e}")))?;
        Ok(out)
    } else {
        Ok(data.to_vec())
    }
}

/// Deflates `data` with gzip framing.
///
/// `level` must be in `0..=9`. The miniz backend accepts the strategy as an
/// advisory hint only; the produced stream is valid for every strategy.
pub fn gzip_compress(data: &[u8], level: u32, strategy: CompressionStrategy) -> Result<Vec<u8>> {
    let level = validate_level(level)?;
    log::trace!("gzip compress: {} bytes, level {level:?}, {strategy:?}", data.len());
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), level);
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Deflates `data` with zlib framing.
pub fn zlib_compress(data: &[u8], level: u32, strategy: CompressionStrategy) -> Result<Vec<u8>> {
    let level = validate_level(level)?;
    log::trace!("zlib compress: {} bytes, level {level:?}, {strategy:?}", data.len());
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), level);
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn validate_level(level: u32) -> Result<Compression> {
    if level > 9 {
        return Err(Error::InvalidArgument(format!(
            "compression level must be between 0 and 9, got {level}"
        )));
    }
    Ok(Compression::new(level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_gzip_magic() {
        let compressed = gzip_compress(b"hello tile", 6, CompressionStrategy::Default).unwrap();
        assert!(is_gzip(&compressed));
        assert!(!is_zlib(&compressed));
    }

    #[test]
    fn detects_zlib_header() {
        let compressed = zlib_compress(b"hello tile", 6, CompressionStrategy::Default).unwrap();
        assert!(is_zlib(&compressed));
        assert!(!is_gzip(&compressed));
    }

    #[test]
    fn raw_passes_through() {
        let data = b"\x1a\x0bplain layer bytes".to_vec();
        assert_eq!(decompress_if_needed(&data).unwrap(), data);
    }

    #[test]
    fn gzip_round_trip() {
        let data = b"some vector tile payload".repeat(16);
        let compressed = gzip_compress(&data, 9, CompressionStrategy::Filtered).unwrap();
        assert_eq!(decompress_if_needed(&compressed).unwrap(), data);
    }

    #[test]
    fn zlib_round_trip() {
        let data = b"some vector tile payload".repeat(16);
        let compressed = zlib_compress(&data, 1, CompressionStrategy::Rle).unwrap();
        assert_eq!(decompress_if_needed(&compressed).unwrap(), data);
    }

    #[test]
    fn rejects_out_of_range_level() {
        assert!(gzip_compress(b"x", 10, CompressionStrategy::Default).is_err());
    }

    #[test]
    fn truncated_gzip_is_corrupt_input() {
        let compressed = gzip_compress(b"hello tile", 6, CompressionStrategy::Default).unwrap();
        let truncated = &compressed[..compressed.len() / 2];
        assert!(matches!(
            decompress_if_needed(truncated),
            Err(Error::CorruptInput(_))
        ));
    }
}
