//! Checksummed compression frames.
//!
//! Once compression is negotiated, every block after the handshake travels
//! inside a frame:
//!
//! ```text
//! [16-byte CityHash128 over header+payload]
//! [1-byte method: 0x82 LZ4, 0x90 ZSTD, 0x02 none]
//! [u32 LE compressed size, inclusive of this 9-byte header]
//! [u32 LE uncompressed size]
//! [payload]
//! ```
//!
//! The checksum is verified before decompression; a mismatch terminates the
//! session.

use crate::{
    protocol::CompressionMethod,
    Error,
    Result,
};
use bytes::{
    Buf,
    BufMut,
    Bytes,
    BytesMut,
};
use cityhash_rs::cityhash_102_128;

/// Frame header size: 1 byte method + 4 bytes compressed + 4 bytes
/// uncompressed.
pub const HEADER_SIZE: usize = 9;

/// Checksum size (CityHash128).
pub const CHECKSUM_SIZE: usize = 16;

/// Maximum frame size accepted from the wire (1GB).
const MAX_FRAME_SIZE: usize = 0x4000_0000;

/// Compress `data` into a complete frame, checksum included.
pub fn compress(method: CompressionMethod, data: &[u8]) -> Result<Bytes> {
    let compressed = match method {
        CompressionMethod::None => Bytes::copy_from_slice(data),
        CompressionMethod::Lz4 => compress_lz4(data)?,
        CompressionMethod::Zstd => compress_zstd(data)?,
    };

    let mut header_and_data =
        BytesMut::with_capacity(HEADER_SIZE + compressed.len());
    header_and_data.put_u8(method.method_byte());
    header_and_data.put_u32_le((HEADER_SIZE + compressed.len()) as u32);
    header_and_data.put_u32_le(data.len() as u32);
    header_and_data.put_slice(&compressed);

    let checksum = cityhash_102_128(&header_and_data);

    let mut output =
        BytesMut::with_capacity(CHECKSUM_SIZE + header_and_data.len());
    put_checksum(&mut output, checksum);
    output.put_slice(&header_and_data);

    Ok(output.freeze())
}

/// Decompress a complete frame (checksum + header + payload). The method is
/// taken from the frame header; the checksum is verified first.
pub fn decompress(frame: &[u8]) -> Result<Bytes> {
    if frame.len() < CHECKSUM_SIZE + HEADER_SIZE {
        return Err(Error::Compression(format!(
            "Frame too small: {} bytes",
            frame.len()
        )));
    }

    let stored = get_checksum(&frame[..CHECKSUM_SIZE]);
    let header_and_data = &frame[CHECKSUM_SIZE..];

    if cityhash_102_128(header_and_data) != stored {
        return Err(Error::ChecksumMismatch);
    }

    let method = header_and_data[0];
    let mut reader = &header_and_data[1..];
    let compressed_size = reader.get_u32_le() as usize;
    let uncompressed_size = reader.get_u32_le() as usize;

    if compressed_size > MAX_FRAME_SIZE || uncompressed_size > MAX_FRAME_SIZE {
        return Err(Error::Compression(format!(
            "Frame size out of range: compressed {}, uncompressed {}",
            compressed_size, uncompressed_size
        )));
    }

    if compressed_size != header_and_data.len() {
        return Err(Error::Compression(format!(
            "Frame size mismatch: header says {}, have {}",
            compressed_size,
            header_and_data.len()
        )));
    }

    let payload = &header_and_data[HEADER_SIZE..];

    match method {
        0x02 => {
            if payload.len() != uncompressed_size {
                return Err(Error::Compression(format!(
                    "Uncompressed payload size mismatch: expected {}, got {}",
                    uncompressed_size,
                    payload.len()
                )));
            }
            Ok(Bytes::copy_from_slice(payload))
        }
        0x82 => decompress_lz4(payload, uncompressed_size),
        0x90 => decompress_zstd(payload, uncompressed_size),
        _ => Err(Error::Compression(format!(
            "Unknown compression method: 0x{:02x}",
            method
        ))),
    }
}

fn compress_lz4(data: &[u8]) -> Result<Bytes> {
    let max_compressed_size = lz4::block::compress_bound(data.len())
        .map_err(|e| Error::Compression(format!("LZ4 bound failed: {}", e)))?;
    let mut compressed = vec![0u8; max_compressed_size];

    let compressed_size =
        lz4::block::compress_to_buffer(data, None, false, &mut compressed)
            .map_err(|e| {
                Error::Compression(format!("LZ4 compression failed: {}", e))
            })?;

    compressed.truncate(compressed_size);
    Ok(Bytes::from(compressed))
}

fn decompress_lz4(data: &[u8], uncompressed_size: usize) -> Result<Bytes> {
    let decompressed =
        lz4::block::decompress(data, Some(uncompressed_size as i32)).map_err(
            |e| Error::Compression(format!("LZ4 decompression failed: {}", e)),
        )?;

    if decompressed.len() != uncompressed_size {
        return Err(Error::Compression(format!(
            "LZ4 decompression size mismatch: expected {}, got {}",
            uncompressed_size,
            decompressed.len()
        )));
    }

    Ok(Bytes::from(decompressed))
}

fn compress_zstd(data: &[u8]) -> Result<Bytes> {
    let compressed = zstd::bulk::compress(data, 3).map_err(|e| {
        Error::Compression(format!("ZSTD compression failed: {}", e))
    })?;
    Ok(Bytes::from(compressed))
}

fn decompress_zstd(data: &[u8], uncompressed_size: usize) -> Result<Bytes> {
    let decompressed = zstd::bulk::decompress(data, uncompressed_size)
        .map_err(|e| {
            Error::Compression(format!("ZSTD decompression failed: {}", e))
        })?;

    if decompressed.len() != uncompressed_size {
        return Err(Error::Compression(format!(
            "ZSTD decompression size mismatch: expected {}, got {}",
            uncompressed_size,
            decompressed.len()
        )));
    }

    Ok(Bytes::from(decompressed))
}

// CityHash128 goes on the wire high half first, then low half, each LE.
fn put_checksum(buffer: &mut BytesMut, checksum: u128) {
    buffer.put_u64_le((checksum >> 64) as u64);
    buffer.put_u64_le(checksum as u64);
}

fn get_checksum(bytes: &[u8]) -> u128 {
    let mut reader = bytes;
    let high = reader.get_u64_le() as u128;
    let low = reader.get_u64_le() as u128;
    (high << 64) | low
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_none() {
        let original = b"Hello, ClickHouse!";

        let compressed = compress(CompressionMethod::None, original).unwrap();
        let decompressed = decompress(&compressed).unwrap();

        assert_eq!(&decompressed[..], original);
    }

    #[test]
    fn test_roundtrip_lz4() {
        let original = b"Hello, ClickHouse! ".repeat(100);

        let compressed = compress(CompressionMethod::Lz4, &original).unwrap();
        let decompressed = decompress(&compressed).unwrap();

        assert_eq!(&decompressed[..], &original[..]);
        assert!(compressed.len() < original.len());
    }

    #[test]
    fn test_roundtrip_zstd() {
        let original =
            b"ClickHouse is a fast open-source column-oriented database"
                .repeat(50);

        let compressed = compress(CompressionMethod::Zstd, &original).unwrap();
        let decompressed = decompress(&compressed).unwrap();

        assert_eq!(&decompressed[..], &original[..]);
        assert!(compressed.len() < original.len());
    }

    #[test]
    fn test_empty_data() {
        let compressed = compress(CompressionMethod::Lz4, b"").unwrap();
        let decompressed = decompress(&compressed).unwrap();
        assert!(decompressed.is_empty());
    }

    #[test]
    fn test_frame_layout() {
        let compressed = compress(CompressionMethod::None, b"abc").unwrap();
        // checksum + header + 3 payload bytes
        assert_eq!(compressed.len(), CHECKSUM_SIZE + HEADER_SIZE + 3);
        assert_eq!(compressed[CHECKSUM_SIZE], 0x02);
        let size = u32::from_le_bytes(
            compressed[CHECKSUM_SIZE + 1..CHECKSUM_SIZE + 5]
                .try_into()
                .unwrap(),
        );
        assert_eq!(size as usize, HEADER_SIZE + 3);
    }

    #[test]
    fn test_corrupted_payload_fails_checksum() {
        let mut compressed =
            compress(CompressionMethod::Lz4, b"some payload data".as_ref())
                .unwrap()
                .to_vec();
        let last = compressed.len() - 1;
        compressed[last] ^= 0xFF;

        assert!(matches!(
            decompress(&compressed).unwrap_err(),
            Error::ChecksumMismatch
        ));
    }

    #[test]
    fn test_corrupted_checksum_fails() {
        let mut compressed =
            compress(CompressionMethod::None, b"payload").unwrap().to_vec();
        compressed[0] ^= 0x01;

        assert!(matches!(
            decompress(&compressed).unwrap_err(),
            Error::ChecksumMismatch
        ));
    }

    #[test]
    fn test_frame_too_small() {
        let bad_data = vec![0x82, 1, 2, 3];
        assert!(decompress(&bad_data).is_err());
    }
}
