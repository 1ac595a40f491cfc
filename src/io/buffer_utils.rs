//! Synchronous wire codec over in-memory byte slices.
//!
//! Compressed frames and block bodies are parsed out of fully materialized
//! buffers, so the hot-path codec is sync. The async twin for socket-level
//! framing is [`crate::wire_format::WireFormat`].

use crate::{
    Error,
    Result,
};
use bytes::{
    Buf,
    BufMut,
    BytesMut,
};

/// Read a varint-encoded u64 from a byte slice.
pub fn read_varint(buffer: &mut &[u8]) -> Result<u64> {
    let mut result: u64 = 0;
    let mut shift = 0;

    loop {
        if buffer.is_empty() {
            return Err(Error::ShortRead { needed: 1, available: 0 });
        }

        let byte = buffer[0];
        buffer.advance(1);

        result |= ((byte & 0x7F) as u64) << shift;

        if byte & 0x80 == 0 {
            break;
        }

        shift += 7;
        if shift >= 64 {
            return Err(Error::MalformedVarint);
        }
    }

    Ok(result)
}

/// Write a varint-encoded u64.
pub fn write_varint(buffer: &mut BytesMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;

        if value != 0 {
            byte |= 0x80;
        }

        buffer.put_u8(byte);

        if value == 0 {
            break;
        }
    }
}

/// Number of bytes `value` occupies as a varint.
pub fn varint_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Read a length-prefixed protocol string (UTF-8 required).
pub fn read_string(buffer: &mut &[u8]) -> Result<String> {
    let bytes = read_string_bytes(buffer)?;
    String::from_utf8(bytes).map_err(|e| {
        Error::Protocol(format!("Invalid UTF-8 in protocol string: {}", e))
    })
}

/// Read a length-prefixed byte string without UTF-8 validation. `String`
/// column payloads carry arbitrary bytes and must come through here.
pub fn read_string_bytes(buffer: &mut &[u8]) -> Result<Vec<u8>> {
    let len = read_varint(buffer)? as usize;

    if buffer.len() < len {
        return Err(Error::ShortRead {
            needed: len,
            available: buffer.len(),
        });
    }

    let bytes = buffer[..len].to_vec();
    buffer.advance(len);
    Ok(bytes)
}

/// Write a length-prefixed string.
pub fn write_string(buffer: &mut BytesMut, s: &str) {
    write_varint(buffer, s.len() as u64);
    buffer.put_slice(s.as_bytes());
}

/// Write a length-prefixed byte string.
pub fn write_string_bytes(buffer: &mut BytesMut, bytes: &[u8]) {
    write_varint(buffer, bytes.len() as u64);
    buffer.put_slice(bytes);
}

/// Ensure at least `needed` bytes remain.
pub fn ensure(buffer: &[u8], needed: usize) -> Result<()> {
    if buffer.len() < needed {
        return Err(Error::ShortRead {
            needed,
            available: buffer.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_roundtrip() {
        let test_cases =
            vec![0u64, 1, 127, 128, 255, 256, 65535, 65536, u64::MAX];

        for value in test_cases {
            let mut buf = BytesMut::new();
            write_varint(&mut buf, value);

            assert_eq!(buf.len(), varint_len(value));

            let mut slice = &buf[..];
            let decoded = read_varint(&mut slice).unwrap();

            assert_eq!(value, decoded, "Varint roundtrip failed for {}", value);
            assert!(slice.is_empty(), "Buffer should be fully consumed");
        }
    }

    #[test]
    fn test_varint_overlong() {
        // 11 continuation bytes cannot encode a u64
        let buf = [0xFFu8; 11];
        let mut slice = &buf[..];
        assert!(matches!(
            read_varint(&mut slice).unwrap_err(),
            Error::MalformedVarint
        ));
    }

    #[test]
    fn test_varint_truncated() {
        let buf = [0x80u8];
        let mut slice = &buf[..];
        assert!(matches!(
            read_varint(&mut slice).unwrap_err(),
            Error::ShortRead { .. }
        ));
    }

    #[test]
    fn test_string_roundtrip() {
        let test_strings =
            vec!["", "hello", "мир", "🦀", "test\nwith\nnewlines"];

        for s in test_strings {
            let mut buf = BytesMut::new();
            write_string(&mut buf, s);

            let mut slice = &buf[..];
            let decoded = read_string(&mut slice).unwrap();

            assert_eq!(s, decoded, "String roundtrip failed for '{}'", s);
            assert!(slice.is_empty(), "Buffer should be fully consumed");
        }
    }

    #[test]
    fn test_string_bytes_arbitrary() {
        let raw = vec![0u8, 0xFF, 0xFE, b'x'];
        let mut buf = BytesMut::new();
        write_string_bytes(&mut buf, &raw);

        let mut slice = &buf[..];
        assert_eq!(read_string_bytes(&mut slice).unwrap(), raw);
    }

    #[test]
    fn test_string_truncated() {
        let mut buf = BytesMut::new();
        write_varint(&mut buf, 100);
        buf.put_slice(b"only10");

        let mut slice = &buf[..];
        assert!(matches!(
            read_string(&mut slice).unwrap_err(),
            Error::ShortRead { .. }
        ));
    }
}
