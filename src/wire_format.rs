//! Async wire codec for the ClickHouse native protocol.
//!
//! Everything on the wire is little-endian. Unsigned integers that the
//! protocol calls "varints" are LEB128 up to 64 bits, so at most 10 bytes.
//! Strings are a varint byte length followed by the raw bytes; lengths count
//! bytes, not code points.

use crate::{
    Error,
    Result,
};
use tokio::io::{
    AsyncRead,
    AsyncReadExt,
    AsyncWrite,
    AsyncWriteExt,
};

/// Upper bound for string lengths read off the wire.
const MAX_STRING_SIZE: usize = 0x00FF_FFFF;

/// Wire format utilities over async byte streams. The sync counterparts for
/// in-memory buffers live in [`crate::io::buffer_utils`].
pub struct WireFormat;

impl WireFormat {
    /// Read a varint-encoded u64.
    pub async fn read_varint64<R: AsyncRead + Unpin>(
        reader: &mut R,
    ) -> Result<u64> {
        let mut result: u64 = 0;
        let mut shift = 0;

        loop {
            let byte = reader.read_u8().await?;
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
    pub async fn write_varint64<W: AsyncWrite + Unpin>(
        writer: &mut W,
        mut value: u64,
    ) -> Result<()> {
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;

            if value != 0 {
                byte |= 0x80;
            }

            writer.write_u8(byte).await?;

            if value == 0 {
                break;
            }
        }

        Ok(())
    }

    /// Read a fixed-size value (little-endian).
    pub async fn read_fixed<R: AsyncRead + Unpin + Send, T: FixedSize>(
        reader: &mut R,
    ) -> Result<T> {
        T::read_from(reader).await
    }

    /// Write a fixed-size value (little-endian).
    pub async fn write_fixed<W: AsyncWrite + Unpin + Send, T: FixedSize>(
        writer: &mut W,
        value: T,
    ) -> Result<()> {
        value.write_to(writer).await
    }

    /// Read a length-prefixed protocol string. Protocol strings (column
    /// names, type names, server banners) are required to be UTF-8; column
    /// payloads of type `String` never pass through here.
    pub async fn read_string<R: AsyncRead + Unpin>(
        reader: &mut R,
    ) -> Result<String> {
        let bytes = Self::read_string_bytes(reader).await?;
        String::from_utf8(bytes).map_err(|e| {
            Error::Protocol(format!("Invalid UTF-8 in protocol string: {}", e))
        })
    }

    /// Read a length-prefixed byte string without UTF-8 validation.
    pub async fn read_string_bytes<R: AsyncRead + Unpin>(
        reader: &mut R,
    ) -> Result<Vec<u8>> {
        let len = Self::read_varint64(reader).await? as usize;

        if len > MAX_STRING_SIZE {
            return Err(Error::Protocol(format!(
                "String length too large: {}",
                len
            )));
        }

        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Write a length-prefixed string.
    pub async fn write_string<W: AsyncWrite + Unpin>(
        writer: &mut W,
        value: &str,
    ) -> Result<()> {
        Self::write_varint64(writer, value.len() as u64).await?;
        writer.write_all(value.as_bytes()).await?;
        Ok(())
    }

    /// Read raw bytes of the specified length.
    pub async fn read_bytes<R: AsyncRead + Unpin>(
        reader: &mut R,
        len: usize,
    ) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Write raw bytes.
    pub async fn write_bytes<W: AsyncWrite + Unpin>(
        writer: &mut W,
        bytes: &[u8],
    ) -> Result<()> {
        writer.write_all(bytes).await?;
        Ok(())
    }

    /// Skip a length-prefixed string without keeping it.
    pub async fn skip_string<R: AsyncRead + Unpin>(
        reader: &mut R,
    ) -> Result<()> {
        let len = Self::read_varint64(reader).await? as usize;

        if len > MAX_STRING_SIZE {
            return Err(Error::Protocol(format!(
                "String length too large: {}",
                len
            )));
        }

        let mut remaining = len;
        let mut buf = [0u8; 8192];
        while remaining > 0 {
            let to_read = remaining.min(buf.len());
            reader.read_exact(&mut buf[..to_read]).await?;
            remaining -= to_read;
        }

        Ok(())
    }
}

/// Trait for values that can be read/written at a fixed width.
#[async_trait::async_trait]
pub trait FixedSize: Sized + Send {
    async fn read_from<R: AsyncRead + Unpin + Send>(
        reader: &mut R,
    ) -> Result<Self>;
    async fn write_to<W: AsyncWrite + Unpin + Send>(
        self,
        writer: &mut W,
    ) -> Result<()>;
}

macro_rules! impl_fixed_size {
    ($type:ty, $read:ident, $write:ident) => {
        #[async_trait::async_trait]
        impl FixedSize for $type {
            async fn read_from<R: AsyncRead + Unpin + Send>(
                reader: &mut R,
            ) -> Result<Self> {
                Ok(reader.$read().await?)
            }

            async fn write_to<W: AsyncWrite + Unpin + Send>(
                self,
                writer: &mut W,
            ) -> Result<()> {
                Ok(writer.$write(self).await?)
            }
        }
    };
}

impl_fixed_size!(u8, read_u8, write_u8);
impl_fixed_size!(u16, read_u16_le, write_u16_le);
impl_fixed_size!(u32, read_u32_le, write_u32_le);
impl_fixed_size!(u64, read_u64_le, write_u64_le);
impl_fixed_size!(i8, read_i8, write_i8);
impl_fixed_size!(i16, read_i16_le, write_i16_le);
impl_fixed_size!(i32, read_i32_le, write_i32_le);
impl_fixed_size!(i64, read_i64_le, write_i64_le);
impl_fixed_size!(f32, read_f32_le, write_f32_le);
impl_fixed_size!(f64, read_f64_le, write_f64_le);
impl_fixed_size!(i128, read_i128_le, write_i128_le);
impl_fixed_size!(u128, read_u128_le, write_u128_le);
