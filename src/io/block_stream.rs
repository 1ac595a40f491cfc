//! Reading and writing blocks over a connection.
//!
//! When compression is negotiated each block body travels inside one
//! checksummed frame; otherwise the body is inline on the stream. Inline
//! bodies have no length prefix, so the reader walks the column structure
//! to capture exactly one block's bytes before handing them to the sync
//! decoder in [`crate::block::Block::read_from`].

use crate::{
    block::Block,
    compression::{
        compress,
        decompress,
        CHECKSUM_SIZE,
        HEADER_SIZE,
    },
    connection::Connection,
    protocol::{
        CompressionMethod,
        DBMS_MIN_REVISION_WITH_BLOCK_INFO,
        DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION,
        DBMS_MIN_REVISION_WITH_TEMPORARY_TABLES,
    },
    types::{
        Type,
        TypeCode,
    },
    Error,
    Result,
};
use bytes::{
    BufMut,
    BytesMut,
};
use std::future::Future;
use std::pin::Pin;

/// Reader for server blocks.
#[derive(Debug)]
pub struct BlockReader {
    revision: u64,
    compression: Option<CompressionMethod>,
}

impl BlockReader {
    pub fn new(revision: u64) -> Self {
        Self { revision, compression: None }
    }

    pub fn with_compression(mut self, method: CompressionMethod) -> Self {
        self.compression = Some(method);
        self
    }

    /// Read one block. The caller consumes the packet kind and any
    /// temporary-table name beforehand.
    pub async fn read_block(&self, conn: &mut Connection) -> Result<Block> {
        let body = if self.compression.is_some() {
            self.read_compressed_body(conn).await?
        } else {
            self.capture_inline_body(conn).await?
        };

        let mut reader = &body[..];
        let block = Block::read_from(&mut reader, self.revision)?;
        if !reader.is_empty() {
            return Err(Error::Protocol(format!(
                "{} bytes left over after block body",
                reader.len()
            )));
        }
        Ok(block)
    }

    async fn read_compressed_body(
        &self,
        conn: &mut Connection,
    ) -> Result<Vec<u8>> {
        let checksum = conn.read_bytes(CHECKSUM_SIZE).await?;
        let method = conn.read_u8().await?;
        let compressed_size = conn.read_u32().await? as usize;
        let uncompressed_size = conn.read_u32().await?;

        if compressed_size < HEADER_SIZE {
            return Err(Error::Protocol(format!(
                "Compressed frame size {} below header size",
                compressed_size
            )));
        }
        let payload = conn.read_bytes(compressed_size - HEADER_SIZE).await?;

        let mut frame =
            BytesMut::with_capacity(CHECKSUM_SIZE + compressed_size);
        frame.extend_from_slice(&checksum);
        frame.put_u8(method);
        frame.put_u32_le(compressed_size as u32);
        frame.put_u32_le(uncompressed_size);
        frame.extend_from_slice(&payload);

        Ok(decompress(&frame)?.to_vec())
    }

    /// Capture one inline block body byte for byte, walking just enough of
    /// the structure to find its end.
    async fn capture_inline_body(
        &self,
        conn: &mut Connection,
    ) -> Result<Vec<u8>> {
        let mut out = Vec::new();

        if self.revision >= DBMS_MIN_REVISION_WITH_BLOCK_INFO {
            loop {
                let key = read_varint_capturing(conn, &mut out).await?;
                match key {
                    0 => break,
                    1 => capture_bytes(conn, 1, &mut out).await?,
                    2 => capture_bytes(conn, 4, &mut out).await?,
                    other => {
                        return Err(Error::Protocol(format!(
                            "Unknown block settings key: {}",
                            other
                        )));
                    }
                }
            }
        }

        let column_count = read_varint_capturing(conn, &mut out).await?;
        let row_count = read_varint_capturing(conn, &mut out).await? as usize;

        for _ in 0..column_count {
            let _name = capture_string(conn, &mut out).await?;
            let type_name = capture_string(conn, &mut out).await?;

            if self.revision >= DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION {
                let flag = conn.read_u8().await?;
                out.push(flag);
                if flag != 0 {
                    return Err(Error::Protocol(
                        "Custom column serialization is not supported"
                            .to_string(),
                    ));
                }
            }

            if row_count > 0 {
                let column_type = Type::parse(&type_name)?;
                fetch_prefix(conn, &column_type, &mut out).await?;
                fetch_body(conn, &column_type, row_count, &mut out).await?;
            }
        }

        Ok(out)
    }
}

/// Writer for client blocks.
#[derive(Debug)]
pub struct BlockWriter {
    revision: u64,
    compression: Option<CompressionMethod>,
}

impl BlockWriter {
    pub fn new(revision: u64) -> Self {
        Self { revision, compression: None }
    }

    pub fn with_compression(mut self, method: CompressionMethod) -> Self {
        self.compression = Some(method);
        self
    }

    /// Write one block, including the temporary-table name slot the Data
    /// packet carries. The caller writes the packet kind.
    pub async fn write_block(
        &self,
        conn: &mut Connection,
        block: &Block,
    ) -> Result<()> {
        if self.revision >= DBMS_MIN_REVISION_WITH_TEMPORARY_TABLES {
            conn.write_string("").await?;
        }

        let mut body = BytesMut::new();
        block.write_to(&mut body, self.revision)?;

        if let Some(method) = self.compression {
            let frame = compress(method, &body)?;
            conn.write_bytes(&frame).await?;
        } else {
            conn.write_bytes(&body).await?;
        }

        conn.flush().await
    }
}

async fn capture_bytes(
    conn: &mut Connection,
    len: usize,
    out: &mut Vec<u8>,
) -> Result<()> {
    let start = out.len();
    out.resize(start + len, 0);
    conn.read_exact(&mut out[start..]).await
}

async fn read_varint_capturing(
    conn: &mut Connection,
    out: &mut Vec<u8>,
) -> Result<u64> {
    let mut result: u64 = 0;
    let mut shift = 0;

    loop {
        let byte = conn.read_u8().await?;
        out.push(byte);
        result |= ((byte & 0x7F) as u64) << shift;

        if byte & 0x80 == 0 {
            return Ok(result);
        }

        shift += 7;
        if shift >= 64 {
            return Err(Error::MalformedVarint);
        }
    }
}

async fn read_u64_capturing(
    conn: &mut Connection,
    out: &mut Vec<u8>,
) -> Result<u64> {
    let mut buf = [0u8; 8];
    conn.read_exact(&mut buf).await?;
    out.extend_from_slice(&buf);
    Ok(u64::from_le_bytes(buf))
}

async fn capture_string(
    conn: &mut Connection,
    out: &mut Vec<u8>,
) -> Result<String> {
    let len = read_varint_capturing(conn, out).await? as usize;
    let start = out.len();
    out.resize(start + len, 0);
    conn.read_exact(&mut out[start..]).await?;
    String::from_utf8(out[start..].to_vec()).map_err(|e| {
        Error::Protocol(format!("Invalid UTF-8 in protocol string: {}", e))
    })
}

/// Byte width of a type whose cells are fixed-size, `None` otherwise.
fn fixed_width(type_: &Type) -> Option<usize> {
    match type_ {
        Type::Simple(code) => match code {
            TypeCode::UInt8 | TypeCode::Int8 | TypeCode::Nothing => Some(1),
            TypeCode::UInt16 | TypeCode::Int16 | TypeCode::Date => Some(2),
            TypeCode::UInt32
            | TypeCode::Int32
            | TypeCode::Float32
            | TypeCode::Date32
            | TypeCode::Ipv4 => Some(4),
            TypeCode::UInt64 | TypeCode::Int64 | TypeCode::Float64 => Some(8),
            TypeCode::UInt128 | TypeCode::Int128 | TypeCode::Uuid
            | TypeCode::Ipv6 => Some(16),
            _ => None,
        },
        Type::FixedString { size } => Some(*size),
        Type::DateTime { .. } => Some(4),
        Type::DateTime64 { .. } => Some(8),
        Type::Enum8 { .. } => Some(1),
        Type::Enum16 { .. } => Some(2),
        Type::Decimal { precision, .. } => Some(match precision {
            1..=9 => 4,
            10..=18 => 8,
            19..=38 => 16,
            _ => 32,
        }),
        _ => None,
    }
}

fn fetch_prefix<'a>(
    conn: &'a mut Connection,
    type_: &'a Type,
    out: &'a mut Vec<u8>,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        match type_ {
            Type::LowCardinality { .. } => {
                capture_bytes(conn, 8, out).await
            }
            Type::Nullable { nested_type } | Type::Array { item_type: nested_type } => {
                fetch_prefix(conn, nested_type, out).await
            }
            Type::Tuple { item_types } => {
                for item in item_types {
                    fetch_prefix(conn, item, out).await?;
                }
                Ok(())
            }
            Type::Map { key_type, value_type } => {
                fetch_prefix(conn, key_type, out).await?;
                fetch_prefix(conn, value_type, out).await
            }
            _ => Ok(()),
        }
    })
}

fn fetch_body<'a>(
    conn: &'a mut Connection,
    type_: &'a Type,
    rows: usize,
    out: &'a mut Vec<u8>,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        if let Some(width) = fixed_width(type_) {
            return capture_bytes(conn, rows * width, out).await;
        }

        match type_ {
            Type::Simple(TypeCode::String) => {
                for _ in 0..rows {
                    let len =
                        read_varint_capturing(conn, out).await? as usize;
                    capture_bytes(conn, len, out).await?;
                }
                Ok(())
            }
            Type::Nullable { nested_type } => {
                capture_bytes(conn, rows, out).await?;
                fetch_body(conn, nested_type, rows, out).await
            }
            Type::Array { item_type } => {
                let mut total = 0u64;
                for _ in 0..rows {
                    total = read_u64_capturing(conn, out).await?;
                }
                fetch_body(conn, item_type, total as usize, out).await
            }
            Type::Tuple { item_types } => {
                for item in item_types {
                    fetch_body(conn, item, rows, out).await?;
                }
                Ok(())
            }
            Type::Map { key_type, value_type } => {
                let mut total = 0u64;
                for _ in 0..rows {
                    total = read_u64_capturing(conn, out).await?;
                }
                fetch_body(conn, key_type, total as usize, out).await?;
                fetch_body(conn, value_type, total as usize, out).await
            }
            Type::LowCardinality { nested_type } => {
                let flags = read_u64_capturing(conn, out).await?;
                let base_type = match nested_type.as_ref() {
                    Type::Nullable { nested_type } => nested_type.as_ref(),
                    other => other,
                };

                let dictionary_size =
                    read_u64_capturing(conn, out).await? as usize;
                fetch_body(conn, base_type, dictionary_size, out).await?;

                let index_count = read_u64_capturing(conn, out).await?;
                let index_width = match flags & 0xFF {
                    0 => 1,
                    1 => 2,
                    2 => 4,
                    3 => 8,
                    other => {
                        return Err(Error::Protocol(format!(
                            "Unknown LowCardinality index width code: {}",
                            other
                        )));
                    }
                };
                capture_bytes(conn, index_count as usize * index_width, out)
                    .await
            }
            other => Err(Error::Protocol(format!(
                "Cannot stream column of type: {}",
                other.name()
            ))),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn sample_block() -> Block {
        let mut block = Block::with_columns(vec![
            ("id".to_string(), Type::uint64()),
            ("tags".to_string(), Type::array(Type::string())),
            ("score".to_string(), Type::nullable(Type::float64())),
        ])
        .unwrap();

        for i in 0..3u64 {
            block.set_placeholder(0, Value::UInt64(i)).unwrap();
            block
                .set_placeholder(
                    1,
                    Value::Array(vec![Value::from(format!("tag{}", i))]),
                )
                .unwrap();
            let score = if i == 1 {
                Value::Null
            } else {
                Value::Float64(i as f64 * 1.5)
            };
            block.set_placeholder(2, score).unwrap();
            block.append_row().unwrap();
        }
        block
    }

    async fn roundtrip(
        writer: BlockWriter,
        reader: BlockReader,
        block: &Block,
    ) -> Block {
        let (client, server) = tokio::io::duplex(1 << 20);
        let mut client_conn = Connection::from_stream(client);
        let mut server_conn = Connection::from_stream(server);

        writer.write_block(&mut client_conn, block).await.unwrap();

        // Skip the temporary-table name slot the writer emitted
        let _table = server_conn.read_string().await.unwrap();
        reader.read_block(&mut server_conn).await.unwrap()
    }

    #[tokio::test]
    async fn test_roundtrip_uncompressed() {
        let block = sample_block();
        let revision = crate::protocol::CLIENT_REVISION;
        let decoded = roundtrip(
            BlockWriter::new(revision),
            BlockReader::new(revision),
            &block,
        )
        .await;
        assert_eq!(decoded, block);
    }

    #[tokio::test]
    async fn test_roundtrip_lz4() {
        let block = sample_block();
        let revision = crate::protocol::CLIENT_REVISION;
        let decoded = roundtrip(
            BlockWriter::new(revision)
                .with_compression(CompressionMethod::Lz4),
            BlockReader::new(revision)
                .with_compression(CompressionMethod::Lz4),
            &block,
        )
        .await;
        assert_eq!(decoded, block);
    }

    #[tokio::test]
    async fn test_roundtrip_zstd() {
        let block = sample_block();
        let revision = crate::protocol::CLIENT_REVISION;
        let decoded = roundtrip(
            BlockWriter::new(revision)
                .with_compression(CompressionMethod::Zstd),
            BlockReader::new(revision)
                .with_compression(CompressionMethod::Zstd),
            &block,
        )
        .await;
        assert_eq!(decoded, block);
    }

    #[tokio::test]
    async fn test_roundtrip_lowcardinality_inline() {
        let mut block = Block::with_columns(vec![(
            "tag".to_string(),
            Type::low_cardinality(Type::string()),
        )])
        .unwrap();
        for s in ["a", "b", "a"] {
            block.set_placeholder(0, Value::from(s)).unwrap();
            block.append_row().unwrap();
        }

        let revision = crate::protocol::CLIENT_REVISION;
        let decoded = roundtrip(
            BlockWriter::new(revision),
            BlockReader::new(revision),
            &block,
        )
        .await;
        assert_eq!(decoded, block);
    }

    #[tokio::test]
    async fn test_corrupted_frame_surfaces_checksum_error() {
        let block = sample_block();
        let revision = crate::protocol::CLIENT_REVISION;

        let mut body = BytesMut::new();
        block.write_to(&mut body, revision).unwrap();
        let mut frame =
            compress(CompressionMethod::Lz4, &body).unwrap().to_vec();
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;

        let (client, server) = tokio::io::duplex(1 << 20);
        let mut client_conn = Connection::from_stream(client);
        let mut server_conn = Connection::from_stream(server);

        client_conn.write_bytes(&frame).await.unwrap();
        client_conn.flush().await.unwrap();

        let reader = BlockReader::new(revision)
            .with_compression(CompressionMethod::Lz4);
        let err =
            reader.read_block(&mut server_conn).await.unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch));
    }
}
