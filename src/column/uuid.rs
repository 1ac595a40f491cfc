//! `UUID` columns.
//!
//! A UUID travels as two UInt64 halves, most significant half first, each
//! little-endian. In memory a cell is the canonical u128.

use super::{
    conversion_error,
    Column,
    ColumnRef,
};
use crate::{
    types::Type,
    value::Value,
    Error,
    Result,
};
use bytes::{
    Buf,
    BufMut,
    BytesMut,
};

/// Parse `"xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx"` into a u128.
pub fn parse_uuid(s: &str) -> Result<u128> {
    let hex: String = s.chars().filter(|&c| c != '-').collect();
    if hex.len() != 32 {
        return Err(Error::InvalidArgument(format!(
            "Invalid UUID literal '{}'",
            s
        )));
    }
    u128::from_str_radix(&hex, 16).map_err(|_| {
        Error::InvalidArgument(format!("Invalid UUID literal '{}'", s))
    })
}

/// Format a u128 as the canonical hyphenated UUID string.
pub fn format_uuid(value: u128) -> String {
    format!(
        "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
        (value >> 96) as u32,
        (value >> 80) as u16,
        (value >> 64) as u16,
        (value >> 48) as u16,
        value & 0xFFFF_FFFF_FFFF,
    )
}

/// UUID column.
pub struct ColumnUuid {
    type_: Type,
    data: Vec<u128>,
}

impl ColumnUuid {
    pub fn new() -> Self {
        Self { type_: Type::uuid(), data: Vec::new() }
    }

    pub fn append(&mut self, value: u128) {
        self.data.push(value);
    }

    pub fn append_from_string(&mut self, s: &str) -> Result<()> {
        self.data.push(parse_uuid(s)?);
        Ok(())
    }

    pub fn at(&self, index: usize) -> u128 {
        self.data[index]
    }

    pub fn as_string(&self, index: usize) -> String {
        format_uuid(self.data[index])
    }
}

impl Default for ColumnUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl Column for ColumnUuid {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.data.len()
    }

    fn clear(&mut self) {
        self.data.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional);
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Uuid(v) => {
                self.data.push(*v);
                Ok(())
            }
            Value::String(bytes) => {
                let text = std::str::from_utf8(bytes)
                    .map_err(|_| conversion_error(&self.type_, value))?;
                self.append_from_string(text)
                    .map_err(|_| conversion_error(&self.type_, value))
            }
            other => Err(conversion_error(&self.type_, other)),
        }
    }

    fn value_at(&self, index: usize) -> Result<Value> {
        self.data.get(index).map(|&v| Value::Uuid(v)).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "Row {} out of bounds (size: {})",
                index,
                self.data.len()
            ))
        })
    }

    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        if buffer.len() < rows * 16 {
            return Err(Error::ShortRead {
                needed: rows * 16,
                available: buffer.len(),
            });
        }
        self.data.reserve(rows);
        for _ in 0..rows {
            let high = buffer.get_u64_le() as u128;
            let low = buffer.get_u64_le() as u128;
            self.data.push((high << 64) | low);
        }
        Ok(())
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        for &value in &self.data {
            buffer.put_u64_le((value >> 64) as u64);
            buffer.put_u64_le(value as u64);
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Box::new(ColumnUuid::new())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "0110e60f-3c15-4acd-95a6-e43d2db1b7a9";

    #[test]
    fn test_parse_format_roundtrip() {
        let value = parse_uuid(SAMPLE).unwrap();
        assert_eq!(format_uuid(value), SAMPLE);
        assert!(parse_uuid("not-a-uuid").is_err());
    }

    #[test]
    fn test_wire_halves_order() {
        let mut col = ColumnUuid::new();
        col.append_from_string(SAMPLE).unwrap();

        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();
        assert_eq!(buf.len(), 16);

        // First 8 bytes are the most significant half, little-endian
        let high = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        assert_eq!(high, 0x0110_e60f_3c15_4acd);

        let mut col2 = ColumnUuid::new();
        let mut reader = &buf[..];
        col2.load_from_buffer(&mut reader, 1).unwrap();
        assert_eq!(col2.as_string(0), SAMPLE);
    }

    #[test]
    fn test_append_value() {
        let mut col = ColumnUuid::new();
        col.append_value(&Value::from(SAMPLE)).unwrap();
        col.append_value(&Value::Uuid(42)).unwrap();
        assert!(col.append_value(&Value::UInt64(1)).is_err());
        assert_eq!(col.size(), 2);
    }
}
