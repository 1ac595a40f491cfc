//! `String` and `FixedString(N)` columns.
//!
//! `String` cells are length-prefixed byte runs; the wire format allows
//! arbitrary bytes, so nothing here assumes UTF-8. `FixedString(N)` is
//! `n * N` raw bytes: the writer right-pads shorter inputs with zero bytes
//! and rejects longer ones, the reader trims trailing zeros on demand.

use super::{
    conversion_error,
    Column,
    ColumnRef,
};
use crate::{
    io::buffer_utils,
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

/// Column for variable-length byte strings.
pub struct ColumnString {
    type_: Type,
    data: Vec<Vec<u8>>,
}

impl ColumnString {
    pub fn new() -> Self {
        Self { type_: Type::string(), data: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { type_: Type::string(), data: Vec::with_capacity(capacity) }
    }

    pub fn append(&mut self, value: impl AsRef<[u8]>) {
        self.data.push(value.as_ref().to_vec());
    }

    /// Raw bytes at `index`; panics when out of bounds.
    pub fn at(&self, index: usize) -> &[u8] {
        &self.data[index]
    }

    /// Lossy UTF-8 view of the cell at `index`.
    pub fn at_str(&self, index: usize) -> String {
        String::from_utf8_lossy(&self.data[index]).into_owned()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for ColumnString {
    fn default() -> Self {
        Self::new()
    }
}

impl Column for ColumnString {
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
            Value::String(bytes) => {
                self.data.push(bytes.clone());
                Ok(())
            }
            other => Err(conversion_error(&self.type_, other)),
        }
    }

    fn value_at(&self, index: usize) -> Result<Value> {
        self.data.get(index).map(|b| Value::String(b.clone())).ok_or_else(
            || {
                Error::InvalidArgument(format!(
                    "Row {} out of bounds (size: {})",
                    index,
                    self.data.len()
                ))
            },
        )
    }

    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        self.data.reserve(rows);
        for _ in 0..rows {
            self.data.push(buffer_utils::read_string_bytes(buffer)?);
        }
        Ok(())
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        for value in &self.data {
            buffer_utils::write_string_bytes(buffer, value);
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Box::new(ColumnString::new())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Column for fixed-length strings, stored as one flat byte run.
pub struct ColumnFixedString {
    type_: Type,
    string_size: usize,
    data: Vec<u8>,
}

impl ColumnFixedString {
    pub fn new(size: usize) -> Self {
        Self {
            type_: Type::fixed_string(size),
            string_size: size,
            data: Vec::new(),
        }
    }

    /// Append, right-padding with zero bytes. Inputs longer than N are
    /// rejected.
    pub fn append(&mut self, value: impl AsRef<[u8]>) -> Result<()> {
        let bytes = value.as_ref();
        if bytes.len() > self.string_size {
            return Err(Error::ValueConversion {
                target: self.type_.name(),
                message: format!(
                    "input of {} bytes exceeds fixed size {}",
                    bytes.len(),
                    self.string_size
                ),
            });
        }

        self.data.extend_from_slice(bytes);
        self.data
            .resize(self.data.len() + (self.string_size - bytes.len()), 0);
        Ok(())
    }

    /// Cell at `index` with trailing zero bytes trimmed.
    pub fn at_trimmed(&self, index: usize) -> &[u8] {
        let cell = self.at_raw(index);
        let end = cell.iter().rposition(|&b| b != 0).map_or(0, |pos| pos + 1);
        &cell[..end]
    }

    /// Full N-byte cell at `index`.
    pub fn at_raw(&self, index: usize) -> &[u8] {
        let start = index * self.string_size;
        &self.data[start..start + self.string_size]
    }

    pub fn fixed_size(&self) -> usize {
        self.string_size
    }
}

impl Column for ColumnFixedString {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        if self.string_size == 0 {
            0
        } else {
            self.data.len() / self.string_size
        }
    }

    fn clear(&mut self) {
        self.data.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional * self.string_size);
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::String(bytes) => self.append(bytes),
            other => Err(conversion_error(&self.type_, other)),
        }
    }

    fn value_at(&self, index: usize) -> Result<Value> {
        if index >= self.size() {
            return Err(Error::InvalidArgument(format!(
                "Row {} out of bounds (size: {})",
                index,
                self.size()
            )));
        }
        Ok(Value::String(self.at_trimmed(index).to_vec()))
    }

    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        let total = self.string_size * rows;
        if buffer.len() < total {
            return Err(Error::ShortRead {
                needed: total,
                available: buffer.len(),
            });
        }

        self.data.extend_from_slice(&buffer[..total]);
        buffer.advance(total);
        Ok(())
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        buffer.put_slice(&self.data);
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Box::new(ColumnFixedString::new(self.string_size))
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

    #[test]
    fn test_string_roundtrip() {
        let mut col = ColumnString::new();
        col.append("hello");
        col.append("");
        col.append("мир");

        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();

        let mut col2 = ColumnString::new();
        let mut reader = &buf[..];
        col2.load_from_buffer(&mut reader, 3).unwrap();

        assert_eq!(col2.at(0), b"hello");
        assert_eq!(col2.at(1), b"");
        assert_eq!(col2.at_str(2), "мир");
    }

    #[test]
    fn test_string_preserves_arbitrary_bytes() {
        let raw = vec![0u8, 0xFF, 0xFE, 0x80];
        let mut col = ColumnString::new();
        col.append(&raw);

        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();

        let mut col2 = ColumnString::new();
        let mut reader = &buf[..];
        col2.load_from_buffer(&mut reader, 1).unwrap();
        assert_eq!(col2.at(0), &raw[..]);
    }

    #[test]
    fn test_string_wire_layout() {
        let mut col = ColumnString::new();
        col.append("hi");

        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0x02, b'h', b'i']);
    }

    #[test]
    fn test_fixed_string_padding() {
        let mut col = ColumnFixedString::new(4);
        col.append("ab").unwrap();

        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();
        assert_eq!(&buf[..], &[b'a', b'b', 0, 0]);

        assert_eq!(col.at_trimmed(0), b"ab");
        assert_eq!(col.at_raw(0), &[b'a', b'b', 0, 0]);
    }

    #[test]
    fn test_fixed_string_too_long() {
        let mut col = ColumnFixedString::new(2);
        assert!(matches!(
            col.append("abc").unwrap_err(),
            Error::ValueConversion { .. }
        ));
        assert_eq!(col.size(), 0);
    }

    #[test]
    fn test_fixed_string_roundtrip() {
        let mut col = ColumnFixedString::new(3);
        col.append("ab").unwrap();
        col.append("xyz").unwrap();

        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();
        assert_eq!(buf.len(), 6);

        let mut col2 = ColumnFixedString::new(3);
        let mut reader = &buf[..];
        col2.load_from_buffer(&mut reader, 2).unwrap();
        assert_eq!(col2.value_at(0).unwrap(), Value::from("ab"));
        assert_eq!(col2.value_at(1).unwrap(), Value::from("xyz"));
    }

    #[test]
    fn test_append_value_kind_check() {
        let mut col = ColumnString::new();
        assert!(col.append_value(&Value::UInt8(1)).is_err());
        col.append_value(&Value::from("ok")).unwrap();
        assert_eq!(col.size(), 1);
    }
}
