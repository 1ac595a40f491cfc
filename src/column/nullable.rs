//! `Nullable(T)` columns.
//!
//! On the wire: first a byte vector of length `n` where 1 marks null, then
//! the inner column serialized for all `n` rows. Null rows still occupy a
//! slot in the inner payload, filled with the inner type's default value.

use super::{
    create_column,
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

/// Nullable column: a null map plus the nested payload column.
pub struct ColumnNullable {
    type_: Type,
    nested: ColumnRef,
    nested_default: Value,
    nulls: Vec<u8>,
}

impl ColumnNullable {
    pub fn new(type_: Type) -> Result<Self> {
        let nested_type = match &type_ {
            Type::Nullable { nested_type } => nested_type.as_ref().clone(),
            other => {
                return Err(Error::TypeMismatch {
                    expected: "Nullable".to_string(),
                    actual: other.name(),
                });
            }
        };

        let nested = create_column(&nested_type)?;
        let nested_default = nested_type.default_value();
        Ok(Self { type_, nested, nested_default, nulls: Vec::new() })
    }

    /// Append a null row; the inner payload gets the type default.
    pub fn append_null(&mut self) -> Result<()> {
        self.nested.append_value(&self.nested_default)?;
        self.nulls.push(1);
        Ok(())
    }

    pub fn is_null(&self, index: usize) -> bool {
        self.nulls.get(index).is_some_and(|&b| b != 0)
    }

    pub fn nested(&self) -> &dyn Column {
        self.nested.as_ref()
    }

    pub fn nulls(&self) -> &[u8] {
        &self.nulls
    }
}

impl Column for ColumnNullable {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.nulls.len()
    }

    fn clear(&mut self) {
        self.nulls.clear();
        self.nested.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.nulls.reserve(additional);
        self.nested.reserve(additional);
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        if value.is_null() {
            return self.append_null();
        }
        self.nested.append_value(value)?;
        self.nulls.push(0);
        Ok(())
    }

    fn value_at(&self, index: usize) -> Result<Value> {
        if index >= self.nulls.len() {
            return Err(Error::InvalidArgument(format!(
                "Row {} out of bounds (size: {})",
                index,
                self.nulls.len()
            )));
        }
        if self.nulls[index] != 0 {
            Ok(Value::Null)
        } else {
            self.nested.value_at(index)
        }
    }

    fn load_prefix(&mut self, buffer: &mut &[u8], rows: usize) -> Result<()> {
        self.nested.load_prefix(buffer, rows)
    }

    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        if buffer.len() < rows {
            return Err(Error::ShortRead {
                needed: rows,
                available: buffer.len(),
            });
        }

        self.nulls.extend_from_slice(&buffer[..rows]);
        buffer.advance(rows);
        self.nested.load_from_buffer(buffer, rows)
    }

    fn save_prefix(&self, buffer: &mut BytesMut) -> Result<()> {
        self.nested.save_prefix(buffer)
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        // Null map precedes the inner payload
        buffer.put_slice(&self.nulls);
        self.nested.save_to_buffer(buffer)
    }

    fn clone_empty(&self) -> ColumnRef {
        Box::new(ColumnNullable {
            type_: self.type_.clone(),
            nested: self.nested.clone_empty(),
            nested_default: self.nested_default.clone(),
            nulls: Vec::new(),
        })
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

    fn nullable_int32() -> ColumnNullable {
        ColumnNullable::new(Type::nullable(Type::int32())).unwrap()
    }

    #[test]
    fn test_append_and_read_back() {
        let mut col = nullable_int32();
        col.append_value(&Value::Int32(1)).unwrap();
        col.append_value(&Value::Null).unwrap();
        col.append_value(&Value::Int32(3)).unwrap();

        assert_eq!(col.size(), 3);
        assert!(!col.is_null(0));
        assert!(col.is_null(1));
        assert_eq!(col.value_at(0).unwrap(), Value::Int32(1));
        assert_eq!(col.value_at(1).unwrap(), Value::Null);
        assert_eq!(col.value_at(2).unwrap(), Value::Int32(3));
    }

    #[test]
    fn test_wire_layout() {
        // [1, null, 3] emits null map 00 01 00 then three LE int32s with a
        // zero placeholder in the middle
        let mut col = nullable_int32();
        col.append_value(&Value::Int32(1)).unwrap();
        col.append_value(&Value::Null).unwrap();
        col.append_value(&Value::Int32(3)).unwrap();

        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();

        assert_eq!(
            &buf[..],
            &[
                0x00, 0x01, 0x00, // null map
                0x01, 0x00, 0x00, 0x00, // 1
                0x00, 0x00, 0x00, 0x00, // default for the null row
                0x03, 0x00, 0x00, 0x00, // 3
            ]
        );
    }

    #[test]
    fn test_mask_and_payload_lengths_match() {
        let mut col = nullable_int32();
        for i in 0..7 {
            if i % 2 == 0 {
                col.append_value(&Value::Int32(i)).unwrap();
            } else {
                col.append_value(&Value::Null).unwrap();
            }
        }
        assert_eq!(col.nulls().len(), 7);
        assert_eq!(col.nested().size(), 7);
    }

    #[test]
    fn test_roundtrip() {
        let mut col = nullable_int32();
        col.append_value(&Value::Int32(-5)).unwrap();
        col.append_value(&Value::Null).unwrap();

        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();

        let mut col2 = nullable_int32();
        let mut reader = &buf[..];
        col2.load_from_buffer(&mut reader, 2).unwrap();

        assert_eq!(col2.value_at(0).unwrap(), Value::Int32(-5));
        assert_eq!(col2.value_at(1).unwrap(), Value::Null);
    }

    #[test]
    fn test_nullable_string() {
        let mut col =
            ColumnNullable::new(Type::nullable(Type::string())).unwrap();
        col.append_value(&Value::from("x")).unwrap();
        col.append_value(&Value::Null).unwrap();

        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();
        // null map, then "x", then the empty default string
        assert_eq!(&buf[..], &[0x00, 0x01, 0x01, b'x', 0x00]);
    }

    #[test]
    fn test_rejects_mismatched_value() {
        let mut col = nullable_int32();
        assert!(col.append_value(&Value::from("text")).is_err());
        assert_eq!(col.size(), 0);
        assert_eq!(col.nested().size(), 0);
    }
}
