//! `Nothing` columns.
//!
//! The type of `NULL` literals in expressions like `SELECT NULL` (which
//! arrives as `Nullable(Nothing)`). Every cell is one placeholder byte on
//! the wire and `Value::Null` in memory.

use super::{
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
    BytesMut,
};

/// A column that holds only a row count.
pub struct ColumnNothing {
    type_: Type,
    rows: usize,
}

impl ColumnNothing {
    pub fn new() -> Self {
        Self { type_: Type::nothing(), rows: 0 }
    }
}

impl Default for ColumnNothing {
    fn default() -> Self {
        Self::new()
    }
}

impl Column for ColumnNothing {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.rows
    }

    fn clear(&mut self) {
        self.rows = 0;
    }

    fn reserve(&mut self, _additional: usize) {}

    fn append_value(&mut self, _value: &Value) -> Result<()> {
        self.rows += 1;
        Ok(())
    }

    fn value_at(&self, index: usize) -> Result<Value> {
        if index >= self.rows {
            return Err(Error::InvalidArgument(format!(
                "Row {} out of bounds (size: {})",
                index, self.rows
            )));
        }
        Ok(Value::Null)
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
        buffer.advance(rows);
        self.rows += rows;
        Ok(())
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        buffer.resize(buffer.len() + self.rows, 0);
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Box::new(ColumnNothing::new())
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
    fn test_placeholder_bytes() {
        let mut col = ColumnNothing::new();
        col.append_value(&Value::Null).unwrap();
        col.append_value(&Value::Null).unwrap();

        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0, 0]);

        let mut col2 = ColumnNothing::new();
        let mut reader = &buf[..];
        col2.load_from_buffer(&mut reader, 2).unwrap();
        assert_eq!(col2.size(), 2);
        assert_eq!(col2.value_at(1).unwrap(), Value::Null);
    }
}
