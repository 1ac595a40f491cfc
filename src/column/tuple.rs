//! `Tuple(T1, ..., Tk)` columns.
//!
//! Each element type is serialized as its own bulk column of length `n`,
//! in declaration order, end to end. Nothing is interleaved per row.

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
use bytes::BytesMut;

/// Tuple column: one sub-column per element type.
pub struct ColumnTuple {
    type_: Type,
    columns: Vec<ColumnRef>,
}

impl ColumnTuple {
    pub fn new(type_: Type) -> Result<Self> {
        let item_types = match &type_ {
            Type::Tuple { item_types } => item_types.clone(),
            other => {
                return Err(Error::TypeMismatch {
                    expected: "Tuple".to_string(),
                    actual: other.name(),
                });
            }
        };

        let mut columns = Vec::with_capacity(item_types.len());
        for item_type in &item_types {
            columns.push(create_column(item_type)?);
        }
        Ok(Self { type_, columns })
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, index: usize) -> &dyn Column {
        self.columns[index].as_ref()
    }
}

impl Column for ColumnTuple {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.columns.first().map_or(0, |c| c.size())
    }

    fn clear(&mut self) {
        for column in &mut self.columns {
            column.clear();
        }
    }

    fn reserve(&mut self, additional: usize) {
        for column in &mut self.columns {
            column.reserve(additional);
        }
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        let items = match value {
            Value::Tuple(items) if items.len() == self.columns.len() => items,
            other => {
                return Err(super::conversion_error(&self.type_, other));
            }
        };

        // Validate every element before mutating so a failure cannot leave
        // sub-columns at different lengths
        for (i, (column, item)) in
            self.columns.iter().zip(items.iter()).enumerate()
        {
            let mut probe = column.clone_empty();
            probe.append_value(item).map_err(|e| Error::ValueConversion {
                target: self.type_.name(),
                message: format!("element {} rejected: {}", i, e),
            })?;
        }

        for (column, item) in self.columns.iter_mut().zip(items.iter()) {
            column.append_value(item)?;
        }
        Ok(())
    }

    fn value_at(&self, index: usize) -> Result<Value> {
        if index >= self.size() {
            return Err(Error::InvalidArgument(format!(
                "Row {} out of bounds (size: {})",
                index,
                self.size()
            )));
        }

        let mut items = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            items.push(column.value_at(index)?);
        }
        Ok(Value::Tuple(items))
    }

    fn load_prefix(&mut self, buffer: &mut &[u8], rows: usize) -> Result<()> {
        for column in &mut self.columns {
            column.load_prefix(buffer, rows)?;
        }
        Ok(())
    }

    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        for column in &mut self.columns {
            column.load_from_buffer(buffer, rows)?;
        }
        Ok(())
    }

    fn save_prefix(&self, buffer: &mut BytesMut) -> Result<()> {
        for column in &self.columns {
            column.save_prefix(buffer)?;
        }
        Ok(())
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        for column in &self.columns {
            column.save_to_buffer(buffer)?;
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Box::new(ColumnTuple {
            type_: self.type_.clone(),
            columns: self.columns.iter().map(|c| c.clone_empty()).collect(),
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

    fn int_string_tuple() -> ColumnTuple {
        ColumnTuple::new(Type::tuple(vec![Type::int32(), Type::string()]))
            .unwrap()
    }

    #[test]
    fn test_append_and_read_back() {
        let mut col = int_string_tuple();
        col.append_value(&Value::Tuple(vec![
            Value::Int32(1),
            Value::from("one"),
        ]))
        .unwrap();
        col.append_value(&Value::Tuple(vec![
            Value::Int32(2),
            Value::from("two"),
        ]))
        .unwrap();

        assert_eq!(col.size(), 2);
        assert_eq!(
            col.value_at(1).unwrap(),
            Value::Tuple(vec![Value::Int32(2), Value::from("two")])
        );
    }

    #[test]
    fn test_wire_is_column_major() {
        let mut col = int_string_tuple();
        col.append_value(&Value::Tuple(vec![
            Value::Int32(1),
            Value::from("a"),
        ]))
        .unwrap();
        col.append_value(&Value::Tuple(vec![
            Value::Int32(2),
            Value::from("b"),
        ]))
        .unwrap();

        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();

        // Both int32s first, then both strings
        assert_eq!(
            &buf[..],
            &[
                0x01, 0, 0, 0, //
                0x02, 0, 0, 0, //
                0x01, b'a', //
                0x01, b'b',
            ]
        );
    }

    #[test]
    fn test_roundtrip() {
        let mut col = int_string_tuple();
        col.append_value(&Value::Tuple(vec![
            Value::Int32(-7),
            Value::from("x"),
        ]))
        .unwrap();

        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();

        let mut col2 = int_string_tuple();
        let mut reader = &buf[..];
        col2.load_from_buffer(&mut reader, 1).unwrap();
        assert_eq!(
            col2.value_at(0).unwrap(),
            Value::Tuple(vec![Value::Int32(-7), Value::from("x")])
        );
    }

    #[test]
    fn test_arity_mismatch_rejected() {
        let mut col = int_string_tuple();
        assert!(col
            .append_value(&Value::Tuple(vec![Value::Int32(1)]))
            .is_err());
        assert!(col.append_value(&Value::Int32(1)).is_err());
        assert_eq!(col.size(), 0);
    }

    #[test]
    fn test_bad_element_keeps_columns_aligned() {
        let mut col = int_string_tuple();
        let bad =
            Value::Tuple(vec![Value::Int32(1), Value::Float64(2.0)]);
        assert!(col.append_value(&bad).is_err());
        assert_eq!(col.column(0).size(), 0);
        assert_eq!(col.column(1).size(), 0);
    }
}
