//! `Array(T)` columns.
//!
//! On the wire: `n` cumulative UInt64 end-offsets, then the flattened inner
//! column of length `offsets[n-1]`. Offsets are ends, not lengths, so they
//! are monotonically non-decreasing.

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

/// Array column: cumulative offsets plus a flattened element column.
pub struct ColumnArray {
    type_: Type,
    nested: ColumnRef,
    offsets: Vec<u64>,
}

impl ColumnArray {
    pub fn new(type_: Type) -> Result<Self> {
        let item_type = match &type_ {
            Type::Array { item_type } => item_type.as_ref().clone(),
            other => {
                return Err(Error::TypeMismatch {
                    expected: "Array".to_string(),
                    actual: other.name(),
                });
            }
        };

        let nested = create_column(&item_type)?;
        Ok(Self { type_, nested, offsets: Vec::new() })
    }

    /// Length of the array at `index`.
    pub fn array_len(&self, index: usize) -> usize {
        let end = self.offsets[index];
        let start = if index == 0 { 0 } else { self.offsets[index - 1] };
        (end - start) as usize
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    pub fn nested(&self) -> &dyn Column {
        self.nested.as_ref()
    }
}

impl Column for ColumnArray {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.offsets.len()
    }

    fn clear(&mut self) {
        self.offsets.clear();
        self.nested.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.offsets.reserve(additional);
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        let items = match value {
            Value::Array(items) => items,
            other => {
                return Err(super::conversion_error(&self.type_, other));
            }
        };

        let rollback = self.nested.size();
        for (i, item) in items.iter().enumerate() {
            if let Err(e) = self.nested.append_value(item) {
                // Restore the nested column by rebuilding the committed rows
                let mut replacement = self.nested.clone_empty();
                for row in 0..rollback {
                    replacement.append_value(&self.nested.value_at(row)?)?;
                }
                self.nested = replacement;
                return Err(Error::ValueConversion {
                    target: self.type_.name(),
                    message: format!("element {} rejected: {}", i, e),
                });
            }
        }

        self.offsets.push(self.nested.size() as u64);
        Ok(())
    }

    fn value_at(&self, index: usize) -> Result<Value> {
        if index >= self.offsets.len() {
            return Err(Error::InvalidArgument(format!(
                "Row {} out of bounds (size: {})",
                index,
                self.offsets.len()
            )));
        }

        let end = self.offsets[index] as usize;
        let start =
            if index == 0 { 0 } else { self.offsets[index - 1] as usize };

        let mut items = Vec::with_capacity(end - start);
        for row in start..end {
            items.push(self.nested.value_at(row)?);
        }
        Ok(Value::Array(items))
    }

    fn load_prefix(&mut self, buffer: &mut &[u8], rows: usize) -> Result<()> {
        self.nested.load_prefix(buffer, rows)
    }

    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        if buffer.len() < rows * 8 {
            return Err(Error::ShortRead {
                needed: rows * 8,
                available: buffer.len(),
            });
        }

        let existing_total =
            self.offsets.last().copied().unwrap_or(0);
        let mut last = 0u64;
        self.offsets.reserve(rows);
        for _ in 0..rows {
            let offset = buffer.get_u64_le();
            if offset < last {
                return Err(Error::Protocol(format!(
                    "Array offsets are not monotone: {} after {}",
                    offset, last
                )));
            }
            last = offset;
            self.offsets.push(existing_total + offset);
        }

        self.nested.load_from_buffer(buffer, last as usize)
    }

    fn save_prefix(&self, buffer: &mut BytesMut) -> Result<()> {
        self.nested.save_prefix(buffer)
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        for &offset in &self.offsets {
            buffer.put_u64_le(offset);
        }
        self.nested.save_to_buffer(buffer)
    }

    fn clone_empty(&self) -> ColumnRef {
        Box::new(ColumnArray {
            type_: self.type_.clone(),
            nested: self.nested.clone_empty(),
            offsets: Vec::new(),
        })
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
