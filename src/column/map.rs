//! `Map(K, V)` columns.
//!
//! A map column has the identical framing to `Array(Tuple(K, V))`:
//! cumulative UInt64 end-offsets, then the flattened key column, then the
//! flattened value column.

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

/// Map column: offsets plus flattened key and value columns.
pub struct ColumnMap {
    type_: Type,
    keys: ColumnRef,
    values: ColumnRef,
    offsets: Vec<u64>,
}

impl ColumnMap {
    pub fn new(type_: Type) -> Result<Self> {
        let (key_type, value_type) = match &type_ {
            Type::Map { key_type, value_type } => {
                (key_type.as_ref().clone(), value_type.as_ref().clone())
            }
            other => {
                return Err(Error::TypeMismatch {
                    expected: "Map".to_string(),
                    actual: other.name(),
                });
            }
        };

        Ok(Self {
            type_,
            keys: create_column(&key_type)?,
            values: create_column(&value_type)?,
            offsets: Vec::new(),
        })
    }

    /// Number of entries in the map at `index`.
    pub fn entry_count(&self, index: usize) -> usize {
        let end = self.offsets[index];
        let start = if index == 0 { 0 } else { self.offsets[index - 1] };
        (end - start) as usize
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }
}

impl Column for ColumnMap {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.offsets.len()
    }

    fn clear(&mut self) {
        self.offsets.clear();
        self.keys.clear();
        self.values.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.offsets.reserve(additional);
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        let entries = match value {
            Value::Map(entries) => entries,
            other => {
                return Err(super::conversion_error(&self.type_, other));
            }
        };

        // Validate entries up front so the key and value columns cannot end
        // up with different lengths
        for (i, (key, val)) in entries.iter().enumerate() {
            let mut key_probe = self.keys.clone_empty();
            let mut value_probe = self.values.clone_empty();
            key_probe.append_value(key).map_err(|e| {
                Error::ValueConversion {
                    target: self.type_.name(),
                    message: format!("key {} rejected: {}", i, e),
                }
            })?;
            value_probe.append_value(val).map_err(|e| {
                Error::ValueConversion {
                    target: self.type_.name(),
                    message: format!("value {} rejected: {}", i, e),
                }
            })?;
        }

        for (key, val) in entries {
            self.keys.append_value(key)?;
            self.values.append_value(val)?;
        }
        self.offsets.push(self.keys.size() as u64);
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

        let mut entries = Vec::with_capacity(end - start);
        for row in start..end {
            entries
                .push((self.keys.value_at(row)?, self.values.value_at(row)?));
        }
        Ok(Value::Map(entries))
    }

    fn load_prefix(&mut self, buffer: &mut &[u8], rows: usize) -> Result<()> {
        self.keys.load_prefix(buffer, rows)?;
        self.values.load_prefix(buffer, rows)
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

        let existing_total = self.offsets.last().copied().unwrap_or(0);
        let mut last = 0u64;
        self.offsets.reserve(rows);
        for _ in 0..rows {
            let offset = buffer.get_u64_le();
            if offset < last {
                return Err(Error::Protocol(format!(
                    "Map offsets are not monotone: {} after {}",
                    offset, last
                )));
            }
            last = offset;
            self.offsets.push(existing_total + offset);
        }

        self.keys.load_from_buffer(buffer, last as usize)?;
        self.values.load_from_buffer(buffer, last as usize)
    }

    fn save_prefix(&self, buffer: &mut BytesMut) -> Result<()> {
        self.keys.save_prefix(buffer)?;
        self.values.save_prefix(buffer)
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        for &offset in &self.offsets {
            buffer.put_u64_le(offset);
        }
        self.keys.save_to_buffer(buffer)?;
        self.values.save_to_buffer(buffer)
    }

    fn clone_empty(&self) -> ColumnRef {
        Box::new(ColumnMap {
            type_: self.type_.clone(),
            keys: self.keys.clone_empty(),
            values: self.values.clone_empty(),
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
