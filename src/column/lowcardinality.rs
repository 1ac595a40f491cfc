//! `LowCardinality(T)` columns.
//!
//! Dictionary encoding with its own framed sub-format. The per-column
//! prefix is a UInt64 serialization version. The body is:
//!
//! ```text
//! [u64 flags: index width in the low byte, feature bits above]
//! [u64 dictionary size] [dictionary, bulk of the base type]
//! [u64 index count]     [indices, UInt8/16/32/64 by dictionary size]
//! ```
//!
//! For `LowCardinality(Nullable(T))` the dictionary is serialized as plain
//! `T` with index 0 reserved for null. The writer emits the standard form:
//! additional keys present, no global dictionary.

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
use std::collections::HashMap;

/// Serialization version: shared dictionaries with additional keys.
const KEYS_SERIALIZATION_VERSION: u64 = 1;

const HAS_ADDITIONAL_KEYS_BIT: u64 = 1 << 9;
const NEEDS_GLOBAL_DICTIONARY_BIT: u64 = 1 << 8;
const NEEDS_UPDATE_DICTIONARY_BIT: u64 = 1 << 10;

/// Low-cardinality column: a dictionary of unique values plus per-row
/// indices into it.
pub struct ColumnLowCardinality {
    type_: Type,
    inner_nullable: bool,
    dictionary: ColumnRef,
    indices: Vec<u64>,
    index_of: HashMap<Value, u64>,
}

impl ColumnLowCardinality {
    pub fn new(type_: Type) -> Result<Self> {
        let inner = match &type_ {
            Type::LowCardinality { nested_type } => nested_type.as_ref(),
            other => {
                return Err(Error::TypeMismatch {
                    expected: "LowCardinality".to_string(),
                    actual: other.name(),
                });
            }
        };

        // The dictionary is keyed on the base type; a Nullable inner type
        // reserves dictionary index 0 for null.
        let (base_type, inner_nullable) = match inner {
            Type::Nullable { nested_type } => (nested_type.as_ref(), true),
            other => (other, false),
        };

        let mut dictionary = create_column(base_type)?;
        if inner_nullable {
            dictionary.append_value(&base_type.default_value())?;
        }

        Ok(Self {
            type_,
            inner_nullable,
            dictionary,
            indices: Vec::new(),
            index_of: HashMap::new(),
        })
    }

    pub fn dictionary_size(&self) -> usize {
        self.dictionary.size()
    }

    pub fn index_at(&self, index: usize) -> u64 {
        self.indices[index]
    }

    fn index_width(dictionary_size: usize) -> u64 {
        if dictionary_size <= u8::MAX as usize {
            0
        } else if dictionary_size <= u16::MAX as usize {
            1
        } else if dictionary_size <= u32::MAX as usize {
            2
        } else {
            3
        }
    }

    fn rebuild_lookup(&mut self) -> Result<()> {
        self.index_of.clear();
        let start = if self.inner_nullable { 1 } else { 0 };
        for i in start..self.dictionary.size() {
            self.index_of.insert(self.dictionary.value_at(i)?, i as u64);
        }
        Ok(())
    }
}

impl Column for ColumnLowCardinality {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.indices.len()
    }

    fn clear(&mut self) {
        self.indices.clear();
        self.index_of.clear();
        self.dictionary.clear();
        if self.inner_nullable {
            // Re-seed the null slot
            let base_default = match &self.type_ {
                Type::LowCardinality { nested_type } => {
                    match nested_type.as_ref() {
                        Type::Nullable { nested_type } => {
                            nested_type.default_value()
                        }
                        other => other.default_value(),
                    }
                }
                _ => Value::Null,
            };
            let _ = self.dictionary.append_value(&base_default);
        }
    }

    fn reserve(&mut self, additional: usize) {
        self.indices.reserve(additional);
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        if value.is_null() {
            if !self.inner_nullable {
                return Err(super::conversion_error(&self.type_, value));
            }
            self.indices.push(0);
            return Ok(());
        }

        if let Some(&index) = self.index_of.get(value) {
            self.indices.push(index);
            return Ok(());
        }

        self.dictionary.append_value(value).map_err(|e| {
            Error::ValueConversion {
                target: self.type_.name(),
                message: e.to_string(),
            }
        })?;
        let index = (self.dictionary.size() - 1) as u64;
        self.index_of.insert(value.clone(), index);
        self.indices.push(index);
        Ok(())
    }

    fn value_at(&self, index: usize) -> Result<Value> {
        let dict_index = *self.indices.get(index).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "Row {} out of bounds (size: {})",
                index,
                self.indices.len()
            ))
        })?;

        if self.inner_nullable && dict_index == 0 {
            return Ok(Value::Null);
        }
        self.dictionary.value_at(dict_index as usize)
    }

    fn load_prefix(&mut self, buffer: &mut &[u8], _rows: usize) -> Result<()> {
        if buffer.len() < 8 {
            return Err(Error::ShortRead {
                needed: 8,
                available: buffer.len(),
            });
        }
        let version = buffer.get_u64_le();
        if version != KEYS_SERIALIZATION_VERSION {
            return Err(Error::Protocol(format!(
                "Unsupported LowCardinality serialization version: {}",
                version
            )));
        }
        Ok(())
    }

    // The body is present whenever the writer ran, even for zero rows (an
    // empty column nested inside an Array still serializes its dictionary
    // framing), so no early return on rows == 0.
    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        if buffer.len() < 16 {
            return Err(Error::ShortRead {
                needed: 16,
                available: buffer.len(),
            });
        }

        let flags = buffer.get_u64_le();
        if flags & HAS_ADDITIONAL_KEYS_BIT == 0 {
            return Err(Error::Protocol(
                "LowCardinality without additional keys is not supported"
                    .to_string(),
            ));
        }
        if flags & NEEDS_GLOBAL_DICTIONARY_BIT != 0 {
            return Err(Error::Protocol(
                "LowCardinality global dictionaries are not supported"
                    .to_string(),
            ));
        }

        let dictionary_size = buffer.get_u64_le() as usize;
        self.dictionary.clear();
        self.dictionary.load_from_buffer(buffer, dictionary_size)?;

        if buffer.len() < 8 {
            return Err(Error::ShortRead {
                needed: 8,
                available: buffer.len(),
            });
        }
        let index_count = buffer.get_u64_le() as usize;
        if index_count != rows {
            return Err(Error::Protocol(format!(
                "LowCardinality index count {} does not match row count {}",
                index_count, rows
            )));
        }

        let width_code = flags & 0xFF;
        self.indices.reserve(rows);
        for _ in 0..rows {
            let index = match width_code {
                0 => {
                    if buffer.is_empty() {
                        return Err(Error::ShortRead {
                            needed: 1,
                            available: 0,
                        });
                    }
                    buffer.get_u8() as u64
                }
                1 => {
                    if buffer.len() < 2 {
                        return Err(Error::ShortRead {
                            needed: 2,
                            available: buffer.len(),
                        });
                    }
                    buffer.get_u16_le() as u64
                }
                2 => {
                    if buffer.len() < 4 {
                        return Err(Error::ShortRead {
                            needed: 4,
                            available: buffer.len(),
                        });
                    }
                    buffer.get_u32_le() as u64
                }
                3 => {
                    if buffer.len() < 8 {
                        return Err(Error::ShortRead {
                            needed: 8,
                            available: buffer.len(),
                        });
                    }
                    buffer.get_u64_le()
                }
                other => {
                    return Err(Error::Protocol(format!(
                        "Unknown LowCardinality index width code: {}",
                        other
                    )));
                }
            };
            if index as usize >= dictionary_size {
                return Err(Error::Protocol(format!(
                    "LowCardinality index {} out of dictionary range {}",
                    index, dictionary_size
                )));
            }
            self.indices.push(index);
        }

        self.rebuild_lookup()
    }

    fn save_prefix(&self, buffer: &mut BytesMut) -> Result<()> {
        buffer.put_u64_le(KEYS_SERIALIZATION_VERSION);
        Ok(())
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        let dictionary_size = self.dictionary.size();
        let width_code = Self::index_width(dictionary_size);
        debug_assert_eq!(width_code & !0xFF, 0);

        // Standard client form: additional keys, no global dictionary, no
        // dictionary update request
        let flags = width_code | HAS_ADDITIONAL_KEYS_BIT;
        debug_assert_eq!(flags & NEEDS_GLOBAL_DICTIONARY_BIT, 0);
        debug_assert_eq!(flags & NEEDS_UPDATE_DICTIONARY_BIT, 0);
        buffer.put_u64_le(flags);

        buffer.put_u64_le(dictionary_size as u64);
        self.dictionary.save_to_buffer(buffer)?;

        buffer.put_u64_le(self.indices.len() as u64);
        for &index in &self.indices {
            match width_code {
                0 => buffer.put_u8(index as u8),
                1 => buffer.put_u16_le(index as u16),
                2 => buffer.put_u32_le(index as u32),
                _ => buffer.put_u64_le(index),
            }
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Box::new(
            ColumnLowCardinality::new(self.type_.clone())
                .expect("type already validated"),
        )
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
