//! `Enum8` and `Enum16` columns.
//!
//! On the wire an enum column is just its underlying signed integer
//! (`Int8` or `Int16`); the `'name' = value` table from the type is a
//! client-side lookup.

use super::{
    conversion_error,
    Column,
    ColumnRef,
};
use crate::{
    types::{
        EnumItem,
        Type,
    },
    value::Value,
    Error,
    Result,
};
use bytes::{
    Buf,
    BufMut,
    BytesMut,
};

macro_rules! enum_column {
    ($name:ident, $repr:ty, $variant:ident, $get:ident, $put:ident) => {
        pub struct $name {
            type_: Type,
            items: Vec<EnumItem>,
            data: Vec<$repr>,
        }

        impl $name {
            pub fn new(type_: Type) -> Result<Self> {
                let items = match &type_ {
                    Type::$variant { items } => items.clone(),
                    other => {
                        return Err(Error::TypeMismatch {
                            expected: stringify!($variant).to_string(),
                            actual: other.name(),
                        });
                    }
                };
                Ok(Self { type_, items, data: Vec::new() })
            }

            /// Append by numeric value; the value must appear in the table.
            pub fn append(&mut self, value: $repr) -> Result<()> {
                if self.name_of(value).is_none() {
                    return Err(Error::ValueConversion {
                        target: self.type_.name(),
                        message: format!("{} is not in the enum table", value),
                    });
                }
                self.data.push(value);
                Ok(())
            }

            /// Append by entry name.
            pub fn append_name(&mut self, name: &str) -> Result<()> {
                let value = self.value_of(name).ok_or_else(|| {
                    Error::ValueConversion {
                        target: self.type_.name(),
                        message: format!(
                            "'{}' is not in the enum table",
                            name
                        ),
                    }
                })?;
                self.data.push(value);
                Ok(())
            }

            /// Numeric value at `index`; panics when out of bounds.
            pub fn at(&self, index: usize) -> $repr {
                self.data[index]
            }

            /// Entry name at `index`, if the stored value is in the table.
            pub fn name_at(&self, index: usize) -> Option<&str> {
                self.name_of(self.data[index])
            }

            pub fn name_of(&self, value: $repr) -> Option<&str> {
                self.items
                    .iter()
                    .find(|item| item.value == value as i16)
                    .map(|item| item.name.as_str())
            }

            pub fn value_of(&self, name: &str) -> Option<$repr> {
                self.items
                    .iter()
                    .find(|item| item.name == name)
                    .map(|item| item.value as $repr)
            }
        }

        impl Column for $name {
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
                    Value::Enum(v) => {
                        let narrowed =
                            <$repr>::try_from(*v).map_err(|_| {
                                conversion_error(&self.type_, value)
                            })?;
                        self.append(narrowed)
                    }
                    Value::String(bytes) => {
                        let name =
                            std::str::from_utf8(bytes).map_err(|_| {
                                conversion_error(&self.type_, value)
                            })?;
                        self.append_name(name)
                    }
                    other => match other.as_int() {
                        Some(v) => {
                            let narrowed =
                                <$repr>::try_from(v).map_err(|_| {
                                    conversion_error(&self.type_, value)
                                })?;
                            self.append(narrowed)
                        }
                        None => Err(conversion_error(&self.type_, value)),
                    },
                }
            }

            fn value_at(&self, index: usize) -> Result<Value> {
                self.data
                    .get(index)
                    .map(|&v| Value::Enum(v as i16))
                    .ok_or_else(|| {
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
                let width = std::mem::size_of::<$repr>();
                if buffer.len() < rows * width {
                    return Err(Error::ShortRead {
                        needed: rows * width,
                        available: buffer.len(),
                    });
                }
                self.data.reserve(rows);
                for _ in 0..rows {
                    self.data.push(buffer.$get());
                }
                Ok(())
            }

            fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
                for &value in &self.data {
                    buffer.$put(value);
                }
                Ok(())
            }

            fn clone_empty(&self) -> ColumnRef {
                Box::new($name {
                    type_: self.type_.clone(),
                    items: self.items.clone(),
                    data: Vec::new(),
                })
            }

            fn as_any(&self) -> &dyn std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
                self
            }
        }
    };
}

enum_column!(ColumnEnum8, i8, Enum8, get_i8, put_i8);
enum_column!(ColumnEnum16, i16, Enum16, get_i16_le, put_i16_le);
