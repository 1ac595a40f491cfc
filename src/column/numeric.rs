//! Fixed-width numeric columns.
//!
//! All integer and float types are raw little-endian on the wire, `n`
//! elements back to back with no framing:
//!
//! | Type | Rust type | Width |
//! |------|-----------|-------|
//! | `Int8`..`Int128` | `i8`..`i128` | 1..16 bytes |
//! | `UInt8`..`UInt128` | `u8`..`u128` | 1..16 bytes |
//! | `Float32`/`Float64` | `f32`/`f64` | IEEE-754 LE |
//!
//! `Bool` is an alias for `UInt8` with 0 = false, 1 = true.

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

/// A primitive that knows its wire encoding and its `Value` mapping.
pub trait Primitive: Copy + Send + Sync + 'static {
    fn wire_type() -> Type;
    fn read_from(buffer: &mut &[u8]) -> Result<Self>;
    fn write_to(self, buffer: &mut BytesMut);
    fn from_value(value: &Value) -> Option<Self>;
    fn into_value(self) -> Value;
}

macro_rules! impl_int_primitive {
    ($type:ty, $factory:ident, $get:ident, $put:ident, $variant:ident) => {
        impl Primitive for $type {
            fn wire_type() -> Type {
                Type::$factory()
            }

            fn read_from(buffer: &mut &[u8]) -> Result<Self> {
                let width = std::mem::size_of::<$type>();
                if buffer.len() < width {
                    return Err(Error::ShortRead {
                        needed: width,
                        available: buffer.len(),
                    });
                }
                Ok(buffer.$get())
            }

            fn write_to(self, buffer: &mut BytesMut) {
                buffer.$put(self);
            }

            fn from_value(value: &Value) -> Option<Self> {
                value.as_int().and_then(|v| <$type>::try_from(v).ok())
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }
        }
    };
}

impl_int_primitive!(u8, uint8, get_u8, put_u8, UInt8);
impl_int_primitive!(u16, uint16, get_u16_le, put_u16_le, UInt16);
impl_int_primitive!(u32, uint32, get_u32_le, put_u32_le, UInt32);
impl_int_primitive!(u64, uint64, get_u64_le, put_u64_le, UInt64);
impl_int_primitive!(i8, int8, get_i8, put_i8, Int8);
impl_int_primitive!(i16, int16, get_i16_le, put_i16_le, Int16);
impl_int_primitive!(i32, int32, get_i32_le, put_i32_le, Int32);
impl_int_primitive!(i64, int64, get_i64_le, put_i64_le, Int64);

impl Primitive for i128 {
    fn wire_type() -> Type {
        Type::int128()
    }

    fn read_from(buffer: &mut &[u8]) -> Result<Self> {
        if buffer.len() < 16 {
            return Err(Error::ShortRead {
                needed: 16,
                available: buffer.len(),
            });
        }
        Ok(buffer.get_i128_le())
    }

    fn write_to(self, buffer: &mut BytesMut) {
        buffer.put_i128_le(self);
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_int()
    }

    fn into_value(self) -> Value {
        Value::Int128(self)
    }
}

impl Primitive for u128 {
    fn wire_type() -> Type {
        Type::uint128()
    }

    fn read_from(buffer: &mut &[u8]) -> Result<Self> {
        if buffer.len() < 16 {
            return Err(Error::ShortRead {
                needed: 16,
                available: buffer.len(),
            });
        }
        Ok(buffer.get_u128_le())
    }

    fn write_to(self, buffer: &mut BytesMut) {
        buffer.put_u128_le(self);
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_uint()
    }

    fn into_value(self) -> Value {
        Value::UInt128(self)
    }
}

impl Primitive for f32 {
    fn wire_type() -> Type {
        Type::float32()
    }

    fn read_from(buffer: &mut &[u8]) -> Result<Self> {
        if buffer.len() < 4 {
            return Err(Error::ShortRead {
                needed: 4,
                available: buffer.len(),
            });
        }
        Ok(buffer.get_f32_le())
    }

    fn write_to(self, buffer: &mut BytesMut) {
        buffer.put_f32_le(self);
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float32(v) => Some(*v),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Float32(self)
    }
}

impl Primitive for f64 {
    fn wire_type() -> Type {
        Type::float64()
    }

    fn read_from(buffer: &mut &[u8]) -> Result<Self> {
        if buffer.len() < 8 {
            return Err(Error::ShortRead {
                needed: 8,
                available: buffer.len(),
            });
        }
        Ok(buffer.get_f64_le())
    }

    fn write_to(self, buffer: &mut BytesMut) {
        buffer.put_f64_le(self);
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }

    fn into_value(self) -> Value {
        Value::Float64(self)
    }
}

/// Generic column over a fixed-width primitive.
pub struct ColumnVector<T: Primitive> {
    type_: Type,
    data: Vec<T>,
}

impl<T: Primitive> ColumnVector<T> {
    pub fn new() -> Self {
        Self { type_: T::wire_type(), data: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { type_: T::wire_type(), data: Vec::with_capacity(capacity) }
    }

    pub fn from_vec(data: Vec<T>) -> Self {
        Self { type_: T::wire_type(), data }
    }

    pub fn append(&mut self, value: T) {
        self.data.push(value);
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.data.get(index)
    }

    /// Value at `index`; panics when out of bounds.
    pub fn at(&self, index: usize) -> T {
        self.data[index]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }
}

impl<T: Primitive> Default for ColumnVector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Primitive> Column for ColumnVector<T> {
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
        let converted = T::from_value(value)
            .ok_or_else(|| conversion_error(&self.type_, value))?;
        self.data.push(converted);
        Ok(())
    }

    fn value_at(&self, index: usize) -> Result<Value> {
        self.data
            .get(index)
            .map(|v| v.into_value())
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
        let width = std::mem::size_of::<T>();
        let bytes_needed = rows * width;
        if buffer.len() < bytes_needed {
            return Err(Error::ShortRead {
                needed: bytes_needed,
                available: buffer.len(),
            });
        }

        self.data.reserve(rows);
        for _ in 0..rows {
            self.data.push(T::read_from(buffer)?);
        }
        Ok(())
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        buffer.reserve(self.data.len() * std::mem::size_of::<T>());
        for &value in &self.data {
            value.write_to(buffer);
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Box::new(ColumnVector::<T>::new())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

pub type ColumnUInt8 = ColumnVector<u8>;
pub type ColumnUInt16 = ColumnVector<u16>;
pub type ColumnUInt32 = ColumnVector<u32>;
pub type ColumnUInt64 = ColumnVector<u64>;
pub type ColumnUInt128 = ColumnVector<u128>;

pub type ColumnInt8 = ColumnVector<i8>;
pub type ColumnInt16 = ColumnVector<i16>;
pub type ColumnInt32 = ColumnVector<i32>;
pub type ColumnInt64 = ColumnVector<i64>;
pub type ColumnInt128 = ColumnVector<i128>;

pub type ColumnFloat32 = ColumnVector<f32>;
pub type ColumnFloat64 = ColumnVector<f64>;
