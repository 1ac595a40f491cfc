//! Date and time columns.
//!
//! Wire formats:
//! - `Date`: UInt16 days since 1970-01-01, UTC.
//! - `Date32`: Int32 days since 1970-01-01, may be negative.
//! - `DateTime('TZ')`: UInt32 seconds since the epoch. The timezone
//!   parameter annotates presentation only; the wire value is always UTC.
//! - `DateTime64(P, 'TZ')`: Int64 ticks of 10^-P seconds.
//!
//! Values are stored unshifted; projecting into a display timezone is the
//! caller's concern.

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

macro_rules! out_of_bounds {
    ($index:expr, $len:expr) => {
        Error::InvalidArgument(format!(
            "Row {} out of bounds (size: {})",
            $index, $len
        ))
    };
}

/// `Date`: days since epoch as UInt16.
pub struct ColumnDate {
    type_: Type,
    data: Vec<u16>,
}

impl ColumnDate {
    pub fn new() -> Self {
        Self { type_: Type::date(), data: Vec::new() }
    }

    pub fn append(&mut self, days: u16) {
        self.data.push(days);
    }

    pub fn at(&self, index: usize) -> u16 {
        self.data[index]
    }
}

impl Default for ColumnDate {
    fn default() -> Self {
        Self::new()
    }
}

impl Column for ColumnDate {
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
        let days = match value {
            Value::Date(d) => Some(*d),
            other => other.as_uint().and_then(|v| u16::try_from(v).ok()),
        }
        .ok_or_else(|| conversion_error(&self.type_, value))?;
        self.data.push(days);
        Ok(())
    }

    fn value_at(&self, index: usize) -> Result<Value> {
        self.data
            .get(index)
            .map(|&d| Value::Date(d))
            .ok_or_else(|| out_of_bounds!(index, self.data.len()))
    }

    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        if buffer.len() < rows * 2 {
            return Err(Error::ShortRead {
                needed: rows * 2,
                available: buffer.len(),
            });
        }
        self.data.reserve(rows);
        for _ in 0..rows {
            self.data.push(buffer.get_u16_le());
        }
        Ok(())
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        for &days in &self.data {
            buffer.put_u16_le(days);
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Box::new(ColumnDate::new())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// `Date32`: days since epoch as Int32.
pub struct ColumnDate32 {
    type_: Type,
    data: Vec<i32>,
}

impl ColumnDate32 {
    pub fn new() -> Self {
        Self { type_: Type::date32(), data: Vec::new() }
    }

    pub fn append(&mut self, days: i32) {
        self.data.push(days);
    }

    pub fn at(&self, index: usize) -> i32 {
        self.data[index]
    }
}

impl Default for ColumnDate32 {
    fn default() -> Self {
        Self::new()
    }
}

impl Column for ColumnDate32 {
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
        let days = match value {
            Value::Date32(d) => Some(*d),
            Value::Date(d) => Some(*d as i32),
            other => other.as_int().and_then(|v| i32::try_from(v).ok()),
        }
        .ok_or_else(|| conversion_error(&self.type_, value))?;
        self.data.push(days);
        Ok(())
    }

    fn value_at(&self, index: usize) -> Result<Value> {
        self.data
            .get(index)
            .map(|&d| Value::Date32(d))
            .ok_or_else(|| out_of_bounds!(index, self.data.len()))
    }

    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        if buffer.len() < rows * 4 {
            return Err(Error::ShortRead {
                needed: rows * 4,
                available: buffer.len(),
            });
        }
        self.data.reserve(rows);
        for _ in 0..rows {
            self.data.push(buffer.get_i32_le());
        }
        Ok(())
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        for &days in &self.data {
            buffer.put_i32_le(days);
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Box::new(ColumnDate32::new())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// `DateTime`: seconds since epoch as UInt32, with an optional display
/// timezone in the type.
pub struct ColumnDateTime {
    type_: Type,
    data: Vec<u32>,
}

impl ColumnDateTime {
    pub fn new(type_: Type) -> Self {
        debug_assert!(matches!(type_, Type::DateTime { .. }));
        Self { type_, data: Vec::new() }
    }

    pub fn append(&mut self, seconds: u32) {
        self.data.push(seconds);
    }

    pub fn at(&self, index: usize) -> u32 {
        self.data[index]
    }

    /// The display timezone from the type, if any.
    pub fn timezone(&self) -> Option<&str> {
        match &self.type_ {
            Type::DateTime { timezone } => timezone.as_deref(),
            _ => None,
        }
    }
}

impl Column for ColumnDateTime {
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
        let seconds = match value {
            Value::DateTime(s) => Some(*s),
            other => other.as_uint().and_then(|v| u32::try_from(v).ok()),
        }
        .ok_or_else(|| conversion_error(&self.type_, value))?;
        self.data.push(seconds);
        Ok(())
    }

    fn value_at(&self, index: usize) -> Result<Value> {
        self.data
            .get(index)
            .map(|&s| Value::DateTime(s))
            .ok_or_else(|| out_of_bounds!(index, self.data.len()))
    }

    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        if buffer.len() < rows * 4 {
            return Err(Error::ShortRead {
                needed: rows * 4,
                available: buffer.len(),
            });
        }
        self.data.reserve(rows);
        for _ in 0..rows {
            self.data.push(buffer.get_u32_le());
        }
        Ok(())
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        for &seconds in &self.data {
            buffer.put_u32_le(seconds);
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Box::new(ColumnDateTime::new(self.type_.clone()))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// `DateTime64(P)`: Int64 ticks where one tick is 10^-P seconds.
pub struct ColumnDateTime64 {
    type_: Type,
    precision: usize,
    data: Vec<i64>,
}

impl ColumnDateTime64 {
    pub fn new(type_: Type) -> Result<Self> {
        let precision = match &type_ {
            Type::DateTime64 { precision, .. } => *precision,
            other => {
                return Err(Error::TypeMismatch {
                    expected: "DateTime64".to_string(),
                    actual: other.name(),
                });
            }
        };
        Ok(Self { type_, precision, data: Vec::new() })
    }

    pub fn append(&mut self, ticks: i64) {
        self.data.push(ticks);
    }

    pub fn at(&self, index: usize) -> i64 {
        self.data[index]
    }

    pub fn precision(&self) -> usize {
        self.precision
    }
}

impl Column for ColumnDateTime64 {
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
        let ticks = match value {
            Value::DateTime64(t) => Some(*t),
            other => other.as_int().and_then(|v| i64::try_from(v).ok()),
        }
        .ok_or_else(|| conversion_error(&self.type_, value))?;
        self.data.push(ticks);
        Ok(())
    }

    fn value_at(&self, index: usize) -> Result<Value> {
        self.data
            .get(index)
            .map(|&t| Value::DateTime64(t))
            .ok_or_else(|| out_of_bounds!(index, self.data.len()))
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
        self.data.reserve(rows);
        for _ in 0..rows {
            self.data.push(buffer.get_i64_le());
        }
        Ok(())
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        for &ticks in &self.data {
            buffer.put_i64_le(ticks);
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Box::new(ColumnDateTime64 {
            type_: self.type_.clone(),
            precision: self.precision,
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
