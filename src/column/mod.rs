//! Columnar buffers for every supported ClickHouse type.
//!
//! Each column owns its typed contiguous value buffer plus whatever
//! side-band vectors its type needs (null maps, array offsets, dictionary
//! indices). A [`crate::block::Block`] owns its columns exclusively; columns
//! hold no reference back to their block.
//!
//! ClickHouse enforces strict nesting rules: `Nullable` may not wrap
//! `Array`, `Map`, `Tuple` or `LowCardinality` (use `Array(Nullable(T))`
//! and `LowCardinality(Nullable(T))` instead). The type parser rejects
//! those spellings before a column is ever built.

pub mod array;
pub mod date;
pub mod decimal;
pub mod enum_column;
pub mod ip;
pub mod lowcardinality;
pub mod map;
pub mod nothing;
pub mod nullable;
pub mod numeric;
pub mod string;
pub mod tuple;
pub mod uuid;

pub use array::ColumnArray;
pub use date::{
    ColumnDate,
    ColumnDate32,
    ColumnDateTime,
    ColumnDateTime64,
};
pub use decimal::ColumnDecimal;
pub use enum_column::{
    ColumnEnum16,
    ColumnEnum8,
};
pub use ip::{
    ColumnIpv4,
    ColumnIpv6,
};
pub use lowcardinality::ColumnLowCardinality;
pub use map::ColumnMap;
pub use nothing::ColumnNothing;
pub use nullable::ColumnNullable;
pub use numeric::*;
pub use string::{
    ColumnFixedString,
    ColumnString,
};
pub use tuple::ColumnTuple;
pub use uuid::ColumnUuid;

use crate::{
    types::{
        Type,
        TypeCode,
    },
    value::Value,
    Error,
    Result,
};
use bytes::BytesMut;

/// An owned column trait object.
pub type ColumnRef = Box<dyn Column>;

/// Base trait for all column types. Serialization works on in-memory byte
/// buffers to keep the trait dyn-compatible; the async boundary lives in
/// [`crate::io::block_stream`].
pub trait Column: Send + Sync {
    /// The descriptor of this column.
    fn column_type(&self) -> &Type;

    /// Number of rows currently held.
    fn size(&self) -> usize;

    /// Drop all rows, keeping the type.
    fn clear(&mut self);

    /// Reserve room for `additional` more rows.
    fn reserve(&mut self, additional: usize);

    /// Convert one logical value into this column's wire representation and
    /// push it. On failure the column is unchanged.
    fn append_value(&mut self, value: &Value) -> Result<()>;

    /// Read one cell back as a logical value.
    fn value_at(&self, index: usize) -> Result<Value>;

    /// Consume per-column prefix data preceding the body. Only types with a
    /// framed sub-format (LowCardinality) override this.
    fn load_prefix(&mut self, _buffer: &mut &[u8], _rows: usize) -> Result<()> {
        Ok(())
    }

    /// Append `rows` rows decoded from `buffer`.
    fn load_from_buffer(&mut self, buffer: &mut &[u8], rows: usize)
        -> Result<()>;

    /// Emit per-column prefix data preceding the body.
    fn save_prefix(&self, _buffer: &mut BytesMut) -> Result<()> {
        Ok(())
    }

    /// Emit all rows: side-band vectors first, then the primary payload, in
    /// the order the type dictates.
    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()>;

    /// A fresh, empty column of the same type.
    fn clone_empty(&self) -> ColumnRef;

    /// Downcast support.
    fn as_any(&self) -> &dyn std::any::Any;

    /// Mutable downcast support.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

/// Build an empty column for a type descriptor.
pub fn create_column(type_: &Type) -> Result<ColumnRef> {
    match type_ {
        Type::Simple(code) => match code {
            TypeCode::UInt8 => Ok(Box::new(ColumnUInt8::new())),
            TypeCode::UInt16 => Ok(Box::new(ColumnUInt16::new())),
            TypeCode::UInt32 => Ok(Box::new(ColumnUInt32::new())),
            TypeCode::UInt64 => Ok(Box::new(ColumnUInt64::new())),
            TypeCode::UInt128 => Ok(Box::new(ColumnUInt128::new())),
            TypeCode::Int8 => Ok(Box::new(ColumnInt8::new())),
            TypeCode::Int16 => Ok(Box::new(ColumnInt16::new())),
            TypeCode::Int32 => Ok(Box::new(ColumnInt32::new())),
            TypeCode::Int64 => Ok(Box::new(ColumnInt64::new())),
            TypeCode::Int128 => Ok(Box::new(ColumnInt128::new())),
            TypeCode::Float32 => Ok(Box::new(ColumnFloat32::new())),
            TypeCode::Float64 => Ok(Box::new(ColumnFloat64::new())),
            TypeCode::String => Ok(Box::new(ColumnString::new())),
            TypeCode::Date => Ok(Box::new(ColumnDate::new())),
            TypeCode::Date32 => Ok(Box::new(ColumnDate32::new())),
            TypeCode::Uuid => Ok(Box::new(ColumnUuid::new())),
            TypeCode::Ipv4 => Ok(Box::new(ColumnIpv4::new())),
            TypeCode::Ipv6 => Ok(Box::new(ColumnIpv6::new())),
            TypeCode::Nothing => Ok(Box::new(ColumnNothing::new())),
            _ => Err(Error::Protocol(format!(
                "Cannot create column for type: {}",
                type_.name()
            ))),
        },
        Type::FixedString { size } => {
            Ok(Box::new(ColumnFixedString::new(*size)))
        }
        Type::DateTime { .. } => {
            Ok(Box::new(ColumnDateTime::new(type_.clone())))
        }
        Type::DateTime64 { .. } => {
            Ok(Box::new(ColumnDateTime64::new(type_.clone())?))
        }
        Type::Decimal { .. } => Ok(Box::new(ColumnDecimal::new(type_.clone())?)),
        Type::Enum8 { .. } => Ok(Box::new(ColumnEnum8::new(type_.clone())?)),
        Type::Enum16 { .. } => Ok(Box::new(ColumnEnum16::new(type_.clone())?)),
        Type::Nullable { .. } => {
            Ok(Box::new(ColumnNullable::new(type_.clone())?))
        }
        Type::Array { .. } => Ok(Box::new(ColumnArray::new(type_.clone())?)),
        Type::Tuple { .. } => Ok(Box::new(ColumnTuple::new(type_.clone())?)),
        Type::Map { .. } => Ok(Box::new(ColumnMap::new(type_.clone())?)),
        Type::LowCardinality { .. } => {
            Ok(Box::new(ColumnLowCardinality::new(type_.clone())?))
        }
    }
}

/// Standard conversion failure for `append_value` implementations.
pub(crate) fn conversion_error(target: &Type, value: &Value) -> Error {
    Error::ValueConversion {
        target: target.name(),
        message: format!("incompatible value of kind {}", value.kind_name()),
    }
}
