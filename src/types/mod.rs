//! Type descriptors for ClickHouse data types.
//!
//! A [`Type`] identifies one ClickHouse type together with its parameters
//! (precision/scale, element types, timezone, enum tables). Two descriptors
//! are equal exactly when their canonical names are byte-equal, which is the
//! same identity the server uses.

pub mod parser;

pub use parser::{
    TypeParser,
    TypeRegistry,
};

use crate::value::Value;

/// Kind tag shared by all descriptors of one ClickHouse type family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    Nothing,
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    UInt128,
    Float32,
    Float64,
    String,
    FixedString,
    Date,
    Date32,
    DateTime,
    DateTime64,
    Decimal,
    Enum8,
    Enum16,
    Uuid,
    Ipv4,
    Ipv6,
    Array,
    Nullable,
    Tuple,
    Map,
    LowCardinality,
}

/// One `'name' = value` entry of an Enum8/Enum16 table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumItem {
    pub name: String,
    pub value: i16,
}

/// A ClickHouse type descriptor.
#[derive(Debug, Clone)]
pub enum Type {
    Simple(TypeCode),
    FixedString { size: usize },
    DateTime { timezone: Option<String> },
    DateTime64 { precision: usize, timezone: Option<String> },
    Decimal { precision: usize, scale: usize },
    Enum8 { items: Vec<EnumItem> },
    Enum16 { items: Vec<EnumItem> },
    Array { item_type: Box<Type> },
    Nullable { nested_type: Box<Type> },
    Tuple { item_types: Vec<Type> },
    Map { key_type: Box<Type>, value_type: Box<Type> },
    LowCardinality { nested_type: Box<Type> },
}

impl Type {
    pub fn code(&self) -> TypeCode {
        match self {
            Type::Simple(code) => *code,
            Type::FixedString { .. } => TypeCode::FixedString,
            Type::DateTime { .. } => TypeCode::DateTime,
            Type::DateTime64 { .. } => TypeCode::DateTime64,
            Type::Decimal { .. } => TypeCode::Decimal,
            Type::Enum8 { .. } => TypeCode::Enum8,
            Type::Enum16 { .. } => TypeCode::Enum16,
            Type::Array { .. } => TypeCode::Array,
            Type::Nullable { .. } => TypeCode::Nullable,
            Type::Tuple { .. } => TypeCode::Tuple,
            Type::Map { .. } => TypeCode::Map,
            Type::LowCardinality { .. } => TypeCode::LowCardinality,
        }
    }

    /// Canonical name, spelled the way the server spells it.
    pub fn name(&self) -> String {
        match self {
            Type::Simple(code) => simple_name(*code).to_string(),
            Type::FixedString { size } => format!("FixedString({})", size),
            Type::DateTime { timezone: None } => "DateTime".to_string(),
            Type::DateTime { timezone: Some(tz) } => {
                format!("DateTime('{}')", tz)
            }
            Type::DateTime64 { precision, timezone: None } => {
                format!("DateTime64({})", precision)
            }
            Type::DateTime64 { precision, timezone: Some(tz) } => {
                format!("DateTime64({}, '{}')", precision, tz)
            }
            Type::Decimal { precision, scale } => {
                format!("Decimal({}, {})", precision, scale)
            }
            Type::Enum8 { items } => {
                format!("Enum8({})", format_enum_items(items))
            }
            Type::Enum16 { items } => {
                format!("Enum16({})", format_enum_items(items))
            }
            Type::Array { item_type } => format!("Array({})", item_type.name()),
            Type::Nullable { nested_type } => {
                format!("Nullable({})", nested_type.name())
            }
            Type::Tuple { item_types } => {
                let names: Vec<String> =
                    item_types.iter().map(|t| t.name()).collect();
                format!("Tuple({})", names.join(", "))
            }
            Type::Map { key_type, value_type } => {
                format!("Map({}, {})", key_type.name(), value_type.name())
            }
            Type::LowCardinality { nested_type } => {
                format!("LowCardinality({})", nested_type.name())
            }
        }
    }

    /// The default value of this type, used to fill the inner payload of
    /// `Nullable(T)` at null rows.
    pub fn default_value(&self) -> Value {
        match self {
            Type::Simple(code) => match code {
                TypeCode::Nothing => Value::Null,
                TypeCode::Int8 => Value::Int8(0),
                TypeCode::Int16 => Value::Int16(0),
                TypeCode::Int32 => Value::Int32(0),
                TypeCode::Int64 => Value::Int64(0),
                TypeCode::Int128 => Value::Int128(0),
                TypeCode::UInt8 => Value::UInt8(0),
                TypeCode::UInt16 => Value::UInt16(0),
                TypeCode::UInt32 => Value::UInt32(0),
                TypeCode::UInt64 => Value::UInt64(0),
                TypeCode::UInt128 => Value::UInt128(0),
                TypeCode::Float32 => Value::Float32(0.0),
                TypeCode::Float64 => Value::Float64(0.0),
                TypeCode::String => Value::String(Vec::new()),
                TypeCode::Date => Value::Date(0),
                TypeCode::Date32 => Value::Date32(0),
                TypeCode::Uuid => Value::Uuid(0),
                TypeCode::Ipv4 => Value::Ipv4(0),
                TypeCode::Ipv6 => Value::Ipv6([0u8; 16]),
                // Parameterized codes never appear as Simple
                _ => Value::Null,
            },
            Type::FixedString { .. } => Value::String(Vec::new()),
            Type::DateTime { .. } => Value::DateTime(0),
            Type::DateTime64 { .. } => Value::DateTime64(0),
            Type::Decimal { .. } => Value::Decimal(0),
            Type::Enum8 { items } | Type::Enum16 { items } => {
                Value::Enum(items.first().map_or(0, |item| item.value))
            }
            Type::Array { .. } => Value::Array(Vec::new()),
            Type::Nullable { .. } => Value::Null,
            Type::Tuple { item_types } => Value::Tuple(
                item_types.iter().map(|t| t.default_value()).collect(),
            ),
            Type::Map { .. } => Value::Map(Vec::new()),
            Type::LowCardinality { nested_type } => {
                nested_type.default_value()
            }
        }
    }

    // Factory methods for common descriptors

    pub fn nothing() -> Self {
        Type::Simple(TypeCode::Nothing)
    }

    pub fn int8() -> Self {
        Type::Simple(TypeCode::Int8)
    }

    pub fn int16() -> Self {
        Type::Simple(TypeCode::Int16)
    }

    pub fn int32() -> Self {
        Type::Simple(TypeCode::Int32)
    }

    pub fn int64() -> Self {
        Type::Simple(TypeCode::Int64)
    }

    pub fn int128() -> Self {
        Type::Simple(TypeCode::Int128)
    }

    pub fn uint8() -> Self {
        Type::Simple(TypeCode::UInt8)
    }

    pub fn uint16() -> Self {
        Type::Simple(TypeCode::UInt16)
    }

    pub fn uint32() -> Self {
        Type::Simple(TypeCode::UInt32)
    }

    pub fn uint64() -> Self {
        Type::Simple(TypeCode::UInt64)
    }

    pub fn uint128() -> Self {
        Type::Simple(TypeCode::UInt128)
    }

    pub fn float32() -> Self {
        Type::Simple(TypeCode::Float32)
    }

    pub fn float64() -> Self {
        Type::Simple(TypeCode::Float64)
    }

    pub fn string() -> Self {
        Type::Simple(TypeCode::String)
    }

    pub fn fixed_string(size: usize) -> Self {
        Type::FixedString { size }
    }

    pub fn date() -> Self {
        Type::Simple(TypeCode::Date)
    }

    pub fn date32() -> Self {
        Type::Simple(TypeCode::Date32)
    }

    pub fn datetime(timezone: Option<String>) -> Self {
        Type::DateTime { timezone }
    }

    pub fn datetime64(precision: usize, timezone: Option<String>) -> Self {
        Type::DateTime64 { precision, timezone }
    }

    pub fn decimal(precision: usize, scale: usize) -> Self {
        Type::Decimal { precision, scale }
    }

    pub fn enum8(items: Vec<EnumItem>) -> Self {
        Type::Enum8 { items }
    }

    pub fn enum16(items: Vec<EnumItem>) -> Self {
        Type::Enum16 { items }
    }

    pub fn uuid() -> Self {
        Type::Simple(TypeCode::Uuid)
    }

    pub fn ipv4() -> Self {
        Type::Simple(TypeCode::Ipv4)
    }

    pub fn ipv6() -> Self {
        Type::Simple(TypeCode::Ipv6)
    }

    pub fn array(item_type: Type) -> Self {
        Type::Array { item_type: Box::new(item_type) }
    }

    pub fn nullable(nested_type: Type) -> Self {
        Type::Nullable { nested_type: Box::new(nested_type) }
    }

    pub fn tuple(item_types: Vec<Type>) -> Self {
        Type::Tuple { item_types }
    }

    pub fn map(key_type: Type, value_type: Type) -> Self {
        Type::Map {
            key_type: Box::new(key_type),
            value_type: Box::new(value_type),
        }
    }

    pub fn low_cardinality(nested_type: Type) -> Self {
        Type::LowCardinality { nested_type: Box::new(nested_type) }
    }

    /// Parse a type expression using the built-in registry.
    pub fn parse(type_name: &str) -> crate::Result<Self> {
        parser::parse_type_name(type_name)
    }
}

fn simple_name(code: TypeCode) -> &'static str {
    match code {
        TypeCode::Nothing => "Nothing",
        TypeCode::Int8 => "Int8",
        TypeCode::Int16 => "Int16",
        TypeCode::Int32 => "Int32",
        TypeCode::Int64 => "Int64",
        TypeCode::Int128 => "Int128",
        TypeCode::UInt8 => "UInt8",
        TypeCode::UInt16 => "UInt16",
        TypeCode::UInt32 => "UInt32",
        TypeCode::UInt64 => "UInt64",
        TypeCode::UInt128 => "UInt128",
        TypeCode::Float32 => "Float32",
        TypeCode::Float64 => "Float64",
        TypeCode::String => "String",
        TypeCode::Date => "Date",
        TypeCode::Date32 => "Date32",
        TypeCode::Uuid => "UUID",
        TypeCode::Ipv4 => "IPv4",
        TypeCode::Ipv6 => "IPv6",
        // Parameterized codes are formatted by Type::name
        TypeCode::FixedString => "FixedString",
        TypeCode::DateTime => "DateTime",
        TypeCode::DateTime64 => "DateTime64",
        TypeCode::Decimal => "Decimal",
        TypeCode::Enum8 => "Enum8",
        TypeCode::Enum16 => "Enum16",
        TypeCode::Array => "Array",
        TypeCode::Nullable => "Nullable",
        TypeCode::Tuple => "Tuple",
        TypeCode::Map => "Map",
        TypeCode::LowCardinality => "LowCardinality",
    }
}

fn format_enum_items(items: &[EnumItem]) -> String {
    let formatted: Vec<String> = items
        .iter()
        .map(|item| format!("'{}' = {}", item.name, item.value))
        .collect();
    formatted.join(", ")
}

// Two descriptors are equal iff their canonical names are byte-equal.
impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for Type {}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}
