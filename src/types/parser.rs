//! Type-expression parser.
//!
//! Type names arrive from the server as strings like
//! `Map(String, Array(Nullable(Int64)))` or `Enum8('a' = 1, 'b' = 2)`. The
//! lexer recognizes identifiers, integer literals, single-quoted strings
//! (with `\\` and `\'` escapes) and the punctuation `(),=`. The grammar is
//!
//! ```text
//! Type    := Name ( '(' ArgList ')' )?
//! ArgList := Arg ( ',' Arg )*
//! Arg     := Type | Literal | QuotedString '=' Number
//! ```
//!
//! Names map to creator functions through a [`TypeRegistry`]; lookup is
//! exact and case-sensitive. New kinds can be registered at startup.

use super::{
    EnumItem,
    Type,
};
use crate::{
    Error,
    Result,
};
use std::collections::HashMap;
use std::sync::OnceLock;

/// One parsed argument of a parameterized type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeArg {
    /// A nested type, e.g. the `T` of `Array(T)`.
    Type(Type),
    /// An integer literal, e.g. the `16` of `FixedString(16)`.
    Number(i64),
    /// A quoted string literal, e.g. the timezone of `DateTime('UTC')`.
    String(String),
    /// An `'name' = value` pair from an enum table.
    EnumEntry { name: String, value: i64 },
}

/// Creator invoked when the parser sees a registered type name.
pub type TypeCreator = fn(args: Vec<TypeArg>) -> Result<Type>;

/// Registry of type-name creators. Immutable once handed to a parser, so
/// safely shared between threads.
pub struct TypeRegistry {
    creators: HashMap<&'static str, TypeCreator>,
}

impl TypeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self { creators: HashMap::new() }
    }

    /// Registry preloaded with every built-in ClickHouse type.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register("Nothing", |args| simple(Type::nothing(), args));
        registry.register("Int8", |args| simple(Type::int8(), args));
        registry.register("Int16", |args| simple(Type::int16(), args));
        registry.register("Int32", |args| simple(Type::int32(), args));
        registry.register("Int64", |args| simple(Type::int64(), args));
        registry.register("Int128", |args| simple(Type::int128(), args));
        registry.register("UInt8", |args| simple(Type::uint8(), args));
        registry.register("UInt16", |args| simple(Type::uint16(), args));
        registry.register("UInt32", |args| simple(Type::uint32(), args));
        registry.register("UInt64", |args| simple(Type::uint64(), args));
        registry.register("UInt128", |args| simple(Type::uint128(), args));
        // Bool is stored and transmitted as UInt8
        registry.register("Bool", |args| simple(Type::uint8(), args));
        registry.register("Float32", |args| simple(Type::float32(), args));
        registry.register("Float64", |args| simple(Type::float64(), args));
        registry.register("String", |args| simple(Type::string(), args));
        registry.register("Date", |args| simple(Type::date(), args));
        registry.register("Date32", |args| simple(Type::date32(), args));
        registry.register("UUID", |args| simple(Type::uuid(), args));
        registry.register("IPv4", |args| simple(Type::ipv4(), args));
        registry.register("IPv6", |args| simple(Type::ipv6(), args));

        registry.register("FixedString", create_fixed_string);
        registry.register("DateTime", create_datetime);
        registry.register("DateTime64", create_datetime64);
        registry.register("Decimal", create_decimal);
        registry.register("Decimal32", |args| create_decimal_sized(9, args));
        registry.register("Decimal64", |args| create_decimal_sized(18, args));
        registry.register("Decimal128", |args| create_decimal_sized(38, args));
        registry.register("Decimal256", |args| create_decimal_sized(76, args));
        registry.register("Enum8", create_enum8);
        registry.register("Enum16", create_enum16);
        registry.register("Array", create_array);
        registry.register("Nullable", create_nullable);
        registry.register("Tuple", create_tuple);
        registry.register("Map", create_map);
        registry.register("LowCardinality", create_low_cardinality);

        registry
    }

    /// Register a creator for `name`. Replaces any previous registration.
    pub fn register(&mut self, name: &'static str, creator: TypeCreator) {
        self.creators.insert(name, creator);
    }

    fn get(&self, name: &str) -> Option<TypeCreator> {
        self.creators.get(name).copied()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn builtin_registry() -> &'static TypeRegistry {
    static REGISTRY: OnceLock<TypeRegistry> = OnceLock::new();
    REGISTRY.get_or_init(TypeRegistry::with_builtins)
}

/// Parse a type expression against the built-in registry.
pub fn parse_type_name(input: &str) -> Result<Type> {
    TypeParser::new(input, builtin_registry()).parse()
}

// Creator helpers

fn simple(type_: Type, args: Vec<TypeArg>) -> Result<Type> {
    if !args.is_empty() {
        return Err(Error::TypeParse(format!(
            "{} takes no arguments",
            type_.name()
        )));
    }
    Ok(type_)
}

fn create_fixed_string(args: Vec<TypeArg>) -> Result<Type> {
    match args.as_slice() {
        [TypeArg::Number(n)] if *n > 0 => Ok(Type::fixed_string(*n as usize)),
        _ => Err(Error::TypeParse(
            "FixedString requires one positive size argument".to_string(),
        )),
    }
}

fn create_datetime(args: Vec<TypeArg>) -> Result<Type> {
    match args.as_slice() {
        [] => Ok(Type::datetime(None)),
        [TypeArg::String(tz)] => Ok(Type::datetime(Some(tz.clone()))),
        _ => Err(Error::TypeParse(
            "DateTime takes at most a timezone argument".to_string(),
        )),
    }
}

fn create_datetime64(args: Vec<TypeArg>) -> Result<Type> {
    match args.as_slice() {
        [TypeArg::Number(p)] if (0..=9).contains(p) => {
            Ok(Type::datetime64(*p as usize, None))
        }
        [TypeArg::Number(p), TypeArg::String(tz)] if (0..=9).contains(p) => {
            Ok(Type::datetime64(*p as usize, Some(tz.clone())))
        }
        _ => Err(Error::TypeParse(
            "DateTime64 requires a precision in 0..=9 and an optional timezone"
                .to_string(),
        )),
    }
}

fn create_decimal(args: Vec<TypeArg>) -> Result<Type> {
    match args.as_slice() {
        [TypeArg::Number(p), TypeArg::Number(s)]
            if (1..=76).contains(p) && (0..=*p).contains(s) =>
        {
            Ok(Type::decimal(*p as usize, *s as usize))
        }
        _ => Err(Error::TypeParse(
            "Decimal requires precision in 1..=76 and scale in 0..=precision"
                .to_string(),
        )),
    }
}

fn create_decimal_sized(precision: usize, args: Vec<TypeArg>) -> Result<Type> {
    match args.as_slice() {
        [TypeArg::Number(s)] if (0..=precision as i64).contains(s) => {
            Ok(Type::decimal(precision, *s as usize))
        }
        _ => Err(Error::TypeParse(format!(
            "Decimal with fixed precision {} requires one scale argument",
            precision
        ))),
    }
}

fn create_enum8(args: Vec<TypeArg>) -> Result<Type> {
    Ok(Type::enum8(enum_items(args, i8::MIN as i64, i8::MAX as i64)?))
}

fn create_enum16(args: Vec<TypeArg>) -> Result<Type> {
    Ok(Type::enum16(enum_items(args, i16::MIN as i64, i16::MAX as i64)?))
}

fn enum_items(args: Vec<TypeArg>, min: i64, max: i64) -> Result<Vec<EnumItem>> {
    if args.is_empty() {
        return Err(Error::TypeParse(
            "Enum requires at least one entry".to_string(),
        ));
    }

    let mut items = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            TypeArg::EnumEntry { name, value }
                if (min..=max).contains(&value) =>
            {
                items.push(EnumItem { name, value: value as i16 });
            }
            other => {
                return Err(Error::TypeParse(format!(
                    "Invalid enum entry: {:?}",
                    other
                )));
            }
        }
    }
    Ok(items)
}

fn create_array(args: Vec<TypeArg>) -> Result<Type> {
    match args.as_slice() {
        [TypeArg::Type(inner)] => Ok(Type::array(inner.clone())),
        _ => Err(Error::TypeParse(
            "Array requires one element type".to_string(),
        )),
    }
}

fn create_nullable(args: Vec<TypeArg>) -> Result<Type> {
    match args.as_slice() {
        [TypeArg::Type(inner)] => {
            // The server never nests composites inside Nullable
            if matches!(
                inner,
                Type::Array { .. }
                    | Type::Map { .. }
                    | Type::Tuple { .. }
                    | Type::LowCardinality { .. }
            ) {
                return Err(Error::UnsupportedTypeComposition(format!(
                    "Nullable({})",
                    inner.name()
                )));
            }
            Ok(Type::nullable(inner.clone()))
        }
        _ => Err(Error::TypeParse(
            "Nullable requires one nested type".to_string(),
        )),
    }
}

fn create_tuple(args: Vec<TypeArg>) -> Result<Type> {
    if args.is_empty() {
        return Err(Error::TypeParse(
            "Tuple requires at least one element type".to_string(),
        ));
    }

    let mut item_types = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            TypeArg::Type(t) => item_types.push(t),
            other => {
                return Err(Error::TypeParse(format!(
                    "Tuple elements must be types, got {:?}",
                    other
                )));
            }
        }
    }
    Ok(Type::tuple(item_types))
}

fn create_map(args: Vec<TypeArg>) -> Result<Type> {
    match args.as_slice() {
        [TypeArg::Type(k), TypeArg::Type(v)] => {
            Ok(Type::map(k.clone(), v.clone()))
        }
        _ => Err(Error::TypeParse(
            "Map requires a key type and a value type".to_string(),
        )),
    }
}

fn create_low_cardinality(args: Vec<TypeArg>) -> Result<Type> {
    match args.as_slice() {
        [TypeArg::Type(inner)] => Ok(Type::low_cardinality(inner.clone())),
        _ => Err(Error::TypeParse(
            "LowCardinality requires one nested type".to_string(),
        )),
    }
}

// Lexer

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Number(i64),
    QuotedString(String),
    LPar,
    RPar,
    Comma,
    Assign,
    Eos,
}

struct Lexer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, bytes: input.as_bytes(), pos: 0 }
    }

    fn next_token(&mut self) -> Result<Token> {
        while self.pos < self.bytes.len()
            && (self.bytes[self.pos] as char).is_whitespace()
        {
            self.pos += 1;
        }

        if self.pos >= self.bytes.len() {
            return Ok(Token::Eos);
        }

        let ch = self.bytes[self.pos] as char;
        match ch {
            '(' => {
                self.pos += 1;
                Ok(Token::LPar)
            }
            ')' => {
                self.pos += 1;
                Ok(Token::RPar)
            }
            ',' => {
                self.pos += 1;
                Ok(Token::Comma)
            }
            '=' => {
                self.pos += 1;
                Ok(Token::Assign)
            }
            '\'' => self.quoted_string(),
            _ if ch.is_ascii_alphabetic() || ch == '_' => Ok(self.name()),
            _ if ch.is_ascii_digit() || ch == '-' => self.number(),
            _ => Err(Error::TypeParse(format!(
                "Unexpected character '{}' at offset {}",
                ch, self.pos
            ))),
        }
    }

    fn quoted_string(&mut self) -> Result<Token> {
        self.pos += 1; // opening quote
        let mut value = String::new();

        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] as char {
                '\\' if self.pos + 1 < self.bytes.len() => {
                    // Only \\ and \' are meaningful escapes
                    let escaped = self.bytes[self.pos + 1] as char;
                    match escaped {
                        '\\' | '\'' => value.push(escaped),
                        other => {
                            value.push('\\');
                            value.push(other);
                        }
                    }
                    self.pos += 2;
                }
                '\'' => {
                    self.pos += 1;
                    return Ok(Token::QuotedString(value));
                }
                _ => {
                    // Multi-byte UTF-8 passes through byte by byte
                    let start = self.pos;
                    let mut end = self.pos + 1;
                    while end < self.bytes.len()
                        && (self.bytes[end] & 0xC0) == 0x80
                    {
                        end += 1;
                    }
                    value.push_str(&self.input[start..end]);
                    self.pos = end;
                }
            }
        }

        Err(Error::TypeParse("Unterminated string literal".to_string()))
    }

    fn name(&mut self) -> Token {
        let start = self.pos;
        while self.pos < self.bytes.len() {
            let c = self.bytes[self.pos] as char;
            if !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            self.pos += 1;
        }
        Token::Name(self.input[start..self.pos].to_string())
    }

    fn number(&mut self) -> Result<Token> {
        let start = self.pos;
        self.pos += 1; // sign or first digit
        while self.pos < self.bytes.len()
            && (self.bytes[self.pos] as char).is_ascii_digit()
        {
            self.pos += 1;
        }

        self.input[start..self.pos].parse::<i64>().map(Token::Number).map_err(
            |_| {
                Error::TypeParse(format!(
                    "Invalid number literal '{}'",
                    &self.input[start..self.pos]
                ))
            },
        )
    }
}

/// Recursive-descent parser over one type expression.
pub struct TypeParser<'a> {
    input: &'a str,
    lexer: Lexer<'a>,
    peeked: Option<Token>,
    registry: &'a TypeRegistry,
}

impl<'a> TypeParser<'a> {
    pub fn new(input: &'a str, registry: &'a TypeRegistry) -> Self {
        Self { input, lexer: Lexer::new(input), peeked: None, registry }
    }

    /// Parse the whole input as a single type expression.
    pub fn parse(mut self) -> Result<Type> {
        let type_ = self.parse_type()?;
        match self.next()? {
            Token::Eos => Ok(type_),
            other => Err(Error::TypeParse(format!(
                "Trailing input after type in '{}': {:?}",
                self.input, other
            ))),
        }
    }

    fn parse_type(&mut self) -> Result<Type> {
        let name = match self.next()? {
            Token::Name(name) => name,
            other => {
                return Err(Error::TypeParse(format!(
                    "Expected a type name in '{}', got {:?}",
                    self.input, other
                )));
            }
        };

        let creator = self.registry.get(&name).ok_or_else(|| {
            Error::TypeParse(format!("Unknown type name '{}'", name))
        })?;

        let args = if self.peek()? == &Token::LPar {
            self.next()?; // consume '('
            self.parse_args()?
        } else {
            Vec::new()
        };

        creator(args)
    }

    fn parse_args(&mut self) -> Result<Vec<TypeArg>> {
        let mut args = Vec::new();

        loop {
            args.push(self.parse_arg()?);

            match self.next()? {
                Token::Comma => continue,
                Token::RPar => return Ok(args),
                other => {
                    return Err(Error::TypeParse(format!(
                        "Expected ',' or ')' in '{}', got {:?}",
                        self.input, other
                    )));
                }
            }
        }
    }

    fn parse_arg(&mut self) -> Result<TypeArg> {
        match self.peek()?.clone() {
            Token::Name(_) => Ok(TypeArg::Type(self.parse_type()?)),
            Token::Number(_) => match self.next()? {
                Token::Number(n) => Ok(TypeArg::Number(n)),
                _ => unreachable!(),
            },
            Token::QuotedString(_) => {
                let s = match self.next()? {
                    Token::QuotedString(s) => s,
                    _ => unreachable!(),
                };
                // A quoted string followed by '=' is an enum entry
                if self.peek()? == &Token::Assign {
                    self.next()?;
                    match self.next()? {
                        Token::Number(value) => {
                            Ok(TypeArg::EnumEntry { name: s, value })
                        }
                        other => Err(Error::TypeParse(format!(
                            "Expected a number after '=' in '{}', got {:?}",
                            self.input, other
                        ))),
                    }
                } else {
                    Ok(TypeArg::String(s))
                }
            }
            other => Err(Error::TypeParse(format!(
                "Unexpected token {:?} in '{}'",
                other, self.input
            ))),
        }
    }

    fn next(&mut self) -> Result<Token> {
        match self.peeked.take() {
            Some(token) => Ok(token),
            None => self.lexer.next_token(),
        }
    }

    fn peek(&mut self) -> Result<&Token> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lexer.next_token()?);
        }
        Ok(self.peeked.as_ref().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeCode;

    #[test]
    fn test_simple_types() {
        assert_eq!(parse_type_name("Int32").unwrap(), Type::int32());
        assert_eq!(parse_type_name("String").unwrap(), Type::string());
        assert_eq!(parse_type_name("UUID").unwrap(), Type::uuid());
        assert_eq!(parse_type_name("Bool").unwrap(), Type::uint8());
    }

    #[test]
    fn test_unknown_type() {
        assert!(matches!(
            parse_type_name("FooBar").unwrap_err(),
            Error::TypeParse(_)
        ));
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        assert!(parse_type_name("int32").is_err());
        assert!(parse_type_name("STRING").is_err());
    }

    #[test]
    fn test_fixed_string() {
        let t = parse_type_name("FixedString(16)").unwrap();
        assert_eq!(t, Type::fixed_string(16));
        assert!(parse_type_name("FixedString(0)").is_err());
        assert!(parse_type_name("FixedString('x')").is_err());
    }

    #[test]
    fn test_datetime_with_timezone() {
        assert_eq!(parse_type_name("DateTime").unwrap(), Type::datetime(None));
        assert_eq!(
            parse_type_name("DateTime('Europe/Moscow')").unwrap(),
            Type::datetime(Some("Europe/Moscow".to_string()))
        );
        assert_eq!(
            parse_type_name("DateTime64(3, 'UTC')").unwrap(),
            Type::datetime64(3, Some("UTC".to_string()))
        );
    }

    #[test]
    fn test_decimal() {
        assert_eq!(
            parse_type_name("Decimal(18, 4)").unwrap(),
            Type::decimal(18, 4)
        );
        assert_eq!(parse_type_name("Decimal32(2)").unwrap(), Type::decimal(9, 2));
        assert_eq!(
            parse_type_name("Decimal64(6)").unwrap(),
            Type::decimal(18, 6)
        );
        assert_eq!(
            parse_type_name("Decimal128(10)").unwrap(),
            Type::decimal(38, 10)
        );
        assert_eq!(
            parse_type_name("Decimal256(20)").unwrap(),
            Type::decimal(76, 20)
        );
        assert!(parse_type_name("Decimal(77, 0)").is_err());
        assert!(parse_type_name("Decimal(9, 10)").is_err());
    }

    #[test]
    fn test_nested_types() {
        let t = parse_type_name("Array(Nullable(String))").unwrap();
        assert_eq!(t, Type::array(Type::nullable(Type::string())));

        let t =
            parse_type_name("Map(String, Array(Nullable(Int64)))").unwrap();
        assert_eq!(
            t,
            Type::map(
                Type::string(),
                Type::array(Type::nullable(Type::int64()))
            )
        );

        let t = parse_type_name("Tuple(Int32, String, Float64)").unwrap();
        assert_eq!(t.code(), TypeCode::Tuple);
    }

    #[test]
    fn test_enum_table() {
        let t = parse_type_name("Enum8('red' = 1, 'green' = 2)").unwrap();
        match t {
            Type::Enum8 { items } => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[0].name, "red");
                assert_eq!(items[0].value, 1);
                assert_eq!(items[1].name, "green");
                assert_eq!(items[1].value, 2);
            }
            other => panic!("expected Enum8, got {:?}", other),
        }
    }

    #[test]
    fn test_enum_negative_values() {
        let t = parse_type_name("Enum8('a' = -128, 'b' = 127)").unwrap();
        match t {
            Type::Enum8 { items } => {
                assert_eq!(items[0].value, -128);
                assert_eq!(items[1].value, 127);
            }
            other => panic!("expected Enum8, got {:?}", other),
        }
        // Out of i8 range
        assert!(parse_type_name("Enum8('a' = 300)").is_err());
    }

    #[test]
    fn test_enum_name_escapes() {
        let t = parse_type_name(r"Enum8('it\'s' = 1, 'a\\b' = 2)").unwrap();
        match t {
            Type::Enum8 { items } => {
                assert_eq!(items[0].name, "it's");
                assert_eq!(items[1].name, r"a\b");
            }
            other => panic!("expected Enum8, got {:?}", other),
        }
    }

    #[test]
    fn test_nullable_composition_rejected() {
        for bad in [
            "Nullable(Array(Int32))",
            "Nullable(Map(String, Int32))",
            "Nullable(Tuple(Int32))",
            "Nullable(LowCardinality(String))",
        ] {
            assert!(
                matches!(
                    parse_type_name(bad).unwrap_err(),
                    Error::UnsupportedTypeComposition(_)
                ),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_low_cardinality() {
        assert_eq!(
            parse_type_name("LowCardinality(String)").unwrap(),
            Type::low_cardinality(Type::string())
        );
        assert_eq!(
            parse_type_name("LowCardinality(Nullable(String))").unwrap(),
            Type::low_cardinality(Type::nullable(Type::string()))
        );
    }

    #[test]
    fn test_unbalanced_parens() {
        assert!(parse_type_name("Array(Int32").is_err());
        assert!(parse_type_name("Array(Int32))").is_err());
        assert!(parse_type_name("").is_err());
    }

    #[test]
    fn test_whitespace_tolerated() {
        assert_eq!(
            parse_type_name("Map( String , Int32 )").unwrap(),
            Type::map(Type::string(), Type::int32())
        );
    }

    #[test]
    fn test_custom_registry() {
        let mut registry = TypeRegistry::with_builtins();
        registry.register("Point", |args| {
            simple(Type::tuple(vec![Type::float64(), Type::float64()]), args)
        });

        let t = TypeParser::new("Point", &registry).parse().unwrap();
        assert_eq!(t, Type::tuple(vec![Type::float64(), Type::float64()]));
    }

    #[test]
    fn test_name_echoes_input() {
        for name in [
            "Array(Nullable(String))",
            "Map(String, Int32)",
            "Decimal(18, 4)",
            "DateTime('UTC')",
            "Enum8('red' = 1, 'green' = 2)",
            "LowCardinality(String)",
            "Tuple(Int32, String)",
        ] {
            assert_eq!(parse_type_name(name).unwrap().name(), name);
        }
    }
}
