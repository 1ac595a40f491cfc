//! Type expression parsing against server-spelled names.

use clickhouse_native_core::{
    types::Type,
    Error,
};

#[test]
fn parses_every_server_spelling_verbatim() {
    // name() must echo the exact server spelling for each of these
    let spellings = [
        "UInt8",
        "UInt16",
        "UInt32",
        "UInt64",
        "UInt128",
        "Int8",
        "Int16",
        "Int32",
        "Int64",
        "Int128",
        "Float32",
        "Float64",
        "String",
        "FixedString(16)",
        "Date",
        "Date32",
        "DateTime",
        "DateTime('UTC')",
        "DateTime('Asia/Istanbul')",
        "DateTime64(3)",
        "DateTime64(9, 'UTC')",
        "Decimal(9, 4)",
        "Decimal(76, 38)",
        "Enum8('a' = 1)",
        "Enum16('x' = -32768, 'y' = 32767)",
        "UUID",
        "IPv4",
        "IPv6",
        "Nothing",
        "Array(UInt8)",
        "Array(Array(String))",
        "Array(Nullable(DateTime))",
        "Nullable(Decimal(18, 2))",
        "Tuple(UInt8, String, Array(Int32))",
        "Map(String, Map(String, UInt64))",
        "LowCardinality(String)",
        "LowCardinality(Nullable(String))",
        "Array(LowCardinality(Nullable(FixedString(2))))",
    ];

    for spelling in spellings {
        let parsed = Type::parse(spelling)
            .unwrap_or_else(|e| panic!("{} failed: {}", spelling, e));
        assert_eq!(parsed.name(), spelling);
    }
}

#[test]
fn descriptor_equality_is_canonical_name_equality() {
    let a = Type::parse("Map(String, Array(Nullable(Int64)))").unwrap();
    let b = Type::parse("Map( String ,  Array( Nullable( Int64 ) ) )").unwrap();
    assert_eq!(a, b);
    assert_eq!(a.name(), b.name());
}

#[test]
fn decimal_aliases_normalize() {
    assert_eq!(
        Type::parse("Decimal32(4)").unwrap(),
        Type::parse("Decimal(9, 4)").unwrap()
    );
    assert_eq!(
        Type::parse("Decimal64(4)").unwrap(),
        Type::parse("Decimal(18, 4)").unwrap()
    );
    assert_eq!(
        Type::parse("Decimal128(4)").unwrap(),
        Type::parse("Decimal(38, 4)").unwrap()
    );
    assert_eq!(
        Type::parse("Decimal256(4)").unwrap(),
        Type::parse("Decimal(76, 4)").unwrap()
    );
}

#[test]
fn nullable_composites_are_rejected() {
    for bad in [
        "Nullable(Array(UInt8))",
        "Nullable(Tuple(UInt8, UInt8))",
        "Nullable(Map(String, String))",
        "Nullable(LowCardinality(UInt8))",
        "Array(Nullable(Array(UInt8)))",
    ] {
        match Type::parse(bad) {
            Err(Error::UnsupportedTypeComposition(_)) => {}
            other => panic!("{} should be rejected, got {:?}", bad, other),
        }
    }
}

#[test]
fn malformed_expressions_are_rejected() {
    for bad in [
        "",
        "(",
        "Array",
        "Array()",
        "Array(Int32",
        "Array(Int32))",
        "Tuple()",
        "Map(String)",
        "Map(String, Int32, Int32)",
        "FixedString()",
        "FixedString(-1)",
        "Enum8()",
        "Enum8('a')",
        "Enum8('a' = )",
        "Enum8('unterminated = 1)",
        "DateTime64(22)",
        "Decimal(9)",
        "NoSuchType",
        "String(5)",
        "UInt32 extra",
    ] {
        assert!(Type::parse(bad).is_err(), "{} should fail to parse", bad);
    }
}

#[test]
fn enum_tables_preserve_entries() {
    let parsed =
        Type::parse("Enum8('' = 0, 'with space' = 1, 'it\\'s' = 2)").unwrap();
    match parsed {
        Type::Enum8 { items } => {
            assert_eq!(items.len(), 3);
            assert_eq!(items[0].name, "");
            assert_eq!(items[1].name, "with space");
            assert_eq!(items[2].name, "it's");
        }
        other => panic!("expected Enum8, got {:?}", other),
    }
}
