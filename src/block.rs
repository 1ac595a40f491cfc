//! Blocks: the unit of data exchange.
//!
//! A block is an ordered set of named columns sharing one row count, plus a
//! small settings header. Writers fill a block row by row through a staging
//! row (`set_const` / `set_placeholder` / `append_row`); readers decode
//! whole blocks from the wire.

use crate::{
    column::{
        create_column,
        Column,
        ColumnRef,
    },
    io::buffer_utils::{
        read_string,
        read_varint,
        write_string,
        write_varint,
    },
    protocol::{
        DBMS_MIN_REVISION_WITH_BLOCK_INFO,
        DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION,
    },
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

const SETTING_IS_OVERFLOWS: u64 = 1;
const SETTING_BUCKET_NUM: u64 = 2;

/// Wire type of a registered block setting, used to skip values of keys the
/// reader recognizes but does not handle.
#[derive(Debug, Clone, Copy)]
enum SettingKind {
    Bool,
    Int32,
}

/// Registered settings keys. Extending the header means adding a row here.
const SETTING_REGISTRY: &[(u64, SettingKind)] = &[
    (SETTING_IS_OVERFLOWS, SettingKind::Bool),
    (SETTING_BUCKET_NUM, SettingKind::Int32),
];

/// Block settings header: `(varint key, typed value)` pairs terminated by a
/// zero key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSettings {
    /// Set when the block carries overflow rows past a GROUP BY limit.
    pub is_overflows: bool,
    /// Bucket number for two-level aggregation, -1 when absent.
    pub bucket_num: i32,
}

impl Default for BlockSettings {
    fn default() -> Self {
        Self { is_overflows: false, bucket_num: -1 }
    }
}

impl BlockSettings {
    /// Emit registered keys with non-default values, then the terminator.
    pub fn write_to(&self, buffer: &mut BytesMut) {
        if self.is_overflows {
            write_varint(buffer, SETTING_IS_OVERFLOWS);
            buffer.put_u8(1);
        }
        if self.bucket_num != -1 {
            write_varint(buffer, SETTING_BUCKET_NUM);
            buffer.put_i32_le(self.bucket_num);
        }
        write_varint(buffer, 0);
    }

    /// Consume keys until the zero terminator. Registered keys the struct
    /// does not model are skipped by consuming their declared type.
    pub fn read_from(buffer: &mut &[u8]) -> Result<Self> {
        let mut settings = BlockSettings::default();

        loop {
            let key = read_varint(buffer)?;
            if key == 0 {
                return Ok(settings);
            }

            let kind = SETTING_REGISTRY
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, kind)| *kind)
                .ok_or_else(|| {
                    Error::Protocol(format!(
                        "Unknown block settings key: {}",
                        key
                    ))
                })?;

            match (key, kind) {
                (SETTING_IS_OVERFLOWS, _) => {
                    if buffer.is_empty() {
                        return Err(Error::ShortRead {
                            needed: 1,
                            available: 0,
                        });
                    }
                    settings.is_overflows = buffer.get_u8() != 0;
                }
                (SETTING_BUCKET_NUM, _) => {
                    if buffer.len() < 4 {
                        return Err(Error::ShortRead {
                            needed: 4,
                            available: buffer.len(),
                        });
                    }
                    settings.bucket_num = buffer.get_i32_le();
                }
                (_, SettingKind::Bool) => {
                    if buffer.is_empty() {
                        return Err(Error::ShortRead {
                            needed: 1,
                            available: 0,
                        });
                    }
                    buffer.advance(1);
                }
                (_, SettingKind::Int32) => {
                    if buffer.len() < 4 {
                        return Err(Error::ShortRead {
                            needed: 4,
                            available: buffer.len(),
                        });
                    }
                    buffer.advance(4);
                }
            }
        }
    }
}

struct NamedColumn {
    name: String,
    column: ColumnRef,
}

/// A set of same-length named columns plus the settings header and the
/// row-staging machinery for prepared inserts.
pub struct Block {
    columns: Vec<NamedColumn>,
    name_to_position: HashMap<String, usize>, // 1-based positions
    settings: BlockSettings,
    row_count: usize,
    staging: Vec<Value>,
    placeholder_indexes: Vec<usize>,
    poisoned: bool,
}

impl Block {
    /// An empty block with no columns.
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            name_to_position: HashMap::new(),
            settings: BlockSettings::default(),
            row_count: 0,
            staging: Vec::new(),
            placeholder_indexes: Vec::new(),
            poisoned: false,
        }
    }

    /// A writable block with fresh empty columns for the given schema.
    pub fn with_columns(specs: Vec<(String, Type)>) -> Result<Self> {
        let mut block = Block::new();
        for (name, type_) in specs {
            let column = create_column(&type_)?;
            block.append_column(name, column)?;
        }
        Ok(block)
    }

    /// Attach a column. Its row count must agree with the block's, and the
    /// name must be unique and non-empty.
    pub fn append_column(
        &mut self,
        name: impl Into<String>,
        column: ColumnRef,
    ) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::Validation(
                "Column name must not be empty".to_string(),
            ));
        }
        if self.name_to_position.contains_key(&name) {
            return Err(Error::Validation(format!(
                "Duplicate column name '{}'",
                name
            )));
        }

        if self.columns.is_empty() {
            self.row_count = column.size();
        } else if column.size() != self.row_count {
            return Err(Error::Validation(format!(
                "All columns in a block must have the same row count. \
                 Column '{}' has {} rows, block has {}",
                name,
                column.size(),
                self.row_count
            )));
        }

        self.name_to_position.insert(name.clone(), self.columns.len() + 1);
        self.columns.push(NamedColumn { name, column });
        self.staging.push(Value::Null);
        self.placeholder_indexes.push(self.columns.len() - 1);
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0 || self.columns.is_empty()
    }

    pub fn settings(&self) -> &BlockSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: BlockSettings) {
        self.settings = settings;
    }

    pub fn column(&self, index: usize) -> Option<&dyn Column> {
        self.columns.get(index).map(|item| item.column.as_ref())
    }

    pub fn column_name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(|item| item.name.as_str())
    }

    pub fn column_by_name(&self, name: &str) -> Option<&dyn Column> {
        self.name_to_position
            .get(name)
            .map(|&pos| self.columns[pos - 1].column.as_ref())
    }

    /// 1-based position of a column by name.
    pub fn position_by_name(&self, name: &str) -> Result<usize> {
        self.name_to_position.get(name).copied().ok_or_else(|| {
            Error::InvalidArgument(format!(
                "Column '{}' does not exist",
                name
            ))
        })
    }

    /// Cell accessor.
    pub fn value(&self, row: usize, column: usize) -> Result<Value> {
        let item = self.columns.get(column).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "Column {} out of bounds (count: {})",
                column,
                self.columns.len()
            ))
        })?;
        item.column.value_at(row)
    }

    /// Iterate `(name, type, column)`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Type, &dyn Column)> {
        self.columns.iter().map(|item| {
            (
                item.name.as_str(),
                item.column.column_type(),
                item.column.as_ref(),
            )
        })
    }

    /// Bind a literal to a column of the staging row. Every placeholder
    /// position at or past `column_idx` shifts by one, so subsequent
    /// positional placeholder binds skip this column.
    pub fn set_const(&mut self, column_idx: usize, value: Value) -> Result<()> {
        if column_idx >= self.columns.len() {
            return Err(Error::InvalidArgument(format!(
                "Column {} out of bounds (count: {})",
                column_idx,
                self.columns.len()
            )));
        }

        self.staging[column_idx] = value;
        // Shift every placeholder whose target column is at or past the
        // bound column, not a slot range: with several consts bound the two
        // differ, and only the target-based shift keeps placeholders on
        // non-const columns
        for index in self.placeholder_indexes.iter_mut() {
            if *index >= column_idx {
                *index += 1;
            }
        }
        Ok(())
    }

    /// Write into the staging row at the column the placeholder currently
    /// maps to.
    pub fn set_placeholder(
        &mut self,
        placeholder_idx: usize,
        value: Value,
    ) -> Result<()> {
        let column_idx = *self
            .placeholder_indexes
            .get(placeholder_idx)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "Placeholder {} out of bounds (count: {})",
                    placeholder_idx,
                    self.placeholder_indexes.len()
                ))
            })?;

        if column_idx >= self.columns.len() {
            return Err(Error::InvalidArgument(format!(
                "Placeholder {} maps past the last column",
                placeholder_idx
            )));
        }

        self.staging[column_idx] = value;
        Ok(())
    }

    /// Commit the staging row into every column. On failure the block is
    /// poisoned: earlier columns keep their partial append and the block
    /// must be discarded.
    pub fn append_row(&mut self) -> Result<()> {
        if self.poisoned {
            return Err(Error::Validation(
                "Block is poisoned by a failed append; discard it"
                    .to_string(),
            ));
        }

        for i in 0..self.columns.len() {
            let value = &self.staging[i];
            if let Err(e) = self.columns[i].column.append_value(value) {
                self.poisoned = true;
                return Err(Error::AppendFailed {
                    column: self.columns[i].name.clone(),
                    row: self.row_count,
                    source: Box::new(e),
                });
            }
        }

        self.row_count += 1;
        Ok(())
    }

    /// Whether a failed `append_row` has left columns at uneven lengths.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Serialize: settings header, column count, row count, then each
    /// column as name, type name, optional custom-serialization flag, and
    /// the column payload.
    pub fn write_to(&self, buffer: &mut BytesMut, revision: u64) -> Result<()> {
        if revision >= DBMS_MIN_REVISION_WITH_BLOCK_INFO {
            self.settings.write_to(buffer);
        }

        write_varint(buffer, self.columns.len() as u64);
        write_varint(buffer, self.row_count as u64);

        for item in &self.columns {
            write_string(buffer, &item.name);
            write_string(buffer, &item.column.column_type().name());

            if revision >= DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION {
                buffer.put_u8(0);
            }

            if self.row_count > 0 {
                item.column.save_prefix(buffer)?;
                item.column.save_to_buffer(buffer)?;
            }
        }

        Ok(())
    }

    /// Decode a block from a fully materialized body.
    pub fn read_from(buffer: &mut &[u8], revision: u64) -> Result<Self> {
        let mut block = Block::new();

        if revision >= DBMS_MIN_REVISION_WITH_BLOCK_INFO {
            block.settings = BlockSettings::read_from(buffer)?;
        }

        let column_count = read_varint(buffer)? as usize;
        let row_count = read_varint(buffer)? as usize;

        for _ in 0..column_count {
            let name = read_string(buffer)?;
            let type_name = read_string(buffer)?;

            if revision >= DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION {
                if buffer.is_empty() {
                    return Err(Error::ShortRead {
                        needed: 1,
                        available: 0,
                    });
                }
                let custom = buffer.get_u8();
                if custom != 0 {
                    return Err(Error::Protocol(
                        "Custom column serialization is not supported"
                            .to_string(),
                    ));
                }
            }

            let column_type = Type::parse(&type_name)?;
            let mut column = create_column(&column_type)?;

            if row_count > 0 {
                column.load_prefix(buffer, row_count)?;
                column.load_from_buffer(buffer, row_count)?;
            }

            block.append_column(name, column)?;
        }

        Ok(block)
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field(
                "columns",
                &self
                    .columns
                    .iter()
                    .map(|c| (c.name.clone(), c.column.column_type().clone()))
                    .collect::<Vec<_>>(),
            )
            .field("settings", &self.settings)
            .field("row_count", &self.row_count)
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

// Structural equality over schema, settings and every cell; used by the
// round-trip laws.
impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        if self.settings != other.settings
            || self.row_count != other.row_count
            || self.columns.len() != other.columns.len()
        {
            return false;
        }

        for (a, b) in self.columns.iter().zip(other.columns.iter()) {
            if a.name != b.name
                || a.column.column_type() != b.column.column_type()
            {
                return false;
            }
            for row in 0..self.row_count {
                match (a.column.value_at(row), b.column.value_at(row)) {
                    (Ok(va), Ok(vb)) if va == vb => {}
                    _ => return false,
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CLIENT_REVISION;

    fn two_column_block() -> Block {
        Block::with_columns(vec![
            ("id".to_string(), Type::uint32()),
            ("name".to_string(), Type::string()),
        ])
        .unwrap()
    }

    #[test]
    fn test_empty_block() {
        let block = Block::new();
        assert_eq!(block.column_count(), 0);
        assert_eq!(block.row_count(), 0);
        assert!(block.is_empty());
    }

    #[test]
    fn test_append_rows() {
        let mut block = two_column_block();

        block.set_placeholder(0, Value::UInt32(42)).unwrap();
        block.set_placeholder(1, Value::from("hi")).unwrap();
        block.append_row().unwrap();

        block.set_placeholder(0, Value::UInt32(7)).unwrap();
        block.set_placeholder(1, Value::from("bye")).unwrap();
        block.append_row().unwrap();

        assert_eq!(block.row_count(), 2);
        assert_eq!(block.value(0, 0).unwrap(), Value::UInt32(42));
        assert_eq!(block.value(1, 1).unwrap(), Value::from("bye"));
    }

    #[test]
    fn test_positions_are_one_based() {
        let block = two_column_block();
        assert_eq!(block.position_by_name("id").unwrap(), 1);
        assert_eq!(block.position_by_name("name").unwrap(), 2);
        assert!(block.position_by_name("missing").is_err());
    }

    #[test]
    fn test_duplicate_and_empty_names_rejected() {
        let mut block = two_column_block();
        let extra = create_column(&Type::uint8()).unwrap();
        assert!(block.append_column("id", extra).is_err());
        let extra = create_column(&Type::uint8()).unwrap();
        assert!(block.append_column("", extra).is_err());
    }

    #[test]
    fn test_mismatched_rows_rejected() {
        let mut block = two_column_block();
        block.set_placeholder(0, Value::UInt32(1)).unwrap();
        block.set_placeholder(1, Value::from("x")).unwrap();
        block.append_row().unwrap();

        let mut short = create_column(&Type::uint8()).unwrap();
        short.append_value(&Value::UInt8(1)).unwrap();
        short.append_value(&Value::UInt8(2)).unwrap();
        assert!(block.append_column("extra", short).is_err());
    }

    #[test]
    fn test_const_shifts_placeholders() {
        // Three columns; a const bound at index 1 makes placeholder 1
        // target column 2
        let mut block = Block::with_columns(vec![
            ("a".to_string(), Type::uint8()),
            ("b".to_string(), Type::uint8()),
            ("c".to_string(), Type::uint8()),
        ])
        .unwrap();

        block.set_const(1, Value::UInt8(99)).unwrap();
        block.set_placeholder(0, Value::UInt8(10)).unwrap();
        block.set_placeholder(1, Value::UInt8(30)).unwrap();
        block.append_row().unwrap();

        assert_eq!(block.value(0, 0).unwrap(), Value::UInt8(10));
        assert_eq!(block.value(0, 1).unwrap(), Value::UInt8(99));
        assert_eq!(block.value(0, 2).unwrap(), Value::UInt8(30));
    }

    #[test]
    fn test_const_at_first_column_shifts_all() {
        let mut block = two_column_block();
        block.set_const(0, Value::UInt32(5)).unwrap();
        // Placeholder 0 now lands on the second column
        block.set_placeholder(0, Value::from("only")).unwrap();
        block.append_row().unwrap();

        assert_eq!(block.value(0, 0).unwrap(), Value::UInt32(5));
        assert_eq!(block.value(0, 1).unwrap(), Value::from("only"));
    }

    #[test]
    fn test_two_consts_leave_placeholders_on_free_columns() {
        // Consts at columns 0 and 2; placeholders must land on 1 and 3
        let mut block = Block::with_columns(vec![
            ("a".to_string(), Type::uint8()),
            ("b".to_string(), Type::uint8()),
            ("c".to_string(), Type::uint8()),
            ("d".to_string(), Type::uint8()),
        ])
        .unwrap();

        block.set_const(0, Value::UInt8(100)).unwrap();
        block.set_const(2, Value::UInt8(200)).unwrap();
        block.set_placeholder(0, Value::UInt8(1)).unwrap();
        block.set_placeholder(1, Value::UInt8(2)).unwrap();
        block.append_row().unwrap();

        assert_eq!(block.value(0, 0).unwrap(), Value::UInt8(100));
        assert_eq!(block.value(0, 1).unwrap(), Value::UInt8(1));
        assert_eq!(block.value(0, 2).unwrap(), Value::UInt8(200));
        assert_eq!(block.value(0, 3).unwrap(), Value::UInt8(2));
    }

    #[test]
    fn test_append_failure_poisons_block() {
        let mut block = two_column_block();
        block.set_placeholder(0, Value::UInt32(1)).unwrap();
        block.set_placeholder(1, Value::UInt32(2)).unwrap(); // wrong kind

        let err = block.append_row().unwrap_err();
        match err {
            Error::AppendFailed { column, row, .. } => {
                assert_eq!(column, "name");
                assert_eq!(row, 0);
            }
            other => panic!("expected AppendFailed, got {:?}", other),
        }

        // Row count unchanged, first column keeps its partial append, block
        // refuses further use
        assert_eq!(block.row_count(), 0);
        assert!(block.is_poisoned());
        assert_eq!(block.column(0).unwrap().size(), 1);
        assert!(block.append_row().is_err());
    }

    #[test]
    fn test_settings_defaults_write_terminator_only() {
        let settings = BlockSettings::default();
        let mut buf = BytesMut::new();
        settings.write_to(&mut buf);
        assert_eq!(&buf[..], &[0x00]);
    }

    #[test]
    fn test_settings_roundtrip() {
        let settings = BlockSettings { is_overflows: true, bucket_num: 7 };
        let mut buf = BytesMut::new();
        settings.write_to(&mut buf);

        let mut reader = &buf[..];
        let decoded = BlockSettings::read_from(&mut reader).unwrap();
        assert_eq!(decoded, settings);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_settings_unknown_key_rejected() {
        let mut buf = BytesMut::new();
        write_varint(&mut buf, 9);
        buf.put_u8(1);
        write_varint(&mut buf, 0);

        let mut reader = &buf[..];
        assert!(BlockSettings::read_from(&mut reader).is_err());
    }

    #[test]
    fn test_block_wire_roundtrip() {
        let mut block = two_column_block();
        block.set_placeholder(0, Value::UInt32(42)).unwrap();
        block.set_placeholder(1, Value::from("hi")).unwrap();
        block.append_row().unwrap();

        let mut buf = BytesMut::new();
        block.write_to(&mut buf, CLIENT_REVISION).unwrap();

        let mut reader = &buf[..];
        let decoded = Block::read_from(&mut reader, CLIENT_REVISION).unwrap();

        assert!(reader.is_empty());
        assert_eq!(decoded, block);
    }

    #[test]
    fn test_insert_scenario_wire_bytes() {
        // One row (42, "hi") into t(id UInt32, name String):
        // settings, varint(2), varint(1), "id" "UInt32" 2A000000,
        // "name" "String" varint(2) "hi"
        let mut block = two_column_block();
        block.set_placeholder(0, Value::UInt32(42)).unwrap();
        block.set_placeholder(1, Value::from("hi")).unwrap();
        block.append_row().unwrap();

        // Below the custom-serialization revision so no flag bytes appear
        let mut buf = BytesMut::new();
        block.write_to(&mut buf, 54449).unwrap();

        let expected: Vec<u8> = vec![
            0x00, // settings terminator
            0x02, // column count
            0x01, // row count
            0x02, b'i', b'd', // "id"
            0x06, b'U', b'I', b'n', b't', b'3', b'2', // "UInt32"
            0x2A, 0x00, 0x00, 0x00, // 42
            0x04, b'n', b'a', b'm', b'e', // "name"
            0x06, b'S', b't', b'r', b'i', b'n', b'g', // "String"
            0x02, b'h', b'i', // "hi"
        ];
        assert_eq!(&buf[..], &expected[..]);
    }

    #[test]
    fn test_header_block_roundtrip() {
        // Zero-row blocks carry schema only
        let block = two_column_block();
        let mut buf = BytesMut::new();
        block.write_to(&mut buf, CLIENT_REVISION).unwrap();

        let mut reader = &buf[..];
        let decoded = Block::read_from(&mut reader, CLIENT_REVISION).unwrap();
        assert_eq!(decoded.column_count(), 2);
        assert_eq!(decoded.row_count(), 0);
        assert_eq!(decoded.column_name(0), Some("id"));
        assert_eq!(
            decoded.column(1).unwrap().column_type(),
            &Type::string()
        );
    }
}
