//! Exhaustive checks of const/placeholder interaction.
//!
//! For every subset of const-bound columns in a small block, positional
//! placeholders must land exactly on the non-const columns, left to right.

use clickhouse_native_core::{
    types::Type,
    value::Value,
    Block,
};

const WIDTH: usize = 5;

fn fresh_block() -> Block {
    Block::with_columns(
        (0..WIDTH)
            .map(|i| (format!("c{}", i), Type::uint32()))
            .collect(),
    )
    .unwrap()
}

/// Bind consts for `mask` in the given order, fill the remaining columns
/// through placeholders, then verify each column's committed value.
fn check(mask: u32, const_order: &[usize]) {
    let mut block = fresh_block();

    for &column in const_order {
        block
            .set_const(column, Value::UInt32(1000 + column as u32))
            .unwrap();
    }

    let free: Vec<usize> =
        (0..WIDTH).filter(|i| mask & (1 << i) == 0).collect();
    for (placeholder, &column) in free.iter().enumerate() {
        block
            .set_placeholder(placeholder, Value::UInt32(column as u32))
            .unwrap();
    }

    block.append_row().unwrap();

    for column in 0..WIDTH {
        let expected = if mask & (1 << column) != 0 {
            Value::UInt32(1000 + column as u32)
        } else {
            Value::UInt32(column as u32)
        };
        assert_eq!(
            block.value(0, column).unwrap(),
            expected,
            "mask {:#07b}, const order {:?}, column {}",
            mask,
            const_order,
            column
        );
    }
}

#[test]
fn all_const_subsets() {
    // Consts bind in column order, the way a VALUES clause is parsed
    for mask in 0..(1u32 << WIDTH) {
        let consts: Vec<usize> =
            (0..WIDTH).filter(|i| mask & (1 << i) != 0).collect();
        check(mask, &consts);
    }
}

#[test]
fn placeholder_directly_after_const_hits_next_column() {
    // After set_const(k, v), set_placeholder(k, w) writes staging slot k+1
    for k in 0..WIDTH - 1 {
        let mut block = fresh_block();
        block.set_const(k, Value::UInt32(7)).unwrap();
        for placeholder in 0..WIDTH - 1 {
            block
                .set_placeholder(placeholder, Value::UInt32(placeholder as u32))
                .unwrap();
        }
        block.append_row().unwrap();

        assert_eq!(block.value(0, k).unwrap(), Value::UInt32(7));
        assert_eq!(
            block.value(0, k + 1).unwrap(),
            Value::UInt32(k as u32),
            "placeholder {} must target column {}",
            k,
            k + 1
        );
    }
}

#[test]
fn placeholder_past_free_columns_is_rejected() {
    let mut block = fresh_block();
    for k in 0..WIDTH {
        block.set_const(k, Value::UInt32(0)).unwrap();
    }
    // Every column is const; the first placeholder now maps past the end
    assert!(block.set_placeholder(0, Value::UInt32(1)).is_err());
}

#[test]
fn staging_reuse_across_rows() {
    // Staging keeps its values between appends; a row can update only some
    // placeholders
    let mut block = fresh_block();
    for placeholder in 0..WIDTH {
        block
            .set_placeholder(placeholder, Value::UInt32(placeholder as u32))
            .unwrap();
    }
    block.append_row().unwrap();

    block.set_placeholder(2, Value::UInt32(99)).unwrap();
    block.append_row().unwrap();

    assert_eq!(block.value(0, 2).unwrap(), Value::UInt32(2));
    assert_eq!(block.value(1, 2).unwrap(), Value::UInt32(99));
    assert_eq!(block.value(1, 4).unwrap(), Value::UInt32(4));
}
