//! Buffered I/O for block serialization.

pub mod block_stream;
pub mod buffer_utils;

pub use block_stream::{
    BlockReader,
    BlockWriter,
};
