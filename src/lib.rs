//! Native TCP protocol core for ClickHouse.
//!
//! This crate implements the binary, column-major, block-oriented protocol
//! a ClickHouse server speaks on port 9000: the wire codec, the columnar
//! block model, the type system that marshals SQL values to and from the
//! native layout, and the session state machine that exchanges blocks with
//! a server.
//!
//! ```no_run
//! use clickhouse_native_core::{Block, Client, Type, Value};
//!
//! # async fn example() -> clickhouse_native_core::Result<()> {
//! let options =
//!     clickhouse_native_core::settings::parse_url("clickhouse://localhost")?;
//! let mut client = Client::connect(options).await?;
//!
//! client
//!     .execute("CREATE TABLE t (id UInt32, name String) ENGINE = Memory")
//!     .await?;
//!
//! let mut block = Block::with_columns(vec![
//!     ("id".to_string(), Type::uint32()),
//!     ("name".to_string(), Type::string()),
//! ])?;
//! block.set_placeholder(0, Value::UInt32(42))?;
//! block.set_placeholder(1, Value::from("hi"))?;
//! block.append_row()?;
//!
//! client.insert("INSERT INTO t VALUES", vec![block]).await?;
//!
//! let result = client.query("SELECT id, name FROM t").await?;
//! assert_eq!(result.row_count(), 1);
//! # Ok(())
//! # }
//! ```

pub mod block;
pub mod client;
pub mod column;
pub mod compression;
pub mod connection;
pub mod error;
pub mod io;
pub mod protocol;
pub mod query;
pub mod settings;
pub mod types;
pub mod value;
pub mod wire_format;

#[cfg(feature = "tls")]
pub mod ssl;

pub use block::{
    Block,
    BlockSettings,
};
pub use client::{
    Client,
    ClientOptions,
    Endpoint,
    QueryResult,
    SessionState,
};
pub use connection::{
    Connection,
    ConnectionOptions,
};
pub use error::{
    Error,
    Result,
};
pub use protocol::CompressionMethod;
pub use query::{
    ClientInfo,
    Exception,
    Profile,
    Progress,
    Query,
    ServerInfo,
    TracingContext,
};
pub use types::Type;
pub use value::{
    Int256,
    Value,
};

#[cfg(feature = "tls")]
pub use ssl::SslOptions;
