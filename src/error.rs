//! Error types for the ClickHouse native protocol core.
//!
//! All fallible operations in this crate return [`Result<T>`], which is an
//! alias for `std::result::Result<T, Error>`.

use thiserror::Error;

/// Errors that can occur while speaking the ClickHouse native protocol.
#[derive(Error, Debug)]
pub enum Error {
    /// An I/O error occurred on the underlying TCP or TLS connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to establish a connection to the ClickHouse server.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The buffer ended before a complete value could be read.
    #[error("Short read: need {needed} more bytes, have {available}")]
    ShortRead {
        /// Bytes required by the decoder.
        needed: usize,
        /// Bytes left in the buffer.
        available: usize,
    },

    /// A varint ran past the 10-byte limit for 64-bit values.
    #[error("Malformed varint: more than 10 continuation bytes")]
    MalformedVarint,

    /// A protocol-level error, such as an unexpected packet kind or
    /// malformed data from the server.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An error during LZ4 or ZSTD frame compression/decompression.
    #[error("Compression error: {0}")]
    Compression(String),

    /// A compressed frame failed CityHash128 verification.
    #[error("Checksum mismatch in compressed frame")]
    ChecksumMismatch,

    /// A type expression could not be parsed.
    #[error("Cannot parse type '{0}'")]
    TypeParse(String),

    /// A type nesting the server never produces, e.g. `Nullable(Array(T))`.
    #[error("Unsupported type composition: {0}")]
    UnsupportedTypeComposition(String),

    /// A type mismatch between expected and actual column types.
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The type that was expected.
        expected: String,
        /// The type that was received.
        actual: String,
    },

    /// A logical value could not be converted to a column's wire
    /// representation (wrong variant, out of range, too long).
    #[error("Cannot convert value to {target}: {message}")]
    ValueConversion {
        /// Canonical name of the target type.
        target: String,
        /// What was wrong with the value.
        message: String,
    },

    /// A staging row failed to commit into a block. The block is poisoned;
    /// discard it.
    #[error("Append failed for column '{column}' at row {row}")]
    AppendFailed {
        /// Name of the column that rejected its value.
        column: String,
        /// Zero-based row index at the time of the failure.
        row: usize,
        /// The underlying conversion failure.
        #[source]
        source: Box<Error>,
    },

    /// An exception returned by the ClickHouse server.
    #[error("Server error {code} ({name}): {message}")]
    Server {
        /// ClickHouse error code.
        code: i32,
        /// Exception class name, e.g. `DB::Exception`.
        name: String,
        /// Display text from the server.
        message: String,
        /// Server-side stack trace.
        stack_trace: String,
        /// Nested exception chain, outermost first.
        nested: Option<Box<Error>>,
    },

    /// An operation was issued in a session state that does not allow it.
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// A setting name the registry does not know.
    #[error("Unknown setting '{0}'")]
    UnknownSetting(String),

    /// An invalid argument was provided to a function.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A validation error, such as mismatched row counts in a block.
    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Whether this error terminates the session. Terminal errors require a
    /// reconnect; everything else leaves the session usable once the current
    /// packet boundary is reached.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::Connection(_)
                | Error::ShortRead { .. }
                | Error::Protocol(_)
                | Error::Compression(_)
                | Error::ChecksumMismatch
        )
    }
}

/// A type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
