//! Packet kind tags and protocol revision constants.
//!
//! Every packet on the wire starts with a varint kind. Which fields follow
//! the kind depends on the revision negotiated during the handshake; the
//! `DBMS_MIN_REVISION_WITH_*` constants below gate those fields.

/// Revision this client advertises in its Hello packet. The effective
/// revision for a session is `min(CLIENT_REVISION, server revision)`.
pub const CLIENT_REVISION: u64 = 54459;

pub const DBMS_MIN_REVISION_WITH_TEMPORARY_TABLES: u64 = 50264;
pub const DBMS_MIN_REVISION_WITH_BLOCK_INFO: u64 = 51903;
pub const DBMS_MIN_REVISION_WITH_CLIENT_INFO: u64 = 54032;
pub const DBMS_MIN_REVISION_WITH_SERVER_TIMEZONE: u64 = 54058;
pub const DBMS_MIN_REVISION_WITH_QUOTA_KEY_IN_CLIENT_INFO: u64 = 54060;
pub const DBMS_MIN_REVISION_WITH_SERVER_DISPLAY_NAME: u64 = 54372;
pub const DBMS_MIN_REVISION_WITH_VERSION_PATCH: u64 = 54401;
pub const DBMS_MIN_REVISION_WITH_COLUMN_DEFAULTS_METADATA: u64 = 54410;
pub const DBMS_MIN_REVISION_WITH_CLIENT_WRITE_INFO: u64 = 54420;
pub const DBMS_MIN_REVISION_WITH_SETTINGS_SERIALIZED_AS_STRINGS: u64 = 54429;
pub const DBMS_MIN_REVISION_WITH_INTERSERVER_SECRET: u64 = 54441;
pub const DBMS_MIN_REVISION_WITH_OPENTELEMETRY: u64 = 54442;
pub const DBMS_MIN_PROTOCOL_VERSION_WITH_DISTRIBUTED_DEPTH: u64 = 54448;
pub const DBMS_MIN_PROTOCOL_VERSION_WITH_INITIAL_QUERY_START_TIME: u64 = 54449;
pub const DBMS_MIN_REVISION_WITH_PARALLEL_REPLICAS: u64 = 54453;
pub const DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION: u64 = 54454;
pub const DBMS_MIN_PROTOCOL_VERSION_WITH_ADDENDUM: u64 = 54458;
pub const DBMS_MIN_PROTOCOL_VERSION_WITH_TOTAL_BYTES_IN_PROGRESS: u64 = 54463;

/// Kinds of packets received from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum ServerCode {
    Hello = 0,                // Name, version, revision
    Data = 1,                 // Block of data, may be compressed
    Exception = 2,            // Exception during query execution
    Progress = 3,             // Rows and bytes read so far
    Pong = 4,                 // Response to Ping
    EndOfStream = 5,          // All packets were sent
    ProfileInfo = 6,          // Profiling data
    Totals = 7,               // Block of totals, may be compressed
    Extremes = 8,             // Block of mins and maxs, may be compressed
    TablesStatusResponse = 9, // Response to TablesStatus
    Log = 10,                 // Query execution log
    TableColumns = 11,        // Columns' description for default values
    PartUUIDs = 12,           // List of unique parts ids
    ReadTaskRequest = 13,     // Request for the next task
    ProfileEvents = 14,       // Profile events from server
}

impl TryFrom<u64> for ServerCode {
    type Error = crate::Error;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ServerCode::Hello),
            1 => Ok(ServerCode::Data),
            2 => Ok(ServerCode::Exception),
            3 => Ok(ServerCode::Progress),
            4 => Ok(ServerCode::Pong),
            5 => Ok(ServerCode::EndOfStream),
            6 => Ok(ServerCode::ProfileInfo),
            7 => Ok(ServerCode::Totals),
            8 => Ok(ServerCode::Extremes),
            9 => Ok(ServerCode::TablesStatusResponse),
            10 => Ok(ServerCode::Log),
            11 => Ok(ServerCode::TableColumns),
            12 => Ok(ServerCode::PartUUIDs),
            13 => Ok(ServerCode::ReadTaskRequest),
            14 => Ok(ServerCode::ProfileEvents),
            _ => Err(crate::Error::Protocol(format!(
                "Unknown server packet kind: {}",
                value
            ))),
        }
    }
}

/// Kinds of packets sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum ClientCode {
    Hello = 0,  // Name, version, default database name
    Query = 1,  // Query id, client info, settings, stage, compression, text
    Data = 2,   // Data block (INSERT payload), may be compressed
    Cancel = 3, // Cancel the running query
    Ping = 4,   // Check server liveness
}

/// Whether blocks of data are compressed, as advertised in the Query packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum CompressionState {
    Disable = 0,
    Enable = 1,
}

/// Query processing stage requested from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum Stage {
    Complete = 2,
}

/// Block compression method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMethod {
    #[default]
    None,
    Lz4,
    Zstd,
}

impl CompressionMethod {
    /// The method byte carried inside the compressed frame header.
    pub fn method_byte(self) -> u8 {
        match self {
            CompressionMethod::None => 0x02,
            CompressionMethod::Lz4 => 0x82,
            CompressionMethod::Zstd => 0x90,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_code_conversion() {
        assert_eq!(ServerCode::try_from(0).unwrap(), ServerCode::Hello);
        assert_eq!(ServerCode::try_from(5).unwrap(), ServerCode::EndOfStream);
        assert_eq!(
            ServerCode::try_from(14).unwrap(),
            ServerCode::ProfileEvents
        );
        assert!(ServerCode::try_from(99).is_err());
    }

    #[test]
    fn test_method_bytes() {
        assert_eq!(CompressionMethod::None.method_byte(), 0x02);
        assert_eq!(CompressionMethod::Lz4.method_byte(), 0x82);
        assert_eq!(CompressionMethod::Zstd.method_byte(), 0x90);
    }

    #[test]
    fn test_compression_method_default() {
        assert_eq!(CompressionMethod::default(), CompressionMethod::None);
    }
}
