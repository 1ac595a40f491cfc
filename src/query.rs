//! Query envelope and the server-side packet payloads.
//!
//! [`Query`] carries the text plus per-query settings, an optional query
//! id, an optional OpenTelemetry context, and observer callbacks for the
//! non-data packets a server interleaves into a response stream.

use crate::{
    block::Block,
    connection::Connection,
    protocol::{
        CLIENT_REVISION,
        DBMS_MIN_REVISION_WITH_CLIENT_WRITE_INFO,
        DBMS_MIN_PROTOCOL_VERSION_WITH_TOTAL_BYTES_IN_PROGRESS,
    },
    Error,
    Result,
};
use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::Arc,
};

/// Per-query settings, serialized as string name/value pairs.
pub type QuerySettings = HashMap<String, String>;

/// OpenTelemetry trace context (W3C Trace Context), emitted with the Query
/// packet on revisions that support it.
#[derive(Clone, Debug, Default)]
pub struct TracingContext {
    pub trace_id: u128,
    pub span_id: u64,
    pub tracestate: String,
    pub trace_flags: u8,
}

impl TracingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids(trace_id: u128, span_id: u64) -> Self {
        Self { trace_id, span_id, tracestate: String::new(), trace_flags: 0 }
    }

    pub fn is_enabled(&self) -> bool {
        self.trace_id != 0
    }
}

/// Callback types invoked from the reading loop.
pub type ProgressCallback = Arc<dyn Fn(&Progress) + Send + Sync>;
pub type ProfileCallback = Arc<dyn Fn(&Profile) + Send + Sync>;
pub type DataCallback = Arc<dyn Fn(&Block) + Send + Sync>;
/// Returns false to request cancellation at the next packet boundary.
pub type DataCancelableCallback = Arc<dyn Fn(&Block) -> bool + Send + Sync>;
pub type ServerLogCallback = Arc<dyn Fn(&Block) + Send + Sync>;
pub type ExceptionCallback = Arc<dyn Fn(&Exception) + Send + Sync>;

/// A query to execute, with observers.
#[derive(Clone, Default)]
pub struct Query {
    text: String,
    query_id: String,
    settings: QuerySettings,
    tracing_context: Option<TracingContext>,
    on_progress: Option<ProgressCallback>,
    on_profile: Option<ProfileCallback>,
    on_data: Option<DataCallback>,
    on_data_cancelable: Option<DataCancelableCallback>,
    on_server_log: Option<ServerLogCallback>,
    on_exception: Option<ExceptionCallback>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Default::default() }
    }

    pub fn with_query_id(mut self, query_id: impl Into<String>) -> Self {
        self.query_id = query_id.into();
        self
    }

    pub fn with_setting(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn with_tracing_context(mut self, context: TracingContext) -> Self {
        self.tracing_context = Some(context);
        self
    }

    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Progress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn on_profile<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Profile) + Send + Sync + 'static,
    {
        self.on_profile = Some(Arc::new(callback));
        self
    }

    pub fn on_data<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Block) + Send + Sync + 'static,
    {
        self.on_data = Some(Arc::new(callback));
        self
    }

    /// Data callback that can cancel the query: return false and the
    /// session sends a Cancel packet and drains to end-of-stream.
    pub fn on_data_cancelable<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Block) -> bool + Send + Sync + 'static,
    {
        self.on_data_cancelable = Some(Arc::new(callback));
        self
    }

    pub fn on_server_log<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Block) + Send + Sync + 'static,
    {
        self.on_server_log = Some(Arc::new(callback));
        self
    }

    pub fn on_exception<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Exception) + Send + Sync + 'static,
    {
        self.on_exception = Some(Arc::new(callback));
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn id(&self) -> &str {
        &self.query_id
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    pub fn tracing_context(&self) -> Option<&TracingContext> {
        self.tracing_context.as_ref()
    }

    pub(crate) fn get_on_progress(&self) -> Option<&ProgressCallback> {
        self.on_progress.as_ref()
    }

    pub(crate) fn get_on_profile(&self) -> Option<&ProfileCallback> {
        self.on_profile.as_ref()
    }

    pub(crate) fn get_on_data(&self) -> Option<&DataCallback> {
        self.on_data.as_ref()
    }

    pub(crate) fn get_on_data_cancelable(
        &self,
    ) -> Option<&DataCancelableCallback> {
        self.on_data_cancelable.as_ref()
    }

    pub(crate) fn get_on_server_log(&self) -> Option<&ServerLogCallback> {
        self.on_server_log.as_ref()
    }

    pub(crate) fn get_on_exception(&self) -> Option<&ExceptionCallback> {
        self.on_exception.as_ref()
    }
}

impl From<&str> for Query {
    fn from(s: &str) -> Self {
        Query::new(s)
    }
}

impl From<String> for Query {
    fn from(s: String) -> Self {
        Query::new(s)
    }
}

/// Client identity advertised in Hello and echoed into every Query packet's
/// ClientInfo block.
#[derive(Clone, Debug)]
pub struct ClientInfo {
    pub interface_type: u8, // 1 = TCP
    pub initial_user: String,
    pub initial_query_id: String,
    pub initial_address: String,
    pub quota_key: String,
    pub os_user: String,
    pub client_hostname: String,
    pub client_name: String,
    pub client_version_major: u64,
    pub client_version_minor: u64,
    pub client_version_patch: u64,
    pub client_revision: u64,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            interface_type: 1,
            initial_user: String::new(),
            initial_query_id: String::new(),
            initial_address: "0.0.0.0:0".to_string(),
            quota_key: String::new(),
            os_user: std::env::var("USER")
                .unwrap_or_else(|_| "default".to_string()),
            client_hostname: hostname(),
            client_name: "clickhouse-native-core".to_string(),
            client_version_major: 1,
            client_version_minor: 0,
            client_version_patch: 0,
            client_revision: CLIENT_REVISION,
        }
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

/// Server identity from the Hello packet.
#[derive(Clone, Debug, Default)]
pub struct ServerInfo {
    pub name: String,
    pub version_major: u64,
    pub version_minor: u64,
    pub version_patch: u64,
    pub revision: u64,
    pub timezone: String,
    pub display_name: String,
}

/// Progress counters from a Progress packet. Later revisions extend the
/// layout with totals and write-side counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    pub rows: u64,
    pub bytes: u64,
    pub total_rows: u64,
    pub total_bytes: u64,
    pub written_rows: u64,
    pub written_bytes: u64,
}

impl Progress {
    /// Read one Progress payload at the given negotiated revision.
    pub async fn read(
        conn: &mut Connection,
        revision: u64,
    ) -> Result<Self> {
        let rows = conn.read_varint().await?;
        let bytes = conn.read_varint().await?;
        let total_rows = conn.read_varint().await?;

        let total_bytes = if revision
            >= DBMS_MIN_PROTOCOL_VERSION_WITH_TOTAL_BYTES_IN_PROGRESS
        {
            conn.read_varint().await?
        } else {
            0
        };

        let (written_rows, written_bytes) =
            if revision >= DBMS_MIN_REVISION_WITH_CLIENT_WRITE_INFO {
                (conn.read_varint().await?, conn.read_varint().await?)
            } else {
                (0, 0)
            };

        Ok(Self {
            rows,
            bytes,
            total_rows,
            total_bytes,
            written_rows,
            written_bytes,
        })
    }

    /// Fold another progress packet into the session counters.
    pub fn accumulate(&mut self, other: &Progress) {
        self.rows += other.rows;
        self.bytes += other.bytes;
        self.total_rows = self.total_rows.max(other.total_rows);
        self.total_bytes = self.total_bytes.max(other.total_bytes);
        self.written_rows += other.written_rows;
        self.written_bytes += other.written_bytes;
    }
}

/// Execution profile from a ProfileInfo packet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Profile {
    pub rows: u64,
    pub blocks: u64,
    pub bytes: u64,
    pub applied_limit: bool,
    pub rows_before_limit: u64,
    pub calculated_rows_before_limit: bool,
}

impl Profile {
    pub async fn read(conn: &mut Connection) -> Result<Self> {
        let rows = conn.read_varint().await?;
        let blocks = conn.read_varint().await?;
        let bytes = conn.read_varint().await?;
        let applied_limit = conn.read_u8().await? != 0;
        let rows_before_limit = conn.read_varint().await?;
        let calculated_rows_before_limit = conn.read_u8().await? != 0;

        Ok(Self {
            rows,
            blocks,
            bytes,
            applied_limit,
            rows_before_limit,
            calculated_rows_before_limit,
        })
    }
}

/// A server exception with its nested chain, surfaced verbatim.
#[derive(Clone, Debug)]
pub struct Exception {
    pub code: i32,
    pub name: String,
    pub message: String,
    pub stack_trace: String,
    pub nested: Option<Box<Exception>>,
}

impl Exception {
    pub fn read<'a>(
        conn: &'a mut Connection,
    ) -> Pin<Box<dyn Future<Output = Result<Self>> + Send + 'a>> {
        Box::pin(async move {
            let code = conn.read_i32().await?;
            let name = conn.read_string().await?;
            let message = conn.read_string().await?;
            let stack_trace = conn.read_string().await?;
            let has_nested = conn.read_u8().await? != 0;

            let nested = if has_nested {
                Some(Box::new(Exception::read(conn).await?))
            } else {
                None
            };

            Ok(Self { code, name, message, stack_trace, nested })
        })
    }
}

impl From<Exception> for Error {
    fn from(exception: Exception) -> Self {
        Error::Server {
            code: exception.code,
            name: exception.name,
            message: exception.message,
            stack_trace: exception.stack_trace,
            nested: exception.nested.map(|e| Box::new(Error::from(*e))),
        }
    }
}
