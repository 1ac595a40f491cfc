//! The session state machine.
//!
//! A [`Client`] owns one connection and drives the packet exchange:
//! handshake, query dispatch, block streaming, ping, cancellation,
//! exception surfacing. Sessions are single-threaded; concurrency comes
//! from running several sessions.
//!
//! States: `Disconnected -> Connecting -> Ready -> Streaming -> Ready`,
//! with side exits to `Failed` (terminal until reconnect) and `Closed`.

use crate::{
    block::Block,
    connection::{
        Connection,
        ConnectionOptions,
    },
    io::{
        BlockReader,
        BlockWriter,
    },
    protocol::{
        ClientCode,
        CompressionMethod,
        CompressionState,
        ServerCode,
        Stage,
        CLIENT_REVISION,
        DBMS_MIN_PROTOCOL_VERSION_WITH_ADDENDUM,
        DBMS_MIN_PROTOCOL_VERSION_WITH_DISTRIBUTED_DEPTH,
        DBMS_MIN_PROTOCOL_VERSION_WITH_INITIAL_QUERY_START_TIME,
        DBMS_MIN_REVISION_WITH_CLIENT_INFO,
        DBMS_MIN_REVISION_WITH_INTERSERVER_SECRET,
        DBMS_MIN_REVISION_WITH_OPENTELEMETRY,
        DBMS_MIN_REVISION_WITH_PARALLEL_REPLICAS,
        DBMS_MIN_REVISION_WITH_QUOTA_KEY_IN_CLIENT_INFO,
        DBMS_MIN_REVISION_WITH_SERVER_DISPLAY_NAME,
        DBMS_MIN_REVISION_WITH_SERVER_TIMEZONE,
        DBMS_MIN_REVISION_WITH_SETTINGS_SERIALIZED_AS_STRINGS,
        DBMS_MIN_REVISION_WITH_TEMPORARY_TABLES,
        DBMS_MIN_REVISION_WITH_VERSION_PATCH,
    },
    query::{
        ClientInfo,
        Exception,
        Profile,
        Progress,
        Query,
        ServerInfo,
    },
    Error,
    Result,
};
use std::time::Duration;
use tokio::io::{
    AsyncRead,
    AsyncWrite,
};
use tracing::{
    debug,
    trace,
    warn,
};

#[cfg(feature = "tls")]
use crate::ssl::SslOptions;

/// Where the session sits in the packet exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Ready,
    Streaming,
    Failed,
    Closed,
}

/// A host/port pair for failover lists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

/// Session configuration.
#[derive(Clone, Debug)]
pub struct ClientOptions {
    pub host: String,
    pub port: u16,
    /// Failover endpoints; `host`/`port` are used when empty.
    pub endpoints: Vec<Endpoint>,
    pub database: String,
    pub user: String,
    pub password: String,
    pub compression: Option<CompressionMethod>,
    pub client_info: ClientInfo,
    pub connection_options: ConnectionOptions,
    #[cfg(feature = "tls")]
    pub ssl_options: Option<SslOptions>,
    /// Connect attempts per endpoint (default: 1, no retry).
    pub send_retries: u32,
    pub retry_timeout: Duration,
    /// Ping the server before each query.
    pub ping_before_query: bool,
    /// Deadline on waiting for Pong.
    pub ping_timeout: Duration,
    /// Deadline on a whole query; zero means none. Expiry is terminal.
    pub query_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9000,
            endpoints: Vec::new(),
            database: "default".to_string(),
            user: "default".to_string(),
            password: String::new(),
            compression: Some(CompressionMethod::Lz4),
            client_info: ClientInfo::default(),
            connection_options: ConnectionOptions::default(),
            #[cfg(feature = "tls")]
            ssl_options: None,
            send_retries: 1,
            retry_timeout: Duration::from_secs(5),
            ping_before_query: false,
            ping_timeout: Duration::from_secs(5),
            query_timeout: Duration::ZERO,
        }
    }
}

impl ClientOptions {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port, ..Default::default() }
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn compression(mut self, method: Option<CompressionMethod>) -> Self {
        self.compression = method;
        self
    }

    pub fn add_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.endpoints.push(Endpoint::new(host, port));
        self
    }

    pub fn connection_options(mut self, options: ConnectionOptions) -> Self {
        self.connection_options = options;
        self
    }

    pub fn send_retries(mut self, retries: u32) -> Self {
        self.send_retries = retries;
        self
    }

    pub fn ping_before_query(mut self, enabled: bool) -> Self {
        self.ping_before_query = enabled;
        self
    }

    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    #[cfg(feature = "tls")]
    pub fn ssl_options(mut self, options: SslOptions) -> Self {
        self.ssl_options = Some(options);
        self
    }

    fn effective_endpoints(&self) -> Vec<Endpoint> {
        if self.endpoints.is_empty() {
            vec![Endpoint::new(&self.host, self.port)]
        } else {
            self.endpoints.clone()
        }
    }
}

/// Result of a SELECT-style query.
#[derive(Debug)]
pub struct QueryResult {
    pub blocks: Vec<Block>,
    pub progress: Progress,
    pub profile: Option<Profile>,
}

impl QueryResult {
    /// Total rows across all result blocks.
    pub fn row_count(&self) -> usize {
        self.blocks.iter().map(Block::row_count).sum()
    }
}

/// A single session against one ClickHouse server.
#[derive(Debug)]
pub struct Client {
    conn: Connection,
    server_info: ServerInfo,
    revision: u64,
    state: SessionState,
    block_reader: BlockReader,
    block_writer: BlockWriter,
    options: ClientOptions,
}

impl Client {
    /// Connect and handshake, walking the endpoint list with retries.
    pub async fn connect(options: ClientOptions) -> Result<Self> {
        let endpoints = options.effective_endpoints();
        let mut last_error = None;

        for endpoint in &endpoints {
            for attempt in 0..options.send_retries.max(1) {
                match Self::try_connect(&endpoint.host, endpoint.port, &options)
                    .await
                {
                    Ok(client) => return Ok(client),
                    Err(e) => {
                        warn!(
                            host = %endpoint.host,
                            port = endpoint.port,
                            attempt,
                            error = %e,
                            "connect attempt failed"
                        );
                        last_error = Some(e);
                        if attempt + 1 < options.send_retries {
                            tokio::time::sleep(options.retry_timeout).await;
                        }
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::Connection("No endpoints available".to_string())
        }))
    }

    async fn try_connect(
        host: &str,
        port: u16,
        options: &ClientOptions,
    ) -> Result<Self> {
        #[cfg(feature = "tls")]
        if let Some(ssl) = &options.ssl_options {
            let stream = Connection::open_tcp(
                host,
                port,
                &options.connection_options,
            )
            .await?;
            let tls_stream = ssl.wrap(host, stream).await?;
            return Self::connect_stream(tls_stream, options.clone()).await;
        }

        let conn =
            Connection::connect(host, port, &options.connection_options)
                .await?;
        Self::handshake(conn, options.clone()).await
    }

    /// Handshake over an already established duplex stream. Lets tests run
    /// a session against an in-memory pipe and the TLS adapter hand over
    /// its stream.
    pub async fn connect_stream<S>(
        stream: S,
        options: ClientOptions,
    ) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Self::handshake(Connection::from_stream(stream), options).await
    }

    async fn handshake(
        mut conn: Connection,
        options: ClientOptions,
    ) -> Result<Self> {
        Self::send_hello(&mut conn, &options).await?;
        let server_info = Self::receive_hello(&mut conn).await?;

        // Everything after the Hello exchange speaks the common revision
        let revision = CLIENT_REVISION.min(server_info.revision);
        debug!(
            server = %server_info.name,
            server_revision = server_info.revision,
            negotiated = revision,
            "handshake complete"
        );

        if revision >= DBMS_MIN_PROTOCOL_VERSION_WITH_ADDENDUM {
            // Addendum: quota key
            conn.write_string(&options.client_info.quota_key).await?;
            conn.flush().await?;
        }

        let mut block_reader = BlockReader::new(revision);
        let mut block_writer = BlockWriter::new(revision);
        if let Some(method) = options.compression {
            block_reader = block_reader.with_compression(method);
            block_writer = block_writer.with_compression(method);
        }

        Ok(Self {
            conn,
            server_info,
            revision,
            state: SessionState::Ready,
            block_reader,
            block_writer,
            options,
        })
    }

    async fn send_hello(
        conn: &mut Connection,
        options: &ClientOptions,
    ) -> Result<()> {
        let info = &options.client_info;

        conn.write_varint(ClientCode::Hello as u64).await?;
        conn.write_string(&info.client_name).await?;
        conn.write_varint(info.client_version_major).await?;
        conn.write_varint(info.client_version_minor).await?;
        conn.write_varint(info.client_revision).await?;
        conn.write_string(&options.database).await?;
        conn.write_string(&options.user).await?;
        conn.write_string(&options.password).await?;
        conn.flush().await
    }

    async fn receive_hello(conn: &mut Connection) -> Result<ServerInfo> {
        let kind = conn.read_varint().await?;
        match ServerCode::try_from(kind)? {
            ServerCode::Hello => {}
            ServerCode::Exception => {
                let exception = Exception::read(conn).await?;
                return Err(exception.into());
            }
            other => {
                return Err(Error::Protocol(format!(
                    "Expected Hello during handshake, got {:?}",
                    other
                )));
            }
        }

        let name = conn.read_string().await?;
        let version_major = conn.read_varint().await?;
        let version_minor = conn.read_varint().await?;
        let revision = conn.read_varint().await?;

        let timezone = if revision >= DBMS_MIN_REVISION_WITH_SERVER_TIMEZONE {
            conn.read_string().await?
        } else {
            String::new()
        };

        let display_name =
            if revision >= DBMS_MIN_REVISION_WITH_SERVER_DISPLAY_NAME {
                conn.read_string().await?
            } else {
                String::new()
            };

        let version_patch =
            if revision >= DBMS_MIN_REVISION_WITH_VERSION_PATCH {
                conn.read_varint().await?
            } else {
                0
            };

        Ok(ServerInfo {
            name,
            version_major,
            version_minor,
            version_patch,
            revision,
            timezone,
            display_name,
        })
    }

    /// Server identity from the handshake.
    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// The revision both sides speak: `min(client, server)`.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Close the session. The connection drops with the client; this only
    /// marks the state so later calls fail fast.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    fn check_ready(&self, operation: &str) -> Result<()> {
        if self.state != SessionState::Ready {
            return Err(Error::InvalidState(format!(
                "{} requires the Ready state, session is {:?}",
                operation, self.state
            )));
        }
        Ok(())
    }

    /// Execute a statement and discard any data it returns.
    pub async fn execute(&mut self, query: impl Into<Query>) -> Result<()> {
        let query = query.into();
        self.send_query_checked(&query).await?;
        self.receive_result(&query).await?;
        Ok(())
    }

    /// Execute a query and collect its result blocks.
    pub async fn query(
        &mut self,
        query: impl Into<Query>,
    ) -> Result<QueryResult> {
        let query = query.into();
        self.send_query_checked(&query).await?;
        self.receive_result(&query).await
    }

    /// Stream blocks into an INSERT. The server answers the query with a
    /// header block describing the target columns; `blocks` are then sent
    /// and an empty block terminates the stream.
    pub async fn insert(
        &mut self,
        query: impl Into<Query>,
        blocks: Vec<Block>,
    ) -> Result<Block> {
        let query = query.into();
        self.send_query_checked(&query).await?;

        // Wait for the header block
        let header = loop {
            let kind = self.read_packet_kind().await?;
            match kind {
                ServerCode::Data => break self.read_data_block().await?,
                ServerCode::Progress => {
                    let _ = Progress::read(&mut self.conn, self.revision)
                        .await?;
                }
                ServerCode::TableColumns => {
                    let _name = self.conn.read_string().await?;
                    let _columns = self.conn.read_string().await?;
                }
                ServerCode::Log => {
                    self.read_log_block().await?;
                }
                ServerCode::Exception => {
                    let exception = Exception::read(&mut self.conn).await?;
                    self.drain_after_exception().await?;
                    return Err(exception.into());
                }
                other => {
                    self.state = SessionState::Failed;
                    return Err(Error::Protocol(format!(
                        "Unexpected packet {:?} while waiting for the \
                         insert header",
                        other
                    )));
                }
            }
        };

        for block in &blocks {
            if block.is_poisoned() {
                // Mid-insert there is no clean way back to Ready
                self.state = SessionState::Failed;
                return Err(Error::Validation(
                    "Refusing to send a poisoned block".to_string(),
                ));
            }
            self.send_data_block(block).await?;
        }

        // Empty block closes the insert stream
        self.send_data_block(&Block::new()).await?;
        self.receive_result(&Query::new("")).await?;
        Ok(header)
    }

    /// Liveness probe. Only legal in Ready; anything but a timely Pong
    /// fails the session.
    pub async fn ping(&mut self) -> Result<()> {
        self.check_ready("ping")?;

        self.conn.write_varint(ClientCode::Ping as u64).await?;
        self.conn.flush().await?;

        let deadline = self.options.ping_timeout;
        let kind = if deadline > Duration::ZERO {
            match tokio::time::timeout(deadline, self.conn.read_varint())
                .await
            {
                Ok(result) => result?,
                Err(_) => {
                    self.state = SessionState::Failed;
                    return Err(Error::Connection(format!(
                        "No Pong within {:?}",
                        deadline
                    )));
                }
            }
        } else {
            self.conn.read_varint().await?
        };

        match ServerCode::try_from(kind) {
            Ok(ServerCode::Pong) => Ok(()),
            other => {
                self.state = SessionState::Failed;
                Err(Error::Protocol(format!(
                    "Expected Pong, got {:?}",
                    other
                )))
            }
        }
    }

    /// Request cancellation of the running query. A no-op outside
    /// Streaming; the reading loop still drains to end-of-stream.
    pub async fn cancel_query(&mut self) -> Result<()> {
        if self.state != SessionState::Streaming {
            return Ok(());
        }
        self.send_cancel().await
    }

    async fn send_cancel(&mut self) -> Result<()> {
        self.conn.write_varint(ClientCode::Cancel as u64).await?;
        self.conn.flush().await
    }

    async fn send_query_checked(&mut self, query: &Query) -> Result<()> {
        match self.send_query(query).await {
            Err(e) if e.is_terminal() => {
                self.state = SessionState::Failed;
                Err(e)
            }
            other => other,
        }
    }

    async fn send_query(&mut self, query: &Query) -> Result<()> {
        if self.options.ping_before_query {
            self.ping().await?;
        }
        self.check_ready("query")?;

        trace!(query = query.text(), "sending query");
        self.conn.write_varint(ClientCode::Query as u64).await?;
        self.conn.write_string(query.id()).await?;

        if self.revision >= DBMS_MIN_REVISION_WITH_CLIENT_INFO {
            self.write_client_info(query).await?;
        }

        // Settings, an empty name terminates the list
        if self.revision
            >= DBMS_MIN_REVISION_WITH_SETTINGS_SERIALIZED_AS_STRINGS
        {
            for (name, value) in query.settings() {
                self.conn.write_string(name).await?;
                self.conn.write_varint(0).await?; // flags
                self.conn.write_string(value).await?;
            }
        }
        self.conn.write_string("").await?;

        if self.revision >= DBMS_MIN_REVISION_WITH_INTERSERVER_SECRET {
            self.conn.write_string("").await?;
        }

        self.conn.write_varint(Stage::Complete as u64).await?;

        let compression = if self.options.compression.is_some() {
            CompressionState::Enable
        } else {
            CompressionState::Disable
        };
        self.conn.write_varint(compression as u64).await?;

        self.conn.write_string(query.text()).await?;

        // Trailing empty Data packet: end of external tables
        self.send_data_block(&Block::new()).await?;
        Ok(())
    }

    async fn write_client_info(&mut self, query: &Query) -> Result<()> {
        let info = self.options.client_info.clone();

        self.conn.write_u8(1).await?; // query kind: initial query
        self.conn.write_string(&info.initial_user).await?;
        self.conn.write_string(&info.initial_query_id).await?;
        self.conn.write_string(&info.initial_address).await?;

        if self.revision
            >= DBMS_MIN_PROTOCOL_VERSION_WITH_INITIAL_QUERY_START_TIME
        {
            self.conn.write_i64(0).await?;
        }

        self.conn.write_u8(info.interface_type).await?;
        self.conn.write_string(&info.os_user).await?;
        self.conn.write_string(&info.client_hostname).await?;
        self.conn.write_string(&info.client_name).await?;
        self.conn.write_varint(info.client_version_major).await?;
        self.conn.write_varint(info.client_version_minor).await?;
        self.conn.write_varint(info.client_revision).await?;

        if self.revision >= DBMS_MIN_REVISION_WITH_QUOTA_KEY_IN_CLIENT_INFO {
            self.conn.write_string(&info.quota_key).await?;
        }
        if self.revision >= DBMS_MIN_PROTOCOL_VERSION_WITH_DISTRIBUTED_DEPTH {
            self.conn.write_varint(0).await?;
        }
        if self.revision >= DBMS_MIN_REVISION_WITH_VERSION_PATCH {
            self.conn.write_varint(info.client_version_patch).await?;
        }
        if self.revision >= DBMS_MIN_REVISION_WITH_OPENTELEMETRY {
            match query.tracing_context().filter(|c| c.is_enabled()) {
                Some(context) => {
                    self.conn.write_u8(1).await?;
                    self.conn.write_u128(context.trace_id).await?;
                    self.conn.write_u64(context.span_id).await?;
                    self.conn.write_string(&context.tracestate).await?;
                    self.conn.write_u8(context.trace_flags).await?;
                }
                None => {
                    self.conn.write_u8(0).await?;
                }
            }
        }
        if self.revision >= DBMS_MIN_REVISION_WITH_PARALLEL_REPLICAS {
            self.conn.write_varint(0).await?; // collaborate_with_initiator
            self.conn.write_varint(0).await?; // count_participating_replicas
            self.conn.write_varint(0).await?; // number_of_current_replica
        }

        Ok(())
    }

    async fn send_data_block(&mut self, block: &Block) -> Result<()> {
        self.conn.write_varint(ClientCode::Data as u64).await?;
        self.block_writer.write_block(&mut self.conn, block).await
    }

    // A failure here leaves the stream in an unknown position, so every
    // error path is terminal for the session.
    async fn read_packet_kind(&mut self) -> Result<ServerCode> {
        let recv_timeout = self.options.connection_options.recv_timeout;
        let kind = if recv_timeout > Duration::ZERO {
            match tokio::time::timeout(recv_timeout, self.conn.read_varint())
                .await
            {
                Ok(Ok(kind)) => kind,
                Ok(Err(e)) => {
                    self.state = SessionState::Failed;
                    return Err(e);
                }
                Err(_) => {
                    self.state = SessionState::Failed;
                    return Err(Error::Connection(format!(
                        "Read timeout after {:?}",
                        recv_timeout
                    )));
                }
            }
        } else {
            match self.conn.read_varint().await {
                Ok(kind) => kind,
                Err(e) => {
                    self.state = SessionState::Failed;
                    return Err(e);
                }
            }
        };

        ServerCode::try_from(kind).map_err(|e| {
            self.state = SessionState::Failed;
            e
        })
    }

    async fn read_data_block(&mut self) -> Result<Block> {
        if self.revision >= DBMS_MIN_REVISION_WITH_TEMPORARY_TABLES {
            let _table = self.conn.read_string().await?;
        }
        self.block_reader.read_block(&mut self.conn).await
    }

    /// Log-ish blocks (Log, ProfileEvents) are never compressed.
    async fn read_log_block(&mut self) -> Result<Block> {
        let _table = self.conn.read_string().await?;
        BlockReader::new(self.revision).read_block(&mut self.conn).await
    }

    /// Read server packets until end-of-stream. An exception stops data
    /// collection, the stream still drains, and the session returns to
    /// Ready once the terminator arrives.
    async fn receive_result(&mut self, query: &Query) -> Result<QueryResult> {
        self.state = SessionState::Streaming;

        let query_timeout = self.options.query_timeout;
        let result = if query_timeout > Duration::ZERO {
            match tokio::time::timeout(
                query_timeout,
                self.receive_packets(query),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => {
                    self.state = SessionState::Failed;
                    return Err(Error::Connection(format!(
                        "Query timeout after {:?}",
                        query_timeout
                    )));
                }
            }
        } else {
            self.receive_packets(query).await
        };

        if let Err(e) = &result {
            if e.is_terminal() {
                self.state = SessionState::Failed;
            }
        }
        result
    }

    async fn receive_packets(&mut self, query: &Query) -> Result<QueryResult> {
        let mut blocks = Vec::new();
        let mut progress = Progress::default();
        let mut profile = None;
        let mut exception: Option<Exception> = None;

        let outcome = self
            .packet_loop(
                query,
                &mut blocks,
                &mut progress,
                &mut profile,
                &mut exception,
            )
            .await;

        match (outcome, exception) {
            (Ok(()), None) => Ok(QueryResult { blocks, progress, profile }),
            // End-of-stream seen after an exception: session is usable again
            (Ok(()), Some(exception)) => Err(exception.into()),
            // The drain died; surface the exception, the session is gone
            (Err(e), Some(exception)) if e.is_terminal() => {
                self.state = SessionState::Failed;
                Err(exception.into())
            }
            (Err(e), _) => Err(e),
        }
    }

    async fn packet_loop(
        &mut self,
        query: &Query,
        blocks: &mut Vec<Block>,
        progress: &mut Progress,
        profile: &mut Option<Profile>,
        exception: &mut Option<Exception>,
    ) -> Result<()> {
        loop {
            let kind = self.read_packet_kind().await?;
            trace!(?kind, "server packet");

            match kind {
                ServerCode::Data => {
                    let block = self.read_data_block().await?;
                    if exception.is_some() {
                        continue;
                    }

                    if let Some(callback) = query.get_on_data_cancelable() {
                        if !callback(&block) {
                            self.send_cancel().await?;
                        }
                    } else if let Some(callback) = query.get_on_data() {
                        callback(&block);
                    }

                    if !block.is_empty() {
                        blocks.push(block);
                    }
                }
                ServerCode::Totals | ServerCode::Extremes => {
                    // Same framing as Data; not part of the main result
                    let _ = self.read_data_block().await?;
                }
                ServerCode::Progress => {
                    let packet =
                        Progress::read(&mut self.conn, self.revision).await?;
                    progress.accumulate(&packet);
                    if let Some(callback) = query.get_on_progress() {
                        callback(&packet);
                    }
                }
                ServerCode::ProfileInfo => {
                    let packet = Profile::read(&mut self.conn).await?;
                    if let Some(callback) = query.get_on_profile() {
                        callback(&packet);
                    }
                    *profile = Some(packet);
                }
                ServerCode::Log => {
                    let block = self.read_log_block().await?;
                    if let Some(callback) = query.get_on_server_log() {
                        callback(&block);
                    }
                }
                ServerCode::ProfileEvents => {
                    let _ = self.read_log_block().await?;
                }
                ServerCode::TableColumns => {
                    let _name = self.conn.read_string().await?;
                    let _columns = self.conn.read_string().await?;
                }
                ServerCode::Exception => {
                    let packet = Exception::read(&mut self.conn).await?;
                    debug!(
                        code = packet.code,
                        name = %packet.name,
                        "server exception"
                    );
                    if let Some(callback) = query.get_on_exception() {
                        callback(&packet);
                    }
                    if exception.is_none() {
                        *exception = Some(packet);
                    }
                }
                ServerCode::EndOfStream => {
                    self.state = SessionState::Ready;
                    return Ok(());
                }
                other => {
                    self.state = SessionState::Failed;
                    return Err(Error::Protocol(format!(
                        "Unexpected packet in the reading loop: {:?}",
                        other
                    )));
                }
            }
        }
    }

    /// After an exception outside the main loop, keep consuming packets
    /// until the terminator so the stream holds no leftover bytes.
    async fn drain_after_exception(&mut self) -> Result<()> {
        match self.receive_packets(&Query::new("")).await {
            Ok(_) => {
                self.state = SessionState::Ready;
                Ok(())
            }
            Err(e) if e.is_terminal() => {
                self.state = SessionState::Failed;
                Err(e)
            }
            Err(_) => {
                self.state = SessionState::Ready;
                Ok(())
            }
        }
    }
}
