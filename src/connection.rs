//! Async transport wrapper.
//!
//! A [`Connection`] owns exactly one duplex byte stream with a buffered
//! reader and writer. Everything above it (packet codec, session) is
//! transport-agnostic; TLS plugs in as an adapter over the same interface.

use crate::{
    wire_format::WireFormat,
    Error,
    Result,
};
use bytes::Bytes;
use std::time::Duration;
use tokio::{
    io::{
        AsyncRead,
        AsyncReadExt,
        AsyncWrite,
        AsyncWriteExt,
        BufReader,
        BufWriter,
    },
    net::TcpStream,
};

const DEFAULT_READ_BUFFER_SIZE: usize = 8192;
const DEFAULT_WRITE_BUFFER_SIZE: usize = 8192;

/// Connection timeouts and TCP options.
#[derive(Clone, Debug)]
pub struct ConnectionOptions {
    /// Connect deadline (default: 5 seconds).
    pub connect_timeout: Duration,
    /// Socket read deadline, zero means none. Expiry is terminal for the
    /// session.
    pub recv_timeout: Duration,
    /// Socket write deadline, zero means none.
    pub send_timeout: Duration,
    /// Enable TCP keepalive.
    pub tcp_keepalive: bool,
    /// Keepalive idle time (default: 60 seconds).
    pub tcp_keepalive_idle: Duration,
    /// Keepalive probe interval (default: 5 seconds).
    pub tcp_keepalive_interval: Duration,
    /// Disable Nagle's algorithm (default: true).
    pub tcp_nodelay: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            recv_timeout: Duration::ZERO,
            send_timeout: Duration::ZERO,
            tcp_keepalive: false,
            tcp_keepalive_idle: Duration::from_secs(60),
            tcp_keepalive_interval: Duration::from_secs(5),
            tcp_nodelay: true,
        }
    }
}

impl ConnectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn tcp_keepalive(mut self, enabled: bool) -> Self {
        self.tcp_keepalive = enabled;
        self
    }

    pub fn tcp_keepalive_idle(mut self, duration: Duration) -> Self {
        self.tcp_keepalive_idle = duration;
        self
    }

    pub fn tcp_keepalive_interval(mut self, duration: Duration) -> Self {
        self.tcp_keepalive_interval = duration;
        self
    }

    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }
}

/// Buffered duplex byte stream. All suspension points of a session are the
/// read and flush calls here.
pub struct Connection {
    reader: BufReader<Box<dyn AsyncRead + Unpin + Send>>,
    writer: BufWriter<Box<dyn AsyncWrite + Unpin + Send>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

impl Connection {
    /// Wrap any duplex byte stream. Used directly by tests (in-memory
    /// duplex pipes) and by the TLS adapter.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);

        Self {
            reader: BufReader::with_capacity(
                DEFAULT_READ_BUFFER_SIZE,
                Box::new(read_half) as Box<dyn AsyncRead + Unpin + Send>,
            ),
            writer: BufWriter::with_capacity(
                DEFAULT_WRITE_BUFFER_SIZE,
                Box::new(write_half) as Box<dyn AsyncWrite + Unpin + Send>,
            ),
        }
    }

    /// Open a TCP connection and apply the socket options.
    pub async fn connect(
        host: &str,
        port: u16,
        options: &ConnectionOptions,
    ) -> Result<Self> {
        let stream = Self::open_tcp(host, port, options).await?;
        Ok(Self::from_stream(stream))
    }

    pub(crate) async fn open_tcp(
        host: &str,
        port: u16,
        options: &ConnectionOptions,
    ) -> Result<TcpStream> {
        let addr = format!("{}:{}", host, port);

        let stream = if options.connect_timeout > Duration::ZERO {
            tokio::time::timeout(
                options.connect_timeout,
                TcpStream::connect(&addr),
            )
            .await
            .map_err(|_| {
                Error::Connection(format!(
                    "Connect timeout after {:?} to {}",
                    options.connect_timeout, addr
                ))
            })?
            .map_err(|e| {
                Error::Connection(format!(
                    "Failed to connect to {}: {}",
                    addr, e
                ))
            })?
        } else {
            TcpStream::connect(&addr).await.map_err(|e| {
                Error::Connection(format!(
                    "Failed to connect to {}: {}",
                    addr, e
                ))
            })?
        };

        if options.tcp_nodelay {
            stream.set_nodelay(true).map_err(|e| {
                Error::Connection(format!("Failed to set TCP_NODELAY: {}", e))
            })?;
        }

        if options.tcp_keepalive {
            let keepalive = socket2::TcpKeepalive::new()
                .with_time(options.tcp_keepalive_idle)
                .with_interval(options.tcp_keepalive_interval);
            socket2::SockRef::from(&stream)
                .set_tcp_keepalive(&keepalive)
                .map_err(|e| {
                    Error::Connection(format!(
                        "Failed to set TCP keepalive: {}",
                        e
                    ))
                })?;
        }

        Ok(stream)
    }

    pub async fn read_varint(&mut self) -> Result<u64> {
        WireFormat::read_varint64(&mut self.reader).await
    }

    pub async fn write_varint(&mut self, value: u64) -> Result<()> {
        WireFormat::write_varint64(&mut self.writer, value).await
    }

    pub async fn read_u8(&mut self) -> Result<u8> {
        Ok(self.reader.read_u8().await?)
    }

    pub async fn read_u32(&mut self) -> Result<u32> {
        Ok(self.reader.read_u32_le().await?)
    }

    pub async fn read_u64(&mut self) -> Result<u64> {
        Ok(self.reader.read_u64_le().await?)
    }

    pub async fn read_i32(&mut self) -> Result<i32> {
        Ok(self.reader.read_i32_le().await?)
    }

    pub async fn read_i64(&mut self) -> Result<i64> {
        Ok(self.reader.read_i64_le().await?)
    }

    pub async fn write_u8(&mut self, value: u8) -> Result<()> {
        Ok(self.writer.write_u8(value).await?)
    }

    pub async fn write_i32(&mut self, value: i32) -> Result<()> {
        Ok(self.writer.write_i32_le(value).await?)
    }

    pub async fn write_u64(&mut self, value: u64) -> Result<()> {
        Ok(self.writer.write_u64_le(value).await?)
    }

    pub async fn write_u128(&mut self, value: u128) -> Result<()> {
        Ok(self.writer.write_u128_le(value).await?)
    }

    pub async fn write_i64(&mut self, value: i64) -> Result<()> {
        Ok(self.writer.write_i64_le(value).await?)
    }

    pub async fn read_string(&mut self) -> Result<String> {
        WireFormat::read_string(&mut self.reader).await
    }

    pub async fn write_string(&mut self, s: &str) -> Result<()> {
        WireFormat::write_string(&mut self.writer, s).await
    }

    pub async fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader.read_exact(buf).await?;
        Ok(())
    }

    pub async fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        Ok(self.writer.write_all(data).await?)
    }

    pub async fn flush(&mut self) -> Result<()> {
        Ok(self.writer.flush().await?)
    }
}
