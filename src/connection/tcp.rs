//! One async connection to a Redis node.
//!
//! Wraps a TCP, Unix socket or TLS stream with an integrated read buffer and
//! the streaming RESP parser. Every read is bounded by the configured read
//! timeout.

use crate::config::{Address, ConnectionConfig};
use crate::error::{DatasourceError, Result};
use crate::resp::parser::parse;
use crate::resp::types::RespValue;
use crate::resp::writer::{encode_command, encode_pipeline};

use bytes::BytesMut;
use std::io;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

/// Initial read buffer capacity (64 KB).
const DEFAULT_BUF_CAPACITY: usize = 64 * 1024;

enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
    #[cfg(feature = "tls")]
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl Stream {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.write_all(data).await,
            #[cfg(unix)]
            Self::Unix(s) => s.write_all(data).await,
            #[cfg(feature = "tls")]
            Self::Tls(s) => {
                s.write_all(data).await?;
                s.flush().await
            }
        }
    }

    async fn read_buf(&mut self, buf: &mut BytesMut) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.read_buf(buf).await,
            #[cfg(unix)]
            Self::Unix(s) => s.read_buf(buf).await,
            #[cfg(feature = "tls")]
            Self::Tls(s) => s.read_buf(buf).await,
        }
    }
}

/// A single async connection to a Redis server.
pub struct RedisConnection {
    stream: Stream,
    /// Data read from the socket but not yet consumed by the parser.
    buf: BytesMut,
    max_buf_size: usize,
    read_timeout: Duration,
    /// Timestamp of last successful I/O.
    pub last_used: Instant,
}

impl RedisConnection {
    /// Dial `config.address`, negotiate TLS if configured and authenticate.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let timeout = config.connect_timeout;
        let dial = Self::dial(config);
        let mut conn = match tokio::time::timeout(timeout, dial).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(DatasourceError::Timeout(format!(
                    "connection to {} timed out after {timeout:?}",
                    config.address
                )))
            }
        };
        conn.init(config.username.as_deref(), config.password.as_deref())
            .await?;
        Ok(conn)
    }

    async fn dial(config: &ConnectionConfig) -> Result<Self> {
        let stream = match &config.address {
            Address::Tcp { host, port } => {
                let tcp = TcpStream::connect((host.as_str(), *port)).await?;
                if config.nodelay {
                    tcp.set_nodelay(true).ok();
                }
                match &config.tls {
                    Some(settings) => tls_stream(tcp, host, settings).await?,
                    None => Stream::Tcp(tcp),
                }
            }
            #[cfg(unix)]
            Address::Unix(path) => Stream::Unix(UnixStream::connect(path).await?),
            #[cfg(not(unix))]
            Address::Unix(path) => {
                return Err(DatasourceError::Config(format!(
                    "unix sockets are not supported on this platform: {}",
                    path.display()
                )))
            }
        };
        Ok(Self {
            stream,
            buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            max_buf_size: config.max_buffer_size,
            read_timeout: config.read_timeout,
            last_used: Instant::now(),
        })
    }

    /// Send raw bytes to the server.
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        self.last_used = Instant::now();
        Ok(())
    }

    /// Read and parse one complete RESP value.
    ///
    /// The buffer is frozen to `Bytes` before parsing so bulk strings are
    /// sliced out without copying.
    pub async fn read_response(&mut self) -> Result<RespValue> {
        loop {
            if !self.buf.is_empty() {
                let snapshot = self.buf.split().freeze();
                match parse(&snapshot) {
                    Ok((value, consumed)) => {
                        if consumed < snapshot.len() {
                            self.buf.extend_from_slice(&snapshot[consumed..]);
                        }
                        self.last_used = Instant::now();
                        return Ok(value);
                    }
                    Err(DatasourceError::Incomplete) => {
                        self.buf.extend_from_slice(&snapshot);
                    }
                    Err(e) => return Err(e),
                }
            }

            self.reserve()?;
            let read = self.stream.read_buf(&mut self.buf);
            let n = match tokio::time::timeout(self.read_timeout, read).await {
                Ok(n) => n?,
                Err(_) => {
                    return Err(DatasourceError::Timeout(format!(
                        "no reply within {:?}",
                        self.read_timeout
                    )))
                }
            };
            if n == 0 {
                return Err(DatasourceError::Connection(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by server",
                )));
            }
        }
    }

    fn reserve(&mut self) -> Result<()> {
        if self.buf.capacity() - self.buf.len() >= 4096 {
            return Ok(());
        }
        let new_cap = (self.buf.capacity() * 2).max(DEFAULT_BUF_CAPACITY);
        if new_cap > self.max_buf_size {
            if self.buf.capacity() >= self.max_buf_size {
                return Err(DatasourceError::Protocol(format!(
                    "reply too large: buffer would exceed {} bytes",
                    self.max_buf_size
                )));
            }
            self.buf.reserve(self.max_buf_size - self.buf.len());
        } else {
            self.buf.reserve(new_cap - self.buf.len());
        }
        Ok(())
    }

    /// Send a command and read its reply. Error replies come back as
    /// `RespValue::Error`; the caller decides what they mean.
    pub async fn execute<A: AsRef<[u8]>>(&mut self, args: &[A]) -> Result<RespValue> {
        self.send_raw(&encode_command(args)).await?;
        self.read_response().await
    }

    /// Write all commands in one go, then read one reply per command.
    pub async fn pipeline<A: AsRef<[u8]>>(&mut self, commands: &[Vec<A>]) -> Result<Vec<RespValue>> {
        self.send_raw(&encode_pipeline(commands)).await?;
        let mut replies = Vec::with_capacity(commands.len());
        for _ in commands {
            replies.push(self.read_response().await?);
        }
        Ok(replies)
    }

    /// `AUTH user pass` when a user is given, `AUTH pass` otherwise.
    pub async fn auth(&mut self, username: Option<&str>, password: &str) -> Result<()> {
        let response = match username {
            Some(user) => self.execute(&["AUTH", user, password]).await?,
            None => self.execute(&["AUTH", password]).await?,
        };
        match response {
            RespValue::SimpleString(ref s) if s == "OK" => Ok(()),
            RespValue::Error(msg) => Err(DatasourceError::redis(msg)),
            other => Err(DatasourceError::Protocol(format!(
                "unexpected AUTH response: {}",
                other.type_name()
            ))),
        }
    }

    /// Send PING; any non-error reply counts as alive.
    pub async fn ping(&mut self) -> Result<()> {
        match self.execute(&["PING"]).await? {
            RespValue::Error(msg) => Err(DatasourceError::redis(msg)),
            _ => Ok(()),
        }
    }

    async fn init(&mut self, username: Option<&str>, password: Option<&str>) -> Result<()> {
        if let Some(pass) = password {
            self.auth(username, pass).await?;
        }
        Ok(())
    }
}

#[cfg(feature = "tls")]
async fn tls_stream(
    tcp: TcpStream,
    host: &str,
    settings: &crate::config::TlsSettings,
) -> Result<Stream> {
    let stream = crate::connection::tls::connect(tcp, host, settings).await?;
    Ok(Stream::Tls(Box::new(stream)))
}

#[cfg(not(feature = "tls"))]
async fn tls_stream(
    _tcp: TcpStream,
    _host: &str,
    _settings: &crate::config::TlsSettings,
) -> Result<Stream> {
    Err(DatasourceError::Tls(
        "TLS was requested but this build has no TLS support (enable the `tls` feature)".into(),
    ))
}

// ── Tests ──────────────────────────────────────────────────────────
