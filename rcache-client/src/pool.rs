//! # Connection Pool
//!
//! Purpose: Reuse store connections to reduce handshake latency and
//! allocation churn.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Keep a bounded set of reusable connections.
//! 2. **Minimal Locking**: Hold the mutex only while moving idle connections.
//! 3. **Fail Fast**: Exceeding the pool limit returns an error immediately.
//! 4. **Cache-Friendly Buffers**: Each connection reuses its own buffers.
//! 5. **Exclusive Leases**: A connection serves one caller at a time; pipelined
//!    batches hold their lease until every reply is read.

use std::collections::VecDeque;
use std::io::{self, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::client::{expect_ok, ClientError, ClientResult};
use crate::config::{ConnectionInfo, Endpoint, ParserKind};
use crate::resp::{encode_command, read_response, RespValue};

/// Sizing and timeout limits shared by every pool a registry creates.
#[derive(Debug, Clone)]
pub struct PoolLimits {
    /// Maximum number of idle connections to keep.
    pub max_idle: usize,
    /// Maximum total connections (idle + in-use).
    pub max_total: usize,
    /// Optional read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional write timeout.
    pub write_timeout: Option<Duration>,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
}

impl Default for PoolLimits {
    fn default() -> Self {
        PoolLimits {
            max_idle: 8,
            max_total: 16,
            read_timeout: None,
            write_timeout: None,
            connect_timeout: None,
        }
    }
}

struct PoolState {
    idle: VecDeque<Connection>,
    total: usize,
}

struct PoolInner {
    info: ConnectionInfo,
    limits: PoolLimits,
    state: Mutex<PoolState>,
}

/// Connection pool handle.
///
/// Cloning is cheap and every clone shares the same connections.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Creates a new connection pool. No connection is opened until the first
    /// `acquire`.
    pub fn new(info: ConnectionInfo, limits: PoolLimits) -> Self {
        let state = PoolState {
            idle: VecDeque::with_capacity(limits.max_idle),
            total: 0,
        };
        ConnectionPool {
            inner: Arc::new(PoolInner {
                info,
                limits,
                state: Mutex::new(state),
            }),
        }
    }

    /// Returns the connection settings this pool dials with.
    pub fn info(&self) -> &ConnectionInfo {
        &self.inner.info
    }

    /// Returns true when both handles share the same pool.
    pub fn ptr_eq(&self, other: &ConnectionPool) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of open connections, idle and leased.
    pub fn open_connections(&self) -> usize {
        self.inner.state.lock().total
    }

    /// Acquires a connection from the pool.
    pub fn acquire(&self) -> ClientResult<PooledConnection> {
        if let Some(conn) = self.pop_idle() {
            return Ok(PooledConnection::new(self.inner.clone(), conn));
        }

        if !self.try_reserve() {
            return Err(ClientError::PoolExhausted);
        }

        match Connection::connect(&self.inner.info, &self.inner.limits) {
            Ok(conn) => Ok(PooledConnection::new(self.inner.clone(), conn)),
            Err(err) => {
                self.release_slot();
                Err(err)
            }
        }
    }

    fn pop_idle(&self) -> Option<Connection> {
        self.inner.state.lock().idle.pop_front()
    }

    fn try_reserve(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.total >= self.inner.limits.max_total {
            return false;
        }
        state.total += 1;
        true
    }

    fn release_slot(&self) {
        let mut state = self.inner.state.lock();
        state.total = state.total.saturating_sub(1);
    }

    fn return_connection(&self, conn: Connection) {
        let mut state = self.inner.state.lock();
        if state.idle.len() < self.inner.limits.max_idle {
            state.idle.push_back(conn);
        } else {
            state.total = state.total.saturating_sub(1);
        }
    }
}

/// RAII wrapper returning a connection to the pool on drop.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    conn: Option<Connection>,
    valid: bool,
}

impl PooledConnection {
    fn new(pool: Arc<PoolInner>, conn: Connection) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
            valid: true,
        }
    }

    /// Executes a RESP command and returns the parsed response.
    pub fn exec(&mut self, args: &[&[u8]]) -> ClientResult<RespValue> {
        let conn = self.conn.as_mut().ok_or(ClientError::Protocol)?;
        let response = conn.exec(args);
        if response.is_err() {
            // If IO/protocol fails, do not return this connection to the pool.
            self.valid = false;
        }
        response
    }

    /// Writes an already encoded batch and reads `count` replies in order.
    pub fn exec_batch(&mut self, encoded: &[u8], count: usize) -> ClientResult<Vec<RespValue>> {
        let conn = self.conn.as_mut().ok_or(ClientError::Protocol)?;
        let response = conn.exec_batch(encoded, count);
        if response.is_err() {
            self.valid = false;
        }
        response
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => return,
        };

        let pool = ConnectionPool {
            inner: self.pool.clone(),
        };

        if self.valid {
            pool.return_connection(conn);
        } else {
            warn!(endpoint = %pool.inner.info.endpoint, "discarding broken connection");
            pool.release_slot();
        }
    }
}

/// Byte stream to the store.
enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    fn set_timeouts(&self, limits: &PoolLimits) -> io::Result<()> {
        match self {
            Stream::Tcp(stream) => {
                stream.set_read_timeout(limits.read_timeout)?;
                stream.set_write_timeout(limits.write_timeout)?;
                // Disable Nagle to keep request latency low for small payloads.
                stream.set_nodelay(true)
            }
            #[cfg(unix)]
            Stream::Unix(stream) => {
                stream.set_read_timeout(limits.read_timeout)?;
                stream.set_write_timeout(limits.write_timeout)
            }
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Stream::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Stream::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Stream::Unix(stream) => stream.flush(),
        }
    }
}

/// Single store connection with reusable buffers.
///
/// The buffers are stored on the connection to avoid per-call allocations.
pub struct Connection {
    // Buffered reader reduces syscalls while still allowing direct writes.
    reader: BufReader<Stream>,
    parser: ParserKind,
    line_buf: Vec<u8>,
    write_buf: Vec<u8>,
}

impl Connection {
    fn connect(info: &ConnectionInfo, limits: &PoolLimits) -> ClientResult<Self> {
        let stream = connect_stream(&info.endpoint, limits.connect_timeout)?;
        stream.set_timeouts(limits)?;
        debug!(endpoint = %info.endpoint, db = info.db, parser = ?info.parser, "opened connection");

        let mut conn = Connection {
            reader: BufReader::new(stream),
            parser: info.parser,
            line_buf: Vec::with_capacity(128),
            write_buf: Vec::with_capacity(256),
        };
        conn.handshake(info)?;
        Ok(conn)
    }

    fn handshake(&mut self, info: &ConnectionInfo) -> ClientResult<()> {
        if let Some(password) = &info.password {
            expect_ok(self.exec(&[b"AUTH", password.as_bytes()])?)?;
        }
        if info.parser == ParserKind::Resp3 {
            // HELLO replies with a server info map; only errors matter here.
            if let RespValue::Error(message) = self.exec(&[b"HELLO", b"3"])? {
                return Err(ClientError::Server { message });
            }
        }
        if info.db != 0 {
            let db = info.db.to_string();
            expect_ok(self.exec(&[b"SELECT", db.as_bytes()])?)?;
        }
        Ok(())
    }

    fn exec(&mut self, args: &[&[u8]]) -> ClientResult<RespValue> {
        self.write_buf.clear();
        encode_command(args, &mut self.write_buf);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buf)?;
        stream.flush()?;

        read_response(&mut self.reader, &mut self.line_buf, self.parser)
    }

    fn exec_batch(&mut self, encoded: &[u8], count: usize) -> ClientResult<Vec<RespValue>> {
        let stream = self.reader.get_mut();
        stream.write_all(encoded)?;
        stream.flush()?;

        let mut replies = Vec::with_capacity(count);
        for _ in 0..count {
            replies.push(read_response(&mut self.reader, &mut self.line_buf, self.parser)?);
        }
        Ok(replies)
    }
}

fn connect_stream(endpoint: &Endpoint, timeout: Option<Duration>) -> ClientResult<Stream> {
    match endpoint {
        Endpoint::Tcp { host, port } => {
            let addr = (host.as_str(), *port)
                .to_socket_addrs()
                .map_err(|_| ClientError::InvalidAddress)?
                .next()
                .ok_or(ClientError::InvalidAddress)?;
            let stream = match timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout)?,
                None => TcpStream::connect(addr)?,
            };
            Ok(Stream::Tcp(stream))
        }
        #[cfg(unix)]
        Endpoint::Unix { path } => Ok(Stream::Unix(UnixStream::connect(path)?)),
        #[cfg(not(unix))]
        Endpoint::Unix { .. } => Err(ClientError::InvalidAddress),
    }
}
