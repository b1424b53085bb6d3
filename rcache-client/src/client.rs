//! # Synchronous Store Client
//!
//! Purpose: Expose a compact, blocking API for the Redis-compatible commands
//! the cache layer needs.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `StoreClient` hides pooling and protocol details.
//! 2. **Borrow-Friendly API**: Accept `&[u8]` to avoid unnecessary copies.
//! 3. **Fail Fast**: Protocol violations surface immediately as errors.
//! 4. **Explicit Outcomes**: Increments report a server rejection as a value,
//!    not an error, so callers branch on it instead of catching it.

use std::time::Duration;

use thiserror::Error;

use crate::config::{ConfigError, ConnectionInfo};
use crate::pipeline::Pipeline;
use crate::pool::{ConnectionPool, PoolLimits};
use crate::resp::RespValue;

/// Result type for the store client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the store client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or IO failure while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// RESP framing or parse error.
    #[error("protocol error")]
    Protocol,
    /// Server returned an error reply.
    #[error("server error: {}", String::from_utf8_lossy(.message))]
    Server { message: Vec<u8> },
    /// Response type did not match the expected command response.
    #[error("unexpected response")]
    UnexpectedResponse,
    /// Pool is at capacity and no idle connections are available.
    #[error("connection pool exhausted")]
    PoolExhausted,
    /// Address could not be resolved into a socket address.
    #[error("invalid address")]
    InvalidAddress,
    /// Connection settings were rejected before connecting.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Outcome of an atomic increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Counter {
    /// The store applied the increment and returned the new value.
    Value(i64),
    /// The store refused, typically because the stored value is not an
    /// integer. Carries the server's message.
    Rejected(Vec<u8>),
}

/// Synchronous client over a connection pool.
///
/// Each call leases a connection, executes one command, and returns the
/// connection to the pool. Clones share the pool.
#[derive(Clone)]
pub struct StoreClient {
    pool: ConnectionPool,
}

impl StoreClient {
    /// Creates a client over an existing (possibly shared) pool.
    pub fn new(pool: ConnectionPool) -> Self {
        StoreClient { pool }
    }

    /// Creates a client with its own private pool.
    pub fn open(info: ConnectionInfo, limits: PoolLimits) -> Self {
        StoreClient::new(ConnectionPool::new(info, limits))
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Starts a pipeline bound to this client's pool.
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.pool.clone())
    }

    fn exec(&self, args: &[&[u8]]) -> ClientResult<RespValue> {
        let mut conn = self.pool.acquire()?;
        conn.exec(args)
    }

    /// Fetches a value by key.
    ///
    /// Returns `Ok(None)` when the key is missing.
    pub fn get(&self, key: &[u8]) -> ClientResult<Option<Vec<u8>>> {
        expect_bulk(self.exec(&[b"GET", key])?)
    }

    /// Sets a value for a key without expiration.
    pub fn set(&self, key: &[u8], value: &[u8]) -> ClientResult<()> {
        expect_ok(self.exec(&[b"SET", key, value])?)
    }

    /// Sets a value and attaches an expiration in whole seconds.
    pub fn setex(&self, key: &[u8], ttl: Duration, value: &[u8]) -> ClientResult<()> {
        let (seconds, len) = encode_u64(ttl.as_secs());
        expect_ok(self.exec(&[b"SETEX", key, &seconds[..len], value])?)
    }

    /// Returns true when the key exists.
    pub fn exists(&self, key: &[u8]) -> ClientResult<bool> {
        Ok(expect_integer(self.exec(&[b"EXISTS", key])?)? > 0)
    }

    /// Deletes keys. Returns how many were removed.
    pub fn del(&self, keys: &[&[u8]]) -> ClientResult<u64> {
        let mut args: Vec<&[u8]> = Vec::with_capacity(keys.len() + 1);
        args.push(b"DEL");
        args.extend_from_slice(keys);
        Ok(expect_integer(self.exec(&args)?)?.max(0) as u64)
    }

    /// Fetches several keys in one call, positionally.
    pub fn mget(&self, keys: &[&[u8]]) -> ClientResult<Vec<Option<Vec<u8>>>> {
        let mut args: Vec<&[u8]> = Vec::with_capacity(keys.len() + 1);
        args.push(b"MGET");
        args.extend_from_slice(keys);
        expect_bulk_list(self.exec(&args)?)
    }

    /// Sets a hash field. Returns true when the field was created.
    pub fn hset(&self, name: &[u8], field: &[u8], value: &[u8]) -> ClientResult<bool> {
        Ok(expect_integer(self.exec(&[b"HSET", name, field, value])?)? > 0)
    }

    /// Fetches a hash field.
    pub fn hget(&self, name: &[u8], field: &[u8]) -> ClientResult<Option<Vec<u8>>> {
        expect_bulk(self.exec(&[b"HGET", name, field])?)
    }

    /// Fetches every field of a hash, in server order.
    pub fn hgetall(&self, name: &[u8]) -> ClientResult<Vec<(Vec<u8>, Vec<u8>)>> {
        match self.exec(&[b"HGETALL", name])? {
            RespValue::Array(items) => {
                if items.len() % 2 != 0 {
                    return Err(ClientError::UnexpectedResponse);
                }
                let mut iter = items.into_iter();
                let mut pairs = Vec::with_capacity(iter.len() / 2);
                while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
                    pairs.push((expect_bytes(field)?, expect_bytes(value)?));
                }
                Ok(pairs)
            }
            RespValue::Map(entries) => entries
                .into_iter()
                .map(|(field, value)| Ok((expect_bytes(field)?, expect_bytes(value)?)))
                .collect(),
            RespValue::Error(message) => Err(ClientError::Server { message }),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Fetches several hash fields in one call, positionally.
    pub fn hmget(&self, name: &[u8], fields: &[&[u8]]) -> ClientResult<Vec<Option<Vec<u8>>>> {
        let mut args: Vec<&[u8]> = Vec::with_capacity(fields.len() + 2);
        args.push(b"HMGET");
        args.push(name);
        args.extend_from_slice(fields);
        expect_bulk_list(self.exec(&args)?)
    }

    /// Sets several hash fields in one call.
    pub fn hmset(&self, name: &[u8], pairs: &[(&[u8], &[u8])]) -> ClientResult<()> {
        let mut args: Vec<&[u8]> = Vec::with_capacity(pairs.len() * 2 + 2);
        args.push(b"HMSET");
        args.push(name);
        for (field, value) in pairs {
            args.push(*field);
            args.push(*value);
        }
        expect_ok(self.exec(&args)?)
    }

    /// Returns true when the hash has the field.
    pub fn hexists(&self, name: &[u8], field: &[u8]) -> ClientResult<bool> {
        Ok(expect_integer(self.exec(&[b"HEXISTS", name, field])?)? > 0)
    }

    /// Atomically increments a key by one.
    pub fn incr(&self, key: &[u8]) -> ClientResult<Counter> {
        expect_counter(self.exec(&[b"INCR", key])?)
    }

    /// Atomically increments a key by `delta`.
    pub fn incr_by(&self, key: &[u8], delta: i64) -> ClientResult<Counter> {
        let delta = delta.to_string();
        expect_counter(self.exec(&[b"INCRBY", key, delta.as_bytes()])?)
    }

    /// Atomically increments a hash field by `delta`.
    pub fn hincr_by(&self, name: &[u8], field: &[u8], delta: i64) -> ClientResult<Counter> {
        let delta = delta.to_string();
        expect_counter(self.exec(&[b"HINCRBY", name, field, delta.as_bytes()])?)
    }

    /// Adds members to a set. Returns how many were new.
    pub fn sadd(&self, name: &[u8], members: &[&[u8]]) -> ClientResult<u64> {
        let mut args: Vec<&[u8]> = Vec::with_capacity(members.len() + 2);
        args.push(b"SADD");
        args.push(name);
        args.extend_from_slice(members);
        Ok(expect_integer(self.exec(&args)?)?.max(0) as u64)
    }

    /// Sets a time-to-live on a key. Returns true when the TTL was set.
    pub fn expire(&self, key: &[u8], ttl: Duration) -> ClientResult<bool> {
        let (seconds, len) = encode_u64(ttl.as_secs());
        Ok(expect_integer(self.exec(&[b"EXPIRE", key, &seconds[..len]])?)? == 1)
    }

    /// Removes every key in the selected database.
    pub fn flushdb(&self) -> ClientResult<()> {
        expect_ok(self.exec(&[b"FLUSHDB"])?)
    }

    /// Pings the server. Returns the raw response payload.
    pub fn ping(&self, payload: Option<&[u8]>) -> ClientResult<Vec<u8>> {
        let response = match payload {
            Some(data) => self.exec(&[b"PING", data])?,
            None => self.exec(&[b"PING"])?,
        };
        match response {
            RespValue::Simple(text) => Ok(text),
            RespValue::Bulk(Some(data)) => Ok(data),
            RespValue::Error(message) => Err(ClientError::Server { message }),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }
}

/// Fails on anything but a simple-string reply.
pub fn expect_ok(response: RespValue) -> ClientResult<()> {
    match response {
        RespValue::Simple(_) => Ok(()),
        RespValue::Error(message) => Err(ClientError::Server { message }),
        _ => Err(ClientError::UnexpectedResponse),
    }
}

fn expect_integer(response: RespValue) -> ClientResult<i64> {
    match response {
        RespValue::Integer(value) => Ok(value),
        RespValue::Boolean(value) => Ok(value as i64),
        RespValue::Error(message) => Err(ClientError::Server { message }),
        _ => Err(ClientError::UnexpectedResponse),
    }
}

fn expect_bulk(response: RespValue) -> ClientResult<Option<Vec<u8>>> {
    match response {
        RespValue::Bulk(data) => Ok(data),
        RespValue::Null => Ok(None),
        RespValue::Error(message) => Err(ClientError::Server { message }),
        _ => Err(ClientError::UnexpectedResponse),
    }
}

fn expect_bulk_list(response: RespValue) -> ClientResult<Vec<Option<Vec<u8>>>> {
    match response {
        RespValue::Array(items) => items.into_iter().map(expect_bulk).collect(),
        RespValue::Error(message) => Err(ClientError::Server { message }),
        _ => Err(ClientError::UnexpectedResponse),
    }
}

fn expect_bytes(response: RespValue) -> ClientResult<Vec<u8>> {
    match response {
        RespValue::Bulk(Some(data)) | RespValue::Simple(data) => Ok(data),
        RespValue::Integer(value) => Ok(value.to_string().into_bytes()),
        _ => Err(ClientError::UnexpectedResponse),
    }
}

fn expect_counter(response: RespValue) -> ClientResult<Counter> {
    match response {
        RespValue::Integer(value) => Ok(Counter::Value(value)),
        RespValue::Error(message) => Ok(Counter::Rejected(message)),
        _ => Err(ClientError::UnexpectedResponse),
    }
}

pub(crate) fn encode_u64(mut value: u64) -> ([u8; 20], usize) {
    // Stack buffer keeps conversion allocation-free (zero-cost abstraction).
    let mut buf = [0u8; 20];
    let mut len = 0;
    if value == 0 {
        buf[0] = b'0';
        return (buf, 1);
    }
    while value > 0 {
        buf[len] = b'0' + (value % 10) as u8;
        value /= 10;
        len += 1;
    }
    buf[..len].reverse();
    (buf, len)
}
