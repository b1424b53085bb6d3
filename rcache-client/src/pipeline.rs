//! # Pipeline
//!
//! Purpose: Queue commands locally and send them to the store in a single
//! round trip.
//!
//! ## Design Principles
//! 1. **Builder Pattern**: Queue methods return `&mut Self` for chaining.
//! 2. **One Lease**: `execute` holds one pooled connection for the whole batch.
//! 3. **Positional Replies**: Reply `i` belongs to queued command `i`.
//! 4. **Single Use**: `execute` consumes the pipeline.

use std::time::Duration;

use bytes::BytesMut;

use crate::client::{encode_u64, ClientResult};
use crate::pool::ConnectionPool;
use crate::resp::{encode_command, RespValue};

/// Accumulates commands until `execute`.
pub struct Pipeline {
    pool: ConnectionPool,
    buf: BytesMut,
    queued: usize,
}

impl Pipeline {
    pub(crate) fn new(pool: ConnectionPool) -> Self {
        Pipeline {
            pool,
            buf: BytesMut::with_capacity(512),
            queued: 0,
        }
    }

    /// Queues an arbitrary command.
    pub fn cmd(&mut self, args: &[&[u8]]) -> &mut Self {
        encode_command(args, &mut self.buf);
        self.queued += 1;
        self
    }

    /// Queues `SET key value`.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> &mut Self {
        self.cmd(&[b"SET", key, value])
    }

    /// Queues `SETEX key seconds value`.
    pub fn setex(&mut self, key: &[u8], ttl: Duration, value: &[u8]) -> &mut Self {
        let (seconds, len) = encode_u64(ttl.as_secs());
        self.cmd(&[b"SETEX", key, &seconds[..len], value])
    }

    /// Queues `EXPIRE key seconds`.
    pub fn expire(&mut self, key: &[u8], ttl: Duration) -> &mut Self {
        let (seconds, len) = encode_u64(ttl.as_secs());
        self.cmd(&[b"EXPIRE", key, &seconds[..len]])
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.queued
    }

    pub fn is_empty(&self) -> bool {
        self.queued == 0
    }

    /// Sends every queued command and returns the replies in queue order.
    ///
    /// Server error replies are returned in place as `RespValue::Error`; only
    /// transport and framing failures fail the whole call. An empty pipeline
    /// returns without touching the pool.
    pub fn execute(self) -> ClientResult<Vec<RespValue>> {
        if self.queued == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.pool.acquire()?;
        conn.exec_batch(&self.buf, self.queued)
    }
}
