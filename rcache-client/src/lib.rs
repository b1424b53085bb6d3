//! # rcache Store Client
//!
//! Purpose: Provide a lightweight, synchronous Redis-compatible client with
//! connection pooling, pipelining and a registry that shares pools between
//! callers targeting the same server.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse connections to avoid repeated connects.
//! 2. **Registry Pattern**: One pool per (endpoint, db, parser) identity.
//! 3. **Minimal Allocation**: Reuse buffers for RESP framing and parsing.
//! 4. **Protocol Clarity**: Encode/parse RESP2 and RESP3 explicitly.

mod client;
mod config;
mod pipeline;
mod pool;
mod registry;
mod resp;

pub use client::{expect_ok, ClientError, ClientResult, Counter, StoreClient};
pub use config::{ConfigError, ConnectionIdentity, ConnectionInfo, Endpoint, ParserKind, DEFAULT_PORT};
pub use pipeline::Pipeline;
pub use pool::{ConnectionPool, PoolLimits, PooledConnection};
pub use registry::PoolRegistry;
pub use resp::RespValue;
