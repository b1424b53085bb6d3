//! # Connection Configuration
//!
//! Purpose: Describe where a store lives and how to talk to it, and derive the
//! identity used to share pools between clients.
//!
//! ## Design Principles
//! 1. **Value Objects**: Endpoints and identities are plain hashable values.
//! 2. **Fail Fast**: Malformed ports, databases and parser names are rejected
//!    before any connection is attempted.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

/// Default TCP port for Redis-compatible stores.
pub const DEFAULT_PORT: u16 = 6379;

/// Configuration errors raised while building a client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("port value must be an integer, got {0:?}")]
    InvalidPort(String),
    #[error("db value must be a non-negative integer, got {0:?}")]
    InvalidDatabase(String),
    #[error("could not find parser {0:?}")]
    UnknownParser(String),
}

/// Wire dialect spoken on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParserKind {
    /// RESP2, the dialect every Redis-compatible server speaks.
    #[default]
    Resp2,
    /// RESP3, negotiated with `HELLO 3` after connecting.
    Resp3,
}

impl FromStr for ParserKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" | "resp2" => Ok(ParserKind::Resp2),
            "resp3" => Ok(ParserKind::Resp3),
            _ => Err(ConfigError::UnknownParser(s.to_string())),
        }
    }
}

/// Transport endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Unix { path: PathBuf },
}

impl Endpoint {
    /// Parses a server location: `host:port`, or a socket path when there is
    /// no colon.
    ///
    /// The port is taken after the last colon, so bracketed IPv6 literals such
    /// as `[::1]:6379` work; the brackets are stripped from the host.
    pub fn parse(location: &str) -> Result<Self, ConfigError> {
        match location.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| ConfigError::InvalidPort(port.to_string()))?;
                let host = host.trim_start_matches('[').trim_end_matches(']');
                Ok(Endpoint::Tcp {
                    host: host.to_string(),
                    port,
                })
            }
            None => Ok(Endpoint::Unix {
                path: PathBuf::from(location),
            }),
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Tcp {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Endpoint::Unix { path } => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Everything needed to open an authenticated connection.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub endpoint: Endpoint,
    /// Database index selected after connecting.
    pub db: u32,
    pub password: Option<String>,
    pub parser: ParserKind,
}

impl ConnectionInfo {
    pub fn new(endpoint: Endpoint) -> Self {
        ConnectionInfo {
            endpoint,
            db: 0,
            password: None,
            parser: ParserKind::Resp2,
        }
    }

    /// Returns the pool-sharing identity. The password is not part of it.
    pub fn identity(&self) -> ConnectionIdentity {
        ConnectionIdentity {
            endpoint: self.endpoint.clone(),
            db: self.db,
            parser: self.parser,
        }
    }
}

// Keep the password out of logs.
impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("endpoint", &self.endpoint)
            .field("db", &self.db)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("parser", &self.parser)
            .finish()
    }
}

/// Key under which the registry memoizes pools.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionIdentity {
    pub endpoint: Endpoint,
    pub db: u32,
    pub parser: ParserKind,
}
