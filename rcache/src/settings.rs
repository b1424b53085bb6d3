//! Cache settings
//!
//! Settings arrive already loaded (from a settings file, environment, or
//! code) and are resolved into connection parameters here. Top-level fields
//! win over the uppercase `options` block.

use serde::{Deserialize, Serialize};

use rcache_client::{ConfigError, ConnectionInfo, Endpoint, ParserKind};
use rcache_common::{DEFAULT_TIMEOUT_SECS, DEFAULT_VERSION};

/// Default server location.
pub const DEFAULT_LOCATION: &str = "127.0.0.1:6379";

/// Database selected when neither `db` nor `options.DB` is set.
pub const DEFAULT_DB: u32 = 1;

/// Database index as configured; accepts `2` as well as `"2"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DbSetting {
    Index(i64),
    Text(String),
}

impl DbSetting {
    fn resolve(&self) -> Result<u32, ConfigError> {
        let invalid = || match self {
            DbSetting::Index(value) => ConfigError::InvalidDatabase(value.to_string()),
            DbSetting::Text(value) => ConfigError::InvalidDatabase(value.clone()),
        };
        match self {
            DbSetting::Index(value) => u32::try_from(*value).map_err(|_| invalid()),
            DbSetting::Text(value) => value.trim().parse::<u32>().map_err(|_| invalid()),
        }
    }
}

/// Backend options, spelled the way settings files spell them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    #[serde(rename = "DB")]
    pub db: Option<DbSetting>,
    #[serde(rename = "PASSWORD")]
    pub password: Option<String>,
    /// Parser selector: `default`, `resp2` or `resp3`.
    #[serde(rename = "PARSER_CLASS")]
    pub parser_class: Option<String>,
}

/// Settings for one cache instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// `host:port`, or a unix socket path when there is no colon.
    pub location: String,
    pub db: Option<DbSetting>,
    pub password: Option<String>,
    pub parser: Option<String>,
    pub key_prefix: String,
    /// Version applied when callers pass none.
    pub version: u32,
    /// Default ttl in seconds for scalar writes.
    pub timeout: i64,
    #[serde(rename = "OPTIONS", alias = "options")]
    pub options: CacheOptions,
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            location: DEFAULT_LOCATION.to_string(),
            db: None,
            password: None,
            parser: None,
            key_prefix: String::new(),
            version: DEFAULT_VERSION,
            timeout: DEFAULT_TIMEOUT_SECS,
            options: CacheOptions::default(),
        }
    }
}

impl CacheSettings {
    /// Settings pointing at `location` with everything else defaulted.
    pub fn new(location: impl Into<String>) -> Self {
        CacheSettings {
            location: location.into(),
            ..CacheSettings::default()
        }
    }

    /// Parses settings from JSON. Missing fields take their defaults.
    pub fn from_json(input: &str) -> serde_json::Result<Self> {
        serde_json::from_str(input)
    }

    /// Resolves the database index: `db`, then `options.DB`, then 1.
    pub fn database(&self) -> Result<u32, ConfigError> {
        match self.db.as_ref().or(self.options.db.as_ref()) {
            Some(db) => db.resolve(),
            None => Ok(DEFAULT_DB),
        }
    }

    /// Resolves the password: `password`, then `options.PASSWORD`.
    pub fn resolved_password(&self) -> Option<&str> {
        self.password
            .as_deref()
            .or(self.options.password.as_deref())
    }

    /// Resolves the wire dialect: `parser`, then `options.PARSER_CLASS`.
    pub fn parser_kind(&self) -> Result<ParserKind, ConfigError> {
        match self.parser.as_deref().or(self.options.parser_class.as_deref()) {
            Some(selector) => selector.parse(),
            None => Ok(ParserKind::default()),
        }
    }

    /// Validates the settings and returns the connection parameters.
    pub fn connection_info(&self) -> Result<ConnectionInfo, ConfigError> {
        let location = if self.location.is_empty() {
            DEFAULT_LOCATION
        } else {
            self.location.as_str()
        };
        let mut info = ConnectionInfo::new(Endpoint::parse(location)?);
        info.db = self.database()?;
        info.password = self.resolved_password().map(str::to_string);
        info.parser = self.parser_kind()?;
        Ok(info)
    }
}
