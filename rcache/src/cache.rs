//! # Scalar Cache
//!
//! Purpose: Typed get/set/add/delete/incr over single keys, plus the bulk
//! variants that collapse many keys into one round trip.
//!
//! ## Design Principles
//! 1. **Codec at the Edge**: Values go through the value codec right before a
//!    write and right after a read; the store only ever sees bytes.
//! 2. **Round-Trip Economy**: `get_many` is one `MGET`, `set_many` is one
//!    pipeline.
//! 3. **Explicit Increment Outcomes**: A rejected `INCRBY` is a branch, not a
//!    caught error.
//!
//! ## Caller-Visible Races
//! `add` checks existence and then writes, so two concurrent adds of the same
//! key can both succeed. The increment fallback reads, adds one and writes
//! back, so concurrent fallbacks on the same key can lose updates. Neither is
//! guarded by a lock.

use std::hash::Hash;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Number;
use tracing::{debug, info, warn};

use rcache_client::{expect_ok, Counter, Pipeline, PoolRegistry, StoreClient};
use rcache_common::{
    decode, encode, encode_text, Encoded, Expiration, KeyCodec, RawValue, ToWireKey, WireKey,
};

use crate::error::{CacheError, CacheResult};
use crate::settings::CacheSettings;

/// Cache handle over one store database.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct Cache {
    pub(crate) client: StoreClient,
    pub(crate) keys: KeyCodec,
    pub(crate) default_timeout: i64,
}

impl Cache {
    /// Creates a cache over an existing client.
    pub fn new(client: StoreClient, keys: KeyCodec, default_timeout: i64) -> Self {
        Cache {
            client,
            keys,
            default_timeout,
        }
    }

    /// Resolves `settings` and attaches to the registry's pool for them.
    ///
    /// No connection is opened until the first command.
    pub fn open(registry: &PoolRegistry, settings: &CacheSettings) -> CacheResult<Self> {
        let info = settings.connection_info()?;
        let pool = registry.get_pool(&info);
        debug!(endpoint = %info.endpoint, db = info.db, prefix = %settings.key_prefix, "cache opened");
        Ok(Cache::new(
            StoreClient::new(pool),
            KeyCodec::new(settings.key_prefix.clone(), settings.version),
            settings.timeout,
        ))
    }

    /// Returns the wire key for `key` under `version`.
    pub fn make_key<K: ToWireKey + ?Sized>(&self, key: &K, version: Option<u32>) -> WireKey {
        self.keys.make_key(key, version)
    }

    pub fn client(&self) -> &StoreClient {
        &self.client
    }

    pub fn key_codec(&self) -> &KeyCodec {
        &self.keys
    }

    /// Default ttl in seconds applied when a scalar write passes `None`.
    pub fn default_timeout(&self) -> i64 {
        self.default_timeout
    }

    /// Fetches and decodes a value. Missing keys yield `None`.
    pub fn get<K, T>(&self, key: &K, version: Option<u32>) -> CacheResult<Option<T>>
    where
        K: ToWireKey + ?Sized,
        T: DeserializeOwned,
    {
        let key = self.make_key(key, version);
        match self.client.get(key.as_bytes())? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Like [`Cache::get`], returning `default` for a missing key.
    pub fn get_or<K, T>(&self, key: &K, default: T, version: Option<u32>) -> CacheResult<T>
    where
        K: ToWireKey + ?Sized,
        T: DeserializeOwned,
    {
        Ok(self.get(key, version)?.unwrap_or(default))
    }

    /// Stores a value.
    ///
    /// `ttl`: `None` uses the default timeout, `Some(0)` stores without
    /// expiration, a negative ttl writes nothing and returns `false`.
    pub fn set<K, V>(&self, key: &K, value: &V, ttl: Option<i64>, version: Option<u32>) -> CacheResult<bool>
    where
        K: ToWireKey + ?Sized,
        V: Serialize + ?Sized,
    {
        let key = self.make_key(key, version);
        let expiration = Expiration::resolve(ttl, self.default_timeout);
        self.write(&key, encode(value)?, expiration)
    }

    /// Stores text verbatim, bypassing the value codec.
    pub fn set_str<K, S>(&self, key: &K, text: S, ttl: Option<i64>, version: Option<u32>) -> CacheResult<bool>
    where
        K: ToWireKey + ?Sized,
        S: AsRef<[u8]>,
    {
        let key = self.make_key(key, version);
        let expiration = Expiration::resolve(ttl, self.default_timeout);
        self.write(&key, encode_text(text), expiration)
    }

    /// Stores a value only when the key is absent.
    ///
    /// Returns `false` when the key already exists. The check and the write
    /// are two commands; see the module docs.
    pub fn add<K, V>(&self, key: &K, value: &V, ttl: Option<i64>, version: Option<u32>) -> CacheResult<bool>
    where
        K: ToWireKey + ?Sized,
        V: Serialize + ?Sized,
    {
        let key = self.make_key(key, version);
        if self.client.exists(key.as_bytes())? {
            return Ok(false);
        }
        self.set(&key, value, ttl, version)
    }

    /// Removes a key. Returns whether it existed.
    pub fn delete<K: ToWireKey + ?Sized>(&self, key: &K, version: Option<u32>) -> CacheResult<bool> {
        let key = self.make_key(key, version);
        Ok(self.client.del(&[key.as_bytes()])? > 0)
    }

    /// Removes several keys in one command. Returns how many existed.
    pub fn delete_many<K: ToWireKey>(&self, keys: &[K], version: Option<u32>) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let keys: Vec<WireKey> = keys.iter().map(|key| self.make_key(key, version)).collect();
        let args: Vec<&[u8]> = keys.iter().map(WireKey::as_bytes).collect();
        Ok(self.client.del(&args)?)
    }

    /// Flushes the whole selected database.
    ///
    /// Every key goes, including keys written by other caches or other
    /// versions sharing the database.
    pub fn clear(&self) -> CacheResult<()> {
        info!(endpoint = %self.client.pool().info().endpoint, db = self.client.pool().info().db, "flushing cache database");
        self.client.flushdb()?;
        Ok(())
    }

    /// Fetches several keys in one `MGET`.
    ///
    /// The result follows input order and omits missing keys.
    pub fn get_many<K, T>(&self, keys: &[K], version: Option<u32>) -> CacheResult<IndexMap<K, T>>
    where
        K: ToWireKey + Clone + Eq + Hash,
        T: DeserializeOwned,
    {
        let mut found = IndexMap::with_capacity(keys.len());
        for (key, raw) in self.fetch_many(keys, version)? {
            if let Some(raw) = raw {
                found.insert(key.clone(), decode(&raw)?);
            }
        }
        Ok(found)
    }

    /// All-or-nothing variant of [`Cache::get_many`] that skips decoding.
    ///
    /// Returns `None` as soon as one key is missing.
    pub fn get_many_mandatory<K>(&self, keys: &[K], version: Option<u32>) -> CacheResult<Option<IndexMap<K, RawValue>>>
    where
        K: ToWireKey + Clone + Eq + Hash,
    {
        let mut found = IndexMap::with_capacity(keys.len());
        for (key, raw) in self.fetch_many(keys, version)? {
            match raw {
                Some(raw) => {
                    found.insert(key.clone(), RawValue::new(raw));
                }
                None => return Ok(None),
            }
        }
        Ok(Some(found))
    }

    /// Stores several values in one pipelined round trip.
    ///
    /// Each entry gets the same treatment as [`Cache::set`]; entries with a
    /// negative ttl are skipped. Fails if the store rejects any write.
    pub fn set_many<I, K, V>(&self, entries: I, ttl: Option<i64>, version: Option<u32>) -> CacheResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: ToWireKey,
        V: Serialize,
    {
        let expiration = Expiration::resolve(ttl, self.default_timeout);
        let mut pipeline = self.client.pipeline();
        for (key, value) in entries {
            let key = self.make_key(&key, version);
            queue_write(&mut pipeline, &key, encode(&value)?, expiration);
        }
        execute_writes(pipeline)
    }

    /// Text variant of [`Cache::set_many`]; values bypass the codec.
    pub fn set_many_str<I, K, S>(&self, entries: I, ttl: Option<i64>, version: Option<u32>) -> CacheResult<()>
    where
        I: IntoIterator<Item = (K, S)>,
        K: ToWireKey,
        S: AsRef<[u8]>,
    {
        let expiration = Expiration::resolve(ttl, self.default_timeout);
        let mut pipeline = self.client.pipeline();
        for (key, text) in entries {
            let key = self.make_key(&key, version);
            queue_write(&mut pipeline, &key, encode_text(text), expiration);
        }
        execute_writes(pipeline)
    }

    /// Adds `delta` to the number stored at `key`.
    ///
    /// The key must exist. Integers are incremented atomically by the store.
    /// When the store refuses (the value is a blob such as `2.5`), the value is
    /// read, increased by exactly one regardless of `delta`, and written back
    /// with the default timeout. That fallback is not atomic.
    pub fn incr<K: ToWireKey + ?Sized>(&self, key: &K, delta: i64, version: Option<u32>) -> CacheResult<Number> {
        let key = self.make_key(key, version);
        if !self.client.exists(key.as_bytes())? {
            return Err(CacheError::KeyNotFound { key });
        }
        let counter = if delta == 1 {
            self.client.incr(key.as_bytes())?
        } else {
            self.client.incr_by(key.as_bytes(), delta)?
        };
        match counter {
            Counter::Value(value) => Ok(Number::from(value)),
            Counter::Rejected(message) => {
                warn!(key = %key, reason = %String::from_utf8_lossy(&message), "atomic increment rejected, falling back");
                let current = self.client.get(key.as_bytes())?;
                let next = add_one(&key, current)?;
                self.set(&key, &next, None, None)?;
                Ok(next)
            }
        }
    }

    pub(crate) fn write(&self, key: &WireKey, value: Encoded, expiration: Expiration) -> CacheResult<bool> {
        match expiration {
            Expiration::Rejected => {
                debug!(key = %key, "negative ttl, write skipped");
                Ok(false)
            }
            Expiration::Persistent => {
                self.client.set(key.as_bytes(), &value.into_bytes())?;
                Ok(true)
            }
            Expiration::Timed(ttl) => {
                self.client.setex(key.as_bytes(), ttl, &value.into_bytes())?;
                Ok(true)
            }
        }
    }

    fn fetch_many<'k, K>(&self, keys: &'k [K], version: Option<u32>) -> CacheResult<Vec<(&'k K, Option<Vec<u8>>)>>
    where
        K: ToWireKey,
    {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let wire: Vec<WireKey> = keys.iter().map(|key| self.make_key(key, version)).collect();
        let args: Vec<&[u8]> = wire.iter().map(WireKey::as_bytes).collect();
        let values = self.client.mget(&args)?;
        Ok(keys.iter().zip(values).collect())
    }
}

fn queue_write(pipeline: &mut Pipeline, key: &WireKey, value: Encoded, expiration: Expiration) {
    match expiration {
        Expiration::Rejected => {
            debug!(key = %key, "negative ttl, write skipped");
        }
        Expiration::Persistent => {
            pipeline.set(key.as_bytes(), &value.into_bytes());
        }
        Expiration::Timed(ttl) => {
            pipeline.setex(key.as_bytes(), ttl, &value.into_bytes());
        }
    }
}

fn execute_writes(pipeline: Pipeline) -> CacheResult<()> {
    for reply in pipeline.execute()? {
        expect_ok(reply)?;
    }
    Ok(())
}

/// Increment fallback: decode the stored number and add one.
pub(crate) fn add_one(key: &WireKey, current: Option<Vec<u8>>) -> CacheResult<Number> {
    let raw = current.ok_or_else(|| CacheError::KeyNotFound { key: key.clone() })?;
    let number: Number = decode(&raw).map_err(|_| CacheError::NotNumeric { key: key.clone() })?;
    if let Some(next) = number.as_i64().and_then(|value| value.checked_add(1)) {
        return Ok(Number::from(next));
    }
    number
        .as_f64()
        .and_then(|value| Number::from_f64(value + 1.0))
        .ok_or_else(|| CacheError::NotNumeric { key: key.clone() })
}
