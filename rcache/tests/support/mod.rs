//! In-process fake store speaking enough RESP2/RESP3 for the cache tests.
//!
//! Every accepted connection gets its own thread; all connections share one
//! state with per-database keyspaces, a command log and a round-trip counter.
//! Expirations are recorded, never enforced.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::os::unix::net::UnixListener;
use std::sync::Arc;
use std::thread;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tempfile::TempDir;

use rcache::{Cache, CacheSettings, Endpoint, PoolRegistry};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct Db {
    strings: HashMap<Vec<u8>, Vec<u8>>,
    hashes: HashMap<Vec<u8>, IndexMap<Vec<u8>, Vec<u8>>>,
    sets: HashMap<Vec<u8>, HashSet<Vec<u8>>>,
    ttls: HashMap<Vec<u8>, u64>,
}

impl Db {
    fn exists(&self, key: &[u8]) -> bool {
        self.strings.contains_key(key) || self.hashes.contains_key(key) || self.sets.contains_key(key)
    }

    fn remove(&mut self, key: &[u8]) -> bool {
        let removed = self.strings.remove(key).is_some()
            | self.hashes.remove(key).is_some()
            | self.sets.remove(key).is_some();
        self.ttls.remove(key);
        removed
    }
}

#[derive(Default)]
struct State {
    dbs: HashMap<u32, Db>,
    log: Vec<Vec<Vec<u8>>>,
    round_trips: usize,
    password: Option<String>,
}

impl State {
    fn db(&mut self, index: u32) -> &mut Db {
        self.dbs.entry(index).or_default()
    }
}

struct Session {
    db: u32,
    resp3: bool,
    authenticated: bool,
}

/// Handle to a running fake store.
pub struct FakeStore {
    state: Arc<Mutex<State>>,
    endpoint: Endpoint,
    _dir: Option<TempDir>,
}

impl FakeStore {
    /// Starts a store on an ephemeral loopback port.
    pub fn start() -> Self {
        Self::start_tcp(None)
    }

    /// Starts a store that requires `AUTH password`.
    pub fn with_password(password: &str) -> Self {
        Self::start_tcp(Some(password.to_string()))
    }

    fn start_tcp(password: Option<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let state = Arc::new(Mutex::new(State {
            password,
            ..State::default()
        }));

        let shared = state.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let writer = stream.try_clone().expect("clone");
                let state = shared.clone();
                thread::spawn(move || serve(BufReader::new(stream), writer, state));
            }
        });

        FakeStore {
            state,
            endpoint: Endpoint::Tcp {
                host: addr.ip().to_string(),
                port: addr.port(),
            },
            _dir: None,
        }
    }

    /// Starts a store on a unix socket inside a temporary directory.
    pub fn start_unix() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.sock");
        let listener = UnixListener::bind(&path).expect("bind unix");
        let state = Arc::new(Mutex::new(State::default()));

        let shared = state.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let writer = stream.try_clone().expect("clone");
                let state = shared.clone();
                thread::spawn(move || serve(BufReader::new(stream), writer, state));
            }
        });

        FakeStore {
            state,
            endpoint: Endpoint::Unix { path },
            _dir: Some(dir),
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint.clone()
    }

    /// Location string as written in cache settings.
    pub fn location(&self) -> String {
        match &self.endpoint {
            Endpoint::Tcp { host, port } => format!("{}:{}", host, port),
            Endpoint::Unix { path } => path.display().to_string(),
        }
    }

    /// Settings for this store with the given database selected.
    pub fn settings(&self, db: u32) -> CacheSettings {
        let mut settings = CacheSettings::new(self.location());
        settings.db = Some(rcache::DbSetting::Index(db as i64));
        settings
    }

    /// Opens a cache on database `db` through a fresh registry.
    pub fn cache(&self, db: u32) -> Cache {
        Cache::open(&PoolRegistry::default(), &self.settings(db)).expect("open cache")
    }

    pub fn raw_get(&self, db: u32, key: &str) -> Option<Vec<u8>> {
        self.state.lock().db(db).strings.get(key.as_bytes()).cloned()
    }

    /// Writes a string key directly, bypassing any cache namespace.
    pub fn raw_set(&self, db: u32, key: &str, value: &[u8]) {
        self.state
            .lock()
            .db(db)
            .strings
            .insert(key.as_bytes().to_vec(), value.to_vec());
    }

    pub fn exists(&self, db: u32, key: &str) -> bool {
        self.state.lock().db(db).exists(key.as_bytes())
    }

    pub fn ttl(&self, db: u32, key: &str) -> Option<u64> {
        self.state.lock().db(db).ttls.get(key.as_bytes()).copied()
    }

    pub fn hash_field(&self, db: u32, name: &str, field: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .db(db)
            .hashes
            .get(name.as_bytes())
            .and_then(|hash| hash.get(field.as_bytes()).cloned())
    }

    pub fn raw_hset(&self, db: u32, name: &str, field: &str, value: &[u8]) {
        self.state
            .lock()
            .db(db)
            .hashes
            .entry(name.as_bytes().to_vec())
            .or_default()
            .insert(field.as_bytes().to_vec(), value.to_vec());
    }

    /// Members of a set, sorted.
    pub fn members(&self, db: u32, name: &str) -> Vec<Vec<u8>> {
        let mut members: Vec<Vec<u8>> = self
            .state
            .lock()
            .db(db)
            .sets
            .get(name.as_bytes())
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Number of logged commands with the given verb.
    pub fn count(&self, verb: &str) -> usize {
        self.state
            .lock()
            .log
            .iter()
            .filter(|args| args[0].eq_ignore_ascii_case(verb.as_bytes()))
            .count()
    }

    /// Logged verbs, in arrival order.
    pub fn verbs(&self) -> Vec<String> {
        self.state
            .lock()
            .log
            .iter()
            .map(|args| String::from_utf8_lossy(&args[0]).to_ascii_uppercase())
            .collect()
    }

    /// Full argument lists of logged commands with the given verb.
    pub fn calls(&self, verb: &str) -> Vec<Vec<Vec<u8>>> {
        self.state
            .lock()
            .log
            .iter()
            .filter(|args| args[0].eq_ignore_ascii_case(verb.as_bytes()))
            .cloned()
            .collect()
    }

    /// Forgets the command log and the round-trip counter.
    pub fn reset_log(&self) {
        let mut state = self.state.lock();
        state.log.clear();
        state.round_trips = 0;
    }

    /// Number of times the store flushed replies with no request pending.
    pub fn round_trips(&self) -> usize {
        self.state.lock().round_trips
    }
}

fn serve<S: Read, W: Write>(mut reader: BufReader<S>, mut writer: W, state: Arc<Mutex<State>>) {
    let mut session = Session {
        db: 0,
        resp3: false,
        authenticated: false,
    };
    let mut pending = Vec::new();

    loop {
        let args = match read_command(&mut reader) {
            Ok(Some(args)) if !args.is_empty() => args,
            _ => return,
        };
        {
            let mut state = state.lock();
            state.log.push(args.clone());
            let reply = dispatch(&mut session, &mut state, &args);
            pending.extend_from_slice(&reply);
            if reader.buffer().is_empty() {
                state.round_trips += 1;
            }
        }
        if reader.buffer().is_empty() {
            if writer.write_all(&pending).is_err() || writer.flush().is_err() {
                return;
            }
            pending.clear();
        }
    }
}

fn read_command<R: BufRead>(reader: &mut R) -> std::io::Result<Option<Vec<Vec<u8>>>> {
    let mut line = Vec::new();
    if !read_line(reader, &mut line)? {
        return Ok(None);
    }
    if line.first() != Some(&b'*') {
        return Err(invalid("expected array"));
    }
    let count = parse_number(&line[1..])?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        if !read_line(reader, &mut line)? || line.first() != Some(&b'$') {
            return Err(invalid("expected bulk"));
        }
        let len = parse_number(&line[1..])?;
        let mut data = vec![0u8; len + 2];
        reader.read_exact(&mut data)?;
        data.truncate(len);
        args.push(data);
    }
    Ok(Some(args))
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<bool> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(false);
    }
    if !buf.ends_with(b"\r\n") {
        return Err(invalid("invalid line"));
    }
    buf.truncate(buf.len() - 2);
    Ok(true)
}

fn parse_number(data: &[u8]) -> std::io::Result<usize> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| invalid("digit"))
}

fn invalid(message: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message.to_string())
}

fn dispatch(session: &mut Session, state: &mut State, args: &[Vec<u8>]) -> Vec<u8> {
    let verb = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();

    match verb.as_str() {
        "AUTH" => return handle_auth(session, state, args),
        "HELLO" => return handle_hello(session, args),
        "PING" => return resp_simple("PONG"),
        _ => {}
    }
    if state.password.is_some() && !session.authenticated {
        return resp_error("NOAUTH Authentication required.");
    }

    if verb == "SELECT" {
        return match parse_i64(&args[1]) {
            Some(db) if db >= 0 => {
                session.db = db as u32;
                resp_simple("OK")
            }
            _ => resp_error("ERR DB index is out of range"),
        };
    }

    let resp3 = session.resp3;
    let db = state.db(session.db);
    match verb.as_str() {
        "GET" => handle_get(db, &args[1], resp3),
        "SET" => {
            db.strings.insert(args[1].clone(), args[2].clone());
            db.ttls.remove(&args[1]);
            resp_simple("OK")
        }
        "SETEX" => match parse_i64(&args[2]) {
            Some(seconds) if seconds > 0 => {
                db.strings.insert(args[1].clone(), args[3].clone());
                db.ttls.insert(args[1].clone(), seconds as u64);
                resp_simple("OK")
            }
            _ => resp_error("ERR invalid expire time in 'setex' command"),
        },
        "EXISTS" => resp_integer(args[1..].iter().filter(|key| db.exists(key)).count() as i64),
        "DEL" => resp_integer(args[1..].iter().filter(|key| db.remove(key)).count() as i64),
        "MGET" => {
            let values: Vec<Option<Vec<u8>>> = args[1..].iter().map(|key| db.strings.get(key).cloned()).collect();
            resp_array(&values, resp3)
        }
        "INCR" => handle_incr(db, &args[1], b"1"),
        "INCRBY" => handle_incr(db, &args[1], &args[2]),
        "HSET" => {
            let hash = db.hashes.entry(args[1].clone()).or_default();
            let mut created = 0;
            for pair in args[2..].chunks(2) {
                if hash.insert(pair[0].clone(), pair[1].clone()).is_none() {
                    created += 1;
                }
            }
            resp_integer(created)
        }
        "HMSET" => {
            let hash = db.hashes.entry(args[1].clone()).or_default();
            for pair in args[2..].chunks(2) {
                hash.insert(pair[0].clone(), pair[1].clone());
            }
            resp_simple("OK")
        }
        "HGET" => match db.hashes.get(&args[1]).and_then(|hash| hash.get(&args[2])) {
            Some(value) => resp_bulk(value),
            None => resp_null(resp3),
        },
        "HMGET" => {
            let hash = db.hashes.get(&args[1]);
            let values: Vec<Option<Vec<u8>>> = args[2..]
                .iter()
                .map(|field| hash.and_then(|hash| hash.get(field).cloned()))
                .collect();
            resp_array(&values, resp3)
        }
        "HGETALL" => {
            let pairs: Vec<(Vec<u8>, Vec<u8>)> = db
                .hashes
                .get(&args[1])
                .map(|hash| hash.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default();
            resp_pairs(&pairs, resp3)
        }
        "HEXISTS" => {
            let found = db.hashes.get(&args[1]).is_some_and(|hash| hash.contains_key(&args[2]));
            resp_integer(found as i64)
        }
        "HINCRBY" => handle_hincrby(db, args),
        "SADD" => {
            let set = db.sets.entry(args[1].clone()).or_default();
            let added = args[2..].iter().filter(|member| set.insert((*member).clone())).count();
            resp_integer(added as i64)
        }
        "EXPIRE" => match parse_i64(&args[2]) {
            Some(seconds) if db.exists(&args[1]) => {
                db.ttls.insert(args[1].clone(), seconds.max(0) as u64);
                resp_integer(1)
            }
            Some(_) => resp_integer(0),
            None => resp_error("ERR value is not an integer or out of range"),
        },
        "FLUSHDB" => {
            *db = Db::default();
            resp_simple("OK")
        }
        _ => resp_error("ERR unknown command"),
    }
}

fn handle_auth(session: &mut Session, state: &State, args: &[Vec<u8>]) -> Vec<u8> {
    match &state.password {
        Some(password) if password.as_bytes() == args[1].as_slice() => {
            session.authenticated = true;
            resp_simple("OK")
        }
        Some(_) => resp_error("WRONGPASS invalid username-password pair"),
        None => resp_error("ERR AUTH called without any password configured"),
    }
}

fn handle_hello(session: &mut Session, args: &[Vec<u8>]) -> Vec<u8> {
    if args.get(1).map(Vec::as_slice) != Some(b"3".as_slice()) {
        return resp_error("NOPROTO unsupported protocol version");
    }
    session.resp3 = true;
    resp_pairs(&[(b"proto".to_vec(), b"3".to_vec())], true)
}

fn handle_get(db: &Db, key: &[u8], resp3: bool) -> Vec<u8> {
    if db.hashes.contains_key(key) || db.sets.contains_key(key) {
        return resp_error("WRONGTYPE Operation against a key holding the wrong kind of value");
    }
    match db.strings.get(key) {
        Some(value) => resp_bulk(value),
        None => resp_null(resp3),
    }
}

fn handle_incr(db: &mut Db, key: &[u8], delta: &[u8]) -> Vec<u8> {
    let Some(delta) = parse_i64(delta) else {
        return resp_error("ERR value is not an integer or out of range");
    };
    let current = match db.strings.get(key) {
        Some(value) => match parse_i64(value) {
            Some(current) => current,
            None => return resp_error("ERR value is not an integer or out of range"),
        },
        None => 0,
    };
    let Some(next) = current.checked_add(delta) else {
        return resp_error("ERR increment or decrement would overflow");
    };
    db.strings.insert(key.to_vec(), next.to_string().into_bytes());
    resp_integer(next)
}

fn handle_hincrby(db: &mut Db, args: &[Vec<u8>]) -> Vec<u8> {
    let Some(delta) = parse_i64(&args[3]) else {
        return resp_error("ERR value is not an integer or out of range");
    };
    let hash = db.hashes.entry(args[1].clone()).or_default();
    let current = match hash.get(&args[2]) {
        Some(value) => match parse_i64(value) {
            Some(current) => current,
            None => return resp_error("ERR hash value is not an integer"),
        },
        None => 0,
    };
    let next = current + delta;
    hash.insert(args[2].clone(), next.to_string().into_bytes());
    resp_integer(next)
}

fn parse_i64(data: &[u8]) -> Option<i64> {
    std::str::from_utf8(data).ok()?.parse().ok()
}

fn resp_simple(message: &str) -> Vec<u8> {
    format!("+{}\r\n", message).into_bytes()
}

fn resp_error(message: &str) -> Vec<u8> {
    format!("-{}\r\n", message).into_bytes()
}

fn resp_integer(value: i64) -> Vec<u8> {
    format!(":{}\r\n", value).into_bytes()
}

fn resp_bulk(data: &[u8]) -> Vec<u8> {
    let mut out = format!("${}\r\n", data.len()).into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
    out
}

fn resp_null(resp3: bool) -> Vec<u8> {
    if resp3 {
        b"_\r\n".to_vec()
    } else {
        b"$-1\r\n".to_vec()
    }
}

fn resp_array(values: &[Option<Vec<u8>>], resp3: bool) -> Vec<u8> {
    let mut out = format!("*{}\r\n", values.len()).into_bytes();
    for value in values {
        match value {
            Some(value) => out.extend_from_slice(&resp_bulk(value)),
            None => out.extend_from_slice(&resp_null(resp3)),
        }
    }
    out
}

fn resp_pairs(pairs: &[(Vec<u8>, Vec<u8>)], resp3: bool) -> Vec<u8> {
    let mut out = if resp3 {
        format!("%{}\r\n", pairs.len()).into_bytes()
    } else {
        format!("*{}\r\n", pairs.len() * 2).into_bytes()
    };
    for (field, value) in pairs {
        out.extend_from_slice(&resp_bulk(field));
        out.extend_from_slice(&resp_bulk(value));
    }
    out
}
