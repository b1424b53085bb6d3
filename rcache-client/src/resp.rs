//! # RESP Encoding and Parsing
//!
//! Purpose: Encode client commands and parse server responses for both the
//! RESP2 and RESP3 dialects, keeping allocations under control.
//!
//! ## Design Principles
//! 1. **State-Free Parsing**: Responses are parsed top-down with minimal state.
//! 2. **Buffer Reuse**: Caller provides buffers to avoid per-call allocations.
//! 3. **Binary-Safe**: Bulk strings are treated as raw bytes.
//! 4. **Fail Fast**: Invalid framing returns protocol errors immediately.
//! 5. **Dialect Gate**: RESP3-only prefixes are protocol errors under RESP2.
//! 6. **Bounded Preallocation**: Announced lengths never reserve more than
//!    a small fixed capacity up front.
//! 7. **Out-of-Band Pushes**: Top-level RESP3 pushes are dropped, never
//!    returned as a command reply.
//!
//! ## Prefix Table
//!
//! ```text
//! RESP2:  +simple  -error  :integer  $bulk  *array
//! RESP3:  _null  #bool  ,double  (bignum  !bulk-error  =verbatim
//!         %map  ~set  >push  |attribute
//! ```

use std::io::{self, BufRead, Read};

use bytes::BufMut;

use crate::client::{ClientError, ClientResult};
use crate::config::ParserKind;

/// RESP response value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// +OK or +PONG style responses.
    Simple(Vec<u8>),
    /// -ERR ... responses (and RESP3 !bulk errors).
    Error(Vec<u8>),
    /// :123 responses.
    Integer(i64),
    /// $... bulk strings, with None for null (RESP3 verbatim strings land here
    /// with the format prefix stripped).
    Bulk(Option<Vec<u8>>),
    /// *... arrays (RESP3 sets and pushes land here too).
    Array(Vec<RespValue>),
    /// RESP3 `_` null.
    Null,
    /// RESP3 `#t` / `#f`.
    Boolean(bool),
    /// RESP3 `,` double, kept as its textual form.
    Double(Vec<u8>),
    /// RESP3 `(` big number, kept as its textual form.
    BigNumber(Vec<u8>),
    /// RESP3 `%` map, in server order.
    Map(Vec<(RespValue, RespValue)>),
}

impl RespValue {
    /// Returns true for both the RESP2 null bulk and the RESP3 null.
    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::Null | RespValue::Bulk(None))
    }
}

/// Encodes a RESP array command into the provided buffer.
pub fn encode_command<B: BufMut>(args: &[&[u8]], out: &mut B) {
    out.put_u8(b'*');
    push_usize(out, args.len());
    out.put_slice(b"\r\n");
    for arg in args {
        out.put_u8(b'$');
        push_usize(out, arg.len());
        out.put_slice(b"\r\n");
        out.put_slice(arg);
        out.put_slice(b"\r\n");
    }
}

/// Upper bound on capacity reserved from a length the server announced.
const MAX_PREALLOC: usize = 1024;

/// Reads the reply to one command from the buffered reader.
///
/// RESP3 push frames are out-of-band and are dropped, so the next value in the
/// stream is always the command's own reply.
pub fn read_response<R: BufRead>(
    reader: &mut R,
    line_buf: &mut Vec<u8>,
    parser: ParserKind,
) -> ClientResult<RespValue> {
    loop {
        read_line(reader, line_buf)?;
        if parser == ParserKind::Resp3 && line_buf.first() == Some(&b'>') {
            let len = parse_i64(&line_buf[1..])?;
            parse_array_len(reader, len, line_buf, parser)?;
            continue;
        }
        return read_framed(reader, line_buf, parser);
    }
}

fn read_value<R: BufRead>(
    reader: &mut R,
    line_buf: &mut Vec<u8>,
    parser: ParserKind,
) -> ClientResult<RespValue> {
    read_line(reader, line_buf)?;
    read_framed(reader, line_buf, parser)
}

// Dispatches on the header line already in `line_buf`.
fn read_framed<R: BufRead>(
    reader: &mut R,
    line_buf: &mut Vec<u8>,
    parser: ParserKind,
) -> ClientResult<RespValue> {
    if line_buf.is_empty() {
        return Err(ClientError::Protocol);
    }

    match line_buf[0] {
        b'+' => Ok(RespValue::Simple(line_buf[1..].to_vec())),
        b'-' => Ok(RespValue::Error(line_buf[1..].to_vec())),
        b':' => Ok(RespValue::Integer(parse_i64(&line_buf[1..])?)),
        b'$' => {
            let len = parse_i64(&line_buf[1..])?;
            parse_bulk_len(reader, len, line_buf)
        }
        b'*' => {
            let len = parse_i64(&line_buf[1..])?;
            parse_array_len(reader, len, line_buf, parser)
        }
        prefix if parser == ParserKind::Resp3 => read_resp3(reader, line_buf, prefix),
        _ => Err(ClientError::Protocol),
    }
}

fn read_resp3<R: BufRead>(
    reader: &mut R,
    line_buf: &mut Vec<u8>,
    prefix: u8,
) -> ClientResult<RespValue> {
    match prefix {
        b'_' => Ok(RespValue::Null),
        b'#' => match &line_buf[1..] {
            b"t" => Ok(RespValue::Boolean(true)),
            b"f" => Ok(RespValue::Boolean(false)),
            _ => Err(ClientError::Protocol),
        },
        b',' => Ok(RespValue::Double(line_buf[1..].to_vec())),
        b'(' => Ok(RespValue::BigNumber(line_buf[1..].to_vec())),
        b'!' => {
            let len = parse_i64(&line_buf[1..])?;
            match parse_bulk_len(reader, len, line_buf)? {
                RespValue::Bulk(Some(message)) => Ok(RespValue::Error(message)),
                _ => Err(ClientError::Protocol),
            }
        }
        b'=' => {
            let len = parse_i64(&line_buf[1..])?;
            match parse_bulk_len(reader, len, line_buf)? {
                // Verbatim strings carry a 3-byte format and a colon.
                RespValue::Bulk(Some(data)) if data.len() >= 4 && data[3] == b':' => {
                    Ok(RespValue::Bulk(Some(data[4..].to_vec())))
                }
                _ => Err(ClientError::Protocol),
            }
        }
        b'~' | b'>' => {
            let len = parse_i64(&line_buf[1..])?;
            parse_array_len(reader, len, line_buf, ParserKind::Resp3)
        }
        b'%' => {
            let len = parse_i64(&line_buf[1..])?.max(0);
            let mut entries = Vec::with_capacity(prealloc(len));
            for _ in 0..len {
                let key = read_value(reader, line_buf, ParserKind::Resp3)?;
                let value = read_value(reader, line_buf, ParserKind::Resp3)?;
                entries.push((key, value));
            }
            Ok(RespValue::Map(entries))
        }
        b'|' => {
            // Attributes decorate the next reply; skip them.
            let len = parse_i64(&line_buf[1..])?.max(0);
            let frames = len.checked_mul(2).ok_or(ClientError::Protocol)?;
            for _ in 0..frames {
                read_value(reader, line_buf, ParserKind::Resp3)?;
            }
            read_value(reader, line_buf, ParserKind::Resp3)
        }
        _ => Err(ClientError::Protocol),
    }
}

fn parse_bulk_len<R: BufRead>(
    reader: &mut R,
    len: i64,
    line_buf: &mut Vec<u8>,
) -> ClientResult<RespValue> {
    if len < 0 {
        return Ok(RespValue::Bulk(None));
    }
    let len = usize::try_from(len).map_err(|_| ClientError::Protocol)?;
    let mut data = Vec::with_capacity(prealloc(len as i64));
    reader.by_ref().take(len as u64).read_to_end(&mut data)?;
    if data.len() != len {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }

    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf)?;
    if crlf != [b'\r', b'\n'] {
        return Err(ClientError::Protocol);
    }

    line_buf.clear();
    Ok(RespValue::Bulk(Some(data)))
}

fn parse_array_len<R: BufRead>(
    reader: &mut R,
    len: i64,
    line_buf: &mut Vec<u8>,
    parser: ParserKind,
) -> ClientResult<RespValue> {
    if len <= 0 {
        return Ok(RespValue::Array(Vec::new()));
    }

    let mut items = Vec::with_capacity(prealloc(len));
    for _ in 0..len {
        items.push(read_value(reader, line_buf, parser)?);
    }
    Ok(RespValue::Array(items))
}

#[inline]
fn prealloc(len: i64) -> usize {
    usize::try_from(len).unwrap_or(0).min(MAX_PREALLOC)
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> ClientResult<()> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 {
        return Err(ClientError::Protocol);
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(ClientError::Protocol);
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_i64(data: &[u8]) -> ClientResult<i64> {
    if data.is_empty() {
        return Err(ClientError::Protocol);
    }
    let mut negative = false;
    let mut idx = 0;
    if data[0] == b'-' {
        negative = true;
        idx = 1;
    }

    let mut value: i64 = 0;
    while idx < data.len() {
        let b = data[idx];
        if !b.is_ascii_digit() {
            return Err(ClientError::Protocol);
        }
        value = value.saturating_mul(10).saturating_add((b - b'0') as i64);
        idx += 1;
    }

    if negative {
        Ok(-value)
    } else {
        Ok(value)
    }
}

fn push_usize<B: BufMut>(out: &mut B, mut value: usize) {
    // Write digits into a small stack buffer to avoid heap allocations.
    let mut buf = [0u8; 20];
    let mut len = 0;
    if value == 0 {
        buf[0] = b'0';
        len = 1;
    } else {
        while value > 0 {
            buf[len] = b'0' + (value % 10) as u8;
            value /= 10;
            len += 1;
        }
    }
    buf[..len].reverse();
    out.put_slice(&buf[..len]);
}
