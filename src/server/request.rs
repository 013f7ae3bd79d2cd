use std::io::{self, BufRead, Read};

use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, HOST};
use http::Method;

use crate::headers;
use crate::request::Request;

/// Hard cap on declared request bodies accepted by the host; decoders apply
/// their own, smaller limits.
const MAX_BODY: u64 = 64 * 1024 * 1024;

/// Largest request head (request line plus headers) we are willing to read.
const MAX_HEAD: usize = 64 * 1024;

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decode percent-escapes in a path. Invalid escapes are kept verbatim.
pub(crate) fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 3 <= bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

/// Read one HTTP/1.1 request from the stream. Returns `Ok(None)` on a clean
/// EOF before the request line, an error on malformed input.
pub(crate) fn read_request(
    reader: &mut impl BufRead,
    remote_addr: &str,
    tls: bool,
) -> io::Result<Option<Request>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }

    let mut parts = line.split_whitespace();
    let (Some(method), Some(target), Some(proto)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid("malformed request line"));
    };
    let method =
        Method::from_bytes(method.as_bytes()).map_err(|_| invalid("malformed request method"))?;
    let proto = proto.to_string();

    let (raw_path, query) = match target.split_once('?') {
        Some((p, q)) => (p, q.to_string()),
        None => (target, String::new()),
    };
    let path = percent_decode(raw_path);

    let mut header_map = HeaderMap::new();
    let mut head_size = line.len();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(invalid("unexpected EOF in headers"));
        }
        head_size += line.len();
        if head_size > MAX_HEAD {
            return Err(invalid("request head too large"));
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(invalid("malformed header line"));
        };
        let name = HeaderName::from_bytes(name.trim().to_ascii_lowercase().as_bytes())
            .map_err(|_| invalid("malformed header name"))?;
        let value =
            HeaderValue::from_str(value.trim()).map_err(|_| invalid("malformed header value"))?;
        header_map.append(name, value);
    }

    let content_length: u64 = headers::get(&header_map, &CONTENT_LENGTH)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    if content_length > MAX_BODY {
        return Err(invalid("request body too large"));
    }
    let mut body = vec![0; content_length as usize];
    reader.read_exact(&mut body)?;

    let host = headers::get(&header_map, &HOST).unwrap_or("").to_string();

    Ok(Some(Request {
        method,
        path,
        query,
        headers: header_map,
        body,
        proto,
        remote_addr: remote_addr.to_string(),
        host,
        tls,
    }))
}
