//! Minimal HTTP/1.1 framing on top of tokio streams
//!
//! Requests are read until the blank line that ends the headers, then the body
//! is read up to `Content-Length`. Responses are built by hand with permissive
//! CORS headers.

use crate::error::{OrchestratorError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;

/// Upper bound on an accepted request body.
pub const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

const HEADER_END: &[u8] = b"\r\n\r\n";

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

/// Outcome of reading one request off a connection.
#[derive(Debug)]
pub enum ReadOutcome {
    Request(HttpRequest),
    /// The peer closed the connection before sending anything
    Closed,
    TimedOut,
}

/// Read a full request: headers first, then the body up to `Content-Length`.
pub async fn read_request<R>(stream: &mut R, read_timeout: Duration) -> Result<ReadOutcome>
where
    R: AsyncRead + Unpin,
{
    let read = timeout(read_timeout, async {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 8192];

        let header_len = loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                if buffer.is_empty() {
                    return Ok(None);
                }
                return Err(OrchestratorError::InvalidRequest(
                    "connection closed before end of headers".to_string(),
                ));
            }
            buffer.extend_from_slice(&chunk[..n]);
            if let Some(pos) = find_header_end(&buffer) {
                break pos + HEADER_END.len();
            }
        };

        let content_length = content_length(&buffer[..header_len])?;
        if content_length > MAX_BODY_BYTES {
            return Err(OrchestratorError::InvalidRequest(format!(
                "body of {} bytes exceeds the {} byte limit",
                content_length, MAX_BODY_BYTES
            )));
        }
        while buffer.len() < header_len + content_length {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(OrchestratorError::InvalidRequest(
                    "connection closed before end of body".to_string(),
                ));
            }
            buffer.extend_from_slice(&chunk[..n]);
        }
        Ok::<_, OrchestratorError>(Some(buffer))
    })
    .await;

    match read {
        Ok(Ok(Some(bytes))) => parse_request(&bytes).map(ReadOutcome::Request),
        Ok(Ok(None)) => Ok(ReadOutcome::Closed),
        Ok(Err(e)) => Err(e),
        Err(_) => Ok(ReadOutcome::TimedOut),
    }
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(HEADER_END.len()).position(|w| w == HEADER_END)
}

fn content_length(head: &[u8]) -> Result<usize> {
    let head = String::from_utf8_lossy(head);
    for line in head.lines().skip(1) {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                return value.trim().parse::<usize>().map_err(|_| {
                    OrchestratorError::InvalidRequest(format!("invalid Content-Length: {}", value.trim()))
                });
            }
        }
    }
    Ok(0)
}

/// Parse a complete request (headers and body) from raw bytes.
pub fn parse_request(bytes: &[u8]) -> Result<HttpRequest> {
    let header_end = find_header_end(bytes)
        .ok_or_else(|| OrchestratorError::InvalidRequest("incomplete request headers".to_string()))?;
    let head = String::from_utf8_lossy(&bytes[..header_end]);
    let mut lines = head.lines();

    let request_line = lines
        .next()
        .filter(|line| !line.trim().is_empty())
        .ok_or_else(|| OrchestratorError::InvalidRequest("empty request".to_string()))?;
    let mut parts = request_line.split_whitespace();
    let (method, target) = match (parts.next(), parts.next()) {
        (Some(method), Some(target)) => (method.to_uppercase(), target),
        _ => {
            return Err(OrchestratorError::InvalidRequest(format!(
                "invalid request line: {}",
                request_line
            )))
        }
    };

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), parse_query(query)),
        None => (target.to_string(), HashMap::new()),
    };

    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_lowercase(), value.trim().to_string()))
        .collect();

    let body_start = header_end + HEADER_END.len();
    let declared = content_length(&bytes[..header_end])?;
    let body_end = (body_start + declared).min(bytes.len());

    Ok(HttpRequest {
        method,
        path,
        query,
        headers,
        body: bytes[body_start..body_end].to_vec(),
    })
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            Some((url_decode(key), url_decode(value)))
        })
        .collect()
}

/// Percent-decoding for query strings; `+` is a space.
pub fn url_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => decoded.push(b' '),
            b'%' if i + 2 < bytes.len() => match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                (Some(high), Some(low)) => {
                    decoded.push(high << 4 | low);
                    i += 2;
                }
                _ => decoded.push(b'%'),
            },
            other => decoded.push(other),
        }
        i += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}

pub fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

pub fn json_response<T: Serialize>(status: u16, body: &T) -> Result<Vec<u8>> {
    let json_body = serde_json::to_string(body)?;
    let response = format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        status_text(status),
        json_body.len(),
        json_body
    );
    Ok(response.into_bytes())
}

pub fn cors_response() -> Vec<u8> {
    format!(
        "HTTP/1.1 204 {}\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: 0\r\n\
         Connection: close\r\n\
         \r\n",
        status_text(204)
    )
    .into_bytes()
}
