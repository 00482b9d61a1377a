//! Client side of the opening handshake (RFC 6455 Section 4.1).
//!
//! The client sends an HTTP/1.1 `GET` with a random `Sec-WebSocket-Key` and
//! accepts the server's `101` response only if its `Sec-WebSocket-Accept`
//! header is derived from that key.

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::config::{ConnectionOptions, PROTOCOL_VERSION};
use crate::error::{HandshakeError, Result};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use wsclient::protocol::handshake::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// let accept = compute_accept_key(key);
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    let hash = hasher.finalize();
    BASE64.encode(hash)
}

/// Generate a fresh `Sec-WebSocket-Key`: 16 random bytes, base64 encoded.
///
/// # Errors
///
/// Returns [`Error::Entropy`](crate::Error::Entropy) if the random source fails.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce)?;
    Ok(BASE64.encode(nonce))
}

/// Parsed `HTTP/<version> <code> <reason>` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    /// Protocol token, e.g. `HTTP/1.1`.
    pub http_version: String,
    /// Three-digit status code.
    pub status_code: u16,
    /// Reason phrase, possibly containing spaces.
    pub status_text: String,
}

impl StatusLine {
    /// Parse a status line, returning `None` if it is malformed.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let (http_version, rest) = line.split_once(' ')?;
        let version = http_version.strip_prefix("HTTP/")?;
        if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
            return None;
        }

        let (code, reason) = rest.split_once(' ')?;
        if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) || reason.is_empty() {
            return None;
        }

        Some(Self {
            http_version: http_version.to_string(),
            status_code: code.parse().ok()?,
            status_text: reason.to_string(),
        })
    }
}

/// Parse `name: value` header lines into a map keyed by lower-cased name.
///
/// Values are trimmed of surrounding whitespace, so optional whitespace around
/// a value (including `Sec-WebSocket-Accept`) never affects comparisons.
/// Later duplicates replace earlier ones. A line without `": "` is kept with
/// an empty value rather than rejected.
pub fn parse_headers<'a, I>(lines: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut headers = HashMap::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line.split_once(": ").unwrap_or((line, ""));
        headers.insert(name.to_ascii_lowercase(), value.trim().to_string());
    }

    headers
}

fn validate_header(name: &str, value: &str) -> std::result::Result<(), HandshakeError> {
    let forbidden = |s: &str| s.contains('\r') || s.contains('\n');
    if forbidden(name) || forbidden(value) || name.contains(':') {
        return Err(HandshakeError::InvalidHeaderValue {
            header: name.to_string(),
        });
    }
    Ok(())
}

/// One handshake attempt.
///
/// Owns the key from request construction until the response has been
/// validated; a new attempt needs a new `ClientHandshake`.
#[derive(Debug, Clone)]
pub struct ClientHandshake {
    key: String,
}

impl ClientHandshake {
    /// Start an attempt with a freshly generated key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Entropy`](crate::Error::Entropy) if no key could be generated.
    pub fn new() -> Result<Self> {
        Ok(Self {
            key: generate_key()?,
        })
    }

    /// Start an attempt with a caller-chosen key.
    #[must_use]
    pub fn with_key(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// The `Sec-WebSocket-Key` sent in the request.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The `Sec-WebSocket-Accept` value the server must answer with.
    #[must_use]
    pub fn expected_accept(&self) -> String {
        compute_accept_key(&self.key)
    }

    /// Build the upgrade request, terminated by an empty line.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::InvalidHeaderValue`] if an extra header from
    /// `options` contains CR or LF, or its name contains `:`.
    pub fn build_request(&self, options: &ConnectionOptions) -> Result<Vec<u8>> {
        let mut request = format!(
            "GET {} HTTP/1.1\r\n\
             Host: {}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Version: {}\r\n\
             Sec-WebSocket-Key: {}\r\n",
            options.path,
            options.host_header(),
            PROTOCOL_VERSION,
            self.key
        );

        for (name, value) in &options.headers {
            validate_header(name, value)?;
            request.push_str(name);
            request.push_str(": ");
            request.push_str(value);
            request.push_str("\r\n");
        }

        request.push_str("\r\n");
        Ok(request.into_bytes())
    }

    /// Validate the server's response head.
    ///
    /// # Errors
    ///
    /// - `MalformedResponse` if the data is not UTF-8 or the status line is malformed
    /// - `UnexpectedStatus` if the status code is not 101
    /// - `InvalidUpgradeHeader` unless `Upgrade` equals `websocket` (any case)
    /// - `InvalidConnectionHeader` unless `Connection` equals `upgrade` (any case)
    /// - `InvalidAcceptKey` if `Sec-WebSocket-Accept` is absent or does not match exactly
    pub fn validate_response(&self, data: &[u8]) -> std::result::Result<(), HandshakeError> {
        let text = std::str::from_utf8(data).map_err(|_| HandshakeError::MalformedResponse)?;

        let mut lines = text.split("\r\n").filter(|line| !line.is_empty());

        let status = lines
            .next()
            .and_then(StatusLine::parse)
            .ok_or(HandshakeError::MalformedResponse)?;

        if status.status_code != 101 {
            return Err(HandshakeError::UnexpectedStatus {
                code: status.status_code,
                reason: status.status_text,
            });
        }

        let headers = parse_headers(lines);

        let header_is = |name: &str, expected: &str| {
            headers
                .get(name)
                .is_some_and(|value| value.eq_ignore_ascii_case(expected))
        };

        if !header_is("upgrade", "websocket") {
            return Err(HandshakeError::InvalidUpgradeHeader);
        }

        if !header_is("connection", "upgrade") {
            return Err(HandshakeError::InvalidConnectionHeader);
        }

        match headers.get("sec-websocket-accept") {
            Some(accept) if *accept == self.expected_accept() => Ok(()),
            _ => Err(HandshakeError::InvalidAcceptKey),
        }
    }
}
