//! WebSocket handshake and frame encoding (RFC 6455).
//!
//! Inbound frames arrive already decoded and unmasked from the transport,
//! as [`Frame`] values. Outbound frames are encoded here: server frames are
//! never masked and never fragmented.

use crate::{
    errors::HttpError,
    http::{
        request::Request,
        types::{contains_token, StatusCode, Version},
    },
};
use base64ct::{Base64, Encoding};
use sha1::{Digest, Sha1};

const SEC_WEBSOCKET_ACCEPT_MAGIC: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The only protocol version spoken.
pub const VERSION: &str = "13";

/// Status code sent in the close frame after a protocol violation.
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;

/// One decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close { code: Option<u16>, reason: String },
    /// A fragment of a fragmented message. The transport is expected to
    /// reassemble messages, so seeing one is a protocol error.
    Continuation(Vec<u8>),
}

impl Frame {
    pub(crate) const fn name(&self) -> &'static str {
        match self {
            Frame::Text(_) => "text",
            Frame::Binary(_) => "binary",
            Frame::Ping(_) => "ping",
            Frame::Pong(_) => "pong",
            Frame::Close { .. } => "close",
            Frame::Continuation(_) => "continuation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum OpCode {
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

/// `Sec-WebSocket-Accept` value for a client key.
pub fn accept_key(key: &str) -> Result<String, HttpError> {
    let mut key_hasher = Sha1::new();
    key_hasher.update(key.as_bytes());
    key_hasher.update(SEC_WEBSOCKET_ACCEPT_MAGIC.as_bytes());
    let key_hash = key_hasher.finalize();

    let mut key_b64_buff = [0u8; 28];
    let encoded = Base64::encode(&key_hash, &mut key_b64_buff)
        .map_err(|_| HttpError::internal("websocket accept key does not fit its buffer"))?;
    Ok(encoded.to_owned())
}

/// Whether the request asks to switch to the WebSocket protocol.
pub(crate) fn is_upgrade_request(req: &Request) -> bool {
    req.header("upgrade")
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"))
        && req
            .header("connection")
            .is_some_and(|v| contains_token(v, "upgrade"))
}

/// Validates the handshake headers of an upgrade request and returns the
/// accept key.
pub(crate) fn check_handshake(req: &Request) -> Result<String, HttpError> {
    match req.header("sec-websocket-version").map(str::trim) {
        Some(VERSION) => {}
        _ => return Err(HttpError::UpgradeRequired),
    }

    match req.header("sec-websocket-key").map(str::trim) {
        Some(key) if !key.is_empty() => accept_key(key),
        _ => Err(HttpError::bad_request("missing Sec-WebSocket-Key")),
    }
}

/// Response head that completes a successful handshake.
pub(crate) fn switching_protocols(accept: &str) -> Vec<u8> {
    let mut head = Vec::with_capacity(128);
    head.extend_from_slice(StatusCode::SwitchingProtocols.to_first_line(Version::Http11));
    head.extend_from_slice(b"upgrade: websocket\r\nconnection: Upgrade\r\n");
    head.extend_from_slice(b"sec-websocket-accept: ");
    head.extend_from_slice(accept.as_bytes());
    head.extend_from_slice(b"\r\n\r\n");
    head
}

/// Encodes one final, unmasked frame into `dest`.
pub(crate) fn encode(opcode: OpCode, payload: &[u8], dest: &mut Vec<u8>) {
    let len = payload.len();
    dest.reserve(len + 10);

    // FIN bit + opcode
    dest.push(0b1000_0000 | opcode as u8);

    if len <= 125 {
        dest.push(len as u8);
    } else if len <= u16::MAX as usize {
        dest.push(126);
        dest.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        dest.push(127);
        dest.extend_from_slice(&(len as u64).to_be_bytes());
    }

    dest.extend_from_slice(payload);
}

/// Encodes a close frame carrying `code` and a short reason.
pub(crate) fn encode_close(code: Option<u16>, reason: &str, dest: &mut Vec<u8>) {
    let mut payload = Vec::with_capacity(2 + reason.len());
    if let Some(code) = code {
        payload.extend_from_slice(&code.to_be_bytes());
        // Control frame payloads are limited to 125 bytes
        let mut end = reason.len().min(123);
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        payload.extend_from_slice(&reason.as_bytes()[..end]);
    }
    encode(OpCode::Close, &payload, dest);
}
