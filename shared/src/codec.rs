//! Frame authentication and command (de)serialization
//!
//! Client frames arrive as `[signature][counter][payload]`. The signature is
//! the first four bytes of a SHA-256 digest over the server signing key, the
//! per-connection client key and everything after the signature. The counter
//! is a big-endian `u32` that must strictly increase over the lifetime of a
//! connection, which rejects any replayed frame.
//!
//! Payloads are UTF-8 text: commands joined by [`MESSAGE_DELIMITER`], each
//! command a list of fields joined by [`FIELD_DELIMITER`] with the command
//! name first.

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::{FIELD_DELIMITER, MAX_FRAME_SIZE, MESSAGE_DELIMITER};

pub const SIGNATURE_SIZE: usize = 4;
pub const COUNTER_SIZE: usize = 4;
pub const HEADER_SIZE: usize = SIGNATURE_SIZE + COUNTER_SIZE;

/// Chat commands end processing of the rest of their frame
pub const TERMINAL_COMMANDS: &[&str] = &["say", "gsay", "psay"];

pub fn is_terminal(name: &str) -> bool {
    TERMINAL_COMMANDS.contains(&name)
}

/// Reasons a frame is refused before any command is looked at
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame of {0} bytes is shorter than the header")]
    TooShort(usize),
    #[error("frame of {0} bytes exceeds the size cap")]
    TooLong(usize),
    #[error("signature mismatch")]
    BadSignature,
    #[error("counter {got} does not advance past {last}")]
    Replayed { got: u32, last: u32 },
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("payload contains control byte {0:#04x}")]
    ControlByte(u8),
}

/// One decoded command: its name and positional arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
}

impl Command {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Re-joins the command for logging dropped input verbatim
    pub fn raw(&self) -> String {
        let mut fields = Vec::with_capacity(self.args.len() + 1);
        fields.push(self.name.as_str());
        fields.extend(self.args.iter().map(String::as_str));
        fields.join(" ")
    }
}

/// Computes the truncated keyed digest over a frame body
pub fn sign(signing_key: &[u8], client_key: &[u8], body: &[u8]) -> [u8; SIGNATURE_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(signing_key);
    hasher.update(client_key);
    hasher.update(body);
    let digest = hasher.finalize();

    let mut signature = [0u8; SIGNATURE_SIZE];
    signature.copy_from_slice(&digest[..SIGNATURE_SIZE]);
    signature
}

/// Compares signatures without stopping at the first differing byte
fn signature_matches(expected: &[u8], actual: &[u8]) -> bool {
    expected.len() == actual.len()
        && expected
            .iter()
            .zip(actual)
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
}

/// Authenticates a raw frame and splits its payload into commands
///
/// `last_counter` is the highest counter accepted so far on this connection
/// and is only advanced when the whole frame checks out.
pub fn decode_frame(
    raw: &[u8],
    signing_key: &[u8],
    client_key: &[u8],
    last_counter: &mut u32,
) -> Result<Vec<Command>, FrameError> {
    if raw.len() < HEADER_SIZE {
        return Err(FrameError::TooShort(raw.len()));
    }
    if raw.len() > MAX_FRAME_SIZE {
        return Err(FrameError::TooLong(raw.len()));
    }

    let (signature, body) = raw.split_at(SIGNATURE_SIZE);
    if !signature_matches(&sign(signing_key, client_key, body), signature) {
        return Err(FrameError::BadSignature);
    }

    let mut counter_bytes = [0u8; COUNTER_SIZE];
    counter_bytes.copy_from_slice(&body[..COUNTER_SIZE]);
    let counter = u32::from_be_bytes(counter_bytes);
    if counter <= *last_counter {
        return Err(FrameError::Replayed {
            got: counter,
            last: *last_counter,
        });
    }

    let payload =
        std::str::from_utf8(&body[COUNTER_SIZE..]).map_err(|_| FrameError::InvalidUtf8)?;
    if let Some(byte) = payload.bytes().find(|b| *b < 0x20) {
        return Err(FrameError::ControlByte(byte));
    }

    *last_counter = counter;
    Ok(split_payload(payload))
}

/// Splits an authenticated payload into commands, skipping empty segments
pub fn split_payload(payload: &str) -> Vec<Command> {
    payload
        .split(MESSAGE_DELIMITER)
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mut fields = segment.split(FIELD_DELIMITER).map(str::to_string);
            let name = fields.next().unwrap_or_default();
            Command {
                name,
                args: fields.collect(),
            }
        })
        .collect()
}

/// Joins a command name and its fields into one outbound message
pub fn encode_message<S: AsRef<str>>(name: &str, fields: &[S]) -> String {
    let mut out = String::from(name);
    for field in fields {
        out.push(FIELD_DELIMITER);
        out.push_str(field.as_ref());
    }
    out
}

/// Joins several encoded messages into one payload
pub fn join_messages<S: AsRef<str>>(messages: &[S]) -> String {
    let mut out = String::new();
    for (i, message) in messages.iter().enumerate() {
        if i > 0 {
            out.push(MESSAGE_DELIMITER);
        }
        out.push_str(message.as_ref());
    }
    out
}

/// Builds a signed client frame; the counterpart of [`decode_frame`]
pub fn encode_frame(signing_key: &[u8], client_key: &[u8], counter: u32, payload: &str) -> Vec<u8> {
    let mut body = Vec::with_capacity(COUNTER_SIZE + payload.len());
    body.extend_from_slice(&counter.to_be_bytes());
    body.extend_from_slice(payload.as_bytes());

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&sign(signing_key, client_key, &body));
    frame.extend_from_slice(&body);
    frame
}
