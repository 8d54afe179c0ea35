//! Per-connection plumbing shared by room and session endpoints
//!
//! Every upgraded socket is split in two halves:
//! - a reader, driven by the gateway, that authenticates frames with a
//!   [`FrameReader`] and forwards commands to the owning actor
//! - a writer task ([`run_writer`]) that drains the connection's [`Outbox`]
//!   and sends a ping on every keepalive tick
//!
//! Both halves watch the same cancellation token, so cancelling an outbox
//! tears down the whole connection. Actors never block on a peer: pushing
//! into a full outbox cancels that peer instead.

use futures_util::{Sink, SinkExt};
use log::{debug, warn};
use rand::distributions::Alphanumeric;
use rand::Rng;
use shared::codec::{decode_frame, encode_message};
use shared::{Command, FrameError};
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Process-unique connection id
pub type ConnId = u64;

/// Length of the random per-connection key mixed into frame signatures
pub const CLIENT_KEY_LENGTH: usize = 16;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Outbound queue of one connection
#[derive(Debug, Clone)]
pub struct Outbox {
    conn_id: ConnId,
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
}

impl Outbox {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        let outbox = Self {
            conn_id: NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed),
            tx,
            cancel: CancellationToken::new(),
        };
        (outbox, rx)
    }

    pub fn conn_id(&self) -> ConnId {
        self.conn_id
    }

    /// Encodes and queues one message
    pub fn send<S: AsRef<str>>(&self, name: &str, fields: &[S]) -> bool {
        self.push(encode_message(name, fields))
    }

    /// Queues an already encoded message
    ///
    /// A full queue means the peer stopped reading; the connection is
    /// cancelled and the message dropped.
    pub fn push(&self, message: String) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Outbox of connection {} is full, dropping peer", self.conn_id);
                self.cancel.cancel();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Drains an outbox into a WebSocket sink until cancelled or the peer goes away
pub async fn run_writer<S>(
    mut sink: S,
    mut rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
    keepalive: Duration,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut ticker = interval(keepalive);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            message = rx.recv() => match message {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        debug!("Write failed: {}", e);
                        break;
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                    debug!("Keepalive failed: {}", e);
                    break;
                }
            }
        }
    }

    let _ = sink.close().await;
    cancel.cancel();
}

/// Frame authentication state of one connection
pub struct FrameReader {
    signing_key: Vec<u8>,
    client_key: String,
    last_counter: u32,
}

impl FrameReader {
    pub fn new(signing_key: Vec<u8>) -> Self {
        let client_key = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(CLIENT_KEY_LENGTH)
            .map(char::from)
            .collect();
        Self {
            signing_key,
            client_key,
            last_counter: 0,
        }
    }

    pub fn client_key(&self) -> &str {
        &self.client_key
    }

    pub fn last_counter(&self) -> u32 {
        self.last_counter
    }

    pub fn decode(&mut self, raw: &[u8]) -> Result<Vec<Command>, FrameError> {
        decode_frame(
            raw,
            &self.signing_key,
            self.client_key.as_bytes(),
            &mut self.last_counter,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::codec::encode_frame;

    #[tokio::test]
    async fn test_outbox_delivers_in_order() {
        let (outbox, mut rx) = Outbox::new(4);
        assert!(outbox.send("m", &["1", "2"]));
        assert!(outbox.send("d", &["1"]));

        assert_eq!(rx.recv().await.unwrap(), "m\u{FFFF}1\u{FFFF}2");
        assert_eq!(rx.recv().await.unwrap(), "d\u{FFFF}1");
    }

    #[tokio::test]
    async fn test_full_outbox_cancels_peer() {
        let (outbox, _rx) = Outbox::new(1);
        assert!(outbox.push("a".to_string()));
        assert!(!outbox.is_cancelled());

        assert!(!outbox.push("b".to_string()));
        assert!(outbox.is_cancelled());
        assert!(!outbox.push("c".to_string()));
    }

    #[test]
    fn test_conn_ids_are_unique() {
        let (a, _) = Outbox::new(1);
        let (b, _) = Outbox::new(1);
        assert_ne!(a.conn_id(), b.conn_id());
    }

    #[test]
    fn test_frame_reader_tracks_counter() {
        let mut reader = FrameReader::new(b"key".to_vec());
        assert_eq!(reader.client_key().len(), CLIENT_KEY_LENGTH);

        let frame = encode_frame(b"key", reader.client_key().as_bytes(), 3, "spd\u{FFFF}5");
        let commands = reader.decode(&frame).unwrap();
        assert_eq!(commands[0].name, "spd");
        assert_eq!(reader.last_counter(), 3);
        assert!(reader.decode(&frame).is_err());
    }
}
