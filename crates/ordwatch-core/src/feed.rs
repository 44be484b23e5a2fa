//! Node notification feeds.
//!
//! Bitcoin Core publishes ZMQ multipart messages `[topic, body, sequence]`.
//! Two topics are consumed:
//!
//! - `sequence`: 32-byte txid, one label byte, 8-byte mempool sequence for
//!   mempool additions (`A`) and removals (`R`). Block connect/disconnect
//!   notifications (`C`/`D`) share the topic but carry no mempool sequence,
//!   so their bodies are 33 bytes and are skipped.
//! - `hashblock`: the 32-byte hash of every newly connected block.
//!
//! Hashes arrive in display order, the same order RPC prints them.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, Txid};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use zeromq::{Socket, SocketRecv, SubSocket};

use crate::error::CoreError;

const HASH_LEN: usize = 32;
const SEQUENCE_BODY_LEN: usize = HASH_LEN + 1 + 8;

// ==============================================================================
// Events
// ==============================================================================

/// A mempool membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MempoolEvent {
    pub txid: Txid,
    /// `true` for an addition, `false` for a removal.
    pub added: bool,
}

/// A newly connected block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEvent {
    pub block_hash: BlockHash,
}

/// An event carried on one ZMQ topic.
pub trait FeedEvent: Sized + Send + 'static {
    const TOPIC: &'static str;

    /// Parse one message body. `Ok(None)` for bodies of this topic that do
    /// not describe an event of this kind.
    fn parse(body: &[u8]) -> Result<Option<Self>, CoreError>;
}

impl FeedEvent for MempoolEvent {
    const TOPIC: &'static str = "sequence";

    fn parse(body: &[u8]) -> Result<Option<Self>, CoreError> {
        if body.len() != SEQUENCE_BODY_LEN {
            return Ok(None);
        }
        let added = match body[HASH_LEN] {
            b'A' => true,
            b'R' => false,
            other => {
                return Err(CoreError::Feed(format!(
                    "unknown sequence label {:?}",
                    char::from(other)
                )))
            }
        };
        Ok(Some(Self {
            txid: Txid::from_byte_array(display_order_hash(&body[..HASH_LEN])?),
            added,
        }))
    }
}

impl FeedEvent for BlockEvent {
    const TOPIC: &'static str = "hashblock";

    fn parse(body: &[u8]) -> Result<Option<Self>, CoreError> {
        Ok(Some(Self {
            block_hash: BlockHash::from_byte_array(display_order_hash(body)?),
        }))
    }
}

/// Convert a display-order hash to the internal byte order.
fn display_order_hash(bytes: &[u8]) -> Result<[u8; HASH_LEN], CoreError> {
    let mut hash: [u8; HASH_LEN] = bytes.try_into().map_err(|_| {
        CoreError::Feed(format!(
            "expected a {HASH_LEN}-byte hash, got {} bytes",
            bytes.len()
        ))
    })?;
    hash.reverse();
    Ok(hash)
}

// ==============================================================================
// Sources
// ==============================================================================

/// A stream of events. `Ok(None)` means the source is finished for good.
#[async_trait]
pub trait EventSource<E>: Send {
    async fn recv(&mut self) -> Result<Option<E>, CoreError>;
}

/// How long a [`ZmqFeed`] waits for a message before it assumes the
/// publisher is gone and reconnects.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// A ZMQ SUB socket subscribed to `E::TOPIC`.
///
/// A SUB socket does not report a vanished publisher: the peer is dropped
/// and `recv` waits forever. The feed therefore drops its socket after a
/// receive error or after `idle_timeout` without a message, and the next
/// `recv` connects and subscribes again.
pub struct ZmqFeed<E> {
    socket: Option<SubSocket>,
    endpoint: String,
    idle_timeout: Duration,
    _event: PhantomData<fn() -> E>,
}

impl<E: FeedEvent> ZmqFeed<E> {
    pub async fn connect(endpoint: &str) -> Result<Self, CoreError> {
        let socket = subscribe(endpoint, E::TOPIC).await?;
        info!(endpoint, topic = E::TOPIC, "subscribed to ZMQ feed");
        Ok(Self {
            socket: Some(socket),
            endpoint: endpoint.to_owned(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            _event: PhantomData,
        })
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

async fn subscribe(endpoint: &str, topic: &str) -> Result<SubSocket, CoreError> {
    let mut socket = SubSocket::new();
    socket
        .connect(endpoint)
        .await
        .map_err(|e| CoreError::Feed(format!("connect {endpoint}: {e}")))?;
    socket
        .subscribe(topic)
        .await
        .map_err(|e| CoreError::Feed(format!("subscribe {topic}: {e}")))?;
    Ok(socket)
}

#[async_trait]
impl<E: FeedEvent> EventSource<E> for ZmqFeed<E> {
    async fn recv(&mut self) -> Result<Option<E>, CoreError> {
        loop {
            let mut socket = match self.socket.take() {
                Some(socket) => socket,
                None => {
                    let socket = subscribe(&self.endpoint, E::TOPIC).await?;
                    info!(endpoint = %self.endpoint, topic = E::TOPIC, "resubscribed to ZMQ feed");
                    socket
                }
            };

            let message = match tokio::time::timeout(self.idle_timeout, socket.recv()).await {
                Ok(Ok(message)) => message,
                Ok(Err(e)) => {
                    return Err(CoreError::Feed(format!("{}: {e}", self.endpoint)));
                }
                Err(_) => {
                    return Err(CoreError::Feed(format!(
                        "{}: no {} message for {:?}, reconnecting",
                        self.endpoint,
                        E::TOPIC,
                        self.idle_timeout
                    )));
                }
            };
            self.socket = Some(socket);

            if message.get(0).map(|topic| &topic[..]) != Some(E::TOPIC.as_bytes()) {
                trace!(topic = E::TOPIC, "skipping message for another topic");
                continue;
            }
            let Some(body) = message.get(1) else {
                return Err(CoreError::Feed(format!("{} message without body", E::TOPIC)));
            };
            match E::parse(body)? {
                Some(event) => return Ok(Some(event)),
                None => trace!(topic = E::TOPIC, len = body.len(), "ignoring body"),
            }
        }
    }
}

/// In-process feeds: the source finishes once every sender is dropped.
#[async_trait]
impl<E: Send> EventSource<E> for mpsc::Receiver<E> {
    async fn recv(&mut self) -> Result<Option<E>, CoreError> {
        Ok(mpsc::Receiver::recv(self).await)
    }
}

/// Wait for the next event, logging and sleeping through receive errors.
/// Returns `None` once the source is finished.
pub async fn next_event<E, S>(feed: &mut S, topic: &str, retry_after: Duration) -> Option<E>
where
    S: EventSource<E> + ?Sized,
{
    loop {
        match feed.recv().await {
            Ok(Some(event)) => return Some(event),
            Ok(None) => {
                debug!(topic, "feed finished");
                return None;
            }
            Err(err) => {
                warn!(topic, error = %err, "feed receive failed");
                tokio::time::sleep(retry_after).await;
            }
        }
    }
}
