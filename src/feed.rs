//! Record feeds pushed to subscribed clients.
//!
//! A [`Feed`] produces the records one client should see (user actions,
//! awarded lootboxes) as plain values; [`FeedHandler`] turns it into a
//! session [`Handler`] that writes each record as a JSON text frame.
//!
//! # Example
//!
//! ```ignore
//! use activity_pump::{FeedHandler, Server};
//!
//! let server = Server::builder()
//!     .endpoint("/lootboxes", FeedHandler::new(lootbox_feed))
//!     .bind("0.0.0.0:8080")
//!     .await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::protocol::{Payload, QueryParams, ShutdownNotify, ShutdownRequester};

// ============================================================================
// Feed
// ============================================================================

/// Source of records for one session.
#[async_trait]
pub trait Feed: Send + Sync + 'static {
    /// Record type written to the client.
    type Record: Serialize + Send + 'static;

    /// Subscribes `identity` to its records.
    ///
    /// An exhausted receiver stops the writes; the session then stays open
    /// until the client leaves.
    ///
    /// # Errors
    ///
    /// Any error ends the session with that error as the reason.
    async fn subscribe(
        &self,
        identity: &str,
        query: &QueryParams,
    ) -> Result<mpsc::Receiver<Self::Record>>;
}

// ============================================================================
// FeedHandler
// ============================================================================

/// Handler writing every record of a [`Feed`] to the client.
///
/// Inbound payloads are read and discarded so the peer is never held back.
#[derive(Debug, Clone)]
pub struct FeedHandler<F> {
    feed: F,
}

impl<F: Feed> FeedHandler<F> {
    /// Wraps `feed`.
    #[must_use]
    pub fn new(feed: F) -> Self {
        Self { feed }
    }

    /// Returns the wrapped feed.
    #[inline]
    #[must_use]
    pub fn feed(&self) -> &F {
        &self.feed
    }
}

#[async_trait]
impl<F: Feed> Handler for FeedHandler<F> {
    async fn handle(
        &self,
        identity: String,
        query: QueryParams,
        mut inbound: mpsc::Receiver<Payload>,
        outbound: mpsc::Sender<Payload>,
        shutdown: ShutdownRequester,
        mut notify: ShutdownNotify,
    ) {
        let mut records = match self.feed.subscribe(&identity, &query).await {
            Ok(records) => records,
            Err(e) => {
                warn!(%identity, error = %e, "Feed subscription failed");
                shutdown.request(Some(e));
                let _ = notify.recv().await;
                return;
            }
        };

        let mut feed_open = true;
        let mut inbound_open = true;

        loop {
            tokio::select! {
                _ = notify.recv() => break,

                received = inbound.recv(), if inbound_open => match received {
                    Some(payload) => trace!(%identity, len = payload.len(), "Ignoring client payload"),
                    None => inbound_open = false,
                },

                record = records.recv(), if feed_open => {
                    let Some(record) = record else {
                        debug!(%identity, "Feed exhausted");
                        feed_open = false;
                        continue;
                    };

                    let payload = match serde_json::to_vec(&record) {
                        Ok(payload) => payload,
                        Err(e) => {
                            feed_open = false;
                            shutdown.request(Some(Error::Json(e)));
                            continue;
                        }
                    };

                    tokio::select! {
                        _ = notify.recv() => break,
                        sent = outbound.send(payload) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }

        trace!(%identity, "Feed handler finished");
    }
}

// ============================================================================
// Records
// ============================================================================

/// Direction of a token movement relative to the tracked address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Send,
    Receive,
}

/// A decoded on-chain transfer involving a tracked token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAction {
    pub network: String,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub transaction_hash: String,
    pub log_index: u64,
    pub sender_address: String,
    pub recipient_address: String,
    /// Raw token amount as a decimal string.
    pub amount: String,
    pub token_decimals: u8,
    pub token_short_name: String,
    /// RFC 3339 timestamp.
    pub time: String,
    pub application: String,
    pub swap_in: bool,
}

impl UserAction {
    /// Returns `true` if `address` sent or received this transfer.
    #[must_use]
    pub fn involves(&self, address: &str) -> bool {
        self.sender_address.eq_ignore_ascii_case(address)
            || self.recipient_address.eq_ignore_ascii_case(address)
    }
}

/// What earned a lootbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LootboxSource {
    Transaction,
    Referral,
    Leaderboard,
}

/// Lootboxes awarded for one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lootbox {
    pub address: String,
    pub source: LootboxSource,
    pub transaction_hash: String,
    /// RFC 3339 timestamp.
    pub awarded_time: String,
    /// USD volume as a decimal string.
    pub volume: String,
    pub reward_tier: u8,
    pub lootbox_count: f64,
    pub application: String,
    pub epoch: String,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message;

    use crate::config::UpgraderConfig;
    use crate::protocol::ShutdownOrigin;
    use crate::transport::testing::{TestStream, duplex_pair, init_tracing};
    use crate::transport::{Session, SessionStatus};

    const WAIT: Duration = Duration::from_secs(5);

    /// Lootboxes held in memory, filtered by the subscriber's address.
    struct MemoryFeed {
        lootboxes: Vec<Lootbox>,
    }

    #[async_trait]
    impl Feed for MemoryFeed {
        type Record = Lootbox;

        async fn subscribe(
            &self,
            identity: &str,
            query: &QueryParams,
        ) -> Result<mpsc::Receiver<Lootbox>> {
            let address = query.get("address").unwrap_or(identity);
            let matching: Vec<_> = self
                .lootboxes
                .iter()
                .filter(|l| l.address.eq_ignore_ascii_case(address))
                .cloned()
                .collect();

            let (tx, rx) = mpsc::channel(1);
            tokio::spawn(async move {
                for lootbox in matching {
                    if tx.send(lootbox).await.is_err() {
                        break;
                    }
                }
            });
            Ok(rx)
        }
    }

    struct FailingFeed;

    #[async_trait]
    impl Feed for FailingFeed {
        type Record = UserAction;

        async fn subscribe(&self, _: &str, _: &QueryParams) -> Result<mpsc::Receiver<UserAction>> {
            Err(Error::feed("no such epoch"))
        }
    }

    fn lootbox(address: &str, tier: u8) -> Lootbox {
        Lootbox {
            address: address.to_string(),
            source: LootboxSource::Transaction,
            transaction_hash: format!("0x{tier:064x}"),
            awarded_time: "2023-06-01T12:00:00Z".to_string(),
            volume: "125.5".to_string(),
            reward_tier: tier,
            lootbox_count: 1.5,
            application: "uniswap_v3".to_string(),
            epoch: "epoch_1".to_string(),
        }
    }

    async fn next_message(client: &mut TestStream) -> Message {
        loop {
            let message = timeout(WAIT, client.next())
                .await
                .expect("message in time")
                .expect("stream open")
                .expect("no error");
            if !message.is_ping() && !message.is_pong() {
                return message;
            }
        }
    }

    #[tokio::test]
    async fn test_records_written_as_json_in_order() {
        init_tracing();
        let (server, mut client) = duplex_pair().await;
        let handler = FeedHandler::new(MemoryFeed {
            lootboxes: vec![lootbox("0xabc", 1), lootbox("0xdef", 2), lootbox("0xABC", 3)],
        });

        let session = Session::open("0xabc", &UpgraderConfig::new());
        let run = tokio::spawn(async move {
            session
                .run(server, QueryParams::default(), &handler)
                .await
        });

        for tier in [1, 3] {
            match next_message(&mut client).await {
                Message::Text(text) => {
                    let received: Lootbox = serde_json::from_str(text.as_str()).expect("valid json");
                    assert_eq!(received.reward_tier, tier);
                    assert!(received.address.eq_ignore_ascii_case("0xabc"));
                }
                other => panic!("expected text, got {other:?}"),
            }
        }

        client.close(None).await.expect("close");
        let status = timeout(WAIT, run).await.expect("run returns").expect("no panic");
        assert_eq!(status, SessionStatus::Closed(ShutdownOrigin::InboundFault));
    }

    #[tokio::test]
    async fn test_query_address_overrides_identity() {
        let (server, mut client) = duplex_pair().await;
        let handler = FeedHandler::new(MemoryFeed {
            lootboxes: vec![lootbox("0xabc", 1), lootbox("0xdef", 2)],
        });

        let session = Session::open("203.0.113.7", &UpgraderConfig::new());
        let run = tokio::spawn(async move {
            session
                .run(server, QueryParams::parse("address=0xdef"), &handler)
                .await
        });

        match next_message(&mut client).await {
            Message::Text(text) => assert!(text.as_str().contains("\"reward_tier\":2")),
            other => panic!("expected text, got {other:?}"),
        }

        client.close(None).await.expect("close");
        timeout(WAIT, run).await.expect("run returns").expect("no panic");
    }

    #[tokio::test]
    async fn test_client_payloads_do_not_stall_feed() {
        let (server, mut client) = duplex_pair().await;
        let handler = FeedHandler::new(MemoryFeed {
            lootboxes: vec![lootbox("0xabc", 4)],
        });

        for i in 0..4 {
            client.send(Message::text(format!("noise-{i}"))).await.expect("send");
        }

        let session = Session::open("0xabc", &UpgraderConfig::new());
        let run = tokio::spawn(async move {
            session
                .run(server, QueryParams::default(), &handler)
                .await
        });

        assert!(matches!(next_message(&mut client).await, Message::Text(_)));
        client.close(None).await.expect("close");
        timeout(WAIT, run).await.expect("run returns").expect("no panic");
    }

    #[tokio::test]
    async fn test_subscribe_failure_ends_session() {
        let (server, mut client) = duplex_pair().await;
        let handler = FeedHandler::new(FailingFeed);

        let session = Session::open("0xabc", &UpgraderConfig::new());
        let status = timeout(WAIT, session.run(server, QueryParams::default(), &handler))
            .await
            .expect("run returns");

        assert_eq!(status, SessionStatus::Closed(ShutdownOrigin::HandlerRequest));
        assert!(next_message(&mut client).await.is_close());
    }

    #[test]
    fn test_user_action_wire_names() {
        let action = UserAction {
            network: "ethereum".to_string(),
            kind: ActionKind::Send,
            transaction_hash: "0x01".to_string(),
            log_index: 7,
            sender_address: "0xAbC".to_string(),
            recipient_address: "0xdef".to_string(),
            amount: "1000000".to_string(),
            token_decimals: 6,
            token_short_name: "USDC".to_string(),
            time: "2023-06-01T12:00:00Z".to_string(),
            application: "none".to_string(),
            swap_in: false,
        };

        let json = serde_json::to_value(&action).expect("serializes");
        assert_eq!(json["type"], "send");
        assert_eq!(json["log_index"], 7);
        assert!(action.involves("0xabc"));
        assert!(action.involves("0xDEF"));
        assert!(!action.involves("0x123"));
    }

    #[test]
    fn test_lootbox_source_wire_names() {
        let json = serde_json::to_string(&LootboxSource::Leaderboard).expect("serializes");
        assert_eq!(json, "\"leaderboard\"");
    }
}
