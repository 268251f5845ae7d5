//! Gateway session lifecycle and inbound message dispatch.
//!
//! A session moves through `Disconnected -> Connecting -> AwaitingHandshake
//! -> Ready`, and any state collapses back to `Disconnected` on a transport
//! error, an explicit disconnect, or a fatal protocol code. Each connect
//! attempt generates a fresh client id so a stale prior session can never
//! collide with the new one.
//!
//! Inbound traffic is consumed by one spawned dispatch task per session,
//! which routes [`GatewayMessage`] values to the [`RequestCorrelator`] or to
//! connection-state handling.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use feed_core::{FeedError, Result};

use crate::correlator::RequestCorrelator;
use crate::protocol::{self, GatewayMessage, GatewayRequest, ResponseBody};

/// Connection lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session.
    Disconnected,
    /// Transport open in progress.
    Connecting,
    /// Link is up, waiting for handshake confirmation.
    AwaitingHandshake,
    /// Session confirmed (or promoted) and serving requests.
    Ready,
}

/// Tunables for session establishment.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// How long to wait for handshake confirmation before the grace path is
    /// considered.
    pub handshake_grace: Duration,
    /// Whether a stable but silent link is promoted to `Ready` once the
    /// grace period elapses. Promotions are counted and logged; the
    /// handshake-less path is a gateway quirk, not a protocol guarantee.
    pub promote_without_handshake: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            handshake_grace: Duration::from_secs(5),
            promote_without_handshake: true,
        }
    }
}

/// Transport contract for reaching the gateway.
///
/// The wire protocol is owned by whatever implements this; the session layer
/// only sees enum-tagged messages.
#[async_trait]
pub trait GatewayTransport: Send + Sync + std::fmt::Debug {
    /// Opens a link to the gateway for the given session client id.
    async fn open(&self, host: &str, port: u16, client_id: i64) -> Result<TransportLink>;
}

/// Channel pair produced by a successful transport open.
#[derive(Debug)]
pub struct TransportLink {
    /// Outbound requests into the transport.
    pub requests: mpsc::Sender<GatewayRequest>,
    /// Inbound protocol messages produced by the transport.
    pub messages: mpsc::Receiver<GatewayMessage>,
}

#[derive(Debug)]
struct Session {
    client_id: i64,
    requests: mpsc::Sender<GatewayRequest>,
    dispatch: JoinHandle<()>,
}

/// One stateful session to the brokerage gateway.
#[derive(Debug)]
pub struct GatewayConnection {
    host: String,
    port: u16,
    config: GatewayConfig,
    transport: Arc<dyn GatewayTransport>,
    correlator: Arc<RequestCorrelator>,
    session: Mutex<Option<Session>>,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    next_order_id: Arc<AtomicI64>,
    unconfirmed_promotions: AtomicU64,
}

static CLIENT_ID_SEQ: AtomicI64 = AtomicI64::new(0);

/// Generates a session client id from timestamp digits and entropy, so ids
/// are never reused across sessions. The trailing sequence keeps consecutive
/// ids distinct within one process.
fn next_client_id() -> i64 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    let salt: i64 = rand::thread_rng().gen_range(100..1000);
    let seq = CLIENT_ID_SEQ.fetch_add(1, Ordering::Relaxed) % 1_000;
    (secs % 10_000) * 1_000_000 + salt * 1_000 + seq
}

impl GatewayConnection {
    /// Creates a connection manager; no session is opened until
    /// [`connect`](Self::connect).
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        transport: Arc<dyn GatewayTransport>,
        config: GatewayConfig,
        correlator: Arc<RequestCorrelator>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            host: host.into(),
            port,
            config,
            transport,
            correlator,
            session: Mutex::new(None),
            state_tx,
            state_rx,
            next_order_id: Arc::new(AtomicI64::new(-1)),
            unconfirmed_promotions: AtomicU64::new(0),
        }
    }

    /// Opens a session, waiting up to `timeout` for it to become ready.
    ///
    /// Returns `Ok(true)` once the session is `Ready` (confirmed handshake,
    /// or grace-period promotion when configured), `Ok(false)` when the
    /// gateway never became ready within `timeout`, and
    /// [`FeedError::ConnectionFailure`] when the transport could not be
    /// opened at all.
    pub async fn connect(&self, timeout: Duration) -> Result<bool> {
        if self.is_connected() {
            return Ok(true);
        }
        self.disconnect().await;

        let client_id = next_client_id();
        self.state_tx.send_replace(ConnectionState::Connecting);
        info!(host = %self.host, port = self.port, client_id, "connecting to gateway");

        let link = match self.transport.open(&self.host, self.port, client_id).await {
            Ok(link) => link,
            Err(e) => {
                self.state_tx.send_replace(ConnectionState::Disconnected);
                return Err(FeedError::ConnectionFailure(e.to_string()));
            }
        };

        // State must read AwaitingHandshake before the dispatch task can
        // observe (and confirm) the handshake.
        self.state_tx.send_replace(ConnectionState::AwaitingHandshake);
        let dispatch = tokio::spawn(dispatch_loop(
            link.messages,
            Arc::clone(&self.correlator),
            self.state_tx.clone(),
            Arc::clone(&self.next_order_id),
        ));
        *self.session.lock().await = Some(Session {
            client_id,
            requests: link.requests,
            dispatch,
        });

        let mut state_rx = self.state_rx.clone();
        let grace = self.config.handshake_grace.min(timeout);
        let settled = tokio::time::timeout(
            grace,
            state_rx.wait_for(|s| {
                matches!(s, ConnectionState::Ready | ConnectionState::Disconnected)
            }),
        )
        .await
        .map(|inner| inner.map(|_| ()));

        if settled.is_err() {
            // Grace elapsed without a handshake on a link that is still up.
            if self.config.promote_without_handshake && !self.dispatch_finished().await {
                warn!(
                    client_id,
                    "no handshake confirmation from gateway, promoting session after grace period"
                );
                self.unconfirmed_promotions.fetch_add(1, Ordering::Relaxed);
                self.state_tx.send_replace(ConnectionState::Ready);
            } else if timeout > grace {
                let _ = tokio::time::timeout(
                    timeout - grace,
                    state_rx.wait_for(|s| {
                        matches!(s, ConnectionState::Ready | ConnectionState::Disconnected)
                    }),
                )
                .await;
            }
        }

        if self.is_connected() {
            info!(client_id, "connected to gateway");
            Ok(true)
        } else {
            error!(client_id, "connection timeout, gateway may not be running");
            self.disconnect().await;
            Ok(false)
        }
    }

    /// Tears down the current session, aborting every pending request.
    /// Idempotent.
    pub async fn disconnect(&self) {
        let taken = self.session.lock().await.take();
        if let Some(session) = taken {
            session.dispatch.abort();
            self.correlator.abort_all();
            self.next_order_id.store(-1, Ordering::Relaxed);
            debug!(client_id = session.client_id, "gateway session torn down");
        }
        if *self.state_rx.borrow() != ConnectionState::Disconnected {
            self.state_tx.send_replace(ConnectionState::Disconnected);
        }
    }

    /// Whether the session is `Ready`.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.state_rx.borrow() == ConnectionState::Ready
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch handle over lifecycle state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Client id of the current session, if one is open.
    pub async fn client_id(&self) -> Option<i64> {
        self.session.lock().await.as_ref().map(|s| s.client_id)
    }

    /// How many times a session was promoted to `Ready` without handshake
    /// confirmation. Telemetry for the grace-period quirk.
    #[must_use]
    pub fn unconfirmed_promotions(&self) -> u64 {
        self.unconfirmed_promotions.load(Ordering::Relaxed)
    }

    /// Sends a request over the current session.
    pub async fn send(&self, request: GatewayRequest) -> Result<()> {
        let sender = self
            .session
            .lock()
            .await
            .as_ref()
            .map(|s| s.requests.clone())
            .ok_or_else(|| FeedError::ConnectionFailure("not connected to gateway".to_string()))?;

        sender
            .send(request)
            .await
            .map_err(|_| FeedError::ConnectionFailure("gateway link dropped".to_string()))
    }

    async fn dispatch_finished(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.dispatch.is_finished())
            .unwrap_or(true)
    }
}

/// Routes inbound messages until the stream ends or a fatal code arrives,
/// then collapses the session.
async fn dispatch_loop(
    mut messages: mpsc::Receiver<GatewayMessage>,
    correlator: Arc<RequestCorrelator>,
    state: watch::Sender<ConnectionState>,
    next_order_id: Arc<AtomicI64>,
) {
    while let Some(message) = messages.recv().await {
        match message {
            GatewayMessage::HandshakeAck { next_valid_id } => {
                next_order_id.store(next_valid_id, Ordering::Relaxed);
                info!(next_valid_id, "gateway handshake confirmed");
                state.send_replace(ConnectionState::Ready);
            }
            GatewayMessage::Bar { request_id, bar } => correlator.append_bar(request_id, bar),
            GatewayMessage::SeriesEnd { request_id } => correlator.finish_stream(request_id),
            GatewayMessage::ScannerEntry { request_id, row } => {
                correlator.append_scanner_row(request_id, row);
            }
            GatewayMessage::ScannerEnd { request_id } => correlator.finish_stream(request_id),
            GatewayMessage::ContractInfo { request_id, details } => {
                correlator.resolve(request_id, ResponseBody::Contract(details));
            }
            GatewayMessage::NewsArticle { request_id, text } => {
                correlator.resolve(request_id, ResponseBody::News(text));
            }
            GatewayMessage::Status {
                request_id,
                code,
                message,
            } => {
                if handle_status(request_id, code, &message, &correlator) {
                    break;
                }
            }
            GatewayMessage::Closed => {
                info!("connection closed by gateway");
                break;
            }
        }
    }

    state.send_replace(ConnectionState::Disconnected);
    correlator.abort_all();
}

/// Returns true when the code is fatal and the session must collapse.
fn handle_status(request_id: i64, code: i32, message: &str, correlator: &RequestCorrelator) -> bool {
    if protocol::is_informational(code) {
        info!(code, message, "gateway status notice");
        false
    } else if protocol::is_chatter(code) {
        debug!(code, message, "gateway chatter");
        false
    } else if code == protocol::CODE_SUBSCRIPTION_REQUIRED {
        warn!(request_id, code, message, "market data subscription required");
        if request_id > 0 {
            correlator.fail(
                request_id,
                FeedError::SubscriptionRequired(message.to_string()),
            );
        }
        false
    } else if protocol::is_fatal(code) {
        error!(code, message, "fatal gateway error, tearing session down");
        true
    } else {
        error!(request_id, code, message, "gateway error");
        false
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::ScriptedTransport;
    use super::*;

    fn connection(transport: ScriptedTransport, config: GatewayConfig) -> GatewayConnection {
        GatewayConnection::new(
            "127.0.0.1",
            4002,
            Arc::new(transport),
            config,
            Arc::new(RequestCorrelator::new()),
        )
    }

    #[tokio::test]
    async fn handshake_confirms_the_session() {
        let conn = connection(ScriptedTransport::confirming(0), GatewayConfig::default());

        assert!(conn.connect(Duration::from_secs(10)).await.unwrap());
        assert!(conn.is_connected());
        assert_eq!(conn.state(), ConnectionState::Ready);
        assert_eq!(conn.unconfirmed_promotions(), 0);
    }

    #[tokio::test]
    async fn consecutive_connects_use_distinct_client_ids() {
        let transport = Arc::new(ScriptedTransport::confirming(0));
        let conn = GatewayConnection::new(
            "127.0.0.1",
            4002,
            Arc::clone(&transport) as Arc<dyn GatewayTransport>,
            GatewayConfig::default(),
            Arc::new(RequestCorrelator::new()),
        );

        assert!(conn.connect(Duration::from_secs(10)).await.unwrap());
        conn.disconnect().await;
        assert!(conn.connect(Duration::from_secs(10)).await.unwrap());

        let ids = transport.opened_client_ids.lock().unwrap().clone();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_link_is_promoted_after_the_grace_period() {
        let transport = ScriptedTransport {
            handshake: false,
            ..ScriptedTransport::default()
        };
        let conn = connection(transport, GatewayConfig::default());

        assert!(conn.connect(Duration::from_secs(10)).await.unwrap());
        assert!(conn.is_connected());
        assert_eq!(conn.unconfirmed_promotions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_link_without_promotion_times_out() {
        let transport = ScriptedTransport {
            handshake: false,
            ..ScriptedTransport::default()
        };
        let config = GatewayConfig {
            promote_without_handshake: false,
            ..GatewayConfig::default()
        };
        let conn = connection(transport, config);

        assert!(!conn.connect(Duration::from_secs(10)).await.unwrap());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn fatal_code_collapses_the_session() {
        let transport = ScriptedTransport {
            handshake: true,
            preamble: vec![GatewayMessage::Status {
                request_id: -1,
                code: protocol::CODE_CLIENT_ID_IN_USE,
                message: "client id is already in use".to_string(),
            }],
            ..ScriptedTransport::default()
        };
        let conn = connection(transport, GatewayConfig::default());

        let _ = conn.connect(Duration::from_secs(10)).await.unwrap();

        let mut state_rx = conn.watch_state();
        tokio::time::timeout(
            Duration::from_secs(1),
            state_rx.wait_for(|s| *s == ConnectionState::Disconnected),
        )
        .await
        .expect("session should collapse on a fatal code")
        .unwrap();
    }

    #[tokio::test]
    async fn informational_codes_never_change_state() {
        let transport = ScriptedTransport {
            handshake: true,
            preamble: vec![
                GatewayMessage::Status {
                    request_id: -1,
                    code: 2104,
                    message: "market data farm connection is OK".to_string(),
                },
                GatewayMessage::Status {
                    request_id: -1,
                    code: 2158,
                    message: "sec-def data farm connection is OK".to_string(),
                },
            ],
            ..ScriptedTransport::default()
        };
        let conn = connection(transport, GatewayConfig::default());

        assert!(conn.connect(Duration::from_secs(10)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(conn.is_connected());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let conn = connection(ScriptedTransport::confirming(0), GatewayConfig::default());
        assert!(conn.connect(Duration::from_secs(10)).await.unwrap());

        conn.disconnect().await;
        conn.disconnect().await;
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.client_id().await.is_none());
    }
}
