//! Request correlation between callers and the gateway dispatch loop.
//!
//! Every outbound request gets a strictly increasing id and a
//! [`PendingTicket`]. The dispatch loop feeds inbound messages into the
//! matching pending slot: streaming kinds (bars, scanner rows) accumulate
//! until an end-of-stream message, single-shot kinds resolve on the first
//! payload. Callers redeem their ticket with [`RequestCorrelator::await_response`],
//! which enforces the per-kind deadline.
//!
//! This layer never retries; a timed-out request is discarded locally and
//! any late data for its id is dropped on arrival.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use feed_core::{FeedError, Result, ScannerRow};

use crate::protocol::{RawBar, RequestKind, ResponseBody};

const FIRST_REQUEST_ID: i64 = 1_000;

#[derive(Debug)]
enum StreamBuffer {
    Bars(Vec<RawBar>),
    Rows(Vec<ScannerRow>),
    Single,
}

#[derive(Debug)]
struct Pending {
    kind: RequestKind,
    buffer: StreamBuffer,
    tx: oneshot::Sender<Result<ResponseBody>>,
    created_at: Instant,
}

/// Handle returned by [`RequestCorrelator::register`]; redeemed exactly once
/// by [`RequestCorrelator::await_response`].
#[derive(Debug)]
pub struct PendingTicket {
    id: i64,
    kind: RequestKind,
    rx: oneshot::Receiver<Result<ResponseBody>>,
}

impl PendingTicket {
    /// Correlation id to attach to the outbound request.
    #[must_use]
    pub const fn request_id(&self) -> i64 {
        self.id
    }
}

/// Matches asynchronous inbound responses to the call that issued them.
#[derive(Debug)]
pub struct RequestCorrelator {
    next_id: AtomicI64,
    pending: Mutex<HashMap<i64, Pending>>,
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestCorrelator {
    /// Creates a correlator with no outstanding requests.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(FIRST_REQUEST_ID),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Allocates an id and a pending slot for a new outbound request.
    pub fn register(&self, kind: RequestKind) -> PendingTicket {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        let buffer = match kind {
            RequestKind::Historical | RequestKind::General => StreamBuffer::Bars(Vec::new()),
            RequestKind::Scanner => StreamBuffer::Rows(Vec::new()),
            RequestKind::ContractDetails | RequestKind::News => StreamBuffer::Single,
        };

        self.lock().insert(
            id,
            Pending {
                kind,
                buffer,
                tx,
                created_at: Instant::now(),
            },
        );

        PendingTicket { id, kind, rx }
    }

    /// Blocks the calling task until the request resolves or its per-kind
    /// deadline elapses.
    ///
    /// On timeout the pending slot is discarded and
    /// [`FeedError::RequestTimeout`] is returned; retrying is the
    /// orchestrator's business, not this layer's.
    pub async fn await_response(&self, ticket: PendingTicket) -> Result<ResponseBody> {
        let deadline = ticket.kind.response_timeout();

        match tokio::time::timeout(deadline, ticket.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_closed)) => Err(FeedError::ConnectionFailure(
                "gateway session closed while request was pending".to_string(),
            )),
            Err(_elapsed) => {
                self.discard(ticket.id);
                Err(FeedError::RequestTimeout {
                    kind: ticket.kind.label(),
                    request_id: ticket.id,
                    timeout: deadline,
                })
            }
        }
    }

    /// Appends one historical bar to a pending streaming request.
    pub fn append_bar(&self, id: i64, bar: RawBar) {
        let mut pending = self.lock();
        match pending.get_mut(&id) {
            Some(p) => match &mut p.buffer {
                StreamBuffer::Bars(bars) => bars.push(bar),
                _ => warn!(request_id = id, "bar for a non-bar request, dropping"),
            },
            None => debug!(request_id = id, "late bar for unknown request, dropping"),
        }
    }

    /// Appends one scanner row to a pending streaming request.
    pub fn append_scanner_row(&self, id: i64, row: ScannerRow) {
        let mut pending = self.lock();
        match pending.get_mut(&id) {
            Some(p) => match &mut p.buffer {
                StreamBuffer::Rows(rows) => rows.push(row),
                _ => warn!(request_id = id, "scanner row for a non-scanner request, dropping"),
            },
            None => debug!(request_id = id, "late scanner row for unknown request, dropping"),
        }
    }

    /// Resolves a streaming request with everything accumulated so far.
    pub fn finish_stream(&self, id: i64) {
        let Some(p) = self.lock().remove(&id) else {
            debug!(request_id = id, "end-of-stream for unknown request, dropping");
            return;
        };

        let body = match p.buffer {
            StreamBuffer::Bars(bars) => ResponseBody::Bars(bars),
            StreamBuffer::Rows(rows) => ResponseBody::ScannerRows(rows),
            StreamBuffer::Single => ResponseBody::Bars(Vec::new()),
        };
        let _ = p.tx.send(Ok(body));
    }

    /// Resolves a single-shot request with its payload.
    pub fn resolve(&self, id: i64, body: ResponseBody) {
        let Some(p) = self.lock().remove(&id) else {
            debug!(request_id = id, "late response for unknown request, dropping");
            return;
        };
        let _ = p.tx.send(Ok(body));
    }

    /// Resolves a pending request with an error instead of waiting for its
    /// deadline.
    pub fn fail(&self, id: i64, error: FeedError) {
        let Some(p) = self.lock().remove(&id) else {
            debug!(request_id = id, "error for unknown request, dropping");
            return;
        };
        let _ = p.tx.send(Err(error));
    }

    /// Aborts every outstanding request. Called when the session closes.
    pub fn abort_all(&self) {
        let drained: Vec<Pending> = self.lock().drain().map(|(_, p)| p).collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "aborting outstanding requests");
        }
        for p in drained {
            let _ = p.tx.send(Err(FeedError::ConnectionFailure(
                "gateway session closed, request aborted".to_string(),
            )));
        }
    }

    /// Number of requests currently in flight.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.lock().len()
    }

    fn discard(&self, id: i64) {
        if let Some(p) = self.lock().remove(&id) {
            warn!(
                request_id = id,
                kind = p.kind.label(),
                age_ms = p.created_at.elapsed().as_millis() as u64,
                "request timed out, discarding"
            );
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<i64, Pending>> {
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn raw_bar(close: f64) -> RawBar {
        RawBar {
            date: "20240102 14:30:00".to_string(),
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 1_000.0,
            wap: close,
            count: 10,
        }
    }

    #[test]
    fn ids_are_strictly_increasing() {
        let correlator = RequestCorrelator::new();
        let a = correlator.register(RequestKind::Historical);
        let b = correlator.register(RequestKind::Scanner);
        let c = correlator.register(RequestKind::News);
        assert!(a.request_id() < b.request_id());
        assert!(b.request_id() < c.request_id());
    }

    #[tokio::test]
    async fn streaming_request_resolves_on_end_of_stream() {
        let correlator = RequestCorrelator::new();
        let ticket = correlator.register(RequestKind::Historical);
        let id = ticket.request_id();

        correlator.append_bar(id, raw_bar(101.0));
        correlator.append_bar(id, raw_bar(102.0));
        correlator.finish_stream(id);

        match correlator.await_response(ticket).await.unwrap() {
            ResponseBody::Bars(bars) => {
                assert_eq!(bars.len(), 2);
                assert_eq!(bars[1].close, 102.0);
            }
            other => panic!("unexpected body: {other:?}"),
        }
        assert_eq!(correlator.outstanding(), 0);
    }

    #[tokio::test]
    async fn single_shot_request_resolves_on_first_payload() {
        let correlator = RequestCorrelator::new();
        let ticket = correlator.register(RequestKind::News);
        let id = ticket.request_id();

        correlator.resolve(id, ResponseBody::News("article body".to_string()));

        match correlator.await_response(ticket).await.unwrap() {
            ResponseBody::News(text) => assert_eq!(text, "article body"),
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_discards_the_pending_request() {
        let correlator = RequestCorrelator::new();
        let ticket = correlator.register(RequestKind::Historical);
        let id = ticket.request_id();

        let start = Instant::now();
        let err = correlator.await_response(ticket).await.unwrap_err();
        assert!(matches!(err, FeedError::RequestTimeout { .. }));
        assert!(start.elapsed() >= Duration::from_secs(30));

        // Late data for the abandoned id is silently dropped.
        correlator.append_bar(id, raw_bar(100.0));
        correlator.finish_stream(id);
        assert_eq!(correlator.outstanding(), 0);
    }

    #[tokio::test]
    async fn failed_request_resolves_immediately_with_the_error() {
        let correlator = RequestCorrelator::new();
        let ticket = correlator.register(RequestKind::Historical);
        let id = ticket.request_id();

        correlator.fail(
            id,
            FeedError::SubscriptionRequired("delayed data only".to_string()),
        );

        let err = correlator.await_response(ticket).await.unwrap_err();
        assert!(matches!(err, FeedError::SubscriptionRequired(_)));
    }

    #[tokio::test]
    async fn abort_all_resolves_everything_as_connection_failure() {
        let correlator = RequestCorrelator::new();
        let a = correlator.register(RequestKind::Historical);
        let b = correlator.register(RequestKind::Scanner);

        correlator.abort_all();
        assert_eq!(correlator.outstanding(), 0);

        for ticket in [a, b] {
            let err = correlator.await_response(ticket).await.unwrap_err();
            assert!(matches!(err, FeedError::ConnectionFailure(_)));
        }
    }
}
