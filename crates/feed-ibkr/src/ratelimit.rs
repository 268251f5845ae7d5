//! Sliding-window rate limiting for gateway requests.
//!
//! The gateway enforces several pacing rules at once; violating any of them
//! gets requests rejected upstream, so this limiter delays callers locally
//! until every rule admits the request. It never rejects.
//!
//! All checks run under a single mutex so they are serialized, but a caller
//! that has to wait sleeps with the mutex released and re-checks afterwards.

use std::collections::{HashMap, VecDeque};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::protocol::RequestKind;

const GENERAL_WINDOW: Duration = Duration::from_secs(1);
const GENERAL_CAP: usize = 50;

const HISTORICAL_WINDOW: Duration = Duration::from_secs(2);
const HISTORICAL_CAP: usize = 5;

const ROLLING_WINDOW: Duration = Duration::from_secs(600);
const ROLLING_CAP: usize = 59;

const DEDUP_WINDOW: Duration = Duration::from_secs(15);

/// Deterministic fingerprint of a request, used for deduplication.
///
/// Two fingerprints are equal iff their generating kind and parameters are
/// equal; parameter order does not matter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Computes the fingerprint of a request.
    #[must_use]
    pub fn new(kind: RequestKind, params: &[(&str, &str)]) -> Self {
        let mut pairs: Vec<(&str, &str)> = params.to_vec();
        pairs.sort_unstable();

        let mut hasher = DefaultHasher::new();
        kind.label().hash(&mut hasher);
        for (k, v) in pairs {
            k.hash(&mut hasher);
            v.hash(&mut hasher);
        }
        Self(hasher.finish())
    }
}

#[derive(Debug, Default)]
struct Windows {
    general: VecDeque<Instant>,
    historical: VecDeque<Instant>,
    rolling: VecDeque<Instant>,
    dedup: HashMap<Fingerprint, Instant>,
}

impl Windows {
    fn evict(&mut self, now: Instant) {
        Self::evict_window(&mut self.general, now, GENERAL_WINDOW);
        Self::evict_window(&mut self.historical, now, HISTORICAL_WINDOW);
        Self::evict_window(&mut self.rolling, now, ROLLING_WINDOW);
    }

    fn evict_window(window: &mut VecDeque<Instant>, now: Instant, span: Duration) {
        while let Some(&front) = window.front() {
            if now.duration_since(front) >= span {
                window.pop_front();
            } else {
                break;
            }
        }
    }

    /// How long the caller must wait before the request can be admitted, or
    /// `None` if every constraint passes right now.
    fn required_wait(&self, kind: RequestKind, fingerprint: Fingerprint, now: Instant) -> Option<Duration> {
        if let Some(&seen) = self.dedup.get(&fingerprint) {
            let elapsed = now.duration_since(seen);
            if elapsed < DEDUP_WINDOW {
                return Some(DEDUP_WINDOW - elapsed);
            }
        }

        if self.general.len() >= GENERAL_CAP {
            return Some(Self::window_wait(&self.general, now, GENERAL_WINDOW));
        }

        if kind == RequestKind::Historical && self.historical.len() >= HISTORICAL_CAP {
            return Some(Self::window_wait(&self.historical, now, HISTORICAL_WINDOW));
        }

        if self.rolling.len() >= ROLLING_CAP {
            return Some(Self::window_wait(&self.rolling, now, ROLLING_WINDOW));
        }

        None
    }

    fn window_wait(window: &VecDeque<Instant>, now: Instant, span: Duration) -> Duration {
        window
            .front()
            .map(|&front| span.saturating_sub(now.duration_since(front)))
            .unwrap_or_default()
    }

    fn record(&mut self, kind: RequestKind, fingerprint: Fingerprint, now: Instant) {
        self.general.push_back(now);
        self.rolling.push_back(now);
        if kind == RequestKind::Historical {
            self.historical.push_back(now);
        }

        self.dedup.insert(fingerprint, now);
        self.dedup
            .retain(|_, &mut seen| now.duration_since(seen) <= DEDUP_WINDOW);
    }
}

/// Multi-tier sliding-window rate limiter for one gateway session.
///
/// Enforced together, all under one lock:
///
/// - at most 50 accepted requests in any trailing 1-second window
/// - at most 5 accepted historical requests in any trailing 2-second window
/// - at most 59 accepted requests in any trailing 600-second window
/// - an identical fingerprint within 15 seconds waits out the remainder of
///   that window, then counts as a fresh accepted request
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: Mutex<Windows>,
}

impl RateLimiter {
    /// Creates a limiter with empty windows.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspends the caller until every constraint admits the request, then
    /// atomically records it. This never fails and never rejects.
    pub async fn acquire(&self, kind: RequestKind, params: &[(&str, &str)]) {
        let fingerprint = Fingerprint::new(kind, params);

        loop {
            let wait = {
                let mut windows = self.windows.lock().await;
                let now = Instant::now();
                windows.evict(now);
                match windows.required_wait(kind, fingerprint, now) {
                    None => {
                        windows.record(kind, fingerprint, now);
                        return;
                    }
                    Some(wait) => wait,
                }
            };

            debug!(
                kind = kind.label(),
                wait_ms = wait.as_millis() as u64,
                "rate limit reached, waiting"
            );
            sleep(wait).await;
        }
    }
}
