// Rate Limiting Module using an in-memory sliding window
//
// Each client identity owns the timestamps of its admitted requests inside
// the trailing window. Identities live in a sharded map and every record
// has its own mutex, so checks for different clients never wait on each
// other. Stale timestamps are evicted lazily during each check.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Reference policy: 10 requests per 60 seconds.
pub const DEFAULT_MAX_REQUESTS: u32 = 10;
pub const DEFAULT_WINDOW_SECS: u64 = 60;
pub const DEFAULT_MAX_TRACKED_CLIENTS: usize = 10_000;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
    /// Upper bound on distinct identities kept in memory.
    pub max_tracked_clients: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
            max_tracked_clients: DEFAULT_MAX_TRACKED_CLIENTS,
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

// Per-identity rate limit tracking
#[derive(Debug, Default)]
struct ClientWindow {
    admitted: VecDeque<Instant>,
}

impl ClientWindow {
    fn evict_stale(&mut self, now: Instant, window: Duration) {
        // Timestamps at or before `now - window` have left the window.
        while let Some(&oldest) = self.admitted.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }

    /// Concurrent callers may arrive with slightly older instants than the
    /// newest entry; keep the queue ordered so eviction from the front holds.
    fn record(&mut self, now: Instant) {
        let pos = self.admitted.partition_point(|t| *t <= now);
        self.admitted.insert(pos, now);
    }

    fn last_seen(&self) -> Option<Instant> {
        self.admitted.back().copied()
    }
}

/// Sliding-window limiter keyed by client identity.
pub struct RateLimiter {
    config: RateLimitConfig,
    clients: DashMap<String, Arc<Mutex<ClientWindow>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            clients: DashMap::new(),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Number of identities currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }

    /// Check and, on success, record a request from `client_id` at `now`.
    ///
    /// Denied requests do not consume a slot.
    pub fn admit(&self, client_id: &str, now: Instant) -> RateDecision {
        if self.config.max_requests == 0 {
            return RateDecision::Denied {
                retry_after: self.config.window,
            };
        }

        loop {
            let window = self.client_window(client_id, now);
            if let Some(decision) = self.try_admit(client_id, &window, now) {
                return decision;
            }
            // The record was shed between lookup and lock; start over.
        }
    }

    /// Run the check against `window` under its lock. Returns `None` when
    /// `window` is no longer the record stored for `client_id`.
    fn try_admit(
        &self,
        client_id: &str,
        window: &Arc<Mutex<ClientWindow>>,
        now: Instant,
    ) -> Option<RateDecision> {
        let mut state = window.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let is_current = self
            .clients
            .get(client_id)
            .map_or(false, |entry| Arc::ptr_eq(entry.value(), window));
        if !is_current {
            return None;
        }

        state.evict_stale(now, self.config.window);

        if state.admitted.len() >= self.config.max_requests as usize {
            let oldest = state.admitted.front().copied().unwrap_or(now);
            let exits_at = oldest + self.config.window;
            return Some(RateDecision::Denied {
                retry_after: exits_at.saturating_duration_since(now),
            });
        }

        state.record(now);
        Some(RateDecision::Allowed)
    }

    /// Fetch or create the record for `client_id`. The map shard lock is
    /// released before the caller locks the record itself.
    fn client_window(&self, client_id: &str, now: Instant) -> Arc<Mutex<ClientWindow>> {
        if let Some(existing) = self.clients.get(client_id) {
            return Arc::clone(existing.value());
        }

        if self.clients.len() >= self.config.max_tracked_clients {
            self.shed_clients(now);
        }

        let entry = self
            .clients
            .entry(client_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ClientWindow::default())));
        Arc::clone(entry.value())
    }

    /// Make room for a new identity: drop every client with no timestamp
    /// left in the window, then the least recently admitted ones if the
    /// table is still full.
    fn shed_clients(&self, now: Instant) {
        let window = self.config.window;
        self.clients.retain(|_, record| match record.try_lock() {
            Ok(mut state) => {
                state.evict_stale(now, window);
                !state.admitted.is_empty()
            }
            // Busy records are in active use.
            Err(_) => true,
        });

        let overflow = (self.clients.len() + 1).saturating_sub(self.config.max_tracked_clients);
        if overflow == 0 {
            return;
        }

        let mut by_activity: Vec<(String, Option<Instant>)> = self
            .clients
            .iter()
            .map(|entry| {
                let last_seen = entry
                    .value()
                    .try_lock()
                    .ok()
                    .and_then(|state| state.last_seen());
                (entry.key().clone(), last_seen)
            })
            .collect();
        by_activity.sort_by_key(|(_, last_seen)| *last_seen);

        for (client_id, _) in by_activity.into_iter().take(overflow) {
            self.clients.remove(&client_id);
        }

        tracing::warn!(
            evicted = overflow,
            max_tracked_clients = self.config.max_tracked_clients,
            "Rate limiter client table full; evicted least recently active identities"
        );
    }
}

/// Round a retry delay up to whole seconds, never below one.
pub fn retry_after_seconds(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}
