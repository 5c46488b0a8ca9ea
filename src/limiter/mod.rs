//! Per-host adaptive rate limiting.
//!
//! Each host carries a monotonic `next_permit` timestamp and an adaptive
//! delay bounded by the configured floor and ceiling. Fetch outcomes feed
//! back into the delay: successes shrink it slowly, 429s and server
//! errors grow it multiplicatively, and a robots crawl-delay imposes a
//! hard floor.

use crate::config::PolitenessConfig;
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;

/// Jitter applied around each permit, as a fraction of the current delay.
const JITTER_FRACTION: f64 = 0.15;

/// Backoff multipliers per outcome class.
const SUCCESS_DECAY: f64 = 0.95;
const RATE_LIMIT_GROWTH: f64 = 3.0;
const SERVER_ERROR_GROWTH: f64 = 2.0;

/// Extra growth applied while a host keeps failing.
const REPEAT_ERROR_GROWTH: f64 = 2.0;
const REPEAT_ERROR_THRESHOLD: u32 = 3;

/// EWMA smoothing factor for latency tracking.
const LATENCY_ALPHA: f64 = 0.3;

/// Classified outcome of one fetch, as the limiter sees it.
///
/// Timeouts are reported as `ServerError`; the server may well be
/// struggling, and backing off is the polite response either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 2xx/3xx
    Success { latency: Duration },
    /// 429, with the parsed Retry-After if the server sent one
    RateLimited { retry_after: Option<Duration> },
    /// 5xx, timeouts, connection failures
    ServerError,
    /// Other 4xx
    ClientError,
}

/// Pacing state for a single host.
#[derive(Debug, Clone)]
pub struct HostState {
    pub next_permit: Instant,
    pub current_delay: Duration,
    pub consecutive_errors: u32,
    pub total_errors: u64,
    pub ewma_latency: Option<Duration>,
    crawl_delay_floor: Option<Duration>,
    // A server-mandated Retry-After moment that jitter must not undercut.
    retry_after_until: Option<Instant>,
}

impl HostState {
    fn new(initial_delay: Duration) -> Self {
        Self {
            next_permit: Instant::now(),
            current_delay: initial_delay,
            consecutive_errors: 0,
            total_errors: 0,
            ewma_latency: None,
            crawl_delay_floor: None,
            retry_after_until: None,
        }
    }

    fn floor(&self, min_delay: Duration) -> Duration {
        self.crawl_delay_floor.map_or(min_delay, |d| d.max(min_delay))
    }
}

/// Per-host rate limiter; distinct hosts proceed independently.
pub struct RateLimiter {
    hosts: Mutex<HashMap<String, HostState>>,
    min_delay: Duration,
    max_delay: Duration,
    adaptive: bool,
}

impl RateLimiter {
    pub fn new(politeness: &PolitenessConfig) -> Self {
        Self {
            hosts: Mutex::new(HashMap::new()),
            min_delay: politeness.min_delay(),
            max_delay: politeness.max_delay(),
            adaptive: politeness.adaptive_delay,
        }
    }

    /// Waits until the host's next permit, with ±15% jitter around the
    /// slot. Returns false if shutdown was signalled while waiting.
    ///
    /// The permit slot is claimed before sleeping, so concurrent workers
    /// targeting one host serialise onto successive slots rather than
    /// stampeding when the current one opens.
    pub async fn acquire(&self, host: &str, shutdown: &mut watch::Receiver<bool>) -> bool {
        let target = {
            let mut hosts = self.hosts.lock().await;
            let state = hosts
                .entry(host.to_string())
                .or_insert_with(|| HostState::new(self.min_delay));

            let now = Instant::now();
            let base = state.next_permit.max(now);
            let mut target = apply_jitter(base, now, state.current_delay);
            if let Some(hold) = state.retry_after_until {
                if now >= hold {
                    state.retry_after_until = None;
                } else if target < hold {
                    target = hold;
                }
            }
            state.next_permit = target + state.current_delay;
            target
        };

        if *shutdown.borrow() {
            return false;
        }

        tokio::select! {
            _ = tokio::time::sleep_until(target) => true,
            _ = shutdown.changed() => false,
        }
    }

    /// Feeds a fetch outcome back into the host's pacing state.
    pub async fn report(&self, host: &str, outcome: Outcome) {
        let mut hosts = self.hosts.lock().await;
        let state = hosts
            .entry(host.to_string())
            .or_insert_with(|| HostState::new(self.min_delay));

        match outcome {
            Outcome::Success { latency } => {
                state.consecutive_errors = 0;
                state.ewma_latency = Some(match state.ewma_latency {
                    Some(prev) => prev.mul_f64(1.0 - LATENCY_ALPHA) + latency.mul_f64(LATENCY_ALPHA),
                    None => latency,
                });
                if self.adaptive {
                    state.current_delay = state.current_delay.mul_f64(SUCCESS_DECAY);
                }
            }
            Outcome::RateLimited { retry_after } => {
                state.consecutive_errors += 1;
                state.total_errors += 1;
                if self.adaptive {
                    state.current_delay = state.current_delay.mul_f64(RATE_LIMIT_GROWTH);
                }
                if let Some(wait) = retry_after {
                    let earliest = Instant::now() + wait;
                    if state.next_permit < earliest {
                        state.next_permit = earliest;
                    }
                    state.retry_after_until = Some(earliest);
                }
            }
            Outcome::ServerError => {
                state.consecutive_errors += 1;
                state.total_errors += 1;
                if self.adaptive {
                    state.current_delay = state.current_delay.mul_f64(SERVER_ERROR_GROWTH);
                }
            }
            Outcome::ClientError => {
                state.consecutive_errors += 1;
                state.total_errors += 1;
            }
        }

        if self.adaptive
            && !matches!(outcome, Outcome::Success { .. })
            && state.consecutive_errors >= REPEAT_ERROR_THRESHOLD
        {
            state.current_delay = state.current_delay.mul_f64(REPEAT_ERROR_GROWTH);
        }

        // A robots crawl-delay above max_delay wins: the floor outranks
        // the ceiling.
        let floor = state.floor(self.min_delay);
        state.current_delay = state.current_delay.clamp(floor, self.max_delay.max(floor));

        tracing::trace!(
            host,
            delay_ms = state.current_delay.as_millis() as u64,
            consecutive_errors = state.consecutive_errors,
            "limiter adjusted"
        );
    }

    /// Applies a robots.txt crawl-delay as a hard floor for the host.
    pub async fn set_crawl_delay(&self, host: &str, delay: Duration) {
        let mut hosts = self.hosts.lock().await;
        let state = hosts
            .entry(host.to_string())
            .or_insert_with(|| HostState::new(self.min_delay));
        state.crawl_delay_floor = Some(delay);
        if state.current_delay < delay {
            state.current_delay = delay;
        }
    }

    /// Number of distinct hosts seen so far.
    pub async fn host_count(&self) -> usize {
        self.hosts.lock().await.len()
    }

    /// Snapshot of one host's pacing state, if it exists.
    pub async fn host_state(&self, host: &str) -> Option<HostState> {
        self.hosts.lock().await.get(host).cloned()
    }
}

/// Offsets the permit slot by a random fraction of the current delay in
/// `[-15%, +15%]`, never before `now`.
fn apply_jitter(base: Instant, now: Instant, delay: Duration) -> Instant {
    let fraction: f64 = rand::thread_rng().gen_range(-JITTER_FRACTION..=JITTER_FRACTION);
    let offset = delay.mul_f64(fraction.abs());
    if fraction < 0.0 {
        base.checked_sub(offset).unwrap_or(now).max(now)
    } else {
        base + offset
    }
}
