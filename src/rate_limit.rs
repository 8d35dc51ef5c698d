//! Login Attempt Limiter
//!
//! Sliding-window throttling of failed sign-ins, keyed independently by client IP
//! (`ip:<address>`) and by account e-mail (`email:<address>`). A key that reaches the
//! failure threshold inside the window is locked out for a fixed duration.
//!
//! | Setting | Default |
//! |---|---|
//! | `max_attempts` | 5 failures |
//! | `window` | 15 min |
//! | `block_duration` | 30 min |
//! | history retention (sweep) | 24 h |
//!
//! State lives in process memory only and is lost on restart. With several server
//! instances each one counts separately, so the limit is approximate; a shared counter
//! store would have to provide the same check / record / cleanup surface.

use axum::http::HeaderMap;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicI64, Ordering},
    },
    time::Duration,
};
use tokio::{task::JoinHandle, time::MissedTickBehavior};

/// How long attempt records survive the periodic sweep.
pub const ATTEMPT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Client address used when no proxy header identifies the caller.
pub const UNKNOWN_CLIENT_IP: &str = "unknown";

// --- Configuration & Results ---

/// RateLimitConfig
///
/// Throttling parameters. The application default comes from `AppConfig`, but every
/// call site passes its own copy and may override it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_attempts: u32,
    pub window: Duration,
    pub block_duration: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(15 * 60),
            block_duration: Duration::from_secs(30 * 60),
        }
    }
}

impl RateLimitConfig {
    fn window_ms(&self) -> i64 {
        duration_ms(self.window)
    }

    fn block_ms(&self) -> i64 {
        duration_ms(self.block_duration)
    }
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// RateLimitStatus
///
/// Answer of [`LoginAttemptLimiter::is_rate_limited`]. `reset_time_ms` is a Unix
/// timestamp in milliseconds and is only set while limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limited: bool,
    pub remaining_attempts: u32,
    pub reset_time_ms: Option<i64>,
}

impl RateLimitStatus {
    fn limited(reset_time_ms: i64) -> Self {
        Self {
            limited: true,
            remaining_attempts: 0,
            reset_time_ms: Some(reset_time_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAttempt {
    pub timestamp_ms: i64,
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lockout {
    pub blocked_until_ms: i64,
}

/// What a sweep removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CleanupReport {
    pub expired_lockouts: usize,
    pub pruned_attempts: usize,
    pub removed_histories: usize,
}

impl CleanupReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// --- Time Source ---

/// Clock
///
/// Millisecond wall clock, injectable so lockout expiry can be driven by tests.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// ManualClock
///
/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms.fetch_add(duration_ms(by), Ordering::SeqCst);
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

// --- Limiter ---

#[derive(Default)]
struct LimiterState {
    attempts: HashMap<String, Vec<LoginAttempt>>,
    lockouts: HashMap<String, Lockout>,
}

impl LimiterState {
    fn failures_since(&self, key: &str, window_start_ms: i64) -> u32 {
        self.attempts.get(key).map_or(0, |history| {
            let failed = history
                .iter()
                .filter(|a| !a.success && a.timestamp_ms > window_start_ms)
                .count();
            u32::try_from(failed).unwrap_or(u32::MAX)
        })
    }
}

pub fn ip_key(ip: &str) -> String {
    format!("ip:{}", ip.trim())
}

pub fn email_key(email: &str) -> String {
    format!("email:{}", email.trim().to_lowercase())
}

/// LoginAttemptLimiter
///
/// Both keyspaces and the lockout map sit behind one mutex, and the sweep takes the same
/// lock, so it is safe to run alongside live checks.
///
/// Checking and recording are separate calls. Two concurrent attempts against the same
/// key can both pass [`is_rate_limited`](Self::is_rate_limited) before either one is
/// recorded; the limiter can under-block by that margin but never over-blocks.
pub struct LoginAttemptLimiter {
    state: Mutex<LimiterState>,
    clock: Arc<dyn Clock>,
}

impl Default for LoginAttemptLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginAttemptLimiter {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(LimiterState::default()),
            clock,
        }
    }

    // A panic while holding the lock leaves the maps consistent, so keep using them.
    fn state(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// is_rate_limited
    ///
    /// Must be called before the credentials are checked. An active lockout on either key
    /// wins; otherwise the failures inside the window are counted per key. When a key has
    /// reached the threshold but no lockout is stored yet, the returned reset time is where
    /// the lockout *would* end; recording the attempt is what persists it.
    pub fn is_rate_limited(
        &self,
        ip: &str,
        email: Option<&str>,
        config: &RateLimitConfig,
    ) -> RateLimitStatus {
        let now = self.clock.now_ms();
        let keys: Vec<String> = std::iter::once(ip_key(ip))
            .chain(email.map(email_key))
            .collect();
        let state = self.state();

        let active_until = keys
            .iter()
            .filter_map(|key| state.lockouts.get(key))
            .map(|lockout| lockout.blocked_until_ms)
            .filter(|&until| now < until)
            .max();
        if let Some(until) = active_until {
            return RateLimitStatus::limited(until);
        }

        let window_start = now - config.window_ms();
        let max = config.max_attempts;
        let failures: Vec<u32> = keys
            .iter()
            .map(|key| state.failures_since(key, window_start))
            .collect();

        if failures.iter().any(|&failed| failed >= max) {
            return RateLimitStatus::limited(now + config.block_ms());
        }

        RateLimitStatus {
            limited: false,
            remaining_attempts: failures
                .iter()
                .map(|&failed| max - failed)
                .min()
                .unwrap_or(max),
            reset_time_ms: None,
        }
    }

    /// record_login_attempt
    ///
    /// Must be called after every credential check. Appends the attempt under both keys,
    /// drops records that fell out of the window, and locks out any key whose failure
    /// count reached the threshold.
    ///
    /// A success lifts the lockout and clears the history of the e-mail key only; an IP
    /// lockout stays until it expires.
    pub fn record_login_attempt(
        &self,
        ip: &str,
        email: &str,
        success: bool,
        config: &RateLimitConfig,
    ) {
        let now = self.clock.now_ms();
        let window_start = now - config.window_ms();
        let keys = [ip_key(ip), email_key(email)];
        let mut guard = self.state();
        let state = &mut *guard;

        for key in &keys {
            let history = state.attempts.entry(key.clone()).or_default();
            history.push(LoginAttempt {
                timestamp_ms: now,
                success,
            });
            history.retain(|attempt| attempt.timestamp_ms > window_start);
        }

        if success {
            let email = &keys[1];
            state.attempts.remove(email);
            if state.lockouts.remove(email).is_some() {
                tracing::info!(key = %email, "lockout lifted by successful login");
            }
            return;
        }

        for key in &keys {
            let failed = state.failures_since(key, window_start);
            if failed >= config.max_attempts {
                let blocked_until_ms = now + config.block_ms();
                state
                    .lockouts
                    .insert(key.clone(), Lockout { blocked_until_ms });
                tracing::warn!(key = %key, failed, blocked_until_ms, "login key locked out");
            }
        }
    }

    /// cleanup
    ///
    /// Periodic sweep: drops lockouts that have ended (`blocked_until <= now`), attempt
    /// records older than [`ATTEMPT_RETENTION`], and histories left empty.
    pub fn cleanup(&self) -> CleanupReport {
        let now = self.clock.now_ms();
        let retention = duration_ms(ATTEMPT_RETENTION);
        let mut report = CleanupReport::default();
        let mut guard = self.state();
        let state = &mut *guard;

        let lockouts_before = state.lockouts.len();
        state.lockouts.retain(|_, lockout| lockout.blocked_until_ms > now);
        report.expired_lockouts = lockouts_before - state.lockouts.len();

        for history in state.attempts.values_mut() {
            let before = history.len();
            history.retain(|attempt| now - attempt.timestamp_ms <= retention);
            report.pruned_attempts += before - history.len();
        }

        let histories_before = state.attempts.len();
        state.attempts.retain(|_, history| !history.is_empty());
        report.removed_histories = histories_before - state.attempts.len();

        report
    }

    /// Snapshot of a key's attempt history, oldest first.
    pub fn history(&self, key: &str) -> Vec<LoginAttempt> {
        self.state().attempts.get(key).cloned().unwrap_or_default()
    }

    /// The stored lockout for a key, expired or not.
    pub fn lockout(&self, key: &str) -> Option<Lockout> {
        self.state().lockouts.get(key).copied()
    }
}

/// spawn_cleanup_task
///
/// Runs [`LoginAttemptLimiter::cleanup`] on a fixed interval, independent of request
/// traffic. The first sweep happens one full interval after start.
pub fn spawn_cleanup_task(limiter: Arc<LoginAttemptLimiter>, every: Duration) -> JoinHandle<()> {
    let every = every.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let report = limiter.cleanup();
            if !report.is_empty() {
                tracing::debug!(
                    expired_lockouts = report.expired_lockouts,
                    pruned_attempts = report.pruned_attempts,
                    removed_histories = report.removed_histories,
                    "login attempt sweep"
                );
            }
        }
    })
}

/// client_ip
///
/// The caller's address as reported by the reverse proxy: the first `x-forwarded-for`
/// entry, then `x-real-ip`, else [`UNKNOWN_CLIENT_IP`]. Every caller without proxy
/// headers shares that one key.
pub fn client_ip(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    header("x-forwarded-for")
        .and_then(|forwarded| forwarded.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| header("x-real-ip"))
        .unwrap_or(UNKNOWN_CLIENT_IP)
        .to_string()
}
