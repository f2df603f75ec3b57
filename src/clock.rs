//! Time sources for server-assigned timestamps

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

/// Source of the current time
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch
    fn now_millis(&self) -> i64;

    /// Current time as an RFC 3339 string with millisecond precision
    fn now_rfc3339(&self) -> String {
        let dt = Utc
            .timestamp_millis_opt(self.now_millis())
            .single()
            .unwrap_or_else(Utc::now);
        format_rfc3339(dt)
    }
}

pub(crate) fn format_rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Wall clock backed by `chrono::Utc`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Wraps a clock so that `now_millis` never goes backwards within a process.
///
/// Wall clocks can step back (NTP adjustments); readings below the
/// high-water mark are clamped up to it.
pub struct MonotonicClock<C = SystemClock> {
    inner: C,
    high_water: AtomicI64,
}

impl MonotonicClock<SystemClock> {
    pub fn system() -> Self {
        Self::new(SystemClock)
    }
}

impl<C: Clock> MonotonicClock<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            high_water: AtomicI64::new(i64::MIN),
        }
    }
}

impl<C: Clock> Clock for MonotonicClock<C> {
    fn now_millis(&self) -> i64 {
        let now = self.inner.now_millis();
        let previous = self.high_water.fetch_max(now, Ordering::SeqCst);
        now.max(previous)
    }
}

/// Clock pinned to a settable instant
#[derive(Debug, Default)]
pub struct FixedClock {
    millis: AtomicI64,
}

impl FixedClock {
    pub fn new(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
        }
    }

    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now_millis(&self) -> i64 {
        (**self).now_millis()
    }

    fn now_rfc3339(&self) -> String {
        (**self).now_rfc3339()
    }
}
