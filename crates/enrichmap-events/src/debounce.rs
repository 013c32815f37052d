//! Timers that coalesce bursts of events.
//!
//! Both types are driven by an explicit `now` so callers decide what a tick is;
//! nothing here spawns threads or sleeps.

use std::time::{Duration, Instant};

/// Collects items until no new item arrived for `window`, then releases them as one batch.
#[derive(Debug, Clone)]
pub struct Debounce<T> {
    window: Duration,
    pending: Vec<T>,
    last_at: Option<Instant>,
}

impl<T> Debounce<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Vec::new(),
            last_at: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn push(&mut self, item: T, now: Instant) {
        self.pending.push(item);
        self.last_at = Some(now);
    }

    pub fn extend<I: IntoIterator<Item = T>>(&mut self, items: I, now: Instant) {
        self.pending.extend(items);
        self.last_at = Some(now);
    }

    /// Restart the quiet window without adding anything.
    pub fn touch(&mut self, now: Instant) {
        self.last_at = Some(now);
    }

    pub fn is_armed(&self) -> bool {
        self.last_at.is_some()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Releases the batch once the quiet window has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<Vec<T>> {
        let last = self.last_at?;
        if now.saturating_duration_since(last) >= self.window {
            self.last_at = None;
            Some(std::mem::take(&mut self.pending))
        } else {
            None
        }
    }

    /// Releases the batch regardless of the window.
    pub fn flush(&mut self) -> Option<Vec<T>> {
        self.last_at.take()?;
        Some(std::mem::take(&mut self.pending))
    }

    pub fn cancel(&mut self) {
        self.last_at = None;
        self.pending.clear();
    }
}

/// Rate limiter: at most one run per `interval`, with a trailing run for requests
/// that arrived inside the window.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_run: Option<Instant>,
    pending: bool,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: None,
            pending: false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Returns true when the caller may run immediately; otherwise the request is
    /// remembered and reported by [`Throttle::poll`] later.
    pub fn request(&mut self, now: Instant) -> bool {
        if self.ready(now) {
            self.last_run = Some(now);
            self.pending = false;
            true
        } else {
            self.pending = true;
            false
        }
    }

    /// Returns true when a deferred request is due.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.pending && self.ready(now) {
            self.last_run = Some(now);
            self.pending = false;
            true
        } else {
            false
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    fn ready(&self, now: Instant) -> bool {
        self.last_run
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval)
    }
}
