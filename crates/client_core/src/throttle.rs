//! Leading + trailing edge rate limiter.
//!
//! The throttle never sleeps itself. Callers feed it the current time and
//! wake it at [`Throttle::deadline`]; whatever it returns is what should go
//! out on the wire.

use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_THROTTLE_WINDOW: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq)]
enum ThrottleState<T> {
    Idle,
    Cooldown { until: Instant },
    Pending { until: Instant, payload: T },
}

#[derive(Debug, Clone)]
pub struct Throttle<T> {
    window: Duration,
    state: ThrottleState<T>,
}

impl<T> Throttle<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: ThrottleState::Idle,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Offers a payload. Returns it back when it may be sent right away;
    /// otherwise it replaces whatever was waiting for the current window.
    ///
    /// A window that already ran out is settled first, so the returned value
    /// may be an older pending payload while `payload` waits for the next
    /// window.
    pub fn dispatch(&mut self, payload: T, now: Instant) -> Option<T> {
        if let Some(fired) = self.poll(now) {
            let until = now + self.window;
            self.state = ThrottleState::Pending { until, payload };
            return Some(fired);
        }

        match std::mem::replace(&mut self.state, ThrottleState::Idle) {
            ThrottleState::Idle => {
                self.state = ThrottleState::Cooldown {
                    until: now + self.window,
                };
                Some(payload)
            }
            ThrottleState::Cooldown { until } | ThrottleState::Pending { until, .. } => {
                self.state = ThrottleState::Pending { until, payload };
                None
            }
        }
    }

    /// Settles an expired window: returns the pending payload, if any, and
    /// opens a fresh window for it.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        let expired = match &self.state {
            ThrottleState::Idle => false,
            ThrottleState::Cooldown { until } | ThrottleState::Pending { until, .. } => {
                now >= *until
            }
        };
        if !expired {
            return None;
        }

        match std::mem::replace(&mut self.state, ThrottleState::Idle) {
            ThrottleState::Pending { payload, .. } => {
                self.state = ThrottleState::Cooldown {
                    until: now + self.window,
                };
                Some(payload)
            }
            _ => None,
        }
    }

    /// When the current window ends, if one is open.
    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            ThrottleState::Idle => None,
            ThrottleState::Cooldown { until } | ThrottleState::Pending { until, .. } => {
                Some(*until)
            }
        }
    }

    #[cfg(test)]
    fn has_pending(&self) -> bool {
        matches!(self.state, ThrottleState::Pending { .. })
    }

    #[cfg(test)]
    fn is_idle(&self) -> bool {
        matches!(self.state, ThrottleState::Idle)
    }
}

impl<T> Default for Throttle<T> {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_WINDOW)
    }
}
