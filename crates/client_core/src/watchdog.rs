use std::time::Duration;

use shared::domain::LinkState;

pub const DEFAULT_WATCHDOG_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_MISSED_PROBE_THRESHOLD: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogVerdict {
    /// Nothing to do this tick.
    Idle,
    /// Link is up; send a liveness probe.
    Probe,
    /// Too many unanswered ticks; tear the link down and reopen.
    Expired,
}

/// Missed-probe bookkeeping for the liveness heartbeat.
///
/// Ticks count while the link is connected and also while a handshake is
/// waiting for its first acknowledgement, so a stalled handshake is retried
/// the same way a dead link is.
#[derive(Debug, Clone)]
pub struct Watchdog {
    interval: Duration,
    threshold: u32,
    missed: u32,
}

impl Watchdog {
    pub fn new(interval: Duration, threshold: u32) -> Self {
        Self {
            interval,
            threshold,
            missed: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn missed(&self) -> u32 {
        self.missed
    }

    pub fn tick(&mut self, state: LinkState) -> WatchdogVerdict {
        if state == LinkState::Disconnected {
            return WatchdogVerdict::Idle;
        }

        self.missed += 1;
        if self.missed > self.threshold {
            self.missed = 0;
            return WatchdogVerdict::Expired;
        }
        match state {
            LinkState::Connected => WatchdogVerdict::Probe,
            _ => WatchdogVerdict::Idle,
        }
    }

    pub fn acknowledge(&mut self) {
        self.missed = 0;
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new(DEFAULT_WATCHDOG_INTERVAL, DEFAULT_MISSED_PROBE_THRESHOLD)
    }
}
