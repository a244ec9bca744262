//! Connection state machine for the endpoint link.
//!
//! [`LinkSession`] does no I/O. Every input (open request, transport
//! outcome, inbound frame, watchdog tick) returns the [`LinkAction`]s the
//! runtime must carry out, which keeps transitions testable without sockets.

use std::time::Duration;

use shared::{
    domain::LinkState,
    protocol::{InboundFrame, OutboundFrame},
};
use tracing::{debug, info, warn};

use crate::{
    watchdog::{Watchdog, WatchdogVerdict},
    SessionEvent,
};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    /// Start establishing the transport for this attempt.
    Connect { attempt: u64 },
    /// Call [`LinkSession::open`] again after `delay`.
    ScheduleReconnect { delay: Duration },
    Transmit(OutboundFrame),
    /// Drop the current transport and any connect still in flight.
    CloseTransport,
    Emit(SessionEvent),
}

#[derive(Debug, Clone)]
pub struct LinkSession {
    state: LinkState,
    watchdog: Watchdog,
    attempt: u64,
    /// Set once the current attempt's transport is up and probed.
    transport_open: bool,
    reconnect_delay: Duration,
}

impl LinkSession {
    pub fn new(watchdog: Watchdog, reconnect_delay: Duration) -> Self {
        Self {
            state: LinkState::Disconnected,
            watchdog,
            attempt: 0,
            transport_open: false,
            reconnect_delay,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Id of the most recent connect attempt. Transport events carrying any
    /// other id belong to a connection that was already given up.
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    pub fn is_current(&self, attempt: u64) -> bool {
        attempt == self.attempt && self.state != LinkState::Disconnected
    }

    /// Only valid while disconnected; any other call is ignored so at most
    /// one attempt is ever in flight.
    pub fn open(&mut self) -> Vec<LinkAction> {
        if self.state != LinkState::Disconnected {
            debug!(state = %self.state, "link: open ignored, attempt already active");
            return Vec::new();
        }
        self.attempt += 1;
        self.state = LinkState::Connecting;
        self.transport_open = false;
        self.watchdog.acknowledge();
        debug!(attempt = self.attempt, "link: connecting");
        vec![LinkAction::Connect {
            attempt: self.attempt,
        }]
    }

    /// Transport is up; probe it and wait for the acknowledgement.
    pub fn on_transport_opened(&mut self, attempt: u64) -> Vec<LinkAction> {
        if attempt != self.attempt || self.state != LinkState::Connecting {
            return vec![];
        }
        self.transport_open = true;
        vec![LinkAction::Transmit(OutboundFrame::LivenessProbe)]
    }

    pub fn on_frame(&mut self, frame: InboundFrame) -> Vec<LinkAction> {
        match (frame, self.state) {
            (InboundFrame::LivenessAck, LinkState::Connecting) if !self.transport_open => {
                debug!(attempt = self.attempt, "link: ack before transport open, ignoring");
                vec![]
            }
            (InboundFrame::LivenessAck, LinkState::Connecting) => {
                self.state = LinkState::Connected;
                self.watchdog.acknowledge();
                info!(attempt = self.attempt, "link: connected");
                vec![LinkAction::Emit(SessionEvent::Connected)]
            }
            (InboundFrame::LivenessAck, LinkState::Connected) => {
                self.watchdog.acknowledge();
                vec![]
            }
            (InboundFrame::Led(payload), LinkState::Connected) => {
                vec![LinkAction::Emit(SessionEvent::LedPayload(payload))]
            }
            (frame, state) => {
                debug!(?frame, %state, "link: dropping frame outside connected state");
                vec![]
            }
        }
    }

    /// Frames are only written on a live link; anything else is dropped,
    /// since only the freshest state matters once the link comes back.
    pub fn send(&mut self, frame: OutboundFrame) -> Vec<LinkAction> {
        if self.state == LinkState::Connected {
            vec![LinkAction::Transmit(frame)]
        } else {
            debug!(state = %self.state, "link: dropping frame while not connected");
            vec![]
        }
    }

    /// Close or error reported by the transport of `attempt`.
    pub fn on_transport_lost(&mut self, attempt: u64, reason: &str) -> Vec<LinkAction> {
        if !self.is_current(attempt) {
            return vec![];
        }
        warn!(attempt, %reason, "link: transport lost");
        let mut actions = self.disconnect();
        actions.push(LinkAction::ScheduleReconnect {
            delay: self.reconnect_delay,
        });
        actions
    }

    pub fn on_watchdog_tick(&mut self) -> Vec<LinkAction> {
        match self.watchdog.tick(self.state) {
            WatchdogVerdict::Idle => vec![],
            WatchdogVerdict::Probe => vec![LinkAction::Transmit(OutboundFrame::LivenessProbe)],
            WatchdogVerdict::Expired => {
                warn!(
                    attempt = self.attempt,
                    state = %self.state,
                    threshold = self.watchdog.threshold(),
                    "link: liveness timeout, reconnecting"
                );
                let mut actions = self.disconnect();
                actions.extend(self.open());
                actions
            }
        }
    }

    fn disconnect(&mut self) -> Vec<LinkAction> {
        let was_connected = self.state == LinkState::Connected;
        self.state = LinkState::Disconnected;
        self.transport_open = false;
        self.watchdog.acknowledge();
        let mut actions = vec![LinkAction::CloseTransport];
        if was_connected {
            info!(attempt = self.attempt, "link: disconnected");
            actions.push(LinkAction::Emit(SessionEvent::Disconnected));
        }
        actions
    }
}

impl Default for LinkSession {
    fn default() -> Self {
        Self::new(Watchdog::default(), DEFAULT_RECONNECT_DELAY)
    }
}

#[cfg(test)]
#[path = "tests/link_tests.rs"]
mod tests;
