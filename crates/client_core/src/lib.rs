use std::time::Duration;

use shared::domain::LaneVector;
use url::Url;

pub mod composer;
pub mod detector;
pub mod error;
pub mod link;
pub mod runtime;
pub mod throttle;
pub mod transport;
pub mod watchdog;
pub mod zone;

pub use composer::{HandSlots, StateComposer, DEFAULT_HAND_EXPIRY_CYCLES, MAX_HANDS};
pub use detector::{
    CoordinateSpace, DetectionCycle, DetectorAdapter, DetectorBackend, DetectorThresholds,
    HandSample,
};
pub use error::CoreError;
pub use link::{LinkAction, LinkSession, DEFAULT_RECONNECT_DELAY};
pub use runtime::{spawn, SessionCommand, SessionHandle};
pub use throttle::{Throttle, DEFAULT_THROTTLE_WINDOW};
pub use transport::{InboundSender, LinkConnection, LinkConnector, TransportEvent, WsConnector};
pub use watchdog::{
    Watchdog, WatchdogVerdict, DEFAULT_MISSED_PROBE_THRESHOLD, DEFAULT_WATCHDOG_INTERVAL,
};
pub use zone::{map_zone, ZoneConfig, DEFAULT_ZONE_HEIGHT};

pub const DEFAULT_ENDPOINT_URL: &str = "ws://127.0.0.1:1606/ws";

/// Events published by a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    Disconnected,
    /// Opaque binary frame from the endpoint, for the LED renderer.
    LedPayload(Vec<u8>),
    /// The composed lane vector changed this cycle. Published whether or not
    /// the vector is sent.
    LanesChanged(LaneVector),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub url: String,
    pub zone_height: f64,
    pub throttle_window: Duration,
    pub watchdog_interval: Duration,
    pub missed_probe_threshold: u32,
    pub reconnect_delay: Duration,
    pub hand_expiry_cycles: u32,
    pub start_paused: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ENDPOINT_URL.to_string(),
            zone_height: DEFAULT_ZONE_HEIGHT,
            throttle_window: DEFAULT_THROTTLE_WINDOW,
            watchdog_interval: DEFAULT_WATCHDOG_INTERVAL,
            missed_probe_threshold: DEFAULT_MISSED_PROBE_THRESHOLD,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            hand_expiry_cycles: DEFAULT_HAND_EXPIRY_CYCLES,
            start_paused: false,
        }
    }
}

impl SessionConfig {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Checks the endpoint URL and timing values and returns the zone
    /// configuration they describe.
    pub fn validate(&self) -> Result<ZoneConfig, CoreError> {
        let url = Url::parse(&self.url)
            .map_err(|err| CoreError::InvalidConfig(format!("endpoint url {}: {err}", self.url)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(CoreError::InvalidConfig(format!(
                "endpoint url must use ws or wss, got {}",
                url.scheme()
            )));
        }
        if self.watchdog_interval.is_zero() {
            return Err(CoreError::InvalidConfig(
                "watchdog interval must be non-zero".into(),
            ));
        }
        ZoneConfig::new(self.zone_height)
    }
}
