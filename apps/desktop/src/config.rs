use std::{collections::HashMap, fs, path::Path, time::Duration};

use client_core::{
    DetectorBackend, DetectorThresholds, SessionConfig, DEFAULT_ENDPOINT_URL,
    DEFAULT_HAND_EXPIRY_CYCLES, DEFAULT_MISSED_PROBE_THRESHOLD, DEFAULT_ZONE_HEIGHT,
};
use tracing::warn;

pub const SETTINGS_FILE: &str = "tracker.toml";
pub const DEFAULT_IMAGE_HEIGHT: f64 = 480.0;

const KEYS: [&str; 12] = [
    "url",
    "backend",
    "zone_height",
    "image_height",
    "min_detection_confidence",
    "score_threshold",
    "throttle_ms",
    "watchdog_ms",
    "missed_probe_threshold",
    "reconnect_ms",
    "hand_expiry_cycles",
    "start_paused",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub url: String,
    pub backend: DetectorBackend,
    pub zone_height: f64,
    /// Used for normalized detector output that does not report its own
    /// frame height.
    pub image_height: f64,
    pub thresholds: DetectorThresholds,
    pub throttle_ms: u64,
    pub watchdog_ms: u64,
    pub missed_probe_threshold: u32,
    pub reconnect_ms: u64,
    pub hand_expiry_cycles: u32,
    pub start_paused: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            url: DEFAULT_ENDPOINT_URL.into(),
            backend: DetectorBackend::Landmarks,
            zone_height: DEFAULT_ZONE_HEIGHT,
            image_height: DEFAULT_IMAGE_HEIGHT,
            thresholds: DetectorThresholds::default(),
            throttle_ms: session.throttle_window.as_millis() as u64,
            watchdog_ms: session.watchdog_interval.as_millis() as u64,
            missed_probe_threshold: DEFAULT_MISSED_PROBE_THRESHOLD,
            reconnect_ms: session.reconnect_delay.as_millis() as u64,
            hand_expiry_cycles: DEFAULT_HAND_EXPIRY_CYCLES,
            start_paused: false,
        }
    }
}

impl Settings {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            url: self.url.clone(),
            zone_height: self.zone_height,
            throttle_window: Duration::from_millis(self.throttle_ms),
            watchdog_interval: Duration::from_millis(self.watchdog_ms),
            missed_probe_threshold: self.missed_probe_threshold,
            reconnect_delay: Duration::from_millis(self.reconnect_ms),
            hand_expiry_cycles: self.hand_expiry_cycles,
            start_paused: self.start_paused,
        }
    }
}

pub fn load_settings(path: &Path) -> Settings {
    load_settings_from(path, |key| std::env::var(key).ok())
}

/// Defaults, then the optional TOML file, then `TRACKER__*` variables.
/// Values that do not parse are logged and skipped.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<HashMap<String, toml::Value>>(&raw) {
            Ok(file_cfg) => {
                for (key, value) in file_cfg {
                    let value = match value {
                        toml::Value::String(v) => v,
                        other => other.to_string(),
                    };
                    apply(&mut settings, &key, &value);
                }
            }
            Err(err) => warn!(path = %path.display(), %err, "config: ignoring unreadable settings file"),
        }
    }

    for key in KEYS {
        if let Some(v) = env(&format!("TRACKER__{}", key.to_ascii_uppercase())) {
            apply(&mut settings, key, &v);
        }
    }

    settings
}

pub fn parse_backend(value: &str) -> Result<DetectorBackend, String> {
    match value {
        "landmarks" | "mediapipe" => Ok(DetectorBackend::Landmarks),
        "bounding_boxes" | "boxes" | "handtrack" => Ok(DetectorBackend::BoundingBoxes),
        other => Err(format!(
            "unknown detector backend '{other}', expected landmarks or bounding_boxes"
        )),
    }
}

fn apply(settings: &mut Settings, key: &str, value: &str) {
    let parsed = match key {
        "url" => {
            settings.url = value.to_string();
            Ok(())
        }
        "backend" => parse_backend(value).map(|v| settings.backend = v),
        "zone_height" => parse_into(value, &mut settings.zone_height),
        "image_height" => parse_into(value, &mut settings.image_height),
        "min_detection_confidence" => {
            parse_into(value, &mut settings.thresholds.min_detection_confidence)
        }
        "score_threshold" => parse_into(value, &mut settings.thresholds.score_threshold),
        "throttle_ms" => parse_into(value, &mut settings.throttle_ms),
        "watchdog_ms" => parse_into(value, &mut settings.watchdog_ms),
        "missed_probe_threshold" => parse_into(value, &mut settings.missed_probe_threshold),
        "reconnect_ms" => parse_into(value, &mut settings.reconnect_ms),
        "hand_expiry_cycles" => parse_into(value, &mut settings.hand_expiry_cycles),
        "start_paused" => parse_into(value, &mut settings.start_paused),
        _ => Err("unknown setting".to_string()),
    };
    if let Err(err) = parsed {
        warn!(key, value, %err, "config: skipping setting");
    }
}

fn parse_into<T>(value: &str, slot: &mut T) -> Result<(), String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    *slot = value.trim().parse().map_err(|err: T::Err| err.to_string())?;
    Ok(())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
