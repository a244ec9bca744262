use std::{collections::HashMap, fs, path::Path, time::Duration};

use tracing::warn;

pub const SETTINGS_FILE: &str = "endpoint.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub bind_addr: String,
    pub lights_enabled: bool,
    pub led_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:1606".into(),
            lights_enabled: true,
            led_interval_ms: 50,
        }
    }
}

impl Settings {
    pub fn led_interval(&self) -> Duration {
        Duration::from_millis(self.led_interval_ms.max(1))
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then the optional TOML file, then `ENDPOINT__*` variables.
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

    for key in ["bind_addr", "lights_enabled", "led_interval_ms"] {
        if let Some(v) = env(&format!("ENDPOINT__{}", key.to_ascii_uppercase())) {
            apply(&mut settings, key, &v);
        }
    }

    settings
}

fn apply(settings: &mut Settings, key: &str, value: &str) {
    match key {
        "bind_addr" => settings.bind_addr = value.to_string(),
        "lights_enabled" => match value.parse() {
            Ok(v) => settings.lights_enabled = v,
            Err(_) => warn!(key, value, "config: expected true or false"),
        },
        "led_interval_ms" => match value.parse() {
            Ok(v) => settings.led_interval_ms = v,
            Err(_) => warn!(key, value, "config: expected milliseconds"),
        },
        _ => warn!(key, "config: unknown setting"),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
