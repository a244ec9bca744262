//! Discretizes a hand height into one of the air lanes.

use serde::{Deserialize, Serialize};
use shared::domain::LANE_COUNT;

use crate::error::CoreError;

pub const DEFAULT_ZONE_HEIGHT: f64 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
    zone_height: f64,
    lane_count: usize,
}

impl ZoneConfig {
    pub fn new(zone_height: f64) -> Result<Self, CoreError> {
        if !zone_height.is_finite() || zone_height <= 0.0 {
            return Err(CoreError::InvalidConfig(format!(
                "zone height must be a positive number of pixels, got {zone_height}"
            )));
        }
        Ok(Self {
            zone_height,
            lane_count: LANE_COUNT,
        })
    }

    pub fn zone_height(&self) -> f64 {
        self.zone_height
    }

    pub fn lane_count(&self) -> usize {
        self.lane_count
    }

    pub fn level_size(&self) -> f64 {
        self.zone_height / self.lane_count as f64
    }
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            zone_height: DEFAULT_ZONE_HEIGHT,
            lane_count: LANE_COUNT,
        }
    }
}

/// Maps a height (pixels from the top of the image) to a lane.
///
/// Returns `None` when the hand is below the interaction zone. The zone edge
/// itself is still inside and lands on lane 0; heights above the image top
/// land on the highest lane.
pub fn map_zone(height: f64, cfg: &ZoneConfig) -> Option<usize> {
    if height.is_nan() || height > cfg.zone_height {
        return None;
    }
    let top = cfg.lane_count - 1;
    let level = (height / cfg.level_size()).floor().clamp(0.0, top as f64) as usize;
    Some(top - level)
}

/// Renders a zone the way the detector overlay labels it, `-1` for outside.
pub fn zone_label(zone: Option<usize>) -> i64 {
    zone.map_or(-1, |lane| lane as i64)
}
