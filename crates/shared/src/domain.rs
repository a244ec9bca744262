use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Number of discretized height bands carried by an air frame.
pub const LANE_COUNT: usize = 6;

/// One bit per height band, lane 0 first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LaneVector([bool; LANE_COUNT]);

impl LaneVector {
    pub const EMPTY: Self = Self([false; LANE_COUNT]);

    pub fn from_lanes(lanes: [bool; LANE_COUNT]) -> Self {
        Self(lanes)
    }

    /// Builds a vector with every listed lane set. Duplicates collapse into one bit.
    pub fn from_active(lanes: impl IntoIterator<Item = usize>) -> Result<Self, ProtocolError> {
        let mut vector = Self::EMPTY;
        for lane in lanes {
            vector.set(lane)?;
        }
        Ok(vector)
    }

    pub fn set(&mut self, lane: usize) -> Result<(), ProtocolError> {
        let slot = self.0.get_mut(lane).ok_or(ProtocolError::LaneOutOfRange {
            lane,
            lane_count: LANE_COUNT,
        })?;
        *slot = true;
        Ok(())
    }

    pub fn is_set(&self, lane: usize) -> bool {
        self.0.get(lane).copied().unwrap_or(false)
    }

    pub fn lanes(&self) -> &[bool; LANE_COUNT] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        !self.0.contains(&true)
    }
}

impl fmt::Display for LaneVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for lane in self.0 {
            f.write_str(if lane { "1" } else { "0" })?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
        };
        f.write_str(name)
    }
}
