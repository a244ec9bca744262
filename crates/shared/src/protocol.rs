//! Text/binary frames exchanged between the hand tracker and the controller endpoint.

use crate::{
    domain::{LaneVector, LANE_COUNT},
    error::ProtocolError,
};

pub const LIVENESS_PROBE: &str = "alive?";
pub const LIVENESS_ACK: &str = "alive";
pub const AIR_FRAME_TAG: char = 'd';

/// Frames sent by the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    LivenessProbe,
    Lanes(LaneVector),
}

impl OutboundFrame {
    pub fn encode(&self) -> String {
        match self {
            OutboundFrame::LivenessProbe => LIVENESS_PROBE.to_string(),
            OutboundFrame::Lanes(lanes) => format!("{AIR_FRAME_TAG}{lanes}"),
        }
    }

    /// Endpoint-side parse. Frames are told apart by length and leading tag;
    /// any lane character other than `'1'` reads as released.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let chars: Vec<char> = text.chars().collect();
        match (chars.len(), chars.first().copied()) {
            (6, Some('a')) => Ok(OutboundFrame::LivenessProbe),
            (len, Some(AIR_FRAME_TAG)) if len == LANE_COUNT + 1 => {
                let mut lanes = [false; LANE_COUNT];
                for (lane, c) in lanes.iter_mut().zip(&chars[1..]) {
                    *lane = *c == '1';
                }
                Ok(OutboundFrame::Lanes(LaneVector::from_lanes(lanes)))
            }
            _ => Err(ProtocolError::unknown_text(text)),
        }
    }
}

/// Frames received by the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    LivenessAck,
    /// Indicator state, opaque to the tracker.
    Led(Vec<u8>),
}

impl InboundFrame {
    pub fn from_text(text: &str) -> Result<Self, ProtocolError> {
        if text == LIVENESS_ACK {
            Ok(InboundFrame::LivenessAck)
        } else {
            Err(ProtocolError::unknown_text(text))
        }
    }

    pub fn from_binary(payload: Vec<u8>) -> Self {
        InboundFrame::Led(payload)
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
