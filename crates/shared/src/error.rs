use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("lane index {lane} is outside 0..{lane_count}")]
    LaneOutOfRange { lane: usize, lane_count: usize },
    #[error("unrecognized text frame of length {len}: {text:?}")]
    UnknownTextFrame { text: String, len: usize },
}

impl ProtocolError {
    pub fn unknown_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::UnknownTextFrame {
            len: text.chars().count(),
            text,
        }
    }
}
