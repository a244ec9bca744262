use shared::error::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("malformed detector frame: {0}")]
    MalformedFrame(String),
    /// A state the link should never reach; treated as a defect, not retried.
    #[error("link invariant violated: {0}")]
    LinkInvariant(&'static str),
    #[error("tracker session is no longer running")]
    SessionClosed,
}

impl From<serde_json::Error> for CoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::MalformedFrame(value.to_string())
    }
}
