use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("command {0:?} is not a valid identifier")]
    InvalidSyntax(String),
    #[error("command {0:?} is not on the allow-list")]
    NotAllowed(String),
    #[error("failed to encode command frame: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("not connected (state: {0})")]
    NotConnected(&'static str),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("inbound frame of {0} bytes exceeds the limit")]
    Oversized(usize),
    #[error("malformed inbound frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChartError {
    #[error("chart range of {0} days is outside 1..=14")]
    DaysOutOfRange(u16),
}
