//! Relay-layer errors (spec §4.H/§4.I boundary).

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("replay log error: {0}")]
    ReplayLog(#[from] replay_log::ReplayLogError),
}
