//! RPC-level errors (spec §7): distinct from transport (`cluster-tls`)
//! and wire-decoding (`cluster-protocol`) failures.

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("no handler registered for method {0}")]
    UnknownMethod(String),
    #[error("invalid params for {method}: {reason}")]
    BadParams { method: String, reason: String },
    #[error("transport error: {0}")]
    Transport(#[from] cluster_tls::FramedError),
    #[error("failed to decode envelope: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("connection closed")]
    Closed,
}
