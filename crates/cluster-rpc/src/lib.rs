//! JSON-RPC connection layer over `cluster-tls` (spec §4.D).

pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod registry;

pub use connection::{PeerConnection, HEARTBEAT_INTERVAL, HEARTBEAT_TIMEOUT_SECS, HELLO_TIMEOUT, IDLE_TIMEOUT, PROTOCOL_VERSION};
pub use dispatcher::{sdbm_hash, Dispatcher};
pub use error::RpcError;
pub use registry::{ApiFunction, FunctionRegistry, RequestContext};
