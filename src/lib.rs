//! `icinga2_node`: library half of the binary, so integration tests can
//! drive a real node without going through `main`.

pub mod config;
pub mod logsetup;
pub mod runtime;

pub use config::NodeConfig;
pub use runtime::Runtime;
