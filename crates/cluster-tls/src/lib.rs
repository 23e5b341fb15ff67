//! Mutually-authenticated TLS transport for cluster links (spec §4.C).

pub mod config;
pub mod framed;
pub mod identity;

pub use config::{client_config, server_config};
pub use framed::{read_netstring, write_netstring, FramedConnection, FramedError, TrafficCounters, DEFAULT_WRITE_QUEUE_DEPTH, MAX_FRAME_BYTES};
pub use identity::{load_certs, load_crl, load_private_key, subject_common_name, NodeIdentity, TlsError};
