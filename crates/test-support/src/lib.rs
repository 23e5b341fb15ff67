//! Shared test fixtures for the cluster crates: a scripted
//! `CommandRunner` and throwaway mutual-TLS material. Mirrors the role
//! `rt-test-utils` plays for the teacher's forwarder/server/receiver
//! suite — fake out the collaborator, not the code under test.

pub mod command_runner;
pub mod tls;

pub use command_runner::MockCommandRunner;
pub use tls::{mock_tls_pair, MockTlsIdentity};
