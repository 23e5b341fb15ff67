//! TOML configuration loader, modeled on the teacher's
//! `services/forwarder/src/config.rs`: a `Raw*` deserialization layer
//! with everything optional, defaulted and validated into a strongly
//! typed value the rest of the process trusts without re-checking.

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

const DEFAULT_BIND: &str = "0.0.0.0:5665";
const DEFAULT_MAX_CONCURRENT_CHECKS: usize = 256;
const DEFAULT_SEGMENT_ROTATE_MESSAGES: usize = 50_000;
const DEFAULT_ROTATE_INTERVAL_SECS: u64 = 3600;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
    InvalidBind(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => write!(f, "failed to read {}: {source}", path.display()),
            ConfigError::Parse { path, source } => write!(f, "failed to parse {}: {source}", path.display()),
            ConfigError::InvalidBind(s) => write!(f, "invalid listen.bind address: {s}"),
        }
    }
}
impl std::error::Error for ConfigError {}

#[derive(Debug, Deserialize)]
struct RawConfig {
    node: RawNode,
    tls: RawTls,
    #[serde(default)]
    listen: RawListen,
    #[serde(default)]
    scheduler: RawScheduler,
    #[serde(default)]
    cluster: RawCluster,
    #[serde(default)]
    replay: RawReplay,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    name: String,
    data_dir: String,
}

#[derive(Debug, Deserialize)]
struct RawTls {
    cert_path: String,
    key_path: String,
    ca_path: String,
    crl_path: Option<String>,
    #[serde(default)]
    accept_unauthenticated: bool,
}

#[derive(Debug, Default, Deserialize)]
struct RawListen {
    bind: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawScheduler {
    max_concurrent_checks: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCluster {
    #[serde(default)]
    endpoints: Vec<RawEndpoint>,
    #[serde(default)]
    zones: Vec<RawZone>,
}

#[derive(Debug, Deserialize)]
struct RawEndpoint {
    name: String,
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct RawZone {
    name: String,
    parent: Option<String>,
    #[serde(default)]
    endpoints: Vec<String>,
    #[serde(default)]
    global: bool,
}

#[derive(Debug, Default, Deserialize)]
struct RawReplay {
    segment_rotate_messages: Option<usize>,
    rotate_interval_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ClusterEndpointConfig {
    pub name: String,
    pub addr: Option<SocketAddr>,
}

#[derive(Debug, Clone)]
pub struct ClusterZoneConfig {
    pub name: String,
    pub parent: Option<String>,
    pub endpoints: Vec<String>,
    pub global: bool,
}

/// The materialized, validated configuration the rest of the process
/// consumes. Parsing the real Icinga2 config DSL is out of scope (spec
/// §1); this is the minimal already-materialized form described there.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_name: String,
    pub data_dir: PathBuf,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub ca_path: PathBuf,
    pub crl_path: Option<PathBuf>,
    pub accept_unauthenticated: bool,
    pub listen_bind: SocketAddr,
    pub max_concurrent_checks: usize,
    pub endpoints: Vec<ClusterEndpointConfig>,
    pub zones: Vec<ClusterZoneConfig>,
    pub segment_rotate_messages: usize,
    pub rotate_interval_secs: u64,
}

impl NodeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_owned(), source })?;
        let raw: RawConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_owned(), source })?;
        NodeConfig::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let bind = raw.listen.bind.unwrap_or_else(|| DEFAULT_BIND.to_owned());
        let listen_bind = bind.parse().map_err(|_| ConfigError::InvalidBind(bind.clone()))?;

        let endpoints = raw
            .cluster
            .endpoints
            .into_iter()
            .map(|e| ClusterEndpointConfig {
                addr: match (&e.host, e.port) {
                    (Some(host), Some(port)) => format!("{host}:{port}").parse().ok(),
                    _ => None,
                },
                name: e.name,
            })
            .collect();

        let zones = raw
            .cluster
            .zones
            .into_iter()
            .map(|z| ClusterZoneConfig {
                name: z.name,
                parent: z.parent,
                endpoints: z.endpoints,
                global: z.global,
            })
            .collect();

        Ok(NodeConfig {
            node_name: raw.node.name,
            data_dir: PathBuf::from(raw.node.data_dir),
            cert_path: PathBuf::from(raw.tls.cert_path),
            key_path: PathBuf::from(raw.tls.key_path),
            ca_path: PathBuf::from(raw.tls.ca_path),
            crl_path: raw.tls.crl_path.map(PathBuf::from),
            accept_unauthenticated: raw.tls.accept_unauthenticated,
            listen_bind,
            max_concurrent_checks: raw.scheduler.max_concurrent_checks.unwrap_or(DEFAULT_MAX_CONCURRENT_CHECKS),
            endpoints,
            zones,
            segment_rotate_messages: raw.replay.segment_rotate_messages.unwrap_or(DEFAULT_SEGMENT_ROTATE_MESSAGES),
            rotate_interval_secs: raw.replay.rotate_interval_secs.unwrap_or(DEFAULT_ROTATE_INTERVAL_SECS),
        })
    }

    pub fn replay_dir(&self) -> PathBuf {
        self.data_dir.join("api").join("log")
    }
}
