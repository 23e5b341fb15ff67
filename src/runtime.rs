//! Process-wide wiring (spec §4.C/§4.D/§4.F/§4.G/§4.H): replaces the
//! original's static `ApiListener`/`CheckerComponent` singletons with an
//! explicit owned `Runtime` value, built once in `main` and driven by a
//! handful of background tasks.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use cluster_rpc::{Dispatcher, FunctionRegistry, PeerConnection};
use cluster_tls::{client_config, server_config, FramedConnection, NodeIdentity};
use object_model::{Endpoint, ObjectName, ObjectRef, Registry, Zone, ZoneTree};
use relay::{PeerLink, Relay};
use replay_log::{ReplayLog, DEFAULT_RETENTION};
use rustls::pki_types::ServerName;
use scheduler::{Scheduler, ShellCommandRunner};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, OnceCell, RwLock};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::config::NodeConfig;

const DISPATCH_WORKERS: usize = 4;
const RECONNECT_BACKOFF: Duration = Duration::from_secs(10);

fn now() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

/// Owns every live peer connection's outbound write queue and answers
/// `PeerLink` on the relay's behalf. Construction happens before the
/// `Relay`/`FunctionRegistry` exist (the `Relay <-> ConnectionManager`
/// pair is circular the same way `Relay <-> Scheduler` is), so the
/// registry is attached once via `OnceCell` just like `Relay::scheduler`.
pub struct ConnectionManager {
    identity: Arc<NodeIdentity>,
    registry: Arc<RwLock<Registry>>,
    dispatcher: Arc<Dispatcher>,
    function_registry: OnceCell<Arc<FunctionRegistry>>,
    relay: OnceCell<Arc<Relay>>,
    senders: StdRwLock<HashMap<String, mpsc::UnboundedSender<Vec<u8>>>>,
}

impl ConnectionManager {
    pub fn new(identity: Arc<NodeIdentity>, registry: Arc<RwLock<Registry>>) -> Arc<Self> {
        Arc::new(ConnectionManager {
            identity,
            registry,
            dispatcher: Arc::new(Dispatcher::start(DISPATCH_WORKERS)),
            function_registry: OnceCell::new(),
            relay: OnceCell::new(),
            senders: StdRwLock::new(HashMap::new()),
        })
    }

    pub async fn attach_function_registry(&self, registry: Arc<FunctionRegistry>) {
        let _ = self.function_registry.set(registry);
    }

    pub async fn attach_relay(&self, relay: Arc<Relay>) {
        let _ = self.relay.set(relay);
    }

    async fn mark_connected(&self, endpoint: &str, connected: bool) {
        let mut reg = self.registry.write().await;
        if let Some(ObjectRef::Endpoint(e)) = reg.get_mut(&ObjectName::new("Endpoint", endpoint)) {
            if connected {
                e.add_client();
            } else {
                e.remove_client();
            }
        }
    }

    /// Accepts inbound cluster connections until the listener errors.
    pub async fn listen(self: &Arc<Self>, bind: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
        let server_config = server_config(&self.identity)?;
        let acceptor = TlsAcceptor::from(Arc::new(server_config));
        let listener = TcpListener::bind(bind).await?;
        tracing::info!(%bind, "listening for cluster connections");
        loop {
            let (stream, peer_addr) = listener.accept().await?;
            let acceptor = acceptor.clone();
            let this = self.clone();
            tokio::spawn(async move {
                if let Err(e) = this.accept_one(stream, acceptor).await {
                    tracing::warn!(%peer_addr, error = %e, "inbound cluster connection failed");
                }
            });
        }
    }

    async fn accept_one(self: &Arc<Self>, stream: TcpStream, acceptor: TlsAcceptor) -> Result<(), Box<dyn std::error::Error>> {
        let tls_stream = acceptor.accept(stream).await?;
        let (_, session) = tls_stream.get_ref();
        let cert = session.peer_certificates().and_then(|certs| certs.first()).ok_or("peer presented no certificate")?;
        let peer_endpoint = cluster_tls::subject_common_name(cert)?;
        let framed = FramedConnection::new(Box::new(tls_stream), cluster_tls::DEFAULT_WRITE_QUEUE_DEPTH);
        self.drive(framed, peer_endpoint).await
    }

    /// Spawns a background task that connects to `endpoint` at `addr` and
    /// keeps reconnecting on failure — the client side of a cluster link,
    /// for the peers this node is configured to dial out to.
    pub fn connect(self: &Arc<Self>, endpoint: String, addr: SocketAddr) {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = this.try_connect(&endpoint, addr).await {
                    tracing::warn!(endpoint = %endpoint, error = %e, "cluster connect failed, retrying");
                }
                tokio::time::sleep(RECONNECT_BACKOFF).await;
            }
        });
    }

    async fn try_connect(self: &Arc<Self>, endpoint: &str, addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
        let client_config = client_config(&self.identity)?;
        let connector = TlsConnector::from(Arc::new(client_config));
        let stream = TcpStream::connect(addr).await?;
        let server_name = ServerName::try_from(endpoint.to_owned())?;
        let tls_stream = connector.connect(server_name, stream).await?;
        let framed = FramedConnection::new(Box::new(tls_stream), cluster_tls::DEFAULT_WRITE_QUEUE_DEPTH);
        self.drive(framed, endpoint.to_owned()).await
    }

    async fn drive(self: &Arc<Self>, framed: FramedConnection, peer_endpoint: String) -> Result<(), Box<dyn std::error::Error>> {
        let conn = PeerConnection::handshake(framed, peer_endpoint.clone()).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.write().unwrap().insert(peer_endpoint.clone(), tx.clone());
        self.mark_connected(&peer_endpoint, true).await;
        tracing::info!(endpoint = %peer_endpoint, "cluster peer connected");

        if let Some(relay) = self.relay.get() {
            match relay.catch_up_endpoint(&peer_endpoint).await {
                Ok(records) => {
                    for record in records {
                        let _ = tx.send(record.message.into_bytes());
                    }
                }
                Err(e) => tracing::warn!(endpoint = %peer_endpoint, error = %e, "replay catch-up failed"),
            }
        }

        let registry = self.function_registry.get().cloned().ok_or("function registry not attached yet")?;
        let result = conn.run(registry, self.dispatcher.clone(), rx).await;

        self.senders.write().unwrap().remove(&peer_endpoint);
        self.mark_connected(&peer_endpoint, false).await;
        tracing::info!(endpoint = %peer_endpoint, "cluster peer disconnected");
        result.map_err(Into::into)
    }
}

impl PeerLink for ConnectionManager {
    fn is_connected(&self, endpoint: &str) -> bool {
        self.senders.read().unwrap().contains_key(endpoint)
    }

    fn send_to(&self, endpoint: &str, payload: Vec<u8>) {
        if let Some(tx) = self.senders.read().unwrap().get(endpoint) {
            let _ = tx.send(payload);
        }
    }
}

/// Everything a running node needs, assembled once in `main` and handed
/// off to the background tasks that keep it alive.
pub struct Runtime {
    pub registry: Arc<RwLock<Registry>>,
    pub zones: Arc<ZoneTree>,
    pub scheduler: Arc<Scheduler>,
    pub relay: Arc<Relay>,
    pub connections: Arc<ConnectionManager>,
    replay_log: Arc<ReplayLog>,
    local_endpoint: String,
}

impl Runtime {
    pub async fn build(config: &NodeConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let identity = Arc::new(NodeIdentity::load(
            &config.cert_path,
            &config.key_path,
            &config.ca_path,
            config.crl_path.as_deref(),
        )?);

        let mut registry = Registry::new();
        for endpoint in &config.endpoints {
            let mut e = Endpoint::new(endpoint.name.clone());
            e.host = endpoint.addr.map(|a| a.ip().to_string());
            e.port = endpoint.addr.map(|a| a.port());
            registry.insert(ObjectRef::Endpoint(e));
        }
        let registry = Arc::new(RwLock::new(registry));

        let zones: Vec<Zone> = config
            .zones
            .iter()
            .map(|z| {
                if z.global {
                    let mut zone = Zone::new_global(z.name.clone());
                    zone.endpoints = z.endpoints.clone();
                    zone
                } else {
                    Zone::new(z.name.clone(), z.parent.clone(), z.endpoints.clone())
                }
            })
            .collect();
        let home_zone = zones
            .iter()
            .find(|z| z.endpoints.iter().any(|e| e == &config.node_name))
            .map(object_model::Zone::name)
            .unwrap_or(&config.node_name)
            .to_owned();
        let zones = Arc::new(ZoneTree::build(zones, home_zone)?);

        let replay_log = Arc::new(ReplayLog::open(config.replay_dir()).await?);
        let connections = ConnectionManager::new(identity, registry.clone());
        let command_runner = Arc::new(ShellCommandRunner);

        let relay = Relay::new(registry.clone(), zones.clone(), config.node_name.clone(), replay_log.clone(), connections.clone(), command_runner.clone());

        let mut function_registry = FunctionRegistry::new();
        relay.register_handlers(&mut function_registry);
        connections.attach_function_registry(Arc::new(function_registry)).await;
        connections.attach_relay(relay.clone()).await;

        let scheduler = Scheduler::new(
            registry.clone(),
            command_runner,
            Some(relay.clone()),
            relay.clone(),
            relay.clone(),
            zones.local_zone(),
        );
        relay.attach_scheduler(scheduler.clone()).await;

        Ok(Runtime {
            registry,
            zones,
            scheduler,
            relay,
            connections,
            replay_log,
            local_endpoint: config.node_name.clone(),
        })
    }

    /// Starts the listener, dials every configured peer, primes the
    /// scheduler, and kicks off the authority-election and replay-pruning
    /// maintenance loops. Runs until the listener fails.
    pub async fn run(&self, config: &NodeConfig) -> Result<(), Box<dyn std::error::Error>> {
        for endpoint in &config.endpoints {
            if endpoint.name == self.local_endpoint {
                continue;
            }
            if let Some(addr) = endpoint.addr {
                self.connections.connect(endpoint.name.clone(), addr);
            }
        }

        self.scheduler.prime().await;

        let started_at = now();
        let authority_registry = self.registry.clone();
        let authority_zones = self.zones.clone();
        let authority_connections = self.connections.clone();
        let local_endpoint = self.local_endpoint.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(authority::RECOMPUTE_INTERVAL).await;
                let mut reg = authority_registry.write().await;
                authority::recompute_all(&mut reg, &authority_zones, &local_endpoint, now() - started_at, |e| authority_connections.is_connected(e));
            }
        });

        let prune_log = self.replay_log.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                match prune_log.prune(DEFAULT_RETENTION).await {
                    Ok(removed) if removed > 0 => tracing::info!(removed, "pruned aged-out replay segments"),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "failed to prune replay log"),
                }
            }
        });

        self.connections.listen(config.listen_bind).await
    }
}
