//! Per-connection JSON-RPC actor (spec §4.D): envelope codec, the
//! `icinga::Hello` capability exchange, the heartbeat, the 60s idle
//! timeout, and the ts-based replay-discard guard against reprocessing a
//! message a peer resends during catch-up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cluster_protocol::{Envelope, HelloParams, METHOD_HEARTBEAT, METHOD_HELLO};
use cluster_tls::FramedConnection;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::dispatcher::Dispatcher;
use crate::error::RpcError;
use crate::registry::{FunctionRegistry, RequestContext};

pub const PROTOCOL_VERSION: &str = "2.14";
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
pub const HEARTBEAT_TIMEOUT_SECS: f64 = 120.0;
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);
pub const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

fn now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

fn encode(envelope: &Envelope) -> Result<Vec<u8>, RpcError> {
    Ok(serde_json::to_vec(envelope)?)
}

fn decode(bytes: &[u8]) -> Result<Envelope, RpcError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Tracks, per peer, the highest `ts` already applied — spec §8's
/// "applying the same `event::CheckResult` twice leaves state unchanged"
/// is enforced here, before the envelope ever reaches a handler.
#[derive(Default)]
struct ReplayGuard {
    last_applied_ts: AtomicU64,
}

impl ReplayGuard {
    /// `true` if `ts` is new and should be dispatched.
    fn admit(&self, ts: f64) -> bool {
        let ts_bits = ts.to_bits();
        loop {
            let current = self.last_applied_ts.load(Ordering::Acquire);
            if ts_bits <= current && current != 0 {
                return false;
            }
            if self
                .last_applied_ts
                .compare_exchange(current, ts_bits, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }
}

pub struct PeerConnection {
    framed: FramedConnection,
    peer_endpoint: String,
    replay_guard: ReplayGuard,
}

impl PeerConnection {
    /// Performs the `icinga::Hello` exchange and returns a connection
    /// ready for `run`. `peer_endpoint` is the CN already verified by the
    /// TLS handshake (spec §4.C) — this layer trusts it completely.
    pub async fn handshake(mut framed: FramedConnection, peer_endpoint: String) -> Result<Self, RpcError> {
        let hello = Envelope::notification(
            METHOD_HELLO,
            serde_json::to_value(HelloParams { version: PROTOCOL_VERSION.to_owned() })?,
            now(),
        );
        framed.send(encode(&hello)?).await?;

        let received = tokio::time::timeout(HELLO_TIMEOUT, framed.recv())
            .await
            .map_err(|_| RpcError::Closed)??
            .ok_or(RpcError::Closed)?;
        let envelope = decode(&received)?;
        if envelope.method != METHOD_HELLO {
            return Err(RpcError::BadParams {
                method: envelope.method,
                reason: "expected icinga::Hello as the first message".to_owned(),
            });
        }
        let _hello: HelloParams = envelope.decode_params()?;

        Ok(PeerConnection {
            framed,
            peer_endpoint,
            replay_guard: ReplayGuard::default(),
        })
    }

    /// Drives the connection until it closes: reads frames (discarding
    /// stale replays and dispatching everything else onto `dispatcher`),
    /// writes whatever the caller pushes onto `outbound` (the relay's
    /// outgoing traffic for this peer), and sends `event::Heartbeat` on
    /// `HEARTBEAT_INTERVAL` — all three share the one `&mut` handle this
    /// task has on `framed`, so nothing else may touch it concurrently.
    pub async fn run(mut self, registry: Arc<FunctionRegistry>, dispatcher: Arc<Dispatcher>, mut outbound: mpsc::UnboundedReceiver<Vec<u8>>) -> Result<(), RpcError> {
        let mut heartbeat = tokio::time::interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);
        loop {
            tokio::select! {
                frame = tokio::time::timeout(IDLE_TIMEOUT, self.framed.recv()) => {
                    let frame = match frame {
                        Ok(Ok(Some(bytes))) => bytes,
                        Ok(Ok(None)) => return Ok(()),
                        Ok(Err(e)) => return Err(e.into()),
                        Err(_elapsed) => {
                            tracing::warn!(peer = %self.peer_endpoint, "connection idle for {:?}, disconnecting", IDLE_TIMEOUT);
                            return Err(RpcError::Closed);
                        }
                    };

                    let envelope = decode(&frame)?;
                    if envelope.method == METHOD_HEARTBEAT {
                        continue;
                    }
                    if !self.replay_guard.admit(envelope.ts) {
                        tracing::debug!(peer = %self.peer_endpoint, method = %envelope.method, ts = envelope.ts, "discarding stale replay");
                        continue;
                    }

                    let ctx = RequestContext {
                        peer_endpoint: self.peer_endpoint.clone(),
                        origin_zone: envelope.origin_zone.clone(),
                        ts: envelope.ts,
                    };
                    dispatcher.submit(&self.peer_endpoint, registry.clone(), envelope.method, envelope.params, ctx);
                }
                payload = outbound.recv() => {
                    match payload {
                        Some(payload) => {
                            if self.framed.send(payload).await.is_err() {
                                return Err(RpcError::Closed);
                            }
                        }
                        None => return Ok(()),
                    }
                }
                _ = heartbeat.tick() => {
                    let envelope = Envelope::notification(METHOD_HEARTBEAT, serde_json::json!({ "timeout": HEARTBEAT_TIMEOUT_SECS }), now());
                    if let Ok(bytes) = encode(&envelope) {
                        let _ = self.framed.send(bytes).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_protocol::{CheckResultParams, WireCheckResult, METHOD_CHECK_RESULT};

    fn sample_cr_envelope(ts: f64) -> Envelope {
        Envelope::notification(
            METHOD_CHECK_RESULT,
            serde_json::to_value(CheckResultParams {
                host: "web1".to_owned(),
                service: None,
                cr: WireCheckResult {
                    scheduled_start: ts,
                    execution_start: ts,
                    execution_end: ts,
                    exit_status: 0,
                    output: "ok".to_owned(),
                    perfdata: vec![],
                    schedule_end: ts,
                    command_name: "hostalive".to_owned(),
                },
            })
            .unwrap(),
            ts,
        )
    }

    #[tokio::test]
    async fn handshake_exchanges_hello_on_both_ends() {
        let (a, b) = tokio::io::duplex(8192);
        let framed_a = FramedConnection::new(Box::new(a), 8);
        let framed_b = FramedConnection::new(Box::new(b), 8);

        let (res_a, res_b) = tokio::join!(
            PeerConnection::handshake(framed_a, "master1".to_owned()),
            PeerConnection::handshake(framed_b, "satellite1".to_owned())
        );
        assert!(res_a.is_ok());
        assert!(res_b.is_ok());
    }

    #[tokio::test]
    async fn replay_guard_discards_non_increasing_timestamps() {
        let guard = ReplayGuard::default();
        assert!(guard.admit(1.0));
        assert!(guard.admit(2.0));
        assert!(!guard.admit(2.0), "duplicate ts must be discarded");
        assert!(!guard.admit(1.5), "older ts must be discarded");
        assert!(guard.admit(3.0));
    }

    #[tokio::test]
    async fn run_dispatches_new_events_and_discards_replayed_ones() {
        use std::sync::Mutex;

        let (client, server) = tokio::io::duplex(1 << 16);
        let client = FramedConnection::new(Box::new(client), 8);
        let server = FramedConnection::new(Box::new(server), 8);

        let (conn, peer) = tokio::join!(
            PeerConnection::handshake(client, "satellite1".to_owned()),
            PeerConnection::handshake(server, "master1".to_owned())
        );
        let conn = conn.unwrap();
        let mut peer = peer.unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let mut registry = FunctionRegistry::new();
        registry.register(
            METHOD_CHECK_RESULT,
            Arc::new(move |_params: serde_json::Value, ctx: &RequestContext| {
                seen2.lock().unwrap().push(ctx.ts);
                Ok(())
            }),
        );
        let registry = Arc::new(registry);
        let dispatcher = Arc::new(Dispatcher::start(2));

        let (_outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let run_handle = tokio::spawn(conn.run(registry, dispatcher.clone(), outbound_rx));

        for ts in [1.0, 2.0, 2.0, 3.0] {
            let envelope = sample_cr_envelope(ts);
            peer.framed.send(serde_json::to_vec(&envelope).unwrap()).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        peer.framed.shutdown().await;
        let _ = run_handle.await;
        Arc::try_unwrap(dispatcher).ok().unwrap().shutdown().await;

        assert_eq!(*seen.lock().unwrap(), vec![1.0, 2.0, 3.0]);
    }
}
