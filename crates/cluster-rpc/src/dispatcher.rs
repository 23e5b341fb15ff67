//! Hashed worker-pool dispatch (spec §4.D): every inbound method call is
//! routed to a fixed worker by hashing the connection's peer identity, so
//! calls from the same peer are always processed in order on the same
//! worker while different peers fan out across the pool.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::registry::{FunctionRegistry, RequestContext};

/// The same string hash the authority election uses (`Utility::SDBM` in
/// the original), reused here purely because it is already the
/// established "deterministically bucket a name" primitive in this
/// codebase.
pub fn sdbm_hash(s: &str) -> u64 {
    let mut hash: u64 = 0;
    for byte in s.bytes() {
        hash = (byte as u64).wrapping_add(hash << 6).wrapping_add(hash << 16).wrapping_sub(hash);
    }
    hash
}

struct DispatchJob {
    registry: Arc<FunctionRegistry>,
    method: String,
    params: Value,
    ctx: RequestContext,
}

pub struct Dispatcher {
    senders: Vec<mpsc::UnboundedSender<DispatchJob>>,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    pub fn start(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let mut senders = Vec::with_capacity(worker_count);
        let mut workers = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let (tx, mut rx) = mpsc::unbounded_channel::<DispatchJob>();
            senders.push(tx);
            workers.push(tokio::spawn(async move {
                while let Some(job) = rx.recv().await {
                    if let Err(e) = job.registry.dispatch(&job.method, job.params, &job.ctx).await {
                        tracing::warn!(method = %job.method, peer = %job.ctx.peer_endpoint, error = %e, "api call failed");
                    }
                }
            }));
        }
        Dispatcher { senders, workers }
    }

    pub fn worker_for(&self, connection_key: &str) -> usize {
        (sdbm_hash(connection_key) % self.senders.len() as u64) as usize
    }

    pub fn submit(&self, connection_key: &str, registry: Arc<FunctionRegistry>, method: String, params: Value, ctx: RequestContext) {
        let idx = self.worker_for(connection_key);
        let _ = self.senders[idx].send(DispatchJob { registry, method, params, ctx });
    }

    pub async fn shutdown(self) {
        drop(self.senders);
        for w in self.workers {
            let _ = w.await;
        }
    }
}
