//! The API-function registry: the set of JSON-RPC methods this node
//! accepts from a peer (spec §4.D).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RpcError;

/// Who sent the envelope being dispatched, for handlers that need to
/// check zone ACLs or authority before acting.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub peer_endpoint: String,
    pub origin_zone: Option<String>,
    pub ts: f64,
}

#[async_trait]
pub trait ApiFunction: Send + Sync {
    async fn call(&self, params: Value, ctx: &RequestContext) -> Result<(), RpcError>;
}

#[async_trait]
impl<F> ApiFunction for F
where
    F: Fn(Value, &RequestContext) -> Result<(), RpcError> + Send + Sync,
{
    async fn call(&self, params: Value, ctx: &RequestContext) -> Result<(), RpcError> {
        self(params, ctx)
    }
}

#[derive(Default, Clone)]
pub struct FunctionRegistry {
    handlers: HashMap<String, Arc<dyn ApiFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        FunctionRegistry::default()
    }

    pub fn register(&mut self, method: impl Into<String>, handler: Arc<dyn ApiFunction>) {
        self.handlers.insert(method.into(), handler);
    }

    pub async fn dispatch(&self, method: &str, params: Value, ctx: &RequestContext) -> Result<(), RpcError> {
        let handler = self
            .handlers
            .get(method)
            .ok_or_else(|| RpcError::UnknownMethod(method.to_owned()))?;
        handler.call(params, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn dispatch_routes_to_the_registered_handler() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let mut registry = FunctionRegistry::new();
        registry.register(
            "event::CheckResult",
            Arc::new(move |_params: Value, _ctx: &RequestContext| {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        let ctx = RequestContext {
            peer_endpoint: "satellite1".to_owned(),
            origin_zone: Some("satellite".to_owned()),
            ts: 1.0,
        };
        registry
            .dispatch("event::CheckResult", Value::Null, &ctx)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dispatch_rejects_unknown_methods() {
        let registry = FunctionRegistry::new();
        let ctx = RequestContext {
            peer_endpoint: "satellite1".to_owned(),
            origin_zone: None,
            ts: 1.0,
        };
        let err = registry.dispatch("bogus::Method", Value::Null, &ctx).await.unwrap_err();
        assert!(matches!(err, RpcError::UnknownMethod(m) if m == "bogus::Method"));
    }
}
