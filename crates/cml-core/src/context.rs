//! Per-request context, propagated via a cooperative task-local (C4).
//!
//! This is the Rust analogue of a `contextvars.ContextVar`-scoped request:
//! the ingress layer installs a [`RequestContext`] for the lifetime of one
//! inbound MCP request, and tool handlers retrieve it without it being
//! threaded explicitly through every call.

use std::sync::Arc;
use std::future::Future;

use crate::client::UpstreamClient;
use crate::error::{GatewayError, GatewayResult};
use crate::pool::PoolKey;

tokio::task_local! {
    static REQUEST_CTX: RequestContext;
}

/// Optional pyATS device-automation credentials carried alongside the
/// primary CML session, populated only when the corresponding headers
/// were present and well-formed.
#[derive(Clone, Default)]
pub struct AuxCredentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub enable_password: Option<String>,
}

/// State scoped to a single inbound MCP request.
#[derive(Clone)]
pub struct RequestContext {
    pub client: Arc<UpstreamClient>,
    pub pool_key: PoolKey,
    pub username: String,
    pub aux_credentials: AuxCredentials,
}

impl RequestContext {
    pub fn new(client: Arc<UpstreamClient>, pool_key: PoolKey, username: String) -> Self {
        Self {
            client,
            pool_key,
            username,
            aux_credentials: AuxCredentials::default(),
        }
    }

    pub fn with_aux_credentials(mut self, aux: AuxCredentials) -> Self {
        self.aux_credentials = aux;
        self
    }

    /// Run `fut` with `self` installed as the ambient request context.
    pub async fn scope<F, T>(self, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        REQUEST_CTX.scope(self, fut).await
    }

    /// Retrieve the context installed for the current task, if any.
    ///
    /// Returns [`GatewayError::NoContext`] when called outside a request
    /// scope (e.g. a bug calling a tool handler from a bare background task).
    pub fn current() -> GatewayResult<RequestContext> {
        REQUEST_CTX.try_with(|ctx| ctx.clone()).map_err(|_| GatewayError::NoContext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::TransportMode;

    #[tokio::test]
    async fn current_fails_outside_scope() {
        assert!(matches!(RequestContext::current(), Err(GatewayError::NoContext)));
    }

    #[tokio::test]
    async fn current_succeeds_inside_scope() {
        let client = Arc::new(UpstreamClient::new("https://cml1.example.com", "u", "p", TransportMode::Http, true).unwrap());
        let ctx = RequestContext::new(client, ("https://cml1.example.com".into(), true), "u".into());

        ctx.scope(async {
            let current = RequestContext::current().unwrap();
            assert_eq!(current.username, "u");
        })
        .await;
    }

    #[tokio::test]
    async fn each_task_sees_its_own_context() {
        let client_a = Arc::new(UpstreamClient::new("https://a.example.com", "alice", "p", TransportMode::Http, true).unwrap());
        let client_b = Arc::new(UpstreamClient::new("https://b.example.com", "bob", "p", TransportMode::Http, true).unwrap());

        let ctx_a = RequestContext::new(client_a, ("https://a.example.com".into(), true), "alice".into());
        let ctx_b = RequestContext::new(client_b, ("https://b.example.com".into(), true), "bob".into());

        let (a, b) = tokio::join!(
            ctx_a.scope(async { RequestContext::current().unwrap().username }),
            ctx_b.scope(async { RequestContext::current().unwrap().username }),
        );
        assert_eq!(a, "alice");
        assert_eq!(b, "bob");
    }
}
