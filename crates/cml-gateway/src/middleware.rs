//! Ingress middleware (C5): header parsing, URL policy, client leasing,
//! and request-context installation for every inbound MCP request.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use axum::http::StatusCode;
use cml_core::{AuxCredentials, ClientPool, GatewayError, RequestContext, UrlPolicy};

/// Shared state threaded into the ingress middleware.
pub struct GatewayState {
    pub pool: Arc<ClientPool>,
    pub url_policy: Arc<UrlPolicy>,
    pub default_url: Option<String>,
}

struct BasicCredentials {
    username: String,
    password: String,
}

fn parse_basic(header_value: &str) -> Result<BasicCredentials, GatewayError> {
    let rest = header_value
        .get(0..6)
        .filter(|prefix| prefix.eq_ignore_ascii_case("Basic "))
        .map(|_| &header_value[6..])
        .ok_or(GatewayError::BadAuthHeaderFormat)?;

    let decoded = B64.decode(rest.trim()).map_err(|e| GatewayError::BadAuthEncoding(e.to_string()))?;
    let decoded = String::from_utf8(decoded).map_err(|e| GatewayError::BadAuthEncoding(e.to_string()))?;

    let (username, password) = decoded.split_once(':').ok_or(GatewayError::BadAuthHeaderFormat)?;
    Ok(BasicCredentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

fn parse_enable_password(header_value: &str) -> Result<String, GatewayError> {
    let rest = header_value
        .get(0..6)
        .filter(|prefix| prefix.eq_ignore_ascii_case("Basic "))
        .map(|_| &header_value[6..])
        .ok_or(GatewayError::BadAuthHeaderFormat)?;
    let decoded = B64.decode(rest.trim()).map_err(|e| GatewayError::BadAuthEncoding(e.to_string()))?;
    String::from_utf8(decoded).map_err(|e| GatewayError::BadAuthEncoding(e.to_string()))
}

/// Releases a pool lease on drop even if the guarded future is dropped
/// without completing (client disconnect, cancellation). Normal exit
/// paths call `release` explicitly and disarm the guard so the drop path
/// never double-releases.
struct LeaseGuard {
    pool: Arc<ClientPool>,
    key: cml_core::PoolKey,
    armed: bool,
}

impl LeaseGuard {
    async fn release(mut self) {
        self.armed = false;
        self.pool.release(&self.key).await;
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if self.armed {
            let pool = self.pool.clone();
            let key = self.key.clone();
            tokio::spawn(async move {
                pool.release(&key).await;
            });
        }
    }
}

pub async fn ingress(State(state): State<Arc<GatewayState>>, req: Request, next: Next) -> Response {
    match run(state, req, next).await {
        Ok(resp) => resp,
        Err(err) => {
            tracing::warn!(error = %err, "ingress middleware rejected request");
            let status = match &err {
                GatewayError::MissingAuthHeader | GatewayError::BadAuthHeaderFormat | GatewayError::BadAuthEncoding(_) => {
                    StatusCode::UNAUTHORIZED
                }
                GatewayError::MissingTarget => StatusCode::BAD_REQUEST,
                GatewayError::UrlNotAllowed(_) | GatewayError::UrlPatternMismatch(_) | GatewayError::AllowPolicyUnset => {
                    StatusCode::FORBIDDEN
                }
                GatewayError::PerKeyLimit(_, _) => StatusCode::TOO_MANY_REQUESTS,
                GatewayError::UpstreamAuthFailed(_) => StatusCode::UNAUTHORIZED,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, err.to_string()).into_response()
        }
    }
}

async fn run(state: Arc<GatewayState>, req: Request, next: Next) -> Result<Response, GatewayError> {
    let headers = req.headers().clone();

    let target = headers
        .get("X-CML-Server-URL")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| state.default_url.clone())
        .ok_or(GatewayError::MissingTarget)?;
    let normalized = state.url_policy.validate(&target)?;

    let verify_ssl = headers
        .get("X-CML-Verify-SSL")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let primary = headers
        .get("X-Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(GatewayError::MissingAuthHeader)
        .and_then(parse_basic)?;

    let mut aux = AuxCredentials::default();
    if let Some(value) = headers.get("X-PyATS-Authorization").and_then(|v| v.to_str().ok()) {
        let creds = parse_basic(value)?;
        aux.username = Some(creds.username);
        aux.password = Some(creds.password);
    }
    if let Some(value) = headers.get("X-PyATS-Enable").and_then(|v| v.to_str().ok()) {
        aux.enable_password = Some(parse_enable_password(value)?);
    }

    let key: cml_core::PoolKey = (normalized, verify_ssl);
    let lease = state.pool.acquire(key.clone(), &primary.username, &primary.password).await?;

    let guard = LeaseGuard {
        pool: state.pool.clone(),
        key: key.clone(),
        armed: true,
    };

    let login_result = lease.client.login().await;
    if let Err(e) = login_result {
        guard.release().await;
        return Err(e);
    }

    let ctx = RequestContext::new(lease.client.clone(), key, primary.username).with_aux_credentials(aux);

    let response = ctx.scope(next.run(req)).await;
    guard.release().await;
    Ok(response)
}
