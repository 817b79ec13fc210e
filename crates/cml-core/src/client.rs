//! Upstream CML REST client (C2).

use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{GatewayError, GatewayResult};

const API_TIMEOUT: Duration = Duration::from_secs(10);

/// How the gateway was started: `Http` means credentials arrive per
/// request via headers; `Stdio` means they are fixed at process start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Stdio,
    Http,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdminFlag {
    Unknown,
    True,
    False,
}

struct MutableState {
    username: String,
    password: String,
    token: Option<String>,
    admin: AdminFlag,
}

/// Authenticated REST client bound to a single CML host.
///
/// Mutable credential/token/admin-cache fields are held behind a mutex;
/// they are rebound only under the pool's lease path or by the request
/// that currently holds the lease, so contention is never real (§5).
pub struct UpstreamClient {
    base_url: String,
    api_base: String,
    tls_verification: bool,
    transport_mode: TransportMode,
    http: reqwest::Client,
    state: Mutex<MutableState>,
}

impl UpstreamClient {
    pub fn new(host: &str, username: &str, password: &str, transport_mode: TransportMode, tls_verification: bool) -> GatewayResult<Self> {
        let base_url = host.trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!tls_verification)
            .timeout(API_TIMEOUT)
            .build()?;

        Ok(Self {
            api_base: format!("{base_url}/api/v0"),
            base_url,
            tls_verification,
            transport_mode,
            http,
            state: Mutex::new(MutableState {
                username: username.to_string(),
                password: password.to_string(),
                token: None,
                admin: AdminFlag::Unknown,
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tls_verification(&self) -> bool {
        self.tls_verification
    }

    /// Replace credentials in place; clears the token and admin cache so a
    /// reused pooled client never leaks one caller's session to another.
    pub async fn rebind(&self, username: &str, password: &str) {
        let mut state = self.state.lock().await;
        state.username = username.to_string();
        state.password = password.to_string();
        state.token = None;
        state.admin = AdminFlag::Unknown;
    }

    pub async fn username(&self) -> String {
        self.state.lock().await.username.clone()
    }

    pub async fn password(&self) -> String {
        self.state.lock().await.password.clone()
    }

    /// Authenticate with the CML API and cache the bearer token.
    pub async fn login(&self) -> GatewayResult<()> {
        let (username, password) = {
            let state = self.state.lock().await;
            (state.username.clone(), state.password.clone())
        };

        let url = format!("{}/authenticate", self.api_base);
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::UpstreamAuthFailed(format!("HTTP {status}: {body}")));
        }

        let token: String = resp.json().await?;
        self.state.lock().await.token = Some(token);
        tracing::info!(host = %self.base_url, "Authenticated with CML API");
        Ok(())
    }

    /// Ensure we hold a valid token before issuing a request.
    ///
    /// In stdio mode an existing token is probed via `/authok` and cleared
    /// on 401 before a fresh login. In http mode every request re-logs in,
    /// so mixing identities on a reused token can never happen (§4.2).
    pub async fn ensure_authenticated(&self) -> GatewayResult<()> {
        if self.transport_mode == TransportMode::Stdio {
            let has_token = self.state.lock().await.token.is_some();
            if has_token {
                let url = format!("{}/authok", self.api_base);
                match self.authorized_request(reqwest::Method::GET, &url, None).await {
                    Ok(_) => return Ok(()),
                    Err(GatewayError::Upstream { status: 401, .. }) => {
                        tracing::debug!("Authentication probe failed, re-authenticating");
                        self.state.lock().await.token = None;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        if self.transport_mode == TransportMode::Http || self.state.lock().await.token.is_none() {
            self.login().await?;
        }
        Ok(())
    }

    /// Resolve whether the current user is a CML admin.
    ///
    /// Cached for the process lifetime in stdio mode; always re-resolved in
    /// http mode, since the underlying credentials may change per request.
    pub async fn is_admin(&self) -> bool {
        if self.transport_mode == TransportMode::Stdio {
            let cached = self.state.lock().await.admin;
            match cached {
                AdminFlag::True => return true,
                AdminFlag::False => return false,
                AdminFlag::Unknown => {}
            }
            if self.ensure_authenticated().await.is_err() {
                return false;
            }
        }

        let username = self.username().await;
        let result: GatewayResult<bool> = async {
            let user_id: Value = self.get(&format!("/users/{username}/id"), None).await?;
            let user_id = user_id.as_str().unwrap_or_default().to_string();
            let user: Value = self.get(&format!("/users/{user_id}"), None).await?;
            Ok(user.get("admin").and_then(Value::as_bool).unwrap_or(false))
        }
        .await;

        match result {
            Ok(admin) => {
                if self.transport_mode == TransportMode::Stdio {
                    self.state.lock().await.admin = if admin { AdminFlag::True } else { AdminFlag::False };
                }
                admin
            }
            Err(e) => {
                tracing::error!(error = %e, "Error checking admin status");
                false
            }
        }
    }

    pub async fn get(&self, endpoint: &str, params: Option<&[(&str, &str)]>) -> GatewayResult<Value> {
        if self.transport_mode == TransportMode::Stdio {
            self.ensure_authenticated().await?;
        }
        let url = format!("{}{endpoint}", self.api_base);
        self.get_impl(&url, params).await
    }

    async fn get_impl(&self, url: &str, params: Option<&[(&str, &str)]>) -> GatewayResult<Value> {
        let mut req = self.http.get(url);
        if let Some(params) = params {
            req = req.query(params);
        }
        let resp = self.send_authorized(req).await?;
        Self::json_or_null(resp).await
    }

    pub async fn post(&self, endpoint: &str, body: Option<&Value>) -> GatewayResult<Value> {
        if self.transport_mode == TransportMode::Stdio {
            self.ensure_authenticated().await?;
        }
        let url = format!("{}{endpoint}", self.api_base);
        let mut req = self.http.post(&url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = self.send_authorized(req).await?;
        Self::json_or_null(resp).await
    }

    pub async fn put(&self, endpoint: &str, body: Option<&Value>) -> GatewayResult<Value> {
        if self.transport_mode == TransportMode::Stdio {
            self.ensure_authenticated().await?;
        }
        let url = format!("{}{endpoint}", self.api_base);
        let mut req = self.http.put(&url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = self.send_authorized(req).await?;
        Self::json_or_null(resp).await
    }

    pub async fn patch(&self, endpoint: &str, body: Option<&Value>) -> GatewayResult<Value> {
        if self.transport_mode == TransportMode::Stdio {
            self.ensure_authenticated().await?;
        }
        let url = format!("{}{endpoint}", self.api_base);
        let mut req = self.http.patch(&url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = self.send_authorized(req).await?;
        Self::json_or_null(resp).await
    }

    pub async fn delete(&self, endpoint: &str) -> GatewayResult<Value> {
        if self.transport_mode == TransportMode::Stdio {
            self.ensure_authenticated().await?;
        }
        let url = format!("{}{endpoint}", self.api_base);
        let resp = self.send_authorized(self.http.delete(&url)).await?;
        Self::json_or_null(resp).await
    }

    /// Fetch bytes (e.g. a lab topology download) rather than decoding JSON.
    pub async fn get_binary(&self, endpoint: &str) -> GatewayResult<Vec<u8>> {
        if self.transport_mode == TransportMode::Stdio {
            self.ensure_authenticated().await?;
        }
        let url = format!("{}{endpoint}", self.api_base);
        let resp = self.send_authorized(self.http.get(&url)).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    async fn authorized_request(&self, method: reqwest::Method, url: &str, body: Option<&Value>) -> GatewayResult<Option<Value>> {
        let mut req = self.http.request(method, url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = self.send_authorized(req).await?;
        Self::json_or_null(resp).await.map(Some)
    }

    async fn send_authorized(&self, mut req: reqwest::RequestBuilder) -> GatewayResult<reqwest::Response> {
        let token = self.state.lock().await.token.clone();
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(GatewayError::Upstream { status, body })
        }
    }

    async fn json_or_null(resp: reqwest::Response) -> GatewayResult<Value> {
        if resp.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        Ok(resp.json().await.unwrap_or(Value::Null))
    }

    /// Drop the underlying connection pool. Idempotent (dropping twice is a no-op).
    pub async fn close(&self) {
        tracing::debug!(host = %self.base_url, "Closing upstream client");
    }
}
