use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::get;
use clap::Parser;
use cml_acl::AclConfig;
use cml_core::{ClientPool, Settings, TransportMode, UrlPolicy};
use rmcp::ServiceExt;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::tower::StreamableHttpService;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, fmt};

mod elicit;
mod handler;
mod middleware;
mod tools;

use handler::GatewayHandler;
use middleware::GatewayState;

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_env("CML_MCP_LOG")).with_writer(std::io::stderr).init();

    let settings = Settings::parse();
    let transport_mode = settings.transport_mode();

    let acl = settings
        .cml_mcp_acl_file
        .as_deref()
        .map(std::path::Path::new)
        .and_then(AclConfig::load)
        .map(Arc::new);

    let pool = Arc::new(ClientPool::new(
        settings.cml_mcp_pool_max_entries,
        settings.cml_mcp_pool_max_per_key,
        settings.pool_ttl(),
        transport_mode,
    ));

    match transport_mode {
        TransportMode::Stdio => run_stdio(settings, pool, acl).await,
        TransportMode::Http => run_http(settings, pool, acl).await,
    }
}

async fn run_stdio(settings: Settings, pool: Arc<ClientPool>, acl: Option<Arc<AclConfig>>) -> Result<()> {
    let url = settings.cml_url.clone().context("CML_URL is required for stdio transport")?;
    let username = settings.cml_username.clone().unwrap_or_default();
    let password = settings.cml_password.clone().unwrap_or_default();
    let normalized = cml_core::url::normalize(&url)?;

    let key = (normalized, settings.cml_verify_ssl);
    let lease = pool.acquire(key.clone(), &username, &password).await?;
    lease.client.login().await?;

    let ctx = cml_core::RequestContext::new(lease.client.clone(), key, username);
    let handler = GatewayHandler::new(acl);

    tracing::info!(url = %settings.cml_url.unwrap_or_default(), "Starting CML MCP gateway on stdio");

    ctx.scope(async move {
        let stdio = rmcp::transport::io::stdio();
        let server = handler.serve(stdio).await?;
        server.waiting().await?;
        Ok::<_, anyhow::Error>(())
    })
    .await?;

    tracing::info!("CML MCP gateway shutting down");
    Ok(())
}

async fn run_http(settings: Settings, pool: Arc<ClientPool>, acl: Option<Arc<AclConfig>>) -> Result<()> {
    let url_policy = Arc::new(UrlPolicy::new(
        &settings.cml_allowed_urls,
        settings.cml_url_pattern.as_deref(),
        settings.cml_mcp_require_url_policy,
    )?);

    let state = Arc::new(GatewayState {
        pool,
        url_policy,
        default_url: settings.cml_url.clone(),
    });

    let acl_for_factory = acl.clone();
    let handler_factory = move || -> Result<GatewayHandler, std::io::Error> { Ok(GatewayHandler::new(acl_for_factory.clone())) };

    let session_mgr = LocalSessionManager::default();
    let mcp_service = StreamableHttpService::new(handler_factory, Arc::new(session_mgr), Default::default());

    let mcp_router = Router::new()
        .nest_service("/mcp", mcp_service)
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::ingress));

    let app = Router::new().route("/health", get(health)).merge(mcp_router).layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", settings.cml_mcp_host, settings.cml_mcp_port);
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(%addr, "Starting CML MCP gateway on http");
    axum::serve(listener, app).await.context("http server error")?;

    Ok(())
}

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "healthy", "service": "cml-mcp" }))
}
