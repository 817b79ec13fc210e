//! Gateway configuration (A1): CLI flags with environment-variable fallback.

use clap::Parser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TransportKind {
    Stdio,
    Http,
}

/// Settings for the CML MCP gateway.
///
/// Every field can be supplied as a flag or via its `CML_*`/`CML_MCP_*`
/// environment variable; flags take precedence.
#[derive(Debug, Parser, Clone)]
#[command(name = "cml-mcp-gateway", about = "MCP gateway brokering tool calls to Cisco Modeling Labs")]
pub struct Settings {
    /// Transport to serve: stdio for single-tenant use, http for multi-tenant.
    #[arg(long, env = "CML_MCP_TRANSPORT", value_enum, default_value = "stdio")]
    pub cml_mcp_transport: TransportKind,

    /// Address to bind the HTTP server to (http transport only).
    #[arg(long, env = "CML_MCP_HOST", default_value = "127.0.0.1")]
    pub cml_mcp_host: String,

    /// Port to bind the HTTP server to (http transport only).
    #[arg(long, env = "CML_MCP_PORT", default_value_t = 8443)]
    pub cml_mcp_port: u16,

    /// Default CML server URL (stdio transport, or as an http fallback when
    /// the caller omits the X-CML-Server-URL header).
    #[arg(long, env = "CML_URL")]
    pub cml_url: Option<String>,

    /// Default CML username (stdio transport only).
    #[arg(long, env = "CML_USERNAME")]
    pub cml_username: Option<String>,

    /// Default CML password (stdio transport only).
    #[arg(long, env = "CML_PASSWORD")]
    pub cml_password: Option<String>,

    /// Verify upstream TLS certificates.
    #[arg(long, env = "CML_VERIFY_SSL", default_value_t = true)]
    pub cml_verify_ssl: bool,

    /// Comma-separated list of CML server URLs callers may target (http transport).
    #[arg(long, env = "CML_ALLOWED_URLS", value_delimiter = ',')]
    pub cml_allowed_urls: Vec<String>,

    /// Regex a caller-supplied CML server URL must fully match (http transport).
    #[arg(long, env = "CML_URL_PATTERN")]
    pub cml_url_pattern: Option<String>,

    /// Reject caller-supplied CML server URLs unless an allow-list or
    /// pattern is configured (http transport). Fail-closed by default.
    #[arg(long, env = "CML_MCP_REQUIRE_URL_POLICY", default_value_t = true)]
    pub cml_mcp_require_url_policy: bool,

    /// Path to a YAML per-user tool ACL file (http transport).
    #[arg(long, env = "CML_MCP_ACL_FILE")]
    pub cml_mcp_acl_file: Option<String>,

    /// Maximum number of distinct upstream clients kept warm in the pool.
    #[arg(long, env = "CML_MCP_POOL_MAX_ENTRIES", default_value_t = 32)]
    pub cml_mcp_pool_max_entries: usize,

    /// Maximum concurrent leases against a single pooled client.
    #[arg(long, env = "CML_MCP_POOL_MAX_PER_KEY", default_value_t = 8)]
    pub cml_mcp_pool_max_per_key: u32,

    /// Seconds an idle pooled client may sit before it is evicted.
    #[arg(long, env = "CML_MCP_POOL_TTL_SECS", default_value_t = 300)]
    pub cml_mcp_pool_ttl_secs: u64,
}

impl Settings {
    pub fn transport_mode(&self) -> crate::client::TransportMode {
        match self.cml_mcp_transport {
            TransportKind::Stdio => crate::client::TransportMode::Stdio,
            TransportKind::Http => crate::client::TransportMode::Http,
        }
    }

    pub fn pool_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cml_mcp_pool_ttl_secs)
    }
}
