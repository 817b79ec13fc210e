//! Core of the CML MCP gateway: upstream client, connection pool,
//! request-scoped context, URL policy, and settings.

pub mod client;
pub mod context;
pub mod error;
pub mod pool;
pub mod settings;
pub mod url;

pub use client::{TransportMode, UpstreamClient};
pub use context::{AuxCredentials, RequestContext};
pub use error::{GatewayError, GatewayResult};
pub use pool::{ClientPool, Lease, PoolEntryStats, PoolKey, PoolStats};
pub use settings::{Settings, TransportKind};
pub use url::UrlPolicy;
