//! Per-user tool access control for the CML MCP gateway.

pub mod config;
pub mod decision;
pub mod error;

pub use config::{AclConfig, UserConfig};
pub use error::AclError;
