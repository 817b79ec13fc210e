//! Representative tool surface: thin HTTP-verb adapters over the CML REST
//! API. Each module covers one resource family; `registry()` flattens them
//! into the dispatch table consulted by ACL filtering and `call_tool`.

pub mod labs;
pub mod nodes;
pub mod system;
pub mod users_groups;

use std::future::Future;
use std::pin::Pin;

use cml_core::{GatewayResult, RequestContext};
use serde_json::Value;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type HandlerFn = for<'a> fn(&'a RequestContext, Value) -> BoxFuture<'a, GatewayResult<Value>>;

/// Static metadata plus handler for one MCP tool.
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: fn() -> Value,
    pub destructive: bool,
    pub handler: HandlerFn,
}

pub fn registry() -> Vec<&'static ToolSpec> {
    let mut all = Vec::new();
    all.extend(system::TOOLS.iter());
    all.extend(labs::TOOLS.iter());
    all.extend(nodes::TOOLS.iter());
    all.extend(users_groups::TOOLS.iter());
    all
}

pub fn find(name: &str) -> Option<&'static ToolSpec> {
    registry().into_iter().find(|t| t.name == name)
}

/// Parse `args`' `lab_id` field, erroring with a tool-shaped message if missing.
pub(crate) fn require_str<'a>(args: &'a Value, field: &str) -> Result<&'a str, cml_core::GatewayError> {
    args.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| cml_core::GatewayError::InvalidArguments(format!("missing required field '{field}'")))
}
