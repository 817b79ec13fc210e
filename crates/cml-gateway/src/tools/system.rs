//! System information, health, statistics, and licensing tools.

use cml_core::{GatewayResult, RequestContext};
use serde_json::Value;

use super::{BoxFuture, ToolSpec};

fn get_cml_information(ctx: &RequestContext, _args: Value) -> BoxFuture<'_, GatewayResult<Value>> {
    Box::pin(async move { ctx.client.get("/system_information", None).await })
}

fn get_cml_status(ctx: &RequestContext, _args: Value) -> BoxFuture<'_, GatewayResult<Value>> {
    Box::pin(async move { ctx.client.get("/system_health", None).await })
}

fn get_cml_statistics(ctx: &RequestContext, _args: Value) -> BoxFuture<'_, GatewayResult<Value>> {
    Box::pin(async move { ctx.client.get("/system_stats", None).await })
}

fn get_cml_licensing_details(ctx: &RequestContext, _args: Value) -> BoxFuture<'_, GatewayResult<Value>> {
    Box::pin(async move { ctx.client.get("/licensing", None).await })
}

fn empty_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

pub static TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "get_cml_information",
        description: "Get server info: version, hostname, system uptime, ready status, and configuration details.",
        input_schema: empty_schema,
        destructive: false,
        handler: get_cml_information,
    },
    ToolSpec {
        name: "get_cml_status",
        description: "Get health status: compute, controller, virl2, and overall system health indicators.",
        input_schema: empty_schema,
        destructive: false,
        handler: get_cml_status,
    },
    ToolSpec {
        name: "get_cml_statistics",
        description: "Get resource usage: CPU, memory, disk, and running labs/nodes/links counts.",
        input_schema: empty_schema,
        destructive: false,
        handler: get_cml_statistics,
    },
    ToolSpec {
        name: "get_cml_licensing_details",
        description: "Get licensing info: registration status, features, node limits, and expiration dates.",
        input_schema: empty_schema,
        destructive: false,
        handler: get_cml_licensing_details,
    },
];
