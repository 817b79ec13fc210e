//! User and group lookup tools.

use cml_core::{GatewayResult, RequestContext};
use serde_json::Value;

use super::{BoxFuture, ToolSpec, require_str};

fn get_cml_users(ctx: &RequestContext, _args: Value) -> BoxFuture<'_, GatewayResult<Value>> {
    Box::pin(async move { ctx.client.get("/users", None).await })
}

fn get_cml_user(ctx: &RequestContext, args: Value) -> BoxFuture<'_, GatewayResult<Value>> {
    Box::pin(async move {
        let uid = require_str(&args, "user_id")?.to_string();
        ctx.client.get(&format!("/users/{uid}"), None).await
    })
}

fn get_cml_groups(ctx: &RequestContext, _args: Value) -> BoxFuture<'_, GatewayResult<Value>> {
    Box::pin(async move { ctx.client.get("/groups", None).await })
}

fn empty_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

fn user_id_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": { "user_id": { "type": "string", "description": "User UUID" } },
        "required": ["user_id"],
    })
}

pub static TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "get_cml_users",
        description: "List all users.",
        input_schema: empty_schema,
        destructive: false,
        handler: get_cml_users,
    },
    ToolSpec {
        name: "get_cml_user",
        description: "Get a single user's details by UUID.",
        input_schema: user_id_schema,
        destructive: false,
        handler: get_cml_user,
    },
    ToolSpec {
        name: "get_cml_groups",
        description: "List all groups.",
        input_schema: empty_schema,
        destructive: false,
        handler: get_cml_groups,
    },
];
