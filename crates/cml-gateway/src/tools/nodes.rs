//! Node lifecycle tools: list, start, stop, wipe, delete.

use cml_core::{GatewayResult, RequestContext};
use serde_json::Value;

use super::{BoxFuture, ToolSpec, require_str};

fn get_cml_nodes(ctx: &RequestContext, args: Value) -> BoxFuture<'_, GatewayResult<Value>> {
    Box::pin(async move {
        let lid = require_str(&args, "lab_id")?.to_string();
        ctx.client
            .get(
                &format!("/labs/{lid}/nodes"),
                Some(&[("data", "true"), ("operational", "true"), ("exclude_configurations", "true")]),
            )
            .await
    })
}

fn start_cml_node(ctx: &RequestContext, args: Value) -> BoxFuture<'_, GatewayResult<Value>> {
    Box::pin(async move {
        let lid = require_str(&args, "lab_id")?.to_string();
        let nid = require_str(&args, "node_id")?.to_string();
        ctx.client.put(&format!("/labs/{lid}/nodes/{nid}/state/start"), None).await?;

        let wait = args.get("wait_for_convergence").and_then(Value::as_bool).unwrap_or(false);
        if wait {
            loop {
                let converged = ctx.client.get(&format!("/labs/{lid}/nodes/{nid}/check_if_converged"), None).await?;
                if converged.as_bool().unwrap_or(false) {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_secs(3)).await;
            }
        }
        Ok(Value::Bool(true))
    })
}

fn stop_cml_node(ctx: &RequestContext, args: Value) -> BoxFuture<'_, GatewayResult<Value>> {
    Box::pin(async move {
        let lid = require_str(&args, "lab_id")?.to_string();
        let nid = require_str(&args, "node_id")?.to_string();
        stop_node(ctx, &lid, &nid).await?;
        Ok(Value::Bool(true))
    })
}

async fn stop_node(ctx: &RequestContext, lid: &str, nid: &str) -> GatewayResult<()> {
    ctx.client.put(&format!("/labs/{lid}/nodes/{nid}/state/stop"), None).await?;
    Ok(())
}

async fn wipe_node(ctx: &RequestContext, lid: &str, nid: &str) -> GatewayResult<()> {
    ctx.client.put(&format!("/labs/{lid}/nodes/{nid}/wipe_disks"), None).await?;
    Ok(())
}

fn wipe_cml_node(ctx: &RequestContext, args: Value) -> BoxFuture<'_, GatewayResult<Value>> {
    Box::pin(async move {
        let lid = require_str(&args, "lab_id")?.to_string();
        let nid = require_str(&args, "node_id")?.to_string();
        wipe_node(ctx, &lid, &nid).await?;
        Ok(Value::Bool(true))
    })
}

fn delete_cml_node(ctx: &RequestContext, args: Value) -> BoxFuture<'_, GatewayResult<Value>> {
    Box::pin(async move {
        let lid = require_str(&args, "lab_id")?.to_string();
        let nid = require_str(&args, "node_id")?.to_string();
        stop_node(ctx, &lid, &nid).await.ok();
        wipe_node(ctx, &lid, &nid).await?;
        ctx.client.delete(&format!("/labs/{lid}/nodes/{nid}")).await?;
        Ok(Value::Bool(true))
    })
}

fn node_id_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "lab_id": { "type": "string", "description": "Lab UUID" },
            "node_id": { "type": "string", "description": "Node UUID" },
        },
        "required": ["lab_id", "node_id"],
    })
}

fn lab_id_only_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": { "lab_id": { "type": "string", "description": "Lab UUID" } },
        "required": ["lab_id"],
    })
}

fn start_node_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "lab_id": { "type": "string", "description": "Lab UUID" },
            "node_id": { "type": "string", "description": "Node UUID" },
            "wait_for_convergence": { "type": "boolean", "description": "Wait until the node reaches a stable state", "default": false },
        },
        "required": ["lab_id", "node_id"],
    })
}

pub static TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "get_cml_nodes",
        description: "List a lab's nodes with operational state, excluding configuration blobs.",
        input_schema: lab_id_only_schema,
        destructive: false,
        handler: get_cml_nodes,
    },
    ToolSpec {
        name: "start_cml_node",
        description: "Start a node by UUID; optionally wait for convergence.",
        input_schema: start_node_schema,
        destructive: false,
        handler: start_cml_node,
    },
    ToolSpec {
        name: "stop_cml_node",
        description: "Stop a node by UUID.",
        input_schema: node_id_schema,
        destructive: false,
        handler: stop_cml_node,
    },
    ToolSpec {
        name: "wipe_cml_node",
        description: "Wipe a node's disks by UUID. Requires user confirmation.",
        input_schema: node_id_schema,
        destructive: true,
        handler: wipe_cml_node,
    },
    ToolSpec {
        name: "delete_cml_node",
        description: "Delete a node by UUID, stopping and wiping it first. Requires user confirmation.",
        input_schema: node_id_schema,
        destructive: true,
        handler: delete_cml_node,
    },
];
