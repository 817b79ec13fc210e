//! Lab lifecycle tools: list, start, stop, wipe, delete.

use cml_core::{GatewayResult, RequestContext};
use serde_json::Value;

use super::{BoxFuture, ToolSpec, require_str};

fn get_cml_labs(ctx: &RequestContext, args: Value) -> BoxFuture<'_, GatewayResult<Value>> {
    Box::pin(async move {
        let user = args.get("user").and_then(Value::as_str).map(str::to_string);
        let lab_ids: Vec<String> = ctx
            .client
            .get("/labs", Some(&[("show_all", "true")]))
            .await?
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();

        let mut labs = Vec::new();
        for lid in lab_ids {
            let detail = ctx.client.get(&format!("/labs/{lid}"), None).await?;
            let owner = detail.get("owner_username").and_then(Value::as_str);
            if user.as_deref().is_none_or(|u| Some(u) == owner) {
                labs.push(detail);
            }
        }
        Ok(Value::Array(labs))
    })
}

fn get_cml_lab(ctx: &RequestContext, args: Value) -> BoxFuture<'_, GatewayResult<Value>> {
    Box::pin(async move {
        let lid = require_str(&args, "lab_id")?.to_string();
        ctx.client.get(&format!("/labs/{lid}"), None).await
    })
}

fn start_cml_lab(ctx: &RequestContext, args: Value) -> BoxFuture<'_, GatewayResult<Value>> {
    Box::pin(async move {
        let lid = require_str(&args, "lab_id")?.to_string();
        ctx.client.put(&format!("/labs/{lid}/start"), None).await?;

        let wait = args.get("wait_for_convergence").and_then(Value::as_bool).unwrap_or(false);
        if wait {
            loop {
                let converged = ctx.client.get(&format!("/labs/{lid}/check_if_converged"), None).await?;
                if converged.as_bool().unwrap_or(false) {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_secs(3)).await;
            }
        }
        Ok(Value::Bool(true))
    })
}

fn stop_cml_lab(ctx: &RequestContext, args: Value) -> BoxFuture<'_, GatewayResult<Value>> {
    Box::pin(async move {
        let lid = require_str(&args, "lab_id")?.to_string();
        stop_lab(ctx, &lid).await?;
        Ok(Value::Bool(true))
    })
}

async fn stop_lab(ctx: &RequestContext, lid: &str) -> GatewayResult<()> {
    ctx.client.put(&format!("/labs/{lid}/stop"), None).await?;
    Ok(())
}

async fn wipe_lab(ctx: &RequestContext, lid: &str) -> GatewayResult<()> {
    ctx.client.put(&format!("/labs/{lid}/wipe"), None).await?;
    Ok(())
}

fn wipe_cml_lab(ctx: &RequestContext, args: Value) -> BoxFuture<'_, GatewayResult<Value>> {
    Box::pin(async move {
        let lid = require_str(&args, "lab_id")?.to_string();
        wipe_lab(ctx, &lid).await?;
        Ok(Value::Bool(true))
    })
}

fn delete_cml_lab(ctx: &RequestContext, args: Value) -> BoxFuture<'_, GatewayResult<Value>> {
    Box::pin(async move {
        let lid = require_str(&args, "lab_id")?.to_string();
        stop_lab(ctx, &lid).await.ok(); // already-stopped labs 4xx here; best effort
        wipe_lab(ctx, &lid).await?;
        ctx.client.delete(&format!("/labs/{lid}")).await?;
        Ok(Value::Bool(true))
    })
}

fn lab_id_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": { "lab_id": { "type": "string", "description": "Lab UUID" } },
        "required": ["lab_id"],
    })
}

fn empty_or_user_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": { "user": { "type": "string", "description": "Filter to this owner's labs; omit for the current user" } },
    })
}

fn start_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "lab_id": { "type": "string", "description": "Lab UUID" },
            "wait_for_convergence": { "type": "boolean", "description": "Wait until all nodes reach a stable state", "default": false },
        },
        "required": ["lab_id"],
    })
}

pub static TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "get_cml_labs",
        description: "Retrieve labs, optionally filtered to a specific owner. Omit the user field for the caller's own labs.",
        input_schema: empty_or_user_schema,
        destructive: false,
        handler: get_cml_labs,
    },
    ToolSpec {
        name: "get_cml_lab",
        description: "Get a single lab's details by UUID.",
        input_schema: lab_id_schema,
        destructive: false,
        handler: get_cml_lab,
    },
    ToolSpec {
        name: "start_cml_lab",
        description: "Start a lab by UUID; optionally wait for node convergence.",
        input_schema: start_schema,
        destructive: false,
        handler: start_cml_lab,
    },
    ToolSpec {
        name: "stop_cml_lab",
        description: "Stop a lab by UUID, stopping all running nodes.",
        input_schema: lab_id_schema,
        destructive: false,
        handler: stop_cml_lab,
    },
    ToolSpec {
        name: "wipe_cml_lab",
        description: "Wipe a lab by UUID, erasing all node data and configuration. Requires user confirmation.",
        input_schema: lab_id_schema,
        destructive: true,
        handler: wipe_cml_lab,
    },
    ToolSpec {
        name: "delete_cml_lab",
        description: "Delete a lab by UUID, stopping and wiping it first. Requires user confirmation.",
        input_schema: lab_id_schema,
        destructive: true,
        handler: delete_cml_lab,
    },
];
