//! The gateway's `ServerHandler` (C6–C8): ACL filtering, elicitation-gated
//! dispatch, and tool registry exposure.

use std::future::Future;
use std::sync::Arc;

use cml_acl::AclConfig;
use cml_core::{GatewayError, RequestContext as GatewayRequestContext};
use rmcp::ErrorData as McpError;
use rmcp::ServerHandler;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, InitializeRequestParams, InitializeResult, ListToolsResult,
    PaginatedRequestParams, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{RequestContext, RoleServer};

use crate::elicit;
use crate::tools;

/// MCP server handler brokering tool calls to the leased CML upstream.
///
/// Per-request state (the leased client, the caller's username) is not a
/// field here — it lives in [`GatewayRequestContext`], installed by the
/// ingress middleware before this handler ever runs.
pub struct GatewayHandler {
    acl: Option<Arc<AclConfig>>,
}

impl GatewayHandler {
    pub fn new(acl: Option<Arc<AclConfig>>) -> Self {
        Self { acl }
    }

    fn allowed(&self, tool_name: &str, username: &str) -> bool {
        match &self.acl {
            Some(acl) => acl.allowed(tool_name, username),
            None => true,
        }
    }
}

/// Build a successful `CallToolResult` carrying a tool-level error.
///
/// `ACL_DENIED` and `CANCELLED_BY_USER` are tool errors per spec.md §6, not
/// protocol-level JSON-RPC errors — the call reached a tool, it just didn't
/// complete, so the client should see `is_error: true` content rather than a
/// top-level `Result::Err`.
fn tool_error(err: GatewayError) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(err.to_string())],
        structured_content: None,
        is_error: Some(true),
        meta: None,
    }
}

fn gateway_info() -> InitializeResult {
    InitializeResult {
        protocol_version: Default::default(),
        capabilities: ServerCapabilities::builder().enable_tools().build(),
        server_info: rmcp::model::Implementation::from_build_env(),
        instructions: Some("CML MCP gateway — brokers tool calls to a caller-designated Cisco Modeling Labs server".into()),
    }
}

impl ServerHandler for GatewayHandler {
    fn initialize(
        &self,
        _request: InitializeRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<InitializeResult, McpError>> + Send + '_ {
        async { Ok(gateway_info()) }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        async move {
            let username = GatewayRequestContext::current().map(|ctx| ctx.username).unwrap_or_default();

            let tools = tools::registry()
                .into_iter()
                .filter(|spec| self.allowed(spec.name, &username))
                .map(|spec| {
                    let schema = (spec.input_schema)();
                    let schema_map = schema.as_object().cloned().unwrap_or_default();
                    Tool::new(spec.name, spec.description, schema_map)
                })
                .collect();

            Ok(ListToolsResult { next_cursor: None, tools })
        }
    }

    fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move {
            let ctx = GatewayRequestContext::current()?;
            let spec = tools::find(&request.name)
                .ok_or_else(|| McpError::from(GatewayError::InvalidArguments(format!("unknown tool '{}'", request.name))))?;

            if !self.allowed(spec.name, &ctx.username) {
                return Ok(tool_error(GatewayError::AclDenied(spec.name.to_string())));
            }

            if spec.destructive {
                let message = format!("Confirm {}?", spec.name);
                if let Err(GatewayError::CancelledByUser) = elicit::confirm_destructive(&context, &message).await {
                    return Ok(tool_error(GatewayError::CancelledByUser));
                }
            }

            let args = request.arguments.map(serde_json::Value::Object).unwrap_or(serde_json::Value::Null);
            let result = (spec.handler)(&ctx, args).await?;

            let text = serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string());
            Ok(CallToolResult {
                content: vec![Content::text(text)],
                structured_content: None,
                is_error: Some(false),
                meta: None,
            })
        }
    }

    fn get_info(&self) -> ServerInfo {
        let result = gateway_info();
        ServerInfo {
            protocol_version: result.protocol_version,
            capabilities: result.capabilities,
            server_info: result.server_info,
            instructions: result.instructions,
        }
    }
}
