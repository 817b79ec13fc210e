//! Confirmation-elicitation interlock for destructive tool calls (C7).

use cml_core::{GatewayError, GatewayResult};
use rmcp::ErrorData as McpError;
use rmcp::model::{CreateElicitationRequestParams, CreateElicitationResult, ElicitationAction};
use rmcp::service::{RequestContext, RoleServer};

/// Ask the connected MCP client to confirm a destructive action.
///
/// Degrades to "proceed without confirmation" whenever the request to
/// elicit fails at all -- whether because the client doesn't support the
/// primitive (`METHOD_NOT_FOUND`/`INVALID_REQUEST`) or because the
/// transport itself is gone (client already disconnected). Stateless
/// transports cannot reliably solicit a human, so the caller is assumed to
/// have enforced confirmation upstream. Only an explicit decline or cancel
/// from a client that *does* answer aborts the action.
pub async fn confirm_destructive(context: &RequestContext<RoleServer>, message: &str) -> GatewayResult<()> {
    let requested_schema = match serde_json::from_value(serde_json::json!({
        "type": "object",
        "properties": {
            "confirmed": {
                "type": "boolean",
                "description": message,
            }
        },
        "required": ["confirmed"],
    })) {
        Ok(schema) => schema,
        Err(_) => {
            tracing::debug!("could not build elicitation schema; proceeding without confirmation");
            return Ok(());
        }
    };

    let params = CreateElicitationRequestParams {
        message: message.to_string(),
        requested_schema,
    };

    decide(context.peer.create_elicitation(params).await)
}

/// Pure decision over the elicitation outcome, split out from
/// `confirm_destructive` so the accept/decline/unsupported/transport-error
/// paths are testable without a live `peer`.
fn decide(result: Result<CreateElicitationResult, McpError>) -> GatewayResult<()> {
    match result {
        Ok(result) => match result.action {
            ElicitationAction::Accept => Ok(()),
            _ => Err(GatewayError::CancelledByUser),
        },
        Err(e) => {
            tracing::debug!(error = %e, "elicit() unavailable or failed; proceeding without confirmation");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::ErrorCode;

    fn accepted() -> Result<CreateElicitationResult, McpError> {
        Ok(CreateElicitationResult { action: ElicitationAction::Accept, content: None })
    }

    fn declined() -> Result<CreateElicitationResult, McpError> {
        Ok(CreateElicitationResult { action: ElicitationAction::Decline, content: None })
    }

    fn cancelled() -> Result<CreateElicitationResult, McpError> {
        Ok(CreateElicitationResult { action: ElicitationAction::Cancel, content: None })
    }

    #[test]
    fn accept_proceeds() {
        assert!(decide(accepted()).is_ok());
    }

    #[test]
    fn decline_cancels_the_action() {
        assert!(matches!(decide(declined()), Err(GatewayError::CancelledByUser)));
    }

    #[test]
    fn cancel_cancels_the_action() {
        assert!(matches!(decide(cancelled()), Err(GatewayError::CancelledByUser)));
    }

    #[test]
    fn method_not_found_degrades_to_proceed() {
        let err = McpError::new(ErrorCode::METHOD_NOT_FOUND, "elicitation/create not supported", None);
        assert!(decide(Err(err)).is_ok());
    }

    #[test]
    fn transport_error_degrades_to_proceed() {
        let err = McpError::new(ErrorCode::INTERNAL_ERROR, "peer disconnected", None);
        assert!(decide(Err(err)).is_ok());
    }
}
