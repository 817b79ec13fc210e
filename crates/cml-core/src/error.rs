use rmcp::ErrorData as McpError;
use rmcp::model::ErrorCode;
use thiserror::Error;

/// JSON-RPC error codes returned to MCP clients, per the gateway's own
/// allocation range (distinct from the reserved `-32xxx` JSON-RPC codes).
pub mod codes {
    pub const UNAUTHORIZED_BAD_HEADER: i32 = -31001;
    pub const UNAUTHORIZED: i32 = -31002;
    pub const MISSING_TARGET: i32 = -31003;
    pub const URL_NOT_ALLOWED: i32 = -31004;
    pub const URL_PATTERN_MISMATCH: i32 = -31005;
    pub const ALLOW_POLICY_UNSET: i32 = -31006;
    pub const PER_KEY_LIMIT: i32 = -31007;
    pub const UPSTREAM_ERROR: i32 = -31008;
}

/// Error taxonomy for the ingress pipeline and client pool.
///
/// Every variant maps to exactly one of the kinds spec'd in the error
/// handling design: policy, limit, auth, upstream, or internal.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("CML server URL could not be parsed: {0}")]
    UnparseableUrl(String),

    #[error("at least one of an allow-list or URL pattern must be configured to accept client-provided CML server URLs")]
    AllowPolicyUnset,

    #[error("CML server URL '{0}' is not in the list of allowed URLs")]
    UrlNotAllowed(String),

    #[error("CML server URL '{0}' does not match the required pattern")]
    UrlPatternMismatch(String),

    #[error("too many concurrent requests to {0} (max: {1})")]
    PerKeyLimit(String, u32),

    #[error("missing X-CML-Server-URL header and no default CML_URL configured")]
    MissingTarget,

    #[error("missing or invalid X-Authorization header")]
    MissingAuthHeader,

    #[error("invalid X-Authorization header format: expected 'Basic <credentials>'")]
    BadAuthHeaderFormat,

    #[error("failed to decode Basic authentication credentials: {0}")]
    BadAuthEncoding(String),

    #[error("authentication with upstream CML server failed: {0}")]
    UpstreamAuthFailed(String),

    #[error("upstream CML server returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("transport error contacting upstream CML server: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("no request context available for this tool call")]
    NoContext,

    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("tool '{0}' is not permitted for this user")]
    AclDenied(String),

    #[error("action cancelled: user did not confirm")]
    CancelledByUser,
}

impl GatewayError {
    /// Numeric JSON-RPC error code this error should surface to the MCP client.
    pub fn code(&self) -> i32 {
        use GatewayError::*;
        match self {
            UnparseableUrl(_) => codes::URL_NOT_ALLOWED,
            AllowPolicyUnset => codes::ALLOW_POLICY_UNSET,
            UrlNotAllowed(_) => codes::URL_NOT_ALLOWED,
            UrlPatternMismatch(_) => codes::URL_PATTERN_MISMATCH,
            PerKeyLimit(_, _) => codes::PER_KEY_LIMIT,
            MissingTarget => codes::MISSING_TARGET,
            MissingAuthHeader => codes::UNAUTHORIZED_BAD_HEADER,
            BadAuthHeaderFormat => codes::UNAUTHORIZED_BAD_HEADER,
            BadAuthEncoding(_) => codes::UNAUTHORIZED_BAD_HEADER,
            UpstreamAuthFailed(_) => codes::UNAUTHORIZED,
            Upstream { .. } => codes::UPSTREAM_ERROR,
            Transport(_) => codes::UPSTREAM_ERROR,
            NoContext => -32603, // internal error, standard JSON-RPC code
            InvalidArguments(_) => -32602, // standard JSON-RPC "invalid params"
            AclDenied(_) => -32001,
            CancelledByUser => -32002,
        }
    }
}

impl From<GatewayError> for McpError {
    fn from(err: GatewayError) -> Self {
        let message = err.to_string();
        match &err {
            GatewayError::NoContext => McpError::new(ErrorCode::INTERNAL_ERROR, message, None),
            GatewayError::InvalidArguments(_) => McpError::new(ErrorCode::INVALID_PARAMS, message, None),
            _ => McpError::new(ErrorCode(err.code()), message, None),
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
