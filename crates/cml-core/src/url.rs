//! URL normalization and allow-list/pattern policy gate (C1).

use regex::Regex;
use url::Url;

use crate::error::{GatewayError, GatewayResult};

/// Canonicalize a target URL for pool-key and allow-list comparison.
///
/// Lowercases scheme and host, strips the default port for the scheme
/// (80/http, 443/https), and strips a trailing slash. Path and query are
/// preserved verbatim (in practice the CML target is host-only).
pub fn normalize(candidate: &str) -> GatewayResult<String> {
    let parsed = Url::parse(candidate).map_err(|_| GatewayError::UnparseableUrl(candidate.to_string()))?;

    let scheme = parsed.scheme().to_ascii_lowercase();
    let host = parsed
        .host_str()
        .ok_or_else(|| GatewayError::UnparseableUrl(candidate.to_string()))?
        .to_ascii_lowercase();

    let default_port = match scheme.as_str() {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    };
    let port = parsed.port().filter(|p| Some(*p) != default_port);

    let mut normalized = format!("{scheme}://{host}");
    if let Some(port) = port {
        normalized.push_str(&format!(":{port}"));
    }

    let rest = parsed.path();
    let rest = rest.strip_suffix('/').unwrap_or(rest);
    if !rest.is_empty() {
        normalized.push_str(rest);
    }
    if let Some(query) = parsed.query() {
        normalized.push('?');
        normalized.push_str(query);
    }

    Ok(normalized)
}

/// Configuration governing which CML server URLs a caller may target.
pub struct UrlPolicy {
    /// Normalized allow-list entries. Empty means "no allow-list restriction".
    allowed: Vec<String>,
    /// Optional fully-matching pattern applied to the original candidate string.
    pattern: Option<Regex>,
    /// Whether at least one of the above must be configured (fail closed otherwise).
    require_policy: bool,
}

impl UrlPolicy {
    pub fn new(allowed_urls: &[String], pattern: Option<&str>, require_policy: bool) -> GatewayResult<Self> {
        let allowed = allowed_urls
            .iter()
            .map(|u| normalize(u))
            .collect::<GatewayResult<Vec<_>>>()?;
        let pattern = pattern.map(Regex::new).transpose().map_err(|e| GatewayError::UnparseableUrl(e.to_string()))?;
        Ok(Self {
            allowed,
            pattern,
            require_policy,
        })
    }

    pub fn permissive() -> Self {
        Self {
            allowed: Vec::new(),
            pattern: None,
            require_policy: false,
        }
    }

    /// Validate `candidate` against the configured allow-list and/or pattern,
    /// returning its normalized form on success.
    pub fn validate(&self, candidate: &str) -> GatewayResult<String> {
        if self.require_policy && self.allowed.is_empty() && self.pattern.is_none() {
            return Err(GatewayError::AllowPolicyUnset);
        }

        let normalized = normalize(candidate)?;

        if !self.allowed.is_empty() && !self.allowed.iter().any(|a| a.eq_ignore_ascii_case(&normalized)) {
            tracing::warn!(url = %candidate, "URL not in allowlist");
            return Err(GatewayError::UrlNotAllowed(candidate.to_string()));
        }

        if let Some(pattern) = &self.pattern
            && !full_match(pattern, candidate)
        {
            tracing::warn!(url = %candidate, "URL does not match pattern");
            return Err(GatewayError::UrlPatternMismatch(candidate.to_string()));
        }

        Ok(normalized)
    }
}

fn full_match(pattern: &Regex, candidate: &str) -> bool {
    match pattern.find(candidate) {
        Some(m) => m.start() == 0 && m.end() == candidate.len(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_default_https_port() {
        assert_eq!(normalize("https://CML.example.com:443/").unwrap(), "https://cml.example.com");
    }

    #[test]
    fn strips_default_http_port() {
        assert_eq!(normalize("http://cml.example.com:80").unwrap(), "http://cml.example.com");
    }

    #[test]
    fn keeps_nondefault_port() {
        assert_eq!(normalize("https://cml.example.com:8443").unwrap(), "https://cml.example.com:8443");
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize("https://CML.Example.com:443/foo/").unwrap();
        let twice = normalize(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn rejects_unparseable_url() {
        assert!(normalize("not a url").is_err());
    }

    #[test]
    fn allow_list_requires_exact_normalized_match() {
        let policy = UrlPolicy::new(&["https://cml.example.com:443".to_string()], None, false).unwrap();
        assert!(policy.validate("https://cml.example.com").is_ok());
        assert!(policy.validate("https://other.example.com").is_err());
    }

    #[test]
    fn pattern_must_fully_match_original_candidate() {
        let policy = UrlPolicy::new(&[], Some(r"^https://cml[0-9]+\.example\.com$"), false).unwrap();
        assert!(policy.validate("https://cml1.example.com").is_ok());
        assert!(policy.validate("https://other.example.com").is_err());
    }

    #[test]
    fn both_allow_list_and_pattern_must_pass() {
        let policy = UrlPolicy::new(
            &["https://cml1.example.com".to_string()],
            Some(r"^https://cml[0-9]+\.example\.com$"),
            false,
        )
        .unwrap();
        assert!(policy.validate("https://cml1.example.com").is_ok());

        // Pattern fails even though it would be in an allow-list of the same host.
        let policy2 = UrlPolicy::new(
            &["https://other.example.com".to_string()],
            Some(r"^https://cml[0-9]+\.example\.com$"),
            false,
        )
        .unwrap();
        assert!(policy2.validate("https://other.example.com").is_err());
    }

    #[test]
    fn require_policy_rejects_when_unconfigured() {
        let policy = UrlPolicy::new(&[], None, true).unwrap();
        assert!(matches!(policy.validate("https://anything.example.com"), Err(GatewayError::AllowPolicyUnset)));
    }

    #[test]
    fn permissive_policy_accepts_anything_parseable() {
        let policy = UrlPolicy::permissive();
        assert!(policy.validate("https://anything.example.com").is_ok());
    }
}
