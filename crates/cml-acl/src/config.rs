//! Loading and validating the YAML ACL configuration file.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::AclError;

#[derive(Debug, Deserialize, Default)]
struct RawUserConfig {
    enabled_tools: Option<Vec<String>>,
    disabled_tools: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct RawAclData {
    #[serde(default = "default_true")]
    default_enabled: bool,
    #[serde(default)]
    users: HashMap<String, RawUserConfig>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct UserConfig {
    pub enabled_tools: Option<Vec<String>>,
    pub disabled_tools: Option<Vec<String>>,
}

/// Validated, in-memory ACL configuration.
///
/// Mirrors the YAML shape: a global default plus optional per-user
/// allow/deny lists. Invalid entries are dropped with a warning rather
/// than failing the whole file, matching the original loader's leniency.
#[derive(Debug, Clone)]
pub struct AclConfig {
    pub default_enabled: bool,
    pub users: HashMap<String, UserConfig>,
}

impl AclConfig {
    /// Load and validate an ACL file. Returns `None` whenever the file can't
    /// be used as an ACL source for any reason -- missing, unreadable, or
    /// malformed YAML -- logging why and leaving the gateway to continue
    /// with "no ACL" semantics rather than failing startup.
    pub fn load(path: &Path) -> Option<Self> {
        if !path.is_file() {
            tracing::warn!(path = %path.display(), "ACL file does not exist or is not a file; continuing without ACLs");
            return None;
        }

        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(source) => {
                let err = AclError::Read { path: path.display().to_string(), source };
                tracing::warn!(error = %err, "failed to read ACL file; continuing without ACLs");
                return None;
            }
        };

        let raw: RawAclData = match serde_yaml::from_str(&contents) {
            Ok(raw) => raw,
            Err(source) => {
                let err = AclError::Parse { path: path.display().to_string(), source };
                tracing::warn!(error = %err, "failed to parse ACL file; continuing without ACLs");
                return None;
            }
        };

        Some(Self::from_raw(raw))
    }

    fn from_raw(raw: RawAclData) -> Self {
        let mut users = HashMap::new();
        for (username, cfg) in raw.users {
            if let Some(tools) = &cfg.enabled_tools
                && tools.is_empty()
            {
                tracing::warn!(%username, "enabled_tools is present but empty; user gets no tools");
            }
            users.insert(
                username,
                UserConfig {
                    enabled_tools: cfg.enabled_tools,
                    disabled_tools: cfg.disabled_tools,
                },
            );
        }
        Self {
            default_enabled: raw.default_enabled,
            users,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn missing_file_yields_no_acl_config() {
        assert!(AclConfig::load(Path::new("/nonexistent/acl.yaml")).is_none());
    }

    #[test]
    fn malformed_yaml_yields_no_acl_config_instead_of_failing_startup() {
        let f = write_fixture("users: [this, is, not, a, map]\n");
        assert!(AclConfig::load(f.path()).is_none());
    }

    #[test]
    fn loads_default_enabled_and_per_user_lists() {
        let f = write_fixture(
            r#"
default_enabled: false
users:
  alice:
    enabled_tools: ["get_cml_labs", "get_cml_lab"]
  bob:
    disabled_tools: ["wipe_cml_lab"]
"#,
        );
        let cfg = AclConfig::load(f.path()).unwrap();
        assert!(!cfg.default_enabled);
        assert_eq!(cfg.users["alice"].enabled_tools.as_deref(), Some(&["get_cml_labs".to_string(), "get_cml_lab".to_string()][..]));
        assert_eq!(cfg.users["bob"].disabled_tools.as_deref(), Some(&["wipe_cml_lab".to_string()][..]));
    }

    #[test]
    fn default_enabled_defaults_to_true_when_absent() {
        let f = write_fixture("users: {}\n");
        let cfg = AclConfig::load(f.path()).unwrap();
        assert!(cfg.default_enabled);
    }
}
