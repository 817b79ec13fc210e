//! Per-request ACL decision.

use crate::config::AclConfig;

impl AclConfig {
    /// Whether `username` may invoke `tool_name`.
    ///
    /// An explicit allow-list wins over a deny-list when both are present
    /// for a user; absence from both falls through to the per-user implied
    /// default (allow-list present → deny, deny-list present → allow),
    /// and absence of any per-user config falls through to `default_enabled`.
    pub fn allowed(&self, tool_name: &str, username: &str) -> bool {
        let Some(user) = self.users.get(username) else {
            return self.default_enabled;
        };

        if let Some(enabled) = &user.enabled_tools
            && enabled.iter().any(|t| t == tool_name)
        {
            return true;
        }
        if let Some(disabled) = &user.disabled_tools
            && disabled.iter().any(|t| t == tool_name)
        {
            return false;
        }
        if user.enabled_tools.is_some() {
            return false;
        }
        if user.disabled_tools.is_some() {
            return true;
        }
        self.default_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserConfig;
    use std::collections::HashMap;

    fn cfg(default_enabled: bool, users: Vec<(&str, UserConfig)>) -> AclConfig {
        AclConfig {
            default_enabled,
            users: users.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }

    #[test]
    fn unknown_user_falls_back_to_default() {
        let c = cfg(true, vec![]);
        assert!(c.allowed("get_cml_labs", "nobody"));
        let c = cfg(false, vec![]);
        assert!(!c.allowed("get_cml_labs", "nobody"));
    }

    #[test]
    fn enabled_tools_acts_as_allowlist() {
        let c = cfg(
            true,
            vec![(
                "alice",
                UserConfig {
                    enabled_tools: Some(vec!["get_cml_labs".into()]),
                    disabled_tools: None,
                },
            )],
        );
        assert!(c.allowed("get_cml_labs", "alice"));
        assert!(!c.allowed("get_cml_lab", "alice"));
    }

    #[test]
    fn disabled_tools_acts_as_denylist() {
        let c = cfg(
            true,
            vec![(
                "bob",
                UserConfig {
                    enabled_tools: None,
                    disabled_tools: Some(vec!["wipe_cml_lab".into()]),
                },
            )],
        );
        assert!(!c.allowed("wipe_cml_lab", "bob"));
        assert!(c.allowed("get_cml_lab", "bob"));
    }

    #[test]
    fn enabled_tools_wins_over_disabled_tools_when_both_list_the_tool() {
        let c = cfg(
            true,
            vec![(
                "carol",
                UserConfig {
                    enabled_tools: Some(vec!["wipe_cml_lab".into()]),
                    disabled_tools: Some(vec!["wipe_cml_lab".into()]),
                },
            )],
        );
        assert!(c.allowed("wipe_cml_lab", "carol"));
    }

    #[test]
    fn no_per_user_config_present_uses_global_default() {
        let c = cfg(
            false,
            vec![(
                "dave",
                UserConfig {
                    enabled_tools: None,
                    disabled_tools: None,
                },
            )],
        );
        assert!(!c.allowed("anything", "dave"));
    }
}
