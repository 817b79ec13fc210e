use thiserror::Error;

#[derive(Debug, Error)]
pub enum AclError {
    #[error("failed to read ACL file {path}: {source}")]
    Read { path: String, source: std::io::Error },

    #[error("failed to parse ACL file {path} as YAML: {source}")]
    Parse { path: String, source: serde_yaml::Error },
}
