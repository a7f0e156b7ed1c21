//! Error types for template construction and cloud assembly output.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while building, validating or writing a template.
#[derive(Debug, Error)]
pub enum Error {
    /// Two resources were registered under the same logical id
    #[error("duplicate logical id: {0}")]
    DuplicateLogicalId(String),

    /// Two outputs were registered under the same name
    #[error("duplicate output: {0}")]
    DuplicateOutput(String),

    /// A logical id contains characters CloudFormation rejects
    #[error("invalid logical id '{id}': {reason}")]
    InvalidLogicalId {
        /// The offending id
        id: String,
        /// Why it was rejected
        reason: String,
    },

    /// A `Ref`, `Fn::GetAtt` or `DependsOn` names a resource that does not exist
    #[error("{from} references unknown resource '{target}'")]
    DanglingReference {
        /// Logical id (or output name) holding the reference
        from: String,
        /// Logical id that could not be found
        target: String,
    },

    /// Resource lookup by logical id failed
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// No template found in a cloud assembly directory
    #[error("template not found: {}", .0.display())]
    TemplateNotFound(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for template operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dangling_reference_message() {
        let err = Error::DanglingReference {
            from: "ServiceD69D759B".to_string(),
            target: "ClusterEB0386A7".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "ServiceD69D759B references unknown resource 'ClusterEB0386A7'"
        );
    }

    #[test]
    fn test_template_not_found_message() {
        let err = Error::TemplateNotFound(PathBuf::from("cdk.out/Stack.template.json"));
        assert!(err.to_string().contains("cdk.out/Stack.template.json"));
    }
}
