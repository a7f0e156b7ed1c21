//! # cfnkit
//!
//! A small toolkit for producing CloudFormation templates from Rust.
//!
//! ## Core Concepts
//!
//! - **Template**: `Resources` and `Outputs` keyed by logical id
//! - **ResourceEntry**: one resource with its type, properties, dependencies and removal policy
//! - **Intrinsics**: `Ref`, `Fn::GetAtt`, `Fn::Join`, ... as JSON values
//! - **Logical ids**: stable ids derived from construct paths
//! - **TemplateDiff**: what changed between two templates
//! - **CloudAssembly**: the directory layout the deployment toolkit consumes
//!
//! ## Example
//!
//! ```
//! use cfnkit::{intrinsic, logical_id, Output, RemovalPolicy, ResourceEntry, Template};
//! use serde_json::json;
//!
//! let mut template = Template::new();
//! let log_group = logical_id::from_path(&["LogGroup"]).unwrap();
//! template
//!     .add_resource(
//!         &log_group,
//!         ResourceEntry::new("AWS::Logs::LogGroup")
//!             .with_properties(json!({ "RetentionInDays": 1 }))
//!             .with_removal_policy(RemovalPolicy::Destroy),
//!     )
//!     .unwrap();
//! template
//!     .add_output("LogGroupArn", Output::new(intrinsic::get_att(&log_group, "Arn")))
//!     .unwrap();
//!
//! assert!(template.validate_references().is_ok());
//! ```

pub mod assembly;
pub mod diff;
pub mod error;
pub mod intrinsic;
pub mod logical_id;
pub mod template;

// Re-export main types at crate root
pub use assembly::{CloudAssembly, Environment, Manifest, StackArtifact, environment_uri};
pub use diff::{ChangeKind, DiffSummary, ResourceDiff, TemplateDiff};
pub use error::{Error, Result};
pub use template::{Export, Output, RemovalPolicy, ResourceEntry, Template};
