//! Cloud assembly output.
//!
//! A cloud assembly is the directory the deployment toolkit reads after
//! running an app: a `manifest.json` describing the artifacts, one
//! `<stack>.template.json` per stack, and a `cdk.out` version marker.

use crate::error::{Error, Result};
use crate::template::Template;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Cloud assembly schema version written to `manifest.json` and `cdk.out`
pub const SCHEMA_VERSION: &str = "36.0.0";

/// Artifact type of a CloudFormation stack
pub const STACK_ARTIFACT_TYPE: &str = "aws:cloudformation:stack";

/// Account and region a stack is pinned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub account: String,
    pub region: String,
}

impl Environment {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
        }
    }
}

/// The `aws://account/region` URI for an optional environment.
///
/// Environment-agnostic stacks use the toolkit's `unknown-account` and
/// `unknown-region` placeholders.
pub fn environment_uri(env: Option<&Environment>) -> String {
    match env {
        Some(env) => format!("aws://{}/{}", env.account, env.region),
        None => "aws://unknown-account/unknown-region".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackProperties {
    pub template_file: String,
    pub validate_on_synth: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub environment: String,
    pub properties: StackProperties,
    pub display_name: String,
}

/// Contents of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub artifacts: BTreeMap<String, Artifact>,
}

#[derive(Serialize)]
struct VersionMarker<'a> {
    version: &'a str,
}

/// A synthesized stack ready to be written.
#[derive(Debug, Clone)]
pub struct StackArtifact {
    pub stack_name: String,
    pub environment: Option<Environment>,
    pub template: Template,
}

impl StackArtifact {
    /// File name of the template inside the assembly directory.
    pub fn template_file(&self) -> String {
        template_file_name(&self.stack_name)
    }
}

fn template_file_name(stack_name: &str) -> String {
    format!("{stack_name}.template.json")
}

/// A set of stacks to be written as one cloud assembly.
#[derive(Debug, Clone, Default)]
pub struct CloudAssembly {
    pub stacks: Vec<StackArtifact>,
}

impl CloudAssembly {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stack.
    pub fn add_stack(&mut self, stack: StackArtifact) {
        self.stacks.push(stack);
    }

    /// Build the manifest describing every stack.
    pub fn manifest(&self) -> Manifest {
        let artifacts = self
            .stacks
            .iter()
            .map(|stack| {
                let artifact = Artifact {
                    artifact_type: STACK_ARTIFACT_TYPE.to_string(),
                    environment: environment_uri(stack.environment.as_ref()),
                    properties: StackProperties {
                        template_file: stack.template_file(),
                        validate_on_synth: false,
                    },
                    display_name: stack.stack_name.clone(),
                };
                (stack.stack_name.clone(), artifact)
            })
            .collect();

        Manifest {
            version: SCHEMA_VERSION.to_string(),
            artifacts,
        }
    }

    /// Write the assembly into `dir`, creating it if needed.
    ///
    /// Returns the paths of the files written.
    pub fn write(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let mut written = Vec::with_capacity(self.stacks.len() + 2);

        for stack in &self.stacks {
            let path = dir.join(stack.template_file());
            fs::write(&path, stack.template.to_json_pretty()?)?;
            written.push(path);
        }

        let manifest_path = dir.join("manifest.json");
        fs::write(&manifest_path, serde_json::to_string_pretty(&self.manifest())?)?;
        written.push(manifest_path);

        let marker_path = dir.join("cdk.out");
        let marker = VersionMarker {
            version: SCHEMA_VERSION,
        };
        fs::write(&marker_path, serde_json::to_string(&marker)?)?;
        written.push(marker_path);

        Ok(written)
    }
}

/// Read a previously written stack template from an assembly directory.
pub fn read_template(dir: &Path, stack_name: &str) -> Result<Template> {
    let path = dir.join(template_file_name(stack_name));
    if !path.exists() {
        return Err(Error::TemplateNotFound(path));
    }
    let content = fs::read_to_string(&path)?;
    Template::from_json(&content)
}

/// Read `manifest.json` from an assembly directory.
pub fn read_manifest(dir: &Path) -> Result<Manifest> {
    let content = fs::read_to_string(dir.join("manifest.json"))?;
    Ok(serde_json::from_str(&content)?)
}
