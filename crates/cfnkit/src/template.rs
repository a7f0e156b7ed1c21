//! CloudFormation template model.

use crate::error::{Error, Result};
use crate::intrinsic;
use crate::logical_id;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// What happens to a resource's physical counterpart when it leaves the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemovalPolicy {
    /// Delete the physical resource together with the stack
    #[serde(rename = "Delete")]
    Destroy,
    /// Orphan the physical resource
    Retain,
    /// Take a final snapshot, then delete (only some resource types)
    Snapshot,
}

impl RemovalPolicy {
    /// The CloudFormation attribute value for this policy.
    pub fn attribute_value(&self) -> &'static str {
        match self {
            Self::Destroy => "Delete",
            Self::Retain => "Retain",
            Self::Snapshot => "Snapshot",
        }
    }
}

impl std::fmt::Display for RemovalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.attribute_value())
    }
}

/// One entry of the template's `Resources` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceEntry {
    /// CloudFormation resource type, e.g. `AWS::ECS::Cluster`
    #[serde(rename = "Type")]
    pub resource_type: String,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,

    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "string_or_list"
    )]
    pub depends_on: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<RemovalPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<RemovalPolicy>,
}

impl ResourceEntry {
    /// Create an entry with no properties.
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties: Map::new(),
            depends_on: Vec::new(),
            update_replace_policy: None,
            deletion_policy: None,
        }
    }

    /// Replace the properties with a JSON object. Non-object values are ignored.
    pub fn with_properties(mut self, properties: Value) -> Self {
        if let Value::Object(map) = properties {
            self.properties = map;
        }
        self
    }

    /// Set one property.
    pub fn with_property(mut self, key: &str, value: Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }

    /// Apply a removal policy to both update-replace and delete.
    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.update_replace_policy = Some(policy);
        self.deletion_policy = Some(policy);
        self
    }

    /// Add an explicit dependency.
    pub fn with_dependency(mut self, logical_id: impl Into<String>) -> Self {
        self.add_dependency(logical_id);
        self
    }

    /// Add an explicit dependency, ignoring duplicates.
    pub fn add_dependency(&mut self, logical_id: impl Into<String>) {
        let logical_id = logical_id.into();
        if !self.depends_on.contains(&logical_id) {
            self.depends_on.push(logical_id);
            self.depends_on.sort();
        }
    }

    /// Get a property by name.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Append to a list property, creating it when absent.
    pub fn push_property(&mut self, key: &str, value: Value) {
        match self.properties.get_mut(key) {
            Some(Value::Array(items)) => items.push(value),
            _ => {
                self.properties
                    .insert(key.to_string(), Value::Array(vec![value]));
            }
        }
    }
}

fn string_or_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(id) => vec![id],
        OneOrMany::Many(ids) => ids,
    })
}

/// Export block of a stack output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Export {
    pub name: Value,
}

/// One entry of the template's `Outputs` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    pub value: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<Export>,
}

impl Output {
    /// Create an output bound to a value.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            description: None,
            export: None,
        }
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A complete CloudFormation template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub resources: BTreeMap<String, ResourceEntry>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Output>,
}

impl Template {
    /// Create an empty template.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource under a logical id.
    pub fn add_resource(&mut self, logical_id: &str, entry: ResourceEntry) -> Result<()> {
        logical_id::validate(logical_id)?;
        if self.resources.contains_key(logical_id) {
            return Err(Error::DuplicateLogicalId(logical_id.to_string()));
        }
        self.resources.insert(logical_id.to_string(), entry);
        Ok(())
    }

    /// Register an output.
    pub fn add_output(&mut self, name: &str, output: Output) -> Result<()> {
        logical_id::validate(name)?;
        if self.outputs.contains_key(name) {
            return Err(Error::DuplicateOutput(name.to_string()));
        }
        self.outputs.insert(name.to_string(), output);
        Ok(())
    }

    /// Look up a resource.
    pub fn resource(&self, logical_id: &str) -> Option<&ResourceEntry> {
        self.resources.get(logical_id)
    }

    /// Look up a resource for modification.
    pub fn resource_mut(&mut self, logical_id: &str) -> Result<&mut ResourceEntry> {
        self.resources
            .get_mut(logical_id)
            .ok_or_else(|| Error::ResourceNotFound(logical_id.to_string()))
    }

    /// All resources of one CloudFormation type, in logical id order.
    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a ResourceEntry)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, entry)| entry.resource_type == resource_type)
    }

    /// Count resources of one CloudFormation type.
    pub fn count_of_type(&self, resource_type: &str) -> usize {
        self.resources_of_type(resource_type).count()
    }

    /// Check that every reference points at a resource in this template.
    pub fn validate_references(&self) -> Result<()> {
        for (id, entry) in &self.resources {
            let props = Value::Object(entry.properties.clone());
            let targets = intrinsic::referenced_ids(&props)
                .into_iter()
                .chain(entry.depends_on.iter().cloned());
            for target in targets {
                if !self.resources.contains_key(&target) {
                    return Err(Error::DanglingReference {
                        from: id.clone(),
                        target,
                    });
                }
            }
        }

        for (name, output) in &self.outputs {
            for target in intrinsic::referenced_ids(&output.value) {
                if !self.resources.contains_key(&target) {
                    return Err(Error::DanglingReference {
                        from: format!("output {name}"),
                        target,
                    });
                }
            }
        }

        Ok(())
    }

    /// Parse a template from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Render the template as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Stable content hash of the template (hex blake3 of compact JSON).
    pub fn fingerprint(&self) -> Result<String> {
        let compact = serde_json::to_vec(self)?;
        Ok(blake3::hash(&compact).to_hex().to_string())
    }
}
