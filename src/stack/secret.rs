//! Secret references
//!
//! A secret is looked up by name in Secrets Manager when the task starts.
//! Nothing here ever holds the secret's value: the template only carries
//! the secret's ARN and the JSON field to extract from it.

use super::{Construct, SecretAttrs, SecretRef, SynthContext};
use anyhow::{Result, bail};
use cfnkit::intrinsic;
use serde_json::{Value, json};

/// Lookup key into the external secret store.
#[derive(Debug, Clone, PartialEq)]
pub struct SecretReference {
    pub secret_name: String,
}

impl SecretReference {
    pub fn from_name(secret_name: impl Into<String>) -> Self {
        Self {
            secret_name: secret_name.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let name = &self.secret_name;
        if name.is_empty() || name.len() > 512 {
            bail!("secret name must be 1-512 characters");
        }
        if let Some(c) = name
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !"/_+=.@-".contains(*c))
        {
            bail!("secret name '{name}' contains invalid character '{c}'");
        }
        Ok(())
    }

    /// ARN without the random six-character suffix Secrets Manager appends.
    fn partial_arn(&self) -> Value {
        intrinsic::join(
            "",
            vec![
                json!("arn:"),
                intrinsic::reference(intrinsic::PARTITION),
                json!(":secretsmanager:"),
                intrinsic::reference(intrinsic::REGION),
                json!(":"),
                intrinsic::reference(intrinsic::ACCOUNT_ID),
                json!(format!(":secret:{}", self.secret_name)),
            ],
        )
    }
}

/// One JSON field of a referenced secret, injected into a container.
#[derive(Debug, Clone, PartialEq)]
pub struct SecretField {
    pub secret: SecretRef,
    pub field: String,
}

impl SecretField {
    pub fn new(secret: &SecretRef, field: impl Into<String>) -> Self {
        Self {
            secret: secret.clone(),
            field: field.into(),
        }
    }

    /// `valueFrom` for a container secret: `<arn>:<field>::`
    pub fn value_from(&self, attrs: &SecretAttrs) -> Value {
        append(&attrs.arn, &format!(":{}::", self.field))
    }
}

/// Append a literal to a `Fn::Join` with empty delimiter.
fn append(joined: &Value, suffix: &str) -> Value {
    let parts = joined
        .get("Fn::Join")
        .and_then(|args| args.get(1))
        .and_then(Value::as_array);

    match parts {
        Some(parts) => {
            let mut parts = parts.clone();
            parts.push(json!(suffix));
            intrinsic::join("", parts)
        }
        None => intrinsic::join("", vec![joined.clone(), json!(suffix)]),
    }
}

impl Construct for SecretReference {
    fn construct_type(&self) -> &'static str {
        "secret"
    }

    fn description(&self) -> String {
        format!("Reference to Secrets Manager secret '{}'", self.secret_name)
    }

    fn synthesize(&self, id: &str, ctx: &mut SynthContext) -> Result<()> {
        let arn = self.partial_arn();
        let arn_pattern = append(&arn, "-??????");
        ctx.register_secret(id, SecretAttrs { arn, arn_pattern });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_name_validation() {
        assert!(SecretReference::from_name("InigoServiceToken").validate().is_ok());
        assert!(SecretReference::from_name("prod/api_key+v2").validate().is_ok());
        assert!(SecretReference::from_name("").validate().is_err());
        assert!(SecretReference::from_name("has space").validate().is_err());
    }

    #[test]
    fn test_value_from_appends_field() {
        let reference = SecretReference::from_name("InigoServiceToken");
        let arn = reference.partial_arn();
        let attrs = SecretAttrs {
            arn_pattern: append(&arn, "-??????"),
            arn,
        };
        let field = SecretField {
            secret: SecretRef("Secret".to_string()),
            field: "SERVICE_TOKEN".to_string(),
        };

        let value = field.value_from(&attrs);
        let parts = value["Fn::Join"][1].as_array().unwrap();
        assert_eq!(parts.last().unwrap(), &json!(":SERVICE_TOKEN::"));
        assert_eq!(parts[parts.len() - 2], json!(":secret:InigoServiceToken"));

        let pattern = attrs.arn_pattern["Fn::Join"][1].as_array().unwrap();
        assert_eq!(pattern.last().unwrap(), &json!("-??????"));
    }
}
