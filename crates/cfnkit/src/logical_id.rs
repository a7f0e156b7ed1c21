//! Logical id allocation from construct paths.
//!
//! A construct path such as `["VPC", "PublicSubnet1", "Subnet"]` becomes a
//! CloudFormation logical id made of a readable prefix plus a short hash of
//! the full path:
//!
//! ```
//! let id = cfnkit::logical_id::from_path(&["VPC", "PublicSubnet1", "Subnet"]).unwrap();
//! assert!(id.starts_with("VPCPublicSubnet1Subnet"));
//! assert_eq!(id.len(), "VPCPublicSubnet1Subnet".len() + 8);
//! ```
//!
//! Top-level constructs keep their id unchanged. Components named `Default`
//! or `Resource` are dropped from the readable prefix but still feed the hash.

use crate::error::{Error, Result};

/// CloudFormation limit on logical id length
const MAX_LOGICAL_ID_LEN: usize = 255;

const HASH_LEN: usize = 8;

const HIDDEN_COMPONENTS: &[&str] = &["Default", "Resource"];

/// Compute the logical id for a construct path.
pub fn from_path(path: &[&str]) -> Result<String> {
    let Some(first) = path.first() else {
        return Err(Error::InvalidLogicalId {
            id: String::new(),
            reason: "empty construct path".to_string(),
        });
    };

    if path.len() == 1 {
        validate(first)?;
        return Ok((*first).to_string());
    }

    let mut human: Vec<String> = Vec::with_capacity(path.len());
    for component in path {
        if HIDDEN_COMPONENTS.contains(component) {
            continue;
        }
        let cleaned: String = component
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect();
        // Consecutive duplicates read poorly ("ServiceService")
        if human.last() != Some(&cleaned) {
            human.push(cleaned);
        }
    }

    let mut prefix = human.concat();
    prefix.truncate(MAX_LOGICAL_ID_LEN - HASH_LEN);

    let id = format!("{prefix}{}", path_hash(path));
    validate(&id)?;
    Ok(id)
}

/// Check a logical id against CloudFormation's rules.
pub fn validate(id: &str) -> Result<()> {
    let reason = if id.is_empty() {
        Some("must not be empty")
    } else if id.len() > MAX_LOGICAL_ID_LEN {
        Some("longer than 255 characters")
    } else if !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some("only A-Z, a-z and 0-9 are allowed")
    } else if !id.starts_with(|c: char| c.is_ascii_alphabetic()) {
        Some("must start with a letter")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::InvalidLogicalId {
            id: id.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

fn path_hash(path: &[&str]) -> String {
    let hash = blake3::hash(path.join("/").as_bytes());
    hash.to_hex()[..HASH_LEN].to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_level_id_is_unchanged() {
        assert_eq!(from_path(&["Cluster"]).unwrap(), "Cluster");
    }

    #[test]
    fn test_nested_id_has_hash_suffix() {
        let id = from_path(&["LoadBalancer", "SecurityGroup"]).unwrap();
        assert!(id.starts_with("LoadBalancerSecurityGroup"));
        let suffix = &id["LoadBalancerSecurityGroup".len()..];
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_hidden_components_and_dupes_are_dropped() {
        let id = from_path(&["Service", "Service", "Resource"]).unwrap();
        assert!(id.starts_with("Service"));
        assert!(!id.starts_with("ServiceService"));
        assert!(!id.contains("Resource"));
    }

    #[test]
    fn test_hash_depends_on_full_path() {
        let a = from_path(&["Task", "Resource"]).unwrap();
        let b = from_path(&["Task", "Default"]).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, from_path(&["Task", "Resource"]).unwrap());
    }

    #[test]
    fn test_validate_rejects_bad_ids() {
        assert!(validate("").is_err());
        assert!(validate("has-dash").is_err());
        assert!(validate("9Lives").is_err());
        assert!(validate(&"A".repeat(256)).is_err());
        assert!(validate("VPCB9E5F0B4").is_ok());
    }

    #[test]
    fn test_empty_path_is_rejected() {
        assert!(from_path(&[]).is_err());
    }
}
