//! CloudFormation intrinsic functions and pseudo parameters.
//!
//! Each helper returns the JSON form CloudFormation expects, so the results
//! can be dropped straight into resource properties.

use serde_json::{Value, json};

/// `AWS::AccountId`
pub const ACCOUNT_ID: &str = "AWS::AccountId";
/// `AWS::Partition`
pub const PARTITION: &str = "AWS::Partition";
/// `AWS::Region`
pub const REGION: &str = "AWS::Region";

/// `{ "Ref": id }`
pub fn reference(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

/// `{ "Fn::GetAtt": [id, attribute] }`
pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

/// `{ "Fn::Join": [delimiter, parts] }`
pub fn join(delimiter: &str, parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": [delimiter, parts] })
}

/// `{ "Fn::Select": [index, list] }`
pub fn select(index: usize, list: Value) -> Value {
    json!({ "Fn::Select": [index, list] })
}

/// `{ "Fn::GetAZs": region }`; an empty region means the stack's region.
pub fn get_azs(region: &str) -> Value {
    json!({ "Fn::GetAZs": region })
}

/// Whether `name` is a pseudo parameter rather than a logical id.
pub fn is_pseudo_parameter(name: &str) -> bool {
    name.starts_with("AWS::")
}

/// Collect every logical id a value points at through `Ref` or `Fn::GetAtt`.
///
/// Pseudo parameters are skipped.
pub fn referenced_ids(value: &Value) -> Vec<String> {
    let mut ids = Vec::new();
    collect_references(value, &mut ids);
    ids
}

fn collect_references(value: &Value, ids: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::String(target)) = map.get("Ref") {
                    if !is_pseudo_parameter(target) {
                        ids.push(target.clone());
                    }
                    return;
                }
                if let Some(Value::Array(args)) = map.get("Fn::GetAtt")
                    && let Some(Value::String(target)) = args.first()
                {
                    ids.push(target.clone());
                    return;
                }
            }
            for nested in map.values() {
                collect_references(nested, ids);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_references(item, ids);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_shapes() {
        assert_eq!(reference("VPC"), json!({ "Ref": "VPC" }));
        assert_eq!(
            get_att("LB", "DNSName"),
            json!({ "Fn::GetAtt": ["LB", "DNSName"] })
        );
        assert_eq!(
            select(1, get_azs("")),
            json!({ "Fn::Select": [1, { "Fn::GetAZs": "" }] })
        );
    }

    #[test]
    fn test_referenced_ids_skips_pseudo_parameters() {
        let value = json!({
            "Cluster": { "Ref": "ClusterA" },
            "Arn": join("", vec![
                json!("arn:"),
                reference(PARTITION),
                json!(":logs:"),
                get_att("LogGroupB", "Arn"),
            ]),
        });

        let mut ids = referenced_ids(&value);
        ids.sort();
        assert_eq!(ids, vec!["ClusterA".to_string(), "LogGroupB".to_string()]);
    }

    #[test]
    fn test_ref_inside_larger_object_is_not_a_reference() {
        // Only single-key objects are intrinsic calls
        let value = json!({ "Ref": "X", "Other": 1 });
        assert!(referenced_ids(&value).is_empty());
    }
}
