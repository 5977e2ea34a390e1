//! Version 0 of the messages exchanged between the orchestrator and a
//! resource provider.
//!
//! Property maps stay generic at this layer; each provider decodes them into
//! its own static types.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifies a kind of resource within a provider, e.g. `os_text_file`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceType(pub String);

impl ResourceType {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The properties the orchestrator wants a resource to have.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InputProperties(pub Map<String, Value>);

/// The properties a provider reports back after an operation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutputProperties(pub Map<String, Value>);

/// A resource the orchestrator already tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtantResource {
    #[serde(rename = "type")]
    pub type_: ResourceType,
    pub input_properties: InputProperties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_properties: Option<OutputProperties>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResourceRequest {
    #[serde(rename = "type")]
    pub type_: ResourceType,
    pub input_properties: InputProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResourceResponse {
    pub output_properties: OutputProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResourceRequest {
    pub resource: ExtantResource,
}

/// `output_properties` is `None` when the resource no longer exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResourceResponse {
    pub output_properties: Option<OutputProperties>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResourceRequest {
    pub resource: ExtantResource,
    pub input_properties: InputProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResourceResponse {
    pub output_properties: OutputProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResourceRequest {
    pub resource: ExtantResource,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeleteResourceResponse {}

/// Self-description of a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMetadata {
    pub type_name: String,
    pub resources: BTreeMap<String, ResourceSchema>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSchema {
    pub description: String,
    pub attributes: BTreeMap<String, AttributeSchema>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeSchema {
    pub description: String,
    #[serde(rename = "type")]
    pub type_: AttributeType,
    pub required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttributeType {
    String,
}

/// The failure classes a provider reports to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceErrorKind {
    WriteFailure,
    ReadFailure,
    DeleteFailure,
    InvalidInput,
}

impl ResourceErrorKind {
    /// JSON-RPC error code used for this kind.
    pub const fn code(self) -> i32 {
        match self {
            ResourceErrorKind::WriteFailure => -32001,
            ResourceErrorKind::ReadFailure => -32002,
            ResourceErrorKind::DeleteFailure => -32003,
            ResourceErrorKind::InvalidInput => -32602,
        }
    }
}

impl fmt::Display for ResourceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceErrorKind::WriteFailure => "write failure",
            ResourceErrorKind::ReadFailure => "read failure",
            ResourceErrorKind::DeleteFailure => "delete failure",
            ResourceErrorKind::InvalidInput => "invalid input",
        };
        f.write_str(s)
    }
}

/// A typed failure, as it travels in the `data` field of a JSON-RPC error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{kind}{}: {cause}", .location.as_ref().map(|l| format!(" at {l}")).unwrap_or_default())]
pub struct ResourceError {
    pub kind: ResourceErrorKind,
    pub location: Option<String>,
    pub cause: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object_from_iter<T: IntoIterator<Item = (String, Value)>>(x: T) -> Map<String, Value> {
        Map::from_iter(x)
    }

    #[test]
    fn create_resource_request_wire_format() {
        let json = r#"{
            "type": "os_text_file",
            "inputProperties": {
                "path": "/etc/motd",
                "content": "welcome\n"
            }
        }"#;
        let value: CreateResourceRequest = serde_json::from_str(json).unwrap();
        assert_eq!(
            value,
            CreateResourceRequest {
                type_: ResourceType("os_text_file".to_string()),
                input_properties: InputProperties(object_from_iter(vec![
                    ("path".to_string(), Value::String("/etc/motd".to_string())),
                    ("content".to_string(), Value::String("welcome\n".to_string())),
                ])),
            }
        );
    }

    #[test]
    fn extant_resource_without_outputs() {
        let value: ExtantResource = serde_json::from_value(json!({
            "type": "os_text_file",
            "inputProperties": { "path": "/a" },
        }))
        .unwrap();
        assert_eq!(value.output_properties, None);

        // and it is omitted again on the way out
        let back = serde_json::to_value(&value).unwrap();
        assert!(back.get("outputProperties").is_none());
    }

    #[test]
    fn read_response_absent_is_null() {
        let absent = ReadResourceResponse {
            output_properties: None,
        };
        assert_eq!(
            serde_json::to_value(absent).unwrap(),
            json!({ "outputProperties": null })
        );
    }

    #[test]
    fn resource_error_data() {
        let e = ResourceError {
            kind: ResourceErrorKind::ReadFailure,
            location: Some("/root/secret".to_string()),
            cause: "Permission denied (os error 13)".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&e).unwrap(),
            json!({
                "kind": "readFailure",
                "location": "/root/secret",
                "cause": "Permission denied (os error 13)",
            })
        );
        assert_eq!(
            e.to_string(),
            "read failure at /root/secret: Permission denied (os error 13)"
        );
    }

    #[test]
    fn resource_error_display_without_location() {
        let e = ResourceError {
            kind: ResourceErrorKind::InvalidInput,
            location: None,
            cause: "missing field `path`".to_string(),
        };
        assert_eq!(e.to_string(), "invalid input: missing field `path`");
    }

    #[test]
    fn error_codes_are_distinct() {
        let codes = [
            ResourceErrorKind::WriteFailure.code(),
            ResourceErrorKind::ReadFailure.code(),
            ResourceErrorKind::DeleteFailure.code(),
            ResourceErrorKind::InvalidInput.code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
