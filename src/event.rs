//! Decoding of Alfresco repository event messages.
//!
//! The repository publishes CloudEvents-style JSON:
//!
//! ```json
//! {
//!   "type": "org.alfresco.event.node.Updated",
//!   "id": "6f1c...",
//!   "data": {
//!     "resource": {
//!       "@type": "NodeResource",
//!       "id": "d1", "name": "report.pdf",
//!       "isFile": true, "isFolder": false,
//!       "primaryHierarchy": ["f1", "root"],
//!       "aspectNames": ["cm:titled"],
//!       "content": { "mimeType": "application/pdf", "sizeInBytes": 1024 }
//!     },
//!     "resourceBefore": { "@type": "NodeResource", "content": { ... } }
//!   }
//! }
//! ```
//!
//! Resources whose `@type` is not `NodeResource` decode to `None`, which the
//! filters treat as "does not match" and the handlers reject.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::models::{ChangeEvent, ContentInfo, EventKind, NodeKind, NodeState};

const TYPE_FIELD: &str = "@type";
const NODE_RESOURCE_TYPE: &str = "NodeResource";

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    data: Option<RawData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawData {
    #[serde(default)]
    resource: Option<serde_json::Value>,
    #[serde(default)]
    resource_before: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    is_file: Option<bool>,
    #[serde(default)]
    is_folder: Option<bool>,
    #[serde(default)]
    primary_hierarchy: Option<Vec<String>>,
    #[serde(default)]
    aspect_names: Option<Vec<String>>,
    #[serde(default)]
    content: Option<RawContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawContent {
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    size_in_bytes: Option<u64>,
}

/// Decode one event message.
///
/// Fails only when the message is not JSON or has no `type`.
pub fn decode_event(json: &str) -> Result<ChangeEvent> {
    let raw: RawEvent = serde_json::from_str(json).context("Failed to parse event")?;
    let (resource, resource_before) = match raw.data {
        Some(data) => (
            data.resource.and_then(node_resource),
            data.resource_before.and_then(node_resource),
        ),
        None => (None, None),
    };

    Ok(ChangeEvent {
        id: raw.id,
        kind: EventKind::from_type(&raw.event_type),
        resource,
        resource_before,
    })
}

fn node_resource(value: serde_json::Value) -> Option<NodeState> {
    if value.get(TYPE_FIELD).and_then(|t| t.as_str()) != Some(NODE_RESOURCE_TYPE) {
        return None;
    }
    let raw: RawNode = serde_json::from_value(value).ok()?;

    let kind = match (raw.is_folder, raw.is_file) {
        (Some(true), _) => NodeKind::Folder,
        (_, Some(true)) => NodeKind::Content,
        _ => NodeKind::Other,
    };

    Some(NodeState {
        id: raw.id,
        name: raw.name.unwrap_or_default(),
        kind,
        primary_hierarchy: raw.primary_hierarchy.unwrap_or_default(),
        aspect_names: raw.aspect_names.unwrap_or_default().into_iter().collect(),
        content: raw.content.map(|c| ContentInfo {
            mime_type: c.mime_type,
            size_in_bytes: c.size_in_bytes,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_created_content_event() {
        let json = r#"{
            "specversion": "1.0",
            "type": "org.alfresco.event.node.Created",
            "id": "ev-1",
            "source": "/08d9b620-48de-4247-8f33-360988d3b19b",
            "data": {
                "eventGroupId": "g",
                "resource": {
                    "@type": "NodeResource",
                    "id": "d1",
                    "name": "report.pdf",
                    "nodeType": "cm:content",
                    "isFile": true,
                    "isFolder": false,
                    "primaryHierarchy": ["f1", "root"],
                    "aspectNames": ["cm:titled", "cm:auditable"],
                    "content": { "mimeType": "application/pdf", "sizeInBytes": 1024 }
                }
            }
        }"#;
        let event = decode_event(json).unwrap();
        assert_eq!(event.id, "ev-1");
        assert_eq!(event.kind, EventKind::Created);
        let node = event.node().unwrap();
        assert_eq!(node.id, "d1");
        assert_eq!(node.name, "report.pdf");
        assert_eq!(node.kind, NodeKind::Content);
        assert_eq!(node.primary_hierarchy, vec!["f1", "root"]);
        assert!(node.has_aspect("cm:titled"));
        assert_eq!(
            node.content,
            Some(ContentInfo {
                mime_type: Some("application/pdf".to_string()),
                size_in_bytes: Some(1024),
            })
        );
        assert!(event.resource_before.is_none());
    }

    #[test]
    fn partial_before_state_keeps_content_marker() {
        let json = r#"{
            "type": "org.alfresco.event.node.Updated",
            "id": "ev-2",
            "data": {
                "resource": { "@type": "NodeResource", "id": "d1", "isFile": true },
                "resourceBefore": {
                    "@type": "NodeResource",
                    "content": { "mimeType": "text/plain", "sizeInBytes": 3 }
                }
            }
        }"#;
        let event = decode_event(json).unwrap();
        assert_eq!(event.kind, EventKind::Updated);
        let before = event.resource_before.unwrap();
        assert!(before.content.is_some());
        assert_eq!(before.kind, NodeKind::Other);
    }

    #[test]
    fn folder_with_aspects() {
        let json = r#"{
            "type": "org.alfresco.event.node.Updated",
            "data": {
                "resource": {
                    "@type": "NodeResource", "id": "f1", "name": "Projects",
                    "isFolder": true, "aspectNames": ["acme:aiSync"]
                },
                "resourceBefore": { "@type": "NodeResource", "aspectNames": [] }
            }
        }"#;
        let event = decode_event(json).unwrap();
        assert!(event.node().unwrap().is_folder());
        assert!(event.node().unwrap().has_aspect("acme:aiSync"));
        assert!(!event.resource_before.unwrap().has_aspect("acme:aiSync"));
    }

    #[test]
    fn non_node_resource_becomes_none() {
        let json = r#"{
            "type": "org.alfresco.event.permission.Updated",
            "data": { "resource": { "@type": "PermissionResource", "id": "p" } }
        }"#;
        let event = decode_event(json).unwrap();
        assert!(event.resource.is_none());
        assert_eq!(
            event.kind,
            EventKind::Other("org.alfresco.event.permission.Updated".to_string())
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_event("not json").is_err());
        assert!(decode_event(r#"{"id": "no-type"}"#).is_err());
    }
}
