//! Core data models used throughout the sync engine.
//!
//! These types represent the change events, node snapshots, and tracked
//! folders that flow between the event feed, the filters, the handlers, and
//! the backfill scanner. Wire formats live in [`crate::event`] and
//! [`crate::search`]; everything here is transport-agnostic.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Kind of repository change carried by a [`ChangeEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
    /// Any other event type, kept verbatim for diagnostics.
    Other(String),
}

impl EventKind {
    pub const CREATED: &'static str = "org.alfresco.event.node.Created";
    pub const UPDATED: &'static str = "org.alfresco.event.node.Updated";
    pub const DELETED: &'static str = "org.alfresco.event.node.Deleted";

    /// Map an Alfresco event type string onto an [`EventKind`].
    pub fn from_type(event_type: &str) -> Self {
        match event_type {
            Self::CREATED => EventKind::Created,
            Self::UPDATED => EventKind::Updated,
            Self::DELETED => EventKind::Deleted,
            other => EventKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Created => "CREATED",
            EventKind::Updated => "UPDATED",
            EventKind::Deleted => "DELETED",
            EventKind::Other(t) => t,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural class of a repository node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Folder,
    Content,
    /// Unknown or not reported (typical for partial "before" snapshots).
    Other,
}

/// Content marker: present on a [`NodeState`] iff the node carries binary content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentInfo {
    pub mime_type: Option<String>,
    pub size_in_bytes: Option<u64>,
}

/// Snapshot of a node as reported by an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeState {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    /// Ancestor folder ids as reported by the repository, immediate parent first.
    pub primary_hierarchy: Vec<String>,
    pub aspect_names: BTreeSet<String>,
    pub content: Option<ContentInfo>,
}

impl NodeState {
    pub fn has_aspect(&self, aspect: &str) -> bool {
        self.aspect_names.contains(aspect)
    }

    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }
}

/// A repository change notification. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Event id assigned by the repository (may be empty).
    pub id: String,
    pub kind: EventKind,
    /// Current node state. `None` when the payload was not a node resource.
    pub resource: Option<NodeState>,
    /// Prior node state, only reported for updates.
    pub resource_before: Option<NodeState>,
}

impl ChangeEvent {
    /// The node this event is about, if the payload carried one.
    pub fn node(&self) -> Option<&NodeState> {
        self.resource.as_ref()
    }

    pub fn node_id(&self) -> Option<&str> {
        self.resource.as_ref().map(|n| n.id.as_str())
    }
}

/// A folder carrying the sync aspect, with its watermarks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFolder {
    pub id: String,
    pub name: String,
    /// Last completed backfill.
    pub published_date: Option<DateTime<Utc>>,
    /// Last event-driven update; bounds the next backfill query.
    pub updated_date: Option<DateTime<Utc>>,
    /// Modification time of the newest document under the folder, filled
    /// in when the folder is checked for pending changes.
    pub doc_last_updated_date: Option<DateTime<Utc>>,
}

impl SyncFolder {
    /// Whether documents changed since the last sync watermark.
    ///
    /// A folder without a watermark has never been synced and always needs
    /// a pass; a folder without documents never does.
    pub fn needs_sync(&self) -> bool {
        match (self.updated_date, self.doc_last_updated_date) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(watermark), Some(latest)) => watermark < latest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn folder(updated: Option<i64>, latest: Option<i64>) -> SyncFolder {
        SyncFolder {
            id: "f1".to_string(),
            name: "Folder".to_string(),
            published_date: None,
            updated_date: updated.map(|t| Utc.timestamp_opt(t, 0).unwrap()),
            doc_last_updated_date: latest.map(|t| Utc.timestamp_opt(t, 0).unwrap()),
        }
    }

    #[test]
    fn needs_sync_compares_watermark_with_latest_document() {
        assert!(folder(Some(100), Some(200)).needs_sync());
        assert!(!folder(Some(200), Some(200)).needs_sync());
        assert!(!folder(Some(300), Some(200)).needs_sync());
    }

    #[test]
    fn needs_sync_without_watermark_or_documents() {
        assert!(folder(None, Some(200)).needs_sync());
        assert!(!folder(None, None).needs_sync());
        assert!(!folder(Some(100), None).needs_sync());
    }

    #[test]
    fn event_kind_from_alfresco_type() {
        assert_eq!(
            EventKind::from_type("org.alfresco.event.node.Created"),
            EventKind::Created
        );
        assert_eq!(
            EventKind::from_type("org.alfresco.event.node.Deleted"),
            EventKind::Deleted
        );
        assert_eq!(
            EventKind::from_type("org.alfresco.event.permission.Updated"),
            EventKind::Other("org.alfresco.event.permission.Updated".to_string())
        );
    }
}
