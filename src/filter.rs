//! Event relevance predicates.
//!
//! Filters are plain values that can be combined with [`EventFilter::and`],
//! [`EventFilter::or`] and [`EventFilter::negate`]. Every predicate fails
//! closed: an event without a node resource never matches a node predicate.
//!
//! | Filter | Matches when |
//! |--------|--------------|
//! | [`AspectAttached`](EventFilter::AspectAttached) | aspect absent before (or no prior state) and present now |
//! | [`AspectDetached`](EventFilter::AspectDetached) | aspect present before and absent now |
//! | [`HierarchyMembership`](EventFilter::HierarchyMembership) | an ancestor folder is tracked at test time |
//! | [`NodeKind`](EventFilter::NodeKind) | the current node has the given kind |

use crate::models::{ChangeEvent, NodeKind};
use crate::registry::FolderRegistry;

#[derive(Debug, Clone)]
pub enum EventFilter {
    AspectAttached(String),
    AspectDetached(String),
    /// Membership is evaluated against the live registry, not a snapshot.
    HierarchyMembership(FolderRegistry),
    NodeKind(NodeKind),
    All(Vec<EventFilter>),
    Any(Vec<EventFilter>),
    Not(Box<EventFilter>),
}

impl EventFilter {
    pub fn aspect_attached(aspect: impl Into<String>) -> Self {
        EventFilter::AspectAttached(aspect.into())
    }

    pub fn aspect_detached(aspect: impl Into<String>) -> Self {
        EventFilter::AspectDetached(aspect.into())
    }

    pub fn in_tracked_folder(registry: &FolderRegistry) -> Self {
        EventFilter::HierarchyMembership(registry.clone())
    }

    pub fn and(self, other: EventFilter) -> Self {
        match self {
            EventFilter::All(mut filters) => {
                filters.push(other);
                EventFilter::All(filters)
            }
            first => EventFilter::All(vec![first, other]),
        }
    }

    pub fn or(self, other: EventFilter) -> Self {
        match self {
            EventFilter::Any(mut filters) => {
                filters.push(other);
                EventFilter::Any(filters)
            }
            first => EventFilter::Any(vec![first, other]),
        }
    }

    pub fn negate(self) -> Self {
        EventFilter::Not(Box::new(self))
    }

    pub fn test(&self, event: &ChangeEvent) -> bool {
        match self {
            EventFilter::AspectAttached(aspect) => {
                let existed_before = prior_has_aspect(event, aspect);
                let exists = current_has_aspect(event, aspect);
                tracing::debug!(
                    aspect = %aspect,
                    event_id = %event.id,
                    attached = exists && !existed_before,
                    "aspect attach check"
                );
                exists && !existed_before
            }
            EventFilter::AspectDetached(aspect) => {
                prior_has_aspect(event, aspect) && !current_has_aspect(event, aspect)
            }
            EventFilter::HierarchyMembership(registry) => event
                .node()
                .map(|node| registry.intersects(&node.primary_hierarchy))
                .unwrap_or(false),
            EventFilter::NodeKind(kind) => event.node().map(|n| n.kind == *kind).unwrap_or(false),
            EventFilter::All(filters) => filters.iter().all(|f| f.test(event)),
            EventFilter::Any(filters) => filters.iter().any(|f| f.test(event)),
            EventFilter::Not(inner) => !inner.test(event),
        }
    }
}

fn prior_has_aspect(event: &ChangeEvent, aspect: &str) -> bool {
    event
        .resource_before
        .as_ref()
        .map(|n| n.has_aspect(aspect))
        .unwrap_or(false)
}

fn current_has_aspect(event: &ChangeEvent, aspect: &str) -> bool {
    event.node().map(|n| n.has_aspect(aspect)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventKind, NodeState};

    const ASPECT: &str = "acme:aiSync";

    fn node(id: &str, kind: NodeKind, hierarchy: &[&str], aspects: &[&str]) -> NodeState {
        NodeState {
            id: id.to_string(),
            name: format!("{}.txt", id),
            kind,
            primary_hierarchy: hierarchy.iter().map(|s| s.to_string()).collect(),
            aspect_names: aspects.iter().map(|s| s.to_string()).collect(),
            content: None,
        }
    }

    fn event(
        kind: EventKind,
        current: Option<NodeState>,
        before: Option<NodeState>,
    ) -> ChangeEvent {
        ChangeEvent {
            id: "evt".to_string(),
            kind,
            resource: current,
            resource_before: before,
        }
    }

    #[test]
    fn aspect_attached_does_not_retrigger() {
        let filter = EventFilter::aspect_attached(ASPECT);
        let e = event(
            EventKind::Updated,
            Some(node("f", NodeKind::Folder, &[], &[ASPECT])),
            Some(node("f", NodeKind::Folder, &[], &[ASPECT])),
        );
        assert!(!filter.test(&e));
    }

    #[test]
    fn aspect_attached_on_transition() {
        let filter = EventFilter::aspect_attached(ASPECT);
        let e = event(
            EventKind::Updated,
            Some(node("f", NodeKind::Folder, &[], &[ASPECT])),
            Some(node("f", NodeKind::Folder, &[], &[])),
        );
        assert!(filter.test(&e));
    }

    #[test]
    fn aspect_attached_without_prior_state() {
        let filter = EventFilter::aspect_attached(ASPECT);
        let created = event(
            EventKind::Created,
            Some(node("f", NodeKind::Folder, &[], &[ASPECT, "cm:titled"])),
            None,
        );
        assert!(filter.test(&created));

        let plain = event(
            EventKind::Created,
            Some(node("f", NodeKind::Folder, &[], &["cm:titled"])),
            None,
        );
        assert!(!filter.test(&plain));
    }

    #[test]
    fn aspect_detached_only_on_removal() {
        let filter = EventFilter::aspect_detached(ASPECT);
        let removed = event(
            EventKind::Updated,
            Some(node("f", NodeKind::Folder, &[], &[])),
            Some(node("f", NodeKind::Folder, &[], &[ASPECT])),
        );
        assert!(filter.test(&removed));

        let kept = event(
            EventKind::Updated,
            Some(node("f", NodeKind::Folder, &[], &[ASPECT])),
            Some(node("f", NodeKind::Folder, &[], &[ASPECT])),
        );
        assert!(!filter.test(&kept));
    }

    #[test]
    fn hierarchy_membership_rejects_untracked_folders() {
        let registry = FolderRegistry::with_folders(["tracked"]);
        let filter = EventFilter::in_tracked_folder(&registry);

        let inside = event(
            EventKind::Created,
            Some(node("d", NodeKind::Content, &["root", "tracked", "sub"], &[])),
            None,
        );
        let outside = event(
            EventKind::Created,
            Some(node("d", NodeKind::Content, &["root", "other"], &[])),
            None,
        );
        assert!(filter.test(&inside));
        assert!(!filter.test(&outside));
    }

    #[test]
    fn hierarchy_membership_is_evaluated_lazily() {
        let registry = FolderRegistry::new();
        let filter = EventFilter::in_tracked_folder(&registry);
        let e = event(
            EventKind::Created,
            Some(node("d", NodeKind::Content, &["late"], &[])),
            None,
        );
        assert!(!filter.test(&e));
        registry.add("late");
        assert!(filter.test(&e));
        registry.remove("late");
        assert!(!filter.test(&e));
    }

    #[test]
    fn malformed_events_fail_closed() {
        let registry = FolderRegistry::with_folders(["tracked"]);
        let e = event(EventKind::Created, None, None);
        assert!(!EventFilter::in_tracked_folder(&registry).test(&e));
        assert!(!EventFilter::aspect_attached(ASPECT).test(&e));
        assert!(!EventFilter::NodeKind(NodeKind::Folder).test(&e));
    }

    #[test]
    fn composition() {
        let folder_attach =
            EventFilter::NodeKind(NodeKind::Folder).and(EventFilter::aspect_attached(ASPECT));
        let content = event(
            EventKind::Created,
            Some(node("d", NodeKind::Content, &[], &[ASPECT])),
            None,
        );
        let folder = event(
            EventKind::Created,
            Some(node("f", NodeKind::Folder, &[], &[ASPECT])),
            None,
        );
        assert!(!folder_attach.test(&content));
        assert!(folder_attach.test(&folder));

        let either = EventFilter::aspect_attached(ASPECT).or(EventFilter::aspect_detached(ASPECT));
        assert!(either.test(&folder));
        assert!(!either.negate().test(&folder));
    }
}
