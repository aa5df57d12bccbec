//! Keeps the [`FolderRegistry`] in step with folder lifecycle events.

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::filter::EventFilter;
use crate::models::{ChangeEvent, EventKind, NodeKind};
use crate::registry::FolderRegistry;
use crate::traits::IngestionService;

#[derive(Clone)]
pub struct FolderMembershipHandler {
    registry: FolderRegistry,
    ai: Arc<dyn IngestionService>,
    attached: EventFilter,
    detached: EventFilter,
}

impl FolderMembershipHandler {
    pub fn new(registry: FolderRegistry, ai: Arc<dyn IngestionService>, sync_aspect: &str) -> Self {
        let folder = EventFilter::NodeKind(NodeKind::Folder);
        Self {
            registry,
            ai,
            attached: folder.clone().and(EventFilter::aspect_attached(sync_aspect)),
            detached: folder.and(EventFilter::aspect_detached(sync_aspect)),
        }
    }

    /// Whether this handler wants the event at all.
    pub fn accepts(&self, event: &ChangeEvent) -> bool {
        self.attached.test(event) || self.detached.test(event)
    }

    pub async fn handle(&self, event: &ChangeEvent) -> Result<()> {
        let Some(node) = event.node() else {
            bail!("Invalid event resource type for event '{}'", event.id);
        };
        let id = node.id.as_str();

        if self.detached.test(event) {
            tracing::info!(folder_id = %id, "sync aspect removed from folder");
            self.unregister(id).await;
            return Ok(());
        }

        match &event.kind {
            EventKind::Created | EventKind::Updated => {
                if self.registry.add(id) {
                    tracing::info!(folder_id = %id, name = %node.name, "folder added for synchronization");
                }
            }
            EventKind::Deleted => {
                tracing::info!(folder_id = %id, "folder removed from synchronization");
                self.unregister(id).await;
            }
            EventKind::Other(t) => {
                tracing::warn!(event_type = %t, folder_id = %id, "unhandled event type");
            }
        }
        Ok(())
    }

    /// Drop the folder and, best effort, everything indexed under it.
    async fn unregister(&self, id: &str) {
        self.registry.remove(id);
        match self.ai.delete_by_folder(id).await {
            Ok(response) => {
                tracing::info!(folder_id = %id, response = %response, "folder documents deleted")
            }
            Err(e) => {
                tracing::error!(folder_id = %id, error = %e, "failed to remove documents for folder")
            }
        }
    }
}
