//! Per-node dispatch of content changes to the ingestion service.
//!
//! [`ContentSyncHandler::handle`] expects events that already passed the
//! hierarchy membership filter, and is only invoked once the coordinator is
//! live. Behaviour by kind:
//!
//! | Kind | Action |
//! |------|--------|
//! | CREATED | fetch content, upload keyed by (document, owning folder, file name) |
//! | UPDATED | same as CREATED, but only if the prior state carried content |
//! | DELETED | delete the document from the index |
//! | other | skipped |
//!
//! Folder nodes are skipped for CREATED/UPDATED. A successful upload or
//! delete refreshes the owning folder's `updated` watermark.

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::models::{ChangeEvent, EventKind, NodeState};
use crate::registry::FolderRegistry;
use crate::traits::{IngestionService, RepositoryClient, UploadRequest};
use crate::watermark::Watermarks;

/// What [`ContentSyncHandler::handle`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Uploaded,
    Deleted,
    Skipped,
}

#[derive(Clone)]
pub struct ContentSyncHandler {
    registry: FolderRegistry,
    repo: Arc<dyn RepositoryClient>,
    ai: Arc<dyn IngestionService>,
    watermarks: Watermarks,
}

impl ContentSyncHandler {
    pub fn new(
        registry: FolderRegistry,
        repo: Arc<dyn RepositoryClient>,
        ai: Arc<dyn IngestionService>,
        watermarks: Watermarks,
    ) -> Self {
        Self {
            registry,
            repo,
            ai,
            watermarks,
        }
    }

    /// Dispatch one event. Errors abort only this event.
    pub async fn handle(&self, event: &ChangeEvent) -> Result<Dispatch> {
        let Some(node) = event.node() else {
            bail!("Invalid event resource type for event '{}'", event.id);
        };
        tracing::info!(kind = %event.kind, node_id = %node.id, "processing event");

        let owner = self.owning_folder(node);
        let outcome = match &event.kind {
            EventKind::Created => self.upload(node, owner.as_deref()).await?,
            EventKind::Updated => {
                let had_content = event
                    .resource_before
                    .as_ref()
                    .map(|before| before.content.is_some())
                    .unwrap_or(false);
                if had_content {
                    self.upload(node, owner.as_deref()).await?
                } else {
                    tracing::info!(
                        node_id = %node.id,
                        name = %node.name,
                        "skipping update: content unchanged"
                    );
                    Dispatch::Skipped
                }
            }
            EventKind::Deleted => {
                let response = self.ai.delete(&node.id).await?;
                tracing::info!(node_id = %node.id, response = %response, "deletion completed");
                Dispatch::Deleted
            }
            EventKind::Other(t) => {
                tracing::warn!(event_type = %t, node_id = %node.id, "unhandled event type");
                Dispatch::Skipped
            }
        };

        if outcome != Dispatch::Skipped {
            self.refresh_watermark(owner.as_deref(), &node.id).await;
        }
        Ok(outcome)
    }

    /// First tracked folder in the node's hierarchy.
    pub fn owning_folder(&self, node: &NodeState) -> Option<String> {
        self.registry
            .first_member_of(&node.primary_hierarchy)
            .map(str::to_string)
    }

    async fn upload(&self, node: &NodeState, owner: Option<&str>) -> Result<Dispatch> {
        if node.is_folder() {
            tracing::debug!(node_id = %node.id, "skipping folder node");
            return Ok(Dispatch::Skipped);
        }
        if owner.is_none() {
            // The folder was unregistered between filtering and dispatch.
            tracing::warn!(node_id = %node.id, "no tracked folder in hierarchy; uploading with empty folder id");
        }
        let response = transfer_document(
            self.repo.as_ref(),
            self.ai.as_ref(),
            &node.id,
            Some(owner.unwrap_or("")),
            &node.name,
        )
        .await?;
        tracing::debug!(node_id = %node.id, name = %node.name, response = %response, "document uploaded");
        Ok(Dispatch::Uploaded)
    }

    async fn refresh_watermark(&self, owner: Option<&str>, node_id: &str) {
        let Some(folder_id) = owner else {
            tracing::warn!(node_id = %node_id, "no tracked folder to refresh watermark on");
            return;
        };
        if let Err(e) = self.watermarks.touch(folder_id, false).await {
            tracing::error!(folder_id = %folder_id, error = %e, "failed to refresh folder watermark");
        }
    }
}

/// Fetch a node's content from the repository and hand it to the ingestion service.
pub async fn transfer_document(
    repo: &dyn RepositoryClient,
    ai: &dyn IngestionService,
    document_id: &str,
    folder_id: Option<&str>,
    file_name: &str,
) -> Result<String> {
    let content = repo.get_node_content(document_id).await?;
    ai.upload(UploadRequest {
        document_id: document_id.to_string(),
        folder_id: folder_id.map(str::to_string),
        file_name: file_name.to_string(),
        content,
    })
    .await
}
