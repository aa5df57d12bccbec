//! Per-folder watermark bookkeeping.
//!
//! Watermarks live on the folder node itself, as two timestamp properties
//! whose keys come from `[sync]` configuration:
//!
//! - `updated_property`: refreshed after every live dispatch and after a
//!   backfill pass; the next backfill only looks at documents modified after it.
//! - `published_property`: refreshed only when a backfill pass completes.

use anyhow::Result;
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::SyncConfig;
use crate::models::SyncFolder;
use crate::search::{format_property_timestamp, RepoNode};
use crate::traits::RepositoryClient;

#[derive(Clone)]
pub struct Watermarks {
    repo: Arc<dyn RepositoryClient>,
    updated_property: String,
    published_property: String,
}

impl Watermarks {
    pub fn new(repo: Arc<dyn RepositoryClient>, config: &SyncConfig) -> Self {
        Self {
            repo,
            updated_property: config.updated_property.clone(),
            published_property: config.published_property.clone(),
        }
    }

    /// Set the folder's `updated` watermark (and `published`, after a backfill) to now.
    pub async fn touch(&self, folder_id: &str, published: bool) -> Result<()> {
        let now = format_property_timestamp(Utc::now());
        let mut properties = Map::new();
        properties.insert(self.updated_property.clone(), Value::String(now.clone()));
        if published {
            properties.insert(self.published_property.clone(), Value::String(now));
        }
        self.repo.update_node_properties(folder_id, properties).await
    }

    /// Build a [`SyncFolder`] from a search hit.
    pub fn read_folder(&self, node: &RepoNode) -> SyncFolder {
        SyncFolder {
            id: node.id.clone(),
            name: node.name.clone(),
            published_date: node.date_property(&self.published_property),
            updated_date: node.date_property(&self.updated_property),
            doc_last_updated_date: None,
        }
    }
}
