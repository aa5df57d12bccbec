//! In-memory collaborators for tests and dry runs.
//!
//! [`InMemoryRepository`] understands exactly the AFTS query shapes produced
//! by [`crate::search`]: sync-folder discovery by aspect, and content below
//! an ancestor folder with an optional `cm:modified` lower bound.
//! [`InMemoryIngestion`] keeps an upsert-semantics index and records every
//! call so tests can assert on dispatch counts and order.
//!
//! Uses `std::sync::Mutex`; no lock is held across an `.await`.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::search::{self, RepoNode, SearchPage, SearchRequest, FIELD_MODIFIED};
use crate::traits::{IngestionService, RepositoryClient, UploadRequest};

// ═══════════════════════════════════════════════════════════════════════
// Repository
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
struct StoredFolder {
    id: String,
    name: String,
    aspects: HashSet<String>,
    properties: Map<String, Value>,
}

#[derive(Debug, Clone)]
struct StoredDocument {
    id: String,
    name: String,
    ancestors: Vec<String>,
    modified_at: DateTime<Utc>,
    content: Vec<u8>,
}

/// In-memory repository for testing.
#[derive(Default)]
pub struct InMemoryRepository {
    folders: Mutex<Vec<StoredFolder>>,
    documents: Mutex<Vec<StoredDocument>>,
    broken_content: Mutex<HashSet<String>>,
    searches: Mutex<Vec<SearchRequest>>,
    property_updates: Mutex<Vec<(String, Map<String, Value>)>>,
    fail_search: Mutex<bool>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_folder(&self, id: &str, name: &str, aspects: &[&str]) {
        self.folders.lock().unwrap().push(StoredFolder {
            id: id.to_string(),
            name: name.to_string(),
            aspects: aspects.iter().map(|a| a.to_string()).collect(),
            properties: Map::new(),
        });
    }

    pub fn set_folder_property(&self, id: &str, key: &str, value: impl Into<Value>) {
        let mut folders = self.folders.lock().unwrap();
        if let Some(f) = folders.iter_mut().find(|f| f.id == id) {
            f.properties.insert(key.to_string(), value.into());
        }
    }

    pub fn folder_property(&self, id: &str, key: &str) -> Option<Value> {
        let folders = self.folders.lock().unwrap();
        folders
            .iter()
            .find(|f| f.id == id)
            .and_then(|f| f.properties.get(key).cloned())
    }

    /// Add a content document. `ancestors` lists every folder the document sits below.
    pub fn add_document(
        &self,
        id: &str,
        name: &str,
        ancestors: &[&str],
        modified_at: DateTime<Utc>,
        content: &[u8],
    ) {
        self.documents.lock().unwrap().push(StoredDocument {
            id: id.to_string(),
            name: name.to_string(),
            ancestors: ancestors.iter().map(|a| a.to_string()).collect(),
            modified_at,
            content: content.to_vec(),
        });
    }

    /// Change a document's modification time, as an edit in the repository would.
    pub fn set_document_modified(&self, id: &str, modified_at: DateTime<Utc>) {
        let mut docs = self.documents.lock().unwrap();
        if let Some(d) = docs.iter_mut().find(|d| d.id == id) {
            d.modified_at = modified_at;
        }
    }

    /// Make content downloads of `id` fail.
    pub fn break_content(&self, id: &str) {
        self.broken_content.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_searches(&self, fail: bool) {
        *self.fail_search.lock().unwrap() = fail;
    }

    pub fn searches(&self) -> Vec<SearchRequest> {
        self.searches.lock().unwrap().clone()
    }

    pub fn property_updates(&self) -> Vec<(String, Map<String, Value>)> {
        self.property_updates.lock().unwrap().clone()
    }

    fn folder_hits(&self, aspect: &str) -> Vec<RepoNode> {
        let folders = self.folders.lock().unwrap();
        folders
            .iter()
            .filter(|f| f.aspects.contains(aspect))
            .map(|f| RepoNode {
                id: f.id.clone(),
                name: f.name.clone(),
                modified_at: None,
                properties: Some(f.properties.clone()),
            })
            .collect()
    }

    fn document_hits(
        &self,
        ancestor: &str,
        since: Option<DateTime<Utc>>,
        ascending: bool,
    ) -> Vec<RepoNode> {
        let docs = self.documents.lock().unwrap();
        let mut hits: Vec<&StoredDocument> = docs
            .iter()
            .filter(|d| d.ancestors.iter().any(|a| a == ancestor))
            .filter(|d| since.map(|s| d.modified_at >= s).unwrap_or(true))
            .collect();
        hits.sort_by_key(|d| d.modified_at);
        if !ascending {
            hits.reverse();
        }
        hits.into_iter()
            .map(|d| RepoNode {
                id: d.id.clone(),
                name: d.name.clone(),
                modified_at: Some(search::format_range_literal(d.modified_at)),
                properties: None,
            })
            .collect()
    }
}

/// Extract the text between `prefix` and the next `terminator`.
fn between<'a>(s: &'a str, prefix: &str, terminator: &str) -> Option<&'a str> {
    let start = s.find(prefix)? + prefix.len();
    let end = s[start..].find(terminator)?;
    Some(&s[start..start + end])
}

#[async_trait]
impl RepositoryClient for InMemoryRepository {
    async fn search(&self, request: &SearchRequest) -> Result<SearchPage> {
        self.searches.lock().unwrap().push(request.clone());
        if *self.fail_search.lock().unwrap() {
            bail!("search unavailable");
        }

        let query = request.query.query.as_str();
        let ascending = request
            .sort
            .iter()
            .find(|s| s.field == FIELD_MODIFIED)
            .map(|s| s.ascending)
            .unwrap_or(true);

        let hits = if let Some(aspect) = between(query, "ASPECT:\"", "\"") {
            self.folder_hits(aspect)
        } else if let Some(ancestor) = between(query, "ANCESTOR:\"workspace://SpacesStore/", "\"")
        {
            let since = between(query, "cm:modified:[", " TO").and_then(search::parse_timestamp);
            self.document_hits(ancestor, since, ascending)
        } else {
            bail!("unsupported query: {}", query);
        };

        let total = hits.len();
        let (skip, max) = request
            .paging
            .map(|p| (p.skip_count as usize, p.max_items as usize))
            .unwrap_or((0, 100));
        let entries: Vec<RepoNode> = hits.into_iter().skip(skip).take(max).collect();
        let has_more_items = skip + entries.len() < total;

        Ok(SearchPage {
            entries,
            has_more_items,
            total_items: Some(total as u64),
        })
    }

    async fn get_node_content(&self, node_id: &str) -> Result<Vec<u8>> {
        if self.broken_content.lock().unwrap().contains(node_id) {
            bail!("content of {} unavailable", node_id);
        }
        let docs = self.documents.lock().unwrap();
        match docs.iter().find(|d| d.id == node_id) {
            Some(d) => Ok(d.content.clone()),
            None => bail!("node {} not found", node_id),
        }
    }

    async fn update_node_properties(
        &self,
        node_id: &str,
        properties: Map<String, Value>,
    ) -> Result<()> {
        {
            let mut folders = self.folders.lock().unwrap();
            if let Some(f) = folders.iter_mut().find(|f| f.id == node_id) {
                f.properties
                    .extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        self.property_updates
            .lock()
            .unwrap()
            .push((node_id.to_string(), properties));
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Ingestion
// ═══════════════════════════════════════════════════════════════════════

/// A call observed by [`InMemoryIngestion`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestionCall {
    Upload {
        document_id: String,
        folder_id: Option<String>,
        file_name: String,
    },
    Delete(String),
    DeleteByFolder(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedDocument {
    pub folder_id: Option<String>,
    pub file_name: String,
    pub size: usize,
}

/// In-memory ingestion service with upsert semantics.
#[derive(Default)]
pub struct InMemoryIngestion {
    index: Mutex<HashMap<String, IndexedDocument>>,
    calls: Mutex<Vec<IngestionCall>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
}

impl InMemoryIngestion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call mentioning `id` (document or folder) fail.
    pub fn fail_for(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    /// Slow every call down, to exercise timeouts.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<IngestionCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn upload_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, IngestionCall::Upload { .. }))
            .count()
    }

    pub fn indexed(&self) -> HashMap<String, IndexedDocument> {
        self.index.lock().unwrap().clone()
    }

    async fn enter(&self, call: IngestionCall, key: &str) -> Result<()> {
        let delay = *self.delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        self.calls.lock().unwrap().push(call);
        if self.failing.lock().unwrap().contains(key) {
            bail!("ingestion failed for {}", key);
        }
        Ok(())
    }
}

#[async_trait]
impl IngestionService for InMemoryIngestion {
    async fn upload(&self, request: UploadRequest) -> Result<String> {
        self.enter(
            IngestionCall::Upload {
                document_id: request.document_id.clone(),
                folder_id: request.folder_id.clone(),
                file_name: request.file_name.clone(),
            },
            &request.document_id,
        )
        .await?;
        self.index.lock().unwrap().insert(
            request.document_id.clone(),
            IndexedDocument {
                folder_id: request.folder_id,
                file_name: request.file_name,
                size: request.content.len(),
            },
        );
        Ok(format!(
            "Document uploaded successfully with ID: {}",
            request.document_id
        ))
    }

    async fn delete(&self, document_id: &str) -> Result<String> {
        self.enter(IngestionCall::Delete(document_id.to_string()), document_id)
            .await?;
        self.index.lock().unwrap().remove(document_id);
        Ok(format!("document deleted successfully with ID: {}", document_id))
    }

    async fn delete_by_folder(&self, folder_id: &str) -> Result<String> {
        self.enter(IngestionCall::DeleteByFolder(folder_id.to_string()), folder_id)
            .await?;
        self.index
            .lock()
            .unwrap()
            .retain(|_, doc| doc.folder_id.as_deref() != Some(folder_id));
        Ok(format!("folder deleted successfully with ID: {}", folder_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn repository_pages_documents_in_modified_order() {
        let repo = InMemoryRepository::new();
        repo.add_document("d2", "b.txt", &["root", "f1"], ts(200), b"b");
        repo.add_document("d1", "a.txt", &["root", "f1"], ts(100), b"a");
        repo.add_document("d3", "c.txt", &["root", "f1"], ts(300), b"c");
        repo.add_document("x", "x.txt", &["root", "f2"], ts(300), b"x");

        let query = search::modified_documents_query("f1", Some(ts(150)));
        let first = repo
            .search(
                &SearchRequest::afts(query.clone())
                    .sorted_by(FIELD_MODIFIED, true)
                    .page(1, 0),
            )
            .await
            .unwrap();
        assert_eq!(first.entries[0].id, "d2");
        assert!(first.has_more_items);

        let second = repo
            .search(
                &SearchRequest::afts(query)
                    .sorted_by(FIELD_MODIFIED, true)
                    .page(1, 1),
            )
            .await
            .unwrap();
        assert_eq!(second.entries[0].id, "d3");
        assert!(!second.has_more_items);
    }

    #[tokio::test]
    async fn ingestion_upload_replaces_and_folder_delete_cascades() {
        let ai = InMemoryIngestion::new();
        for _ in 0..2 {
            ai.upload(UploadRequest {
                document_id: "d1".to_string(),
                folder_id: Some("f1".to_string()),
                file_name: "a.txt".to_string(),
                content: b"abc".to_vec(),
            })
            .await
            .unwrap();
        }
        assert_eq!(ai.upload_count(), 2);
        assert_eq!(ai.indexed().len(), 1);

        ai.delete_by_folder("f1").await.unwrap();
        assert!(ai.indexed().is_empty());
    }
}
