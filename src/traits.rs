//! Seams to the two external collaborators.
//!
//! The engine never talks HTTP directly. It consumes the repository through
//! [`RepositoryClient`] and the ingestion pipeline through
//! [`IngestionService`], so the same handlers run against the HTTP clients
//! in production and the in-memory doubles in tests.
//!
//! ```text
//!            ┌───────────────────┐
//!  events ──▶│  SyncCoordinator  │
//!            └──┬─────────────┬──┘
//!               ▼             ▼
//!     ┌──────────────┐  ┌──────────────┐
//!     │  Repository  │  │  Ingestion   │
//!     │   Client     │  │   Service    │
//!     │ (Alfresco)   │  │ (AI / RAG)   │
//!     └──────────────┘  └──────────────┘
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::search::{SearchPage, SearchRequest};

// ═══════════════════════════════════════════════════════════════════════
// Repository
// ═══════════════════════════════════════════════════════════════════════

/// Read/write access to the content repository.
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    /// Run a search and return one page of hits.
    async fn search(&self, request: &SearchRequest) -> Result<SearchPage>;

    /// Download the binary content of a node.
    async fn get_node_content(&self, node_id: &str) -> Result<Vec<u8>>;

    /// Merge `properties` into the node's property map.
    async fn update_node_properties(&self, node_id: &str, properties: Map<String, Value>)
        -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════
// Ingestion
// ═══════════════════════════════════════════════════════════════════════

/// A document handed to the ingestion service.
///
/// Uploads are replace-semantics on the service side: sending the same
/// `document_id` twice leaves one indexed copy.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub document_id: String,
    /// Owning sync folder, used by the service for folder-wide deletes.
    pub folder_id: Option<String>,
    pub file_name: String,
    pub content: Vec<u8>,
}

/// The document-understanding pipeline (extraction, chunking, embedding).
#[async_trait]
pub trait IngestionService: Send + Sync {
    /// Index (or re-index) a document. Returns the service acknowledgement.
    async fn upload(&self, request: UploadRequest) -> Result<String>;

    /// Remove a single document from the index.
    async fn delete(&self, document_id: &str) -> Result<String>;

    /// Remove every document indexed under a folder.
    async fn delete_by_folder(&self, folder_id: &str) -> Result<String>;
}
