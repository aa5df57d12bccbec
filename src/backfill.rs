//! Startup backfill: historical, watermark-driven sync of tracked folders.
//!
//! Runs once before the engine goes live. Folders are processed one after
//! another; documents within a page are processed concurrently, bounded by
//! `sync.backfill_parallelism`.
//!
//! # Workflow
//!
//! 1. Discover every folder carrying the sync aspect, with its watermarks.
//! 2. For each folder, fetch the most recently modified document and skip the
//!    folder if its `updated` watermark is not older than that document.
//! 3. Page through documents modified since the watermark, oldest first,
//!    keyed on the modification time.
//! 4. Fetch and upload each document. Failures are logged and counted; they
//!    never abort the folder.
//! 5. Stamp both watermarks of a completed folder with the current time.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::SyncConfig;
use crate::content_handler::transfer_document;
use crate::models::SyncFolder;
use crate::progress::{SyncProgressEvent, SyncProgressReporter};
use crate::search::{self, RepoNode, SearchRequest, FIELD_MODIFIED};
use crate::traits::{IngestionService, RepositoryClient};
use crate::watermark::Watermarks;

/// Totals from a backfill run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub folders_discovered: usize,
    pub folders_synced: usize,
    pub folders_skipped: usize,
    pub folders_failed: usize,
    pub documents_uploaded: u64,
    pub documents_failed: u64,
}

/// Per-folder document counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FolderStats {
    pub uploaded: u64,
    pub failed: u64,
}

pub struct BackfillScanner {
    repo: Arc<dyn RepositoryClient>,
    ai: Arc<dyn IngestionService>,
    watermarks: Watermarks,
    aspect: String,
    page_size: u32,
    parallelism: usize,
}

impl BackfillScanner {
    pub fn new(
        repo: Arc<dyn RepositoryClient>,
        ai: Arc<dyn IngestionService>,
        watermarks: Watermarks,
        config: &SyncConfig,
    ) -> Self {
        Self {
            repo,
            ai,
            watermarks,
            aspect: config.aspect.clone(),
            page_size: config.max_items.max(1),
            parallelism: config.backfill_parallelism.max(1),
        }
    }

    /// All folders carrying the sync aspect, with their stored watermarks.
    pub async fn discover_folders(&self) -> Result<Vec<SyncFolder>> {
        let mut folders = Vec::new();
        let mut skip = 0u32;
        loop {
            let request = SearchRequest::afts(search::sync_folders_query(&self.aspect))
                .page(self.page_size, skip)
                .with_properties();
            let page = self
                .repo
                .search(&request)
                .await
                .context("Failed to discover sync folders")?;

            skip += page.entries.len() as u32;
            folders.extend(page.entries.iter().map(|n| self.watermarks.read_folder(n)));

            if !page.has_more_items || page.entries.is_empty() {
                break;
            }
        }
        Ok(folders)
    }

    /// Fill in `doc_last_updated_date` from the newest document under the folder.
    pub async fn check_folder(&self, mut folder: SyncFolder) -> Result<SyncFolder> {
        let request = SearchRequest::afts(search::folder_documents_query(&folder.id))
            .sorted_by(FIELD_MODIFIED, false)
            .page(1, 0);
        let page = self.repo.search(&request).await?;
        folder.doc_last_updated_date = page.entries.first().and_then(RepoNode::modified);
        Ok(folder)
    }

    /// Run the full backfill.
    ///
    /// Only a failed discovery is an error; per-folder and per-document
    /// failures are logged and reported in the returned totals.
    pub async fn run(&self, progress: &dyn SyncProgressReporter) -> Result<BackfillReport> {
        progress.report(SyncProgressEvent::Discovering);
        let discovered = self.discover_folders().await?;

        let mut report = BackfillReport {
            folders_discovered: discovered.len(),
            ..Default::default()
        };

        let mut pending = Vec::new();
        for folder in discovered {
            match self.check_folder(folder.clone()).await {
                Ok(checked) if checked.needs_sync() => pending.push(checked),
                Ok(checked) => {
                    tracing::debug!(folder_id = %checked.id, "folder up to date");
                    report.folders_skipped += 1;
                }
                Err(e) => {
                    tracing::error!(folder_id = %folder.id, error = %e, "failed to check folder for changes");
                    report.folders_failed += 1;
                }
            }
        }

        let total = pending.len() as u64;
        for (i, folder) in pending.iter().enumerate() {
            progress.report(SyncProgressEvent::Folder {
                folder: folder.id.clone(),
                n: i as u64 + 1,
                total,
            });
            tracing::info!(folder_id = %folder.id, name = %folder.name, "starting initial synchronization for folder");

            match self.sync_folder(folder, progress).await {
                Ok(stats) => {
                    tracing::info!(
                        folder_id = %folder.id,
                        processed = stats.uploaded,
                        failed = stats.failed,
                        "initial synchronization for folder complete"
                    );
                    report.documents_uploaded += stats.uploaded;
                    report.documents_failed += stats.failed;
                    if let Err(e) = self.watermarks.touch(&folder.id, true).await {
                        tracing::error!(folder_id = %folder.id, error = %e, "failed to update folder watermarks");
                    }
                    report.folders_synced += 1;
                }
                Err(e) => {
                    tracing::error!(folder_id = %folder.id, error = %e, "initial synchronization for folder failed");
                    report.folders_failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Upload every document modified since the folder's watermark.
    ///
    /// Pages are keyed on `cm:modified` rather than offset: each request
    /// restarts the inclusive range at the last modification time seen, so a
    /// document edited mid-scan moves behind the cursor without shifting
    /// unseen documents out of reach. Hits already processed with the same
    /// modification time are dropped. The offset only grows while a run of
    /// identical timestamps fills whole pages.
    ///
    /// Errors only when a page cannot be fetched; the folder's watermarks are
    /// then left alone so the next backfill retries it.
    pub async fn sync_folder(
        &self,
        folder: &SyncFolder,
        progress: &dyn SyncProgressReporter,
    ) -> Result<FolderStats> {
        let mut stats = FolderStats::default();
        let mut since = folder.updated_date;
        let mut skip = 0u32;
        let mut total = None;
        let mut seen: HashSet<(String, Option<DateTime<Utc>>)> = HashSet::new();

        loop {
            tracing::debug!(folder_id = %folder.id, max_items = self.page_size, ?since, skip, "fetching batch of documents");
            let request = SearchRequest::afts(search::modified_documents_query(&folder.id, since))
                .sorted_by(FIELD_MODIFIED, true)
                .page(self.page_size, skip);
            let page = self
                .repo
                .search(&request)
                .await
                .with_context(|| format!("Failed to list documents of folder {}", folder.id))?;
            total = total.or(page.total_items);

            let fresh: Vec<RepoNode> = page
                .entries
                .iter()
                .filter(|node| seen.insert((node.id.clone(), node.modified())))
                .cloned()
                .collect();
            let batch = self.process_batch(&folder.id, &fresh).await;
            stats.uploaded += batch.uploaded;
            stats.failed += batch.failed;

            progress.report(SyncProgressEvent::Documents {
                folder: folder.id.clone(),
                n: stats.uploaded + stats.failed,
                total,
            });
            tracing::debug!(folder_id = %folder.id, fresh = fresh.len(), more = page.has_more_items, "batch processing complete");

            if !page.has_more_items || page.entries.is_empty() {
                break;
            }

            match page.entries.last().and_then(RepoNode::modified) {
                Some(last) if Some(last) != since => {
                    since = Some(last);
                    skip = 0;
                }
                _ => skip += page.entries.len() as u32,
            }
        }

        Ok(stats)
    }

    /// Process one page concurrently; waits for the whole page.
    async fn process_batch(&self, folder_id: &str, entries: &[RepoNode]) -> FolderStats {
        let results: Vec<bool> = stream::iter(entries)
            .map(|node| async move {
                match transfer_document(
                    self.repo.as_ref(),
                    self.ai.as_ref(),
                    &node.id,
                    Some(folder_id),
                    &node.name,
                )
                .await
                {
                    Ok(response) => {
                        tracing::debug!(node_id = %node.id, name = %node.name, response = %response, "processed document");
                        true
                    }
                    Err(e) => {
                        tracing::error!(node_id = %node.id, name = %node.name, error = %e, "failed to process document");
                        false
                    }
                }
            })
            .buffer_unordered(self.parallelism)
            .collect()
            .await;

        let uploaded = results.iter().filter(|ok| **ok).count() as u64;
        FolderStats {
            uploaded,
            failed: results.len() as u64 - uploaded,
        }
    }
}
