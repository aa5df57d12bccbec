//! Engine wiring and the CLI command implementations.
//!
//! [`SyncEngine`] owns one instance of every component and sequences them:
//!
//! 1. discover the tracked folders and seed the registry (fatal on failure);
//! 2. start consuming events, which the coordinator buffers;
//! 3. run the backfill scan;
//! 4. go live, draining the buffer;
//! 5. keep consuming events until the feed ends.
//!
//! Collaborators are trait objects, so the same engine runs against the HTTP
//! clients in production and the in-memory doubles in tests.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::ai_client::AiClient;
use crate::alfresco::AlfrescoClient;
use crate::backfill::{BackfillReport, BackfillScanner};
use crate::config::{Config, SyncConfig};
use crate::content_handler::ContentSyncHandler;
use crate::coordinator::{DrainReport, SyncCoordinator};
use crate::feed::{self, EventSource, FeedStats};
use crate::folder_handler::FolderMembershipHandler;
use crate::models::SyncFolder;
use crate::progress::{ProgressMode, SyncProgressReporter};
use crate::registry::FolderRegistry;
use crate::traits::{IngestionService, RepositoryClient};
use crate::watermark::Watermarks;

pub struct SyncEngine {
    registry: FolderRegistry,
    scanner: BackfillScanner,
    coordinator: Arc<SyncCoordinator>,
}

impl SyncEngine {
    pub fn new(
        repo: Arc<dyn RepositoryClient>,
        ai: Arc<dyn IngestionService>,
        config: &SyncConfig,
    ) -> Self {
        let registry = FolderRegistry::new();
        let watermarks = Watermarks::new(repo.clone(), config);
        let content = ContentSyncHandler::new(
            registry.clone(),
            repo.clone(),
            ai.clone(),
            watermarks.clone(),
        );
        let folders = FolderMembershipHandler::new(registry.clone(), ai.clone(), &config.aspect);
        let coordinator = Arc::new(SyncCoordinator::new(content, folders, &registry, config));
        let scanner = BackfillScanner::new(repo, ai, watermarks, config);

        Self {
            registry,
            scanner,
            coordinator,
        }
    }

    /// Engine backed by the HTTP clients described in `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let repo = Arc::new(AlfrescoClient::new(&config.alfresco)?);
        let ai = Arc::new(AiClient::new(&config.ai)?);
        Ok(Self::new(repo, ai, &config.sync))
    }

    pub fn registry(&self) -> &FolderRegistry {
        &self.registry
    }

    pub fn coordinator(&self) -> Arc<SyncCoordinator> {
        self.coordinator.clone()
    }

    /// Seed the registry with every folder carrying the sync aspect.
    pub async fn initialize(&self) -> Result<Vec<SyncFolder>> {
        let folders = self
            .scanner
            .discover_folders()
            .await
            .context("Failed to initialize sync folders")?;
        self.registry.seed(folders.iter().map(|f| f.id.as_str()));
        tracing::info!(count = folders.len(), "sync folders initialized");
        Ok(folders)
    }

    /// Backfill, then go live.
    pub async fn start(
        &self,
        progress: &dyn SyncProgressReporter,
    ) -> Result<(BackfillReport, DrainReport)> {
        tracing::info!("starting initial synchronization");
        let backfill = self.scanner.run(progress).await?;
        tracing::info!(
            folders = backfill.folders_synced,
            uploaded = backfill.documents_uploaded,
            failed = backfill.documents_failed,
            "initial synchronization complete"
        );
        let drain = self.coordinator.go_live().await;
        Ok((backfill, drain))
    }

    /// Per-folder status for `alfsync folders`.
    pub async fn folder_status(&self) -> Result<Vec<SyncFolder>> {
        let mut checked = Vec::new();
        for folder in self.scanner.discover_folders().await? {
            checked.push(self.scanner.check_folder(folder).await?);
        }
        Ok(checked)
    }
}

// ============ CLI commands ============

/// `alfsync run`: full lifecycle until the event feed ends.
pub async fn run_sync(config: &Config, source: EventSource, progress: ProgressMode) -> Result<()> {
    let engine = SyncEngine::from_config(config)?;
    let folders = engine.initialize().await?;
    println!("Tracking {} folder(s).", folders.len());

    let reader = source.open().await?;
    let coordinator = engine.coordinator();
    let consumer = tokio::spawn(async move { feed::consume(reader, &coordinator).await });

    let reporter = progress.reporter();
    let (backfill, drain) = engine.start(reporter.as_ref()).await?;
    print_backfill_report(&backfill);
    println!(
        "Queued events: {} processed, {} failed, {} aborted.",
        drain.succeeded, drain.failed, drain.aborted
    );

    let stats: FeedStats = consumer.await.context("Event feed task failed")??;
    println!(
        "Event feed ended: {} event(s), {} undecodable line(s).",
        stats.accepted, stats.undecodable
    );
    Ok(())
}

/// `alfsync backfill`: one backfill pass, no event feed.
pub async fn run_backfill(config: &Config, progress: ProgressMode) -> Result<()> {
    let engine = SyncEngine::from_config(config)?;
    let reporter = progress.reporter();
    let report = engine.scanner.run(reporter.as_ref()).await?;
    print_backfill_report(&report);
    Ok(())
}

/// `alfsync folders`: list tracked folders and their watermarks.
pub async fn list_folders(config: &Config) -> Result<()> {
    let engine = SyncEngine::from_config(config)?;
    let folders = engine.folder_status().await?;

    if folders.is_empty() {
        println!("No folders carry the {} aspect.", config.sync.aspect);
        return Ok(());
    }

    println!(
        "{:<38} {:<24} {:<26} {:<26} {}",
        "ID", "NAME", "UPDATED", "PUBLISHED", "STATUS"
    );
    for f in &folders {
        let status = if f.needs_sync() {
            "needs sync"
        } else if f.doc_last_updated_date.is_none() {
            "empty"
        } else {
            "up to date"
        };
        println!(
            "{:<38} {:<24} {:<26} {:<26} {}",
            f.id,
            f.name,
            format_date(f.updated_date),
            format_date(f.published_date),
            status
        );
    }
    Ok(())
}

fn format_date(ts: Option<chrono::DateTime<chrono::Utc>>) -> String {
    ts.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn print_backfill_report(report: &BackfillReport) {
    println!(
        "Backfill: {} folder(s) discovered, {} synced, {} up to date, {} failed.",
        report.folders_discovered,
        report.folders_synced,
        report.folders_skipped,
        report.folders_failed
    );
    println!(
        "  documents uploaded: {}, failed: {}",
        report.documents_uploaded, report.documents_failed
    );
}
