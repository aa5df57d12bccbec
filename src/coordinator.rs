//! Backfill-to-live transition and the pending-event buffer.
//!
//! The coordinator starts in [`Backfilling`](State::Backfilling): content
//! events inside tracked folders are buffered, nothing is dispatched. Folder
//! lifecycle events bypass the buffer and reach the
//! [`FolderMembershipHandler`] immediately, so the registry stays current
//! while backfill runs.
//!
//! [`SyncCoordinator::go_live`] flips the state exactly once and drains the
//! buffer through a bounded worker pool. From then on events are dispatched
//! inline on the caller's task.
//!
//! Events for the same node may complete out of order once drained by a pool
//! larger than one.
//!
//! A folder deletion purges the folder from the index at once, even while
//! backfill is still uploading that folder's documents. Uploads finishing
//! after the purge leave orphaned index entries until the documents are
//! deleted individually.

use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::SyncConfig;
use crate::content_handler::{ContentSyncHandler, Dispatch};
use crate::filter::EventFilter;
use crate::folder_handler::FolderMembershipHandler;
use crate::models::ChangeEvent;
use crate::registry::FolderRegistry;

enum State {
    Backfilling(VecDeque<ChangeEvent>),
    Live,
}

/// What [`SyncCoordinator::accept`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepted {
    /// Routed to the folder membership handler.
    Folder,
    /// Buffered until the coordinator goes live.
    Queued,
    /// Dispatched inline.
    Dispatched(Dispatch),
    /// Dispatch failed; the error was logged.
    Failed,
    /// Outside every tracked folder.
    Ignored,
}

/// Outcome of draining the buffer on the transition to live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub queued: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub aborted: usize,
}

pub struct SyncCoordinator {
    state: Mutex<State>,
    content: ContentSyncHandler,
    folders: FolderMembershipHandler,
    membership: EventFilter,
    parallel_threads: usize,
    grace: Duration,
}

impl SyncCoordinator {
    pub fn new(
        content: ContentSyncHandler,
        folders: FolderMembershipHandler,
        registry: &FolderRegistry,
        config: &SyncConfig,
    ) -> Self {
        Self {
            state: Mutex::new(State::Backfilling(VecDeque::new())),
            content,
            folders,
            membership: EventFilter::in_tracked_folder(registry),
            parallel_threads: config.parallel_threads.max(1),
            grace: config.shutdown_grace(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_live(&self) -> bool {
        matches!(*self.lock(), State::Live)
    }

    /// Number of events waiting for the transition.
    pub fn pending(&self) -> usize {
        match &*self.lock() {
            State::Backfilling(queue) => queue.len(),
            State::Live => 0,
        }
    }

    /// Route one incoming event. Never fails; dispatch errors are logged.
    pub async fn accept(&self, event: ChangeEvent) -> Accepted {
        if self.folders.accepts(&event) {
            if let Err(e) = self.folders.handle(&event).await {
                tracing::error!(event_id = %event.id, error = %e, "failed to handle folder event");
            }
            return Accepted::Folder;
        }

        if !self.membership.test(&event) {
            return Accepted::Ignored;
        }

        {
            let mut state = self.lock();
            if let State::Backfilling(queue) = &mut *state {
                tracing::debug!(
                    event_id = %event.id,
                    kind = %event.kind,
                    "initial sync in progress, queueing event"
                );
                queue.push_back(event);
                return Accepted::Queued;
            }
        }

        match self.content.handle(&event).await {
            Ok(outcome) => Accepted::Dispatched(outcome),
            Err(e) => {
                tracing::error!(
                    event_id = %event.id,
                    node_id = event.node_id().unwrap_or("-"),
                    error = %e,
                    "failed to handle event"
                );
                Accepted::Failed
            }
        }
    }

    /// Switch to live mode and drain the buffered events.
    ///
    /// Only the first call does anything; later calls return an empty report.
    pub async fn go_live(&self) -> DrainReport {
        let queued = {
            let mut state = self.lock();
            match std::mem::replace(&mut *state, State::Live) {
                State::Backfilling(queue) => queue,
                State::Live => return DrainReport::default(),
            }
        };

        tracing::info!(queued = queued.len(), "initial sync complete, processing queued events");
        let report = self.drain(queued).await;
        tracing::info!(
            queued = report.queued,
            succeeded = report.succeeded,
            failed = report.failed,
            aborted = report.aborted,
            "queued events processed"
        );
        report
    }

    async fn drain(&self, queued: VecDeque<ChangeEvent>) -> DrainReport {
        let mut report = DrainReport {
            queued: queued.len(),
            ..Default::default()
        };
        if queued.is_empty() {
            return report;
        }

        let permits = Arc::new(Semaphore::new(self.parallel_threads));
        let mut tasks: JoinSet<Result<Dispatch>> = JoinSet::new();
        for event in queued {
            let handler = self.content.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .context("drain pool closed")?;
                handler
                    .handle(&event)
                    .await
                    .with_context(|| format!("event {}", event.id))
            });
        }

        let deadline = tokio::time::Instant::now() + self.grace;
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(Ok(_)))) => report.succeeded += 1,
                Ok(Some(Ok(Err(e)))) => {
                    tracing::error!(error = %e, "failed to process queued event");
                    report.failed += 1;
                }
                Ok(Some(Err(e))) => {
                    tracing::error!(error = %e, "queued event task panicked");
                    report.failed += 1;
                }
                Ok(None) => break,
                Err(_) => {
                    report.aborted = tasks.len();
                    tracing::warn!(
                        aborted = report.aborted,
                        grace_secs = self.grace.as_secs(),
                        "shutdown window elapsed, aborting remaining queued events"
                    );
                    tasks.shutdown().await;
                    break;
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{IngestionCall, InMemoryIngestion, InMemoryRepository};
    use crate::models::{ContentInfo, EventKind, NodeKind, NodeState};
    use crate::watermark::Watermarks;
    use chrono::Utc;

    const ASPECT: &str = "acme:aiSync";

    struct Fixture {
        registry: FolderRegistry,
        ai: Arc<InMemoryIngestion>,
        coordinator: SyncCoordinator,
    }

    fn fixture(config: SyncConfig) -> Fixture {
        let repo = Arc::new(InMemoryRepository::new());
        repo.add_folder("f1", "Tracked", &[ASPECT]);
        for id in ["d1", "d2", "d3", "d4"] {
            repo.add_document(id, &format!("{}.txt", id), &["root", "f1"], Utc::now(), b"x");
        }
        let ai = Arc::new(InMemoryIngestion::new());
        let registry = FolderRegistry::with_folders(["f1"]);
        let watermarks = Watermarks::new(repo.clone(), &config);
        let content = ContentSyncHandler::new(registry.clone(), repo, ai.clone(), watermarks);
        let folders = FolderMembershipHandler::new(registry.clone(), ai.clone(), ASPECT);
        let coordinator = SyncCoordinator::new(content, folders, &registry, &config);
        Fixture {
            registry,
            ai,
            coordinator,
        }
    }

    fn created(id: &str, parent: &str) -> ChangeEvent {
        ChangeEvent {
            id: format!("e-{}", id),
            kind: EventKind::Created,
            resource: Some(NodeState {
                id: id.to_string(),
                name: format!("{}.txt", id),
                kind: NodeKind::Content,
                primary_hierarchy: vec!["root".to_string(), parent.to_string()],
                aspect_names: Default::default(),
                content: Some(ContentInfo::default()),
            }),
            resource_before: None,
        }
    }

    fn folder_created(id: &str) -> ChangeEvent {
        ChangeEvent {
            id: format!("e-{}", id),
            kind: EventKind::Created,
            resource: Some(NodeState {
                id: id.to_string(),
                name: id.to_string(),
                kind: NodeKind::Folder,
                primary_hierarchy: vec!["root".to_string()],
                aspect_names: [ASPECT.to_string()].into_iter().collect(),
                content: None,
            }),
            resource_before: None,
        }
    }

    #[tokio::test]
    async fn nothing_dispatched_while_backfilling() {
        let f = fixture(SyncConfig::default());
        assert_eq!(f.coordinator.accept(created("d1", "f1")).await, Accepted::Queued);
        assert_eq!(f.coordinator.accept(created("d2", "f1")).await, Accepted::Queued);
        assert_eq!(f.coordinator.accept(created("x", "other")).await, Accepted::Ignored);
        assert!(!f.coordinator.is_live());
        assert_eq!(f.coordinator.pending(), 2);
        assert!(f.ai.calls().is_empty());
    }

    #[tokio::test]
    async fn queued_events_dispatch_exactly_once() {
        let f = fixture(SyncConfig::default());
        for id in ["d1", "d2", "d3"] {
            f.coordinator.accept(created(id, "f1")).await;
        }

        let report = f.coordinator.go_live().await;
        assert_eq!(
            report,
            DrainReport {
                queued: 3,
                succeeded: 3,
                failed: 0,
                aborted: 0
            }
        );
        assert_eq!(f.ai.upload_count(), 3);
        assert!(f.coordinator.is_live());

        // the transition happens once
        assert_eq!(f.coordinator.go_live().await, DrainReport::default());
        assert_eq!(f.ai.upload_count(), 3);
    }

    #[tokio::test]
    async fn live_events_dispatch_inline() {
        let f = fixture(SyncConfig::default());
        f.coordinator.go_live().await;
        assert_eq!(
            f.coordinator.accept(created("d4", "f1")).await,
            Accepted::Dispatched(Dispatch::Uploaded)
        );
        assert_eq!(f.ai.upload_count(), 1);
    }

    #[tokio::test]
    async fn failures_are_isolated_during_drain() {
        let f = fixture(SyncConfig::default());
        f.ai.fail_for("d2");
        for id in ["d1", "d2", "d3"] {
            f.coordinator.accept(created(id, "f1")).await;
        }
        let report = f.coordinator.go_live().await;
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn folder_events_bypass_the_buffer() {
        let f = fixture(SyncConfig::default());
        assert_eq!(f.coordinator.accept(folder_created("f2")).await, Accepted::Folder);
        assert!(f.registry.contains("f2"));
        assert_eq!(f.coordinator.pending(), 0);

        // membership is evaluated at accept time, so the new folder counts at once
        assert_eq!(f.coordinator.accept(created("n1", "f2")).await, Accepted::Queued);
    }

    #[tokio::test]
    async fn slow_tasks_are_aborted_after_grace_window() {
        let config = SyncConfig {
            parallel_threads: 1,
            shutdown_grace_secs: 0,
            ..SyncConfig::default()
        };
        let f = fixture(config);
        f.ai.set_delay(Duration::from_secs(5));
        for id in ["d1", "d2"] {
            f.coordinator.accept(created(id, "f1")).await;
        }

        let report = f.coordinator.go_live().await;
        assert_eq!(report.queued, 2);
        assert_eq!(report.aborted, 2);
        assert_eq!(report.succeeded, 0);
        assert!(!f
            .ai
            .calls()
            .iter()
            .any(|c| matches!(c, IngestionCall::Upload { .. })));
    }
}
