//! Newline-delimited JSON event feed.
//!
//! Reads one repository event per line from stdin or a file and hands each to
//! the [`SyncCoordinator`]. Blank lines are ignored; lines that fail to decode
//! are logged and skipped.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::coordinator::SyncCoordinator;
use crate::event::decode_event;

/// Where events are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSource {
    Stdin,
    File(PathBuf),
}

impl EventSource {
    /// `-` means stdin, anything else is a path.
    pub fn parse(arg: &str) -> Self {
        if arg == "-" {
            EventSource::Stdin
        } else {
            EventSource::File(PathBuf::from(arg))
        }
    }

    pub async fn open(&self) -> Result<Box<dyn AsyncBufRead + Send + Unpin>> {
        match self {
            EventSource::Stdin => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
            EventSource::File(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("Failed to open event feed: {}", path.display()))?;
                Ok(Box::new(BufReader::new(file)))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub accepted: u64,
    pub undecodable: u64,
}

/// Consume the feed until end of input.
///
/// Only I/O errors on the reader end the feed early.
pub async fn consume<R>(reader: R, coordinator: &SyncCoordinator) -> Result<FeedStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = FeedStats::default();
    let mut lines = reader.lines();
    let mut line_no = 0u64;

    while let Some(line) = lines.next_line().await.context("Failed to read event feed")? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match decode_event(line) {
            Ok(event) => {
                coordinator.accept(event).await;
                stats.accepted += 1;
            }
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "skipping undecodable event");
                stats.undecodable += 1;
            }
        }
    }

    tracing::info!(
        accepted = stats.accepted,
        undecodable = stats.undecodable,
        "event feed ended"
    );
    Ok(stats)
}
