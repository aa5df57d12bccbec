//! # Alfresco AI Sync
//!
//! Keeps an AI document index in step with folders of an Alfresco content
//! repository.
//!
//! Folders opt in by carrying a configurable aspect. On startup the engine
//! backfills every tracked folder whose documents changed since its stored
//! watermark, buffering repository events meanwhile; it then drains the
//! buffer and dispatches new events as they arrive.
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────┐
//!  events ──────▶│ Coordinator  │── folder events ──▶ FolderMembershipHandler
//!  (NDJSON)      │ backfilling/ │                          │
//!                │    live      │── content events ─▶ ContentSyncHandler
//!                └──────┬───────┘                          │
//!                       │ go_live                          ▼
//!  ┌──────────────┐     │                           ┌──────────────┐
//!  │   Backfill   │─────┘                           │ AI ingestion │
//!  │   scanner    │────────── uploads ─────────────▶│   service    │
//!  └──────┬───────┘                                 └──────────────┘
//!         │ search / content / watermarks
//!         ▼
//!  ┌──────────────┐
//!  │   Alfresco   │
//!  └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! alfsync folders                              # list tracked folders
//! alfsync backfill                             # one backfill pass
//! alfsync run --events - < events.ndjson       # backfill, then live
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`event`] | Repository event decoding |
//! | [`feed`] | NDJSON event feed |
//! | [`registry`] | Tracked folder set |
//! | [`filter`] | Composable event predicates |
//! | [`coordinator`] | Backfill/live state and the pending buffer |
//! | [`content_handler`] | Content event dispatch |
//! | [`folder_handler`] | Folder lifecycle handling |
//! | [`backfill`] | Watermark-driven startup scan |
//! | [`watermark`] | Folder watermark properties |
//! | [`search`] | Search requests and AFTS queries |
//! | [`traits`] | Repository and ingestion service seams |
//! | [`alfresco`] | Alfresco REST client |
//! | [`ai_client`] | AI ingestion HTTP client |
//! | [`memory`] | In-memory collaborators |
//! | [`engine`] | Component wiring and CLI commands |
//! | [`progress`] | Backfill progress reporting |

pub mod ai_client;
pub mod alfresco;
pub mod backfill;
pub mod config;
pub mod content_handler;
pub mod coordinator;
pub mod engine;
pub mod event;
pub mod feed;
pub mod filter;
pub mod folder_handler;
pub mod memory;
pub mod models;
pub mod progress;
pub mod registry;
pub mod search;
pub mod traits;
pub mod watermark;
