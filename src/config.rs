//! TOML configuration parsing and validation.
//!
//! Credentials may be left out of the file and supplied through the
//! `ALFRESCO_USERNAME` / `ALFRESCO_PASSWORD` environment variables, which
//! take precedence over file values.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub alfresco: AlfrescoConfig,
    pub ai: AiConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlfrescoConfig {
    /// Base URL of the repository, e.g. `http://localhost:8080`.
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_alfresco_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_alfresco_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct AiConfig {
    /// Base URL of the ingestion service, e.g. `http://localhost:9999`.
    pub url: String,
    #[serde(default = "default_ai_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_ai_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Aspect that opts a folder into synchronization.
    pub aspect: String,
    /// Folder property holding the last backfill time.
    pub published_property: String,
    /// Folder property holding the last event-driven update time.
    pub updated_property: String,
    /// Page size for backfill searches.
    #[serde(default = "default_max_items")]
    pub max_items: u32,
    /// Worker pool size used when draining buffered events.
    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,
    /// Documents processed concurrently within one backfill page.
    #[serde(default = "default_backfill_parallelism")]
    pub backfill_parallelism: usize,
    /// Grace period for the drain pool before remaining tasks are aborted.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_max_items() -> u32 {
    100
}
fn default_parallel_threads() -> usize {
    8
}
fn default_backfill_parallelism() -> usize {
    4
}
fn default_shutdown_grace_secs() -> u64 {
    300
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            aspect: "acme:aiSync".to_string(),
            published_property: "acme:publishedDate".to_string(),
            updated_property: "acme:updatedDate".to_string(),
            max_items: default_max_items(),
            parallel_threads: default_parallel_threads(),
            backfill_parallelism: default_backfill_parallelism(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl SyncConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if let Ok(username) = std::env::var("ALFRESCO_USERNAME") {
        config.alfresco.username = Some(username);
    }
    if let Ok(password) = std::env::var("ALFRESCO_PASSWORD") {
        config.alfresco.password = Some(password);
    }

    validate(&config)?;
    Ok(config)
}

/// Check value ranges that serde cannot express.
pub fn validate(config: &Config) -> Result<()> {
    if !config.alfresco.url.starts_with("http://") && !config.alfresco.url.starts_with("https://")
    {
        anyhow::bail!("alfresco.url must be an http(s) URL");
    }
    if !config.ai.url.starts_with("http://") && !config.ai.url.starts_with("https://") {
        anyhow::bail!("ai.url must be an http(s) URL");
    }

    // Validate sync
    if config.sync.aspect.trim().is_empty() {
        anyhow::bail!("sync.aspect must not be empty");
    }
    if config.sync.published_property.trim().is_empty()
        || config.sync.updated_property.trim().is_empty()
    {
        anyhow::bail!("sync.published_property and sync.updated_property must not be empty");
    }
    if config.sync.published_property == config.sync.updated_property {
        anyhow::bail!("sync.published_property and sync.updated_property must differ");
    }
    if config.sync.max_items == 0 {
        anyhow::bail!("sync.max_items must be > 0");
    }
    if config.sync.parallel_threads == 0 {
        anyhow::bail!("sync.parallel_threads must be > 0");
    }
    if config.sync.backfill_parallelism == 0 {
        anyhow::bail!("sync.backfill_parallelism must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    const MINIMAL: &str = r#"
[alfresco]
url = "http://localhost:8080"

[ai]
url = "http://localhost:9999"

[sync]
aspect = "acme:aiSync"
published_property = "acme:publishedDate"
updated_property = "acme:updatedDate"
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let file = write_config(MINIMAL);
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.sync.max_items, 100);
        assert_eq!(config.sync.parallel_threads, 8);
        assert_eq!(config.sync.backfill_parallelism, 4);
        assert_eq!(config.sync.shutdown_grace(), Duration::from_secs(300));
        assert_eq!(config.ai.timeout_secs, 300);
        assert_eq!(config.alfresco.timeout_secs, 60);
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let body = MINIMAL.replace(
            "updated_property = \"acme:updatedDate\"",
            "updated_property = \"acme:updatedDate\"\nmax_items = 0",
        );
        let file = write_config(&body);
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("max_items"));
    }

    #[test]
    fn identical_watermark_properties_are_rejected() {
        let body = MINIMAL.replace("acme:publishedDate", "acme:updatedDate");
        let file = write_config(&body);
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn example_config_is_valid() {
        let config: Config =
            toml::from_str(include_str!("../config/alfsync.example.toml")).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.sync.aspect, "acme:aiSync");
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config(Path::new("/nonexistent/alfsync.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/alfsync.toml"));
    }
}
