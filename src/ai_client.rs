//! HTTP client for the AI ingestion service.
//!
//! Implements [`IngestionService`] against the ingestion REST API:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | upload | `POST /documents` (multipart: `documentId`, `folderId`, `fileName`, `file`) |
//! | delete | `DELETE /documents?documentId=<id>` |
//! | delete by folder | `DELETE /folders?folderId=<id>` |
//!
//! Failures are returned to the caller as errors; there is no retry here.
//! The sync engine logs them per document or per event and moves on.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::Duration;

use crate::config::AiConfig;
use crate::traits::{IngestionService, UploadRequest};

const DOCUMENTS_ENDPOINT: &str = "/documents";
const FOLDERS_ENDPOINT: &str = "/folders";

pub struct AiClient {
    base_url: String,
    client: reqwest::Client,
}

impl AiClient {
    pub fn new(config: &AiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build AI service HTTP client")?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn send_delete(&self, endpoint: &str, param: &str, value: &str) -> Result<String> {
        let url = format!("{}{}", self.base_url, endpoint);
        let resp = self
            .client
            .delete(&url)
            .query(&[(param, value)])
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("AI service delete {}={} failed: {}", param, value, e))?;
        read_ack(resp).await
    }
}

#[async_trait]
impl IngestionService for AiClient {
    async fn upload(&self, request: UploadRequest) -> Result<String> {
        let file = Part::bytes(request.content)
            .file_name(request.file_name.clone())
            .mime_str("application/octet-stream")?;

        // The endpoint requires folderId, even when it is empty.
        let form = Form::new()
            .text("documentId", request.document_id.clone())
            .text("folderId", request.folder_id.unwrap_or_default())
            .text("fileName", request.file_name)
            .part("file", file);

        let url = format!("{}{}", self.base_url, DOCUMENTS_ENDPOINT);
        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!("AI service upload of {} failed: {}", request.document_id, e)
            })?;
        read_ack(resp).await
    }

    async fn delete(&self, document_id: &str) -> Result<String> {
        self.send_delete(DOCUMENTS_ENDPOINT, "documentId", document_id)
            .await
    }

    async fn delete_by_folder(&self, folder_id: &str) -> Result<String> {
        self.send_delete(FOLDERS_ENDPOINT, "folderId", folder_id)
            .await
    }
}

async fn read_ack(resp: reqwest::Response) -> Result<String> {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        bail!(
            "AI service error {}: {}",
            status,
            body.chars().take(500).collect::<String>()
        );
    }
    Ok(body)
}
