//! Alfresco REST client.
//!
//! Implements [`RepositoryClient`] on top of the Alfresco public REST API v1
//! using `reqwest`:
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | search | `POST /alfresco/api/-default-/public/search/versions/1/search` |
//! | content | `GET /alfresco/api/-default-/public/alfresco/versions/1/nodes/{id}/content?attachment=true` |
//! | properties | `PUT /alfresco/api/-default-/public/alfresco/versions/1/nodes/{id}` |
//!
//! # Authentication
//!
//! HTTP basic auth, from `[alfresco].username` / `password` or the
//! `ALFRESCO_USERNAME` / `ALFRESCO_PASSWORD` environment variables.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;

use crate::config::AlfrescoConfig;
use crate::search::{SearchPage, SearchRequest, SearchResponse};
use crate::traits::RepositoryClient;

const SEARCH_PATH: &str = "/alfresco/api/-default-/public/search/versions/1/search";
const NODES_PATH: &str = "/alfresco/api/-default-/public/alfresco/versions/1/nodes";

pub struct AlfrescoClient {
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    client: reqwest::Client,
}

impl AlfrescoClient {
    pub fn new(config: &AlfrescoConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build Alfresco HTTP client")?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            client,
        })
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.username {
            Some(user) => req.basic_auth(user, self.password.as_deref()),
            None => req,
        }
    }

    fn node_url(&self, node_id: &str) -> String {
        format!("{}{}/{}", self.base_url, NODES_PATH, node_id)
    }
}

#[async_trait]
impl RepositoryClient for AlfrescoClient {
    async fn search(&self, request: &SearchRequest) -> Result<SearchPage> {
        let url = format!("{}{}", self.base_url, SEARCH_PATH);
        let resp = self
            .authorize(self.client.post(&url))
            .json(request)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Alfresco search request failed: {}", e))?;

        let resp = check_status(resp, "search").await?;
        let body: SearchResponse = resp
            .json()
            .await
            .context("Invalid Alfresco search response")?;
        Ok(body.into())
    }

    async fn get_node_content(&self, node_id: &str) -> Result<Vec<u8>> {
        let url = format!("{}/content", self.node_url(node_id));
        let resp = self
            .authorize(self.client.get(&url))
            .query(&[("attachment", "true")])
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to download content of {}: {}", node_id, e))?;

        let resp = check_status(resp, "get node content").await?;
        Ok(resp.bytes().await?.to_vec())
    }

    async fn update_node_properties(
        &self,
        node_id: &str,
        properties: Map<String, Value>,
    ) -> Result<()> {
        let body = serde_json::json!({ "properties": properties });
        let resp = self
            .authorize(self.client.put(self.node_url(node_id)))
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to update node {}: {}", node_id, e))?;

        check_status(resp, "update node").await?;
        Ok(())
    }
}

async fn check_status(resp: reqwest::Response, operation: &str) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    bail!(
        "Alfresco {} failed (HTTP {}): {}",
        operation,
        status,
        body.chars().take(500).collect::<String>()
    );
}
