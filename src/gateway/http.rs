//! Gateway adapter for a remote menu store speaking JSON over HTTP.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::time::Duration;
use tracing::debug;

use crate::error::{MenuError, Result};
use crate::types::{MenuNode, NodeId, ReorderItem, Scope};

use super::PersistenceGateway;

#[derive(Debug, Clone)]
pub struct HttpGateway<P> {
    client: reqwest::Client,
    base_url: String,
    _payload: PhantomData<fn() -> P>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderRequest<'a> {
    items: &'a [ReorderItem],
}

impl<P> HttpGateway<P> {
    /// Creates a gateway rooted at `base_url`; every request is bounded by `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MenuError::GatewayError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            _payload: PhantomData,
        })
    }

    fn url(&self, scope: &Scope, path: &str) -> String {
        format!("{}/menus/{}/{}", self.base_url, scope, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(url = %url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MenuError::GatewayError(format!("Request to {} failed: {}", url, e)))?
            .error_for_status()
            .map_err(|e| MenuError::GatewayError(format!("Request to {} rejected: {}", url, e)))?;

        let body = response
            .text()
            .await
            .map_err(|e| MenuError::GatewayError(format!("Failed to read response body: {}", e)))?;

        serde_json::from_str(&body)
            .map_err(|e| MenuError::GatewayError(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl<P> PersistenceGateway<P> for HttpGateway<P>
where
    P: DeserializeOwned + Send + Sync + 'static,
{
    async fn fetch_tree(&self, scope: &Scope) -> Result<Vec<MenuNode<P>>> {
        self.get_json(&self.url(scope, "tree")).await
    }

    async fn fetch_children(&self, scope: &Scope, parent_id: NodeId) -> Result<Vec<MenuNode<P>>> {
        self.get_json(&self.url(scope, &format!("children/{}", parent_id.0)))
            .await
    }

    async fn commit_reorder(&self, scope: &Scope, items: &[ReorderItem]) -> Result<()> {
        let url = self.url(scope, "order");
        let body = serde_json::to_string(&OrderRequest { items })
            .map_err(|e| MenuError::GatewayError(format!("Failed to encode order: {}", e)))?;
        debug!(url = %url, items = items.len(), "PUT");

        self.client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| MenuError::GatewayError(format!("Request to {} failed: {}", url, e)))?
            .error_for_status()
            .map_err(|e| MenuError::GatewayError(format!("Request to {} rejected: {}", url, e)))?;
        Ok(())
    }

    async fn fetch_next_position(&self, scope: &Scope, parent_id: Option<NodeId>) -> Result<u32> {
        let path = match parent_id {
            Some(parent) => format!("next-position?parentId={}", parent.0),
            None => "next-position".to_string(),
        };
        self.get_json(&self.url(scope, &path)).await
    }
}
