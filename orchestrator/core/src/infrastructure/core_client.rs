// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::core::{CoreClient, CoreClientError, CoreId, PromotionRequest};
use crate::domain::node_config::CoreEndpoint;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Calls a Core Manager's HTTP surface by core id.
pub struct HttpCoreClient {
    client: reqwest::Client,
    urls: HashMap<CoreId, String>,
    timeout: Duration,
}

impl HttpCoreClient {
    pub fn new(client: reqwest::Client, cores: &[CoreEndpoint], timeout: Duration) -> Self {
        Self {
            client,
            urls: cores
                .iter()
                .map(|c| (CoreId::new(c.id.clone()), c.url.trim_end_matches('/').to_string()))
                .collect(),
            timeout,
        }
    }

    async fn post<T: serde::Serialize + ?Sized>(
        &self,
        core_id: &CoreId,
        path: &str,
        body: &T,
    ) -> Result<(), CoreClientError> {
        let base = self
            .urls
            .get(core_id)
            .ok_or_else(|| CoreClientError::UnknownCore(core_id.clone()))?;

        let response = self
            .client
            .post(format!("{}{}", base, path))
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| CoreClientError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreClientError::Rejected {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CoreClient for HttpCoreClient {
    async fn reconcile(&self, core_id: &CoreId) -> Result<(), CoreClientError> {
        self.post(core_id, "/reconcile", &serde_json::json!({})).await
    }

    async fn promote(&self, core_id: &CoreId, request: &PromotionRequest) -> Result<(), CoreClientError> {
        self.post(core_id, "/feature/deploy", request).await
    }
}
