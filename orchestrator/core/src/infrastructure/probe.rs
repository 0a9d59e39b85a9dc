// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::node_config::{MonitoredComponent, ProbeKind};
use crate::domain::probe::{HealthProbe, ProbeOutcome};
use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

/// Healthy on any 2xx within the timeout.
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(client: reqwest::Client, url: String, timeout: Duration) -> Self {
        Self { client, url, timeout }
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn check(&self) -> ProbeOutcome {
        match self.client.get(&self.url).timeout(self.timeout).send().await {
            Ok(response) if response.status().is_success() => ProbeOutcome::healthy(),
            Ok(response) => ProbeOutcome::unhealthy(format!("HTTP {}", response.status())),
            Err(e) if e.is_timeout() => {
                ProbeOutcome::unhealthy(format!("timed out after {}s", self.timeout.as_secs()))
            }
            Err(e) => ProbeOutcome::unhealthy(e.to_string()),
        }
    }
}

/// Boolean predicate supplied by the caller.
pub struct PredicateProbe {
    predicate: Box<dyn Fn() -> BoxFuture<'static, bool> + Send + Sync>,
    timeout: Duration,
}

impl PredicateProbe {
    pub fn new<F>(predicate: F, timeout: Duration) -> Self
    where
        F: Fn() -> BoxFuture<'static, bool> + Send + Sync + 'static,
    {
        Self {
            predicate: Box::new(predicate),
            timeout,
        }
    }

    /// `SELECT 1` against the audit database; unhealthy when none is configured.
    pub fn database(pool: Option<PgPool>, timeout: Duration) -> Self {
        Self::new(
            move || {
                let pool = pool.clone();
                Box::pin(async move {
                    match pool {
                        Some(pool) => sqlx::query("SELECT 1").execute(&pool).await.is_ok(),
                        None => false,
                    }
                })
            },
            timeout,
        )
    }
}

#[async_trait]
impl HealthProbe for PredicateProbe {
    async fn check(&self) -> ProbeOutcome {
        match tokio::time::timeout(self.timeout, (self.predicate)()).await {
            Ok(true) => ProbeOutcome::healthy(),
            Ok(false) => ProbeOutcome::unhealthy("check failed"),
            Err(_) => ProbeOutcome::unhealthy(format!("timed out after {}s", self.timeout.as_secs())),
        }
    }
}

/// Build the probe for one configured component.
pub fn probe_for(
    component: &MonitoredComponent,
    client: &reqwest::Client,
    pool: Option<PgPool>,
    timeout: Duration,
) -> Arc<dyn HealthProbe> {
    match &component.probe {
        ProbeKind::Http { url } => Arc::new(HttpProbe::new(client.clone(), url.clone(), timeout)),
        ProbeKind::Database => Arc::new(PredicateProbe::database(pool, timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_probe_status_codes() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/health").with_status(200).create_async().await;
        server.mock("GET", "/broken").with_status(503).create_async().await;

        let client = reqwest::Client::new();
        let ok = HttpProbe::new(client.clone(), format!("{}/health", server.url()), Duration::from_secs(2));
        assert!(ok.check().await.healthy);

        let bad = HttpProbe::new(client, format!("{}/broken", server.url()), Duration::from_secs(2));
        let outcome = bad.check().await;
        assert!(!outcome.healthy);
        assert!(outcome.reason.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_predicate_probe_and_missing_database() {
        let up = PredicateProbe::new(|| Box::pin(async { true }), Duration::from_secs(1));
        assert!(up.check().await.healthy);

        let slow = PredicateProbe::new(
            || {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    true
                })
            },
            Duration::from_millis(50),
        );
        assert!(!slow.check().await.healthy);

        assert!(!PredicateProbe::database(None, Duration::from_secs(1)).check().await.healthy);
    }
}
