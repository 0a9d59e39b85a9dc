// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// GitLab Source Control Adapter
//
// Bearer-token authenticated REST client for the v4 API. Every request is
// bounded: `request_timeout` for commands, `probe_timeout` for the
// reachability check used by integrity verification.

use crate::domain::command::{FileChange, FileWriteMode, NewProject};
use crate::domain::source_control::{SourceControl, SourceControlError};
use async_trait::async_trait;
use reqwest::{Method, Url};
use std::time::Duration;

pub struct GitLabClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    request_timeout: Duration,
    probe_timeout: Duration,
}

impl GitLabClient {
    pub fn new(
        base_url: String,
        token: Option<String>,
        request_timeout: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            token,
            request_timeout,
            probe_timeout,
        }
    }

    /// `/api/v4/<segments...>`, each segment percent-encoded (file paths
    /// must have their slashes encoded).
    fn api_url(&self, segments: &[&str]) -> Result<Url, SourceControlError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SourceControlError::Network(format!("invalid base url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| SourceControlError::Network("base url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["api", "v4"])
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<serde_json::Value, SourceControlError> {
        let mut request = self.client.request(method, url).timeout(timeout);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SourceControlError::Timeout
            } else {
                SourceControlError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(SourceControlError::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)))
    }
}

#[async_trait]
impl SourceControl for GitLabClient {
    async fn create_project(&self, project: &NewProject) -> Result<serde_json::Value, SourceControlError> {
        let url = self.api_url(&["projects"])?;
        let body = serde_json::to_value(project).map_err(|e| SourceControlError::Network(e.to_string()))?;
        self.send(Method::POST, url, Some(body), self.request_timeout).await
    }

    async fn write_file(
        &self,
        mode: FileWriteMode,
        change: &FileChange,
    ) -> Result<serde_json::Value, SourceControlError> {
        let url = self.api_url(&[
            "projects",
            &change.project_id,
            "repository",
            "files",
            &change.file_path,
        ])?;
        let method = match mode {
            FileWriteMode::Create => Method::POST,
            FileWriteMode::Update => Method::PUT,
        };
        let body = serde_json::json!({
            "branch": change.branch,
            "content": change.content,
            "commit_message": change.commit_message,
        });
        self.send(method, url, Some(body), self.request_timeout).await
    }

    async fn pipeline_status(
        &self,
        project_id: &str,
        pipeline_id: &str,
    ) -> Result<serde_json::Value, SourceControlError> {
        let url = self.api_url(&["projects", project_id, "pipelines", pipeline_id])?;
        self.send(Method::GET, url, None, self.request_timeout).await
    }

    async fn probe(&self) -> Result<(), SourceControlError> {
        let mut url = self.api_url(&["projects"])?;
        url.set_query(Some("per_page=1"));
        self.send(Method::GET, url, None, self.probe_timeout).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: String) -> GitLabClient {
        GitLabClient::new(
            url,
            Some("secret".to_string()),
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_create_file_encodes_path_and_sends_bearer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v4/projects/7/repository/files/src%2Fmain.py")
            .match_header("authorization", "Bearer secret")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({"branch": "main"})))
            .with_status(201)
            .with_body(r#"{"file_path": "src/main.py", "branch": "main"}"#)
            .create_async()
            .await;

        let change = FileChange {
            project_id: "7".to_string(),
            file_path: "src/main.py".to_string(),
            content: "print('hi')".to_string(),
            branch: "main".to_string(),
            commit_message: "add main".to_string(),
        };
        let body = client(server.url())
            .write_file(FileWriteMode::Create, &change)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(body["file_path"], "src/main.py");
    }

    #[tokio::test]
    async fn test_non_2xx_is_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v4/projects/7/pipelines/99")
            .with_status(404)
            .with_body(r#"{"message": "404 Not found"}"#)
            .create_async()
            .await;

        let err = client(server.url()).pipeline_status("7", "99").await.unwrap_err();
        assert!(matches!(err, SourceControlError::Api { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_probe_hits_projects_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v4/projects")
            .match_query(mockito::Matcher::UrlEncoded("per_page".into(), "1".into()))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        client(server.url()).probe().await.unwrap();
        mock.assert_async().await;
    }
}
