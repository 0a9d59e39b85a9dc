// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Test Oracle
//!
//! The oracle asks the language model to judge a single feature test. The
//! model must answer with a tagged JSON object:
//!
//! ```json
//! {"status": "success" | "failure", "details": "free text"}
//! ```
//!
//! The first JSON object in the reply is parsed (bare or inside a code
//! fence). A reply without a parseable, known `status` is an `error` verdict,
//! as is any transport failure. It never silently passes or fails.

use crate::domain::feature::{Feature, TestSpec, TestStatus};
use crate::domain::llm::{GenerationOptions, LLMProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub status: TestStatus,
    pub details: serde_json::Value,
    /// Raw model reply, or the transport error text.
    pub raw: String,
}

impl Verdict {
    pub fn error(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            status: TestStatus::Error,
            details: serde_json::json!({ "error": reason.into() }),
            raw: raw.into(),
        }
    }
}

#[async_trait]
pub trait TestOracle: Send + Sync {
    /// Judge one test. Infallible: every failure mode maps to a verdict.
    async fn judge(&self, feature: &Feature, test: &TestSpec) -> Verdict;
}

pub struct LlmOracle {
    llm_provider: Arc<dyn LLMProvider>,
    options: GenerationOptions,
}

impl LlmOracle {
    pub fn new(llm_provider: Arc<dyn LLMProvider>, model: Option<String>) -> Self {
        let mut options = GenerationOptions::for_oracle();
        options.model = model;
        Self {
            llm_provider,
            options,
        }
    }

    pub fn build_prompt(feature: &Feature, test: &TestSpec) -> String {
        format!(
            r#"You are testing a software component running in an isolated sandbox.

Component: {name}
Version: {version}
Component type: {component_type}
Test: {test_name}

Instructions:
{prompt}

Respond with a single JSON object and nothing else:
{{"status": "success" or "failure", "details": "what you observed"}}"#,
            name = feature.name,
            version = feature.version,
            component_type = feature.component_type,
            test_name = test.name,
            prompt = test.prompt,
        )
    }
}

#[async_trait]
impl TestOracle for LlmOracle {
    async fn judge(&self, feature: &Feature, test: &TestSpec) -> Verdict {
        let prompt = Self::build_prompt(feature, test);
        match self.llm_provider.generate(&prompt, &self.options).await {
            Ok(response) => {
                let verdict = parse_verdict(&response.text);
                if verdict.status == TestStatus::Error {
                    let excerpt: String = response.text.chars().take(RAW_LOG_LIMIT).collect();
                    tracing::warn!(
                        feature = %feature.label(),
                        test = %test.name,
                        reason = %verdict.details["error"],
                        "Oracle reply not understood: {}",
                        excerpt
                    );
                }
                verdict
            }
            Err(e) => {
                tracing::warn!(feature = %feature.label(), test = %test.name, "Oracle unavailable: {}", e);
                Verdict::error(e.to_string(), "")
            }
        }
    }
}

const RAW_LOG_LIMIT: usize = 500;

/// Classify a raw oracle reply.
pub fn parse_verdict(text: &str) -> Verdict {
    let Some(object) = first_json_object(text) else {
        return Verdict::error("reply contained no JSON object", text);
    };

    let status = match object.get("status").and_then(|s| s.as_str()) {
        Some("success") => TestStatus::Success,
        Some("failure") => TestStatus::Failure,
        Some(other) => {
            return Verdict::error(format!("unknown status '{}'", other), text);
        }
        None => return Verdict::error("reply has no status field", text),
    };

    Verdict {
        status,
        details: object
            .get("details")
            .cloned()
            .unwrap_or(serde_json::Value::Null),
        raw: text.to_string(),
    }
}

fn first_json_object(text: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    for (idx, _) in text.match_indices('{') {
        let mut stream =
            serde_json::Deserializer::from_str(&text[idx..]).into_iter::<serde_json::Value>();
        if let Some(Ok(serde_json::Value::Object(map))) = stream.next() {
            return Some(map);
        }
    }
    None
}
