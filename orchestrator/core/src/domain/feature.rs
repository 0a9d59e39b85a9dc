// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const OVERALL_TEST_NAME: &str = "overall";
pub const SETUP_TEST_NAME: &str = "environment_up";
pub const PROCESS_TEST_NAME: &str = "process";
pub const DEFAULT_TEST_NAME: &str = "basic_functionality";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSpec {
    pub name: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Candidate unit of functionality awaiting validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    pub version: String,
    pub component_type: String,
    /// Compose-style environment definition, written verbatim to the
    /// working directory before bring-up.
    #[serde(alias = "docker_compose")]
    pub environment: serde_json::Value,
    #[serde(default)]
    pub tests: Vec<TestSpec>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeatureError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl Feature {
    /// Parse a loosely-typed submission, reporting the first missing field.
    pub fn from_config(config: &serde_json::Value) -> Result<Self, FeatureError> {
        for field in ["name", "version", "component_type"] {
            match config.get(field) {
                Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {}
                _ => return Err(FeatureError::MissingField(field)),
            }
        }
        if config.get("environment").or_else(|| config.get("docker_compose")).is_none() {
            return Err(FeatureError::MissingField("environment"));
        }

        let feature: Feature = serde_json::from_value(config.clone()).map_err(|e| {
            FeatureError::InvalidField {
                field: "feature_config",
                reason: e.to_string(),
            }
        })?;
        feature.validate()?;
        Ok(feature)
    }

    pub fn validate(&self) -> Result<(), FeatureError> {
        validate_identifier("name", &self.name)?;
        validate_identifier("version", &self.version)?;
        if !self.environment.is_object() {
            return Err(FeatureError::InvalidField {
                field: "environment",
                reason: "must be a mapping".to_string(),
            });
        }
        let mut seen = std::collections::HashSet::new();
        for test in &self.tests {
            if test.name.trim().is_empty() {
                return Err(FeatureError::MissingField("tests[].name"));
            }
            if test.name == OVERALL_TEST_NAME || test.name == SETUP_TEST_NAME {
                return Err(FeatureError::InvalidField {
                    field: "tests[].name",
                    reason: format!("'{}' is reserved for pipeline results", test.name),
                });
            }
            if !seen.insert(test.name.as_str()) {
                return Err(FeatureError::InvalidField {
                    field: "tests[].name",
                    reason: format!("duplicate test '{}'", test.name),
                });
            }
            if test.prompt.trim().is_empty() {
                return Err(FeatureError::MissingField("tests[].prompt"));
            }
        }
        Ok(())
    }

    /// Declared tests, or the single default test when none were declared.
    pub fn effective_tests(&self) -> Vec<TestSpec> {
        if !self.tests.is_empty() {
            return self.tests.clone();
        }
        vec![TestSpec {
            name: DEFAULT_TEST_NAME.to_string(),
            prompt: format!(
                "Exercise the basic functionality of component {} version {} and report whether it works without errors.",
                self.name, self.version
            ),
            description: Some("Default functionality check".to_string()),
        }]
    }

    pub fn label(&self) -> String {
        format!("{} v{}", self.name, self.version)
    }
}

fn validate_identifier(field: &'static str, value: &str) -> Result<(), FeatureError> {
    if value.is_empty() {
        return Err(FeatureError::MissingField(field));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(FeatureError::InvalidField {
            field,
            reason: format!("'{}' may only contain [A-Za-z0-9_.-]", value),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Success,
    Failure,
    Error,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Success => "success",
            TestStatus::Failure => "failure",
            TestStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(TestStatus::Success),
            "failure" => Some(TestStatus::Failure),
            "error" => Some(TestStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub component_name: String,
    pub test_name: String,
    pub version: String,
    pub status: TestStatus,
    /// Seconds.
    pub duration: f64,
    pub details: serde_json::Value,
    pub logs: String,
    pub timestamp: DateTime<Utc>,
}

impl TestResult {
    pub fn for_feature(
        feature: &Feature,
        test_name: impl Into<String>,
        status: TestStatus,
        duration: f64,
        details: serde_json::Value,
        logs: impl Into<String>,
    ) -> Self {
        Self {
            component_name: feature.name.clone(),
            test_name: test_name.into(),
            version: feature.version.clone(),
            status,
            duration,
            details,
            logs: logs.into(),
            timestamp: Utc::now(),
        }
    }

    /// Synthetic aggregate: failure if any individual test is non-success.
    pub fn overall(feature: &Feature, individual: &[TestResult], total_duration: f64) -> Self {
        let status = if individual.iter().all(|r| r.status == TestStatus::Success) {
            TestStatus::Success
        } else {
            TestStatus::Failure
        };
        let summary: serde_json::Map<String, serde_json::Value> = individual
            .iter()
            .map(|r| (r.test_name.clone(), serde_json::json!(r.status)))
            .collect();
        Self::for_feature(
            feature,
            OVERALL_TEST_NAME,
            status,
            total_duration,
            serde_json::json!({ "test_results": summary }),
            format!("Overall test duration: {:.2}s", total_duration),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feature() -> Feature {
        Feature {
            name: "echo-service".to_string(),
            version: "0.1.0".to_string(),
            component_type: "service".to_string(),
            environment: json!({"services": {}}),
            tests: vec![],
        }
    }

    #[test]
    fn test_from_config_reports_missing_field() {
        let err = Feature::from_config(&json!({"name": "x", "version": "1"})).unwrap_err();
        assert_eq!(err, FeatureError::MissingField("component_type"));

        let err = Feature::from_config(&json!({"name": "x", "version": "1", "component_type": "svc"}))
            .unwrap_err();
        assert_eq!(err, FeatureError::MissingField("environment"));
    }

    #[test]
    fn test_from_config_accepts_docker_compose_alias() {
        let feature = Feature::from_config(&json!({
            "name": "echo-service",
            "version": "0.1.0",
            "component_type": "service",
            "docker_compose": {"services": {"echo": {"image": "alpine"}}},
            "tests": [{"name": "basic", "prompt": "check it echoes input"}]
        }))
        .unwrap();
        assert_eq!(feature.tests.len(), 1);
        assert!(feature.environment.get("services").is_some());
    }

    #[test]
    fn test_rejects_path_like_names() {
        let mut f = feature();
        f.name = "../etc".to_string();
        assert!(matches!(f.validate(), Err(FeatureError::InvalidField { field: "name", .. })));
    }

    #[test]
    fn test_rejects_reserved_and_duplicate_test_names() {
        let declare = |names: &[&str]| {
            let mut f = feature();
            f.tests = names
                .iter()
                .map(|n| TestSpec {
                    name: n.to_string(),
                    prompt: "check it".to_string(),
                    description: None,
                })
                .collect();
            f.validate()
        };

        for reserved in [OVERALL_TEST_NAME, SETUP_TEST_NAME] {
            assert!(matches!(
                declare(&[reserved]),
                Err(FeatureError::InvalidField { field: "tests[].name", .. })
            ));
        }
        assert!(declare(&["login", "login"]).is_err());
        assert!(declare(&["login", "logout"]).is_ok());
    }

    #[test]
    fn test_default_test_when_none_declared() {
        let tests = feature().effective_tests();
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].name, DEFAULT_TEST_NAME);
    }

    #[test]
    fn test_overall_fails_on_any_non_success() {
        let f = feature();
        let ok = TestResult::for_feature(&f, "a", TestStatus::Success, 1.0, json!({}), "");
        let err = TestResult::for_feature(&f, "b", TestStatus::Error, 1.0, json!({}), "");

        assert_eq!(TestResult::overall(&f, &[ok.clone()], 2.0).status, TestStatus::Success);
        let overall = TestResult::overall(&f, &[ok, err], 2.0);
        assert_eq!(overall.status, TestStatus::Failure);
        assert_eq!(overall.test_name, OVERALL_TEST_NAME);
        assert_eq!(overall.details["test_results"]["b"], json!("error"));
    }
}
