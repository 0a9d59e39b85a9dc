// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `duplex switch-core <id>`: drive the System Monitor's switch endpoint.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Args)]
pub struct SwitchCoreArgs {
    /// Core id to designate as active
    #[arg(value_name = "CORE_ID")]
    pub core_id: String,

    /// System Monitor base URL
    #[arg(long, env = "DUPLEX_MONITOR_URL", default_value = "http://127.0.0.1:5005")]
    pub monitor_url: String,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    pub timeout: u64,
}

pub async fn handle_command(args: SwitchCoreArgs) -> Result<()> {
    let body = request_switch(&args.monitor_url, &args.core_id, Duration::from_secs(args.timeout)).await?;

    let changed = body.get("changed").and_then(Value::as_bool).unwrap_or(false);
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("switch accepted");
    if changed {
        println!("{}", format!("✓ {}", message).green());
    } else {
        println!("{}", format!("• {}", message).yellow());
    }
    Ok(())
}

/// POST `/switch_core` and return the response body, failing on any
/// non-success reply.
pub async fn request_switch(monitor_url: &str, core_id: &str, timeout: Duration) -> Result<Value> {
    let url = format!("{}/switch_core", monitor_url.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .post(&url)
        .timeout(timeout)
        .json(&json!({ "core_id": core_id }))
        .send()
        .await
        .with_context(|| format!("Failed to reach System Monitor at {}", url))?;

    let status = response.status();
    let body: Value = response
        .json()
        .await
        .context("System Monitor returned a non-JSON response")?;

    if !status.is_success() {
        let reason = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        anyhow::bail!("Switch to core {} failed ({}): {}", core_id, status, reason);
    }
    Ok(body)
}
