// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Lib
//!
//! Orchestration layer for a pair of redundant cores, a sandboxed feature
//! validation pipeline, recovery supervision and system monitoring.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Library crate backing every `duplex serve <component>` process

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
