// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Types, ports and invariants shared by every duplex component.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types and trait seams; no I/O

pub mod activity;
pub mod archive;
pub mod command;
pub mod component;
pub mod core;
pub mod error;
pub mod feature;
pub mod judge;
pub mod llm;
pub mod node_config;
pub mod probe;
pub mod process;
pub mod repository;
pub mod runtime;
pub mod sandbox;
pub mod service;
pub mod source_control;
