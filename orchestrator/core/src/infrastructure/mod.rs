// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod core_client;
pub mod db;
pub mod llm;
pub mod probe;
pub mod process;
pub mod repositories;
pub mod runtime;
pub mod shared_state;
pub mod snapshot_archive;
pub mod source_control;
