// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`duplex-core`)
//!
//! HTTP surface that translates external requests into application service
//! calls. **No business logic lives here**; all real work is delegated to
//! the services in `crate::application`.
//!
//! | Router | Process | Description |
//! |--------|---------|-------------|
//! | [`api::core`] | `duplex serve core` | status, command dispatch, components, promotion |
//! | [`api::recovery`] | `duplex serve recovery` | last cycle report, backup and restore |
//! | [`api::sandbox`] | `duplex serve sandbox` | create/stop/list sandboxes |
//! | [`api::runner`] | `duplex serve runner` | enqueue features, query results |
//! | [`api::monitor`] | `duplex serve monitor` | health score, switch-core |

pub mod api;
