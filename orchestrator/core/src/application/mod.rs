// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod supervisor;
pub mod repository_factory;

pub mod dispatcher;
pub mod core_manager;
pub mod recovery;
pub mod sandbox_manager;
pub mod feature_runner;
pub mod system_monitor;

// Re-export services for convenience
pub use core_manager::{CoreManager, CoreManagerSettings};
pub use dispatcher::{CommandDispatcher, DispatchOutcome, DispatchRequest};
pub use feature_runner::{FeatureRunner, FeatureRunnerSettings, ValidationOutcome};
pub use recovery::{RecoverySettings, RecoverySupervisor};
pub use sandbox_manager::{SandboxManager, SandboxSettings};
pub use supervisor::{Heartbeat, LoopHealth, LoopSupervisor};
pub use system_monitor::{MonitorSettings, SwitchError, SystemMonitor};
