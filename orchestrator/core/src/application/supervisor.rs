// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Loop Supervisor
//!
//! Every long-lived background loop (health cycle, recovery cycle, feature
//! worker, monitor poll) runs as a supervised task. If the task panics or
//! returns before shutdown was requested it is restarted after an
//! exponential backoff, and its liveness is reported on `/health`.
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `running` | a task instance is currently alive |
//! | `restarts` | unexpected terminations so far |
//! | `last_heartbeat` | last time the loop called [`Heartbeat::beat`] |
//! | `last_error` | panic message or early-return note of the last termination |

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct LoopHealth {
    pub name: String,
    pub running: bool,
    pub restarts: u32,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Handle a loop uses to report progress.
#[derive(Clone)]
pub struct Heartbeat {
    state: Arc<Mutex<LoopHealth>>,
}

impl Heartbeat {
    pub fn beat(&self) {
        self.state.lock().last_heartbeat = Some(Utc::now());
    }

    /// Detached heartbeat for driving a loop body outside a supervisor.
    pub fn detached(name: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(LoopHealth {
                name: name.to_string(),
                running: true,
                restarts: 0,
                last_heartbeat: None,
                last_error: None,
            })),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    /// A run at least this long resets the backoff to `initial`.
    pub reset_after: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            reset_after: Duration::from_secs(300),
        }
    }
}

impl Backoff {
    fn delay(&self, consecutive_failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(consecutive_failures.saturating_sub(1));
        self.initial.saturating_mul(factor).min(self.max)
    }
}

pub struct LoopSupervisor {
    loops: Mutex<BTreeMap<String, Arc<Mutex<LoopHealth>>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    backoff: Backoff,
}

impl LoopSupervisor {
    pub fn new(cancel: CancellationToken) -> Self {
        Self::with_backoff(cancel, Backoff::default())
    }

    pub fn with_backoff(cancel: CancellationToken, backoff: Backoff) -> Self {
        Self {
            loops: Mutex::new(BTreeMap::new()),
            handles: Mutex::new(Vec::new()),
            cancel,
            backoff,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn `name`, re-created by `factory` after every unexpected exit.
    /// The loop must return promptly once its token is cancelled.
    pub fn spawn<F, Fut>(&self, name: &str, factory: F)
    where
        F: Fn(Heartbeat, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let state = Arc::new(Mutex::new(LoopHealth {
            name: name.to_string(),
            running: false,
            restarts: 0,
            last_heartbeat: None,
            last_error: None,
        }));
        self.loops.lock().insert(name.to_string(), state.clone());

        let cancel = self.cancel.clone();
        let backoff = self.backoff;
        let name = name.to_string();
        let handle = tokio::spawn(async move {
            let mut consecutive_failures = 0u32;
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                state.lock().running = true;
                let started = Instant::now();
                let heartbeat = Heartbeat { state: state.clone() };
                let result = tokio::spawn(factory(heartbeat, cancel.child_token())).await;
                state.lock().running = false;

                if cancel.is_cancelled() {
                    break;
                }

                let reason = match result {
                    Ok(()) => "loop returned before shutdown".to_string(),
                    Err(e) if e.is_panic() => {
                        let payload = e.into_panic();
                        let msg = payload
                            .downcast_ref::<&str>()
                            .map(|s| s.to_string())
                            .or_else(|| payload.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "unknown panic".to_string());
                        format!("panicked: {}", msg)
                    }
                    Err(e) => format!("aborted: {}", e),
                };

                if started.elapsed() >= backoff.reset_after {
                    consecutive_failures = 0;
                }
                consecutive_failures += 1;
                let delay = backoff.delay(consecutive_failures);
                {
                    let mut s = state.lock();
                    s.restarts += 1;
                    s.last_error = Some(reason.clone());
                }
                error!(loop_name = %name, restart_in_ms = delay.as_millis() as u64, "Supervised loop {}", reason);

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
                warn!(loop_name = %name, "Restarting supervised loop");
            }
            info!(loop_name = %name, "Supervised loop stopped");
        });
        self.handles.lock().push(handle);
    }

    pub fn health(&self) -> Vec<LoopHealth> {
        self.loops.lock().values().map(|s| s.lock().clone()).collect()
    }

    pub fn all_running(&self) -> bool {
        self.loops.lock().values().all(|s| s.lock().running)
    }

    /// Cancel every loop and wait for them to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> Backoff {
        Backoff {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(40),
            reset_after: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let b = fast();
        assert_eq!(b.delay(1), Duration::from_millis(10));
        assert_eq!(b.delay(2), Duration::from_millis(20));
        assert_eq!(b.delay(3), Duration::from_millis(40));
        assert_eq!(b.delay(10), Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_panicking_loop_is_restarted() {
        let supervisor = LoopSupervisor::with_backoff(CancellationToken::new(), fast());
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();

        supervisor.spawn("flaky", move |hb, cancel| {
            let counter = counter.clone();
            async move {
                hb.beat();
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    panic!("boom");
                }
                cancel.cancelled().await;
            }
        });

        tokio::time::sleep(Duration::from_millis(300)).await;
        let health = supervisor.health();
        assert_eq!(health.len(), 1);
        assert_eq!(health[0].restarts, 2);
        assert!(health[0].running);
        assert!(health[0].last_heartbeat.is_some());
        assert!(health[0].last_error.as_deref().unwrap().contains("boom"));

        supervisor.shutdown().await;
        assert!(!supervisor.all_running());
    }

    #[tokio::test]
    async fn test_cancelled_loop_is_not_restarted() {
        let supervisor = LoopSupervisor::with_backoff(CancellationToken::new(), fast());
        supervisor.spawn("steady", |_hb, cancel| async move { cancel.cancelled().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(supervisor.all_running());

        supervisor.shutdown().await;
        assert_eq!(supervisor.health()[0].restarts, 0);
    }
}
