//! Orchestrator
//!
//! Drives the periodic Start/Fork/Join/Finish loop, the checker's
//! analogue to `RebalancerService::run`'s `tokio::select!` cycle.
//! Adds pause/resume and an immediate-wake trigger on top of the
//! interval sleep, and a one-shot mode for CLI-driven single scans.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::driver::ScanDriver;
use crate::error::Result;

/// Periodic orchestrator around a [`ScanDriver`].
pub struct Orchestrator {
    driver: ScanDriver,
    interval: std::time::Duration,
    paused: Arc<AtomicBool>,
    wake: Arc<Notify>,
    cancellation: CancellationToken,
}

/// A handle for controlling a running orchestrator from another task,
/// e.g. an admin HTTP endpoint.
#[derive(Clone)]
pub struct OrchestratorHandle {
    paused: Arc<AtomicBool>,
    wake: Arc<Notify>,
    cancellation: CancellationToken,
}

impl OrchestratorHandle {
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Wake the loop immediately rather than waiting out the rest of
    /// the current interval sleep.
    pub fn trigger_wait(&self) {
        self.wake.notify_one();
    }

    pub fn close(&self) {
        self.cancellation.cancel();
    }
}

impl Orchestrator {
    pub fn new(driver: ScanDriver, interval: std::time::Duration, cancellation: CancellationToken) -> Self {
        Self {
            driver,
            interval,
            paused: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            cancellation,
        }
    }

    pub fn handle(&self) -> OrchestratorHandle {
        OrchestratorHandle {
            paused: self.paused.clone(),
            wake: self.wake.clone(),
            cancellation: self.cancellation.clone(),
        }
    }

    /// Runs a single iteration and returns, for CLI one-shot mode.
    pub async fn run_once(&mut self) -> Result<()> {
        self.driver.run_iteration().await?;
        Ok(())
    }

    /// Runs the periodic loop until closed.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            if self.cancellation.is_cancelled() {
                info!("orchestrator closed");
                return Ok(());
            }

            if self.paused.load(Ordering::SeqCst) {
                tokio::select! {
                    _ = self.wake.notified() => continue,
                    _ = self.cancellation.cancelled() => {
                        info!("orchestrator closed while paused");
                        return Ok(());
                    }
                }
            }

            if let Err(err) = self.driver.run_iteration().await {
                if err.aborts_iteration() {
                    error!(error = %err, "iteration aborted, will retry after interval");
                } else {
                    error!(error = %err, "iteration failed");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = self.wake.notified() => {},
                _ = self.cancellation.cancelled() => {
                    info!("orchestrator closed");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_pause_resume() {
        let paused = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let cancellation = CancellationToken::new();
        let handle = OrchestratorHandle {
            paused: paused.clone(),
            wake,
            cancellation,
        };

        assert!(!handle.is_paused());
        handle.pause();
        assert!(handle.is_paused());
        handle.resume();
        assert!(!handle.is_paused());
    }

    #[test]
    fn test_handle_close_cancels_token() {
        let cancellation = CancellationToken::new();
        let handle = OrchestratorHandle {
            paused: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            cancellation: cancellation.clone(),
        };
        assert!(!cancellation.is_cancelled());
        handle.close();
        assert!(cancellation.is_cancelled());
    }
}
