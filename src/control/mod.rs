use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::error::ControlError;
use crate::execution::{EngineState, EngineStatus, StatusSnapshot, TradingEngine};

struct EngineWorker {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Lifecycle owner of the trading loop: start, stop, status.
///
/// Start/stop calls are serialized by the worker mutex; status reads only
/// touch the engine state and never wait on a pending stop.
pub struct BotController {
    engine: Arc<TradingEngine>,
    state: Arc<EngineState>,
    worker: Mutex<Option<EngineWorker>>,
    stop_timeout: Duration,
}

impl BotController {
    pub fn new(engine: Arc<TradingEngine>, stop_timeout: Duration) -> Self {
        let state = engine.state().clone();
        Self {
            engine,
            state,
            worker: Mutex::new(None),
            stop_timeout,
        }
    }

    pub fn state(&self) -> &Arc<EngineState> {
        &self.state
    }

    /// Spawn the trading loop. Rejected unless the bot is idle.
    ///
    /// The transition is claimed before touching the worker slot, so a start
    /// that races a pending stop is refused instead of queueing behind it.
    pub async fn start(&self) -> Result<(), ControlError> {
        self.state.begin_run()?;
        let mut worker = self.worker.lock().await;

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(self.engine.clone().run(stop_rx));
        *worker = Some(EngineWorker { stop_tx, handle });

        tracing::info!("▶️  Bot started");
        Ok(())
    }

    /// Ask the loop to stop and wait for it to exit.
    ///
    /// The in-flight cycle always completes first. If the loop has not exited
    /// within the stop timeout the bot stays in `Stopping` and becomes idle by
    /// itself once the loop finishes.
    pub async fn stop(&self) -> Result<(), ControlError> {
        let mut slot = self.worker.lock().await;
        self.state.begin_stop()?;

        let Some(mut worker) = slot.take() else {
            tracing::warn!("Bot marked running without a trading loop, resetting to idle");
            self.state.mark_idle();
            return Ok(());
        };

        // The receiver may already be gone if the loop exited on its own
        let _ = worker.stop_tx.send(true);
        tracing::info!("⏹️  Stop requested, waiting for the current cycle to finish");

        match tokio::time::timeout(self.stop_timeout, &mut worker.handle).await {
            Ok(Ok(())) => {
                tracing::info!("⏹️  Bot stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Trading loop terminated abnormally");
                self.state.mark_idle();
                Ok(())
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.stop_timeout.as_secs(),
                    "Trading loop still finishing its cycle"
                );
                *slot = Some(worker);
                Err(ControlError::StopTimeout(self.stop_timeout.as_secs()))
            }
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        self.state.snapshot()
    }

    /// Stop the loop if it is running, for process exit
    pub async fn shutdown(&self) {
        match self.stop().await {
            Ok(()) => {}
            Err(ControlError::NotRunning) if self.state.status() == EngineStatus::Idle => {}
            Err(e) => tracing::warn!(error = %e, "Trading loop did not stop cleanly"),
        }
    }
}
