//! gNB application runtime
//!
//! Builds every task from a validated configuration, spawns them through the
//! `TaskManager` and waits for the slot drivers to finish.

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use nextgsim_common::config::GnbConfig;
use nextgsim_common::CellIndex;

use super::config_loader::{validate_gnb_config, ConfigValidationError};
use crate::cell::{CellTask, CellTaskError};
use crate::metrics::{MetricsSummary, MetricsTask};
use crate::phy::PhyTask;
use crate::slot::SlotDriverTask;
use crate::tasks::{TaskError, TaskId, TaskManager, DEFAULT_CHANNEL_CAPACITY};
use crate::ue_mgr::UeManagerTask;

/// Errors starting the application.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration rejected
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigValidationError),
    /// A cell task could not be built
    #[error(transparent)]
    Cell(#[from] CellTaskError),
}

/// Running gNB application.
pub struct GnbApp {
    /// Task manager for lifecycle management
    task_manager: TaskManager,
    /// Shutdown signal receiver
    shutdown_rx: watch::Receiver<bool>,
    /// Completion of the slot drivers
    done_rx: mpsc::Receiver<CellIndex>,
    /// Cells still producing slots
    nof_running_cells: usize,
    /// Totals published by the metrics task
    metrics_rx: watch::Receiver<MetricsSummary>,
}

impl GnbApp {
    /// Validates `config` and spawns all tasks. Must run inside a tokio runtime.
    pub fn start(config: GnbConfig) -> Result<Self, AppError> {
        validate_gnb_config(&config)?;
        let nof_cells = config.cells.len();

        let (mut task_manager, receivers) = TaskManager::new(config, DEFAULT_CHANNEL_CAPACITY);
        let task_base = task_manager.task_base();
        let shutdown_rx = task_manager.shutdown_receiver();

        let cell_tasks = (0..nof_cells)
            .map(|i| CellTask::from_config(task_base.clone(), CellIndex(i as u8)))
            .collect::<Result<Vec<_>, _>>()?;
        let senders: Vec<_> = cell_tasks.iter().map(CellTask::indication_sender).collect();

        let (metrics_task, metrics_rx) = MetricsTask::new();
        task_manager.spawn_task(TaskId::Metrics, metrics_task, receivers.metrics_rx);
        task_manager.spawn_task(
            TaskId::UeManager,
            UeManagerTask::new(&task_base, senders.clone()),
            receivers.ue_manager_rx,
        );
        task_manager.spawn_task(TaskId::Phy, PhyTask::new(&task_base, senders), receivers.phy_rx);

        for (task, rx) in cell_tasks.into_iter().zip(receivers.cell_rxs) {
            let cell = task.scheduler().config().cell_index;
            task_manager.spawn_task(TaskId::Cell(cell), task, rx);
        }

        // Slot drivers last, so that every consumer is running.
        let (done_tx, done_rx) = mpsc::channel(nof_cells.max(1));
        for (i, rx) in receivers.slot_driver_rxs.into_iter().enumerate() {
            let cell = CellIndex(i as u8);
            let driver = SlotDriverTask::new(task_base.clone(), cell, done_tx.clone());
            task_manager.spawn_task(TaskId::SlotDriver(cell), driver, rx);
        }

        info!(nof_cells, "gNB tasks spawned");
        Ok(Self {
            task_manager,
            shutdown_rx,
            done_rx,
            nof_running_cells: nof_cells,
            metrics_rx,
        })
    }

    /// Waits until every slot driver produced its slots, or the task manager
    /// signals shutdown. Never returns for an unlimited run without shutdown.
    pub async fn run_until_done(&mut self) {
        while self.nof_running_cells > 0 {
            tokio::select! {
                done = self.done_rx.recv() => match done {
                    Some(cell) => {
                        info!(%cell, "Cell finished its slots");
                        self.nof_running_cells -= 1;
                    }
                    None => {
                        warn!("Slot drivers gone");
                        return;
                    }
                },
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("Received shutdown signal from task manager");
                        return;
                    }
                }
            }
        }
    }

    /// Latest metrics totals.
    pub fn metrics(&self) -> MetricsSummary {
        self.metrics_rx.borrow().clone()
    }

    /// Task manager of the application.
    pub fn task_manager(&self) -> &TaskManager {
        &self.task_manager
    }

    /// Stops all tasks and returns the final metrics totals.
    pub async fn shutdown(mut self) -> Result<MetricsSummary, TaskError> {
        info!("Initiating graceful shutdown...");
        self.task_manager.shutdown().await?;
        Ok(self.metrics_rx.borrow().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskState;

    fn short_run(total_slots: u64) -> GnbConfig {
        let mut config = GnbConfig::default();
        config.simulation.total_slots = total_slots;
        config.simulation.real_time = false;
        config.scheduler.metrics_report_period_slots = 100;
        config
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = short_run(10);
        config.cells.clear();
        assert!(matches!(GnbApp::start(config), Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_free_running_app_completes() {
        let mut app = GnbApp::start(short_run(500)).unwrap();
        assert_eq!(
            app.task_manager().get_task_state(TaskId::Cell(CellIndex(0))),
            Some(TaskState::Running)
        );
        app.run_until_done().await;
        let summary = app.shutdown().await.unwrap();
        let totals = summary.cell(CellIndex(0)).expect("no metrics reported");
        assert!(totals.nof_reports >= 1);
        assert!(totals.nof_slots >= 100);
    }
}
