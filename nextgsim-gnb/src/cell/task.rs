//! Cell Task Implementation
//!
//! Runs the scheduler of one cell slot by slot and hands every published
//! result to the PHY task.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use nextgsim_common::{CellIndex, SlotPoint};
use nextgsim_sched::{CellConfigError, CellIndicationSender, CellScheduler, SchedResult};

use super::notifier::{TaskEventNotifier, TaskMetricsNotifier};
use crate::tasks::{CellMessage, GnbTaskBase, PhyMessage, Task, TaskMessage};

/// Errors creating a cell task.
#[derive(Debug, Error)]
pub enum CellTaskError {
    /// No such cell in the configuration
    #[error("cell {0} is not configured")]
    UnknownCell(CellIndex),
    /// Invalid cell configuration
    #[error("cell configuration rejected: {0}")]
    Config(#[from] CellConfigError),
}

/// Cell Task
///
/// Owns the `CellScheduler` of one cell.
pub struct CellTask {
    /// Task base with handles to other tasks
    task_base: GnbTaskBase,
    /// Cell served by this task
    cell: CellIndex,
    /// Scheduler of the cell
    scheduler: CellScheduler,
    /// Results the PHY queue could not take
    nof_dropped_results: u64,
}

impl CellTask {
    /// Creates the task around an existing scheduler.
    pub fn new(task_base: GnbTaskBase, scheduler: CellScheduler) -> Self {
        let cell = scheduler.config().cell_index;
        Self {
            task_base,
            cell,
            scheduler,
            nof_dropped_results: 0,
        }
    }

    /// Creates the scheduler of cell `cell` from the gNB configuration, with
    /// events going to the UE manager and metrics to the metrics task.
    pub fn from_config(task_base: GnbTaskBase, cell: CellIndex) -> Result<Self, CellTaskError> {
        let cell_cfg = task_base
            .config
            .cells
            .get(cell.0 as usize)
            .ok_or(CellTaskError::UnknownCell(cell))?;
        let scheduler = CellScheduler::from_config(
            cell,
            cell_cfg,
            &task_base.config.scheduler,
            Box::new(TaskEventNotifier::new(task_base.ue_manager_tx.clone())),
            Box::new(TaskMetricsNotifier::new(task_base.metrics_tx.clone())),
        )?;
        Ok(Self::new(task_base, scheduler))
    }

    /// Indication queue of the scheduler.
    pub fn indication_sender(&self) -> CellIndicationSender {
        self.scheduler.indication_sender()
    }

    /// Scheduler of the cell.
    pub fn scheduler(&self) -> &CellScheduler {
        &self.scheduler
    }

    async fn handle_slot(&mut self, slot: SlotPoint) {
        let Some(result) = self.scheduler.run_slot(slot) else {
            return;
        };
        self.forward_result(result).await;
    }

    async fn forward_result(&mut self, result: Arc<SchedResult>) {
        let msg = PhyMessage::SlotResult {
            cell: self.cell,
            result,
        };
        if self.task_base.config.simulation.real_time {
            // The slot loop must not wait on the PHY.
            if self.task_base.phy_tx.try_send(msg).is_err() {
                self.nof_dropped_results += 1;
                warn!(cell = %self.cell, "PHY queue full, slot result dropped");
            }
        } else if self.task_base.phy_tx.send(msg).await.is_err() {
            debug!(cell = %self.cell, "PHY task gone");
        }
    }
}

#[async_trait::async_trait]
impl Task for CellTask {
    type Message = CellMessage;

    async fn run(&mut self, mut rx: mpsc::Receiver<TaskMessage<Self::Message>>) {
        info!(cell = %self.cell, "Cell task started");
        self.scheduler.start();

        loop {
            match rx.recv().await {
                Some(TaskMessage::Message(CellMessage::Slot(slot))) => {
                    self.handle_slot(slot).await;
                }
                Some(TaskMessage::Shutdown) => {
                    info!(cell = %self.cell, "Cell task received shutdown signal");
                    break;
                }
                None => {
                    info!(cell = %self.cell, "Cell task channel closed");
                    break;
                }
            }
        }

        self.scheduler.stop();
        if self.nof_dropped_results > 0 {
            warn!(cell = %self.cell, dropped = self.nof_dropped_results, "Slot results lost to a full PHY queue");
        }
        info!(cell = %self.cell, "Cell task stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{TaskManager, DEFAULT_CHANNEL_CAPACITY};
    use nextgsim_common::config::GnbConfig;
    use nextgsim_sched::CellSchedulerState;

    #[test]
    fn test_unknown_cell_is_rejected() {
        let (manager, _receivers) = TaskManager::new(GnbConfig::default(), DEFAULT_CHANNEL_CAPACITY);
        let result = CellTask::from_config(manager.task_base(), CellIndex(3));
        assert!(matches!(result, Err(CellTaskError::UnknownCell(CellIndex(3)))));
    }

    #[tokio::test]
    async fn test_every_slot_result_reaches_phy() {
        let (manager, mut receivers) = TaskManager::new(GnbConfig::default(), DEFAULT_CHANNEL_CAPACITY);
        let base = manager.task_base();
        let mut task = CellTask::from_config(base.clone(), CellIndex(0)).unwrap();
        let scs = task.scheduler().config().scs;
        let cell_rx = receivers.cell_rxs.remove(0);

        for n in 0..5 {
            base.cell_txs[0]
                .send(CellMessage::Slot(SlotPoint::new(scs, n)))
                .await
                .unwrap();
        }
        base.cell_txs[0].shutdown().await.unwrap();
        task.run(cell_rx).await;

        assert_eq!(task.scheduler().state(), CellSchedulerState::Stopped);
        for n in 0..5 {
            match receivers.phy_rx.recv().await {
                Some(TaskMessage::Message(PhyMessage::SlotResult { cell, result })) => {
                    assert_eq!(cell, CellIndex(0));
                    assert_eq!(result.slot, SlotPoint::new(scs, n));
                }
                other => panic!("unexpected message: {other:?}"),
            }
        }
    }
}
