//! PHY Task Implementation

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use nextgsim_common::CellIndex;
use nextgsim_sched::{CellIndicationSender, IndicationError, SchedResult};

use super::loopback::{LoopbackPhy, PhyStats};
use crate::tasks::{GnbTaskBase, PhyMessage, Task, TaskMessage};

/// PHY Task
///
/// Turns every slot result into feedback and queues it on the indication
/// queue of the originating cell.
pub struct PhyTask {
    /// Indication queues, indexed by cell
    senders: Vec<CellIndicationSender>,
    /// Loopback PHYs, indexed by cell
    phys: Vec<LoopbackPhy>,
    /// Indications the scheduler queues could not take
    nof_dropped: u64,
}

impl PhyTask {
    /// Creates the task. `senders[i]` is the indication queue of cell `i`.
    pub fn new(task_base: &GnbTaskBase, senders: Vec<CellIndicationSender>) -> Self {
        let phys = (0..senders.len())
            .map(|i| LoopbackPhy::new(&task_base.config.simulation, CellIndex(i as u8)))
            .collect();
        Self {
            senders,
            phys,
            nof_dropped: 0,
        }
    }

    /// Feedback counters summed over cells.
    pub fn stats(&self) -> PhyStats {
        self.phys.iter().map(LoopbackPhy::stats).fold(PhyStats::default(), |acc, s| PhyStats {
            nof_results: acc.nof_results + s.nof_results,
            nof_preambles: acc.nof_preambles + s.nof_preambles,
            nof_crc_ok: acc.nof_crc_ok + s.nof_crc_ok,
            nof_crc_ko: acc.nof_crc_ko + s.nof_crc_ko,
            nof_acks: acc.nof_acks + s.nof_acks,
            nof_nacks: acc.nof_nacks + s.nof_nacks,
        })
    }

    fn handle_slot_result(&mut self, cell: CellIndex, result: &SchedResult) {
        let idx = cell.0 as usize;
        let (Some(phy), Some(sender)) = (self.phys.get_mut(idx), self.senders.get(idx)) else {
            warn!(%cell, "Slot result for an unknown cell");
            return;
        };

        for indication in phy.process(result) {
            let name = indication.name();
            match sender.send(indication) {
                Ok(()) => {}
                Err(IndicationError::QueueFull { capacity }) => {
                    self.nof_dropped += 1;
                    warn!(%cell, capacity, "Indication queue full, {name} dropped");
                }
                Err(IndicationError::CellStopped) => {
                    debug!(%cell, "Cell stopped, {name} dropped");
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Task for PhyTask {
    type Message = PhyMessage;

    async fn run(&mut self, mut rx: mpsc::Receiver<TaskMessage<Self::Message>>) {
        info!(nof_cells = self.senders.len(), "PHY task started");

        loop {
            match rx.recv().await {
                Some(TaskMessage::Message(PhyMessage::SlotResult { cell, result })) => {
                    self.handle_slot_result(cell, &result);
                }
                Some(TaskMessage::Shutdown) => {
                    info!("PHY task received shutdown signal");
                    break;
                }
                None => {
                    info!("PHY task channel closed");
                    break;
                }
            }
        }

        let stats = self.stats();
        info!(
            results = stats.nof_results,
            preambles = stats.nof_preambles,
            crc_ok = stats.nof_crc_ok,
            crc_ko = stats.nof_crc_ko,
            acks = stats.nof_acks,
            nacks = stats.nof_nacks,
            dropped = self.nof_dropped,
            "PHY task stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{TaskManager, DEFAULT_CHANNEL_CAPACITY};
    use nextgsim_common::config::GnbConfig;
    use nextgsim_common::SlotPoint;
    use nextgsim_sched::{CellConfiguration, CellScheduler};

    #[tokio::test]
    async fn test_feedback_lands_on_cell_queue() {
        let mut config = GnbConfig::default();
        config.simulation.rach_probability = 1.0;
        let (manager, receivers) = TaskManager::new(config.clone(), DEFAULT_CHANNEL_CAPACITY);
        let base = manager.task_base();

        let cfg = CellConfiguration::new(CellIndex(0), &config.cells[0], &config.scheduler).unwrap();
        let mut sched = CellScheduler::without_notifiers(cfg);
        sched.start();
        let mut task = PhyTask::new(&base, vec![sched.indication_sender()]);

        // Run the cell until it publishes a PRACH occasion.
        let scs = config.cells[0].scs;
        let mut with_prach = None;
        for n in 0..200 {
            let result = sched.run_slot(SlotPoint::new(scs, n)).unwrap();
            if !result.ul.prachs.is_empty() {
                with_prach = Some(result);
                break;
            }
        }
        let result = with_prach.expect("no PRACH occasion in 200 slots");
        let prach_slot = result.slot;

        base.phy_tx
            .send(PhyMessage::SlotResult {
                cell: CellIndex(0),
                result,
            })
            .await
            .unwrap();
        base.phy_tx.shutdown().await.unwrap();
        task.run(receivers.phy_rx).await;
        assert_eq!(task.stats().nof_preambles, 1);

        // The preamble is applied at the next slot.
        sched.run_slot(prach_slot + 1).unwrap();
        assert_eq!(sched.ra().nof_pending_preambles() + sched.ra().nof_pending_msg3s(), 1);
    }
}
