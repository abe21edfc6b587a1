//! Slot Driver Task Implementation

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use nextgsim_common::{CellIndex, SlotClock};

use crate::tasks::{CellMessage, GnbTaskBase, SlotDriverMessage, Task, TaskMessage, UeManagerMessage};

/// Slot Driver Task
///
/// Hands consecutive slots to the cell task of one cell. Stops producing
/// slots after `simulation.total_slots` (0 runs until shutdown) and reports
/// completion on the `done` channel.
pub struct SlotDriverTask {
    /// Task base with handles to other tasks
    task_base: GnbTaskBase,
    /// Driven cell
    cell: CellIndex,
    /// Slot source
    clock: SlotClock,
    /// Pace slots at wall-clock slot duration
    real_time: bool,
    /// Slots to produce, 0 for unlimited
    total_slots: u64,
    /// Slot production suspended
    paused: bool,
    /// Slots the cell queue could not take in real-time mode
    nof_dropped_slots: u64,
    /// Completion notification, taken once
    done_tx: Option<mpsc::Sender<CellIndex>>,
}

impl SlotDriverTask {
    /// Creates the driver of `cell`, starting at SFN 0 slot 0.
    pub fn new(task_base: GnbTaskBase, cell: CellIndex, done_tx: mpsc::Sender<CellIndex>) -> Self {
        let scs = task_base
            .config
            .cells
            .get(cell.0 as usize)
            .map(|c| c.scs)
            .unwrap_or_default();
        let real_time = task_base.config.simulation.real_time;
        let total_slots = task_base.config.simulation.total_slots;
        Self {
            task_base,
            cell,
            clock: SlotClock::starting_at_zero(scs),
            real_time,
            total_slots,
            paused: false,
            nof_dropped_slots: 0,
            done_tx: Some(done_tx),
        }
    }

    /// Slots handed out so far.
    pub fn nof_slots(&self) -> u64 {
        self.clock.nof_ticks()
    }

    fn finished(&self) -> bool {
        self.total_slots > 0 && self.clock.nof_ticks() >= self.total_slots
    }

    fn can_emit(&self) -> bool {
        !self.paused && !self.finished()
    }

    /// Returns false when the cell task is gone.
    async fn emit_slot(&mut self) -> bool {
        let slot = self.clock.tick();
        let Some(cell_tx) = self.task_base.cell_txs.get(self.cell.0 as usize) else {
            return false;
        };

        if self.real_time {
            match cell_tx.try_send(CellMessage::Slot(slot)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // The cell sees the gap and counts the slot as missed.
                    self.nof_dropped_slots += 1;
                    warn!(cell = %self.cell, %slot, "cell queue full, slot indication dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => return false,
            }
            let _ = self
                .task_base
                .ue_manager_tx
                .try_send(UeManagerMessage::SlotTick { cell: self.cell, slot });
        } else {
            if cell_tx.send(CellMessage::Slot(slot)).await.is_err() {
                return false;
            }
            let _ = self
                .task_base
                .ue_manager_tx
                .send(UeManagerMessage::SlotTick { cell: self.cell, slot })
                .await;
        }

        if self.finished() {
            info!(cell = %self.cell, nof_slots = self.clock.nof_ticks(), "All slots produced");
            if let Some(done_tx) = self.done_tx.take() {
                let _ = done_tx.send(self.cell).await;
            }
        }
        true
    }

    fn handle_control(&mut self, msg: SlotDriverMessage) {
        match msg {
            SlotDriverMessage::Pause => {
                debug!(cell = %self.cell, next = %self.clock.peek(), "Slot driver paused");
                self.paused = true;
            }
            SlotDriverMessage::Resume => {
                debug!(cell = %self.cell, next = %self.clock.peek(), "Slot driver resumed");
                self.paused = false;
            }
        }
    }
}

#[async_trait::async_trait]
impl Task for SlotDriverTask {
    type Message = SlotDriverMessage;

    async fn run(&mut self, mut rx: mpsc::Receiver<TaskMessage<Self::Message>>) {
        info!(
            cell = %self.cell,
            real_time = self.real_time,
            slot_us = self.clock.slot_duration().as_micros() as u64,
            "Slot driver task started"
        );

        let mut interval = tokio::time::interval(self.clock.slot_duration());
        interval.set_missed_tick_behavior(MissedTickBehavior::Burst);

        loop {
            let can_emit = self.can_emit();
            let alive = tokio::select! {
                biased;
                msg = rx.recv() => match msg {
                    Some(TaskMessage::Message(msg)) => {
                        self.handle_control(msg);
                        true
                    }
                    Some(TaskMessage::Shutdown) => {
                        info!(cell = %self.cell, "Slot driver received shutdown signal");
                        break;
                    }
                    None => break,
                },
                _ = interval.tick(), if can_emit && self.real_time => self.emit_slot().await,
                _ = std::future::ready(()), if can_emit && !self.real_time => {
                    let alive = self.emit_slot().await;
                    tokio::task::yield_now().await;
                    alive
                }
            };
            if !alive {
                info!(cell = %self.cell, "Cell task gone");
                break;
            }
        }

        if self.nof_dropped_slots > 0 {
            warn!(cell = %self.cell, dropped = self.nof_dropped_slots, "Slot indications lost to a full cell queue");
        }
        info!(cell = %self.cell, nof_slots = self.clock.nof_ticks(), "Slot driver task stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{TaskManager, DEFAULT_CHANNEL_CAPACITY};
    use nextgsim_common::config::GnbConfig;
    use nextgsim_common::SlotPoint;

    fn config(total_slots: u64) -> GnbConfig {
        let mut config = GnbConfig::default();
        config.simulation.total_slots = total_slots;
        config.simulation.real_time = false;
        config
    }

    #[tokio::test]
    async fn test_free_running_driver_stops_after_total_slots() {
        let (manager, mut receivers) = TaskManager::new(config(8), DEFAULT_CHANNEL_CAPACITY);
        let base = manager.task_base();
        let scs = base.config.cells[0].scs;
        let (done_tx, mut done_rx) = mpsc::channel(1);
        let mut driver = SlotDriverTask::new(base.clone(), CellIndex(0), done_tx);
        let driver_rx = receivers.slot_driver_rxs.remove(0);

        let handle = tokio::spawn(async move {
            driver.run(driver_rx).await;
            driver.nof_slots()
        });

        assert_eq!(done_rx.recv().await, Some(CellIndex(0)));
        base.slot_driver_txs[0].shutdown().await.unwrap();
        assert_eq!(handle.await.unwrap(), 8);

        let mut cell_rx = receivers.cell_rxs.remove(0);
        for n in 0..8 {
            match cell_rx.recv().await {
                Some(TaskMessage::Message(CellMessage::Slot(slot))) => assert_eq!(slot, SlotPoint::new(scs, n)),
                other => panic!("unexpected message: {other:?}"),
            }
        }
        assert!(cell_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_paused_driver_produces_nothing() {
        let (manager, mut receivers) = TaskManager::new(config(0), DEFAULT_CHANNEL_CAPACITY);
        let base = manager.task_base();
        let (done_tx, _done_rx) = mpsc::channel(1);
        let mut driver = SlotDriverTask::new(base.clone(), CellIndex(0), done_tx);
        let driver_rx = receivers.slot_driver_rxs.remove(0);

        // Control messages are served before any slot is produced.
        base.slot_driver_txs[0].send(SlotDriverMessage::Pause).await.unwrap();
        base.slot_driver_txs[0].shutdown().await.unwrap();
        driver.run(driver_rx).await;

        assert_eq!(driver.nof_slots(), 0);
        assert!(receivers.cell_rxs[0].try_recv().is_err());
    }
}
