//! UE Manager Task Implementation

use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use nextgsim_common::config::SimulationConfig;
use nextgsim_common::{CellIndex, Lcg, Lcid, Rnti, SlotPoint};
use nextgsim_sched::{
    CellIndication, CellIndicationSender, DlBufferState, IndicationError, SchedulerEvent, UeCreationRequest,
    UlBsrIndication,
};

use crate::tasks::{GnbTaskBase, Task, TaskMessage, UeManagerMessage};

/// Size of the RRC Setup message queued on SRB0 after Msg3.
const RRC_SETUP_BYTES: u32 = 120;

/// Counters of the UE manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UeManagerStats {
    /// UEs admitted after Msg3
    pub nof_admitted: u64,
    /// Msg3s ignored because the UE limit was reached
    pub nof_rejected: u64,
    /// UEs removed after RLF
    pub nof_rlfs: u64,
}

/// UE Manager Task
pub struct UeManagerTask {
    /// Indication queues, indexed by cell
    senders: Vec<CellIndicationSender>,
    /// Simulation parameters
    sim: SimulationConfig,
    /// Admitted UEs and their serving cell
    ues: BTreeMap<Rnti, CellIndex>,
    /// Counters
    stats: UeManagerStats,
}

impl UeManagerTask {
    /// Creates the task. `senders[i]` is the indication queue of cell `i`.
    pub fn new(task_base: &GnbTaskBase, senders: Vec<CellIndicationSender>) -> Self {
        Self {
            senders,
            sim: task_base.config.simulation.clone(),
            ues: BTreeMap::new(),
            stats: UeManagerStats::default(),
        }
    }

    /// Counters so far.
    pub fn stats(&self) -> UeManagerStats {
        self.stats
    }

    /// Number of admitted UEs.
    pub fn nof_ues(&self) -> usize {
        self.ues.len()
    }

    fn send(&self, cell: CellIndex, indication: CellIndication) -> Result<(), IndicationError> {
        match self.senders.get(cell.0 as usize) {
            Some(sender) => sender.send(indication),
            None => Err(IndicationError::CellStopped),
        }
    }

    fn handle_event(&mut self, event: SchedulerEvent) {
        match event {
            SchedulerEvent::Msg3Received { cell, tc_rnti, .. } => self.admit(cell, tc_rnti),
            SchedulerEvent::RadioLinkFailure { cell, rnti, slot, .. } => self.release(cell, rnti, slot),
        }
    }

    fn admit(&mut self, cell: CellIndex, rnti: Rnti) {
        if self.ues.len() >= self.sim.max_ues as usize {
            self.stats.nof_rejected += 1;
            debug!(%cell, %rnti, max_ues = self.sim.max_ues, "UE limit reached, Msg3 ignored");
            return;
        }
        if self.ues.contains_key(&rnti) {
            warn!(%cell, %rnti, "Msg3 for an RNTI already in use");
            return;
        }

        let result = self
            .send(cell, CellIndication::AddUe(UeCreationRequest::after_msg3(rnti, cell)))
            .and_then(|()| {
                self.send(
                    cell,
                    CellIndication::DlBufferState(DlBufferState {
                        rnti,
                        lcid: Lcid::SRB0,
                        pending_bytes: RRC_SETUP_BYTES,
                    }),
                )
            });
        match result {
            Ok(()) => {
                self.ues.insert(rnti, cell);
                self.stats.nof_admitted += 1;
                info!(%cell, %rnti, nof_ues = self.ues.len(), "UE admitted");
            }
            Err(e) => warn!(%cell, %rnti, "UE admission failed: {e}"),
        }
    }

    fn release(&mut self, cell: CellIndex, rnti: Rnti, slot: SlotPoint) {
        if self.ues.remove(&rnti).is_none() {
            debug!(%cell, %rnti, "RLF for an unknown UE");
            return;
        }
        self.stats.nof_rlfs += 1;
        info!(%cell, %rnti, %slot, "Radio link failure, UE released");
        if let Err(e) = self.send(cell, CellIndication::RemoveUe(rnti)) {
            warn!(%cell, %rnti, "UE removal failed: {e}");
        }
    }

    fn handle_slot_tick(&mut self, cell: CellIndex, slot: SlotPoint) {
        let period = self.sim.traffic_period_slots;
        if period == 0 || slot.count() % period != 0 {
            return;
        }
        let rntis: Vec<Rnti> = self
            .ues
            .iter()
            .filter(|(_, c)| **c == cell)
            .map(|(rnti, _)| *rnti)
            .collect();
        for rnti in rntis {
            if self.sim.dl_traffic_bytes > 0 {
                let _ = self
                    .send(
                        cell,
                        CellIndication::DlBufferState(DlBufferState {
                            rnti,
                            lcid: Lcid::DRB1,
                            pending_bytes: self.sim.dl_traffic_bytes,
                        }),
                    )
                    .map_err(|e| debug!(%cell, %rnti, "DL buffer state dropped: {e}"));
            }
            if self.sim.ul_traffic_bytes > 0 {
                let _ = self
                    .send(
                        cell,
                        CellIndication::UlBsr(UlBsrIndication {
                            rnti,
                            reports: vec![(Lcg(1), self.sim.ul_traffic_bytes)],
                        }),
                    )
                    .map_err(|e| debug!(%cell, %rnti, "BSR dropped: {e}"));
            }
        }
    }
}

#[async_trait::async_trait]
impl Task for UeManagerTask {
    type Message = UeManagerMessage;

    async fn run(&mut self, mut rx: mpsc::Receiver<TaskMessage<Self::Message>>) {
        info!(max_ues = self.sim.max_ues, "UE manager task started");

        loop {
            match rx.recv().await {
                Some(TaskMessage::Message(msg)) => match msg {
                    UeManagerMessage::SchedulerEvent(event) => self.handle_event(event),
                    UeManagerMessage::SlotTick { cell, slot } => self.handle_slot_tick(cell, slot),
                },
                Some(TaskMessage::Shutdown) => {
                    info!("UE manager task received shutdown signal");
                    break;
                }
                None => {
                    info!("UE manager task channel closed");
                    break;
                }
            }
        }

        info!(
            admitted = self.stats.nof_admitted,
            rejected = self.stats.nof_rejected,
            rlfs = self.stats.nof_rlfs,
            nof_ues = self.ues.len(),
            "UE manager task stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{TaskManager, DEFAULT_CHANNEL_CAPACITY};
    use nextgsim_common::config::GnbConfig;
    use nextgsim_common::{SubcarrierSpacing, UeIndex};
    use nextgsim_sched::{CellConfiguration, CellScheduler};

    fn setup(max_ues: u16) -> (UeManagerTask, CellScheduler) {
        let mut config = GnbConfig::default();
        config.simulation.max_ues = max_ues;
        config.simulation.traffic_period_slots = 10;
        let (manager, _receivers) = TaskManager::new(config.clone(), DEFAULT_CHANNEL_CAPACITY);
        let cfg = CellConfiguration::new(CellIndex(0), &config.cells[0], &config.scheduler).unwrap();
        let mut sched = CellScheduler::without_notifiers(cfg);
        sched.start();
        let task = UeManagerTask::new(&manager.task_base(), vec![sched.indication_sender()]);
        (task, sched)
    }

    fn msg3(rnti: u16) -> SchedulerEvent {
        SchedulerEvent::Msg3Received {
            cell: CellIndex(0),
            tc_rnti: Rnti::new(rnti),
            preamble_id: 1,
            slot: SlotPoint::new(SubcarrierSpacing::Khz15, 0),
        }
    }

    fn slot(n: u32) -> SlotPoint {
        SlotPoint::new(SubcarrierSpacing::Khz15, n)
    }

    #[test]
    fn test_msg3_admits_ue_with_rrc_setup() {
        let (mut task, mut sched) = setup(4);
        task.handle_event(msg3(0x4601));
        sched.run_slot(slot(0));
        assert!(sched.ue(Rnti::new(0x4601)).is_some());
        assert_eq!(task.stats().nof_admitted, 1);
    }

    #[test]
    fn test_ue_limit_is_enforced() {
        let (mut task, _sched) = setup(1);
        task.handle_event(msg3(0x4601));
        task.handle_event(msg3(0x4602));
        assert_eq!(task.nof_ues(), 1);
        assert_eq!(task.stats().nof_rejected, 1);
    }

    #[test]
    fn test_rlf_removes_ue() {
        let (mut task, mut sched) = setup(4);
        task.handle_event(msg3(0x4601));
        sched.run_slot(slot(0));
        task.handle_event(SchedulerEvent::RadioLinkFailure {
            cell: CellIndex(0),
            ue_index: UeIndex(0),
            rnti: Rnti::new(0x4601),
            slot: slot(0),
        });
        sched.run_slot(slot(1));
        assert!(sched.ue(Rnti::new(0x4601)).is_none());
        assert_eq!(task.nof_ues(), 0);
        assert_eq!(task.stats().nof_rlfs, 1);
    }

    #[test]
    fn test_traffic_every_period() {
        let (mut task, mut sched) = setup(4);
        task.handle_event(msg3(0x4601));
        sched.run_slot(slot(0));
        task.handle_slot_tick(CellIndex(0), slot(5));
        sched.run_slot(slot(1));
        assert_eq!(sched.ue(Rnti::new(0x4601)).map(|ue| ue.ul_pending_bytes()), Some(0));
        assert_eq!(sched.metrics().ul_bytes, 0);

        task.handle_slot_tick(CellIndex(0), slot(10));
        sched.run_slot(slot(2));
        let ue = sched.ue(Rnti::new(0x4601)).unwrap();
        // Either still reported or already granted
        assert!(ue.ul_pending_bytes() > 0 || sched.metrics().ul_bytes > 0);
    }
}
