//! Slot-driving harness around one cell scheduler
//!
//! `SchedulerTestEnv` owns a started `CellScheduler`, records its events and
//! metrics reports, and advances one slot per `run_slot` call. With a
//! loopback PHY attached, the CRC/UCI/RACH feedback of every result is queued
//! before the next slot runs, the way the PHY task does in the gNB.

use std::sync::Arc;

use nextgsim_common::config::{CellConfig, SchedulerExpertConfig, SimulationConfig};
use nextgsim_common::{CellIndex, Lcg, Lcid, Rnti, SlotPoint};
use nextgsim_gnb::LoopbackPhy;
use nextgsim_sched::{
    CellIndication, CellIndicationSender, CellScheduler, ChannelMetricsNotifier, DetectedPreamble, DlBufferState,
    RachIndication, RecordingEventNotifier, SchedResult, SchedulerCellMetrics, SchedulerEvent, UeCreationRequest,
    UlBsrIndication,
};
use tokio::sync::mpsc;

const METRICS_QUEUE_SIZE: usize = 256;

/// Channel where every transmission succeeds and no preamble is sent.
pub fn perfect_channel(seed: u64) -> SimulationConfig {
    SimulationConfig {
        seed,
        dl_bler: 0.0,
        ul_bler: 0.0,
        rach_probability: 0.0,
        ..SimulationConfig::default()
    }
}

/// Channel where every transmission fails.
pub fn broken_channel(seed: u64) -> SimulationConfig {
    SimulationConfig {
        seed,
        dl_bler: 1.0,
        ul_bler: 1.0,
        rach_probability: 0.0,
        ..SimulationConfig::default()
    }
}

/// One started cell scheduler and its recorded outputs.
pub struct SchedulerTestEnv {
    sched: CellScheduler,
    sender: CellIndicationSender,
    events: RecordingEventNotifier,
    metrics_rx: mpsc::Receiver<SchedulerCellMetrics>,
    phy: Option<LoopbackPhy>,
    next_slot: SlotPoint,
}

impl SchedulerTestEnv {
    /// Starts a scheduler for cell 0. Panics on an invalid configuration.
    pub fn new(cell: &CellConfig, expert: &SchedulerExpertConfig) -> Self {
        let events = RecordingEventNotifier::new();
        let (metrics_tx, metrics_rx) = mpsc::channel(METRICS_QUEUE_SIZE);
        let mut sched = CellScheduler::from_config(
            CellIndex(0),
            cell,
            expert,
            Box::new(events.clone()),
            Box::new(ChannelMetricsNotifier::new(metrics_tx)),
        )
        .expect("invalid cell configuration");
        assert!(sched.start());
        let sender = sched.indication_sender();
        let next_slot = SlotPoint::new(cell.scs, 0);
        Self {
            sched,
            sender,
            events,
            metrics_rx,
            phy: None,
            next_slot,
        }
    }

    /// Attaches a loopback PHY answering every result.
    pub fn with_loopback_phy(mut self, sim: SimulationConfig) -> Self {
        self.phy = Some(LoopbackPhy::new(&sim, CellIndex(0)));
        self
    }

    pub fn scheduler(&self) -> &CellScheduler {
        &self.sched
    }

    pub fn scheduler_mut(&mut self) -> &mut CellScheduler {
        &mut self.sched
    }

    /// Slot the next `run_slot` processes.
    pub fn next_slot(&self) -> SlotPoint {
        self.next_slot
    }

    /// Queues an indication. Panics if the queue rejects it.
    pub fn send(&self, indication: CellIndication) {
        self.sender.send(indication).expect("indication rejected");
    }

    /// Creates a connected UE.
    pub fn add_ue(&self, rnti: Rnti) {
        self.send(CellIndication::AddUe(UeCreationRequest::new(rnti, CellIndex(0))));
    }

    /// Reports `bytes` pending on DRB1 of `rnti`.
    pub fn dl_data(&self, rnti: Rnti, bytes: u32) {
        self.send(CellIndication::DlBufferState(DlBufferState {
            rnti,
            lcid: Lcid::DRB1,
            pending_bytes: bytes,
        }));
    }

    /// Reports `bytes` pending in the LCG of DRB1 of `rnti`.
    pub fn ul_data(&self, rnti: Rnti, bytes: u32) {
        self.send(CellIndication::UlBsr(UlBsrIndication {
            rnti,
            reports: vec![(Lcg(1), bytes)],
        }));
    }

    /// Reports the detection of `preamble_ids` in the first PRACH occasion of
    /// `result`.
    pub fn send_rach(&self, result: &SchedResult, preamble_ids: &[u8]) {
        let occasion = result.ul.prachs.first().expect("no PRACH occasion in this slot");
        self.send(CellIndication::Rach(RachIndication {
            slot: result.slot,
            start_symbol: occasion.region.symbols.start(),
            freq_index: 0,
            preambles: preamble_ids
                .iter()
                .map(|&preamble_id| DetectedPreamble {
                    preamble_id,
                    timing_advance: 0,
                })
                .collect(),
        }));
    }

    /// Runs the next slot and queues the loopback feedback of its result.
    pub fn run_slot(&mut self) -> Arc<SchedResult> {
        let slot = self.next_slot;
        self.next_slot += 1;
        let result = self.sched.run_slot(slot).expect("scheduler did not run");
        if let Some(phy) = self.phy.as_mut() {
            for indication in phy.process(&result) {
                self.sender.send(indication).expect("feedback rejected");
            }
        }
        result
    }

    /// Runs `n` slots.
    pub fn run_slots(&mut self, n: u32) -> Vec<Arc<SchedResult>> {
        (0..n).map(|_| self.run_slot()).collect()
    }

    /// Runs slots until one satisfies `pred`, at most `max_slots`.
    pub fn run_until(&mut self, max_slots: u32, mut pred: impl FnMut(&SchedResult) -> bool) -> Option<Arc<SchedResult>> {
        for _ in 0..max_slots {
            let result = self.run_slot();
            if pred(&result) {
                return Some(result);
            }
        }
        None
    }

    /// Every event so far.
    pub fn events(&self) -> Vec<SchedulerEvent> {
        self.events.events()
    }

    /// RLF events so far.
    pub fn rlf_events(&self) -> Vec<SchedulerEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, SchedulerEvent::RadioLinkFailure { .. }))
            .collect()
    }

    /// Msg3 events so far.
    pub fn msg3_events(&self) -> Vec<SchedulerEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, SchedulerEvent::Msg3Received { .. }))
            .collect()
    }

    /// Metrics reports published since the last call.
    pub fn drain_metrics(&mut self) -> Vec<SchedulerCellMetrics> {
        let mut reports = Vec::new();
        while let Ok(report) = self.metrics_rx.try_recv() {
            reports.push(report);
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::fdd_cell;

    #[test]
    fn test_env_advances_one_slot_per_run() {
        let mut env = SchedulerTestEnv::new(&fdd_cell(), &SchedulerExpertConfig::default());
        let results = env.run_slots(3);
        let slots: Vec<u32> = results.iter().map(|r| r.slot.count()).collect();
        assert_eq!(slots, vec![0, 1, 2]);
        assert_eq!(env.next_slot().count(), 3);
    }

    #[test]
    fn test_env_creates_ues() {
        let mut env = SchedulerTestEnv::new(&fdd_cell(), &SchedulerExpertConfig::default());
        env.add_ue(Rnti::new(0x4601));
        env.add_ue(Rnti::new(0x4602));
        env.run_slot();
        assert_eq!(env.scheduler().nof_ues(), 2);
    }
}
