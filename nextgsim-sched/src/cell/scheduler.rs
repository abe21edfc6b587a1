//! Cell scheduler: the per-slot entry point of one cell
//!
//! Every slot runs the same sequence:
//!
//! 1. check the slot follows the previous one
//! 2. apply queued indications in arrival order
//! 3. advance the slot ring and prepare the UL slots entering it
//!    (PRACH, PUCCH guardbands, periodic SR/CSI)
//! 4. turn overdue HARQ feedback into NACKs
//! 5. common DL channels (SSB, CSI-RS, SIB1, SI, paging)
//! 6. random access (RAR, Msg3 retransmissions)
//! 7. UE DL and UL grants
//! 8. publish the result of the slot
//!
//! The result of slot N is published before slot N+1 starts and is never
//! modified afterwards.

use std::fmt;
use std::sync::Arc;

use nextgsim_common::config::{CellConfig, SchedulerExpertConfig};
use nextgsim_common::{CellIndex, Rnti, SlotPoint, UeIndex};
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn, Span};

use crate::cell::config::{CellConfigError, CellConfiguration};
use crate::cell::indication::{
    indication_channel, CellIndication, CellIndicationSender, CrcIndication, DlBufferState, IndicationError,
    UciIndication, UlBsrIndication,
};
use crate::cell::resource_grid::CellResourceAllocator;
use crate::common::{CommonChannelScheduler, PagingInformation};
use crate::events::{NullEventNotifier, SchedulerEvent, SchedulerEventNotifier};
use crate::metrics::{MetricsCollector, NullMetricsNotifier, SchedulerCellMetrics, SchedulerMetricsNotifier};
use crate::pdcch::PdcchAllocator;
use crate::result::SchedResult;
use crate::result_logger::SchedResultLogger;
use crate::ue::{
    FeedbackSummary, RaScheduler, RachIndication, UeContext, UeCreationRequest, UeReconfigRequest, UeRepository,
    UeScheduler,
};

/// Lifecycle of a cell scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellSchedulerState {
    /// Created, slots are ignored
    #[default]
    Uninitialized,
    /// Processing slots
    Running,
    /// Stop requested, pending indications are being discarded
    Stopping,
    /// Stopped for good
    Stopped,
}

impl fmt::Display for CellSchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellSchedulerState::Uninitialized => write!(f, "Uninitialized"),
            CellSchedulerState::Running => write!(f, "Running"),
            CellSchedulerState::Stopping => write!(f, "Stopping"),
            CellSchedulerState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Scheduler of one cell.
pub struct CellScheduler {
    cfg: Arc<CellConfiguration>,
    state: CellSchedulerState,
    grid: CellResourceAllocator,
    pdcch: PdcchAllocator,
    common: CommonChannelScheduler,
    ra: RaScheduler,
    ue_sched: UeScheduler,
    ues: UeRepository,
    indication_tx: CellIndicationSender,
    indication_rx: mpsc::Receiver<CellIndication>,
    queue_capacity: usize,
    events: Box<dyn SchedulerEventNotifier>,
    metrics_notifier: Box<dyn SchedulerMetricsNotifier>,
    metrics: MetricsCollector,
    result_logger: SchedResultLogger,
    last_slot: Option<SlotPoint>,
    last_prepared: Option<SlotPoint>,
    last_result: Option<Arc<SchedResult>>,
    span: Span,
}

impl fmt::Debug for CellScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellScheduler")
            .field("cell", &self.cfg.cell_index)
            .field("pci", &self.cfg.pci)
            .field("state", &self.state)
            .field("nof_ues", &self.ues.len())
            .field("last_slot", &self.last_slot)
            .finish()
    }
}

impl CellScheduler {
    /// Creates the scheduler of a validated cell configuration.
    pub fn new(
        cfg: CellConfiguration,
        events: Box<dyn SchedulerEventNotifier>,
        metrics_notifier: Box<dyn SchedulerMetricsNotifier>,
    ) -> Self {
        let cfg = Arc::new(cfg);
        let queue_capacity = cfg.expert.indication_queue_capacity.max(1);
        let (indication_tx, indication_rx) = indication_channel(queue_capacity);
        let span = info_span!("cell_scheduler", cell = %cfg.cell_index, pci = cfg.pci);
        Self {
            state: CellSchedulerState::Uninitialized,
            grid: CellResourceAllocator::new(cfg.clone()),
            pdcch: PdcchAllocator::new(cfg.clone()),
            common: CommonChannelScheduler::new(cfg.clone()),
            ra: RaScheduler::new(cfg.clone()),
            ue_sched: UeScheduler::new(cfg.clone()),
            ues: UeRepository::new(cfg.max_nof_ues),
            indication_tx,
            indication_rx,
            queue_capacity,
            events,
            metrics_notifier,
            metrics: MetricsCollector::new(cfg.cell_index, cfg.expert.metrics_report_period_slots),
            result_logger: SchedResultLogger::new(cfg.cell_index),
            last_slot: None,
            last_prepared: None,
            last_result: None,
            span,
            cfg,
        }
    }

    /// Validates `cell` and `expert` and creates the scheduler.
    pub fn from_config(
        cell_index: CellIndex,
        cell: &CellConfig,
        expert: &SchedulerExpertConfig,
        events: Box<dyn SchedulerEventNotifier>,
        metrics_notifier: Box<dyn SchedulerMetricsNotifier>,
    ) -> Result<Self, CellConfigError> {
        let cfg = CellConfiguration::new(cell_index, cell, expert)?;
        Ok(Self::new(cfg, events, metrics_notifier))
    }

    /// Creates a scheduler whose events and metrics are discarded.
    pub fn without_notifiers(cfg: CellConfiguration) -> Self {
        Self::new(cfg, Box::new(NullEventNotifier), Box::new(NullMetricsNotifier))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Starts processing slots. Returns false if the scheduler was already started.
    pub fn start(&mut self) -> bool {
        let _enter = self.span.enter();
        if self.state != CellSchedulerState::Uninitialized {
            warn!(state = %self.state, "start ignored");
            return false;
        }
        self.state = CellSchedulerState::Running;
        info!(
            nof_prbs = self.cfg.nof_prbs,
            scs = %self.cfg.scs,
            tdd = self.cfg.tdd.is_some(),
            "cell scheduler started"
        );
        true
    }

    /// Stops the scheduler. Queued indications are discarded and further
    /// sends fail with `IndicationError::CellStopped`.
    pub fn stop(&mut self) {
        let span = self.span.clone();
        let _enter = span.enter();
        if self.state == CellSchedulerState::Stopped {
            return;
        }
        self.state = CellSchedulerState::Stopping;
        self.indication_rx.close();
        let mut discarded = 0usize;
        while self.indication_rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            warn!(discarded, "indications discarded at stop");
        }
        self.state = CellSchedulerState::Stopped;
        info!(nof_ues = self.ues.len(), "cell scheduler stopped");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CellSchedulerState {
        self.state
    }

    // ========================================================================
    // Inputs
    // ========================================================================

    /// Handle to queue indications from other contexts.
    pub fn indication_sender(&self) -> CellIndicationSender {
        self.indication_tx.clone()
    }

    /// Queues preambles detected in a PRACH occasion.
    pub fn handle_rach_indication(&self, indication: RachIndication) -> Result<(), IndicationError> {
        self.indication_tx.rach(indication)
    }

    /// Queues a PUSCH CRC.
    pub fn handle_crc_indication(&self, indication: CrcIndication) -> Result<(), IndicationError> {
        self.indication_tx.crc(indication)
    }

    /// Queues UCI.
    pub fn handle_uci_indication(&self, indication: UciIndication) -> Result<(), IndicationError> {
        self.indication_tx.uci(indication)
    }

    /// Queues a paging request.
    pub fn handle_paging_information(&self, info: PagingInformation) -> Result<(), IndicationError> {
        self.indication_tx.paging(info)
    }

    /// Queues a DL buffer state update.
    pub fn handle_dl_buffer_state(&self, state: DlBufferState) -> Result<(), IndicationError> {
        self.indication_tx.dl_buffer_state(state)
    }

    /// Queues a BSR.
    pub fn handle_ul_bsr(&self, indication: UlBsrIndication) -> Result<(), IndicationError> {
        self.indication_tx.ul_bsr(indication)
    }

    /// Queues the creation of a UE.
    pub fn add_ue(&self, request: UeCreationRequest) -> Result<(), IndicationError> {
        self.indication_tx.send(CellIndication::AddUe(request))
    }

    /// Queues the reconfiguration of a UE.
    pub fn reconfigure_ue(&self, rnti: Rnti, request: UeReconfigRequest) -> Result<(), IndicationError> {
        self.indication_tx.send(CellIndication::ReconfigureUe { rnti, request })
    }

    /// Queues the removal of a UE.
    pub fn remove_ue(&self, rnti: Rnti) -> Result<(), IndicationError> {
        self.indication_tx.send(CellIndication::RemoveUe(rnti))
    }

    /// Queues new scheduler expert parameters.
    pub fn update_expert_config(&self, expert: SchedulerExpertConfig) -> Result<(), IndicationError> {
        self.indication_tx.send(CellIndication::UpdateExpertConfig(expert))
    }

    // ========================================================================
    // Outputs
    // ========================================================================

    /// Result of the last processed slot.
    pub fn last_result(&self) -> Option<&SchedResult> {
        self.last_result.as_deref()
    }

    /// Result of the last processed slot, shareable with other contexts.
    pub fn last_result_shared(&self) -> Option<Arc<SchedResult>> {
        self.last_result.clone()
    }

    /// Current cell configuration.
    pub fn config(&self) -> &Arc<CellConfiguration> {
        &self.cfg
    }

    /// Number of UEs.
    pub fn nof_ues(&self) -> usize {
        self.ues.len()
    }

    /// UE context by RNTI.
    pub fn ue(&self, rnti: Rnti) -> Option<&UeContext> {
        self.ues.find_by_rnti(rnti).and_then(|idx| self.ues.get(idx))
    }

    /// Random access scheduler state.
    pub fn ra(&self) -> &RaScheduler {
        &self.ra
    }

    /// Counters of the running metrics period.
    pub fn metrics(&self) -> &SchedulerCellMetrics {
        self.metrics.current()
    }

    /// Slot ring, for inspection.
    pub fn resource_grid(&self) -> &CellResourceAllocator {
        &self.grid
    }

    // ========================================================================
    // Slot processing
    // ========================================================================

    /// Alias of `run_slot` named after the PHY slot indication.
    pub fn handle_slot_indication(&mut self, slot_tx: SlotPoint) -> Option<Arc<SchedResult>> {
        self.run_slot(slot_tx)
    }

    /// Schedules `slot_tx`. Returns `None` when the scheduler is not running
    /// or the slot does not follow the previous one.
    pub fn run_slot(&mut self, slot_tx: SlotPoint) -> Option<Arc<SchedResult>> {
        let span = self.span.clone();
        let _enter = span.enter();

        if self.state != CellSchedulerState::Running {
            debug!(slot = %slot_tx, state = %self.state, "slot ignored");
            return None;
        }
        if let Some(last) = self.last_slot {
            let delta = slot_tx - last;
            if delta <= 0 {
                warn!(slot = %slot_tx, last = %last, "slot does not follow the previous one, skipped");
                self.metrics.record_late_slot();
                return None;
            }
            if delta > 1 {
                warn!(slot = %slot_tx, last = %last, missed = delta - 1, "slots missed");
                for missed in 1..delta {
                    self.metrics.record_late_slot();
                    let outcome = self.common.skip_slot(last + missed as u32);
                    self.metrics.record_common(&outcome);
                }
            }
        }
        self.last_slot = Some(slot_tx);

        self.drain_indications(slot_tx);

        self.grid.slot_indication(slot_tx);
        self.prepare_entering_slots(slot_tx);
        self.check_feedback_timeouts(slot_tx);

        if let Ok(res) = self.grid.get_mut(slot_tx) {
            let outcome = self.common.schedule_dl(res, &self.pdcch);
            self.metrics.record_common(&outcome);
        }

        let ra_outcome = self.ra.run_slot(&mut self.grid, &self.pdcch, slot_tx);
        self.metrics.record_ra(&ra_outcome);

        let ue_outcome = self.ue_sched.run_slot(&mut self.grid, &mut self.ues, slot_tx);
        self.metrics.record_ue(&ue_outcome);

        self.publish(slot_tx)
    }

    fn publish(&mut self, slot_tx: SlotPoint) -> Option<Arc<SchedResult>> {
        let result = match self.grid.get(slot_tx) {
            Ok(res) => Arc::new(res.result.clone()),
            Err(err) => {
                warn!(slot = %slot_tx, "no result to publish: {err}");
                return None;
            }
        };
        self.result_logger.log(&result);

        let dl_prbs_available = if self.cfg.is_dl_slot(slot_tx) {
            self.cfg.pdsch_prb_limits().length()
        } else {
            0
        };
        if let Some(report) = self.metrics.end_slot(&result, dl_prbs_available, self.ues.len()) {
            self.metrics_notifier.report(report);
        }

        self.last_result = Some(result.clone());
        Some(result)
    }

    /// Reserves PRACH, guardbands and periodic UCI in every UL slot that
    /// entered the window since the last call.
    fn prepare_entering_slots(&mut self, slot_tx: SlotPoint) {
        let horizon = slot_tx + (self.grid.ring_size() - 1);
        let mut slot = match self.last_prepared {
            Some(prepared) if prepared - slot_tx >= 0 => prepared + 1,
            _ => slot_tx,
        };
        while horizon - slot >= 0 {
            if let Ok(res) = self.grid.get_mut(slot) {
                self.common.prepare_ul_slot(res);
                let ucis = self.ue_sched.schedule_periodic_ucis(res, &self.ues);
                self.metrics.record_pucch_failures(ucis.nof_failures);
            }
            slot += 1;
        }
        self.last_prepared = Some(horizon);
    }

    fn check_feedback_timeouts(&mut self, now: SlotPoint) {
        let summaries = self.ue_sched.check_feedback_timeouts(&mut self.ues, now);
        for (ue_index, summary) in summaries {
            self.apply_feedback(ue_index, summary, now);
        }
    }

    fn apply_feedback(&mut self, ue_index: UeIndex, summary: FeedbackSummary, now: SlotPoint) {
        self.metrics
            .record_feedback(summary.nof_acks, summary.nof_nacks, summary.nof_harq_failures);
        if !summary.radio_link_failure {
            return;
        }
        let Some(ue) = self.ues.get(ue_index) else {
            return;
        };
        warn!(rnti = %ue.rnti(), ue = %ue_index, slot = %now, "radio link failure");
        self.events.notify(SchedulerEvent::RadioLinkFailure {
            cell: self.cfg.cell_index,
            ue_index,
            rnti: ue.rnti(),
            slot: now,
        });
    }

    // ========================================================================
    // Indications
    // ========================================================================

    fn drain_indications(&mut self, now: SlotPoint) {
        // Indications queued while draining wait for the next slot.
        for _ in 0..self.queue_capacity {
            match self.indication_rx.try_recv() {
                Ok(indication) => self.apply_indication(indication, now),
                Err(_) => break,
            }
        }
    }

    fn apply_indication(&mut self, indication: CellIndication, now: SlotPoint) {
        match indication {
            CellIndication::Rach(rach) => {
                let ues = &self.ues;
                self.ra.handle_rach_indication(&rach, |rnti| ues.contains_rnti(rnti));
            }
            CellIndication::Crc(crc) => self.apply_crc(crc, now),
            CellIndication::Uci(uci) => self.apply_uci(uci, now),
            CellIndication::Paging(info) => {
                self.common.paging_mut().handle_paging_information(info);
            }
            CellIndication::DlBufferState(state) => {
                let Some(ue) = self.find_ue_mut(state.rnti, "DL buffer state") else {
                    return;
                };
                if let Err(err) = ue.handle_dl_buffer_state(state.lcid, state.pending_bytes) {
                    warn!("DL buffer state dropped: {err}");
                }
            }
            CellIndication::UlBsr(bsr) => {
                let Some(ue) = self.find_ue_mut(bsr.rnti, "BSR") else {
                    return;
                };
                for (lcg, bytes) in bsr.reports {
                    if let Err(err) = ue.handle_bsr(lcg, bytes) {
                        warn!("BSR entry dropped: {err}");
                    }
                }
            }
            CellIndication::AddUe(request) => match self.ues.add(&request, &self.cfg) {
                Ok(ue_index) => info!(rnti = %request.rnti, ue = %ue_index, "UE added"),
                Err(err) => warn!(rnti = %request.rnti, "UE not added: {err}"),
            },
            CellIndication::ReconfigureUe { rnti, request } => {
                let Some(ue) = self.find_ue_mut(rnti, "reconfiguration") else {
                    return;
                };
                match ue.reconfigure(&request) {
                    Ok(()) => info!(%rnti, "UE reconfigured"),
                    Err(err) => warn!(%rnti, "UE reconfiguration rejected: {err}"),
                }
            }
            CellIndication::RemoveUe(rnti) => match self.ues.find_by_rnti(rnti) {
                Some(ue_index) => {
                    self.ues.remove(ue_index);
                    info!(%rnti, ue = %ue_index, "UE removed");
                }
                None => warn!(%rnti, "removal of unknown UE dropped"),
            },
            CellIndication::UpdateExpertConfig(expert) => self.apply_expert_config(&expert),
        }
    }

    fn find_ue_mut(&mut self, rnti: Rnti, what: &str) -> Option<&mut UeContext> {
        let ue = self.ues.find_by_rnti(rnti).and_then(|idx| self.ues.get_mut(idx));
        if ue.is_none() {
            warn!(%rnti, "{what} for unknown UE dropped");
        }
        ue
    }

    fn apply_crc(&mut self, crc: CrcIndication, now: SlotPoint) {
        if self.ra.has_msg3(crc.rnti) {
            if let Some(msg3) = self.ra.handle_crc(crc.rnti, crc.ok, now) {
                self.events.notify(SchedulerEvent::Msg3Received {
                    cell: self.cfg.cell_index,
                    tc_rnti: msg3.tc_rnti,
                    preamble_id: msg3.preamble_id,
                    slot: msg3.slot,
                });
            }
            return;
        }
        let Some(ue_index) = self.ues.find_by_rnti(crc.rnti) else {
            warn!(rnti = %crc.rnti, "CRC for unknown UE dropped");
            return;
        };
        let Some(ue) = self.ues.get_mut(ue_index) else {
            return;
        };
        if let Some(snr) = crc.ul_snr_db {
            ue.set_ul_snr_db(snr);
        }
        let summary = self.ue_sched.handle_crc(ue, crc.harq_id, crc.ok, now);
        self.apply_feedback(ue_index, summary, now);
    }

    fn apply_uci(&mut self, uci: UciIndication, now: SlotPoint) {
        let Some(ue_index) = self.ues.find_by_rnti(uci.rnti) else {
            warn!(rnti = %uci.rnti, "UCI for unknown UE dropped");
            return;
        };
        let Some(ue) = self.ues.get_mut(ue_index) else {
            return;
        };
        if let Some(cqi) = uci.cqi {
            ue.set_cqi(cqi);
        }
        if uci.sr {
            ue.handle_sr();
        }
        if uci.harq_acks.is_empty() {
            return;
        }
        let summary = self.ue_sched.handle_harq_acks(ue, uci.slot, &uci.harq_acks, now);
        self.apply_feedback(ue_index, summary, now);
    }

    fn apply_expert_config(&mut self, expert: &SchedulerExpertConfig) {
        if expert.ring_size != self.cfg.expert.ring_size {
            warn!(
                current = self.cfg.expert.ring_size,
                requested = expert.ring_size,
                "slot ring size cannot change at runtime, update rejected"
            );
            return;
        }
        let cfg = match self.cfg.with_expert_config(expert) {
            Ok(cfg) => Arc::new(cfg),
            Err(err) => {
                warn!("expert configuration rejected: {err}");
                return;
            }
        };
        self.pdcch = PdcchAllocator::new(cfg.clone());
        self.common.set_config(cfg.clone());
        self.ra.set_config(cfg.clone());
        self.ue_sched.set_config(cfg.clone());
        for ue in self.ues.iter_mut() {
            ue.apply_expert_config(expert);
        }
        self.metrics.set_period(expert.metrics_report_period_slots);
        self.cfg = cfg;
        info!(policy = ?expert.policy, "expert configuration updated");
    }
}
