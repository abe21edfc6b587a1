//! Per-slot DL and UL grant allocation
//!
//! Each direction runs a retransmission pass (oldest NACK first, then UE
//! index, then HARQ id) followed by a new-data pass in the order chosen by the
//! scheduling policy. A grant is built step by step (PRBs, PDCCH, HARQ-ACK or
//! PUSCH slot) and every reservation made so far is undone when a later step
//! fails, so a failed UE leaves no trace in the grid.

use std::sync::Arc;

use nextgsim_common::{HarqId, LinkDirection, SlotPoint, UeIndex};
use tracing::{debug, trace, warn};

use crate::cell::config::CellConfiguration;
use crate::cell::resource_grid::{
    CellResourceAllocator, Channel, GridRegion, Multiplexing, PrbInterval, SlotGrid, SlotResources, SymbolInterval,
};
use crate::pdcch::{PdcchAllocator, PdcchRequest};
use crate::result::{DciKind, DlUeGrant, PdcchAllocation, PdschInfo, UlGrant};
use crate::uci::{PeriodicUciConfig, PeriodicUciOutcome, UciAllocator};
use crate::ue::context::{UeContext, LOWEST_LC_PRIORITY};
use crate::ue::harq::HarqFeedbackOutcome;
use crate::ue::mcs::{prbs_for_bytes, tbs_bytes};
use crate::ue::policy::{create_policy, PolicyCandidate, SchedulingPolicy};
use crate::ue::repository::UeRepository;

/// Counters of one UE scheduling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UeSlotOutcome {
    /// New DL transmissions
    pub nof_dl_new_txs: u32,
    /// DL retransmissions
    pub nof_dl_retxs: u32,
    /// New UL transmissions
    pub nof_ul_new_txs: u32,
    /// UL retransmissions
    pub nof_ul_retxs: u32,
    /// Grants that found no PDCCH candidate
    pub nof_pdcch_failures: u32,
    /// DL grants that found no HARQ-ACK resource
    pub nof_pucch_failures: u32,
    /// Bytes of new DL transport blocks
    pub dl_bytes: u64,
    /// Bytes of new UL transport blocks
    pub ul_bytes: u64,
}

/// Result of applying HARQ feedback for one UE.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedbackSummary {
    /// Positive acknowledgements
    pub nof_acks: u32,
    /// Negative acknowledgements, timeouts included
    pub nof_nacks: u32,
    /// Processes that reached the retransmission ceiling
    pub nof_harq_failures: u32,
    /// Set the first time a process of the UE fails
    pub radio_link_failure: bool,
}

impl FeedbackSummary {
    fn record(&mut self, ue: &mut UeContext, direction: LinkDirection, harq_id: HarqId, outcome: HarqFeedbackOutcome) {
        match outcome {
            HarqFeedbackOutcome::Acked { .. } => {
                self.nof_acks += 1;
                ue.record_harq_feedback(direction, true);
            }
            HarqFeedbackOutcome::Nacked => {
                self.nof_nacks += 1;
                ue.record_harq_feedback(direction, false);
            }
            HarqFeedbackOutcome::MaxRetxReached => {
                self.nof_nacks += 1;
                self.nof_harq_failures += 1;
                ue.record_harq_feedback(direction, false);
                warn!(rnti = %ue.rnti(), %direction, harq = %harq_id, "HARQ retransmission ceiling reached");
                if ue.mark_rlf_reported() {
                    self.radio_link_failure = true;
                }
            }
            HarqFeedbackOutcome::Ignored => {}
        }
    }

    /// Adds the counters of `other`.
    pub fn merge(&mut self, other: FeedbackSummary) {
        self.nof_acks += other.nof_acks;
        self.nof_nacks += other.nof_nacks;
        self.nof_harq_failures += other.nof_harq_failures;
        self.radio_link_failure |= other.radio_link_failure;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxKind {
    New,
    Retx(HarqId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GrantFailure {
    NoHarq,
    NoResources,
    Pdcch,
    Uci,
}

/// UE scheduler of one cell.
#[derive(Debug)]
pub struct UeScheduler {
    cfg: Arc<CellConfiguration>,
    pdcch: PdcchAllocator,
    uci: UciAllocator,
    policy: Box<dyn SchedulingPolicy>,
}

impl UeScheduler {
    /// Creates the scheduler with the policy selected in the expert configuration.
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        Self {
            pdcch: PdcchAllocator::new(cfg.clone()),
            uci: UciAllocator::new(cfg.clone()),
            policy: create_policy(&cfg.expert),
            cfg,
        }
    }

    /// Replaces the cell configuration. The policy is rebuilt if its kind changed.
    pub fn set_config(&mut self, cfg: Arc<CellConfiguration>) {
        if cfg.expert.policy != self.policy.kind() {
            self.policy = create_policy(&cfg.expert);
        }
        self.pdcch = PdcchAllocator::new(cfg.clone());
        self.uci = UciAllocator::new(cfg.clone());
        self.cfg = cfg;
    }

    /// Active policy.
    pub fn policy(&self) -> &dyn SchedulingPolicy {
        self.policy.as_ref()
    }

    /// Places the SR and CSI occasions of every UE in a newly prepared UL slot.
    pub fn schedule_periodic_ucis(&self, res: &mut SlotResources, ues: &UeRepository) -> PeriodicUciOutcome {
        if !self.cfg.is_ul_slot(res.slot) {
            return PeriodicUciOutcome::default();
        }
        let configs: Vec<PeriodicUciConfig> = ues
            .iter()
            .filter(|ue| !ue.rlf_reported())
            .map(|ue| *ue.uci_config())
            .collect();
        self.uci.schedule_periodic_ucis(res, &configs)
    }

    /// Runs the DL and UL passes for `slot_tx`.
    pub fn run_slot(
        &mut self,
        grid: &mut CellResourceAllocator,
        ues: &mut UeRepository,
        slot_tx: SlotPoint,
    ) -> UeSlotOutcome {
        let mut outcome = UeSlotOutcome::default();
        let mut dl_served = vec![0u32; ues.capacity()];
        let mut ul_served = vec![0u32; ues.capacity()];

        // Both directions need a PDCCH in slot_tx.
        if self.cfg.is_dl_slot(slot_tx) {
            self.schedule_dl(grid, ues, slot_tx, &mut outcome, &mut dl_served);
            self.schedule_ul(grid, ues, slot_tx, &mut outcome, &mut ul_served);
        }

        let ewma = self.cfg.expert.pf_tput_ewma_coeff;
        for ue in ues.iter_mut() {
            let index = ue.ue_index().as_usize();
            ue.update_avg_throughput(LinkDirection::Downlink, dl_served[index], ewma);
            ue.update_avg_throughput(LinkDirection::Uplink, ul_served[index], ewma);
        }
        outcome
    }

    // ------------------------------------------------------------------
    // Feedback
    // ------------------------------------------------------------------

    /// Applies the HARQ-ACK bits reported for `slot` to the DL processes
    /// expecting feedback there, in HARQ id order.
    pub fn handle_harq_acks(&self, ue: &mut UeContext, slot: SlotPoint, acks: &[bool], now: SlotPoint) -> FeedbackSummary {
        let mut summary = FeedbackSummary::default();
        let expected = ue.dl_harq.awaiting_feedback_at(slot);
        if expected.len() != acks.len() {
            debug!(
                rnti = %ue.rnti(),
                %slot,
                expected = expected.len(),
                reported = acks.len(),
                "HARQ-ACK bit count mismatch"
            );
        }
        for (harq_id, ack) in expected.into_iter().zip(acks.iter().copied()) {
            let Some(harq) = ue.dl_harq.get_mut(harq_id) else {
                continue;
            };
            let outcome = harq.feedback(ack, now);
            summary.record(ue, LinkDirection::Downlink, harq_id, outcome);
        }
        summary
    }

    /// Applies the CRC of an UL transport block.
    pub fn handle_crc(&self, ue: &mut UeContext, harq_id: HarqId, ok: bool, now: SlotPoint) -> FeedbackSummary {
        let mut summary = FeedbackSummary::default();
        let Some(harq) = ue.ul_harq.get_mut(harq_id) else {
            warn!(rnti = %ue.rnti(), harq = %harq_id, "CRC for unknown HARQ process");
            return summary;
        };
        let outcome = harq.feedback(ok, now);
        if outcome == HarqFeedbackOutcome::Ignored {
            debug!(rnti = %ue.rnti(), harq = %harq_id, "CRC for a process not waiting for feedback");
        }
        summary.record(ue, LinkDirection::Uplink, harq_id, outcome);
        summary
    }

    /// Treats overdue HARQ feedback as NACK for every UE.
    pub fn check_feedback_timeouts(&self, ues: &mut UeRepository, now: SlotPoint) -> Vec<(UeIndex, FeedbackSummary)> {
        let timeout = self.cfg.expert.harq_feedback_timeout_slots;
        let mut summaries = Vec::new();
        for ue in ues.iter_mut() {
            let mut summary = FeedbackSummary::default();
            for (harq_id, outcome) in ue.dl_harq.check_timeouts(now, timeout) {
                debug!(rnti = %ue.rnti(), harq = %harq_id, "DL HARQ feedback timeout");
                summary.record(ue, LinkDirection::Downlink, harq_id, outcome);
            }
            for (harq_id, outcome) in ue.ul_harq.check_timeouts(now, timeout) {
                debug!(rnti = %ue.rnti(), harq = %harq_id, "UL CRC timeout");
                summary.record(ue, LinkDirection::Uplink, harq_id, outcome);
            }
            if summary != FeedbackSummary::default() {
                summaries.push((ue.ue_index(), summary));
            }
        }
        summaries
    }

    // ------------------------------------------------------------------
    // Downlink
    // ------------------------------------------------------------------

    fn schedule_dl(
        &mut self,
        grid: &mut CellResourceAllocator,
        ues: &mut UeRepository,
        slot_tx: SlotPoint,
        outcome: &mut UeSlotOutcome,
        served: &mut [u32],
    ) {
        let max_grants = self.cfg.expert.max_dl_grants_per_slot as u32;
        let mut nof_grants = 0;

        let mut retxs: Vec<(i32, UeIndex, HarqId)> = ues
            .iter()
            .filter(|ue| !ue.rlf_reported())
            .flat_map(|ue| {
                ue.dl_harq
                    .pending_retxs()
                    .map(move |h| (h.retx_pending_since().map_or(0, |since| slot_tx - since), ue.ue_index(), h.id()))
            })
            .collect();
        retxs.sort_by_key(|(age, ue, harq)| (-age, *ue, *harq));

        for (_, ue_index, harq_id) in retxs {
            if nof_grants >= max_grants {
                return;
            }
            let Some(ue) = ues.get_mut(ue_index) else {
                continue;
            };
            if ue.last_grant(LinkDirection::Downlink) == Some(slot_tx) {
                continue;
            }
            match self.allocate_dl(grid, ue, slot_tx, TxKind::Retx(harq_id)) {
                Ok(_) => {
                    nof_grants += 1;
                    outcome.nof_dl_retxs += 1;
                }
                Err(failure) => count_failure(outcome, failure),
            }
        }

        let nof_symbols = self.cfg.pdsch_symbols.length();
        let exponent = self.cfg.expert.lc_priority_weight_exponent;
        let candidates: Vec<PolicyCandidate> = ues
            .iter()
            .filter(|ue| {
                !ue.rlf_reported()
                    && ue.dl_pending_bytes() > 0
                    && ue.dl_harq.find_empty().is_some()
                    && ue.last_grant(LinkDirection::Downlink) != Some(slot_tx)
            })
            .map(|ue| {
                let backlog = ue.dl_weighted_backlog(exponent);
                PolicyCandidate {
                    ue_index: ue.ue_index(),
                    bytes_per_prb: tbs_bytes(ue.dl_mcs(), 1, nof_symbols) as f64,
                    avg_throughput: ue.avg_throughput(LinkDirection::Downlink),
                    weighted_backlog: backlog.bytes,
                    top_lc_priority: backlog.top_priority.unwrap_or(LOWEST_LC_PRIORITY),
                }
            })
            .collect();
        if candidates.is_empty() {
            return;
        }

        for ue_index in self.policy.order(LinkDirection::Downlink, &candidates) {
            if nof_grants >= max_grants {
                return;
            }
            let Some(ue) = ues.get_mut(ue_index) else {
                continue;
            };
            match self.allocate_dl(grid, ue, slot_tx, TxKind::New) {
                Ok(bytes) => {
                    nof_grants += 1;
                    outcome.nof_dl_new_txs += 1;
                    outcome.dl_bytes += bytes as u64;
                    served[ue_index.as_usize()] += bytes;
                }
                Err(failure) => count_failure(outcome, failure),
            }
        }
    }

    fn allocate_dl(
        &self,
        grid: &mut CellResourceAllocator,
        ue: &mut UeContext,
        slot_tx: SlotPoint,
        kind: TxKind,
    ) -> Result<u32, GrantFailure> {
        let cfg = &self.cfg;
        let symbols = cfg.pdsch_symbols;
        let limits = cfg.pdsch_prb_limits();
        let rnti = ue.rnti();
        let ue_index = ue.ue_index();

        let (harq_id, mcs, wanted_prbs) = match kind {
            TxKind::Retx(harq_id) => {
                let harq = ue.dl_harq.get(harq_id).ok_or(GrantFailure::NoHarq)?;
                (harq_id, harq.mcs(), harq.nof_prbs())
            }
            TxKind::New => {
                let harq_id = ue.dl_harq.find_empty().ok_or(GrantFailure::NoHarq)?;
                let mcs = ue.dl_mcs();
                let max_prbs = cfg.expert.max_ue_dl_prbs.min(limits.length());
                (harq_id, mcs, prbs_for_bytes(ue.dl_pending_bytes(), mcs, symbols.length(), max_prbs))
            }
        };

        let prbs = {
            let res = grid.get(slot_tx).map_err(|_| GrantFailure::NoResources)?;
            select_prbs(&res.dl, symbols, wanted_prbs, limits, Channel::Pdsch, kind == TxKind::New)
                .ok_or(GrantFailure::NoResources)?
        };
        let request = PdcchRequest::ue_specific(rnti, DciKind::DlAssignment, ue.cqi());
        let region = GridRegion::new(symbols, prbs);

        if let Some(harq) = ue.dl_harq.get_mut(harq_id) {
            harq.reserve();
        }

        let mut pdcch_alloc: Option<PdcchAllocation> = None;
        let mut failure = GrantFailure::Uci;
        for &k1 in &cfg.k1_candidates {
            let ack_slot = slot_tx + k1 as u32;
            if !cfg.is_ul_slot(ack_slot) {
                continue;
            }
            let Ok((dl, ul)) = grid.get_pair_mut(slot_tx, ack_slot) else {
                continue;
            };
            if pdcch_alloc.is_none() {
                match self.pdcch.allocate(dl, &request) {
                    Ok(alloc) => pdcch_alloc = Some(alloc),
                    Err(err) => {
                        debug!(%rnti, "DL grant dropped: {err}");
                        failure = GrantFailure::Pdcch;
                        break;
                    }
                }
            }
            let destination = match self.uci.alloc_harq_ack(ul, ue_index, rnti) {
                Ok(destination) => destination,
                Err(err) => {
                    trace!(%rnti, k1, "no HARQ-ACK resource: {err}");
                    continue;
                }
            };
            if dl.dl.reserve(region, Channel::Pdsch, Multiplexing::Declared).is_err() {
                self.uci.release_harq_ack(ul, rnti, destination);
                failure = GrantFailure::NoResources;
                break;
            }

            // Committed from here on.
            let (tbs, lc_allocations, conres_ce, is_retx) = match kind {
                TxKind::New => {
                    let tbs = tbs_bytes(mcs, prbs.length(), symbols.length());
                    let (lcs, conres) = ue.allocate_dl_bytes(tbs);
                    (tbs, lcs, conres, false)
                }
                TxKind::Retx(_) => {
                    let tbs = ue.dl_harq.get(harq_id).map_or(0, |h| h.tbs_bytes());
                    (tbs, Vec::new(), false, true)
                }
            };
            if let Some(harq) = ue.dl_harq.get_mut(harq_id) {
                if is_retx {
                    harq.commit_retx(slot_tx, ack_slot);
                } else {
                    harq.commit_new_tx(slot_tx, ack_slot, mcs, prbs.length(), tbs);
                }
            }
            ue.record_grant(LinkDirection::Downlink, slot_tx);
            dl.result.dl.ue_grants.push(DlUeGrant {
                ue_index,
                harq_id,
                is_retx,
                pdsch: PdschInfo {
                    rnti,
                    prbs,
                    symbols,
                    mcs,
                    tbs_bytes: tbs,
                },
                k1,
                lc_allocations,
                conres_ce,
            });
            trace!(%rnti, harq = %harq_id, %prbs, mcs, tbs, k1, is_retx, "PDSCH allocated");
            return Ok(if is_retx { 0 } else { tbs });
        }

        self.rollback(grid, ue, slot_tx, pdcch_alloc.as_ref(), LinkDirection::Downlink, harq_id);
        Err(failure)
    }

    // ------------------------------------------------------------------
    // Uplink
    // ------------------------------------------------------------------

    fn schedule_ul(
        &mut self,
        grid: &mut CellResourceAllocator,
        ues: &mut UeRepository,
        slot_tx: SlotPoint,
        outcome: &mut UeSlotOutcome,
        served: &mut [u32],
    ) {
        let max_grants = self.cfg.expert.max_ul_grants_per_slot as u32;
        let mut nof_grants = 0;

        let mut retxs: Vec<(i32, UeIndex, HarqId)> = ues
            .iter()
            .filter(|ue| !ue.rlf_reported())
            .flat_map(|ue| {
                ue.ul_harq
                    .pending_retxs()
                    .map(move |h| (h.retx_pending_since().map_or(0, |since| slot_tx - since), ue.ue_index(), h.id()))
            })
            .collect();
        retxs.sort_by_key(|(age, ue, harq)| (-age, *ue, *harq));

        for (_, ue_index, harq_id) in retxs {
            if nof_grants >= max_grants {
                return;
            }
            let Some(ue) = ues.get_mut(ue_index) else {
                continue;
            };
            if ue.last_grant(LinkDirection::Uplink) == Some(slot_tx) {
                continue;
            }
            match self.allocate_ul(grid, ue, slot_tx, TxKind::Retx(harq_id)) {
                Ok(_) => {
                    nof_grants += 1;
                    outcome.nof_ul_retxs += 1;
                }
                Err(failure) => count_failure(outcome, failure),
            }
        }

        let min_sr_grant = self.cfg.expert.min_sr_grant_bytes;
        let nof_symbols = self.cfg.pusch_symbols.length();
        let exponent = self.cfg.expert.lc_priority_weight_exponent;
        let candidates: Vec<PolicyCandidate> = ues
            .iter()
            .filter(|ue| {
                !ue.rlf_reported()
                    && ue.ul_bytes_to_grant(min_sr_grant) > 0
                    && ue.ul_harq.find_empty().is_some()
                    && ue.last_grant(LinkDirection::Uplink) != Some(slot_tx)
            })
            .map(|ue| {
                let backlog = ue.ul_weighted_backlog(min_sr_grant, exponent);
                PolicyCandidate {
                    ue_index: ue.ue_index(),
                    bytes_per_prb: tbs_bytes(ue.ul_mcs(), 1, nof_symbols) as f64,
                    avg_throughput: ue.avg_throughput(LinkDirection::Uplink),
                    weighted_backlog: backlog.bytes,
                    top_lc_priority: backlog.top_priority.unwrap_or(LOWEST_LC_PRIORITY),
                }
            })
            .collect();
        if candidates.is_empty() {
            return;
        }

        for ue_index in self.policy.order(LinkDirection::Uplink, &candidates) {
            if nof_grants >= max_grants {
                return;
            }
            let Some(ue) = ues.get_mut(ue_index) else {
                continue;
            };
            match self.allocate_ul(grid, ue, slot_tx, TxKind::New) {
                Ok(bytes) => {
                    nof_grants += 1;
                    outcome.nof_ul_new_txs += 1;
                    outcome.ul_bytes += bytes as u64;
                    served[ue_index.as_usize()] += bytes;
                }
                Err(failure) => count_failure(outcome, failure),
            }
        }
    }

    fn allocate_ul(
        &self,
        grid: &mut CellResourceAllocator,
        ue: &mut UeContext,
        slot_tx: SlotPoint,
        kind: TxKind,
    ) -> Result<u32, GrantFailure> {
        let cfg = &self.cfg;
        let symbols = cfg.pusch_symbols;
        let limits = cfg.pusch_prb_limits();
        let rnti = ue.rnti();
        let ue_index = ue.ue_index();

        let (harq_id, mcs, wanted_prbs) = match kind {
            TxKind::Retx(harq_id) => {
                let harq = ue.ul_harq.get(harq_id).ok_or(GrantFailure::NoHarq)?;
                (harq_id, harq.mcs(), harq.nof_prbs())
            }
            TxKind::New => {
                let harq_id = ue.ul_harq.find_empty().ok_or(GrantFailure::NoHarq)?;
                let mcs = ue.ul_mcs();
                let bytes = ue.ul_bytes_to_grant(cfg.expert.min_sr_grant_bytes);
                let max_prbs = cfg.expert.max_ue_ul_prbs.min(limits.length());
                (harq_id, mcs, prbs_for_bytes(bytes, mcs, symbols.length(), max_prbs))
            }
        };
        let request = PdcchRequest::ue_specific(rnti, DciKind::UlGrant, ue.cqi());

        if let Some(harq) = ue.ul_harq.get_mut(harq_id) {
            harq.reserve();
        }

        let mut pdcch_alloc: Option<PdcchAllocation> = None;
        let mut failure = GrantFailure::NoResources;
        for &k2 in &cfg.k2_candidates {
            let pusch_slot = slot_tx + k2 as u32;
            if !cfg.is_ul_slot(pusch_slot) {
                continue;
            }
            let Ok((dl, ul)) = grid.get_pair_mut(slot_tx, pusch_slot) else {
                continue;
            };
            if ul.result.pusch_of(rnti).is_some() {
                continue;
            }
            let Some(prbs) = select_prbs(&ul.ul, symbols, wanted_prbs, limits, Channel::Pusch, kind == TxKind::New)
            else {
                continue;
            };
            if pdcch_alloc.is_none() {
                match self.pdcch.allocate(dl, &request) {
                    Ok(alloc) => pdcch_alloc = Some(alloc),
                    Err(err) => {
                        debug!(%rnti, "UL grant dropped: {err}");
                        failure = GrantFailure::Pdcch;
                        break;
                    }
                }
            }
            let Ok(grid_handle) = ul.ul.reserve(GridRegion::new(symbols, prbs), Channel::Pusch, Multiplexing::Exclusive)
            else {
                continue;
            };

            // Committed from here on.
            let is_retx = matches!(kind, TxKind::Retx(_));
            let tbs = match kind {
                TxKind::New => tbs_bytes(mcs, prbs.length(), symbols.length()),
                TxKind::Retx(_) => ue.ul_harq.get(harq_id).map_or(0, |h| h.tbs_bytes()),
            };
            if let Some(harq) = ue.ul_harq.get_mut(harq_id) {
                if is_retx {
                    harq.commit_retx(pusch_slot, pusch_slot);
                } else {
                    harq.commit_new_tx(pusch_slot, pusch_slot, mcs, prbs.length(), tbs);
                }
            }
            if !is_retx {
                ue.consume_ul_bytes(tbs);
            }
            ue.record_grant(LinkDirection::Uplink, slot_tx);
            ul.result.ul.puschs.push(UlGrant {
                ue_index: Some(ue_index),
                rnti,
                harq_id,
                is_retx,
                is_msg3: false,
                prbs,
                symbols,
                mcs,
                tbs_bytes: tbs,
                uci: None,
                grid_handle,
            });
            self.uci.multiplex_on_pusch(ul, rnti);
            trace!(%rnti, harq = %harq_id, %prbs, mcs, tbs, k2, is_retx, "PUSCH allocated");
            return Ok(if is_retx { 0 } else { tbs });
        }

        self.rollback(grid, ue, slot_tx, pdcch_alloc.as_ref(), LinkDirection::Uplink, harq_id);
        Err(failure)
    }

    fn rollback(
        &self,
        grid: &mut CellResourceAllocator,
        ue: &mut UeContext,
        slot_tx: SlotPoint,
        pdcch_alloc: Option<&PdcchAllocation>,
        direction: LinkDirection,
        harq_id: HarqId,
    ) {
        if let (Some(alloc), Ok(res)) = (pdcch_alloc, grid.get_mut(slot_tx)) {
            self.pdcch.release(res, alloc);
        }
        let harq = match direction {
            LinkDirection::Downlink => ue.dl_harq.get_mut(harq_id),
            LinkDirection::Uplink => ue.ul_harq.get_mut(harq_id),
        };
        if let Some(harq) = harq {
            harq.cancel_reservation();
        }
    }
}

fn count_failure(outcome: &mut UeSlotOutcome, failure: GrantFailure) {
    match failure {
        GrantFailure::Pdcch => outcome.nof_pdcch_failures += 1,
        GrantFailure::Uci => outcome.nof_pucch_failures += 1,
        GrantFailure::NoHarq | GrantFailure::NoResources => {}
    }
}

/// PRBs for a grant: the first interval of `wanted` PRBs, or for a new
/// transmission the start of the largest free interval when none is big enough.
fn select_prbs(
    grid: &SlotGrid,
    symbols: SymbolInterval,
    wanted: u16,
    limits: PrbInterval,
    channel: Channel,
    allow_partial: bool,
) -> Option<PrbInterval> {
    if let Some(prbs) = grid.find_free_prbs(symbols, wanted, limits, channel) {
        return Some(prbs);
    }
    if !allow_partial {
        return None;
    }
    let largest = grid.largest_free_prbs(symbols, limits, channel)?;
    Some(PrbInterval::new(largest.start(), largest.start() + largest.length().min(wanted)))
}
