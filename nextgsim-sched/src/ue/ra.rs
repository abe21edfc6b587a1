//! Random access: RAR scheduling, Msg3 grants and Msg3 HARQ
//!
//! A RACH indication opens an RA response window after the PRACH slot. In
//! each DL slot of the window the scheduler tries to send one RAR per RA-RNTI
//! carrying a Msg3 grant per detected preamble. Msg3 PUSCHs are reserved
//! before the RAR PDSCH so that a RAR never announces a grant that has no
//! resources. Preambles still unanswered when the window closes are dropped.

use std::collections::VecDeque;
use std::sync::Arc;

use nextgsim_common::{HarqId, Rnti, SlotPoint, NOF_OFDM_SYMBOLS_PER_SLOT};
use tracing::{debug, info, warn};

use crate::cell::config::CellConfiguration;
use crate::cell::resource_grid::{Channel, CellResourceAllocator, GridRegion, Multiplexing, PrbInterval};
use crate::pdcch::{PdcchAllocator, PdcchRequest};
use crate::result::{DciKind, Msg3Grant, PdschInfo, RarGrant, UlGrant};
use crate::ue::harq::{HarqFeedbackOutcome, HarqProcess, HarqState};
use crate::ue::mcs::{prbs_for_bytes, tbs_bytes};

/// Bytes of one RAR entry: E/T/RAPID subheader plus the 7-byte MAC RAR.
pub const RAR_BYTES_PER_GRANT: u32 = 8;

/// Number of PRACH slot indices per frame used in the RA-RNTI formula.
const RA_RNTI_NOF_SLOTS: u16 = 80;

/// Computes the RA-RNTI of a PRACH occasion (TS 38.321 §5.1.3).
pub fn ra_rnti(start_symbol: u8, slot_index: u32, freq_index: u8) -> Rnti {
    let s_id = start_symbol as u16;
    let t_id = slot_index as u16;
    let f_id = freq_index as u16;
    let symbols = NOF_OFDM_SYMBOLS_PER_SLOT as u16;
    Rnti::new(1 + s_id + symbols * t_id + symbols * RA_RNTI_NOF_SLOTS * f_id)
}

/// One preamble detected by the PHY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedPreamble {
    /// Preamble index (0..64)
    pub preamble_id: u8,
    /// Timing advance command
    pub timing_advance: u16,
}

/// Preambles detected in one PRACH occasion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RachIndication {
    /// Slot of the PRACH occasion
    pub slot: SlotPoint,
    /// First symbol of the occasion
    pub start_symbol: u8,
    /// Frequency index of the occasion
    pub freq_index: u8,
    /// Detected preambles
    pub preambles: Vec<DetectedPreamble>,
}

/// Msg3 decoded successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Msg3Info {
    /// TC-RNTI the UE used
    pub tc_rnti: Rnti,
    /// Preamble the UE sent
    pub preamble_id: u8,
    /// Slot of the decoded Msg3
    pub slot: SlotPoint,
}

/// Counters of one RA pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RaSlotOutcome {
    /// RARs sent
    pub nof_rars: u32,
    /// Msg3 grants sent in RARs
    pub nof_msg3_grants: u32,
    /// Msg3 retransmission grants
    pub nof_msg3_retxs: u32,
    /// Preambles dropped because the RA window closed
    pub nof_rach_drops: u32,
    /// Msg3 HARQs that reached the retransmission ceiling by timeout
    pub nof_msg3_failures: u32,
    /// PDCCH allocations that failed
    pub nof_pdcch_failures: u32,
}

#[derive(Debug, Clone)]
struct PendingRar {
    ra_rnti: Rnti,
    prach_slot: SlotPoint,
    window_start: SlotPoint,
    window_end: SlotPoint,
    preambles: Vec<(DetectedPreamble, Rnti)>,
}

#[derive(Debug, Clone)]
struct PendingMsg3 {
    tc_rnti: Rnti,
    preamble_id: u8,
    harq: HarqProcess,
}

/// Random access scheduler of one cell.
#[derive(Debug)]
pub struct RaScheduler {
    cfg: Arc<CellConfiguration>,
    pending_rars: VecDeque<PendingRar>,
    msg3s: Vec<PendingMsg3>,
    last_tc_rnti: Rnti,
}

impl RaScheduler {
    /// Creates the scheduler.
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        Self {
            cfg,
            pending_rars: VecDeque::new(),
            msg3s: Vec::new(),
            last_tc_rnti: Rnti::INVALID,
        }
    }

    /// Replaces the cell configuration after an expert parameter update.
    pub fn set_config(&mut self, cfg: Arc<CellConfiguration>) {
        self.cfg = cfg;
    }

    /// Number of preambles waiting for a RAR.
    pub fn nof_pending_preambles(&self) -> usize {
        self.pending_rars.iter().map(|r| r.preambles.len()).sum()
    }

    /// Number of Msg3 HARQ processes in progress.
    pub fn nof_pending_msg3s(&self) -> usize {
        self.msg3s.len()
    }

    /// True if `rnti` is a TC-RNTI owned by an ongoing RA procedure.
    pub fn owns_rnti(&self, rnti: Rnti) -> bool {
        self.msg3s.iter().any(|m| m.tc_rnti == rnti)
            || self
                .pending_rars
                .iter()
                .any(|r| r.preambles.iter().any(|(_, tc)| *tc == rnti))
    }

    /// Registers detected preambles and allocates their TC-RNTIs.
    /// `in_use` tells which C-RNTIs already belong to UEs.
    pub fn handle_rach_indication(&mut self, indication: &RachIndication, in_use: impl Fn(Rnti) -> bool) {
        if indication.preambles.is_empty() {
            return;
        }
        let ra_rnti = ra_rnti(indication.start_symbol, indication.slot.slot_index(), indication.freq_index);
        let window_start = indication.slot + 1;
        let window_end = window_start + self.cfg.prach.ra_resp_window_slots;

        let mut preambles = Vec::with_capacity(indication.preambles.len());
        for preamble in &indication.preambles {
            let Some(tc_rnti) = self.allocate_tc_rnti(&in_use, &preambles) else {
                warn!(%ra_rnti, preamble = preamble.preamble_id, "no TC-RNTI available, preamble ignored");
                continue;
            };
            preambles.push((*preamble, tc_rnti));
        }
        info!(
            %ra_rnti,
            slot = %indication.slot,
            nof_preambles = preambles.len(),
            "RACH indication"
        );
        self.pending_rars.push_back(PendingRar {
            ra_rnti,
            prach_slot: indication.slot,
            window_start,
            window_end,
            preambles,
        });
    }

    /// Applies the CRC of a Msg3 PUSCH. Returns the decoded Msg3, if any.
    pub fn handle_crc(&mut self, tc_rnti: Rnti, ok: bool, now: SlotPoint) -> Option<Msg3Info> {
        let pos = self.msg3s.iter().position(|m| m.tc_rnti == tc_rnti)?;
        let msg3 = &mut self.msg3s[pos];
        match msg3.harq.feedback(ok, now) {
            HarqFeedbackOutcome::Acked { .. } => {
                let msg3 = self.msg3s.remove(pos);
                info!(%tc_rnti, preamble = msg3.preamble_id, "Msg3 received");
                Some(Msg3Info {
                    tc_rnti,
                    preamble_id: msg3.preamble_id,
                    slot: now,
                })
            }
            HarqFeedbackOutcome::Nacked => {
                debug!(%tc_rnti, retx = msg3.harq.nof_retxs(), "Msg3 CRC failed");
                None
            }
            HarqFeedbackOutcome::MaxRetxReached => {
                warn!(%tc_rnti, "Msg3 failed after the maximum number of retransmissions");
                self.msg3s.remove(pos);
                None
            }
            HarqFeedbackOutcome::Ignored => None,
        }
    }

    /// True if `rnti` is a TC-RNTI with a Msg3 in flight.
    pub fn has_msg3(&self, rnti: Rnti) -> bool {
        self.msg3s.iter().any(|m| m.tc_rnti == rnti)
    }

    /// Runs the RA pass for `slot_tx`.
    pub fn run_slot(
        &mut self,
        grid: &mut CellResourceAllocator,
        pdcch: &PdcchAllocator,
        slot_tx: SlotPoint,
    ) -> RaSlotOutcome {
        let mut outcome = RaSlotOutcome::default();
        self.check_msg3_timeouts(slot_tx, &mut outcome);

        if !self.cfg.is_dl_slot(slot_tx) {
            return outcome;
        }
        self.schedule_msg3_retxs(grid, pdcch, slot_tx, &mut outcome);

        // Drop what can no longer be answered.
        while let Some(front) = self.pending_rars.front() {
            if slot_tx - front.window_end < 0 {
                break;
            }
            if let Some(expired) = self.pending_rars.pop_front() {
                outcome.nof_rach_drops += expired.preambles.len() as u32;
                warn!(
                    ra_rnti = %expired.ra_rnti,
                    prach_slot = %expired.prach_slot,
                    nof_preambles = expired.preambles.len(),
                    "RA response window expired"
                );
            }
        }

        let mut n = 0;
        while n < self.pending_rars.len() {
            if slot_tx - self.pending_rars[n].window_start >= 0 {
                self.schedule_rar(grid, pdcch, slot_tx, n, &mut outcome);
            }
            if self.pending_rars[n].preambles.is_empty() {
                self.pending_rars.remove(n);
            } else {
                n += 1;
            }
        }
        outcome
    }

    fn allocate_tc_rnti(&mut self, in_use: &impl Fn(Rnti) -> bool, batch: &[(DetectedPreamble, Rnti)]) -> Option<Rnti> {
        let range = (Rnti::MAX_CRNTI.value() - Rnti::MIN_CRNTI.value()) as usize + 1;
        let mut candidate = self.last_tc_rnti;
        for _ in 0..range {
            candidate = candidate.next_crnti();
            if !in_use(candidate) && !self.owns_rnti(candidate) && !batch.iter().any(|(_, tc)| *tc == candidate) {
                self.last_tc_rnti = candidate;
                return Some(candidate);
            }
        }
        None
    }

    fn check_msg3_timeouts(&mut self, now: SlotPoint, outcome: &mut RaSlotOutcome) {
        let timeout = self.cfg.expert.harq_feedback_timeout_slots;
        self.msg3s.retain_mut(|msg3| match msg3.harq.check_timeout(now, timeout) {
            Some(HarqFeedbackOutcome::MaxRetxReached) => {
                warn!(tc_rnti = %msg3.tc_rnti, "Msg3 CRC missing, RA procedure abandoned");
                outcome.nof_msg3_failures += 1;
                false
            }
            _ => true,
        });
    }

    /// First UL slot reachable with a k2 candidate plus `extra` slots.
    fn pusch_slot(&self, slot_tx: SlotPoint, extra: u32) -> Option<SlotPoint> {
        self.cfg
            .k2_candidates
            .iter()
            .map(|k2| slot_tx + (*k2 as u32 + extra))
            .find(|slot| self.cfg.is_ul_slot(*slot))
    }

    fn schedule_msg3_retxs(
        &mut self,
        grid: &mut CellResourceAllocator,
        pdcch: &PdcchAllocator,
        slot_tx: SlotPoint,
        outcome: &mut RaSlotOutcome,
    ) {
        let Some(pusch_slot) = self.pusch_slot(slot_tx, 0) else {
            return;
        };
        let symbols = self.cfg.pusch_symbols;
        let limits = self.cfg.pusch_prb_limits();

        for msg3 in self.msg3s.iter_mut().filter(|m| m.harq.state() == HarqState::ToRetransmit) {
            let Ok((dl, ul)) = grid.get_pair_mut(slot_tx, pusch_slot) else {
                return;
            };
            let Some(prbs) = ul.ul.find_free_prbs(symbols, msg3.harq.nof_prbs(), limits, Channel::Pusch) else {
                debug!(tc_rnti = %msg3.tc_rnti, "no PUSCH space for Msg3 retransmission");
                continue;
            };
            let region = GridRegion::new(symbols, prbs);
            let grid_handle = match ul.ul.reserve(region, Channel::Pusch, Multiplexing::Exclusive) {
                Ok(handle) => handle,
                Err(err) => {
                    debug!(tc_rnti = %msg3.tc_rnti, "Msg3 retransmission deferred: {err}");
                    continue;
                }
            };
            let request = PdcchRequest::common(msg3.tc_rnti, DciKind::Msg3Retx);
            if let Err(err) = pdcch.allocate(dl, &request) {
                debug!("Msg3 retransmission deferred: {err}");
                ul.ul.release(grid_handle);
                outcome.nof_pdcch_failures += 1;
                continue;
            }
            msg3.harq.reserve();
            msg3.harq.commit_retx(pusch_slot, pusch_slot);
            ul.result.ul.puschs.push(UlGrant {
                ue_index: None,
                rnti: msg3.tc_rnti,
                harq_id: msg3.harq.id(),
                is_retx: true,
                is_msg3: true,
                prbs,
                symbols,
                mcs: msg3.harq.mcs(),
                tbs_bytes: msg3.harq.tbs_bytes(),
                uci: None,
                grid_handle,
            });
            outcome.nof_msg3_retxs += 1;
            debug!(tc_rnti = %msg3.tc_rnti, %pusch_slot, "Msg3 retransmission scheduled");
        }
    }

    fn schedule_rar(
        &mut self,
        grid: &mut CellResourceAllocator,
        pdcch: &PdcchAllocator,
        slot_tx: SlotPoint,
        n: usize,
        outcome: &mut RaSlotOutcome,
    ) {
        let Some(msg3_slot) = self.pusch_slot(slot_tx, self.cfg.msg3_delta as u32) else {
            return;
        };
        let Ok((dl, ul)) = grid.get_pair_mut(slot_tx, msg3_slot) else {
            return;
        };
        let expert = &self.cfg.expert;
        let rar = &mut self.pending_rars[n];

        let pdcch_alloc = match pdcch.allocate(dl, &PdcchRequest::common(rar.ra_rnti, DciKind::Rar)) {
            Ok(alloc) => alloc,
            Err(err) => {
                debug!("RAR deferred: {err}");
                outcome.nof_pdcch_failures += 1;
                return;
            }
        };

        // Msg3 PUSCHs first.
        let symbols = self.cfg.pusch_symbols;
        let limits = self.cfg.pusch_prb_limits();
        let msg3_mcs = expert.msg3_mcs;
        let msg3_prbs = prbs_for_bytes(expert.msg3_size_bytes, msg3_mcs, symbols.length(), limits.length());
        let mut msg3_grants: Vec<(usize, UlGrant)> = Vec::new();
        for (pos, (_, tc_rnti)) in rar.preambles.iter().enumerate() {
            let Some(prbs) = ul.ul.find_free_prbs(symbols, msg3_prbs, limits, Channel::Pusch) else {
                break;
            };
            let region = GridRegion::new(symbols, prbs);
            let Ok(grid_handle) = ul.ul.reserve(region, Channel::Pusch, Multiplexing::Exclusive) else {
                break;
            };
            msg3_grants.push((
                pos,
                UlGrant {
                    ue_index: None,
                    rnti: *tc_rnti,
                    harq_id: HarqId(0),
                    is_retx: false,
                    is_msg3: true,
                    prbs,
                    symbols,
                    mcs: msg3_mcs,
                    tbs_bytes: tbs_bytes(msg3_mcs, prbs.length(), symbols.length()),
                    uci: None,
                    grid_handle,
                },
            ));
        }

        // RAR PDSCH inside the CORESET#0 bandwidth.
        let pdsch_symbols = self.cfg.pdsch_symbols;
        let coreset0_prbs: PrbInterval = self.cfg.coreset0().prbs;
        let rar_bytes = msg3_grants.len() as u32 * RAR_BYTES_PER_GRANT;
        let rar_prbs = prbs_for_bytes(rar_bytes, expert.rar_mcs, pdsch_symbols.length(), coreset0_prbs.length());
        let pdsch_prbs = if msg3_grants.is_empty() {
            None
        } else {
            dl.dl.find_free_prbs(pdsch_symbols, rar_prbs, coreset0_prbs, Channel::Pdsch)
        };
        let pdsch_handle = pdsch_prbs.and_then(|prbs| {
            dl.dl
                .reserve(GridRegion::new(pdsch_symbols, prbs), Channel::Pdsch, Multiplexing::Declared)
                .ok()
        });

        let (Some(prbs), Some(_)) = (pdsch_prbs, pdsch_handle) else {
            debug!(ra_rnti = %rar.ra_rnti, "RAR deferred: no PUSCH or PDSCH space");
            for (_, grant) in &msg3_grants {
                ul.ul.release(grant.grid_handle);
            }
            pdcch.release(dl, &pdcch_alloc);
            return;
        };

        let mut answered = Vec::with_capacity(msg3_grants.len());
        let mut rar_grants = Vec::with_capacity(msg3_grants.len());
        for (pos, grant) in msg3_grants {
            let (preamble, tc_rnti) = rar.preambles[pos];
            let mut harq = HarqProcess::new(HarqId(0), expert.max_msg3_retxs);
            harq.reserve();
            harq.commit_new_tx(msg3_slot, msg3_slot, grant.mcs, grant.prbs.length(), grant.tbs_bytes);
            self.msg3s.push(PendingMsg3 {
                tc_rnti,
                preamble_id: preamble.preamble_id,
                harq,
            });
            rar_grants.push(Msg3Grant {
                tc_rnti,
                preamble_id: preamble.preamble_id,
                timing_advance: preamble.timing_advance,
                msg3_slot,
            });
            ul.result.ul.puschs.push(grant);
            answered.push(pos);
        }
        outcome.nof_rars += 1;
        outcome.nof_msg3_grants += rar_grants.len() as u32;
        debug!(ra_rnti = %rar.ra_rnti, nof_grants = rar_grants.len(), %msg3_slot, "RAR scheduled");

        dl.result.dl.rars.push(RarGrant {
            ra_rnti: rar.ra_rnti,
            pdsch: PdschInfo {
                rnti: rar.ra_rnti,
                prbs,
                symbols: pdsch_symbols,
                mcs: expert.rar_mcs,
                tbs_bytes: tbs_bytes(expert.rar_mcs, prbs.length(), pdsch_symbols.length()),
            },
            grants: rar_grants,
        });
        let mut pos = 0;
        rar.preambles.retain(|_| {
            let keep = !answered.contains(&pos);
            pos += 1;
            keep
        });
    }
}
