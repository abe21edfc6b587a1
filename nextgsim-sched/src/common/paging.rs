//! Paging (TS 38.304 §7.1)
//!
//! A record waits for the paging occasion of its UE:
//!
//! - `UE_ID = 5G-S-TMSI mod 1024`
//! - paging frame: `(SFN + PF_offset) mod T = (T div N) * (UE_ID mod N)`
//! - paging occasion: `i_s = floor(UE_ID / N) mod Ns`, at slot
//!   `po_slot_offset + i_s * (slots per frame / Ns)` of the paging frame
//!
//! All records due at one occasion share a single P-RNTI PDCCH and PDSCH.
//! Paging is best effort: a record that misses more than
//! `max_paging_retries` occasions is dropped.

use std::sync::Arc;

use nextgsim_common::{Rnti, SlotPoint};
use tracing::{debug, warn};

use crate::cell::config::{CellConfiguration, PAGING_CYCLES_RF};
use crate::cell::resource_grid::SlotResources;
use crate::common::{allocate_broadcast_pdsch, BroadcastAllocError, CommonSlotOutcome};
use crate::pdcch::PdcchAllocator;
use crate::result::{DciKind, PagingGrant};

/// Fixed part of a Paging message in bytes.
const PAGING_HEADER_BYTES: u32 = 2;
/// Bytes of one paging record (ng-5G-S-TMSI plus access type).
const PAGING_RECORD_BYTES: u32 = 7;

/// Request to page one UE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingInformation {
    /// 48-bit 5G-S-TMSI of the UE
    pub paging_identity: u64,
    /// UE-specific DRX cycle in radio frames
    pub ue_drx_cycle_rf: Option<u32>,
}

#[derive(Debug, Clone)]
struct PagingRecord {
    info: PagingInformation,
    missed: u8,
}

/// Paging scheduler of one cell.
#[derive(Debug, Clone)]
pub struct PagingScheduler {
    cfg: Arc<CellConfiguration>,
    records: Vec<PagingRecord>,
}

impl PagingScheduler {
    /// Creates the scheduler.
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        Self {
            cfg,
            records: Vec::new(),
        }
    }

    /// Replaces the configuration. Pending records are kept.
    pub fn set_config(&mut self, cfg: Arc<CellConfiguration>) {
        self.cfg = cfg;
    }

    /// Number of records waiting for their occasion.
    pub fn nof_pending(&self) -> usize {
        self.records.len()
    }

    /// Enqueues a record. A UE already waiting to be paged is not added twice,
    /// and a UE DRX cycle other than 32, 64, 128 or 256 frames is rejected.
    pub fn handle_paging_information(&mut self, info: PagingInformation) -> bool {
        if let Some(drx) = info.ue_drx_cycle_rf.filter(|drx| !PAGING_CYCLES_RF.contains(drx)) {
            warn!(identity = info.paging_identity, drx, "paging request with invalid UE DRX cycle dropped");
            return false;
        }
        if self.records.iter().any(|r| r.info.paging_identity == info.paging_identity) {
            debug!(identity = info.paging_identity, "UE already waiting to be paged");
            return false;
        }
        self.records.push(PagingRecord { info, missed: 0 });
        true
    }

    /// First slot at or after `from` that is a paging occasion of `info`.
    pub fn next_occasion(&self, info: &PagingInformation, from: SlotPoint) -> SlotPoint {
        let mut slot = from;
        while !self.is_occasion(info, slot) {
            slot += 1;
        }
        slot
    }

    /// True if `slot` is a paging occasion of `info`.
    pub fn is_occasion(&self, info: &PagingInformation, slot: SlotPoint) -> bool {
        let paging = &self.cfg.paging;
        let default_t = paging.default_paging_cycle_rf;
        let t = info
            .ue_drx_cycle_rf
            .filter(|drx| PAGING_CYCLES_RF.contains(drx))
            .map_or(default_t, |drx| drx.min(default_t));
        let n = paging.nof_pf_per_cycle.min(t);
        let ns = paging.nof_po_per_pf;
        let ue_id = (info.paging_identity % 1024) as u32;

        let pf = (t / n) * (ue_id % n);
        if (slot.sfn() + paging.pf_offset) % t != pf {
            return false;
        }
        let i_s = (ue_id / n) % ns;
        let po_slot = paging.po_slot_offset + i_s * (slot.nof_slots_per_frame() / ns);
        slot.slot_index() == po_slot
    }

    fn due_at(&self, slot: SlotPoint) -> Vec<usize> {
        (0..self.records.len())
            .filter(|i| self.is_occasion(&self.records[*i].info, slot))
            .collect()
    }

    /// Counts a missed occasion for `due` records and drops the exhausted ones.
    fn record_missed(&mut self, due: &[usize], outcome: &mut CommonSlotOutcome) {
        let max_misses = self.cfg.expert.max_paging_retries;
        for &i in due {
            self.records[i].missed += 1;
        }
        let before = self.records.len();
        self.records.retain(|r| {
            let keep = r.missed <= max_misses;
            if !keep {
                warn!(identity = r.info.paging_identity, missed = r.missed, "paging record dropped");
            }
            keep
        });
        outcome.nof_paging_drops += (before - self.records.len()) as u32;
    }

    /// Occasions falling in a slot without DL count as missed.
    pub fn skip_occasion(&mut self, slot: SlotPoint, outcome: &mut CommonSlotOutcome) {
        let due = self.due_at(slot);
        if !due.is_empty() {
            self.record_missed(&due, outcome);
        }
    }

    /// Pages every UE whose occasion is the slot of `res`.
    pub fn schedule(&mut self, res: &mut SlotResources, pdcch: &PdcchAllocator, outcome: &mut CommonSlotOutcome) {
        let due = self.due_at(res.slot);
        if due.is_empty() {
            return;
        }
        let payload_bytes = PAGING_HEADER_BYTES + PAGING_RECORD_BYTES * due.len() as u32;
        match allocate_broadcast_pdsch(
            &self.cfg,
            pdcch,
            res,
            Rnti::P_RNTI,
            DciKind::Paging,
            payload_bytes,
            self.cfg.paging.mcs,
        ) {
            Ok(pdsch) => {
                let paging_identities: Vec<u64> = due.iter().map(|i| self.records[*i].info.paging_identity).collect();
                debug!(slot = %res.slot, nof_ues = paging_identities.len(), "paging scheduled");
                outcome.nof_paging_pdschs += 1;
                outcome.nof_paged_ues += paging_identities.len() as u32;
                self.records.retain(|r| !paging_identities.contains(&r.info.paging_identity));
                res.result.dl.paging.push(PagingGrant {
                    pdsch,
                    paging_identities,
                });
            }
            Err(err) => {
                if matches!(err, BroadcastAllocError::Pdcch(_)) {
                    outcome.nof_pdcch_failures += 1;
                }
                debug!(slot = %res.slot, "paging occasion missed: {err}");
                self.record_missed(&due, outcome);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::resource_grid::{CellResourceAllocator, Channel, GridRegion, Multiplexing};
    use nextgsim_common::config::{CellConfig, SchedulerExpertConfig};
    use nextgsim_common::{CellIndex, SubcarrierSpacing};

    fn cfg() -> Arc<CellConfiguration> {
        Arc::new(CellConfiguration::new(CellIndex(0), &CellConfig::default(), &SchedulerExpertConfig::default()).unwrap())
    }

    fn info(identity: u64) -> PagingInformation {
        PagingInformation {
            paging_identity: identity,
            ue_drx_cycle_rf: None,
        }
    }

    fn slot(n: u32) -> SlotPoint {
        SlotPoint::new(SubcarrierSpacing::Khz15, n)
    }

    #[test]
    fn test_occasion_formula() {
        let paging = PagingScheduler::new(cfg());
        // UE_ID 1000: PF = 1000 mod 128 = 104, PO at slot offset 1
        assert_eq!(paging.next_occasion(&info(1000), slot(0)), slot(1041));
        // Only the 10 low bits matter
        assert_eq!(paging.next_occasion(&info(1000 + 1024 * 77), slot(0)), slot(1041));
        // The next occasion is one paging cycle later
        assert_eq!(paging.next_occasion(&info(1000), slot(1042)), slot(1041 + 1280));
    }

    #[test]
    fn test_ue_specific_drx_shortens_cycle() {
        let paging = PagingScheduler::new(cfg());
        let short = PagingInformation {
            paging_identity: 1000,
            ue_drx_cycle_rf: Some(32),
        };
        // T = 32, N = 32: PF = 1000 mod 32 = 8
        assert_eq!(paging.next_occasion(&short, slot(0)), slot(81));
        assert_eq!(paging.next_occasion(&short, slot(82)), slot(81 + 320));
    }

    #[test]
    fn test_invalid_ue_drx_cycle_rejected() {
        let mut paging = PagingScheduler::new(cfg());
        for drx in [0, 1, 100, 512] {
            let bad = PagingInformation {
                paging_identity: 1000,
                ue_drx_cycle_rf: Some(drx),
            };
            assert!(!paging.handle_paging_information(bad));
            // Falls back to the default cycle instead of dividing by zero
            assert!(!paging.is_occasion(&bad, slot(81)));
            assert!(paging.is_occasion(&bad, slot(1041)));
        }
        assert_eq!(paging.nof_pending(), 0);
        assert!(paging.handle_paging_information(PagingInformation {
            paging_identity: 1000,
            ue_drx_cycle_rf: Some(64),
        }));
    }

    #[test]
    fn test_records_share_one_pdsch() {
        let cfg = cfg();
        let mut paging = PagingScheduler::new(cfg.clone());
        let pdcch = PdcchAllocator::new(cfg.clone());
        let mut grid = CellResourceAllocator::new(cfg.clone());
        assert!(paging.handle_paging_information(info(1000)));
        assert!(paging.handle_paging_information(info(2024)));
        assert!(!paging.handle_paging_information(info(1000)));
        // Different PF
        paging.handle_paging_information(info(5));

        grid.slot_indication(slot(1041));
        let res = grid.get_mut(slot(1041)).unwrap();
        let mut outcome = CommonSlotOutcome::default();
        paging.schedule(res, &pdcch, &mut outcome);

        assert_eq!(outcome.nof_paging_pdschs, 1);
        assert_eq!(res.result.dl.paging[0].paging_identities, vec![1000, 2024]);
        assert_eq!(res.result.dl.pdcchs[0].rnti, Rnti::P_RNTI);
        assert_eq!(paging.nof_pending(), 1);
    }

    #[test]
    fn test_record_dropped_after_missed_occasions() {
        let cfg = cfg();
        let mut paging = PagingScheduler::new(cfg.clone());
        let pdcch = PdcchAllocator::new(cfg.clone());
        let mut grid = CellResourceAllocator::new(cfg.clone());
        paging.handle_paging_information(info(1000));

        let mut total = CommonSlotOutcome::default();
        for cycle in 0..3 {
            let po = slot(1041 + 1280 * cycle);
            grid.slot_indication(po);
            let res = grid.get_mut(po).unwrap();
            let region = GridRegion::new(cfg.pdsch_symbols, cfg.coreset0().prbs);
            res.dl.reserve(region, Channel::Pdsch, Multiplexing::Exclusive).unwrap();
            let mut outcome = CommonSlotOutcome::default();
            paging.schedule(res, &pdcch, &mut outcome);
            total.merge(outcome);
        }
        assert_eq!(total.nof_paging_drops, 1);
        assert_eq!(paging.nof_pending(), 0);
    }
}
