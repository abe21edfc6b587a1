//! Common-channel schedulers
//!
//! Broadcast and cell-wide resources are claimed before any UE is scheduled:
//!
//! - DL, at slot_tx: SSB, CSI-RS, SIB1, SI messages, paging
//! - UL, when a slot enters the scheduling window: PRACH occasions and the
//!   PUCCH guardbands
//!
//! SIB1, SI messages and paging share one allocation path: a common search
//! space PDCCH on CORESET#0 followed by a PDSCH inside the CORESET#0 bandwidth.

pub mod csi_rs;
pub mod paging;
pub mod prach;
pub mod pucch_guardbands;
pub mod si_message;
pub mod sib;
pub mod ssb;

use std::sync::Arc;

use nextgsim_common::{Rnti, SlotPoint};
use thiserror::Error;
use tracing::trace;

use crate::cell::config::CellConfiguration;
use crate::cell::resource_grid::{Channel, GridRegion, Multiplexing, SlotResources};
use crate::pdcch::{PdcchAllocator, PdcchError, PdcchRequest};
use crate::result::{DciKind, PdschInfo};
use crate::ue::mcs::{prbs_for_bytes, tbs_bytes};

pub use csi_rs::CsiRsScheduler;
pub use paging::{PagingInformation, PagingScheduler};
pub use prach::PrachScheduler;
pub use pucch_guardbands::PucchGuardbandScheduler;
pub use si_message::SiMessageScheduler;
pub use sib::Sib1Scheduler;
pub use ssb::SsbScheduler;

/// Failure to place a broadcast PDCCH + PDSCH pair.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BroadcastAllocError {
    /// No PDCCH candidate in the common search space
    #[error(transparent)]
    Pdcch(#[from] PdcchError),
    /// The PDSCH does not fit in the CORESET#0 bandwidth
    #[error("no room for a {nof_prbs} PRB PDSCH for {rnti}")]
    NoPdschSpace {
        /// RNTI of the PDSCH
        rnti: Rnti,
        /// PRBs needed
        nof_prbs: u16,
    },
}

/// Allocates a common search space PDCCH and the PDSCH carrying
/// `payload_bytes` at `mcs` in the slot of `res`. Nothing is left behind on
/// failure.
pub(crate) fn allocate_broadcast_pdsch(
    cfg: &CellConfiguration,
    pdcch: &PdcchAllocator,
    res: &mut SlotResources,
    rnti: Rnti,
    dci: DciKind,
    payload_bytes: u32,
    mcs: u8,
) -> Result<PdschInfo, BroadcastAllocError> {
    let symbols = cfg.pdsch_symbols;
    let limits = cfg.coreset0().prbs;
    let nof_prbs = prbs_for_bytes(payload_bytes, mcs, symbols.length(), limits.length());
    if tbs_bytes(mcs, nof_prbs, symbols.length()) < payload_bytes {
        return Err(BroadcastAllocError::NoPdschSpace { rnti, nof_prbs });
    }

    let pdcch_alloc = pdcch.allocate(res, &PdcchRequest::common(rnti, dci))?;
    let reserved = res
        .dl
        .find_free_prbs(symbols, nof_prbs, limits, Channel::Pdsch)
        .and_then(|prbs| {
            res.dl
                .reserve(GridRegion::new(symbols, prbs), Channel::Pdsch, Multiplexing::Declared)
                .ok()
                .map(|_| prbs)
        });
    let Some(prbs) = reserved else {
        pdcch.release(res, &pdcch_alloc);
        return Err(BroadcastAllocError::NoPdschSpace { rnti, nof_prbs });
    };

    trace!(%rnti, %prbs, mcs, "broadcast PDSCH allocated");
    Ok(PdschInfo {
        rnti,
        prbs,
        symbols,
        mcs,
        tbs_bytes: tbs_bytes(mcs, prbs.length(), symbols.length()),
    })
}

/// Counters of one common-channel pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommonSlotOutcome {
    /// SSB beams transmitted
    pub nof_ssbs: u32,
    /// CSI-RS transmitted
    pub nof_csi_rs: u32,
    /// SIB1 transmissions
    pub nof_sib1: u32,
    /// SI messages transmitted
    pub nof_si_messages: u32,
    /// SI windows that closed without a transmission
    pub nof_si_missed: u32,
    /// Paging PDSCHs transmitted
    pub nof_paging_pdschs: u32,
    /// UEs paged
    pub nof_paged_ues: u32,
    /// Paging records dropped after too many missed occasions
    pub nof_paging_drops: u32,
    /// Broadcast allocations that found no PDCCH candidate
    pub nof_pdcch_failures: u32,
    /// PRACH occasions reserved
    pub nof_prachs: u32,
}

/// Runs every common-channel scheduler of a cell in the fixed order.
#[derive(Debug)]
pub struct CommonChannelScheduler {
    cfg: Arc<CellConfiguration>,
    ssb: SsbScheduler,
    csi_rs: CsiRsScheduler,
    sib1: Sib1Scheduler,
    si: SiMessageScheduler,
    prach: PrachScheduler,
    guardbands: PucchGuardbandScheduler,
    paging: PagingScheduler,
}

impl CommonChannelScheduler {
    /// Creates the schedulers of one cell.
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        Self {
            ssb: SsbScheduler::new(cfg.clone()),
            csi_rs: CsiRsScheduler::new(cfg.clone()),
            sib1: Sib1Scheduler::new(cfg.clone()),
            si: SiMessageScheduler::new(cfg.clone()),
            prach: PrachScheduler::new(cfg.clone()),
            guardbands: PucchGuardbandScheduler::new(cfg.clone()),
            paging: PagingScheduler::new(cfg.clone()),
            cfg,
        }
    }

    /// Paging scheduler, for enqueueing paging records.
    pub fn paging_mut(&mut self) -> &mut PagingScheduler {
        &mut self.paging
    }

    /// Paging scheduler.
    pub fn paging(&self) -> &PagingScheduler {
        &self.paging
    }

    /// Replaces the configuration of the schedulers that depend on expert
    /// parameters. Pending paging records are kept.
    pub fn set_config(&mut self, cfg: Arc<CellConfiguration>) {
        self.paging.set_config(cfg.clone());
        self.cfg = cfg;
    }

    /// DL common channels of `res` (the slot_tx entry).
    pub fn schedule_dl(&mut self, res: &mut SlotResources, pdcch: &PdcchAllocator) -> CommonSlotOutcome {
        let mut outcome = CommonSlotOutcome::default();
        if !self.cfg.is_dl_slot(res.slot) {
            return self.skip_slot(res.slot);
        }
        outcome.nof_ssbs = self.ssb.schedule(res);
        if self.csi_rs.schedule(res) {
            outcome.nof_csi_rs = 1;
        }
        self.sib1.schedule(res, pdcch, &mut outcome);
        self.si.schedule(res, pdcch, &mut outcome);
        self.paging.schedule(res, pdcch, &mut outcome);
        outcome
    }

    /// Advances SI windows and paging occasions over a slot where nothing can
    /// be broadcast: an UL-only slot, or one the PHY never indicated.
    pub fn skip_slot(&mut self, slot: SlotPoint) -> CommonSlotOutcome {
        let mut outcome = CommonSlotOutcome::default();
        self.si.close_expired_windows(slot, &mut outcome);
        self.paging.skip_occasion(slot, &mut outcome);
        outcome
    }

    /// UL common channels of a slot entering the scheduling window.
    pub fn prepare_ul_slot(&self, res: &mut SlotResources) -> CommonSlotOutcome {
        let mut outcome = CommonSlotOutcome::default();
        if !self.cfg.is_ul_slot(res.slot) {
            return outcome;
        }
        if self.prach.schedule(res) {
            outcome.nof_prachs = 1;
        }
        self.guardbands.schedule(res);
        outcome
    }
}

impl CommonSlotOutcome {
    /// Adds the counters of `other`.
    pub fn merge(&mut self, other: CommonSlotOutcome) {
        self.nof_ssbs += other.nof_ssbs;
        self.nof_csi_rs += other.nof_csi_rs;
        self.nof_sib1 += other.nof_sib1;
        self.nof_si_messages += other.nof_si_messages;
        self.nof_si_missed += other.nof_si_missed;
        self.nof_paging_pdschs += other.nof_paging_pdschs;
        self.nof_paged_ues += other.nof_paged_ues;
        self.nof_paging_drops += other.nof_paging_drops;
        self.nof_pdcch_failures += other.nof_pdcch_failures;
        self.nof_prachs += other.nof_prachs;
    }
}
