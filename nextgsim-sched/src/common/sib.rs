//! SIB1 broadcast
//!
//! SIB1 is repeated every `sib1.period_ms`, once in each slot of the period
//! that carries an SSB beam.

use std::sync::Arc;

use nextgsim_common::Rnti;
use tracing::{debug, warn};

use crate::cell::config::CellConfiguration;
use crate::cell::resource_grid::SlotResources;
use crate::common::{allocate_broadcast_pdsch, BroadcastAllocError, CommonSlotOutcome};
use crate::pdcch::PdcchAllocator;
use crate::result::{BroadcastPdsch, DciKind, SiKind};

/// SIB1 scheduler of one cell.
#[derive(Debug, Clone)]
pub struct Sib1Scheduler {
    cfg: Arc<CellConfiguration>,
    beam_slots: Vec<u32>,
}

impl Sib1Scheduler {
    /// Creates the scheduler.
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        Self {
            beam_slots: cfg.ssb_beam_slots(),
            cfg,
        }
    }

    /// True if `res.slot` is a SIB1 occasion.
    pub fn is_occasion(&self, res: &SlotResources) -> bool {
        let pos = res.slot.count() % self.cfg.sib1_period_slots();
        self.beam_slots.contains(&pos)
    }

    /// Sends SIB1 if the slot of `res` is an occasion.
    pub fn schedule(&self, res: &mut SlotResources, pdcch: &PdcchAllocator, outcome: &mut CommonSlotOutcome) {
        if !self.is_occasion(res) {
            return;
        }
        let sib1 = &self.cfg.sib1;
        match allocate_broadcast_pdsch(
            &self.cfg,
            pdcch,
            res,
            Rnti::SI_RNTI,
            DciKind::SystemInformation,
            sib1.payload_bytes,
            sib1.mcs,
        ) {
            Ok(pdsch) => {
                debug!(slot = %res.slot, prbs = %pdsch.prbs, "SIB1 scheduled");
                res.result.dl.broadcast.push(BroadcastPdsch {
                    kind: SiKind::Sib1,
                    pdsch,
                });
                outcome.nof_sib1 += 1;
            }
            Err(err) => {
                if matches!(err, BroadcastAllocError::Pdcch(_)) {
                    outcome.nof_pdcch_failures += 1;
                }
                warn!(slot = %res.slot, "SIB1 not transmitted: {err}");
            }
        }
    }
}
