//! UCI routing between PUCCH and PUSCH
//!
//! HARQ-ACK and CSI go on the PUSCH of the UE when it has one in the target
//! slot, otherwise on its PUCCH.

use std::sync::Arc;

use nextgsim_common::{Rnti, UeIndex};
use tracing::debug;

use crate::cell::config::CellConfiguration;
use crate::cell::resource_grid::SlotResources;
use crate::pucch::{PucchAllocator, PucchError};
use crate::result::UciOnPusch;

/// Size of a periodic wideband CSI report (CQI + RI) in bits.
pub const CSI_REPORT_BITS: u16 = 6;

/// Where a UCI ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UciDestination {
    /// Multiplexed on the UE PUSCH
    Pusch,
    /// On the UE PUCCH
    Pucch,
}

/// Periodic UCI occasions of one UE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodicUciConfig {
    /// UE
    pub ue_index: UeIndex,
    /// C-RNTI
    pub rnti: Rnti,
    /// SR slot offset within the SR period
    pub sr_offset: u32,
    /// CSI slot offset within the CSI period
    pub csi_offset: u32,
}

/// Periodic UCI placement counters for one slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeriodicUciOutcome {
    /// SR occasions placed
    pub nof_srs: u32,
    /// CSI reports placed
    pub nof_csis: u32,
    /// Occasions that found no PUCCH resource
    pub nof_failures: u32,
}

/// UCI allocator of one cell.
#[derive(Debug, Clone)]
pub struct UciAllocator {
    cfg: Arc<CellConfiguration>,
    pucch: PucchAllocator,
}

impl UciAllocator {
    /// Creates the allocator and its PUCCH allocator.
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        Self {
            pucch: PucchAllocator::new(cfg.clone()),
            cfg,
        }
    }

    /// PUCCH allocator used for UCI that does not go on PUSCH.
    pub fn pucch(&self) -> &PucchAllocator {
        &self.pucch
    }

    /// Places one HARQ-ACK bit for `rnti` in `res`.
    pub fn alloc_harq_ack(
        &self,
        res: &mut SlotResources,
        ue_index: UeIndex,
        rnti: Rnti,
    ) -> Result<UciDestination, PucchError> {
        if let Some(pusch) = res.result.ul.puschs.iter_mut().find(|p| p.rnti == rnti) {
            pusch.uci.get_or_insert_with(UciOnPusch::default).harq_bits += 1;
            return Ok(UciDestination::Pusch);
        }
        self.pucch.allocate_harq_ack(res, ue_index, rnti)?;
        Ok(UciDestination::Pucch)
    }

    /// Undoes `alloc_harq_ack`.
    pub fn release_harq_ack(&self, res: &mut SlotResources, rnti: Rnti, destination: UciDestination) {
        match destination {
            UciDestination::Pusch => {
                if let Some(pusch) = res.result.ul.puschs.iter_mut().find(|p| p.rnti == rnti) {
                    if let Some(uci) = pusch.uci.as_mut() {
                        uci.harq_bits = uci.harq_bits.saturating_sub(1);
                        if *uci == UciOnPusch::default() {
                            pusch.uci = None;
                        }
                    }
                }
            }
            UciDestination::Pucch => self.pucch.remove_harq_ack(res, rnti),
        }
    }

    /// Moves the HARQ-ACK and CSI bits of the UE PUCCH onto its newly
    /// allocated PUSCH and releases the PUCCH. A pending SR is dropped since the
    /// UE reports its buffer on the PUSCH.
    pub fn multiplex_on_pusch(&self, res: &mut SlotResources, rnti: Rnti) {
        if res.result.pusch_of(rnti).is_none() {
            return;
        }
        let Some(pucch) = self.pucch.release(res, rnti) else {
            return;
        };
        if let Some(pusch) = res.result.ul.puschs.iter_mut().find(|p| p.rnti == rnti) {
            let uci = pusch.uci.get_or_insert_with(UciOnPusch::default);
            uci.harq_bits += pucch.harq_bits;
            uci.csi_bits += pucch.csi_bits;
            if *uci == UciOnPusch::default() {
                pusch.uci = None;
            }
        }
    }

    /// Places the SR and CSI occasions falling in the slot of `res`.
    pub fn schedule_periodic_ucis<'a>(
        &self,
        res: &mut SlotResources,
        ues: impl IntoIterator<Item = &'a PeriodicUciConfig>,
    ) -> PeriodicUciOutcome {
        let mut outcome = PeriodicUciOutcome::default();
        let count = res.slot.count();
        let sr_period = self.cfg.pucch.sr_period_slots;
        let csi_period = self.cfg.pucch.csi_period_slots;

        for ue in ues {
            let has_pusch = res.result.pusch_of(ue.rnti).is_some();

            if count % sr_period == ue.sr_offset % sr_period && !has_pusch {
                match self.pucch.allocate_sr(res, ue.ue_index, ue.rnti) {
                    Ok(()) => outcome.nof_srs += 1,
                    Err(err) => {
                        debug!(rnti = %ue.rnti, slot = %res.slot, "SR occasion dropped: {err}");
                        outcome.nof_failures += 1;
                    }
                }
            }

            if csi_period > 0 && count % csi_period == ue.csi_offset % csi_period {
                if has_pusch {
                    if let Some(pusch) = res.result.ul.puschs.iter_mut().find(|p| p.rnti == ue.rnti) {
                        pusch.uci.get_or_insert_with(UciOnPusch::default).csi_bits += CSI_REPORT_BITS;
                    }
                    outcome.nof_csis += 1;
                    continue;
                }
                match self.pucch.allocate_csi(res, ue.ue_index, ue.rnti, CSI_REPORT_BITS) {
                    Ok(()) => outcome.nof_csis += 1,
                    Err(err) => {
                        debug!(rnti = %ue.rnti, slot = %res.slot, "CSI occasion dropped: {err}");
                        outcome.nof_failures += 1;
                    }
                }
            }
        }
        outcome
    }
}
