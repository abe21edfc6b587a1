//! PUCCH guardbands at both edges of the UL band
//!
//! Every UL slot reserves `pucch.guardband_prbs` PRBs at the lower and upper
//! band edges. Only PUCCH resources may be placed on top of them.

use std::sync::Arc;

use tracing::warn;

use crate::cell::config::CellConfiguration;
use crate::cell::resource_grid::{Channel, GridRegion, Multiplexing, PrbInterval, SlotResources, SymbolInterval};

/// PUCCH guardband scheduler of one cell.
#[derive(Debug, Clone)]
pub struct PucchGuardbandScheduler {
    regions: [GridRegion; 2],
}

impl PucchGuardbandScheduler {
    /// Creates the scheduler.
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        let gb = cfg.pucch.guardband_prbs;
        let symbols = SymbolInterval::full_slot();
        Self {
            regions: [
                GridRegion::new(symbols, PrbInterval::new(0, gb)),
                GridRegion::new(symbols, PrbInterval::new(cfg.nof_prbs - gb, cfg.nof_prbs)),
            ],
        }
    }

    /// Lower and upper guardband regions.
    pub fn regions(&self) -> &[GridRegion; 2] {
        &self.regions
    }

    /// Reserves both guardbands in the UL grid of `res`.
    pub fn schedule(&self, res: &mut SlotResources) {
        for region in self.regions {
            if let Err(err) = res.ul.reserve(region, Channel::PucchGuardband, Multiplexing::Exclusive) {
                warn!(slot = %res.slot, prbs = %region.prbs, "PUCCH guardband not reserved: {err}");
            }
        }
    }
}
