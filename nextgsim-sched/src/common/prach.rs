//! PRACH occasion reservation

use std::sync::Arc;

use tracing::warn;

use crate::cell::config::CellConfiguration;
use crate::cell::resource_grid::{Channel, GridRegion, Multiplexing, PrbInterval, SlotResources, SymbolInterval};
use crate::result::PrachOccasion;

/// PRACH scheduler of one cell.
#[derive(Debug, Clone)]
pub struct PrachScheduler {
    cfg: Arc<CellConfiguration>,
    region: GridRegion,
}

impl PrachScheduler {
    /// Creates the scheduler.
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        let prach = &cfg.prach;
        let region = GridRegion::new(
            SymbolInterval::new(prach.start_symbol, prach.start_symbol + prach.nof_symbols),
            PrbInterval::new(prach.frequency_start, prach.frequency_start + prach.nof_prbs),
        );
        Self { cfg, region }
    }

    /// Region of one occasion in the UL grid.
    pub fn region(&self) -> GridRegion {
        self.region
    }

    /// Reserves the occasion if the slot of `res` has one.
    pub fn schedule(&self, res: &mut SlotResources) -> bool {
        if res.slot.count() % self.cfg.prach.period_slots != self.cfg.prach.slot_offset {
            return false;
        }
        if let Err(err) = res.ul.reserve(self.region, Channel::Prach, Multiplexing::Exclusive) {
            warn!(slot = %res.slot, "PRACH occasion not reserved: {err}");
            return false;
        }
        res.result.ul.prachs.push(PrachOccasion { region: self.region });
        true
    }
}
