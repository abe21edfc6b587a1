//! Periodic NZP-CSI-RS on one symbol across the carrier

use std::sync::Arc;

use tracing::debug;

use crate::cell::config::CellConfiguration;
use crate::cell::resource_grid::{Channel, GridRegion, Multiplexing, PrbInterval, SlotResources, SymbolInterval};
use crate::result::CsiRsInfo;

/// CSI-RS scheduler of one cell. Does nothing when CSI-RS is not configured.
#[derive(Debug, Clone)]
pub struct CsiRsScheduler {
    cfg: Arc<CellConfiguration>,
}

impl CsiRsScheduler {
    /// Creates the scheduler.
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        Self { cfg }
    }

    /// Places the CSI-RS if the slot of `res` is an occasion. A CSI-RS
    /// colliding with an SSB is skipped for that occasion.
    pub fn schedule(&self, res: &mut SlotResources) -> bool {
        let Some(csi) = &self.cfg.csi_rs else {
            return false;
        };
        if res.slot.count() % csi.period_slots != csi.slot_offset {
            return false;
        }
        let region = GridRegion::new(
            SymbolInterval::new(csi.symbol, csi.symbol + 1),
            PrbInterval::new(0, self.cfg.nof_prbs),
        );
        if let Err(err) = res.dl.reserve(region, Channel::CsiRs, Multiplexing::Exclusive) {
            debug!(slot = %res.slot, "CSI-RS skipped: {err}");
            return false;
        }
        res.result.dl.csi_rs.push(CsiRsInfo { region });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::resource_grid::CellResourceAllocator;
    use nextgsim_common::config::{CellConfig, CsiRsConfig, SchedulerExpertConfig};
    use nextgsim_common::{CellIndex, SlotPoint, SubcarrierSpacing};

    fn cfg(symbol: u8) -> Arc<CellConfiguration> {
        let mut cell = CellConfig::default();
        cell.csi_rs = Some(CsiRsConfig {
            period_slots: 20,
            slot_offset: 0,
            symbol,
        });
        Arc::new(CellConfiguration::new(CellIndex(0), &cell, &SchedulerExpertConfig::default()).unwrap())
    }

    #[test]
    fn test_pdsch_rate_matched_around_csi_rs() {
        let cfg = cfg(13);
        let csi = CsiRsScheduler::new(cfg.clone());
        let mut grid = CellResourceAllocator::new(cfg.clone());
        let slot = SlotPoint::new(SubcarrierSpacing::Khz15, 0);
        grid.slot_indication(slot);
        let res = grid.get_mut(slot).unwrap();

        assert!(csi.schedule(res));
        let pdsch = GridRegion::new(cfg.pdsch_symbols, PrbInterval::new(30, 40));
        assert!(res.dl.reserve(pdsch, Channel::Pdsch, Multiplexing::Declared).is_ok());
    }

    #[test]
    fn test_collision_with_ssb_skips_occasion() {
        let cfg = cfg(3);
        let csi = CsiRsScheduler::new(cfg.clone());
        let ssb = super::super::SsbScheduler::new(cfg.clone());
        let mut grid = CellResourceAllocator::new(cfg.clone());
        let slot = SlotPoint::new(SubcarrierSpacing::Khz15, 0);
        grid.slot_indication(slot);
        let res = grid.get_mut(slot).unwrap();

        ssb.schedule(res);
        assert!(!csi.schedule(res));
        assert!(res.result.dl.csi_rs.is_empty());
    }

    #[test]
    fn test_not_configured() {
        let cfg = Arc::new(
            CellConfiguration::new(CellIndex(0), &CellConfig::default(), &SchedulerExpertConfig::default()).unwrap(),
        );
        let mut grid = CellResourceAllocator::new(cfg.clone());
        let slot = SlotPoint::new(SubcarrierSpacing::Khz15, 0);
        grid.slot_indication(slot);
        assert!(!CsiRsScheduler::new(cfg).schedule(grid.get_mut(slot).unwrap()));
    }
}
