//! SS/PBCH block scheduling
//!
//! Beam `i` of a burst is sent in slot `i / 2` of the SSB period, starting at
//! symbol 2 (even beams) or 8 (odd beams), over 4 symbols and 20 PRBs.

use std::sync::Arc;

use nextgsim_common::SlotPoint;
use tracing::warn;

use crate::cell::config::{CellConfiguration, MAX_SSB_BEAMS, SSB_NOF_PRBS, SSB_NOF_SYMBOLS};
use crate::cell::resource_grid::{Channel, GridRegion, Multiplexing, PrbInterval, SlotResources, SymbolInterval};
use crate::result::SsbInfo;

const SSB_START_SYMBOLS: [u8; 2] = [2, 8];

/// SSB scheduler of one cell.
#[derive(Debug, Clone)]
pub struct SsbScheduler {
    cfg: Arc<CellConfiguration>,
}

impl SsbScheduler {
    /// Creates the scheduler.
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        Self { cfg }
    }

    /// SS/PBCH blocks transmitted in `slot`.
    pub fn beams_in_slot(&self, slot: SlotPoint) -> Vec<SsbInfo> {
        let pos = slot.count() % self.cfg.ssb_period_slots();
        let prbs = PrbInterval::new(self.cfg.ssb.offset_prb, self.cfg.ssb.offset_prb + SSB_NOF_PRBS);
        (0..MAX_SSB_BEAMS)
            .filter(|beam| self.cfg.ssb.beam_bitmap & (1 << beam) != 0 && (beam / 2) as u32 == pos)
            .map(|beam| {
                let start = SSB_START_SYMBOLS[(beam % 2) as usize];
                SsbInfo {
                    beam,
                    region: GridRegion::new(SymbolInterval::new(start, start + SSB_NOF_SYMBOLS), prbs),
                }
            })
            .collect()
    }

    /// Reserves the blocks of the slot of `res` and returns how many were placed.
    pub fn schedule(&self, res: &mut SlotResources) -> u32 {
        let mut placed = 0;
        for ssb in self.beams_in_slot(res.slot) {
            if let Err(err) = res.dl.reserve(ssb.region, Channel::Ssb, Multiplexing::Exclusive) {
                warn!(slot = %res.slot, beam = ssb.beam, "SSB not transmitted: {err}");
                continue;
            }
            res.result.dl.ssbs.push(ssb);
            placed += 1;
        }
        placed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::resource_grid::CellResourceAllocator;
    use nextgsim_common::config::{CellConfig, SchedulerExpertConfig};
    use nextgsim_common::{CellIndex, SubcarrierSpacing};

    fn scheduler(period_ms: u32, beam_bitmap: u8) -> SsbScheduler {
        let mut cell = CellConfig::default();
        cell.ssb.period_ms = period_ms;
        cell.ssb.beam_bitmap = beam_bitmap;
        cell.sib1.period_ms = 160;
        let cfg = CellConfiguration::new(CellIndex(0), &cell, &SchedulerExpertConfig::default()).unwrap();
        SsbScheduler::new(Arc::new(cfg))
    }

    fn slot(n: u32) -> SlotPoint {
        SlotPoint::new(SubcarrierSpacing::Khz15, n)
    }

    #[test]
    fn test_single_beam_period() {
        let ssb = scheduler(20, 0b1);
        assert_eq!(ssb.beams_in_slot(slot(0)).len(), 1);
        assert!(ssb.beams_in_slot(slot(1)).is_empty());
        assert_eq!(ssb.beams_in_slot(slot(20)).len(), 1);
        assert!(ssb.beams_in_slot(slot(10)).is_empty());
    }

    #[test]
    fn test_four_beams_over_two_slots() {
        let ssb = scheduler(10, 0b1111);
        let first = ssb.beams_in_slot(slot(0));
        let second = ssb.beams_in_slot(slot(1));
        assert_eq!(first.iter().map(|b| b.beam).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(second.iter().map(|b| b.beam).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(first[0].region.symbols, SymbolInterval::new(2, 6));
        assert_eq!(first[1].region.symbols, SymbolInterval::new(8, 12));
    }

    #[test]
    fn test_schedule_reserves_grid() {
        let ssb = scheduler(10, 0b11);
        let mut grid = CellResourceAllocator::new(ssb.cfg.clone());
        grid.slot_indication(slot(0));
        let res = grid.get_mut(slot(0)).unwrap();
        assert_eq!(ssb.schedule(res), 2);
        assert_eq!(res.result.dl.ssbs.len(), 2);
        assert!(!res.dl.is_free(&res.result.dl.ssbs[1].region));
    }
}
