//! Per-cell time-frequency resource grid
//!
//! Each slot carries a DL and an UL grid of 14 symbols x N PRBs. Occupancy is
//! kept as one bit row per symbol plus the list of allocations that produced it,
//! so that a reservation can be released again when a later step of the same
//! grant fails. A ring of slot entries covers the scheduling pipeline
//! `[slot_tx, slot_tx + ring_size)`.

use std::fmt;
use std::sync::Arc;

use bitvec::prelude::*;
use nextgsim_common::{SlotPoint, NOF_OFDM_SYMBOLS_PER_SLOT};
use thiserror::Error;

use crate::cell::config::CellConfiguration;
use crate::result::SchedResult;

// ============================================================================
// Intervals and regions
// ============================================================================

/// Half-open PRB interval `[start, stop)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PrbInterval {
    start: u16,
    stop: u16,
}

impl PrbInterval {
    /// Creates an interval. `start` must not exceed `stop`.
    pub fn new(start: u16, stop: u16) -> Self {
        assert!(start <= stop, "invalid PRB interval [{start}, {stop})");
        Self { start, stop }
    }

    /// First PRB.
    pub fn start(&self) -> u16 {
        self.start
    }

    /// One past the last PRB.
    pub fn stop(&self) -> u16 {
        self.stop
    }

    /// Number of PRBs.
    pub fn length(&self) -> u16 {
        self.stop - self.start
    }

    /// True if the interval holds no PRB.
    pub fn is_empty(&self) -> bool {
        self.start == self.stop
    }

    /// True if the two intervals share a PRB.
    pub fn overlaps(&self, other: &PrbInterval) -> bool {
        self.start < other.stop && other.start < self.stop
    }

    /// True if `other` lies fully inside this interval.
    pub fn contains(&self, other: &PrbInterval) -> bool {
        other.start >= self.start && other.stop <= self.stop
    }
}

impl fmt::Display for PrbInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.stop)
    }
}

/// Half-open OFDM symbol interval `[start, stop)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SymbolInterval {
    start: u8,
    stop: u8,
}

impl SymbolInterval {
    /// Creates an interval inside one slot.
    pub fn new(start: u8, stop: u8) -> Self {
        assert!(
            start <= stop && stop <= NOF_OFDM_SYMBOLS_PER_SLOT,
            "invalid symbol interval [{start}, {stop})"
        );
        Self { start, stop }
    }

    /// Whole slot.
    pub fn full_slot() -> Self {
        Self::new(0, NOF_OFDM_SYMBOLS_PER_SLOT)
    }

    /// First symbol.
    pub fn start(&self) -> u8 {
        self.start
    }

    /// One past the last symbol.
    pub fn stop(&self) -> u8 {
        self.stop
    }

    /// Number of symbols.
    pub fn length(&self) -> u8 {
        self.stop - self.start
    }

    /// True if the two intervals share a symbol.
    pub fn overlaps(&self, other: &SymbolInterval) -> bool {
        self.start < other.stop && other.start < self.stop
    }
}

impl fmt::Display for SymbolInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.stop)
    }
}

/// Rectangle of symbols x PRBs within one slot grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridRegion {
    /// Symbols
    pub symbols: SymbolInterval,
    /// PRBs
    pub prbs: PrbInterval,
}

impl GridRegion {
    /// Creates a region.
    pub fn new(symbols: SymbolInterval, prbs: PrbInterval) -> Self {
        Self { symbols, prbs }
    }

    /// True if the regions share at least one resource element.
    pub fn overlaps(&self, other: &GridRegion) -> bool {
        self.symbols.overlaps(&other.symbols) && self.prbs.overlaps(&other.prbs)
    }
}

// ============================================================================
// Channels and multiplexing rules
// ============================================================================

/// Physical channel or signal occupying grid resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// SS/PBCH block
    Ssb,
    /// NZP-CSI-RS
    CsiRs,
    /// PDCCH
    Pdcch,
    /// PDSCH (broadcast, paging, RAR or UE data)
    Pdsch,
    /// PRACH occasion
    Prach,
    /// PUCCH guardband reservation at the UL band edges
    PucchGuardband,
    /// PUCCH format 1
    PucchF1,
    /// PUCCH format 2
    PucchF2,
    /// PUSCH
    Pusch,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Ssb => "SSB",
            Channel::CsiRs => "CSI-RS",
            Channel::Pdcch => "PDCCH",
            Channel::Pdsch => "PDSCH",
            Channel::Prach => "PRACH",
            Channel::PucchGuardband => "PUCCH-GB",
            Channel::PucchF1 => "PUCCH-F1",
            Channel::PucchF2 => "PUCCH-F2",
            Channel::Pusch => "PUSCH",
        };
        write!(f, "{name}")
    }
}

/// How a reservation treats resources already in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplexing {
    /// Every resource element must be free.
    Exclusive,
    /// Overlap is accepted where [`may_multiplex`] allows it.
    Declared,
}

/// Multiplexing rule table: may `new` be placed on top of `existing`?
///
/// - PDSCH is rate-matched around CSI-RS.
/// - PUCCH resources live inside the PUCCH guardband.
/// - Format 1 resources are code-multiplexed in the same PRB.
pub fn may_multiplex(new: Channel, existing: Channel) -> bool {
    matches!(
        (new, existing),
        (Channel::Pdsch, Channel::CsiRs)
            | (Channel::PucchF1, Channel::PucchGuardband)
            | (Channel::PucchF2, Channel::PucchGuardband)
            | (Channel::PucchF1, Channel::PucchF1)
    )
}

// ============================================================================
// Slot grid
// ============================================================================

/// Errors of grid operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GridError {
    /// Some resource element is used by a channel that does not tolerate the new one
    #[error("{channel} conflicts with existing {existing}")]
    ResourceConflict {
        /// Channel being reserved
        channel: Channel,
        /// First occupant blocking the reservation
        existing: Channel,
    },
    /// Slot outside the scheduling window
    #[error("slot {slot} outside window starting at {slot_tx} ({ring_size} slots)")]
    OutOfWindow {
        /// Requested slot
        slot: SlotPoint,
        /// Current transmission slot
        slot_tx: SlotPoint,
        /// Window size
        ring_size: u32,
    },
    /// No slot indication received yet
    #[error("resource grid has not received a slot indication")]
    NotStarted,
}

/// Identifier of one reservation inside a slot grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocationHandle(u32);

/// One reservation recorded in a slot grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridAllocation {
    /// Handle returned by `reserve`
    pub handle: AllocationHandle,
    /// Occupying channel
    pub channel: Channel,
    /// Occupied region
    pub region: GridRegion,
}

/// Occupancy of one direction of one slot.
#[derive(Debug, Clone)]
pub struct SlotGrid {
    nof_prbs: u16,
    symbols: Vec<BitVec>,
    allocations: Vec<GridAllocation>,
    next_handle: u32,
}

impl SlotGrid {
    /// Creates an empty grid of `nof_prbs` PRBs.
    pub fn new(nof_prbs: u16) -> Self {
        Self {
            nof_prbs,
            symbols: vec![bitvec![0; nof_prbs as usize]; NOF_OFDM_SYMBOLS_PER_SLOT as usize],
            allocations: Vec::new(),
            next_handle: 0,
        }
    }

    /// Carrier width.
    pub fn nof_prbs(&self) -> u16 {
        self.nof_prbs
    }

    /// Current reservations.
    pub fn allocations(&self) -> &[GridAllocation] {
        &self.allocations
    }

    /// True if no resource element of `region` is in use.
    pub fn is_free(&self, region: &GridRegion) -> bool {
        self.check_bounds(region);
        let (start, stop) = (region.prbs.start() as usize, region.prbs.stop() as usize);
        (region.symbols.start()..region.symbols.stop())
            .all(|sym| self.symbols[sym as usize][start..stop].not_any())
    }

    /// True if `channel` could be reserved on `region` with `Declared` multiplexing.
    pub fn is_free_for(&self, region: &GridRegion, channel: Channel) -> bool {
        self.first_blocking(region, channel).is_none()
    }

    /// Reserves `region` for `channel`.
    pub fn reserve(
        &mut self,
        region: GridRegion,
        channel: Channel,
        multiplexing: Multiplexing,
    ) -> Result<AllocationHandle, GridError> {
        if !self.is_free(&region) {
            let blocking = match multiplexing {
                Multiplexing::Exclusive => self
                    .allocations
                    .iter()
                    .find(|a| a.region.overlaps(&region))
                    .map(|a| a.channel),
                Multiplexing::Declared => self.first_blocking(&region, channel),
            };
            if let Some(existing) = blocking {
                return Err(GridError::ResourceConflict { channel, existing });
            }
        }

        let handle = AllocationHandle(self.next_handle);
        self.next_handle += 1;
        self.fill(&region);
        self.allocations.push(GridAllocation {
            handle,
            channel,
            region,
        });
        Ok(handle)
    }

    /// Undoes a reservation. Returns false if the handle is unknown.
    pub fn release(&mut self, handle: AllocationHandle) -> bool {
        let Some(pos) = self.allocations.iter().position(|a| a.handle == handle) else {
            return false;
        };
        self.allocations.remove(pos);
        self.rebuild();
        true
    }

    /// First-fit search for `nof_prbs` contiguous PRBs inside `limits` that
    /// `channel` may occupy on `symbols`.
    pub fn find_free_prbs(
        &self,
        symbols: SymbolInterval,
        nof_prbs: u16,
        limits: PrbInterval,
        channel: Channel,
    ) -> Option<PrbInterval> {
        if nof_prbs == 0 {
            return None;
        }
        let blocked = self.blocked_prbs(symbols, channel);
        let mut run_start = limits.start();
        let mut run_len = 0u16;
        for prb in limits.start()..limits.stop() {
            if blocked[prb as usize] {
                run_len = 0;
                run_start = prb + 1;
                continue;
            }
            run_len += 1;
            if run_len == nof_prbs {
                return Some(PrbInterval::new(run_start, run_start + nof_prbs));
            }
        }
        None
    }

    /// Largest contiguous PRB interval inside `limits` that `channel` may occupy
    /// on `symbols`. The lowest one wins on ties.
    pub fn largest_free_prbs(
        &self,
        symbols: SymbolInterval,
        limits: PrbInterval,
        channel: Channel,
    ) -> Option<PrbInterval> {
        let blocked = self.blocked_prbs(symbols, channel);
        let mut best: Option<PrbInterval> = None;
        let mut run_start = limits.start();
        for prb in limits.start()..=limits.stop() {
            let end_of_run = prb == limits.stop() || blocked[prb as usize];
            if !end_of_run {
                continue;
            }
            if prb > run_start && best.map_or(true, |b| prb - run_start > b.length()) {
                best = Some(PrbInterval::new(run_start, prb));
            }
            run_start = prb + 1;
        }
        best
    }

    /// Number of PRBs with at least one used symbol in `symbols`.
    pub fn nof_used_prbs(&self, symbols: SymbolInterval) -> u16 {
        let mut used = bitvec![0; self.nof_prbs as usize];
        for sym in symbols.start()..symbols.stop() {
            for prb in self.symbols[sym as usize].iter_ones() {
                used.set(prb, true);
            }
        }
        used.count_ones() as u16
    }

    /// Removes every reservation.
    pub fn clear(&mut self) {
        self.allocations.clear();
        for row in &mut self.symbols {
            row.fill(false);
        }
    }

    fn check_bounds(&self, region: &GridRegion) {
        assert!(
            region.prbs.stop() <= self.nof_prbs,
            "region {} beyond {} PRBs",
            region.prbs,
            self.nof_prbs
        );
    }

    fn fill(&mut self, region: &GridRegion) {
        let (start, stop) = (region.prbs.start() as usize, region.prbs.stop() as usize);
        for sym in region.symbols.start()..region.symbols.stop() {
            self.symbols[sym as usize][start..stop].fill(true);
        }
    }

    fn rebuild(&mut self) {
        for row in &mut self.symbols {
            row.fill(false);
        }
        let regions: Vec<GridRegion> = self.allocations.iter().map(|a| a.region).collect();
        for region in &regions {
            self.fill(region);
        }
    }

    fn first_blocking(&self, region: &GridRegion, channel: Channel) -> Option<Channel> {
        self.check_bounds(region);
        self.allocations
            .iter()
            .find(|a| a.region.overlaps(region) && !may_multiplex(channel, a.channel))
            .map(|a| a.channel)
    }

    fn blocked_prbs(&self, symbols: SymbolInterval, channel: Channel) -> BitVec {
        let mut blocked = bitvec![0; self.nof_prbs as usize];
        for alloc in &self.allocations {
            if alloc.region.symbols.overlaps(&symbols) && !may_multiplex(channel, alloc.channel) {
                let prbs = alloc.region.prbs;
                blocked[prbs.start() as usize..prbs.stop() as usize].fill(true);
            }
        }
        blocked
    }
}

// ============================================================================
// Slot ring
// ============================================================================

/// Resources and in-construction result of one slot.
#[derive(Debug, Clone)]
pub struct SlotResources {
    /// Slot this entry currently represents
    pub slot: SlotPoint,
    /// DL grid
    pub dl: SlotGrid,
    /// UL grid
    pub ul: SlotGrid,
    /// Scheduling result under construction
    pub result: SchedResult,
}

impl SlotResources {
    fn new(slot: SlotPoint, nof_prbs: u16) -> Self {
        Self {
            slot,
            dl: SlotGrid::new(nof_prbs),
            ul: SlotGrid::new(nof_prbs),
            result: SchedResult::new(slot),
        }
    }

    fn reset(&mut self, slot: SlotPoint) {
        self.slot = slot;
        self.dl.clear();
        self.ul.clear();
        self.result = SchedResult::new(slot);
    }
}

/// Ring of slot entries spanning the scheduling pipeline.
#[derive(Debug)]
pub struct CellResourceAllocator {
    cfg: Arc<CellConfiguration>,
    ring: Vec<SlotResources>,
    slot_tx: Option<SlotPoint>,
    /// Absolute number of slots elapsed since the first indication, modulo-free.
    abs_tx: u64,
}

impl CellResourceAllocator {
    /// Creates the ring. The ring size was validated against the scheduling
    /// delays by `CellConfiguration::new`.
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        let ring_size = cfg.expert.ring_size as usize;
        assert!(ring_size as u32 > cfg.max_scheduling_delay(), "ring too small");
        let placeholder = SlotPoint::new(cfg.scs, 0);
        let ring = (0..ring_size)
            .map(|_| SlotResources::new(placeholder, cfg.nof_prbs))
            .collect();
        Self {
            cfg,
            ring,
            slot_tx: None,
            abs_tx: 0,
        }
    }

    /// Number of slots in the window.
    pub fn ring_size(&self) -> u32 {
        self.ring.len() as u32
    }

    /// Current transmission slot.
    pub fn slot_tx(&self) -> Option<SlotPoint> {
        self.slot_tx
    }

    /// Cell configuration the grid was built for.
    pub fn config(&self) -> &Arc<CellConfiguration> {
        &self.cfg
    }

    /// Advances the window so that it starts at `slot_tx`. Entries of slots that
    /// left the window are cleared and reused for the slots entering it.
    pub fn slot_indication(&mut self, slot_tx: SlotPoint) {
        let ring_size = self.ring.len() as u64;
        let delta = self.slot_tx.map(|prev| {
            let delta = slot_tx - prev;
            assert!(delta > 0, "slot {slot_tx} does not follow {prev}");
            delta as u64
        });
        let advance = delta.map_or(ring_size, |d| d.min(ring_size));
        self.abs_tx += delta.unwrap_or(0);
        self.slot_tx = Some(slot_tx);

        // The last `advance` slots of the new window are the ones entering it.
        for offset in (ring_size - advance)..ring_size {
            let slot = slot_tx + offset as u32;
            let idx = ((self.abs_tx + offset) % ring_size) as usize;
            self.ring[idx].reset(slot);
        }
    }

    /// Returns the entry of `slot`.
    pub fn get(&self, slot: SlotPoint) -> Result<&SlotResources, GridError> {
        let idx = self.index_of(slot)?;
        Ok(&self.ring[idx])
    }

    /// Returns the entry of `slot` for modification.
    pub fn get_mut(&mut self, slot: SlotPoint) -> Result<&mut SlotResources, GridError> {
        let idx = self.index_of(slot)?;
        Ok(&mut self.ring[idx])
    }

    /// Returns the entry at `slot_tx + offset`.
    pub fn get_at_offset_mut(&mut self, offset: u32) -> Result<&mut SlotResources, GridError> {
        let slot_tx = self.slot_tx.ok_or(GridError::NotStarted)?;
        self.get_mut(slot_tx + offset)
    }

    /// Returns the entries of two different slots for modification, e.g. the
    /// PDCCH slot and the slot of the PDSCH HARQ-ACK or of the PUSCH.
    pub fn get_pair_mut(
        &mut self,
        first: SlotPoint,
        second: SlotPoint,
    ) -> Result<(&mut SlotResources, &mut SlotResources), GridError> {
        let a = self.index_of(first)?;
        let b = self.index_of(second)?;
        assert_ne!(a, b, "slot {first} requested twice");
        if a < b {
            let (low, high) = self.ring.split_at_mut(b);
            Ok((&mut low[a], &mut high[0]))
        } else {
            let (low, high) = self.ring.split_at_mut(a);
            Ok((&mut high[0], &mut low[b]))
        }
    }

    fn index_of(&self, slot: SlotPoint) -> Result<usize, GridError> {
        let slot_tx = self.slot_tx.ok_or(GridError::NotStarted)?;
        let ring_size = self.ring.len() as u32;
        let distance = slot - slot_tx;
        if distance < 0 || distance as u32 >= ring_size {
            return Err(GridError::OutOfWindow {
                slot,
                slot_tx,
                ring_size,
            });
        }
        let idx = ((self.abs_tx + distance as u64) % ring_size as u64) as usize;
        debug_assert_eq!(self.ring[idx].slot, slot);
        Ok(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nextgsim_common::config::{CellConfig, SchedulerExpertConfig};
    use nextgsim_common::{CellIndex, SubcarrierSpacing};

    fn region(sym: (u8, u8), prbs: (u16, u16)) -> GridRegion {
        GridRegion::new(SymbolInterval::new(sym.0, sym.1), PrbInterval::new(prbs.0, prbs.1))
    }

    fn allocator() -> CellResourceAllocator {
        let cfg = CellConfiguration::new(CellIndex(0), &CellConfig::default(), &SchedulerExpertConfig::default())
            .unwrap();
        CellResourceAllocator::new(Arc::new(cfg))
    }

    #[test]
    fn test_prb_interval_overlap() {
        let a = PrbInterval::new(0, 10);
        assert!(a.overlaps(&PrbInterval::new(9, 12)));
        assert!(!a.overlaps(&PrbInterval::new(10, 12)));
        assert!(a.contains(&PrbInterval::new(2, 5)));
        assert_eq!(a.length(), 10);
    }

    #[test]
    fn test_reserve_conflict() {
        let mut grid = SlotGrid::new(52);
        grid.reserve(region((2, 14), (0, 10)), Channel::Pdsch, Multiplexing::Exclusive)
            .unwrap();
        let err = grid
            .reserve(region((0, 3), (5, 8)), Channel::Pdcch, Multiplexing::Exclusive)
            .unwrap_err();
        assert_eq!(
            err,
            GridError::ResourceConflict {
                channel: Channel::Pdcch,
                existing: Channel::Pdsch
            }
        );
        grid.reserve(region((0, 2), (5, 8)), Channel::Pdcch, Multiplexing::Exclusive)
            .unwrap();
        assert_eq!(grid.allocations().len(), 2);
    }

    #[test]
    fn test_declared_multiplexing() {
        let mut grid = SlotGrid::new(52);
        grid.reserve(region((12, 13), (0, 52)), Channel::CsiRs, Multiplexing::Exclusive)
            .unwrap();
        assert!(grid
            .reserve(region((2, 14), (0, 10)), Channel::Pdsch, Multiplexing::Exclusive)
            .is_err());
        grid.reserve(region((2, 14), (0, 10)), Channel::Pdsch, Multiplexing::Declared)
            .unwrap();
        // PDCCH never multiplexes
        assert!(grid
            .reserve(region((12, 13), (20, 22)), Channel::Pdcch, Multiplexing::Declared)
            .is_err());
    }

    #[test]
    fn test_pucch_multiplexing_rules() {
        assert!(may_multiplex(Channel::PucchF1, Channel::PucchF1));
        assert!(!may_multiplex(Channel::PucchF2, Channel::PucchF2));
        assert!(may_multiplex(Channel::PucchF2, Channel::PucchGuardband));
        assert!(!may_multiplex(Channel::Pusch, Channel::PucchGuardband));
        assert!(!may_multiplex(Channel::CsiRs, Channel::Pdsch));
    }

    #[test]
    fn test_release_restores_occupancy() {
        let mut grid = SlotGrid::new(52);
        let a = grid
            .reserve(region((0, 14), (0, 4)), Channel::Pusch, Multiplexing::Exclusive)
            .unwrap();
        let b = grid
            .reserve(region((0, 14), (4, 8)), Channel::Pusch, Multiplexing::Exclusive)
            .unwrap();
        assert!(grid.release(a));
        assert!(!grid.release(a));
        assert!(grid.is_free(&region((0, 14), (0, 4))));
        assert!(!grid.is_free(&region((0, 14), (4, 5))));
        assert!(grid.release(b));
        assert_eq!(grid.nof_used_prbs(SymbolInterval::full_slot()), 0);
    }

    #[test]
    fn test_find_free_prbs_first_fit() {
        let mut grid = SlotGrid::new(52);
        grid.reserve(region((2, 6), (0, 20)), Channel::Ssb, Multiplexing::Exclusive)
            .unwrap();
        grid.reserve(region((2, 14), (25, 30)), Channel::Pdsch, Multiplexing::Exclusive)
            .unwrap();
        let symbols = SymbolInterval::new(2, 14);
        let limits = PrbInterval::new(0, 52);
        assert_eq!(
            grid.find_free_prbs(symbols, 5, limits, Channel::Pdsch),
            Some(PrbInterval::new(20, 25))
        );
        assert_eq!(
            grid.find_free_prbs(symbols, 6, limits, Channel::Pdsch),
            Some(PrbInterval::new(30, 36))
        );
        assert_eq!(grid.find_free_prbs(symbols, 23, limits, Channel::Pdsch), None);
        // Symbols outside the SSB leave its PRBs free
        assert_eq!(
            grid.find_free_prbs(SymbolInterval::new(6, 14), 10, limits, Channel::Pdsch),
            Some(PrbInterval::new(0, 10))
        );
    }

    #[test]
    fn test_largest_free_prbs() {
        let mut grid = SlotGrid::new(52);
        grid.reserve(region((0, 14), (10, 12)), Channel::Pusch, Multiplexing::Exclusive)
            .unwrap();
        let largest = grid.largest_free_prbs(SymbolInterval::full_slot(), PrbInterval::new(0, 52), Channel::Pusch);
        assert_eq!(largest, Some(PrbInterval::new(12, 52)));
        let limited = grid.largest_free_prbs(SymbolInterval::full_slot(), PrbInterval::new(0, 11), Channel::Pusch);
        assert_eq!(limited, Some(PrbInterval::new(0, 10)));
    }

    #[test]
    fn test_ring_window() {
        let mut res = allocator();
        let start = SlotPoint::new(SubcarrierSpacing::Khz15, 100);
        assert_eq!(res.get(start).unwrap_err(), GridError::NotStarted);

        res.slot_indication(start);
        assert!(res.get(start).is_ok());
        assert!(res.get(start + 19).is_ok());
        assert!(matches!(res.get(start + 20), Err(GridError::OutOfWindow { .. })));
        assert!(matches!(res.get(start - 1), Err(GridError::OutOfWindow { .. })));
    }

    #[test]
    fn test_ring_rotation_clears_reused_entry() {
        let mut res = allocator();
        let start = SlotPoint::new(SubcarrierSpacing::Khz15, 0);
        res.slot_indication(start);
        let r = region((0, 14), (10, 20));
        res.get_mut(start + 5)
            .unwrap()
            .ul
            .reserve(r, Channel::Pusch, Multiplexing::Exclusive)
            .unwrap();

        for n in 1..=5 {
            res.slot_indication(start + n);
        }
        // Reservation survives while its slot stays in the window
        assert!(!res.get(start + 5).unwrap().ul.is_free(&r));

        for n in 6..=25 {
            res.slot_indication(start + n);
        }
        let entry = res.get(start + 25).unwrap();
        assert!(entry.ul.is_free(&r));
        assert_eq!(entry.slot, start + 25);
    }

    #[test]
    fn test_ring_across_sfn_wrap() {
        let mut res = allocator();
        let start = SlotPoint::new(SubcarrierSpacing::Khz15, 10235);
        res.slot_indication(start);
        let target = start + 10;
        assert_eq!(target.count(), 5);
        res.get_mut(target)
            .unwrap()
            .dl
            .reserve(region((0, 2), (0, 6)), Channel::Pdcch, Multiplexing::Exclusive)
            .unwrap();
        for n in 1..=10 {
            res.slot_indication(start + n);
        }
        assert_eq!(res.get(target).unwrap().dl.allocations().len(), 1);
    }

    #[test]
    fn test_get_pair_mut() {
        let mut res = allocator();
        let start = SlotPoint::new(SubcarrierSpacing::Khz15, 18);
        res.slot_indication(start);
        let (pdcch_slot, ack_slot) = res.get_pair_mut(start + 4, start).unwrap();
        assert_eq!(pdcch_slot.slot, start + 4);
        assert_eq!(ack_slot.slot, start);
        assert!(res.get_pair_mut(start, start + 20).is_err());
    }

    #[test]
    fn test_ring_slot_jump_resets_all() {
        let mut res = allocator();
        let start = SlotPoint::new(SubcarrierSpacing::Khz15, 0);
        res.slot_indication(start);
        res.get_mut(start + 3)
            .unwrap()
            .dl
            .reserve(region((0, 2), (0, 6)), Channel::Pdcch, Multiplexing::Exclusive)
            .unwrap();
        let later = start + 50;
        res.slot_indication(later);
        for n in 0..20 {
            let entry = res.get(later + n).unwrap();
            assert_eq!(entry.slot, later + n);
            assert!(entry.dl.allocations().is_empty());
        }
    }
}
