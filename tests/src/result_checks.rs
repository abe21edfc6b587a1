//! Resource-grid checks over published scheduling results
//!
//! Rebuilds the list of grid regions a `SchedResult` occupies and reports
//! every pair that overlaps without being one of the multiplexing exceptions:
//! PDSCH over CSI-RS and PUCCH format 1 resources code-multiplexed in the same
//! PRBs.

use std::fmt;

use nextgsim_sched::cell::GridRegion;
use nextgsim_sched::result::PucchFormat;
use nextgsim_sched::SchedResult;

/// Kind of grid allocation found in a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationKind {
    Ssb,
    CsiRs,
    Pdcch,
    Pdsch,
    Prach,
    PucchF1,
    PucchF2,
    Pusch,
}

/// One allocation of a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub kind: AllocationKind,
    pub region: GridRegion,
}

impl fmt::Display for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} symbols {} PRBs {}",
            self.kind, self.region.symbols, self.region.prbs
        )
    }
}

fn may_overlap(a: AllocationKind, b: AllocationKind) -> bool {
    use AllocationKind::*;
    matches!(
        (a, b),
        (Pdsch, CsiRs) | (CsiRs, Pdsch) | (PucchF1, PucchF1)
    )
}

/// DL allocations of `result`.
pub fn dl_allocations(result: &SchedResult) -> Vec<Allocation> {
    let mut allocations = Vec::new();
    for ssb in &result.dl.ssbs {
        allocations.push(Allocation {
            kind: AllocationKind::Ssb,
            region: ssb.region,
        });
    }
    for csi in &result.dl.csi_rs {
        allocations.push(Allocation {
            kind: AllocationKind::CsiRs,
            region: csi.region,
        });
    }
    for pdcch in &result.dl.pdcchs {
        allocations.push(Allocation {
            kind: AllocationKind::Pdcch,
            region: pdcch.region,
        });
    }
    for pdsch in result.all_pdschs() {
        allocations.push(Allocation {
            kind: AllocationKind::Pdsch,
            region: GridRegion::new(pdsch.symbols, pdsch.prbs),
        });
    }
    allocations
}

/// UL allocations of `result`.
pub fn ul_allocations(result: &SchedResult) -> Vec<Allocation> {
    let mut allocations = Vec::new();
    for prach in &result.ul.prachs {
        allocations.push(Allocation {
            kind: AllocationKind::Prach,
            region: prach.region,
        });
    }
    for pucch in &result.ul.pucchs {
        let kind = match pucch.format {
            PucchFormat::F1 => AllocationKind::PucchF1,
            PucchFormat::F2 => AllocationKind::PucchF2,
        };
        allocations.push(Allocation {
            kind,
            region: pucch.region,
        });
    }
    for pusch in &result.ul.puschs {
        allocations.push(Allocation {
            kind: AllocationKind::Pusch,
            region: GridRegion::new(pusch.symbols, pusch.prbs),
        });
    }
    allocations
}

fn overlaps_in(allocations: &[Allocation]) -> Vec<(Allocation, Allocation)> {
    let mut overlaps = Vec::new();
    for (i, a) in allocations.iter().enumerate() {
        for b in &allocations[i + 1..] {
            if a.region.overlaps(&b.region) && !may_overlap(a.kind, b.kind) {
                overlaps.push((*a, *b));
            }
        }
    }
    overlaps
}

/// Pairs of allocations of `result` that overlap illegally, DL then UL.
pub fn illegal_overlaps(result: &SchedResult) -> Vec<(Allocation, Allocation)> {
    let mut overlaps = overlaps_in(&dl_allocations(result));
    overlaps.extend(overlaps_in(&ul_allocations(result)));
    overlaps
}

/// Panics with a readable message if `result` has an illegal overlap.
pub fn assert_disjoint(result: &SchedResult) {
    let overlaps = illegal_overlaps(result);
    if let Some((a, b)) = overlaps.first() {
        panic!(
            "slot {}: {} overlapping allocation pairs, first: [{a}] and [{b}]",
            result.slot,
            overlaps.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nextgsim_common::{Rnti, SlotPoint, SubcarrierSpacing};
    use nextgsim_sched::cell::{PrbInterval, SymbolInterval};
    use nextgsim_sched::result::{CsiRsInfo, PdschInfo, SsbInfo};

    fn pdsch(prbs: (u16, u16)) -> PdschInfo {
        PdschInfo {
            rnti: Rnti::new(0x4601),
            prbs: PrbInterval::new(prbs.0, prbs.1),
            symbols: SymbolInterval::new(2, 14),
            mcs: 10,
            tbs_bytes: 100,
        }
    }

    #[test]
    fn test_csi_rs_under_pdsch_is_allowed() {
        let mut result = SchedResult::new(SlotPoint::new(SubcarrierSpacing::Khz15, 2));
        result.dl.csi_rs.push(CsiRsInfo {
            region: GridRegion::new(SymbolInterval::new(13, 14), PrbInterval::new(0, 106)),
        });
        let mut overlaps = overlaps_in(&dl_allocations(&result));
        assert!(overlaps.is_empty());

        result.dl.ssbs.push(SsbInfo {
            beam: 0,
            region: GridRegion::new(SymbolInterval::new(2, 6), PrbInterval::new(0, 20)),
        });
        let mut allocations = dl_allocations(&result);
        allocations.push(Allocation {
            kind: AllocationKind::Pdsch,
            region: GridRegion::new(pdsch((10, 30)).symbols, pdsch((10, 30)).prbs),
        });
        overlaps = overlaps_in(&allocations);
        // Only the SSB clash is reported
        assert_eq!(overlaps.len(), 1);
        assert_eq!(overlaps[0].0.kind, AllocationKind::Ssb);
    }
}
