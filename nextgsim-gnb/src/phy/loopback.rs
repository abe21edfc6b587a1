//! Feedback generation from slot results

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use nextgsim_common::config::SimulationConfig;
use nextgsim_common::{CellIndex, Rnti};
use nextgsim_sched::{
    CellIndication, CrcIndication, DetectedPreamble, RachIndication, SchedResult, UciIndication,
};

/// Number of contention-based preambles a simulated UE picks from.
const NOF_PREAMBLES: u8 = 64;

/// Largest timing advance command a simulated UE needs.
const MAX_TIMING_ADVANCE: u16 = 31;

/// Counters of generated feedback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhyStats {
    /// Slot results processed
    pub nof_results: u64,
    /// Preambles reported
    pub nof_preambles: u64,
    /// Successful CRCs
    pub nof_crc_ok: u64,
    /// Failed CRCs
    pub nof_crc_ko: u64,
    /// HARQ-ACKs reported
    pub nof_acks: u64,
    /// HARQ-NACKs reported
    pub nof_nacks: u64,
}

/// Loopback PHY of one cell.
#[derive(Debug, Clone)]
pub struct LoopbackPhy {
    rng: StdRng,
    sim: SimulationConfig,
    stats: PhyStats,
}

impl LoopbackPhy {
    /// Creates the PHY of `cell`. Each cell draws from its own seeded stream.
    pub fn new(sim: &SimulationConfig, cell: CellIndex) -> Self {
        Self {
            rng: StdRng::seed_from_u64(sim.seed.wrapping_add(cell.0 as u64)),
            sim: sim.clone(),
            stats: PhyStats::default(),
        }
    }

    /// Feedback generated so far.
    pub fn stats(&self) -> PhyStats {
        self.stats
    }

    /// Produces the indications answering `result`, in the order a PHY
    /// reports them: RACH, CRC, then UCI.
    pub fn process(&mut self, result: &SchedResult) -> Vec<CellIndication> {
        self.stats.nof_results += 1;
        let mut out = Vec::new();
        self.detect_preambles(result, &mut out);
        self.decode_puschs(result, &mut out);
        self.decode_pucchs(result, &mut out);
        out
    }

    fn draw(&mut self, probability: f64) -> bool {
        self.rng.gen_bool(probability.clamp(0.0, 1.0))
    }

    fn detect_preambles(&mut self, result: &SchedResult, out: &mut Vec<CellIndication>) {
        for (freq_index, occasion) in result.ul.prachs.iter().enumerate() {
            if !self.draw(self.sim.rach_probability) {
                continue;
            }
            let preamble = DetectedPreamble {
                preamble_id: self.rng.gen_range(0..NOF_PREAMBLES),
                timing_advance: self.rng.gen_range(0..=MAX_TIMING_ADVANCE),
            };
            self.stats.nof_preambles += 1;
            out.push(CellIndication::Rach(RachIndication {
                slot: result.slot,
                start_symbol: occasion.region.symbols.start(),
                freq_index: freq_index as u8,
                preambles: vec![preamble],
            }));
        }
    }

    fn decode_puschs(&mut self, result: &SchedResult, out: &mut Vec<CellIndication>) {
        for pusch in &result.ul.puschs {
            let ok = !self.draw(self.sim.ul_bler);
            if ok {
                self.stats.nof_crc_ok += 1;
            } else {
                self.stats.nof_crc_ko += 1;
            }
            out.push(CellIndication::Crc(CrcIndication {
                rnti: pusch.rnti,
                harq_id: pusch.harq_id,
                slot: result.slot,
                ok,
                ul_snr_db: Some(self.sim.ul_snr_db),
            }));

            if let Some(uci) = pusch.uci {
                if uci.harq_bits > 0 || uci.csi_bits > 0 {
                    let indication = self.uci(pusch.rnti, result, uci.harq_bits, uci.csi_bits > 0);
                    out.push(CellIndication::Uci(indication));
                }
            }
        }
    }

    fn decode_pucchs(&mut self, result: &SchedResult, out: &mut Vec<CellIndication>) {
        // A UE may have a HARQ-ACK and an SR/CSI PUCCH in the same slot; it
        // reports them together.
        let mut per_ue: BTreeMap<Rnti, (u16, bool)> = BTreeMap::new();
        for pucch in &result.ul.pucchs {
            let entry = per_ue.entry(pucch.rnti).or_default();
            entry.0 += pucch.harq_bits;
            entry.1 |= pucch.csi_bits > 0;
        }
        for (rnti, (harq_bits, has_csi)) in per_ue {
            if harq_bits == 0 && !has_csi {
                continue;
            }
            let indication = self.uci(rnti, result, harq_bits, has_csi);
            out.push(CellIndication::Uci(indication));
        }
    }

    fn uci(&mut self, rnti: Rnti, result: &SchedResult, harq_bits: u16, has_csi: bool) -> UciIndication {
        let harq_acks: Vec<bool> = (0..harq_bits).map(|_| !self.draw(self.sim.dl_bler)).collect();
        let nof_acks = harq_acks.iter().filter(|ack| **ack).count() as u64;
        self.stats.nof_acks += nof_acks;
        self.stats.nof_nacks += harq_acks.len() as u64 - nof_acks;
        UciIndication {
            rnti,
            slot: result.slot,
            harq_acks,
            sr: false,
            cqi: has_csi.then_some(self.sim.cqi),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nextgsim_common::{HarqId, SlotPoint, SubcarrierSpacing, UeIndex};
    use nextgsim_sched::cell::{GridRegion, PrbInterval, SymbolInterval};
    use nextgsim_sched::result::{PrachOccasion, PucchFormat, PucchInfo, UciOnPusch, UlGrant};

    fn sim() -> SimulationConfig {
        SimulationConfig {
            dl_bler: 0.0,
            ul_bler: 0.0,
            rach_probability: 1.0,
            cqi: 9,
            ..Default::default()
        }
    }

    fn slot() -> SlotPoint {
        SlotPoint::new(SubcarrierSpacing::Khz30, 19)
    }

    fn pucch(rnti: Rnti, harq_bits: u16, csi_bits: u16) -> PucchInfo {
        PucchInfo {
            ue_index: UeIndex(0),
            rnti,
            format: PucchFormat::F1,
            resource_id: 0,
            region: GridRegion::new(SymbolInterval::new(0, 14), PrbInterval::new(0, 1)),
            harq_bits,
            sr: false,
            csi_bits,
        }
    }

    fn pusch(rnti: Rnti, is_msg3: bool, uci: Option<UciOnPusch>) -> UlGrant {
        UlGrant {
            ue_index: None,
            rnti,
            harq_id: HarqId(2),
            is_retx: false,
            is_msg3,
            prbs: PrbInterval::new(10, 20),
            symbols: SymbolInterval::new(0, 14),
            mcs: 5,
            tbs_bytes: 200,
            uci,
        }
    }

    #[test]
    fn test_prach_occasion_yields_rach() {
        let mut phy = LoopbackPhy::new(&sim(), CellIndex(0));
        let mut result = SchedResult::new(slot());
        result.ul.prachs.push(PrachOccasion {
            region: GridRegion::new(SymbolInterval::new(2, 14), PrbInterval::new(0, 12)),
        });
        let out = phy.process(&result);
        assert_eq!(out.len(), 1);
        match &out[0] {
            CellIndication::Rach(rach) => {
                assert_eq!(rach.slot, slot());
                assert_eq!(rach.start_symbol, 2);
                assert_eq!(rach.preambles.len(), 1);
                assert!(rach.preambles[0].preamble_id < NOF_PREAMBLES);
            }
            other => panic!("unexpected indication: {other:?}"),
        }
    }

    #[test]
    fn test_pucchs_of_one_ue_are_merged() {
        let mut phy = LoopbackPhy::new(&sim(), CellIndex(0));
        let rnti = Rnti::new(0x4601);
        let mut result = SchedResult::new(slot());
        result.ul.pucchs.push(pucch(rnti, 1, 0));
        result.ul.pucchs.push(pucch(rnti, 1, 4));
        let out = phy.process(&result);
        assert_eq!(
            out,
            vec![CellIndication::Uci(UciIndication {
                rnti,
                slot: slot(),
                harq_acks: vec![true, true],
                sr: false,
                cqi: Some(9),
            })]
        );
        assert_eq!(phy.stats().nof_acks, 2);
    }

    #[test]
    fn test_pusch_yields_crc_then_uci() {
        let mut phy = LoopbackPhy::new(&sim(), CellIndex(0));
        let rnti = Rnti::new(0x4602);
        let mut result = SchedResult::new(slot());
        result.ul.puschs.push(pusch(
            rnti,
            false,
            Some(UciOnPusch {
                harq_bits: 1,
                csi_bits: 0,
            }),
        ));
        let out = phy.process(&result);
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], CellIndication::Crc(CrcIndication { ok: true, harq_id: HarqId(2), .. })));
        assert!(matches!(&out[1], CellIndication::Uci(uci) if uci.harq_acks == vec![true] && uci.cqi.is_none()));
    }

    #[test]
    fn test_certain_failure_is_reported() {
        let mut config = sim();
        config.ul_bler = 1.0;
        config.dl_bler = 1.0;
        let mut phy = LoopbackPhy::new(&config, CellIndex(0));
        let rnti = Rnti::new(0x4603);
        let mut result = SchedResult::new(slot());
        result.ul.puschs.push(pusch(rnti, true, None));
        result.ul.pucchs.push(pucch(rnti, 2, 0));
        let out = phy.process(&result);
        assert!(matches!(out[0], CellIndication::Crc(CrcIndication { ok: false, .. })));
        assert!(matches!(&out[1], CellIndication::Uci(uci) if uci.harq_acks == vec![false, false]));
        assert_eq!(phy.stats().nof_crc_ko, 1);
        assert_eq!(phy.stats().nof_nacks, 2);
    }

    #[test]
    fn test_same_seed_same_feedback() {
        let mut config = sim();
        config.rach_probability = 0.5;
        config.dl_bler = 0.3;
        let mut result = SchedResult::new(slot());
        result.ul.prachs.push(PrachOccasion {
            region: GridRegion::new(SymbolInterval::new(0, 14), PrbInterval::new(0, 12)),
        });
        result.ul.pucchs.push(pucch(Rnti::new(0x4601), 2, 0));

        let mut a = LoopbackPhy::new(&config, CellIndex(0));
        let mut b = LoopbackPhy::new(&config, CellIndex(0));
        for _ in 0..50 {
            assert_eq!(a.process(&result), b.process(&result));
        }
    }
}
