//! PDCCH candidate positions (TS 38.213 §10.1)

use nextgsim_common::Rnti;

use crate::cell::config::{SearchSpace, SearchSpaceKind};
use crate::result::AggregationLevel;

/// Multipliers `A_p` indexed by `CORESET id mod 3`.
const HASH_MULTIPLIERS: [u64; 3] = [39827, 39829, 39839];
const HASH_MODULUS: u64 = 65537;

/// Hashing value `Y_{p, n_s}` of a UE-specific search space.
///
/// `Y_{p,-1} = RNTI` and `Y_{p,n} = (A_p * Y_{p,n-1}) mod 65537`.
pub fn ue_ss_hash(rnti: Rnti, coreset_id: u8, slot_index: u32) -> u32 {
    let a = HASH_MULTIPLIERS[coreset_id as usize % 3];
    let mut y = rnti.value() as u64;
    for _ in 0..=slot_index {
        y = (a * y) % HASH_MODULUS;
    }
    y as u32
}

/// First CCE of every candidate of `aggregation_level` in `ss`, in candidate
/// order and without duplicates.
pub fn candidate_cces(
    ss: &SearchSpace,
    aggregation_level: AggregationLevel,
    rnti: Rnti,
    slot_index: u32,
) -> Vec<u16> {
    let nof_candidates = ss.candidates[aggregation_level.index()] as u32;
    let nof_cces = ss.coreset.nof_cces() as u32;
    let l = aggregation_level.nof_cces() as u32;
    if nof_candidates == 0 || nof_cces < l {
        return Vec::new();
    }

    let y = match ss.kind {
        SearchSpaceKind::Common => 0,
        SearchSpaceKind::UeSpecific => ue_ss_hash(rnti, ss.coreset.id, slot_index),
    };
    let nof_blocks = nof_cces / l;

    let mut cces: Vec<u16> = Vec::with_capacity(nof_candidates as usize);
    for m in 0..nof_candidates {
        let offset = (m * nof_cces) / (l * nof_candidates);
        let cce = (l * ((y + offset) % nof_blocks)) as u16;
        if !cces.contains(&cce) {
            cces.push(cce);
        }
    }
    cces
}

/// Lowest aggregation level expected to decode at the given wideband CQI.
pub fn aggregation_level_for_cqi(cqi: u8) -> AggregationLevel {
    match cqi {
        10.. => AggregationLevel::L1,
        7..=9 => AggregationLevel::L2,
        4..=6 => AggregationLevel::L4,
        _ => AggregationLevel::L8,
    }
}

/// Lowest aggregation level keeping the DCI code rate at or below 3/4.
///
/// A CCE carries 108 QPSK REs (216 coded bits); the DCI adds a 24-bit CRC.
pub fn aggregation_level_for_payload(payload_bits: u16) -> AggregationLevel {
    let coded = (payload_bits as u32 + 24) * 4;
    AggregationLevel::ALL
        .into_iter()
        .find(|al| coded <= 3 * 216 * al.nof_cces() as u32)
        .unwrap_or(AggregationLevel::L16)
}
