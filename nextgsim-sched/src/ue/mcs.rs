//! MCS tables, transport block size and link adaptation
//!
//! MCS index table 1 for PDSCH/PUSCH (TS 38.214 Table 5.1.3.1-1, up to 64QAM)
//! and the TBS determination of TS 38.214 §5.1.3.2 for a single layer.

use nextgsim_common::NOF_SUBCARRIERS_PER_RB;

/// Highest MCS index of table 1.
pub const MAX_MCS: u8 = 28;

/// DMRS REs per PRB (one front-loaded type 1 symbol, no data in its CDM groups).
pub const DMRS_RES_PER_PRB: u32 = 12;

/// (modulation order, target code rate x 1024) per MCS index.
const MCS_TABLE: [(u8, u16); 29] = [
    (2, 120),
    (2, 157),
    (2, 193),
    (2, 251),
    (2, 308),
    (2, 379),
    (2, 449),
    (2, 526),
    (2, 602),
    (2, 679),
    (4, 340),
    (4, 378),
    (4, 434),
    (4, 490),
    (4, 553),
    (4, 616),
    (4, 658),
    (6, 438),
    (6, 466),
    (6, 517),
    (6, 567),
    (6, 616),
    (6, 666),
    (6, 719),
    (6, 772),
    (6, 822),
    (6, 873),
    (6, 910),
    (6, 948),
];

/// TBS for `N_info <= 3824` (TS 38.214 Table 5.1.3.2-1).
const TBS_TABLE: [u32; 93] = [
    24, 32, 40, 48, 56, 64, 72, 80, 88, 96, 104, 112, 120, 128, 136, 144, 152, 160, 168, 176, 184, 192, 208, 224,
    240, 256, 272, 288, 304, 320, 336, 352, 368, 384, 408, 432, 456, 480, 504, 528, 552, 576, 608, 640, 672, 704,
    736, 768, 808, 848, 888, 928, 984, 1032, 1064, 1128, 1160, 1192, 1224, 1256, 1288, 1320, 1352, 1416, 1480,
    1544, 1608, 1672, 1736, 1800, 1864, 1928, 2024, 2088, 2152, 2216, 2280, 2408, 2472, 2536, 2600, 2664, 2728,
    2792, 2856, 2976, 3104, 3240, 3368, 3496, 3624, 3752, 3824,
];

/// CQI (table 1) to MCS (table 1) mapping.
const CQI_TO_MCS: [u8; 16] = [0, 0, 0, 2, 4, 6, 8, 11, 13, 15, 18, 20, 22, 24, 26, 28];

/// Modulation order and code rate x 1024 of `mcs`.
pub fn mcs_params(mcs: u8) -> (u8, u16) {
    assert!(mcs <= MAX_MCS, "MCS {mcs} out of range");
    MCS_TABLE[mcs as usize]
}

/// Transport block size in bits for one layer.
pub fn tbs_bits(mcs: u8, nof_prbs: u16, nof_symbols: u8) -> u32 {
    if nof_prbs == 0 {
        return 0;
    }
    let (qm, rate_x1024) = mcs_params(mcs);
    let re_per_prb = (NOF_SUBCARRIERS_PER_RB as u32 * nof_symbols as u32).saturating_sub(DMRS_RES_PER_PRB);
    let n_re = re_per_prb.min(156) * nof_prbs as u32;
    let rate = rate_x1024 as f64 / 1024.0;
    let n_info = n_re as f64 * rate * qm as f64;
    if n_info <= 0.0 {
        return 0;
    }

    if n_info <= 3824.0 {
        let n = (n_info.log2().floor() as i32 - 6).max(3);
        let step = 2f64.powi(n);
        let n_info_q = (step * (n_info / step).floor()).max(24.0) as u32;
        return TBS_TABLE
            .iter()
            .copied()
            .find(|&tbs| tbs >= n_info_q)
            .unwrap_or(3824);
    }

    let n = (n_info - 24.0).log2().floor() as i32 - 5;
    let step = 2f64.powi(n);
    let n_info_q = (step * ((n_info - 24.0) / step).round()).max(3840.0);
    let tbs = if rate <= 0.25 {
        let c = ((n_info_q + 24.0) / 3816.0).ceil();
        8.0 * c * ((n_info_q + 24.0) / (8.0 * c)).ceil() - 24.0
    } else if n_info_q > 8424.0 {
        let c = ((n_info_q + 24.0) / 8424.0).ceil();
        8.0 * c * ((n_info_q + 24.0) / (8.0 * c)).ceil() - 24.0
    } else {
        8.0 * ((n_info_q + 24.0) / 8.0).ceil() - 24.0
    };
    tbs as u32
}

/// Transport block size in bytes.
pub fn tbs_bytes(mcs: u8, nof_prbs: u16, nof_symbols: u8) -> u32 {
    tbs_bits(mcs, nof_prbs, nof_symbols) / 8
}

/// Smallest PRB count in `1..=max_prbs` whose TBS holds `bytes`, or `max_prbs`
/// if none does.
pub fn prbs_for_bytes(bytes: u32, mcs: u8, nof_symbols: u8, max_prbs: u16) -> u16 {
    if max_prbs == 0 {
        return 0;
    }
    let (mut lo, mut hi) = (1u16, max_prbs);
    if tbs_bytes(mcs, hi, nof_symbols) < bytes {
        return max_prbs;
    }
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if tbs_bytes(mcs, mid, nof_symbols) >= bytes {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    lo
}

/// MCS matching a wideband CQI report.
pub fn cqi_to_mcs(cqi: u8) -> u8 {
    CQI_TO_MCS[cqi.min(15) as usize]
}

/// MCS for a PUSCH received at `snr_db`.
pub fn ul_snr_to_mcs(snr_db: f32) -> u8 {
    (snr_db + 2.0).floor().clamp(0.0, MAX_MCS as f32) as u8
}

/// Outer-loop link adaptation.
///
/// Keeps an MCS offset that drops by `step` on every NACK and rises by
/// `step * bler / (1 - bler)` on every ACK, so that the offset settles where
/// the observed BLER equals the target.
#[derive(Debug, Clone, PartialEq)]
pub struct Olla {
    offset: f64,
    step_down: f64,
    step_up: f64,
    max_offset: f64,
}

impl Olla {
    /// Creates a controller for `target_bler` in `(0, 1)`.
    pub fn new(target_bler: f64, step: f64, max_offset: f64) -> Self {
        Self {
            offset: 0.0,
            step_down: step,
            step_up: step * target_bler / (1.0 - target_bler),
            max_offset,
        }
    }

    /// Current offset in MCS steps.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Records a positive acknowledgement.
    pub fn ack(&mut self) {
        self.offset = (self.offset + self.step_up).min(self.max_offset);
    }

    /// Records a negative acknowledgement.
    pub fn nack(&mut self) {
        self.offset = (self.offset - self.step_down).max(-self.max_offset);
    }

    /// Applies the offset to an MCS from the inner loop.
    pub fn apply(&self, mcs: u8) -> u8 {
        (mcs as f64 + self.offset.floor()).clamp(0.0, MAX_MCS as f64) as u8
    }
}
