//! Validated, immutable cell configuration
//!
//! `CellConfiguration` is built once from the YAML-level `CellConfig` and the
//! scheduler expert parameters, then shared as `Arc` by every component of the
//! cell. Reconfiguration builds a new instance.

use nextgsim_common::config::{
    CellConfig, CsiRsConfig, PagingConfig, PrachConfig, PucchConfig, SchedulerExpertConfig,
    SiMessageConfig, Sib1Config, SsbConfig, TddPatternConfig,
};
use nextgsim_common::{CellIndex, SlotPoint, SubcarrierSpacing, NOF_OFDM_SYMBOLS_PER_SLOT};
use thiserror::Error;

use crate::cell::resource_grid::{GridRegion, PrbInterval, SymbolInterval};
use crate::ue::mcs::MAX_MCS;

/// Number of PRBs of an SS/PBCH block.
pub const SSB_NOF_PRBS: u16 = 20;
/// Number of OFDM symbols of an SS/PBCH block.
pub const SSB_NOF_SYMBOLS: u8 = 4;
/// Maximum number of SSB beams supported.
pub const MAX_SSB_BEAMS: u8 = 4;
/// Number of REGs (PRB x symbol) in one CCE.
pub const NOF_REGS_PER_CCE: u16 = 6;

const SSB_PERIODS_MS: [u32; 6] = [5, 10, 20, 40, 80, 160];
/// Paging and UE DRX cycles in radio frames (TS 38.331 PagingCycle).
pub const PAGING_CYCLES_RF: [u32; 4] = [32, 64, 128, 256];

/// Errors detected while validating a cell configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CellConfigError {
    /// PCI out of range
    #[error("PCI {0} out of range (0..=1007)")]
    InvalidPci(u16),
    /// Bandwidth/SCS combination not in TS 38.101-1 Table 5.3.2-1
    #[error("no PRB mapping for {bandwidth_mhz} MHz at {scs}")]
    UnsupportedBandwidth {
        /// Configured bandwidth
        bandwidth_mhz: u32,
        /// Configured subcarrier spacing
        scs: SubcarrierSpacing,
    },
    /// SSB misconfiguration
    #[error("invalid SSB configuration: {0}")]
    InvalidSsb(String),
    /// CORESET misconfiguration
    #[error("invalid CORESET#{id}: {reason}")]
    InvalidCoreset {
        /// CORESET id
        id: u8,
        /// What is wrong
        reason: String,
    },
    /// Search space without usable candidates
    #[error("invalid search space: {0}")]
    InvalidSearchSpace(String),
    /// PRACH misconfiguration
    #[error("invalid PRACH configuration: {0}")]
    InvalidPrach(String),
    /// PUCCH misconfiguration
    #[error("invalid PUCCH configuration: {0}")]
    InvalidPucch(String),
    /// TDD misconfiguration
    #[error("invalid TDD pattern: {0}")]
    InvalidTdd(String),
    /// Paging misconfiguration
    #[error("invalid paging configuration: {0}")]
    InvalidPaging(String),
    /// SI scheduling misconfiguration
    #[error("invalid SI scheduling: {0}")]
    InvalidSi(String),
    /// CSI-RS misconfiguration
    #[error("invalid CSI-RS configuration: {0}")]
    InvalidCsiRs(String),
    /// k1/k2 misconfiguration
    #[error("invalid timing: {0}")]
    InvalidTiming(String),
    /// Ring too small for the scheduling delays
    #[error("resource grid ring of {ring_size} slots must exceed the largest scheduling delay {max_delay}")]
    RingTooSmall {
        /// Configured ring size
        ring_size: u32,
        /// Largest delay between slot_tx and a reservation
        max_delay: u32,
    },
    /// HARQ misconfiguration
    #[error("invalid HARQ configuration: {0}")]
    InvalidHarq(String),
    /// Scheduler parameter out of range
    #[error("invalid scheduler parameter: {0}")]
    InvalidExpert(String),
}

/// Returns the carrier width in PRBs (TS 38.101-1 Table 5.3.2-1, FR1).
pub fn nof_prbs_for_bandwidth(scs: SubcarrierSpacing, bandwidth_mhz: u32) -> Option<u16> {
    let nof_prbs = match (scs, bandwidth_mhz) {
        (SubcarrierSpacing::Khz15, 5) => 25,
        (SubcarrierSpacing::Khz15, 10) => 52,
        (SubcarrierSpacing::Khz15, 15) => 79,
        (SubcarrierSpacing::Khz15, 20) => 106,
        (SubcarrierSpacing::Khz15, 25) => 133,
        (SubcarrierSpacing::Khz15, 30) => 160,
        (SubcarrierSpacing::Khz15, 40) => 216,
        (SubcarrierSpacing::Khz15, 50) => 270,
        (SubcarrierSpacing::Khz30, 5) => 11,
        (SubcarrierSpacing::Khz30, 10) => 24,
        (SubcarrierSpacing::Khz30, 15) => 38,
        (SubcarrierSpacing::Khz30, 20) => 51,
        (SubcarrierSpacing::Khz30, 25) => 65,
        (SubcarrierSpacing::Khz30, 30) => 78,
        (SubcarrierSpacing::Khz30, 40) => 106,
        (SubcarrierSpacing::Khz30, 50) => 133,
        (SubcarrierSpacing::Khz30, 60) => 162,
        (SubcarrierSpacing::Khz30, 80) => 217,
        (SubcarrierSpacing::Khz30, 100) => 273,
        _ => return None,
    };
    Some(nof_prbs)
}

/// Msg3 PUSCH additional delay Δ (TS 38.214 Table 6.1.2.1.1-5).
pub fn msg3_delta(scs: SubcarrierSpacing) -> u8 {
    match scs {
        SubcarrierSpacing::Khz15 => 2,
        SubcarrierSpacing::Khz30 => 3,
        SubcarrierSpacing::Khz60 => 4,
        SubcarrierSpacing::Khz120 => 6,
    }
}

/// Control resource set with non-interleaved CCE-to-REG mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coreset {
    /// CORESET id (0 for the common CORESET)
    pub id: u8,
    /// PRBs spanned
    pub prbs: PrbInterval,
    /// Number of symbols, starting at symbol 0
    pub duration: u8,
}

impl Coreset {
    /// Number of CCEs in the CORESET.
    pub fn nof_cces(&self) -> u16 {
        self.prbs.length() * self.duration as u16 / NOF_REGS_PER_CCE
    }

    /// Grid region covered by `aggregation_level` CCEs starting at `cce_index`.
    pub fn cce_region(&self, cce_index: u16, aggregation_level: u16) -> GridRegion {
        let prbs_per_cce = NOF_REGS_PER_CCE / self.duration as u16;
        let start = self.prbs.start() + cce_index * prbs_per_cce;
        GridRegion::new(
            SymbolInterval::new(0, self.duration),
            PrbInterval::new(start, start + aggregation_level * prbs_per_cce),
        )
    }
}

/// Search space type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchSpaceKind {
    /// Type0/1/2 common search space on CORESET#0
    Common,
    /// UE-specific search space on CORESET#1
    UeSpecific,
}

/// PDCCH search space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSpace {
    /// Common or UE-specific
    pub kind: SearchSpaceKind,
    /// Monitored CORESET
    pub coreset: Coreset,
    /// Candidates per aggregation level {1, 2, 4, 8, 16}
    pub candidates: [u8; 5],
}

/// Immutable, validated cell configuration.
#[derive(Debug, Clone)]
pub struct CellConfiguration {
    /// Index of the cell in the DU
    pub cell_index: CellIndex,
    /// Physical cell identity
    pub pci: u16,
    /// Subcarrier spacing
    pub scs: SubcarrierSpacing,
    /// Carrier width in PRBs
    pub nof_prbs: u16,
    /// TDD pattern, FDD if absent
    pub tdd: Option<TddPatternConfig>,
    /// SSB configuration
    pub ssb: SsbConfig,
    /// Common search space on CORESET#0
    pub common_ss: SearchSpace,
    /// UE-specific search space on CORESET#1
    pub ue_ss: SearchSpace,
    /// PRACH configuration
    pub prach: PrachConfig,
    /// SIB1 configuration
    pub sib1: Sib1Config,
    /// SI messages
    pub si_messages: Vec<SiMessageConfig>,
    /// SI window length in slots
    pub si_window_slots: u32,
    /// Paging configuration
    pub paging: PagingConfig,
    /// CSI-RS configuration
    pub csi_rs: Option<CsiRsConfig>,
    /// PUCCH configuration
    pub pucch: PucchConfig,
    /// Sorted k1 candidates
    pub k1_candidates: Vec<u8>,
    /// Sorted k2 candidates
    pub k2_candidates: Vec<u8>,
    /// Msg3 additional delay
    pub msg3_delta: u8,
    /// DL HARQ processes per UE
    pub nof_dl_harqs: u8,
    /// UL HARQ processes per UE
    pub nof_ul_harqs: u8,
    /// UE capacity of the cell
    pub max_nof_ues: u16,
    /// PDSCH time-domain allocation
    pub pdsch_symbols: SymbolInterval,
    /// PUSCH time-domain allocation
    pub pusch_symbols: SymbolInterval,
    /// Scheduler expert parameters
    pub expert: SchedulerExpertConfig,
}

impl CellConfiguration {
    /// Validates `cell` and `expert` and derives the runtime configuration.
    pub fn new(
        cell_index: CellIndex,
        cell: &CellConfig,
        expert: &SchedulerExpertConfig,
    ) -> Result<Self, CellConfigError> {
        if cell.pci > 1007 {
            return Err(CellConfigError::InvalidPci(cell.pci));
        }
        let nof_prbs = nof_prbs_for_bandwidth(cell.scs, cell.bandwidth_mhz).ok_or(
            CellConfigError::UnsupportedBandwidth {
                bandwidth_mhz: cell.bandwidth_mhz,
                scs: cell.scs,
            },
        )?;

        let coreset0 = build_coreset(0, &cell.coreset0, nof_prbs)?;
        let coreset1 = build_coreset(1, &cell.coreset1, nof_prbs)?;
        let common_ss = build_search_space(SearchSpaceKind::Common, coreset0, cell.common_ss_candidates)?;
        let ue_ss = build_search_space(SearchSpaceKind::UeSpecific, coreset1, cell.ue_ss_candidates)?;

        let pdsch_start = common_ss.coreset.duration.max(ue_ss.coreset.duration);

        let mut k1_candidates = cell.k1_candidates.clone();
        k1_candidates.sort_unstable();
        k1_candidates.dedup();
        let mut k2_candidates = cell.k2_candidates.clone();
        k2_candidates.sort_unstable();
        k2_candidates.dedup();

        let config = Self {
            cell_index,
            pci: cell.pci,
            scs: cell.scs,
            nof_prbs,
            tdd: cell.tdd,
            ssb: cell.ssb.clone(),
            common_ss,
            ue_ss,
            prach: cell.prach.clone(),
            sib1: cell.sib1.clone(),
            si_messages: cell.si_messages.clone(),
            si_window_slots: cell.si_window_slots,
            paging: cell.paging.clone(),
            csi_rs: cell.csi_rs.clone(),
            pucch: cell.pucch.clone(),
            k1_candidates,
            k2_candidates,
            msg3_delta: msg3_delta(cell.scs),
            nof_dl_harqs: cell.nof_dl_harqs,
            nof_ul_harqs: cell.nof_ul_harqs,
            max_nof_ues: cell.max_nof_ues,
            pdsch_symbols: SymbolInterval::new(pdsch_start, NOF_OFDM_SYMBOLS_PER_SLOT),
            pusch_symbols: SymbolInterval::new(0, NOF_OFDM_SYMBOLS_PER_SLOT),
            expert: expert.clone(),
        };

        config.validate_tdd()?;
        config.validate_ssb()?;
        config.validate_pucch()?;
        config.validate_prach()?;
        config.validate_paging()?;
        config.validate_si()?;
        config.validate_csi_rs()?;
        config.validate_timing()?;
        config.validate_harq()?;
        config.validate_expert()?;

        Ok(config)
    }

    /// Returns a copy of this configuration with new expert parameters.
    pub fn with_expert_config(&self, expert: &SchedulerExpertConfig) -> Result<Self, CellConfigError> {
        let mut config = self.clone();
        config.expert = expert.clone();
        config.validate_timing()?;
        config.validate_expert()?;
        Ok(config)
    }

    /// CORESET#0.
    pub fn coreset0(&self) -> &Coreset {
        &self.common_ss.coreset
    }

    /// CORESET#1.
    pub fn coreset1(&self) -> &Coreset {
        &self.ue_ss.coreset
    }

    /// True if DL transmissions may be scheduled in `slot`.
    pub fn is_dl_slot(&self, slot: SlotPoint) -> bool {
        match &self.tdd {
            None => true,
            Some(tdd) => slot.count() % tdd.period_slots < tdd.nof_dl_slots,
        }
    }

    /// True if UL transmissions may be scheduled in `slot`.
    pub fn is_ul_slot(&self, slot: SlotPoint) -> bool {
        match &self.tdd {
            None => true,
            Some(tdd) => slot.count() % tdd.period_slots >= tdd.period_slots - tdd.nof_ul_slots,
        }
    }

    fn is_dl_slot_index(&self, count: u32) -> bool {
        self.is_dl_slot(SlotPoint::new(self.scs, count))
    }

    fn is_ul_slot_index(&self, count: u32) -> bool {
        self.is_ul_slot(SlotPoint::new(self.scs, count))
    }

    /// SSB burst period in slots.
    pub fn ssb_period_slots(&self) -> u32 {
        self.ssb.period_ms * self.scs.nof_slots_per_subframe()
    }

    /// SIB1 period in slots.
    pub fn sib1_period_slots(&self) -> u32 {
        self.sib1.period_ms * self.scs.nof_slots_per_subframe()
    }

    /// Slot offsets inside the SSB period that carry at least one beam.
    pub fn ssb_beam_slots(&self) -> Vec<u32> {
        let mut slots: Vec<u32> = (0..MAX_SSB_BEAMS)
            .filter(|beam| self.ssb.beam_bitmap & (1 << beam) != 0)
            .map(|beam| (beam / 2) as u32)
            .collect();
        slots.dedup();
        slots
    }

    /// PRBs available to PUSCH, i.e. the UL band minus the PUCCH guardbands.
    pub fn pusch_prb_limits(&self) -> PrbInterval {
        PrbInterval::new(self.pucch.guardband_prbs, self.nof_prbs - self.pucch.guardband_prbs)
    }

    /// PRBs available to PDSCH.
    pub fn pdsch_prb_limits(&self) -> PrbInterval {
        PrbInterval::new(0, self.nof_prbs)
    }

    /// Largest delay between slot_tx and any reservation made from it.
    pub fn max_scheduling_delay(&self) -> u32 {
        let k1 = self.k1_candidates.last().copied().unwrap_or(0) as u32;
        let k2 = self.k2_candidates.last().copied().unwrap_or(0) as u32;
        k1.max(k2 + self.msg3_delta as u32)
    }

    fn validate_tdd(&self) -> Result<(), CellConfigError> {
        let Some(tdd) = &self.tdd else {
            return Ok(());
        };
        if tdd.period_slots == 0 || tdd.nof_dl_slots == 0 || tdd.nof_ul_slots == 0 {
            return Err(CellConfigError::InvalidTdd(
                "period, DL slots and UL slots must be non-zero".to_string(),
            ));
        }
        if tdd.nof_dl_slots + tdd.nof_ul_slots > tdd.period_slots {
            return Err(CellConfigError::InvalidTdd(format!(
                "{} DL + {} UL slots exceed the period of {}",
                tdd.nof_dl_slots, tdd.nof_ul_slots, tdd.period_slots
            )));
        }
        let hyper_period = SlotPoint::new(self.scs, 0).nof_slots_per_period();
        if hyper_period % tdd.period_slots != 0 {
            return Err(CellConfigError::InvalidTdd(format!(
                "period of {} slots does not divide the SFN cycle",
                tdd.period_slots
            )));
        }
        Ok(())
    }

    fn validate_ssb(&self) -> Result<(), CellConfigError> {
        if !SSB_PERIODS_MS.contains(&self.ssb.period_ms) {
            return Err(CellConfigError::InvalidSsb(format!(
                "period {} ms not one of {:?}",
                self.ssb.period_ms, SSB_PERIODS_MS
            )));
        }
        if self.ssb.beam_bitmap == 0 || self.ssb.beam_bitmap >= (1 << MAX_SSB_BEAMS) {
            return Err(CellConfigError::InvalidSsb(format!(
                "beam bitmap {:#06b} must select 1 to {} beams",
                self.ssb.beam_bitmap, MAX_SSB_BEAMS
            )));
        }
        if self.ssb.offset_prb + SSB_NOF_PRBS > self.nof_prbs {
            return Err(CellConfigError::InvalidSsb(format!(
                "block at PRB {} does not fit in {} PRBs",
                self.ssb.offset_prb, self.nof_prbs
            )));
        }
        for slot in self.ssb_beam_slots() {
            if !self.is_dl_slot_index(slot) {
                return Err(CellConfigError::InvalidSsb(format!("beam slot {slot} is not a DL slot")));
            }
        }
        Ok(())
    }

    fn validate_pucch(&self) -> Result<(), CellConfigError> {
        let pucch = &self.pucch;
        if pucch.guardband_prbs == 0 || 2 * pucch.guardband_prbs >= self.nof_prbs {
            return Err(CellConfigError::InvalidPucch(format!(
                "guardband of {} PRBs per edge does not fit in {} PRBs",
                pucch.guardband_prbs, self.nof_prbs
            )));
        }
        if pucch.f1_resources_per_prb == 0 {
            return Err(CellConfigError::InvalidPucch(
                "format 1 needs at least one resource per PRB".to_string(),
            ));
        }
        if pucch.f2_max_payload_bits < 3 {
            return Err(CellConfigError::InvalidPucch(format!(
                "format 2 payload of {} bits is below the format 1 capacity",
                pucch.f2_max_payload_bits
            )));
        }
        if pucch.sr_period_slots == 0 {
            return Err(CellConfigError::InvalidPucch("SR period must be non-zero".to_string()));
        }
        Ok(())
    }

    fn validate_prach(&self) -> Result<(), CellConfigError> {
        let prach = &self.prach;
        if prach.period_slots == 0 || prach.slot_offset >= prach.period_slots {
            return Err(CellConfigError::InvalidPrach(format!(
                "slot offset {} outside period {}",
                prach.slot_offset, prach.period_slots
            )));
        }
        if prach.nof_prbs == 0 || prach.nof_symbols == 0 {
            return Err(CellConfigError::InvalidPrach("empty occasion".to_string()));
        }
        if prach.start_symbol + prach.nof_symbols > NOF_OFDM_SYMBOLS_PER_SLOT {
            return Err(CellConfigError::InvalidPrach(format!(
                "symbols {}+{} exceed the slot",
                prach.start_symbol, prach.nof_symbols
            )));
        }
        let limits = self.pusch_prb_limits();
        if prach.frequency_start < limits.start() || prach.frequency_start + prach.nof_prbs > limits.stop() {
            return Err(CellConfigError::InvalidPrach(format!(
                "PRBs [{}, {}) overlap the PUCCH guardbands or exceed the carrier",
                prach.frequency_start,
                prach.frequency_start + prach.nof_prbs
            )));
        }
        if prach.ra_resp_window_slots == 0 {
            return Err(CellConfigError::InvalidPrach("empty RA response window".to_string()));
        }
        if let Some(tdd) = &self.tdd {
            if prach.period_slots % tdd.period_slots != 0 || !self.is_ul_slot_index(prach.slot_offset) {
                return Err(CellConfigError::InvalidPrach(format!(
                    "occasion at slot offset {} is not aligned to an UL slot",
                    prach.slot_offset
                )));
            }
        }
        Ok(())
    }

    fn validate_paging(&self) -> Result<(), CellConfigError> {
        let paging = &self.paging;
        let t = paging.default_paging_cycle_rf;
        if !PAGING_CYCLES_RF.contains(&t) {
            return Err(CellConfigError::InvalidPaging(format!("paging cycle {t} not supported")));
        }
        let n = paging.nof_pf_per_cycle;
        if n == 0 || t % n != 0 || t / n > 16 {
            return Err(CellConfigError::InvalidPaging(format!("N = {n} is not one of T, T/2, .., T/16")));
        }
        if ![1, 2, 4].contains(&paging.nof_po_per_pf) {
            return Err(CellConfigError::InvalidPaging(format!(
                "Ns = {} not one of 1, 2, 4",
                paging.nof_po_per_pf
            )));
        }
        let po_spacing = self.scs.nof_slots_per_frame() / paging.nof_po_per_pf;
        if paging.po_slot_offset >= po_spacing {
            return Err(CellConfigError::InvalidPaging(format!(
                "PO slot offset {} exceeds the PO spacing of {po_spacing} slots",
                paging.po_slot_offset
            )));
        }
        if paging.mcs > MAX_MCS {
            return Err(CellConfigError::InvalidPaging(format!("MCS {} out of range", paging.mcs)));
        }
        Ok(())
    }

    fn validate_si(&self) -> Result<(), CellConfigError> {
        if self.sib1.period_ms == 0 || self.sib1.period_ms % self.ssb.period_ms != 0 {
            return Err(CellConfigError::InvalidSi(format!(
                "SIB1 period {} ms is not a multiple of the SSB period",
                self.sib1.period_ms
            )));
        }
        if self.sib1.mcs > MAX_MCS {
            return Err(CellConfigError::InvalidSi(format!("SIB1 MCS {} out of range", self.sib1.mcs)));
        }
        if self.si_messages.is_empty() {
            return Ok(());
        }
        let w = self.si_window_slots;
        if w == 0 {
            return Err(CellConfigError::InvalidSi("SI window must be non-zero".to_string()));
        }
        for (n, msg) in self.si_messages.iter().enumerate() {
            let period = msg.period_radio_frames * self.scs.nof_slots_per_frame();
            if period == 0 || (n as u32 + 1) * w > period {
                return Err(CellConfigError::InvalidSi(format!(
                    "window {n} of {w} slots does not fit in a period of {period} slots"
                )));
            }
            if 1024 % msg.period_radio_frames != 0 {
                return Err(CellConfigError::InvalidSi(format!(
                    "period of {} frames does not divide the SFN cycle",
                    msg.period_radio_frames
                )));
            }
        }
        Ok(())
    }

    fn validate_csi_rs(&self) -> Result<(), CellConfigError> {
        let Some(csi) = &self.csi_rs else {
            return Ok(());
        };
        if csi.period_slots == 0 || csi.slot_offset >= csi.period_slots {
            return Err(CellConfigError::InvalidCsiRs(format!(
                "slot offset {} outside period {}",
                csi.slot_offset, csi.period_slots
            )));
        }
        if csi.symbol < self.pdsch_symbols.start() || csi.symbol >= NOF_OFDM_SYMBOLS_PER_SLOT {
            return Err(CellConfigError::InvalidCsiRs(format!(
                "symbol {} outside the PDSCH region",
                csi.symbol
            )));
        }
        Ok(())
    }

    fn validate_timing(&self) -> Result<(), CellConfigError> {
        if self.k1_candidates.is_empty() || self.k2_candidates.is_empty() {
            return Err(CellConfigError::InvalidTiming("k1 and k2 candidate lists must not be empty".to_string()));
        }
        if self.k1_candidates[0] == 0 || self.k2_candidates[0] == 0 {
            return Err(CellConfigError::InvalidTiming("k1 and k2 must be at least 1".to_string()));
        }
        let max_delay = self.max_scheduling_delay();
        if self.expert.ring_size <= max_delay {
            return Err(CellConfigError::RingTooSmall {
                ring_size: self.expert.ring_size,
                max_delay,
            });
        }
        Ok(())
    }

    fn validate_harq(&self) -> Result<(), CellConfigError> {
        let max = nextgsim_common::MAX_NOF_HARQS as u8;
        for (dir, n) in [("DL", self.nof_dl_harqs), ("UL", self.nof_ul_harqs)] {
            if n == 0 || n > max {
                return Err(CellConfigError::InvalidHarq(format!(
                    "{n} {dir} HARQ processes, expected 1..={max}"
                )));
            }
        }
        if self.max_nof_ues == 0 {
            return Err(CellConfigError::InvalidHarq("cell must admit at least one UE".to_string()));
        }
        Ok(())
    }

    fn validate_expert(&self) -> Result<(), CellConfigError> {
        let expert = &self.expert;
        let mcs_fields = [
            ("fixed_dl_mcs", expert.fixed_dl_mcs),
            ("fixed_ul_mcs", expert.fixed_ul_mcs),
            ("rar_mcs", Some(expert.rar_mcs)),
            ("msg3_mcs", Some(expert.msg3_mcs)),
        ];
        for (name, mcs) in mcs_fields {
            if let Some(mcs) = mcs {
                if mcs > MAX_MCS {
                    return Err(CellConfigError::InvalidExpert(format!("{name} {mcs} exceeds {MAX_MCS}")));
                }
            }
        }
        if expert.initial_cqi > 15 {
            return Err(CellConfigError::InvalidExpert(format!(
                "initial CQI {} exceeds 15",
                expert.initial_cqi
            )));
        }
        if !(expert.olla_target_bler > 0.0 && expert.olla_target_bler < 1.0) {
            return Err(CellConfigError::InvalidExpert(format!(
                "OLLA target BLER {} outside (0, 1)",
                expert.olla_target_bler
            )));
        }
        if expert.indication_queue_capacity == 0 {
            return Err(CellConfigError::InvalidExpert("indication queue capacity must be non-zero".to_string()));
        }
        if expert.max_ue_dl_prbs == 0 || expert.max_ue_ul_prbs == 0 {
            return Err(CellConfigError::InvalidExpert("per-UE PRB caps must be non-zero".to_string()));
        }
        if expert.msg3_size_bytes == 0 {
            return Err(CellConfigError::InvalidExpert("Msg3 size must be non-zero".to_string()));
        }
        let exponent = expert.lc_priority_weight_exponent;
        if !exponent.is_finite() || exponent < 0.0 {
            return Err(CellConfigError::InvalidExpert(format!(
                "LC priority weight exponent {exponent} must be finite and non-negative"
            )));
        }
        Ok(())
    }
}

fn build_coreset(
    id: u8,
    config: &nextgsim_common::config::CoresetConfig,
    nof_prbs: u16,
) -> Result<Coreset, CellConfigError> {
    if config.duration == 0 || config.duration > 3 {
        return Err(CellConfigError::InvalidCoreset {
            id,
            reason: format!("duration {} outside 1..=3", config.duration),
        });
    }
    if config.start_prb >= nof_prbs {
        return Err(CellConfigError::InvalidCoreset {
            id,
            reason: format!("start PRB {} outside the carrier", config.start_prb),
        });
    }
    let width = config.nof_prbs.unwrap_or(nof_prbs - config.start_prb);
    let width = width - width % NOF_REGS_PER_CCE;
    if width == 0 || config.start_prb + width > nof_prbs {
        return Err(CellConfigError::InvalidCoreset {
            id,
            reason: format!("{width} PRBs from PRB {} do not fit in {nof_prbs} PRBs", config.start_prb),
        });
    }
    Ok(Coreset {
        id,
        prbs: PrbInterval::new(config.start_prb, config.start_prb + width),
        duration: config.duration,
    })
}

fn build_search_space(
    kind: SearchSpaceKind,
    coreset: Coreset,
    candidates: [u8; 5],
) -> Result<SearchSpace, CellConfigError> {
    let nof_cces = coreset.nof_cces();
    let usable = candidates
        .iter()
        .enumerate()
        .any(|(i, &n)| n > 0 && (1u16 << i) <= nof_cces);
    if !usable {
        return Err(CellConfigError::InvalidSearchSpace(format!(
            "{kind:?} search space has no candidate fitting in {nof_cces} CCEs"
        )));
    }
    Ok(SearchSpace {
        kind,
        coreset,
        candidates,
    })
}
