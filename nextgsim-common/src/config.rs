//! Configuration structures for the gNB cell scheduler
//!
//! These are the plain, serde-deserializable descriptions read from YAML. They
//! are validated and turned into immutable runtime structures by the scheduler
//! crate (`CellConfiguration`) and by the gNB config loader.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::logging::LogConfig;
use crate::types::SubcarrierSpacing;

/// Top-level gNB scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GnbConfig {
    /// Cells served by this DU
    #[serde(default = "default_cells")]
    pub cells: Vec<CellConfig>,
    /// Scheduler tuning parameters shared by all cells
    #[serde(default)]
    pub scheduler: SchedulerExpertConfig,
    /// Loopback simulation parameters used by the binary
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Logging setup
    #[serde(default)]
    pub logging: LogConfig,
}

fn default_cells() -> Vec<CellConfig> {
    vec![CellConfig::default()]
}

impl Default for GnbConfig {
    fn default() -> Self {
        Self {
            cells: default_cells(),
            scheduler: SchedulerExpertConfig::default(),
            simulation: SimulationConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl GnbConfig {
    /// Parses a YAML document. Missing sections take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, Error> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

/// Per-cell radio configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CellConfig {
    /// Physical cell identity (0..=1007)
    pub pci: u16,
    /// Subcarrier spacing of the active BWP
    pub scs: SubcarrierSpacing,
    /// Channel bandwidth in MHz
    pub bandwidth_mhz: u32,
    /// TDD pattern; FDD when absent
    pub tdd: Option<TddPatternConfig>,
    /// SS/PBCH block configuration
    pub ssb: SsbConfig,
    /// CORESET#0, used by the common search space
    pub coreset0: CoresetConfig,
    /// CORESET#1, used by the UE-specific search space
    pub coreset1: CoresetConfig,
    /// PDCCH candidates per aggregation level {1,2,4,8,16} in the common SS
    pub common_ss_candidates: [u8; 5],
    /// PDCCH candidates per aggregation level {1,2,4,8,16} in the UE SS
    pub ue_ss_candidates: [u8; 5],
    /// PRACH occasions and RA response window
    pub prach: PrachConfig,
    /// SIB1 broadcast
    pub sib1: Sib1Config,
    /// Other SI messages (SIB2+)
    pub si_messages: Vec<SiMessageConfig>,
    /// Length of an SI window in slots
    pub si_window_slots: u32,
    /// Paging frame/occasion parameters
    pub paging: PagingConfig,
    /// Periodic NZP-CSI-RS; disabled when absent
    pub csi_rs: Option<CsiRsConfig>,
    /// PUCCH resource layout
    pub pucch: PucchConfig,
    /// PDSCH to HARQ-ACK delays (k1) the scheduler may choose from
    pub k1_candidates: Vec<u8>,
    /// PDCCH to PUSCH delays (k2) the scheduler may choose from
    pub k2_candidates: Vec<u8>,
    /// Number of DL HARQ processes per UE
    pub nof_dl_harqs: u8,
    /// Number of UL HARQ processes per UE
    pub nof_ul_harqs: u8,
    /// Maximum number of UEs attached to the cell
    pub max_nof_ues: u16,
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            pci: 1,
            scs: SubcarrierSpacing::Khz15,
            bandwidth_mhz: 20,
            tdd: None,
            ssb: SsbConfig::default(),
            coreset0: CoresetConfig {
                start_prb: 0,
                nof_prbs: Some(48),
                duration: 2,
            },
            coreset1: CoresetConfig {
                start_prb: 0,
                nof_prbs: None,
                duration: 2,
            },
            common_ss_candidates: [0, 0, 2, 2, 1],
            ue_ss_candidates: [2, 2, 2, 2, 1],
            prach: PrachConfig::default(),
            sib1: Sib1Config::default(),
            si_messages: Vec::new(),
            si_window_slots: 10,
            paging: PagingConfig::default(),
            csi_rs: None,
            pucch: PucchConfig::default(),
            k1_candidates: vec![4, 5, 6, 7, 8],
            k2_candidates: vec![4, 5, 6, 7, 8],
            nof_dl_harqs: 8,
            nof_ul_harqs: 16,
            max_nof_ues: 64,
        }
    }
}

/// TDD UL/DL pattern. The first `nof_dl_slots` of each period are DL, the last
/// `nof_ul_slots` are UL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TddPatternConfig {
    /// Pattern periodicity in slots
    pub period_slots: u32,
    /// Full DL slots at the start of the period
    pub nof_dl_slots: u32,
    /// Full UL slots at the end of the period
    pub nof_ul_slots: u32,
}

/// SSB configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SsbConfig {
    /// Burst periodicity in ms (5, 10, 20, 40, 80 or 160)
    pub period_ms: u32,
    /// Lowest PRB of the SS/PBCH block
    pub offset_prb: u16,
    /// Bitmap of transmitted beams, bit i = beam i (up to 4 beams)
    pub beam_bitmap: u8,
}

impl Default for SsbConfig {
    fn default() -> Self {
        Self {
            period_ms: 20,
            offset_prb: 0,
            beam_bitmap: 0b1,
        }
    }
}

/// CORESET frequency/time extent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoresetConfig {
    /// First PRB
    pub start_prb: u16,
    /// Number of PRBs, rounded down to a multiple of 6. Whole carrier when absent.
    #[serde(default)]
    pub nof_prbs: Option<u16>,
    /// Number of OFDM symbols (1..=3), starting at symbol 0
    pub duration: u8,
}

/// PRACH occasion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrachConfig {
    /// Periodicity of PRACH occasions in slots
    pub period_slots: u32,
    /// Slot offset of the occasion within the period
    pub slot_offset: u32,
    /// First PRB of the occasion
    pub frequency_start: u16,
    /// Number of PRBs of one occasion
    pub nof_prbs: u16,
    /// First OFDM symbol
    pub start_symbol: u8,
    /// Number of OFDM symbols
    pub nof_symbols: u8,
    /// RAR response window (ra-ResponseWindow) in slots
    pub ra_resp_window_slots: u32,
}

impl Default for PrachConfig {
    fn default() -> Self {
        Self {
            period_slots: 10,
            slot_offset: 7,
            frequency_start: 4,
            nof_prbs: 6,
            start_symbol: 0,
            nof_symbols: 12,
            ra_resp_window_slots: 10,
        }
    }
}

/// SIB1 broadcast configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Sib1Config {
    /// Retransmission period in ms
    pub period_ms: u32,
    /// SIB1 payload size in bytes
    pub payload_bytes: u32,
    /// Fixed MCS (table 1)
    pub mcs: u8,
}

impl Default for Sib1Config {
    fn default() -> Self {
        Self {
            period_ms: 160,
            payload_bytes: 100,
            mcs: 5,
        }
    }
}

/// One SI message (SIB2 and later).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiMessageConfig {
    /// SI periodicity in radio frames
    pub period_radio_frames: u32,
    /// Payload size in bytes
    pub payload_bytes: u32,
}

/// Paging configuration (TS 38.304 §7.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    /// Default paging cycle T in radio frames (32, 64, 128 or 256)
    pub default_paging_cycle_rf: u32,
    /// Number of paging frames N per cycle (T, T/2, T/4, T/8 or T/16)
    pub nof_pf_per_cycle: u32,
    /// Number of paging occasions Ns per paging frame (1, 2 or 4)
    pub nof_po_per_pf: u32,
    /// Paging frame offset
    pub pf_offset: u32,
    /// Slot offset of the first paging occasion inside the paging frame
    pub po_slot_offset: u32,
    /// Fixed MCS of the paging PDSCH
    pub mcs: u8,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_paging_cycle_rf: 128,
            nof_pf_per_cycle: 128,
            nof_po_per_pf: 1,
            pf_offset: 0,
            po_slot_offset: 1,
            mcs: 5,
        }
    }
}

/// Periodic NZP-CSI-RS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsiRsConfig {
    /// Periodicity in slots
    pub period_slots: u32,
    /// Slot offset inside the period
    pub slot_offset: u32,
    /// OFDM symbol carrying the CSI-RS
    pub symbol: u8,
}

/// PUCCH resource layout and periodic UCI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PucchConfig {
    /// PRBs reserved for PUCCH at each edge of the UL band
    pub guardband_prbs: u16,
    /// Format 1 resources code-multiplexed in one PRB
    pub f1_resources_per_prb: u16,
    /// Maximum UCI payload of a format 2 resource in bits
    pub f2_max_payload_bits: u16,
    /// SR periodicity in slots
    pub sr_period_slots: u32,
    /// Periodic CSI report periodicity in slots (0 disables CSI reporting)
    pub csi_period_slots: u32,
}

impl Default for PucchConfig {
    fn default() -> Self {
        Self {
            guardband_prbs: 2,
            f1_resources_per_prb: 12,
            f2_max_payload_bits: 22,
            sr_period_slots: 20,
            csi_period_slots: 40,
        }
    }
}

/// Scheduling policy used to rank UEs in the new-data pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingPolicyKind {
    /// Rotate the starting UE every slot
    #[default]
    RoundRobin,
    /// Rank by instantaneous rate over averaged throughput
    ProportionalFair,
}

/// Scheduler tuning ("expert") parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerExpertConfig {
    /// UE ranking policy
    pub policy: SchedulingPolicyKind,
    /// PF fairness exponent applied to the averaged throughput
    pub pf_fairness_coeff: f64,
    /// PF throughput EWMA coefficient
    pub pf_tput_ewma_coeff: f64,
    /// Pending bytes of a logical channel with priority `p` weigh `p^-exponent`
    /// when UEs are ranked (0 weighs every channel alike)
    pub lc_priority_weight_exponent: f64,
    /// Retransmissions allowed before a HARQ process is declared failed
    pub max_nof_harq_retxs: u8,
    /// Slots after the expected feedback slot before a missing feedback counts as NACK
    pub harq_feedback_timeout_slots: u32,
    /// Msg3 retransmissions before the RA attempt is abandoned
    pub max_msg3_retxs: u8,
    /// Upper bound on PRBs per UE PDSCH grant
    pub max_ue_dl_prbs: u16,
    /// Upper bound on PRBs per UE PUSCH grant
    pub max_ue_ul_prbs: u16,
    /// UE PDSCH grants per slot
    pub max_dl_grants_per_slot: u16,
    /// UE PUSCH grants per slot
    pub max_ul_grants_per_slot: u16,
    /// Grant size for a UE with a pending SR and no BSR
    pub min_sr_grant_bytes: u32,
    /// Fixed DL MCS, overriding link adaptation
    pub fixed_dl_mcs: Option<u8>,
    /// Fixed UL MCS, overriding link adaptation
    pub fixed_ul_mcs: Option<u8>,
    /// CQI assumed until the first CSI report
    pub initial_cqi: u8,
    /// UL SNR in dB assumed until the first PUSCH measurement
    pub initial_ul_snr_db: f32,
    /// Enable outer-loop link adaptation
    pub olla_enabled: bool,
    /// OLLA target BLER
    pub olla_target_bler: f64,
    /// OLLA offset decrease on NACK, in MCS steps
    pub olla_step: f64,
    /// Absolute bound on the OLLA offset, in MCS steps
    pub olla_max_offset: f64,
    /// MCS of the RAR PDSCH
    pub rar_mcs: u8,
    /// MCS of Msg3
    pub msg3_mcs: u8,
    /// Expected Msg3 size in bytes
    pub msg3_size_bytes: u32,
    /// Size of the slot ring of the resource grid
    pub ring_size: u32,
    /// Capacity of the per-cell indication queue
    pub indication_queue_capacity: usize,
    /// Metrics report period in slots (0 disables reports)
    pub metrics_report_period_slots: u32,
    /// Paging occasions a record may miss before it is dropped
    pub max_paging_retries: u8,
}

impl Default for SchedulerExpertConfig {
    fn default() -> Self {
        Self {
            policy: SchedulingPolicyKind::RoundRobin,
            pf_fairness_coeff: 1.0,
            pf_tput_ewma_coeff: 0.01,
            lc_priority_weight_exponent: 1.0,
            max_nof_harq_retxs: 4,
            harq_feedback_timeout_slots: 10,
            max_msg3_retxs: 4,
            max_ue_dl_prbs: 275,
            max_ue_ul_prbs: 275,
            max_dl_grants_per_slot: 16,
            max_ul_grants_per_slot: 16,
            min_sr_grant_bytes: 512,
            fixed_dl_mcs: None,
            fixed_ul_mcs: None,
            initial_cqi: 12,
            initial_ul_snr_db: 20.0,
            olla_enabled: true,
            olla_target_bler: 0.1,
            olla_step: 0.5,
            olla_max_offset: 10.0,
            rar_mcs: 0,
            msg3_mcs: 0,
            msg3_size_bytes: 11,
            ring_size: 20,
            indication_queue_capacity: 1024,
            metrics_report_period_slots: 1000,
            max_paging_retries: 2,
        }
    }
}

/// Loopback simulation parameters for the `nr-gnb-sched` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Pace slots at wall-clock slot duration
    pub real_time: bool,
    /// Number of slots to run (0 runs until interrupted)
    pub total_slots: u64,
    /// RNG seed of the loopback PHY
    pub seed: u64,
    /// Probability that a PDSCH is NACKed
    pub dl_bler: f64,
    /// Probability that a PUSCH CRC fails
    pub ul_bler: f64,
    /// Probability of a preamble at each PRACH occasion
    pub rach_probability: f64,
    /// Upper bound on simulated UEs
    pub max_ues: u16,
    /// DL bytes pushed per UE every traffic period
    pub dl_traffic_bytes: u32,
    /// UL bytes reported per UE every traffic period
    pub ul_traffic_bytes: u32,
    /// Traffic generation period in slots
    pub traffic_period_slots: u32,
    /// CQI reported by simulated UEs
    pub cqi: u8,
    /// UL SNR reported for simulated PUSCHs
    pub ul_snr_db: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            real_time: false,
            total_slots: 10_000,
            seed: 1,
            dl_bler: 0.01,
            ul_bler: 0.01,
            rach_probability: 0.05,
            max_ues: 16,
            dl_traffic_bytes: 1500,
            ul_traffic_bytes: 500,
            traffic_period_slots: 10,
            cqi: 12,
            ul_snr_db: 20.0,
        }
    }
}
