//! Per-slot scheduling result handed to the PHY
//!
//! A `SchedResult` is built in place inside the resource grid entry of its slot
//! and published as an immutable `Arc<SchedResult>` once the slot is done.

use nextgsim_common::{HarqId, Lcid, Rnti, SlotPoint, UeIndex};

use crate::cell::config::SearchSpaceKind;
use crate::cell::resource_grid::{AllocationHandle, GridRegion, PrbInterval, SymbolInterval};

/// DCI carried by a PDCCH.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DciKind {
    /// DL assignment for a UE PDSCH (format 1_0/1_1)
    DlAssignment,
    /// UL grant for a UE PUSCH (format 0_0/0_1)
    UlGrant,
    /// RAR scheduling (RA-RNTI)
    Rar,
    /// SIB1 / SI message scheduling (SI-RNTI)
    SystemInformation,
    /// Paging (P-RNTI)
    Paging,
    /// Msg3 retransmission grant (TC-RNTI)
    Msg3Retx,
}

/// Aggregation level of a PDCCH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AggregationLevel {
    /// 1 CCE
    L1,
    /// 2 CCEs
    L2,
    /// 4 CCEs
    L4,
    /// 8 CCEs
    L8,
    /// 16 CCEs
    L16,
}

impl AggregationLevel {
    /// All levels in ascending order.
    pub const ALL: [AggregationLevel; 5] = [
        AggregationLevel::L1,
        AggregationLevel::L2,
        AggregationLevel::L4,
        AggregationLevel::L8,
        AggregationLevel::L16,
    ];

    /// Number of CCEs.
    pub fn nof_cces(&self) -> u16 {
        1 << self.index()
    }

    /// Position in `{1, 2, 4, 8, 16}`.
    pub fn index(&self) -> usize {
        match self {
            AggregationLevel::L1 => 0,
            AggregationLevel::L2 => 1,
            AggregationLevel::L4 => 2,
            AggregationLevel::L8 => 3,
            AggregationLevel::L16 => 4,
        }
    }
}

/// One allocated PDCCH.
#[derive(Debug, Clone, PartialEq)]
pub struct PdcchAllocation {
    /// RNTI scrambling the DCI CRC
    pub rnti: Rnti,
    /// DCI content
    pub dci: DciKind,
    /// Search space the candidate belongs to
    pub search_space: SearchSpaceKind,
    /// CORESET id
    pub coreset_id: u8,
    /// Aggregation level
    pub aggregation_level: AggregationLevel,
    /// First CCE
    pub cce_index: u16,
    /// Occupied DL grid region
    pub region: GridRegion,
    pub(crate) grid_handle: AllocationHandle,
}

/// PDSCH resources and coding.
#[derive(Debug, Clone, PartialEq)]
pub struct PdschInfo {
    /// RNTI the PDSCH is addressed to
    pub rnti: Rnti,
    /// PRBs
    pub prbs: PrbInterval,
    /// Symbols
    pub symbols: SymbolInterval,
    /// MCS index (table 1)
    pub mcs: u8,
    /// Transport block size in bytes
    pub tbs_bytes: u32,
}

/// SS/PBCH block transmission.
#[derive(Debug, Clone, PartialEq)]
pub struct SsbInfo {
    /// Beam index
    pub beam: u8,
    /// Occupied DL region
    pub region: GridRegion,
}

/// NZP-CSI-RS transmission.
#[derive(Debug, Clone, PartialEq)]
pub struct CsiRsInfo {
    /// Occupied DL region
    pub region: GridRegion,
}

/// Broadcast system information kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiKind {
    /// SIB1
    Sib1,
    /// SI message with the given index
    SiMessage(u8),
}

/// SIB1 or SI message PDSCH.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastPdsch {
    /// Which system information
    pub kind: SiKind,
    /// PDSCH
    pub pdsch: PdschInfo,
}

/// Paging PDSCH shared by all records due at one paging occasion.
#[derive(Debug, Clone, PartialEq)]
pub struct PagingGrant {
    /// PDSCH (P-RNTI)
    pub pdsch: PdschInfo,
    /// Paged UE identities (5G-S-TMSI)
    pub paging_identities: Vec<u64>,
}

/// Msg3 grant carried in a RAR.
#[derive(Debug, Clone, PartialEq)]
pub struct Msg3Grant {
    /// Temporary C-RNTI assigned to the UE
    pub tc_rnti: Rnti,
    /// Detected preamble
    pub preamble_id: u8,
    /// Timing advance command
    pub timing_advance: u16,
    /// Slot of the Msg3 PUSCH
    pub msg3_slot: SlotPoint,
}

/// RAR PDSCH.
#[derive(Debug, Clone, PartialEq)]
pub struct RarGrant {
    /// RA-RNTI of the PRACH occasion
    pub ra_rnti: Rnti,
    /// PDSCH (RA-RNTI)
    pub pdsch: PdschInfo,
    /// Msg3 grants, one per answered preamble
    pub grants: Vec<Msg3Grant>,
}

/// Bytes of one logical channel placed in a transport block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LcAllocation {
    /// Logical channel
    pub lcid: Lcid,
    /// Payload bytes (without subheader)
    pub bytes: u32,
}

/// UE PDSCH grant.
#[derive(Debug, Clone, PartialEq)]
pub struct DlUeGrant {
    /// UE
    pub ue_index: UeIndex,
    /// HARQ process
    pub harq_id: HarqId,
    /// True for a retransmission
    pub is_retx: bool,
    /// PDSCH
    pub pdsch: PdschInfo,
    /// PDSCH-to-HARQ-ACK delay
    pub k1: u8,
    /// Logical channel bytes of a new transmission
    pub lc_allocations: Vec<LcAllocation>,
    /// Contention resolution CE included (Msg4)
    pub conres_ce: bool,
}

/// UCI carried on a PUSCH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UciOnPusch {
    /// HARQ-ACK bits
    pub harq_bits: u16,
    /// CSI bits
    pub csi_bits: u16,
}

/// PUSCH grant (UE data or Msg3).
#[derive(Debug, Clone, PartialEq)]
pub struct UlGrant {
    /// UE, absent for Msg3 of a UE not yet created
    pub ue_index: Option<UeIndex>,
    /// C-RNTI or TC-RNTI
    pub rnti: Rnti,
    /// HARQ process
    pub harq_id: HarqId,
    /// True for a retransmission
    pub is_retx: bool,
    /// True for Msg3
    pub is_msg3: bool,
    /// PRBs
    pub prbs: PrbInterval,
    /// Symbols
    pub symbols: SymbolInterval,
    /// MCS index (table 1)
    pub mcs: u8,
    /// Transport block size in bytes
    pub tbs_bytes: u32,
    /// UCI multiplexed on this PUSCH
    pub uci: Option<UciOnPusch>,
    pub(crate) grid_handle: AllocationHandle,
}

/// PUCCH format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PucchFormat {
    /// Format 1: up to 2 HARQ bits plus SR
    F1,
    /// Format 2: larger UCI payloads
    F2,
}

/// PUCCH transmission of one UE.
#[derive(Debug, Clone, PartialEq)]
pub struct PucchInfo {
    /// UE
    pub ue_index: UeIndex,
    /// C-RNTI
    pub rnti: Rnti,
    /// Format
    pub format: PucchFormat,
    /// Cell PUCCH resource id within the format
    pub resource_id: u16,
    /// Occupied UL region
    pub region: GridRegion,
    /// HARQ-ACK bits
    pub harq_bits: u16,
    /// SR opportunity
    pub sr: bool,
    /// CSI bits
    pub csi_bits: u16,
    pub(crate) grid_handle: AllocationHandle,
}

impl PucchInfo {
    /// Total UCI payload in bits.
    pub fn payload_bits(&self) -> u16 {
        self.harq_bits + self.sr as u16 + self.csi_bits
    }
}

/// PRACH occasion.
#[derive(Debug, Clone, PartialEq)]
pub struct PrachOccasion {
    /// Occupied UL region
    pub region: GridRegion,
}

/// DL part of the result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DlSchedResult {
    /// PDCCHs (DL assignments and UL grants)
    pub pdcchs: Vec<PdcchAllocation>,
    /// SS/PBCH blocks
    pub ssbs: Vec<SsbInfo>,
    /// CSI-RS
    pub csi_rs: Vec<CsiRsInfo>,
    /// SIB1 and SI messages
    pub broadcast: Vec<BroadcastPdsch>,
    /// Paging
    pub paging: Vec<PagingGrant>,
    /// Random access responses
    pub rars: Vec<RarGrant>,
    /// UE data
    pub ue_grants: Vec<DlUeGrant>,
}

/// UL part of the result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UlSchedResult {
    /// PUSCHs (UE data and Msg3)
    pub puschs: Vec<UlGrant>,
    /// PUCCHs
    pub pucchs: Vec<PucchInfo>,
    /// PRACH occasions
    pub prachs: Vec<PrachOccasion>,
}

/// Scheduling decisions of one slot.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedResult {
    /// Slot the result applies to
    pub slot: SlotPoint,
    /// Downlink
    pub dl: DlSchedResult,
    /// Uplink
    pub ul: UlSchedResult,
}

impl SchedResult {
    /// Creates an empty result for `slot`.
    pub fn new(slot: SlotPoint) -> Self {
        Self {
            slot,
            dl: DlSchedResult::default(),
            ul: UlSchedResult::default(),
        }
    }

    /// True if nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.dl == DlSchedResult::default() && self.ul == UlSchedResult::default()
    }

    /// PUSCH of `rnti`, if any.
    pub fn pusch_of(&self, rnti: Rnti) -> Option<&UlGrant> {
        self.ul.puschs.iter().find(|p| p.rnti == rnti)
    }

    /// PUCCH of `rnti`, if any.
    pub fn pucch_of(&self, rnti: Rnti) -> Option<&PucchInfo> {
        self.ul.pucchs.iter().find(|p| p.rnti == rnti)
    }

    /// Every PDSCH of the slot, broadcast and unicast.
    pub fn all_pdschs(&self) -> impl Iterator<Item = &PdschInfo> {
        self.dl
            .broadcast
            .iter()
            .map(|b| &b.pdsch)
            .chain(self.dl.paging.iter().map(|p| &p.pdsch))
            .chain(self.dl.rars.iter().map(|r| &r.pdsch))
            .chain(self.dl.ue_grants.iter().map(|g| &g.pdsch))
    }

    /// PRBs used by UE PDSCHs.
    pub fn nof_dl_ue_prbs(&self) -> u32 {
        self.dl.ue_grants.iter().map(|g| g.pdsch.prbs.length() as u32).sum()
    }

    /// PRBs used by PUSCHs.
    pub fn nof_ul_prbs(&self) -> u32 {
        self.ul.puschs.iter().map(|g| g.prbs.length() as u32).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nextgsim_common::SubcarrierSpacing;

    #[test]
    fn test_empty_result() {
        let result = SchedResult::new(SlotPoint::new(SubcarrierSpacing::Khz15, 3));
        assert!(result.is_empty());
        assert_eq!(result.all_pdschs().count(), 0);
        assert_eq!(result.nof_ul_prbs(), 0);
    }

    #[test]
    fn test_aggregation_level_cces() {
        assert_eq!(AggregationLevel::L1.nof_cces(), 1);
        assert_eq!(AggregationLevel::L16.nof_cces(), 16);
        assert!(AggregationLevel::L2 < AggregationLevel::L8);
    }
}
