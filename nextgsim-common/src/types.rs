//! Core radio types: RNTI, subcarrier spacing, indices and logical channel identifiers.

use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// Number of OFDM symbols in a slot with normal cyclic prefix.
pub const NOF_OFDM_SYMBOLS_PER_SLOT: u8 = 14;

/// Number of subcarriers in one resource block.
pub const NOF_SUBCARRIERS_PER_RB: u16 = 12;

/// Number of system frames before the SFN wraps (10.24 s).
pub const NOF_SFNS: u32 = 1024;

/// Number of subframes in a radio frame.
pub const NOF_SUBFRAMES_PER_FRAME: u32 = 10;

/// Largest carrier bandwidth in PRBs (TS 38.101-1 Table 5.3.2-1).
pub const MAX_NOF_PRBS: u16 = 275;

/// Maximum number of HARQ processes per direction (TS 38.321).
pub const MAX_NOF_HARQS: usize = 16;

/// Number of logical channel identifiers addressable by the MAC scheduler.
pub const MAX_NOF_LCIDS: usize = 33;

/// Number of logical channel groups reported in a BSR.
pub const MAX_NOF_LCGS: usize = 8;

/// Radio Network Temporary Identifier.
///
/// Values follow TS 38.321 Table 7.1-1: RA-RNTI and TC-RNTI/C-RNTI share the
/// lower range, P-RNTI and SI-RNTI are fixed at the top.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rnti(u16);

impl Rnti {
    /// Invalid RNTI value
    pub const INVALID: Rnti = Rnti(0);
    /// First value handed out as TC-RNTI / C-RNTI
    pub const MIN_CRNTI: Rnti = Rnti(0x4601);
    /// Last value handed out as TC-RNTI / C-RNTI
    pub const MAX_CRNTI: Rnti = Rnti(0xFFEF);
    /// Paging RNTI
    pub const P_RNTI: Rnti = Rnti(0xFFFE);
    /// System Information RNTI
    pub const SI_RNTI: Rnti = Rnti(0xFFFF);

    /// Creates an RNTI from its raw value.
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    pub const fn value(&self) -> u16 {
        self.0
    }

    /// Returns true if the value lies in the C-RNTI range.
    pub fn is_crnti(&self) -> bool {
        *self >= Self::MIN_CRNTI && *self <= Self::MAX_CRNTI
    }

    /// Returns the next C-RNTI, wrapping back to [`Rnti::MIN_CRNTI`].
    pub fn next_crnti(&self) -> Rnti {
        if *self >= Self::MAX_CRNTI || *self < Self::MIN_CRNTI {
            Self::MIN_CRNTI
        } else {
            Rnti(self.0 + 1)
        }
    }
}

impl fmt::Debug for Rnti {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rnti({:#06x})", self.0)
    }
}

impl fmt::Display for Rnti {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

impl From<u16> for Rnti {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

/// Subcarrier spacing, i.e. the NR numerology µ.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoPrimitive, TryFromPrimitive, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum SubcarrierSpacing {
    /// µ = 0
    #[default]
    #[serde(rename = "15khz")]
    Khz15 = 0,
    /// µ = 1
    #[serde(rename = "30khz")]
    Khz30 = 1,
    /// µ = 2
    #[serde(rename = "60khz")]
    Khz60 = 2,
    /// µ = 3
    #[serde(rename = "120khz")]
    Khz120 = 3,
}

impl SubcarrierSpacing {
    /// Returns the numerology index µ.
    pub fn numerology(&self) -> u8 {
        (*self).into()
    }

    /// Returns the spacing in kHz.
    pub fn khz(&self) -> u32 {
        15 << self.numerology()
    }

    /// Returns the number of slots in a 1 ms subframe.
    pub fn nof_slots_per_subframe(&self) -> u32 {
        1 << self.numerology()
    }

    /// Returns the number of slots in a 10 ms frame.
    pub fn nof_slots_per_frame(&self) -> u32 {
        NOF_SUBFRAMES_PER_FRAME << self.numerology()
    }

    /// Returns the slot duration in microseconds.
    pub fn slot_duration_us(&self) -> u64 {
        1000 >> self.numerology()
    }
}

impl fmt::Display for SubcarrierSpacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}kHz", self.khz())
    }
}

/// Link direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkDirection {
    /// Downlink (gNB to UE)
    Downlink,
    /// Uplink (UE to gNB)
    Uplink,
}

impl fmt::Display for LinkDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkDirection::Downlink => write!(f, "DL"),
            LinkDirection::Uplink => write!(f, "UL"),
        }
    }
}

/// Index of a cell within the DU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellIndex(pub u8);

impl fmt::Display for CellIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle of a UE inside a cell scheduler's UE table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UeIndex(pub u16);

impl UeIndex {
    /// Returns the index as a table position.
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for UeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// HARQ process identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HarqId(pub u8);

impl fmt::Display for HarqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical channel identifier (TS 38.321 Table 6.2.1-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lcid(pub u8);

impl Lcid {
    /// SRB0 (CCCH)
    pub const SRB0: Lcid = Lcid(0);
    /// SRB1
    pub const SRB1: Lcid = Lcid(1);
    /// SRB2
    pub const SRB2: Lcid = Lcid(2);
    /// First DRB
    pub const DRB1: Lcid = Lcid(4);

    /// Returns true for signalling radio bearers.
    pub fn is_srb(&self) -> bool {
        self.0 <= 3
    }
}

impl fmt::Display for Lcid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical channel group, the granularity of UL buffer status reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lcg(pub u8);
