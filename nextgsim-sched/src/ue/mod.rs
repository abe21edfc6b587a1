//! UE scheduling
//!
//! - `context`: per-UE state (buffers, link adaptation, HARQ entities)
//! - `repository`: arena of UE contexts
//! - `harq`: HARQ processes
//! - `mcs`: MCS tables, TBS computation and OLLA
//! - `policy`: ordering of UEs for new transmissions
//! - `ra`: random access (RAR, Msg3)
//! - `scheduler`: per-slot DL/UL grant allocation

pub mod context;
pub mod harq;
pub mod mcs;
pub mod policy;
pub mod ra;
pub mod repository;
pub mod scheduler;

use nextgsim_common::{Lcg, Lcid, Rnti, UeIndex};
use thiserror::Error;

pub use context::{
    default_logical_channels, lc_priority_weight, LogicalChannelConfig, UeContext, UeCreationRequest, UeReconfigRequest,
    WeightedBacklog,
};
pub use harq::{HarqEntity, HarqFeedbackOutcome, HarqProcess, HarqState};
pub use policy::{create_policy, PolicyCandidate, ProportionalFairPolicy, RoundRobinPolicy, SchedulingPolicy};
pub use ra::{ra_rnti, DetectedPreamble, Msg3Info, RaScheduler, RachIndication};
pub use repository::UeRepository;
pub use scheduler::{FeedbackSummary, UeScheduler, UeSlotOutcome};

/// UE management errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UeError {
    /// No UE with this RNTI
    #[error("unknown UE {0}")]
    UnknownRnti(Rnti),
    /// No UE at this index
    #[error("unknown UE index {0}")]
    UnknownUeIndex(UeIndex),
    /// RNTI already used by another UE
    #[error("RNTI {0} already in use")]
    DuplicateRnti(Rnti),
    /// RNTI outside the C-RNTI range
    #[error("RNTI {0} is not a C-RNTI")]
    InvalidRnti(Rnti),
    /// The cell holds its maximum number of UEs
    #[error("UE repository full ({capacity} UEs)")]
    RepositoryFull {
        /// Repository capacity
        capacity: usize,
    },
    /// Logical channel not configured for the UE
    #[error("{rnti} has no logical channel {lcid}")]
    UnknownLcid {
        /// UE
        rnti: Rnti,
        /// Requested LCID
        lcid: Lcid,
    },
    /// LCG outside 0..8
    #[error("{rnti} reported invalid LCG {lcg:?}")]
    InvalidLcg {
        /// UE
        rnti: Rnti,
        /// Reported LCG
        lcg: Lcg,
    },
    /// Logical channel configuration rejected
    #[error("invalid logical channel {lcid} for {rnti}")]
    InvalidLogicalChannel {
        /// UE
        rnti: Rnti,
        /// Offending LCID
        lcid: Lcid,
    },
}
