//! Slot-synchronous 5G NR cell scheduler
//!
//! Every slot, a [`CellScheduler`] places the common channels of its cell
//! (SSB, CSI-RS, SIB1, SI messages, paging, PRACH), answers random access and
//! distributes the remaining PDSCH/PUSCH resources among the UEs, then
//! publishes an immutable [`SchedResult`] for the PHY.
//!
//! # Modules
//!
//! - `cell`: configuration, resource grid, indication queue, orchestrator
//! - `common`: common-channel schedulers
//! - `pdcch`, `pucch`, `uci`: control channel allocators
//! - `ue`: UE contexts, HARQ, link adaptation, policies, RA, grant allocation
//! - `result`: per-slot scheduling result
//! - `events`, `metrics`, `result_logger`: outputs for upper layers

pub mod cell;
pub mod common;
pub mod events;
pub mod metrics;
pub mod pdcch;
pub mod pucch;
pub mod result;
pub mod result_logger;
pub mod uci;
pub mod ue;

pub use cell::{
    CellConfigError, CellConfiguration, CellIndication, CellIndicationSender, CellScheduler, CellSchedulerState,
    CrcIndication, DlBufferState, IndicationError, UciIndication, UlBsrIndication,
};
pub use common::PagingInformation;
pub use events::{ChannelEventNotifier, NullEventNotifier, RecordingEventNotifier, SchedulerEvent, SchedulerEventNotifier};
pub use metrics::{ChannelMetricsNotifier, NullMetricsNotifier, SchedulerCellMetrics, SchedulerMetricsNotifier};
pub use result::SchedResult;
pub use ue::{DetectedPreamble, RachIndication, UeCreationRequest, UeReconfigRequest};
