//! Cell-level scheduling
//!
//! - `config`: validated cell configuration
//! - `resource_grid`: per-slot PRB x symbol occupancy and the slot ring
//! - `indication`: asynchronous inputs and their queue
//! - `scheduler`: the per-slot orchestrator

pub mod config;
pub mod indication;
pub mod resource_grid;
pub mod scheduler;

pub use config::{CellConfigError, CellConfiguration};
pub use indication::{
    CellIndication, CellIndicationSender, CrcIndication, DlBufferState, IndicationError, UciIndication,
    UlBsrIndication,
};
pub use resource_grid::{CellResourceAllocator, GridError, GridRegion, PrbInterval, SlotResources, SymbolInterval};
pub use scheduler::{CellScheduler, CellSchedulerState};
