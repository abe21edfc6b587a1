//! Common types and utilities for nextgsim
//!
//! This crate provides the radio types, slot timing, configuration structures
//! and logging setup shared by the scheduler and gNB crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod slot;
pub mod types;

pub use config::{
    CellConfig, CoresetConfig, CsiRsConfig, GnbConfig, PagingConfig, PrachConfig, PucchConfig,
    SchedulerExpertConfig, SchedulingPolicyKind, SiMessageConfig, Sib1Config, SimulationConfig,
    SsbConfig, TddPatternConfig,
};
pub use error::Error;
pub use logging::{init_logging, init_logging_from_config, LogConfig, LogLevel};
pub use slot::{SlotClock, SlotPoint};
pub use types::*;
