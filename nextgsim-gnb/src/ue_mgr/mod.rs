//! UE Manager Module
//!
//! Plays the role of the upper layers for the loopback setup:
//!
//! - admits a UE when its Msg3 is decoded, up to `simulation.max_ues`
//! - queues the RRC Setup on SRB0 so that Msg4 carries data
//! - removes a UE when the scheduler reports a radio link failure
//! - refreshes DL buffer occupancy and UL BSRs every traffic period

mod task;

pub use task::{UeManagerStats, UeManagerTask};
