//! Loopback PHY Module
//!
//! Stands in for the L1 and the UEs behind it. For every published slot
//! result it produces the feedback a real PHY would report a few slots later:
//!
//! - PRACH occasion: a detected preamble, with `rach_probability`
//! - PUSCH (Msg3 or UE data): a CRC, failing with `ul_bler`
//! - PUCCH or UCI on PUSCH: HARQ-ACK bits, each a NACK with `dl_bler`, and
//!   the configured CQI when CSI bits are carried
//!
//! Randomness comes from a `StdRng` seeded from `simulation.seed`, one
//! generator per cell, so a run is reproducible.

mod loopback;
mod task;

pub use loopback::{LoopbackPhy, PhyStats};
pub use task::PhyTask;
