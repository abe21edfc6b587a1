//! Slot Driver Module
//!
//! Produces the slot indications of one cell, either paced at the slot
//! duration of the cell numerology or as fast as the cell task consumes them.
//!
//! The slot driver sends messages to:
//! - Cell task: one `CellMessage::Slot` per slot
//! - UE manager: a slot tick used to pace traffic generation

mod task;

pub use task::SlotDriverTask;
