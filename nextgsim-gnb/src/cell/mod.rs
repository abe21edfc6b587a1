//! Cell Task Module
//!
//! One task per cell owns the `CellScheduler` of that cell.
//!
//! # Architecture
//!
//! The cell task receives messages from:
//! - Slot driver: one slot indication per slot
//!
//! The cell task sends messages to:
//! - PHY task: the published result of every slot
//! - UE manager: scheduler events (Msg3 received, RLF)
//! - Metrics task: periodic scheduler metrics
//!
//! PHY feedback and UE requests do not go through the task channel: they are
//! queued directly on the scheduler's indication queue through a
//! `CellIndicationSender`.

mod notifier;
mod task;

pub use notifier::{TaskEventNotifier, TaskMetricsNotifier};
pub use task::{CellTask, CellTaskError};
