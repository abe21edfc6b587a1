//! Scheduler events reported to upper layers
//!
//! The real-time loop hands events to a `SchedulerEventNotifier` and never
//! waits on it. The channel notifier uses `try_send`, so a full channel drops
//! the event with a warning.

use std::fmt;

use nextgsim_common::{CellIndex, Rnti, SlotPoint, UeIndex};
use tokio::sync::mpsc;
use tracing::warn;

/// Event emitted by a cell scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// A HARQ process of the UE reached its retransmission ceiling. Emitted
    /// once per UE.
    RadioLinkFailure {
        /// Cell
        cell: CellIndex,
        /// UE
        ue_index: UeIndex,
        /// C-RNTI
        rnti: Rnti,
        /// Slot of the failing feedback
        slot: SlotPoint,
    },
    /// Msg3 decoded: the TC-RNTI may be promoted to a UE.
    Msg3Received {
        /// Cell
        cell: CellIndex,
        /// Temporary C-RNTI from the RAR
        tc_rnti: Rnti,
        /// Preamble the UE used
        preamble_id: u8,
        /// Slot of the Msg3 PUSCH
        slot: SlotPoint,
    },
}

impl fmt::Display for SchedulerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerEvent::RadioLinkFailure { cell, rnti, slot, .. } => {
                write!(f, "RLF cell={cell} rnti={rnti} slot={slot}")
            }
            SchedulerEvent::Msg3Received { cell, tc_rnti, slot, .. } => {
                write!(f, "Msg3 cell={cell} tc-rnti={tc_rnti} slot={slot}")
            }
        }
    }
}

/// Sink for scheduler events. Implementations must not block.
pub trait SchedulerEventNotifier: Send {
    /// Called from the slot loop for each event.
    fn notify(&mut self, event: SchedulerEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventNotifier;

impl SchedulerEventNotifier for NullEventNotifier {
    fn notify(&mut self, _event: SchedulerEvent) {}
}

/// Forwards events into a bounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelEventNotifier {
    tx: mpsc::Sender<SchedulerEvent>,
    dropped: u64,
}

impl ChannelEventNotifier {
    /// Wraps `tx`.
    pub fn new(tx: mpsc::Sender<SchedulerEvent>) -> Self {
        Self { tx, dropped: 0 }
    }

    /// Events lost because the channel was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl SchedulerEventNotifier for ChannelEventNotifier {
    fn notify(&mut self, event: SchedulerEvent) {
        if let Err(err) = self.tx.try_send(event) {
            self.dropped += 1;
            warn!("scheduler event dropped: {err}");
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Default, Clone)]
pub struct RecordingEventNotifier {
    events: std::sync::Arc<std::sync::Mutex<Vec<SchedulerEvent>>>,
}

impl RecordingEventNotifier {
    /// Creates an empty recorder. Clones share the same storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far.
    pub fn events(&self) -> Vec<SchedulerEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl SchedulerEventNotifier for RecordingEventNotifier {
    fn notify(&mut self, event: SchedulerEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
