//! Scheduler notifiers forwarding into task channels
//!
//! Both run inside the slot loop, so they only ever `try_send`.

use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use nextgsim_sched::{SchedulerCellMetrics, SchedulerEvent, SchedulerEventNotifier, SchedulerMetricsNotifier};

use crate::tasks::{MetricsMessage, TaskHandle, UeManagerMessage};

/// Forwards scheduler events to the UE manager.
#[derive(Debug, Clone)]
pub struct TaskEventNotifier {
    tx: TaskHandle<UeManagerMessage>,
    dropped: u64,
}

impl TaskEventNotifier {
    /// Creates a notifier sending to `tx`.
    pub fn new(tx: TaskHandle<UeManagerMessage>) -> Self {
        Self { tx, dropped: 0 }
    }

    /// Events lost to a full or closed channel.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl SchedulerEventNotifier for TaskEventNotifier {
    fn notify(&mut self, event: SchedulerEvent) {
        match self.tx.try_send(UeManagerMessage::SchedulerEvent(event)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                warn!("UE manager queue full, scheduler event dropped");
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped += 1;
                debug!("UE manager gone, scheduler event dropped");
            }
        }
    }
}

/// Forwards metrics reports to the metrics task.
#[derive(Debug, Clone)]
pub struct TaskMetricsNotifier {
    tx: TaskHandle<MetricsMessage>,
}

impl TaskMetricsNotifier {
    /// Creates a notifier sending to `tx`.
    pub fn new(tx: TaskHandle<MetricsMessage>) -> Self {
        Self { tx }
    }
}

impl SchedulerMetricsNotifier for TaskMetricsNotifier {
    fn report(&mut self, metrics: SchedulerCellMetrics) {
        if self.tx.try_send(MetricsMessage::Report(metrics)).is_err() {
            debug!("metrics report dropped");
        }
    }
}
