//! gNB Task Framework
//!
//! Actor-based task model with message passing. Each task runs as an
//! independent async task and communicates via typed message channels.
//!
//! # Architecture
//!
//! - **Slot driver** (one per cell): produces slot indications, paced at the
//!   slot duration or free-running
//! - **Cell task** (one per cell): owns the `CellScheduler` of the cell
//! - **PHY task**: loopback PHY turning slot results into RACH/CRC/UCI feedback
//! - **UE manager**: admits UEs after Msg3, removes them on RLF, generates traffic
//! - **Metrics task**: collects periodic scheduler metrics
//!
//! # Task Lifecycle
//!
//! Tasks follow a lifecycle managed by `TaskManager`:
//! 1. **Created**: Task is instantiated but not yet running
//! 2. **Running**: Task is actively processing messages
//! 3. **Stopping**: Task received shutdown signal, cleaning up
//! 4. **Stopped**: Task has terminated
//! 5. **Failed**: Task terminated due to an error

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use nextgsim_common::config::GnbConfig;
use nextgsim_common::{CellIndex, SlotPoint};
use nextgsim_sched::{SchedResult, SchedulerCellMetrics, SchedulerEvent};

// ============================================================================
// Task Message Envelope
// ============================================================================

/// Task message envelope wrapping typed messages with control signals.
#[derive(Debug)]
pub enum TaskMessage<T> {
    /// Regular message payload
    Message(T),
    /// Shutdown signal - task should terminate gracefully
    Shutdown,
}

// ============================================================================
// Task Lifecycle State
// ============================================================================

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    /// Task is created but not yet started
    #[default]
    Created,
    /// Task is running and processing messages
    Running,
    /// Task is in the process of stopping
    Stopping,
    /// Task has stopped gracefully
    Stopped,
    /// Task terminated due to an error
    Failed,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TaskState::Created => "created",
            TaskState::Running => "running",
            TaskState::Stopping => "stopping",
            TaskState::Stopped => "stopped",
            TaskState::Failed => "failed",
        })
    }
}

/// Task identifier for the gNB tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskId {
    /// Slot driver of a cell
    SlotDriver(CellIndex),
    /// Scheduler task of a cell
    Cell(CellIndex),
    /// Loopback PHY
    Phy,
    /// UE admission and traffic
    UeManager,
    /// Metrics collection
    Metrics,
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskId::SlotDriver(cell) => write!(f, "SlotDriver[{cell}]"),
            TaskId::Cell(cell) => write!(f, "Cell[{cell}]"),
            TaskId::Phy => write!(f, "PHY"),
            TaskId::UeManager => write!(f, "UeManager"),
            TaskId::Metrics => write!(f, "Metrics"),
        }
    }
}

/// Lifecycle record of one task.
#[derive(Debug, Clone, Default)]
pub struct TaskInfo {
    /// Current state
    pub state: TaskState,
    /// When the task was spawned
    pub started_at: Option<Instant>,
    /// Why the task failed, if it did
    pub error: Option<String>,
}

impl TaskInfo {
    /// Time since the task was spawned.
    pub fn uptime(&self) -> Option<std::time::Duration> {
        self.started_at.map(|t| t.elapsed())
    }
}

// ============================================================================
// Task Trait
// ============================================================================

/// Base trait for all gNB tasks.
///
/// Tasks are async actors that process messages from their receive channel
/// and exit when they receive `TaskMessage::Shutdown`.
#[async_trait::async_trait]
pub trait Task: Send + 'static {
    /// The message type this task processes.
    type Message: Send;

    /// Runs the task's main loop, processing messages until shutdown.
    async fn run(&mut self, rx: mpsc::Receiver<TaskMessage<Self::Message>>);
}

// ============================================================================
// Message Types
// ============================================================================

/// Messages for a cell task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellMessage {
    /// Schedule this slot
    Slot(SlotPoint),
}

/// Messages for a slot driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotDriverMessage {
    /// Stop producing slots until `Resume`
    Pause,
    /// Resume producing slots
    Resume,
}

/// Messages for the PHY task.
#[derive(Debug, Clone)]
pub enum PhyMessage {
    /// Result of one slot of one cell
    SlotResult {
        /// Cell
        cell: CellIndex,
        /// Published result
        result: Arc<SchedResult>,
    },
}

/// Messages for the UE manager.
#[derive(Debug, Clone)]
pub enum UeManagerMessage {
    /// Event raised by a cell scheduler
    SchedulerEvent(SchedulerEvent),
    /// A slot was handed to a cell
    SlotTick {
        /// Cell
        cell: CellIndex,
        /// Slot
        slot: SlotPoint,
    },
}

/// Messages for the metrics task.
#[derive(Debug, Clone)]
pub enum MetricsMessage {
    /// Periodic report of one cell
    Report(SchedulerCellMetrics),
}

// ============================================================================
// Task Handle
// ============================================================================

/// Handle for sending messages to a task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    tx: mpsc::Sender<TaskMessage<T>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<T> TaskHandle<T> {
    /// Creates a new task handle from a sender.
    pub fn new(tx: mpsc::Sender<TaskMessage<T>>) -> Self {
        Self { tx }
    }

    /// Sends a message to the task.
    ///
    /// Returns an error if the task has been dropped.
    pub async fn send(&self, msg: T) -> Result<(), mpsc::error::SendError<TaskMessage<T>>> {
        self.tx.send(TaskMessage::Message(msg)).await
    }

    /// Sends a message to the task without waiting.
    ///
    /// Returns an error if the channel is full or the task has been dropped.
    pub fn try_send(&self, msg: T) -> Result<(), mpsc::error::TrySendError<TaskMessage<T>>> {
        self.tx.try_send(TaskMessage::Message(msg))
    }

    /// Sends a shutdown signal to the task.
    pub async fn shutdown(&self) -> Result<(), mpsc::error::SendError<TaskMessage<T>>> {
        self.tx.send(TaskMessage::Shutdown).await
    }
}

fn task_channel<T>(capacity: usize) -> (TaskHandle<T>, mpsc::Receiver<TaskMessage<T>>) {
    let (tx, rx) = mpsc::channel(capacity);
    (TaskHandle::new(tx), rx)
}

// ============================================================================
// gNB Task Base
// ============================================================================

/// Handles of every gNB task, shared among tasks for inter-task communication.
#[derive(Debug, Clone)]
pub struct GnbTaskBase {
    /// gNB configuration
    pub config: Arc<GnbConfig>,
    /// Slot drivers, indexed by cell
    pub slot_driver_txs: Vec<TaskHandle<SlotDriverMessage>>,
    /// Cell tasks, indexed by cell
    pub cell_txs: Vec<TaskHandle<CellMessage>>,
    /// PHY task
    pub phy_tx: TaskHandle<PhyMessage>,
    /// UE manager
    pub ue_manager_tx: TaskHandle<UeManagerMessage>,
    /// Metrics task
    pub metrics_tx: TaskHandle<MetricsMessage>,
}

/// Receive ends matching the handles of a `GnbTaskBase`.
#[derive(Debug)]
pub struct GnbTaskReceivers {
    /// Slot drivers, indexed by cell
    pub slot_driver_rxs: Vec<mpsc::Receiver<TaskMessage<SlotDriverMessage>>>,
    /// Cell tasks, indexed by cell
    pub cell_rxs: Vec<mpsc::Receiver<TaskMessage<CellMessage>>>,
    /// PHY task
    pub phy_rx: mpsc::Receiver<TaskMessage<PhyMessage>>,
    /// UE manager
    pub ue_manager_rx: mpsc::Receiver<TaskMessage<UeManagerMessage>>,
    /// Metrics task
    pub metrics_rx: mpsc::Receiver<TaskMessage<MetricsMessage>>,
}

impl GnbTaskBase {
    /// Creates the channels of every task.
    pub fn new(config: GnbConfig, channel_capacity: usize) -> (Self, GnbTaskReceivers) {
        let nof_cells = config.cells.len();
        let (slot_driver_txs, slot_driver_rxs): (Vec<_>, Vec<_>) =
            (0..nof_cells).map(|_| task_channel(channel_capacity)).unzip();
        let (cell_txs, cell_rxs): (Vec<_>, Vec<_>) = (0..nof_cells).map(|_| task_channel(channel_capacity)).unzip();
        let (phy_tx, phy_rx) = task_channel(channel_capacity);
        let (ue_manager_tx, ue_manager_rx) = task_channel(channel_capacity);
        let (metrics_tx, metrics_rx) = task_channel(channel_capacity);

        let base = Self {
            config: Arc::new(config),
            slot_driver_txs,
            cell_txs,
            phy_tx,
            ue_manager_tx,
            metrics_tx,
        };
        let receivers = GnbTaskReceivers {
            slot_driver_rxs,
            cell_rxs,
            phy_rx,
            ue_manager_rx,
            metrics_rx,
        };
        (base, receivers)
    }

    /// Sends shutdown signals to all tasks, slot sources first.
    pub async fn shutdown_all(&self) {
        for tx in &self.slot_driver_txs {
            let _ = tx.shutdown().await;
        }
        for tx in &self.cell_txs {
            let _ = tx.shutdown().await;
        }
        let _ = self.phy_tx.shutdown().await;
        let _ = self.ue_manager_tx.shutdown().await;
        let _ = self.metrics_tx.shutdown().await;
    }
}

/// Default channel capacity for task message queues.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Default shutdown timeout in milliseconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5000;

// ============================================================================
// Task Manager
// ============================================================================

/// Spawns the gNB tasks and stops them in slot-source-first order.
///
/// Every task id of the configuration is known from construction on, in
/// state `Created` until `spawn_task` is called for it.
pub struct TaskManager {
    task_base: GnbTaskBase,
    tasks: BTreeMap<TaskId, TaskInfo>,
    shutdown_tx: watch::Sender<bool>,
    join_handles: Vec<(TaskId, JoinHandle<()>)>,
}

/// Error type for task operations.
#[derive(Debug, Clone, Error)]
#[error("Task {task_id} error: {message}")]
pub struct TaskError {
    /// Task that failed
    pub task_id: TaskId,
    /// Error message
    pub message: String,
}

impl TaskManager {
    /// Creates the channels of one slot driver and one cell task per cell plus
    /// the PHY, UE manager and metrics tasks.
    pub fn new(config: GnbConfig, channel_capacity: usize) -> (Self, GnbTaskReceivers) {
        let nof_cells = config.cells.len();
        let (task_base, receivers) = GnbTaskBase::new(config, channel_capacity);
        let (shutdown_tx, _) = watch::channel(false);

        let per_cell = (0..nof_cells).flat_map(|i| {
            let cell = CellIndex(i as u8);
            [TaskId::SlotDriver(cell), TaskId::Cell(cell)]
        });
        let tasks = per_cell
            .chain([TaskId::Phy, TaskId::UeManager, TaskId::Metrics])
            .map(|id| (id, TaskInfo::default()))
            .collect();

        let manager = Self {
            task_base,
            tasks,
            shutdown_tx,
            join_handles: Vec::new(),
        };
        (manager, receivers)
    }

    /// Returns a clone of the task base for inter-task communication.
    pub fn task_base(&self) -> GnbTaskBase {
        self.task_base.clone()
    }

    /// Receiver flipped to `true` when `shutdown` starts.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Spawns `task` on the runtime and tracks it under `task_id`.
    pub fn spawn_task<T: Task>(&mut self, task_id: TaskId, mut task: T, rx: mpsc::Receiver<TaskMessage<T::Message>>) {
        let handle = tokio::spawn(async move { task.run(rx).await });
        self.join_handles.push((task_id, handle));
        let info = self.tasks.entry(task_id).or_default();
        info.state = TaskState::Running;
        info.started_at = Some(Instant::now());
        debug!("{task_id} task spawned");
    }

    /// Gets the current state of a task.
    pub fn get_task_state(&self, task_id: TaskId) -> Option<TaskState> {
        self.tasks.get(&task_id).map(|info| info.state)
    }

    /// Gets the lifecycle record of a task.
    pub fn task_info(&self, task_id: TaskId) -> Option<&TaskInfo> {
        self.tasks.get(&task_id)
    }

    /// Stops every task within `DEFAULT_SHUTDOWN_TIMEOUT_MS`.
    ///
    /// Slot drivers are joined first so that no slot reaches a stopped cell.
    /// A task that panicked or missed the deadline is marked `Failed` and
    /// reported in the returned error.
    pub async fn shutdown(&mut self) -> Result<(), TaskError> {
        self.shutdown_tx.send_replace(true);
        for info in self.tasks.values_mut().filter(|info| info.state == TaskState::Running) {
            info.state = TaskState::Stopping;
        }
        self.task_base.shutdown_all().await;

        let deadline = tokio::time::Instant::now() + Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS);
        let mut handles = std::mem::take(&mut self.join_handles);
        handles.sort_by_key(|(id, _)| *id);

        let mut failures = Vec::new();
        for (task_id, handle) in handles {
            let outcome = match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(())) => None,
                Ok(Err(_)) => Some("task panicked"),
                Err(_) => Some("shutdown timeout"),
            };
            let Some(info) = self.tasks.get_mut(&task_id) else {
                continue;
            };
            match outcome {
                None => info.state = TaskState::Stopped,
                Some(reason) => {
                    info.state = TaskState::Failed;
                    info.error = Some(reason.to_string());
                    failures.push(format!("{task_id}: {reason}"));
                }
            }
        }

        if let Some(first) = self.tasks.iter().find(|(_, info)| info.state == TaskState::Failed) {
            return Err(TaskError {
                task_id: *first.0,
                message: format!("Tasks failed during shutdown: {}", failures.join(", ")),
            });
        }
        info!("all tasks stopped");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
