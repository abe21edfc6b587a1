//! nextgsim-gnb - gNB scheduler host
//!
//! Hosts one `CellScheduler` per configured cell and drives it slot by slot
//! against a loopback PHY, so the scheduler can be exercised end to end
//! without radio hardware.
//!
//! # Architecture
//!
//! The gNB uses an actor-based task model where each component runs as an
//! independent async task communicating via typed message channels.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                          gNB                               │
//! │  ┌─────────────┐  slot   ┌─────────────┐  result  ┌──────┐ │
//! │  │ Slot driver │ ──────▶ │  Cell task  │ ───────▶ │ PHY  │ │
//! │  │ (per cell)  │         │ (per cell)  │          │ task │ │
//! │  └──────┬──────┘         └──┬───────▲──┘          └──┬───┘ │
//! │         │ tick       events │       │ indications    │     │
//! │         ▼                   ▼       └────────────────┘     │
//! │  ┌─────────────┐      ┌──────────┐                         │
//! │  │ UE manager  │      │ Metrics  │                         │
//! │  └─────────────┘      └──────────┘                         │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Task Lifecycle
//!
//! Tasks are managed by `TaskManager` which handles:
//! - Task spawning and state tracking
//! - Graceful shutdown coordination with a timeout
//!
//! # Example
//!
//! ```rust,ignore
//! use nextgsim_gnb::{load_and_validate_gnb_config, GnbApp};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_and_validate_gnb_config("config/gnb-sched.yaml")?;
//!     let mut app = GnbApp::start(config)?;
//!     app.run_until_done().await;
//!     let summary = app.shutdown().await?;
//!     println!("{summary:?}");
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod cell;
pub mod metrics;
pub mod phy;
pub mod slot;
pub mod tasks;
pub mod ue_mgr;

pub use app::{
    load_and_validate_gnb_config, load_gnb_config, load_gnb_config_from_str, validate_gnb_config,
    AppError, ConfigError, ConfigValidationError, GnbApp,
};
pub use cell::{CellTask, CellTaskError, TaskEventNotifier, TaskMetricsNotifier};
pub use metrics::{CellTotals, MetricsSummary, MetricsTask};
pub use phy::{LoopbackPhy, PhyStats, PhyTask};
pub use slot::SlotDriverTask;
pub use tasks::{
    CellMessage, GnbTaskBase, GnbTaskReceivers, MetricsMessage, PhyMessage, SlotDriverMessage, Task, TaskError,
    TaskHandle, TaskId, TaskInfo, TaskManager, TaskMessage, TaskState, UeManagerMessage,
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_SHUTDOWN_TIMEOUT_MS,
};
pub use ue_mgr::{UeManagerStats, UeManagerTask};
