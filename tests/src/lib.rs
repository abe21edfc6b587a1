//! Integration test framework for the nextgsim cell scheduler
//!
//! Scenario tests drive a `CellScheduler` slot by slot through the public API
//! and check the published results.
//!
//! # Components
//!
//! - [`sched_env`] - slot-driving harness around one cell scheduler
//! - [`result_checks`] - resource-grid checks over published results
//! - [`test_fixtures`] - cell and gNB configuration builders
//! - [`test_utils`] - logging setup and real-time wait helpers
//! - [`traffic`] - seeded random traffic
//!
//! # Test Categories
//!
//! 1. **Grid disjointness** - randomized traffic, no illegal overlap in any slot
//! 2. **Determinism** - identical inputs give identical results
//! 3. **DL scenarios** - grant sizing, PDCCH pairing, link adaptation
//! 4. **Random access** - RAR, Msg3 and RA window expiry
//! 5. **HARQ failure** - a single radio link failure at the retry ceiling
//! 6. **gNB application** - the task pipeline end to end

#![allow(missing_docs)]

pub mod result_checks;
pub mod sched_env;
pub mod test_fixtures;
pub mod test_utils;
pub mod traffic;

pub use result_checks::{assert_disjoint, illegal_overlaps, Allocation, AllocationKind};
pub use sched_env::{broken_channel, perfect_channel, SchedulerTestEnv};
pub use test_fixtures::{fdd_cell, fdd_cell_with_common_channels, gnb_config, tdd_cell, TestExpertConfig};
pub use traffic::TrafficGenerator;
pub use test_utils::{
    init_test_logging, real_time_budget, wait_for, TestResult, DEFAULT_POLL_INTERVAL, DEFAULT_TEST_TIMEOUT,
};
