//! gNB application end to end
//!
//! Runs the full task pipeline: slot drivers, cell schedulers, loopback PHY,
//! UE manager and metrics.

use integration_tests::{fdd_cell, gnb_config, init_test_logging, real_time_budget, wait_for};
use nextgsim_common::config::GnbConfig;
use nextgsim_common::CellIndex;
use nextgsim_gnb::{load_gnb_config_from_str, GnbApp, TaskId, TaskState};

fn busy_cell_config(total_slots: u64, seed: u64) -> GnbConfig {
    let mut second = fdd_cell();
    second.pci = 2;
    let mut config = gnb_config(vec![fdd_cell(), second], total_slots, seed);
    config.scheduler.metrics_report_period_slots = 200;
    config.simulation.rach_probability = 0.3;
    config.simulation.dl_bler = 0.05;
    config.simulation.ul_bler = 0.05;
    config.simulation.max_ues = 8;
    config.simulation.dl_traffic_bytes = 3000;
    config.simulation.ul_traffic_bytes = 1000;
    config.simulation.traffic_period_slots = 10;
    config
}

#[tokio::test]
async fn test_free_running_two_cells() {
    init_test_logging();
    let mut app = GnbApp::start(busy_cell_config(2000, 77)).expect("gNB failed to start");
    app.run_until_done().await;
    let summary = app.shutdown().await.expect("clean shutdown");

    for cell in [CellIndex(0), CellIndex(1)] {
        let totals = summary.cell(cell).expect("cell never reported");
        assert!(totals.nof_reports >= 9, "{cell}: {} reports", totals.nof_reports);
        assert!(totals.nof_rars > 0, "{cell}: no random access");
        assert!(totals.nof_msg3_grants > 0);
        assert!(totals.dl_bytes > 0, "{cell}: no DL traffic");
        assert!(totals.nof_dl_new_txs > 0);
        assert_eq!(totals.nof_late_slots, 0);
    }
}

#[tokio::test]
async fn test_real_time_run_until_shutdown() {
    init_test_logging();
    let mut config = busy_cell_config(0, 1);
    config.cells.truncate(1);
    config.simulation.real_time = true;
    config.scheduler.metrics_report_period_slots = 50;
    let scs = config.cells[0].scs;
    let app = GnbApp::start(config).expect("gNB failed to start");
    assert_eq!(
        app.task_manager().get_task_state(TaskId::SlotDriver(CellIndex(0))),
        Some(TaskState::Running)
    );

    let (slots, _) = wait_for(real_time_budget(scs, 50), || {
        app.metrics().cell(CellIndex(0)).map(|c| c.nof_slots)
    })
    .await
    .expect("no metrics report in real time");
    assert!(slots >= 50);

    let summary = app.shutdown().await.expect("clean shutdown");
    assert!(summary.cell(CellIndex(0)).map_or(0, |c| c.nof_slots) >= 50);
}

#[tokio::test]
async fn test_app_from_yaml() {
    init_test_logging();
    let yaml = r#"
cells:
  - pci: 11
    scs: 30khz
    bandwidth_mhz: 40
scheduler:
  policy: proportional_fair
  metrics_report_period_slots: 100
simulation:
  real_time: false
  total_slots: 600
  seed: 3
  rach_probability: 0.5
"#;
    let config = load_gnb_config_from_str(yaml).expect("valid YAML");
    let mut app = GnbApp::start(config).expect("gNB failed to start");
    app.run_until_done().await;
    let summary = app.shutdown().await.expect("clean shutdown");
    let totals = summary.cell(CellIndex(0)).expect("cell never reported");
    assert!(totals.nof_slots >= 500);
    assert!(totals.nof_rars > 0);
}
