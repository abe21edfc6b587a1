//! DL scheduling scenarios
//!
//! Grant sizing for a single UE, sharing among several UEs and link
//! adaptation from CQI feedback.

use integration_tests::{fdd_cell, init_test_logging, perfect_channel, SchedulerTestEnv, TestExpertConfig};
use nextgsim_common::config::SchedulerExpertConfig;
use nextgsim_common::Rnti;
use nextgsim_sched::result::DciKind;
use nextgsim_sched::{CellIndication, UciIndication};

#[test]
fn test_20mhz_single_ue_1000_bytes() {
    init_test_logging();
    let cell = fdd_cell();
    assert_eq!(cell.bandwidth_mhz, 20);
    let mut env = SchedulerTestEnv::new(&cell, &SchedulerExpertConfig::default());
    assert_eq!(env.scheduler().config().nof_prbs, 106);

    let rnti = Rnti::new(0x4601);
    env.add_ue(rnti);
    env.dl_data(rnti, 1000);
    let result = env.run_slot();

    assert_eq!(result.dl.ue_grants.len(), 1);
    let grant = &result.dl.ue_grants[0];
    assert_eq!(grant.pdsch.rnti, rnti);
    assert!(!grant.is_retx);
    assert!(
        grant.pdsch.tbs_bytes >= 1000,
        "TBS {} bytes cannot carry the backlog",
        grant.pdsch.tbs_bytes
    );

    let ue = env.scheduler().ue(rnti).expect("UE exists");
    assert_eq!(grant.pdsch.mcs, ue.dl_mcs());
    assert_eq!(ue.dl_pending_bytes(), 0);
    let carried: u32 = grant.lc_allocations.iter().map(|lc| lc.bytes).sum();
    assert!(carried >= 1000);

    // The matching DL assignment goes out in the same slot
    let pdcch = result
        .dl
        .pdcchs
        .iter()
        .find(|p| p.rnti == rnti)
        .expect("no PDCCH for the grant");
    assert_eq!(pdcch.dci, DciKind::DlAssignment);
    assert!(!pdcch.region.overlaps(&nextgsim_sched::cell::GridRegion::new(
        grant.pdsch.symbols,
        grant.pdsch.prbs
    )));

    // And a HARQ-ACK is expected later on PUCCH
    let ack = env.run_until(10, |r| r.pucch_of(rnti).map_or(false, |p| p.harq_bits > 0));
    assert!(ack.is_some());
}

#[test]
fn test_backlog_is_drained_with_acks() {
    init_test_logging();
    let mut env = SchedulerTestEnv::new(&fdd_cell(), &SchedulerExpertConfig::default())
        .with_loopback_phy(perfect_channel(1));
    let rnti = Rnti::new(0x4601);
    env.add_ue(rnti);
    env.dl_data(rnti, 200_000);
    env.run_slots(300);

    let ue = env.scheduler().ue(rnti).expect("UE exists");
    assert_eq!(ue.dl_pending_bytes(), 0);
    let metrics = env.scheduler().metrics();
    assert!(metrics.dl_bytes >= 200_000);
    assert_eq!(metrics.nof_harq_failures, 0);
    assert!(env.rlf_events().is_empty());
}

#[test]
fn test_grants_per_slot_are_capped() {
    init_test_logging();
    let expert = TestExpertConfig::new().with_max_dl_grants_per_slot(2).build();
    let mut env = SchedulerTestEnv::new(&fdd_cell(), &expert);
    for i in 0..6 {
        let rnti = Rnti::new(0x4601 + i);
        env.add_ue(rnti);
        env.dl_data(rnti, 500);
    }
    let mut served = std::collections::BTreeSet::new();
    for result in env.run_slots(6) {
        assert!(result.dl.ue_grants.len() <= 2);
        served.extend(result.dl.ue_grants.iter().map(|g| g.pdsch.rnti));
    }
    // Round robin reaches every UE
    assert_eq!(served.len(), 6);
}

#[test]
fn test_fixed_mcs_is_used() {
    init_test_logging();
    let expert = TestExpertConfig::new().with_fixed_dl_mcs(7).build();
    let mut env = SchedulerTestEnv::new(&fdd_cell(), &expert);
    let rnti = Rnti::new(0x4601);
    env.add_ue(rnti);
    env.dl_data(rnti, 100_000);
    for result in env.run_slots(4) {
        for grant in &result.dl.ue_grants {
            assert_eq!(grant.pdsch.mcs, 7);
        }
    }
}

#[test]
fn test_cqi_report_changes_mcs() {
    init_test_logging();
    let mut env = SchedulerTestEnv::new(&fdd_cell(), &SchedulerExpertConfig::default());
    let rnti = Rnti::new(0x4601);
    env.add_ue(rnti);
    env.run_slot();
    let initial = env.scheduler().ue(rnti).expect("UE exists").dl_mcs();

    env.send(CellIndication::Uci(UciIndication {
        rnti,
        slot: env.next_slot(),
        harq_acks: Vec::new(),
        sr: false,
        cqi: Some(3),
    }));
    env.run_slot();
    let ue = env.scheduler().ue(rnti).expect("UE exists");
    assert_eq!(ue.cqi(), 3);
    assert!(ue.dl_mcs() < initial);
}
