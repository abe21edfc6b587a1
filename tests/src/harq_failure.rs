//! HARQ retransmission ceiling and radio link failure
//!
//! A NACKed transport block is retransmitted until the configured ceiling;
//! the failure that follows raises exactly one RLF event for the UE, which is
//! not scheduled anymore.

use integration_tests::{broken_channel, fdd_cell, init_test_logging, perfect_channel, SchedulerTestEnv, TestExpertConfig};
use nextgsim_common::Rnti;
use nextgsim_sched::SchedulerEvent;

fn rlf_slot_of(event: &SchedulerEvent) -> u32 {
    match event {
        SchedulerEvent::RadioLinkFailure { slot, .. } => slot.count(),
        other => panic!("not an RLF: {other}"),
    }
}

#[test]
fn test_exactly_one_rlf_at_dl_ceiling() {
    init_test_logging();
    let expert = TestExpertConfig::new().with_max_harq_retxs(3).build();
    let mut env = SchedulerTestEnv::new(&fdd_cell(), &expert).with_loopback_phy(broken_channel(9));
    let rnti = Rnti::new(0x4601);
    env.add_ue(rnti);
    env.dl_data(rnti, 10_000_000);

    let results = env.run_slots(300);
    let rlfs = env.rlf_events();
    assert_eq!(rlfs.len(), 1);
    assert!(matches!(rlfs[0], SchedulerEvent::RadioLinkFailure { rnti: r, .. } if r == rnti));
    assert!(env.scheduler().ue(rnti).expect("UE kept").rlf_reported());

    // Retransmissions stop at the ceiling, and one process reached it
    let mut retxs_per_harq = std::collections::BTreeMap::new();
    for grant in results.iter().flat_map(|r| r.dl.ue_grants.iter()).filter(|g| g.is_retx) {
        *retxs_per_harq.entry(grant.harq_id).or_insert(0u32) += 1;
    }
    assert_eq!(retxs_per_harq.values().max().copied(), Some(3));

    // Nothing scheduled for the UE once the failure is applied
    let rlf_slot = rlf_slot_of(&rlfs[0]);
    for result in results.iter().filter(|r| r.slot.count() > rlf_slot + 1) {
        assert!(result.dl.ue_grants.is_empty(), "grant after RLF in slot {}", result.slot);
        assert!(result.pusch_of(rnti).is_none());
    }
    assert!(env.scheduler().metrics().nof_harq_failures >= 1);
}

#[test]
fn test_exactly_one_rlf_when_both_directions_fail() {
    init_test_logging();
    let expert = TestExpertConfig::new().with_max_harq_retxs(2).build();
    let mut env = SchedulerTestEnv::new(&fdd_cell(), &expert).with_loopback_phy(broken_channel(10));
    let rnti = Rnti::new(0x4601);
    env.add_ue(rnti);
    env.dl_data(rnti, 1_000_000);
    env.ul_data(rnti, 1_000_000);
    env.run_slots(400);
    assert_eq!(env.rlf_events().len(), 1);
}

#[test]
fn test_one_rlf_per_failing_ue() {
    init_test_logging();
    let expert = TestExpertConfig::new().with_max_harq_retxs(1).build();
    let mut env = SchedulerTestEnv::new(&fdd_cell(), &expert).with_loopback_phy(broken_channel(11));
    let rntis = [Rnti::new(0x4601), Rnti::new(0x4602), Rnti::new(0x4603)];
    for rnti in rntis {
        env.add_ue(rnti);
        env.dl_data(rnti, 100_000);
    }
    env.run_slots(300);

    let mut failed: Vec<Rnti> = env
        .rlf_events()
        .iter()
        .filter_map(|e| match e {
            SchedulerEvent::RadioLinkFailure { rnti, .. } => Some(*rnti),
            _ => None,
        })
        .collect();
    failed.sort();
    assert_eq!(failed, rntis.to_vec());
}

#[test]
fn test_no_rlf_on_clean_channel() {
    init_test_logging();
    let expert = TestExpertConfig::new().with_max_harq_retxs(1).with_metrics_period(100).build();
    let mut env = SchedulerTestEnv::new(&fdd_cell(), &expert).with_loopback_phy(perfect_channel(12));
    let rnti = Rnti::new(0x4601);
    env.add_ue(rnti);
    for _ in 0..5 {
        env.dl_data(rnti, 50_000);
        env.ul_data(rnti, 20_000);
        env.run_slots(100);
    }
    assert!(env.rlf_events().is_empty());

    let reports = env.drain_metrics();
    assert_eq!(reports.len(), 5);
    assert!(reports.iter().all(|m| m.nof_harq_failures == 0));
    assert!(reports.iter().map(|m| m.nof_harq_acks).sum::<u32>() > 0);
    assert!(reports.iter().map(|m| m.ul_bytes).sum::<u64>() > 0);
}
