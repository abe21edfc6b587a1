//! Resource grid disjointness under random load
//!
//! Drives cells with seeded random traffic, preambles, paging and a lossy
//! loopback PHY, and checks that no published result places two channels on
//! the same resource elements outside the multiplexing exceptions.

use integration_tests::{
    assert_disjoint, fdd_cell, fdd_cell_with_common_channels, init_test_logging, tdd_cell, SchedulerTestEnv,
    TestExpertConfig, TrafficGenerator,
};
use nextgsim_common::config::{CellConfig, SchedulingPolicyKind, SimulationConfig};

const NOF_SLOTS: u32 = 2000;

fn lossy_channel(seed: u64) -> SimulationConfig {
    SimulationConfig {
        seed,
        dl_bler: 0.2,
        ul_bler: 0.2,
        rach_probability: 0.0,
        ..SimulationConfig::default()
    }
}

fn run_random_load(cell: CellConfig, policy: SchedulingPolicyKind, seed: u64, nof_ues: u16) {
    let expert = TestExpertConfig::new().with_policy(policy).build();
    let mut env = SchedulerTestEnv::new(&cell, &expert).with_loopback_phy(lossy_channel(seed));
    let mut traffic = TrafficGenerator::new(&env, seed, nof_ues);
    let nof_prbs = env.scheduler().config().nof_prbs;

    let mut nof_ue_grants = 0usize;
    for _ in 0..NOF_SLOTS {
        let result = env.run_slot();
        assert_disjoint(&result);
        for pdsch in result.all_pdschs() {
            assert!(pdsch.prbs.stop() <= nof_prbs, "PDSCH {} outside the carrier", pdsch.prbs);
        }
        for pusch in &result.ul.puschs {
            assert!(pusch.prbs.stop() <= nof_prbs, "PUSCH {} outside the carrier", pusch.prbs);
        }
        // One DL grant per UE and slot
        let mut rntis: Vec<_> = result.dl.ue_grants.iter().map(|g| g.pdsch.rnti).collect();
        rntis.sort();
        rntis.dedup();
        assert_eq!(rntis.len(), result.dl.ue_grants.len());

        nof_ue_grants += result.dl.ue_grants.len() + result.ul.puschs.len();
        traffic.drive(&env, &result);
    }
    assert!(nof_ue_grants > 0, "random load produced no grant");
}

#[test]
fn test_fdd_round_robin_is_disjoint() {
    init_test_logging();
    for seed in [1, 2, 3] {
        run_random_load(fdd_cell(), SchedulingPolicyKind::RoundRobin, seed, 8);
    }
}

#[test]
fn test_fdd_proportional_fair_is_disjoint() {
    init_test_logging();
    for seed in [11, 12] {
        run_random_load(fdd_cell(), SchedulingPolicyKind::ProportionalFair, seed, 12);
    }
}

#[test]
fn test_common_channels_are_disjoint() {
    init_test_logging();
    for seed in [21, 22] {
        run_random_load(fdd_cell_with_common_channels(), SchedulingPolicyKind::RoundRobin, seed, 6);
    }
}

#[test]
fn test_tdd_is_disjoint() {
    init_test_logging();
    run_random_load(tdd_cell(), SchedulingPolicyKind::ProportionalFair, 31, 10);
}

#[test]
fn test_tdd_grants_respect_slot_directions() {
    init_test_logging();
    let cell = tdd_cell();
    let mut env = SchedulerTestEnv::new(&cell, &TestExpertConfig::new().build())
        .with_loopback_phy(lossy_channel(41));
    let mut traffic = TrafficGenerator::new(&env, 41, 4);
    for _ in 0..400 {
        let result = env.run_slot();
        let cfg = env.scheduler().config();
        if !cfg.is_dl_slot(result.slot) {
            assert!(result.dl.ue_grants.is_empty(), "DL grant in UL slot {}", result.slot);
            assert!(result.dl.pdcchs.is_empty(), "PDCCH in UL slot {}", result.slot);
        }
        if !cfg.is_ul_slot(result.slot) {
            assert!(result.ul.puschs.is_empty(), "PUSCH in DL slot {}", result.slot);
            assert!(result.ul.pucchs.is_empty(), "PUCCH in DL slot {}", result.slot);
        }
        traffic.drive(&env, &result);
    }
}
