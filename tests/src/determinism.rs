//! Determinism and result publication
//!
//! Two schedulers fed the same input sequence must publish identical results,
//! and a published result must not change until the next slot runs.

use std::sync::Arc;

use integration_tests::{
    fdd_cell_with_common_channels, init_test_logging, SchedulerTestEnv, TestExpertConfig, TrafficGenerator,
};
use nextgsim_common::config::{SchedulingPolicyKind, SimulationConfig};
use nextgsim_common::Rnti;
use nextgsim_sched::{SchedResult, SchedulerEvent};

fn channel(seed: u64) -> SimulationConfig {
    SimulationConfig {
        seed,
        dl_bler: 0.1,
        ul_bler: 0.1,
        rach_probability: 0.0,
        ..SimulationConfig::default()
    }
}

fn run(seed: u64, policy: SchedulingPolicyKind, nof_slots: u32) -> (Vec<SchedResult>, Vec<SchedulerEvent>) {
    let expert = TestExpertConfig::new().with_policy(policy).with_max_harq_retxs(2).build();
    let mut env = SchedulerTestEnv::new(&fdd_cell_with_common_channels(), &expert).with_loopback_phy(channel(seed));
    let mut traffic = TrafficGenerator::new(&env, seed, 8);
    let mut results = Vec::with_capacity(nof_slots as usize);
    for _ in 0..nof_slots {
        let result = env.run_slot();
        traffic.drive(&env, &result);
        results.push(result.as_ref().clone());
    }
    (results, env.events())
}

#[test]
fn test_identical_inputs_give_identical_results() {
    init_test_logging();
    for policy in [SchedulingPolicyKind::RoundRobin, SchedulingPolicyKind::ProportionalFair] {
        let (first, first_events) = run(5, policy, 1500);
        let (second, second_events) = run(5, policy, 1500);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a, b, "results differ at slot {}", a.slot);
        }
        assert_eq!(first_events, second_events);
    }
}

#[test]
fn test_different_inputs_give_different_results() {
    init_test_logging();
    let (first, _) = run(5, SchedulingPolicyKind::RoundRobin, 500);
    let (second, _) = run(6, SchedulingPolicyKind::RoundRobin, 500);
    assert_ne!(first, second);
}

#[test]
fn test_last_result_is_stable_until_next_slot() {
    init_test_logging();
    let mut env = SchedulerTestEnv::new(&fdd_cell_with_common_channels(), &TestExpertConfig::new().build());
    let rnti = Rnti::new(0x4601);
    env.add_ue(rnti);
    env.dl_data(rnti, 5000);

    let published = env.run_slot();
    let first = env.scheduler().last_result().cloned();
    let second = env.scheduler().last_result().cloned();
    assert_eq!(first, second);
    assert_eq!(first.as_ref(), Some(published.as_ref()));

    // Queued inputs are only applied by the next slot
    env.dl_data(rnti, 90_000);
    env.ul_data(rnti, 4000);
    assert_eq!(env.scheduler().last_result(), Some(published.as_ref()));
    let shared = env.scheduler().last_result_shared().expect("result published");
    assert!(Arc::ptr_eq(&published, &shared));

    let next = env.run_slot();
    assert_eq!(env.scheduler().last_result(), Some(next.as_ref()));
    // The earlier result is untouched
    assert_eq!(first.as_ref(), Some(published.as_ref()));
}
