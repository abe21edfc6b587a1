//! Random access scenarios
//!
//! A detected preamble is answered by a RAR carrying a Msg3 grant inside the
//! RA response window, or dropped once the window closes.

use std::collections::BTreeSet;

use integration_tests::{
    broken_channel, fdd_cell, init_test_logging, perfect_channel, tdd_cell, SchedulerTestEnv, TestExpertConfig,
};
use nextgsim_common::config::SchedulerExpertConfig;
use nextgsim_sched::result::DciKind;
use nextgsim_sched::SchedulerEvent;

#[test]
fn test_preamble_gets_rar_and_msg3() {
    init_test_logging();
    let mut env = SchedulerTestEnv::new(&fdd_cell(), &SchedulerExpertConfig::default())
        .with_loopback_phy(perfect_channel(3));
    let window = env.scheduler().config().prach.ra_resp_window_slots;

    let prach = env.run_until(20, |r| !r.ul.prachs.is_empty()).expect("no PRACH occasion");
    env.send_rach(&prach, &[17]);

    let rar_result = env
        .run_until(window, |r| !r.dl.rars.is_empty())
        .expect("no RAR inside the response window");
    let delay = rar_result.slot - prach.slot;
    assert!(delay >= 1 && delay <= window as i32);
    let rar = &rar_result.dl.rars[0];
    assert_eq!(rar.grants.len(), 1);
    assert_eq!(rar.grants[0].preamble_id, 17);
    let tc_rnti = rar.grants[0].tc_rnti;
    assert!(tc_rnti.is_crnti());
    assert!(rar_result
        .dl
        .pdcchs
        .iter()
        .any(|p| p.rnti == rar.ra_rnti && p.dci == DciKind::Rar));

    let msg3 = env
        .run_until(20, |r| r.ul.puschs.iter().any(|p| p.is_msg3 && p.rnti == tc_rnti))
        .expect("Msg3 PUSCH never scheduled");
    assert!(msg3.slot - rar_result.slot >= 1);

    // The loopback PHY decodes Msg3 and the scheduler reports it
    env.run_slot();
    let events = env.msg3_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        SchedulerEvent::Msg3Received { tc_rnti: t, preamble_id: 17, .. } if t == tc_rnti
    ));
    assert_eq!(env.scheduler().ra().nof_pending_msg3s(), 0);
    assert_eq!(env.scheduler().metrics().nof_rars, 1);
}

#[test]
fn test_preamble_in_tdd_cell() {
    init_test_logging();
    let mut env = SchedulerTestEnv::new(&tdd_cell(), &SchedulerExpertConfig::default())
        .with_loopback_phy(perfect_channel(4));
    let prach = env.run_until(40, |r| !r.ul.prachs.is_empty()).expect("no PRACH occasion");
    env.send_rach(&prach, &[2, 9]);
    env.run_slots(60);

    let preambles: BTreeSet<u8> = env
        .msg3_events()
        .iter()
        .filter_map(|e| match e {
            SchedulerEvent::Msg3Received { preamble_id, .. } => Some(*preamble_id),
            _ => None,
        })
        .collect();
    assert_eq!(preambles, BTreeSet::from([2, 9]));
}

#[test]
fn test_unanswered_preambles_are_dropped_after_window() {
    init_test_logging();
    // A Msg3 occupying the whole PUSCH band leaves room for one RAR entry per slot
    let mut expert = TestExpertConfig::new().build();
    expert.msg3_size_bytes = 1_000_000;
    let mut env = SchedulerTestEnv::new(&fdd_cell(), &expert);
    let window = env.scheduler().config().prach.ra_resp_window_slots;

    let prach = env.run_until(20, |r| !r.ul.prachs.is_empty()).expect("no PRACH occasion");
    let nof_preambles = window + 2;
    let ids: Vec<u8> = (0..nof_preambles as u8).collect();
    env.send_rach(&prach, &ids);

    let mut nof_answered = 0;
    for result in env.run_slots(window + 5) {
        for rar in &result.dl.rars {
            assert!(result.slot - prach.slot <= window as i32, "RAR after the window");
            nof_answered += rar.grants.len() as u32;
        }
    }
    let nof_dropped = env.scheduler().metrics().nof_rach_drops;
    assert!(nof_answered <= window);
    assert!(nof_dropped >= 2);
    assert_eq!(nof_answered + nof_dropped, nof_preambles);
    assert_eq!(env.scheduler().ra().nof_pending_preambles(), 0);
}

#[test]
fn test_failed_msg3_is_retransmitted_then_abandoned() {
    init_test_logging();
    let expert = TestExpertConfig::new().with_max_msg3_retxs(2).build();
    let mut env = SchedulerTestEnv::new(&fdd_cell(), &expert).with_loopback_phy(broken_channel(5));

    let prach = env.run_until(20, |r| !r.ul.prachs.is_empty()).expect("no PRACH occasion");
    env.send_rach(&prach, &[40]);

    let mut nof_msg3_txs = 0;
    let mut nof_msg3_retxs = 0;
    for result in env.run_slots(120) {
        for pusch in result.ul.puschs.iter().filter(|p| p.is_msg3) {
            nof_msg3_txs += 1;
            if pusch.is_retx {
                nof_msg3_retxs += 1;
            }
        }
    }
    assert_eq!(nof_msg3_txs, 3);
    assert_eq!(nof_msg3_retxs, 2);
    assert!(env.msg3_events().is_empty());
    assert_eq!(env.scheduler().ra().nof_pending_msg3s(), 0);
    assert_eq!(env.scheduler().nof_ues(), 0);
}
