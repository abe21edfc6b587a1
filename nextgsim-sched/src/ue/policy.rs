//! Scheduling policies for the new-data pass
//!
//! A policy only decides the order in which UEs with pending data are offered
//! resources. Retransmissions are ordered by the scheduler itself.

use std::cmp::Ordering;
use std::fmt;

use nextgsim_common::config::{SchedulerExpertConfig, SchedulingPolicyKind};
use nextgsim_common::{LinkDirection, UeIndex};

/// What a policy knows about one candidate UE.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyCandidate {
    /// UE
    pub ue_index: UeIndex,
    /// Bytes one PRB carries at the UE MCS
    pub bytes_per_prb: f64,
    /// Average served bytes per slot
    pub avg_throughput: f64,
    /// Pending bytes weighted by logical channel priority
    pub weighted_backlog: f64,
    /// Lowest priority value among the channels with data
    pub top_lc_priority: u8,
}

/// Ordering of UEs for new transmissions.
///
/// Implementations must be deterministic and break ties by ascending UE index.
pub trait SchedulingPolicy: Send + fmt::Debug {
    /// Policy kind.
    fn kind(&self) -> SchedulingPolicyKind;

    /// Returns the candidates of `direction` in service order.
    fn order(&mut self, direction: LinkDirection, candidates: &[PolicyCandidate]) -> Vec<UeIndex>;
}

/// Builds the policy selected by the expert configuration.
pub fn create_policy(expert: &SchedulerExpertConfig) -> Box<dyn SchedulingPolicy> {
    match expert.policy {
        SchedulingPolicyKind::RoundRobin => Box::new(RoundRobinPolicy::default()),
        SchedulingPolicyKind::ProportionalFair => Box::new(ProportionalFairPolicy::new(expert.pf_fairness_coeff)),
    }
}

/// Round robin within priority tiers.
///
/// UEs whose best pending logical channel has a lower priority value come
/// first. Inside a tier, service starts one UE after the first UE served last
/// time.
#[derive(Debug, Default, Clone)]
pub struct RoundRobinPolicy {
    next_dl: u16,
    next_ul: u16,
}

impl SchedulingPolicy for RoundRobinPolicy {
    fn kind(&self) -> SchedulingPolicyKind {
        SchedulingPolicyKind::RoundRobin
    }

    fn order(&mut self, direction: LinkDirection, candidates: &[PolicyCandidate]) -> Vec<UeIndex> {
        let next = match direction {
            LinkDirection::Downlink => &mut self.next_dl,
            LinkDirection::Uplink => &mut self.next_ul,
        };
        let start = *next;
        let mut ranked: Vec<(u8, UeIndex)> = candidates.iter().map(|c| (c.top_lc_priority, c.ue_index)).collect();
        // Indices at or after the pointer first, then the wrapped ones.
        ranked.sort_by_key(|(tier, ue)| (*tier, ue.0 < start, ue.0));
        if let Some((_, first)) = ranked.first() {
            *next = first.0.wrapping_add(1);
        }
        ranked.into_iter().map(|(_, ue)| ue).collect()
    }
}

/// Proportional fair: `rate / avg_throughput^alpha * ln(1 + weighted_backlog)`,
/// highest first.
#[derive(Debug, Clone)]
pub struct ProportionalFairPolicy {
    fairness_coeff: f64,
}

impl ProportionalFairPolicy {
    /// Creates the policy with fairness exponent `fairness_coeff`.
    pub fn new(fairness_coeff: f64) -> Self {
        Self { fairness_coeff }
    }

    fn metric(&self, candidate: &PolicyCandidate) -> f64 {
        // Avoid a division by zero for UEs never served.
        let avg = candidate.avg_throughput.max(1.0);
        candidate.bytes_per_prb / avg.powf(self.fairness_coeff) * candidate.weighted_backlog.ln_1p()
    }
}

impl SchedulingPolicy for ProportionalFairPolicy {
    fn kind(&self) -> SchedulingPolicyKind {
        SchedulingPolicyKind::ProportionalFair
    }

    fn order(&mut self, _direction: LinkDirection, candidates: &[PolicyCandidate]) -> Vec<UeIndex> {
        let mut ranked: Vec<(f64, UeIndex)> = candidates.iter().map(|c| (self.metric(c), c.ue_index)).collect();
        ranked.sort_by(|a, b| match b.0.total_cmp(&a.0) {
            Ordering::Equal => a.1.cmp(&b.1),
            other => other,
        });
        ranked.into_iter().map(|(_, ue)| ue).collect()
    }
}
