//! Seeded random traffic for scenario tests
//!
//! Every slot, `TrafficGenerator::drive` may refresh DL buffer states and BSRs
//! of the connected UEs, page an idle UE, and report preambles in the PRACH
//! occasions of the last result. The same seed always yields the same inputs.

use nextgsim_common::Rnti;
use nextgsim_sched::{CellIndication, PagingInformation, SchedResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::sched_env::SchedulerTestEnv;

/// Random traffic source.
pub struct TrafficGenerator {
    rng: StdRng,
    rntis: Vec<Rnti>,
    /// Probability that a UE gets new DL or UL data in a slot
    pub data_probability: f64,
    /// Probability of a paging request per slot
    pub paging_probability: f64,
    /// Probability of preambles in a PRACH occasion
    pub rach_probability: f64,
}

impl TrafficGenerator {
    /// Creates `nof_ues` connected UEs in `env` and a generator seeded with `seed`.
    pub fn new(env: &SchedulerTestEnv, seed: u64, nof_ues: u16) -> Self {
        let rntis: Vec<Rnti> = (0..nof_ues).map(|i| Rnti::new(0x4601 + i)).collect();
        for rnti in &rntis {
            env.add_ue(*rnti);
        }
        Self {
            rng: StdRng::seed_from_u64(seed),
            rntis,
            data_probability: 0.2,
            paging_probability: 0.05,
            rach_probability: 0.5,
        }
    }

    /// RNTIs of the UEs created by the generator.
    pub fn rntis(&self) -> &[Rnti] {
        &self.rntis
    }

    /// Queues the random inputs that follow `last`.
    pub fn drive(&mut self, env: &SchedulerTestEnv, last: &SchedResult) {
        for &rnti in &self.rntis {
            if self.rng.gen_bool(self.data_probability) {
                env.dl_data(rnti, self.rng.gen_range(100..20_000));
            }
            if self.rng.gen_bool(self.data_probability) {
                env.ul_data(rnti, self.rng.gen_range(100..10_000));
            }
        }
        if self.rng.gen_bool(self.paging_probability) {
            env.send(CellIndication::Paging(PagingInformation {
                paging_identity: self.rng.gen_range(0..1u64 << 40),
                ue_drx_cycle_rf: None,
            }));
        }
        if !last.ul.prachs.is_empty() && self.rng.gen_bool(self.rach_probability) {
            let nof_preambles = self.rng.gen_range(1..=4);
            let preambles: Vec<u8> = (0..nof_preambles).map(|_| self.rng.gen_range(0..64)).collect();
            env.send_rach(last, &preambles);
        }
    }
}
