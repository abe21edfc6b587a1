//! Test fixtures and configuration helpers
//!
//! Provides pre-configured cells and configuration builders.

use nextgsim_common::config::{
    CellConfig, CsiRsConfig, GnbConfig, SchedulerExpertConfig, SchedulingPolicyKind, SiMessageConfig,
    TddPatternConfig,
};
use nextgsim_common::SubcarrierSpacing;

/// FDD cell, 20 MHz at 15 kHz (106 PRBs).
pub fn fdd_cell() -> CellConfig {
    CellConfig::default()
}

/// FDD cell carrying every common channel: SSB on two beams, SIB1, two SI
/// messages, paging and periodic CSI-RS.
pub fn fdd_cell_with_common_channels() -> CellConfig {
    let mut cell = fdd_cell();
    cell.ssb.beam_bitmap = 0b11;
    cell.si_messages = vec![
        SiMessageConfig {
            period_radio_frames: 8,
            payload_bytes: 96,
        },
        SiMessageConfig {
            period_radio_frames: 16,
            payload_bytes: 200,
        },
    ];
    cell.csi_rs = Some(CsiRsConfig {
        period_slots: 20,
        slot_offset: 2,
        symbol: 13,
    });
    cell
}

/// TDD cell, 40 MHz at 30 kHz, 7 DL and 2 UL slots every 10 slots.
pub fn tdd_cell() -> CellConfig {
    let mut cell = fdd_cell();
    cell.scs = SubcarrierSpacing::Khz30;
    cell.bandwidth_mhz = 40;
    cell.tdd = Some(TddPatternConfig {
        period_slots: 10,
        nof_dl_slots: 7,
        nof_ul_slots: 2,
    });
    cell.prach.slot_offset = 9;
    cell
}

/// gNB configuration running `cells` for `total_slots` in free-running mode.
pub fn gnb_config(cells: Vec<CellConfig>, total_slots: u64, seed: u64) -> GnbConfig {
    let mut config = GnbConfig::default();
    config.cells = cells;
    config.simulation.real_time = false;
    config.simulation.total_slots = total_slots;
    config.simulation.seed = seed;
    config
}

/// Scheduler expert configuration builder.
#[derive(Debug, Clone, Default)]
pub struct TestExpertConfig {
    expert: SchedulerExpertConfig,
}

impl TestExpertConfig {
    /// Starts from the default expert parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects the scheduling policy.
    pub fn with_policy(mut self, policy: SchedulingPolicyKind) -> Self {
        self.expert.policy = policy;
        self
    }

    /// Pins the DL MCS.
    pub fn with_fixed_dl_mcs(mut self, mcs: u8) -> Self {
        self.expert.fixed_dl_mcs = Some(mcs);
        self
    }

    /// Sets the HARQ retransmission ceiling.
    pub fn with_max_harq_retxs(mut self, retxs: u8) -> Self {
        self.expert.max_nof_harq_retxs = retxs;
        self
    }

    /// Sets the Msg3 retransmission ceiling.
    pub fn with_max_msg3_retxs(mut self, retxs: u8) -> Self {
        self.expert.max_msg3_retxs = retxs;
        self
    }

    /// Sets the metrics report period.
    pub fn with_metrics_period(mut self, slots: u32) -> Self {
        self.expert.metrics_report_period_slots = slots;
        self
    }

    /// Limits the DL grants per slot.
    pub fn with_max_dl_grants_per_slot(mut self, grants: u16) -> Self {
        self.expert.max_dl_grants_per_slot = grants;
        self
    }

    /// Finished configuration.
    pub fn build(self) -> SchedulerExpertConfig {
        self.expert
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nextgsim_common::CellIndex;
    use nextgsim_sched::CellConfiguration;

    #[test]
    fn test_fixture_cells_are_valid() {
        let expert = SchedulerExpertConfig::default();
        for cell in [fdd_cell(), fdd_cell_with_common_channels(), tdd_cell()] {
            assert!(CellConfiguration::new(CellIndex(0), &cell, &expert).is_ok());
        }
    }

    #[test]
    fn test_expert_config_builder() {
        let expert = TestExpertConfig::new()
            .with_policy(SchedulingPolicyKind::ProportionalFair)
            .with_fixed_dl_mcs(10)
            .with_max_harq_retxs(2)
            .build();
        assert_eq!(expert.policy, SchedulingPolicyKind::ProportionalFair);
        assert_eq!(expert.fixed_dl_mcs, Some(10));
        assert_eq!(expert.max_nof_harq_retxs, 2);
    }

    #[test]
    fn test_gnb_config_builder() {
        let config = gnb_config(vec![fdd_cell()], 100, 7);
        assert_eq!(config.cells.len(), 1);
        assert!(!config.simulation.real_time);
        assert_eq!(config.simulation.total_slots, 100);
        assert_eq!(config.simulation.seed, 7);
    }
}
