//! Periodic scheduler metrics
//!
//! The cell scheduler accumulates counters slot by slot and hands a
//! `SchedulerCellMetrics` snapshot to its `SchedulerMetricsNotifier` every
//! `metrics_report_period_slots` slots.

use nextgsim_common::{CellIndex, SlotPoint};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::common::CommonSlotOutcome;
use crate::result::SchedResult;
use crate::ue::ra::RaSlotOutcome;
use crate::ue::UeSlotOutcome;

/// Counters of one cell over one report period.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerCellMetrics {
    /// Cell
    pub cell: CellIndex,
    /// Slot closing the period
    pub last_slot: Option<String>,
    /// Slots processed in the period
    pub nof_slots: u32,
    /// Slots skipped because they arrived out of order
    pub nof_late_slots: u32,
    /// UEs at the end of the period
    pub nof_ues: u32,
    /// New DL transmissions
    pub nof_dl_new_txs: u32,
    /// DL retransmissions
    pub nof_dl_retxs: u32,
    /// New UL transmissions
    pub nof_ul_new_txs: u32,
    /// UL retransmissions
    pub nof_ul_retxs: u32,
    /// Bytes of new DL transport blocks
    pub dl_bytes: u64,
    /// Bytes of new UL transport blocks
    pub ul_bytes: u64,
    /// PRBs used by UE PDSCHs, summed over slots
    pub dl_prbs_used: u64,
    /// PRBs used by PUSCHs, summed over slots
    pub ul_prbs_used: u64,
    /// PRBs available for PDSCH, summed over DL slots
    pub dl_prbs_available: u64,
    /// HARQ-ACKs received
    pub nof_harq_acks: u32,
    /// HARQ-NACKs received or inferred from timeouts
    pub nof_harq_nacks: u32,
    /// HARQ processes that reached the retransmission ceiling
    pub nof_harq_failures: u32,
    /// Allocations that found no PDCCH candidate
    pub nof_pdcch_failures: u32,
    /// HARQ-ACK or periodic UCI allocations that found no PUCCH resource
    pub nof_pucch_failures: u32,
    /// RARs sent
    pub nof_rars: u32,
    /// Msg3 grants sent
    pub nof_msg3_grants: u32,
    /// Preambles dropped at RA window expiry
    pub nof_rach_drops: u32,
    /// RA procedures abandoned after Msg3 failures
    pub nof_msg3_failures: u32,
    /// Paging records dropped
    pub nof_paging_drops: u32,
    /// SI windows missed
    pub nof_si_missed: u32,
}

impl SchedulerCellMetrics {
    /// Fraction of the available DL PRBs used by UE PDSCHs.
    pub fn dl_prb_utilization(&self) -> f64 {
        if self.dl_prbs_available == 0 {
            return 0.0;
        }
        self.dl_prbs_used as f64 / self.dl_prbs_available as f64
    }

    /// DL HARQ block error rate over the period.
    pub fn harq_bler(&self) -> f64 {
        let total = self.nof_harq_acks + self.nof_harq_nacks;
        if total == 0 {
            return 0.0;
        }
        self.nof_harq_nacks as f64 / total as f64
    }
}

/// Sink for metrics snapshots. Implementations must not block.
pub trait SchedulerMetricsNotifier: Send {
    /// Called from the slot loop at the end of each report period.
    fn report(&mut self, metrics: SchedulerCellMetrics);
}

/// Discards every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetricsNotifier;

impl SchedulerMetricsNotifier for NullMetricsNotifier {
    fn report(&mut self, _metrics: SchedulerCellMetrics) {}
}

/// Forwards reports into a bounded tokio channel, dropping them when full.
#[derive(Debug, Clone)]
pub struct ChannelMetricsNotifier {
    tx: mpsc::Sender<SchedulerCellMetrics>,
}

impl ChannelMetricsNotifier {
    /// Wraps `tx`.
    pub fn new(tx: mpsc::Sender<SchedulerCellMetrics>) -> Self {
        Self { tx }
    }
}

impl SchedulerMetricsNotifier for ChannelMetricsNotifier {
    fn report(&mut self, metrics: SchedulerCellMetrics) {
        if let Err(err) = self.tx.try_send(metrics) {
            debug!("metrics report dropped: {err}");
        }
    }
}

/// Accumulates the counters of the current period.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    current: SchedulerCellMetrics,
    period_slots: u32,
}

impl MetricsCollector {
    /// Creates a collector reporting every `period_slots` slots (0 disables reports).
    pub fn new(cell: CellIndex, period_slots: u32) -> Self {
        Self {
            current: SchedulerCellMetrics {
                cell,
                ..Default::default()
            },
            period_slots,
        }
    }

    /// Changes the report period. The running period keeps its counters.
    pub fn set_period(&mut self, period_slots: u32) {
        self.period_slots = period_slots;
    }

    /// Counters of the running period.
    pub fn current(&self) -> &SchedulerCellMetrics {
        &self.current
    }

    pub(crate) fn record_late_slot(&mut self) {
        self.current.nof_late_slots += 1;
    }

    pub(crate) fn record_common(&mut self, outcome: &CommonSlotOutcome) {
        self.current.nof_pdcch_failures += outcome.nof_pdcch_failures;
        self.current.nof_paging_drops += outcome.nof_paging_drops;
        self.current.nof_si_missed += outcome.nof_si_missed;
    }

    pub(crate) fn record_ra(&mut self, outcome: &RaSlotOutcome) {
        self.current.nof_rars += outcome.nof_rars;
        self.current.nof_msg3_grants += outcome.nof_msg3_grants;
        self.current.nof_rach_drops += outcome.nof_rach_drops;
        self.current.nof_msg3_failures += outcome.nof_msg3_failures;
        self.current.nof_pdcch_failures += outcome.nof_pdcch_failures;
    }

    pub(crate) fn record_ue(&mut self, outcome: &UeSlotOutcome) {
        let m = &mut self.current;
        m.nof_dl_new_txs += outcome.nof_dl_new_txs;
        m.nof_dl_retxs += outcome.nof_dl_retxs;
        m.nof_ul_new_txs += outcome.nof_ul_new_txs;
        m.nof_ul_retxs += outcome.nof_ul_retxs;
        m.dl_bytes += outcome.dl_bytes;
        m.ul_bytes += outcome.ul_bytes;
        m.nof_pdcch_failures += outcome.nof_pdcch_failures;
        m.nof_pucch_failures += outcome.nof_pucch_failures;
    }

    pub(crate) fn record_pucch_failures(&mut self, nof_failures: u32) {
        self.current.nof_pucch_failures += nof_failures;
    }

    pub(crate) fn record_feedback(&mut self, acks: u32, nacks: u32, failures: u32) {
        self.current.nof_harq_acks += acks;
        self.current.nof_harq_nacks += nacks;
        self.current.nof_harq_failures += failures;
    }

    /// Closes the slot. Returns the period snapshot when the period is over.
    pub(crate) fn end_slot(
        &mut self,
        result: &SchedResult,
        dl_prbs_available: u16,
        nof_ues: usize,
    ) -> Option<SchedulerCellMetrics> {
        let m = &mut self.current;
        m.nof_slots += 1;
        m.nof_ues = nof_ues as u32;
        m.dl_prbs_used += result.nof_dl_ue_prbs() as u64;
        m.ul_prbs_used += result.nof_ul_prbs() as u64;
        m.dl_prbs_available += dl_prbs_available as u64;

        if self.period_slots == 0 || m.nof_slots < self.period_slots {
            return None;
        }
        m.last_slot = Some(slot_label(result.slot));
        let cell = m.cell;
        Some(std::mem::replace(
            &mut self.current,
            SchedulerCellMetrics {
                cell,
                ..Default::default()
            },
        ))
    }
}

fn slot_label(slot: SlotPoint) -> String {
    slot.to_string()
}
