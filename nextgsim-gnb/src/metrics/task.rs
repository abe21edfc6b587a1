//! Metrics Task Implementation

use std::collections::BTreeMap;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::info;

use nextgsim_common::CellIndex;
use nextgsim_sched::SchedulerCellMetrics;

use crate::tasks::{MetricsMessage, Task, TaskMessage};

/// Running totals of one cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CellTotals {
    /// Reports received
    pub nof_reports: u64,
    /// Slots covered by the reports
    pub nof_slots: u64,
    /// Late slots
    pub nof_late_slots: u64,
    /// UEs in the latest report
    pub nof_ues: u32,
    /// New DL transmissions
    pub nof_dl_new_txs: u64,
    /// DL retransmissions
    pub nof_dl_retxs: u64,
    /// New UL transmissions
    pub nof_ul_new_txs: u64,
    /// UL retransmissions
    pub nof_ul_retxs: u64,
    /// DL bytes
    pub dl_bytes: u64,
    /// UL bytes
    pub ul_bytes: u64,
    /// HARQ-ACKs
    pub nof_harq_acks: u64,
    /// HARQ-NACKs
    pub nof_harq_nacks: u64,
    /// HARQ failures
    pub nof_harq_failures: u64,
    /// RARs
    pub nof_rars: u64,
    /// Msg3 grants
    pub nof_msg3_grants: u64,
    /// PDCCH allocation failures
    pub nof_pdcch_failures: u64,
}

impl CellTotals {
    fn add(&mut self, m: &SchedulerCellMetrics) {
        self.nof_reports += 1;
        self.nof_slots += m.nof_slots as u64;
        self.nof_late_slots += m.nof_late_slots as u64;
        self.nof_ues = m.nof_ues;
        self.nof_dl_new_txs += m.nof_dl_new_txs as u64;
        self.nof_dl_retxs += m.nof_dl_retxs as u64;
        self.nof_ul_new_txs += m.nof_ul_new_txs as u64;
        self.nof_ul_retxs += m.nof_ul_retxs as u64;
        self.dl_bytes += m.dl_bytes;
        self.ul_bytes += m.ul_bytes;
        self.nof_harq_acks += m.nof_harq_acks as u64;
        self.nof_harq_nacks += m.nof_harq_nacks as u64;
        self.nof_harq_failures += m.nof_harq_failures as u64;
        self.nof_rars += m.nof_rars as u64;
        self.nof_msg3_grants += m.nof_msg3_grants as u64;
        self.nof_pdcch_failures += m.nof_pdcch_failures as u64;
    }
}

/// Totals of every cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSummary {
    /// Per-cell totals
    pub cells: BTreeMap<CellIndex, CellTotals>,
}

impl MetricsSummary {
    /// Totals of `cell`, if it reported.
    pub fn cell(&self, cell: CellIndex) -> Option<&CellTotals> {
        self.cells.get(&cell)
    }
}

/// Metrics Task
pub struct MetricsTask {
    summary: MetricsSummary,
    summary_tx: watch::Sender<MetricsSummary>,
}

impl MetricsTask {
    /// Creates the task and the receiver observing its totals.
    pub fn new() -> (Self, watch::Receiver<MetricsSummary>) {
        let (summary_tx, summary_rx) = watch::channel(MetricsSummary::default());
        let task = Self {
            summary: MetricsSummary::default(),
            summary_tx,
        };
        (task, summary_rx)
    }

    fn handle_report(&mut self, m: SchedulerCellMetrics) {
        info!(
            cell = %m.cell,
            slot = m.last_slot.as_deref().unwrap_or("-"),
            ues = m.nof_ues,
            dl_tx = m.nof_dl_new_txs,
            dl_retx = m.nof_dl_retxs,
            ul_tx = m.nof_ul_new_txs,
            ul_retx = m.nof_ul_retxs,
            dl_bytes = m.dl_bytes,
            ul_bytes = m.ul_bytes,
            dl_util = %format!("{:.1}%", m.dl_prb_utilization() * 100.0),
            bler = %format!("{:.3}", m.harq_bler()),
            rars = m.nof_rars,
            late = m.nof_late_slots,
            "Scheduler metrics"
        );
        self.summary.cells.entry(m.cell).or_default().add(&m);
        self.summary_tx.send_replace(self.summary.clone());
    }
}

#[async_trait::async_trait]
impl Task for MetricsTask {
    type Message = MetricsMessage;

    async fn run(&mut self, mut rx: mpsc::Receiver<TaskMessage<Self::Message>>) {
        info!("Metrics task started");

        loop {
            match rx.recv().await {
                Some(TaskMessage::Message(MetricsMessage::Report(metrics))) => self.handle_report(metrics),
                Some(TaskMessage::Shutdown) => {
                    info!("Metrics task received shutdown signal");
                    break;
                }
                None => {
                    info!("Metrics task channel closed");
                    break;
                }
            }
        }

        for (cell, totals) in &self.summary.cells {
            info!(
                %cell,
                reports = totals.nof_reports,
                slots = totals.nof_slots,
                dl_bytes = totals.dl_bytes,
                ul_bytes = totals.ul_bytes,
                harq_failures = totals.nof_harq_failures,
                "Cell totals"
            );
        }
        info!("Metrics task stopped");
    }
}
