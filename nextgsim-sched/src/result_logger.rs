//! One-line summaries of slot results
//!
//! Formatting only happens when the debug level is enabled for this target,
//! so the slot loop pays nothing otherwise.

use std::fmt::Write;

use nextgsim_common::CellIndex;
use tracing::{debug, enabled, Level};

use crate::result::{SchedResult, SiKind};

/// Logs a summary of every non-empty slot result of a cell.
#[derive(Debug, Clone)]
pub struct SchedResultLogger {
    cell: CellIndex,
}

impl SchedResultLogger {
    /// Creates a logger for `cell`.
    pub fn new(cell: CellIndex) -> Self {
        Self { cell }
    }

    /// Logs `result` at debug level.
    pub fn log(&self, result: &SchedResult) {
        if !enabled!(Level::DEBUG) || result.is_empty() {
            return;
        }
        debug!(cell = %self.cell, slot = %result.slot, "{}", summarize(result));
    }
}

/// Compact text form of a slot result.
pub fn summarize(result: &SchedResult) -> String {
    let mut out = String::new();
    let dl = &result.dl;
    let ul = &result.ul;

    if !dl.ssbs.is_empty() {
        let _ = write!(out, " ssb={}", dl.ssbs.len());
    }
    if !dl.csi_rs.is_empty() {
        out.push_str(" csi-rs");
    }
    for bc in &dl.broadcast {
        match bc.kind {
            SiKind::Sib1 => out.push_str(" sib1"),
            SiKind::SiMessage(idx) => {
                let _ = write!(out, " si{idx}");
            }
        }
    }
    for paging in &dl.paging {
        let _ = write!(out, " paging(ues={})", paging.paging_identities.len());
    }
    for rar in &dl.rars {
        let _ = write!(out, " rar({} msg3={})", rar.pdsch.rnti, rar.grants.len());
    }
    for grant in &dl.ue_grants {
        let _ = write!(
            out,
            " pdsch({} h={} {} prbs={} mcs={} tbs={} k1={})",
            grant.pdsch.rnti,
            grant.harq_id,
            if grant.is_retx { "retx" } else { "new" },
            grant.pdsch.prbs,
            grant.pdsch.mcs,
            grant.pdsch.tbs_bytes,
            grant.k1,
        );
    }
    for pusch in &ul.puschs {
        let kind = if pusch.is_msg3 {
            "msg3"
        } else if pusch.is_retx {
            "retx"
        } else {
            "new"
        };
        let _ = write!(
            out,
            " pusch({} h={} {kind} prbs={} mcs={} tbs={})",
            pusch.rnti, pusch.harq_id, pusch.prbs, pusch.mcs, pusch.tbs_bytes,
        );
    }
    if !ul.pucchs.is_empty() {
        let _ = write!(out, " pucch={}", ul.pucchs.len());
    }
    if !ul.prachs.is_empty() {
        out.push_str(" prach");
    }
    let _ = write!(out, " pdcch={}", dl.pdcchs.len());
    out.trim_start().to_string()
}
