//! SI message (SIB2 and later) broadcast
//!
//! SI message `n` owns the window of `si_window_slots` slots starting at
//! `n * w` in each of its periods. It is sent once per window, in the first DL
//! slot where the PDCCH and the PDSCH fit. A window that closes without a
//! transmission is counted as missed.

use std::sync::Arc;

use nextgsim_common::{Rnti, SlotPoint};
use tracing::{debug, warn};

use crate::cell::config::CellConfiguration;
use crate::cell::resource_grid::SlotResources;
use crate::common::{allocate_broadcast_pdsch, BroadcastAllocError, CommonSlotOutcome};
use crate::pdcch::PdcchAllocator;
use crate::result::{BroadcastPdsch, DciKind, SiKind};

#[derive(Debug, Clone, Default)]
struct SiWindowState {
    /// First slot after the current window
    window_end: Option<SlotPoint>,
    sent: bool,
}

/// SI message scheduler of one cell.
#[derive(Debug, Clone)]
pub struct SiMessageScheduler {
    cfg: Arc<CellConfiguration>,
    windows: Vec<SiWindowState>,
}

impl SiMessageScheduler {
    /// Creates the scheduler.
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        Self {
            windows: vec![SiWindowState::default(); cfg.si_messages.len()],
            cfg,
        }
    }

    /// Position of `slot` inside the window of SI message `n`, if it is inside.
    fn window_position(&self, n: usize, slot: SlotPoint) -> Option<u32> {
        let msg = &self.cfg.si_messages[n];
        let period = msg.period_radio_frames * self.cfg.scs.nof_slots_per_frame();
        let w = self.cfg.si_window_slots;
        let start = n as u32 * w;
        let pos = slot.count() % period;
        (start..start + w).contains(&pos).then(|| pos - start)
    }

    /// Closes windows that ended before `slot`.
    pub fn close_expired_windows(&mut self, slot: SlotPoint, outcome: &mut CommonSlotOutcome) {
        for (n, state) in self.windows.iter_mut().enumerate() {
            let Some(end) = state.window_end else {
                continue;
            };
            if slot - end < 0 {
                continue;
            }
            if !state.sent {
                warn!(si_message = n, %end, "SI window closed without transmission");
                outcome.nof_si_missed += 1;
            }
            *state = SiWindowState::default();
        }
        for n in 0..self.windows.len() {
            if self.windows[n].window_end.is_some() {
                continue;
            }
            if let Some(pos) = self.window_position(n, slot) {
                self.windows[n].window_end = Some(slot + (self.cfg.si_window_slots - pos));
            }
        }
    }

    /// Sends every SI message whose window is open and not yet served.
    pub fn schedule(&mut self, res: &mut SlotResources, pdcch: &PdcchAllocator, outcome: &mut CommonSlotOutcome) {
        self.close_expired_windows(res.slot, outcome);

        for n in 0..self.windows.len() {
            if self.windows[n].window_end.is_none() || self.windows[n].sent {
                continue;
            }
            let payload_bytes = self.cfg.si_messages[n].payload_bytes;
            match allocate_broadcast_pdsch(
                &self.cfg,
                pdcch,
                res,
                Rnti::SI_RNTI,
                DciKind::SystemInformation,
                payload_bytes,
                self.cfg.sib1.mcs,
            ) {
                Ok(pdsch) => {
                    debug!(slot = %res.slot, si_message = n, "SI message scheduled");
                    res.result.dl.broadcast.push(BroadcastPdsch {
                        kind: SiKind::SiMessage(n as u8),
                        pdsch,
                    });
                    self.windows[n].sent = true;
                    outcome.nof_si_messages += 1;
                }
                Err(err) => {
                    if matches!(err, BroadcastAllocError::Pdcch(_)) {
                        outcome.nof_pdcch_failures += 1;
                    }
                    debug!(slot = %res.slot, si_message = n, "SI message deferred: {err}");
                }
            }
        }
    }
}
