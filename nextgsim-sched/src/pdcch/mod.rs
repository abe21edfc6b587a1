//! PDCCH allocation
//!
//! Picks a free candidate of the requested search space in the DL grid of the
//! slot, trying aggregation levels in ascending order from the minimum the
//! caller asks for.

pub mod candidates;

use std::sync::Arc;

use nextgsim_common::Rnti;
use thiserror::Error;
use tracing::trace;

use crate::cell::config::{CellConfiguration, SearchSpaceKind};
use crate::cell::resource_grid::{Channel, Multiplexing, SlotResources};
use crate::result::{AggregationLevel, DciKind, PdcchAllocation};

pub use candidates::{aggregation_level_for_cqi, aggregation_level_for_payload, candidate_cces};

/// Payload of a fallback DCI (format 0_0 / 1_0) in bits, without CRC.
pub const FALLBACK_DCI_PAYLOAD_BITS: u16 = 40;

/// PDCCH allocation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PdcchError {
    /// Every candidate of every allowed aggregation level overlaps a used CCE
    #[error("no free PDCCH candidate for {rnti}")]
    NoCandidateAvailable {
        /// RNTI of the request
        rnti: Rnti,
    },
}

/// One PDCCH request.
#[derive(Debug, Clone)]
pub struct PdcchRequest {
    /// RNTI scrambling the DCI CRC
    pub rnti: Rnti,
    /// DCI content
    pub dci: DciKind,
    /// Search space to use
    pub search_space: SearchSpaceKind,
    /// DCI payload in bits
    pub payload_bits: u16,
    /// Lowest aggregation level to try (from CQI)
    pub min_aggregation_level: AggregationLevel,
}

impl PdcchRequest {
    /// Common search space request for broadcast/RA RNTIs.
    pub fn common(rnti: Rnti, dci: DciKind) -> Self {
        Self {
            rnti,
            dci,
            search_space: SearchSpaceKind::Common,
            payload_bits: FALLBACK_DCI_PAYLOAD_BITS,
            min_aggregation_level: AggregationLevel::L4,
        }
    }

    /// UE-specific search space request.
    pub fn ue_specific(rnti: Rnti, dci: DciKind, cqi: u8) -> Self {
        Self {
            rnti,
            dci,
            search_space: SearchSpaceKind::UeSpecific,
            payload_bits: FALLBACK_DCI_PAYLOAD_BITS,
            min_aggregation_level: aggregation_level_for_cqi(cqi),
        }
    }
}

/// PDCCH allocator of one cell.
#[derive(Debug, Clone)]
pub struct PdcchAllocator {
    cfg: Arc<CellConfiguration>,
}

impl PdcchAllocator {
    /// Creates the allocator.
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        Self { cfg }
    }

    /// Allocates a PDCCH in `res` and appends it to the DL result.
    pub fn allocate(
        &self,
        res: &mut SlotResources,
        request: &PdcchRequest,
    ) -> Result<PdcchAllocation, PdcchError> {
        let ss = match request.search_space {
            SearchSpaceKind::Common => &self.cfg.common_ss,
            SearchSpaceKind::UeSpecific => &self.cfg.ue_ss,
        };
        let min_al = request
            .min_aggregation_level
            .max(aggregation_level_for_payload(request.payload_bits));
        let slot_index = res.slot.slot_index();

        for al in AggregationLevel::ALL.into_iter().filter(|al| *al >= min_al) {
            for cce in candidate_cces(ss, al, request.rnti, slot_index) {
                let region = ss.coreset.cce_region(cce, al.nof_cces());
                if !res.dl.is_free(&region) {
                    continue;
                }
                let Ok(grid_handle) = res.dl.reserve(region, Channel::Pdcch, Multiplexing::Exclusive) else {
                    continue;
                };
                let pdcch = PdcchAllocation {
                    rnti: request.rnti,
                    dci: request.dci,
                    search_space: request.search_space,
                    coreset_id: ss.coreset.id,
                    aggregation_level: al,
                    cce_index: cce,
                    region,
                    grid_handle,
                };
                trace!(rnti = %request.rnti, ?al, cce, "PDCCH allocated");
                res.result.dl.pdcchs.push(pdcch.clone());
                return Ok(pdcch);
            }
        }

        Err(PdcchError::NoCandidateAvailable { rnti: request.rnti })
    }

    /// Removes a PDCCH allocated in the same slot.
    pub fn release(&self, res: &mut SlotResources, pdcch: &PdcchAllocation) {
        res.dl.release(pdcch.grid_handle);
        res.result
            .dl
            .pdcchs
            .retain(|p| p.grid_handle != pdcch.grid_handle);
    }
}
