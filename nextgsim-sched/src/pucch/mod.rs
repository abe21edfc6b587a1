//! PUCCH resource allocation
//!
//! The cell PUCCH resources live inside the guardbands at the UL band edges:
//! format 1 resources are code-multiplexed on the lower-edge PRBs, format 2
//! resources occupy one PRB and two symbols of the upper-edge PRBs. A UE owns
//! at most one PUCCH per slot; UCI bits added later are merged into it and the
//! resource is promoted from format 1 to format 2 when the payload outgrows it.

use std::sync::Arc;

use nextgsim_common::{Rnti, UeIndex, NOF_OFDM_SYMBOLS_PER_SLOT};
use thiserror::Error;
use tracing::trace;

use crate::cell::config::CellConfiguration;
use crate::cell::resource_grid::{
    AllocationHandle, Channel, GridRegion, Multiplexing, PrbInterval, SlotResources, SymbolInterval,
};
use crate::result::{PucchFormat, PucchInfo};

/// HARQ-ACK bits a format 1 resource can carry.
pub const F1_MAX_HARQ_BITS: u16 = 2;

/// PUCCH allocation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PucchError {
    /// All resources of the format are taken
    #[error("no free PUCCH {format:?} resource for {rnti}")]
    NoResourceAvailable {
        /// RNTI of the request
        rnti: Rnti,
        /// Format that was needed
        format: PucchFormat,
    },
    /// The UCI does not fit in a format 2 resource
    #[error("UCI of {bits} bits for {rnti} exceeds the PUCCH capacity")]
    PayloadExceeded {
        /// RNTI of the request
        rnti: Rnti,
        /// Requested payload
        bits: u16,
    },
}

/// One cell PUCCH resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PucchResource {
    /// Resource id within its format
    pub id: u16,
    /// Format
    pub format: PucchFormat,
    /// Grid region
    pub region: GridRegion,
}

#[derive(Debug, Clone, Copy, Default)]
struct UciDelta {
    harq_bits: u16,
    sr: bool,
    csi_bits: u16,
}

/// PUCCH allocator of one cell.
#[derive(Debug, Clone)]
pub struct PucchAllocator {
    cfg: Arc<CellConfiguration>,
    f1_resources: Vec<PucchResource>,
    f2_resources: Vec<PucchResource>,
}

impl PucchAllocator {
    /// Builds the cell resource lists from the guardband layout.
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        let guardband = cfg.pucch.guardband_prbs;
        let per_prb = cfg.pucch.f1_resources_per_prb;

        let f1_resources = (0..guardband)
            .flat_map(|prb| {
                (0..per_prb).map(move |k| PucchResource {
                    id: prb * per_prb + k,
                    format: PucchFormat::F1,
                    region: GridRegion::new(SymbolInterval::full_slot(), PrbInterval::new(prb, prb + 1)),
                })
            })
            .collect();

        let upper_start = cfg.nof_prbs - guardband;
        let nof_pairs = NOF_OFDM_SYMBOLS_PER_SLOT / 2;
        let f2_resources = (0..nof_pairs)
            .flat_map(|pair| {
                let stop = NOF_OFDM_SYMBOLS_PER_SLOT - 2 * pair;
                (upper_start..cfg.nof_prbs).map(move |prb| (stop, prb))
            })
            .enumerate()
            .map(|(id, (stop, prb))| PucchResource {
                id: id as u16,
                format: PucchFormat::F2,
                region: GridRegion::new(SymbolInterval::new(stop - 2, stop), PrbInterval::new(prb, prb + 1)),
            })
            .collect();

        Self {
            cfg,
            f1_resources,
            f2_resources,
        }
    }

    /// Cell format 1 resources.
    pub fn f1_resources(&self) -> &[PucchResource] {
        &self.f1_resources
    }

    /// Cell format 2 resources.
    pub fn f2_resources(&self) -> &[PucchResource] {
        &self.f2_resources
    }

    /// Adds one HARQ-ACK bit to the UE PUCCH in `res`.
    pub fn allocate_harq_ack(&self, res: &mut SlotResources, ue_index: UeIndex, rnti: Rnti) -> Result<(), PucchError> {
        self.update(res, ue_index, rnti, UciDelta { harq_bits: 1, ..Default::default() })
    }

    /// Adds an SR opportunity to the UE PUCCH in `res`.
    pub fn allocate_sr(&self, res: &mut SlotResources, ue_index: UeIndex, rnti: Rnti) -> Result<(), PucchError> {
        self.update(res, ue_index, rnti, UciDelta { sr: true, ..Default::default() })
    }

    /// Adds a CSI report to the UE PUCCH in `res`.
    pub fn allocate_csi(
        &self,
        res: &mut SlotResources,
        ue_index: UeIndex,
        rnti: Rnti,
        csi_bits: u16,
    ) -> Result<(), PucchError> {
        self.update(res, ue_index, rnti, UciDelta { csi_bits, ..Default::default() })
    }

    /// Removes one HARQ-ACK bit, releasing the PUCCH when it carries nothing else.
    pub fn remove_harq_ack(&self, res: &mut SlotResources, rnti: Rnti) {
        let Some(pos) = res.result.ul.pucchs.iter().position(|p| p.rnti == rnti) else {
            return;
        };
        let pucch = &mut res.result.ul.pucchs[pos];
        pucch.harq_bits = pucch.harq_bits.saturating_sub(1);
        if pucch.payload_bits() == 0 {
            self.release(res, rnti);
        }
    }

    /// Removes the UE PUCCH from `res` and returns it.
    pub fn release(&self, res: &mut SlotResources, rnti: Rnti) -> Option<PucchInfo> {
        let pos = res.result.ul.pucchs.iter().position(|p| p.rnti == rnti)?;
        let pucch = res.result.ul.pucchs.remove(pos);
        res.ul.release(pucch.grid_handle);
        Some(pucch)
    }

    fn update(&self, res: &mut SlotResources, ue_index: UeIndex, rnti: Rnti, delta: UciDelta) -> Result<(), PucchError> {
        let existing = res.result.ul.pucchs.iter().position(|p| p.rnti == rnti);
        let (harq_bits, sr, csi_bits) = match existing {
            Some(pos) => {
                let p = &res.result.ul.pucchs[pos];
                (p.harq_bits + delta.harq_bits, p.sr || delta.sr, p.csi_bits + delta.csi_bits)
            }
            None => (delta.harq_bits, delta.sr, delta.csi_bits),
        };

        let format = if csi_bits > 0 || harq_bits > F1_MAX_HARQ_BITS {
            PucchFormat::F2
        } else {
            PucchFormat::F1
        };
        let total_bits = harq_bits + sr as u16 + csi_bits;
        if format == PucchFormat::F2 && total_bits > self.cfg.pucch.f2_max_payload_bits {
            return Err(PucchError::PayloadExceeded { rnti, bits: total_bits });
        }

        match existing {
            Some(pos) if res.result.ul.pucchs[pos].format == format => {
                let p = &mut res.result.ul.pucchs[pos];
                p.harq_bits = harq_bits;
                p.sr = sr;
                p.csi_bits = csi_bits;
            }
            Some(pos) => {
                // Promote F1 to F2: take the new resource before giving up the old one.
                let (resource, grid_handle) = self.reserve_free(res, format, rnti)?;
                let p = &mut res.result.ul.pucchs[pos];
                let old_handle = p.grid_handle;
                p.format = format;
                p.resource_id = resource.id;
                p.region = resource.region;
                p.grid_handle = grid_handle;
                p.harq_bits = harq_bits;
                p.sr = sr;
                p.csi_bits = csi_bits;
                res.ul.release(old_handle);
                trace!(%rnti, resource = resource.id, "PUCCH promoted to format 2");
            }
            None => {
                let (resource, grid_handle) = self.reserve_free(res, format, rnti)?;
                res.result.ul.pucchs.push(PucchInfo {
                    ue_index,
                    rnti,
                    format,
                    resource_id: resource.id,
                    region: resource.region,
                    harq_bits,
                    sr,
                    csi_bits,
                    grid_handle,
                });
            }
        }
        Ok(())
    }

    fn reserve_free(
        &self,
        res: &mut SlotResources,
        format: PucchFormat,
        rnti: Rnti,
    ) -> Result<(PucchResource, AllocationHandle), PucchError> {
        let (resources, channel) = match format {
            PucchFormat::F1 => (&self.f1_resources, Channel::PucchF1),
            PucchFormat::F2 => (&self.f2_resources, Channel::PucchF2),
        };
        for resource in resources {
            let taken = res
                .result
                .ul
                .pucchs
                .iter()
                .any(|p| p.format == format && p.resource_id == resource.id);
            if taken {
                continue;
            }
            if let Ok(handle) = res.ul.reserve(resource.region, channel, Multiplexing::Declared) {
                return Ok((resource.clone(), handle));
            }
        }
        Err(PucchError::NoResourceAvailable { rnti, format })
    }
}
