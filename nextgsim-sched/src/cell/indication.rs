//! Asynchronous inputs of a cell scheduler
//!
//! PHY indications and upper-layer requests are queued on a bounded channel
//! and applied in arrival order at the start of the next slot. Senders never
//! block: a full queue is reported as `IndicationError::QueueFull`.

use nextgsim_common::config::SchedulerExpertConfig;
use nextgsim_common::{HarqId, Lcg, Lcid, Rnti, SlotPoint};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::common::PagingInformation;
use crate::ue::{RachIndication, UeCreationRequest, UeReconfigRequest};

/// CRC of one PUSCH transport block (Msg3 or UE data).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrcIndication {
    /// RNTI of the PUSCH (TC-RNTI for Msg3)
    pub rnti: Rnti,
    /// HARQ process of the grant
    pub harq_id: HarqId,
    /// Slot of the PUSCH
    pub slot: SlotPoint,
    /// Transport block decoded
    pub ok: bool,
    /// Measured UL SNR
    pub ul_snr_db: Option<f32>,
}

/// UCI decoded on PUCCH or PUSCH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UciIndication {
    /// UE
    pub rnti: Rnti,
    /// Slot the UCI was sent in
    pub slot: SlotPoint,
    /// HARQ-ACK bits, in HARQ id order of the processes expecting feedback
    pub harq_acks: Vec<bool>,
    /// Scheduling request
    pub sr: bool,
    /// Wideband CQI
    pub cqi: Option<u8>,
}

/// RLC buffer occupancy of one DL logical channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DlBufferState {
    /// UE
    pub rnti: Rnti,
    /// Logical channel
    pub lcid: Lcid,
    /// Bytes waiting for transmission
    pub pending_bytes: u32,
}

/// Buffer status report of one UE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UlBsrIndication {
    /// UE
    pub rnti: Rnti,
    /// Reported (LCG, bytes) pairs
    pub reports: Vec<(Lcg, u32)>,
}

/// Input of a cell scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum CellIndication {
    /// Preambles detected in a PRACH occasion
    Rach(RachIndication),
    /// PUSCH CRC
    Crc(CrcIndication),
    /// UCI
    Uci(UciIndication),
    /// Page a UE
    Paging(PagingInformation),
    /// DL buffer occupancy
    DlBufferState(DlBufferState),
    /// UL buffer status report
    UlBsr(UlBsrIndication),
    /// Create a UE
    AddUe(UeCreationRequest),
    /// Reconfigure a UE
    ReconfigureUe {
        /// UE
        rnti: Rnti,
        /// Changes
        request: UeReconfigRequest,
    },
    /// Remove a UE
    RemoveUe(Rnti),
    /// Replace the scheduler expert parameters
    UpdateExpertConfig(SchedulerExpertConfig),
}

impl CellIndication {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            CellIndication::Rach(_) => "rach",
            CellIndication::Crc(_) => "crc",
            CellIndication::Uci(_) => "uci",
            CellIndication::Paging(_) => "paging",
            CellIndication::DlBufferState(_) => "dl-buffer-state",
            CellIndication::UlBsr(_) => "ul-bsr",
            CellIndication::AddUe(_) => "add-ue",
            CellIndication::ReconfigureUe { .. } => "reconfigure-ue",
            CellIndication::RemoveUe(_) => "remove-ue",
            CellIndication::UpdateExpertConfig(_) => "update-expert-config",
        }
    }
}

/// Error returned when an indication cannot be queued.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndicationError {
    /// The queue holds `capacity` indications not yet applied
    #[error("indication queue full (capacity {capacity})")]
    QueueFull {
        /// Queue capacity
        capacity: usize,
    },
    /// The cell scheduler has stopped
    #[error("cell scheduler stopped")]
    CellStopped,
}

/// Cloneable handle feeding a cell scheduler from any context.
#[derive(Debug, Clone)]
pub struct CellIndicationSender {
    tx: mpsc::Sender<CellIndication>,
    capacity: usize,
}

impl CellIndicationSender {
    pub(crate) fn new(tx: mpsc::Sender<CellIndication>, capacity: usize) -> Self {
        Self { tx, capacity }
    }

    /// Queues `indication` without waiting.
    pub fn send(&self, indication: CellIndication) -> Result<(), IndicationError> {
        self.tx.try_send(indication).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => IndicationError::QueueFull {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => IndicationError::CellStopped,
        })
    }

    /// Queues a RACH indication.
    pub fn rach(&self, indication: RachIndication) -> Result<(), IndicationError> {
        self.send(CellIndication::Rach(indication))
    }

    /// Queues a CRC indication.
    pub fn crc(&self, indication: CrcIndication) -> Result<(), IndicationError> {
        self.send(CellIndication::Crc(indication))
    }

    /// Queues a UCI indication.
    pub fn uci(&self, indication: UciIndication) -> Result<(), IndicationError> {
        self.send(CellIndication::Uci(indication))
    }

    /// Queues a paging request.
    pub fn paging(&self, info: PagingInformation) -> Result<(), IndicationError> {
        self.send(CellIndication::Paging(info))
    }

    /// Queues a DL buffer state update.
    pub fn dl_buffer_state(&self, state: DlBufferState) -> Result<(), IndicationError> {
        self.send(CellIndication::DlBufferState(state))
    }

    /// Queues a BSR.
    pub fn ul_bsr(&self, indication: UlBsrIndication) -> Result<(), IndicationError> {
        self.send(CellIndication::UlBsr(indication))
    }

    /// True once the cell scheduler stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Creates the indication queue of a cell.
pub(crate) fn indication_channel(capacity: usize) -> (CellIndicationSender, mpsc::Receiver<CellIndication>) {
    let (tx, rx) = mpsc::channel(capacity);
    (CellIndicationSender::new(tx, capacity), rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nextgsim_common::SubcarrierSpacing;

    fn crc() -> CrcIndication {
        CrcIndication {
            rnti: Rnti::new(0x4601),
            harq_id: HarqId(0),
            slot: SlotPoint::new(SubcarrierSpacing::Khz15, 4),
            ok: true,
            ul_snr_db: None,
        }
    }

    #[test]
    fn test_full_queue_is_reported() {
        let (sender, _rx) = indication_channel(2);
        sender.crc(crc()).unwrap();
        sender.crc(crc()).unwrap();
        assert_eq!(sender.crc(crc()), Err(IndicationError::QueueFull { capacity: 2 }));
    }

    #[test]
    fn test_closed_queue_is_reported() {
        let (sender, mut rx) = indication_channel(2);
        rx.close();
        assert!(sender.is_closed());
        assert_eq!(sender.crc(crc()), Err(IndicationError::CellStopped));
    }

    #[test]
    fn test_arrival_order_is_kept() {
        let (sender, mut rx) = indication_channel(8);
        sender.send(CellIndication::RemoveUe(Rnti::new(0x4602))).unwrap();
        sender.crc(crc()).unwrap();
        assert_eq!(rx.try_recv().map(|i| i.name()), Ok("remove-ue"));
        assert_eq!(rx.try_recv().map(|i| i.name()), Ok("crc"));
        assert!(rx.try_recv().is_err());
    }
}
