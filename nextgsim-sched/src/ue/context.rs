//! Scheduling context of one UE

use nextgsim_common::config::SchedulerExpertConfig;
use nextgsim_common::{
    CellIndex, Lcg, Lcid, LinkDirection, Rnti, SlotPoint, UeIndex, MAX_NOF_LCGS, MAX_NOF_LCIDS,
};

use crate::cell::config::CellConfiguration;
use crate::result::LcAllocation;
use crate::uci::PeriodicUciConfig;
use crate::ue::harq::HarqEntity;
use crate::ue::mcs::{cqi_to_mcs, ul_snr_to_mcs, Olla};
use crate::ue::UeError;

/// Size of the UE contention resolution identity MAC CE, subheader included.
pub const CONRES_CE_BYTES: u32 = 7;

/// MAC subheader size for an SDU of `bytes` bytes (8-bit or 16-bit L field).
pub fn mac_subheader_bytes(bytes: u32) -> u32 {
    if bytes > 255 {
        3
    } else {
        2
    }
}

/// Priority assumed for an LCG no configured logical channel maps to.
pub const LOWEST_LC_PRIORITY: u8 = 16;

/// Ranking weight of bytes pending on a channel of `priority`: `priority^-exponent`.
pub fn lc_priority_weight(priority: u8, exponent: f64) -> f64 {
    f64::from(priority.max(1)).powf(-exponent)
}

/// Buffer occupancy of one UE and direction, weighted by channel priority.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeightedBacklog {
    /// Pending bytes, each channel scaled by `lc_priority_weight`
    pub bytes: f64,
    /// Lowest priority value with pending data; 0 for the contention resolution CE
    pub top_priority: Option<u8>,
}

impl WeightedBacklog {
    fn add(&mut self, bytes: u32, priority: u8, exponent: f64) {
        if bytes == 0 {
            return;
        }
        self.bytes += f64::from(bytes) * lc_priority_weight(priority, exponent);
        self.top_priority = Some(self.top_priority.map_or(priority, |p| p.min(priority)));
    }
}

/// Logical channel parameters given at creation or reconfiguration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalChannelConfig {
    /// Logical channel id
    pub lcid: Lcid,
    /// Priority, lower value served first
    pub priority: u8,
    /// Logical channel group reported in BSRs
    pub lcg: Lcg,
}

/// SRB0, SRB1, SRB2 and one default DRB.
pub fn default_logical_channels() -> Vec<LogicalChannelConfig> {
    vec![
        LogicalChannelConfig {
            lcid: Lcid::SRB0,
            priority: 1,
            lcg: Lcg(0),
        },
        LogicalChannelConfig {
            lcid: Lcid::SRB1,
            priority: 1,
            lcg: Lcg(0),
        },
        LogicalChannelConfig {
            lcid: Lcid::SRB2,
            priority: 3,
            lcg: Lcg(0),
        },
        LogicalChannelConfig {
            lcid: Lcid::DRB1,
            priority: 10,
            lcg: Lcg(1),
        },
    ]
}

/// Request to create a UE in the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct UeCreationRequest {
    /// C-RNTI (the TC-RNTI after a successful RACH)
    pub rnti: Rnti,
    /// Primary cell
    pub pcell: CellIndex,
    /// Secondary cells
    pub scells: Vec<CellIndex>,
    /// Logical channels
    pub logical_channels: Vec<LogicalChannelConfig>,
    /// Send a contention resolution CE in the first DL transmission (Msg4)
    pub conres_ce_pending: bool,
}

impl UeCreationRequest {
    /// UE on `pcell` with the default logical channels.
    pub fn new(rnti: Rnti, pcell: CellIndex) -> Self {
        Self {
            rnti,
            pcell,
            scells: Vec::new(),
            logical_channels: default_logical_channels(),
            conres_ce_pending: false,
        }
    }

    /// UE created after Msg3, with a contention resolution CE due.
    pub fn after_msg3(rnti: Rnti, pcell: CellIndex) -> Self {
        Self {
            conres_ce_pending: true,
            ..Self::new(rnti, pcell)
        }
    }
}

/// Request to change the configuration of an existing UE.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UeReconfigRequest {
    /// New logical channel set
    pub logical_channels: Option<Vec<LogicalChannelConfig>>,
    /// New secondary cell list
    pub scells: Option<Vec<CellIndex>>,
}

/// Logical channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalChannel {
    /// Configuration
    pub config: LogicalChannelConfig,
    /// DL bytes waiting in RLC
    pub pending_bytes: u32,
}

/// Per-UE scheduling state.
#[derive(Debug, Clone)]
pub struct UeContext {
    ue_index: UeIndex,
    rnti: Rnti,
    pcell: CellIndex,
    scells: Vec<CellIndex>,
    /// Sorted by (priority, lcid)
    logical_channels: Vec<LogicalChannel>,
    ul_bsr: [u32; MAX_NOF_LCGS],
    sr_pending: bool,
    conres_ce_pending: bool,
    /// DL HARQ entity
    pub dl_harq: HarqEntity,
    /// UL HARQ entity
    pub ul_harq: HarqEntity,
    cqi: u8,
    ul_snr_db: f32,
    dl_olla: Olla,
    ul_olla: Olla,
    olla_enabled: bool,
    fixed_dl_mcs: Option<u8>,
    fixed_ul_mcs: Option<u8>,
    last_dl_grant: Option<SlotPoint>,
    last_ul_grant: Option<SlotPoint>,
    dl_avg_tput: f64,
    ul_avg_tput: f64,
    uci: PeriodicUciConfig,
    rlf_reported: bool,
}

impl UeContext {
    /// Creates the context of a new UE.
    pub fn new(ue_index: UeIndex, request: &UeCreationRequest, cfg: &CellConfiguration) -> Result<Self, UeError> {
        let logical_channels = build_logical_channels(request.rnti, &request.logical_channels, &[])?;
        let expert = &cfg.expert;
        let olla = Olla::new(expert.olla_target_bler, expert.olla_step, expert.olla_max_offset);
        let uci = PeriodicUciConfig {
            ue_index,
            rnti: request.rnti,
            sr_offset: pick_ul_offset(cfg, cfg.pucch.sr_period_slots, ue_index),
            csi_offset: pick_ul_offset(cfg, cfg.pucch.csi_period_slots, ue_index),
        };

        Ok(Self {
            ue_index,
            rnti: request.rnti,
            pcell: request.pcell,
            scells: request.scells.clone(),
            logical_channels,
            ul_bsr: [0; MAX_NOF_LCGS],
            sr_pending: false,
            conres_ce_pending: request.conres_ce_pending,
            dl_harq: HarqEntity::new(LinkDirection::Downlink, cfg.nof_dl_harqs, expert.max_nof_harq_retxs),
            ul_harq: HarqEntity::new(LinkDirection::Uplink, cfg.nof_ul_harqs, expert.max_nof_harq_retxs),
            cqi: expert.initial_cqi,
            ul_snr_db: expert.initial_ul_snr_db,
            dl_olla: olla.clone(),
            ul_olla: olla,
            olla_enabled: expert.olla_enabled,
            fixed_dl_mcs: expert.fixed_dl_mcs,
            fixed_ul_mcs: expert.fixed_ul_mcs,
            last_dl_grant: None,
            last_ul_grant: None,
            dl_avg_tput: 0.0,
            ul_avg_tput: 0.0,
            uci,
            rlf_reported: false,
        })
    }

    /// Applies a reconfiguration. Pending bytes of kept logical channels survive.
    pub fn reconfigure(&mut self, request: &UeReconfigRequest) -> Result<(), UeError> {
        if let Some(lcs) = &request.logical_channels {
            self.logical_channels = build_logical_channels(self.rnti, lcs, &self.logical_channels)?;
        }
        if let Some(scells) = &request.scells {
            self.scells = scells.clone();
        }
        Ok(())
    }

    /// Applies new scheduler expert parameters.
    pub fn apply_expert_config(&mut self, expert: &SchedulerExpertConfig) {
        self.dl_harq.set_max_retxs(expert.max_nof_harq_retxs);
        self.ul_harq.set_max_retxs(expert.max_nof_harq_retxs);
        self.olla_enabled = expert.olla_enabled;
        self.fixed_dl_mcs = expert.fixed_dl_mcs;
        self.fixed_ul_mcs = expert.fixed_ul_mcs;
    }

    /// Arena index.
    pub fn ue_index(&self) -> UeIndex {
        self.ue_index
    }

    /// C-RNTI.
    pub fn rnti(&self) -> Rnti {
        self.rnti
    }

    /// Primary cell.
    pub fn pcell(&self) -> CellIndex {
        self.pcell
    }

    /// Secondary cells.
    pub fn scells(&self) -> &[CellIndex] {
        &self.scells
    }

    /// Logical channels by priority.
    pub fn logical_channels(&self) -> &[LogicalChannel] {
        &self.logical_channels
    }

    /// SR and CSI occasions.
    pub fn uci_config(&self) -> &PeriodicUciConfig {
        &self.uci
    }

    // ------------------------------------------------------------------
    // Buffer state
    // ------------------------------------------------------------------

    /// Sets the DL RLC buffer occupancy of `lcid`.
    pub fn handle_dl_buffer_state(&mut self, lcid: Lcid, pending_bytes: u32) -> Result<(), UeError> {
        let lc = self
            .logical_channels
            .iter_mut()
            .find(|lc| lc.config.lcid == lcid)
            .ok_or(UeError::UnknownLcid { rnti: self.rnti, lcid })?;
        lc.pending_bytes = pending_bytes;
        Ok(())
    }

    /// Sets the UL buffer reported for `lcg`.
    pub fn handle_bsr(&mut self, lcg: Lcg, bytes: u32) -> Result<(), UeError> {
        let slot = self
            .ul_bsr
            .get_mut(lcg.0 as usize)
            .ok_or(UeError::InvalidLcg { rnti: self.rnti, lcg })?;
        *slot = bytes;
        if bytes > 0 {
            self.sr_pending = false;
        }
        Ok(())
    }

    /// Records a detected scheduling request.
    pub fn handle_sr(&mut self) {
        self.sr_pending = true;
    }

    /// True if a scheduling request is waiting for a grant.
    pub fn sr_pending(&self) -> bool {
        self.sr_pending
    }

    /// True if the contention resolution CE still has to be sent.
    pub fn conres_ce_pending(&self) -> bool {
        self.conres_ce_pending
    }

    /// DL bytes to schedule, MAC overhead included.
    pub fn dl_pending_bytes(&self) -> u32 {
        let sdus: u32 = self
            .logical_channels
            .iter()
            .filter(|lc| lc.pending_bytes > 0)
            .map(|lc| lc.pending_bytes + mac_subheader_bytes(lc.pending_bytes))
            .sum();
        sdus + if self.conres_ce_pending { CONRES_CE_BYTES } else { 0 }
    }

    /// UL bytes reported in BSRs.
    pub fn ul_pending_bytes(&self) -> u32 {
        self.ul_bsr.iter().sum()
    }

    /// DL backlog weighted by logical channel priority.
    ///
    /// A pending contention resolution CE counts at priority 0.
    pub fn dl_weighted_backlog(&self, exponent: f64) -> WeightedBacklog {
        let mut backlog = WeightedBacklog::default();
        if self.conres_ce_pending {
            backlog.add(CONRES_CE_BYTES, 0, exponent);
        }
        for lc in self.logical_channels.iter().filter(|lc| lc.pending_bytes > 0) {
            backlog.add(lc.pending_bytes + mac_subheader_bytes(lc.pending_bytes), lc.config.priority, exponent);
        }
        backlog
    }

    /// UL backlog weighted by priority.
    ///
    /// Each LCG counts at the best priority among its logical channels
    /// (channels are kept sorted by priority). A bare
    /// SR counts as `min_sr_grant_bytes` at the best configured priority.
    pub fn ul_weighted_backlog(&self, min_sr_grant_bytes: u32, exponent: f64) -> WeightedBacklog {
        let mut backlog = WeightedBacklog::default();
        for (lcg, &bytes) in self.ul_bsr.iter().enumerate() {
            let priority = self
                .logical_channels
                .iter()
                .find(|lc| lc.config.lcg.0 as usize == lcg)
                .map_or(LOWEST_LC_PRIORITY, |lc| lc.config.priority);
            backlog.add(bytes, priority, exponent);
        }
        if backlog.top_priority.is_none() && self.sr_pending {
            let priority = self
                .logical_channels
                .first()
                .map_or(LOWEST_LC_PRIORITY, |lc| lc.config.priority);
            backlog.add(min_sr_grant_bytes, priority, exponent);
        }
        backlog
    }

    /// UL bytes to grant: the BSR total, or `min_sr_grant_bytes` for a bare SR.
    pub fn ul_bytes_to_grant(&self, min_sr_grant_bytes: u32) -> u32 {
        match self.ul_pending_bytes() {
            0 if self.sr_pending => min_sr_grant_bytes,
            bytes => bytes,
        }
    }

    /// Fills a DL transport block of `tbs_bytes`: the contention resolution CE
    /// first, then logical channels by ascending priority value.
    pub fn allocate_dl_bytes(&mut self, tbs_bytes: u32) -> (Vec<LcAllocation>, bool) {
        let mut remaining = tbs_bytes;
        let conres_ce = self.conres_ce_pending && remaining >= CONRES_CE_BYTES;
        if conres_ce {
            remaining -= CONRES_CE_BYTES;
            self.conres_ce_pending = false;
        }

        let mut allocations = Vec::new();
        for lc in &mut self.logical_channels {
            if lc.pending_bytes == 0 {
                continue;
            }
            let mut bytes = lc.pending_bytes.min(remaining.saturating_sub(2));
            if mac_subheader_bytes(bytes) == 3 {
                bytes = lc.pending_bytes.min(remaining.saturating_sub(3));
            }
            if bytes == 0 {
                break;
            }
            lc.pending_bytes -= bytes;
            remaining -= bytes + mac_subheader_bytes(bytes);
            allocations.push(LcAllocation {
                lcid: lc.config.lcid,
                bytes,
            });
        }
        (allocations, conres_ce)
    }

    /// Deducts an UL transport block from the reported buffers, LCG 0 first.
    pub fn consume_ul_bytes(&mut self, tbs_bytes: u32) {
        let mut remaining = tbs_bytes;
        for bsr in &mut self.ul_bsr {
            let served = (*bsr).min(remaining);
            *bsr -= served;
            remaining -= served;
        }
        self.sr_pending = false;
    }

    // ------------------------------------------------------------------
    // Link adaptation
    // ------------------------------------------------------------------

    /// Last reported wideband CQI.
    pub fn cqi(&self) -> u8 {
        self.cqi
    }

    /// Updates the wideband CQI.
    pub fn set_cqi(&mut self, cqi: u8) {
        self.cqi = cqi.min(15);
    }

    /// Last measured UL SNR.
    pub fn ul_snr_db(&self) -> f32 {
        self.ul_snr_db
    }

    /// Updates the UL SNR.
    pub fn set_ul_snr_db(&mut self, snr_db: f32) {
        self.ul_snr_db = snr_db;
    }

    /// MCS for a new DL transmission.
    pub fn dl_mcs(&self) -> u8 {
        if let Some(mcs) = self.fixed_dl_mcs {
            return mcs;
        }
        let mcs = cqi_to_mcs(self.cqi);
        if self.olla_enabled {
            self.dl_olla.apply(mcs)
        } else {
            mcs
        }
    }

    /// MCS for a new UL transmission.
    pub fn ul_mcs(&self) -> u8 {
        if let Some(mcs) = self.fixed_ul_mcs {
            return mcs;
        }
        let mcs = ul_snr_to_mcs(self.ul_snr_db);
        if self.olla_enabled {
            self.ul_olla.apply(mcs)
        } else {
            mcs
        }
    }

    /// Feeds a HARQ outcome to the link adaptation loop of `direction`.
    pub fn record_harq_feedback(&mut self, direction: LinkDirection, ack: bool) {
        let olla = match direction {
            LinkDirection::Downlink => &mut self.dl_olla,
            LinkDirection::Uplink => &mut self.ul_olla,
        };
        if ack {
            olla.ack();
        } else {
            olla.nack();
        }
    }

    /// Current OLLA offset of `direction`.
    pub fn olla_offset(&self, direction: LinkDirection) -> f64 {
        match direction {
            LinkDirection::Downlink => self.dl_olla.offset(),
            LinkDirection::Uplink => self.ul_olla.offset(),
        }
    }

    // ------------------------------------------------------------------
    // Fairness bookkeeping
    // ------------------------------------------------------------------

    /// Records a grant in `slot`.
    pub fn record_grant(&mut self, direction: LinkDirection, slot: SlotPoint) {
        match direction {
            LinkDirection::Downlink => self.last_dl_grant = Some(slot),
            LinkDirection::Uplink => self.last_ul_grant = Some(slot),
        }
    }

    /// Slot of the last grant of `direction`.
    pub fn last_grant(&self, direction: LinkDirection) -> Option<SlotPoint> {
        match direction {
            LinkDirection::Downlink => self.last_dl_grant,
            LinkDirection::Uplink => self.last_ul_grant,
        }
    }

    /// Updates the exponential average of served bytes per slot.
    pub fn update_avg_throughput(&mut self, direction: LinkDirection, served_bytes: u32, ewma_coeff: f64) {
        let avg = match direction {
            LinkDirection::Downlink => &mut self.dl_avg_tput,
            LinkDirection::Uplink => &mut self.ul_avg_tput,
        };
        *avg = (1.0 - ewma_coeff) * *avg + ewma_coeff * served_bytes as f64;
    }

    /// Average served bytes per slot.
    pub fn avg_throughput(&self, direction: LinkDirection) -> f64 {
        match direction {
            LinkDirection::Downlink => self.dl_avg_tput,
            LinkDirection::Uplink => self.ul_avg_tput,
        }
    }

    // ------------------------------------------------------------------
    // Radio link failure
    // ------------------------------------------------------------------

    /// Marks the RLF as reported. Returns false if it already was.
    pub fn mark_rlf_reported(&mut self) -> bool {
        !std::mem::replace(&mut self.rlf_reported, true)
    }

    /// True once an RLF has been reported for this UE.
    pub fn rlf_reported(&self) -> bool {
        self.rlf_reported
    }
}

fn build_logical_channels(
    rnti: Rnti,
    configs: &[LogicalChannelConfig],
    previous: &[LogicalChannel],
) -> Result<Vec<LogicalChannel>, UeError> {
    let mut lcs: Vec<LogicalChannel> = Vec::with_capacity(configs.len());
    for config in configs {
        if config.lcid.0 as usize >= MAX_NOF_LCIDS || config.lcg.0 as usize >= MAX_NOF_LCGS {
            return Err(UeError::InvalidLogicalChannel {
                rnti,
                lcid: config.lcid,
            });
        }
        if lcs.iter().any(|lc| lc.config.lcid == config.lcid) {
            return Err(UeError::InvalidLogicalChannel {
                rnti,
                lcid: config.lcid,
            });
        }
        let pending_bytes = previous
            .iter()
            .find(|lc| lc.config.lcid == config.lcid)
            .map_or(0, |lc| lc.pending_bytes);
        lcs.push(LogicalChannel {
            config: *config,
            pending_bytes,
        });
    }
    lcs.sort_by_key(|lc| (lc.config.priority, lc.config.lcid.0));
    Ok(lcs)
}

/// Spreads periodic UCI occasions of different UEs over the UL slots of the period.
fn pick_ul_offset(cfg: &CellConfiguration, period: u32, ue_index: UeIndex) -> u32 {
    if period == 0 {
        return 0;
    }
    let ul_offsets: Vec<u32> = (0..period)
        .filter(|offset| cfg.is_ul_slot(SlotPoint::new(cfg.scs, *offset)))
        .collect();
    if ul_offsets.is_empty() {
        return ue_index.0 as u32 % period;
    }
    ul_offsets[ue_index.as_usize() % ul_offsets.len()]
}
