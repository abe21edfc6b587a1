//! HARQ processes and per-UE HARQ entities
//!
//! A process goes `Empty -> WaitingForGrant -> AwaitingFeedback` for a new
//! transmission. A NACK (or a feedback timeout) moves it to `ToRetransmit`, from
//! where the next grant goes through `WaitingForGrant` again. Reaching the
//! retransmission ceiling moves it to `Failed`. `WaitingForGrant` only lives
//! while a grant is being built and falls back to the previous state when the
//! grant is rolled back.

use std::fmt;

use nextgsim_common::{HarqId, LinkDirection, SlotPoint, MAX_NOF_HARQS};

/// HARQ process state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HarqState {
    /// Free for a new transmission
    Empty,
    /// Selected for a grant that is not committed yet
    WaitingForGrant,
    /// Transmitted, feedback pending
    AwaitingFeedback,
    /// NACKed, waiting for a retransmission grant
    ToRetransmit,
    /// Retransmission ceiling reached
    Failed,
}

impl fmt::Display for HarqState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HarqState::Empty => write!(f, "Empty"),
            HarqState::WaitingForGrant => write!(f, "WaitingForGrant"),
            HarqState::AwaitingFeedback => write!(f, "AwaitingFeedback"),
            HarqState::ToRetransmit => write!(f, "ToRetransmit"),
            HarqState::Failed => write!(f, "Failed"),
        }
    }
}

/// Result of applying feedback to a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarqFeedbackOutcome {
    /// Transport block delivered
    Acked {
        /// Delivered bytes
        tbs_bytes: u32,
    },
    /// Retransmission needed
    Nacked,
    /// Ceiling reached, the process is now `Failed`
    MaxRetxReached,
    /// The process was not waiting for feedback
    Ignored,
}

/// One HARQ process.
#[derive(Debug, Clone)]
pub struct HarqProcess {
    id: HarqId,
    state: HarqState,
    state_before_grant: HarqState,
    max_retxs: u8,
    nof_retxs: u8,
    ndi: bool,
    tx_slot: Option<SlotPoint>,
    feedback_slot: Option<SlotPoint>,
    retx_pending_since: Option<SlotPoint>,
    mcs: u8,
    nof_prbs: u16,
    tbs_bytes: u32,
}

impl HarqProcess {
    /// Creates an empty process.
    pub fn new(id: HarqId, max_retxs: u8) -> Self {
        Self {
            id,
            state: HarqState::Empty,
            state_before_grant: HarqState::Empty,
            max_retxs,
            nof_retxs: 0,
            ndi: false,
            tx_slot: None,
            feedback_slot: None,
            retx_pending_since: None,
            mcs: 0,
            nof_prbs: 0,
            tbs_bytes: 0,
        }
    }

    /// Process id.
    pub fn id(&self) -> HarqId {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> HarqState {
        self.state
    }

    /// Retransmissions done for the current transport block.
    pub fn nof_retxs(&self) -> u8 {
        self.nof_retxs
    }

    /// New data indicator of the current transport block.
    pub fn ndi(&self) -> bool {
        self.ndi
    }

    /// MCS of the current transport block.
    pub fn mcs(&self) -> u8 {
        self.mcs
    }

    /// PRB count of the current transport block.
    pub fn nof_prbs(&self) -> u16 {
        self.nof_prbs
    }

    /// Size of the current transport block.
    pub fn tbs_bytes(&self) -> u32 {
        self.tbs_bytes
    }

    /// Slot of the last transmission.
    pub fn tx_slot(&self) -> Option<SlotPoint> {
        self.tx_slot
    }

    /// Slot where feedback for the last transmission is expected.
    pub fn feedback_slot(&self) -> Option<SlotPoint> {
        self.feedback_slot
    }

    /// Slot at which the process entered `ToRetransmit`.
    pub fn retx_pending_since(&self) -> Option<SlotPoint> {
        self.retx_pending_since
    }

    /// Updates the retransmission ceiling.
    pub fn set_max_retxs(&mut self, max_retxs: u8) {
        self.max_retxs = max_retxs;
    }

    /// Marks the process as selected for a grant under construction.
    pub fn reserve(&mut self) {
        assert!(
            matches!(self.state, HarqState::Empty | HarqState::ToRetransmit),
            "HARQ {} reserved in state {}",
            self.id,
            self.state
        );
        self.state_before_grant = self.state;
        self.state = HarqState::WaitingForGrant;
    }

    /// Rolls a reservation back.
    pub fn cancel_reservation(&mut self) {
        assert_eq!(self.state, HarqState::WaitingForGrant, "HARQ {} not reserved", self.id);
        self.state = self.state_before_grant;
    }

    /// Commits a new transmission.
    pub fn commit_new_tx(&mut self, tx_slot: SlotPoint, feedback_slot: SlotPoint, mcs: u8, nof_prbs: u16, tbs_bytes: u32) {
        assert!(
            self.state == HarqState::WaitingForGrant && self.state_before_grant == HarqState::Empty,
            "HARQ {} new transmission committed in state {}",
            self.id,
            self.state
        );
        self.nof_retxs = 0;
        self.ndi = !self.ndi;
        self.mcs = mcs;
        self.nof_prbs = nof_prbs;
        self.tbs_bytes = tbs_bytes;
        self.tx_slot = Some(tx_slot);
        self.feedback_slot = Some(feedback_slot);
        self.retx_pending_since = None;
        self.state = HarqState::AwaitingFeedback;
    }

    /// Commits a retransmission of the current transport block.
    pub fn commit_retx(&mut self, tx_slot: SlotPoint, feedback_slot: SlotPoint) {
        assert!(
            self.state == HarqState::WaitingForGrant && self.state_before_grant == HarqState::ToRetransmit,
            "HARQ {} retransmission committed in state {}",
            self.id,
            self.state
        );
        self.nof_retxs += 1;
        self.tx_slot = Some(tx_slot);
        self.feedback_slot = Some(feedback_slot);
        self.retx_pending_since = None;
        self.state = HarqState::AwaitingFeedback;
    }

    /// Applies ACK/NACK feedback received at `now`.
    pub fn feedback(&mut self, ack: bool, now: SlotPoint) -> HarqFeedbackOutcome {
        if self.state != HarqState::AwaitingFeedback {
            return HarqFeedbackOutcome::Ignored;
        }
        if ack {
            self.state = HarqState::Empty;
            self.feedback_slot = None;
            return HarqFeedbackOutcome::Acked {
                tbs_bytes: self.tbs_bytes,
            };
        }
        if self.nof_retxs >= self.max_retxs {
            self.state = HarqState::Failed;
            self.feedback_slot = None;
            return HarqFeedbackOutcome::MaxRetxReached;
        }
        self.state = HarqState::ToRetransmit;
        self.retx_pending_since = Some(now);
        HarqFeedbackOutcome::Nacked
    }

    /// Treats missing feedback as NACK once `timeout_slots` have passed after
    /// the expected feedback slot.
    pub fn check_timeout(&mut self, now: SlotPoint, timeout_slots: u32) -> Option<HarqFeedbackOutcome> {
        let feedback_slot = self.feedback_slot?;
        if self.state == HarqState::AwaitingFeedback && now - feedback_slot > timeout_slots as i32 {
            return Some(self.feedback(false, now));
        }
        None
    }

    /// Returns the process to `Empty`.
    pub fn reset(&mut self) {
        self.state = HarqState::Empty;
        self.nof_retxs = 0;
        self.feedback_slot = None;
        self.retx_pending_since = None;
    }
}

/// HARQ processes of one UE in one direction.
#[derive(Debug, Clone)]
pub struct HarqEntity {
    direction: LinkDirection,
    processes: Vec<HarqProcess>,
}

impl HarqEntity {
    /// Creates `nof_harqs` empty processes.
    pub fn new(direction: LinkDirection, nof_harqs: u8, max_retxs: u8) -> Self {
        assert!(
            nof_harqs as usize <= MAX_NOF_HARQS,
            "{nof_harqs} HARQ processes exceed {MAX_NOF_HARQS}"
        );
        Self {
            direction,
            processes: (0..nof_harqs).map(|id| HarqProcess::new(HarqId(id), max_retxs)).collect(),
        }
    }

    /// Link direction.
    pub fn direction(&self) -> LinkDirection {
        self.direction
    }

    /// Number of processes.
    pub fn nof_processes(&self) -> usize {
        self.processes.len()
    }

    /// Process `id`.
    pub fn get(&self, id: HarqId) -> Option<&HarqProcess> {
        self.processes.get(id.0 as usize)
    }

    /// Process `id` for modification.
    pub fn get_mut(&mut self, id: HarqId) -> Option<&mut HarqProcess> {
        self.processes.get_mut(id.0 as usize)
    }

    /// Lowest-id empty process.
    pub fn find_empty(&self) -> Option<HarqId> {
        self.processes
            .iter()
            .find(|h| h.state == HarqState::Empty)
            .map(|h| h.id)
    }

    /// Processes waiting for a retransmission.
    pub fn pending_retxs(&self) -> impl Iterator<Item = &HarqProcess> {
        self.processes.iter().filter(|h| h.state == HarqState::ToRetransmit)
    }

    /// Ids of the processes whose feedback is expected in `slot`, by id.
    pub fn awaiting_feedback_at(&self, slot: SlotPoint) -> Vec<HarqId> {
        self.processes
            .iter()
            .filter(|h| h.state == HarqState::AwaitingFeedback && h.feedback_slot == Some(slot))
            .map(|h| h.id)
            .collect()
    }

    /// Applies the feedback timeout to every process.
    pub fn check_timeouts(&mut self, now: SlotPoint, timeout_slots: u32) -> Vec<(HarqId, HarqFeedbackOutcome)> {
        self.processes
            .iter_mut()
            .filter_map(|h| h.check_timeout(now, timeout_slots).map(|o| (h.id, o)))
            .collect()
    }

    /// Number of processes in `state`.
    pub fn count_in_state(&self, state: HarqState) -> usize {
        self.processes.iter().filter(|h| h.state == state).count()
    }

    /// Updates the retransmission ceiling of every process.
    pub fn set_max_retxs(&mut self, max_retxs: u8) {
        for h in &mut self.processes {
            h.set_max_retxs(max_retxs);
        }
    }

    /// Iterates over all processes.
    pub fn iter(&self) -> impl Iterator<Item = &HarqProcess> {
        self.processes.iter()
    }
}
