//! UE arena
//!
//! Fixed-capacity storage indexed by `UeIndex`. Freed indices are reused
//! lowest first, and an RNTI index resolves indications to UEs.

use std::collections::{BTreeSet, HashMap};

use nextgsim_common::{Rnti, UeIndex};

use crate::cell::config::CellConfiguration;
use crate::ue::context::{UeContext, UeCreationRequest};
use crate::ue::UeError;

/// UE contexts of one cell.
#[derive(Debug)]
pub struct UeRepository {
    slots: Vec<Option<UeContext>>,
    free: BTreeSet<u16>,
    by_rnti: HashMap<Rnti, UeIndex>,
}

impl UeRepository {
    /// Creates an empty repository for up to `capacity` UEs.
    pub fn new(capacity: u16) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            free: (0..capacity).collect(),
            by_rnti: HashMap::new(),
        }
    }

    /// Maximum number of UEs.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of UEs.
    pub fn len(&self) -> usize {
        self.by_rnti.len()
    }

    /// True if no UE is stored.
    pub fn is_empty(&self) -> bool {
        self.by_rnti.is_empty()
    }

    /// Creates a UE and returns its index.
    pub fn add(&mut self, request: &UeCreationRequest, cfg: &CellConfiguration) -> Result<UeIndex, UeError> {
        if !request.rnti.is_crnti() {
            return Err(UeError::InvalidRnti(request.rnti));
        }
        if self.by_rnti.contains_key(&request.rnti) {
            return Err(UeError::DuplicateRnti(request.rnti));
        }
        let index = *self.free.first().ok_or(UeError::RepositoryFull {
            capacity: self.slots.len(),
        })?;
        let ue_index = UeIndex(index);
        let ue = UeContext::new(ue_index, request, cfg)?;
        self.free.remove(&index);
        self.slots[ue_index.as_usize()] = Some(ue);
        self.by_rnti.insert(request.rnti, ue_index);
        Ok(ue_index)
    }

    /// Removes a UE and returns its context.
    pub fn remove(&mut self, ue_index: UeIndex) -> Option<UeContext> {
        let ue = self.slots.get_mut(ue_index.as_usize())?.take()?;
        self.by_rnti.remove(&ue.rnti());
        self.free.insert(ue_index.0);
        Some(ue)
    }

    /// UE at `ue_index`.
    pub fn get(&self, ue_index: UeIndex) -> Option<&UeContext> {
        self.slots.get(ue_index.as_usize())?.as_ref()
    }

    /// UE at `ue_index` for modification.
    pub fn get_mut(&mut self, ue_index: UeIndex) -> Option<&mut UeContext> {
        self.slots.get_mut(ue_index.as_usize())?.as_mut()
    }

    /// Index of the UE owning `rnti`.
    pub fn find_by_rnti(&self, rnti: Rnti) -> Option<UeIndex> {
        self.by_rnti.get(&rnti).copied()
    }

    /// True if `rnti` belongs to a UE.
    pub fn contains_rnti(&self, rnti: Rnti) -> bool {
        self.by_rnti.contains_key(&rnti)
    }

    /// UE indices in ascending order.
    pub fn indices(&self) -> Vec<UeIndex> {
        self.iter().map(|ue| ue.ue_index()).collect()
    }

    /// UEs in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = &UeContext> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// UEs in ascending index order, for modification.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut UeContext> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nextgsim_common::config::{CellConfig, SchedulerExpertConfig};
    use nextgsim_common::CellIndex;

    fn cfg(max_nof_ues: u16) -> CellConfiguration {
        let cell = CellConfig {
            max_nof_ues,
            ..CellConfig::default()
        };
        CellConfiguration::new(CellIndex(0), &cell, &SchedulerExpertConfig::default()).unwrap()
    }

    fn request(rnti: u16) -> UeCreationRequest {
        UeCreationRequest::new(Rnti::new(rnti), CellIndex(0))
    }

    #[test]
    fn test_add_and_lookup() {
        let cfg = cfg(4);
        let mut repo = UeRepository::new(cfg.max_nof_ues);
        let a = repo.add(&request(0x4601), &cfg).unwrap();
        let b = repo.add(&request(0x4602), &cfg).unwrap();
        assert_eq!((a, b), (UeIndex(0), UeIndex(1)));
        assert_eq!(repo.find_by_rnti(Rnti::new(0x4602)), Some(b));
        assert_eq!(repo.get(a).unwrap().rnti(), Rnti::new(0x4601));
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn test_duplicate_and_invalid_rnti() {
        let cfg = cfg(4);
        let mut repo = UeRepository::new(cfg.max_nof_ues);
        repo.add(&request(0x4601), &cfg).unwrap();
        assert_eq!(
            repo.add(&request(0x4601), &cfg),
            Err(UeError::DuplicateRnti(Rnti::new(0x4601)))
        );
        assert_eq!(repo.add(&request(0xFFFF), &cfg), Err(UeError::InvalidRnti(Rnti::SI_RNTI)));
    }

    #[test]
    fn test_capacity_and_reuse() {
        let cfg = cfg(2);
        let mut repo = UeRepository::new(cfg.max_nof_ues);
        repo.add(&request(0x4601), &cfg).unwrap();
        repo.add(&request(0x4602), &cfg).unwrap();
        assert_eq!(
            repo.add(&request(0x4603), &cfg),
            Err(UeError::RepositoryFull { capacity: 2 })
        );

        let removed = repo.remove(UeIndex(0)).unwrap();
        assert_eq!(removed.rnti(), Rnti::new(0x4601));
        assert!(repo.remove(UeIndex(0)).is_none());
        assert!(!repo.contains_rnti(Rnti::new(0x4601)));

        assert_eq!(repo.add(&request(0x4603), &cfg).unwrap(), UeIndex(0));
        assert_eq!(repo.indices(), vec![UeIndex(0), UeIndex(1)]);
    }
}
