//! Consistent hashing ring implementation.

use std::collections::BTreeMap;

use hashlb_types::{HashPolicy, Slot, WorkerId};
use tracing::debug;

use crate::error::RingError;

/// A request whose owner differs between two ring states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remap {
    /// The request key.
    pub key: u64,
    /// Owner before the change (`None` if the old ring was empty).
    pub from: Option<WorkerId>,
    /// Owner after the change (`None` if the new ring is empty).
    pub to: Option<WorkerId>,
}

/// Fixed-size consistent hashing ring.
///
/// The slot table is an arena indexed by slot number. Each worker also keeps
/// the list of slots it actually landed on (after probing), so removal is
/// `O(K)` and never has to recompute where probing sent a virtual node.
#[derive(Debug, Clone)]
pub struct HashRing {
    /// Slot table: slot -> owning worker.
    slots: Vec<Option<WorkerId>>,
    /// Slots each worker currently occupies, in replica order.
    owned: BTreeMap<WorkerId, Vec<Slot>>,
    /// Number of `Some` entries in `slots`.
    occupied: usize,
    /// Placement and request hash functions.
    policy: HashPolicy,
}

impl HashRing {
    /// Create an empty ring with `num_slots` slots.
    pub fn new(num_slots: usize, policy: HashPolicy) -> Result<Self, RingError> {
        if num_slots == 0 {
            return Err(RingError::ZeroSlots);
        }
        Ok(Self {
            slots: vec![None; num_slots],
            owned: BTreeMap::new(),
            occupied: 0,
            policy,
        })
    }

    /// Place `replica_count` virtual nodes for `worker`.
    ///
    /// Each replica starts at its virtual-node hash and advances one slot at a
    /// time until it finds a free one. Returns the slots taken, in replica
    /// order. On failure the ring is left exactly as it was.
    pub fn place(&mut self, worker: WorkerId, replica_count: usize) -> Result<Vec<Slot>, RingError> {
        if self.owned.contains_key(&worker) {
            return Err(RingError::AlreadyPlaced(worker));
        }

        let num_slots = self.slots.len();
        let mut taken: Vec<Slot> = Vec::with_capacity(replica_count);

        for replica in 0..replica_count {
            match self.probe_free(self.vnode_slot(worker, replica)) {
                Some(slot) => {
                    self.slots[slot] = Some(worker);
                    self.occupied += 1;
                    taken.push(slot);
                }
                None => {
                    // Roll back this call's partial placement.
                    for slot in taken {
                        self.slots[slot] = None;
                        self.occupied -= 1;
                    }
                    return Err(RingError::RingFull {
                        worker,
                        replica,
                        num_slots,
                    });
                }
            }
        }

        debug!(%worker, replicas = replica_count, ?taken, "placed worker on ring");
        self.owned.insert(worker, taken.clone());
        Ok(taken)
    }

    /// Clear every slot `worker` occupies. Unknown workers are ignored.
    pub fn remove(&mut self, worker: WorkerId) {
        if let Some(taken) = self.owned.remove(&worker) {
            for slot in &taken {
                self.slots[*slot] = None;
            }
            self.occupied -= taken.len();
            debug!(%worker, freed = taken.len(), "removed worker from ring");
        }
    }

    /// Find the worker serving `key`.
    ///
    /// Walks clockwise from the key's slot and returns the first occupant.
    /// Returns `None` when the ring holds no workers; the walk is bounded by
    /// one full revolution.
    pub fn lookup(&self, key: u64) -> Option<WorkerId> {
        if self.occupied == 0 {
            return None;
        }

        let num_slots = self.slots.len();
        let start = self.request_slot(key);
        (0..num_slots).find_map(|step| self.slots[(start + step) % num_slots])
    }

    /// Compute which keys change owner between two ring states.
    pub fn diff(old: &HashRing, new: &HashRing, keys: impl IntoIterator<Item = u64>) -> Vec<Remap> {
        keys.into_iter()
            .filter_map(|key| {
                let from = old.lookup(key);
                let to = new.lookup(key);
                (from != to).then_some(Remap { key, from, to })
            })
            .collect()
    }

    /// Slot where replica `replica` of `worker` first tries to land.
    pub fn vnode_slot(&self, worker: WorkerId, replica: usize) -> Slot {
        let n = self.slots.len() as u64;
        let raw = match self.policy {
            HashPolicy::Linear => {
                let w = u64::from(worker.get()) % n;
                let j = (replica as u64) % n;
                (w + 3 * j + 25) % n
            }
            HashPolicy::Blake3 => {
                let hash = blake3::hash(format!("{}:{}", worker.get(), replica).as_bytes());
                truncate(hash.as_bytes()) % n
            }
        };
        raw as Slot
    }

    /// Slot where the clockwise walk for `key` starts.
    pub fn request_slot(&self, key: u64) -> Slot {
        let n = self.slots.len();
        match self.policy {
            HashPolicy::Linear => {
                let n = n as u128;
                ((u128::from(key) * 3 + 2172) % n) as Slot
            }
            HashPolicy::Blake3 => {
                let hash = blake3::hash(&key.to_le_bytes());
                (truncate(hash.as_bytes()) % n as u64) as Slot
            }
        }
    }

    /// First free slot at or after `start`, or `None` if every slot is taken.
    fn probe_free(&self, start: Slot) -> Option<Slot> {
        if self.occupied == self.slots.len() {
            return None;
        }
        let num_slots = self.slots.len();
        (0..num_slots)
            .map(|step| (start + step) % num_slots)
            .find(|slot| self.slots[*slot].is_none())
    }

    /// Return the ring size.
    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    /// Return the hashing policy.
    pub fn policy(&self) -> HashPolicy {
        self.policy
    }

    /// Return the number of occupied slots.
    pub fn occupied_count(&self) -> usize {
        self.occupied
    }

    /// Return the number of workers on the ring.
    pub fn worker_count(&self) -> usize {
        self.owned.len()
    }

    /// Whether `worker` holds slots on this ring.
    pub fn contains(&self, worker: WorkerId) -> bool {
        self.owned.contains_key(&worker)
    }

    /// Slots held by `worker`, in replica order.
    pub fn slots_of(&self, worker: WorkerId) -> Option<&[Slot]> {
        self.owned.get(&worker).map(Vec::as_slice)
    }

    /// Occupant of `slot`, if any. Out-of-range slots are empty.
    pub fn owner_of(&self, slot: Slot) -> Option<WorkerId> {
        self.slots.get(slot).copied().flatten()
    }

    /// All workers on the ring, in ascending id order.
    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.owned.keys().copied().collect()
    }

    /// Occupied slots in ascending slot order.
    pub fn occupied_slots(&self) -> impl Iterator<Item = (Slot, WorkerId)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, owner)| owner.map(|w| (slot, w)))
    }
}

/// First 8 bytes of a digest as a little-endian u64.
fn truncate(digest: &[u8; 32]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}
