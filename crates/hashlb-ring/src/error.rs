//! Error types for ring mutations.

use hashlb_types::WorkerId;

/// Errors that can occur while building or mutating the ring.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RingError {
    /// The ring was constructed with no slots.
    #[error("ring must have at least one slot")]
    ZeroSlots,

    /// Linear probing wrapped all the way around without finding a free slot.
    #[error("hash ring is full: cannot place virtual node {replica} of {worker} ({num_slots} slots occupied)")]
    RingFull {
        /// The worker being placed.
        worker: WorkerId,
        /// The replica index that found no free slot.
        replica: usize,
        /// Ring size.
        num_slots: usize,
    },

    /// The worker already owns slots on this ring.
    #[error("{0} is already placed on the ring")]
    AlreadyPlaced(WorkerId),
}
