//! Fixed-slot consistent hash ring for deterministic request routing.
//!
//! This crate implements the ring that maps request ids to workers. The
//! keyspace is a fixed array of `num_slots` slots; every worker owns `K`
//! virtual nodes, each placed at a deterministic slot and moved forward by
//! linear probing when that slot is already taken. A request is served by
//! the first occupied slot found walking clockwise from its own hash.
//!
//! Removing a worker only clears the slots it recorded, so every other
//! worker keeps its exact positions and only the removed worker's requests
//! move.

mod error;
mod ring;

pub use error::RingError;
pub use ring::{HashRing, Remap};
