//! Request router for hashlb.
//!
//! The [`Router`] owns the hash ring and the worker registry behind a single
//! lock and exposes the dispatch pipeline: resolve a request id to a worker,
//! forward it, count the answer. Workers are reached through the
//! [`WorkerClient`] trait so tests can substitute an in-process client for
//! the real HTTP one ([`HttpWorkerClient`]).

pub mod client;
pub mod error;
pub mod registry;
pub mod router;

pub use client::{HttpWorkerClient, WorkerClient};
pub use error::{ClientError, RouterError};
pub use registry::{DispatchTarget, WorkerRegistry};
pub use router::{RouteOutcome, Router, RouterConfig};
