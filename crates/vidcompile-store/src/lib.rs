//! Typed persistence adapters for the video-compilation service.
//!
//! [`job_store`] is the Job Store Adapter (C5): typed operations over the
//! `jobs`/`job_items`/`profiles` tables in the relational store, accepting
//! only the sealed [`job_store::JobPatch`] mutations a worker or dispatcher
//! is allowed to make. [`warehouse`] is the Metadata Gateway (C4): a
//! read-mostly batch interface over the analytics warehouse, with an
//! in-process TTL-cached channel list.

pub mod error;
pub mod job_store;
pub mod warehouse;

pub use error::StoreError;
pub use job_store::{JobPatch, JobStore};
pub use warehouse::WarehouseGateway;
