//! Shared data model and pure orchestration logic for the video-compilation service.
//!
//! Everything in this crate is free of I/O: the job/item data model, queue
//! classification, subtitle synthesis, and the resolved-item type that the
//! media and worker crates build on. Components that touch the filesystem,
//! a database, or a subprocess live further out (`vidcompile-media`,
//! `vidcompile-store`, `vidcompile-broker`, `vidcompile-worker`).

pub mod classify;
pub mod item;
pub mod model;
pub mod subtitle;

pub use classify::classify_queue;
pub use item::ProcessedItem;
pub use model::{ChannelAssets, Job, JobItem, JobStatus, ItemType, Queue, UserProfile};
