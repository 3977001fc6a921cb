//! Core types and traits for an event store with Dynamic Consistency
//! Boundaries (DCB): tags, queries, append conditions, the storage-agnostic
//! `EventStore` trait, and the projection engine that folds multiple
//! projectors over one shared stream.
//!
//! Storage backends (see `dcb-postgres`) implement `EventStore` against a
//! concrete database; this crate has no database dependency of its own.

mod condition;
mod config;
mod error;
mod event;
mod projection;
mod query;
mod store;
mod tag;

pub use condition::AppendCondition;
pub use config::{PoolConfig, StoreConfig};
pub use error::{Error, ResourceError};
pub use event::{InputEvent, StoredEvent};
pub use projection::{BoxedProjector, ProjectionEngine, Projector, States};
pub use query::{Cursor, Query, QueryItem};
pub use store::{AppendMode, EventStore};
pub use tag::{EventType, Tag, LOCK_TAG_PREFIX};
