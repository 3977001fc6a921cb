//! Typed configuration for the store and its connection pool.
//!
//! This crate only defines the shape of the configuration; building a pool
//! and parsing a connection string are the embedding application's job
//! (connection-string parsing and deployment wiring are out of scope).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::AppendMode;

/// Configuration for the store's public operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum number of events accepted by a single `Append*` call.
    pub max_append_batch_size: usize,
    /// Capacity of the bounded channel backing `QueryStream`/`ProjectStream`.
    pub stream_buffer: usize,
    /// Deadline applied to `Query`/`QueryStream`.
    pub query_timeout: Duration,
    /// Deadline applied to `Append`/`AppendIf`/`AppendIfIsolated`.
    pub append_timeout: Duration,
    /// Isolation mode used when a caller invokes the bare `Append` helper
    /// without naming a mode explicitly.
    pub default_append_mode: AppendMode,
    /// Upper bound on projections running concurrently across the process.
    /// Exceeding it returns `TooManyProjectionsError` rather than queueing.
    pub max_concurrent_projections: usize,
    /// Advisory cap on internal parallel I/O a single projection call may
    /// use; does not affect dispatch ordering guarantees.
    pub max_projection_goroutines: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_append_batch_size: 1000,
            stream_buffer: 256,
            query_timeout: Duration::from_secs(15),
            append_timeout: Duration::from_secs(15),
            default_append_mode: AppendMode::Append,
            max_concurrent_projections: 32,
            max_projection_goroutines: 8,
        }
    }
}

/// Connection pool sizing, adapted onto the backend's native pool options
/// (e.g. `sqlx::postgres::PgPoolOptions`) by the storage adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_connection_lifetime: Option<Duration>,
    pub max_connection_idle_time: Option<Duration>,
    pub health_check_period: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            max_connection_lifetime: Some(Duration::from_secs(30 * 60)),
            max_connection_idle_time: Some(Duration::from_secs(10 * 60)),
            health_check_period: Duration::from_secs(30),
        }
    }
}
