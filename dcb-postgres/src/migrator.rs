//! Database bootstrap for `PgEventStore`.
//!
//! Idempotent `CREATE TABLE IF NOT EXISTS` / `CREATE INDEX IF NOT EXISTS`
//! DDL, run once at startup. This is bootstrap DDL, not a migration engine:
//! there is one fixed schema (§4.B), not a version ladder, since the tag
//! model needs no per-event-type dynamic columns the way the teacher's
//! domain-identifier columns did.

use sqlx::PgPool;

use crate::Error;

/// Runs the one-time schema bootstrap for a fresh deployment.
pub struct Migrator<'a> {
    pool: &'a PgPool,
}

impl<'a> Migrator<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Creates the `events` table and its indexes if they do not already
    /// exist. Safe to call on every startup.
    pub async fn init(&self) -> Result<(), Error> {
        sqlx::query(include_str!("sql/seq_events_position.sql"))
            .execute(self.pool)
            .await?;
        sqlx::query(include_str!("sql/table_events.sql"))
            .execute(self.pool)
            .await?;
        sqlx::query(include_str!("sql/idx_events_tags.sql"))
            .execute(self.pool)
            .await?;
        sqlx::query(include_str!("sql/idx_events_type_position.sql"))
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Drops and recreates the `events` table. Test-only: never call this
    /// against a deployment that holds real data.
    #[doc(hidden)]
    pub async fn truncate(&self) -> Result<(), Error> {
        sqlx::query("TRUNCATE TABLE events")
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
