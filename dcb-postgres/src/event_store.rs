//! PostgreSQL implementation of `dcb_core::EventStore`.

mod append;
mod lock;
mod query_builder;
mod stream;

use async_trait::async_trait;
use dcb_core::{
    AppendCondition, Cursor, Error as CoreError, EventStore as CoreEventStore, InputEvent, Query,
    ResourceError, StoreConfig, StoredEvent,
};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::migrator::Migrator;
use crate::Error;

/// PostgreSQL-backed event store.
///
/// Grounded in the teacher's `PgEventStore`
/// (`disintegrate-postgres::event_store::PgEventStore`): same
/// `try_new`/`new_uninitialized` split (the latter for callers who manage
/// schema bootstrap themselves), same begin-tx / check-condition / insert /
/// commit append shape, generalized from the teacher's typed-event,
/// domain-identifier-column model to the dynamic tag/query model this crate
/// implements.
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
    config: StoreConfig,
}

impl PgEventStore {
    /// Bootstraps the schema (idempotent) and returns a ready store.
    pub async fn try_new(pool: PgPool, config: StoreConfig) -> Result<Self, Error> {
        let store = Self::new_uninitialized(pool, config);
        Migrator::new(&store.pool).init().await?;
        Ok(store)
    }

    /// Skips schema bootstrap. Use when a separate migration step already
    /// ran `Migrator::init`.
    pub fn new_uninitialized(pool: PgPool, config: StoreConfig) -> Self {
        Self { pool, config }
    }

    /// Liveness probe: `SELECT 1` through the pool.
    pub async fn ping(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Test-only: truncates the `events` table. Never call this against a
    /// deployment holding real data.
    #[doc(hidden)]
    pub async fn truncate(&self) -> Result<(), Error> {
        Migrator::new(&self.pool).truncate().await
    }

    async fn append_impl(
        &self,
        events: Vec<InputEvent>,
        condition: Option<AppendCondition>,
        isolation: Option<&'static str>,
    ) -> Result<Vec<StoredEvent>, Error> {
        if events.is_empty() {
            return Err(Error::Validation {
                field: "events".into(),
                reason: "batch must not be empty".into(),
            });
        }
        if events.len() > self.config.max_append_batch_size {
            return Err(Error::Validation {
                field: "events".into(),
                reason: format!(
                    "batch size {} exceeds max_append_batch_size {}",
                    events.len(),
                    self.config.max_append_batch_size
                ),
            });
        }

        let fut = self.append_in_tx(events, condition, isolation);
        tokio::time::timeout(self.config.append_timeout, fut).await?
    }

    async fn append_in_tx(
        &self,
        events: Vec<InputEvent>,
        condition: Option<AppendCondition>,
        isolation: Option<&'static str>,
    ) -> Result<Vec<StoredEvent>, Error> {
        let matched_query = condition
            .as_ref()
            .map(|c| c.fail_if_events_match().clone())
            .unwrap_or_else(Query::empty);

        let mut tx = self.pool.begin().await?;

        if let Some(level) = isolation {
            sqlx::query(&format!("SET TRANSACTION ISOLATION LEVEL {level}"))
                .execute(&mut *tx)
                .await?;
        }

        let lock_keys = lock::distinct_lock_keys(&events);
        if !lock_keys.is_empty() {
            lock::acquire_locks(&mut tx, &lock_keys).await?;
        }

        if let Some(condition) = &condition {
            let mut builder =
                QueryBuilder::<Postgres>::new("SELECT EXISTS (SELECT 1 FROM events WHERE ");
            query_builder::push_cursor_predicate(&mut builder, condition.after());
            builder.push(" AND ");
            query_builder::push_query_predicate(&mut builder, condition.fail_if_events_match());
            builder.push(")");
            let exists: bool = builder
                .build_query_scalar()
                .fetch_one(&mut *tx)
                .await?;
            if exists {
                let _ = tx.rollback().await;
                return Err(Error::Concurrency { matched_query });
            }
        }

        let ids: Vec<Uuid> = events.iter().map(|_| Uuid::new_v4()).collect();
        let mut insert = append::build_insert(&ids, &events);
        let rows = insert.build().fetch_all(&mut *tx).await?;

        let stored = ids
            .into_iter()
            .zip(events)
            .zip(rows)
            .map(|((id, event), row)| {
                Ok(StoredEvent {
                    id,
                    event_type: event.event_type().clone(),
                    tags: event.matching_tags().cloned().collect(),
                    data: event.data().to_vec(),
                    position: row.try_get("position")?,
                    transaction_id: row.try_get("transaction_id")?,
                    occurred_at: row.try_get("occurred_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        tx.commit()
            .await
            .map_err(|e| crate::error::map_commit_err(e, matched_query))?;

        Ok(stored)
    }
}

#[async_trait]
impl CoreEventStore for PgEventStore {
    #[tracing::instrument(skip(self, events), fields(batch_size = events.len()))]
    async fn append(&self, events: Vec<InputEvent>) -> Result<Vec<StoredEvent>, CoreError> {
        self.append_impl(events, None, None).await.map_err(Into::into)
    }

    #[tracing::instrument(skip(self, events, condition), fields(batch_size = events.len()))]
    async fn append_if(
        &self,
        events: Vec<InputEvent>,
        condition: AppendCondition,
    ) -> Result<Vec<StoredEvent>, CoreError> {
        self.append_impl(events, Some(condition), Some("REPEATABLE READ"))
            .await
            .map_err(Into::into)
    }

    #[tracing::instrument(skip(self, events, condition), fields(batch_size = events.len()))]
    async fn append_if_isolated(
        &self,
        events: Vec<InputEvent>,
        condition: AppendCondition,
    ) -> Result<Vec<StoredEvent>, CoreError> {
        self.append_impl(events, Some(condition), Some("SERIALIZABLE"))
            .await
            .map_err(Into::into)
    }

    #[tracing::instrument(skip(self, query))]
    async fn query(
        &self,
        query: &Query,
        after: Option<Cursor>,
    ) -> Result<Vec<StoredEvent>, CoreError> {
        let fut = stream::stream_events(&self.pool, query, after).try_collect();
        tokio::time::timeout(self.config.query_timeout, fut).await?
    }

    fn query_stream<'a>(
        &'a self,
        query: &'a Query,
        after: Option<Cursor>,
    ) -> BoxStream<'a, Result<StoredEvent, CoreError>> {
        let timeout = self.config.query_timeout;
        let mut inner = stream::stream_events(&self.pool, query, after);
        async_stream::stream! {
            loop {
                let deadline = tokio::time::Instant::now() + timeout;
                match tokio::time::timeout_at(deadline, inner.next()).await {
                    Err(_) => {
                        yield Err(CoreError::from(ResourceError::Timeout));
                        return;
                    }
                    Ok(None) => return,
                    Ok(Some(item)) => yield item,
                }
            }
        }
        .boxed()
    }
}
