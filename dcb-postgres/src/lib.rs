//! PostgreSQL backend for [`dcb_core`]: implements `EventStore` against a
//! `sqlx::PgPool`, translating DCB queries and append conditions into
//! parameterized SQL, with an advisory-lock fast path for tags carrying the
//! reserved `lock` prefix.

mod error;
mod event_store;
mod migrator;

pub use error::Error;
pub use event_store::PgEventStore;
pub use migrator::Migrator;
