//! Standalone access to the `audit_entries` table.

use crate::rows::database;
use request_desk_core::audit::{AuditEntry, AuditLog};
use request_desk_core::ids::RequestId;
use request_desk_core::repository::RepositoryFuture;
use sqlx::PgPool;

/// `PostgreSQL`-backed [`AuditLog`].
///
/// Entries reference their request, so `append` only succeeds for requests that exist. The
/// repository writes entries inside its own transactions; this type is for reads and for callers
/// that record entries outside a request mutation.
#[derive(Debug, Clone)]
pub struct PostgresAuditLog {
    pool: PgPool,
}

impl PostgresAuditLog {
    /// Use `pool` for all reads and writes.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl AuditLog for PostgresAuditLog {
    fn append(&self, entry: AuditEntry) -> RepositoryFuture<'_, ()> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(database)?;
            crate::insert_entry(&mut tx, &entry).await?;
            tx.commit().await.map_err(database)?;
            Ok(())
        })
    }

    fn history(&self, request_id: RequestId) -> RepositoryFuture<'_, Vec<AuditEntry>> {
        Box::pin(crate::history(&self.pool, request_id))
    }
}
