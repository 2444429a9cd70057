//! Schema migration runner. Same `sqlx::migrate!()` mechanism as the
//! teacher's `db.rs::run_migrate`, pointed at this crate's own
//! `migrations/` directory instead of p-vector's APT-only schema.

use sqlx::PgPool;

use crate::error::{ChantalError, Result};

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("migrations")
        .run(pool)
        .await
        .map_err(|e| ChantalError::Integrity(format!("migration failed: {e}")))?;

    Ok(())
}

/// Checks whether the catalog schema is at the head revision. Commands that
/// mutate catalog state refuse to run (§7 `SchemaStale`) when it is not.
pub async fn ensure_up_to_date(pool: &PgPool) -> Result<()> {
    let migrator = sqlx::migrate!("migrations");
    let applied: Vec<i64> = sqlx::query_scalar("SELECT version FROM _sqlx_migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .unwrap_or_default();
    let expected: Vec<i64> = migrator.iter().map(|m| m.version).collect();
    if applied.len() < expected.len() {
        return Err(ChantalError::SchemaStale);
    }

    Ok(())
}
