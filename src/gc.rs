//! Integrity checking and garbage collection (§4.9). `pool verify` walks the
//! catalog and recomputes checksums against the objects the pool actually
//! holds; `pool orphaned`/`pool missing`/`pool cleanup` and `db orphaned`/
//! `db cleanup` walk the other direction, from pool or config back to
//! catalog rows. Grounded on the teacher's `gc::run_gc` branch-reconciliation
//! loop (compare known-vs-present, act on the difference), generalized from
//! "known branches vs `pool/` directories" to "known sha256 vs pool objects"
//! and "configured repo ids vs catalog rows".

use std::collections::HashSet;

use log::info;
use sqlx::PgPool;

use crate::{
    catalog::{self, model::Repository},
    error::Result,
    pool::{sha256sum_sync, CleanupReport, Namespace, Pool},
};

/// One catalog row (ContentItem or RepositoryFile) that failed verification,
/// identified generically enough for both kinds to share a report.
#[derive(Debug)]
pub struct VerifyFailure {
    pub kind: &'static str,
    pub id: i64,
    pub sha256: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct VerifyReport {
    pub checked: usize,
    pub failures: Vec<VerifyFailure>,
}

fn verify_one(
    pool: &Pool,
    namespace: Namespace,
    kind: &'static str,
    id: i64,
    sha256: &str,
    filename: &str,
    expected_size: i64,
) -> Option<VerifyFailure> {
    let path = pool.object_path(namespace, sha256, filename);
    let file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) => {
            return Some(VerifyFailure {
                kind,
                id,
                sha256: sha256.to_string(),
                reason: format!("missing at {}: {e}", path.display()),
            })
        }
    };
    let metadata = file.metadata().ok();
    let actual_size = metadata.map(|m| m.len() as i64).unwrap_or(-1);
    let actual_sha256 = match sha256sum_sync(file) {
        Ok(s) => s,
        Err(e) => {
            return Some(VerifyFailure {
                kind,
                id,
                sha256: sha256.to_string(),
                reason: format!("read error: {e}"),
            })
        }
    };
    if actual_sha256 != sha256 {
        return Some(VerifyFailure {
            kind,
            id,
            sha256: sha256.to_string(),
            reason: format!("checksum mismatch: recomputed {actual_sha256}"),
        });
    }
    if actual_size != expected_size {
        return Some(VerifyFailure {
            kind,
            id,
            sha256: sha256.to_string(),
            reason: format!("size mismatch: expected {expected_size}, found {actual_size}"),
        });
    }

    None
}

/// Recomputes sha256 and compares size for every ContentItem/RepositoryFile
/// against the pool object its row claims (§4.9 `pool verify`). Blocking file
/// I/O, so callers on the async runtime should run this inside
/// `spawn_blocking`.
pub async fn verify(db: &PgPool, pool: &Pool) -> Result<VerifyReport> {
    let items = catalog::list_all_content_items(db).await?;
    let files = catalog::list_all_repository_files(db).await?;
    let mut report = VerifyReport::default();

    for item in &items {
        report.checked += 1;
        if let Some(failure) = verify_one(pool, Namespace::Content, "content_item", item.id, &item.sha256, &item.filename, item.size_bytes) {
            report.failures.push(failure);
        }
    }
    for file in &files {
        report.checked += 1;
        let filename = file.original_path.rsplit('/').next().unwrap_or(&file.original_path);
        if let Some(failure) = verify_one(pool, Namespace::Files, "repository_file", file.id, &file.sha256, filename, file.size_bytes) {
            report.failures.push(failure);
        }
    }

    Ok(report)
}

/// Pool objects whose sha256 isn't referenced by any catalog row (§4.9 `pool
/// orphaned`). Read-only; use `cleanup` with `--orphaned` to reclaim them.
pub async fn orphaned(db: &PgPool, pool: &Pool) -> Result<Vec<(Namespace, String, std::path::PathBuf, u64)>> {
    let known = catalog::all_known_sha256(db).await?;
    let all = pool.walk_all().await?;

    Ok(all.into_iter().filter(|(_, sha256, _, _)| !known.contains(sha256)).collect())
}

/// A catalog row (ContentItem or RepositoryFile) whose backing pool object is
/// absent, reported by `pool missing` and acted on by `pool cleanup
/// --missing`.
#[derive(Debug)]
pub struct MissingRow {
    pub kind: &'static str,
    pub id: i64,
    pub sha256: String,
}

/// Catalog rows whose pool path does not exist (§4.9 `pool missing`).
pub async fn missing(db: &PgPool, pool: &Pool) -> Result<Vec<MissingRow>> {
    let items = catalog::list_all_content_items(db).await?;
    let files = catalog::list_all_repository_files(db).await?;
    let mut out = Vec::new();

    for item in &items {
        let path = pool.object_path(Namespace::Content, &item.sha256, &item.filename);
        if !path.is_file() {
            out.push(MissingRow { kind: "content_item", id: item.id, sha256: item.sha256.clone() });
        }
    }
    for file in &files {
        let filename = file.original_path.rsplit('/').next().unwrap_or(&file.original_path);
        let path = pool.object_path(Namespace::Files, &file.sha256, filename);
        if !path.is_file() {
            out.push(MissingRow { kind: "repository_file", id: file.id, sha256: file.sha256.clone() });
        }
    }

    Ok(out)
}

#[derive(Debug, Default)]
pub struct PoolCleanupReport {
    pub orphaned: Option<CleanupReport>,
    pub missing_content_items_deleted: usize,
    pub missing_repository_files_deleted: usize,
}

/// Runs `pool cleanup`: orphan-file removal and/or missing-row removal in
/// whichever combination `do_orphaned`/`do_missing` select, honoring
/// `dry_run` the same way the pool's own single-pass orphan sweep does
/// (count without touching disk or the database).
pub async fn cleanup(db: &PgPool, pool: &Pool, do_orphaned: bool, do_missing: bool, dry_run: bool) -> Result<PoolCleanupReport> {
    let mut report = PoolCleanupReport::default();

    if do_orphaned {
        let known = catalog::all_known_sha256(db).await?;
        let result = pool.cleanup_orphaned(|sha256| known.contains(sha256), dry_run).await?;
        info!(
            "pool cleanup --orphaned: {} found, {} deleted, {} bytes reclaimed",
            result.orphaned_found, result.orphaned_deleted, result.bytes_reclaimed
        );
        report.orphaned = Some(result);
    }

    if do_missing {
        let rows = missing(db, pool).await?;
        info!("pool cleanup --missing: {} catalog rows with no backing object", rows.len());
        if !dry_run {
            for row in rows {
                match row.kind {
                    "content_item" => {
                        catalog::delete_content_item(db, row.id).await?;
                        report.missing_content_items_deleted += 1;
                    }
                    _ => {
                        catalog::delete_repository_file(db, row.id).await?;
                        report.missing_repository_files_deleted += 1;
                    }
                }
            }
        }
    }

    Ok(report)
}

/// Repositories present in the catalog but absent from `global`'s configured
/// repository ids (§4.9 `db orphaned`).
pub async fn db_orphaned(db: &PgPool, configured_repo_ids: &HashSet<String>) -> Result<Vec<Repository>> {
    catalog::find_orphan_repositories(db, configured_repo_ids).await
}

/// Deletes every Repository row `db_orphaned` would report (cascading to its
/// SyncHistory/Snapshot rows); ContentItem/RepositoryFile rows and pool bytes
/// are untouched here — `pool cleanup --orphaned` is the only thing that
/// reclaims those (§4.9 `db cleanup --orphaned`).
pub async fn db_cleanup_orphaned(db: &PgPool, configured_repo_ids: &HashSet<String>) -> Result<usize> {
    let orphans = db_orphaned(db, configured_repo_ids).await?;
    for repo in &orphans {
        info!("db cleanup --orphaned: removing repository '{}' (no longer in config)", repo.repo_id);
        catalog::delete_repository(db, repo.id).await?;
    }

    Ok(orphans.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_one_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let pool = Pool::new(dir.path());
        let failure = verify_one(&pool, Namespace::Content, "content_item", 1, &"a".repeat(64), "x.rpm", 10);
        assert!(failure.is_some());
        assert!(failure.unwrap().reason.contains("missing"));
    }
}
