//! Relational catalog. Generalizes the teacher's `db.rs` (one APT-shaped
//! table, `sqlx::query!`/`query_as!` compile-time macros) into the spec's
//! five-entity schema using *runtime* `sqlx::query`/`query_as` calls, since
//! this crate is never built against a live `DATABASE_URL` (see DESIGN.md
//! Open Question #1).

pub mod migrate;
pub mod model;

use sqlx::{types::Json, PgPool, Row};
use time::OffsetDateTime;

use crate::error::{ChantalError, Result};
use model::{
    ContentItem, ContentMetadata, FileMetadata, Repository, RepositoryFile, Snapshot, View,
    ViewSnapshot,
};

pub async fn connect(url: &str) -> Result<PgPool> {
    PgPool::connect(url).await.map_err(ChantalError::Catalog)
}

pub async fn get_or_create_repository(
    pool: &PgPool,
    repo_id: &str,
    name: &str,
    repo_type: &str,
    feed: &str,
    mode: &str,
) -> Result<Repository> {
    if let Some(existing) = sqlx::query_as::<_, Repository>(
        "SELECT id, repo_id, name, repo_type, feed, enabled, mode, last_sync_at \
         FROM repositories WHERE repo_id = $1",
    )
    .bind(repo_id)
    .fetch_optional(pool)
    .await?
    {
        return Ok(existing);
    }

    let row = sqlx::query_as::<_, Repository>(
        "INSERT INTO repositories (repo_id, name, repo_type, feed, enabled, mode) \
         VALUES ($1, $2, $3, $4, true, $5) \
         RETURNING id, repo_id, name, repo_type, feed, enabled, mode, last_sync_at",
    )
    .bind(repo_id)
    .bind(name)
    .bind(repo_type)
    .bind(feed)
    .bind(mode)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn touch_last_sync(pool: &PgPool, repository_id: i64) -> Result<()> {
    sqlx::query("UPDATE repositories SET last_sync_at = now() WHERE id = $1")
        .bind(repository_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn find_content_item_by_sha256(
    pool: &PgPool,
    sha256: &str,
) -> Result<Option<ContentItem>> {
    let item = sqlx::query_as::<_, ContentItem>(
        "SELECT id, content_type, name, version, sha256, size_bytes, filename, pool_path, \
         content_metadata, created_at FROM content_items WHERE sha256 = $1",
    )
    .bind(sha256)
    .fetch_optional(pool)
    .await?;

    Ok(item)
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_content_item(
    pool: &PgPool,
    content_type: &str,
    name: &str,
    version: &str,
    sha256: &str,
    size_bytes: i64,
    filename: &str,
    pool_path: &str,
    metadata: &ContentMetadata,
) -> Result<ContentItem> {
    let item = sqlx::query_as::<_, ContentItem>(
        "INSERT INTO content_items \
         (content_type, name, version, sha256, size_bytes, filename, pool_path, content_metadata) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING id, content_type, name, version, sha256, size_bytes, filename, pool_path, \
         content_metadata, created_at",
    )
    .bind(content_type)
    .bind(name)
    .bind(version)
    .bind(sha256)
    .bind(size_bytes)
    .bind(filename)
    .bind(pool_path)
    .bind(Json(metadata))
    .fetch_one(pool)
    .await?;

    Ok(item)
}

pub async fn link_content_item_to_repository(
    pool: &PgPool,
    content_item_id: i64,
    repository_id: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO repository_content_items (repository_id, content_item_id) \
         VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(repository_id)
    .bind(content_item_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn is_linked_to_repository(
    pool: &PgPool,
    content_item_id: i64,
    repository_id: i64,
) -> Result<bool> {
    let row = sqlx::query(
        "SELECT 1 FROM repository_content_items WHERE repository_id = $1 AND content_item_id = $2",
    )
    .bind(repository_id)
    .bind(content_item_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}

pub async fn find_repository_file_by_sha256(
    pool: &PgPool,
    sha256: &str,
) -> Result<Option<RepositoryFile>> {
    let item = sqlx::query_as::<_, RepositoryFile>(
        "SELECT id, file_category, file_type, sha256, pool_path, original_path, size_bytes, \
         file_metadata, created_at FROM repository_files WHERE sha256 = $1",
    )
    .bind(sha256)
    .fetch_optional(pool)
    .await?;

    Ok(item)
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_repository_file(
    pool: &PgPool,
    file_category: &str,
    file_type: &str,
    sha256: &str,
    pool_path: &str,
    original_path: &str,
    size_bytes: i64,
    metadata: &FileMetadata,
) -> Result<RepositoryFile> {
    let item = sqlx::query_as::<_, RepositoryFile>(
        "INSERT INTO repository_files \
         (file_category, file_type, sha256, pool_path, original_path, size_bytes, file_metadata) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING id, file_category, file_type, sha256, pool_path, original_path, size_bytes, \
         file_metadata, created_at",
    )
    .bind(file_category)
    .bind(file_type)
    .bind(sha256)
    .bind(pool_path)
    .bind(original_path)
    .bind(size_bytes)
    .bind(Json(metadata))
    .fetch_one(pool)
    .await?;

    Ok(item)
}

pub async fn link_repository_file_to_repository(
    pool: &PgPool,
    repository_file_id: i64,
    repository_id: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO repository_files_link (repository_id, repository_file_id) \
         VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(repository_id)
    .bind(repository_file_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn unlink_content_item_from_repository(
    pool: &PgPool,
    content_item_id: i64,
    repository_id: i64,
) -> Result<()> {
    sqlx::query(
        "DELETE FROM repository_content_items WHERE repository_id = $1 AND content_item_id = $2",
    )
    .bind(repository_id)
    .bind(content_item_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn unlink_repository_file_from_repository(
    pool: &PgPool,
    repository_file_id: i64,
    repository_id: i64,
) -> Result<()> {
    sqlx::query(
        "DELETE FROM repository_files_link WHERE repository_id = $1 AND repository_file_id = $2",
    )
    .bind(repository_id)
    .bind(repository_file_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn list_content_items_for_repository(
    pool: &PgPool,
    repository_id: i64,
) -> Result<Vec<ContentItem>> {
    let items = sqlx::query_as::<_, ContentItem>(
        "SELECT ci.id, ci.content_type, ci.name, ci.version, ci.sha256, ci.size_bytes, \
         ci.filename, ci.pool_path, ci.content_metadata, ci.created_at \
         FROM content_items ci \
         INNER JOIN repository_content_items link ON link.content_item_id = ci.id \
         WHERE link.repository_id = $1",
    )
    .bind(repository_id)
    .fetch_all(pool)
    .await?;

    Ok(items)
}

pub async fn list_repository_files_for_repository(
    pool: &PgPool,
    repository_id: i64,
) -> Result<Vec<RepositoryFile>> {
    let items = sqlx::query_as::<_, RepositoryFile>(
        "SELECT rf.id, rf.file_category, rf.file_type, rf.sha256, rf.pool_path, \
         rf.original_path, rf.size_bytes, rf.file_metadata, rf.created_at \
         FROM repository_files rf \
         INNER JOIN repository_files_link link ON link.repository_file_id = rf.id \
         WHERE link.repository_id = $1",
    )
    .bind(repository_id)
    .fetch_all(pool)
    .await?;

    Ok(items)
}

pub async fn open_sync_history(pool: &PgPool, repository_id: i64) -> Result<i64> {
    let id: i64 = sqlx::query(
        "INSERT INTO sync_history (repository_id, started_at, status) \
         VALUES ($1, now(), 'running') RETURNING id",
    )
    .bind(repository_id)
    .fetch_one(pool)
    .await?
    .try_get("id")?;

    Ok(id)
}

#[allow(clippy::too_many_arguments)]
pub async fn close_sync_history(
    pool: &PgPool,
    id: i64,
    status: &str,
    packages_added: i64,
    packages_removed: i64,
    packages_updated: i64,
    bytes_downloaded: i64,
    error_message: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE sync_history SET completed_at = now(), status = $2, packages_added = $3, \
         packages_removed = $4, packages_updated = $5, bytes_downloaded = $6, error_message = $7 \
         WHERE id = $1",
    )
    .bind(id)
    .bind(status)
    .bind(packages_added)
    .bind(packages_removed)
    .bind(packages_updated)
    .bind(bytes_downloaded)
    .bind(error_message)
    .execute(pool)
    .await?;

    Ok(())
}

/// Creates a frozen Snapshot: the relationship rows are copied inside a
/// single transaction so the capture is atomic with respect to concurrent
/// syncs of the same repository (§4.7).
pub async fn create_snapshot(
    pool: &PgPool,
    repository_id: i64,
    name: &str,
    description: Option<&str>,
) -> Result<Snapshot> {
    let mut tx = pool.begin().await?;

    let existing: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM snapshots WHERE repository_id = $1 AND name = $2",
    )
    .bind(repository_id)
    .bind(name)
    .fetch_optional(&mut *tx)
    .await?;
    if existing.is_some() {
        return Err(ChantalError::Integrity(format!(
            "snapshot '{name}' already exists for repository {repository_id}"
        )));
    }

    let content_items: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT content_item_id, (SELECT size_bytes FROM content_items WHERE id = content_item_id) \
         FROM repository_content_items WHERE repository_id = $1",
    )
    .bind(repository_id)
    .fetch_all(&mut *tx)
    .await?;
    let repository_files: Vec<i64> = sqlx::query_as::<_, (i64,)>(
        "SELECT repository_file_id FROM repository_files_link WHERE repository_id = $1",
    )
    .bind(repository_id)
    .fetch_all(&mut *tx)
    .await?
    .into_iter()
    .map(|(id,)| id)
    .collect();

    let total_size: i64 = content_items.iter().map(|(_, size)| *size).sum();
    let package_count = content_items.len() as i64;

    let snapshot = sqlx::query_as::<_, Snapshot>(
        "INSERT INTO snapshots \
         (repository_id, name, description, package_count, total_size_bytes, is_published) \
         VALUES ($1, $2, $3, $4, $5, false) \
         RETURNING id, repository_id, name, description, package_count, total_size_bytes, \
         is_published, published_path, created_at",
    )
    .bind(repository_id)
    .bind(name)
    .bind(description)
    .bind(package_count)
    .bind(total_size)
    .fetch_one(&mut *tx)
    .await?;

    for (content_item_id, _) in &content_items {
        sqlx::query(
            "INSERT INTO snapshot_content_items (snapshot_id, content_item_id) VALUES ($1, $2)",
        )
        .bind(snapshot.id)
        .bind(content_item_id)
        .execute(&mut *tx)
        .await?;
    }
    for repository_file_id in &repository_files {
        sqlx::query(
            "INSERT INTO snapshot_repository_files (snapshot_id, repository_file_id) \
             VALUES ($1, $2)",
        )
        .bind(snapshot.id)
        .bind(repository_file_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(snapshot)
}

pub async fn list_content_items_for_snapshot(
    pool: &PgPool,
    snapshot_id: i64,
) -> Result<Vec<ContentItem>> {
    let items = sqlx::query_as::<_, ContentItem>(
        "SELECT ci.id, ci.content_type, ci.name, ci.version, ci.sha256, ci.size_bytes, \
         ci.filename, ci.pool_path, ci.content_metadata, ci.created_at \
         FROM content_items ci \
         INNER JOIN snapshot_content_items link ON link.content_item_id = ci.id \
         WHERE link.snapshot_id = $1",
    )
    .bind(snapshot_id)
    .fetch_all(pool)
    .await?;

    Ok(items)
}

pub async fn list_repository_ids(pool: &PgPool) -> Result<Vec<(i64, String)>> {
    let rows: Vec<(i64, String)> =
        sqlx::query_as("SELECT id, repo_id FROM repositories").fetch_all(pool).await?;

    Ok(rows)
}

pub async fn delete_repository(pool: &PgPool, repository_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM repositories WHERE id = $1")
        .bind(repository_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// All known pool-referencing sha256 values, used by GC's orphan scan.
pub async fn all_known_sha256(pool: &PgPool) -> Result<std::collections::HashSet<String>> {
    let mut known = std::collections::HashSet::new();
    let content: Vec<(String,)> = sqlx::query_as("SELECT sha256 FROM content_items").fetch_all(pool).await?;
    known.extend(content.into_iter().map(|(s,)| s));
    let files: Vec<(String,)> = sqlx::query_as("SELECT sha256 FROM repository_files").fetch_all(pool).await?;
    known.extend(files.into_iter().map(|(s,)| s));

    Ok(known)
}

/// Every ContentItem in the catalog, regardless of which repository (if any)
/// still links to it; used by `pool verify`/`pool missing` (§4.9).
pub async fn list_all_content_items(pool: &PgPool) -> Result<Vec<ContentItem>> {
    let items = sqlx::query_as::<_, ContentItem>(
        "SELECT id, content_type, name, version, sha256, size_bytes, filename, pool_path, \
         content_metadata, created_at FROM content_items",
    )
    .fetch_all(pool)
    .await?;

    Ok(items)
}

/// Every RepositoryFile in the catalog; used by `pool verify`/`pool missing`
/// (§4.9).
pub async fn list_all_repository_files(pool: &PgPool) -> Result<Vec<RepositoryFile>> {
    let items = sqlx::query_as::<_, RepositoryFile>(
        "SELECT id, file_category, file_type, sha256, pool_path, original_path, size_bytes, \
         file_metadata, created_at FROM repository_files",
    )
    .fetch_all(pool)
    .await?;

    Ok(items)
}

/// Deletes a ContentItem row outright (its repository/snapshot links cascade),
/// used by `pool cleanup --missing` once the underlying pool object is
/// confirmed gone (§4.9).
pub async fn delete_content_item(pool: &PgPool, content_item_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM content_items WHERE id = $1")
        .bind(content_item_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Deletes a RepositoryFile row outright, used by `pool cleanup --missing`.
pub async fn delete_repository_file(pool: &PgPool, repository_file_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM repository_files WHERE id = $1")
        .bind(repository_file_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

pub async fn find_repository_by_repo_id(pool: &PgPool, repo_id: &str) -> Result<Option<Repository>> {
    let repo = sqlx::query_as::<_, Repository>(
        "SELECT id, repo_id, name, repo_type, feed, enabled, mode, last_sync_at \
         FROM repositories WHERE repo_id = $1",
    )
    .bind(repo_id)
    .fetch_optional(pool)
    .await?;

    Ok(repo)
}

pub async fn get_repository(pool: &PgPool, repository_id: i64) -> Result<Repository> {
    let repo = sqlx::query_as::<_, Repository>(
        "SELECT id, repo_id, name, repo_type, feed, enabled, mode, last_sync_at \
         FROM repositories WHERE id = $1",
    )
    .bind(repository_id)
    .fetch_one(pool)
    .await?;

    Ok(repo)
}

pub async fn list_all_repositories(pool: &PgPool) -> Result<Vec<Repository>> {
    let repos = sqlx::query_as::<_, Repository>(
        "SELECT id, repo_id, name, repo_type, feed, enabled, mode, last_sync_at FROM repositories",
    )
    .fetch_all(pool)
    .await?;

    Ok(repos)
}

pub async fn list_repository_files_for_snapshot(
    pool: &PgPool,
    snapshot_id: i64,
) -> Result<Vec<RepositoryFile>> {
    let items = sqlx::query_as::<_, RepositoryFile>(
        "SELECT rf.id, rf.file_category, rf.file_type, rf.sha256, rf.pool_path, \
         rf.original_path, rf.size_bytes, rf.file_metadata, rf.created_at \
         FROM repository_files rf \
         INNER JOIN snapshot_repository_files link ON link.repository_file_id = rf.id \
         WHERE link.snapshot_id = $1",
    )
    .bind(snapshot_id)
    .fetch_all(pool)
    .await?;

    Ok(items)
}

pub async fn find_snapshot(
    pool: &PgPool,
    repository_id: i64,
    name: &str,
) -> Result<Option<Snapshot>> {
    let snap = sqlx::query_as::<_, Snapshot>(
        "SELECT id, repository_id, name, description, package_count, total_size_bytes, \
         is_published, published_path, created_at \
         FROM snapshots WHERE repository_id = $1 AND name = $2",
    )
    .bind(repository_id)
    .bind(name)
    .fetch_optional(pool)
    .await?;

    Ok(snap)
}

pub async fn get_snapshot(pool: &PgPool, snapshot_id: i64) -> Result<Snapshot> {
    let snap = sqlx::query_as::<_, Snapshot>(
        "SELECT id, repository_id, name, description, package_count, total_size_bytes, \
         is_published, published_path, created_at \
         FROM snapshots WHERE id = $1",
    )
    .bind(snapshot_id)
    .fetch_one(pool)
    .await?;

    Ok(snap)
}

pub async fn list_snapshots_for_repository(
    pool: &PgPool,
    repository_id: i64,
) -> Result<Vec<Snapshot>> {
    let snaps = sqlx::query_as::<_, Snapshot>(
        "SELECT id, repository_id, name, description, package_count, total_size_bytes, \
         is_published, published_path, created_at \
         FROM snapshots WHERE repository_id = $1 ORDER BY created_at",
    )
    .bind(repository_id)
    .fetch_all(pool)
    .await?;

    Ok(snaps)
}

/// Zero-I/O copy-on-name: new Snapshot row, same content/file relationships
/// (§4.7 `copy`).
pub async fn copy_snapshot(pool: &PgPool, source_id: i64, target_name: &str) -> Result<Snapshot> {
    let mut tx = pool.begin().await?;
    let source = sqlx::query_as::<_, Snapshot>(
        "SELECT id, repository_id, name, description, package_count, total_size_bytes, \
         is_published, published_path, created_at FROM snapshots WHERE id = $1",
    )
    .bind(source_id)
    .fetch_one(&mut *tx)
    .await?;

    let target = sqlx::query_as::<_, Snapshot>(
        "INSERT INTO snapshots \
         (repository_id, name, description, package_count, total_size_bytes, is_published) \
         VALUES ($1, $2, $3, $4, $5, false) \
         RETURNING id, repository_id, name, description, package_count, total_size_bytes, \
         is_published, published_path, created_at",
    )
    .bind(source.repository_id)
    .bind(target_name)
    .bind(&source.description)
    .bind(source.package_count)
    .bind(source.total_size_bytes)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO snapshot_content_items (snapshot_id, content_item_id) \
         SELECT $1, content_item_id FROM snapshot_content_items WHERE snapshot_id = $2",
    )
    .bind(target.id)
    .bind(source_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        "INSERT INTO snapshot_repository_files (snapshot_id, repository_file_id) \
         SELECT $1, repository_file_id FROM snapshot_repository_files WHERE snapshot_id = $2",
    )
    .bind(target.id)
    .bind(source_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(target)
}

pub async fn mark_snapshot_published(
    pool: &PgPool,
    snapshot_id: i64,
    published_path: &str,
) -> Result<()> {
    sqlx::query("UPDATE snapshots SET is_published = true, published_path = $2 WHERE id = $1")
        .bind(snapshot_id)
        .bind(published_path)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn mark_snapshot_unpublished(pool: &PgPool, snapshot_id: i64) -> Result<()> {
    sqlx::query("UPDATE snapshots SET is_published = false, published_path = NULL WHERE id = $1")
        .bind(snapshot_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Drops a snapshot's relationship rows. The underlying ContentItem/
/// RepositoryFile rows are left untouched — the pool GC is the only
/// authority for byte removal (§4.7 `delete`).
pub async fn delete_snapshot(pool: &PgPool, snapshot_id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM snapshot_content_items WHERE snapshot_id = $1")
        .bind(snapshot_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM snapshot_repository_files WHERE snapshot_id = $1")
        .bind(snapshot_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM snapshots WHERE id = $1")
        .bind(snapshot_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(())
}

pub async fn get_or_create_view(pool: &PgPool, view_id: &str) -> Result<View> {
    if let Some(existing) = sqlx::query_as::<_, View>("SELECT id, view_id FROM views WHERE view_id = $1")
        .bind(view_id)
        .fetch_optional(pool)
        .await?
    {
        return Ok(existing);
    }
    let view = sqlx::query_as::<_, View>(
        "INSERT INTO views (view_id) VALUES ($1) RETURNING id, view_id",
    )
    .bind(view_id)
    .fetch_one(pool)
    .await?;

    Ok(view)
}

pub async fn set_view_repositories(
    pool: &PgPool,
    view_id: i64,
    ordered_repository_ids: &[i64],
) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM view_repositories WHERE view_id = $1")
        .bind(view_id)
        .execute(&mut *tx)
        .await?;
    for (idx, repository_id) in ordered_repository_ids.iter().enumerate() {
        sqlx::query(
            "INSERT INTO view_repositories (view_id, repository_id, order_index) \
             VALUES ($1, $2, $3)",
        )
        .bind(view_id)
        .bind(repository_id)
        .bind(idx as i32)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    Ok(())
}

/// Repository ids belonging to a view, in configured order.
pub async fn list_view_repository_ids(pool: &PgPool, view_id: i64) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT repository_id FROM view_repositories WHERE view_id = $1 ORDER BY order_index",
    )
    .bind(view_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn create_view_snapshot(
    pool: &PgPool,
    view_id: i64,
    name: &str,
    member_snapshot_ids: &[i64],
) -> Result<ViewSnapshot> {
    let mut tx = pool.begin().await?;
    let view_snapshot = sqlx::query_as::<_, ViewSnapshot>(
        "INSERT INTO view_snapshots (view_id, name) VALUES ($1, $2) \
         RETURNING id, view_id, name, created_at",
    )
    .bind(view_id)
    .bind(name)
    .fetch_one(&mut *tx)
    .await?;
    for snapshot_id in member_snapshot_ids {
        sqlx::query(
            "INSERT INTO view_snapshot_members (view_snapshot_id, snapshot_id) VALUES ($1, $2)",
        )
        .bind(view_snapshot.id)
        .bind(snapshot_id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    Ok(view_snapshot)
}

pub async fn list_view_snapshot_member_ids(pool: &PgPool, view_snapshot_id: i64) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT snapshot_id FROM view_snapshot_members WHERE view_snapshot_id = $1",
    )
    .bind(view_snapshot_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Repositories that exist in the catalog but are absent from the current
/// config (§4.9 `db orphaned`).
pub async fn find_orphan_repositories(
    pool: &PgPool,
    configured_repo_ids: &std::collections::HashSet<String>,
) -> Result<Vec<Repository>> {
    let all = list_all_repositories(pool).await?;

    Ok(all
        .into_iter()
        .filter(|r| !configured_repo_ids.contains(&r.repo_id))
        .collect())
}
