//! Snapshot/view orchestration (§4.7). Thin wrapper over `catalog::mod`'s
//! transaction-scoped primitives, plus the diff and view-snapshot
//! composition operations those primitives don't do on their own.

use std::collections::{HashMap, HashSet};

use sqlx::PgPool;

use crate::{
    catalog::{self, model::Snapshot},
    error::{ChantalError, Result},
};

/// Added/removed/changed-version content between two snapshots of (usually)
/// the same repository, keyed by package name (§4.7 scenario 5).
#[derive(Debug, Default)]
pub struct SnapshotDiff {
    pub added: Vec<(String, String)>,
    pub removed: Vec<(String, String)>,
    pub updated: Vec<(String, String, String)>,
}

pub async fn create_snapshot(
    pool: &PgPool,
    repository_id: i64,
    name: &str,
    description: Option<&str>,
) -> Result<Snapshot> {
    catalog::create_snapshot(pool, repository_id, name, description).await
}

pub async fn list_snapshots(pool: &PgPool, repository_id: i64) -> Result<Vec<Snapshot>> {
    catalog::list_snapshots_for_repository(pool, repository_id).await
}

pub async fn copy_snapshot(pool: &PgPool, source_id: i64, target_name: &str) -> Result<Snapshot> {
    catalog::copy_snapshot(pool, source_id, target_name).await
}

/// Deletes a snapshot (§4.7 `delete`). A published snapshot is refused
/// unless `force`, in which case its published directory is removed before
/// the relationship rows are dropped; pool bytes are never touched here,
/// GC is the only authority for reclaiming those.
pub async fn delete_snapshot(pool: &PgPool, snapshot_id: i64, force: bool) -> Result<()> {
    let snapshot = catalog::get_snapshot(pool, snapshot_id).await?;
    if snapshot.is_published && !force {
        return Err(ChantalError::Config(format!(
            "snapshot '{}' (id {}) is published; pass force to delete it anyway",
            snapshot.name, snapshot.id
        )));
    }
    if let Some(published_path) = &snapshot.published_path {
        if tokio::fs::try_exists(published_path).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(published_path).await?;
        }
    }
    catalog::delete_snapshot(pool, snapshot_id).await
}

/// Compares two snapshots' content-item membership by `(name, version)`,
/// reporting packages present in only one side and packages whose version
/// changed between the two.
pub async fn diff(pool: &PgPool, snapshot_a: i64, snapshot_b: i64) -> Result<SnapshotDiff> {
    let items_a = catalog::list_content_items_for_snapshot(pool, snapshot_a).await?;
    let items_b = catalog::list_content_items_for_snapshot(pool, snapshot_b).await?;

    let mut latest_a: HashMap<String, String> = HashMap::new();
    for item in &items_a {
        latest_a.insert(item.name.clone(), item.version.clone());
    }
    let mut latest_b: HashMap<String, String> = HashMap::new();
    for item in &items_b {
        latest_b.insert(item.name.clone(), item.version.clone());
    }

    let names_a: HashSet<&String> = latest_a.keys().collect();
    let names_b: HashSet<&String> = latest_b.keys().collect();

    let mut diff = SnapshotDiff::default();
    for name in names_b.difference(&names_a) {
        diff.added.push(((*name).clone(), latest_b[*name].clone()));
    }
    for name in names_a.difference(&names_b) {
        diff.removed.push(((*name).clone(), latest_a[*name].clone()));
    }
    for name in names_a.intersection(&names_b) {
        let version_a = &latest_a[*name];
        let version_b = &latest_b[*name];
        if version_a != version_b {
            diff.updated.push(((*name).clone(), version_a.clone(), version_b.clone()));
        }
    }

    Ok(diff)
}

/// Creates a per-repository snapshot for every member of a view and records
/// a `ViewSnapshot` grouping them, so a view's published state is pinned to
/// one consistent set of underlying snapshots (§4.7 view snapshots).
pub async fn create_view_snapshot(pool: &PgPool, view_id: &str, name: &str) -> Result<i64> {
    let view = catalog::get_or_create_view(pool, view_id).await?;
    let repository_ids = catalog::list_view_repository_ids(pool, view.id).await?;

    let mut member_snapshot_ids = Vec::new();
    for repository_id in repository_ids {
        let snapshot_name = format!("{name}-{repository_id}");
        let snapshot = catalog::create_snapshot(pool, repository_id, &snapshot_name, None).await?;
        member_snapshot_ids.push(snapshot.id);
    }

    let view_snapshot = catalog::create_view_snapshot(pool, view.id, name, &member_snapshot_ids).await?;

    Ok(view_snapshot.id)
}
