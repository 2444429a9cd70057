//! Repository/snapshot/view publisher (§4.8): materializes a logical
//! repository onto disk as hardlinks into the pool plus regenerated
//! metadata, dispatched per format. Grounded on `original_source`'s
//! `plugins/*/publisher.py` mirror/filtered split (REDESIGN FLAGS: one
//! `Publisher`-shaped entry point instead of a class hierarchy).

pub mod apk;
pub mod deb;
pub mod helm;
pub mod rpm;
pub mod view;

use std::path::Path;

use sqlx::PgPool;

use crate::{
    catalog::{
        self,
        model::{ContentItem, RepositoryFile, Snapshot},
    },
    config::{RepositoryConfig, RepositoryType},
    error::{ChantalError, Result},
    pool::Pool,
};

fn basename(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

/// The exact set of rows a publish pass materializes, drawn either from a
/// repository's live state or from a frozen snapshot.
pub(crate) struct PublishSet {
    pub items: Vec<ContentItem>,
    pub files: Vec<RepositoryFile>,
}

async fn live_set(db: &PgPool, repository_id: i64) -> Result<PublishSet> {
    Ok(PublishSet {
        items: catalog::list_content_items_for_repository(db, repository_id).await?,
        files: catalog::list_repository_files_for_repository(db, repository_id).await?,
    })
}

async fn snapshot_set(db: &PgPool, snapshot_id: i64) -> Result<PublishSet> {
    Ok(PublishSet {
        items: catalog::list_content_items_for_snapshot(db, snapshot_id).await?,
        files: catalog::list_repository_files_for_snapshot(db, snapshot_id).await?,
    })
}

async fn dispatch(pool: &Pool, repo_cfg: &RepositoryConfig, set: &PublishSet, target: &Path) -> Result<()> {
    match repo_cfg.repo_type {
        RepositoryType::Rpm => rpm::publish(pool, &set.items, &set.files, repo_cfg.mode, target).await,
        RepositoryType::Apt => deb::publish(pool, repo_cfg, &set.items, &set.files, repo_cfg.mode, target).await,
        RepositoryType::Helm => helm::publish(pool, repo_cfg, &set.items, &set.files, repo_cfg.mode, target).await,
        RepositoryType::Apk => apk::publish(pool, repo_cfg, &set.items, &set.files, repo_cfg.mode, target).await,
    }
}

/// Publishes a repository's current (unsnapshotted) state to `target` — a
/// live republish of whatever the last sync left in the catalog.
pub async fn publish_repository(db: &PgPool, pool: &Pool, repo_cfg: &RepositoryConfig, target: &Path) -> Result<()> {
    let repository = catalog::find_repository_by_repo_id(db, &repo_cfg.id)
        .await?
        .ok_or_else(|| ChantalError::Config(format!("repository '{}' has never been synced", repo_cfg.id)))?;
    let set = live_set(db, repository.id).await?;
    dispatch(pool, repo_cfg, &set, target).await
}

/// Publishes one frozen Snapshot to `target`, marking it published with the
/// target's path on success (§4.7/§4.8).
pub async fn publish_snapshot(
    db: &PgPool,
    pool: &Pool,
    repo_cfg: &RepositoryConfig,
    snapshot: &Snapshot,
    target: &Path,
) -> Result<()> {
    let set = snapshot_set(db, snapshot.id).await?;
    dispatch(pool, repo_cfg, &set, target).await?;
    catalog::mark_snapshot_published(db, snapshot.id, &target.to_string_lossy()).await?;
    Ok(())
}

/// Recursively removes a previously published target directory and, if it
/// backed a Snapshot, marks that Snapshot unpublished (§4.8.6). Pool
/// contents are untouched; only GC reclaims bytes.
pub async fn unpublish(db: &PgPool, snapshot_id: Option<i64>, target: &Path) -> Result<()> {
    if tokio::fs::try_exists(target).await.unwrap_or(false) {
        tokio::fs::remove_dir_all(target).await?;
    }
    if let Some(snapshot_id) = snapshot_id {
        catalog::mark_snapshot_unpublished(db, snapshot_id).await?;
    }
    Ok(())
}
