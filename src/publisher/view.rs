//! View publish (§4.8.5): combines every member repository's content with
//! **no cross-repository deduplication** and delegates to the owning
//! format's lower-level publish routine for materialization, rather than
//! re-implementing per-format layout here.
//!
//! Path-determining options that live on `RepositoryConfig` rather than
//! `ContentItem`/`RepositoryFile` (APT's `distribution`, APK's
//! `branch`/`repository`/`architecture`, Helm's `publish.base_url`) aren't
//! modeled per-repository at the view level (`ViewConfig` only names member
//! repository ids). This crate takes the first member's values for those,
//! since §4.8.5's "identical type" constraint doesn't extend to identical
//! sub-options and the spec leaves the split unresolved.

use std::path::Path;

use sqlx::PgPool;

use crate::{
    catalog,
    config::{GlobalConfig, RepositoryConfig, ViewConfig},
    error::{ChantalError, Result},
    pool::Pool,
};

use super::{dispatch, PublishSet};

fn member_config<'a>(global: &'a GlobalConfig, repo_id: &str) -> Result<&'a RepositoryConfig> {
    global
        .repositories
        .iter()
        .find(|r| r.id == repo_id)
        .ok_or_else(|| ChantalError::Config(format!("view references unknown repository '{repo_id}'")))
}

/// Publishes a view from every member repository's current (unsnapshotted)
/// catalog state.
pub async fn publish_view(db: &PgPool, pool: &Pool, global: &GlobalConfig, view_cfg: &ViewConfig, target: &Path) -> Result<()> {
    let mut combined = PublishSet { items: Vec::new(), files: Vec::new() };
    let mut member_configs = Vec::new();

    for repo_id in &view_cfg.repositories {
        let repo_cfg = member_config(global, repo_id)?;
        member_configs.push(repo_cfg);
        let Some(repository) = catalog::find_repository_by_repo_id(db, repo_id).await? else {
            continue;
        };
        combined.items.extend(catalog::list_content_items_for_repository(db, repository.id).await?);
        combined.files.extend(catalog::list_repository_files_for_repository(db, repository.id).await?);
    }

    let Some(leader) = member_configs.first() else {
        return Err(ChantalError::Config(format!("view '{}' has no members", view_cfg.id)));
    };
    dispatch(pool, leader, &combined, target).await
}

/// Publishes a view from a previously captured `ViewSnapshot`'s member
/// snapshots.
pub async fn publish_view_snapshot(
    db: &PgPool,
    pool: &Pool,
    global: &GlobalConfig,
    view_cfg: &ViewConfig,
    member_snapshot_ids: &[i64],
    target: &Path,
) -> Result<()> {
    let mut combined = PublishSet { items: Vec::new(), files: Vec::new() };
    let mut member_configs = Vec::new();

    for &snapshot_id in member_snapshot_ids {
        let snapshot = catalog::get_snapshot(db, snapshot_id).await?;
        let repository = catalog::get_repository(db, snapshot.repository_id).await?;
        let repo_cfg = member_config(global, &repository.repo_id)?;
        member_configs.push(repo_cfg);
        combined.items.extend(catalog::list_content_items_for_snapshot(db, snapshot_id).await?);
        combined.files.extend(catalog::list_repository_files_for_snapshot(db, snapshot_id).await?);
    }

    let Some(leader) = member_configs.first() else {
        return Err(ChantalError::Config(format!("view '{}' has no member snapshots", view_cfg.id)));
    };
    dispatch(pool, leader, &combined, target).await
}
