//! Sync pipeline orchestrator (§4.6): per-repository fetch → parse → filter
//! → diff → download → catalog update, dispatched per format. Grounded on
//! `original_source/.../apt/sync.py::sync_repository`'s Release-then-
//! listings-then-packages structure, generalized to RPM/Helm/APK and driven
//! here by one shared `SyncContext` rather than one syncer class per format.

mod apk;
mod deb;
mod helm;
mod rpm;

use std::path::{Path, PathBuf};

use log::info;
use sqlx::PgPool;

use crate::{
    cache::MetadataCache,
    catalog::{self, model::Repository},
    config::{GlobalConfig, RepositoryConfig, RepositoryType},
    downloader::{Downloader, EffectiveConfig},
    error::Result,
    pool::Pool,
};

/// Outcome of one repository's sync pass, folded into `sync_history` by the
/// caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncOutcome {
    pub packages_added: i64,
    pub packages_removed: i64,
    pub packages_updated: i64,
    pub bytes_downloaded: i64,
}

impl SyncOutcome {
    fn merge(&mut self, other: SyncOutcome) {
        self.packages_added += other.packages_added;
        self.packages_removed += other.packages_removed;
        self.packages_updated += other.packages_updated;
        self.bytes_downloaded += other.bytes_downloaded;
    }
}

/// Everything a per-format sync routine needs, bundled so `rpm`/`deb`/`helm`/
/// `apk` submodules share one argument instead of threading five.
pub struct SyncContext<'a> {
    pub db: &'a PgPool,
    pub pool: &'a Pool,
    pub cache: &'a MetadataCache,
    pub downloader: &'a Downloader,
    pub repository: &'a Repository,
    pub tmp_dir: &'a Path,
}

pub(super) fn join_url(base: &str, relative: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), relative.trim_start_matches('/'))
}

/// Writes `bytes` to a scratch file under `tmp_dir`, hands it to the pool,
/// then cleans up the scratch file — `Pool::add` copies its source rather
/// than consuming it.
async fn store_bytes_in_pool(
    pool: &Pool,
    tmp_dir: &Path,
    filename: &str,
    bytes: &[u8],
    namespace: crate::pool::Namespace,
) -> Result<(String, PathBuf, u64)> {
    tokio::fs::create_dir_all(tmp_dir).await?;
    let scratch = tmp_dir.join(format!("{}.{}", filename, std::process::id()));
    tokio::fs::write(&scratch, bytes).await?;
    let result = pool.add(&scratch, filename, namespace).await;
    let _ = tokio::fs::remove_file(&scratch).await;
    result
}

/// Downloads `url` straight into the pool under `namespace`, verifying
/// `expected_sha256` in transit if given. Returns `(sha256, pool-relative
/// path, size)`.
pub(super) async fn download_into_pool(
    ctx: &SyncContext<'_>,
    url: &str,
    filename: &str,
    namespace: crate::pool::Namespace,
    expected_sha256: Option<&str>,
) -> Result<(String, PathBuf, u64)> {
    tokio::fs::create_dir_all(ctx.tmp_dir).await?;
    let scratch = ctx.tmp_dir.join(format!("{}.{}", filename, std::process::id()));
    ctx.downloader.download_file(url, &scratch, expected_sha256).await?;
    let result = ctx.pool.add(&scratch, filename, namespace).await;
    let _ = tokio::fs::remove_file(&scratch).await;
    result
}

/// Fetches `url`'s bytes, consulting the metadata cache first when a sha256
/// checksum is already known from root metadata (§4.3). Caches the result
/// under that checksum on a miss.
pub(super) async fn fetch_cached_or_download(ctx: &SyncContext<'_>, url: &str, expected_sha256: Option<&str>) -> Result<Vec<u8>> {
    if let Some(checksum) = expected_sha256 {
        if let Some(cached_path) = ctx.cache.get(checksum) {
            if let Ok(bytes) = tokio::fs::read(&cached_path).await {
                return Ok(bytes);
            }
        }
    }
    let bytes = ctx.downloader.fetch_bytes(url).await?;
    if let Some(checksum) = expected_sha256 {
        let _ = ctx.cache.put(checksum, &bytes);
    }
    Ok(bytes)
}

/// Stores a root/listing metadata document as a `RepositoryFile`, deduping
/// on sha256 the way content items do.
pub(super) async fn persist_repository_file(
    ctx: &SyncContext<'_>,
    bytes: &[u8],
    filename: &str,
    file_category: &str,
    file_type: &str,
    original_path: &str,
    metadata: crate::catalog::model::FileMetadata,
) -> Result<()> {
    let (sha256, relative, size_bytes) =
        store_bytes_in_pool(ctx.pool, ctx.tmp_dir, filename, bytes, crate::pool::Namespace::Files).await?;

    let file = match catalog::find_repository_file_by_sha256(ctx.db, &sha256).await? {
        Some(existing) => existing,
        None => {
            catalog::insert_repository_file(
                ctx.db,
                file_category,
                file_type,
                &sha256,
                &relative.to_string_lossy(),
                original_path,
                size_bytes as i64,
                &metadata,
            )
            .await?
        }
    };
    catalog::link_repository_file_to_repository(ctx.db, file.id, ctx.repository.id).await?;

    Ok(())
}

/// Runs a full sync pass for one configured repository: connects/creates the
/// `Repository` row, opens a `SyncHistory` entry, dispatches to the
/// format-specific pipeline, then closes the history row with the resulting
/// counts (§4.6).
pub async fn sync_repository(
    db: &PgPool,
    pool: &Pool,
    cache: &MetadataCache,
    global: &GlobalConfig,
    repo_cfg: &RepositoryConfig,
    tmp_dir: &Path,
) -> Result<SyncOutcome> {
    let type_str = match repo_cfg.repo_type {
        RepositoryType::Rpm => "rpm",
        RepositoryType::Apt => "apt",
        RepositoryType::Helm => "helm",
        RepositoryType::Apk => "apk",
    };
    let mode_str = match repo_cfg.mode {
        crate::config::RepositoryMode::Mirror => "mirror",
        crate::config::RepositoryMode::Filtered => "filtered",
        crate::config::RepositoryMode::Hosted => "hosted",
    };
    let repository =
        catalog::get_or_create_repository(db, &repo_cfg.id, &repo_cfg.id, type_str, &repo_cfg.feed, mode_str).await?;

    let effective = EffectiveConfig::for_repository(
        repo_cfg,
        &global.download,
        global.proxy.as_ref(),
        global.ssl.as_ref(),
    );
    let downloader = Downloader::new(&effective)?;

    let history_id = catalog::open_sync_history(db, repository.id).await?;
    info!("sync: starting {} ({})", repo_cfg.id, type_str);

    let ctx = SyncContext {
        db,
        pool,
        cache,
        downloader: &downloader,
        repository: &repository,
        tmp_dir,
    };

    let result = match repo_cfg.repo_type {
        RepositoryType::Rpm => rpm::sync(&ctx, repo_cfg).await,
        RepositoryType::Apt => deb::sync(&ctx, repo_cfg).await,
        RepositoryType::Helm => helm::sync(&ctx, repo_cfg).await,
        RepositoryType::Apk => apk::sync(&ctx, repo_cfg).await,
    };

    match &result {
        Ok(outcome) => {
            catalog::close_sync_history(
                db,
                history_id,
                "success",
                outcome.packages_added,
                outcome.packages_removed,
                outcome.packages_updated,
                outcome.bytes_downloaded,
                None,
            )
            .await?;
            catalog::touch_last_sync(db, repository.id).await?;
            info!(
                "sync: {} done (+{} -{} ~{}, {} bytes)",
                repo_cfg.id, outcome.packages_added, outcome.packages_removed, outcome.packages_updated, outcome.bytes_downloaded
            );
        }
        Err(e) => {
            catalog::close_sync_history(db, history_id, "failed", 0, 0, 0, 0, Some(&e.to_string())).await?;
        }
    }

    result
}

/// A dry-run diff of what a real sync *would* change, computed by the same
/// fetch/parse/filter steps without any download or catalog mutation (§4.6
/// "check for updates"-style use case).
pub async fn check_updates(
    db: &PgPool,
    pool: &Pool,
    cache: &MetadataCache,
    global: &GlobalConfig,
    repo_cfg: &RepositoryConfig,
    tmp_dir: &Path,
) -> Result<SyncOutcome> {
    let type_str = match repo_cfg.repo_type {
        RepositoryType::Rpm => "rpm",
        RepositoryType::Apt => "apt",
        RepositoryType::Helm => "helm",
        RepositoryType::Apk => "apk",
    };
    let repository = match catalog::find_repository_by_repo_id(db, &repo_cfg.id).await? {
        Some(r) => r,
        None => {
            // Not yet synced: everything found would be an addition, and
            // there is no catalog row to diff against. Construct a
            // transient placeholder so the per-format dry-run path can
            // still run its fetch/parse/filter and report counts against
            // an empty baseline.
            Repository {
                id: -1,
                repo_id: repo_cfg.id.clone(),
                name: repo_cfg.id.clone(),
                repo_type: type_str.to_string(),
                feed: repo_cfg.feed.clone(),
                enabled: repo_cfg.enabled,
                mode: "mirror".to_string(),
                last_sync_at: None,
            }
        }
    };

    let effective = EffectiveConfig::for_repository(
        repo_cfg,
        &global.download,
        global.proxy.as_ref(),
        global.ssl.as_ref(),
    );
    let downloader = Downloader::new(&effective)?;
    let ctx = SyncContext {
        db,
        pool,
        cache,
        downloader: &downloader,
        repository: &repository,
        tmp_dir,
    };

    match repo_cfg.repo_type {
        RepositoryType::Rpm => rpm::check_updates(&ctx, repo_cfg).await,
        RepositoryType::Apt => deb::check_updates(&ctx, repo_cfg).await,
        RepositoryType::Helm => helm::check_updates(&ctx, repo_cfg).await,
        RepositoryType::Apk => apk::check_updates(&ctx, repo_cfg).await,
    }
}

/// Runs [`sync_repository`] for every enabled repository in `global`,
/// continuing past a single repository's failure so one bad feed doesn't
/// abort the whole cycle.
pub async fn sync_all(
    db: &PgPool,
    pool: &Pool,
    cache: &MetadataCache,
    global: &GlobalConfig,
    tmp_dir: &Path,
) -> Result<SyncOutcome> {
    let mut total = SyncOutcome::default();
    for repo_cfg in &global.repositories {
        if !repo_cfg.enabled {
            continue;
        }
        match sync_repository(db, pool, cache, global, repo_cfg, tmp_dir).await {
            Ok(outcome) => total.merge(outcome),
            Err(e) => log::error!("sync: {} failed: {e}", repo_cfg.id),
        }
    }

    Ok(total)
}
