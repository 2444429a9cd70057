use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::{error, info};

use cli::{Chantal, ChantalCommand, DbAction, PoolAction, PublishTarget, SnapshotAction};
use config::{GlobalConfig, RepositoryConfig};

mod cache;
mod catalog;
mod cli;
mod compression;
mod config;
mod downloader;
mod error;
mod filter;
mod formats;
mod gc;
mod pool;
mod publisher;
mod snapshot;
mod sync;

use cache::MetadataCache;
use pool::Pool;

fn find_repo<'a>(global: &'a GlobalConfig, id: &str) -> Result<&'a RepositoryConfig> {
    global
        .repositories
        .iter()
        .find(|r| r.id == id)
        .with_context(|| format!("no repository '{id}' in config"))
}

fn storage_pool(global: &GlobalConfig) -> Pool {
    Pool::new(Path::new(&global.storage.base_path).join(&global.storage.pool_path))
}

fn storage_tmp_dir(global: &GlobalConfig) -> PathBuf {
    Path::new(&global.storage.base_path).join(&global.storage.temp_path)
}

fn storage_cache(global: &GlobalConfig) -> Result<MetadataCache> {
    let cache_dir = Path::new(&global.storage.base_path)
        .join(&global.storage.temp_path)
        .join("cache");
    MetadataCache::new(Some(cache_dir), global.cache.max_age_hours, global.cache.enabled)
        .context("initializing metadata cache")
}

/// Blocking stdin confirmation for `pool cleanup`/`db cleanup` without
/// `--force`, the way the teacher prompted for `gen-key` input but without
/// pulling in `dialoguer` for a single yes/no (§4.9).
fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args: Chantal = argh::from_env();

    match run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    }
}

async fn run(args: Chantal) -> Result<()> {
    let global = config::load_config(&args.config).context("loading configuration")?;
    config::lint_config(&global);

    let database_url = global
        .database
        .as_ref()
        .map(|d| d.url.as_str())
        .context("config has no database.url")?;

    info!("connecting to catalog database...");
    let db = catalog::connect(database_url).await?;
    info!("running pending catalog migrations...");
    catalog::migrate::run_migrations(&db).await?;

    match args.command {
        ChantalCommand::Sync(cmd) => sync_cmd(&db, &global, cmd.repo.as_deref()).await?,
        ChantalCommand::CheckUpdates(cmd) => check_updates_cmd(&db, &global, cmd.repo.as_deref()).await?,
        ChantalCommand::Snapshot(cmd) => snapshot_cmd(&db, cmd.action).await?,
        ChantalCommand::ViewSnapshot(cmd) => {
            let id = snapshot::create_view_snapshot(&db, &cmd.view, &cmd.name).await?;
            println!("created view-snapshot '{}' (id {id}) for view '{}'", cmd.name, cmd.view);
        }
        ChantalCommand::Publish(cmd) => publish_cmd(&db, &global, cmd.target).await?,
        ChantalCommand::Unpublish(cmd) => {
            publisher::unpublish(&db, cmd.snapshot, Path::new(&cmd.target)).await?;
            println!("removed {}", cmd.target);
        }
        ChantalCommand::Pool(cmd) => pool_cmd(&db, &global, cmd.action).await?,
        ChantalCommand::Db(cmd) => db_cmd(&db, &global, cmd.action).await?,
    }

    Ok(())
}

async fn sync_cmd(db: &sqlx::PgPool, global: &GlobalConfig, repo: Option<&str>) -> Result<()> {
    let pool = storage_pool(global);
    let cache = storage_cache(global)?;
    let tmp_dir = storage_tmp_dir(global);

    match repo {
        Some(id) => {
            let repo_cfg = find_repo(global, id)?;
            let outcome = sync::sync_repository(db, &pool, &cache, global, repo_cfg, &tmp_dir).await?;
            println!(
                "{id}: +{} -{} ~{} ({} bytes)",
                outcome.packages_added, outcome.packages_removed, outcome.packages_updated, outcome.bytes_downloaded
            );
        }
        None => {
            let outcome = sync::sync_all(db, &pool, &cache, global, &tmp_dir).await?;
            println!(
                "all repositories: +{} -{} ~{} ({} bytes)",
                outcome.packages_added, outcome.packages_removed, outcome.packages_updated, outcome.bytes_downloaded
            );
        }
    }

    Ok(())
}

async fn check_updates_cmd(db: &sqlx::PgPool, global: &GlobalConfig, repo: Option<&str>) -> Result<()> {
    let pool = storage_pool(global);
    let cache = storage_cache(global)?;
    let tmp_dir = storage_tmp_dir(global);

    let repos: Vec<&RepositoryConfig> = match repo {
        Some(id) => vec![find_repo(global, id)?],
        None => global.repositories.iter().filter(|r| r.enabled).collect(),
    };

    for repo_cfg in repos {
        let outcome = sync::check_updates(db, &pool, &cache, global, repo_cfg, &tmp_dir).await?;
        println!(
            "{}: would add {}, would remove {}",
            repo_cfg.id, outcome.packages_added, outcome.packages_removed
        );
    }

    Ok(())
}

async fn snapshot_cmd(db: &sqlx::PgPool, action: SnapshotAction) -> Result<()> {
    match action {
        SnapshotAction::Create(cmd) => {
            let repository = catalog::find_repository_by_repo_id(db, &cmd.repo)
                .await?
                .with_context(|| format!("repository '{}' has never been synced", cmd.repo))?;
            let snap = snapshot::create_snapshot(db, repository.id, &cmd.name, cmd.description.as_deref()).await?;
            println!(
                "created snapshot '{}' (id {}): {} packages, {} bytes",
                snap.name, snap.id, snap.package_count, snap.total_size_bytes
            );
        }
        SnapshotAction::List(cmd) => {
            let repository = catalog::find_repository_by_repo_id(db, &cmd.repo)
                .await?
                .with_context(|| format!("repository '{}' has never been synced", cmd.repo))?;
            for snap in snapshot::list_snapshots(db, repository.id).await? {
                println!(
                    "{}\t{}\t{} packages\t{} bytes\tpublished={}",
                    snap.id, snap.name, snap.package_count, snap.total_size_bytes, snap.is_published
                );
            }
        }
        SnapshotAction::Copy(cmd) => {
            let snap = snapshot::copy_snapshot(db, cmd.source, &cmd.target_name).await?;
            println!("copied snapshot {} -> '{}' (id {})", cmd.source, snap.name, snap.id);
        }
        SnapshotAction::Delete(cmd) => {
            snapshot::delete_snapshot(db, cmd.id, cmd.force).await?;
            println!("deleted snapshot {}", cmd.id);
        }
        SnapshotAction::Diff(cmd) => {
            let diff = snapshot::diff(db, cmd.a, cmd.b).await?;
            for (name, version) in &diff.added {
                println!("+ {name} {version}");
            }
            for (name, version) in &diff.removed {
                println!("- {name} {version}");
            }
            for (name, from, to) in &diff.updated {
                println!("~ {name} {from} -> {to}");
            }
        }
    }

    Ok(())
}

async fn publish_cmd(db: &sqlx::PgPool, global: &GlobalConfig, target: PublishTarget) -> Result<()> {
    let pool = storage_pool(global);

    match target {
        PublishTarget::Repository(cmd) => {
            let repo_cfg = find_repo(global, &cmd.repo)?;
            publisher::publish_repository(db, &pool, repo_cfg, Path::new(&cmd.target)).await?;
            println!("published repository '{}' to {}", cmd.repo, cmd.target);
        }
        PublishTarget::Snapshot(cmd) => {
            let snap = catalog::get_snapshot(db, cmd.id).await?;
            let repository = catalog::get_repository(db, snap.repository_id).await?;
            let repo_cfg = find_repo(global, &repository.repo_id)?;
            publisher::publish_snapshot(db, &pool, repo_cfg, &snap, Path::new(&cmd.target)).await?;
            println!("published snapshot {} to {}", cmd.id, cmd.target);
        }
        PublishTarget::View(cmd) => {
            let view_cfg = global
                .views
                .iter()
                .find(|v| v.id == cmd.view)
                .with_context(|| format!("no view '{}' in config", cmd.view))?;
            publisher::view::publish_view(db, &pool, global, view_cfg, Path::new(&cmd.target)).await?;
            println!("published view '{}' to {}", cmd.view, cmd.target);
        }
        PublishTarget::ViewSnapshot(cmd) => {
            let view_cfg = global
                .views
                .iter()
                .find(|v| v.id == cmd.view)
                .with_context(|| format!("no view '{}' in config", cmd.view))?;
            let member_ids = catalog::list_view_snapshot_member_ids(db, cmd.view_snapshot).await?;
            publisher::view::publish_view_snapshot(db, &pool, global, view_cfg, &member_ids, Path::new(&cmd.target)).await?;
            println!("published view-snapshot {} of view '{}' to {}", cmd.view_snapshot, cmd.view, cmd.target);
        }
    }

    Ok(())
}

async fn pool_cmd(db: &sqlx::PgPool, global: &GlobalConfig, action: PoolAction) -> Result<()> {
    let pool = storage_pool(global);

    match action {
        PoolAction::Verify(_) => {
            let report = gc::verify(db, &pool).await?;
            println!("checked {} rows, {} failures", report.checked, report.failures.len());
            for failure in &report.failures {
                println!("  {} #{} ({}): {}", failure.kind, failure.id, failure.sha256, failure.reason);
            }
            if !report.failures.is_empty() {
                bail!("pool verify found {} integrity failures", report.failures.len());
            }
        }
        PoolAction::Orphaned(_) => {
            let orphans = gc::orphaned(db, &pool).await?;
            for (namespace, sha256, path, size) in &orphans {
                println!("{namespace:?}\t{sha256}\t{}\t{size}", path.display());
            }
            println!("{} orphaned pool files", orphans.len());
        }
        PoolAction::Missing(_) => {
            let rows = gc::missing(db, &pool).await?;
            for row in &rows {
                println!("{}\t#{}\t{}", row.kind, row.id, row.sha256);
            }
            println!("{} catalog rows with a missing pool object", rows.len());
        }
        PoolAction::Cleanup(cmd) => {
            if !cmd.orphaned && !cmd.missing {
                bail!("pool cleanup requires at least one of --orphaned/--missing");
            }
            if !cmd.dry_run && !cmd.force && !confirm("delete the above pool state permanently?")? {
                println!("aborted");
                return Ok(());
            }
            let report = gc::cleanup(db, &pool, cmd.orphaned, cmd.missing, cmd.dry_run).await?;
            if let Some(orphaned) = &report.orphaned {
                println!(
                    "orphaned: {} found, {} deleted, {} bytes reclaimed",
                    orphaned.orphaned_found, orphaned.orphaned_deleted, orphaned.bytes_reclaimed
                );
            }
            if cmd.missing {
                println!(
                    "missing: {} content items, {} repository files removed from the catalog",
                    report.missing_content_items_deleted, report.missing_repository_files_deleted
                );
            }
        }
    }

    Ok(())
}

async fn db_cmd(db: &sqlx::PgPool, global: &GlobalConfig, action: DbAction) -> Result<()> {
    let configured_ids: std::collections::HashSet<String> = global.repositories.iter().map(|r| r.id.clone()).collect();

    match action {
        DbAction::Orphaned(_) => {
            let orphans = gc::db_orphaned(db, &configured_ids).await?;
            for repo in &orphans {
                println!("{}\t{}\t{}", repo.id, repo.repo_id, repo.repo_type);
            }
            println!("{} orphaned repositories", orphans.len());
        }
        DbAction::Cleanup(cmd) => {
            let orphans = gc::db_orphaned(db, &configured_ids).await?;
            if orphans.is_empty() {
                println!("nothing to clean up");
                return Ok(());
            }
            if !cmd.force && !confirm(&format!("delete {} orphaned repositories and their history/snapshots?", orphans.len()))? {
                println!("aborted");
                return Ok(());
            }
            let deleted = gc::db_cleanup_orphaned(db, &configured_ids).await?;
            println!("removed {deleted} orphaned repositories");
        }
    }

    Ok(())
}
