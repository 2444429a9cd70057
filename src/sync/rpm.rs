//! RPM sync pipeline (§4.6 RPM): `repomd.xml` → per-entry metadata files →
//! `primary.xml` → filter → diff → download, plus optional `.treeinfo`
//! installer files (§4.8.1).

use std::collections::HashSet;

use crate::{
    catalog::{self, model::ContentMetadata, model::FileMetadata},
    config::RepositoryConfig,
    error::Result,
    filter::apply_filters,
    formats::rpm::{
        parsers::{parse_primary_xml, parse_repomd_xml, parse_treeinfo},
        RpmPackage,
    },
    pool::Namespace,
};

use super::{download_into_pool, fetch_cached_or_download, join_url, persist_repository_file, SyncContext, SyncOutcome};

fn metadata_for(pkg: &RpmPackage) -> ContentMetadata {
    ContentMetadata::Rpm {
        arch: pkg.arch.clone(),
        epoch: if pkg.epoch.is_empty() { None } else { Some(pkg.epoch.clone()) },
        release: pkg.release.clone(),
        group: pkg.group.clone(),
        license: pkg.license.clone(),
        vendor: pkg.vendor.clone(),
        sourcerpm: pkg.sourcerpm.clone(),
        summary: pkg.summary.clone(),
        description: pkg.description.clone(),
    }
}

async fn fetch_package_list(ctx: &SyncContext<'_>, repo_cfg: &RepositoryConfig, persist: bool) -> Result<Vec<RpmPackage>> {
    let repomd_url = join_url(&repo_cfg.feed, "repodata/repomd.xml");
    let repomd_bytes = ctx.downloader.fetch_bytes(&repomd_url).await?;
    if persist {
        persist_repository_file(
            ctx,
            &repomd_bytes,
            "repomd.xml",
            "rpm",
            "repomd",
            "repodata/repomd.xml",
            FileMetadata::Generic {
                checksum_type: "sha256".to_string(),
            },
        )
        .await?;
    }

    let entries = parse_repomd_xml(&repomd_bytes)?;

    let mut all_packages = Vec::new();
    for entry in &entries {
        if entry.file_type != "primary" {
            if persist {
                let url = join_url(&repo_cfg.feed, &entry.location);
                let bytes = fetch_cached_or_download(ctx, &url, Some(&entry.checksum)).await?;
                let filename = entry.location.rsplit('/').next().unwrap_or(&entry.location);
                persist_repository_file(
                    ctx,
                    &bytes,
                    filename,
                    "rpm",
                    &entry.file_type,
                    &entry.location,
                    FileMetadata::RpmMetadata {
                        data_type: entry.file_type.clone(),
                        open_checksum: entry.open_checksum.clone(),
                        open_size: entry.open_size.map(|v| v as i64),
                    },
                )
                .await?;
            }
            continue;
        }

        let url = join_url(&repo_cfg.feed, &entry.location);
        let bytes = fetch_cached_or_download(ctx, &url, Some(&entry.checksum)).await?;
        let filename = entry.location.rsplit('/').next().unwrap_or(&entry.location);
        if persist {
            persist_repository_file(
                ctx,
                &bytes,
                filename,
                "rpm",
                "primary",
                &entry.location,
                FileMetadata::RpmMetadata {
                    data_type: "primary".to_string(),
                    open_checksum: entry.open_checksum.clone(),
                    open_size: entry.open_size.map(|v| v as i64),
                },
            )
            .await?;
        }
        let decompressed = crate::compression::decompress(filename, &bytes)?;
        all_packages.extend(parse_primary_xml(&decompressed)?);
    }

    Ok(all_packages)
}

async fn sync_treeinfo(ctx: &SyncContext<'_>, repo_cfg: &RepositoryConfig) -> Result<u64> {
    let url = join_url(&repo_cfg.feed, ".treeinfo");
    let Some(bytes) = ctx.downloader.fetch_bytes_optional(&url).await? else {
        return Ok(0);
    };
    let text = String::from_utf8_lossy(&bytes).into_owned();

    persist_repository_file(
        ctx,
        &bytes,
        ".treeinfo",
        "rpm",
        "treeinfo",
        ".treeinfo",
        FileMetadata::Generic {
            checksum_type: "sha256".to_string(),
        },
    )
    .await?;

    let installer_files = parse_treeinfo(&text)?;
    let mut downloaded = 0u64;
    for file in installer_files {
        let file_url = join_url(&repo_cfg.feed, &file.path);
        let filename = file.path.rsplit('/').next().unwrap_or(&file.path).to_string();
        let (sha256, relative, size) = download_into_pool(ctx, &file_url, &filename, Namespace::Files, file.sha256.as_deref()).await?;
        let existing = catalog::find_repository_file_by_sha256(ctx.db, &sha256).await?;
        let stored = match existing {
            Some(existing) => existing,
            None => {
                catalog::insert_repository_file(
                    ctx.db,
                    "rpm",
                    "kickstart",
                    &sha256,
                    &relative.to_string_lossy(),
                    &file.path,
                    size as i64,
                    &FileMetadata::Kickstart,
                )
                .await?
            }
        };
        catalog::link_repository_file_to_repository(ctx.db, stored.id, ctx.repository.id).await?;
        downloaded += size;
    }

    Ok(downloaded)
}

pub async fn sync(ctx: &SyncContext<'_>, repo_cfg: &RepositoryConfig) -> Result<SyncOutcome> {
    let packages = fetch_package_list(ctx, repo_cfg, true).await?;
    let filtered = match &repo_cfg.filters {
        Some(filters) => apply_filters(packages, filters),
        None => packages,
    };

    let existing = catalog::list_content_items_for_repository(ctx.db, ctx.repository.id).await?;
    let existing_sha256: HashSet<String> = existing.iter().map(|c| c.sha256.clone()).collect();
    let wanted_sha256: HashSet<String> = filtered.iter().map(|p| p.sha256.clone()).collect();

    let mut outcome = SyncOutcome::default();

    for pkg in &filtered {
        if existing_sha256.contains(&pkg.sha256) {
            continue;
        }
        let url = join_url(&repo_cfg.feed, &pkg.location);
        let filename = pkg.location.rsplit('/').next().unwrap_or(&pkg.location).to_string();
        let (sha256, relative, size) =
            download_into_pool(ctx, &url, &filename, Namespace::Content, Some(&pkg.sha256)).await?;

        let item = match catalog::find_content_item_by_sha256(ctx.db, &sha256).await? {
            Some(existing) => existing,
            None => {
                catalog::insert_content_item(
                    ctx.db,
                    "rpm",
                    &pkg.name,
                    &pkg.version,
                    &sha256,
                    size as i64,
                    &filename,
                    &relative.to_string_lossy(),
                    &metadata_for(pkg),
                )
                .await?
            }
        };
        catalog::link_content_item_to_repository(ctx.db, item.id, ctx.repository.id).await?;
        outcome.packages_added += 1;
        outcome.bytes_downloaded += size;
    }

    for item in &existing {
        if !wanted_sha256.contains(&item.sha256) {
            catalog::unlink_content_item_from_repository(ctx.db, item.id, ctx.repository.id).await?;
            outcome.packages_removed += 1;
        }
    }

    outcome.bytes_downloaded += sync_treeinfo(ctx, repo_cfg).await?;

    Ok(outcome)
}

pub async fn check_updates(ctx: &SyncContext<'_>, repo_cfg: &RepositoryConfig) -> Result<SyncOutcome> {
    let packages = fetch_package_list(ctx, repo_cfg, false).await?;
    let filtered = match &repo_cfg.filters {
        Some(filters) => apply_filters(packages, filters),
        None => packages,
    };

    let existing_sha256: HashSet<String> = if ctx.repository.id < 0 {
        HashSet::new()
    } else {
        catalog::list_content_items_for_repository(ctx.db, ctx.repository.id)
            .await?
            .into_iter()
            .map(|c| c.sha256)
            .collect()
    };

    let mut outcome = SyncOutcome::default();
    for pkg in &filtered {
        if !existing_sha256.contains(&pkg.sha256) {
            outcome.packages_added += 1;
        }
    }
    let wanted: HashSet<&str> = filtered.iter().map(|p| p.sha256.as_str()).collect();
    for sha256 in &existing_sha256 {
        if !wanted.contains(sha256.as_str()) {
            outcome.packages_removed += 1;
        }
    }

    Ok(outcome)
}
