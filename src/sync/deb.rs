//! APT sync pipeline (§4.6 DEB): `InRelease`/`Release` → per (component ×
//! architecture) `Packages`/`Packages.gz` → filter → diff → download.
//! Grounded on `original_source/.../apt/sync.py`'s fetch-then-listings-then-
//! packages structure; package download URLs and the `dists/<distribution>/`
//! path are resolved relative to `feed` exactly as that module does.

use std::collections::HashSet;

use crate::{
    catalog::{self, model::ContentMetadata, model::FileMetadata},
    config::RepositoryConfig,
    error::Result,
    filter::apply_filters,
    formats::deb::{
        parsers::{parse_packages_file, parse_release_file},
        DebPackage,
    },
    pool::Namespace,
};

use super::{download_into_pool, join_url, persist_repository_file, SyncContext, SyncOutcome};

fn metadata_for(pkg: &DebPackage) -> ContentMetadata {
    ContentMetadata::Deb {
        architecture: pkg.architecture.clone(),
        component: pkg.component.clone(),
        priority: pkg.priority.clone(),
        section: pkg.section.clone(),
        depends: pkg.depends.clone(),
        maintainer: pkg.maintainer.clone(),
        description: pkg.description.clone(),
        extra_fields: pkg.extra_fields.clone(),
    }
}

async fn fetch_package_list(ctx: &SyncContext<'_>, repo_cfg: &RepositoryConfig, persist: bool) -> Result<Vec<DebPackage>> {
    let apt = repo_cfg.apt.clone().unwrap_or_default();
    let dists_url = join_url(&repo_cfg.feed, &format!("dists/{}/", apt.distribution));

    let release_bytes = match ctx.downloader.fetch_bytes_optional(&join_url(&dists_url, "InRelease")).await? {
        Some(bytes) => bytes,
        None => ctx
            .downloader
            .fetch_bytes(&join_url(&dists_url, "Release"))
            .await?,
    };

    if persist {
        persist_repository_file(
            ctx,
            &release_bytes,
            "Release",
            "deb",
            "release",
            &format!("dists/{}/Release", apt.distribution),
            FileMetadata::Generic {
                checksum_type: "sha256".to_string(),
            },
        )
        .await?;
    }

    let release = parse_release_file(&String::from_utf8_lossy(&release_bytes));

    let components: Vec<String> = if apt.components.is_empty() {
        release.components.clone()
    } else {
        release
            .components
            .iter()
            .filter(|c| apt.components.contains(c))
            .cloned()
            .collect()
    };
    let architectures: Vec<String> = if apt.architectures.is_empty() {
        release.architectures.clone()
    } else {
        release
            .architectures
            .iter()
            .filter(|a| apt.architectures.contains(a))
            .cloned()
            .collect()
    };

    let mut all_packages = Vec::new();

    for component in &components {
        for arch in &architectures {
            let relative_gz = format!("{component}/binary-{arch}/Packages.gz");
            let relative_plain = format!("{component}/binary-{arch}/Packages");
            let (relative, checksum) = match release.sha256.iter().find(|c| c.filename == relative_gz) {
                Some(c) => (relative_gz.clone(), Some(c.checksum.clone())),
                None => match release.sha256.iter().find(|c| c.filename == relative_plain) {
                    Some(c) => (relative_plain.clone(), Some(c.checksum.clone())),
                    None => (relative_gz.clone(), None),
                },
            };

            let url = join_url(&dists_url, &relative);
            let Some(bytes) = ctx.downloader.fetch_bytes_optional(&url).await? else {
                continue;
            };
            if let Some(expected) = &checksum {
                let actual = crate::pool::sha256sum_sync(bytes.as_slice())?;
                if &actual != expected {
                    return Err(crate::error::ChantalError::ChecksumMismatch {
                        path: relative.clone().into(),
                        expected: expected.clone(),
                        actual,
                    });
                }
            }

            if persist {
                let filename = relative.rsplit('/').next().unwrap_or(&relative);
                persist_repository_file(
                    ctx,
                    &bytes,
                    filename,
                    "deb",
                    "packages",
                    &relative,
                    FileMetadata::DebMetadata {
                        component: Some(component.clone()),
                        architecture: Some(arch.clone()),
                    },
                )
                .await?;
            }

            let decompressed = crate::compression::decompress(&relative, &bytes)?;
            let text = String::from_utf8_lossy(&decompressed).into_owned();
            let mut packages = parse_packages_file(&text);
            for pkg in &mut packages {
                pkg.component = component.clone();
            }
            all_packages.extend(packages);
        }
    }

    Ok(all_packages)
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
        let url = join_url(&repo_cfg.feed, &pkg.filename);
        let filename = pkg.filename.rsplit('/').next().unwrap_or(&pkg.filename).to_string();
        let (sha256, relative, size) =
            download_into_pool(ctx, &url, &filename, Namespace::Content, Some(&pkg.sha256)).await?;

        let item = match catalog::find_content_item_by_sha256(ctx.db, &sha256).await? {
            Some(existing) => existing,
            None => {
                catalog::insert_content_item(
                    ctx.db,
                    "deb",
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
