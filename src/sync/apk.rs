//! Alpine APK sync pipeline (§4.6 APK): `APKINDEX.tar.gz` under
//! `{feed}/{branch}/{repository}/{architecture}/` is both root and listing
//! document. Dedup key is `(name, version, architecture)` since the
//! `APKINDEX` `checksum` field is a base64 SHA1, not the pool's SHA256
//! (DESIGN.md Open Question #3) — grounded on
//! `original_source/.../apk/sync.py::ApkSyncer.sync_repository`.

use std::collections::HashSet;

use base64::Engine;
use log::warn;
use sha1::{Digest, Sha1};

use crate::{
    catalog::{self, model::ContentMetadata, model::FileMetadata},
    config::RepositoryConfig,
    error::Result,
    filter::apply_filters,
    formats::apk::{
        parsers::{extract_apkindex, parse_apkindex},
        ApkPackage,
    },
    pool::Namespace,
};

use super::{download_into_pool, join_url, persist_repository_file, SyncContext, SyncOutcome};

/// Checks a downloaded `.apk`'s SHA1 against the `Q1`-prefixed base64 digest
/// `APKINDEX` published for it. A mismatch is logged but never fails the
/// sync — upstream indexes are known to lag behind the actual package
/// bytes (§4.2/§6).
fn verify_apk_checksum(ctx: &SyncContext<'_>, pkg: &ApkPackage, sha256: &str, filename: &str) {
    let Some(encoded) = pkg.checksum.strip_prefix("Q1") else {
        warn!("apk: {filename}: checksum '{}' has no Q1 prefix, skipping verification", pkg.checksum);
        return;
    };
    let expected = match base64::engine::general_purpose::STANDARD.decode(encoded) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("apk: {filename}: could not decode checksum: {e}");
            return;
        }
    };
    let path = ctx.pool.object_path(Namespace::Content, sha256, filename);
    let bytes = match std::fs::read(&path) {
        Ok(b) => b,
        Err(e) => {
            warn!("apk: {filename}: could not re-read pool object for checksum verification: {e}");
            return;
        }
    };
    let actual = Sha1::digest(&bytes);
    if actual.as_slice() != expected.as_slice() {
        warn!(
            "apk: {filename}: APKINDEX sha1 does not match downloaded package (index likely stale)"
        );
    }
}

fn metadata_for(pkg: &ApkPackage) -> ContentMetadata {
    ContentMetadata::Apk {
        architecture: pkg.architecture.clone(),
        checksum: pkg.checksum.clone(),
        origin: pkg.origin.clone(),
        maintainer: pkg.maintainer.clone(),
        license: pkg.license.clone(),
        description: pkg.description.clone(),
        build_time: pkg.build_time,
    }
}

fn dedup_key(pkg: &ApkPackage) -> String {
    format!("{}\0{}\0{}", pkg.name, pkg.version, pkg.architecture)
}

fn index_prefix(repo_cfg: &RepositoryConfig) -> Result<String> {
    let apk = repo_cfg.apk.as_ref().ok_or_else(|| {
        crate::error::ChantalError::Config(format!("repository '{}' has no apk options", repo_cfg.id))
    })?;
    Ok(format!("{}/{}/{}/", apk.branch, apk.repository, apk.architecture))
}

async fn fetch_package_list(ctx: &SyncContext<'_>, repo_cfg: &RepositoryConfig, persist: bool) -> Result<Vec<ApkPackage>> {
    let prefix = index_prefix(repo_cfg)?;
    let url = join_url(&repo_cfg.feed, &format!("{prefix}APKINDEX.tar.gz"));
    let bytes = ctx.downloader.fetch_bytes(&url).await?;

    if persist {
        persist_repository_file(
            ctx,
            &bytes,
            "APKINDEX.tar.gz",
            "apk",
            "apkindex",
            &format!("{prefix}APKINDEX.tar.gz"),
            FileMetadata::Generic {
                checksum_type: "sha1".to_string(),
            },
        )
        .await?;
    }

    let text = extract_apkindex(&bytes)?;
    Ok(parse_apkindex(&text))
}

pub async fn sync(ctx: &SyncContext<'_>, repo_cfg: &RepositoryConfig) -> Result<SyncOutcome> {
    let prefix = index_prefix(repo_cfg)?;
    let packages = fetch_package_list(ctx, repo_cfg, true).await?;
    let filtered = match &repo_cfg.filters {
        Some(filters) => apply_filters(packages, filters),
        None => packages,
    };

    let existing = catalog::list_content_items_for_repository(ctx.db, ctx.repository.id).await?;
    let existing_keys: HashSet<String> = existing
        .iter()
        .map(|c| format!("{}\0{}\0{}", c.name, c.version, c.content_metadata.architecture().unwrap_or_default()))
        .collect();
    let wanted_keys: HashSet<String> = filtered.iter().map(dedup_key).collect();

    let mut outcome = SyncOutcome::default();

    for pkg in &filtered {
        let key = dedup_key(pkg);
        if existing_keys.contains(&key) {
            continue;
        }
        let filename = pkg.filename();
        let url = join_url(&repo_cfg.feed, &format!("{prefix}{filename}"));
        let (sha256, relative, size) = download_into_pool(ctx, &url, &filename, Namespace::Content, None).await?;
        verify_apk_checksum(ctx, pkg, &sha256, &filename);

        let item = match catalog::find_content_item_by_sha256(ctx.db, &sha256).await? {
            Some(existing) => existing,
            None => {
                catalog::insert_content_item(
                    ctx.db,
                    "apk",
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
        let key = format!("{}\0{}\0{}", item.name, item.version, item.content_metadata.architecture().unwrap_or_default());
        if !wanted_keys.contains(&key) {
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

    let existing_keys: HashSet<String> = if ctx.repository.id < 0 {
        HashSet::new()
    } else {
        catalog::list_content_items_for_repository(ctx.db, ctx.repository.id)
            .await?
            .into_iter()
            .map(|c| format!("{}\0{}\0{}", c.name, c.version, c.content_metadata.architecture().unwrap_or_default()))
            .collect()
    };

    let mut outcome = SyncOutcome::default();
    for pkg in &filtered {
        if !existing_keys.contains(&dedup_key(pkg)) {
            outcome.packages_added += 1;
        }
    }
    let wanted: HashSet<String> = filtered.iter().map(dedup_key).collect();
    for key in &existing_keys {
        if !wanted.contains(key) {
            outcome.packages_removed += 1;
        }
    }

    Ok(outcome)
}
