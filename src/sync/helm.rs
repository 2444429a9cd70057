//! Helm sync pipeline (§4.6 Helm): `index.yaml` is both root and listing
//! document, so there's no separate checksum-keyed metadata file fetch the
//! way RPM/DEB have. Grounded on
//! `original_source/.../helm/sync.py::HelmSyncer.sync_repository`.

use std::collections::HashSet;

use crate::{
    catalog::{self, model::ContentMetadata, model::FileMetadata},
    config::RepositoryConfig,
    error::Result,
    filter::apply_filters,
    formats::helm::{parsers::parse_index_yaml, HelmChart},
    pool::Namespace,
};

use super::{download_into_pool, join_url, persist_repository_file, SyncContext, SyncOutcome};

fn metadata_for(chart: &HelmChart) -> ContentMetadata {
    ContentMetadata::Helm {
        app_version: chart.app_version.clone(),
        description: chart.description.clone(),
        urls: chart.urls.clone(),
    }
}

async fn fetch_chart_list(ctx: &SyncContext<'_>, repo_cfg: &RepositoryConfig, persist: bool) -> Result<Vec<HelmChart>> {
    let url = join_url(&repo_cfg.feed, "index.yaml");
    let bytes = ctx.downloader.fetch_bytes(&url).await?;

    if persist {
        persist_repository_file(
            ctx,
            &bytes,
            "index.yaml",
            "helm",
            "index",
            "index.yaml",
            FileMetadata::Generic {
                checksum_type: "sha256".to_string(),
            },
        )
        .await?;
    }

    let text = String::from_utf8_lossy(&bytes).into_owned();
    let mut charts = parse_index_yaml(&text)?;
    for chart in &mut charts {
        if let Some(first_url) = chart.urls.first() {
            chart.filename = first_url.rsplit('/').next().unwrap_or(first_url).to_string();
        }
    }

    Ok(charts)
}

fn chart_url(repo_cfg: &RepositoryConfig, chart: &HelmChart) -> Option<String> {
    let raw = chart.urls.first()?;
    if raw.starts_with("http://") || raw.starts_with("https://") {
        Some(raw.clone())
    } else {
        Some(join_url(&repo_cfg.feed, raw))
    }
}

pub async fn sync(ctx: &SyncContext<'_>, repo_cfg: &RepositoryConfig) -> Result<SyncOutcome> {
    let charts = fetch_chart_list(ctx, repo_cfg, true).await?;
    let filtered = match &repo_cfg.filters {
        Some(filters) => apply_filters(charts, filters),
        None => charts,
    };

    let existing = catalog::list_content_items_for_repository(ctx.db, ctx.repository.id).await?;
    let existing_sha256: HashSet<String> = existing.iter().map(|c| c.sha256.clone()).collect();
    let wanted_sha256: HashSet<String> = filtered.iter().filter(|c| !c.sha256.is_empty()).map(|c| c.sha256.clone()).collect();

    let mut outcome = SyncOutcome::default();

    for chart in &filtered {
        if chart.sha256.is_empty() || existing_sha256.contains(&chart.sha256) {
            continue;
        }
        let Some(url) = chart_url(repo_cfg, chart) else {
            continue;
        };
        let (sha256, relative, size) =
            download_into_pool(ctx, &url, &chart.filename, Namespace::Content, Some(&chart.sha256)).await?;

        let item = match catalog::find_content_item_by_sha256(ctx.db, &sha256).await? {
            Some(existing) => existing,
            None => {
                catalog::insert_content_item(
                    ctx.db,
                    "helm",
                    &chart.name,
                    &chart.version,
                    &sha256,
                    size as i64,
                    &chart.filename,
                    &relative.to_string_lossy(),
                    &metadata_for(chart),
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
    let charts = fetch_chart_list(ctx, repo_cfg, false).await?;
    let filtered = match &repo_cfg.filters {
        Some(filters) => apply_filters(charts, filters),
        None => charts,
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
    for chart in &filtered {
        if !chart.sha256.is_empty() && !existing_sha256.contains(&chart.sha256) {
            outcome.packages_added += 1;
        }
    }
    let wanted: HashSet<&str> = filtered.iter().filter(|c| !c.sha256.is_empty()).map(|c| c.sha256.as_str()).collect();
    for sha256 in &existing_sha256 {
        if !wanted.contains(sha256.as_str()) {
            outcome.packages_removed += 1;
        }
    }

    Ok(outcome)
}
