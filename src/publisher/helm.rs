//! Helm publish (§4.8.3): `.tgz` hardlinks, plus either the upstream
//! `index.yaml` hardlinked verbatim (mirror) or a regenerated one keyed by
//! chart name with `digest: sha256:<sha256>` and rewritten `urls` (filtered,
//! or mirror with no upstream `index.yaml` RepositoryFile on record).

use std::path::Path;

use crate::{
    catalog::model::{ContentItem, ContentMetadata, RepositoryFile},
    config::RepositoryConfig,
    error::Result,
    formats::helm::{publisher::generate_index_yaml, HelmChart},
    pool::{Namespace, Pool},
};

use super::basename;

fn to_helm_chart(item: &ContentItem) -> HelmChart {
    let (app_version, description, urls) = match &item.content_metadata.0 {
        ContentMetadata::Helm { app_version, description, urls } => (app_version.clone(), description.clone(), urls.clone()),
        _ => unreachable!("helm publisher given a non-helm content item"),
    };

    HelmChart {
        name: item.name.clone(),
        version: item.version.clone(),
        sha256: item.sha256.clone(),
        urls,
        description,
        app_version,
        home: None,
        keywords: Vec::new(),
        size_bytes: item.size_bytes as u64,
        filename: item.filename.clone(),
    }
}

pub async fn publish(
    pool: &Pool,
    repo_cfg: &RepositoryConfig,
    items: &[ContentItem],
    files: &[RepositoryFile],
    _mode: crate::config::RepositoryMode,
    target: &Path,
) -> Result<()> {
    tokio::fs::create_dir_all(target).await?;

    for item in items {
        let dest = target.join(&item.filename);
        pool.link(Namespace::Content, &item.sha256, &item.filename, &dest).await?;
    }

    let upstream_index = files.iter().find(|f| f.file_type == "index");
    match upstream_index {
        Some(file) => {
            let filename = basename(&file.original_path);
            pool.link(Namespace::Files, &file.sha256, &filename, &target.join("index.yaml")).await?;
        }
        None => {
            let charts: Vec<HelmChart> = items.iter().map(to_helm_chart).collect();
            let base_url = repo_cfg.publish.as_ref().and_then(|p| p.base_url.as_deref());
            let generated_at = crate::catalog::now()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_default();
            let index = generate_index_yaml(&charts, base_url, &generated_at)?;
            tokio::fs::write(target.join("index.yaml"), index.as_bytes()).await?;
        }
    }

    Ok(())
}
