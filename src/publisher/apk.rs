//! Alpine publish (§4.8.4): `.apk` hardlinks into
//! `<branch>/<repository>/<architecture>/`, regenerated `APKINDEX` text
//! repackaged as a single-member `APKINDEX.tar.gz`.

use std::path::Path;

use crate::{
    catalog::model::{ContentItem, ContentMetadata, RepositoryFile},
    config::RepositoryConfig,
    error::{ChantalError, Result},
    formats::apk::{publisher::generate_apkindex_tar_gz, ApkPackage},
    pool::{Namespace, Pool},
};

fn to_apk_package(item: &ContentItem) -> ApkPackage {
    let (architecture, checksum, origin, maintainer, license, description, build_time) = match &item.content_metadata.0 {
        ContentMetadata::Apk {
            architecture,
            checksum,
            origin,
            maintainer,
            license,
            description,
            build_time,
        } => (
            architecture.clone(),
            checksum.clone(),
            origin.clone(),
            maintainer.clone(),
            license.clone(),
            description.clone(),
            *build_time,
        ),
        _ => unreachable!("apk publisher given a non-apk content item"),
    };

    ApkPackage {
        name: item.name.clone(),
        version: item.version.clone(),
        architecture,
        checksum,
        size_bytes: item.size_bytes as u64,
        installed_size: None,
        description,
        url: None,
        license,
        dependencies: None,
        provides: None,
        origin,
        maintainer,
        build_time,
    }
}

pub async fn publish(
    pool: &Pool,
    repo_cfg: &RepositoryConfig,
    items: &[ContentItem],
    _files: &[RepositoryFile],
    _mode: crate::config::RepositoryMode,
    target: &Path,
) -> Result<()> {
    let apk = repo_cfg
        .apk
        .as_ref()
        .ok_or_else(|| ChantalError::Config(format!("repository '{}' has no apk options", repo_cfg.id)))?;
    let index_dir = target.join(&apk.branch).join(&apk.repository).join(&apk.architecture);
    tokio::fs::create_dir_all(&index_dir).await?;

    for item in items {
        let dest = index_dir.join(&item.filename);
        pool.link(Namespace::Content, &item.sha256, &item.filename, &dest).await?;
    }

    let packages: Vec<ApkPackage> = items.iter().map(to_apk_package).collect();
    let archive = generate_apkindex_tar_gz(&packages)?;
    tokio::fs::write(index_dir.join("APKINDEX.tar.gz"), &archive).await?;

    Ok(())
}
