//! RPM/DNF publish (§4.8.1): `Packages/` hardlinks, regenerated
//! `primary.xml`/`repomd.xml`, filtered-mode `updateinfo`/`filelists`/
//! `other` re-emission, and `.treeinfo`/installer-file hardlinks back to
//! their upstream relative path.

use std::collections::HashSet;
use std::path::Path;

use crate::{
    catalog::model::{ContentItem, ContentMetadata, RepositoryFile},
    compression::Codec,
    config::RepositoryMode,
    error::Result,
    formats::rpm::{
        publisher::{filter_packages_by_pkgid, filter_updateinfo, generate_primary_xml, generate_repomd_xml, kickstart_target_path},
        RpmPackage,
    },
    pool::{Namespace, Pool},
};

use super::basename;

fn to_rpm_package(item: &ContentItem) -> RpmPackage {
    let (arch, epoch, release, group, license, vendor, sourcerpm, summary, description) = match &item.content_metadata.0 {
        ContentMetadata::Rpm {
            arch,
            epoch,
            release,
            group,
            license,
            vendor,
            sourcerpm,
            summary,
            description,
        } => (
            arch.clone(),
            epoch.clone().unwrap_or_default(),
            release.clone(),
            group.clone(),
            license.clone(),
            vendor.clone(),
            sourcerpm.clone(),
            summary.clone(),
            description.clone(),
        ),
        _ => unreachable!("rpm publisher given a non-rpm content item"),
    };

    RpmPackage {
        name: item.name.clone(),
        version: item.version.clone(),
        release,
        epoch,
        arch,
        sha256: item.sha256.clone(),
        size_bytes: item.size_bytes as u64,
        location: item.filename.clone(),
        summary,
        description,
        build_time: None,
        group,
        license,
        vendor,
        sourcerpm,
    }
}

/// Materializes an RPM repository: package hardlinks under `Packages/`,
/// regenerated `primary.xml`/`repomd.xml` under `repodata/`, installer
/// files at their original relative path, and (in filtered mode) filtered
/// `updateinfo`/`filelists`/`other`.
pub async fn publish(pool: &Pool, items: &[ContentItem], files: &[RepositoryFile], mode: RepositoryMode, target: &Path) -> Result<()> {
    let packages_dir = target.join("Packages");
    let repodata_dir = target.join("repodata");
    tokio::fs::create_dir_all(&packages_dir).await?;
    tokio::fs::create_dir_all(&repodata_dir).await?;

    for item in items {
        let dest = packages_dir.join(&item.filename);
        pool.link(Namespace::Content, &item.sha256, &item.filename, &dest).await?;
    }

    let packages: Vec<RpmPackage> = items.iter().map(to_rpm_package).collect();
    // Assumes upstream's filelists/other pkgid and primary's <checksum> are sha256,
    // matching how this pool identifies content; a sha1-pkgid upstream won't match here.
    let available_pkgids: HashSet<String> = items.iter().map(|i| i.sha256.clone()).collect();

    let primary = generate_primary_xml(&packages, Codec::Gzip)?;
    tokio::fs::write(repodata_dir.join(&primary.filename), &primary.content).await?;
    let mut metadata_files = vec![primary];

    for file in files {
        match file.file_type.as_str() {
            "repomd" | "primary" => continue,
            "treeinfo" => {
                let dest = kickstart_target_path(target, "treeinfo", &file.original_path);
                pool.link(Namespace::Files, &file.sha256, ".treeinfo", &dest).await?;
            }
            "kickstart" => {
                let filename = basename(&file.original_path);
                let dest = kickstart_target_path(target, "kickstart", &file.original_path);
                pool.link(Namespace::Files, &file.sha256, &filename, &dest).await?;
            }
            "updateinfo" if mode == RepositoryMode::Filtered => {
                let filename = basename(&file.original_path);
                let raw = tokio::fs::read(pool.object_path(Namespace::Files, &file.sha256, &filename)).await?;
                let filtered = filter_updateinfo(&raw, &filename, &packages)?;
                tokio::fs::write(repodata_dir.join(&filename), &filtered).await?;
                metadata_files.push(crate::formats::rpm::publisher::MetadataFile {
                    file_type: file.file_type.clone(),
                    filename,
                    content: filtered,
                });
            }
            "filelists" | "other" if mode == RepositoryMode::Filtered => {
                let filename = basename(&file.original_path);
                let raw = tokio::fs::read(pool.object_path(Namespace::Files, &file.sha256, &filename)).await?;
                let filtered = filter_packages_by_pkgid(&raw, &filename, &available_pkgids)?;
                tokio::fs::write(repodata_dir.join(&filename), &filtered).await?;
                metadata_files.push(crate::formats::rpm::publisher::MetadataFile {
                    file_type: file.file_type.clone(),
                    filename,
                    content: filtered,
                });
            }
            _ => {
                let filename = basename(&file.original_path);
                let dest = repodata_dir.join(&filename);
                pool.link(Namespace::Files, &file.sha256, &filename, &dest).await?;
                let raw = tokio::fs::read(&dest).await?;
                metadata_files.push(crate::formats::rpm::publisher::MetadataFile {
                    file_type: file.file_type.clone(),
                    filename,
                    content: raw,
                });
            }
        }
    }

    let revision = crate::catalog::now().unix_timestamp();
    let repomd = generate_repomd_xml(&metadata_files, revision)?;
    tokio::fs::write(repodata_dir.join("repomd.xml"), &repomd).await?;

    Ok(())
}
