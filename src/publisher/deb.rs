//! APT publish (§4.8.2): `dists/<suite>/<component>/binary-<arch>/`
//! hardlinks, regenerated `Packages`/`Packages.gz`, and a regenerated
//! `Release` carrying MD5/SHA-1/SHA-256 of each. Mirror mode additionally
//! preserves the upstream `InRelease`/`Release`/`Release.gpg` verbatim so
//! their signature stays valid; filtered mode warns that it can't.

use std::path::Path;

use log::warn;
use time::format_description::well_known::Rfc2822;

use crate::{
    catalog::model::{ContentItem, ContentMetadata, RepositoryFile},
    config::{RepositoryConfig, RepositoryMode},
    error::Result,
    formats::deb::{
        publisher::{generate_packages_file, generate_release_file, group_by_component_arch},
        DebPackage,
    },
    pool::{Namespace, Pool},
};

use super::basename;

fn to_deb_package(item: &ContentItem) -> DebPackage {
    let (architecture, component, priority, section, depends, maintainer, description, extra_fields) = match &item.content_metadata.0 {
        ContentMetadata::Deb {
            architecture,
            component,
            priority,
            section,
            depends,
            maintainer,
            description,
            extra_fields,
        } => (
            architecture.clone(),
            component.clone(),
            priority.clone(),
            section.clone(),
            depends.clone(),
            maintainer.clone(),
            description.clone(),
            extra_fields.clone(),
        ),
        _ => unreachable!("deb publisher given a non-deb content item"),
    };

    DebPackage {
        name: item.name.clone(),
        version: item.version.clone(),
        architecture,
        filename: item.filename.clone(),
        size_bytes: item.size_bytes as u64,
        sha256: item.sha256.clone(),
        component,
        description,
        long_description: None,
        section,
        priority,
        homepage: None,
        depends,
        pre_depends: None,
        recommends: None,
        suggests: None,
        conflicts: None,
        replaces: None,
        provides: None,
        maintainer,
        source: None,
        md5sum: None,
        sha1: None,
        installed_size: None,
        extra_fields,
    }
}

/// Materializes an APT suite: per-`(component, architecture)` package
/// hardlinks and regenerated `Packages`/`Packages.gz`, plus a regenerated
/// `Release`.
pub async fn publish(
    pool: &Pool,
    repo_cfg: &RepositoryConfig,
    items: &[ContentItem],
    files: &[RepositoryFile],
    mode: RepositoryMode,
    target: &Path,
) -> Result<()> {
    let apt = repo_cfg.apt.clone().unwrap_or_default();
    let dists_dir = target.join("dists").join(&apt.distribution);
    tokio::fs::create_dir_all(&dists_dir).await?;

    let packages: Vec<DebPackage> = items.iter().map(to_deb_package).collect();
    let grouped = group_by_component_arch(&packages);

    let mut published = Vec::new();
    for ((component, architecture), pkgs) in &grouped {
        let dir = dists_dir.join(component).join(format!("binary-{architecture}"));
        tokio::fs::create_dir_all(&dir).await?;
        for pkg in pkgs {
            let dest = dir.join(&pkg.filename);
            pool.link(Namespace::Content, &pkg.sha256, &pkg.filename, &dest).await?;
        }

        let generated = generate_packages_file(component, architecture, pkgs)?;
        tokio::fs::write(dists_dir.join(&generated.packages_path), &generated.packages).await?;
        tokio::fs::write(dists_dir.join(&generated.packages_gz_path), &generated.packages_gz).await?;
        published.push(generated);
    }

    if mode == RepositoryMode::Mirror {
        // `Release` itself is always regenerated below (its checksums must
        // match the hardlinked `Packages`/`Packages.gz` placed just now);
        // only the detached signature artifacts are preserved verbatim.
        for file in files {
            if matches!(file.file_type.as_str(), "inrelease" | "release_gpg") {
                let filename = basename(&file.original_path);
                let dest = dists_dir.join(&filename);
                pool.link(Namespace::Files, &file.sha256, &filename, &dest).await?;
            }
        }
    } else {
        warn!(
            "deb publish: repository '{}' is filtered; upstream signatures are no longer valid, configure clients for insecure repositories",
            repo_cfg.id
        );
    }

    let now = crate::catalog::now();
    let date = now.format(&Rfc2822).unwrap_or_default();
    let release = generate_release_file(&repo_cfg.id, &apt.distribution, &date, &published);
    tokio::fs::write(dists_dir.join("Release"), release.as_bytes()).await?;

    Ok(())
}
