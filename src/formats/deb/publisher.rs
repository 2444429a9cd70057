//! APT repository publishing: `dists/SUITE/COMPONENT/binary-ARCH/` package
//! hardlinks plus regenerated `Packages`/`Packages.gz`/`Release` (§4.8.2).
//! Grounded on `original_source/plugins/apt/publisher.py`.

use std::collections::{BTreeMap, BTreeSet};

use sha2::{Digest, Sha256};

use crate::compression::{self, Codec};
use crate::error::Result;

use super::DebPackage;

/// One `Packages` file generated for a (component, architecture) pair.
pub struct PublishedComponentArch {
    pub component: String,
    pub architecture: String,
    pub packages_path: String,
    pub packages_gz_path: String,
    pub packages: Vec<u8>,
    pub packages_gz: Vec<u8>,
}

fn stanza_for(package: &DebPackage) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Package: {}", package.name));
    lines.push(format!("Version: {}", package.version));
    lines.push(format!("Architecture: {}", package.architecture));

    if let Some(v) = &package.maintainer {
        lines.push(format!("Maintainer: {v}"));
    }
    if let Some(v) = package.installed_size {
        lines.push(format!("Installed-Size: {v}"));
    }
    if let Some(v) = &package.depends {
        lines.push(format!("Depends: {v}"));
    }
    if let Some(v) = &package.pre_depends {
        lines.push(format!("Pre-Depends: {v}"));
    }
    if let Some(v) = &package.recommends {
        lines.push(format!("Recommends: {v}"));
    }
    if let Some(v) = &package.suggests {
        lines.push(format!("Suggests: {v}"));
    }
    if let Some(v) = &package.conflicts {
        lines.push(format!("Conflicts: {v}"));
    }
    if let Some(v) = &package.replaces {
        lines.push(format!("Replaces: {v}"));
    }
    if let Some(v) = &package.provides {
        lines.push(format!("Provides: {v}"));
    }
    if let Some(v) = &package.section {
        lines.push(format!("Section: {v}"));
    }
    if let Some(v) = &package.priority {
        lines.push(format!("Priority: {v}"));
    }
    if let Some(v) = &package.homepage {
        lines.push(format!("Homepage: {v}"));
    }

    let mut description = package.description.clone().unwrap_or_default();
    if !description.is_empty() {
        if let Some(long) = &package.long_description {
            description.push('\n');
            for line in long.lines() {
                description.push(' ');
                description.push_str(if line.is_empty() { "." } else { line });
                description.push('\n');
            }
            description.truncate(description.trim_end_matches('\n').len());
        }
        lines.push(format!("Description: {description}"));
    }

    let filename = format!("{}/binary-{}/{}", package.component, package.architecture, package.filename);
    lines.push(format!("Filename: {filename}"));
    lines.push(format!("Size: {}", package.size_bytes));

    if let Some(v) = &package.md5sum {
        lines.push(format!("MD5sum: {v}"));
    }
    if let Some(v) = &package.sha1 {
        lines.push(format!("SHA1: {v}"));
    }
    lines.push(format!("SHA256: {}", package.sha256));

    for (key, value) in &package.extra_fields {
        lines.push(format!("{key}: {value}"));
    }

    lines.join("\n")
}

/// Groups packages by `(component, architecture)`, matching the upstream
/// publisher's grouping before per-arch `Packages` generation.
pub fn group_by_component_arch(packages: &[DebPackage]) -> BTreeMap<(String, String), Vec<&DebPackage>> {
    let mut grouped: BTreeMap<(String, String), Vec<&DebPackage>> = BTreeMap::new();
    for package in packages {
        let key = (package.component.clone(), package.architecture.clone());
        grouped.entry(key).or_default().push(package);
    }
    grouped
}

/// Renders `Packages` (RFC822 stanzas separated by blank lines) and its
/// gzip-compressed counterpart for one component/architecture group.
pub fn generate_packages_file(component: &str, architecture: &str, packages: &[&DebPackage]) -> Result<PublishedComponentArch> {
    let mut stanzas: Vec<String> = packages.iter().map(|p| stanza_for(p)).collect();
    let mut content = stanzas.join("\n\n");
    if !content.is_empty() {
        content.push('\n');
    }
    stanzas.clear();

    let packages_gz = compression::compress_with(Codec::Gzip, content.as_bytes())?;

    let (packages_path, packages_gz_path) = if architecture == "source" {
        (format!("{component}/source/Packages"), format!("{component}/source/Packages.gz"))
    } else {
        (
            format!("{component}/binary-{architecture}/Packages"),
            format!("{component}/binary-{architecture}/Packages.gz"),
        )
    };

    Ok(PublishedComponentArch {
        component: component.to_string(),
        architecture: architecture.to_string(),
        packages_path,
        packages_gz_path,
        packages: content.into_bytes(),
        packages_gz,
    })
}

fn hex_digest(data: &[u8], algo: ChecksumAlgo) -> String {
    match algo {
        ChecksumAlgo::Md5 => {
            use md5::{Digest as _, Md5};
            let mut hasher = Md5::new();
            hasher.update(data);
            faster_hex::hex_string(&hasher.finalize())
        }
        ChecksumAlgo::Sha1 => {
            use sha1::{Digest as _, Sha1};
            let mut hasher = Sha1::new();
            hasher.update(data);
            faster_hex::hex_string(&hasher.finalize())
        }
        ChecksumAlgo::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(data);
            faster_hex::hex_string(&hasher.finalize())
        }
    }
}

#[derive(Clone, Copy)]
enum ChecksumAlgo {
    Md5,
    Sha1,
    Sha256,
}

/// Renders the `Release` file for a distribution, with `MD5Sum`/`SHA1`/
/// `SHA256` checksum blocks over every generated `Packages`/`Packages.gz`
/// (§4.8.2). `now` is passed in since real wall-clock access isn't
/// available at generation time in every caller.
pub fn generate_release_file(
    repository_name: &str,
    distribution: &str,
    date_rfc2822: &str,
    published: &[PublishedComponentArch],
) -> String {
    let mut lines = Vec::new();
    lines.push("Origin: Chantal".to_string());
    lines.push(format!("Label: {repository_name}"));
    lines.push(format!("Suite: {distribution}"));
    lines.push(format!("Codename: {distribution}"));
    lines.push(format!("Date: {date_rfc2822}"));

    let architectures: BTreeSet<&str> = published
        .iter()
        .filter(|p| p.architecture != "source")
        .map(|p| p.architecture.as_str())
        .collect();
    if !architectures.is_empty() {
        lines.push(format!("Architectures: {}", architectures.into_iter().collect::<Vec<_>>().join(" ")));
    }

    let components: BTreeSet<&str> = published.iter().map(|p| p.component.as_str()).collect();
    if !components.is_empty() {
        lines.push(format!("Components: {}", components.into_iter().collect::<Vec<_>>().join(" ")));
    }

    lines.push(format!("Description: {repository_name}"));

    let mut md5sums = Vec::new();
    let mut sha1sums = Vec::new();
    let mut sha256sums = Vec::new();

    for entry in published {
        for (algo_lines, algo) in [
            (&mut md5sums, ChecksumAlgo::Md5),
            (&mut sha1sums, ChecksumAlgo::Sha1),
            (&mut sha256sums, ChecksumAlgo::Sha256),
        ] {
            let packages_digest = hex_digest(&entry.packages, algo);
            algo_lines.push(format!(" {packages_digest} {:>8} {}", entry.packages.len(), entry.packages_path));
            let packages_gz_digest = hex_digest(&entry.packages_gz, algo);
            algo_lines.push(format!(" {packages_gz_digest} {:>8} {}", entry.packages_gz.len(), entry.packages_gz_path));
        }
    }

    if !md5sums.is_empty() {
        lines.push("MD5Sum:".to_string());
        lines.extend(md5sums);
    }
    if !sha1sums.is_empty() {
        lines.push("SHA1:".to_string());
        lines.extend(sha1sums);
    }
    if !sha256sums.is_empty() {
        lines.push("SHA256:".to_string());
        lines.extend(sha256sums);
    }

    let mut content = lines.join("\n");
    content.push('\n');
    content
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(name: &str, component: &str, arch: &str) -> DebPackage {
        DebPackage {
            name: name.to_string(),
            version: "1.0".to_string(),
            architecture: arch.to_string(),
            filename: format!("{name}_1.0_{arch}.deb"),
            size_bytes: 1000,
            sha256: "a".repeat(64),
            component: component.to_string(),
            description: Some("A package".to_string()),
            long_description: None,
            section: None,
            priority: None,
            homepage: None,
            depends: None,
            pre_depends: None,
            recommends: None,
            suggests: None,
            conflicts: None,
            replaces: None,
            provides: None,
            maintainer: None,
            source: None,
            md5sum: None,
            sha1: None,
            installed_size: None,
            extra_fields: BTreeMap::new(),
        }
    }

    #[test]
    fn groups_packages_by_component_and_arch() {
        let packages = vec![pkg("nginx", "main", "amd64"), pkg("vim", "main", "amd64"), pkg("nginx", "universe", "arm64")];
        let grouped = group_by_component_arch(&packages);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[&("main".to_string(), "amd64".to_string())].len(), 2);
    }

    #[test]
    fn generates_packages_file_with_filename_prefixed_by_component() {
        let packages = vec![pkg("nginx", "main", "amd64")];
        let refs: Vec<&DebPackage> = packages.iter().collect();
        let published = generate_packages_file("main", "amd64", &refs).unwrap();
        let content = String::from_utf8(published.packages).unwrap();
        assert!(content.contains("Filename: main/binary-amd64/nginx_1.0_amd64.deb"));
        assert!(content.contains("Package: nginx"));
    }

    #[test]
    fn release_file_lists_architectures_and_components() {
        let packages = vec![pkg("nginx", "main", "amd64")];
        let refs: Vec<&DebPackage> = packages.iter().collect();
        let published = vec![generate_packages_file("main", "amd64", &refs).unwrap()];
        let release = generate_release_file("My Mirror", "jammy", "Thu, 01 Jan 2026 00:00:00 UTC", &published);
        assert!(release.contains("Architectures: amd64"));
        assert!(release.contains("Components: main"));
        assert!(release.contains("SHA256:"));
    }
}
