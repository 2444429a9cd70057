//! Alpine repository publishing: `.apk` hardlinks plus regenerated
//! `APKINDEX.tar.gz` (§4.8.4). Grounded on
//! `original_source/plugins/apk/__init__.py::ApkPublisher`.

use crate::error::{ChantalError, Result};

use super::ApkPackage;

fn stanza_for(pkg: &ApkPackage) -> String {
    let mut lines = vec![
        format!("C:{}", pkg.checksum),
        format!("P:{}", pkg.name),
        format!("V:{}", pkg.version),
        format!("A:{}", pkg.architecture),
        format!("S:{}", pkg.size_bytes),
    ];
    if let Some(v) = pkg.installed_size {
        lines.push(format!("I:{v}"));
    }
    if let Some(v) = &pkg.description {
        lines.push(format!("T:{v}"));
    }
    if let Some(v) = &pkg.url {
        lines.push(format!("U:{v}"));
    }
    if let Some(v) = &pkg.license {
        lines.push(format!("L:{v}"));
    }
    if let Some(v) = &pkg.dependencies {
        lines.push(format!("D:{v}"));
    }
    if let Some(v) = &pkg.provides {
        lines.push(format!("p:{v}"));
    }
    if let Some(v) = &pkg.origin {
        lines.push(format!("o:{v}"));
    }
    if let Some(v) = &pkg.maintainer {
        lines.push(format!("m:{v}"));
    }
    if let Some(v) = pkg.build_time {
        lines.push(format!("t:{v}"));
    }
    lines.join("\n")
}

/// Renders `APKINDEX` (the plain-text member, before tar+gzip wrapping).
pub fn generate_apkindex_text(packages: &[ApkPackage]) -> String {
    let mut content = packages.iter().map(stanza_for).collect::<Vec<_>>().join("\n\n");
    content.push('\n');
    content
}

/// Wraps `APKINDEX`'s text into a single-member `APKINDEX.tar.gz`, the way
/// the upstream publisher does via `tarfile.open(..., "w:gz")`.
pub fn generate_apkindex_tar_gz(packages: &[ApkPackage]) -> Result<Vec<u8>> {
    let content = generate_apkindex_text(packages);

    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_path("APKINDEX").map_err(|e| ChantalError::Integrity(e.to_string()))?;
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append(&header, content.as_bytes())
        .map_err(|e| ChantalError::Integrity(e.to_string()))?;
    let tar_bytes = builder.into_inner().map_err(|e| ChantalError::Integrity(e.to_string()))?;

    crate::compression::compress_with(crate::compression::Codec::Gzip, &tar_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::apk::parsers::{extract_apkindex, parse_apkindex};

    fn pkg(name: &str) -> ApkPackage {
        ApkPackage {
            name: name.to_string(),
            version: "1.0-r0".to_string(),
            architecture: "x86_64".to_string(),
            checksum: "Q1abc".to_string(),
            size_bytes: 100,
            installed_size: Some(300),
            description: Some("A package".to_string()),
            url: None,
            license: Some("MIT".to_string()),
            dependencies: None,
            provides: None,
            origin: None,
            maintainer: Some("Alpine Team".to_string()),
            build_time: Some(1700000000),
        }
    }

    #[test]
    fn round_trips_apkindex_through_tar_gz() {
        let packages = vec![pkg("curl")];
        let archive = generate_apkindex_tar_gz(&packages).unwrap();
        let extracted = extract_apkindex(&archive).unwrap();
        let parsed = parse_apkindex(&extracted);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "curl");
        assert_eq!(parsed[0].license.as_deref(), Some("MIT"));
    }
}
