//! `APKINDEX` text format parsing (inside `APKINDEX.tar.gz`). Grounded on
//! `original_source/plugins/apk/__init__.py::ApkSyncer._parse_apkindex`.

use std::collections::BTreeMap;
use std::io::Read;

use crate::error::{ChantalError, Result};

use super::ApkPackage;

fn field_name(prefix: char) -> Option<&'static str> {
    match prefix {
        'C' => Some("checksum"),
        'P' => Some("name"),
        'V' => Some("version"),
        'A' => Some("architecture"),
        'S' => Some("size"),
        'I' => Some("installed_size"),
        'T' => Some("description"),
        'U' => Some("url"),
        'L' => Some("license"),
        'D' => Some("dependencies"),
        'p' => Some("provides"),
        'o' => Some("origin"),
        'm' => Some("maintainer"),
        't' => Some("build_time"),
        _ => None,
    }
}

const REQUIRED: &[&str] = &["checksum", "name", "version", "architecture", "size"];

/// Parses `APKINDEX`'s one-letter-prefixed stanza format, skipping records
/// missing a required field (§4.4 APK).
pub fn parse_apkindex(content: &str) -> Vec<ApkPackage> {
    let mut packages = Vec::new();
    let mut current: BTreeMap<&'static str, String> = BTreeMap::new();

    let finish = |current: &mut BTreeMap<&'static str, String>, packages: &mut Vec<ApkPackage>| {
        if current.is_empty() {
            return;
        }
        if REQUIRED.iter().all(|f| current.contains_key(f)) {
            let size_bytes = current.get("size").and_then(|v| v.parse().ok()).unwrap_or(0);
            packages.push(ApkPackage {
                name: current.get("name").cloned().unwrap_or_default(),
                version: current.get("version").cloned().unwrap_or_default(),
                architecture: current.get("architecture").cloned().unwrap_or_default(),
                checksum: current.get("checksum").cloned().unwrap_or_default(),
                size_bytes,
                installed_size: current.get("installed_size").and_then(|v| v.parse().ok()),
                description: current.get("description").cloned(),
                url: current.get("url").cloned(),
                license: current.get("license").cloned(),
                dependencies: current.get("dependencies").cloned(),
                provides: current.get("provides").cloned(),
                origin: current.get("origin").cloned(),
                maintainer: current.get("maintainer").cloned(),
                build_time: current.get("build_time").and_then(|v| v.parse().ok()),
            });
        }
        current.clear();
    };

    for raw_line in content.split('\n') {
        let line = raw_line.trim_end();
        if line.is_empty() {
            finish(&mut current, &mut packages);
            continue;
        }
        if let Some((prefix, value)) = line.split_once(':') {
            if let Some(name) = prefix.chars().next().filter(|_| prefix.len() == 1).and_then(field_name) {
                current.insert(name, value.trim().to_string());
            }
        }
    }
    finish(&mut current, &mut packages);

    packages
}

/// Extracts the `APKINDEX` member from `APKINDEX.tar.gz`'s raw bytes.
pub fn extract_apkindex(tar_gz: &[u8]) -> Result<String> {
    let decompressed = crate::compression::decompress_with(crate::compression::Codec::Gzip, tar_gz)?;
    let mut archive = tar::Archive::new(decompressed.as_slice());
    for entry in archive.entries().map_err(|e| ChantalError::Parse {
        what: "APKINDEX.tar.gz".to_string(),
        reason: e.to_string(),
    })? {
        let mut entry = entry.map_err(|e| ChantalError::Parse {
            what: "APKINDEX.tar.gz".to_string(),
            reason: e.to_string(),
        })?;
        let path = entry
            .path()
            .map_err(|e| ChantalError::Parse {
                what: "APKINDEX.tar.gz".to_string(),
                reason: e.to_string(),
            })?
            .to_string_lossy()
            .into_owned();
        if path == "APKINDEX" || path.ends_with("/APKINDEX") {
            let mut content = String::new();
            entry.read_to_string(&mut content).map_err(|e| ChantalError::Parse {
                what: "APKINDEX".to_string(),
                reason: e.to_string(),
            })?;
            return Ok(content);
        }
    }
    Err(ChantalError::Parse {
        what: "APKINDEX.tar.gz".to_string(),
        reason: "APKINDEX member not found in archive".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const APKINDEX: &str = "\
C:Q1abcdefgh==\nP:curl\nV:8.5.0-r0\nA:x86_64\nS:123456\nI:300000\nT:URL retrieval utility\nL:MIT\nD:so:libc.so.6\no:curl\nm:Natanael Copa\nt:1700000000\n\n\
C:Q1zzz\nP:incomplete\nV:1.0\n";

    #[test]
    fn parses_complete_record_and_skips_incomplete_one() {
        let packages = parse_apkindex(APKINDEX);
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].name, "curl");
        assert_eq!(packages[0].size_bytes, 123456);
        assert_eq!(packages[0].maintainer.as_deref(), Some("Natanael Copa"));
    }
}
