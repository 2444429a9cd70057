//! RFC822-stanza parsing for APT `Packages`/`Sources`/`Release` files.
//! Grounded on `original_source/plugins/apt/parsers.py`.

use std::collections::BTreeMap;

use super::DebPackage;

/// Parses a single RFC822 stanza (one package record) into a field map,
/// joining continuation lines with `\n` the way the upstream parser does.
pub fn parse_rfc822_stanza(text: &str) -> BTreeMap<String, String> {
    let mut fields: BTreeMap<String, String> = BTreeMap::new();
    let mut current_field: Option<String> = None;
    let mut current_value: Vec<String> = Vec::new();

    for line in text.split('\n') {
        if line.starts_with(' ') || line.starts_with('\t') {
            if current_field.is_some() {
                let continuation = if line.len() > 1 { &line[1..] } else { "" };
                if continuation == "." {
                    current_value.push(String::new());
                } else {
                    current_value.push(continuation.to_string());
                }
            }
        } else if let Some(colon) = line.find(':') {
            if let Some(field) = current_field.take() {
                fields.insert(field, current_value.join("\n"));
            }
            let field_name = line[..colon].trim().to_string();
            let field_value = line[colon + 1..].trim();
            current_value = if field_value.is_empty() {
                Vec::new()
            } else {
                vec![field_value.to_string()]
            };
            current_field = Some(field_name);
        }
    }

    if let Some(field) = current_field {
        fields.insert(field, current_value.join("\n"));
    }

    fields
}

/// Splits an RFC822 file into stanzas on blank lines.
pub fn parse_rfc822_file(content: &str) -> Vec<BTreeMap<String, String>> {
    content
        .split("\n\n")
        .filter_map(|stanza_text| {
            let stanza_text = stanza_text.trim();
            if stanza_text.is_empty() {
                return None;
            }
            let stanza = parse_rfc822_stanza(stanza_text);
            if stanza.is_empty() {
                None
            } else {
                Some(stanza)
            }
        })
        .collect()
}

const KNOWN_PACKAGE_FIELDS: &[&str] = &[
    "Package",
    "Version",
    "Architecture",
    "Filename",
    "Size",
    "SHA256",
    "Description",
    "Section",
    "Priority",
    "Homepage",
    "Bugs",
    "Depends",
    "Pre-Depends",
    "Recommends",
    "Suggests",
    "Enhances",
    "Breaks",
    "Conflicts",
    "Replaces",
    "Provides",
    "Maintainer",
    "Original-Maintainer",
    "Source",
    "Built-Using",
    "Essential",
    "Multi-Arch",
    "MD5sum",
    "SHA1",
    "Installed-Size",
    "Task",
];

/// Parses a `Packages` file (already decompressed) into [`DebPackage`]
/// records, skipping stanzas missing a required field the way the upstream
/// parser does.
pub fn parse_packages_file(content: &str) -> Vec<DebPackage> {
    let mut packages = Vec::new();

    for stanza in parse_rfc822_file(content) {
        let (Some(name), Some(version), Some(architecture), Some(filename), Some(size_str), Some(sha256)) = (
            stanza.get("Package"),
            stanza.get("Version"),
            stanza.get("Architecture"),
            stanza.get("Filename"),
            stanza.get("Size"),
            stanza.get("SHA256"),
        ) else {
            continue;
        };

        let Ok(size_bytes) = size_str.parse::<u64>() else {
            continue;
        };

        let installed_size = stanza.get("Installed-Size").and_then(|v| v.parse::<i64>().ok());

        let (description, long_description) = match stanza.get("Description") {
            Some(d) if d.contains('\n') => {
                let mut parts = d.splitn(2, '\n');
                (parts.next().map(str::to_string), parts.next().map(str::to_string))
            }
            Some(d) => (Some(d.clone()), None),
            None => (None, None),
        };

        let extra_fields: BTreeMap<String, String> = stanza
            .iter()
            .filter(|(k, _)| !KNOWN_PACKAGE_FIELDS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        packages.push(DebPackage {
            name: name.clone(),
            version: version.clone(),
            architecture: architecture.clone(),
            filename: filename.clone(),
            size_bytes,
            sha256: sha256.clone(),
            component: String::new(),
            description,
            long_description,
            section: stanza.get("Section").cloned(),
            priority: stanza.get("Priority").cloned(),
            homepage: stanza.get("Homepage").cloned(),
            depends: stanza.get("Depends").cloned(),
            pre_depends: stanza.get("Pre-Depends").cloned(),
            recommends: stanza.get("Recommends").cloned(),
            suggests: stanza.get("Suggests").cloned(),
            conflicts: stanza.get("Conflicts").cloned(),
            replaces: stanza.get("Replaces").cloned(),
            provides: stanza.get("Provides").cloned(),
            maintainer: stanza.get("Maintainer").cloned(),
            source: stanza.get("Source").cloned(),
            md5sum: stanza.get("MD5sum").cloned(),
            sha1: stanza.get("SHA1").cloned(),
            installed_size,
            extra_fields,
        });
    }

    packages
}

/// One checksummed file entry from a `Release` file's `MD5Sum`/`SHA1`/
/// `SHA256` block.
#[derive(Debug, Clone)]
pub struct ReleaseChecksum {
    pub filename: String,
    pub checksum: String,
    pub size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ReleaseFile {
    pub suite: Option<String>,
    pub codename: Option<String>,
    pub architectures: Vec<String>,
    pub components: Vec<String>,
    pub origin: Option<String>,
    pub label: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub acquire_by_hash: bool,
    pub sha256: Vec<ReleaseChecksum>,
}

fn parse_checksum_block(stanza: &BTreeMap<String, String>, field_name: &str) -> Vec<ReleaseChecksum> {
    let Some(text) = stanza.get(field_name) else {
        return Vec::new();
    };
    text.trim()
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 3 {
                return None;
            }
            let size = parts[1].parse().ok()?;
            Some(ReleaseChecksum {
                checksum: parts[0].to_string(),
                size,
                filename: parts[2].to_string(),
            })
        })
        .collect()
}

/// Strips an inline PGP clearsign wrapper from `InRelease`'s content,
/// leaving the `Release`-shaped stanza text. Content without a
/// `PGP SIGNED MESSAGE` header (plain `Release`) passes through unchanged.
pub fn strip_pgp_armor(content: &str) -> String {
    if !content.contains("-----BEGIN PGP SIGNED MESSAGE-----") {
        return content.to_string();
    }
    let mut content_lines = Vec::new();
    let mut in_content = false;
    for line in content.split('\n') {
        if line.starts_with("Hash:") {
            in_content = true;
            continue;
        }
        if in_content && line.starts_with("-----BEGIN PGP SIGNATURE-----") {
            break;
        }
        if in_content {
            content_lines.push(line);
        }
    }
    content_lines.join("\n")
}

/// Parses a `Release`/`InRelease` file, stripping any inline PGP armor first
/// (§4.4 DEB: `InRelease` is inline PGP-signed).
pub fn parse_release_file(content: &str) -> ReleaseFile {
    let content = strip_pgp_armor(content);
    let stanza = parse_rfc822_stanza(content.trim());

    ReleaseFile {
        suite: stanza.get("Suite").cloned(),
        codename: stanza.get("Codename").cloned(),
        architectures: stanza.get("Architectures").map(|v| v.split_whitespace().map(str::to_string).collect()).unwrap_or_default(),
        components: stanza.get("Components").map(|v| v.split_whitespace().map(str::to_string).collect()).unwrap_or_default(),
        origin: stanza.get("Origin").cloned(),
        label: stanza.get("Label").cloned(),
        description: stanza.get("Description").cloned(),
        date: stanza.get("Date").cloned(),
        acquire_by_hash: stanza.get("Acquire-By-Hash").map(|v| v.eq_ignore_ascii_case("yes")).unwrap_or(false),
        sha256: parse_checksum_block(&stanza, "SHA256"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_continuation_lines_with_newline() {
        let stanza = parse_rfc822_stanza("Package: nginx\nDescription: Small server\n Longer line\n .\n Another paragraph");
        assert_eq!(stanza.get("Package").unwrap(), "nginx");
        assert_eq!(stanza.get("Description").unwrap(), "Small server\nLonger line\n\nAnother paragraph");
    }

    #[test]
    fn parses_packages_file_with_one_stanza() {
        let content = "Package: nginx\nVersion: 1.18.0-0ubuntu1\nArchitecture: amd64\nFilename: pool/main/n/nginx/nginx_1.18.0-0ubuntu1_amd64.deb\nSize: 354232\nSHA256: 5e6f7a8b\n";
        let packages = parse_packages_file(content);
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].name, "nginx");
        assert_eq!(packages[0].size_bytes, 354232);
    }

    #[test]
    fn skips_stanza_missing_required_field() {
        let content = "Package: nginx\nVersion: 1.18.0\n";
        assert!(parse_packages_file(content).is_empty());
    }

    #[test]
    fn strips_pgp_clearsign_wrapper_before_parsing() {
        let content = "-----BEGIN PGP SIGNED MESSAGE-----\nHash: SHA256\n\nSuite: jammy\nCodename: jammy\n-----BEGIN PGP SIGNATURE-----\nabc\n-----END PGP SIGNATURE-----\n";
        let release = parse_release_file(content);
        assert_eq!(release.suite.as_deref(), Some("jammy"));
    }

    #[test]
    fn parses_release_file_checksums() {
        let content = "Suite: jammy\nCodename: jammy\nArchitectures: amd64 arm64\nComponents: main universe\nSHA256:\n abc123 12345 main/binary-amd64/Packages.gz\n";
        let release = parse_release_file(content);
        assert_eq!(release.suite.as_deref(), Some("jammy"));
        assert_eq!(release.architectures, vec!["amd64", "arm64"]);
        assert_eq!(release.sha256.len(), 1);
        assert_eq!(release.sha256[0].filename, "main/binary-amd64/Packages.gz");
    }
}
