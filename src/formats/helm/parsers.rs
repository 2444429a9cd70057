//! `index.yaml` parsing for Helm chart repositories. Grounded on
//! `original_source/plugins/helm/__init__.py::HelmSyncer._parse_index`.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::{ChantalError, Result};

use super::HelmChart;

#[derive(Debug, Deserialize)]
struct IndexFile {
    #[serde(default)]
    entries: BTreeMap<String, Vec<IndexEntry>>,
}

#[derive(Debug, Deserialize)]
struct IndexEntry {
    name: String,
    version: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "appVersion", default)]
    app_version: Option<String>,
    #[serde(default)]
    digest: Option<String>,
    #[serde(default)]
    urls: Vec<String>,
    #[serde(default)]
    home: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

/// Strips the control characters YAML disallows, the way the upstream
/// fetcher sanitizes `index.yaml` before parsing (some repositories embed
/// stray bytes in chart descriptions).
pub fn sanitize_yaml(content: &str) -> String {
    content
        .chars()
        .filter(|&c| {
            let code = c as u32;
            !((0x00..=0x08).contains(&code) || (0x0b..=0x0c).contains(&code) || (0x0e..=0x1f).contains(&code) || (0x7f..=0x9f).contains(&code))
        })
        .collect()
}

/// Parses `index.yaml` into a flat list of chart version entries, one per
/// `entries.<name>[*]` item.
pub fn parse_index_yaml(content: &str) -> Result<Vec<HelmChart>> {
    let sanitized = sanitize_yaml(content);
    let index: IndexFile = serde_yaml::from_str(&sanitized).map_err(|e| ChantalError::Parse {
        what: "index.yaml".to_string(),
        reason: e.to_string(),
    })?;

    let mut charts = Vec::new();
    for (_name, versions) in index.entries {
        for entry in versions {
            let sha256 = entry.digest.as_deref().and_then(|d| d.strip_prefix("sha256:")).map(str::to_string);
            charts.push(HelmChart {
                name: entry.name,
                version: entry.version,
                sha256: sha256.unwrap_or_default(),
                urls: entry.urls,
                description: entry.description,
                app_version: entry.app_version,
                home: entry.home,
                keywords: entry.keywords,
                size_bytes: 0,
                filename: String::new(),
            });
        }
    }

    Ok(charts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX_YAML: &str = r#"
apiVersion: v1
entries:
  nginx:
    - name: nginx
      version: 1.2.3
      description: Web server
      appVersion: "1.25.0"
      digest: sha256:abcdef0123456789
      urls:
        - nginx-1.2.3.tgz
"#;

    #[test]
    fn parses_one_chart_entry() {
        let charts = parse_index_yaml(INDEX_YAML).unwrap();
        assert_eq!(charts.len(), 1);
        assert_eq!(charts[0].name, "nginx");
        assert_eq!(charts[0].sha256, "abcdef0123456789");
        assert_eq!(charts[0].urls, vec!["nginx-1.2.3.tgz"]);
    }

    #[test]
    fn sanitize_removes_control_characters() {
        let dirty = "name: nginx\x01\x1f";
        let cleaned = sanitize_yaml(dirty);
        assert!(!cleaned.contains('\x01'));
        assert!(cleaned.contains("name: nginx"));
    }
}
