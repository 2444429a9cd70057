//! Helm repository publishing: chart `.tgz` hardlinks plus `index.yaml`,
//! either hardlinked straight from the pool (mirror mode) or regenerated
//! from chart records (filtered mode). Grounded on
//! `original_source/plugins/helm/publisher.py`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{ChantalError, Result};

use super::HelmChart;

#[derive(Debug, Serialize)]
struct IndexEntry {
    name: String,
    version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(rename = "appVersion", skip_serializing_if = "Option::is_none")]
    app_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    home: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    keywords: Vec<String>,
    urls: Vec<String>,
    digest: String,
}

#[derive(Debug, Serialize)]
struct IndexFile {
    #[serde(rename = "apiVersion")]
    api_version: String,
    entries: BTreeMap<String, Vec<IndexEntry>>,
    generated: String,
}

/// Renders `index.yaml` from chart records, pointing each entry's `urls`
/// at either `base_url/filename` (if configured) or the bare filename, and
/// overwriting `digest` with the chart's real pool SHA256 (§4.8.3).
pub fn generate_index_yaml(charts: &[HelmChart], base_url: Option<&str>, generated_at: &str) -> Result<String> {
    let mut entries: BTreeMap<String, Vec<IndexEntry>> = BTreeMap::new();

    for chart in charts {
        let urls = match base_url {
            Some(base) => vec![format!("{}/{}", base.trim_end_matches('/'), chart.filename)],
            None => vec![chart.filename.clone()],
        };

        entries.entry(chart.name.clone()).or_default().push(IndexEntry {
            name: chart.name.clone(),
            version: chart.version.clone(),
            description: chart.description.clone(),
            app_version: chart.app_version.clone(),
            home: chart.home.clone(),
            keywords: chart.keywords.clone(),
            urls,
            digest: format!("sha256:{}", chart.sha256),
        });
    }

    let index = IndexFile {
        api_version: "v1".to_string(),
        entries,
        generated: generated_at.to_string(),
    };

    serde_yaml::to_string(&index).map_err(|e| ChantalError::Parse {
        what: "index.yaml".to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chart(name: &str, version: &str) -> HelmChart {
        HelmChart {
            name: name.to_string(),
            version: version.to_string(),
            sha256: "a".repeat(64),
            urls: vec![],
            description: Some("A chart".to_string()),
            app_version: Some("2.0.0".to_string()),
            home: None,
            keywords: vec![],
            size_bytes: 1000,
            filename: format!("{name}-{version}.tgz"),
        }
    }

    #[test]
    fn generates_index_with_rewritten_urls_and_digest() {
        let charts = vec![chart("nginx", "1.2.3")];
        let yaml = generate_index_yaml(&charts, Some("https://charts.example.com"), "2026-01-01T00:00:00Z").unwrap();
        assert!(yaml.contains("https://charts.example.com/nginx-1.2.3.tgz"));
        assert!(yaml.contains(&format!("sha256:{}", "a".repeat(64))));
    }

    #[test]
    fn groups_multiple_versions_under_one_name() {
        let charts = vec![chart("nginx", "1.2.3"), chart("nginx", "1.3.0")];
        let yaml = generate_index_yaml(&charts, None, "2026-01-01T00:00:00Z").unwrap();
        assert!(yaml.contains("1.2.3"));
        assert!(yaml.contains("1.3.0"));
    }
}
