//! Configuration model and loader.
//!
//! Generalizes the teacher's flat TOML `[config]`/`[[branch]]` shape (see
//! `original_source` for the richer Pydantic model this was distilled from)
//! into the nested YAML schema of SPEC_FULL.md §6/§4.11.

use std::{collections::HashSet, fs, path::Path};

use anyhow::{bail, Context, Result};
use log::warn;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryType {
    Rpm,
    Apt,
    Helm,
    Apk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryMode {
    Mirror,
    Filtered,
    Hosted,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    pub base_path: String,
    #[serde(default = "default_pool_path")]
    pub pool_path: String,
    #[serde(default = "default_published_path")]
    pub published_path: String,
    #[serde(default = "default_temp_path")]
    pub temp_path: String,
}

fn default_pool_path() -> String {
    "pool".into()
}
fn default_published_path() -> String {
    "published".into()
}
fn default_temp_path() -> String {
    "tmp".into()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyConfig {
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub no_proxy: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SslConfig {
    #[serde(default = "default_true")]
    pub verify: bool,
    pub ca_bundle: Option<String>,
    pub ca_cert: Option<String>,
    pub client_cert: Option<String>,
    pub client_key: Option<String>,
    /// Directory to auto-discover `*.pem`/`*-key.pem` pairs from (§4.2).
    pub client_cert_dir: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientCertAuth {
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    pub cert_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BearerAuth {
    pub token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomAuth {
    #[serde(default)]
    pub headers: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum AuthConfig {
    ClientCert(#[serde(flatten)] ClientCertAuth),
    Basic(#[serde(flatten)] BasicAuth),
    Bearer(#[serde(flatten)] BearerAuth),
    Custom(#[serde(flatten)] CustomAuth),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_parallel")]
    pub parallel: usize,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_retries")]
    pub retry_attempts: u32,
    #[serde(default = "default_true")]
    pub verify_checksum: bool,
}

fn default_backend() -> String {
    "reqwest".into()
}
fn default_parallel() -> usize {
    1
}
fn default_timeout() -> u64 {
    30
}
fn default_retries() -> u32 {
    3
}

impl Default for DownloadConfig {
    fn default() -> Self {
        DownloadConfig {
            backend: default_backend(),
            parallel: default_parallel(),
            timeout: default_timeout(),
            retry_attempts: default_retries(),
            verify_checksum: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub max_age_hours: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatternFilters {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostProcessingFilters {
    #[serde(default)]
    pub only_latest_version: bool,
    pub only_latest_n_versions: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RpmFilters {
    pub group: Option<Vec<String>>,
    pub license: Option<Vec<String>>,
    pub vendor: Option<Vec<String>>,
    pub epoch: Option<Vec<String>>,
    #[serde(default)]
    pub drop_source_rpms: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DebFilters {
    pub component: Option<Vec<String>>,
    pub priority: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FiltersConfig {
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub newer_than: Option<String>,
    pub older_than: Option<String>,
    pub last_n_days: Option<u64>,
    pub architecture: Option<PatternFilters>,
    pub rpm: Option<RpmFilters>,
    pub deb: Option<DebFilters>,
    pub patterns: Option<PatternFilters>,
    pub post_processing: Option<PostProcessingFilters>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AptOptions {
    /// Suite/codename to mirror, joined onto `feed` as `dists/<distribution>/`
    /// (§4.6 DEB). The original plugin keeps `feed` pointed at the
    /// repository root and resolves `dists_url` from this field rather than
    /// requiring one `RepositoryConfig` per distribution.
    #[serde(default)]
    pub distribution: String,
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub architectures: Vec<String>,
    #[serde(default)]
    pub include_source_packages: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApkOptions {
    /// e.g. `v3.19` (§4.6 APK: `{feed}/{branch}/{repository}/{architecture}/`).
    #[serde(default)]
    pub branch: String,
    /// Subrepository, e.g. `main`/`community`.
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub architecture: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublishConfig {
    pub base_url: Option<String>,
    pub compression: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub repo_type: RepositoryType,
    pub feed: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub mode: RepositoryMode,
    pub auth: Option<AuthConfig>,
    pub proxy: Option<ProxyConfig>,
    pub ssl: Option<SslConfig>,
    pub filters: Option<FiltersConfig>,
    pub apt: Option<AptOptions>,
    pub apk: Option<ApkOptions>,
    pub publish: Option<PublishConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewConfig {
    pub id: String,
    pub repositories: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GlobalConfig {
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub storage: StorageConfig,
    pub proxy: Option<ProxyConfig>,
    pub ssl: Option<SslConfig>,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,
    #[serde(default)]
    pub views: Vec<ViewConfig>,
    pub include: Option<String>,
}

/// Loads `path`, expanding any top-level `include: "<glob>"` by
/// concatenating the matched files' `repositories`/`views` lists onto the
/// root document's, in glob-sort order (§4.11).
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<GlobalConfig> {
    let text = fs::read_to_string(path.as_ref())
        .with_context(|| format!("reading config file {}", path.as_ref().display()))?;
    let mut config: GlobalConfig = serde_yaml::from_str(&text)
        .with_context(|| format!("parsing config file {}", path.as_ref().display()))?;

    if let Some(pattern) = config.include.take() {
        let base = path
            .as_ref()
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&pattern);
        let mut matches: Vec<_> = glob::glob(&base.to_string_lossy())
            .with_context(|| format!("invalid include glob {pattern}"))?
            .filter_map(|r| r.ok())
            .collect();
        matches.sort();
        for included_path in matches {
            let text = fs::read_to_string(&included_path)
                .with_context(|| format!("reading included config {}", included_path.display()))?;
            let included: GlobalConfig = serde_yaml::from_str(&text)
                .with_context(|| format!("parsing included config {}", included_path.display()))?;
            config.repositories.extend(included.repositories);
            config.views.extend(included.views);
        }
    }

    validate_config(&config)?;

    Ok(config)
}

/// Post-deserialize validation equivalent to the original's Pydantic
/// validators: mirror-mode repos may not declare filters, a `deb` filter
/// block only makes sense on an `apt` repository, and views may only
/// reference known repositories of a single type.
pub fn validate_config(config: &GlobalConfig) -> Result<()> {
    let mut ids = HashSet::new();
    for repo in &config.repositories {
        if !ids.insert(repo.id.as_str()) {
            bail!("duplicate repository id: {}", repo.id);
        }
        if repo.mode == RepositoryMode::Mirror && repo.filters.is_some() {
            bail!(
                "repository '{}' is in mirror mode and may not declare filters",
                repo.id
            );
        }
        if let Some(filters) = &repo.filters {
            if filters.deb.is_some() && repo.repo_type != RepositoryType::Apt {
                bail!(
                    "repository '{}' declares a deb filter block but is not type apt",
                    repo.id
                );
            }
            if filters.rpm.is_some() && repo.repo_type != RepositoryType::Rpm {
                bail!(
                    "repository '{}' declares an rpm filter block but is not type rpm",
                    repo.id
                );
            }
        }
    }
    for view in &config.views {
        let mut repo_type = None;
        for repo_id in &view.repositories {
            let repo = config
                .repositories
                .iter()
                .find(|r| &r.id == repo_id)
                .ok_or_else(|| {
                    anyhow::anyhow!("view '{}' references unknown repository '{}'", view.id, repo_id)
                })?;
            match repo_type {
                None => repo_type = Some(repo.repo_type),
                Some(t) if t != repo.repo_type => {
                    bail!("view '{}' mixes repository types", view.id)
                }
                _ => {}
            }
        }
    }

    Ok(())
}

pub fn lint_config(config: &GlobalConfig) {
    for repo in &config.repositories {
        if !repo.enabled {
            warn!("repository '{}' is disabled and will be skipped", repo.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_mode_with_filters_is_rejected() {
        let config = GlobalConfig {
            repositories: vec![RepositoryConfig {
                id: "r1".into(),
                repo_type: RepositoryType::Rpm,
                feed: "https://example.com/repo".into(),
                enabled: true,
                mode: RepositoryMode::Mirror,
                auth: None,
                proxy: None,
                ssl: None,
                filters: Some(FiltersConfig::default()),
                apt: None,
                apk: None,
                publish: None,
            }],
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn view_referencing_unknown_repo_is_rejected() {
        let config = GlobalConfig {
            views: vec![ViewConfig {
                id: "v1".into(),
                repositories: vec!["missing".into()],
            }],
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }
}
