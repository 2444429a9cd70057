//! RPM/DNF repository support (§4.4 RPM, §4.8.1).

pub mod parsers;
pub mod publisher;
pub mod updateinfo;

pub use parsers::{InstallerFile, MetadataEntry};

use crate::filter::Filterable;

/// A single package record parsed from `primary.xml`.
#[derive(Debug, Clone)]
pub struct RpmPackage {
    pub name: String,
    pub version: String,
    pub release: String,
    pub epoch: String,
    pub arch: String,
    pub sha256: String,
    pub size_bytes: u64,
    pub location: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub build_time: Option<i64>,
    pub group: Option<String>,
    pub license: Option<String>,
    pub vendor: Option<String>,
    pub sourcerpm: Option<String>,
}

impl RpmPackage {
    /// `name-version-release.arch`, used as the pkgid in `updateinfo.xml`
    /// filtering and as the regenerated `primary.xml`'s default sort key.
    pub fn nvra(&self) -> String {
        format!("{}-{}-{}.{}", self.name, self.version, self.release, self.arch)
    }
}

impl Filterable for RpmPackage {
    fn name(&self) -> &str {
        &self.name
    }
    fn version(&self) -> &str {
        &self.version
    }
    fn release(&self) -> &str {
        &self.release
    }
    fn epoch(&self) -> &str {
        &self.epoch
    }
    fn arch(&self) -> Option<&str> {
        Some(&self.arch)
    }
    fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
    fn build_time(&self) -> Option<i64> {
        self.build_time
    }
    fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }
    fn license(&self) -> Option<&str> {
        self.license.as_deref()
    }
    fn vendor(&self) -> Option<&str> {
        self.vendor.as_deref()
    }
    fn is_source(&self) -> bool {
        self.arch == "src" || self.arch == "nosrc"
    }
}
