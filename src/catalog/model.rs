//! Catalog entity structs (spec §3). `content_metadata`/`file_metadata` are
//! tagged enums stored through `sqlx::types::Json`, per DESIGN NOTES §9.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "content_type", rename_all = "lowercase")]
pub enum ContentMetadata {
    Rpm {
        arch: String,
        epoch: Option<String>,
        release: String,
        group: Option<String>,
        license: Option<String>,
        vendor: Option<String>,
        sourcerpm: Option<String>,
        summary: Option<String>,
        description: Option<String>,
    },
    Deb {
        architecture: String,
        component: String,
        priority: Option<String>,
        section: Option<String>,
        depends: Option<String>,
        maintainer: Option<String>,
        description: Option<String>,
        extra_fields: std::collections::BTreeMap<String, String>,
    },
    Helm {
        app_version: Option<String>,
        description: Option<String>,
        urls: Vec<String>,
    },
    Apk {
        architecture: String,
        checksum: String,
        origin: Option<String>,
        maintainer: Option<String>,
        license: Option<String>,
        description: Option<String>,
        build_time: Option<i64>,
    },
}

impl ContentMetadata {
    pub fn architecture(&self) -> Option<&str> {
        match self {
            ContentMetadata::Rpm { arch, .. } => Some(arch),
            ContentMetadata::Deb { architecture, .. } => Some(architecture),
            ContentMetadata::Apk { architecture, .. } => Some(architecture),
            ContentMetadata::Helm { .. } => None,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ContentItem {
    pub id: i64,
    pub content_type: String,
    pub name: String,
    pub version: String,
    pub sha256: String,
    pub size_bytes: i64,
    pub filename: String,
    pub pool_path: String,
    pub content_metadata: Json<ContentMetadata>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "file_type", rename_all = "snake_case")]
pub enum FileMetadata {
    Generic {
        checksum_type: String,
    },
    RpmMetadata {
        data_type: String,
        open_checksum: Option<String>,
        open_size: Option<i64>,
    },
    DebMetadata {
        component: Option<String>,
        architecture: Option<String>,
    },
    Kickstart,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RepositoryFile {
    pub id: i64,
    pub file_category: String,
    pub file_type: String,
    pub sha256: String,
    pub pool_path: String,
    pub original_path: String,
    pub size_bytes: i64,
    pub file_metadata: Json<FileMetadata>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Repository {
    pub id: i64,
    pub repo_id: String,
    pub name: String,
    pub repo_type: String,
    pub feed: String,
    pub enabled: bool,
    pub mode: String,
    pub last_sync_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Snapshot {
    pub id: i64,
    pub repository_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub package_count: i64,
    pub total_size_bytes: i64,
    pub is_published: bool,
    pub published_path: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct View {
    pub id: i64,
    pub view_id: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ViewRepository {
    pub view_id: i64,
    pub repository_id: i64,
    pub order_index: i32,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ViewSnapshot {
    pub id: i64,
    pub view_id: i64,
    pub name: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncHistory {
    pub id: i64,
    pub repository_id: i64,
    pub started_at: OffsetDateTime,
    pub completed_at: Option<OffsetDateTime>,
    pub status: String,
    pub packages_added: i64,
    pub packages_removed: i64,
    pub packages_updated: i64,
    pub bytes_downloaded: i64,
    pub error_message: Option<String>,
}
