//! HTTP download abstraction (§4.2). One client per sync session, configured
//! from a repository's effective proxy/TLS/auth settings (repo overrides
//! global). Grounded on `original_source/core/downloader.py`'s
//! `RequestsBackend`, translated onto `reqwest`.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use log::warn;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use crate::{
    config::{AuthConfig, DownloadConfig, ProxyConfig, RepositoryConfig, SslConfig},
    error::{ChantalError, Result},
};

/// Resolves a repo's effective proxy/ssl settings: repo-level override wins
/// over the global default.
pub struct EffectiveConfig<'a> {
    pub download: &'a DownloadConfig,
    pub proxy: Option<&'a ProxyConfig>,
    pub ssl: Option<&'a SslConfig>,
    pub auth: Option<&'a AuthConfig>,
}

impl<'a> EffectiveConfig<'a> {
    pub fn for_repository(
        repo: &'a RepositoryConfig,
        global_download: &'a DownloadConfig,
        global_proxy: Option<&'a ProxyConfig>,
        global_ssl: Option<&'a SslConfig>,
    ) -> Self {
        EffectiveConfig {
            download: global_download,
            proxy: repo.proxy.as_ref().or(global_proxy),
            ssl: repo.ssl.as_ref().or(global_ssl),
            auth: repo.auth.as_ref(),
        }
    }
}

/// Discovers a client-cert/key pair from a directory of `*.pem` files,
/// picking the first certificate that doesn't end in `-key.pem` and pairing
/// it with `<stem>-key.pem` (RHEL entitlement layout).
fn discover_client_cert(dir: &Path) -> Option<(PathBuf, PathBuf)> {
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        let name = path.file_name()?.to_str()?;
        if name.ends_with(".pem") && !name.ends_with("-key.pem") {
            let key = dir.join(name.replace(".pem", "-key.pem"));
            if key.is_file() {
                return Some((path, key));
            }
            warn!("client cert {} has no matching -key.pem, skipping", name);
        }
    }
    None
}

fn build_client(cfg: &EffectiveConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(cfg.download.timeout));

    if let Some(proxy_cfg) = cfg.proxy {
        if let Some(http_proxy) = &proxy_cfg.http_proxy {
            let mut proxy = reqwest::Proxy::http(http_proxy)
                .map_err(|e| ChantalError::Config(format!("invalid http_proxy: {e}")))?;
            if let (Some(user), Some(pass)) = (&proxy_cfg.username, &proxy_cfg.password) {
                proxy = proxy.basic_auth(user, pass);
            }
            builder = builder.proxy(proxy);
        }
        if let Some(https_proxy) = &proxy_cfg.https_proxy {
            let mut proxy = reqwest::Proxy::https(https_proxy)
                .map_err(|e| ChantalError::Config(format!("invalid https_proxy: {e}")))?;
            if let (Some(user), Some(pass)) = (&proxy_cfg.username, &proxy_cfg.password) {
                proxy = proxy.basic_auth(user, pass);
            }
            builder = builder.proxy(proxy);
        }
    }

    if let Some(ssl_cfg) = cfg.ssl {
        if !ssl_cfg.verify {
            builder = builder.danger_accept_invalid_certs(true);
        } else if let Some(ca_cert) = &ssl_cfg.ca_cert {
            let cert = reqwest::Certificate::from_pem(ca_cert.as_bytes())
                .map_err(|e| ChantalError::Config(format!("invalid inline ca_cert: {e}")))?;
            builder = builder.add_root_certificate(cert);
        } else if let Some(ca_bundle) = &ssl_cfg.ca_bundle {
            let bytes = std::fs::read(ca_bundle)
                .map_err(|e| ChantalError::Config(format!("reading ca_bundle {ca_bundle}: {e}")))?;
            let cert = reqwest::Certificate::from_pem(&bytes)
                .map_err(|e| ChantalError::Config(format!("invalid ca_bundle {ca_bundle}: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }

        let cert_pair = if let (Some(cert), Some(key)) = (&ssl_cfg.client_cert, &ssl_cfg.client_key)
        {
            Some((PathBuf::from(cert), PathBuf::from(key)))
        } else if let Some(dir) = &ssl_cfg.client_cert_dir {
            discover_client_cert(Path::new(dir))
        } else {
            None
        };
        if let Some((cert_path, key_path)) = cert_pair {
            let mut pem = std::fs::read(&cert_path)
                .map_err(|e| ChantalError::Config(format!("reading client cert: {e}")))?;
            let mut key_pem = std::fs::read(&key_path)
                .map_err(|e| ChantalError::Config(format!("reading client key: {e}")))?;
            pem.append(&mut key_pem);
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| ChantalError::Config(format!("invalid client cert/key pair: {e}")))?;
            builder = builder.identity(identity);
        }
    }

    // `auth.client_cert` (RHEL-entitlement style, possibly auto-discovered)
    // is a second, independent source of mTLS identity layered on top of
    // any `ssl.client_cert` above.
    if let Some(AuthConfig::ClientCert(cc)) = cfg.auth {
        let cert_pair = if let (Some(cert), Some(key)) = (&cc.cert_file, &cc.key_file) {
            Some((PathBuf::from(cert), PathBuf::from(key)))
        } else if let Some(dir) = &cc.cert_dir {
            discover_client_cert(Path::new(dir))
        } else {
            None
        };
        if let Some((cert_path, key_path)) = cert_pair {
            let mut pem = std::fs::read(&cert_path)
                .map_err(|e| ChantalError::Config(format!("reading client cert: {e}")))?;
            let mut key_pem = std::fs::read(&key_path)
                .map_err(|e| ChantalError::Config(format!("reading client key: {e}")))?;
            pem.append(&mut key_pem);
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| ChantalError::Config(format!("invalid client cert/key pair: {e}")))?;
            builder = builder.identity(identity);
        } else {
            warn!("auth.type = client_cert configured but no cert/key pair could be resolved");
        }
    }

    builder
        .build()
        .map_err(|e| ChantalError::Config(format!("building http client: {e}")))
}

/// A configured downloader bound to one repository's effective settings.
pub struct Downloader {
    client: reqwest::Client,
    retry_attempts: u32,
    verify_checksum: bool,
    auth: Option<AuthConfig>,
}

impl Downloader {
    pub fn new(cfg: &EffectiveConfig) -> Result<Self> {
        Ok(Downloader {
            client: build_client(cfg)?,
            retry_attempts: cfg.download.retry_attempts,
            verify_checksum: cfg.download.verify_checksum,
            auth: cfg.auth.cloned(),
        })
    }

    /// Applies `basic`/`bearer`/`custom` auth to an outgoing request.
    /// `client_cert` auth is applied once at client-construction time (see
    /// `build_client`) and needs no per-request handling.
    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Some(AuthConfig::Basic(basic)) => builder.basic_auth(&basic.username, Some(&basic.password)),
            Some(AuthConfig::Bearer(bearer)) => builder.bearer_auth(&bearer.token),
            Some(AuthConfig::Custom(custom)) => {
                let mut builder = builder;
                for (name, value) in &custom.headers {
                    builder = builder.header(name, value);
                }
                builder
            }
            _ => builder,
        }
    }

    /// GETs `url` into `dest`, streaming through a sibling temp file that is
    /// renamed into place on success. Retries `retry_attempts` times,
    /// immediately and without backoff (matching the original, which also
    /// just loops). If `expected_sha256` is set and checksum verification
    /// is enabled, the temp file is unlinked and the attempt retried on
    /// mismatch.
    pub async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        expected_sha256: Option<&str>,
    ) -> Result<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ChantalError::Integrity(format!("creating {}: {e}", parent.display())))?;
        }

        let mut last_err = None;
        for attempt in 0..=self.retry_attempts {
            match self.attempt_download(url, dest, expected_sha256).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        "download failed (attempt {}/{}): {e}",
                        attempt + 1,
                        self.retry_attempts + 1
                    );
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ChantalError::Integrity(format!("download failed for {url}"))))
    }

    async fn attempt_download(
        &self,
        url: &str,
        dest: &Path,
        expected_sha256: Option<&str>,
    ) -> Result<()> {
        let response = self
            .apply_auth(self.client.get(url))
            .send()
            .await
            .map_err(|e| ChantalError::Network {
                url: url.to_string(),
                source: e,
            })?;
        let response = response.error_for_status().map_err(|e| ChantalError::Network {
            url: url.to_string(),
            source: e,
        })?;

        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        let tmp_path = parent.join(format!(
            ".{}.tmp-download",
            dest.file_name().and_then(|n| n.to_str()).unwrap_or("download")
        ));
        let mut tmp_file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| ChantalError::Integrity(format!("creating temp file: {e}")))?;

        let mut hasher = Sha256::new();
        let mut stream = response.bytes_stream();
        use futures::StreamExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ChantalError::Network {
                url: url.to_string(),
                source: e,
            })?;
            hasher.update(&chunk);
            tmp_file
                .write_all(&chunk)
                .await
                .map_err(|e| ChantalError::Integrity(format!("writing temp file: {e}")))?;
        }
        tmp_file
            .flush()
            .await
            .map_err(|e| ChantalError::Integrity(format!("flushing temp file: {e}")))?;
        drop(tmp_file);

        if self.verify_checksum {
            if let Some(expected) = expected_sha256 {
                let actual = faster_hex::hex_string(&hasher.finalize());
                if actual != expected {
                    let _ = tokio::fs::remove_file(&tmp_path).await;
                    return Err(ChantalError::ChecksumMismatch {
                        path: dest.to_path_buf(),
                        expected: expected.to_string(),
                        actual,
                    });
                }
            }
        }

        tokio::fs::rename(&tmp_path, dest)
            .await
            .map_err(|e| ChantalError::Integrity(format!("renaming into place: {e}")))?;

        Ok(())
    }

    /// GETs `url` and returns the full response body, without touching disk.
    /// Used for small root-metadata documents (`repomd.xml`, `InRelease`,
    /// `index.yaml`, `APKINDEX.tar.gz`) where the caller parses in memory.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let mut last_err = None;
        for attempt in 0..=self.retry_attempts {
            match self.apply_auth(self.client.get(url)).send().await {
                Ok(resp) => match resp.error_for_status() {
                    Ok(resp) => match resp.bytes().await {
                        Ok(bytes) => return Ok(bytes.to_vec()),
                        Err(e) => last_err = Some(e),
                    },
                    Err(e) => last_err = Some(e),
                },
                Err(e) => last_err = Some(e),
            }
            warn!("fetch failed (attempt {}/{})", attempt + 1, self.retry_attempts + 1);
        }
        Err(ChantalError::Network {
            url: url.to_string(),
            source: last_err.expect("loop always sets last_err before exiting"),
        })
    }

    /// Like [`fetch_bytes`](Self::fetch_bytes) but returns `Ok(None)` on a
    /// 404 instead of erroring — used for optional root-adjacent documents
    /// such as `.treeinfo`, where a missing file is normal and silent (§4.6
    /// step 8).
    pub async fn fetch_bytes_optional(&self, url: &str) -> Result<Option<Vec<u8>>> {
        let resp = self
            .apply_auth(self.client.get(url))
            .send()
            .await
            .map_err(|e| ChantalError::Network {
                url: url.to_string(),
                source: e,
            })?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp.error_for_status().map_err(|e| ChantalError::Network {
            url: url.to_string(),
            source: e,
        })?;
        let bytes = resp.bytes().await.map_err(|e| ChantalError::Network {
            url: url.to_string(),
            source: e,
        })?;
        Ok(Some(bytes.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_client_cert_pairs_pem_with_matching_key() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("entitlement.pem"), b"cert").unwrap();
        std::fs::write(dir.path().join("entitlement-key.pem"), b"key").unwrap();
        let found = discover_client_cert(dir.path());
        assert!(found.is_some());
        let (cert, key) = found.unwrap();
        assert_eq!(cert.file_name().unwrap(), "entitlement.pem");
        assert_eq!(key.file_name().unwrap(), "entitlement-key.pem");
    }

    #[test]
    fn discover_client_cert_skips_key_only_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("entitlement-key.pem"), b"key").unwrap();
        assert!(discover_client_cert(dir.path()).is_none());
    }
}
