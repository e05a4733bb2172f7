// sbx-net/src/http.rs
use std::error::Error as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::{HeaderMap, ACCEPT, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::Client;
use sbx_common::config::Config;
use sbx_common::error::{Result, SbxError};
use tokio::fs::File as TokioFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::validation::{contain_path, is_allowed_host, validate_url};

const CONNECT_TIMEOUT_SECS: u64 = 30;
const MAX_REDIRECTS: usize = 10;
const USER_AGENT_STRING: &str = "sbx node provisioner (Rust; +https://github.com/sbx/sbx)";

/// Downloads catalog artifacts into the sandbox.
///
/// Every URL is validated against the domain allowlist before any network
/// call, and every redirect hop is re-validated by the client's redirect
/// policy. Destination paths must resolve inside the sandbox root.
pub struct Downloader {
    client: Client,
    allowed_domains: Vec<String>,
    base_dir: PathBuf,
}

impl Downloader {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config)?,
            allowed_domains: config.allowed_domains.clone(),
            base_dir: config.sbx_root().to_path_buf(),
        })
    }

    /// Fetches `url` to `destination`, streaming through a hidden temp file
    /// that is renamed into place once the body is fully written.
    pub async fn download(&self, url: &str, destination: &Path) -> Result<PathBuf> {
        validate_url(url, &self.allowed_domains)?;
        let destination = contain_path(destination, &self.base_dir)?;

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| SbxError::FileSystem {
                path: parent.to_path_buf(),
                reason: format!("failed to create download directory: {e}"),
            })?;
        }

        let temp_filename = format!(
            ".{}.download",
            destination
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
        );
        let temp_path = destination.with_file_name(temp_filename);
        if temp_path.exists() {
            if let Err(e) = fs::remove_file(&temp_path) {
                warn!(
                    "Could not remove existing temporary file {}: {}",
                    temp_path.display(),
                    e
                );
            }
        }

        debug!("Downloading {} -> {}", url, destination.display());
        let mut response =
            self.client
                .get(url)
                .send()
                .await
                .map_err(|e| SbxError::Download {
                    url: url.to_string(),
                    status: None,
                    reason: error_chain(&e),
                })?;

        let status = response.status();
        debug!("Received HTTP status: {} for {}", status, url);
        if !status.is_success() {
            return Err(SbxError::Download {
                url: url.to_string(),
                status: Some(status.as_u16()),
                reason: format!("HTTP status {status}"),
            });
        }

        let mut temp_file = TokioFile::create(&temp_path).await.map_err(|e| {
            SbxError::FileSystem {
                path: temp_path.clone(),
                reason: format!("failed to create temp file: {e}"),
            }
        })?;
        while let Some(chunk) = response.chunk().await.map_err(|e| SbxError::Download {
            url: url.to_string(),
            status: Some(status.as_u16()),
            reason: format!("failed to read response body: {}", error_chain(&e)),
        })? {
            temp_file
                .write_all(&chunk)
                .await
                .map_err(|e| SbxError::FileSystem {
                    path: temp_path.clone(),
                    reason: format!("failed to write download stream: {e}"),
                })?;
        }
        temp_file.flush().await.map_err(|e| SbxError::FileSystem {
            path: temp_path.clone(),
            reason: format!("failed to flush download stream: {e}"),
        })?;
        drop(temp_file);

        fs::rename(&temp_path, &destination).map_err(|e| SbxError::FileSystem {
            path: destination.clone(),
            reason: format!("failed to move temp file into place: {e}"),
        })?;
        debug!("Finished download: {}", destination.display());
        Ok(destination)
    }
}

fn build_http_client(config: &Config) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, USER_AGENT_STRING.parse().unwrap());
    headers.insert(ACCEPT, "*/*".parse().unwrap());

    // Redirect targets are attacker-influenced data; every hop is checked
    // against the same allowlist as the original URL.
    let allowed_domains = config.allowed_domains.clone();
    let redirect_policy = Policy::custom(move |attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            return attempt.error(format!("stopped after {MAX_REDIRECTS} redirects"));
        }
        let host = attempt.url().host_str().map(|h| h.to_string());
        match host {
            Some(host) if is_allowed_host(&host, &allowed_domains) => attempt.follow(),
            Some(host) => attempt.error(format!("untrusted domain '{host}'")),
            None => attempt.error("redirect target has no host".to_string()),
        }
    });

    Client::builder()
        .timeout(config.download_timeout)
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .default_headers(headers)
        .redirect(redirect_policy)
        .build()
        .map_err(|e| SbxError::Download {
            url: String::new(),
            status: None,
            reason: format!("failed to build HTTP client: {e}"),
        })
}

/// Flattens a reqwest error and its source chain into one line, so redirect
/// policy failures ("untrusted domain", "stopped after N redirects") stay
/// visible in the wrapped error.
fn error_chain(err: &reqwest::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
