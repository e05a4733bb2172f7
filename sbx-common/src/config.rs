// sbx-common/src/config.rs
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use super::error::Result;

// Fallback when SBX_ROOT is not set or empty.
const DEFAULT_FALLBACK_SBX_ROOT: &str = "/opt/sbx";
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 30 * 60;

/// Domains downloads (and every redirect hop) are allowed to touch.
const DEFAULT_ALLOWED_DOMAINS: &[&str] = &[
    "storage.googleapis.com",
    "dl.k8s.io",
    "github.com",
    "objects.githubusercontent.com",
    "raw.githubusercontent.com",
    "cdn.teleport.dev",
];

/// Name of the per-software unpack subfolder inside the download folder.
pub const UNPACK_DIR_NAME: &str = "unpack";

#[derive(Debug, Clone)]
pub struct Config {
    pub sbx_root: PathBuf,
    pub system_root: PathBuf,
    pub allowed_domains: Vec<String>,
    pub download_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        debug!("Loading sbx configuration");

        let sbx_root_str = env::var("SBX_ROOT")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| {
                debug!(
                    "SBX_ROOT environment variable not set or empty, falling back to default: {}",
                    DEFAULT_FALLBACK_SBX_ROOT
                );
                DEFAULT_FALLBACK_SBX_ROOT.to_string()
            });
        let sbx_root = PathBuf::from(&sbx_root_str);
        debug!("Effective SBX_ROOT set to: {}", sbx_root.display());

        let system_root = env::var("SBX_SYSTEM_ROOT")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/"));

        let allowed_domains = env::var("SBX_ALLOWED_DOMAINS")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.split(',')
                    .map(|d| d.trim().to_string())
                    .filter(|d| !d.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| {
                DEFAULT_ALLOWED_DOMAINS
                    .iter()
                    .map(|d| d.to_string())
                    .collect()
            });

        let download_timeout_secs = env::var("SBX_DOWNLOAD_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT_SECS);

        debug!("Configuration loaded successfully.");
        Ok(Self {
            sbx_root,
            system_root,
            allowed_domains,
            download_timeout: Duration::from_secs(download_timeout_secs),
        })
    }

    pub fn sbx_root(&self) -> &Path {
        &self.sbx_root
    }

    /// Sandbox directory holding the managed binaries.
    pub fn bin_dir(&self) -> PathBuf {
        self.sbx_root.join("bin")
    }

    /// Sandbox directory holding managed configuration files.
    pub fn etc_dir(&self) -> PathBuf {
        self.sbx_root.join("etc")
    }

    /// Sandbox directory holding CNI plugin binaries.
    pub fn cni_bin_dir(&self) -> PathBuf {
        self.sbx_root.join("cni").join("bin")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.sbx_root.join("state")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.sbx_root.join("downloads")
    }

    /// Per-software download/temp folder.
    pub fn software_download_dir(&self, software: &str) -> PathBuf {
        self.downloads_dir().join(software)
    }

    /// Per-software unpack folder for extracted archives.
    pub fn software_unpack_dir(&self, software: &str) -> PathBuf {
        self.software_download_dir(software).join(UNPACK_DIR_NAME)
    }

    /// Resolves an absolute system path (e.g. `/etc/cni/net.d`) under the
    /// configured system root, so tests can redirect the whole tree.
    pub fn system_path(&self, path: &str) -> PathBuf {
        self.system_root.join(path.trim_start_matches('/'))
    }

    /// System-wide binary directory the sandbox binaries are symlinked into.
    pub fn system_bin_dir(&self) -> PathBuf {
        self.system_path("/usr/local/bin")
    }

    pub fn systemd_unit_dir(&self) -> PathBuf {
        self.system_path("/usr/lib/systemd/system")
    }

    pub fn os_release_path(&self) -> PathBuf {
        self.system_path("/etc/os-release")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::load().expect("Failed to load default configuration")
    }
}
