// sbx-core/src/install/base.rs
//! The generic artifact lifecycle: download, extract, install, configure,
//! and their reverses, bound to one catalog entry and one resolved version.
//!
//! Download and extract are idempotent: a destination that already carries
//! the expected checksum is left alone, an invalid one is cleaned up and
//! redone. Install/configure record durable state markers so the status
//! queries never re-derive anything from the filesystem.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use sbx_common::catalog::Catalog;
use sbx_common::config::Config;
use sbx_common::error::{Result, SbxError};
use sbx_common::model::{ArtifactMetadata, Checksum, VersionDetails};
use sbx_common::state::{StateMarker, StateTracker};
use sbx_net::checksum::verify_checksum;
use sbx_net::Downloader;
use tracing::{debug, warn};

use super::{
    copy_file, find_in_dir, make_executable, remove_file_if_exists, remove_symlink_if_ours,
    symlink_into,
};

/// One file the download step has to fetch: an archive, or a binary/config
/// that carries its own URL.
struct DownloadItem {
    url: String,
    file_name: String,
    checksum: Option<Checksum>,
}

/// An archive-sourced file whose checksum gates the extract idempotency
/// check.
struct UnpackedItem {
    file_name: String,
    checksum: Checksum,
}

pub struct Installer {
    metadata: ArtifactMetadata,
    version: String,
    config: Config,
    downloader: Downloader,
    state: StateTracker,
}

impl Installer {
    pub fn new(
        catalog: &Catalog,
        software: &str,
        version: Option<String>,
        config: Config,
    ) -> Result<Self> {
        let metadata = catalog.artifact(software)?;
        Self::with_metadata(metadata, version, config)
    }

    /// Binds an explicit metadata entry; tests use this to override the
    /// platform resolver.
    pub fn with_metadata(
        metadata: ArtifactMetadata,
        version: Option<String>,
        config: Config,
    ) -> Result<Self> {
        let version = match version {
            Some(v) => {
                metadata.version_details(&v)?;
                v
            }
            None => metadata.latest_version()?,
        };
        debug!(
            "Installer bound to {} {} ({}/{})",
            metadata.name, version, metadata.platform.os, metadata.platform.arch
        );
        let downloader = Downloader::new(&config)?;
        let state = StateTracker::new(&config);
        Ok(Self {
            metadata,
            version,
            config,
            downloader,
            state,
        })
    }

    pub fn software(&self) -> &str {
        &self.metadata.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &StateTracker {
        &self.state
    }

    pub fn download_dir(&self) -> PathBuf {
        self.config.software_download_dir(self.software())
    }

    pub fn unpack_dir(&self) -> PathBuf {
        self.config.software_unpack_dir(self.software())
    }

    fn details(&self) -> Result<&VersionDetails> {
        self.metadata.version_details(&self.version)
    }

    fn resolve(&self, template: &str) -> Result<String> {
        self.metadata.resolve(template, &self.version)
    }

    fn checksum_for(
        &self,
        checksums: &sbx_common::model::PlatformChecksums,
    ) -> Result<Checksum> {
        checksums
            .lookup(self.software(), &self.version, &self.metadata.platform)
            .cloned()
    }

    fn download_items(&self) -> Result<Vec<DownloadItem>> {
        let details = self.details()?;
        let mut items = Vec::new();
        for archive in &details.archives {
            items.push(DownloadItem {
                url: self.resolve(&archive.url)?,
                file_name: self.resolve(&archive.name)?,
                checksum: match &archive.checksums {
                    Some(checksums) => Some(self.checksum_for(checksums)?),
                    None => None,
                },
            });
        }
        for binary in &details.binaries {
            if let Some(url) = &binary.url {
                items.push(DownloadItem {
                    url: self.resolve(url)?,
                    file_name: self.resolve(&binary.name)?,
                    checksum: Some(self.checksum_for(&binary.checksums)?),
                });
            }
        }
        for config_file in &details.configs {
            if let Some(url) = &config_file.url {
                items.push(DownloadItem {
                    url: self.resolve(url)?,
                    file_name: self.resolve(&config_file.name)?,
                    checksum: Some(self.checksum_for(&config_file.checksums)?),
                });
            }
        }
        Ok(items)
    }

    fn archive_sourced_items(&self) -> Result<Vec<UnpackedItem>> {
        let details = self.details()?;
        let mut items = Vec::new();
        for binary in &details.binaries {
            if binary.archive.is_some() {
                items.push(UnpackedItem {
                    file_name: self.resolve(&binary.name)?,
                    checksum: self.checksum_for(&binary.checksums)?,
                });
            }
        }
        for config_file in &details.configs {
            if config_file.archive.is_some() {
                items.push(UnpackedItem {
                    file_name: self.resolve(&config_file.name)?,
                    checksum: self.checksum_for(&config_file.checksums)?,
                });
            }
        }
        Ok(items)
    }

    /// Downloads every archive and every direct-URL binary/config of the
    /// resolved version into the per-software download folder.
    ///
    /// An existing destination with a valid checksum short-circuits the
    /// fetch; an invalid one is deleted and re-fetched. The fresh download
    /// is verified again and a mismatch there is fatal.
    pub async fn download(&self) -> Result<()> {
        let download_dir = self.download_dir();
        for item in self.download_items()? {
            let destination = download_dir.join(&item.file_name);

            if destination.is_file() {
                match &item.checksum {
                    Some(checksum) => {
                        match verify_checksum(&destination, &checksum.digest, &checksum.algorithm)
                        {
                            Ok(()) => {
                                debug!(
                                    "Existing download {} is valid, skipping fetch.",
                                    destination.display()
                                );
                                continue;
                            }
                            Err(e @ SbxError::UnsupportedAlgorithm { .. }) => return Err(e),
                            Err(e) => {
                                debug!(
                                    "Existing download {} failed verification ({}). Redownloading.",
                                    destination.display(),
                                    e
                                );
                                if let Err(remove_err) = fs::remove_file(&destination) {
                                    warn!(
                                        "Failed to remove corrupted download {}: {}",
                                        destination.display(),
                                        remove_err
                                    );
                                }
                            }
                        }
                    }
                    None => {
                        debug!(
                            "No checksum declared for {}; re-fetching.",
                            destination.display()
                        );
                    }
                }
            }

            self.downloader.download(&item.url, &destination).await?;

            if let Some(checksum) = &item.checksum {
                verify_checksum(&destination, &checksum.digest, &checksum.algorithm)?;
            }
        }
        Ok(())
    }

    /// Whether every archive-sourced binary/config is present in the unpack
    /// tree with a valid checksum. Verification failures other than an
    /// unsupported algorithm mean "redo the extraction", not "abort".
    fn unpacked_content_is_valid(&self, unpack_dir: &Path) -> Result<bool> {
        for item in self.archive_sourced_items()? {
            let Some(found) = find_in_dir(unpack_dir, &item.file_name) else {
                debug!("'{}' missing from unpack tree.", item.file_name);
                return Ok(false);
            };
            match verify_checksum(&found, &item.checksum.digest, &item.checksum.algorithm) {
                Ok(()) => {}
                Err(e @ SbxError::UnsupportedAlgorithm { .. }) => return Err(e),
                Err(e) => {
                    debug!("'{}' failed verification in unpack tree: {}", item.file_name, e);
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Extracts every declared archive into the per-software unpack folder.
    ///
    /// A populated unpack folder whose archive-sourced contents all verify
    /// is left untouched; otherwise it is wiped and extraction is redone.
    pub fn extract(&self) -> Result<()> {
        let details = self.details()?;
        if details.archives.is_empty() {
            debug!("{} declares no archives; nothing to extract.", self.software());
            return Ok(());
        }

        let unpack_dir = self.unpack_dir();
        if unpack_dir.is_dir() && fs::read_dir(&unpack_dir)?.next().is_some() {
            if self.unpacked_content_is_valid(&unpack_dir)? {
                debug!(
                    "Unpack folder {} already valid, skipping extraction.",
                    unpack_dir.display()
                );
                return Ok(());
            }
            debug!(
                "Unpack folder {} is stale; wiping and re-extracting.",
                unpack_dir.display()
            );
            fs::remove_dir_all(&unpack_dir).map_err(|e| SbxError::FileSystem {
                path: unpack_dir.clone(),
                reason: format!("failed to wipe stale unpack folder: {e}"),
            })?;
        }

        let deadline = Instant::now() + self.config.download_timeout;
        let download_dir = self.download_dir();
        for archive in &details.archives {
            let archive_path = download_dir.join(self.resolve(&archive.name)?);
            crate::extract::extract_archive(&archive_path, &unpack_dir, Some(deadline))?;
        }
        Ok(())
    }

    /// Where a binary/config payload lives after download/extract.
    fn locate_payload(&self, archive: Option<&str>, file_name: &str) -> Result<PathBuf> {
        if archive.is_some() {
            find_in_dir(&self.unpack_dir(), file_name).ok_or_else(|| SbxError::Installation {
                software: self.software().to_string(),
                version: self.version.clone(),
                reason: format!(
                    "'{}' not found under {}",
                    file_name,
                    self.unpack_dir().display()
                ),
            })
        } else {
            let path = self.download_dir().join(file_name);
            if path.is_file() {
                Ok(path)
            } else {
                Err(SbxError::FileNotFound { path })
            }
        }
    }

    fn installation_error(&self, reason: String) -> SbxError {
        SbxError::Installation {
            software: self.software().to_string(),
            version: self.version.clone(),
            reason,
        }
    }

    /// Copies binaries into the sandbox bin directory (with executable
    /// permissions) and configs into `config_dest` (sandbox etc by
    /// default), then records the `installed` marker.
    pub fn install(&self, config_dest: Option<&Path>) -> Result<()> {
        let details = self.details()?;

        if !details.archives.is_empty() && !self.unpack_dir().is_dir() {
            return Err(self.installation_error(
                "declared archives have not been extracted".to_string(),
            ));
        }

        let bin_dir = self.config.bin_dir();
        fs::create_dir_all(&bin_dir)
            .map_err(|e| self.installation_error(format!("failed to create bin dir: {e}")))?;
        for binary in &details.binaries {
            let name = self.resolve(&binary.name)?;
            let source = self.locate_payload(binary.archive.as_deref(), &name)?;
            let destination = bin_dir.join(&name);
            copy_file(&source, &destination)?;
            make_executable(&destination)?;
            debug!("Installed binary {}", destination.display());
        }

        let config_dir = config_dest
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.etc_dir());
        if !details.configs.is_empty() {
            fs::create_dir_all(&config_dir).map_err(|e| {
                self.installation_error(format!("failed to create config dir: {e}"))
            })?;
        }
        for config_file in &details.configs {
            let name = self.resolve(&config_file.name)?;
            let source = self.locate_payload(config_file.archive.as_deref(), &name)?;
            let destination = config_dir.join(&name);
            copy_file(&source, &destination)?;
            debug!("Installed config {}", destination.display());
        }

        self.state
            .record_state(self.software(), StateMarker::Installed, &self.version)?;
        Ok(())
    }

    /// Symlinks each sandbox binary into the system-wide bin directory and
    /// records the `configured` marker.
    pub fn configure(&self) -> Result<()> {
        let details = self.details()?;
        let system_bin = self.config.system_bin_dir();
        fs::create_dir_all(&system_bin).map_err(|e| SbxError::Configuration {
            software: self.software().to_string(),
            reason: format!("failed to create system bin dir: {e}"),
        })?;

        for binary in &details.binaries {
            let name = self.resolve(&binary.name)?;
            let target = self.config.bin_dir().join(&name);
            if !target.is_file() {
                return Err(SbxError::Configuration {
                    software: self.software().to_string(),
                    reason: format!("binary '{name}' is not installed in the sandbox"),
                });
            }
            symlink_into(&target, &system_bin.join(&name))?;
        }

        self.state
            .record_state(self.software(), StateMarker::Configured, &self.version)?;
        Ok(())
    }

    /// Removes the sandbox binaries and configs and clears the `installed`
    /// marker. `config_dest` must match what was passed to `install`.
    pub fn uninstall(&self, config_dest: Option<&Path>) -> Result<()> {
        let details = self.details()?;

        for binary in &details.binaries {
            let name = self.resolve(&binary.name)?;
            remove_file_if_exists(&self.config.bin_dir().join(&name)).map_err(|e| {
                SbxError::Uninstallation {
                    software: self.software().to_string(),
                    reason: e.to_string(),
                }
            })?;
        }

        let config_dir = config_dest
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.etc_dir());
        for config_file in &details.configs {
            let name = self.resolve(&config_file.name)?;
            remove_file_if_exists(&config_dir.join(&name)).map_err(|e| {
                SbxError::Uninstallation {
                    software: self.software().to_string(),
                    reason: e.to_string(),
                }
            })?;
        }

        self.state
            .remove_state(self.software(), StateMarker::Installed)?;
        Ok(())
    }

    /// Removes the system-wide symlinks — but only those still pointing at
    /// our sandbox binaries — and clears the `configured` marker.
    pub fn remove_configuration(&self) -> Result<()> {
        let details = self.details()?;
        let system_bin = self.config.system_bin_dir();
        for binary in &details.binaries {
            let name = self.resolve(&binary.name)?;
            let expected_target = self.config.bin_dir().join(&name);
            remove_symlink_if_ours(&system_bin.join(&name), &expected_target)?;
        }
        self.state
            .remove_state(self.software(), StateMarker::Configured)?;
        Ok(())
    }

    /// Cheap status query backed by the state tracker only.
    pub fn is_installed(&self) -> bool {
        self.state.exists(self.software(), StateMarker::Installed)
    }

    /// Cheap status query backed by the state tracker only.
    pub fn is_configured(&self) -> bool {
        self.state.exists(self.software(), StateMarker::Configured)
    }

    /// Removes the per-software download/temp folder. A failure here is a
    /// `Cleanup` error the caller reports without failing the install.
    pub fn cleanup(&self) -> Result<()> {
        let download_dir = self.download_dir();
        if download_dir.exists() {
            fs::remove_dir_all(&download_dir).map_err(|e| SbxError::Cleanup {
                path: download_dir.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}
