// sbx-core/src/install/kubelet.rs
//! kubelet installer. Places the systemd service and kubeadm drop-in with
//! the binary path rewritten to the sandbox, and seeds the distribution's
//! sysconfig file.

use std::fs;
use std::path::PathBuf;

use sbx_common::config::Config;
use sbx_common::error::{Result, SbxError};
use tracing::debug;

use super::base::Installer;
use super::{remove_file_if_exists, replace_exact};

/// Path hardcoded in the upstream kubelet.service and 10-kubeadm.conf.
const UPSTREAM_KUBELET_BIN: &str = "/usr/bin/kubelet";

const DROPIN_DIR_NAME: &str = "kubelet.service.d";
const DROPIN_NAME: &str = "10-kubeadm.conf";
const SYSCONFIG_FILE_NAME: &str = "kubelet";

/// Vendor string match for the sysconfig directory: debian/ubuntu use
/// `/etc/default`, everything else `/etc/sysconfig`. Deliberately no wider
/// distro table.
fn sysconfig_dir(config: &Config) -> PathBuf {
    match os_vendor(config).as_deref() {
        Some("debian") | Some("ubuntu") => config.system_path("/etc/default"),
        _ => config.system_path("/etc/sysconfig"),
    }
}

/// `ID=` field of os-release under the configured system root.
fn os_vendor(config: &Config) -> Option<String> {
    let raw = fs::read_to_string(config.os_release_path()).ok()?;
    raw.lines()
        .find_map(|line| line.strip_prefix("ID="))
        .map(|id| id.trim().trim_matches('"').to_ascii_lowercase())
}

pub struct KubeletInstaller {
    base: Installer,
}

impl KubeletInstaller {
    pub fn new(base: Installer) -> Self {
        Self { base }
    }

    pub fn base(&self) -> &Installer {
        &self.base
    }

    fn sandbox_config_dir(&self) -> PathBuf {
        self.base.config().etc_dir().join("kubelet")
    }

    fn configuration_error(&self, reason: String) -> SbxError {
        SbxError::Configuration {
            software: self.base.software().to_string(),
            reason,
        }
    }

    /// Reads a downloaded unit/drop-in from the sandbox and rewrites the
    /// upstream binary path to the sandbox binary.
    fn patched_unit(&self, file_name: &str) -> Result<String> {
        let source = self.sandbox_config_dir().join(file_name);
        let raw = fs::read_to_string(&source).map_err(|e| {
            self.configuration_error(format!("failed to read {}: {}", source.display(), e))
        })?;
        let sandbox_bin = self.base.config().bin_dir().join("kubelet");
        replace_exact(&raw, UPSTREAM_KUBELET_BIN, &sandbox_bin.to_string_lossy()).ok_or_else(
            || {
                self.configuration_error(format!(
                    "{} does not reference {}",
                    source.display(),
                    UPSTREAM_KUBELET_BIN
                ))
            },
        )
    }

    pub fn install(&self) -> Result<()> {
        self.base.install(Some(&self.sandbox_config_dir()))
    }

    pub fn configure(&self) -> Result<()> {
        self.base.configure()?;

        let unit_dir = self.base.config().systemd_unit_dir();
        let dropin_dir = unit_dir.join(DROPIN_DIR_NAME);
        fs::create_dir_all(&dropin_dir)
            .map_err(|e| self.configuration_error(format!("failed to create unit dirs: {e}")))?;

        let service = self.patched_unit("kubelet.service")?;
        fs::write(unit_dir.join("kubelet.service"), service)
            .map_err(|e| self.configuration_error(format!("failed to write unit: {e}")))?;

        let dropin = self.patched_unit(DROPIN_NAME)?;
        fs::write(dropin_dir.join(DROPIN_NAME), dropin)
            .map_err(|e| self.configuration_error(format!("failed to write drop-in: {e}")))?;

        // Seed an empty sysconfig file if the distribution doesn't have one.
        let sysconfig = sysconfig_dir(self.base.config());
        fs::create_dir_all(&sysconfig)
            .map_err(|e| self.configuration_error(format!("failed to create sysconfig dir: {e}")))?;
        let sysconfig_file = sysconfig.join(SYSCONFIG_FILE_NAME);
        if !sysconfig_file.is_file() {
            fs::write(&sysconfig_file, "KUBELET_EXTRA_ARGS=\n").map_err(|e| {
                self.configuration_error(format!("failed to write sysconfig file: {e}"))
            })?;
            debug!("Seeded sysconfig file {}", sysconfig_file.display());
        }
        Ok(())
    }

    pub fn uninstall(&self) -> Result<()> {
        self.base.uninstall(Some(&self.sandbox_config_dir()))
    }

    pub fn remove_configuration(&self) -> Result<()> {
        let unit_dir = self.base.config().systemd_unit_dir();
        remove_file_if_exists(&unit_dir.join("kubelet.service"))?;
        remove_file_if_exists(&unit_dir.join(DROPIN_DIR_NAME).join(DROPIN_NAME))?;
        remove_file_if_exists(&sysconfig_dir(self.base.config()).join(SYSCONFIG_FILE_NAME))?;
        self.base.remove_configuration()
    }
}
