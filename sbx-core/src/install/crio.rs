// sbx-core/src/install/crio.rs
//! CRI-O installer. On top of the generic lifecycle this creates the fixed
//! directory layout the upstream installer ships, fans the bundled CNI
//! plugins out into the sandbox, patches `crio.conf` through dotted-path
//! TOML overrides and rewrites the systemd unit to point at the sandbox
//! binary.

use std::fs;
use std::path::PathBuf;

use sbx_common::error::{Result, SbxError};
use tracing::{debug, warn};

use super::base::Installer;
use super::{
    copy_file, find_dir_in_dir, make_executable, remove_file_if_exists, replace_exact,
};

/// Directory layout expected by unmodified upstream CRI-O service and
/// config files.
const CRIO_SYSTEM_DIRS: &[&str] = &[
    "/etc/crio",
    "/etc/crio/crio.conf.d",
    "/etc/containers",
    "/etc/cni/net.d",
    "/usr/libexec/crio",
    "/usr/share/oci-umount/oci-umount.d",
    "/var/lib/crio",
];

/// Path hardcoded in the upstream `crio.service` ExecStart line.
const UPSTREAM_CRIO_BIN: &str = "/usr/local/bin/crio";

/// Directory inside the release archive holding the bundled CNI plugins.
const CNI_PLUGIN_ARCHIVE_DIR: &str = "cni-plugins";

const INSTALL_MANIFEST_NAME: &str = "crio-install";
const DEFAULT_RUNTIME: &str = "runc";

pub struct CrioInstaller {
    base: Installer,
}

impl CrioInstaller {
    pub fn new(base: Installer) -> Self {
        Self { base }
    }

    pub fn base(&self) -> &Installer {
        &self.base
    }

    fn sandbox_config_dir(&self) -> PathBuf {
        self.base.config().etc_dir().join("crio")
    }

    fn system_conf_path(&self) -> PathBuf {
        self.base.config().system_path("/etc/crio/crio.conf")
    }

    fn unit_path(&self) -> PathBuf {
        self.base.config().systemd_unit_dir().join("crio.service")
    }

    fn manifest_path(&self) -> PathBuf {
        self.base
            .config()
            .system_path("/usr/libexec/crio")
            .join(INSTALL_MANIFEST_NAME)
    }

    fn installation_error(&self, reason: String) -> SbxError {
        SbxError::Installation {
            software: self.base.software().to_string(),
            version: self.base.version().to_string(),
            reason,
        }
    }

    fn configuration_error(&self, reason: String) -> SbxError {
        SbxError::Configuration {
            software: self.base.software().to_string(),
            reason,
        }
    }

    /// Dotted-path overrides applied to the stock `crio.conf`, pointing the
    /// runtime at the sandbox-resolved paths.
    fn conf_overrides(&self) -> Vec<(String, toml::Value)> {
        let config = self.base.config();
        vec![
            (
                "crio.runtime.default_runtime".to_string(),
                toml::Value::String(DEFAULT_RUNTIME.to_string()),
            ),
            (
                "crio.runtime.conmon".to_string(),
                toml::Value::String(
                    config
                        .system_path("/usr/libexec/crio")
                        .join("conmon")
                        .to_string_lossy()
                        .into_owned(),
                ),
            ),
            (
                "crio.network.network_dir".to_string(),
                toml::Value::String(
                    config
                        .system_path("/etc/cni/net.d")
                        .to_string_lossy()
                        .into_owned(),
                ),
            ),
            (
                "crio.network.plugin_dirs".to_string(),
                toml::Value::Array(vec![toml::Value::String(
                    config.cni_bin_dir().to_string_lossy().into_owned(),
                )]),
            ),
        ]
    }

    pub fn install(&self) -> Result<()> {
        self.base.install(Some(&self.sandbox_config_dir()))?;

        for dir in CRIO_SYSTEM_DIRS {
            let path = self.base.config().system_path(dir);
            fs::create_dir_all(&path).map_err(|e| {
                self.installation_error(format!(
                    "failed to create directory {}: {}",
                    path.display(),
                    e
                ))
            })?;
        }

        self.fan_out_cni_plugins()?;
        self.write_install_manifest()?;
        Ok(())
    }

    /// Copies every bundled CNI plugin binary from the unpack tree into the
    /// sandbox CNI bin directory. Archives without a plugin bundle are fine.
    fn fan_out_cni_plugins(&self) -> Result<()> {
        let Some(plugin_dir) = find_dir_in_dir(&self.base.unpack_dir(), CNI_PLUGIN_ARCHIVE_DIR)
        else {
            debug!("No bundled CNI plugins in unpack tree.");
            return Ok(());
        };
        let cni_bin_dir = self.base.config().cni_bin_dir();
        fs::create_dir_all(&cni_bin_dir).map_err(|e| {
            self.installation_error(format!("failed to create CNI bin dir: {e}"))
        })?;
        for entry in fs::read_dir(&plugin_dir).map_err(|e| {
            self.installation_error(format!("failed to read CNI plugin dir: {e}"))
        })? {
            let entry = entry.map_err(|e| {
                self.installation_error(format!("failed to read CNI plugin entry: {e}"))
            })?;
            if !entry.path().is_file() {
                continue;
            }
            let destination = cni_bin_dir.join(entry.file_name());
            copy_file(&entry.path(), &destination)?;
            make_executable(&destination)?;
            debug!("Installed CNI plugin {}", destination.display());
        }
        Ok(())
    }

    /// Records the managed binary paths the way the upstream shell installer
    /// does, so its uninstall tooling keeps working against the sandbox.
    fn write_install_manifest(&self) -> Result<()> {
        let details: Vec<String> = ["crio", "pinns", "crictl"]
            .iter()
            .map(|name| {
                self.base
                    .config()
                    .bin_dir()
                    .join(name)
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        let manifest_path = self.manifest_path();
        fs::write(&manifest_path, details.join("\n") + "\n").map_err(|e| {
            self.installation_error(format!(
                "failed to write install manifest {}: {}",
                manifest_path.display(),
                e
            ))
        })
    }

    pub fn configure(&self) -> Result<()> {
        self.base.configure()?;
        self.patch_crio_conf()?;
        self.patch_unit_file()?;
        Ok(())
    }

    /// Reads the stock `crio.conf` from the sandbox, applies the fixed
    /// override set and writes the result to the system config location.
    fn patch_crio_conf(&self) -> Result<()> {
        let source = self.sandbox_config_dir().join("crio.conf");
        let raw = fs::read_to_string(&source).map_err(|e| {
            self.configuration_error(format!("failed to read {}: {}", source.display(), e))
        })?;
        let mut value: toml::Value = raw.parse().map_err(|e| {
            self.configuration_error(format!("failed to parse {}: {}", source.display(), e))
        })?;

        for (path, override_value) in self.conf_overrides() {
            if !set_dotted_path(&mut value, &path, override_value) {
                return Err(self.configuration_error(format!(
                    "cannot apply override '{path}': intermediate value is not a table"
                )));
            }
        }

        let rendered = toml::to_string(&value).map_err(|e| {
            self.configuration_error(format!("failed to re-encode crio.conf: {e}"))
        })?;
        let destination = self.system_conf_path();
        fs::write(&destination, rendered).map_err(|e| {
            self.configuration_error(format!(
                "failed to write {}: {}",
                destination.display(),
                e
            ))
        })?;
        debug!("Patched crio.conf written to {}", destination.display());
        Ok(())
    }

    /// Rewrites the upstream unit's hardcoded binary path to the sandbox
    /// binary by exact string replacement.
    fn patch_unit_file(&self) -> Result<()> {
        let source = self.sandbox_config_dir().join("crio.service");
        let raw = fs::read_to_string(&source).map_err(|e| {
            self.configuration_error(format!("failed to read {}: {}", source.display(), e))
        })?;
        let sandbox_bin = self.base.config().bin_dir().join("crio");
        let patched = replace_exact(&raw, UPSTREAM_CRIO_BIN, &sandbox_bin.to_string_lossy())
            .ok_or_else(|| {
                self.configuration_error(format!(
                    "unit file {} does not reference {}",
                    source.display(),
                    UPSTREAM_CRIO_BIN
                ))
            })?;
        let unit_path = self.unit_path();
        if let Some(parent) = unit_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                self.configuration_error(format!("failed to create unit dir: {e}"))
            })?;
        }
        fs::write(&unit_path, patched).map_err(|e| {
            self.configuration_error(format!("failed to write {}: {}", unit_path.display(), e))
        })?;
        debug!("Patched crio.service written to {}", unit_path.display());
        Ok(())
    }

    pub fn uninstall(&self) -> Result<()> {
        remove_file_if_exists(&self.manifest_path())?;
        self.base.uninstall(Some(&self.sandbox_config_dir()))
    }

    pub fn remove_configuration(&self) -> Result<()> {
        // The unit file is only ours if it still points into the sandbox.
        let unit_path = self.unit_path();
        if let Ok(content) = fs::read_to_string(&unit_path) {
            let sandbox_bin = self.base.config().bin_dir().join("crio");
            if content.contains(&*sandbox_bin.to_string_lossy()) {
                remove_file_if_exists(&unit_path)?;
            } else {
                warn!(
                    "Leaving {} in place: it does not reference the sandbox binary",
                    unit_path.display()
                );
            }
        }
        remove_file_if_exists(&self.system_conf_path())?;
        self.base.remove_configuration()
    }

    /// Deeper configuration check layered on the base marker: the patched
    /// config and unit must still carry our content and the system symlink
    /// must still point into the sandbox.
    pub fn is_configured(&self) -> bool {
        if !self.base.is_configured() {
            return false;
        }

        let conf_ok = fs::read_to_string(self.system_conf_path())
            .ok()
            .and_then(|raw| raw.parse::<toml::Value>().ok())
            .and_then(|value| {
                value
                    .get("crio")?
                    .get("runtime")?
                    .get("default_runtime")?
                    .as_str()
                    .map(|runtime| runtime == DEFAULT_RUNTIME)
            })
            .unwrap_or(false);
        if !conf_ok {
            return false;
        }

        let sandbox_bin = self.base.config().bin_dir().join("crio");
        let unit_ok = fs::read_to_string(self.unit_path())
            .is_ok_and(|content| content.contains(&*sandbox_bin.to_string_lossy()));
        if !unit_ok {
            return false;
        }

        fs::read_link(self.base.config().system_bin_dir().join("crio"))
            .is_ok_and(|target| target == sandbox_bin)
    }
}

/// Sets `path` (dotted, e.g. `crio.runtime.default_runtime`) in a TOML value
/// tree, creating intermediate tables as needed. Returns `false` when an
/// intermediate value exists but is not a table.
pub(crate) fn set_dotted_path(
    value_tree: &mut toml::Value,
    path: &str,
    new_value: toml::Value,
) -> bool {
    match path.split_once('.') {
        None => match value_tree {
            toml::Value::Table(table) => {
                table.insert(path.to_string(), new_value);
                true
            }
            _ => false,
        },
        Some((head, rest)) => match value_tree {
            toml::Value::Table(table) => {
                let child = table
                    .entry(head.to_string())
                    .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
                set_dotted_path(child, rest, new_value)
            }
            _ => false,
        },
    }
}
