// sbx-core/src/install/teleport.rs
//! Teleport installer. The release archive ships `teleport`, `tctl` and
//! `tsh`; configuration generates a minimal node config and a systemd unit
//! pointing at the sandbox binary.

use std::fs;
use std::path::PathBuf;

use sbx_common::error::{Result, SbxError};
use tracing::debug;

use super::base::Installer;
use super::{remove_file_if_exists, replace_exact};

/// Paths hardcoded in the upstream unit template.
const UPSTREAM_TELEPORT_BIN: &str = "/usr/local/bin/teleport";
const UPSTREAM_TELEPORT_CONFIG: &str = "/etc/teleport.yaml";

const NODE_CONFIG_TEMPLATE: &str = "version: v3
teleport:
  data_dir: __DATA_DIR__
  log:
    output: stderr
    severity: INFO
ssh_service:
  enabled: true
auth_service:
  enabled: false
proxy_service:
  enabled: false
";

const UNIT_TEMPLATE: &str = "\
[Unit]
Description=Teleport Service
After=network.target

[Service]
Type=simple
Restart=on-failure
ExecStart=/usr/local/bin/teleport start --config=/etc/teleport.yaml --pid-file=/run/teleport.pid
ExecReload=/bin/sh -c \"exec pkill -HUP -L -F /run/teleport.pid\"
PIDFile=/run/teleport.pid
LimitNOFILE=524288

[Install]
WantedBy=multi-user.target
";

pub struct TeleportInstaller {
    base: Installer,
}

impl TeleportInstaller {
    pub fn new(base: Installer) -> Self {
        Self { base }
    }

    pub fn base(&self) -> &Installer {
        &self.base
    }

    fn config_path(&self) -> PathBuf {
        self.base.config().system_path(UPSTREAM_TELEPORT_CONFIG)
    }

    fn unit_path(&self) -> PathBuf {
        self.base
            .config()
            .systemd_unit_dir()
            .join("teleport.service")
    }

    fn data_dir(&self) -> PathBuf {
        self.base.config().sbx_root().join("var/lib/teleport")
    }

    fn configuration_error(&self, reason: String) -> SbxError {
        SbxError::Configuration {
            software: self.base.software().to_string(),
            reason,
        }
    }

    pub fn install(&self) -> Result<()> {
        self.base.install(None)
    }

    pub fn configure(&self) -> Result<()> {
        self.base.configure()?;
        self.write_node_config()?;
        self.write_unit_file()?;
        Ok(())
    }

    /// Generates the node configuration with the data directory inside the
    /// sandbox. Re-running configure regenerates it.
    fn write_node_config(&self) -> Result<()> {
        let data_dir = self.data_dir();
        fs::create_dir_all(&data_dir)
            .map_err(|e| self.configuration_error(format!("failed to create data dir: {e}")))?;

        let content =
            NODE_CONFIG_TEMPLATE.replace("__DATA_DIR__", &data_dir.to_string_lossy());

        let config_path = self.config_path();
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                self.configuration_error(format!("failed to create config dir: {e}"))
            })?;
        }
        fs::write(&config_path, content).map_err(|e| {
            self.configuration_error(format!(
                "failed to write {}: {}",
                config_path.display(),
                e
            ))
        })?;
        debug!("Wrote teleport config to {}", config_path.display());
        Ok(())
    }

    /// Instantiates the unit template with the sandbox binary and the
    /// system-root-resolved config path.
    fn write_unit_file(&self) -> Result<()> {
        let sandbox_bin = self.base.config().bin_dir().join("teleport");
        let patched = replace_exact(
            UNIT_TEMPLATE,
            UPSTREAM_TELEPORT_BIN,
            &sandbox_bin.to_string_lossy(),
        )
        .and_then(|unit| {
            replace_exact(
                &unit,
                UPSTREAM_TELEPORT_CONFIG,
                &self.config_path().to_string_lossy(),
            )
        })
        .ok_or_else(|| {
            self.configuration_error("unit template is missing expected paths".to_string())
        })?;

        let unit_path = self.unit_path();
        if let Some(parent) = unit_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| self.configuration_error(format!("failed to create unit dir: {e}")))?;
        }
        fs::write(&unit_path, patched).map_err(|e| {
            self.configuration_error(format!("failed to write {}: {}", unit_path.display(), e))
        })?;
        debug!("Wrote teleport unit to {}", unit_path.display());
        Ok(())
    }

    pub fn uninstall(&self) -> Result<()> {
        self.base.uninstall(None)
    }

    pub fn remove_configuration(&self) -> Result<()> {
        remove_file_if_exists(&self.unit_path())?;
        remove_file_if_exists(&self.config_path())?;
        self.base.remove_configuration()
    }
}
