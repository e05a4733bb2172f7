// sbx/src/cli/install.rs
use clap::Args;
use colored::Colorize;
use sbx_common::catalog::Catalog;
use sbx_common::config::Config;
use sbx_common::error::Result;
use sbx_core::AnyInstaller;
use tracing::warn;

/// Download, verify, install and configure one piece of software.
#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Software name from the catalog
    pub name: String,

    /// Install a specific version instead of the latest
    #[arg(long)]
    pub version: Option<String>,

    /// Stop after the install step; skip system-wide configuration
    #[arg(long)]
    pub no_configure: bool,

    /// Keep the per-software download folder after a successful install
    #[arg(long)]
    pub keep_downloads: bool,
}

impl InstallArgs {
    pub async fn run(&self, config: &Config, catalog: &Catalog) -> Result<()> {
        let installer = AnyInstaller::for_software(
            catalog,
            &self.name,
            self.version.clone(),
            config.clone(),
        )?;
        let version = installer.base().version().to_string();

        if installer.is_installed() && (self.no_configure || installer.is_configured()) {
            println!(
                "{} {} {} is already installed.",
                "==>".bold().blue(),
                self.name.bold(),
                version
            );
            return Ok(());
        }

        println!(
            "{} Installing {} {}",
            "==>".bold().blue(),
            self.name.bold(),
            version
        );
        installer.download().await?;
        installer.extract()?;
        installer.install()?;
        if !self.no_configure {
            installer.configure()?;
        }

        if !self.keep_downloads {
            // Cleanup trouble is reported but never fails the install.
            if let Err(e) = installer.cleanup() {
                warn!("Cleanup failed: {}", e);
                eprintln!("{} cleanup failed: {e}", "Warning:".yellow());
            }
        }

        println!(
            "{} Installed {} {}",
            "==>".bold().blue(),
            self.name.bold(),
            version
        );
        Ok(())
    }
}
