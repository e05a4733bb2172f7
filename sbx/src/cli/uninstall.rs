// sbx/src/cli/uninstall.rs
use clap::Args;
use colored::Colorize;
use sbx_common::catalog::Catalog;
use sbx_common::config::Config;
use sbx_common::error::Result;
use sbx_core::AnyInstaller;
use tracing::warn;

/// Remove a piece of software from the sandbox and undo its configuration.
#[derive(Args, Debug)]
pub struct UninstallArgs {
    /// Software name from the catalog
    pub name: String,

    /// Uninstall a specific version instead of the latest
    #[arg(long)]
    pub version: Option<String>,
}

impl UninstallArgs {
    pub async fn run(&self, config: &Config, catalog: &Catalog) -> Result<()> {
        let installer = AnyInstaller::for_software(
            catalog,
            &self.name,
            self.version.clone(),
            config.clone(),
        )?;

        if installer.is_configured() {
            installer.remove_configuration()?;
        }
        installer.uninstall()?;
        if let Err(e) = installer.cleanup() {
            warn!("Cleanup failed: {}", e);
            eprintln!("{} cleanup failed: {e}", "Warning:".yellow());
        }

        println!("{} Uninstalled {}", "==>".bold().blue(), self.name.bold());
        Ok(())
    }
}
