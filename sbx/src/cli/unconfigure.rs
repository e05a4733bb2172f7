// sbx/src/cli/unconfigure.rs
use clap::Args;
use colored::Colorize;
use sbx_common::catalog::Catalog;
use sbx_common::config::Config;
use sbx_common::error::Result;
use sbx_core::AnyInstaller;

/// Undo the system-wide configuration of a piece of software, leaving the
/// sandbox installation in place.
#[derive(Args, Debug)]
pub struct UnconfigureArgs {
    /// Software name from the catalog
    pub name: String,

    /// Unconfigure a specific version instead of the latest
    #[arg(long)]
    pub version: Option<String>,
}

impl UnconfigureArgs {
    pub async fn run(&self, config: &Config, catalog: &Catalog) -> Result<()> {
        let installer = AnyInstaller::for_software(
            catalog,
            &self.name,
            self.version.clone(),
            config.clone(),
        )?;

        installer.remove_configuration()?;
        println!("{} Unconfigured {}", "==>".bold().blue(), self.name.bold());
        Ok(())
    }
}
