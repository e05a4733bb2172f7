// sbx/src/cli/configure.rs
use clap::Args;
use colored::Colorize;
use sbx_common::catalog::Catalog;
use sbx_common::config::Config;
use sbx_common::error::{Result, SbxError};
use sbx_core::AnyInstaller;

/// Expose installed software system-wide (symlinks, unit files, configs).
#[derive(Args, Debug)]
pub struct ConfigureArgs {
    /// Software name from the catalog
    pub name: String,

    /// Configure a specific installed version instead of the latest
    #[arg(long)]
    pub version: Option<String>,
}

impl ConfigureArgs {
    pub async fn run(&self, config: &Config, catalog: &Catalog) -> Result<()> {
        let installer = AnyInstaller::for_software(
            catalog,
            &self.name,
            self.version.clone(),
            config.clone(),
        )?;

        if !installer.is_installed() {
            return Err(SbxError::Configuration {
                software: self.name.clone(),
                reason: "software is not installed".to_string(),
            });
        }
        if installer.is_configured() {
            println!(
                "{} {} is already configured.",
                "==>".bold().blue(),
                self.name.bold()
            );
            return Ok(());
        }

        installer.configure()?;
        println!("{} Configured {}", "==>".bold().blue(), self.name.bold());
        Ok(())
    }
}
