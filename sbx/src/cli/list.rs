// sbx/src/cli/list.rs
use clap::Args;
use colored::Colorize;
use sbx_common::catalog::Catalog;
use sbx_common::config::Config;
use sbx_common::error::Result;
use sbx_common::state::{StateMarker, StateTracker};

/// List all cataloged software with its latest version and current state.
#[derive(Args, Debug)]
pub struct List {}

impl List {
    pub async fn run(&self, config: &Config, catalog: &Catalog) -> Result<()> {
        let state = StateTracker::new(config);

        for name in catalog.names() {
            let artifact = catalog.artifact(&name)?;
            let latest = artifact.latest_version()?;
            let marker = match (
                state.exists(&name, StateMarker::Installed),
                state.exists(&name, StateMarker::Configured),
            ) {
                (true, true) => "installed, configured".green().to_string(),
                (true, false) => "installed".green().to_string(),
                _ => "available".normal().to_string(),
            };
            println!("{:<12} {:<10} {}", name.bold(), latest, marker);
        }
        Ok(())
    }
}
