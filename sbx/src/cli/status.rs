// sbx/src/cli/status.rs
use clap::Args;
use colored::Colorize;
use sbx_common::catalog::Catalog;
use sbx_common::config::Config;
use sbx_common::error::Result;
use sbx_common::state::{StateMarker, StateTracker};

/// Show the recorded installation state of one piece of software.
#[derive(Args, Debug)]
pub struct Status {
    /// Software name from the catalog
    pub name: String,
}

impl Status {
    pub async fn run(&self, config: &Config, catalog: &Catalog) -> Result<()> {
        // Validates the name, so typos don't read as "not installed".
        catalog.artifact(&self.name)?;
        let state = StateTracker::new(config);

        let installed = state.recorded_version(&self.name, StateMarker::Installed);
        let configured = state.recorded_version(&self.name, StateMarker::Configured);

        match &installed {
            Some(version) => println!(
                "{}: installed {}",
                self.name.bold(),
                version.green()
            ),
            None => println!("{}: not installed", self.name.bold()),
        }
        match &configured {
            Some(version) => println!("{}: configured {}", self.name.bold(), version.green()),
            None => println!("{}: not configured", self.name.bold()),
        }
        Ok(())
    }
}
