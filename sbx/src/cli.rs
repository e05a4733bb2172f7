// sbx/src/cli.rs
//! Defines the command-line argument structure using clap.
use clap::{ArgAction, Parser, Subcommand};
use sbx_common::catalog::Catalog;
use sbx_common::config::Config;
use sbx_common::error::Result;

// Module declarations
pub mod configure;
pub mod install;
pub mod list;
pub mod status;
pub mod unconfigure;
pub mod uninstall;

use crate::cli::configure::ConfigureArgs;
use crate::cli::install::InstallArgs;
use crate::cli::list::List;
use crate::cli::status::Status;
use crate::cli::unconfigure::UnconfigureArgs;
use crate::cli::uninstall::UninstallArgs;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "sbx", bin_name = "sbx")]
#[command(propagate_version = true)]
pub struct CliArgs {
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Install(InstallArgs),
    Uninstall(UninstallArgs),
    Configure(ConfigureArgs),
    Unconfigure(UnconfigureArgs),
    Status(Status),
    List(List),
}

impl Command {
    pub async fn run(&self, config: &Config, catalog: &Catalog) -> Result<()> {
        match self {
            Self::Install(command) => command.run(config, catalog).await,
            Self::Uninstall(command) => command.run(config, catalog).await,
            Self::Configure(command) => command.run(config, catalog).await,
            Self::Unconfigure(command) => command.run(config, catalog).await,
            Self::Status(command) => command.run(config, catalog).await,
            Self::List(command) => command.run(config, catalog).await,
        }
    }
}
