use clap::{Args, Subcommand};

use super::Context;
use crate::config::{Config, KEYS};
use crate::errors::MirakoError;
use crate::ui;

/// Read and write configuration values.
#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Subcommand)]
enum ConfigSubcommand {
    /// Set a configuration value
    Set { key: String, value: String },
    /// Print a configuration value
    Get { key: String },
    /// Print every configuration value
    List,
}

impl ConfigCommand {
    pub fn run(&self, ctx: &Context) -> Result<(), MirakoError> {
        match &self.command {
            ConfigSubcommand::Set { key, value } => {
                let mut stored = Config::load()?;
                stored.set(key, value)?;
                stored.save()?;
                ui::print_success(&format!("Set {} = {}", key, stored.get(key)?));
                Ok(())
            }
            ConfigSubcommand::Get { key } => {
                println!("{}", ctx.config.get(key)?);
                Ok(())
            }
            ConfigSubcommand::List => {
                for key in KEYS {
                    println!("{}: {}", key, ctx.config.get(key)?);
                }
                Ok(())
            }
        }
    }
}
