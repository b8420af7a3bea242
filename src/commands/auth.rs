use clap::{Args, Subcommand};
use colored::Colorize;
use rpassword::prompt_password;

use super::Context;
use crate::config::Config;
use crate::errors::MirakoError;
use crate::ui;

/// Manage authentication.
#[derive(Args)]
pub struct AuthCommand {
    #[command(subcommand)]
    command: AuthSubcommand,
}

#[derive(Subcommand)]
enum AuthSubcommand {
    /// Store an API token
    Login {
        /// API token; prompted for when omitted
        #[arg(short, long)]
        token: Option<String>,
    },
    /// Remove the stored API token
    Logout,
    /// Show authentication status
    Status,
}

impl AuthCommand {
    pub fn run(&self, ctx: &Context) -> Result<(), MirakoError> {
        match &self.command {
            AuthSubcommand::Login { token } => login(token.as_deref()),
            AuthSubcommand::Logout => logout(),
            AuthSubcommand::Status => status(ctx),
        }
    }
}

fn login(token: Option<&str>) -> Result<(), MirakoError> {
    let token = match token {
        Some(t) => t.to_string(),
        None => {
            println!("Get your API token from {}", "https://mirako.ai/account".blue());
            prompt_password("Enter API token: ")
                .map_err(|e| MirakoError::Validation(e.to_string()))?
        }
    };
    let token = token.trim();
    if token.is_empty() {
        return Err(MirakoError::Validation("API token cannot be empty".to_string()));
    }

    // Persist only what was on disk plus the new token; env and flags stay transient.
    let mut stored = Config::load()?;
    stored.api_token = Some(token.to_string());
    stored.save()?;

    ui::print_success("Successfully authenticated!");
    Ok(())
}

fn logout() -> Result<(), MirakoError> {
    let mut stored = Config::load()?;
    stored.api_token = None;
    stored.save()?;
    ui::print_success("Successfully logged out");
    Ok(())
}

fn status(ctx: &Context) -> Result<(), MirakoError> {
    if ctx.config.is_authenticated() {
        ui::print_success("Authenticated");
    } else {
        println!("{}", "❌ Not authenticated".red());
        ui::print_hint("Run 'mirako auth login' to authenticate");
    }
    ui::print_detail("API URL", &ctx.config.api_url);
    ui::print_detail("Config file", &Config::path()?.display().to_string());
    Ok(())
}
