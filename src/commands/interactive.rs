//! Interactive avatar sessions.

use clap::{Args, Subcommand};
use std::process::{Command, Stdio};
use tracing::warn;

use super::{print_json, Context};
use crate::api::{StartSessionRequest, INTERACTIVE_URL};
use crate::errors::MirakoError;
use crate::ui::{self, Column, Listing};

/// Manage interactive sessions.
#[derive(Args)]
pub struct InteractiveCommand {
    #[command(subcommand)]
    command: InteractiveSubcommand,
}

#[derive(Subcommand)]
enum InteractiveSubcommand {
    /// List active sessions
    List {
        /// Output in JSON format
        #[arg(short, long)]
        json: bool,
    },
    /// Start a session with an avatar
    Start {
        /// Avatar ID to use
        #[arg(short, long)]
        avatar: String,
        /// Model (defaults to the configured model)
        #[arg(short, long)]
        model: Option<String>,
        /// LLM model
        #[arg(short, long, default_value = "gemini-2.0-flash")]
        llm_model: String,
        /// Voice profile ID (defaults to the configured voice)
        #[arg(short, long)]
        voice: Option<String>,
        /// Instruction prompt
        #[arg(short, long, default_value = "You are a helpful AI assistant.")]
        instruction: String,
    },
    /// Stop one or more sessions
    Stop {
        #[arg(required = true)]
        session_ids: Vec<String>,
    },
}

impl InteractiveCommand {
    pub fn run(&self, ctx: &Context) -> Result<(), MirakoError> {
        match &self.command {
            InteractiveSubcommand::List { json } => list(ctx, *json),
            InteractiveSubcommand::Start {
                avatar,
                model,
                llm_model,
                voice,
                instruction,
            } => {
                let request = StartSessionRequest {
                    avatar_id: avatar.clone(),
                    model: model.clone().unwrap_or_else(|| ctx.config.default_model.clone()),
                    llm_model: llm_model.clone(),
                    voice_profile_id: voice.clone().or_else(|| {
                        Some(ctx.config.default_voice.clone()).filter(|v| !v.is_empty())
                    }),
                    instruction: instruction.clone(),
                };
                start(ctx, &request)
            }
            InteractiveSubcommand::Stop { session_ids } => stop(ctx, session_ids),
        }
    }
}

fn list(ctx: &Context, json: bool) -> Result<(), MirakoError> {
    let sessions = ctx.client()?.list_sessions()?;
    if json {
        return print_json(&sessions);
    }
    if sessions.is_empty() {
        println!("No active sessions found");
        return Ok(());
    }

    let mut table = Listing::new(&[
        ("session id", Column::Id),
        ("model", Column::Text),
        ("state", Column::Status),
        ("desired state", Column::Status),
        ("start time", Column::Time),
    ]);
    for session in &sessions {
        table.add_row(&[
            session.session_id.as_str(),
            session.metis_model.as_str(),
            session.state.as_deref().unwrap_or(""),
            session.desired_state.as_deref().unwrap_or(""),
            session.start_time.as_str(),
        ]);
    }
    table.print();
    Ok(())
}

fn start(ctx: &Context, request: &StartSessionRequest) -> Result<(), MirakoError> {
    if request.avatar_id.trim().is_empty() {
        return Err(MirakoError::Validation("avatar ID is required. Use --avatar flag".to_string()));
    }
    let started = ctx.client()?.start_session(request)?;

    ui::print_success("Session started successfully!");
    ui::print_detail("Session ID", &started.session.session_id);
    ui::print_detail("Model", &started.session.metis_model);
    println!(
        "You can use the following token for interactive api calls:\n   {}\n",
        started.session_token
    );

    let url = format!("{}/{}", INTERACTIVE_URL, started.session.session_id);
    if open_browser(&url) {
        println!("Opened session in browser: {}", url);
    } else {
        println!("You can now visit the url: {}", url);
    }
    Ok(())
}

/// Launches the platform browser without waiting for it.
fn open_browser(url: &str) -> bool {
    let launcher = if cfg!(target_os = "macos") {
        "open"
    } else if cfg!(target_os = "linux") {
        "xdg-open"
    } else {
        return false;
    };

    match Command::new(launcher)
        .arg(url)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(_) => true,
        Err(e) => {
            warn!(launcher, error = %e, "could not open browser");
            false
        }
    }
}

fn stop(ctx: &Context, session_ids: &[String]) -> Result<(), MirakoError> {
    let result = ctx.client()?.stop_sessions(session_ids)?;
    let stopped = result.stopped_sessions.unwrap_or_default();

    if stopped.is_empty() {
        println!("No sessions were stopped");
        return Ok(());
    }
    ui::print_success(&format!("Successfully stopped {} session(s):", stopped.len()));
    for id in &stopped {
        println!("   - {}", id);
    }
    Ok(())
}
