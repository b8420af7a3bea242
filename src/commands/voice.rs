//! Voice profiles and voice cloning.

use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{confirm, print_json, wait_for_task, Context, PollArgs};
use crate::api::{VoiceCloneUpload, VoiceProfile};
use crate::artifact::GeneratedArtifact;
use crate::errors::MirakoError;
use crate::poller::StatusFetch;
use crate::task::{TaskHandle, TaskKind};
use crate::ui::{self, Column, Listing};
use crate::validation;

/// Manage voice profiles.
#[derive(Args)]
pub struct VoiceCommand {
    #[command(subcommand)]
    command: VoiceSubcommand,
}

#[derive(Subcommand)]
enum VoiceSubcommand {
    /// List premade voice profiles
    Premade {
        /// Output in JSON format
        #[arg(short, long)]
        json: bool,
    },
    /// List your custom voice profiles
    List {
        /// Output in JSON format
        #[arg(short, long)]
        json: bool,
    },
    /// Show voice profile details
    View { id: String },
    /// Delete a custom voice profile
    Delete {
        id: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Clone a voice from annotated audio samples
    Clone {
        /// Name of the new voice profile
        #[arg(short, long)]
        name: String,
        /// Directory of .wav/.mp3 samples
        #[arg(short, long)]
        audio_dir: PathBuf,
        /// Annotation list with `filename|transcription` lines
        #[arg(long)]
        annotation: PathBuf,
        /// Ask the service to clean the samples first
        #[arg(long)]
        clean_data: bool,
        #[command(flatten)]
        poll: PollArgs,
    },
    /// Check a voice cloning task
    CloneStatus { task_id: String },
}

impl VoiceCommand {
    pub fn run(&self, ctx: &Context) -> Result<(), MirakoError> {
        match &self.command {
            VoiceSubcommand::Premade { json } => {
                let profiles = ctx.client()?.list_premade_profiles()?;
                print_profiles(&profiles, *json)
            }
            VoiceSubcommand::List { json } => {
                let profiles = ctx.client()?.list_voice_profiles()?;
                print_profiles(&profiles, *json)
            }
            VoiceSubcommand::View { id } => view(ctx, id),
            VoiceSubcommand::Delete { id, force } => delete(ctx, id, *force),
            VoiceSubcommand::Clone {
                name,
                audio_dir,
                annotation,
                clean_data,
                poll,
            } => clone(ctx, name, audio_dir, annotation, *clean_data, poll),
            VoiceSubcommand::CloneStatus { task_id } => clone_status(ctx, task_id),
        }
    }
}

fn print_profiles(profiles: &[VoiceProfile], json: bool) -> Result<(), MirakoError> {
    if json {
        return print_json(&profiles);
    }
    if profiles.is_empty() {
        println!("No voice profiles found");
        return Ok(());
    }

    let mut table = Listing::new(&[
        ("id", Column::Id),
        ("name", Column::Text),
        ("description", Column::Text),
    ]);
    for profile in profiles {
        table.add_row(&[
            profile.id.as_str(),
            profile.name.as_deref().unwrap_or(""),
            profile.description.as_deref().unwrap_or(""),
        ]);
    }
    table.print();
    Ok(())
}

fn view(ctx: &Context, id: &str) -> Result<(), MirakoError> {
    let profile = ctx.client()?.get_voice_profile(id)?;

    println!("Voice Profile Details:");
    println!("  ID: {}", profile.id);
    println!("  Name: {}", profile.name.as_deref().unwrap_or(""));
    println!("  Description: {}", profile.description.as_deref().unwrap_or(""));
    println!("  Status: {}", profile.status.as_deref().unwrap_or(""));
    if let Some(created) = &profile.created_at {
        println!("  Created: {}", ui::format_timestamp(created));
    }
    println!("  Premade: {}", profile.is_premade);
    if let Some(user) = &profile.user_id {
        println!("  User ID: {}", user);
    }
    if let Some(sample) = &profile.sample_clip {
        println!("  Sample: {}", sample);
    }
    Ok(())
}

fn delete(ctx: &Context, id: &str, force: bool) -> Result<(), MirakoError> {
    if !force
        && !confirm(
            &format!(
                "Are you sure you want to delete voice profile {}? This action cannot be undone.",
                id
            ),
            false,
        )?
    {
        println!("Deletion cancelled");
        return Ok(());
    }

    ctx.client()?.delete_voice_profile(id)?;
    ui::print_success(&format!("Successfully deleted voice profile: {}", id));
    Ok(())
}

fn clone(
    ctx: &Context,
    name: &str,
    audio_dir: &Path,
    annotation: &Path,
    clean_data: bool,
    poll: &PollArgs,
) -> Result<(), MirakoError> {
    if name.trim().is_empty() {
        return Err(MirakoError::Validation("name is required. Use --name flag".to_string()));
    }
    let samples = validation::voice_clone_input(audio_dir, annotation)?;
    let api = ctx.client()?;

    ui::print_step(&format!(
        "Uploading {} audio files for voice cloning...",
        samples.len()
    ));
    let started = api.clone_voice(&VoiceCloneUpload {
        name: name.to_string(),
        clean_data,
        annotation: annotation.to_path_buf(),
        samples,
    })?;
    ui::print_success("Voice cloning started!");
    ui::print_detail("Task ID", &started.task_id);

    let handle = TaskHandle::new(started.task_id, TaskKind::VoiceClone);
    let fetch: StatusFetch = {
        let api = api.clone();
        Arc::new(move |id: &str| api.voice_clone_status(id)?.into_status())
    };
    let artifact = wait_for_task(&handle, fetch, poll.config(ctx.config.poll_interval()))?;

    ui::print_success("Voice cloning completed!");
    if let GeneratedArtifact::Identifier(profile) = artifact {
        ui::print_detail("Voice profile ID", &profile);
    }
    Ok(())
}

fn clone_status(ctx: &Context, task_id: &str) -> Result<(), MirakoError> {
    let status = ctx
        .client()?
        .voice_clone_status(task_id)?
        .into_status()?;

    println!("Task ID: {}", task_id);
    println!("Status: {}", status.label());
    if let Some(detail) = status.error_detail() {
        println!("Error: {}", detail);
    }
    if let Some(GeneratedArtifact::Identifier(profile)) = status.payload() {
        ui::print_detail("Voice profile ID", profile);
    }
    Ok(())
}
