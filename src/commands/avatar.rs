//! Avatar commands.

use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::{
    confirm, offer_save, print_json, read_base64, save_artifact, wait_for_task, Context, PollArgs,
    SaveArgs, UploadPollArgs,
};
use crate::api::{ApiClient, AvatarGenerateRequest};
use crate::artifact::{GeneratedArtifact, MediaKind};
use crate::errors::MirakoError;
use crate::poller::StatusFetch;
use crate::task::{TaskHandle, TaskKind};
use crate::ui::{self, Column, Listing};
use crate::validation;

const BUILD_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Manage avatars.
#[derive(Args)]
pub struct AvatarCommand {
    #[command(subcommand)]
    command: AvatarSubcommand,
}

#[derive(Subcommand)]
enum AvatarSubcommand {
    /// List your avatars
    List {
        /// Output in JSON format
        #[arg(short, long)]
        json: bool,
    },
    /// Show avatar details
    View { id: String },
    /// Generate an avatar image from a prompt
    Generate {
        /// Text description of the avatar
        #[arg(short, long)]
        prompt: String,
        /// Seed for reproducible results (0 lets the service pick)
        #[arg(short, long)]
        seed: Option<i64>,
        #[command(flatten)]
        save: SaveArgs,
        #[command(flatten)]
        poll: PollArgs,
    },
    /// Build a new avatar from an image
    Build {
        /// Avatar name
        #[arg(short, long)]
        name: String,
        /// Source image
        #[arg(short, long)]
        image: PathBuf,
        #[command(flatten)]
        poll: UploadPollArgs,
    },
    /// Check an avatar generation task
    Status {
        task_id: String,
        /// Save the image here without prompting
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete an avatar
    Delete {
        id: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

impl AvatarCommand {
    pub fn run(&self, ctx: &Context) -> Result<(), MirakoError> {
        match &self.command {
            AvatarSubcommand::List { json } => list(ctx, *json),
            AvatarSubcommand::View { id } => view(ctx, id),
            AvatarSubcommand::Generate {
                prompt,
                seed,
                save,
                poll,
            } => generate(ctx, prompt, *seed, save, poll),
            AvatarSubcommand::Build { name, image, poll } => build(ctx, name, image, poll),
            AvatarSubcommand::Status { task_id, output } => status(ctx, task_id, output.as_deref()),
            AvatarSubcommand::Delete { id, force } => delete(ctx, id, *force),
        }
    }
}

fn list(ctx: &Context, json: bool) -> Result<(), MirakoError> {
    let avatars = ctx.client()?.list_avatars()?;
    if json {
        return print_json(&avatars);
    }
    if avatars.is_empty() {
        println!("No avatars found");
        return Ok(());
    }

    let mut table = Listing::new(&[
        ("name", Column::Text),
        ("id", Column::Id),
        ("status", Column::Status),
        ("created", Column::Time),
    ]);
    for avatar in &avatars {
        table.add_row(&[
            avatar.name.as_str(),
            avatar.id.as_str(),
            avatar.status.as_str(),
            avatar.created_at.as_str(),
        ]);
    }
    table.print();
    Ok(())
}

fn view(ctx: &Context, id: &str) -> Result<(), MirakoError> {
    let avatar = ctx.client()?.get_avatar(id)?;

    println!("ID: {}", avatar.id);
    println!("Name: {}", avatar.name);
    println!("Status: {}", avatar.status);
    println!("Created: {}", ui::format_timestamp(&avatar.created_at));
    if let Some(user) = &avatar.user_id {
        println!("User ID: {}", user);
    }

    let themes = avatar.themes.unwrap_or_default();
    if !themes.is_empty() {
        println!("\nThemes:");
        for theme in &themes {
            println!("  - {}", theme.name.as_deref().unwrap_or("(unnamed)"));
            if let Some(key_image) = &theme.key_image {
                println!("    Key Image: {}", key_image);
            }
        }
    }
    Ok(())
}

fn generate(
    ctx: &Context,
    prompt: &str,
    seed: Option<i64>,
    save: &SaveArgs,
    poll: &PollArgs,
) -> Result<(), MirakoError> {
    validation::prompt(prompt)?;
    let api = ctx.client()?;

    let started = api.generate_avatar(&AvatarGenerateRequest::new(prompt, seed))?;
    ui::print_success("Avatar generation started!");
    ui::print_detail("Task ID", &started.task_id);

    let handle = TaskHandle::new(started.task_id, TaskKind::AvatarGenerate);
    let artifact = wait_for_task(
        &handle,
        generation_fetch(&api),
        poll.config(ctx.config.poll_interval()),
    )?;
    ui::print_success("Generation completed!");

    let options = ctx.save_options(save.output.as_deref(), save.no_save);
    save_artifact(&api, &artifact, MediaKind::Avatar, &options)?;
    Ok(())
}

fn generation_fetch(api: &ApiClient) -> StatusFetch {
    let api = api.clone();
    Arc::new(move |id: &str| api.avatar_status(id)?.into_status(TaskKind::AvatarGenerate))
}

fn build(
    ctx: &Context,
    name: &str,
    image: &Path,
    poll: &UploadPollArgs,
) -> Result<(), MirakoError> {
    if name.trim().is_empty() {
        return Err(MirakoError::Validation("name is required. Use --name flag".to_string()));
    }
    let encoded = read_base64(image, "Image")?;
    let api = ctx.client()?;

    let started = api.build_avatar(name, &encoded)?;
    ui::print_success("Avatar build started!");
    ui::print_detail("Avatar ID", &started.avatar_id);

    let handle = TaskHandle::new(started.avatar_id, TaskKind::AvatarBuild);
    let fetch: StatusFetch = {
        let api = api.clone();
        Arc::new(move |id: &str| api.get_avatar(id)?.build_status())
    };
    let artifact = wait_for_task(&handle, fetch, poll.config(BUILD_POLL_INTERVAL))?;

    ui::print_success("Avatar is ready!");
    if let GeneratedArtifact::Identifier(id) = artifact {
        ui::print_detail("Avatar ID", &id);
    }
    Ok(())
}

fn status(ctx: &Context, task_id: &str, output: Option<&Path>) -> Result<(), MirakoError> {
    let api = ctx.client()?;
    let status = api
        .avatar_status(task_id)?
        .into_status(TaskKind::AvatarGenerate)?;

    println!("Task ID: {}", task_id);
    println!("Status: {}", status.label());
    if let Some(detail) = status.error_detail() {
        println!("Error: {}", detail);
    }

    if let Some(artifact) = status.payload() {
        ui::print_success("Avatar generated successfully!");
        if let GeneratedArtifact::InlineBase64(data) = artifact {
            ui::print_detail("Image", &format!("{} bytes", data.len()));
        }
        offer_save(ctx, &api, artifact, MediaKind::Avatar, task_id, output)?;
    }
    Ok(())
}

fn delete(ctx: &Context, id: &str, force: bool) -> Result<(), MirakoError> {
    if !force
        && !confirm(
            &format!(
                "Are you sure you want to delete avatar {}? This action cannot be undone.",
                id
            ),
            false,
        )?
    {
        println!("Deletion cancelled");
        return Ok(());
    }

    ctx.client()?.delete_avatar(id)?;
    ui::print_success(&format!("Successfully deleted avatar: {}", id));
    Ok(())
}
