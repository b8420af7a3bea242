//! Talking avatar video commands.

use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{
    offer_save, read_base64, save_artifact, wait_for_task, Context, SaveArgs, UploadPollArgs,
};
use crate::artifact::MediaKind;
use crate::errors::MirakoError;
use crate::poller::StatusFetch;
use crate::task::{TaskHandle, TaskKind};
use crate::ui;

/// Generate videos.
#[derive(Args)]
pub struct VideoCommand {
    #[command(subcommand)]
    command: VideoSubcommand,
}

#[derive(Subcommand)]
enum VideoSubcommand {
    /// Animate an image with an audio track
    GenerateTalking {
        /// Speech audio
        #[arg(short, long)]
        audio: PathBuf,
        /// Face image
        #[arg(short, long)]
        image: PathBuf,
        #[command(flatten)]
        save: SaveArgs,
        #[command(flatten)]
        poll: UploadPollArgs,
    },
    /// Check a talking avatar generation task
    Status {
        task_id: String,
        /// Save the video here without prompting
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl VideoCommand {
    pub fn run(&self, ctx: &Context) -> Result<(), MirakoError> {
        match &self.command {
            VideoSubcommand::GenerateTalking {
                audio,
                image,
                save,
                poll,
            } => generate_talking(ctx, audio, image, save, poll),
            VideoSubcommand::Status { task_id, output } => status(ctx, task_id, output.as_deref()),
        }
    }
}

fn generate_talking(
    ctx: &Context,
    audio: &Path,
    image: &Path,
    save: &SaveArgs,
    poll: &UploadPollArgs,
) -> Result<(), MirakoError> {
    let audio = read_base64(audio, "Audio")?;
    let image = read_base64(image, "Image")?;
    let api = ctx.client()?;

    let started = api.generate_talking_avatar(&audio, &image)?;
    ui::print_success("Talking avatar video generation started!");
    ui::print_detail("Task ID", &started.task_id);

    let handle = TaskHandle::new(started.task_id, TaskKind::VideoGenerate);
    let fetch: StatusFetch = {
        let api = api.clone();
        Arc::new(move |id: &str| api.talking_avatar_status(id)?.into_status())
    };
    let artifact = wait_for_task(&handle, fetch, poll.config(ctx.config.poll_interval()))?;
    ui::print_success("Generation completed!");

    let options = ctx.save_options(save.output.as_deref(), save.no_save);
    save_artifact(&api, &artifact, MediaKind::Video, &options)?;
    Ok(())
}

fn status(ctx: &Context, task_id: &str, output: Option<&Path>) -> Result<(), MirakoError> {
    let api = ctx.client()?;
    let raw = api.talking_avatar_status(task_id)?;
    let duration = raw.output_duration;
    let status = raw.into_status()?;

    println!("Task ID: {}", task_id);
    println!("Status: {}", status.label());
    if let Some(detail) = status.error_detail() {
        println!("Error: {}", detail);
    }

    if let Some(artifact) = status.payload() {
        ui::print_success("Video generated successfully!");
        if let Some(secs) = duration {
            ui::print_detail("Duration", &format!("{:.2} seconds", secs));
        }
        offer_save(ctx, &api, artifact, MediaKind::Video, task_id, output)?;
    }
    Ok(())
}
