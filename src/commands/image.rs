//! Image generation commands.

use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{offer_save, read_base64, save_artifact, wait_for_task, Context, PollArgs, SaveArgs};
use crate::api::{ImageGenerateRequest, LabeledImage};
use crate::artifact::{GeneratedArtifact, MediaKind};
use crate::errors::MirakoError;
use crate::poller::StatusFetch;
use crate::task::{TaskHandle, TaskKind};
use crate::ui;
use crate::validation;

/// Generate images.
#[derive(Args)]
pub struct ImageCommand {
    #[command(subcommand)]
    command: ImageSubcommand,
}

#[derive(Subcommand)]
enum ImageSubcommand {
    /// Generate an image from a prompt
    Generate(GenerateArgs),
    /// Check an image generation task
    Status {
        task_id: String,
        /// Save the image here without prompting
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct GenerateArgs {
    /// Text description of the image
    #[arg(short, long)]
    prompt: String,

    /// One of 1:1, 16:9, 2:3, 3:2, 3:4, 4:3, 9:16
    #[arg(short, long, default_value = "16:9")]
    aspect_ratio: String,

    /// Seed for reproducible results (0 lets the service pick)
    #[arg(short, long)]
    seed: Option<i64>,

    /// Reference image (repeatable)
    #[arg(long = "image", value_name = "PATH")]
    images: Vec<PathBuf>,

    /// Labeled reference image as LABEL=PATH (repeatable)
    #[arg(long = "labeled-image", value_name = "LABEL=PATH")]
    labeled_images: Vec<String>,

    #[command(flatten)]
    save: SaveArgs,

    #[command(flatten)]
    poll: PollArgs,
}

impl ImageCommand {
    pub fn run(&self, ctx: &Context) -> Result<(), MirakoError> {
        match &self.command {
            ImageSubcommand::Generate(args) => generate(ctx, args),
            ImageSubcommand::Status { task_id, output } => status(ctx, task_id, output.as_deref()),
        }
    }
}

/// Validates and encodes everything before touching the network.
fn build_request(args: &GenerateArgs) -> Result<ImageGenerateRequest, MirakoError> {
    validation::prompt(&args.prompt)?;
    validation::aspect_ratio(&args.aspect_ratio)?;
    validation::image_count(args.images.len(), args.labeled_images.len())?;

    let labeled = args
        .labeled_images
        .iter()
        .map(String::as_str)
        .map(validation::labeled_image)
        .collect::<Result<Vec<_>, _>>()?;

    let images = args
        .images
        .iter()
        .map(|path| read_base64(path, "Image"))
        .collect::<Result<Vec<_>, _>>()?;
    let labeled_images = labeled
        .into_iter()
        .map(|(label, path)| {
            Ok(LabeledImage {
                label,
                data: read_base64(&path, "Image")?,
            })
        })
        .collect::<Result<Vec<_>, MirakoError>>()?;

    Ok(ImageGenerateRequest {
        prompt: args.prompt.clone(),
        aspect_ratio: args.aspect_ratio.clone(),
        seed: args.seed.filter(|&seed| seed != 0),
        images,
        labeled_images,
    })
}

fn generate(ctx: &Context, args: &GenerateArgs) -> Result<(), MirakoError> {
    let request = build_request(args)?;
    let api = ctx.client()?;

    let started = api.generate_image(&request)?;
    ui::print_success("Image generation started!");
    ui::print_detail("Task ID", &started.task_id);

    let handle = TaskHandle::new(started.task_id, TaskKind::ImageGenerate);
    let fetch: StatusFetch = {
        let api = api.clone();
        Arc::new(move |id: &str| api.image_status(id)?.into_status(TaskKind::ImageGenerate))
    };
    let artifact = wait_for_task(&handle, fetch, args.poll.config(ctx.config.poll_interval()))?;
    ui::print_success("Generation completed!");

    let options = ctx.save_options(args.save.output.as_deref(), args.save.no_save);
    save_artifact(&api, &artifact, MediaKind::Image, &options)?;
    Ok(())
}

fn status(ctx: &Context, task_id: &str, output: Option<&Path>) -> Result<(), MirakoError> {
    let api = ctx.client()?;
    let status = api.image_status(task_id)?.into_status(TaskKind::ImageGenerate)?;

    println!("Task ID: {}", task_id);
    println!("Status: {}", status.label());
    if let Some(detail) = status.error_detail() {
        println!("Error: {}", detail);
    }

    if let Some(artifact) = status.payload() {
        ui::print_success("Image generated successfully!");
        if let GeneratedArtifact::InlineBase64(data) = artifact {
            ui::print_detail("Image", &format!("{} bytes", data.len()));
        }
        offer_save(ctx, &api, artifact, MediaKind::Image, task_id, output)?;
    }
    Ok(())
}
