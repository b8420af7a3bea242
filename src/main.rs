mod api;
mod artifact;
mod commands;
mod config;
mod errors;
mod poller;
mod task;
mod ui;
mod validation;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::{
    AuthCommand, AvatarCommand, ConfigCommand, Context, ImageCommand, InteractiveCommand,
    SpeechCommand, VideoCommand, VoiceCommand,
};
use crate::errors::MirakoError;
use crate::ui::display_error;

#[derive(Parser)]
#[command(
    name = "mirako",
    version,
    about = "Mirako CLI - generate avatars, images, video and speech from the terminal"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// API token (overrides config and MIRAKO_API_TOKEN)
    #[arg(long, global = true, value_name = "TOKEN")]
    api_token: Option<String>,

    /// API base URL (overrides config and MIRAKO_API_URL)
    #[arg(long, global = true, value_name = "URL")]
    api_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate with Mirako
    Auth(AuthCommand),
    /// Manage configuration
    Config(ConfigCommand),
    /// Manage and generate avatars
    Avatar(AvatarCommand),
    /// Interactive avatar sessions
    Interactive(InteractiveCommand),
    /// Generate images
    Image(ImageCommand),
    /// Generate talking avatar videos
    Video(VideoCommand),
    /// Speech-to-text and text-to-speech
    Speech(SpeechCommand),
    /// Voice profiles and cloning
    Voice(VoiceCommand),
    /// Print the version
    Version,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if let Err(e) = run(cli) {
        display_error(&e);
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins; otherwise `--debug` turns on debug output.
fn init_logging(debug: bool) {
    let fallback = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<(), MirakoError> {
    if let Commands::Version = cli.command {
        println!("mirako version {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let ctx = Context::load(cli.api_token.as_deref(), cli.api_url.as_deref())?;
    match &cli.command {
        Commands::Auth(cmd) => cmd.run(&ctx),
        Commands::Config(cmd) => cmd.run(&ctx),
        Commands::Avatar(cmd) => cmd.run(&ctx),
        Commands::Interactive(cmd) => cmd.run(&ctx),
        Commands::Image(cmd) => cmd.run(&ctx),
        Commands::Video(cmd) => cmd.run(&ctx),
        Commands::Speech(cmd) => cmd.run(&ctx),
        Commands::Voice(cmd) => cmd.run(&ctx),
        Commands::Version => Ok(()),
    }
}
