//! CLI commands.

mod auth;
mod avatar;
mod config;
mod image;
mod interactive;
mod speech;
mod video;
mod voice;

pub use auth::AuthCommand;
pub use avatar::AvatarCommand;
pub use config::ConfigCommand;
pub use image::ImageCommand;
pub use interactive::InteractiveCommand;
pub use speech::SpeechCommand;
pub use video::VideoCommand;
pub use voice::VoiceCommand;

use crate::api::ApiClient;
use crate::artifact::{self, GeneratedArtifact, MediaKind, Materialized, SaveOptions};
use crate::config::Config;
use crate::errors::MirakoError;
use crate::poller::{self, PollConfig, StatusFetch};
use crate::task::TaskHandle;
use crate::ui::{self, Spinner};
use clap::Args;
use dialoguer::{Confirm, Input};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Resolved configuration shared by every command.
pub struct Context {
    pub config: Config,
}

impl Context {
    /// Config file, then `MIRAKO_*` variables, then command-line flags.
    pub fn load(api_token: Option<&str>, api_url: Option<&str>) -> Result<Self, MirakoError> {
        let mut config = Config::load()?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.apply_flags(api_token, api_url);
        debug!(api_url = %config.api_url, authenticated = config.is_authenticated(), "config loaded");
        Ok(Self { config })
    }

    pub fn client(&self) -> Result<ApiClient, MirakoError> {
        ApiClient::new(&self.config)
    }

    pub fn save_options(&self, output: Option<&Path>, skip_save: bool) -> SaveOptions {
        SaveOptions {
            skip_save,
            output: output.map(Path::to_path_buf),
            ..SaveOptions::new(&self.config.default_save_path)
        }
    }
}

/// Flags shared by commands that wait on a remote job.
#[derive(Args, Debug, Clone)]
pub struct PollArgs {
    /// Seconds between status checks
    #[arg(short = 'i', long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval: Option<u64>,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,
}

impl PollArgs {
    pub fn config(&self, fallback: Duration) -> PollConfig {
        poll_config(self.poll_interval, self.timeout, fallback)
    }
}

/// [`PollArgs`] for commands whose `-i` already names an input image.
#[derive(Args, Debug, Clone)]
pub struct UploadPollArgs {
    /// Seconds between status checks
    #[arg(short = 'p', long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval: Option<u64>,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,
}

impl UploadPollArgs {
    pub fn config(&self, fallback: Duration) -> PollConfig {
        poll_config(self.poll_interval, self.timeout, fallback)
    }
}

fn poll_config(interval: Option<u64>, timeout: Option<u64>, fallback: Duration) -> PollConfig {
    let every = interval.map(Duration::from_secs).unwrap_or(fallback);
    PollConfig::every(every).with_max_wait(timeout.map(Duration::from_secs))
}

/// Flags shared by commands that save generated media.
#[derive(Args, Debug, Clone)]
pub struct SaveArgs {
    /// Output file path
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Don't save the result to disk
    #[arg(short, long)]
    pub no_save: bool,
}

/// Polls `handle` with a spinner until it finishes. Ctrl-C cancels.
pub(crate) fn wait_for_task(
    handle: &TaskHandle,
    fetch: StatusFetch,
    config: PollConfig,
) -> Result<GeneratedArtifact, MirakoError> {
    debug!(task = %handle.id, kind = ?handle.kind, every = ?config.poll_interval, "waiting for task");
    poller::run_interruptible(|cancel| async move {
        let mut spinner = Spinner::new();
        poller::wait_for(handle, fetch, &config, &cancel, &mut spinner).await
    })
}

/// Runs one slow request with a spinner. Ctrl-C cancels.
pub(crate) fn with_spinner<T, F>(label: &str, call: F) -> Result<T, MirakoError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, MirakoError> + Send + 'static,
{
    poller::run_interruptible(|cancel| async move {
        let mut spinner = Spinner::new();
        poller::with_spinner(
            label,
            call,
            poller::DEFAULT_SPINNER_INTERVAL,
            &cancel,
            &mut spinner,
        )
        .await
    })
}

/// Materializes an artifact and reports where it went.
///
/// Downloads run under the spinner so Ctrl-C can abandon them.
pub(crate) fn save_artifact(
    api: &ApiClient,
    artifact: &GeneratedArtifact,
    media: MediaKind,
    options: &SaveOptions,
) -> Result<Materialized, MirakoError> {
    let result = match artifact {
        GeneratedArtifact::RemoteUrl(_) if !options.skip_save => {
            let (artifact, options, http) = (artifact.clone(), options.clone(), api.http().clone());
            with_spinner(&format!("Downloading {}...", media.prefix()), move || {
                artifact::materialize(&artifact, media, &options, &http)
            })?
        }
        _ => artifact::materialize(artifact, media, options, api.http())?,
    };

    match &result {
        Materialized::Saved { path, bytes } => {
            ui::print_success(&format!("{} saved to: {}", title(media), path.display()));
            ui::print_detail("Size", &format!("{} bytes", bytes));
        }
        Materialized::Skipped { description } => {
            ui::print_step(&format!(
                "{} generated ({}) - skipping save due to --no-save flag",
                title(media),
                description
            ));
        }
        Materialized::Identifier(id) => ui::print_detail("ID", id),
    }
    Ok(result)
}

/// After a one-off status check, offers to save a finished result.
///
/// With an explicit `output` the result is written without prompting.
pub(crate) fn offer_save(
    ctx: &Context,
    api: &ApiClient,
    artifact: &GeneratedArtifact,
    media: MediaKind,
    task_id: &str,
    output: Option<&Path>,
) -> Result<(), MirakoError> {
    let target = match output {
        Some(path) => path.to_path_buf(),
        None => {
            if !confirm(&format!("Would you like to save the generated {}?", media.prefix()), true)? {
                ui::print_step(&format!("{} not saved.", title(media)));
                return Ok(());
            }
            let default_path = SaveOptions {
                stem: Some(task_id.to_string()),
                ..ctx.save_options(None, false)
            }
            .resolve_path(media);
            let entered: String = Input::new()
                .with_prompt("Enter save path")
                .default(default_path.display().to_string())
                .interact_text()
                .map_err(|e| MirakoError::Validation(e.to_string()))?;
            PathBuf::from(entered)
        }
    };

    let options = ctx.save_options(Some(&target), false);
    save_artifact(api, artifact, media, &options)?;
    Ok(())
}

pub(crate) fn confirm(prompt: &str, default: bool) -> Result<bool, MirakoError> {
    Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()
        .map_err(|e| MirakoError::Validation(format!("Error getting confirmation: {}", e)))
}

/// Reads a local file and base64-encodes it for a JSON request body.
pub(crate) fn read_base64(path: &Path, what: &str) -> Result<String, MirakoError> {
    crate::validation::input_file(path, what)?;
    let bytes = std::fs::read(path).map_err(|e| {
        MirakoError::io(format!("Failed to read {} file '{}'", what.to_lowercase(), path.display()), e)
    })?;
    debug!(path = %path.display(), bytes = bytes.len(), "encoded input file");
    Ok(artifact::encode_base64(&bytes))
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<(), MirakoError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| MirakoError::UnexpectedResponse(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

fn title(media: MediaKind) -> &'static str {
    match media {
        MediaKind::Avatar => "Avatar",
        MediaKind::Image => "Image",
        MediaKind::Video => "Video",
        MediaKind::Speech => "Audio",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::Progress;
    use clap::Parser;
    use reqwest::blocking::Client;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::time::Instant;
    use tokio_util::sync::CancellationToken;

    #[derive(Parser)]
    struct GenerateHarness {
        #[command(flatten)]
        save: SaveArgs,
        #[command(flatten)]
        poll: PollArgs,
    }

    #[derive(Parser)]
    struct UploadHarness {
        #[arg(short, long)]
        image: PathBuf,
        #[command(flatten)]
        poll: UploadPollArgs,
    }

    struct Silent;

    impl Progress for Silent {
        fn render(&mut self, _text: &str) {}
        fn clear(&mut self) {}
    }

    #[test]
    fn short_flags_for_saving_and_polling() {
        let args = GenerateHarness::parse_from(["generate", "-n", "-i", "5", "-o", "out/a"]);
        assert!(args.save.no_save);
        assert_eq!(args.save.output, Some(PathBuf::from("out/a")));
        let config = args.poll.config(Duration::from_secs(2));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.max_wait, None);
    }

    #[test]
    fn upload_commands_poll_with_p() {
        let args = UploadHarness::parse_from(["build", "-i", "face.jpg", "-p", "3", "--timeout", "60"]);
        assert_eq!(args.image, PathBuf::from("face.jpg"));
        let config = args.poll.config(Duration::from_secs(10));
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert_eq!(config.max_wait, Some(Duration::from_secs(60)));

        let defaults = UploadHarness::parse_from(["build", "-i", "face.jpg"]);
        assert_eq!(
            defaults.poll.config(Duration::from_secs(10)).poll_interval,
            Duration::from_secs(10)
        );
    }

    /// Sends headers and a little of a large body, then stalls before hanging up.
    fn stalled_server(stall: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let _ = stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000000\r\n\r\nfirst bytes");
            let _ = stream.flush();
            std::thread::sleep(stall);
        });
        format!("http://{}/render.mp4", addr)
    }

    #[test]
    fn cancelled_download_returns_promptly_and_leaves_no_file() {
        let url = stalled_server(Duration::from_millis(400));
        let dir = tempfile::tempdir().unwrap();
        let options = SaveOptions {
            output: Some(dir.path().join("talk.mp4")),
            ..SaveOptions::new(dir.path())
        };
        let http = Client::builder().no_proxy().build().unwrap();
        let artifact = GeneratedArtifact::RemoteUrl(url);

        let started = Instant::now();
        let result = poller::run_interruptible(|cancel: CancellationToken| {
            let (artifact, options, http) = (artifact.clone(), options.clone(), http.clone());
            async move {
                let trigger = cancel.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    trigger.cancel();
                });
                poller::with_spinner(
                    "Downloading video...",
                    move || artifact::materialize(&artifact, MediaKind::Video, &options, &http),
                    Duration::from_millis(10),
                    &cancel,
                    &mut Silent,
                )
                .await
            }
        });

        assert!(matches!(result, Err(MirakoError::Cancelled(_))), "{:?}", result);
        assert!(started.elapsed() < Duration::from_millis(350));
        assert!(!dir.path().join("talk.mp4").exists());

        // the abandoned transfer fails once the server hangs up
        std::thread::sleep(Duration::from_millis(700));
        assert!(!dir.path().join("talk.mp4").exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
