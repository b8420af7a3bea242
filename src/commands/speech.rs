//! Speech-to-text and text-to-speech.

use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

use super::{read_base64, save_artifact, with_spinner, Context};
use crate::api::{TtsParams, TtsRequest};
use crate::artifact::{self, GeneratedArtifact, MediaKind};
use crate::errors::MirakoError;
use crate::ui;
use crate::validation;

/// Speech services.
#[derive(Args)]
pub struct SpeechCommand {
    #[command(subcommand)]
    command: SpeechSubcommand,
}

#[derive(Subcommand)]
enum SpeechSubcommand {
    /// Transcribe an audio file
    Stt {
        /// Audio file to transcribe
        #[arg(short, long)]
        audio: PathBuf,
        /// Write the text here instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Synthesize speech from text
    Tts(TtsArgs),
}

#[derive(Args)]
struct TtsArgs {
    /// Text to speak
    #[arg(short, long)]
    text: String,

    /// Voice profile ID (defaults to the configured voice)
    #[arg(short, long)]
    voice: Option<String>,

    /// Output file path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Chinese variant: mandarin or yue
    #[arg(short, long)]
    chinese: Option<String>,

    /// Sampling temperature (0.0-1.0)
    #[arg(short = 'T', long, default_value_t = 1.0)]
    temperature: f32,

    /// Pause between sentences (0.0-1.0)
    #[arg(short, long, default_value_t = 0.1)]
    fragment_interval: f32,
}

impl SpeechCommand {
    pub fn run(&self, ctx: &Context) -> Result<(), MirakoError> {
        match &self.command {
            SpeechSubcommand::Stt { audio, output } => stt(ctx, audio, output.as_deref()),
            SpeechSubcommand::Tts(args) => tts(ctx, args),
        }
    }
}

fn stt(ctx: &Context, audio: &Path, output: Option<&Path>) -> Result<(), MirakoError> {
    let encoded = read_base64(audio, "Audio")?;
    let api = ctx.client()?;

    ui::print_step("🎤 Converting speech to text...");
    let call_api = api.clone();
    let transcript = with_spinner("Processing...", move || call_api.speech_to_text(&encoded))?;

    match output {
        Some(path) => {
            artifact::write_file(path, transcript.text.as_bytes())?;
            ui::print_success(&format!("Text saved to: {}", path.display()));
        }
        None => println!("📝 Transcribed text:\n{}", transcript.text),
    }
    Ok(())
}

fn tts_request(ctx: &Context, args: &TtsArgs) -> Result<TtsRequest, MirakoError> {
    if args.text.trim().is_empty() {
        return Err(MirakoError::Validation("text is required. Use --text flag".to_string()));
    }
    let voice = args
        .voice
        .clone()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| ctx.config.default_voice.clone());
    if let Some(variant) = &args.chinese {
        validation::chinese_variant(variant)?;
    }
    validation::unit_range("temperature", args.temperature)?;
    validation::unit_range("fragment-interval", args.fragment_interval)?;

    Ok(TtsRequest {
        text: args.text.clone(),
        voice_profile_id: voice,
        return_type: "b64_audio_str".to_string(),
        chinese_language: args.chinese.clone(),
        opts: TtsParams {
            temperature: args.temperature,
            fragment_interval: args.fragment_interval,
        },
    })
}

fn tts(ctx: &Context, args: &TtsArgs) -> Result<(), MirakoError> {
    let request = tts_request(ctx, args)?;
    let api = ctx.client()?;

    ui::print_step("🗣️  Converting text to speech...");
    let call_api = api.clone();
    let speech = with_spinner("Generating audio...", move || call_api.text_to_speech(&request))?;

    let audio = speech.b64_audio_str.ok_or_else(|| {
        MirakoError::UnexpectedResponse("text to speech returned no audio".to_string())
    })?;
    let options = ctx.save_options(args.output.as_deref(), false);
    save_artifact(
        &api,
        &GeneratedArtifact::InlineBase64(audio),
        MediaKind::Speech,
        &options,
    )?;
    if let Some(secs) = speech.output_duration {
        ui::print_detail("Duration", &format!("{:.2} seconds", secs));
    }
    Ok(())
}
