use crate::artifact::GeneratedArtifact;
use crate::config::Config;
use crate::errors::{ApiError, MirakoError};
use crate::task::{TaskKind, TaskStatus};
use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60 * 60);

pub const INTERACTIVE_URL: &str = "https://interactive.mirako.ai/i";

/// Every successful response wraps its payload in `data`.
#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Avatar {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub themes: Option<Vec<AvatarTheme>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AvatarTheme {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub key_image: Option<String>,
}

impl Avatar {
    /// Status snapshot for build polling. A ready avatar yields its id.
    pub fn build_status(self) -> Result<TaskStatus, MirakoError> {
        let payload = Some(GeneratedArtifact::Identifier(self.id));
        TaskStatus::observe(TaskKind::AvatarBuild, self.status, payload, None)
    }
}

#[derive(Deserialize, Debug)]
pub struct TaskStarted {
    pub task_id: String,
}

#[derive(Deserialize, Debug)]
pub struct AvatarBuildStarted {
    pub avatar_id: String,
}

/// Status of an avatar or image generation task.
#[derive(Deserialize, Debug, Clone)]
pub struct GenerationStatus {
    pub status: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl GenerationStatus {
    pub fn into_status(self, kind: TaskKind) -> Result<TaskStatus, MirakoError> {
        let payload = self.image.map(GeneratedArtifact::InlineBase64);
        TaskStatus::observe(kind, self.status, payload, self.error)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct TalkingAvatarStatus {
    pub status: String,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub output_duration: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl TalkingAvatarStatus {
    pub fn into_status(self) -> Result<TaskStatus, MirakoError> {
        let payload = self.file_url.map(GeneratedArtifact::RemoteUrl);
        TaskStatus::observe(TaskKind::VideoGenerate, self.status, payload, self.error)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Session {
    pub session_id: String,
    #[serde(default)]
    pub metis_model: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub desired_state: Option<String>,
    #[serde(default)]
    pub start_time: String,
}

#[derive(Serialize, Debug)]
pub struct StartSessionRequest {
    pub avatar_id: String,
    pub model: String,
    pub llm_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_profile_id: Option<String>,
    pub instruction: String,
}

#[derive(Deserialize, Debug)]
pub struct StartedSession {
    pub session: Session,
    pub session_token: String,
}

#[derive(Serialize)]
struct StopSessionsRequest<'a> {
    session_ids: &'a [String],
}

#[derive(Deserialize, Debug)]
pub struct StoppedSessions {
    #[serde(default)]
    pub stopped_sessions: Option<Vec<String>>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LabeledImage {
    pub label: String,
    pub data: String,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct AvatarGenerateRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
}

impl AvatarGenerateRequest {
    /// A seed of 0 means "no seed".
    pub fn new(prompt: &str, seed: Option<i64>) -> Self {
        Self {
            prompt: prompt.to_string(),
            seed: seed.filter(|&seed| seed != 0),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ImageGenerateRequest {
    pub prompt: String,
    pub aspect_ratio: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labeled_images: Vec<LabeledImage>,
}

#[derive(Deserialize, Debug)]
pub struct Transcript {
    pub text: String,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct TtsParams {
    pub temperature: f32,
    pub fragment_interval: f32,
}

#[derive(Serialize, Debug)]
pub struct TtsRequest {
    pub text: String,
    pub voice_profile_id: String,
    pub return_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chinese_language: Option<String>,
    pub opts: TtsParams,
}

#[derive(Deserialize, Debug)]
pub struct SynthesizedSpeech {
    #[serde(default)]
    pub b64_audio_str: Option<String>,
    #[serde(default)]
    pub output_duration: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VoiceProfile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub is_premade: bool,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub sample_clip: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct VoiceCloneStatus {
    pub status: String,
    #[serde(default)]
    pub profile_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl VoiceCloneStatus {
    pub fn into_status(self) -> Result<TaskStatus, MirakoError> {
        let payload = self.profile_id.map(GeneratedArtifact::Identifier);
        TaskStatus::observe(TaskKind::VoiceClone, self.status, payload, self.error)
    }
}

/// Files for a voice clone upload.
#[derive(Debug, Clone)]
pub struct VoiceCloneUpload {
    pub name: String,
    pub clean_data: bool,
    pub annotation: PathBuf,
    pub samples: Vec<PathBuf>,
}

/// Blocking client for the Mirako REST API.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self, MirakoError> {
        let token = config.token()?.to_string();
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| MirakoError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// The underlying connection pool, used for artifact downloads.
    pub fn http(&self) -> &Client {
        &self.http
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        context: &str,
    ) -> Result<T, MirakoError> {
        let res = request.bearer_auth(&self.token).send()?;
        debug!(context, status = res.status().as_u16(), "api response");
        decode_response(res, context)
    }

    fn get<T: DeserializeOwned>(&self, path: &str, context: &str) -> Result<T, MirakoError> {
        debug!(path, "GET");
        self.send(self.http.get(self.url(path)), context)
    }

    fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        context: &str,
    ) -> Result<T, MirakoError> {
        debug!(path, "POST");
        self.send(self.http.post(self.url(path)).json(body), context)
    }

    fn delete(&self, path: &str, context: &str) -> Result<(), MirakoError> {
        debug!(path, "DELETE");
        let res = self
            .http
            .delete(self.url(path))
            .bearer_auth(&self.token)
            .send()?;
        if res.status().is_success() {
            Ok(())
        } else {
            Err(api_error(res, context))
        }
    }

    // Avatars

    pub fn list_avatars(&self) -> Result<Vec<Avatar>, MirakoError> {
        self.get("/v1/avatar/list", "list avatars")
    }

    pub fn get_avatar(&self, id: &str) -> Result<Avatar, MirakoError> {
        self.get(&format!("/v1/avatar/{}", id), "get avatar")
    }

    pub fn delete_avatar(&self, id: &str) -> Result<(), MirakoError> {
        self.delete(&format!("/v1/avatar/{}", id), "delete avatar")
    }

    pub fn generate_avatar(&self, request: &AvatarGenerateRequest) -> Result<TaskStarted, MirakoError> {
        self.post("/v1/avatar/async_generate", request, "generate avatar")
    }

    pub fn avatar_status(&self, task_id: &str) -> Result<GenerationStatus, MirakoError> {
        self.get(
            &format!("/v1/avatar/async_generate/{}/status", task_id),
            "get avatar status",
        )
    }

    /// `image` is base64 encoded.
    pub fn build_avatar(&self, name: &str, image: &str) -> Result<AvatarBuildStarted, MirakoError> {
        let body = serde_json::json!({ "name": name, "image": image });
        self.post("/v1/avatar/async_build", &body, "build avatar")
    }

    // Interactive sessions

    pub fn list_sessions(&self) -> Result<Vec<Session>, MirakoError> {
        self.get("/v1/interactive/list", "list sessions")
    }

    pub fn start_session(&self, request: &StartSessionRequest) -> Result<StartedSession, MirakoError> {
        self.post("/v1/interactive/start", request, "start session")
    }

    pub fn stop_sessions(&self, session_ids: &[String]) -> Result<StoppedSessions, MirakoError> {
        self.post(
            "/v1/interactive/stop",
            &StopSessionsRequest { session_ids },
            "stop sessions",
        )
    }

    // Images

    pub fn generate_image(&self, request: &ImageGenerateRequest) -> Result<TaskStarted, MirakoError> {
        self.post("/v1/image/async_generate", request, "generate image")
    }

    pub fn image_status(&self, task_id: &str) -> Result<GenerationStatus, MirakoError> {
        self.get(
            &format!("/v1/image/async_generate/{}/status", task_id),
            "get image status",
        )
    }

    // Speech

    /// `audio` is base64 encoded.
    pub fn speech_to_text(&self, audio: &str) -> Result<Transcript, MirakoError> {
        let body = serde_json::json!({ "audio": audio });
        self.post("/v1/speech/stt", &body, "speech to text")
    }

    pub fn text_to_speech(&self, request: &TtsRequest) -> Result<SynthesizedSpeech, MirakoError> {
        self.post("/v1/speech/tts", request, "text to speech")
    }

    // Video

    /// Both inputs are base64 encoded.
    pub fn generate_talking_avatar(&self, audio: &str, image: &str) -> Result<TaskStarted, MirakoError> {
        let body = serde_json::json!({ "audio": audio, "image": image });
        self.post(
            "/v1/video/async_generate_talking_avatar",
            &body,
            "generate talking avatar video",
        )
    }

    pub fn talking_avatar_status(&self, task_id: &str) -> Result<TalkingAvatarStatus, MirakoError> {
        self.get(
            &format!("/v1/video/async_generate_talking_avatar/{}/status", task_id),
            "get talking avatar video status",
        )
    }

    // Voices

    pub fn list_premade_profiles(&self) -> Result<Vec<VoiceProfile>, MirakoError> {
        self.get("/v1/voice/premade_profiles", "list voice profiles")
    }

    pub fn list_voice_profiles(&self) -> Result<Vec<VoiceProfile>, MirakoError> {
        self.get("/v1/voice/profiles", "list custom voice profiles")
    }

    pub fn get_voice_profile(&self, id: &str) -> Result<VoiceProfile, MirakoError> {
        self.get(&format!("/v1/voice/profiles/{}", id), "get voice profile")
    }

    pub fn delete_voice_profile(&self, id: &str) -> Result<(), MirakoError> {
        self.delete(&format!("/v1/voice/profiles/{}", id), "delete voice profile")
    }

    /// Multipart upload of the annotation list and every audio sample.
    pub fn clone_voice(&self, upload: &VoiceCloneUpload) -> Result<TaskStarted, MirakoError> {
        let mut form = multipart::Form::new()
            .text("name", upload.name.clone())
            .text("clean_data", upload.clean_data.to_string())
            .part(
                "annotation_list",
                file_part(&upload.annotation, "text/plain")?,
            );
        for sample in &upload.samples {
            form = form.part("audio_samples", file_part(sample, "audio/wav")?);
        }

        debug!(samples = upload.samples.len(), "POST /v1/voice/clone");
        let request = self
            .http
            .post(self.url("/v1/voice/clone"))
            .timeout(UPLOAD_TIMEOUT)
            .multipart(form);
        self.send(request, "clone voice")
    }

    pub fn voice_clone_status(&self, task_id: &str) -> Result<VoiceCloneStatus, MirakoError> {
        self.get(
            &format!("/v1/voice/clone/{}/status", task_id),
            "get voice clone status",
        )
    }
}

fn file_part(path: &Path, mime: &str) -> Result<multipart::Part, MirakoError> {
    let file = std::fs::File::open(path)
        .map_err(|e| MirakoError::io(format!("Failed to open '{}'", path.display()), e))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    multipart::Part::reader(file)
        .file_name(name)
        .mime_str(mime)
        .map_err(|e| MirakoError::Transport(e.to_string()))
}

fn decode_response<T: DeserializeOwned>(res: Response, context: &str) -> Result<T, MirakoError> {
    if !res.status().is_success() {
        return Err(api_error(res, context));
    }

    let body = res.text()?;
    parse_envelope(&body, context)
}

fn parse_envelope<T: DeserializeOwned>(body: &str, context: &str) -> Result<T, MirakoError> {
    let envelope: Envelope<T> = serde_json::from_str(body).map_err(|e| {
        MirakoError::UnexpectedResponse(format!("{}: invalid response body: {}", context, e))
    })?;
    envelope
        .data
        .ok_or_else(|| MirakoError::UnexpectedResponse(format!("{}: response has no data", context)))
}

fn api_error(res: Response, context: &str) -> MirakoError {
    let status = res.status().as_u16();
    let body = res.text().unwrap_or_default();
    debug!(status, body = %body, "api error");
    MirakoError::Api(ApiError {
        status,
        detail: error_detail(&body),
        context: context.to_string(),
    })
}

/// Pulls a readable message out of an error body such as `{"detail": "..."}`.
fn error_detail(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    let detail = json.get("detail").or_else(|| json.get("message"))?;
    match detail {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Array(items) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .collect();
            (!messages.is_empty()).then(|| messages.join("; "))
        }
        _ => None,
    }
}
