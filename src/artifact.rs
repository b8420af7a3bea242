//! Turning a finished job's payload into a file on disk.

use crate::errors::MirakoError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Local;
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Result data of a completed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedArtifact {
    InlineBase64(String),
    RemoteUrl(String),
    Identifier(String),
}

/// Kind of media file, which decides the filename prefix and extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Avatar,
    Image,
    Video,
    Speech,
}

impl MediaKind {
    pub fn prefix(self) -> &'static str {
        match self {
            MediaKind::Avatar => "avatar",
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Speech => "speech",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            MediaKind::Avatar | MediaKind::Image => "jpg",
            MediaKind::Video => "mp4",
            MediaKind::Speech => "wav",
        }
    }

    fn accepted_extensions(self) -> &'static [&'static str] {
        match self {
            MediaKind::Avatar | MediaKind::Image => &["jpg", "jpeg"],
            MediaKind::Video => &["mp4"],
            MediaKind::Speech => &["wav"],
        }
    }

    /// `<prefix>_<YYYYMMDD_HHMMSS_mmm>.<ext>`
    pub fn default_filename(self) -> String {
        let now = Local::now();
        format!(
            "{}_{}.{}",
            self.prefix(),
            now.format("%Y%m%d_%H%M%S_%3f"),
            self.extension()
        )
    }
}

/// Appends the canonical extension unless the path already ends with an
/// accepted one. Applying it twice changes nothing.
pub fn ensure_extension(path: &Path, media: MediaKind) -> PathBuf {
    let lower = path.to_string_lossy().to_lowercase();
    let accepted = media
        .accepted_extensions()
        .iter()
        .any(|ext| lower.ends_with(&format!(".{}", ext)));

    if accepted {
        path.to_path_buf()
    } else {
        let mut raw = path.as_os_str().to_os_string();
        raw.push(".");
        raw.push(media.extension());
        PathBuf::from(raw)
    }
}

/// Removes a leading `data:<mime>;base64,` prefix if present.
pub fn strip_data_url(data: &str) -> &str {
    let data = data.trim();
    if data.starts_with("data:") {
        if let Some(idx) = data.find(";base64,") {
            return &data[idx + ";base64,".len()..];
        }
    }
    data
}

pub fn decode_base64(data: &str, what: &str) -> Result<Vec<u8>, MirakoError> {
    BASE64
        .decode(strip_data_url(data))
        .map_err(|e| MirakoError::Decode(format!("{} data: {}", what, e)))
}

pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Where and whether to persist an artifact.
#[derive(Debug, Clone)]
pub struct SaveOptions {
    pub skip_save: bool,
    pub output: Option<PathBuf>,
    pub default_dir: PathBuf,
    /// Filename stem used instead of the timestamped default.
    pub stem: Option<String>,
}

impl SaveOptions {
    pub fn new(default_dir: impl Into<PathBuf>) -> Self {
        Self {
            skip_save: false,
            output: None,
            default_dir: default_dir.into(),
            stem: None,
        }
    }

    pub fn resolve_path(&self, media: MediaKind) -> PathBuf {
        let path = match (&self.output, &self.stem) {
            (Some(output), _) => output.clone(),
            (None, Some(stem)) => self
                .default_dir
                .join(format!("{}_{}.{}", media.prefix(), stem, media.extension())),
            (None, None) => self.default_dir.join(media.default_filename()),
        };
        ensure_extension(&path, media)
    }
}

/// What happened to an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialized {
    Saved { path: PathBuf, bytes: u64 },
    Skipped { description: String },
    Identifier(String),
}

/// Writes the artifact to disk, or describes it when saving is skipped.
pub fn materialize(
    artifact: &GeneratedArtifact,
    media: MediaKind,
    options: &SaveOptions,
    http: &Client,
) -> Result<Materialized, MirakoError> {
    match artifact {
        GeneratedArtifact::Identifier(id) => Ok(Materialized::Identifier(id.clone())),
        GeneratedArtifact::InlineBase64(data) if options.skip_save => Ok(Materialized::Skipped {
            description: format!("{} bytes", strip_data_url(data).len()),
        }),
        GeneratedArtifact::RemoteUrl(url) if options.skip_save => Ok(Materialized::Skipped {
            description: format!("URL: {}", url),
        }),
        GeneratedArtifact::InlineBase64(data) => {
            let path = options.resolve_path(media);
            let bytes = decode_base64(data, media.prefix())?;
            let written = write_file(&path, &bytes)?;
            debug!(path = %path.display(), bytes = written, "saved inline artifact");
            Ok(Materialized::Saved {
                path,
                bytes: written,
            })
        }
        GeneratedArtifact::RemoteUrl(url) => {
            let path = options.resolve_path(media);
            let bytes = download_to(http, url, &path)?;
            Ok(Materialized::Saved { path, bytes })
        }
    }
}

/// Streams a URL into a file.
///
/// The body goes to a temporary file next to `path` that takes the final
/// name only after the whole transfer succeeded. A failed or interrupted
/// download leaves `path` untouched.
pub fn download_to(http: &Client, url: &str, path: &Path) -> Result<u64, MirakoError> {
    debug!(url, path = %path.display(), "downloading artifact");
    let mut res = http
        .get(url)
        .send()
        .map_err(|e| MirakoError::Download(e.to_string()))?;

    if !res.status().is_success() {
        return Err(MirakoError::Download(format!("HTTP {}", res.status().as_u16())));
    }

    create_parent_dirs(path)?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut partial = tempfile::Builder::new()
        .prefix(".mirako-")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|e| {
            MirakoError::io(format!("Failed to create output file '{}'", path.display()), e)
        })?;

    let bytes = res
        .copy_to(partial.as_file_mut())
        .map_err(|e| MirakoError::Download(format!("failed to save '{}': {}", path.display(), e)))?;

    let file = partial.persist(path).map_err(|e| {
        MirakoError::io(format!("Failed to write '{}'", path.display()), e.error)
    })?;
    relax_permissions(&file);
    Ok(bytes)
}

/// Temporary files are created owner-only; downloads get ordinary file modes.
#[cfg(unix)]
fn relax_permissions(file: &File) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = file.set_permissions(fs::Permissions::from_mode(0o644)) {
        debug!(error = %e, "could not relax download permissions");
    }
}

#[cfg(not(unix))]
fn relax_permissions(_file: &File) {}

/// Writes plain bytes, creating parent directories first.
pub fn write_file(path: &Path, bytes: &[u8]) -> Result<u64, MirakoError> {
    create_parent_dirs(path)?;
    fs::write(path, bytes)
        .map_err(|e| MirakoError::io(format!("Failed to write '{}'", path.display()), e))?;
    Ok(bytes.len() as u64)
}

fn create_parent_dirs(path: &Path) -> Result<(), MirakoError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir).map_err(|e| {
            MirakoError::io(format!("Failed to create directory '{}'", dir.display()), e)
        }),
        _ => Ok(()),
    }
}
