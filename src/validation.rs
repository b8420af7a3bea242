//! Local input checks run before any request is sent.

use crate::errors::MirakoError;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const MAX_PROMPT_CHARS: usize = 1000;
pub const MAX_INPUT_IMAGES: usize = 5;
pub const ASPECT_RATIOS: &[&str] = &["1:1", "16:9", "2:3", "3:2", "3:4", "4:3", "9:16"];
pub const CHINESE_VARIANTS: &[&str] = &["mandarin", "yue"];
const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3"];

pub fn prompt(prompt: &str) -> Result<(), MirakoError> {
    if prompt.trim().is_empty() {
        return Err(MirakoError::Validation(
            "prompt is required. Use --prompt flag".to_string(),
        ));
    }
    let chars = prompt.chars().count();
    if chars > MAX_PROMPT_CHARS {
        return Err(MirakoError::Validation(format!(
            "prompt is too long (max {} characters, got {})",
            MAX_PROMPT_CHARS, chars
        )));
    }
    Ok(())
}

pub fn aspect_ratio(ratio: &str) -> Result<(), MirakoError> {
    if ASPECT_RATIOS.contains(&ratio) {
        Ok(())
    } else {
        Err(MirakoError::Validation(format!(
            "unsupported aspect ratio '{}' (expected one of {})",
            ratio,
            ASPECT_RATIOS.join(", ")
        )))
    }
}

/// Caps plain plus labeled reference images.
pub fn image_count(plain: usize, labeled: usize) -> Result<(), MirakoError> {
    let total = plain + labeled;
    if total > MAX_INPUT_IMAGES {
        return Err(MirakoError::Validation(format!(
            "too many input images (max {}, got {})",
            MAX_INPUT_IMAGES, total
        )));
    }
    Ok(())
}

pub fn input_file(path: &Path, what: &str) -> Result<(), MirakoError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(MirakoError::Validation(format!(
            "{} file '{}' does not exist or is not a file",
            what,
            path.display()
        )))
    }
}

/// Parses `LABEL=PATH`.
pub fn labeled_image(raw: &str) -> Result<(String, PathBuf), MirakoError> {
    match raw.split_once('=') {
        Some((label, path)) if !label.trim().is_empty() && !path.trim().is_empty() => {
            Ok((label.trim().to_string(), PathBuf::from(path.trim())))
        }
        _ => Err(MirakoError::Validation(format!(
            "labeled image must look like LABEL=PATH, got '{}'",
            raw
        ))),
    }
}

pub fn chinese_variant(variant: &str) -> Result<(), MirakoError> {
    if CHINESE_VARIANTS.contains(&variant) {
        Ok(())
    } else {
        Err(MirakoError::Validation(format!(
            "chinese language must be 'mandarin' or 'yue', got '{}'",
            variant
        )))
    }
}

/// Checks a TTS tuning value lies in `0.0..=1.0`.
pub fn unit_range(name: &str, value: f32) -> Result<(), MirakoError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(MirakoError::Validation(format!(
            "{} must be between 0.0 and 1.0, got {}",
            name, value
        )))
    }
}

fn is_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Recursively collects `.wav`/`.mp3` files, sorted by path.
pub fn scan_audio_files(dir: &Path) -> Result<Vec<PathBuf>, MirakoError> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let entries = fs::read_dir(&current).map_err(|e| {
            MirakoError::io(format!("Failed to read directory '{}'", current.display()), e)
        })?;
        for entry in entries {
            let path = entry
                .map_err(|e| MirakoError::io(format!("Failed to read '{}'", current.display()), e))?
                .path();
            if path.is_dir() {
                pending.push(path);
            } else if is_audio(&path) {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

/// Reads `filename|transcription` lines and returns the filenames.
pub fn parse_annotation(content: &str) -> Result<Vec<String>, MirakoError> {
    let mut files = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let line_no = idx + 1;

        let Some((filename, _)) = line.split_once('|') else {
            return Err(MirakoError::Validation(format!(
                "invalid format on line {}: expected 'filename|transcription', got '{}'",
                line_no, line
            )));
        };
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(MirakoError::Validation(format!(
                "empty filename on line {}",
                line_no
            )));
        }
        if !is_audio(Path::new(filename)) {
            return Err(MirakoError::Validation(format!(
                "invalid audio file extension on line {}: {} (only .wav and .mp3 are supported)",
                line_no, filename
            )));
        }
        files.push(filename.to_string());
    }

    if files.is_empty() {
        return Err(MirakoError::Validation(
            "no valid audio file entries found in annotation file".to_string(),
        ));
    }
    Ok(files)
}

/// Ensures the annotation list and the audio directory name the same files.
/// Returns the samples to upload.
pub fn voice_clone_input(audio_dir: &Path, annotation: &Path) -> Result<Vec<PathBuf>, MirakoError> {
    input_file(annotation, "Annotation")?;
    if !audio_dir.is_dir() {
        return Err(MirakoError::Validation(format!(
            "audio directory '{}' does not exist",
            audio_dir.display()
        )));
    }

    let content = fs::read_to_string(annotation).map_err(|e| {
        MirakoError::io(format!("Failed to read '{}'", annotation.display()), e)
    })?;
    let annotated: BTreeSet<String> = parse_annotation(&content)?.into_iter().collect();

    let samples = scan_audio_files(audio_dir)?;
    if samples.is_empty() {
        return Err(MirakoError::Validation(format!(
            "no audio files (.wav or .mp3) found in directory: {}",
            audio_dir.display()
        )));
    }
    let present: BTreeSet<String> = samples
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect();

    let missing: Vec<&str> = annotated.difference(&present).map(String::as_str).collect();
    if !missing.is_empty() {
        return Err(MirakoError::Validation(format!(
            "annotation list references {} audio files that don't exist in the audio directory:\n{}",
            missing.len(),
            missing.join("\n")
        )));
    }

    let extra: Vec<&str> = present.difference(&annotated).map(String::as_str).collect();
    if !extra.is_empty() {
        return Err(MirakoError::Validation(format!(
            "found {} audio files in directory that are not included in the annotation list:\n{}\nPlease either add them to the annotation list or remove them from the audio directory",
            extra.len(),
            extra.join("\n")
        )));
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_bounds() {
        assert!(prompt("a red fox").is_ok());
        assert!(prompt("   ").is_err());
        assert!(prompt(&"x".repeat(MAX_PROMPT_CHARS)).is_ok());
        let err = prompt(&"x".repeat(MAX_PROMPT_CHARS + 1)).unwrap_err();
        assert!(err.to_string().contains("got 1001"));
    }

    #[test]
    fn six_images_rejected() {
        assert!(image_count(5, 0).is_ok());
        assert!(image_count(3, 2).is_ok());
        assert!(matches!(image_count(4, 2), Err(MirakoError::Validation(_))));
    }

    #[test]
    fn aspect_ratios() {
        assert!(aspect_ratio("16:9").is_ok());
        assert!(aspect_ratio("21:9").is_err());
    }

    #[test]
    fn labeled_image_parsing() {
        assert_eq!(
            labeled_image("style=refs/a.png").unwrap(),
            ("style".to_string(), PathBuf::from("refs/a.png"))
        );
        assert!(labeled_image("refs/a.png").is_err());
        assert!(labeled_image("=a.png").is_err());
        assert!(labeled_image("style=").is_err());
    }

    #[test]
    fn tts_ranges() {
        assert!(unit_range("temperature", 1.0).is_ok());
        assert!(unit_range("temperature", 1.5).is_err());
        assert!(unit_range("fragment-interval", -0.1).is_err());
        assert!(chinese_variant("yue").is_ok());
        assert!(chinese_variant("cantonese").is_err());
    }

    #[test]
    fn annotation_lines() {
        let files = parse_annotation("a.wav|hello\n\n  b.MP3 | world \n").unwrap();
        assert_eq!(files, vec!["a.wav", "b.MP3"]);

        let err = parse_annotation("a.wav hello").unwrap_err();
        assert!(err.to_string().contains("line 1"));
        assert!(parse_annotation("c.flac|hi").is_err());
        assert!(parse_annotation(" |hi").is_err());
        assert!(parse_annotation("\n\n").is_err());
    }

    #[test]
    fn scan_finds_nested_audio() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.wav"), b"").unwrap();
        fs::write(dir.path().join("sub/b.Mp3"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let found = scan_audio_files(dir.path()).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|p| is_audio(p)));
    }

    #[test]
    fn clone_input_must_match_annotation() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("audio");
        fs::create_dir(&audio).unwrap();
        fs::write(audio.join("a.wav"), b"").unwrap();
        fs::write(audio.join("b.wav"), b"").unwrap();
        let annotation = dir.path().join("annotation.list");

        fs::write(&annotation, "a.wav|one\nb.wav|two\n").unwrap();
        assert_eq!(voice_clone_input(&audio, &annotation).unwrap().len(), 2);

        fs::write(&annotation, "a.wav|one\nb.wav|two\nc.wav|three\n").unwrap();
        let err = voice_clone_input(&audio, &annotation).unwrap_err();
        assert!(err.to_string().contains("c.wav"));

        fs::write(&annotation, "a.wav|one\n").unwrap();
        let err = voice_clone_input(&audio, &annotation).unwrap_err();
        assert!(err.to_string().contains("b.wav"));
        assert!(err.to_string().contains("not included"));
    }

    #[test]
    fn missing_inputs() {
        let dir = tempfile::tempdir().unwrap();
        assert!(input_file(&dir.path().join("nope.png"), "Image").is_err());
        assert!(input_file(dir.path(), "Image").is_err());
        assert!(voice_clone_input(&dir.path().join("none"), &dir.path().join("x")).is_err());
    }
}
