use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub duration_seconds: f64,
    pub has_audio: bool,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<FormatInfo>,
    #[serde(default)]
    streams: Vec<StreamInfo>,
}

#[derive(Debug, Deserialize)]
struct FormatInfo {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamInfo {
    codec_type: Option<String>,
}

/// Run ffprobe against a local media file. The transition compiler needs a
/// duration per source; the timeline path checks for an audio stream before
/// wiring an audio chain against it.
pub async fn probe(media_path: &Path) -> Result<MediaInfo> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration:stream=codec_type",
            "-of",
            "json",
        ])
        .arg(media_path)
        .output()
        .await
        .context("Failed to execute ffprobe. Make sure FFmpeg is installed.")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("ffprobe failed: {}", stderr);
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(bytes: &[u8]) -> Result<MediaInfo> {
    let probe_output: ProbeOutput =
        serde_json::from_slice(bytes).context("Failed to parse ffprobe JSON output")?;

    let duration_seconds = probe_output
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let has_audio = probe_output
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(MediaInfo {
        duration_seconds,
        has_audio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_and_audio_stream_are_extracted() {
        let json = br#"{
            "format": {"duration": "12.500000"},
            "streams": [
                {"codec_type": "video"},
                {"codec_type": "audio"}
            ]
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.duration_seconds, 12.5);
        assert!(info.has_audio);
    }

    #[test]
    fn video_only_file_reports_no_audio() {
        let json = br#"{
            "format": {"duration": "3.0"},
            "streams": [{"codec_type": "video"}]
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert!(!info.has_audio);
    }

    #[test]
    fn missing_format_defaults_to_zero_duration() {
        let info = parse_probe_output(br#"{"streams": []}"#).unwrap();
        assert_eq!(info.duration_seconds, 0.0);
        assert!(!info.has_audio);
    }
}
