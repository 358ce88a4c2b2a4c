//! FFprobe adapter for media file probing
//!
//! Runs `ffprobe -print_format json -show_format -show_streams` and maps the
//! report onto [`MediaProbe`].

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::domain::model::MediaProbe;
use crate::error::{ConsolidatorError, ConsolidatorResult};
use crate::ports::ProbePort;

#[derive(Debug, Default, Deserialize)]
struct FfprobeReport {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

/// FFprobe-based probe adapter
pub struct FFprobeAdapter {
    binary: PathBuf,
}

impl FFprobeAdapter {
    pub fn new() -> Self {
        Self::with_binary("ffprobe")
    }

    /// Use a specific `ffprobe` executable
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FFprobeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn probe_error(path: &Path, message: impl Into<String>) -> ConsolidatorError {
    ConsolidatorError::ProbeError {
        path: path.display().to_string(),
        message: message.into(),
    }
}

fn parse_seconds(value: Option<&String>) -> Option<f64> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
}

/// Map an ffprobe JSON report for `path` onto a [`MediaProbe`]
pub fn parse_report(path: &Path, json: &str) -> ConsolidatorResult<MediaProbe> {
    let report: FfprobeReport = serde_json::from_str(json)
        .map_err(|e| probe_error(path, format!("unreadable ffprobe output: {}", e)))?;

    let format = report.format.as_ref();
    let video = report
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let audio = report
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));

    let duration = format
        .and_then(|f| parse_seconds(f.duration.as_ref()))
        .or_else(|| {
            report
                .streams
                .iter()
                .filter_map(|s| parse_seconds(s.duration.as_ref()))
                .reduce(f64::max)
        })
        .ok_or_else(|| probe_error(path, "no duration reported"))?;

    let size = format
        .and_then(|f| f.size.as_deref())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0);

    Ok(MediaProbe {
        duration,
        size,
        format_name: format.and_then(|f| f.format_name.clone()),
        video_codec: video.and_then(|s| s.codec_name.clone()),
        audio_codec: audio.and_then(|s| s.codec_name.clone()),
        width: video.and_then(|s| s.width),
        height: video.and_then(|s| s.height),
    })
}

#[async_trait]
impl ProbePort for FFprobeAdapter {
    async fn probe(&self, path: &Path) -> ConsolidatorResult<MediaProbe> {
        debug!("Probing {}", path.display());
        let output = Command::new(&self.binary)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| probe_error(path, format!("failed to run ffprobe: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr.lines().last().unwrap_or("ffprobe failed").trim();
            return Err(probe_error(
                path,
                format!("{} ({})", message, output.status),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_report(path, &stdout)
    }
}
