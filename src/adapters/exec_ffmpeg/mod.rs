//! FFmpeg adapter for concatenating and re-encoding clips
//!
//! Inputs are always fed through the concat demuxer. In demux mode streams are
//! copied and subtitles are muxed as a soft track; otherwise video is re-encoded
//! through `setpts` / `fps` / `transpose` / `subtitles` filters. Progress is read
//! from `-progress pipe:1`.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{ConsolidatorError, ConsolidatorResult};
use crate::ports::{RenderPort, RenderProgress, RenderRequest};
use crate::utils::time::parse_clock;

/// Lines of ffmpeg stderr kept for error messages
const STDERR_TAIL: usize = 20;

/// FFmpeg-based render adapter
pub struct FfmpegAdapter {
    binary: PathBuf,
    video_codec: Option<String>,
}

impl FfmpegAdapter {
    pub fn new() -> Self {
        Self::with_binary("ffmpeg")
    }

    /// Use a specific `ffmpeg` executable
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            video_codec: None,
        }
    }

    /// Encoder used when re-encoding; ffmpeg picks one for the container when unset
    pub fn with_video_codec(mut self, codec: impl Into<String>) -> Self {
        self.video_codec = Some(codec.into());
        self
    }

    /// Full argument list for `request`, reading inputs from the concat `manifest`
    pub fn build_args(&self, request: &RenderRequest, manifest: &Path) -> Vec<String> {
        let tuning = &request.tuning;
        let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-y", "-nostats"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.extend(["-progress", "pipe:1"].map(String::from));
        args.extend(["-f", "concat", "-safe", "0", "-i"].map(String::from));
        args.push(manifest.display().to_string());

        if tuning.demux {
            let soft_subs = request.subtitles.as_ref();
            if let Some(subs) = soft_subs {
                args.extend(["-f", "srt", "-i"].map(String::from));
                args.push(subs.display().to_string());
            }
            args.extend(["-map", "0:v"].map(String::from));
            if tuning.audio {
                args.extend(["-map", "0:a?"].map(String::from));
            }
            if soft_subs.is_some() {
                args.extend(["-map", "1:0"].map(String::from));
            }
            args.extend(["-c", "copy"].map(String::from));
            if soft_subs.is_some() {
                args.push("-c:s".to_string());
                args.push(subtitle_codec(&request.output).to_string());
            }
        } else {
            let filters = video_filters(request);
            if !filters.is_empty() {
                args.push("-vf".to_string());
                args.push(filters.join(","));
            }
            if let Some(codec) = &self.video_codec {
                args.push("-c:v".to_string());
                args.push(codec.clone());
            }
            if let Some(quality) = tuning.quality {
                args.push("-cq:v".to_string());
                args.push(quality.to_string());
            }
            if tuning.audio && (tuning.speed - 1.0).abs() > f64::EPSILON {
                args.push("-af".to_string());
                args.push(format!("atempo={}", tuning.speed));
            }
        }

        if !tuning.audio {
            args.push("-an".to_string());
        }
        args.push(request.output.display().to_string());
        args
    }

    async fn write_manifest(inputs: &[PathBuf]) -> ConsolidatorResult<tempfile::TempPath> {
        let manifest = tempfile::Builder::new()
            .prefix("consolidator-concat-")
            .suffix(".txt")
            .tempfile()?
            .into_temp_path();
        tokio::fs::write(&manifest, concat_manifest(inputs)).await?;
        Ok(manifest)
    }
}

impl Default for FfmpegAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Concat demuxer input list: one `file '<path>'` line per input
pub fn concat_manifest(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|p| format!("file '{}'\n", p.display().to_string().replace('\'', "'\\''")))
        .collect()
}

/// Subtitle codec the output container accepts
fn subtitle_codec(output: &Path) -> &'static str {
    let ext = output
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    match ext.as_deref() {
        Some("mp4") | Some("m4v") | Some("mov") => "mov_text",
        Some("webm") => "webvtt",
        _ => "srt",
    }
}

/// Re-encode filter chain in application order
fn video_filters(request: &RenderRequest) -> Vec<String> {
    let tuning = &request.tuning;
    let mut filters = Vec::new();

    if (tuning.speed - 1.0).abs() > f64::EPSILON {
        filters.push(format!("setpts=PTS/{}", tuning.speed));
    }
    if let Some(fps) = tuning.fps {
        filters.push(format!("fps={}", fps));
    }
    match tuning.rotate {
        90 => filters.push("transpose=1".to_string()),
        180 => filters.push("transpose=1,transpose=1".to_string()),
        270 => filters.push("transpose=2".to_string()),
        _ => {}
    }
    if request.burn_subtitles {
        if let Some(subs) = &request.subtitles {
            filters.push(format!("subtitles=filename={}", escape_filter_value(subs)));
        }
    }
    filters
}

/// Escape a path for use as a filter option value inside a filtergraph
fn escape_filter_value(path: &Path) -> String {
    let mut option = String::new();
    for c in path.display().to_string().chars() {
        if matches!(c, '\\' | '\'' | ':') {
            option.push('\\');
        }
        option.push(c);
    }
    let mut graph = String::new();
    for c in option.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            graph.push('\\');
        }
        graph.push(c);
    }
    graph
}

/// Accumulates one `-progress` block
#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    speed: Option<f64>,
    fps: Option<f64>,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            // out_time_ms is in microseconds as well
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "out_time" => {
                if let Some(secs) = parse_clock(value) {
                    self.out_time_secs = secs;
                }
            }
            "speed" => {
                self.speed = value.trim_end_matches('x').trim().parse().ok();
            }
            "fps" => {
                self.fps = value.parse().ok();
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }

    fn report(&self, expected_duration: f64) -> RenderProgress {
        let fraction = if self.complete {
            1.0
        } else if expected_duration <= 0.0 {
            0.0
        } else {
            (self.out_time_secs.max(0.0) / expected_duration).clamp(0.0, 1.0)
        };
        RenderProgress {
            fraction,
            out_time: self.out_time_secs.max(0.0),
            speed: self.speed,
            fps: self.fps,
        }
    }
}

#[async_trait]
impl RenderPort for FfmpegAdapter {
    async fn render(
        &self,
        request: &RenderRequest,
        progress: watch::Sender<RenderProgress>,
    ) -> ConsolidatorResult<()> {
        let render_error = |message: String| ConsolidatorError::RenderError {
            output: request.output.display().to_string(),
            message,
        };

        if request.inputs.is_empty() {
            return Err(render_error("no inputs".to_string()));
        }

        let manifest = Self::write_manifest(&request.inputs).await?;
        let args = self.build_args(request, &manifest);
        debug!("ffmpeg {}", args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| render_error(format!("failed to run ffmpeg: {}", e)))?;

        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL);
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tail.len() == STDERR_TAIL {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
            tail
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            let mut state = ProgressState::default();
            while let Some(line) = lines.next_line().await? {
                let Some((key, value)) = line.split_once('=') else {
                    continue;
                };
                let (key, value) = (key.trim(), value.trim());
                state.update(key, value);
                if key == "progress" {
                    progress.send_replace(state.report(request.expected_duration));
                }
            }
        }

        let status = child.wait().await?;
        let tail = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let message = tail
                .iter()
                .rev()
                .find(|l| !l.trim().is_empty())
                .cloned()
                .unwrap_or_else(|| "ffmpeg failed".to_string());
            warn!("ffmpeg exited with {} for {}", status, request.output.display());
            return Err(render_error(format!("{} ({})", message, status)));
        }

        info!("Rendered {}", request.output.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RenderTuning, TimestampMode};

    fn request(tuning: RenderTuning, subtitles: Option<&str>, burn: bool) -> RenderRequest {
        RenderRequest {
            inputs: vec![PathBuf::from("/v/a.mp4"), PathBuf::from("/v/b.mp4")],
            subtitles: subtitles.map(PathBuf::from),
            burn_subtitles: burn,
            output: PathBuf::from("/out/2021-01-01_1001.part.mp4"),
            tuning,
            expected_duration: 120.0,
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_concat_manifest_quotes_paths() {
        let manifest = concat_manifest(&[
            PathBuf::from("/v/a.mp4"),
            PathBuf::from("/v/it's.mp4"),
        ]);
        assert_eq!(manifest, "file '/v/a.mp4'\nfile '/v/it'\\''s.mp4'\n");
    }

    #[test]
    fn test_reencode_filter_chain() {
        let tuning = RenderTuning {
            rotate: 90,
            speed: 4.0,
            fps: Some(30.0),
            quality: Some(28),
            ..RenderTuning::default()
        };
        let args = FfmpegAdapter::new().build_args(
            &request(tuning, Some("/tmp/subs.srt"), true),
            Path::new("/tmp/list.txt"),
        );

        assert_eq!(
            value_after(&args, "-vf"),
            Some("setpts=PTS/4,fps=30,transpose=1,subtitles=filename=/tmp/subs.srt")
        );
        assert_eq!(value_after(&args, "-cq:v"), Some("28"));
        assert_eq!(value_after(&args, "-i"), Some("/tmp/list.txt"));
        assert!(args.contains(&"-an".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("/out/2021-01-01_1001.part.mp4"));
    }

    #[test]
    fn test_audio_kept_with_tempo() {
        let tuning = RenderTuning {
            speed: 2.0,
            audio: true,
            ..RenderTuning::default()
        };
        let args = FfmpegAdapter::new().build_args(&request(tuning, None, false), Path::new("/l.txt"));
        assert_eq!(value_after(&args, "-af"), Some("atempo=2"));
        assert!(!args.contains(&"-an".to_string()));
    }

    #[test]
    fn test_demux_copies_streams_with_soft_subtitles() {
        let tuning = RenderTuning {
            demux: true,
            timestamp: TimestampMode::Burn,
            ..RenderTuning::default()
        };
        let args = FfmpegAdapter::new().build_args(
            &request(tuning, Some("/tmp/subs.srt"), false),
            Path::new("/l.txt"),
        );
        assert_eq!(value_after(&args, "-c"), Some("copy"));
        assert_eq!(value_after(&args, "-c:s"), Some("mov_text"));
        assert!(args.iter().any(|a| a == "1:0"));
        assert!(!args.contains(&"-vf".to_string()));
    }

    #[test]
    fn test_filter_value_escaping() {
        assert_eq!(
            escape_filter_value(Path::new("C:\\subs\\a,b.srt")),
            "C\\\\:\\\\\\\\subs\\\\\\\\a\\,b.srt"
        );
    }

    #[test]
    fn test_progress_state() {
        let mut state = ProgressState::default();
        state.update("out_time_us", "30000000");
        state.update("speed", "4.5x");
        assert_eq!(state.report(120.0).fraction, 0.25);
        assert_eq!(state.report(120.0).speed, Some(4.5));
        state.update("out_time", "00:01:30.000000");
        assert_eq!(state.report(120.0).fraction, 0.75);
        state.update("progress", "end");
        assert_eq!(state.report(120.0).fraction, 1.0);
        assert_eq!(ProgressState::default().report(0.0).fraction, 0.0);
    }

    #[tokio::test]
    async fn test_missing_binary_is_render_error() {
        let (tx, _rx) = watch::channel(RenderProgress::default());
        let adapter = FfmpegAdapter::with_binary("/nonexistent/ffmpeg-binary");
        let err = adapter
            .render(&request(RenderTuning::default(), None, false), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, ConsolidatorError::RenderError { .. }));
        assert!(!err.is_fatal());
    }
}
