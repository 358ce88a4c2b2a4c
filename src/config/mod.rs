//! Layered configuration
//!
//! Precedence, lowest first: built-in defaults, `config.toml`, environment,
//! per-camera overrides, command line. Layers are plain `Option` bags; they are
//! resolved once into the concrete [`Settings`] and [`JobSettings`] values the
//! rest of the crate works with.

use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::model::DATE_FORMAT;
use crate::error::{ConsolidatorError, ConsolidatorResult};
use crate::utils::path::{normalize, PathContext};

pub const DEFAULT_BASE_DIR: &str = "~/Documents/V380";
pub const DEFAULT_VIDS_DIR: &str = "Record";
pub const DEFAULT_OUTPUT_DIR: &str = "Consolidated";
pub const DEFAULT_CONFIG_DIR: &str = "v380-consolidator";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const CACHE_FILE_NAME: &str = "cache.json";
pub const DEFAULT_EXTENSION: &str = "mp4";
pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_CACHE_THROTTLE_MS: u64 = 5000;

/// How the capture-time overlay is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawTimestamp")]
pub enum TimestampMode {
    /// Burn the captions into the video
    Burn,
    /// No overlay
    Off,
    /// Write a `.srt` next to the output instead of burning in
    Sidecar,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Flag(bool),
    Name(String),
}

impl TryFrom<RawTimestamp> for TimestampMode {
    type Error = ConsolidatorError;

    fn try_from(raw: RawTimestamp) -> Result<Self, Self::Error> {
        match raw {
            RawTimestamp::Flag(true) => Ok(Self::Burn),
            RawTimestamp::Flag(false) => Ok(Self::Off),
            RawTimestamp::Name(name) => name.parse(),
        }
    }
}

impl FromStr for TimestampMode {
    type Err = ConsolidatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "true" | "burn" | "on" => Ok(Self::Burn),
            "false" | "off" | "none" => Ok(Self::Off),
            "srt" | "sidecar" => Ok(Self::Sidecar),
            other => Err(ConsolidatorError::invalid(format!(
                "Invalid timestamp mode: {}. Valid modes: true, false, srt",
                other
            ))),
        }
    }
}

/// Optional render tuning, one per layer
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RenderLayer {
    pub rotate: Option<u32>,
    pub speed: Option<f64>,
    pub stride: Option<f64>,
    pub audio: Option<bool>,
    pub fps: Option<f64>,
    pub quality: Option<u32>,
    pub demux: Option<bool>,
    pub timestamp: Option<TimestampMode>,
}

impl RenderLayer {
    /// Apply `top` over `self`; set fields in `top` win
    pub fn overlay(&mut self, top: &RenderLayer) {
        overlay_field(&mut self.rotate, &top.rotate);
        overlay_field(&mut self.speed, &top.speed);
        overlay_field(&mut self.stride, &top.stride);
        overlay_field(&mut self.audio, &top.audio);
        overlay_field(&mut self.fps, &top.fps);
        overlay_field(&mut self.quality, &top.quality);
        overlay_field(&mut self.demux, &top.demux);
        overlay_field(&mut self.timestamp, &top.timestamp);
    }

    fn resolve(&self) -> ConsolidatorResult<RenderTuning> {
        let tuning = RenderTuning {
            rotate: self.rotate.unwrap_or(0),
            speed: self.speed.unwrap_or(1.0),
            stride: self.stride.unwrap_or(1.0),
            audio: self.audio.unwrap_or(false),
            fps: self.fps,
            quality: self.quality,
            demux: self.demux.unwrap_or(false),
            timestamp: self.timestamp.unwrap_or(TimestampMode::Burn),
        };
        tuning.validate()?;
        Ok(tuning)
    }
}

/// Per-camera overrides from the `[cameras.<id>]` tables
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraLayer {
    pub disabled: Option<bool>,
    pub min_duration: Option<f64>,
    pub min_size: Option<u64>,
    pub render: RenderLayer,
}

/// One configuration layer (file, environment or command line)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConfigLayer {
    pub base_dir: Option<String>,
    pub vids_dir: Option<String>,
    pub output_dir: Option<String>,
    pub config_dir: Option<String>,
    pub date: Option<String>,
    pub camera: Option<String>,
    pub extension: Option<String>,
    pub concurrency: Option<usize>,
    pub halt_on_error: Option<bool>,
    pub halt_on_render_error: Option<bool>,
    pub retry: Option<bool>,
    pub skip_existing: Option<bool>,
    pub cache_throttle_ms: Option<u64>,
    pub min_duration: Option<f64>,
    pub min_size: Option<u64>,
    pub render: RenderLayer,
    pub cameras: BTreeMap<String, CameraLayer>,
}

impl ConfigLayer {
    /// Parse a `config.toml` document
    pub fn from_toml_str(content: &str) -> ConsolidatorResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read a config file; a missing file is an empty layer
    pub async fn load_file(path: &Path) -> ConsolidatorResult<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                info!("Loading configuration from: {}", path.display());
                Self::from_toml_str(&content)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config file at {}", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Layer built from `CONSOLIDATOR_*` variables
    pub fn from_env() -> ConsolidatorResult<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Layer built from an arbitrary variable lookup
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> ConsolidatorResult<Self> {
        let mut layer = Self {
            base_dir: lookup("CONSOLIDATOR_BASE_DIR"),
            vids_dir: lookup("CONSOLIDATOR_VIDS_DIR"),
            output_dir: lookup("CONSOLIDATOR_OUTPUT_DIR"),
            config_dir: lookup("CONSOLIDATOR_CONFIG_DIR"),
            date: lookup("CONSOLIDATOR_DATE"),
            camera: lookup("CONSOLIDATOR_CAMERA"),
            ..Self::default()
        };
        if let Some(value) = lookup("CONSOLIDATOR_CONCURRENCY") {
            let parsed = value.trim().parse::<usize>().map_err(|e| {
                ConsolidatorError::invalid(format!(
                    "Invalid CONSOLIDATOR_CONCURRENCY '{}': {}",
                    value, e
                ))
            })?;
            layer.concurrency = Some(parsed);
        }
        Ok(layer)
    }

    /// Apply `top` over `self`; set fields in `top` win, camera tables merge per key
    pub fn overlay(&mut self, top: &ConfigLayer) {
        overlay_field(&mut self.base_dir, &top.base_dir);
        overlay_field(&mut self.vids_dir, &top.vids_dir);
        overlay_field(&mut self.output_dir, &top.output_dir);
        overlay_field(&mut self.config_dir, &top.config_dir);
        overlay_field(&mut self.date, &top.date);
        overlay_field(&mut self.camera, &top.camera);
        overlay_field(&mut self.extension, &top.extension);
        overlay_field(&mut self.concurrency, &top.concurrency);
        overlay_field(&mut self.halt_on_error, &top.halt_on_error);
        overlay_field(&mut self.halt_on_render_error, &top.halt_on_render_error);
        overlay_field(&mut self.retry, &top.retry);
        overlay_field(&mut self.skip_existing, &top.skip_existing);
        overlay_field(&mut self.cache_throttle_ms, &top.cache_throttle_ms);
        overlay_field(&mut self.min_duration, &top.min_duration);
        overlay_field(&mut self.min_size, &top.min_size);
        self.render.overlay(&top.render);
        for (camera, layer) in &top.cameras {
            let merged = self.cameras.entry(camera.clone()).or_default();
            overlay_field(&mut merged.disabled, &layer.disabled);
            overlay_field(&mut merged.min_duration, &layer.min_duration);
            overlay_field(&mut merged.min_size, &layer.min_size);
            merged.render.overlay(&layer.render);
        }
    }
}

fn overlay_field<T: Clone>(base: &mut Option<T>, top: &Option<T>) {
    if top.is_some() {
        base.clone_from(top);
    }
}

/// Concrete render tuning handed to the renderer
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTuning {
    /// Clockwise rotation in degrees: 0, 90, 180 or 270
    pub rotate: u32,
    /// Time-compression factor
    pub speed: f64,
    /// Caption sampling interval in seconds
    pub stride: f64,
    pub audio: bool,
    pub fps: Option<f64>,
    /// Constant quality value (`-cq:v`)
    pub quality: Option<u32>,
    /// Concatenate with stream copy instead of re-encoding
    pub demux: bool,
    pub timestamp: TimestampMode,
}

impl Default for RenderTuning {
    fn default() -> Self {
        Self {
            rotate: 0,
            speed: 1.0,
            stride: 1.0,
            audio: false,
            fps: None,
            quality: None,
            demux: false,
            timestamp: TimestampMode::Burn,
        }
    }
}

impl RenderTuning {
    pub fn validate(&self) -> ConsolidatorResult<()> {
        if !matches!(self.rotate, 0 | 90 | 180 | 270) {
            return Err(ConsolidatorError::invalid(format!(
                "rotate must be 0, 90, 180 or 270, got {}",
                self.rotate
            )));
        }
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(ConsolidatorError::invalid(format!(
                "speed must be positive, got {}",
                self.speed
            )));
        }
        if !(self.stride.is_finite() && self.stride > 0.0) {
            return Err(ConsolidatorError::invalid(format!(
                "stride must be positive, got {}",
                self.stride
            )));
        }
        if let Some(fps) = self.fps {
            if !(fps.is_finite() && fps > 0.0) {
                return Err(ConsolidatorError::invalid(format!(
                    "fps must be positive, got {}",
                    fps
                )));
            }
        }
        Ok(())
    }
}

/// Minimum duration and size a clip needs to be included in a job
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct QualityGate {
    pub min_duration: f64,
    pub min_size: u64,
}

/// Fully resolved configuration for one camera's jobs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobSettings {
    pub disabled: bool,
    pub quality_gate: QualityGate,
    pub render: RenderTuning,
}

/// Fully resolved global configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub base_dir: PathBuf,
    pub vids_dir: PathBuf,
    pub output_dir: PathBuf,
    pub config_dir: PathBuf,
    /// Only build jobs for this date
    pub date: Option<String>,
    /// Only build jobs for this camera
    pub camera: Option<String>,
    /// Lowercase, without the dot
    pub extension: String,
    pub concurrency: usize,
    pub halt_on_error: bool,
    pub halt_on_render_error: bool,
    pub retry: bool,
    pub skip_existing: bool,
    pub cache_throttle: Duration,
}

impl Settings {
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    pub fn cache_file(&self) -> PathBuf {
        self.config_dir.join(CACHE_FILE_NAME)
    }

    /// `<outputDir>/<date>_<camera>.<ext>`
    pub fn output_path(&self, date: &str, camera: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}.{}", date, camera, self.extension))
    }
}

/// All configuration layers, kept apart until resolution
#[derive(Debug, Clone, Default)]
pub struct LayeredConfig {
    pub file: ConfigLayer,
    pub env: ConfigLayer,
    pub cli: ConfigLayer,
    pub paths: Option<PathContext>,
}

impl LayeredConfig {
    /// Build layers from environment and command line, then read `config.toml`
    /// from the config directory they point at.
    pub async fn load(cli: ConfigLayer, paths: PathContext) -> ConsolidatorResult<Self> {
        let mut config = Self {
            file: ConfigLayer::default(),
            env: ConfigLayer::from_env()?,
            cli,
            paths: Some(paths),
        };
        let config_file = config.resolve()?.config_file();
        config.file = ConfigLayer::load_file(&config_file).await?;
        Ok(config)
    }

    /// File, environment and command line merged, in that order
    fn global_layer(&self) -> ConfigLayer {
        let mut merged = self.file.clone();
        merged.overlay(&self.env);
        merged.overlay(&self.cli);
        merged
    }

    fn path_context(&self) -> ConsolidatorResult<PathContext> {
        match &self.paths {
            Some(ctx) => Ok(ctx.clone()),
            None => PathContext::from_env(),
        }
    }

    /// Resolve the global settings
    pub fn resolve(&self) -> ConsolidatorResult<Settings> {
        let layer = self.global_layer();
        let ctx = self.path_context()?;

        let base_dir = normalize(layer.base_dir.as_deref().unwrap_or(DEFAULT_BASE_DIR), &ctx)?;
        let under_base = ctx.with_cwd(&base_dir);
        let vids_dir = normalize(
            layer.vids_dir.as_deref().unwrap_or(DEFAULT_VIDS_DIR),
            &under_base,
        )?;
        let output_dir = normalize(
            layer.output_dir.as_deref().unwrap_or(DEFAULT_OUTPUT_DIR),
            &under_base,
        )?;
        let config_dir = normalize(
            layer.config_dir.as_deref().unwrap_or(DEFAULT_CONFIG_DIR),
            &under_base,
        )?;

        // Zero-padded, like the dates in clip names
        let date = layer
            .date
            .as_deref()
            .map(|date| {
                NaiveDate::parse_from_str(date, DATE_FORMAT)
                    .map(|parsed| parsed.format(DATE_FORMAT).to_string())
                    .map_err(|e| {
                        ConsolidatorError::invalid(format!("Invalid date filter '{}': {}", date, e))
                    })
            })
            .transpose()?;

        let concurrency = layer.concurrency.unwrap_or(DEFAULT_CONCURRENCY);
        if concurrency == 0 {
            return Err(ConsolidatorError::invalid("concurrency must be at least 1"));
        }

        let extension = layer
            .extension
            .as_deref()
            .unwrap_or(DEFAULT_EXTENSION)
            .trim_start_matches('.')
            .to_lowercase();
        if extension.is_empty() {
            return Err(ConsolidatorError::invalid("extension must not be empty"));
        }

        // Render tuning is resolved per camera; validate the global layer early anyway.
        layer.render.resolve()?;

        Ok(Settings {
            base_dir,
            vids_dir,
            output_dir,
            config_dir,
            date,
            camera: layer.camera,
            extension,
            concurrency,
            halt_on_error: layer.halt_on_error.unwrap_or(false),
            halt_on_render_error: layer.halt_on_render_error.unwrap_or(false),
            retry: layer.retry.unwrap_or(false),
            skip_existing: layer.skip_existing.unwrap_or(false),
            cache_throttle: Duration::from_millis(
                layer.cache_throttle_ms.unwrap_or(DEFAULT_CACHE_THROTTLE_MS),
            ),
        })
    }

    /// Resolve the settings for `camera`: file < env < camera overrides < CLI
    pub fn job_settings(&self, camera: &str) -> ConsolidatorResult<JobSettings> {
        let mut render = self.file.render.clone();
        render.overlay(&self.env.render);

        let mut min_duration = self.file.min_duration;
        overlay_field(&mut min_duration, &self.env.min_duration);
        let mut min_size = self.file.min_size;
        overlay_field(&mut min_size, &self.env.min_size);
        let mut disabled = None;

        for layer in [&self.file, &self.env, &self.cli] {
            if let Some(overrides) = layer.cameras.get(camera) {
                render.overlay(&overrides.render);
                overlay_field(&mut min_duration, &overrides.min_duration);
                overlay_field(&mut min_size, &overrides.min_size);
                overlay_field(&mut disabled, &overrides.disabled);
            }
        }

        render.overlay(&self.cli.render);
        overlay_field(&mut min_duration, &self.cli.min_duration);
        overlay_field(&mut min_size, &self.cli.min_size);

        Ok(JobSettings {
            disabled: disabled.unwrap_or(false),
            quality_gate: QualityGate {
                min_duration: min_duration.unwrap_or(0.0),
                min_size: min_size.unwrap_or(0),
            },
            render: render.resolve()?,
        })
    }
}
