//! Command-line argument definitions

use clap::Args;

use crate::config::{ConfigLayer, TimestampMode};

/// Location and filter options shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Root directory; defaults to ~/Documents/V380
    #[arg(long, global = true)]
    pub base_dir: Option<String>,

    /// Recordings directory, relative to the base directory
    #[arg(long, global = true)]
    pub vids_dir: Option<String>,

    /// Output directory, relative to the base directory
    #[arg(long, global = true)]
    pub output_dir: Option<String>,

    /// Directory holding config.toml and cache.json
    #[arg(long, global = true)]
    pub config_dir: Option<String>,

    /// Only process this date (YYYY-MM-DD)
    #[arg(long, global = true)]
    pub date: Option<String>,

    /// Only process this camera
    #[arg(long, global = true)]
    pub camera: Option<String>,

    /// Video file extension
    #[arg(long, global = true)]
    pub extension: Option<String>,
}

impl ConfigArgs {
    /// Command-line configuration layer
    pub fn to_layer(&self) -> ConfigLayer {
        ConfigLayer {
            base_dir: self.base_dir.clone(),
            vids_dir: self.vids_dir.clone(),
            output_dir: self.output_dir.clone(),
            config_dir: self.config_dir.clone(),
            date: self.date.clone(),
            camera: self.camera.clone(),
            extension: self.extension.clone(),
            ..ConfigLayer::default()
        }
    }
}

/// Arguments for the run command
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Probes in flight at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Re-probe files whose cached probe failed (`--retry=false` turns it off)
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub retry: Option<bool>,

    /// Abort on the first unreadable file
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub halt_on_error: Option<bool>,

    /// Abort on the first failed render
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub halt_on_render_error: Option<bool>,

    /// Skip jobs whose output exists (the newest date is always rendered)
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub skip_existing: Option<bool>,

    /// Clockwise rotation: 0, 90, 180 or 270
    #[arg(long)]
    pub rotate: Option<u32>,

    /// Time-compression factor
    #[arg(long)]
    pub speed: Option<f64>,

    /// Seconds of source video between captions
    #[arg(long)]
    pub stride: Option<f64>,

    /// Keep the audio track
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub audio: Option<bool>,

    /// Output frame rate
    #[arg(long)]
    pub fps: Option<f64>,

    /// Constant quality value for the encoder
    #[arg(long)]
    pub quality: Option<u32>,

    /// Concatenate with stream copy instead of re-encoding
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub demux: Option<bool>,

    /// Capture-time overlay: true (burn in), false, or srt (sidecar file)
    #[arg(long)]
    pub timestamp: Option<TimestampMode>,

    /// Minimum clip duration in seconds
    #[arg(long)]
    pub min_duration: Option<f64>,

    /// Minimum clip size in bytes
    #[arg(long)]
    pub min_size: Option<u64>,

    /// Do not print progress lines
    #[arg(long)]
    pub no_progress: bool,
}

impl RunArgs {
    /// Apply the run options over `layer`; unset flags leave lower layers alone
    pub fn apply(&self, layer: &mut ConfigLayer) {
        layer.concurrency = self.concurrency.or(layer.concurrency);
        layer.retry = self.retry.or(layer.retry);
        layer.halt_on_error = self.halt_on_error.or(layer.halt_on_error);
        layer.halt_on_render_error = self.halt_on_render_error.or(layer.halt_on_render_error);
        layer.skip_existing = self.skip_existing.or(layer.skip_existing);
        layer.min_duration = self.min_duration.or(layer.min_duration);
        layer.min_size = self.min_size.or(layer.min_size);

        let render = &mut layer.render;
        render.rotate = self.rotate.or(render.rotate);
        render.speed = self.speed.or(render.speed);
        render.stride = self.stride.or(render.stride);
        render.fps = self.fps.or(render.fps);
        render.quality = self.quality.or(render.quality);
        render.timestamp = self.timestamp.or(render.timestamp);
        render.audio = self.audio.or(render.audio);
        render.demux = self.demux.or(render.demux);
    }
}

/// Arguments for the scan command
#[derive(Args, Debug, Clone, Default)]
pub struct ScanArgs {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_flags_keep_lower_layers() {
        let mut layer = ConfigLayer {
            retry: Some(false),
            ..ConfigLayer::default()
        };
        layer.render.audio = Some(true);

        RunArgs::default().apply(&mut layer);
        assert_eq!(layer.retry, Some(false));
        assert_eq!(layer.render.audio, Some(true));
    }

    #[test]
    fn test_set_options_win() {
        let mut layer = ConfigLayer::default();
        let args = RunArgs {
            concurrency: Some(4),
            retry: Some(true),
            rotate: Some(90),
            demux: Some(true),
            timestamp: Some(TimestampMode::Sidecar),
            ..RunArgs::default()
        };
        args.apply(&mut layer);

        assert_eq!(layer.concurrency, Some(4));
        assert_eq!(layer.retry, Some(true));
        assert_eq!(layer.render.rotate, Some(90));
        assert_eq!(layer.render.demux, Some(true));
        assert_eq!(layer.render.timestamp, Some(TimestampMode::Sidecar));
    }

    #[test]
    fn test_config_args_layer() {
        let args = ConfigArgs {
            base_dir: Some("/srv/cctv".to_string()),
            camera: Some("1001".to_string()),
            ..ConfigArgs::default()
        };
        let layer = args.to_layer();
        assert_eq!(layer.base_dir.as_deref(), Some("/srv/cctv"));
        assert_eq!(layer.camera.as_deref(), Some("1001"));
        assert_eq!(layer.date, None);
    }
}
