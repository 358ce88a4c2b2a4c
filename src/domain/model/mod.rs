// Domain models - Core types and data structures

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::JobSettings;
use crate::error::{ConsolidatorError, ConsolidatorResult};

/// Date format used in clip names and job keys
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Time-of-day format used in clip names
pub const TIME_FORMAT: &str = "%H-%M-%S";
/// Wall-clock format shown in the timestamp overlay
pub const CAPTION_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Identity of one clip: camera, calendar date and time of day
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClipKey {
    pub camera: String,
    pub date: String,
    pub time: String,
}

impl ClipKey {
    /// Parse `<digits>_<yyyy-mm-dd>_<hh-mm-ss>` from the start of a file stem.
    ///
    /// Anything after the time component is ignored, so `1001_2021-01-01_00-00-00(1).mp4`
    /// yields the same key as `1001_2021-01-01_00-00-00.mp4`. Date and time are
    /// re-formatted with zero padding.
    pub fn from_file_name(name: &str) -> ConsolidatorResult<Self> {
        Self::parse_parts(name)
            .map(|(key, _)| key)
            .ok_or_else(|| ConsolidatorError::MalformedFilename {
                name: name.to_string(),
            })
    }

    /// Combined capture instant of this clip
    pub fn start(&self) -> ConsolidatorResult<NaiveDateTime> {
        let date = NaiveDate::parse_from_str(&self.date, DATE_FORMAT)
            .map_err(|e| ConsolidatorError::invalid(format!("Bad date '{}': {}", self.date, e)))?;
        let time = NaiveTime::parse_from_str(&self.time, TIME_FORMAT)
            .map_err(|e| ConsolidatorError::invalid(format!("Bad time '{}': {}", self.time, e)))?;
        Ok(date.and_time(time))
    }

    fn parse_parts(name: &str) -> Option<(Self, NaiveDateTime)> {
        let stem = Path::new(name).file_stem()?.to_str()?;

        let (camera, rest) = split_run(stem, |c| c.is_ascii_digit());
        let rest = rest.strip_prefix('_')?;
        let (date, rest) = split_run(rest, |c| c.is_ascii_digit() || c == '-');
        let rest = rest.strip_prefix('_')?;
        let (time, _) = split_run(rest, |c| c.is_ascii_digit() || c == '-');

        if camera.is_empty() || date.is_empty() || time.is_empty() {
            return None;
        }

        let date = NaiveDate::parse_from_str(date, DATE_FORMAT).ok()?;
        let time = NaiveTime::parse_from_str(time, TIME_FORMAT).ok()?;

        let key = Self {
            camera: camera.to_string(),
            date: date.format(DATE_FORMAT).to_string(),
            time: time.format(TIME_FORMAT).to_string(),
        };
        Some((key, date.and_time(time)))
    }
}

impl fmt::Display for ClipKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.camera, self.date, self.time)
    }
}

/// Split `s` after the longest prefix whose chars all satisfy `pred`
fn split_run(s: &str, pred: impl Fn(char) -> bool) -> (&str, &str) {
    let end = s.find(|c: char| !pred(c)).unwrap_or(s.len());
    s.split_at(end)
}

/// Technical metadata extracted from a media file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaProbe {
    /// Duration in seconds
    pub duration: f64,
    /// File size in bytes
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl MediaProbe {
    /// Probe carrying only duration and size
    pub fn new(duration: f64, size: u64) -> Self {
        Self {
            duration,
            size,
            format_name: None,
            video_codec: None,
            audio_codec: None,
            width: None,
            height: None,
        }
    }
}

/// Filesystem stat snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStats {
    pub size: u64,
    pub is_file: bool,
    pub is_dir: bool,
    #[serde(default)]
    pub modified_ms: Option<i64>,
    #[serde(default)]
    pub accessed_ms: Option<i64>,
    #[serde(default)]
    pub created_ms: Option<i64>,
}

/// One persisted probe cache record, keyed by absolute path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<FileStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<MediaProbe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_error: Option<String>,
}

/// One discovered source file
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub key: ClipKey,
    /// Capture start (date + time of day)
    pub start: NaiveDateTime,
    pub file_name: String,
    pub path: PathBuf,
    pub probe: Option<MediaProbe>,
    pub probe_error: Option<String>,
}

impl Clip {
    /// Create a clip from a scanned file name inside `dir`
    pub fn from_file_name(dir: &Path, name: &str) -> ConsolidatorResult<Self> {
        let (key, start) =
            ClipKey::parse_parts(name).ok_or_else(|| ConsolidatorError::MalformedFilename {
                name: name.to_string(),
            })?;
        Ok(Self {
            key,
            start,
            file_name: name.to_string(),
            path: dir.join(name),
            probe: None,
            probe_error: None,
        })
    }

    /// Probed duration in seconds, if any
    pub fn duration(&self) -> Option<f64> {
        self.probe.as_ref().map(|p| p.duration)
    }

    /// A clip is usable once it has a probe with a positive duration
    pub fn is_usable(&self) -> bool {
        self.duration().map_or(false, |d| d > 0.0)
    }

    /// Record the outcome of the probing phase
    pub fn set_probe_outcome(&mut self, outcome: Result<MediaProbe, String>) {
        match outcome {
            Ok(probe) => {
                self.probe = Some(probe);
                self.probe_error = None;
            }
            Err(message) => {
                self.probe = None;
                self.probe_error = Some(message);
            }
        }
    }
}

/// One unit of consolidation work: all usable clips of one camera on one date
#[derive(Debug, Clone)]
pub struct Job {
    pub camera: String,
    pub date: String,
    /// Chronological by time of day
    pub clips: Vec<Clip>,
    pub settings: JobSettings,
    pub output: PathBuf,
}

impl Job {
    /// Ordered input paths for the renderer
    pub fn input_paths(&self) -> Vec<PathBuf> {
        self.clips.iter().map(|c| c.path.clone()).collect()
    }

    /// Sum of clip durations in source seconds
    pub fn source_duration(&self) -> f64 {
        self.clips.iter().filter_map(Clip::duration).sum()
    }

    /// Expected duration of the rendered output in seconds
    pub fn output_duration(&self) -> f64 {
        self.source_duration() / self.settings.render.speed
    }

    pub fn label(&self) -> String {
        format!("{}_{}", self.date, self.camera)
    }
}

/// One timed caption; offsets are milliseconds of output (caption) time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleCue {
    /// 1-based sequence number
    pub index: usize,
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}
