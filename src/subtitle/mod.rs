//! Timestamp caption synthesis and SRT output

use chrono::Duration as ChronoDuration;
use std::path::Path;

use crate::config::RenderTuning;
use crate::domain::model::{Clip, SubtitleCue, CAPTION_FORMAT};
use crate::error::ConsolidatorResult;
use crate::utils::time::{format_srt_time, seconds_to_ms};

/// Generates one wall-clock caption per sampled instant of a job.
///
/// Instants are taken every `stride * speed` source seconds. Each caption is
/// `stride` seconds wide on the output clock, which starts at zero and runs across
/// all clips of the job without gaps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubtitleSynthesizer {
    stride: f64,
    speed: f64,
}

impl SubtitleSynthesizer {
    pub fn new(stride: f64, speed: f64) -> Self {
        Self { stride, speed }
    }

    /// Stream copy keeps the source clock, so demuxed output samples at speed 1
    pub fn from_tuning(tuning: &RenderTuning) -> Self {
        let speed = if tuning.demux { 1.0 } else { tuning.speed };
        Self::new(tuning.stride, speed)
    }

    /// Source-time distance between samples, in milliseconds
    pub fn step_ms(&self) -> u64 {
        seconds_to_ms(self.stride * self.speed).max(1)
    }

    /// Caption width on the output clock, in milliseconds
    pub fn cue_width_ms(&self) -> u64 {
        seconds_to_ms(self.stride).max(1)
    }

    /// Captions for `clips` in order. Clips without a duration contribute nothing.
    pub fn synthesize(&self, clips: &[Clip]) -> Vec<SubtitleCue> {
        let step = self.step_ms();
        let width = self.cue_width_ms();
        let mut cues = Vec::new();
        let mut offset = 0u64;

        for clip in clips {
            let duration_ms = clip.duration().map(seconds_to_ms).unwrap_or(0);
            let mut t = 0u64;
            while t < duration_ms {
                let instant = clip.start + ChronoDuration::milliseconds(t as i64);
                cues.push(SubtitleCue {
                    index: cues.len() + 1,
                    start_ms: offset,
                    end_ms: offset + width,
                    text: instant.format(CAPTION_FORMAT).to_string(),
                });
                offset += width;
                t += step;
            }
        }

        cues
    }
}

impl Default for SubtitleSynthesizer {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

/// Render cues as SRT text
pub fn to_srt(cues: &[SubtitleCue]) -> String {
    let mut output = String::new();

    for cue in cues {
        output.push_str(&format!("{}\n", cue.index));
        output.push_str(&format!(
            "{} --> {}\n",
            format_srt_time(cue.start_ms),
            format_srt_time(cue.end_ms),
        ));
        output.push_str(&cue.text);
        output.push_str("\n\n");
    }

    output
}

/// Write cues to `path` as SRT
pub async fn write_srt(path: &Path, cues: &[SubtitleCue]) -> ConsolidatorResult<()> {
    tokio::fs::write(path, to_srt(cues)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::MediaProbe;

    fn clip(name: &str, duration: f64) -> Clip {
        let mut clip = Clip::from_file_name(Path::new("/v"), name).unwrap();
        clip.set_probe_outcome(Ok(MediaProbe::new(duration, 1024)));
        clip
    }

    fn windows(cues: &[SubtitleCue]) -> Vec<(u64, u64)> {
        cues.iter().map(|c| (c.start_ms, c.end_ms)).collect()
    }

    #[test]
    fn test_three_second_clip() {
        let cues = SubtitleSynthesizer::new(1.0, 1.0)
            .synthesize(&[clip("1001_2021-01-01_00-00-00.mp4", 3.0)]);

        assert_eq!(windows(&cues), vec![(0, 1000), (1000, 2000), (2000, 3000)]);
        let texts: Vec<&str> = cues.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "2021-01-01 00:00:00",
                "2021-01-01 00:00:01",
                "2021-01-01 00:00:02"
            ]
        );
        assert_eq!(cues[0].index, 1);
        assert_eq!(cues[2].index, 3);
    }

    #[test]
    fn test_cues_are_contiguous_across_clips() {
        let cues = SubtitleSynthesizer::default().synthesize(&[
            clip("1001_2021-01-01_10-00-00.mp4", 2.5),
            clip("1001_2021-01-01_12-30-00.mp4", 2.0),
        ]);

        assert_eq!(cues.len(), 5);
        assert!(cues.windows(2).all(|w| w[0].end_ms == w[1].start_ms));
        assert_eq!(cues[2].text, "2021-01-01 10:00:02");
        assert_eq!(cues[3].text, "2021-01-01 12:30:00");
        assert_eq!(cues[3].start_ms, 3000);
    }

    #[test]
    fn test_speed_compresses_sampling() {
        let cues = SubtitleSynthesizer::new(1.0, 4.0)
            .synthesize(&[clip("1001_2021-01-01_00-00-00.mp4", 10.0)]);

        let texts: Vec<&str> = cues.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "2021-01-01 00:00:00",
                "2021-01-01 00:00:04",
                "2021-01-01 00:00:08"
            ]
        );
        assert_eq!(windows(&cues), vec![(0, 1000), (1000, 2000), (2000, 3000)]);
    }

    #[test]
    fn test_stream_copy_ignores_speed() {
        let tuning = RenderTuning {
            speed: 4.0,
            demux: true,
            ..RenderTuning::default()
        };
        let cues = SubtitleSynthesizer::from_tuning(&tuning)
            .synthesize(&[clip("1001_2021-01-01_00-00-00.mp4", 10.0)]);
        assert_eq!(cues.len(), 10);
        assert_eq!(cues.last().map(|c| c.end_ms), Some(10_000));

        let reencoded = RenderTuning {
            demux: false,
            ..tuning
        };
        assert_eq!(SubtitleSynthesizer::from_tuning(&reencoded).step_ms(), 4000);
    }

    #[test]
    fn test_clip_without_duration_contributes_nothing() {
        let unprobed = Clip::from_file_name(Path::new("/v"), "1001_2021-01-01_00-00-00.mp4").unwrap();
        let zero = clip("1001_2021-01-01_00-01-00.mp4", 0.0);
        assert!(SubtitleSynthesizer::default()
            .synthesize(&[unprobed, zero])
            .is_empty());
    }

    #[test]
    fn test_crosses_midnight() {
        let cues = SubtitleSynthesizer::default()
            .synthesize(&[clip("1001_2021-01-01_23-59-59.mp4", 2.0)]);
        assert_eq!(cues[1].text, "2021-01-02 00:00:00");
    }

    #[test]
    fn test_srt_rendering() {
        let cues = SubtitleSynthesizer::default()
            .synthesize(&[clip("1001_2021-01-01_00-00-00.mp4", 2.0)]);
        assert_eq!(
            to_srt(&cues),
            "1\n00:00:00,000 --> 00:00:01,000\n2021-01-01 00:00:00\n\n\
             2\n00:00:01,000 --> 00:00:02,000\n2021-01-01 00:00:01\n\n"
        );
    }

    #[tokio::test]
    async fn test_write_srt() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.srt");
        let cues = SubtitleSynthesizer::default()
            .synthesize(&[clip("1001_2021-01-01_00-00-00.mp4", 1.0)]);
        write_srt(&path, &cues).await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("1\n00:00:00,000 --> 00:00:01,000\n"));
    }
}
