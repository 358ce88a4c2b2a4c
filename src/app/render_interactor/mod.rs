// Render interactor - Runs consolidation jobs one at a time with aggregated progress

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::TimestampMode;
use crate::domain::model::Job;
use crate::engine::progress::{EtaEstimator, ProgressEvent, ProgressSink};
use crate::error::{ConsolidatorError, ConsolidatorResult};
use crate::ports::{FsPort, RenderPort, RenderProgress, RenderRequest};
use crate::subtitle::{write_srt, SubtitleSynthesizer};
use crate::utils::path::sibling_with;
use crate::utils::Utils;

/// Job runner policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerOptions {
    /// Stop the run at the first failed job
    pub halt_on_render_error: bool,
    /// Skip jobs whose output exists, except on the most recent date
    pub skip_existing: bool,
}

/// A job that did not produce its output
#[derive(Debug)]
pub struct JobFailure {
    pub label: String,
    pub output: PathBuf,
    pub error: ConsolidatorError,
}

/// Result of a whole run
#[derive(Debug, Default)]
pub struct RunReport {
    pub rendered: usize,
    pub skipped: usize,
    pub failed: Vec<JobFailure>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Partial output name: `<stem>.part.<ext>` next to `output`
pub fn part_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match output.extension() {
        Some(ext) => format!("{}.part.{}", stem, ext.to_string_lossy()),
        None => format!("{}.part", stem),
    };
    output.with_file_name(name)
}

/// Sequential job runner
pub struct JobRunner {
    renderer: Arc<dyn RenderPort>,
    fs_port: Arc<dyn FsPort>,
    sink: ProgressSink,
    options: RunnerOptions,
}

impl JobRunner {
    pub fn new(
        renderer: Arc<dyn RenderPort>,
        fs_port: Arc<dyn FsPort>,
        sink: ProgressSink,
        options: RunnerOptions,
    ) -> Self {
        Self {
            renderer,
            fs_port,
            sink,
            options,
        }
    }

    /// Render `jobs` in order.
    ///
    /// A failed job is recorded and the run moves on, unless `halt_on_render_error`
    /// is set, in which case that job's error is returned.
    pub async fn run(&self, jobs: &[Job]) -> ConsolidatorResult<RunReport> {
        let started = Instant::now();
        let total = jobs.len();
        let latest_date = jobs.iter().map(|job| job.date.as_str()).max();
        let mut estimator = EtaEstimator::started_at(started);
        let mut report = RunReport::default();

        for (index, job) in jobs.iter().enumerate() {
            let label = job.label();

            if self.options.skip_existing
                && Some(job.date.as_str()) != latest_date
                && self.output_exists(&job.output).await
            {
                info!("Skipping {}: {} exists", label, job.output.display());
                report.skipped += 1;
                continue;
            }

            self.sink.publish(ProgressEvent::JobStarted {
                index,
                total,
                label: label.clone(),
                clips: job.clips.len(),
            });
            info!(
                camera = %job.camera,
                date = %job.date,
                clips = job.clips.len(),
                "Rendering {} ({} of source)",
                label,
                Utils::format_duration(Duration::from_secs_f64(job.source_duration().max(0.0)))
            );

            let outcome = self
                .run_job(job, index, total, &label, &mut estimator)
                .await;
            let success = outcome.is_ok();
            self.sink.publish(ProgressEvent::JobFinished {
                index,
                total,
                label: label.clone(),
                success,
            });

            match outcome {
                Ok(()) => {
                    match self.fs_port.stat(&job.output).await {
                        Ok(stats) => info!(
                            "Wrote {} ({})",
                            job.output.display(),
                            Utils::format_file_size(stats.size)
                        ),
                        Err(_) => info!("Wrote {}", job.output.display()),
                    }
                    report.rendered += 1;
                }
                Err(error) => {
                    warn!("Job {} failed: {}", label, error);
                    if self.options.halt_on_render_error {
                        return Err(error);
                    }
                    report.failed.push(JobFailure {
                        label,
                        output: job.output.clone(),
                        error,
                    });
                }
            }
        }

        report.elapsed = started.elapsed();
        Ok(report)
    }

    /// An output that cannot be checked is rendered again
    async fn output_exists(&self, output: &Path) -> bool {
        match self.fs_port.exists(output).await {
            Ok(exists) => exists,
            Err(error) => {
                warn!("Could not check {}: {}", output.display(), error);
                false
            }
        }
    }

    async fn run_job(
        &self,
        job: &Job,
        index: usize,
        total: usize,
        label: &str,
        estimator: &mut EtaEstimator,
    ) -> ConsolidatorResult<()> {
        if let Some(dir) = job.output.parent() {
            self.fs_port.create_dir_all(dir).await?;
        }

        let tuning = &job.settings.render;
        let synthesizer = SubtitleSynthesizer::from_tuning(tuning);

        // Removed on drop, whatever the render outcome
        let mut subtitle_file = None;
        if tuning.timestamp == TimestampMode::Burn {
            let file = tempfile::Builder::new()
                .prefix(&format!("{}.", label))
                .suffix(".srt")
                .tempfile()?;
            write_srt(file.path(), &synthesizer.synthesize(&job.clips)).await?;
            subtitle_file = Some(file);
        }

        let part = part_path(&job.output);
        let request = RenderRequest {
            inputs: job.input_paths(),
            subtitles: subtitle_file.as_ref().map(|f| f.path().to_path_buf()),
            // Stream copy cannot burn; the captions become a soft track
            burn_subtitles: !tuning.demux,
            output: part.clone(),
            tuning: tuning.clone(),
            expected_duration: if tuning.demux {
                job.source_duration()
            } else {
                job.output_duration()
            },
        };

        let rendered = self
            .render_with_progress(&request, index, total, label, estimator)
            .await;
        drop(subtitle_file);

        if let Err(error) = rendered {
            if let Err(cleanup) = self.fs_port.remove_file(&part).await {
                warn!("Could not remove {}: {}", part.display(), cleanup);
            }
            return Err(error);
        }

        self.fs_port.move_file(&part, &job.output).await?;

        if tuning.timestamp == TimestampMode::Sidecar {
            let sidecar = sibling_with(&job.output, None, Some("srt"));
            write_srt(&sidecar, &synthesizer.synthesize(&job.clips)).await?;
            debug!("Wrote subtitles {}", sidecar.display());
        }
        Ok(())
    }

    async fn render_with_progress(
        &self,
        request: &RenderRequest,
        index: usize,
        total: usize,
        label: &str,
        estimator: &mut EtaEstimator,
    ) -> ConsolidatorResult<()> {
        let (tx, mut rx) = watch::channel(RenderProgress::default());
        let render = self.renderer.render(request, tx);
        tokio::pin!(render);

        loop {
            tokio::select! {
                result = &mut render => return result,
                changed = rx.changed() => {
                    if changed.is_err() {
                        // Renderer dropped its sender; just wait for it
                        return (&mut render).await;
                    }
                    let job_fraction = rx.borrow_and_update().fraction.clamp(0.0, 1.0);
                    let global = (index as f64 + job_fraction) / total as f64;
                    let eta = estimator.update(global);
                    self.sink.publish(ProgressEvent::Render {
                        index,
                        total,
                        label: label.to_string(),
                        job_fraction,
                        eta,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("/out/2021-01-02_1001.mp4")),
            PathBuf::from("/out/2021-01-02_1001.part.mp4")
        );
        assert_eq!(part_path(Path::new("/out/noext")), PathBuf::from("/out/noext.part"));
    }

    #[test]
    fn test_report_success() {
        let mut report = RunReport::default();
        assert!(report.is_success());
        report.failed.push(JobFailure {
            label: "2021-01-01_1001".to_string(),
            output: PathBuf::from("/out/2021-01-01_1001.mp4"),
            error: ConsolidatorError::RenderError {
                output: "/out/2021-01-01_1001.mp4".to_string(),
                message: "exit status 1".to_string(),
            },
        });
        assert!(!report.is_success());
    }
}
