// Domain rules - Job building and clip admission policies

use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::{JobSettings, LayeredConfig, QualityGate, Settings};
use crate::domain::index::ClipIndex;
use crate::domain::model::{Clip, Job};
use crate::error::ConsolidatorResult;

impl QualityGate {
    /// A clip passes when it has a positive probed duration of at least
    /// `min_duration` seconds and a probed size of at least `min_size` bytes.
    pub fn admits(&self, clip: &Clip) -> bool {
        match &clip.probe {
            Some(probe) => {
                probe.duration > 0.0
                    && probe.duration >= self.min_duration
                    && probe.size >= self.min_size
            }
            None => false,
        }
    }
}

/// Turns a grouped clip index into an ordered list of render jobs
pub struct JobBuilder;

impl JobBuilder {
    /// Build jobs using global and per-camera settings from `config`
    pub fn build(index: &ClipIndex, config: &LayeredConfig) -> ConsolidatorResult<Vec<Job>> {
        let settings = config.resolve()?;
        Self::build_with(index, &settings, |camera| config.job_settings(camera))
    }

    /// Build jobs with an explicit per-camera settings resolver.
    ///
    /// Dates are visited newest first and cameras in ascending order; the returned
    /// list is also the execution order.
    pub fn build_with<F>(
        index: &ClipIndex,
        settings: &Settings,
        mut settings_for: F,
    ) -> ConsolidatorResult<Vec<Job>>
    where
        F: FnMut(&str) -> ConsolidatorResult<JobSettings>,
    {
        let mut resolved: BTreeMap<&str, JobSettings> = BTreeMap::new();
        let mut jobs = Vec::new();

        for (date, cameras) in index.by_date().iter().rev() {
            if settings.date.as_deref().map_or(false, |only| only != date) {
                continue;
            }

            for camera in cameras.keys() {
                if settings.camera.as_deref().map_or(false, |only| only != camera) {
                    continue;
                }

                let job_settings = match resolved.get(camera.as_str()) {
                    Some(existing) => existing.clone(),
                    None => {
                        let fresh = settings_for(camera)?;
                        resolved.insert(camera.as_str(), fresh.clone());
                        fresh
                    }
                };

                if job_settings.disabled {
                    info!("Skipping disabled camera: {}", camera);
                    continue;
                }

                let all = index.clips_for(camera, date);
                let clips: Vec<Clip> = all
                    .iter()
                    .filter(|clip| job_settings.quality_gate.admits(clip))
                    .map(|clip| (*clip).clone())
                    .collect();

                if clips.len() < all.len() {
                    debug!(
                        camera = %camera,
                        date = %date,
                        excluded = all.len() - clips.len(),
                        "Excluded unusable clips"
                    );
                }
                if clips.is_empty() {
                    debug!(camera = %camera, date = %date, "No usable clips, no job");
                    continue;
                }

                jobs.push(Job {
                    camera: camera.clone(),
                    date: date.clone(),
                    clips,
                    settings: job_settings,
                    output: settings.output_path(date, camera),
                });
            }
        }

        Ok(jobs)
    }
}
