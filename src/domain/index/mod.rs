// Clip index - Groups scanned clips by date and by camera

use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::model::{Clip, ClipKey, MediaProbe};
use crate::error::{ConsolidatorError, ConsolidatorResult};

/// time -> position in the flat list
pub type TimeSlots = BTreeMap<String, usize>;

/// Grouped view over a scanned directory.
///
/// Clips live once in `clips`, sorted by (date, camera, time). The two nested
/// maps hold positions into that list so both views always agree.
#[derive(Debug, Clone, Default)]
pub struct ClipIndex {
    clips: Vec<Clip>,
    by_date: BTreeMap<String, BTreeMap<String, TimeSlots>>,
    by_camera: BTreeMap<String, BTreeMap<String, TimeSlots>>,
}

impl ClipIndex {
    /// Build the index from file names found in `dir`.
    ///
    /// Fails on the first unparseable name, or when two names resolve to the same key.
    pub fn build<S: AsRef<str>>(dir: &Path, names: &[S]) -> ConsolidatorResult<Self> {
        let mut clips = names
            .iter()
            .map(|name| Clip::from_file_name(dir, name.as_ref()))
            .collect::<ConsolidatorResult<Vec<_>>>()?;

        clips.sort_by(|a, b| {
            (&a.key.date, &a.key.camera, &a.key.time, &a.file_name).cmp(&(
                &b.key.date,
                &b.key.camera,
                &b.key.time,
                &b.file_name,
            ))
        });

        let mut index = Self::default();
        for clip in clips {
            index.insert(clip)?;
        }
        Ok(index)
    }

    fn insert(&mut self, clip: Clip) -> ConsolidatorResult<()> {
        let ClipKey { camera, date, time } = clip.key.clone();

        if let Some(&existing) = self
            .by_date
            .get(&date)
            .and_then(|cameras| cameras.get(&camera))
            .and_then(|times| times.get(&time))
        {
            return Err(ConsolidatorError::DuplicateClipKey {
                key: clip.key.to_string(),
                first: self.clips[existing].file_name.clone(),
                second: clip.file_name,
            });
        }

        let position = self.clips.len();
        self.by_date
            .entry(date.clone())
            .or_default()
            .entry(camera.clone())
            .or_default()
            .insert(time.clone(), position);
        self.by_camera
            .entry(camera)
            .or_default()
            .entry(date)
            .or_default()
            .insert(time, position);
        self.clips.push(clip);
        Ok(())
    }

    /// All clips sorted by (date, camera, time)
    pub fn flat(&self) -> &[Clip] {
        &self.clips
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// date -> camera -> time -> position
    pub fn by_date(&self) -> &BTreeMap<String, BTreeMap<String, TimeSlots>> {
        &self.by_date
    }

    /// camera -> date -> time -> position
    pub fn by_camera(&self) -> &BTreeMap<String, BTreeMap<String, TimeSlots>> {
        &self.by_camera
    }

    /// Dates in ascending order
    pub fn dates(&self) -> Vec<&str> {
        self.by_date.keys().map(String::as_str).collect()
    }

    /// Cameras in ascending order
    pub fn cameras(&self) -> Vec<&str> {
        self.by_camera.keys().map(String::as_str).collect()
    }

    /// Cameras with footage on `date`, ascending
    pub fn cameras_on(&self, date: &str) -> Vec<&str> {
        self.by_date
            .get(date)
            .map(|cameras| cameras.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Times of day recorded by `camera` on `date`, ascending
    pub fn times_for(&self, camera: &str, date: &str) -> Vec<&str> {
        self.by_camera
            .get(camera)
            .and_then(|dates| dates.get(date))
            .map(|times| times.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Clips of `camera` on `date`, chronological
    pub fn clips_for(&self, camera: &str, date: &str) -> Vec<&Clip> {
        self.by_camera
            .get(camera)
            .and_then(|dates| dates.get(date))
            .map(|times| times.values().map(|&i| &self.clips[i]).collect())
            .unwrap_or_default()
    }

    pub fn clip(&self, camera: &str, date: &str, time: &str) -> Option<&Clip> {
        self.by_camera
            .get(camera)?
            .get(date)?
            .get(time)
            .map(|&i| &self.clips[i])
    }

    /// Attach a probe outcome to the clip at `position` in [`ClipIndex::flat`]
    pub fn set_probe_outcome(&mut self, position: usize, outcome: Result<MediaProbe, String>) {
        if let Some(clip) = self.clips.get_mut(position) {
            clip.set_probe_outcome(outcome);
        }
    }

    /// Number of clips carrying a probe error
    pub fn unreadable_count(&self) -> usize {
        self.clips.iter().filter(|c| c.probe_error.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_grouping_by_date_and_camera() {
        let files = names(&[
            "2002_2021-01-01_00-00-00.mp4",
            "1001_2021-01-01_00-05-00.mp4",
            "1001_2021-01-01_00-00-00.mp4",
        ]);
        let index = ClipIndex::build(Path::new("/v"), &files).unwrap();

        assert_eq!(index.cameras_on("2021-01-01"), vec!["1001", "2002"]);
        assert_eq!(
            index.times_for("1001", "2021-01-01"),
            vec!["00-00-00", "00-05-00"]
        );
        assert_eq!(index.cameras(), vec!["1001", "2002"]);
        assert_eq!(index.dates(), vec!["2021-01-01"]);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_flat_order_is_date_camera_time() {
        let files = names(&[
            "2002_2021-01-02_00-00-00.mp4",
            "1001_2021-01-02_10-00-00.mp4",
            "2002_2021-01-01_00-00-00.mp4",
            "1001_2021-01-02_09-00-00.mp4",
        ]);
        let index = ClipIndex::build(Path::new("/v"), &files).unwrap();
        let order: Vec<String> = index.flat().iter().map(|c| c.key.to_string()).collect();
        assert_eq!(
            order,
            vec![
                "2002/2021-01-01/00-00-00",
                "1001/2021-01-02/09-00-00",
                "1001/2021-01-02/10-00-00",
                "2002/2021-01-02/00-00-00",
            ]
        );
    }

    #[test]
    fn test_grouping_is_deterministic() {
        let a = names(&[
            "1001_2021-01-01_00-00-00.mp4",
            "1001_2021-01-01_00-05-00.mp4",
            "2002_2021-01-01_00-00-00.mp4",
        ]);
        let mut b = a.clone();
        b.reverse();
        let first = ClipIndex::build(Path::new("/v"), &a).unwrap();
        let second = ClipIndex::build(Path::new("/v"), &b).unwrap();
        assert_eq!(first.by_date(), second.by_date());
        assert_eq!(first.by_camera(), second.by_camera());
        assert_eq!(first.flat(), second.flat());
    }

    #[test]
    fn test_duplicate_key_is_rejected() {
        let files = names(&[
            "1001_2021-01-01_00-00-00.mp4",
            "1001_2021-01-01_00-00-00(1).mp4",
        ]);
        let err = ClipIndex::build(Path::new("/v"), &files).unwrap_err();
        match err {
            ConsolidatorError::DuplicateClipKey { key, first, second } => {
                assert_eq!(key, "1001/2021-01-01/00-00-00");
                assert_eq!(first, "1001_2021-01-01_00-00-00(1).mp4");
                assert_eq!(second, "1001_2021-01-01_00-00-00.mp4");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_name_fails_build() {
        let files = names(&["1001_2021-01-01_00-00-00.mp4", "notes.mp4"]);
        let err = ClipIndex::build(Path::new("/v"), &files).unwrap_err();
        assert!(matches!(err, ConsolidatorError::MalformedFilename { .. }));
    }

    #[test]
    fn test_clip_lookup_and_probe_outcome() {
        let files = names(&["1001_2021-01-01_00-00-00.mp4", "1001_2021-01-01_00-01-00.mp4"]);
        let mut index = ClipIndex::build(Path::new("/v"), &files).unwrap();
        index.set_probe_outcome(0, Ok(MediaProbe::new(60.0, 10)));
        index.set_probe_outcome(1, Err("corrupt".to_string()));

        let clip = index.clip("1001", "2021-01-01", "00-00-00").unwrap();
        assert!(clip.is_usable());
        assert_eq!(index.unreadable_count(), 1);
        assert_eq!(index.clips_for("1001", "2021-01-01").len(), 2);
        assert!(index.clip("1001", "2021-01-02", "00-00-00").is_none());
    }
}
