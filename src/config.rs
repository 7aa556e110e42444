//! Device-agnostic tracker parameters.
//!
//! Every setter validates its input and only stores it if it is acceptable,
//! so a [TrackerConfig] is valid from the moment it exists. Session settings
//! can also be read from a RON file, e.g.
//!
//! ```text
//! (
//!     device: "vector",
//!     track_eyes: [true, true],
//!     fixation_window: 2.0,
//!     min_fix_dur: 0.2,
//!     fix_timeout: 3.0,
//!     sample_mode: "average",
//!     calibration_points: 5,
//!     file_folder: Some("data/eyetracking"),
//!     file_name: Some("p01"),
//! )
//! ```

use crate::error::{invalid, Result};
use crate::raw_file::unique_stem;
use crate::sample::{SampleMode, TrackedEyes};
use crate::targets::CalibrationTargets;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Where the session's files go. Only exists when storage is enabled.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTarget {
    /// Existing directory for raw data and calibration snapshots
    pub folder: PathBuf,
    /// File stem for the session's raw data, already de-duplicated
    pub base_name: String,
}

impl OutputTarget {
    /// `<folder>/<base_name>.<ext>`
    pub fn raw_path(&self, ext: &str) -> PathBuf {
        self.folder.join(format!("{}.{}", self.base_name, ext))
    }
}

/// RGB colours in the -1..1 range, used where a device draws its own
/// calibration screen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Palette {
    /// Background colour
    #[serde(default)]
    pub back: Option<[f64; 3]>,
    /// Foreground colour seen by both eyes
    #[serde(default)]
    pub both: Option<[f64; 3]>,
}

/// Validated, device-agnostic tracker parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    eyes: TrackedEyes,
    fixation_window: f64,
    min_fixation_duration: f64,
    fixation_timeout: f64,
    sample_mode: SampleMode,
    calibration_points: usize,
    targets: CalibrationTargets,
    output: Option<OutputTarget>,
    palette: Palette,
}

impl TrackerConfig {
    /// Builds a config with storage disabled and the 5 point calibration
    /// layout. `min_fixation_duration` is validated before
    /// `fixation_timeout`, which must exceed it.
    pub fn new(
        eyes: &[bool],
        fixation_window: f64,
        min_fixation_duration: f64,
        fixation_timeout: f64,
        sample_mode: &str,
    ) -> Result<Self> {
        let mut config = TrackerConfig {
            eyes: TrackedEyes::from_flags(eyes)?,
            fixation_window: 0.0,
            min_fixation_duration: 0.0,
            fixation_timeout: f64::INFINITY,
            sample_mode: sample_mode.parse()?,
            calibration_points: 5,
            targets: CalibrationTargets::five_point(),
            output: None,
            palette: Palette::default(),
        };
        config.set_fixation_window(fixation_window)?;
        config.set_min_fixation_duration(min_fixation_duration)?;
        config.set_fixation_timeout(fixation_timeout)?;
        Ok(config)
    }

    /// Must be `[left, right]` with at least one `true`.
    pub fn set_eyes_tracked(&mut self, eyes: &[bool]) -> Result<()> {
        self.eyes = TrackedEyes::from_flags(eyes)?;
        Ok(())
    }

    /// Radius of the fixation window, in degrees. Must be positive.
    pub fn set_fixation_window(&mut self, radius: f64) -> Result<()> {
        if !(radius.is_finite() && radius > 0.0) {
            return invalid("fixation window must be larger than 0");
        }
        self.fixation_window = radius;
        Ok(())
    }

    /// Minimum fixation duration, in seconds. Must be positive and below the
    /// current fixation timeout.
    pub fn set_min_fixation_duration(&mut self, seconds: f64) -> Result<()> {
        if !(seconds.is_finite() && seconds > 0.0) {
            return invalid("minimum fixation duration must be larger than 0");
        }
        if seconds >= self.fixation_timeout {
            return invalid(format!(
                "minimum fixation duration must be shorter than the fixation timeout ({})",
                self.fixation_timeout
            ));
        }
        self.min_fixation_duration = seconds;
        Ok(())
    }

    /// Fixation timeout, in seconds. Must exceed the minimum fixation
    /// duration, so set that first.
    pub fn set_fixation_timeout(&mut self, seconds: f64) -> Result<()> {
        if !(seconds.is_finite() && seconds > self.min_fixation_duration) {
            return invalid("fixation timeout must be larger than minimum fixation duration");
        }
        self.fixation_timeout = seconds;
        Ok(())
    }

    /// 5 or 9; picks the matching built-in target layout.
    pub fn set_calibration_point_count(&mut self, count: usize) -> Result<()> {
        self.targets = CalibrationTargets::for_point_count(count)?;
        self.calibration_points = count;
        Ok(())
    }

    /// One of `both`, `left`, `right`, `average`.
    pub fn set_sample_mode(&mut self, mode: &str) -> Result<()> {
        self.sample_mode = mode.parse()?;
        Ok(())
    }

    /// Enables storage in `folder` under `name`, or disables it when either
    /// is missing or empty. A folder that does not exist is an error. If a
    /// file named `name.*` already exists in the folder, the name gets the
    /// first free `_1`, `_2`, ... suffix.
    pub fn set_output_path(&mut self, folder: Option<&Path>, name: Option<&str>) -> Result<()> {
        self.output = None;

        let folder = match folder {
            Some(f) if !f.as_os_str().is_empty() => f,
            _ => {
                info!("not storing any files since no output folder was given");
                return Ok(());
            }
        };
        if !folder.is_dir() {
            return invalid(format!(
                "output folder is not a valid or existing path: {}",
                folder.display()
            ));
        }
        let name = match name {
            Some(n) if !n.is_empty() => n,
            _ => {
                info!("not storing any data since no file name was given");
                return Ok(());
            }
        };

        let base_name = unique_stem(folder, name)?;
        if base_name != name {
            warn!(
                "target eye-tracking data file already exists, changing to: {}",
                base_name
            );
        }

        self.output = Some(OutputTarget {
            folder: folder.to_path_buf(),
            base_name,
        });
        Ok(())
    }

    /// Colours for device-drawn calibration screens.
    pub fn set_palette(&mut self, palette: Palette) {
        self.palette = palette;
    }

    #[allow(missing_docs)]
    pub fn eyes(&self) -> TrackedEyes {
        self.eyes
    }

    #[allow(missing_docs)]
    pub fn fixation_window(&self) -> f64 {
        self.fixation_window
    }

    #[allow(missing_docs)]
    pub fn min_fixation_duration(&self) -> f64 {
        self.min_fixation_duration
    }

    #[allow(missing_docs)]
    pub fn fixation_timeout(&self) -> f64 {
        self.fixation_timeout
    }

    #[allow(missing_docs)]
    pub fn sample_mode(&self) -> SampleMode {
        self.sample_mode
    }

    #[allow(missing_docs)]
    pub fn calibration_points(&self) -> usize {
        self.calibration_points
    }

    /// The built-in layout for the configured point count.
    pub fn targets(&self) -> &CalibrationTargets {
        &self.targets
    }

    /// `None` when storage is disabled.
    pub fn output(&self) -> Option<&OutputTarget> {
        self.output.as_ref()
    }

    #[allow(missing_docs)]
    pub fn storage_enabled(&self) -> bool {
        self.output.is_some()
    }

    #[allow(missing_docs)]
    pub fn palette(&self) -> &Palette {
        &self.palette
    }
}

fn default_calibration_points() -> usize {
    5
}

/// The on-disk form of a session's tracker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerSettings {
    /// `precision`, `vector`, or `pointer`
    pub device: String,
    #[allow(missing_docs)]
    pub track_eyes: Vec<bool>,
    #[allow(missing_docs)]
    pub fixation_window: f64,
    #[allow(missing_docs)]
    pub min_fix_dur: f64,
    #[allow(missing_docs)]
    pub fix_timeout: f64,
    #[allow(missing_docs)]
    pub sample_mode: String,
    #[allow(missing_docs)]
    #[serde(default = "default_calibration_points")]
    pub calibration_points: usize,
    #[allow(missing_docs)]
    #[serde(default)]
    pub file_folder: Option<PathBuf>,
    #[allow(missing_docs)]
    #[serde(default)]
    pub file_name: Option<String>,
    #[allow(missing_docs)]
    #[serde(default)]
    pub palette: Palette,
}

impl Default for TrackerSettings {
    /// The pointer device tracking the left eye, with nothing stored.
    fn default() -> Self {
        TrackerSettings {
            device: "pointer".to_owned(),
            track_eyes: vec![true, false],
            fixation_window: 2.0,
            min_fix_dur: 0.2,
            fix_timeout: 3.0,
            sample_mode: "left".to_owned(),
            calibration_points: default_calibration_points(),
            file_folder: None,
            file_name: None,
            palette: Palette::default(),
        }
    }
}

impl TrackerSettings {
    /// Read settings from a RON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_ron(&text)
    }

    #[allow(missing_docs)]
    pub fn from_ron(text: &str) -> Result<Self> {
        Ok(ron::de::from_str(text)?)
    }

    /// Run every setter over the settings.
    pub fn to_config(&self) -> Result<TrackerConfig> {
        let mut config = TrackerConfig::new(
            &self.track_eyes,
            self.fixation_window,
            self.min_fix_dur,
            self.fix_timeout,
            &self.sample_mode,
        )?;
        config.set_calibration_point_count(self.calibration_points)?;
        config.set_output_path(self.file_folder.as_deref(), self.file_name.as_deref())?;
        config.set_palette(self.palette.clone());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config() -> TrackerConfig {
        TrackerConfig::new(&[true, false], 2.0, 0.2, 3.0, "left").unwrap()
    }

    #[test]
    fn timeout_must_exceed_min_duration() {
        assert!(TrackerConfig::new(&[true, true], 2.0, 0.2, 0.1, "both").is_err());
        assert!(TrackerConfig::new(&[true, true], 2.0, 0.2, 0.2, "both").is_err());
        assert!(TrackerConfig::new(&[true, true], 2.0, 0.2, 0.3, "both").is_ok());

        let mut c = config();
        assert!(c.set_fixation_timeout(0.1).is_err());
        assert_eq!(c.fixation_timeout(), 3.0);
        assert!(c.set_fixation_timeout(0.3).is_ok());
        assert!(c.fixation_timeout() > c.min_fixation_duration());
    }

    #[test]
    fn min_duration_can_not_overtake_timeout() {
        let mut c = config();
        assert!(c.set_min_fixation_duration(3.0).is_err());
        assert!(c.set_min_fixation_duration(0.0).is_err());
        assert!(c.set_min_fixation_duration(2.5).is_ok());
        assert!(c.fixation_timeout() > c.min_fixation_duration());
    }

    #[test]
    fn rejected_values_are_not_stored() {
        let mut c = config();
        assert!(c.set_eyes_tracked(&[false, false]).is_err());
        assert!(c.eyes().contains(crate::sample::Eye::Left));
        assert!(c.set_fixation_window(0.0).is_err());
        assert!(c.set_fixation_window(-1.0).is_err());
        assert_eq!(c.fixation_window(), 2.0);
        assert!(c.set_calibration_point_count(6).is_err());
        assert_eq!(c.calibration_points(), 5);
        assert!(c.set_sample_mode("both eyes").is_err());
        assert_eq!(c.sample_mode(), SampleMode::Left);
    }

    #[test]
    fn nine_points_selects_nine_targets() {
        let mut c = config();
        c.set_calibration_point_count(9).unwrap();
        assert_eq!(c.targets().len(), 9);
    }

    #[test]
    fn output_path_rules() {
        let mut c = config();
        c.set_output_path(None, Some("p01")).unwrap();
        assert!(!c.storage_enabled());
        c.set_output_path(Some(Path::new("")), Some("p01")).unwrap();
        assert!(!c.storage_enabled());

        assert!(c
            .set_output_path(Some(Path::new("/definitely/not/here")), Some("p01"))
            .is_err());

        let dir = tempdir().unwrap();
        c.set_output_path(Some(dir.path()), Some("")).unwrap();
        assert!(!c.storage_enabled());

        c.set_output_path(Some(dir.path()), Some("p01")).unwrap();
        assert_eq!(c.output().unwrap().base_name, "p01");

        fs::write(dir.path().join("p01.edf"), b"").unwrap();
        c.set_output_path(Some(dir.path()), Some("p01")).unwrap();
        assert_eq!(c.output().unwrap().base_name, "p01_1");

        fs::write(dir.path().join("p01_1.edf"), b"").unwrap();
        c.set_output_path(Some(dir.path()), Some("p01")).unwrap();
        assert_eq!(c.output().unwrap().base_name, "p01_2");
        assert_eq!(
            c.output().unwrap().raw_path("csv"),
            dir.path().join("p01_2.csv")
        );
    }

    #[test]
    fn settings_round_trip_through_ron() {
        let dir = tempdir().unwrap();
        let text = format!(
            r#"(
                device: "vector",
                track_eyes: [true, true],
                fixation_window: 2.0,
                min_fix_dur: 0.2,
                fix_timeout: 3.0,
                sample_mode: "average",
                calibration_points: 9,
                file_folder: Some({:?}),
                file_name: Some("p07"),
                palette: (back: Some((0.5, 0.5, -1.0))),
            )"#,
            dir.path()
        );
        let settings = TrackerSettings::from_ron(&text).unwrap();
        let config = settings.to_config().unwrap();
        assert_eq!(settings.device, "vector");
        assert!(config.eyes().both());
        assert_eq!(config.sample_mode(), SampleMode::Average);
        assert_eq!(config.targets().len(), 9);
        assert_eq!(config.output().unwrap().base_name, "p07");
        assert_eq!(config.palette().back, Some([0.5, 0.5, -1.0]));
    }

    #[test]
    fn bad_settings_files_are_rejected() {
        assert!(TrackerSettings::from_ron("(device: 3)").is_err());
        let settings = TrackerSettings::from_ron(
            r#"(device: "pointer", track_eyes: [false, false], fixation_window: 2.0,
                min_fix_dur: 0.2, fix_timeout: 3.0, sample_mode: "left")"#,
        )
        .unwrap();
        assert!(settings.to_config().is_err());
    }
}
