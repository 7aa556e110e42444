//! `EyeTracker`, the one object an experiment talks to.
//!
//! The tracker is built once per session for one device. Every operation is
//! forwarded to that device's [GazeBackend]; the facade itself keeps the
//! session's file and recording state, and implements the gaze-contingent
//! wait on top of [EyeTracker::last_sample].

use crate::backend::{
    pointer::PointerStub,
    precision::{PrecisionLink, PrecisionTracker},
    vector::{VectorDriver, VectorTracker},
    CalibrationOutcome, DeviceKind, GazeBackend, InitOptions, SessionState, TrackerContext,
};
use crate::calibration::CalibrationSettings;
use crate::config::TrackerConfig;
use crate::error::{invalid, Result, TrackerError, TrackerWarning};
use crate::fixation::{gaze_in_window, FixationWait};
use crate::presentation::{FixationTarget, PointerSource, Presentation, Stimulus};
use crate::sample::SampleFrame;
use crate::Point;

use log::info;
use std::{env, path::PathBuf, sync::Arc};

/// Collects everything a tracker needs before it can pick its backend.
#[derive(Default)]
pub struct EyeTrackerBuilder {
    config: Option<TrackerConfig>,
    device: Option<String>,
    presentation: Option<Presentation>,
    precision_link: Option<Box<dyn PrecisionLink>>,
    vector_driver: Option<Box<dyn VectorDriver>>,
    pointer: Option<Box<dyn PointerSource>>,
    work_dir: Option<PathBuf>,
    calibration_settings: Option<CalibrationSettings>,
    seed: Option<u64>,
    fixation_stimuli: Vec<Box<dyn Stimulus>>,
}

impl EyeTrackerBuilder {
    #[allow(missing_docs)]
    pub fn config(mut self, config: TrackerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// `precision`, `vector`, or `pointer`.
    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    #[allow(missing_docs)]
    pub fn presentation(mut self, presentation: Presentation) -> Self {
        self.presentation = Some(presentation);
        self
    }

    /// Vendor runtime for the `precision` device.
    pub fn precision_link(mut self, link: Box<dyn PrecisionLink>) -> Self {
        self.precision_link = Some(link);
        self
    }

    /// Vendor library for the `vector` device.
    pub fn vector_driver(mut self, driver: Box<dyn VectorDriver>) -> Self {
        self.vector_driver = Some(driver);
        self
    }

    /// Pointer for the `pointer` device.
    pub fn pointer(mut self, pointer: Box<dyn PointerSource>) -> Self {
        self.pointer = Some(pointer);
        self
    }

    /// Where the precision runtime writes its data file. Defaults to the
    /// current directory.
    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    /// Calibration timing for the `vector` device.
    pub fn calibration_settings(mut self, settings: CalibrationSettings) -> Self {
        self.calibration_settings = Some(settings);
        self
    }

    /// Seed for the calibration target shuffle.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Drawn during [EyeTracker::wait_for_fixation] when the call does not
    /// bring its own stimuli.
    pub fn fixation_stimulus(mut self, stimulus: Box<dyn Stimulus>) -> Self {
        self.fixation_stimuli.push(stimulus);
        self
    }

    /// Pick the backend for the selected device.
    pub fn build(self) -> Result<EyeTracker> {
        let config = match self.config {
            Some(config) => config,
            None => return invalid("a tracker needs a configuration"),
        };
        let presentation = match self.presentation {
            Some(presentation) => presentation,
            None => return invalid("a tracker needs a presentation surface, keyboard and clock"),
        };
        let kind: DeviceKind = match &self.device {
            Some(device) => device.parse()?,
            None => return Err(TrackerError::TrackerNotConfigured("build")),
        };

        let backend: Box<dyn GazeBackend> = match kind {
            DeviceKind::Precision => {
                let Some(link) = self.precision_link else {
                    return invalid("the precision device needs a runtime link");
                };
                let work_dir = match self.work_dir {
                    Some(dir) => dir,
                    None => env::current_dir()?,
                };
                Box::new(PrecisionTracker::new(link, work_dir))
            }
            DeviceKind::Vector => {
                let Some(driver) = self.vector_driver else {
                    return invalid("the vector device needs a driver");
                };
                let mut tracker = VectorTracker::new(driver)
                    .with_settings(self.calibration_settings.unwrap_or_default());
                if let Some(seed) = self.seed {
                    tracker = tracker.with_seed(seed);
                }
                Box::new(tracker)
            }
            DeviceKind::Pointer => {
                let Some(pointer) = self.pointer else {
                    return invalid("the pointer device needs a pointer");
                };
                Box::new(PointerStub::new(pointer))
            }
        };
        info!("eye tracker set up for the {} device", backend.name());

        Ok(EyeTracker {
            config,
            backend: Some(backend),
            session: SessionState::default(),
            presentation,
            fixation_stimuli: self.fixation_stimuli,
        })
    }
}

/// A session with one eye tracker.
pub struct EyeTracker {
    config: TrackerConfig,
    backend: Option<Box<dyn GazeBackend>>,
    session: SessionState,
    presentation: Presentation,
    fixation_stimuli: Vec<Box<dyn Stimulus>>,
}

impl EyeTracker {
    #[allow(missing_docs)]
    pub fn builder() -> EyeTrackerBuilder {
        EyeTrackerBuilder::default()
    }

    /// Run `op` against the backend, or fail if there is none.
    fn with_backend<T>(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&mut dyn GazeBackend, &mut TrackerContext) -> Result<T>,
    ) -> Result<T> {
        let backend = self
            .backend
            .as_deref_mut()
            .ok_or(TrackerError::TrackerNotConfigured(op))?;
        let mut ctx = TrackerContext {
            config: &self.config,
            session: &mut self.session,
            presentation: &mut self.presentation,
        };
        f(backend, &mut ctx)
    }

    fn require_backend(&self, op: &'static str) -> Result<()> {
        match self.backend {
            Some(_) => Ok(()),
            None => Err(TrackerError::TrackerNotConfigured(op)),
        }
    }

    #[allow(missing_docs)]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Reconfigure between blocks. Every setter validates again.
    pub fn config_mut(&mut self) -> &mut TrackerConfig {
        &mut self.config
    }

    #[allow(missing_docs)]
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Name of the active device, `None` after shutdown.
    pub fn device_name(&self) -> Option<&'static str> {
        self.backend.as_ref().map(|b| b.name())
    }

    /// The warnings logged since the last call.
    pub fn take_warnings(&mut self) -> Vec<TrackerWarning> {
        self.session.take_warnings()
    }

    /// Connect to and configure the device.
    pub fn initialize(&mut self, options: InitOptions) -> Result<()> {
        self.with_backend("initialize", |b, ctx| b.initialize(ctx, options))
    }

    /// Calibrate with the participant.
    pub fn calibrate(&mut self) -> Result<CalibrationOutcome> {
        self.with_backend("calibrate", |b, ctx| b.calibrate(ctx))
    }

    /// Write the latest calibration to the output folder, where the device
    /// supports it.
    pub fn save_calibration(&mut self) -> Result<Option<PathBuf>> {
        self.with_backend("save_calibration", |b, ctx| b.save_calibration(ctx))
    }

    /// A fresh sample, never cached.
    pub fn last_sample(&mut self) -> Result<SampleFrame> {
        self.with_backend("last_sample", |b, ctx| b.last_sample(ctx))
    }

    /// Start a raw data file, closing an open one first. The file counter
    /// only moves when the device actually opened a file.
    pub fn open_file(&mut self, name: Option<&str>) -> Result<Option<PathBuf>> {
        self.require_backend("open_file")?;
        if self.session.file_open {
            self.session.warn(TrackerWarning::FileState(
                "closed open file before opening a new file".to_owned(),
            ));
            self.close_file()?;
        }

        let opened = self.with_backend("open_file", |b, ctx| b.open_file(ctx, name))?;
        if let Some(path) = &opened {
            self.session.raw_file_count += 1;
            self.session.file_open = true;
            self.session.current_file = Some(path.clone());
        }
        Ok(opened)
    }

    /// Close the raw data file. Closing when nothing is open only warns.
    pub fn close_file(&mut self) -> Result<()> {
        self.require_backend("close_file")?;
        if !self.session.file_open {
            self.session
                .warn(TrackerWarning::FileState("no file to close, moving on".to_owned()));
            return Ok(());
        }
        self.with_backend("close_file", |b, ctx| b.close_file(ctx))?;
        self.session.file_open = false;
        self.session.current_file = None;
        Ok(())
    }

    #[allow(missing_docs)]
    pub fn start_collecting(&mut self) -> Result<()> {
        self.with_backend("start_collecting", |b, ctx| b.start_collecting(ctx))?;
        self.session.recording_active = true;
        Ok(())
    }

    #[allow(missing_docs)]
    pub fn stop_collecting(&mut self) -> Result<()> {
        self.with_backend("stop_collecting", |b, ctx| b.stop_collecting(ctx))?;
        self.session.recording_active = false;
        Ok(())
    }

    /// Put a marker into the data stream. Some devices block briefly here.
    pub fn comment(&mut self, text: &str) -> Result<()> {
        self.with_backend("comment", |b, ctx| b.comment(ctx, text))
    }

    /// Close the open file, finalise the device's files and release the
    /// device. Every later call fails with
    /// [TrackerError::TrackerNotConfigured].
    pub fn shutdown(&mut self) -> Result<()> {
        self.require_backend("shutdown")?;
        if self.session.file_open {
            self.close_file()?;
        }
        self.with_backend("shutdown", |b, ctx| b.shutdown(ctx))?;
        self.session.recording_active = false;
        self.backend = None;
        info!(
            "session ended after {} calibration(s) and {} raw data file(s)",
            self.session.calibration_count, self.session.raw_file_count
        );
        Ok(())
    }

    /// True if the current gaze is within the fixation window around
    /// `target`.
    pub fn gaze_in_fixation_window(&mut self, target: Point) -> Result<bool> {
        let frame = self.last_sample()?;
        Ok(gaze_in_window(
            &frame,
            self.config.sample_mode(),
            target,
            self.config.fixation_window(),
        ))
    }

    /// Show `stimuli` (or the configured fixation stimuli, or a target at the
    /// centre) until the participant has looked at the centre for
    /// `min_duration` seconds without interruption. Returns false if that
    /// does not happen within `timeout` seconds. Both default to the
    /// configured values.
    pub fn wait_for_fixation(
        &mut self,
        min_duration: Option<f64>,
        timeout: Option<f64>,
        stimuli: Option<&[&dyn Stimulus]>,
    ) -> Result<bool> {
        let min_duration = min_duration.unwrap_or(self.config.min_fixation_duration());
        let timeout = timeout.unwrap_or(self.config.fixation_timeout());
        if timeout < min_duration {
            return invalid("fixation timeout should be longer than minimum fixation duration");
        }
        self.require_backend("wait_for_fixation")?;

        let centre = FixationTarget::default();
        let clock = Arc::clone(&self.presentation.clock);
        let mut wait = FixationWait::new(clock.now(), min_duration, timeout);

        loop {
            let surface = self.presentation.surface.as_mut();
            match stimuli {
                Some(stimuli) => stimuli.iter().for_each(|s| s.draw(surface)),
                None if !self.fixation_stimuli.is_empty() => {
                    self.fixation_stimuli.iter().for_each(|s| s.draw(surface))
                }
                None => centre.draw(surface),
            }
            surface.flip()?;

            let now = clock.now();
            let fixated = self.gaze_in_fixation_window(Point::ORIGIN)?;
            if let Some(fixation) = wait.poll(now, fixated) {
                return Ok(fixation);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::precision::DEFAULT_ARTIFACT;
    use crate::dummy_tracker::{
        LinkLog, Participant, ScriptedPointer, SimulatedLink, SimulatedVectorDriver,
    };
    use crate::headless::{FrameLog, HeadlessSurface, ScriptedKeyboard, SimClock};
    use crate::presentation::{Clock, Key};
    use crate::raw_file::BACKUP_DIR;
    use crate::sample::{Channel, Eye};
    use std::{fs, path::Path};
    use tempfile::tempdir;

    struct Rig {
        clock: Arc<SimClock>,
        frames: FrameLog,
        participant: Participant,
    }

    fn rig(keys: &[Key]) -> (Rig, Presentation) {
        let clock = Arc::new(SimClock::default());
        let participant = Participant::new();
        let surface = HeadlessSurface::new(Arc::clone(&clock)).followed_by(participant.clone());
        let frames = surface.frames();
        let presentation = Presentation::new(
            Box::new(surface),
            Box::new(ScriptedKeyboard::new(keys.iter().copied())),
            clock.clone(),
        );
        let rig = Rig {
            clock,
            frames,
            participant,
        };
        (rig, presentation)
    }

    fn config(eyes: &[bool], mode: &str, folder: Option<&Path>) -> TrackerConfig {
        let mut config = TrackerConfig::new(eyes, 2.0, 0.2, 3.0, mode).unwrap();
        config.set_output_path(folder, Some("p01")).unwrap();
        config
    }

    fn pointer_tracker(at: Point) -> (Rig, EyeTracker) {
        let (rig, presentation) = rig(&[]);
        let clock: Arc<dyn Clock> = rig.clock.clone();
        let tracker = EyeTracker::builder()
            .config(config(&[true, false], "left", None))
            .device("pointer")
            .presentation(presentation)
            .pointer(Box::new(ScriptedPointer::fixed(clock, at)))
            .build()
            .unwrap();
        (rig, tracker)
    }

    fn vector_tracker(
        keys: &[Key],
        eyes: &[bool],
        folder: Option<&Path>,
        settings: CalibrationSettings,
    ) -> (Rig, EyeTracker) {
        let (rig, presentation) = rig(keys);
        let clock: Arc<dyn Clock> = rig.clock.clone();
        let tracker = EyeTracker::builder()
            .config(config(eyes, "average", folder))
            .device("vector")
            .presentation(presentation)
            .vector_driver(Box::new(SimulatedVectorDriver::new(
                clock,
                rig.participant.clone(),
            )))
            .calibration_settings(settings)
            .seed(7)
            .build()
            .unwrap();
        (rig, tracker)
    }

    fn precision_tracker(work_dir: &Path, folder: Option<&Path>) -> (EyeTracker, LinkLog) {
        let (rig, presentation) = rig(&[]);
        let link = SimulatedLink::new(rig.participant, (1920, 1080), 0.025);
        let log = link.log();
        let tracker = EyeTracker::builder()
            .config(config(&[true, true], "both", folder))
            .device("precision")
            .presentation(presentation)
            .precision_link(Box::new(link))
            .work_dir(work_dir)
            .build()
            .unwrap();
        (tracker, log)
    }

    fn quick_settings() -> CalibrationSettings {
        CalibrationSettings {
            target_timeout: 2.0,
            ..CalibrationSettings::default()
        }
    }

    #[test]
    fn pointer_at_centre_is_a_fixation() {
        let (rig, mut tracker) = pointer_tracker(Point::ORIGIN);
        tracker.initialize(InitOptions::Default).unwrap();
        assert!(tracker.gaze_in_fixation_window(Point::ORIGIN).unwrap());

        let start = rig.clock.peek();
        assert!(tracker.wait_for_fixation(None, None, None).unwrap());
        let elapsed = rig.clock.peek() - start;
        assert!(elapsed >= 0.2 && elapsed < 3.0);
    }

    #[test]
    fn pointer_outside_the_window_times_out() {
        let (rig, mut tracker) = pointer_tracker(Point::new(2.0, 2.0));
        tracker.initialize(InitOptions::Default).unwrap();
        assert!(!tracker.gaze_in_fixation_window(Point::ORIGIN).unwrap());

        let start = rig.clock.peek();
        assert!(!tracker.wait_for_fixation(None, None, None).unwrap());
        assert!(rig.clock.peek() - start >= 3.0);
    }

    #[test]
    fn fixation_wait_draws_the_given_stimuli() {
        let (rig, mut tracker) = pointer_tracker(Point::ORIGIN);
        let off_centre = FixationTarget::at(Point::new(3.0, 0.0));
        assert!(tracker
            .wait_for_fixation(Some(0.1), Some(1.0), Some(&[&off_centre]))
            .unwrap());
        let frames = rig.frames.lock().unwrap();
        assert!(!frames.is_empty());
        assert!(frames.iter().all(|f| f.targets == vec![Point::new(3.0, 0.0)]));
    }

    #[test]
    fn fixation_completed_on_the_last_poll_counts() {
        // Only flips move this clock, so polls land on multiples of 1/60 s
        let clock = Arc::new(SimClock::new(0.0));
        let surface = HeadlessSurface::new(Arc::clone(&clock));
        let presentation = Presentation::new(
            Box::new(surface),
            Box::new(ScriptedKeyboard::default()),
            clock.clone(),
        );
        let pointer_clock: Arc<dyn Clock> = clock.clone();
        let mut tracker = EyeTracker::builder()
            .config(config(&[true, false], "left", None))
            .device("pointer")
            .presentation(presentation)
            .pointer(Box::new(ScriptedPointer::fixed(pointer_clock, Point::ORIGIN)))
            .build()
            .unwrap();

        // The fixation starts on the first poll and reaches 0.09 s on the
        // seventh, which is also the first poll past the 0.11 s deadline.
        assert!(tracker.wait_for_fixation(Some(0.09), Some(0.11), None).unwrap());
        assert!((clock.peek() - 7.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn fixation_wait_rejects_timeout_below_min_duration() {
        let (_rig, mut tracker) = pointer_tracker(Point::ORIGIN);
        assert!(matches!(
            tracker.wait_for_fixation(Some(1.0), Some(0.5), None),
            Err(TrackerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn pointer_calibration_only_counts() {
        let (_rig, mut tracker) = pointer_tracker(Point::ORIGIN);
        assert!(tracker.calibrate().unwrap().is_calibrated());
        assert!(tracker.calibrate().unwrap().is_calibrated());
        assert_eq!(tracker.session().calibration_count, 2);
        assert_eq!(tracker.open_file(Some("block1")).unwrap(), None);
        assert_eq!(tracker.session().raw_file_count, 0);
    }

    #[test]
    fn building_without_a_device_is_not_configured() {
        let (_, presentation) = rig(&[]);
        let built = EyeTracker::builder()
            .config(config(&[true, false], "left", None))
            .presentation(presentation)
            .build();
        assert!(matches!(built, Err(TrackerError::TrackerNotConfigured(_))));

        let (_, presentation) = rig(&[]);
        let built = EyeTracker::builder()
            .config(config(&[true, false], "left", None))
            .device("vector")
            .presentation(presentation)
            .build();
        assert!(matches!(built, Err(TrackerError::InvalidConfig(_))));
    }

    #[test]
    fn operations_after_shutdown_are_not_configured() {
        let (_rig, mut tracker) = pointer_tracker(Point::ORIGIN);
        tracker.shutdown().unwrap();
        assert_eq!(tracker.device_name(), None);
        assert!(matches!(
            tracker.calibrate(),
            Err(TrackerError::TrackerNotConfigured("calibrate"))
        ));
        assert!(matches!(
            tracker.last_sample(),
            Err(TrackerError::TrackerNotConfigured(_))
        ));
        assert!(matches!(
            tracker.wait_for_fixation(None, None, None),
            Err(TrackerError::TrackerNotConfigured(_))
        ));
        assert!(matches!(
            tracker.shutdown(),
            Err(TrackerError::TrackerNotConfigured(_))
        ));
    }

    #[test]
    fn opening_over_an_open_file_closes_it_first() {
        let dir = tempdir().unwrap();
        let (_rig, mut tracker) =
            vector_tracker(&[], &[true, true], Some(dir.path()), quick_settings());
        tracker.initialize(InitOptions::Default).unwrap();

        let first = tracker.open_file(Some("block1")).unwrap().unwrap();
        assert_eq!(first, dir.path().join("block1.csv"));
        tracker.take_warnings();

        let second = tracker.open_file(None).unwrap().unwrap();
        assert_eq!(second, dir.path().join("raw_2.csv"));
        assert_eq!(tracker.session().raw_file_count, 2);
        assert!(tracker.session().file_open);
        assert!(tracker
            .take_warnings()
            .iter()
            .any(|w| matches!(w, TrackerWarning::FileState(_))));

        let first_text = fs::read_to_string(&first).unwrap();
        assert!(first_text.starts_with("time,left_vx,left_vy,right_vx,right_vy,comment"));
    }

    #[test]
    fn closing_twice_only_warns() {
        let dir = tempdir().unwrap();
        let (_rig, mut tracker) =
            vector_tracker(&[], &[true, true], Some(dir.path()), quick_settings());
        tracker.initialize(InitOptions::Default).unwrap();
        tracker.open_file(None).unwrap();
        tracker.start_collecting().unwrap();
        tracker.comment("trial 1").unwrap();
        tracker.stop_collecting().unwrap();

        tracker.close_file().unwrap();
        tracker.take_warnings();
        tracker.close_file().unwrap();
        assert!(!tracker.session().file_open);
        assert_eq!(
            tracker.take_warnings(),
            vec![TrackerWarning::FileState("no file to close, moving on".to_owned())]
        );

        let text = fs::read_to_string(dir.path().join("raw_1.csv")).unwrap();
        assert!(text.contains("trial 1"));
    }

    #[test]
    fn comments_wait_for_the_next_sample() {
        let dir = tempdir().unwrap();
        let (rig, mut tracker) =
            vector_tracker(&[], &[true, true], Some(dir.path()), quick_settings());
        tracker.initialize(InitOptions::Default).unwrap();

        // No file open: dropped without blocking
        let before = rig.clock.peek();
        tracker.comment("dropped").unwrap();
        assert_eq!(rig.clock.peek(), before);

        tracker.open_file(None).unwrap();
        tracker.start_collecting().unwrap();
        let sample_period = 1.0 / 500.0;
        for text in ["first", "second"] {
            let before = rig.clock.peek();
            tracker.comment(text).unwrap();
            let blocked = rig.clock.peek() - before;
            assert!(
                blocked >= 1.5 * sample_period - 1e-9 && blocked < 2.5 * sample_period,
                "comment {:?} blocked for {} s",
                text,
                blocked
            );
        }
        tracker.stop_collecting().unwrap();
        tracker.close_file().unwrap();

        let text = fs::read_to_string(dir.path().join("raw_1.csv")).unwrap();
        let row = |comment: &str| {
            text.lines()
                .position(|line| line.rsplit(',').next() == Some(comment))
                .unwrap_or_else(|| panic!("no row for {:?} in\n{}", comment, text))
        };
        assert!(row("first") < row("second"));
        assert!(!text.contains("dropped"));
    }

    #[test]
    fn no_files_without_storage() {
        let (_rig, mut tracker) = vector_tracker(&[], &[true, true], None, quick_settings());
        tracker.initialize(InitOptions::Default).unwrap();
        assert_eq!(tracker.open_file(Some("block1")).unwrap(), None);
        assert_eq!(tracker.session().raw_file_count, 0);
        assert!(!tracker.session().file_open);
    }

    #[test]
    fn vector_calibration_maps_gaze() {
        let dir = tempdir().unwrap();
        let (rig, mut tracker) =
            vector_tracker(&[], &[true, true], Some(dir.path()), quick_settings());
        tracker.initialize(InitOptions::Default).unwrap();

        let report = match tracker.calibrate().unwrap() {
            CalibrationOutcome::Calibrated(report) => report,
            CalibrationOutcome::Redo { attempts } => panic!("redo after {} attempts", attempts),
        };
        assert_eq!(report.index, 1);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(tracker.session().calibration_count, 1);

        let saved = fs::read_to_string(dir.path().join("calibration_1.json")).unwrap();
        let saved: serde_json::Value = serde_json::from_str(&saved).unwrap();
        assert!(saved.get("left").is_some());
        assert!(saved.get("right").is_some());

        let target = Point::new(3.0, -2.0);
        rig.participant.look_at(target);
        let frame = tracker.last_sample().unwrap();
        let gaze = frame.get(Channel::Average).unwrap();
        assert!(gaze.abs_dist(&target) < 0.5, "gaze {} for target {}", gaze, target);
        assert!(tracker.gaze_in_fixation_window(target).unwrap());
    }

    #[test]
    fn a_lost_eye_asks_for_a_redo() {
        let dir = tempdir().unwrap();
        let (rig, mut tracker) = vector_tracker(
            &[Key::Char('q')],
            &[true, true],
            Some(dir.path()),
            quick_settings(),
        );
        rig.participant.lose_eye(Eye::Right);
        tracker.initialize(InitOptions::Default).unwrap();

        let outcome = tracker.calibrate().unwrap();
        assert_eq!(outcome, CalibrationOutcome::Redo { attempts: 1 });
        assert_eq!(tracker.session().calibration_count, 0);
        assert!(!dir.path().join("calibration_1.json").exists());

        let warnings = tracker.take_warnings();
        assert!(warnings.contains(&TrackerWarning::CalibrationInsufficientData {
            eye: Eye::Right,
            valid_points: 0
        }));
        assert!(warnings.iter().any(|w| matches!(
            w,
            TrackerWarning::DeviceTimeout {
                eye: Eye::Right,
                ..
            }
        )));
        assert!(!warnings.iter().any(|w| matches!(
            w,
            TrackerWarning::DeviceTimeout { eye: Eye::Left, .. }
        )));
        assert!(rig
            .frames
            .lock()
            .unwrap()
            .iter()
            .any(|f| f.texts.iter().any(|t| t.contains("SPACE"))));
    }

    #[test]
    fn redo_attempts_are_bounded() {
        let settings = CalibrationSettings {
            max_attempts: 2,
            ..quick_settings()
        };
        let (rig, mut tracker) = vector_tracker(&[Key::Space; 5], &[true, false], None, settings);
        rig.participant.lose_eye(Eye::Left);
        tracker.initialize(InitOptions::Default).unwrap();

        assert_eq!(
            tracker.calibrate().unwrap(),
            CalibrationOutcome::Redo { attempts: 2 }
        );
        assert!(tracker
            .take_warnings()
            .iter()
            .any(|w| matches!(w, TrackerWarning::Notice(n) if n.contains("gave up"))));
    }

    #[test]
    fn precision_session_stores_the_artifact() {
        let work_dir = tempdir().unwrap();
        let out_dir = tempdir().unwrap();
        fs::write(work_dir.path().join(DEFAULT_ARTIFACT), b"last session").unwrap();

        let (mut tracker, log) = precision_tracker(work_dir.path(), Some(out_dir.path()));
        tracker.initialize(InitOptions::Default).unwrap();

        let backups: Vec<_> = fs::read_dir(work_dir.path().join(BACKUP_DIR))
            .unwrap()
            .collect();
        assert_eq!(backups.len(), 1);

        assert!(tracker.calibrate().unwrap().is_calibrated());
        tracker.start_collecting().unwrap();
        tracker.comment("trial 1").unwrap();
        let frame = tracker.last_sample().unwrap();
        assert!(frame.get(Channel::Left).unwrap().abs_dist(&Point::ORIGIN) < 0.05);
        tracker.shutdown().unwrap();

        let log = log.lock().unwrap();
        assert!(log.contains(&"SETUP".to_owned()));
        assert!(log.contains(&"MSG calibration 1".to_owned()));
        assert!(log.contains(&"RECORDING true".to_owned()));
        assert_eq!(log.last(), Some(&"DISCONNECT".to_owned()));

        assert!(!work_dir.path().join(DEFAULT_ARTIFACT).exists());
        let stored = fs::read_to_string(out_dir.path().join("p01.EDF")).unwrap();
        assert!(stored.contains("MSG trial 1"));
    }

    #[test]
    fn precision_artifact_is_removed_without_storage() {
        let work_dir = tempdir().unwrap();
        let (mut tracker, _log) = precision_tracker(work_dir.path(), None);
        tracker.initialize(InitOptions::Default).unwrap();
        assert!(work_dir.path().join(DEFAULT_ARTIFACT).exists());
        tracker.shutdown().unwrap();
        assert!(!work_dir.path().join(DEFAULT_ARTIFACT).exists());
    }

    #[test]
    fn precision_calibration_area_is_configured() {
        let work_dir = tempdir().unwrap();
        let (mut tracker, log) = precision_tracker(work_dir.path(), None);
        assert!(matches!(
            tracker.initialize(InitOptions::CalibrationScale(1.2, 0.5)),
            Err(TrackerError::InvalidConfig(_))
        ));
        assert!(log.lock().unwrap().is_empty());

        tracker
            .initialize(InitOptions::CalibrationScale(0.8, 0.7))
            .unwrap();
        assert!(log
            .lock()
            .unwrap()
            .contains(&"CMD calibration_area_proportion 0.80 0.70".to_owned()));
    }
}
