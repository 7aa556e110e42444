//! Backend for camera trackers that report raw pupil-to-glint vectors and
//! leave calibration to the host.
//!
//! Calibration shows each target in turn and waits for a stable vector per
//! eye; see [crate::calibration] for the acquisition test and the fit.

use super::{CalibrationOutcome, CalibrationReport, GazeBackend, InitOptions, TrackerContext};
use crate::calibration::{
    acquire_fixation, evaluate_pass, CalibrationResult, CalibrationSample, CalibrationSettings,
    CalibrationTransform, PassVerdict,
};
use crate::error::{invalid, Result, TrackerError, TrackerWarning};
use crate::presentation::{FixationTarget, Key};
use crate::raw_file::{calibration_path, next_calibration_index, resolve_raw_name};
use crate::sample::{Channel, Eye, SampleFrame, SampleMode, TrackedEyes};
use crate::targets::CalibrationTargets;
use crate::Point;

use log::{debug, info};
use rand::{rngs::StdRng, SeedableRng};
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

const REDO_PROMPT: &str =
    "not enough fixations detected\n\nadjust eye-tracker?\n\n    press  [ SPACE ]\nto redo calibration";

/// What the driver streams: raw camera measurements, or gaze through the
/// installed calibration.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultMode {
    Raw,
    Calibrated,
}

/// Camera settings as reported by the driver.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
    /// Samples per second
    pub sample_rate: f64,
    pub offset_x: i32,
    pub offset_y: i32,
}

/// One eye's part of a driver sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeReading {
    /// Pupil-to-glint vector, camera pixels
    pub vector: Point,
    /// Glint position, camera pixels
    pub glint: Point,
    /// Gaze position in degrees, only meaningful in calibrated mode
    pub gaze: Point,
    /// The camera found this eye
    pub tracked: bool,
}

impl EyeReading {
    /// A reading for an eye the camera lost.
    pub const LOST: EyeReading = EyeReading {
        vector: Point::NAN,
        glint: Point::NAN,
        gaze: Point::NAN,
        tracked: false,
    };
}

/// One sample from the driver's buffer.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub left: EyeReading,
    pub right: EyeReading,
}

impl RawSample {
    #[allow(missing_docs)]
    pub fn eye(&self, eye: Eye) -> &EyeReading {
        match eye {
            Eye::Left => &self.left,
            Eye::Right => &self.right,
        }
    }
}

/// The calls the tracker makes into the vendor library.
pub trait VectorDriver {
    /// Open the device.
    fn init(&mut self) -> Result<()>;

    #[allow(missing_docs)]
    fn set_result_mode(&mut self, mode: ResultMode) -> Result<()>;

    /// Start buffering samples in the library.
    fn start_tracking(&mut self) -> Result<()>;

    /// Stop buffering samples in the library.
    fn stop_tracking(&mut self) -> Result<()>;

    /// Enable or disable each eye.
    fn set_tracking(&mut self, left: bool, right: bool) -> Result<()>;

    #[allow(missing_docs)]
    fn capture_config(&mut self) -> Result<CaptureConfig>;

    /// Up to `count` of the most recent buffered samples, oldest first.
    fn buffered_samples(&mut self, count: usize) -> Result<Vec<RawSample>>;

    #[allow(missing_docs)]
    fn clear_buffer(&mut self) -> Result<()>;

    /// The newest sample.
    fn last_result(&mut self) -> Result<RawSample>;

    /// Install a transform used in [ResultMode::Calibrated].
    fn set_calibration(&mut self, eye: Eye, transform: &CalibrationTransform) -> Result<()>;

    /// Start writing samples to `path`.
    fn open_data_file(&mut self, path: &Path) -> Result<()>;

    #[allow(missing_docs)]
    fn close_data_file(&mut self) -> Result<()>;

    /// Attach `text` to the next sample written to the data file.
    fn set_comment(&mut self, text: &str) -> Result<()>;

    /// Release the device.
    fn close(&mut self) -> Result<()>;
}

/// Builds a [SampleFrame] from a calibrated driver sample. Untracked eyes
/// report [Point::NAN]; the average covers the tracked eyes and is absent
/// when there are none.
pub fn frame_from_result(result: &RawSample, eyes: TrackedEyes, mode: SampleMode) -> SampleFrame {
    let mut frame = SampleFrame::default();
    let wants = |eye: Eye| match mode {
        SampleMode::Both | SampleMode::Average => true,
        SampleMode::Left => eye == Eye::Left,
        SampleMode::Right => eye == Eye::Right,
    };

    let mut tracked = Vec::new();
    for eye in eyes.iter().filter(|&eye| wants(eye)) {
        let reading = result.eye(eye);
        if reading.tracked {
            frame.insert(eye.into(), reading.gaze);
            tracked.push(reading.gaze);
        } else {
            frame.insert(eye.into(), Point::NAN);
        }
    }

    if mode == SampleMode::Average && !tracked.is_empty() {
        let n = tracked.len() as f64;
        let x = tracked.iter().map(|p| p.x).sum::<f64>() / n;
        let y = tracked.iter().map(|p| p.y).sum::<f64>() / n;
        frame.insert(Channel::Average, Point::new(x, y));
    }
    frame
}

type PassSamples = BTreeMap<Eye, Vec<Option<CalibrationSample>>>;

/// A tracker driven through a [VectorDriver], calibrated by this crate.
pub struct VectorTracker {
    driver: Box<dyn VectorDriver>,
    settings: CalibrationSettings,
    targets: Option<CalibrationTargets>,
    capture: Option<CaptureConfig>,
    calibration: Option<CalibrationResult>,
    rng: StdRng,
}

impl VectorTracker {
    #[allow(missing_docs)]
    pub fn new(driver: Box<dyn VectorDriver>) -> Self {
        VectorTracker {
            driver,
            settings: CalibrationSettings::default(),
            targets: None,
            capture: None,
            calibration: None,
            rng: StdRng::from_entropy(),
        }
    }

    /// Replace the calibration timing and tolerances.
    pub fn with_settings(mut self, settings: CalibrationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Fix the target shuffle, for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn capture(&self) -> Result<CaptureConfig> {
        self.capture.ok_or_else(|| {
            TrackerError::Device("vector tracker is not initialized".to_owned())
        })
    }

    /// Present every target in `order` once and collect what each tracked
    /// eye did while looking at it.
    fn run_pass(
        &mut self,
        ctx: &mut TrackerContext,
        order: &[Point],
        window: usize,
    ) -> Result<PassSamples> {
        let eyes = ctx.config.eyes();
        let clock = Arc::clone(&ctx.presentation.clock);
        let mut samples: PassSamples = eyes.iter().map(|eye| (eye, vec![None; order.len()])).collect();

        ctx.presentation.show_text("calibration")?;
        clock.sleep(self.settings.notice_duration);

        for (i, &target) in order.iter().enumerate() {
            ctx.presentation.show(&[&FixationTarget::at(target)])?;
            let t0 = clock.now();

            loop {
                let buffer = self.driver.buffered_samples(window)?;
                let elapsed = clock.now() - t0;

                for eye in eyes.iter() {
                    let Some(slot) = samples.get_mut(&eye).map(|slots| &mut slots[i]) else {
                        continue;
                    };
                    if slot.is_some() {
                        continue;
                    }
                    if let Some(sample) =
                        acquire_fixation(&buffer, eye, window, elapsed, &self.settings)
                    {
                        info!("fixation #{} {}: found valid fixation for {} eye", i + 1, target, eye);
                        *slot = Some(sample);
                    }
                }

                let acquired = |eye: Eye| samples.get(&eye).map_or(false, |s| s[i].is_some());
                if eyes.iter().all(|eye| acquired(eye)) {
                    ctx.presentation.surface.flip()?;
                    break;
                }

                if elapsed > self.settings.target_timeout {
                    let missing: Vec<Eye> = eyes.iter().filter(|&eye| !acquired(eye)).collect();
                    for eye in missing {
                        ctx.session.warn(TrackerWarning::DeviceTimeout {
                            target_index: i + 1,
                            target,
                            eye,
                        });
                    }
                    break;
                }
            }
        }

        self.driver.clear_buffer()?;
        Ok(samples)
    }

    /// Hand a fitted result to the driver and record it on the session.
    fn install(
        &mut self,
        ctx: &mut TrackerContext,
        result: CalibrationResult,
    ) -> Result<CalibrationOutcome> {
        for (eye, transform) in &result {
            self.driver.set_calibration(*eye, transform)?;
        }
        self.driver.set_result_mode(ResultMode::Calibrated)?;

        let index = match ctx.config.output() {
            Some(output) => next_calibration_index(&output.folder, ctx.session.calibration_count)?,
            None => ctx.session.calibration_count + 1,
        };
        ctx.session.calibration_count = index;

        let errors = result.iter().map(|(eye, t)| (*eye, t.rms_error)).collect();
        self.calibration = Some(result);

        self.comment(ctx, &format!("calibration {}", index))?;
        if ctx.config.storage_enabled() {
            self.save_calibration(ctx)?;
        }
        Ok(CalibrationOutcome::Calibrated(CalibrationReport { index, errors }))
    }
}

impl GazeBackend for VectorTracker {
    fn name(&self) -> &'static str {
        "vector"
    }

    fn raw_extension(&self) -> &'static str {
        "csv"
    }

    fn initialize(&mut self, ctx: &mut TrackerContext, options: InitOptions) -> Result<()> {
        match options {
            InitOptions::Default => {}
            InitOptions::Targets(targets) => self.targets = Some(targets),
            InitOptions::CalibrationScale(..) => {
                return invalid("the vector tracker does not take a calibration scale")
            }
        }

        let [left, right] = ctx.config.eyes().flags();
        self.driver.init()?;
        self.driver.set_result_mode(ResultMode::Raw)?;
        self.driver.start_tracking()?;
        self.driver.set_tracking(left, right)?;

        let capture = self.driver.capture_config()?;
        if !(capture.sample_rate.is_finite() && capture.sample_rate > 0.0) {
            return Err(TrackerError::Device(format!(
                "driver reports a sample rate of {}",
                capture.sample_rate
            )));
        }
        info!(
            "vector tracker initialized: {}x{} at {} Hz",
            capture.width, capture.height, capture.sample_rate
        );
        self.capture = Some(capture);
        Ok(())
    }

    fn calibrate(&mut self, ctx: &mut TrackerContext) -> Result<CalibrationOutcome> {
        let capture = self.capture()?;
        let eyes = ctx.config.eyes();
        let [left, right] = eyes.flags();
        self.driver.set_result_mode(ResultMode::Raw)?;
        self.driver.set_tracking(left, right)?;

        let window = self.settings.window_samples(capture.sample_rate);
        let targets = self
            .targets
            .clone()
            .unwrap_or_else(|| ctx.config.targets().clone());
        let view_distance = ctx.presentation.surface.view_distance();
        let max_attempts = self.settings.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let order = targets.presentation_order(&mut self.rng);
            let samples = self.run_pass(ctx, &order, window)?;

            match evaluate_pass(&order, &samples, eyes, view_distance) {
                PassVerdict::Fitted(result) => return self.install(ctx, result),
                PassVerdict::Redo(shortfalls) => {
                    for warning in shortfalls {
                        ctx.session.warn(warning);
                    }
                    if attempt == max_attempts {
                        break;
                    }
                    ctx.presentation.show_text(REDO_PROMPT)?;
                    let key = ctx
                        .presentation
                        .keyboard
                        .wait_keys(&[Key::Space, Key::Char('q')])?;
                    if key == Key::Char('q') {
                        info!("calibration abandoned after {} attempt(s)", attempt);
                        return Ok(CalibrationOutcome::Redo { attempts: attempt });
                    }
                }
            }
        }

        ctx.session.warn(TrackerWarning::Notice(format!(
            "calibration gave up after {} attempts",
            max_attempts
        )));
        Ok(CalibrationOutcome::Redo {
            attempts: max_attempts,
        })
    }

    fn save_calibration(&mut self, ctx: &mut TrackerContext) -> Result<Option<PathBuf>> {
        let Some(result) = &self.calibration else {
            ctx.session
                .warn(TrackerWarning::Notice("no calibration to save yet".to_owned()));
            return Ok(None);
        };
        let Some(output) = ctx.config.output() else {
            debug!("storage disabled, not saving calibration");
            return Ok(None);
        };

        let path = calibration_path(&output.folder, ctx.session.calibration_count);
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, result)?;
        writer.flush()?;
        info!("saved calibration to {}", path.display());
        Ok(Some(path))
    }

    fn last_sample(&mut self, ctx: &mut TrackerContext) -> Result<SampleFrame> {
        let result = self.driver.last_result()?;
        Ok(frame_from_result(
            &result,
            ctx.config.eyes(),
            ctx.config.sample_mode(),
        ))
    }

    fn open_file(
        &mut self,
        ctx: &mut TrackerContext,
        name: Option<&str>,
    ) -> Result<Option<PathBuf>> {
        let Some(output) = ctx.config.output() else {
            ctx.session.warn(TrackerWarning::Notice(
                "storage disabled, not opening a data file".to_owned(),
            ));
            return Ok(None);
        };

        let resolved = resolve_raw_name(
            &output.folder,
            name,
            self.raw_extension(),
            ctx.session.raw_file_count,
        )?;
        for notice in resolved.notices {
            ctx.session.warn(notice);
        }

        let path = output.folder.join(resolved.file_name);
        self.driver.open_data_file(&path)?;
        info!("recording raw data to {}", path.display());
        Ok(Some(path))
    }

    fn close_file(&mut self, _ctx: &mut TrackerContext) -> Result<()> {
        self.driver.close_data_file()
    }

    fn start_collecting(&mut self, _ctx: &mut TrackerContext) -> Result<()> {
        self.driver.start_tracking()
    }

    fn stop_collecting(&mut self, _ctx: &mut TrackerContext) -> Result<()> {
        self.driver.stop_tracking()
    }

    /// Only written while a file is open. Blocks for 1.5 sample periods so
    /// the next comment lands on a later sample.
    fn comment(&mut self, ctx: &mut TrackerContext, text: &str) -> Result<()> {
        if !ctx.session.file_open {
            debug!("no data file open, dropping comment {:?}", text);
            return Ok(());
        }
        let capture = self.capture()?;
        self.driver.set_comment(text)?;
        ctx.presentation.clock.sleep(1.5 / capture.sample_rate);
        Ok(())
    }

    fn shutdown(&mut self, _ctx: &mut TrackerContext) -> Result<()> {
        self.driver.stop_tracking()?;
        self.driver.close()?;
        info!("vector tracker closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(x: f64, y: f64, tracked: bool) -> EyeReading {
        EyeReading {
            vector: Point::ORIGIN,
            glint: Point::ORIGIN,
            gaze: Point::new(x, y),
            tracked,
        }
    }

    #[test]
    fn frames_report_tracked_eyes() {
        let result = RawSample {
            left: reading(1.0, 2.0, true),
            right: reading(3.0, 4.0, true),
        };
        let both = TrackedEyes::from_flags(&[true, true]).unwrap();

        let frame = frame_from_result(&result, both, SampleMode::Both);
        assert_eq!(frame.get(Channel::Left), Some(Point::new(1.0, 2.0)));
        assert_eq!(frame.get(Channel::Right), Some(Point::new(3.0, 4.0)));

        let frame = frame_from_result(&result, both, SampleMode::Average);
        assert_eq!(frame.get(Channel::Average), Some(Point::new(2.0, 3.0)));

        let frame = frame_from_result(&result, both, SampleMode::Right);
        assert_eq!(frame.get(Channel::Left), None);
    }

    #[test]
    fn lost_eyes_are_nan_and_left_out_of_the_average() {
        let result = RawSample {
            left: reading(1.0, 2.0, true),
            right: EyeReading::LOST,
        };
        let both = TrackedEyes::from_flags(&[true, true]).unwrap();
        let frame = frame_from_result(&result, both, SampleMode::Average);
        assert!(frame.get(Channel::Right).unwrap().is_nan());
        assert_eq!(frame.get(Channel::Average), Some(Point::new(1.0, 2.0)));

        let result = RawSample {
            left: EyeReading::LOST,
            right: EyeReading::LOST,
        };
        let frame = frame_from_result(&result, both, SampleMode::Average);
        assert_eq!(frame.get(Channel::Average), None);
    }

    #[test]
    fn untracked_eyes_are_not_reported() {
        let result = RawSample {
            left: reading(1.0, 2.0, true),
            right: reading(3.0, 4.0, true),
        };
        let left_only = TrackedEyes::from_flags(&[true, false]).unwrap();
        let frame = frame_from_result(&result, left_only, SampleMode::Both);
        assert_eq!(frame.get(Channel::Right), None);
    }
}
