//! Backend for trackers that run their own calibration screen and write
//! their own data file, reached through a vendor runtime.
//!
//! The runtime always records into `et_data.EDF` in the working directory.
//! That file is moved out of the way before a session starts and renamed to
//! the configured output when it ends, so no session can clobber another's
//! data.

use super::{CalibrationOutcome, CalibrationReport, GazeBackend, InitOptions, TrackerContext};
use crate::config::{Palette, TrackerConfig};
use crate::error::{invalid, Result, TrackerError, TrackerWarning};
use crate::presentation::FixationTarget;
use crate::raw_file::{backup_leftover, move_file};
use crate::sample::{Eye, SampleFrame};
use crate::Point;

use chrono::Local;
use log::{debug, info};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

/// Name of the data file the vendor runtime writes in its working directory.
pub const DEFAULT_ARTIFACT: &str = "et_data.EDF";

/// Vendor runtime command that scales the calibration target area.
pub const CALIBRATION_AREA_COMMAND: &str = "calibration_area_proportion";

/// The calls the tracker makes into the vendor runtime.
pub trait PrecisionLink {
    /// Start the runtime with `config` and connect to the tracker.
    fn connect(&mut self, config: &PrecisionRuntimeConfig, work_dir: &Path) -> Result<()>;

    /// Send a raw command to the tracker host.
    fn send_command(&mut self, command: &str, args: &str) -> Result<()>;

    /// Run the vendor's interactive setup and calibration procedure, and
    /// return whatever it reported.
    fn run_setup(&mut self) -> Result<String>;

    #[allow(missing_docs)]
    fn set_recording(&mut self, recording: bool) -> Result<()>;

    /// Latest gaze position in screen pixels, origin top left, `None` while
    /// the tracker has no valid gaze.
    fn last_gaze(&mut self) -> Option<(f64, f64)>;

    /// Write a message into the data file.
    fn send_message(&mut self, text: &str) -> Result<()>;

    /// Drop the connection and quit the runtime. The data file is complete
    /// once this returns.
    fn disconnect(&mut self) -> Result<()>;
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackEyes {
    Binocular,
    LeftEye,
    RightEye,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalibrationType {
    FivePoints,
    NinePoints,
}

/// Look of the runtime's calibration targets. Sizes in pixels.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetAttributes {
    pub outer_diameter: f64,
    pub inner_diameter: f64,
    pub outer_color: [f64; 3],
    pub inner_color: [f64; 3],
}

/// Calibration screen settings handed to the runtime.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationScreen {
    #[serde(rename = "type")]
    pub kind: CalibrationType,
    pub auto_pace: bool,
    pub pacing_speed: f64,
    pub target_type: String,
    pub screen_background_color: [f64; 3],
    pub target_attributes: TargetAttributes,
}

/// Everything the runtime needs to know to start a session.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrecisionRuntimeConfig {
    pub model_name: String,
    pub sampling_rate: u32,
    pub track_eyes: TrackEyes,
    pub calibration: CalibrationScreen,
}

impl PrecisionRuntimeConfig {
    const BACKGROUND: [f64; 3] = [0.5, 0.5, -1.0];
    const FOREGROUND: [f64; 3] = [-1.0, -1.0, -1.0];

    /// Runtime settings for `config` on a screen where one pixel spans
    /// `deg_per_pix` degrees.
    pub fn from_config(config: &TrackerConfig, deg_per_pix: f64) -> Result<Self> {
        let eyes = config.eyes();
        let track_eyes = if eyes.both() {
            TrackEyes::Binocular
        } else if eyes.contains(Eye::Left) {
            TrackEyes::LeftEye
        } else {
            TrackEyes::RightEye
        };
        let kind = match config.calibration_points() {
            5 => CalibrationType::FivePoints,
            9 => CalibrationType::NinePoints,
            n => return invalid(format!("no runtime calibration type for {} points", n)),
        };
        if !(deg_per_pix.is_finite() && deg_per_pix > 0.0) {
            return invalid("surface reports a non-positive pixel size");
        }

        let Palette { back, both } = config.palette();
        let background = back.unwrap_or(Self::BACKGROUND);
        Ok(PrecisionRuntimeConfig {
            model_name: "EYELINK 1000 DESKTOP".to_owned(),
            sampling_rate: 1000,
            track_eyes,
            calibration: CalibrationScreen {
                kind,
                auto_pace: true,
                pacing_speed: 1.5,
                target_type: "CIRCLE_TARGET".to_owned(),
                screen_background_color: background,
                target_attributes: TargetAttributes {
                    outer_diameter: FixationTarget::OUTER_DIAMETER / deg_per_pix,
                    inner_diameter: FixationTarget::INNER_DIAMETER / deg_per_pix,
                    outer_color: both.unwrap_or(Self::FOREGROUND),
                    inner_color: background,
                },
            },
        })
    }
}

/// Checks a calibration area scale and formats it for the runtime.
fn calibration_area_args(horizontal: f64, vertical: f64) -> Result<String> {
    if [horizontal, vertical]
        .iter()
        .all(|v| (0.33..=1.0).contains(v))
    {
        Ok(format!("{:.2} {:.2}", horizontal, vertical))
    } else {
        invalid("values in calibration scale must be in the range [0.33, 1.00]")
    }
}

/// A tracker driven through a [PrecisionLink].
pub struct PrecisionTracker {
    link: Box<dyn PrecisionLink>,
    work_dir: PathBuf,
    connected: bool,
}

impl PrecisionTracker {
    /// `work_dir` is where the runtime writes [DEFAULT_ARTIFACT].
    pub fn new(link: Box<dyn PrecisionLink>, work_dir: impl Into<PathBuf>) -> Self {
        PrecisionTracker {
            link,
            work_dir: work_dir.into(),
            connected: false,
        }
    }

    fn link(&mut self) -> Result<&mut dyn PrecisionLink> {
        if self.connected {
            Ok(self.link.as_mut())
        } else {
            Err(TrackerError::Device(
                "precision tracker is not connected, initialize it first".to_owned(),
            ))
        }
    }

    fn artifact(&self) -> PathBuf {
        self.work_dir.join(DEFAULT_ARTIFACT)
    }
}

impl GazeBackend for PrecisionTracker {
    fn name(&self) -> &'static str {
        "precision"
    }

    fn raw_extension(&self) -> &'static str {
        "EDF"
    }

    fn initialize(&mut self, ctx: &mut TrackerContext, options: InitOptions) -> Result<()> {
        let scale = match options {
            InitOptions::Default => None,
            InitOptions::CalibrationScale(h, v) => Some(calibration_area_args(h, v)?),
            InitOptions::Targets(_) => {
                return invalid("the precision tracker draws its own calibration targets")
            }
        };

        if let Some(backup) = backup_leftover(&self.work_dir, DEFAULT_ARTIFACT, Local::now())? {
            ctx.session.warn(TrackerWarning::Notice(format!(
                "leftover {} moved to {}",
                DEFAULT_ARTIFACT,
                backup.display()
            )));
        }

        let runtime =
            PrecisionRuntimeConfig::from_config(ctx.config, ctx.presentation.surface.deg_per_pix())?;
        if let Ok(text) = ron::ser::to_string_pretty(&runtime, ron::ser::PrettyConfig::default()) {
            debug!("precision runtime configuration:\n{}", text);
        }
        self.link.connect(&runtime, &self.work_dir)?;
        self.connected = true;

        if let Some(args) = scale {
            self.link.send_command(CALIBRATION_AREA_COMMAND, &args)?;
        }
        info!("precision tracker initialized");
        Ok(())
    }

    fn calibrate(&mut self, ctx: &mut TrackerContext) -> Result<CalibrationOutcome> {
        ctx.presentation.surface.set_visible(false)?;
        let result = self.link().and_then(|link| link.run_setup());
        ctx.presentation.surface.set_visible(true)?;
        info!("calibration returned: {}", result?);

        ctx.session.calibration_count += 1;
        let index = ctx.session.calibration_count;
        self.comment(ctx, &format!("calibration {}", index))?;
        Ok(CalibrationOutcome::Calibrated(CalibrationReport {
            index,
            errors: BTreeMap::new(),
        }))
    }

    /// The runtime keeps its own calibration, there is nothing to save.
    fn save_calibration(&mut self, _ctx: &mut TrackerContext) -> Result<Option<PathBuf>> {
        debug!("precision tracker stores its calibration internally");
        Ok(None)
    }

    fn last_sample(&mut self, ctx: &mut TrackerContext) -> Result<SampleFrame> {
        let surface = &ctx.presentation.surface;
        let (width, height) = surface.size_pix();
        let deg_per_pix = surface.deg_per_pix();
        let offset = ((width as f64 - 1.0) / 2.0, (height as f64 - 1.0) / 2.0);

        let position = match self.link()?.last_gaze() {
            Some((x, y)) => Point::new((x - offset.0) * deg_per_pix, (offset.1 - y) * deg_per_pix),
            None => Point::NAN,
        };
        Ok(ctx.config.sample_mode().replicate(position))
    }

    /// The runtime records one file for the whole session.
    fn open_file(
        &mut self,
        _ctx: &mut TrackerContext,
        _name: Option<&str>,
    ) -> Result<Option<PathBuf>> {
        debug!("precision tracker records into {} for the whole session", DEFAULT_ARTIFACT);
        Ok(None)
    }

    fn close_file(&mut self, _ctx: &mut TrackerContext) -> Result<()> {
        Ok(())
    }

    fn start_collecting(&mut self, _ctx: &mut TrackerContext) -> Result<()> {
        self.link()?.set_recording(true)
    }

    fn stop_collecting(&mut self, _ctx: &mut TrackerContext) -> Result<()> {
        self.link()?.set_recording(false)
    }

    fn comment(&mut self, _ctx: &mut TrackerContext, text: &str) -> Result<()> {
        self.link()?.send_message(text)
    }

    fn shutdown(&mut self, ctx: &mut TrackerContext) -> Result<()> {
        if self.connected {
            self.link.set_recording(false)?;
            self.link.disconnect()?;
            self.connected = false;
        }

        let artifact = self.artifact();
        match ctx.config.output() {
            Some(output) => {
                let dst = output.raw_path(self.raw_extension());
                if artifact.is_file() {
                    move_file(&artifact, &dst)?;
                    info!("stored eye-tracking data in {}", dst.display());
                } else {
                    ctx.session.warn(TrackerWarning::Notice(format!(
                        "no {} to store as {}",
                        DEFAULT_ARTIFACT,
                        dst.display()
                    )));
                }
            }
            None => {
                if artifact.is_file() {
                    fs::remove_file(&artifact)?;
                    info!("storage disabled, removed {}", artifact.display());
                }
            }
        }
        Ok(())
    }
}
