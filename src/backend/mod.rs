//! The operation set every device implements, and the session bookkeeping
//! the facade hands to it.

pub mod pointer;
pub mod precision;
pub mod vector;

use crate::config::TrackerConfig;
use crate::error::{invalid, Result, TrackerError, TrackerWarning};
use crate::presentation::Presentation;
use crate::sample::{Eye, SampleFrame};
use crate::targets::CalibrationTargets;

use clap::ValueEnum;
use log::warn;
use std::{collections::BTreeMap, fmt, path::PathBuf, str::FromStr};

/// Which kind of device drives the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeviceKind {
    /// A binocular commercial tracker with its own calibration screen
    Precision,
    /// A camera tracker reporting raw pupil-to-glint vectors
    Vector,
    /// The mouse pointer standing in for gaze
    Pointer,
}

impl FromStr for DeviceKind {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "precision" => Ok(DeviceKind::Precision),
            "vector" => Ok(DeviceKind::Vector),
            "pointer" => Ok(DeviceKind::Pointer),
            other => invalid(format!(
                "unknown device {:?}, expected precision, vector or pointer",
                other
            )),
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Precision => write!(f, "precision"),
            DeviceKind::Vector => write!(f, "vector"),
            DeviceKind::Pointer => write!(f, "pointer"),
        }
    }
}

/// Device specific arguments to [GazeBackend::initialize].
#[derive(Debug, Clone, Default, PartialEq)]
pub enum InitOptions {
    #[default]
    /// Nothing device specific
    Default,
    /// Horizontal and vertical share of the screen the precision tracker's
    /// calibration targets may span, each in `0.33..=1.0`
    CalibrationScale(f64, f64),
    /// Replace the vector tracker's calibration targets
    Targets(CalibrationTargets),
}

/// Summary of a successful calibration.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationReport {
    /// Value of the session's calibration counter after this calibration
    pub index: usize,
    /// RMS error per eye, in degrees. Empty when the device does not report
    /// one.
    pub errors: BTreeMap<Eye, f64>,
}

/// How a call to [GazeBackend::calibrate] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationOutcome {
    #[allow(missing_docs)]
    Calibrated(CalibrationReport),
    /// Every pass lacked data and the operator gave up, or the attempt
    /// limit ran out. The device keeps whatever calibration it had before.
    Redo {
        /// Number of passes presented
        attempts: usize,
    },
}

impl CalibrationOutcome {
    #[allow(missing_docs)]
    pub fn is_calibrated(&self) -> bool {
        matches!(self, CalibrationOutcome::Calibrated(_))
    }
}

/// Per-session bookkeeping. Lives on the facade and is only reset by
/// building a new tracker.
#[derive(Debug, Default)]
pub struct SessionState {
    /// A raw data file is currently open
    pub file_open: bool,
    /// The device is streaming samples into the data file
    pub recording_active: bool,
    /// Calibrations completed so far
    pub calibration_count: usize,
    /// Raw data files opened so far
    pub raw_file_count: usize,
    /// The open raw data file, if the device reports one
    pub current_file: Option<PathBuf>,
    warnings: Vec<TrackerWarning>,
}

impl SessionState {
    /// Log a warning and keep it for [SessionState::take_warnings].
    pub fn warn(&mut self, warning: TrackerWarning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    /// The warnings collected since the last call.
    pub fn take_warnings(&mut self) -> Vec<TrackerWarning> {
        std::mem::take(&mut self.warnings)
    }
}

/// What a backend may touch while it runs one operation.
pub struct TrackerContext<'a> {
    #[allow(missing_docs)]
    pub config: &'a TrackerConfig,
    #[allow(missing_docs)]
    pub session: &'a mut SessionState,
    #[allow(missing_docs)]
    pub presentation: &'a mut Presentation,
}

/// `GazeBackend`
///
/// The uniform operation set of one kind of device. The facade picks one
/// implementation when it is built and forwards every call to it; the
/// session counters and flags in [SessionState] are owned by the facade,
/// except for the calibration counter, which a backend bumps when it
/// completes a calibration.
pub trait GazeBackend {
    /// Short name for log lines.
    fn name(&self) -> &'static str;

    /// Extension of the raw data files the device writes.
    fn raw_extension(&self) -> &'static str;

    /// Connect to and configure the device.
    fn initialize(&mut self, ctx: &mut TrackerContext, options: InitOptions) -> Result<()>;

    /// Run a calibration with the participant.
    fn calibrate(&mut self, ctx: &mut TrackerContext) -> Result<CalibrationOutcome>;

    /// Persist the most recent calibration. Returns where it went, if
    /// anywhere.
    fn save_calibration(&mut self, ctx: &mut TrackerContext) -> Result<Option<PathBuf>>;

    /// The most recent gaze position, in the channels the sample mode asks
    /// for.
    fn last_sample(&mut self, ctx: &mut TrackerContext) -> Result<SampleFrame>;

    /// Start a raw data file. `None` means the device did not open one, and
    /// the facade will not count it.
    fn open_file(&mut self, ctx: &mut TrackerContext, name: Option<&str>)
        -> Result<Option<PathBuf>>;

    #[allow(missing_docs)]
    fn close_file(&mut self, ctx: &mut TrackerContext) -> Result<()>;

    #[allow(missing_docs)]
    fn start_collecting(&mut self, ctx: &mut TrackerContext) -> Result<()>;

    #[allow(missing_docs)]
    fn stop_collecting(&mut self, ctx: &mut TrackerContext) -> Result<()>;

    /// Put a marker into the live data stream.
    fn comment(&mut self, ctx: &mut TrackerContext, text: &str) -> Result<()>;

    /// Disconnect and finalise the session's files.
    fn shutdown(&mut self, ctx: &mut TrackerContext) -> Result<()>;
}
