//! Errors and warnings produced by the tracker facade and its backends.
//!
//! Errors are fatal to the operation that produced them. Warnings are the
//! non-fatal conditions a session runs into (closing a file twice, a
//! calibration target timing out, ...); they get logged and collected on the
//! session so the caller can inspect them afterwards.

use std::{borrow::Cow, fmt, io};

use crate::sample::Eye;
use crate::Point;

/// Everything that can go wrong while configuring or driving a tracker.
#[derive(Debug)]
pub enum TrackerError {
    /// A parameter failed validation. The caller can retry with corrected
    /// input.
    InvalidConfig(String),

    /// An operation was invoked on a tracker with no device backend, either
    /// because none was selected or because the session was shut down.
    TrackerNotConfigured(&'static str),

    /// The device driver reported a failure.
    Device(String),

    /// Returned when io fails while reading or writing session files.
    IoError(io::Error),

    /// Returned when the calibration artifact can not be serialized.
    JsonError(serde_json::Error),

    /// Returned when a session settings file can not be parsed.
    RonSpannedError(ron::de::SpannedError),
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use TrackerError as TE;
        let msg = match self {
            TE::InvalidConfig(reason) => Cow::from(format!("invalid configuration: {}", reason)),
            TE::TrackerNotConfigured(op) => {
                Cow::from(format!("`{}` called before a tracker was set", op))
            }
            TE::Device(reason) => Cow::from(format!("device error: {}", reason)),
            TE::IoError(error) => Cow::from(format!("io error: {}", error)),
            TE::JsonError(error) => Cow::from(format!("json error: {}", error)),
            TE::RonSpannedError(error) => Cow::from(format!("ron spanning error: {}", error)),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for TrackerError {}

impl From<io::Error> for TrackerError {
    fn from(value: io::Error) -> Self {
        Self::IoError(value)
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(value: serde_json::Error) -> Self {
        Self::JsonError(value)
    }
}

impl From<ron::de::SpannedError> for TrackerError {
    fn from(value: ron::de::SpannedError) -> Self {
        Self::RonSpannedError(value)
    }
}

/// Shorthand used throughout the crate.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Shorthand for building an [`TrackerError::InvalidConfig`].
pub(crate) fn invalid<T>(reason: impl Into<String>) -> Result<T> {
    Err(TrackerError::InvalidConfig(reason.into()))
}

/// Non-fatal conditions. These never abort an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerWarning {
    /// Closing a file that is not open, or opening over an open one.
    FileState(String),

    /// A single calibration target timed out for one eye.
    DeviceTimeout {
        /// 1-based position of the target in the presentation order
        target_index: usize,
        /// Location of the target, in degrees
        target: Point,
        /// The eye that did not produce a fixation
        eye: Eye,
    },

    /// An eye ended a calibration pass with too few usable targets.
    CalibrationInsufficientData {
        /// The eye that needs a redo
        eye: Eye,
        /// How many targets survived
        valid_points: usize,
    },

    /// Anything else worth telling the operator about.
    Notice(String),
}

impl fmt::Display for TrackerWarning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use TrackerWarning as TW;
        match self {
            TW::FileState(msg) => write!(f, "file state: {}", msg),
            TW::DeviceTimeout {
                target_index,
                target,
                eye,
            } => write!(
                f,
                "fixation #{} {}: did not get fixation for {} eye (timeout)",
                target_index, target, eye
            ),
            TW::CalibrationInsufficientData { eye, valid_points } => write!(
                f,
                "{} eye calibration has {} good points, fewer than 2: redoing calibration",
                eye, valid_points
            ),
            TW::Notice(msg) => write!(f, "{}", msg),
        }
    }
}
