//! GazeKit lets an experiment controller acquire, calibrate, and consume gaze
//! samples from interchangeable eye-tracking hardware through one uniform
//! contract. Three device backends are provided:
//!
//! - a binocular commercial tracker with its own calibration runtime
//!   ([backend::precision]),
//! - a camera based pupil-to-glint tracker that we calibrate ourselves
//!   ([backend::vector]),
//! - a pointer stand-in for running experiments without any hardware
//!   ([backend::pointer]).
//!
//! The [tracker::EyeTracker] facade picks exactly one of them at construction
//! and owns the session bookkeeping: calibration count, raw data files, and
//! the end-of-session rename/backup of vendor output.
//!
//! Rendering, timing, and keyboard input belong to the experiment, so they are
//! traits in [presentation]. [headless] and [dummy_tracker] provide simulated
//! versions of every collaborator and device, and [gui] provides a terminal
//! version for the demo binary.

#![warn(missing_docs)]
pub mod args;
pub mod backend;
pub mod calibration;
pub mod config;
pub mod dummy_tracker;
pub mod error;
pub mod fixation;
pub mod gui;
pub mod headless;
pub mod presentation;
pub mod raw_file;
pub mod sample;
pub mod targets;
pub mod tracker;

use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub use error::{Result, TrackerError, TrackerWarning};
pub use tracker::EyeTracker;

/// A location on the presentation surface, in degrees of visual angle with
/// the origin at the screen centre and y pointing up.
#[derive(Debug, PartialEq, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Point {
    #[allow(missing_docs)]
    pub x: f64,
    #[allow(missing_docs)]
    pub y: f64,
}

impl Point {
    /// The screen centre.
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    /// What an untracked eye reports.
    pub const NAN: Point = Point {
        x: f64::NAN,
        y: f64::NAN,
    };

    #[allow(missing_docs)]
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    /// Euclidean distance between two points.
    pub fn abs_dist(&self, other: &Self) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// True if either coordinate is not a number.
    pub fn is_nan(&self) -> bool {
        self.x.is_nan() || self.y.is_nan()
    }
}

impl Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Point { x, y }
    }
}
