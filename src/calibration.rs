//! The maths behind a pupil-to-glint calibration pass: deciding when a
//! buffer of raw samples is a fixation, and fitting the per-eye transform
//! from camera vectors to gaze position.

use crate::backend::vector::RawSample;
use crate::error::TrackerWarning;
use crate::sample::{Eye, TrackedEyes};
use crate::Point;

use log::info;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Viewing distance, in cm, that normalised vectors are scaled to.
const REFERENCE_VIEW_DISTANCE: f64 = 100.0;

/// Timing and tolerance of the fixation acquisition loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationSettings {
    /// Time after a target appears before any samples count, in seconds
    pub settle_delay: f64,
    /// Length of the sample window that has to be stable, in seconds
    pub min_fixation: f64,
    /// Give up on a target after this long, in seconds
    pub target_timeout: f64,
    /// Largest allowed spread of the pupil-to-glint vector, in camera pixels
    pub spread_threshold: f64,
    /// How long the "calibration" notice stays up, in seconds
    pub notice_duration: f64,
    /// How many passes to attempt before reporting a redo
    pub max_attempts: usize,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        CalibrationSettings {
            settle_delay: 1.0,
            min_fixation: 0.3,
            target_timeout: 5.0,
            spread_threshold: 5.0,
            notice_duration: 0.3333,
            max_attempts: 10,
        }
    }
}

impl CalibrationSettings {
    /// Number of samples that cover `min_fixation` at `sample_rate` Hz.
    pub fn window_samples(&self, sample_rate: f64) -> usize {
        ((self.min_fixation * sample_rate).round() as usize).max(1)
    }
}

/// What one eye looked like while fixating one target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSample {
    /// Median pupil-to-glint vector, camera pixels
    pub vector: Point,
    /// Median glint position, camera pixels
    pub glint: Point,
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

fn range(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    max - min
}

/// Largest per-axis spread of `eye`'s pupil-to-glint vector across `buffer`.
pub fn vector_spread(buffer: &[RawSample], eye: Eye) -> f64 {
    let xs: Vec<f64> = buffer.iter().map(|s| s.eye(eye).vector.x).collect();
    let ys: Vec<f64> = buffer.iter().map(|s| s.eye(eye).vector.y).collect();
    range(&xs).max(range(&ys))
}

/// Decides whether `buffer` holds a fixation for `eye`: the buffer is full,
/// every sample has the eye tracked, the settle delay has passed, and the
/// vector spread is within the threshold. If so, returns the medians.
pub fn acquire_fixation(
    buffer: &[RawSample],
    eye: Eye,
    window: usize,
    elapsed: f64,
    settings: &CalibrationSettings,
) -> Option<CalibrationSample> {
    if buffer.is_empty() || buffer.len() < window || elapsed <= settings.settle_delay {
        return None;
    }
    if !buffer.iter().all(|s| s.eye(eye).tracked) {
        return None;
    }
    if vector_spread(buffer, eye) > settings.spread_threshold {
        return None;
    }

    let channel = |f: fn(&RawSample) -> f64| -> f64 {
        let mut values: Vec<f64> = buffer.iter().map(f).collect();
        median(&mut values)
    };
    let sample = match eye {
        Eye::Left => CalibrationSample {
            vector: Point::new(channel(|s| s.left.vector.x), channel(|s| s.left.vector.y)),
            glint: Point::new(channel(|s| s.left.glint.x), channel(|s| s.left.glint.y)),
        },
        Eye::Right => CalibrationSample {
            vector: Point::new(channel(|s| s.right.vector.x), channel(|s| s.right.vector.y)),
            glint: Point::new(channel(|s| s.right.glint.x), channel(|s| s.right.glint.y)),
        },
    };
    Some(sample)
}

/// Maps one eye's pupil-to-glint vector to a gaze position in degrees:
/// `gaze = c0 + c1 * u + c2 * v` per axis, where `(u, v)` is the vector
/// scaled to a 1 m viewing distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTransform {
    /// Coefficients for the horizontal gaze position
    pub coefficients_x: [f64; 3],
    /// Coefficients for the vertical gaze position
    pub coefficients_y: [f64; 3],
    /// Viewing distance during calibration, in cm
    pub view_distance: f64,
    /// Median glint position across all retained targets, camera pixels
    pub glint_median: Point,
    /// Number of targets the fit used
    pub points: usize,
    /// Root mean square error of the fit, in degrees
    pub rms_error: f64,
}

impl CalibrationTransform {
    fn normalise(vector: Point, view_distance: f64) -> (f64, f64) {
        let scale = view_distance / REFERENCE_VIEW_DISTANCE;
        (vector.x * scale, vector.y * scale)
    }

    /// Least-squares fit of `targets` against `samples`. With only two
    /// points each axis is fitted against its own vector component alone.
    pub fn fit(targets: &[Point], samples: &[CalibrationSample], view_distance: f64) -> Self {
        debug_assert_eq!(targets.len(), samples.len());
        let n = targets.len();

        let mut glint_x: Vec<f64> = samples.iter().map(|s| s.glint.x).collect();
        let mut glint_y: Vec<f64> = samples.iter().map(|s| s.glint.y).collect();
        let glint_median = Point::new(median(&mut glint_x), median(&mut glint_y));

        let uv: Vec<(f64, f64)> = samples
            .iter()
            .map(|s| Self::normalise(s.vector, view_distance))
            .collect();

        let solve = |design: DMatrix<f64>, rhs: DVector<f64>| -> Vec<f64> {
            let cols = design.ncols();
            design
                .svd(true, true)
                .solve(&rhs, 1e-9)
                .map(|c| c.iter().cloned().collect())
                .unwrap_or_else(|_| vec![0.0; cols])
        };

        let (coefficients_x, coefficients_y) = if n >= 3 {
            let design = DMatrix::from_fn(n, 3, |r, c| match c {
                0 => 1.0,
                1 => uv[r].0,
                _ => uv[r].1,
            });
            let cx = solve(design.clone(), DVector::from_fn(n, |r, _| targets[r].x));
            let cy = solve(design, DVector::from_fn(n, |r, _| targets[r].y));
            ([cx[0], cx[1], cx[2]], [cy[0], cy[1], cy[2]])
        } else {
            let dx = DMatrix::from_fn(n, 2, |r, c| if c == 0 { 1.0 } else { uv[r].0 });
            let dy = DMatrix::from_fn(n, 2, |r, c| if c == 0 { 1.0 } else { uv[r].1 });
            let cx = solve(dx, DVector::from_fn(n, |r, _| targets[r].x));
            let cy = solve(dy, DVector::from_fn(n, |r, _| targets[r].y));
            ([cx[0], cx[1], 0.0], [cy[0], 0.0, cy[1]])
        };

        let mut transform = CalibrationTransform {
            coefficients_x,
            coefficients_y,
            view_distance,
            glint_median,
            points: n,
            rms_error: 0.0,
        };

        let squared_error: f64 = targets
            .iter()
            .zip(samples)
            .map(|(t, s)| transform.apply(s.vector).abs_dist(t).powi(2))
            .sum();
        transform.rms_error = (squared_error / n as f64).sqrt();
        transform
    }

    /// Gaze position, in degrees, for a raw pupil-to-glint vector.
    pub fn apply(&self, vector: Point) -> Point {
        let (u, v) = Self::normalise(vector, self.view_distance);
        let [ax, bx, cx] = self.coefficients_x;
        let [ay, by, cy] = self.coefficients_y;
        Point::new(ax + bx * u + cx * v, ay + by * u + cy * v)
    }
}

/// Per-eye transforms from one successful pass. Serializes to the JSON
/// object stored in `calibration_<N>.json`.
pub type CalibrationResult = BTreeMap<Eye, CalibrationTransform>;

/// How a completed pass over the targets turned out.
#[derive(Debug, Clone, PartialEq)]
pub enum PassVerdict {
    /// Every tracked eye had enough data; here are the transforms.
    Fitted(CalibrationResult),
    /// At least one eye had fewer than two usable targets. Nothing was
    /// fitted, for any eye.
    Redo(Vec<TrackerWarning>),
}

/// Drops missing samples per eye and fits every tracked eye, unless any eye
/// is left with fewer than two targets.
pub fn evaluate_pass(
    order: &[Point],
    samples: &BTreeMap<Eye, Vec<Option<CalibrationSample>>>,
    eyes: TrackedEyes,
    view_distance: f64,
) -> PassVerdict {
    let mut retained = BTreeMap::new();
    let mut shortfalls = Vec::new();

    for eye in eyes.iter() {
        let (targets, kept): (Vec<Point>, Vec<CalibrationSample>) = samples
            .get(&eye)
            .map(|per_target| {
                order
                    .iter()
                    .zip(per_target)
                    .filter_map(|(t, s)| s.map(|s| (*t, s)))
                    .unzip()
            })
            .unwrap_or_default();

        if targets.len() < 2 {
            shortfalls.push(TrackerWarning::CalibrationInsufficientData {
                eye,
                valid_points: targets.len(),
            });
        } else {
            retained.insert(eye, (targets, kept));
        }
    }

    if !shortfalls.is_empty() {
        return PassVerdict::Redo(shortfalls);
    }

    let result = retained
        .into_iter()
        .map(|(eye, (targets, kept))| {
            let transform = CalibrationTransform::fit(&targets, &kept, view_distance);
            info!(
                "{} eye calibration accuracy: {:.3} errors in dva",
                eye, transform.rms_error
            );
            (eye, transform)
        })
        .collect();
    PassVerdict::Fitted(result)
}
