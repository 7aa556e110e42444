//! The fixation window test, and the bookkeeping of a gaze-contingent wait.

use crate::sample::{SampleFrame, SampleMode};
use crate::Point;

/// True if every channel `mode` needs is present, is a real number, and lies
/// within `radius` of `target`. Anything missing counts as not fixating.
pub fn gaze_in_window(frame: &SampleFrame, mode: SampleMode, target: Point, radius: f64) -> bool {
    mode.required_channels().iter().all(|&channel| match frame.get(channel) {
        Some(gaze) if !gaze.is_nan() => gaze.abs_dist(&target) <= radius,
        _ => false,
    })
}

/// Tracks one wait for a continuous fixation. Feed it a timestamp and the
/// window test result on every poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixationWait {
    min_duration: f64,
    deadline: f64,
    fixation_start: Option<f64>,
}

impl FixationWait {
    /// A wait that began at `start` and gives up `timeout` seconds later.
    pub fn new(start: f64, min_duration: f64, timeout: f64) -> Self {
        FixationWait {
            min_duration,
            deadline: start + timeout,
            fixation_start: None,
        }
    }

    /// False once the timeout has passed.
    pub fn running(&self, now: f64) -> bool {
        now < self.deadline
    }

    /// Record one poll. Returns true when the gaze has been inside the
    /// window for at least the minimum duration without leaving it.
    pub fn update(&mut self, now: f64, fixated: bool) -> bool {
        if !fixated {
            self.fixation_start = None;
            return false;
        }
        match self.fixation_start {
            None => {
                self.fixation_start = Some(now);
                false
            }
            Some(start) => now - start >= self.min_duration,
        }
    }

    /// One poll of the wait loop. `Some(true)` once the fixation is long
    /// enough, `Some(false)` once the deadline has passed, `None` to keep
    /// polling. The poll that crosses the deadline still counts its window
    /// test.
    pub fn poll(&mut self, now: f64, fixated: bool) -> Option<bool> {
        if self.update(now, fixated) {
            Some(true)
        } else if !self.running(now) {
            Some(false)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Channel;

    fn frame(channel: Channel, p: Point) -> SampleFrame {
        let mut frame = SampleFrame::default();
        frame.insert(channel, p);
        frame
    }

    #[test]
    fn window_is_a_closed_disc() {
        let left = |x, y| frame(Channel::Left, Point::new(x, y));
        assert!(gaze_in_window(&left(1.0, 1.0), SampleMode::Left, Point::ORIGIN, 2.0));
        assert!(!gaze_in_window(&left(2.0, 2.0), SampleMode::Left, Point::ORIGIN, 2.0));
        assert!(gaze_in_window(&left(2.0, 0.0), SampleMode::Left, Point::ORIGIN, 2.0));
        assert!(gaze_in_window(&left(6.0, 6.0), SampleMode::Left, Point::new(5.0, 5.0), 2.0));
    }

    #[test]
    fn missing_or_nan_fails_closed() {
        let left = frame(Channel::Left, Point::ORIGIN);
        assert!(!gaze_in_window(&left, SampleMode::Right, Point::ORIGIN, 2.0));
        assert!(!gaze_in_window(&left, SampleMode::Both, Point::ORIGIN, 2.0));
        assert!(!gaze_in_window(&SampleFrame::default(), SampleMode::Average, Point::ORIGIN, 2.0));

        let nan = frame(Channel::Left, Point::new(f64::NAN, 0.0));
        assert!(!gaze_in_window(&nan, SampleMode::Left, Point::ORIGIN, 2.0));
    }

    #[test]
    fn both_mode_needs_both_eyes_inside() {
        let mut frame = SampleMode::Both.replicate(Point::new(0.5, 0.5));
        assert!(gaze_in_window(&frame, SampleMode::Both, Point::ORIGIN, 2.0));
        frame.insert(Channel::Right, Point::new(3.0, 0.0));
        assert!(!gaze_in_window(&frame, SampleMode::Both, Point::ORIGIN, 2.0));
    }

    #[test]
    fn fixation_must_be_continuous() {
        let mut wait = FixationWait::new(0.0, 0.2, 3.0);
        assert!(!wait.update(0.0, true));
        assert!(!wait.update(0.15, true));
        // leaving the window restarts the clock
        assert!(!wait.update(0.16, false));
        assert!(!wait.update(0.17, true));
        assert!(!wait.update(0.30, true));
        assert!(wait.update(0.38, true));
    }

    #[test]
    fn wait_runs_until_the_deadline() {
        let wait = FixationWait::new(10.0, 0.2, 3.0);
        assert!(wait.running(12.9));
        assert!(!wait.running(13.0));
    }

    #[test]
    fn last_poll_past_the_deadline_still_counts() {
        let mut wait = FixationWait::new(0.0, 0.2, 0.3);
        assert_eq!(wait.poll(0.1, true), None);
        assert_eq!(wait.poll(0.25, true), None);
        assert_eq!(wait.poll(0.31, true), Some(true));

        let mut wait = FixationWait::new(0.0, 0.2, 0.3);
        assert_eq!(wait.poll(0.1, true), None);
        assert_eq!(wait.poll(0.31, false), Some(false));
    }
}
