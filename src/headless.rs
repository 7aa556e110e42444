//! Presentation collaborators that need no screen: a simulated clock, a
//! surface that records what it was asked to draw, and a scripted keyboard.
//!
//! Together with [crate::dummy_tracker] these run whole sessions, calibration
//! included, in tests and in `gazekit --headless`.

use crate::dummy_tracker::Participant;
use crate::error::{Result, TrackerError};
use crate::presentation::{Clock, Key, Keyboard, Surface};
use crate::Point;

use log::debug;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

/// A clock that only moves when asked to. Every reading advances it by a
/// small tick, so busy-polling loops still make progress.
#[derive(Debug)]
pub struct SimClock {
    now: Mutex<f64>,
    tick: f64,
}

impl SimClock {
    /// Starts at zero and advances `tick` seconds per reading.
    pub fn new(tick: f64) -> Self {
        SimClock {
            now: Mutex::new(0.0),
            tick,
        }
    }

    /// Move the clock forward without reading it.
    pub fn advance(&self, seconds: f64) {
        *self.now.lock().unwrap() += seconds.max(0.0);
    }

    /// The current time, without advancing it.
    pub fn peek(&self) -> f64 {
        *self.now.lock().unwrap()
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new(0.001)
    }
}

impl Clock for SimClock {
    fn now(&self) -> f64 {
        let mut now = self.now.lock().unwrap();
        *now += self.tick;
        *now
    }

    fn sleep(&self, seconds: f64) {
        self.advance(seconds);
    }
}

/// Everything drawn between two flips.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    /// Centres of the bullseye targets
    pub targets: Vec<Point>,
    /// Text messages
    pub texts: Vec<String>,
}

/// Shared record of the frames a [HeadlessSurface] presented.
pub type FrameLog = Arc<Mutex<Vec<Frame>>>;

/// A [Surface] with a fixed geometry that keeps every flipped frame.
pub struct HeadlessSurface {
    clock: Arc<SimClock>,
    frame_period: f64,
    pending: Frame,
    log: FrameLog,
    follower: Option<Participant>,
    view_distance: f64,
    size_pix: (u32, u32),
    deg_per_pix: f64,
}

impl HeadlessSurface {
    /// A 1920x1080 screen viewed from 57 cm, flipping at 60 Hz on `clock`.
    pub fn new(clock: Arc<SimClock>) -> Self {
        HeadlessSurface {
            clock,
            frame_period: 1.0 / 60.0,
            pending: Frame::default(),
            log: Arc::new(Mutex::new(Vec::new())),
            follower: None,
            view_distance: 57.0,
            size_pix: (1920, 1080),
            deg_per_pix: 0.025,
        }
    }

    /// Make `participant` look at every target as soon as it is shown.
    pub fn followed_by(mut self, participant: Participant) -> Self {
        self.follower = Some(participant);
        self
    }

    /// Handle on the frames presented so far.
    pub fn frames(&self) -> FrameLog {
        Arc::clone(&self.log)
    }
}

impl Surface for HeadlessSurface {
    fn draw_target(&mut self, pos: Point, _outer_diameter: f64, _inner_diameter: f64) {
        self.pending.targets.push(pos);
    }

    fn draw_text(&mut self, text: &str) {
        self.pending.texts.push(text.to_owned());
    }

    fn flip(&mut self) -> Result<()> {
        let frame = std::mem::take(&mut self.pending);
        if let (Some(participant), Some(&target)) = (&self.follower, frame.targets.first()) {
            participant.look_at(target);
        }
        self.log.lock().unwrap().push(frame);
        self.clock.advance(self.frame_period);
        Ok(())
    }

    fn set_visible(&mut self, visible: bool) -> Result<()> {
        debug!("headless surface visible: {}", visible);
        Ok(())
    }

    fn view_distance(&self) -> f64 {
        self.view_distance
    }

    fn size_pix(&self) -> (u32, u32) {
        self.size_pix
    }

    fn deg_per_pix(&self) -> f64 {
        self.deg_per_pix
    }
}

/// A [Keyboard] that replays a fixed list of key presses.
#[derive(Debug, Clone, Default)]
pub struct ScriptedKeyboard {
    keys: VecDeque<Key>,
}

impl ScriptedKeyboard {
    #[allow(missing_docs)]
    pub fn new(keys: impl IntoIterator<Item = Key>) -> Self {
        ScriptedKeyboard {
            keys: keys.into_iter().collect(),
        }
    }
}

impl Keyboard for ScriptedKeyboard {
    fn wait_keys(&mut self, accepted: &[Key]) -> Result<Key> {
        while let Some(key) = self.keys.pop_front() {
            if accepted.contains(&key) {
                return Ok(key);
            }
        }
        Err(TrackerError::Device(
            "keyboard script ran out of key presses".to_owned(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_the_clock_moves_it() {
        let clock = SimClock::new(0.5);
        assert_eq!(clock.now(), 0.5);
        assert_eq!(clock.now(), 1.0);
        clock.sleep(2.0);
        assert_eq!(clock.peek(), 3.0);
    }

    #[test]
    fn flips_record_frames_and_take_time() {
        let clock = Arc::new(SimClock::new(0.0));
        let mut surface = HeadlessSurface::new(Arc::clone(&clock));
        let frames = surface.frames();

        surface.draw_target(Point::new(3.0, 0.0), 1.0, 0.2);
        surface.draw_text("hello");
        surface.flip().unwrap();
        surface.flip().unwrap();

        let frames = frames.lock().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].targets, vec![Point::new(3.0, 0.0)]);
        assert_eq!(frames[0].texts, vec!["hello".to_owned()]);
        assert_eq!(frames[1], Frame::default());
        assert!((clock.peek() - 2.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn participants_follow_targets() {
        let clock = Arc::new(SimClock::default());
        let participant = Participant::new();
        let mut surface = HeadlessSurface::new(clock).followed_by(participant.clone());
        surface.draw_target(Point::new(-3.0, 0.0), 1.0, 0.2);
        surface.flip().unwrap();
        assert_eq!(participant.gaze(), Point::new(-3.0, 0.0));
    }

    #[test]
    fn keyboard_skips_unaccepted_keys() {
        let mut keyboard = ScriptedKeyboard::new([Key::Enter, Key::Char('x'), Key::Space]);
        assert_eq!(keyboard.wait_keys(&[Key::Space, Key::Char('q')]).unwrap(), Key::Space);
        assert!(keyboard.wait_keys(&[Key::Space]).is_err());
    }
}
