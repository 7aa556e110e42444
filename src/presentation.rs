//! The collaborators a tracker needs from the experiment around it: a
//! surface to draw calibration targets on, a clock, and a keyboard.
//!
//! None of these are implemented by the tracker itself. [crate::headless]
//! has simulated versions for tests, and [crate::gui] has terminal versions.

use crate::error::Result;
use crate::Point;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

/// Something the tracker can draw on. Coordinates are degrees of visual
/// angle with the origin at the screen centre.
pub trait Surface {
    /// Queue a bullseye target for the next flip.
    fn draw_target(&mut self, pos: Point, outer_diameter: f64, inner_diameter: f64);

    /// Queue a centred text message for the next flip.
    fn draw_text(&mut self, text: &str);

    /// Present everything queued since the last flip, then clear the queue.
    fn flip(&mut self) -> Result<()>;

    /// Hide or show the surface. Vendor calibration screens need the
    /// experiment's surface out of the way.
    fn set_visible(&mut self, visible: bool) -> Result<()>;

    /// Distance between the participant's eyes and the screen, in cm.
    fn view_distance(&self) -> f64;

    /// Screen resolution in pixels, `(width, height)`.
    fn size_pix(&self) -> (u32, u32);

    /// Degrees of visual angle spanned by one pixel near the screen centre.
    fn deg_per_pix(&self) -> f64;
}

/// Anything that can draw itself as part of a fixation display.
pub trait Stimulus {
    #[allow(missing_docs)]
    fn draw(&self, surface: &mut dyn Surface);
}

/// The standard black-and-white bullseye used for fixation and calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixationTarget {
    #[allow(missing_docs)]
    pub pos: Point,
    /// Outer diameter in degrees
    pub outer_diameter: f64,
    /// Inner diameter in degrees
    pub inner_diameter: f64,
}

impl FixationTarget {
    /// Outer diameter of the default target, in degrees.
    pub const OUTER_DIAMETER: f64 = 1.0;
    /// Inner diameter of the default target, in degrees.
    pub const INNER_DIAMETER: f64 = 0.2;

    /// A default sized target at `pos`.
    pub fn at(pos: Point) -> Self {
        FixationTarget {
            pos,
            outer_diameter: Self::OUTER_DIAMETER,
            inner_diameter: Self::INNER_DIAMETER,
        }
    }
}

impl Default for FixationTarget {
    fn default() -> Self {
        Self::at(Point::ORIGIN)
    }
}

impl Stimulus for FixationTarget {
    fn draw(&self, surface: &mut dyn Surface) {
        surface.draw_target(self.pos, self.outer_diameter, self.inner_diameter);
    }
}

/// Wall-clock time, in seconds since some fixed point.
pub trait Clock {
    #[allow(missing_docs)]
    fn now(&self) -> f64;

    /// Block for `seconds`.
    fn sleep(&self, seconds: f64);
}

/// A [Clock] backed by [Instant]. Sleeps use `spin_sleep` so sub-millisecond
/// waits (comment guards at 500 Hz and up) are honoured.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        SystemClock {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    fn sleep(&self, seconds: f64) {
        if seconds > 0.0 {
            spin_sleep::sleep(Duration::from_secs_f64(seconds));
        }
    }
}

/// Keys the tracker asks the operator for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    #[allow(missing_docs)]
    Space,
    #[allow(missing_docs)]
    Enter,
    #[allow(missing_docs)]
    Escape,
    #[allow(missing_docs)]
    Char(char),
}

/// Blocking keyboard input.
pub trait Keyboard {
    /// Block until one of `accepted` is pressed, and return it. Other keys
    /// are discarded.
    fn wait_keys(&mut self, accepted: &[Key]) -> Result<Key>;
}

/// A live pointer position, in degrees.
pub trait PointerSource {
    #[allow(missing_docs)]
    fn position(&self) -> Point;
}

/// Everything a tracker borrows from the experiment for one session.
pub struct Presentation {
    #[allow(missing_docs)]
    pub surface: Box<dyn Surface>,
    #[allow(missing_docs)]
    pub keyboard: Box<dyn Keyboard>,
    #[allow(missing_docs)]
    pub clock: Arc<dyn Clock>,
}

impl Presentation {
    #[allow(missing_docs)]
    pub fn new(
        surface: Box<dyn Surface>,
        keyboard: Box<dyn Keyboard>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Presentation {
            surface,
            keyboard,
            clock,
        }
    }

    /// Draw every stimulus, then flip.
    pub fn show(&mut self, stimuli: &[&dyn Stimulus]) -> Result<()> {
        for stim in stimuli {
            stim.draw(self.surface.as_mut());
        }
        self.surface.flip()
    }

    /// Show a text message on its own.
    pub fn show_text(&mut self, text: &str) -> Result<()> {
        self.surface.draw_text(text);
        self.surface.flip()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock::new();
        let before = clock.now();
        clock.sleep(0.002);
        assert!(clock.now() - before >= 0.002);
    }

    #[test]
    fn default_target_sits_at_centre() {
        let target = FixationTarget::default();
        assert_eq!(target.pos, Point::ORIGIN);
        assert_eq!(target.outer_diameter, 1.0);
        assert_eq!(target.inner_diameter, 0.2);
    }
}
