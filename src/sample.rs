//! The device-independent shape of a gaze sample.

use crate::error::{invalid, Result};
use crate::Point;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

/// One of the participant's eyes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Eye {
    #[allow(missing_docs)]
    Left,
    #[allow(missing_docs)]
    Right,
}

impl Eye {
    /// Both eyes, left first. Drivers index eyes in this order.
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    /// The index drivers use for this eye.
    pub fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }
}

impl fmt::Display for Eye {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eye::Left => write!(f, "left"),
            Eye::Right => write!(f, "right"),
        }
    }
}

/// Which eyes the session tracks. At least one is always set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedEyes([bool; 2]);

impl TrackedEyes {
    /// Validates a `[left, right]` flag pair.
    pub fn from_flags(flags: &[bool]) -> Result<Self> {
        match flags {
            [left, right] if *left || *right => Ok(TrackedEyes([*left, *right])),
            [_, _] => invalid("one or both eyes must be tracked"),
            _ => invalid(format!(
                "eyes tracked must have length 2, got {}",
                flags.len()
            )),
        }
    }

    #[allow(missing_docs)]
    pub fn contains(&self, eye: Eye) -> bool {
        self.0[eye.index()]
    }

    #[allow(missing_docs)]
    pub fn both(&self) -> bool {
        self.0[0] && self.0[1]
    }

    /// The tracked eyes, left first.
    pub fn iter(&self) -> impl Iterator<Item = Eye> + '_ {
        Eye::BOTH.into_iter().filter(|&eye| self.contains(eye))
    }

    /// The raw `[left, right]` flags.
    pub fn flags(&self) -> [bool; 2] {
        self.0
    }
}

/// A key in a [SampleFrame].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[allow(missing_docs)]
    Left,
    #[allow(missing_docs)]
    Right,
    /// The mean of the tracked eyes
    Average,
}

impl From<Eye> for Channel {
    fn from(eye: Eye) -> Self {
        match eye {
            Eye::Left => Channel::Left,
            Eye::Right => Channel::Right,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Left => write!(f, "left"),
            Channel::Right => write!(f, "right"),
            Channel::Average => write!(f, "average"),
        }
    }
}

/// Which eye(s), or their average, are reported in a [SampleFrame].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SampleMode {
    #[allow(missing_docs)]
    Both,
    #[allow(missing_docs)]
    Left,
    #[allow(missing_docs)]
    Right,
    #[allow(missing_docs)]
    Average,
}

impl SampleMode {
    /// The channels a frame must contain for this mode to be usable.
    pub fn required_channels(self) -> &'static [Channel] {
        match self {
            SampleMode::Both => &[Channel::Left, Channel::Right],
            SampleMode::Left => &[Channel::Left],
            SampleMode::Right => &[Channel::Right],
            SampleMode::Average => &[Channel::Average],
        }
    }

    /// Builds a frame that reports the same position on every channel this
    /// mode asks for. Used by devices that only know a single gaze position.
    pub fn replicate(self, position: Point) -> SampleFrame {
        let mut frame = SampleFrame::default();
        for &channel in self.required_channels() {
            frame.insert(channel, position);
        }
        frame
    }
}

impl FromStr for SampleMode {
    type Err = crate::TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "both" => Ok(SampleMode::Both),
            "left" => Ok(SampleMode::Left),
            "right" => Ok(SampleMode::Right),
            "average" => Ok(SampleMode::Average),
            other => invalid(format!("unknown sample mode: {}", other)),
        }
    }
}

/// The gaze position(s) reported by the most recent device sample, in
/// degrees of visual angle. A channel holds [Point::NAN] when its eye is not
/// currently tracked.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SampleFrame(BTreeMap<Channel, Point>);

impl SampleFrame {
    #[allow(missing_docs)]
    pub fn insert(&mut self, channel: Channel, position: Point) {
        self.0.insert(channel, position);
    }

    #[allow(missing_docs)]
    pub fn get(&self, channel: Channel) -> Option<Point> {
        self.0.get(&channel).copied()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[allow(missing_docs)]
    pub fn iter(&self) -> impl Iterator<Item = (Channel, Point)> + '_ {
        self.0.iter().map(|(&c, &p)| (c, p))
    }
}

impl fmt::Display for SampleFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(c, p)| format!("{}={}", c, p)).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_least_one_eye_is_tracked() {
        assert!(TrackedEyes::from_flags(&[false, false]).is_err());
        assert!(TrackedEyes::from_flags(&[true, false]).is_ok());
        assert!(TrackedEyes::from_flags(&[false, true]).is_ok());
        assert!(TrackedEyes::from_flags(&[true, true]).is_ok());
        assert!(TrackedEyes::from_flags(&[true]).is_err());
        assert!(TrackedEyes::from_flags(&[true, true, true]).is_err());
    }

    #[test]
    fn tracked_eyes_iterate_left_first() {
        let eyes = TrackedEyes::from_flags(&[true, true]).unwrap();
        assert_eq!(eyes.iter().collect::<Vec<_>>(), vec![Eye::Left, Eye::Right]);
        let eyes = TrackedEyes::from_flags(&[false, true]).unwrap();
        assert_eq!(eyes.iter().collect::<Vec<_>>(), vec![Eye::Right]);
    }

    #[test]
    fn replicate_fills_the_requested_channels() {
        let p = Point::new(1.0, -2.0);
        let frame = SampleMode::Both.replicate(p);
        assert_eq!(frame.get(Channel::Left), Some(p));
        assert_eq!(frame.get(Channel::Right), Some(p));
        assert_eq!(frame.get(Channel::Average), None);

        let frame = SampleMode::Average.replicate(p);
        assert_eq!(frame.get(Channel::Average), Some(p));
        assert_eq!(frame.get(Channel::Left), None);
    }

    #[test]
    fn sample_modes_parse() {
        assert_eq!("average".parse::<SampleMode>().unwrap(), SampleMode::Average);
        assert!("cyclops".parse::<SampleMode>().is_err());
    }
}
