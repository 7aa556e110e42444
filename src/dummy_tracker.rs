//! Simulated devices for running sessions without hardware.
//!
//! A [Participant] holds where the simulated eyes are looking. The devices
//! read it: [SimulatedVectorDriver] turns it into pupil-to-glint vectors,
//! [SimulatedLink] into screen pixels, [ScriptedPointer] ignores it and
//! follows a function of time instead.

use crate::backend::precision::{PrecisionLink, PrecisionRuntimeConfig, DEFAULT_ARTIFACT};
use crate::backend::vector::{
    CaptureConfig, EyeReading, RawSample, ResultMode, VectorDriver,
};
use crate::calibration::CalibrationTransform;
use crate::error::{Result, TrackerError};
use crate::presentation::{Clock, PointerSource};
use crate::sample::Eye;
use crate::Point;

use log::{debug, info};
use rand::prelude::*;
use std::{
    collections::{BTreeMap, VecDeque},
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

#[derive(Debug, Clone, Copy)]
struct ParticipantState {
    gaze: Point,
    lost: [bool; 2],
    noise: f64,
}

/// Shared, clonable handle on a simulated participant. Clones see the same
/// eyes.
#[derive(Debug, Clone)]
pub struct Participant {
    state: Arc<Mutex<ParticipantState>>,
}

impl Participant {
    /// Looking at the centre, both eyes visible, a little noise.
    pub fn new() -> Self {
        Participant {
            state: Arc::new(Mutex::new(ParticipantState {
                gaze: Point::ORIGIN,
                lost: [false, false],
                noise: 0.5,
            })),
        }
    }

    /// Look at `target`, in degrees.
    pub fn look_at(&self, target: Point) {
        self.state.lock().unwrap().gaze = target;
    }

    #[allow(missing_docs)]
    pub fn gaze(&self) -> Point {
        self.state.lock().unwrap().gaze
    }

    /// Hide `eye` from the camera, e.g. behind a droopy eyelid.
    pub fn lose_eye(&self, eye: Eye) {
        self.state.lock().unwrap().lost[eye.index()] = true;
    }

    #[allow(missing_docs)]
    pub fn restore_eye(&self, eye: Eye) {
        self.state.lock().unwrap().lost[eye.index()] = false;
    }

    #[allow(missing_docs)]
    pub fn is_lost(&self, eye: Eye) -> bool {
        self.state.lock().unwrap().lost[eye.index()]
    }

    /// Peak sensor noise, in camera pixels.
    pub fn set_noise(&self, noise: f64) {
        self.state.lock().unwrap().noise = noise.abs();
    }

    fn snapshot(&self) -> ParticipantState {
        *self.state.lock().unwrap()
    }
}

impl Default for Participant {
    fn default() -> Self {
        Self::new()
    }
}

/// A pointer whose position is a function of time.
pub struct ScriptedPointer {
    clock: Arc<dyn Clock>,
    start: f64,
    path: Box<dyn Fn(f64) -> Point>,
}

impl ScriptedPointer {
    /// `path` receives the seconds since the pointer was made.
    pub fn new(clock: Arc<dyn Clock>, path: impl Fn(f64) -> Point + 'static) -> Self {
        let start = clock.now();
        ScriptedPointer {
            clock,
            start,
            path: Box::new(path),
        }
    }

    /// A pointer that never moves.
    pub fn fixed(clock: Arc<dyn Clock>, position: Point) -> Self {
        Self::new(clock, move |_| position)
    }
}

impl PointerSource for ScriptedPointer {
    fn position(&self) -> Point {
        (self.path)(self.clock.now() - self.start)
    }
}

const BUFFER_CAPACITY: usize = 4096;

/// A camera tracker that watches a [Participant].
///
/// The camera sees `pixels_per_degree` pixels of pupil-to-glint vector per
/// degree of gaze, plus uniform noise, with the glint fixed near the image
/// centre. Samples are produced lazily at the capture rate whenever the
/// driver is polled, and go to a CSV data file while one is open.
pub struct SimulatedVectorDriver {
    clock: Arc<dyn Clock>,
    participant: Participant,
    capture: CaptureConfig,
    pixels_per_degree: f64,
    mode: ResultMode,
    running: bool,
    tracking: bool,
    enabled: [bool; 2],
    buffer: VecDeque<(f64, RawSample)>,
    generated_until: f64,
    calibration: BTreeMap<Eye, CalibrationTransform>,
    data_file: Option<BufWriter<File>>,
    pending_comment: Option<String>,
    rng: StdRng,
}

impl SimulatedVectorDriver {
    /// A 640x480 camera at 500 Hz.
    pub fn new(clock: Arc<dyn Clock>, participant: Participant) -> Self {
        SimulatedVectorDriver {
            clock,
            participant,
            capture: CaptureConfig {
                width: 640,
                height: 480,
                sample_rate: 500.0,
                offset_x: 0,
                offset_y: 0,
            },
            pixels_per_degree: 4.0,
            mode: ResultMode::Raw,
            running: false,
            tracking: false,
            enabled: [true, true],
            buffer: VecDeque::with_capacity(BUFFER_CAPACITY),
            generated_until: 0.0,
            calibration: BTreeMap::new(),
            data_file: None,
            pending_comment: None,
            rng: StdRng::seed_from_u64(0x6a7e),
        }
    }

    /// Change the capture rate.
    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.capture.sample_rate = sample_rate;
        self
    }

    fn glint(&self) -> Point {
        Point::new(self.capture.width as f64 / 2.0, self.capture.height as f64 / 2.0)
    }

    fn require_running(&self, what: &str) -> Result<()> {
        if self.running {
            Ok(())
        } else {
            Err(TrackerError::Device(format!("{}: device not initialized", what)))
        }
    }

    fn reading(&self, eye: Eye, state: &ParticipantState, jitter: (f64, f64)) -> EyeReading {
        if !self.enabled[eye.index()] || state.lost[eye.index()] {
            return EyeReading::LOST;
        }
        let vector = Point::new(
            state.gaze.x * self.pixels_per_degree + jitter.0,
            -state.gaze.y * self.pixels_per_degree + jitter.1,
        );
        let gaze = match (self.mode, self.calibration.get(&eye)) {
            (ResultMode::Calibrated, Some(transform)) => transform.apply(vector),
            _ => Point::NAN,
        };
        EyeReading {
            vector,
            glint: self.glint(),
            gaze,
            tracked: true,
        }
    }

    /// What the camera sees right now.
    fn observe(&mut self) -> RawSample {
        let state = self.participant.snapshot();
        let noise: [f64; 4] = std::array::from_fn(|_| {
            if state.noise > 0.0 {
                self.rng.gen_range(-state.noise..state.noise)
            } else {
                0.0
            }
        });
        RawSample {
            left: self.reading(Eye::Left, &state, (noise[0], noise[1])),
            right: self.reading(Eye::Right, &state, (noise[2], noise[3])),
        }
    }

    /// Produce the samples the camera took since the last poll.
    fn pump(&mut self) -> Result<()> {
        let now = self.clock.now();
        if !self.tracking {
            self.generated_until = now;
            return Ok(());
        }

        let period = 1.0 / self.capture.sample_rate;
        let due = ((now - self.generated_until) / period).floor().max(0.0) as usize;
        if due > BUFFER_CAPACITY {
            self.generated_until = now - BUFFER_CAPACITY as f64 * period;
        }

        for _ in 0..due.min(BUFFER_CAPACITY) {
            self.generated_until += period;
            let sample = self.observe();
            if let Some(file) = self.data_file.as_mut() {
                let comment = self.pending_comment.take().unwrap_or_default();
                writeln!(
                    file,
                    "{:.4},{:.3},{:.3},{:.3},{:.3},{}",
                    self.generated_until,
                    sample.left.vector.x,
                    sample.left.vector.y,
                    sample.right.vector.x,
                    sample.right.vector.y,
                    comment
                )?;
            }
            if self.buffer.len() == BUFFER_CAPACITY {
                self.buffer.pop_front();
            }
            self.buffer.push_back((self.generated_until, sample));
        }
        Ok(())
    }
}

impl VectorDriver for SimulatedVectorDriver {
    fn init(&mut self) -> Result<()> {
        self.running = true;
        self.generated_until = self.clock.now();
        info!("simulated vector tracker opened");
        Ok(())
    }

    fn set_result_mode(&mut self, mode: ResultMode) -> Result<()> {
        self.require_running("set_result_mode")?;
        self.mode = mode;
        Ok(())
    }

    fn start_tracking(&mut self) -> Result<()> {
        self.require_running("start_tracking")?;
        self.pump()?;
        self.tracking = true;
        Ok(())
    }

    fn stop_tracking(&mut self) -> Result<()> {
        self.pump()?;
        self.tracking = false;
        Ok(())
    }

    fn set_tracking(&mut self, left: bool, right: bool) -> Result<()> {
        self.enabled = [left, right];
        Ok(())
    }

    fn capture_config(&mut self) -> Result<CaptureConfig> {
        self.require_running("capture_config")?;
        Ok(self.capture)
    }

    fn buffered_samples(&mut self, count: usize) -> Result<Vec<RawSample>> {
        self.pump()?;
        let skip = self.buffer.len().saturating_sub(count);
        Ok(self.buffer.iter().skip(skip).map(|(_, s)| *s).collect())
    }

    fn clear_buffer(&mut self) -> Result<()> {
        self.pump()?;
        self.buffer.clear();
        Ok(())
    }

    fn last_result(&mut self) -> Result<RawSample> {
        self.require_running("last_result")?;
        self.pump()?;
        Ok(self.observe())
    }

    fn set_calibration(&mut self, eye: Eye, transform: &CalibrationTransform) -> Result<()> {
        self.calibration.insert(eye, transform.clone());
        Ok(())
    }

    fn open_data_file(&mut self, path: &Path) -> Result<()> {
        self.pump()?;
        let mut file = BufWriter::new(File::create(path)?);
        writeln!(file, "time,left_vx,left_vy,right_vx,right_vy,comment")?;
        self.data_file = Some(file);
        Ok(())
    }

    fn close_data_file(&mut self) -> Result<()> {
        self.pump()?;
        if let Some(mut file) = self.data_file.take() {
            if let Some(comment) = self.pending_comment.take() {
                writeln!(file, "{:.4},,,,,{}", self.generated_until, comment)?;
            }
            file.flush()?;
        }
        Ok(())
    }

    fn set_comment(&mut self, text: &str) -> Result<()> {
        self.pump()?;
        self.pending_comment = Some(text.to_owned());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.close_data_file()?;
        self.running = false;
        info!("simulated vector tracker closed");
        Ok(())
    }
}

/// Shared record of what a [SimulatedLink] was told.
pub type LinkLog = Arc<Mutex<Vec<String>>>;

/// A vendor runtime that watches a [Participant] on a screen of the given
/// geometry, and writes its messages to [DEFAULT_ARTIFACT].
pub struct SimulatedLink {
    participant: Participant,
    size_pix: (u32, u32),
    deg_per_pix: f64,
    artifact: Option<BufWriter<File>>,
    log: LinkLog,
}

impl SimulatedLink {
    #[allow(missing_docs)]
    pub fn new(participant: Participant, size_pix: (u32, u32), deg_per_pix: f64) -> Self {
        SimulatedLink {
            participant,
            size_pix,
            deg_per_pix,
            artifact: None,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle on every command and message sent so far.
    pub fn log(&self) -> LinkLog {
        Arc::clone(&self.log)
    }

    fn record(&mut self, line: String) -> Result<()> {
        debug!("simulated link: {}", line);
        if let Some(file) = self.artifact.as_mut() {
            writeln!(file, "{}", line)?;
        }
        self.log.lock().unwrap().push(line);
        Ok(())
    }
}

impl PrecisionLink for SimulatedLink {
    fn connect(&mut self, config: &PrecisionRuntimeConfig, work_dir: &Path) -> Result<()> {
        let path: PathBuf = work_dir.join(DEFAULT_ARTIFACT);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        self.artifact = Some(BufWriter::new(file));
        self.record(format!(
            "CONNECT {} {:?} {} Hz",
            config.model_name, config.track_eyes, config.sampling_rate
        ))
    }

    fn send_command(&mut self, command: &str, args: &str) -> Result<()> {
        self.record(format!("CMD {} {}", command, args))
    }

    fn run_setup(&mut self) -> Result<String> {
        self.record("SETUP".to_owned())?;
        Ok("calibration accepted".to_owned())
    }

    fn set_recording(&mut self, recording: bool) -> Result<()> {
        self.record(format!("RECORDING {}", recording))
    }

    fn last_gaze(&mut self) -> Option<(f64, f64)> {
        if self.participant.is_lost(Eye::Left) && self.participant.is_lost(Eye::Right) {
            return None;
        }
        let gaze = self.participant.gaze();
        let (width, height) = self.size_pix;
        let offset = ((width as f64 - 1.0) / 2.0, (height as f64 - 1.0) / 2.0);
        Some((
            offset.0 + gaze.x / self.deg_per_pix,
            offset.1 - gaze.y / self.deg_per_pix,
        ))
    }

    fn send_message(&mut self, text: &str) -> Result<()> {
        self.record(format!("MSG {}", text))
    }

    fn disconnect(&mut self) -> Result<()> {
        self.record("DISCONNECT".to_owned())?;
        if let Some(mut file) = self.artifact.take() {
            file.flush()?;
        }
        Ok(())
    }
}
