//! Runs one eye-tracking session: initialize, calibrate, a block of
//! gaze-contingent fixation trials, shut down.
//!
//! Without `--headless` the session draws in the terminal. The pointer
//! device then follows the mouse, and the other devices watch a simulated
//! participant who looks at whatever target is shown.

use clap::Parser;
use gazekit::{
    args::{CommandTask, GazeArgs, RunCommand},
    backend::{CalibrationOutcome, DeviceKind, InitOptions},
    config::TrackerSettings,
    dummy_tracker::{Participant, ScriptedPointer, SimulatedLink, SimulatedVectorDriver},
    gui::{device_selector, open_terminal, ScreenGeometry},
    headless::{HeadlessSurface, ScriptedKeyboard, SimClock},
    presentation::{Clock, Key, Presentation, Surface, SystemClock},
    tracker::EyeTrackerBuilder,
    EyeTracker, TrackerError,
};

use log::{info, warn};
use std::{error::Error, sync::Arc};

// Example:
// cargo run --bin gazekit --
//                         --config  session.ron
//                         --device  vector run
//                         --trials  3
//                         --headless
//                         --targets "0,0 -5,0 5,0 0,4 0,-4"

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = GazeArgs::parse();
    let mut settings = args.load_settings()?;

    let run = match &args.command {
        CommandTask::Check => return check(&settings),
        CommandTask::Run(run) => run.clone(),
    };

    if args.device.is_none() && args.config.is_none() && !run.headless {
        match device_selector()? {
            Some(kind) => settings.device = kind.to_string(),
            None => return Ok(()),
        }
    }

    let options = init_options(&run)?;
    let builder = EyeTracker::builder()
        .config(settings.to_config()?)
        .device(settings.device.clone());
    let builder = match run.seed {
        Some(seed) => builder.seed(seed),
        None => builder,
    };
    let kind: DeviceKind = settings.device.parse()?;
    let mut tracker = if run.headless {
        headless(builder, kind)?
    } else {
        in_terminal(builder, kind)?
    };

    let result = run_session(&mut tracker, options, run.trials);
    let warnings = tracker.take_warnings();
    // Gives the terminal back before anything is printed
    drop(tracker);

    for warning in &warnings {
        println!("warning: {}", warning);
    }
    result?;
    Ok(())
}

fn check(settings: &TrackerSettings) -> Result<(), Box<dyn Error>> {
    settings.device.parse::<DeviceKind>()?;
    let config = settings.to_config()?;
    println!(
        "{}",
        ron::ser::to_string_pretty(settings, ron::ser::PrettyConfig::default())?
    );
    match config.output() {
        Some(output) => println!(
            "raw data goes to {}",
            output.folder.join(&output.base_name).display()
        ),
        None => println!("storage is disabled"),
    }
    Ok(())
}

fn init_options(run: &RunCommand) -> Result<InitOptions, TrackerError> {
    if let Some(targets) = &run.targets {
        return Ok(InitOptions::Targets(targets.parse()?));
    }
    Ok(match run.scale.as_deref() {
        Some(&[horizontal, vertical]) => InitOptions::CalibrationScale(horizontal, vertical),
        _ => InitOptions::Default,
    })
}

/// Simulated screen, keyboard and participant on simulated time.
fn headless(builder: EyeTrackerBuilder, kind: DeviceKind) -> Result<EyeTracker, TrackerError> {
    let clock = Arc::new(SimClock::default());
    let participant = Participant::new();
    let surface = HeadlessSurface::new(Arc::clone(&clock)).followed_by(participant.clone());
    let (size_pix, deg_per_pix) = (surface.size_pix(), surface.deg_per_pix());
    let clock: Arc<dyn Clock> = clock;
    let presentation = Presentation::new(
        Box::new(surface),
        Box::new(ScriptedKeyboard::new([Key::Space; 8])),
        Arc::clone(&clock),
    );

    let builder = builder.presentation(presentation);
    let builder = match kind {
        DeviceKind::Precision => builder.precision_link(Box::new(SimulatedLink::new(
            participant,
            size_pix,
            deg_per_pix,
        ))),
        DeviceKind::Vector => {
            builder.vector_driver(Box::new(SimulatedVectorDriver::new(clock, participant)))
        }
        DeviceKind::Pointer => {
            builder.pointer(Box::new(ScriptedPointer::new(clock, move |_| participant.gaze())))
        }
    };
    builder.build()
}

/// The terminal as screen and keyboard, the mouse as pointer.
fn in_terminal(builder: EyeTrackerBuilder, kind: DeviceKind) -> Result<EyeTracker, TrackerError> {
    let geometry = ScreenGeometry::default();
    let (screen, keyboard, pointer) = open_terminal(geometry)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let participant = Participant::new();
    let screen = screen.followed_by(participant.clone());
    let presentation = Presentation::new(Box::new(screen), Box::new(keyboard), Arc::clone(&clock));

    let builder = builder.presentation(presentation);
    let builder = match kind {
        DeviceKind::Precision => builder.precision_link(Box::new(SimulatedLink::new(
            participant,
            geometry.size_pix,
            geometry.deg_per_pix,
        ))),
        DeviceKind::Vector => {
            builder.vector_driver(Box::new(SimulatedVectorDriver::new(clock, participant)))
        }
        DeviceKind::Pointer => builder.pointer(Box::new(pointer)),
    };
    builder.build()
}

fn run_session(
    tracker: &mut EyeTracker,
    options: InitOptions,
    trials: usize,
) -> Result<(), TrackerError> {
    tracker.initialize(options)?;

    match tracker.calibrate()? {
        CalibrationOutcome::Calibrated(report) => {
            info!("calibration {} done: {:?}", report.index, report.errors)
        }
        CalibrationOutcome::Redo { attempts } => {
            warn!("no usable calibration after {} attempt(s), stopping", attempts);
            return tracker.shutdown();
        }
    }

    tracker.open_file(None)?;
    tracker.start_collecting()?;
    let mut fixated = 0;
    for trial in 1..=trials {
        tracker.comment(&format!("trial {} start", trial))?;
        if tracker.wait_for_fixation(None, None, None)? {
            fixated += 1;
            tracker.comment(&format!("trial {} fixation", trial))?;
        } else {
            tracker.comment(&format!("trial {} timeout", trial))?;
        }
    }
    tracker.stop_collecting()?;
    tracker.close_file()?;
    info!("{} of {} trials reached fixation", fixated, trials);

    tracker.shutdown()
}
