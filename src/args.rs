// Commandline argument parser using clap for GazeKit

use crate::backend::DeviceKind;
use crate::config::TrackerSettings;
use crate::error::Result;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[allow(missing_docs)]
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct GazeArgs {
    #[command(subcommand)]
    /// Which task to perform, run a session or check the settings
    pub command: CommandTask,

    /// Session settings file in RON. Built-in defaults are used without one
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Device to use, overrides the settings file. Asked for in the terminal
    /// when neither gives one
    #[arg(short = 'd', long = "device", value_enum)]
    pub device: Option<DeviceKind>,
}

#[allow(missing_docs)]
#[derive(Debug, Subcommand, Clone)]
pub enum CommandTask {
    /// Initialize, calibrate, run a block of fixation trials and shut down
    #[command(about)]
    Run(RunCommand),

    /// Validate the settings and print what the session would use
    #[command(about)]
    Check,
}

#[allow(missing_docs)]
#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct RunCommand {
    /// Number of gaze-contingent trials
    #[arg(short = 'n', long = "trials", default_value_t = 5)]
    pub trials: usize,

    /// Simulate the screen, keyboard and participant instead of using the
    /// terminal
    #[arg(long = "headless")]
    pub headless: bool,

    /// Seed for the calibration target order
    #[arg(short = 's', long = "seed")]
    pub seed: Option<u64>,

    /// Custom calibration targets for the vector device, e.g. "0,0 -5,0 5,0"
    #[arg(short = 't', long = "targets")]
    pub targets: Option<String>,

    /// Calibration area proportion for the precision device, horizontal and
    /// vertical
    #[arg(long = "scale", num_args = 2)]
    pub scale: Option<Vec<f64>>,
}

impl GazeArgs {
    /// The settings file, or the defaults, with the device override applied.
    pub fn load_settings(&self) -> Result<TrackerSettings> {
        let mut settings = match &self.config {
            Some(path) => TrackerSettings::from_path(path)?,
            None => TrackerSettings::default(),
        };
        if let Some(device) = self.device {
            settings.device = device.to_string();
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_arguments_parse() {
        let args = GazeArgs::try_parse_from([
            "gazekit", "--device", "vector", "run", "--trials", "3", "--headless", "--scale",
            "0.8", "0.7",
        ])
        .unwrap();
        assert_eq!(args.device, Some(DeviceKind::Vector));
        match args.command {
            CommandTask::Run(run) => {
                assert_eq!(run.trials, 3);
                assert!(run.headless);
                assert_eq!(run.scale, Some(vec![0.8, 0.7]));
            }
            CommandTask::Check => panic!("expected run"),
        }
    }

    #[test]
    fn device_flag_overrides_settings() {
        let args = GazeArgs::try_parse_from(["gazekit", "-d", "precision", "check"]).unwrap();
        assert_eq!(args.load_settings().unwrap().device, "precision");

        let args = GazeArgs::try_parse_from(["gazekit", "check"]).unwrap();
        assert_eq!(args.load_settings().unwrap(), TrackerSettings::default());
        assert!(GazeArgs::try_parse_from(["gazekit", "-d", "eyelink", "check"]).is_err());
    }
}
