//! A tracker without hardware: the pointer is the gaze.

use super::{CalibrationOutcome, CalibrationReport, GazeBackend, InitOptions, TrackerContext};
use crate::error::{invalid, Result};
use crate::presentation::PointerSource;
use crate::sample::SampleFrame;

use log::info;
use std::{collections::BTreeMap, path::PathBuf};

/// Reports the pointer position as the gaze of every requested channel.
/// Files and recording are no-ops.
pub struct PointerStub {
    pointer: Box<dyn PointerSource>,
}

impl PointerStub {
    #[allow(missing_docs)]
    pub fn new(pointer: Box<dyn PointerSource>) -> Self {
        PointerStub { pointer }
    }
}

impl GazeBackend for PointerStub {
    fn name(&self) -> &'static str {
        "pointer"
    }

    fn raw_extension(&self) -> &'static str {
        "txt"
    }

    fn initialize(&mut self, _ctx: &mut TrackerContext, options: InitOptions) -> Result<()> {
        if options != InitOptions::Default {
            return invalid("the pointer tracker takes no initialization options");
        }
        info!("pointer tracker initialized, the pointer stands in for gaze");
        Ok(())
    }

    fn calibrate(&mut self, ctx: &mut TrackerContext) -> Result<CalibrationOutcome> {
        ctx.session.calibration_count += 1;
        let index = ctx.session.calibration_count;
        self.comment(ctx, &format!("calibration {}", index))?;
        Ok(CalibrationOutcome::Calibrated(CalibrationReport {
            index,
            errors: BTreeMap::new(),
        }))
    }

    fn save_calibration(&mut self, _ctx: &mut TrackerContext) -> Result<Option<PathBuf>> {
        info!("pointer tracker has no calibration to save");
        Ok(None)
    }

    fn last_sample(&mut self, ctx: &mut TrackerContext) -> Result<SampleFrame> {
        Ok(ctx.config.sample_mode().replicate(self.pointer.position()))
    }

    fn open_file(
        &mut self,
        _ctx: &mut TrackerContext,
        name: Option<&str>,
    ) -> Result<Option<PathBuf>> {
        info!(
            "pointer tracker does not open a data file ({})",
            name.unwrap_or("unnamed")
        );
        Ok(None)
    }

    fn close_file(&mut self, _ctx: &mut TrackerContext) -> Result<()> {
        info!("pointer tracker does not close a data file");
        Ok(())
    }

    fn start_collecting(&mut self, _ctx: &mut TrackerContext) -> Result<()> {
        info!("pointer tracker does not record");
        Ok(())
    }

    fn stop_collecting(&mut self, _ctx: &mut TrackerContext) -> Result<()> {
        info!("pointer tracker does not record");
        Ok(())
    }

    fn comment(&mut self, _ctx: &mut TrackerContext, text: &str) -> Result<()> {
        info!("pointer tracker comment: {}", text);
        Ok(())
    }

    fn shutdown(&mut self, _ctx: &mut TrackerContext) -> Result<()> {
        info!("pointer tracker shut down");
        Ok(())
    }
}
