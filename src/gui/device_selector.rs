use std::io::{stdout, Stdout};

use crate::backend::DeviceKind;
use crate::error::{Result, TrackerError};

use clap::ValueEnum;
use crossterm::{
    event::{self, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
    Terminal,
};

/// What the operator needs to know before committing to a device.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Capabilities {
    summary: &'static str,
    calibration: &'static str,
    raw_data: &'static str,
    eyes: &'static str,
    /// `run` flag that only this device reads
    run_option: Option<&'static str>,
}

fn capabilities(kind: DeviceKind) -> Capabilities {
    match kind {
        DeviceKind::Precision => Capabilities {
            summary: "binocular tracker with its own calibration screen",
            calibration: "vendor runtime, validated on the tracker",
            raw_data: ".EDF, renamed to the output name at shutdown",
            eyes: "left, right or both",
            run_option: Some("--scale <h> <v>"),
        },
        DeviceKind::Vector => Capabilities {
            summary: "camera tracker, calibrated here",
            calibration: "5 or 9 targets, redo on a lost eye",
            raw_data: ".csv per open_file, calibration_<n>.json",
            eyes: "left, right or both, averaged on request",
            run_option: Some("--targets \"x,y x,y ...\""),
        },
        DeviceKind::Pointer => Capabilities {
            summary: "the mouse stands in for gaze",
            calibration: "none, only counted",
            raw_data: "none",
            eyes: "one position for every eye",
            run_option: None,
        },
    }
}

fn detail_rows(kind: DeviceKind) -> Vec<(&'static str, &'static str)> {
    let caps = capabilities(kind);
    vec![
        ("device", caps.summary),
        ("calibration", caps.calibration),
        ("raw data", caps.raw_data),
        ("eyes", caps.eyes),
        ("run option", caps.run_option.unwrap_or("-")),
    ]
}

/// Lets the operator pick a device in the terminal. `None` if they quit.
pub fn device_selector() -> Result<Option<DeviceKind>> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let selected = Terminal::new(CrosstermBackend::new(stdout()))
        .map_err(TrackerError::from)
        .and_then(|mut terminal| select_loop(&mut terminal));

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    selected
}

fn select_loop(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<Option<DeviceKind>> {
    terminal.clear()?;
    let devices = DeviceKind::value_variants();
    let n_devices = devices.len();
    let mut cursor = 0;
    let mut list_state = ListState::default().with_selected(Some(cursor));

    loop {
        let instructions = Title::from(Line::from(vec![
            " Navigate ".into(),
            "<Up>/<Down>".magenta().bold(),
            " Select ".into(),
            "<Enter>".magenta().bold(),
            " Quit ".into(),
            "<Q> ".magenta().bold(),
        ]));
        let list = List::new(devices.iter().map(|d| d.to_string()))
            .style(Style::default().fg(Color::White))
            .highlight_symbol(">>")
            .highlight_style(Style::default().fg(Color::Magenta))
            .block(
                Block::default()
                    .title(Title::from(" Eye Tracker ".magenta().bold()))
                    .title(
                        instructions
                            .alignment(Alignment::Center)
                            .position(Position::Bottom),
                    )
                    .borders(Borders::ALL),
            );
        let details = Table::new(
            detail_rows(devices[cursor]).into_iter().map(|(label, value)| {
                Row::new(vec![Cell::from(label.magenta()), Cell::from(value)])
            }),
            [Constraint::Length(12), Constraint::Min(20)],
        )
        .block(
            Block::default()
                .title(" Capabilities ")
                .borders(Borders::ALL),
        );

        list_state.select(Some(cursor));
        terminal.draw(|frame| {
            let areas = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Length(24), Constraint::Min(40)])
                .split(frame.size());
            frame.render_stateful_widget(list, areas[0], &mut list_state);
            frame.render_widget(details, areas[1]);
        })?;

        if event::poll(std::time::Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Down => cursor = (cursor + 1) % n_devices,
                        KeyCode::Up => cursor = (cursor + n_devices - 1) % n_devices,
                        KeyCode::Enter => return Ok(Some(devices[cursor])),
                        KeyCode::Char('q') | KeyCode::Esc => return Ok(None),
                        _ => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_device_has_a_full_detail_panel() {
        for &kind in DeviceKind::value_variants() {
            let rows = detail_rows(kind);
            assert_eq!(rows.len(), 5);
            assert!(rows.iter().all(|(_, value)| !value.is_empty()), "{:?}", kind);
        }
    }

    #[test]
    fn run_options_match_the_devices_that_read_them() {
        let option = |kind| capabilities(kind).run_option;
        assert!(option(DeviceKind::Precision).unwrap().starts_with("--scale"));
        assert!(option(DeviceKind::Vector).unwrap().starts_with("--targets"));
        assert_eq!(option(DeviceKind::Pointer), None);
    }
}
