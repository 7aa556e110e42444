use std::{
    collections::VecDeque,
    io::{stdout, Stdout},
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::dummy_tracker::Participant;
use crate::error::Result;
use crate::presentation::{Key, Keyboard, PointerSource, Surface};
use crate::Point;

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{self, disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    widgets::{
        canvas::{Canvas, Circle, Points},
        *,
    },
    Terminal,
};

/// The physical screen the terminal pretends to be.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenGeometry {
    /// cm
    pub view_distance: f64,
    #[allow(missing_docs)]
    pub size_pix: (u32, u32),
    #[allow(missing_docs)]
    pub deg_per_pix: f64,
}

impl Default for ScreenGeometry {
    fn default() -> Self {
        ScreenGeometry {
            view_distance: 57.0,
            size_pix: (1920, 1080),
            deg_per_pix: 0.025,
        }
    }
}

impl ScreenGeometry {
    /// Half the screen's width and height, in degrees.
    fn half_extent(&self) -> (f64, f64) {
        (
            self.size_pix.0 as f64 * self.deg_per_pix / 2.0,
            self.size_pix.1 as f64 * self.deg_per_pix / 2.0,
        )
    }

    /// Degrees at the centre of terminal cell `(column, row)`.
    fn cell_to_degrees(&self, column: u16, row: u16, cols: u16, rows: u16) -> Point {
        let (hw, hh) = self.half_extent();
        let fx = (column as f64 + 0.5) / cols.max(1) as f64;
        let fy = (row as f64 + 0.5) / rows.max(1) as f64;
        Point::new(-hw + fx * 2.0 * hw, hh - fy * 2.0 * hh)
    }
}

#[derive(Debug, Default)]
struct InputState {
    pointer: Point,
    keys: VecDeque<Key>,
}

type SharedInput = Arc<Mutex<InputState>>;

fn translate(code: KeyCode) -> Option<Key> {
    match code {
        KeyCode::Char(' ') => Some(Key::Space),
        KeyCode::Char(c) => Some(Key::Char(c)),
        KeyCode::Enter => Some(Key::Enter),
        KeyCode::Esc => Some(Key::Escape),
        _ => None,
    }
}

/// Move every terminal event that arrives within `timeout` into `input`.
fn pump_events(input: &SharedInput, geometry: &ScreenGeometry, timeout: Duration) -> Result<()> {
    let mut timeout = timeout;
    while event::poll(timeout)? {
        timeout = Duration::ZERO;
        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                if let Some(key) = translate(key.code) {
                    input.lock().unwrap().keys.push_back(key);
                }
            }
            Event::Mouse(mouse) => {
                let (cols, rows) = terminal::size()?;
                input.lock().unwrap().pointer =
                    geometry.cell_to_degrees(mouse.column, mouse.row, cols, rows);
            }
            _ => {}
        }
    }
    Ok(())
}

/// Takes over the terminal and returns the three collaborators that share
/// it. The terminal is restored when the [TerminalScreen] is dropped.
pub fn open_terminal(
    geometry: ScreenGeometry,
) -> Result<(TerminalScreen, TerminalKeyboard, TerminalPointer)> {
    enable_raw_mode()?;
    execute!(stdout(), EnterAlternateScreen, EnableMouseCapture)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let input = SharedInput::default();
    Ok((
        TerminalScreen {
            terminal,
            geometry,
            targets: Vec::new(),
            texts: Vec::new(),
            visible: true,
            follower: None,
        },
        TerminalKeyboard {
            input: Arc::clone(&input),
            geometry,
        },
        TerminalPointer { input, geometry },
    ))
}

/// A [Surface] drawn with ratatui. Targets go on a canvas spanning the
/// screen's extent in degrees, text in a centred paragraph.
pub struct TerminalScreen {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    geometry: ScreenGeometry,
    targets: Vec<(Point, f64, f64)>,
    texts: Vec<String>,
    visible: bool,
    follower: Option<Participant>,
}

impl TerminalScreen {
    /// Make a simulated participant look at every target shown.
    pub fn followed_by(mut self, participant: Participant) -> Self {
        self.follower = Some(participant);
        self
    }
}

impl Surface for TerminalScreen {
    fn draw_target(&mut self, pos: Point, outer_diameter: f64, inner_diameter: f64) {
        self.targets.push((pos, outer_diameter, inner_diameter));
    }

    fn draw_text(&mut self, text: &str) {
        self.texts.push(text.to_owned());
    }

    fn flip(&mut self) -> Result<()> {
        let targets = std::mem::take(&mut self.targets);
        let texts = std::mem::take(&mut self.texts);
        if let (Some(participant), Some((pos, _, _))) = (&self.follower, targets.first()) {
            participant.look_at(*pos);
        }
        if !self.visible {
            return Ok(());
        }

        let (hw, hh) = self.geometry.half_extent();
        self.terminal.draw(|frame| {
            let area = frame.size();
            let canvas = Canvas::default()
                .block(Block::default().borders(Borders::ALL).title(" gazekit "))
                .marker(symbols::Marker::Braille)
                .x_bounds([-hw, hw])
                .y_bounds([-hh, hh])
                .paint(|ctx| {
                    for (pos, outer, inner) in &targets {
                        ctx.draw(&Circle {
                            x: pos.x,
                            y: pos.y,
                            radius: outer / 2.0,
                            color: Color::White,
                        });
                        ctx.draw(&Circle {
                            x: pos.x,
                            y: pos.y,
                            radius: inner / 2.0,
                            color: Color::Magenta,
                        });
                        ctx.draw(&Points {
                            coords: &[(pos.x, pos.y)],
                            color: Color::Magenta,
                        });
                    }
                });
            frame.render_widget(canvas, area);

            if !texts.is_empty() {
                let lines: Vec<Line> = texts
                    .iter()
                    .flat_map(|t| t.lines())
                    .map(|l| Line::from(l.to_owned()))
                    .collect();
                let height = (lines.len() as u16 + 2).min(area.height);
                let text_area = Rect::new(
                    area.x,
                    area.y + (area.height - height) / 2,
                    area.width,
                    height,
                );
                frame.render_widget(Clear, text_area);
                frame.render_widget(
                    Paragraph::new(lines)
                        .alignment(Alignment::Center)
                        .block(Block::default().borders(Borders::ALL)),
                    text_area,
                );
            }
        })?;
        Ok(())
    }

    fn set_visible(&mut self, visible: bool) -> Result<()> {
        self.visible = visible;
        if !visible {
            self.terminal.clear()?;
        }
        Ok(())
    }

    fn view_distance(&self) -> f64 {
        self.geometry.view_distance
    }

    fn size_pix(&self) -> (u32, u32) {
        self.geometry.size_pix
    }

    fn deg_per_pix(&self) -> f64 {
        self.geometry.deg_per_pix
    }
}

impl Drop for TerminalScreen {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(
            self.terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        );
        let _ = self.terminal.show_cursor();
    }
}

/// Key presses from the terminal.
pub struct TerminalKeyboard {
    input: SharedInput,
    geometry: ScreenGeometry,
}

impl Keyboard for TerminalKeyboard {
    fn wait_keys(&mut self, accepted: &[Key]) -> Result<Key> {
        loop {
            let next = self.input.lock().unwrap().keys.pop_front();
            match next {
                Some(key) if accepted.contains(&key) => return Ok(key),
                Some(_) => continue,
                None => pump_events(&self.input, &self.geometry, Duration::from_millis(16))?,
            }
        }
    }
}

/// The mouse position, in degrees from the screen centre.
pub struct TerminalPointer {
    input: SharedInput,
    geometry: ScreenGeometry,
}

impl PointerSource for TerminalPointer {
    fn position(&self) -> Point {
        if let Err(e) = pump_events(&self.input, &self.geometry, Duration::ZERO) {
            log::warn!("could not read terminal events: {}", e);
        }
        self.input.lock().unwrap().pointer
    }
}
