//! Terminal front end: a device picker, and presentation collaborators that
//! draw in the terminal and read its keyboard and mouse.

mod device_selector;
mod terminal;

pub use device_selector::device_selector;
pub use terminal::{open_terminal, ScreenGeometry, TerminalKeyboard, TerminalPointer, TerminalScreen};
