pub mod layout;
pub mod picker;

use ratatui::Frame;

use crate::app::PickerState;

/// Draw one frame of an interactive prompt.
pub fn render(f: &mut Frame, state: &PickerState) {
    picker::render(f, state);
}
