use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::app::PickerState;

/// What the picker loop should do after a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerAction {
    Continue,
    Chosen(usize),
    Cancelled,
}

/// Handle a key event for the picker.
pub fn handle_key(state: &mut PickerState, key: KeyEvent) -> PickerAction {
    if key.kind == KeyEventKind::Release {
        return PickerAction::Continue;
    }
    tracing::debug!(key = ?key.code, selected = state.selected, "picker key");

    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return PickerAction::Cancelled;
    }

    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => PickerAction::Cancelled,
        KeyCode::Down | KeyCode::Char('j') | KeyCode::Tab => {
            state.select_next();
            PickerAction::Continue
        }
        KeyCode::Up | KeyCode::Char('k') | KeyCode::BackTab => {
            state.select_prev();
            PickerAction::Continue
        }
        KeyCode::Home | KeyCode::Char('g') => {
            state.select_first();
            PickerAction::Continue
        }
        KeyCode::End | KeyCode::Char('G') => {
            state.select_last();
            PickerAction::Continue
        }
        KeyCode::Enter if !state.items.is_empty() => PickerAction::Chosen(state.selected),
        // 1-9 pick directly
        KeyCode::Char(c @ '1'..='9') => {
            let index = c as usize - '1' as usize;
            if state.select(index) {
                PickerAction::Chosen(index)
            } else {
                PickerAction::Continue
            }
        }
        _ => PickerAction::Continue,
    }
}
