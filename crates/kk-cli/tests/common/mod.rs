// Each test binary compiles this module independently and uses a different
// subset of helpers, so unused-function warnings are expected.
#![allow(dead_code)]

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyEventState, KeyModifiers};
use ratatui::{backend::TestBackend, Terminal};

use kk_cli::app::PickerState;
use kk_cli::ui;
use kk_core::models::FolderDescriptor;

/// Render the picker to a string using a TestBackend of the given dimensions.
pub fn render_to_string(state: &PickerState, width: u16, height: u16) -> String {
    let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
    terminal.draw(|f| ui::render(f, state)).unwrap();
    terminal.backend().to_string()
}

pub fn press(code: KeyCode) -> KeyEvent {
    KeyEvent {
        code,
        modifiers: KeyModifiers::NONE,
        kind: KeyEventKind::Press,
        state: KeyEventState::NONE,
    }
}

pub fn ctrl(c: char) -> KeyEvent {
    KeyEvent {
        code: KeyCode::Char(c),
        modifiers: KeyModifiers::CONTROL,
        kind: KeyEventKind::Press,
        state: KeyEventState::NONE,
    }
}

pub fn make_folders() -> Vec<FolderDescriptor> {
    vec![
        FolderDescriptor {
            id: "AbCdEfGhIjKlMnOpQrStUv".into(),
            name: "Production".into(),
        },
        FolderDescriptor {
            id: "ZyXwVuTsRqPoNmLkJiHgFe".into(),
            name: "Staging".into(),
        },
        FolderDescriptor {
            id: "0123456789abcdefghij-_".into(),
            name: "Team Shared".into(),
        },
    ]
}
