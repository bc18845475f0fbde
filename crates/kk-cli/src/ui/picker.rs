use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph};
use ratatui::Frame;

use crate::app::PickerState;
use crate::ui::layout::centered_rect;

/// Render the selection dialog.
pub fn render(f: &mut Frame, state: &PickerState) {
    let area = centered_rect(60, 60, f.area());
    f.render_widget(Clear, area);

    let block = Block::default()
        .title(state.title.as_str())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(1), // prompt
            Constraint::Length(1), // blank
            Constraint::Min(3),    // list
            Constraint::Length(1), // help
        ])
        .split(inner);

    f.render_widget(
        Paragraph::new(Span::styled(
            state.prompt.as_str(),
            Style::default().fg(Color::White),
        )),
        chunks[0],
    );

    if state.items.is_empty() {
        f.render_widget(
            Paragraph::new(Span::styled(
                " Nothing to choose from.",
                Style::default().fg(Color::DarkGray),
            )),
            chunks[2],
        );
    } else {
        let items: Vec<ListItem> = state
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let mut spans = vec![
                    Span::styled(format!("{:>2} ", i + 1), Style::default().fg(Color::DarkGray)),
                    Span::styled(item.label.clone(), Style::default().fg(Color::White)),
                ];
                if let Some(detail) = &item.detail {
                    spans.push(Span::styled(
                        format!("  ({detail})"),
                        Style::default().fg(Color::DarkGray),
                    ));
                }
                ListItem::new(Line::from(spans))
            })
            .collect();

        let list = List::new(items)
            .highlight_style(
                Style::default()
                    .bg(Color::Rgb(0x1A, 0x3A, 0x5C))
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("> ");

        let mut list_state = ListState::default();
        list_state.select(Some(state.selected));
        f.render_stateful_widget(list, chunks[2], &mut list_state);
    }

    let help = Line::from(vec![
        Span::styled(" ↑↓", Style::default().fg(Color::Yellow)),
        Span::styled(" move  ", Style::default().fg(Color::DarkGray)),
        Span::styled("Enter", Style::default().fg(Color::Yellow)),
        Span::styled(" select  ", Style::default().fg(Color::DarkGray)),
        Span::styled("1-9", Style::default().fg(Color::Yellow)),
        Span::styled(" pick  ", Style::default().fg(Color::DarkGray)),
        Span::styled("Esc", Style::default().fg(Color::Yellow)),
        Span::styled(" cancel", Style::default().fg(Color::DarkGray)),
    ]);
    f.render_widget(Paragraph::new(help), chunks[3]);
}
