use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, Widget, Wrap},
};
use typetrial::{diff::CharStatus, session::FinishReason};
use unicode_width::UnicodeWidthStr;

use crate::{App, AppState};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        match self.state {
            AppState::Typing => render_typing(self, area, buf),
            AppState::Results => render_results(self, area, buf),
            AppState::Records => render_records(self, area, buf),
        }
    }
}

fn render_typing(app: &App, area: Rect, buf: &mut Buffer) {
    let session = &app.session;
    let passage = session.passage();

    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let green_bold_style = bold_style.fg(Color::Green);
    let red_bold_style = bold_style.fg(Color::Red);
    let dim_bold_style = bold_style.add_modifier(Modifier::DIM);
    let underlined_dim_bold_style = dim_bold_style.add_modifier(Modifier::UNDERLINED);
    let italic_style = Style::default().add_modifier(Modifier::ITALIC);

    let max_chars_per_line = area.width.saturating_sub(HORIZONTAL_MARGIN * 2).max(1);
    let passage_width = passage.as_str().width();
    let passage_lines = if passage_width <= max_chars_per_line as usize {
        1
    } else {
        (passage_width as f64 / max_chars_per_line as f64).ceil() as u16 + 1
    };
    let padding = area.height.saturating_sub(passage_lines + 4) / 2;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .constraints([
            Constraint::Length(padding),
            Constraint::Length(2), // timer
            Constraint::Length(passage_lines),
            Constraint::Length(2), // status
            Constraint::Min(0),
        ])
        .split(area);

    let timer = Line::from(vec![
        Span::styled(format!("{}s", session.remaining_secs()), bold_style),
        Span::styled(
            format!(
                "  of {}s · {} · {}",
                session.configured_duration(),
                session.language(),
                session.tester()
            ),
            dim_bold_style,
        ),
    ]);
    Paragraph::new(timer)
        .alignment(Alignment::Center)
        .render(chunks[1], buf);

    let cursor_pos = session.input().len();
    let spans = passage
        .chars()
        .iter()
        .zip(&session.diff().statuses)
        .enumerate()
        .map(|(idx, (expected, status))| match status {
            CharStatus::Correct => Span::styled(expected.to_string(), green_bold_style),
            CharStatus::Incorrect => Span::styled(
                match expected {
                    ' ' => "·".to_owned(),
                    c => c.to_string(),
                },
                red_bold_style,
            ),
            CharStatus::Pending if idx == cursor_pos => {
                Span::styled(expected.to_string(), underlined_dim_bold_style)
            }
            CharStatus::Pending => Span::styled(expected.to_string(), dim_bold_style),
        })
        .collect::<Vec<Span>>();

    Paragraph::new(Line::from(spans))
        .alignment(if passage_lines == 1 {
            Alignment::Center
        } else {
            Alignment::Left
        })
        .wrap(Wrap { trim: true })
        .render(chunks[2], buf);

    Paragraph::new(vec![
        Line::from(Span::styled(app.status.as_str(), italic_style)),
        Line::from(Span::styled(
            "(←) restart / (→) new text / (ctrl-t) duration / (ctrl-l) language / (esc)ape",
            italic_style.add_modifier(Modifier::DIM),
        )),
    ])
    .alignment(Alignment::Center)
    .render(chunks[3], buf);
}

fn render_results(app: &App, area: Rect, buf: &mut Buffer) {
    let session = &app.session;
    let Some(score) = session.last_score() else {
        render_typing(app, area, buf);
        return;
    };

    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let magenta_style = Style::default().fg(Color::Magenta).patch(bold_style);
    let italic_style = Style::default().add_modifier(Modifier::ITALIC);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(1), // score
            Constraint::Length(1), // best
            Constraint::Length(1), // how it ended
            Constraint::Length(1), // padding
            Constraint::Length(1), // legend
            Constraint::Min(1),
        ])
        .split(area);

    Paragraph::new(Span::styled(
        format!(
            "{:.2} wpm   {} errors ({:.2}%)   {}s",
            score.wpm, score.error_count, score.error_percentage, score.elapsed_secs
        ),
        magenta_style,
    ))
    .alignment(Alignment::Center)
    .render(chunks[1], buf);

    Paragraph::new(Span::styled(
        format!("best {:.2} wpm · {}", session.best_wpm(), app.status),
        bold_style,
    ))
    .alignment(Alignment::Center)
    .render(chunks[2], buf);

    let ended = match session.finish_reason() {
        Some(FinishReason::TimedOut) => "time is up",
        _ => "passage completed",
    };
    Paragraph::new(Span::styled(ended, italic_style))
        .alignment(Alignment::Center)
        .render(chunks[3], buf);

    Paragraph::new(Span::styled(
        "(r)estart / (n)ew text / (b)est records / (esc)ape",
        italic_style,
    ))
    .alignment(Alignment::Center)
    .render(chunks[5], buf);
}

fn render_records(app: &App, area: Rect, buf: &mut Buffer) {
    let header_style = Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD);
    let own_style = Style::default().fg(Color::Green);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(VERTICAL_MARGIN)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(area);

    let rows = app
        .session
        .records()
        .entries()
        .into_iter()
        .map(|entry| {
            let style = if entry.tester == app.session.tester() {
                own_style
            } else {
                Style::default()
            };
            Row::new(vec![
                Cell::from(entry.tester),
                Cell::from(format!("{:.2}", entry.wpm)),
                Cell::from(entry.achieved_at.map_or_else(
                    || "-".to_string(),
                    |t| t.format("%Y-%m-%d %H:%M").to_string(),
                )),
            ])
            .style(style)
        })
        .collect::<Vec<Row>>();

    Table::new(
        rows,
        [
            Constraint::Percentage(40),
            Constraint::Percentage(25),
            Constraint::Percentage(35),
        ],
    )
    .header(Row::new(vec!["Tester", "Best WPM", "Set at"]).style(header_style))
    .block(Block::default().borders(Borders::ALL).title("Records"))
    .render(chunks[0], buf);

    Paragraph::new("(b)ack / (r)estart / (n)ew text / (esc)ape")
        .alignment(Alignment::Center)
        .render(chunks[1], buf);
}
