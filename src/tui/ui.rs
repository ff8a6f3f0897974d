use chrono::Utc;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, Focus, NoticeKind};

use super::format::{mask, relative_time, truncate};

pub fn draw(frame: &mut Frame, app: &App) {
    // Main horizontal split: 2/3 left, 1/3 right
    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Ratio(2, 3), // Left pane: form + outcome
            Constraint::Ratio(1, 3), // Right pane: stats + history
        ])
        .split(frame.area());

    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),  // Title bar
            Constraint::Length(11), // Form
            Constraint::Min(0),     // Progress / result / error
            Constraint::Length(1),  // Status line
        ])
        .split(main_chunks[0]);

    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(6), // Stats
            Constraint::Min(0),    // History
        ])
        .split(main_chunks[1]);

    render_header(frame, left_chunks[0]);
    render_form(frame, app, left_chunks[1]);
    render_outcome(frame, app, left_chunks[2]);
    render_status(frame, app, left_chunks[3]);

    render_stats(frame, app, right_chunks[0]);
    render_history(frame, app, right_chunks[1]);

    if app.confirm_clear {
        render_confirm_clear(frame);
    }

    if app.show_help {
        render_help(frame);
    }
}

fn render_header(frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .title(" Prototipal Content Generator ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let paragraph = Paragraph::new(" Transform your product images into content")
        .block(block)
        .style(Style::default().fg(Color::White));
    frame.render_widget(paragraph, area);
}

fn field_line<'a>(app: &'a App, focus: Focus, label: &'a str, value: String) -> Vec<Line<'a>> {
    let focused = app.focus == focus;
    let label_style = if focused {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Gray)
    };
    let cursor = if focused && !app.loading { "_" } else { "" };

    let mut lines = vec![Line::from(vec![
        Span::styled(format!("{label:<18}"), label_style),
        Span::styled(format!("{value}{cursor}"), Style::default().fg(Color::White)),
    ])];

    let error = focus
        .field()
        .and_then(|field| app.field_errors.get(&field));
    match error {
        Some(message) => lines.push(Line::from(Span::styled(
            format!("{:18}{message}", ""),
            Style::default().fg(Color::Red),
        ))),
        None => lines.push(Line::from("")),
    }
    lines
}

fn render_form(frame: &mut Frame, app: &App, area: Rect) {
    let border = if app.focus == Focus::History {
        Color::DarkGray
    } else {
        Color::Green
    };
    let block = Block::default()
        .title(" Generate ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border));

    let mut lines = Vec::new();
    lines.extend(field_line(app, Focus::ImageUrl, "Image URL", app.form.image_url.clone()));
    lines.extend(field_line(app, Focus::ApiKey, "API Key", mask(&app.form.api_key)));
    lines.extend(field_line(app, Focus::Email, "Email (optional)", app.form.email.clone()));

    let checkbox = if app.form.generate_video { "[x]" } else { "[ ]" };
    lines.extend(field_line(app, Focus::Video, "Generate video", checkbox.to_string()));

    let button = if app.loading {
        format!(" {} Generating...", app.spinner())
    } else {
        " Enter: Generate Content".to_string()
    };
    lines.push(Line::from(Span::styled(
        button,
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )));

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_outcome(frame: &mut Frame, app: &App, area: Rect) {
    if app.loading {
        render_progress(frame, app, area);
    } else if let Some(error) = &app.error {
        render_error(frame, app, error, area);
    } else if app.result.is_some() {
        render_result(frame, app, area);
    } else {
        let paragraph = Paragraph::new("Fill in the form and press Enter to generate content.")
            .block(Block::default().borders(Borders::ALL).title(" Result "))
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(paragraph, area);
    }
}

fn render_progress(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(" Progress "))
        .gauge_style(Style::default().fg(Color::Magenta))
        .percent(u16::from(app.progress.min(100)))
        .label(format!("{}%", app.progress));
    frame.render_widget(gauge, chunks[0]);

    let step = Paragraph::new(format!(" {} {}", app.spinner(), app.current_step))
        .style(Style::default().fg(Color::White));
    frame.render_widget(step, chunks[1]);
}

fn render_error(frame: &mut Frame, app: &App, error: &str, area: Rect) {
    let block = Block::default()
        .title(" Generation Failed ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red));

    let mut text = vec![
        Line::from(Span::styled(error.to_string(), Style::default().fg(Color::Red))),
        Line::from(""),
    ];
    if app.has_retry() {
        text.push(Line::from("Press Ctrl+R to try again."));
    }

    let paragraph = Paragraph::new(text).block(block).wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

fn render_result(frame: &mut Frame, app: &App, area: Rect) {
    let Some(result) = &app.result else {
        return;
    };

    let block = Block::default()
        .title(format!(" Results ({:.1}s) ", result.processing_time))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let mut lines = vec![Line::from(Span::styled(
        format!("Source: {}", result.input.image_url),
        Style::default().fg(Color::Gray),
    ))];

    if let Some(assets) = result.assets() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("Images ({})", assets.images.len()),
            Style::default().add_modifier(Modifier::BOLD),
        )));
        if assets.images.is_empty() {
            lines.push(Line::from("  No images returned"));
        }
        for (i, url) in assets.images.iter().enumerate() {
            lines.push(Line::from(format!("  {}. {}", i + 1, url)));
        }

        if let Some(video) = &assets.video {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                "Video",
                Style::default().add_modifier(Modifier::BOLD),
            )));
            lines.push(Line::from(format!("  {video}")));
        }
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "o: open in browser  s: download all",
        Style::default().fg(Color::DarkGray),
    )));

    let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
    let (text, style) = match &app.notice {
        Some(notice) => {
            let color = match notice.kind {
                NoticeKind::Success => Color::Green,
                NoticeKind::Error => Color::Red,
            };
            (notice.text.clone(), Style::default().fg(color))
        }
        None => (
            "Tab:next field  Enter:generate  Ctrl+R:retry  F1:help  Ctrl+C:quit".to_string(),
            Style::default().fg(Color::DarkGray),
        ),
    };

    frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_stats(frame: &mut Frame, app: &App, area: Rect) {
    let stats = &app.stats;
    let block = Block::default()
        .title(" Quick Stats ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));

    let lines = vec![
        Line::from(vec![
            Span::styled("Generated ", Style::default().fg(Color::Green)),
            Span::raw(stats.total_generations.to_string()),
            Span::styled("   Avg Time ", Style::default().fg(Color::Blue)),
            Span::raw(format!("{}s", stats.average_time)),
        ]),
        Line::from(vec![
            Span::styled("Videos ", Style::default().fg(Color::Yellow)),
            Span::raw(stats.total_videos.to_string()),
            Span::styled("   Success ", Style::default().fg(Color::Magenta)),
            Span::raw(format!("{}%", stats.success_rate)),
        ]),
        Line::from(vec![
            Span::styled("Today ", Style::default().fg(Color::Cyan)),
            Span::raw(stats.today_generations.to_string()),
            Span::styled("   Last ", Style::default().fg(Color::Gray)),
            Span::raw(
                stats
                    .last_generation
                    .map(|ts| relative_time(ts, Utc::now()))
                    .unwrap_or_else(|| "never".to_string()),
            ),
        ]),
    ];

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_history(frame: &mut Frame, app: &App, area: Rect) {
    let now = Utc::now();

    let items: Vec<ListItem> = app
        .history
        .iter()
        .map(|item| {
            let (mark, color) = if item.is_success() {
                ("✓ ", Color::Green)
            } else {
                ("✗ ", Color::Red)
            };

            let mut detail = vec![Span::styled(
                relative_time(item.timestamp, now),
                Style::default().fg(Color::DarkGray),
            )];
            if let Some(assets) = item.assets() {
                if !assets.images.is_empty() {
                    detail.push(Span::raw(format!("  img:{}", assets.images.len())));
                }
                if assets.video.is_some() {
                    detail.push(Span::raw("  vid:1"));
                }
            }
            if let Some(error) = item.error() {
                detail.push(Span::styled(
                    format!("  {}", truncate(error, 30)),
                    Style::default().fg(Color::Red),
                ));
            }

            ListItem::new(vec![
                Line::from(vec![
                    Span::styled(mark, Style::default().fg(color)),
                    Span::styled(truncate(&item.input.image_url, 40), Style::default().fg(Color::White)),
                ]),
                Line::from(detail),
            ])
        })
        .collect();

    let border = if app.focus == Focus::History {
        Color::Yellow
    } else {
        Color::DarkGray
    };

    let list = List::new(items)
        .block(
            Block::default()
                .title(format!(" History ({}) ", app.history.len()))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border)),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default();
    if !app.history.is_empty() {
        state.select(Some(app.selected_index));
    }

    frame.render_stateful_widget(list, area, &mut state);
}

fn render_confirm_clear(frame: &mut Frame) {
    let area = centered_rect(40, 20, frame.area());

    let block = Block::default()
        .title(" Clear History ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let paragraph = Paragraph::new("Are you sure you want to clear all history? (y/n)")
        .block(block)
        .wrap(Wrap { trim: true });

    frame.render_widget(Clear, area);
    frame.render_widget(paragraph, area);
}

fn render_help(frame: &mut Frame) {
    let area = centered_rect(50, 70, frame.area());

    let help_text = [
        "",
        " Form:",
        "   Tab / S-Tab  Next / previous field",
        "   Enter        Generate content",
        "   Space        Toggle video (on the video field)",
        "   Ctrl+R       Try again with the last input",
        "",
        " History (Tab until the list is focused):",
        "   j / ↓        Move down",
        "   k / ↑        Move up",
        "   Enter        Show result",
        "   d            Delete entry",
        "   C            Clear all history",
        "   o            Open result in browser",
        "   s            Download result files",
        "",
        " General:",
        "   F1 / ?       Toggle this help",
        "   q / Ctrl+C   Quit",
        "",
        " Press any key to close",
    ];

    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let paragraph = Paragraph::new(help_text.join("\n"))
        .block(block)
        .style(Style::default().fg(Color::White));

    frame.render_widget(Clear, area);
    frame.render_widget(paragraph, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
