use itertools::Itertools;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};
use soundspan::{session::Trial, stimulus::TARGET_COUNT, Phase};

use crate::App;

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

pub fn draw(app: &App, f: &mut Frame) {
    let area = f.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Length(3), // title
            Constraint::Min(5),    // phase body
            Constraint::Length(1), // status
            Constraint::Length(3), // key help
        ])
        .split(area);

    render_title(app, f, chunks[0]);
    render_body(app, f, chunks[1]);

    if let Some(status) = &app.status {
        let status = Paragraph::new(Span::styled(status.as_str(), Style::default().fg(Color::Red)))
            .alignment(Alignment::Center);
        f.render_widget(status, chunks[2]);
    }

    let help = Paragraph::new(key_help(app.session.phase()))
        .block(Block::default().borders(Borders::ALL))
        .style(Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC))
        .alignment(Alignment::Center);
    f.render_widget(help, chunks[3]);
}

fn render_title(app: &App, f: &mut Frame, area: Rect) {
    let number = app
        .session
        .trial()
        .map(|t| t.session_number)
        .unwrap_or_else(|| app.session.next_session_number());
    let title = Paragraph::new(format!("Trial {} · {}", number, app.session.phase()))
        .block(Block::default().borders(Borders::ALL).title("soundspan"))
        .style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .alignment(Alignment::Center);
    f.render_widget(title, area);
}

fn render_body(app: &App, f: &mut Frame, area: Rect) {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let dim = Style::default().add_modifier(Modifier::DIM);

    let lines: Vec<Line> = match (app.session.phase(), app.session.trial()) {
        (Phase::Setup, _) => setup_lines(app),
        (Phase::Instructions, _) => vec![
            Line::from(format!("You will hear {TARGET_COUNT} sounds, one after another.")),
            Line::from("Keep them in mind through a short pause."),
            Line::from("Then pick the sounds you heard from a larger set."),
            Line::from(""),
            Line::from(Span::styled("Press r when you are ready", bold)),
        ],
        (Phase::Listen, Some(trial)) => listen_lines(trial),
        (Phase::Delay, _) => {
            let remaining = app.session.delay_remaining().unwrap_or(0);
            vec![
                Line::from("Hold the sounds in mind"),
                Line::from(""),
                Line::from(Span::styled(
                    remaining.to_string(),
                    bold.fg(Color::Yellow),
                )),
            ]
        }
        (Phase::Selection, Some(trial)) => selection_lines(trial),
        (Phase::Feedback, _) => feedback_lines(app),
        (_, None) => vec![Line::from(Span::styled("…", dim))],
    };

    let body = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    f.render_widget(body, area);
}

fn setup_lines(app: &App) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(Span::styled(
        "Press s to start a trial",
        Style::default().add_modifier(Modifier::BOLD),
    ))];
    if let Some(record) = app.session.last_record() {
        lines.push(Line::from(""));
        lines.push(Line::from(format!(
            "Last trial: {:.1}% in {:.1}s",
            record.accuracy,
            record.reaction_time_ms as f64 / 1000.0
        )));
    }
    if app.session.alert_active() {
        lines.push(Line::from(""));
        lines.push(alert_line());
    }
    lines
}

fn listen_lines(trial: &Trial) -> Vec<Line<'static>> {
    let total = trial.stimuli.targets.len();
    match trial.last_played {
        None => vec![Line::from("Listen…")],
        Some(index) => {
            let sound = &trial.stimuli.targets[index];
            vec![
                Line::from(format!("Sound {} of {}", index + 1, total)),
                Line::from(""),
                Line::from(Span::styled(
                    format!("♪ {}", sound.name),
                    Style::default()
                        .fg(Color::Magenta)
                        .add_modifier(Modifier::BOLD),
                )),
            ]
        }
    }
}

fn selection_lines(trial: &Trial) -> Vec<Line<'static>> {
    let mut lines = vec![
        Line::from(format!(
            "Which sounds did you hear? {}/{} selected",
            trial.selection.len(),
            TARGET_COUNT
        )),
        Line::from(""),
    ];
    for (slot, sound) in trial.stimuli.display_set.iter().enumerate() {
        let selected = trial.is_selected(sound.id);
        let style = if selected {
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
        } else if trial.selection_full() {
            Style::default().add_modifier(Modifier::DIM)
        } else {
            Style::default()
        };
        let mark = if selected { "x" } else { " " };
        lines.push(Line::from(Span::styled(
            format!("[{}] {}. {}", mark, slot + 1, sound.name),
            style,
        )));
    }
    lines
}

fn feedback_lines(app: &App) -> Vec<Line<'static>> {
    let Some(record) = app.session.last_record() else {
        return vec![Line::from("No result")];
    };
    let (verdict, color) = if record.is_correct {
        ("All correct!", Color::Green)
    } else {
        ("Not quite", Color::Yellow)
    };
    let mut lines = vec![
        Line::from(Span::styled(
            verdict,
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(format!("Accuracy: {:.1}%", record.accuracy)),
        Line::from(format!(
            "Reaction time: {:.2}s",
            record.reaction_time_ms as f64 / 1000.0
        )),
        Line::from(format!("You heard: {}", record.correct_sounds.iter().join(", "))),
        Line::from(format!("You picked: {}", record.selected_sounds.iter().join(", "))),
    ];
    if let Some(trial) = app.session.trial() {
        lines.push(Line::from(""));
        lines.push(review_line(trial));
    }
    if app.session.alert_active() {
        lines.push(Line::from(""));
        lines.push(alert_line());
    }
    lines
}

/// Display set with heard sounds in green and wrong picks in red
fn review_line(trial: &Trial) -> Line<'static> {
    let spans = trial
        .stimuli
        .display_set
        .iter()
        .map(|sound| {
            let heard = trial.stimuli.is_target(sound.id);
            let picked = trial.is_selected(sound.id);
            let style = match (heard, picked) {
                (true, true) => Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
                (true, false) => Style::default().fg(Color::Green),
                (false, true) => Style::default().fg(Color::Red).add_modifier(Modifier::CROSSED_OUT),
                (false, false) => Style::default().add_modifier(Modifier::DIM),
            };
            Span::styled(format!(" {} ", sound.name), style)
        })
        .collect::<Vec<_>>();
    Line::from(spans)
}

fn alert_line() -> Line<'static> {
    Line::from(Span::styled(
        "Recent results are low. Consider sharing them with a caregiver.",
        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    ))
}

fn key_help(phase: Phase) -> &'static str {
    match phase {
        Phase::Setup => "(s)tart | (esc)ape",
        Phase::Instructions => "(r)eady | (esc)ape",
        Phase::Listen | Phase::Delay => "listen and remember | (esc)ape",
        Phase::Selection => "(1-6) toggle | (enter) submit | (esc)ape",
        Phase::Feedback => "(enter)/(space) continue | (esc)ape",
    }
}
