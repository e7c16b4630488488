use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io::stdout;

use crate::models::{ApplicationStatus, Category, CategoryFilter, JobApplication, Lang, Stage};
use crate::storage::KeyValueStore;
use crate::store::ApplicationStore;

struct BrowseState {
    query: String,
    category: CategoryFilter,
    visible: Vec<String>, // ids, in list order
    selected: usize,
    scroll_offset: u16,
    message: Option<String>,
}

impl BrowseState {
    fn new(query: &str, category: CategoryFilter) -> Self {
        Self {
            query: query.to_string(),
            category,
            visible: Vec::new(),
            selected: 0,
            scroll_offset: 0,
            message: None,
        }
    }

    fn refresh<S: KeyValueStore>(&mut self, store: &ApplicationStore<S>) {
        self.visible = store
            .filter(&self.query, self.category)
            .into_iter()
            .map(|a| a.id.clone())
            .collect();
        if self.selected >= self.visible.len() {
            self.selected = self.visible.len().saturating_sub(1);
        }
    }

    fn current_id(&self) -> Option<&str> {
        self.visible.get(self.selected).map(String::as_str)
    }

    fn next(&mut self) {
        if !self.visible.is_empty() && self.selected < self.visible.len() - 1 {
            self.selected += 1;
            self.scroll_offset = 0;
        }
    }

    fn prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            self.scroll_offset = 0;
        }
    }

    fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_add(3);
    }

    fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(3);
    }
}

fn next_category(filter: CategoryFilter) -> CategoryFilter {
    match filter {
        CategoryFilter::All => CategoryFilter::Only(Category::ALL[0]),
        CategoryFilter::Only(current) => {
            let pos = Category::ALL.iter().position(|c| *c == current).unwrap_or(0);
            Category::ALL
                .get(pos + 1)
                .map(|c| CategoryFilter::Only(*c))
                .unwrap_or(CategoryFilter::All)
        }
    }
}

pub fn run_browse<S: KeyValueStore>(
    store: &mut ApplicationStore<S>,
    query: &str,
    category: CategoryFilter,
) -> Result<()> {
    let mut state = BrowseState::new(query, category);
    state.refresh(store);
    if store.applications().is_empty() {
        println!("No applications yet. Add one with: offerflow add");
        return Ok(());
    }

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, store);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn run_loop<S: KeyValueStore>(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut BrowseState,
    store: &mut ApplicationStore<S>,
) -> Result<()> {
    let mut list_state = ListState::default();

    loop {
        list_state.select((!state.visible.is_empty()).then_some(state.selected));
        terminal.draw(|frame| draw(frame, store, state, &mut list_state))?;

        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        let current = state.current_id().map(str::to_string);
        let outcome = match key.code {
            KeyCode::Char('q') | KeyCode::Esc => break,
            KeyCode::Down | KeyCode::Char('j') => {
                state.next();
                Ok(None)
            }
            KeyCode::Up | KeyCode::Char('k') => {
                state.prev();
                Ok(None)
            }
            KeyCode::Char('J') | KeyCode::PageDown => {
                state.scroll_down();
                Ok(None)
            }
            KeyCode::Char('K') | KeyCode::PageUp => {
                state.scroll_up();
                Ok(None)
            }
            KeyCode::Char(c @ '0'..='5') => match &current {
                Some(id) => {
                    let target = c as usize - '0' as usize;
                    store.advance_stage(id, target).map(|_| {
                        Some(format!("Stage set to {}", Stage::ALL[target].label(store.lang())))
                    })
                }
                None => Ok(None),
            },
            KeyCode::Char('x') => match &current {
                Some(id) => store
                    .toggle_rejected(id)
                    .map(|_| Some("Rejection toggled".to_string())),
                None => Ok(None),
            },
            KeyCode::Char('i') => match &current {
                Some(id) => store
                    .add_interview(id)
                    .map(|added| added.map(|_| "Interview added".to_string())),
                None => Ok(None),
            },
            KeyCode::Char('c') => {
                state.category = next_category(state.category);
                state.selected = 0;
                Ok(None)
            }
            KeyCode::Char('l') => {
                let lang = store.lang().toggled();
                store.set_lang(lang).map(|_| None)
            }
            _ => Ok(None),
        };

        state.message = match outcome {
            Ok(message) => message,
            Err(e) => Some(format!("Operation failed: {}", e)),
        };
        state.refresh(store);
    }
    Ok(())
}

fn status_style(status: ApplicationStatus) -> Style {
    match status {
        ApplicationStatus::Planning => Style::default().fg(Color::DarkGray),
        ApplicationStatus::Applied => Style::default().fg(Color::Cyan),
        ApplicationStatus::Interviewing => Style::default().fg(Color::Yellow),
        ApplicationStatus::Offer => Style::default().fg(Color::Green),
        ApplicationStatus::Rejected => Style::default().fg(Color::Red),
    }
}

fn draw<S: KeyValueStore>(
    frame: &mut Frame,
    store: &ApplicationStore<S>,
    state: &BrowseState,
    list_state: &mut ListState,
) {
    let lang = store.lang();
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(frame.area());
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(rows[0]);

    // Left panel: application list
    let items: Vec<ListItem> = state
        .visible
        .iter()
        .filter_map(|id| store.get(id))
        .map(|app| {
            ListItem::new(Line::from(vec![
                Span::styled(format!("{:<12}", app.status), status_style(app.status)),
                Span::raw(format!(" {} | {}", app.company_name, app.position_title)),
            ]))
        })
        .collect();

    let stats = store.stats();
    let title = format!(
        " {} ({}) | interview {}% offer {}% ",
        state.category.label(lang),
        state.visible.len(),
        stats.interview_rate,
        stats.offer_rate
    );
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, chunks[0], list_state);

    // Right panel: application detail
    let detail = match state.current_id().and_then(|id| store.get(id)) {
        Some(app) => build_detail(app, lang),
        None => Text::raw("No application selected"),
    };
    let detail_widget = Paragraph::new(detail)
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false })
        .scroll((state.scroll_offset, 0));

    frame.render_widget(detail_widget, chunks[1]);

    // Footer: last message or key help
    let footer = match &state.message {
        Some(message) => Paragraph::new(format!(" {}", message)).style(Style::default().fg(Color::Yellow)),
        None => Paragraph::new(
            " j/k:navigate  J/K:scroll  0-5:stage  x:reject  i:interview  c:category  l:lang  q:quit",
        )
        .style(Style::default().fg(Color::DarkGray)),
    };
    frame.render_widget(footer, rows[1]);
}

fn heading(text: &str) -> Line<'static> {
    Line::from(Span::styled(
        text.to_string(),
        Style::default().add_modifier(Modifier::BOLD),
    ))
}

fn wrapped(lines: &mut Vec<Line<'static>>, text: &str, indent: &str) {
    for line in textwrap::fill(text, 70).lines() {
        lines.push(Line::from(format!("{}{}", indent, line)));
    }
}

fn build_detail(app: &JobApplication, lang: Lang) -> Text<'static> {
    let mut lines: Vec<Line<'static>> = Vec::new();

    lines.push(heading(&app.company_name));
    lines.push(Line::from(format!(
        "{} · {}",
        app.position_title,
        app.category.label(lang)
    )));
    lines.push(Line::from(Span::styled(
        format!("Status: {}", app.status),
        status_style(app.status),
    )));
    lines.push(Line::from(format!("Applied: {}", app.applied_date)));
    if let Some(location) = &app.location {
        lines.push(Line::from(format!("Location: {}", location)));
    }
    if let Some(channel) = &app.channel {
        lines.push(Line::from(format!("Source: {}", channel)));
    }
    if let Some(link) = &app.jd_link {
        lines.push(Line::from(format!("Link: {}", link)));
    }
    lines.push(Line::from(""));

    // Milestones
    let spans: Vec<Span<'static>> = Stage::ALL
        .iter()
        .flat_map(|stage| {
            let reached = *stage <= app.stage;
            let style = if *stage == app.stage {
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else if reached {
                Style::default().fg(Color::Cyan)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            let mark = if reached { "●" } else { "○" };
            [
                Span::styled(format!("{} {}", mark, stage.label(lang)), style),
                Span::raw("  "),
            ]
        })
        .collect();
    lines.push(Line::from(spans));
    lines.push(Line::from(""));

    if let Some(report) = &app.ai_suggestions {
        lines.push(heading("AI Analysis"));
        wrapped(&mut lines, &report.summary, "  ");
        if !report.suitability_assessment.is_empty() {
            lines.push(Line::from(""));
            lines.push(Line::from("  Suitability:"));
            wrapped(&mut lines, &report.suitability_assessment, "    ");
        }
        for (label, items, limit) in [
            ("Key Responsibilities", &report.responsibilities, usize::MAX),
            ("Common Interview Questions", &report.potential_questions, usize::MAX),
            ("Interview Strategy", &report.interview_tips, 3),
        ] {
            if items.is_empty() {
                continue;
            }
            lines.push(Line::from(""));
            lines.push(Line::from(format!("  {}:", label)));
            for item in items.iter().take(limit) {
                wrapped(&mut lines, &format!("- {}", item), "    ");
            }
        }
        lines.push(Line::from(""));
    }

    if app.interviews.is_empty() {
        lines.push(Line::from(Span::styled(
            "(No interviews yet. Press i to add one)",
            Style::default().fg(Color::DarkGray),
        )));
    } else {
        lines.push(heading("Interviews"));
        for interview in &app.interviews {
            let mark = if interview.is_completed { "✓" } else { "·" };
            lines.push(Line::from(format!(
                "  {} {}  {} {}",
                mark,
                interview.round,
                interview.date,
                interview.time.as_deref().unwrap_or("")
            )));
            if !interview.interviewer_info.is_empty() {
                lines.push(Line::from(format!("      with {}", interview.interviewer_info)));
            }
            if let Some(link) = &interview.meeting_link {
                lines.push(Line::from(format!("      {}", link)));
            }
            if !interview.notes.is_empty() {
                wrapped(&mut lines, &interview.notes, "      ");
            }
        }
    }

    if !app.my_reflections.is_empty() {
        lines.push(Line::from(""));
        lines.push(heading("Reflections"));
        wrapped(&mut lines, &app.my_reflections, "  ");
    }

    Text::from(lines)
}
