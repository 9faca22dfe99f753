use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use policy_dedup::{
    CheckError, CheckState, CheckTicket, Debouncer, DuplicateCheckController, DuplicateMatch,
    DuplicateResolver, UserId, MIN_POLICY_NUMBER_LEN,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

type Settlement = (CheckTicket, Result<Option<DuplicateMatch>, CheckError>);

pub struct App {
    pub input: String,
    pub controller: DuplicateCheckController,
    pub debouncer: Debouncer,
    pub checks_started: usize,
}

impl App {
    pub fn new(user: UserId, debounce: Duration) -> Self {
        Self {
            input: String::new(),
            controller: DuplicateCheckController::new(user),
            debouncer: Debouncer::new(debounce),
            checks_started: 0,
        }
    }

    pub fn type_char(&mut self, c: char, now: Instant) {
        self.input.push(c);
        self.edited(now);
    }

    pub fn backspace(&mut self, now: Instant) {
        if self.input.pop().is_some() {
            self.edited(now);
        }
    }

    /// A check in flight or on screen describes the old input: drop it
    fn edited(&mut self, now: Instant) {
        if self.controller.state() != CheckState::Idle {
            self.controller.reset();
        }
        self.debouncer.push(self.input.clone(), now);
    }

    pub fn clear(&mut self) {
        self.input.clear();
        self.debouncer.cancel();
        self.controller.reset();
    }

    /// Submit debounced input once it is due
    pub fn due_ticket(&mut self, now: Instant) -> Option<CheckTicket> {
        let input = self.debouncer.poll(now)?;
        let ticket = self.controller.submit(&input)?;
        self.checks_started += 1;
        Some(ticket)
    }

    pub fn apply(&mut self, ticket: &CheckTicket, outcome: Result<Option<DuplicateMatch>, CheckError>) {
        self.controller.settle(ticket, outcome);
    }
}

pub fn run_ui(app: &mut App, resolver: Arc<DuplicateResolver>, runtime: &Handle) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app, resolver, runtime);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    resolver: Arc<DuplicateResolver>,
    runtime: &Handle,
) -> io::Result<()> {
    let (tx, rx) = mpsc::channel::<Settlement>();

    loop {
        // Results may arrive out of order; the controller drops stale ones
        while let Ok((ticket, outcome)) = rx.try_recv() {
            app.apply(&ticket, outcome);
        }

        terminal.draw(|f| ui(f, app))?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
                    match key.code {
                        KeyCode::Esc => return Ok(()),
                        KeyCode::Char('c') if ctrl => return Ok(()),
                        KeyCode::Char('u') if ctrl => app.clear(),
                        KeyCode::Char(c) => app.type_char(c, Instant::now()),
                        KeyCode::Backspace => app.backspace(Instant::now()),
                        _ => {}
                    }
                }
            }
        }

        if let Some(ticket) = app.due_ticket(Instant::now()) {
            let resolver = resolver.clone();
            let tx = tx.clone();
            runtime.spawn(async move {
                let outcome = ticket.resolve(&resolver).await;
                let _ = tx.send((ticket, outcome));
            });
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(3), // Input
            Constraint::Min(0),    // Check result
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);
    render_input(f, chunks[1], app);
    render_result(f, chunks[2], app);
    render_status_bar(f, chunks[3], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "New Policy",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("User: {}", app.controller.user()),
            Style::default().fg(Color::White),
        ),
    ]))
    .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn render_input(f: &mut Frame, area: Rect, app: &App) {
    let input = Paragraph::new(app.input.as_str()).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Policy number "),
    );

    f.render_widget(input, area);
}

fn render_result(f: &mut Frame, area: Rect, app: &App) {
    let (lines, color) = match app.controller.state() {
        CheckState::Idle => (
            vec![Line::from(format!(
                "Type a policy number ({}+ characters) to check for duplicates",
                MIN_POLICY_NUMBER_LEN
            ))],
            Color::DarkGray,
        ),
        CheckState::Checking => (vec![Line::from("Checking existing policies...")], Color::Yellow),
        CheckState::Resolved(None) => (
            vec![Line::from("✓ No existing policy with this number")],
            Color::Green,
        ),
        CheckState::Resolved(Some(found)) => (warning_lines(&found), Color::Red),
    };

    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: true }).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color))
            .title(" Duplicate Check "),
    );

    f.render_widget(paragraph, area);
}

fn warning_lines(found: &DuplicateMatch) -> Vec<Line<'static>> {
    let label = Style::default().fg(Color::Yellow);

    let mut lines = vec![
        Line::from(Span::styled(
            "⚠ This policy already exists",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("Policy number: ", label),
            Span::raw(found.policy_number.clone()),
        ]),
        Line::from(vec![
            Span::styled("Type:          ", label),
            Span::raw(found.policy_type.label()),
        ]),
    ];

    if let Some(insurer) = &found.insurer_name {
        lines.push(Line::from(vec![
            Span::styled("Insurer:       ", label),
            Span::raw(insurer.clone()),
        ]));
    }

    lines.push(Line::from(vec![
        Span::styled("View:          ", label),
        Span::raw(found.link()),
    ]));

    lines
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let status_text = format!(
        " Esc: quit | Ctrl+U: clear | Checks started: {} ",
        app.checks_started
    );

    let status_bar = Paragraph::new(status_text).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy_dedup::PolicyTypeTag;
    use ratatui::backend::TestBackend;

    fn screen_text(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        terminal.draw(|f| ui(f, app)).unwrap();
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_keystrokes_debounced_into_one_check() {
        let start = Instant::now();
        let mut app = App::new(UserId::from("u1"), Duration::from_millis(300));

        for (i, c) in "MH12".chars().enumerate() {
            app.type_char(c, start + Duration::from_millis(100 * i as u64));
            assert!(app.due_ticket(start + Duration::from_millis(100 * i as u64 + 50)).is_none());
        }

        let ticket = app
            .due_ticket(start + Duration::from_millis(700))
            .expect("quiet for 300ms");
        assert_eq!(ticket.query().as_str(), "MH12");
        assert_eq!(app.checks_started, 1);
        assert_eq!(app.controller.state(), CheckState::Checking);
    }

    #[test]
    fn test_short_input_never_starts_check() {
        let start = Instant::now();
        let mut app = App::new(UserId::from("u1"), Duration::from_millis(10));

        app.type_char('M', start);
        assert!(app.due_ticket(start + Duration::from_secs(1)).is_none());
        assert_eq!(app.checks_started, 0);
        assert_eq!(app.controller.state(), CheckState::Idle);
    }

    #[test]
    fn test_clear_discards_pending_check() {
        let start = Instant::now();
        let mut app = App::new(UserId::from("u1"), Duration::from_millis(10));

        app.type_char('A', start);
        app.type_char('B', start);
        app.type_char('C', start);
        let ticket = app.due_ticket(start + Duration::from_millis(20)).unwrap();

        app.clear();
        app.apply(&ticket, Ok(None));
        assert_eq!(app.controller.state(), CheckState::Idle);
        assert!(app.input.is_empty());
    }

    fn motor_match() -> DuplicateMatch {
        DuplicateMatch {
            policy_id: "p-1".to_string(),
            policy_type: PolicyTypeTag::MotorPrivate,
            policy_number: "MH12AB1234".to_string(),
            insurer_name: Some("Acme General".to_string()),
        }
    }

    #[test]
    fn test_edit_discards_in_flight_check() {
        let start = Instant::now();
        let mut app = App::new(UserId::from("u1"), Duration::from_millis(10));
        for c in "MH12AB1234".chars() {
            app.type_char(c, start);
        }
        let ticket = app.due_ticket(start + Duration::from_millis(20)).unwrap();

        app.type_char('9', start + Duration::from_millis(30));
        app.apply(&ticket, Ok(Some(motor_match())));

        assert_eq!(app.input, "MH12AB12349");
        assert_eq!(app.controller.state(), CheckState::Idle);
        assert!(!screen_text(&app).contains("already exists"));

        let next = app.due_ticket(start + Duration::from_millis(50)).unwrap();
        assert_eq!(next.query().as_str(), "MH12AB12349");
        app.apply(&next, Ok(None));
        assert_eq!(app.controller.state(), CheckState::Resolved(None));
    }

    #[test]
    fn test_edit_clears_shown_warning() {
        let start = Instant::now();
        let mut app = App::new(UserId::from("u1"), Duration::from_millis(10));
        for c in "MH12AB1234".chars() {
            app.type_char(c, start);
        }
        let ticket = app.due_ticket(start + Duration::from_millis(20)).unwrap();
        app.apply(&ticket, Ok(Some(motor_match())));
        assert!(app.controller.state().duplicate().is_some());

        app.backspace(start + Duration::from_millis(30));
        assert_eq!(app.controller.state(), CheckState::Idle);
    }

    #[test]
    fn test_warning_rendered_with_link() {
        let start = Instant::now();
        let mut app = App::new(UserId::from("u1"), Duration::from_millis(10));
        for c in "mh12ab1234".chars() {
            app.type_char(c, start);
        }
        let ticket = app.due_ticket(start + Duration::from_millis(20)).unwrap();

        app.apply(&ticket, Ok(Some(motor_match())));

        let text = screen_text(&app);
        assert!(text.contains("MH12AB1234"));
        assert!(text.contains("Acme General"));
        assert!(text.contains("/policies/motor-private/p-1"));
    }

    #[test]
    fn test_no_duplicate_rendered() {
        let start = Instant::now();
        let mut app = App::new(UserId::from("u1"), Duration::from_millis(10));
        for c in "ZZ999".chars() {
            app.type_char(c, start);
        }
        let ticket = app.due_ticket(start + Duration::from_millis(20)).unwrap();
        app.apply(&ticket, Ok(None));

        assert!(screen_text(&app).contains("No existing policy"));
    }
}
