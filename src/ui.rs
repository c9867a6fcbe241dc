use std::io::{self, Stdout};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use tracing::debug;

use crate::api;
use crate::catalog::{EnrichedMovie, Genre, PersonDetail, RatingSource, SortKey};
use crate::controller::{Controller, Phase};
use crate::data::PersonService;
use crate::session;
use crate::storage::SessionRecord;

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

const RATING_BUCKETS: [Option<f64>; 5] = [None, Some(5.0), Some(6.0), Some(7.0), Some(8.0)];

#[derive(Clone, Copy, PartialEq, Eq)]
enum View {
    Browse,
    Detail,
    Person,
    Account,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum InputFocus {
    List,
    Search,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthAction {
    SignIn,
    SignUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthField {
    Email,
    Password,
}

struct AuthForm {
    mode: AuthAction,
    field: AuthField,
    email: String,
    password: String,
    error: Option<String>,
    busy: bool,
}

impl AuthForm {
    fn new() -> Self {
        Self {
            mode: AuthAction::SignIn,
            field: AuthField::Email,
            email: String::new(),
            password: String::new(),
            error: None,
            busy: false,
        }
    }

    fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            AuthAction::SignIn => AuthAction::SignUp,
            AuthAction::SignUp => AuthAction::SignIn,
        };
        self.error = None;
    }

    fn next_field(&mut self) {
        self.field = match self.field {
            AuthField::Email => AuthField::Password,
            AuthField::Password => AuthField::Email,
        };
    }

    fn active_value(&mut self) -> &mut String {
        match self.field {
            AuthField::Email => &mut self.email,
            AuthField::Password => &mut self.password,
        }
    }
}

struct PendingPerson {
    request_id: u64,
}

enum AsyncResponse {
    Auth {
        action: AuthAction,
        result: Result<SessionRecord, api::Error>,
    },
    Person {
        request_id: u64,
        result: Result<PersonDetail, api::Error>,
    },
}

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_millis(120) {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_tick = Instant::now();
    }
}

pub struct Model {
    controller: Controller,
    session: Arc<session::Manager>,
    people: Arc<dyn PersonService>,

    view: View,
    focus: InputFocus,
    search_input: String,
    year_input: String,
    genre_index: Option<usize>,
    sort_index: Option<usize>,
    rating_index: usize,

    selected: usize,
    list_state: ListState,
    detail: Option<EnrichedMovie>,
    principal_selected: usize,
    person: Option<PersonDetail>,
    pending_person: Option<PendingPerson>,
    next_request_id: u64,

    auth_form: AuthForm,
    status_message: String,
    spinner: Spinner,
    needs_redraw: bool,

    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
}

impl Model {
    pub fn new(
        controller: Controller,
        session: Arc<session::Manager>,
        people: Arc<dyn PersonService>,
    ) -> Self {
        let (response_tx, response_rx) = unbounded();
        let status_message = match session.user_email() {
            Some(email) => format!("Signed in as {email}. Press / to search, q to quit."),
            None => "Press / to search, a to sign in, q to quit.".to_string(),
        };
        Self {
            controller,
            session,
            people,
            view: View::Browse,
            focus: InputFocus::List,
            search_input: String::new(),
            year_input: String::new(),
            genre_index: None,
            sort_index: None,
            rating_index: 0,
            selected: 0,
            list_state: ListState::default(),
            detail: None,
            principal_selected: 0,
            person: None,
            pending_person: None,
            next_request_id: 0,
            auth_form: AuthForm::new(),
            status_message,
            spinner: Spinner::new(),
            needs_redraw: true,
            response_tx,
            response_rx,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        self.controller.refresh();
        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_millis(120);

        loop {
            self.controller.tick(Instant::now());
            if self.poll_async() {
                self.needs_redraw = true;
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press && self.handle_key(key.code) {
                        break;
                    }
                    self.needs_redraw = true;
                }
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                if self.is_busy() {
                    if self.spinner.advance() {
                        self.needs_redraw = true;
                    }
                } else {
                    self.spinner.reset();
                }
            }
        }

        Ok(())
    }

    fn is_busy(&self) -> bool {
        self.controller.is_loading() || self.auth_form.busy || self.pending_person.is_some()
    }

    fn poll_async(&mut self) -> bool {
        self.controller.poll();
        let mut handled = false;
        while let Ok(message) = self.response_rx.try_recv() {
            self.handle_async_response(message);
            handled = true;
        }
        handled
    }

    fn handle_async_response(&mut self, message: AsyncResponse) {
        match message {
            AsyncResponse::Auth { action, result } => {
                self.auth_form.busy = false;
                match result {
                    Ok(record) => {
                        self.auth_form.password.clear();
                        self.auth_form.error = None;
                        self.view = View::Browse;
                        self.status_message = match action {
                            AuthAction::SignIn => format!("Signed in as {}.", record.email),
                            AuthAction::SignUp => {
                                format!("Account created. Signed in as {}.", record.email)
                            }
                        };
                    }
                    Err(api::Error::Auth { message }) => {
                        self.auth_form.error = Some(message);
                    }
                    Err(err) => {
                        self.auth_form.error = Some(err.to_string());
                    }
                }
            }
            AsyncResponse::Person { request_id, result } => {
                let Some(pending) = self.pending_person.as_ref() else {
                    return;
                };
                if pending.request_id != request_id {
                    debug!(request_id, "dropping stale person response");
                    return;
                }
                self.pending_person = None;
                match result {
                    Ok(person) => {
                        self.person = Some(person);
                        self.view = View::Person;
                    }
                    Err(api::Error::SessionExpired) => {
                        self.status_message =
                            "Session expired. Sign in again to view people.".into();
                        self.view = View::Account;
                    }
                    Err(err) => {
                        self.status_message = format!("Failed to load person: {err}");
                    }
                }
            }
        }
    }

    /// Returns true when the app should quit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match self.focus {
            InputFocus::Search => {
                self.handle_search_key(code);
                false
            }
            InputFocus::Year => {
                self.handle_year_key(code);
                false
            }
            InputFocus::List => match self.view {
                View::Account => self.handle_account_key(code),
                View::Detail => {
                    self.handle_detail_key(code);
                    false
                }
                View::Person => {
                    if matches!(code, KeyCode::Esc | KeyCode::Char('q')) {
                        self.person = None;
                        self.view = View::Detail;
                    }
                    false
                }
                View::Browse => self.handle_browse_key(code),
            },
        }
    }

    fn handle_search_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc | KeyCode::Enter => self.focus = InputFocus::List,
            KeyCode::Backspace => {
                self.search_input.pop();
                self.commit_query();
            }
            KeyCode::Char(ch) => {
                self.search_input.push(ch);
                self.commit_query();
            }
            _ => {}
        }
    }

    fn handle_year_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc | KeyCode::Enter => self.focus = InputFocus::List,
            KeyCode::Backspace => {
                self.year_input.pop();
                self.commit_year();
            }
            KeyCode::Char(ch) if ch.is_ascii_digit() && self.year_input.len() < 4 => {
                self.year_input.push(ch);
                self.commit_year();
            }
            _ => {}
        }
    }

    fn commit_query(&mut self) {
        self.selected = 0;
        self.controller
            .set_title(self.search_input.clone(), Instant::now());
    }

    fn commit_year(&mut self) {
        self.selected = 0;
        let year = parse_year(&self.year_input);
        self.controller.set_year(year, Instant::now());
    }

    fn handle_browse_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('/') => self.focus = InputFocus::Search,
            KeyCode::Char('y') => self.focus = InputFocus::Year,
            KeyCode::Char('g') => self.cycle_genre(),
            KeyCode::Char('s') => self.cycle_sort(),
            KeyCode::Char('r') => self.cycle_rating(),
            KeyCode::Char('c') => self.clear_filters(),
            KeyCode::Char('a') => self.view = View::Account,
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
            KeyCode::Enter => self.open_detail(),
            _ => {}
        }
        false
    }

    fn handle_detail_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc | KeyCode::Char('q') => {
                self.detail = None;
                self.principal_selected = 0;
                self.view = View::Browse;
            }
            KeyCode::Down | KeyCode::Char('j') => {
                let count = self.principal_count();
                if count > 0 {
                    self.principal_selected = (self.principal_selected + 1).min(count - 1);
                }
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.principal_selected = self.principal_selected.saturating_sub(1);
            }
            KeyCode::Enter => self.open_person(),
            _ => {}
        }
    }

    fn handle_account_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Esc => {
                self.view = View::Browse;
                false
            }
            KeyCode::Tab => {
                self.auth_form.next_field();
                false
            }
            KeyCode::Enter => {
                self.submit_auth();
                false
            }
            KeyCode::Backspace => {
                self.auth_form.active_value().pop();
                false
            }
            KeyCode::F(2) => {
                self.auth_form.toggle_mode();
                false
            }
            KeyCode::Char(ch) => {
                self.auth_form.active_value().push(ch);
                false
            }
            _ => false,
        }
    }

    fn cycle_genre(&mut self) {
        self.genre_index = match self.genre_index {
            None => Some(0),
            Some(idx) if idx + 1 < Genre::ALL.len() => Some(idx + 1),
            Some(_) => None,
        };
        let genre = self.genre_index.map(|idx| Genre::ALL[idx]);
        self.selected = 0;
        self.controller.set_genre(genre, Instant::now());
    }

    fn cycle_sort(&mut self) {
        const SORTS: [SortKey; 4] = [
            SortKey::TitleAsc,
            SortKey::TitleDesc,
            SortKey::RatingDesc,
            SortKey::YearDesc,
        ];
        self.sort_index = match self.sort_index {
            None => Some(0),
            Some(idx) if idx + 1 < SORTS.len() => Some(idx + 1),
            Some(_) => None,
        };
        self.controller.set_sort(self.sort_index.map(|idx| SORTS[idx]));
    }

    fn cycle_rating(&mut self) {
        self.rating_index = (self.rating_index + 1) % RATING_BUCKETS.len();
        self.controller
            .set_min_rating(RATING_BUCKETS[self.rating_index]);
    }

    fn clear_filters(&mut self) {
        self.search_input.clear();
        self.year_input.clear();
        self.genre_index = None;
        self.sort_index = None;
        self.rating_index = 0;
        self.selected = 0;
        let now = Instant::now();
        self.controller.set_title(String::new(), now);
        self.controller.set_year(None, now);
        self.controller.set_genre(None, now);
        self.controller.set_sort(None);
        self.controller.set_min_rating(None);
    }

    fn move_selection(&mut self, delta: i64) {
        let len = self.controller.display().len();
        if len == 0 {
            self.selected = 0;
            return;
        }
        let next = self.selected as i64 + delta;
        self.selected = next.clamp(0, len as i64 - 1) as usize;
        self.controller.maybe_load_more(self.selected);
    }

    fn open_detail(&mut self) {
        let display = self.controller.display();
        if let Some(movie) = display.get(self.selected) {
            self.detail = Some(movie.clone());
            self.principal_selected = 0;
            self.view = View::Detail;
        }
    }

    fn principal_count(&self) -> usize {
        self.detail
            .as_ref()
            .and_then(|movie| movie.detail.as_ref())
            .map(|detail| detail.principals.len())
            .unwrap_or(0)
    }

    fn open_person(&mut self) {
        let Some(principal) = self
            .detail
            .as_ref()
            .and_then(|movie| movie.detail.as_ref())
            .and_then(|detail| detail.principals.get(self.principal_selected))
        else {
            return;
        };
        if principal.id.is_empty() {
            return;
        }
        if !self.session.is_logged_in() {
            self.status_message = "Sign in to view cast and crew.".into();
            self.view = View::Account;
            return;
        }

        self.next_request_id += 1;
        let request_id = self.next_request_id;
        self.pending_person = Some(PendingPerson { request_id });

        let people = self.people.clone();
        let id = principal.id.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = people.person_details(&id);
            let _ = tx.send(AsyncResponse::Person { request_id, result });
        });
    }

    fn submit_auth(&mut self) {
        if self.auth_form.busy {
            return;
        }
        let email = self.auth_form.email.trim().to_string();
        let password = self.auth_form.password.clone();
        if email.is_empty() || password.is_empty() {
            self.auth_form.error = Some("Email and password are required.".into());
            return;
        }
        if self.session.is_logged_in() {
            self.session.logout();
            self.status_message = "Signed out.".into();
        }

        self.auth_form.busy = true;
        self.auth_form.error = None;
        let action = self.auth_form.mode;
        let session = self.session.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = match action {
                AuthAction::SignIn => session.login(&email, &password),
                AuthAction::SignUp => session.register(&email, &password),
            };
            let _ = tx.send(AsyncResponse::Auth { action, result });
        });
    }

    fn draw(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(5),
                Constraint::Length(1),
            ])
            .split(frame.size());

        self.draw_search_bar(frame, chunks[0]);
        match self.view {
            View::Browse => self.draw_browse(frame, chunks[1]),
            View::Detail => self.draw_detail(frame, chunks[1]),
            View::Person => self.draw_person(frame, chunks[1]),
            View::Account => self.draw_account(frame, chunks[1]),
        }
        self.draw_status(frame, chunks[2]);
    }

    fn draw_search_bar(&self, frame: &mut Frame, area: Rect) {
        let genre = self
            .genre_index
            .map(|idx| Genre::ALL[idx].as_str())
            .unwrap_or("any");
        let rating = match RATING_BUCKETS[self.rating_index] {
            Some(min) => format!("{min:.0}+"),
            None => "any".into(),
        };
        let sort = self
            .controller
            .sort()
            .map(|key| key.label())
            .unwrap_or("none");
        let year = if self.year_input.is_empty() {
            "any".to_string()
        } else {
            self.year_input.clone()
        };

        let mut spans = vec![
            Span::styled("Search: ", Style::default().fg(Color::Gray)),
            Span::raw(self.search_input.clone()),
        ];
        if self.focus == InputFocus::Search {
            spans.push(Span::styled("▌", Style::default().fg(Color::Yellow)));
        }
        spans.push(Span::styled(
            format!("   year:{year} genre:{genre} rating:{rating} sort:{sort}"),
            Style::default().fg(Color::DarkGray),
        ));
        if self.focus == InputFocus::Year {
            spans.push(Span::styled(
                "  (typing year)",
                Style::default().fg(Color::Yellow),
            ));
        }

        let block = Block::default().borders(Borders::ALL).title("CineFyra");
        frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
    }

    fn draw_browse(&mut self, frame: &mut Frame, area: Rect) {
        let display = self.controller.display();
        let show_curated = self.search_input.trim().is_empty()
            && self.year_input.is_empty()
            && self.genre_index.is_none();

        let (list_area, side_area) = if show_curated {
            let halves = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
                .split(area);
            (halves[0], Some(halves[1]))
        } else {
            (area, None)
        };

        let items: Vec<ListItem> = display
            .iter()
            .map(|movie| ListItem::new(movie_row(movie)))
            .collect();
        let title = if show_curated {
            format!("Movies ({})", display.len())
        } else {
            format!("Results ({})", display.len())
        };
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(title))
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
        if display.is_empty() {
            self.list_state.select(None);
        } else {
            self.selected = self.selected.min(display.len() - 1);
            self.list_state.select(Some(self.selected));
        }
        frame.render_stateful_widget(list, list_area, &mut self.list_state);

        if let Some(side) = side_area {
            let rows = self.controller.curated_rows();
            let mut lines: Vec<Line> = Vec::new();
            for (heading, movies) in [
                ("Top Rated", &rows.top_rated),
                ("Horror", &rows.horror),
                ("Children's Picks", &rows.childrens),
            ] {
                lines.push(Line::from(Span::styled(
                    heading,
                    Style::default().add_modifier(Modifier::BOLD),
                )));
                if movies.is_empty() {
                    lines.push(Line::from(Span::styled(
                        "  (nothing yet)",
                        Style::default().fg(Color::DarkGray),
                    )));
                }
                for movie in movies.iter().take(5) {
                    lines.push(Line::from(format!("  {}", movie_row(movie))));
                }
                lines.push(Line::default());
            }
            let block = Block::default().borders(Borders::ALL).title("Picks");
            frame.render_widget(Paragraph::new(Text::from(lines)).block(block), side);
        }
    }

    fn draw_detail(&mut self, frame: &mut Frame, area: Rect) {
        let Some(movie) = self.detail.clone() else {
            self.view = View::Browse;
            return;
        };

        let mut lines: Vec<Line> = Vec::new();
        let heading = match movie.year() {
            Some(year) => format!("{} ({year})", movie.title()),
            None => movie.title().to_string(),
        };
        lines.push(Line::from(Span::styled(
            heading,
            Style::default().add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::default());

        if let Some(detail) = movie.detail.as_ref() {
            if !detail.genres.is_empty() {
                lines.push(Line::from(format!("Genres: {}", detail.genres.join(", "))));
            }
            if let Some(runtime) = detail.runtime {
                lines.push(Line::from(format!("Runtime: {runtime} min")));
            }
            if !detail.country.is_empty() {
                lines.push(Line::from(format!("Country: {}", detail.country)));
            }
            if let Some(boxoffice) = detail.boxoffice {
                lines.push(Line::from(format!("Box office: ${boxoffice}")));
            }
            let mut ratings: Vec<String> = Vec::new();
            for source in RatingSource::ALL {
                if let Some(value) = movie.rating(source) {
                    ratings.push(format!("{}: {}", source.label(), value));
                }
            }
            if !ratings.is_empty() {
                lines.push(Line::from(format!("Ratings: {}", ratings.join("  "))));
            }
            if !detail.plot.is_empty() {
                lines.push(Line::default());
                lines.push(Line::from(detail.plot.clone()));
            }
            if !detail.principals.is_empty() {
                lines.push(Line::default());
                lines.push(Line::from(Span::styled(
                    "Cast & crew (Enter to open)",
                    Style::default().add_modifier(Modifier::BOLD),
                )));
                for (idx, principal) in detail.principals.iter().enumerate() {
                    let marker = if idx == self.principal_selected {
                        "> "
                    } else {
                        "  "
                    };
                    let mut entry = format!("{marker}{} ({})", principal.name, principal.category);
                    if !principal.characters.is_empty() {
                        entry.push_str(&format!(" as {}", principal.characters.join(", ")));
                    }
                    let style = if idx == self.principal_selected {
                        Style::default().add_modifier(Modifier::REVERSED)
                    } else {
                        Style::default()
                    };
                    lines.push(Line::from(Span::styled(entry, style)));
                }
            }
        } else {
            lines.push(Line::from(Span::styled(
                "Details unavailable for this title.",
                Style::default().fg(Color::DarkGray),
            )));
        }

        let block = Block::default()
            .borders(Borders::ALL)
            .title("Details (Esc to go back)");
        frame.render_widget(
            Paragraph::new(Text::from(lines))
                .wrap(Wrap { trim: false })
                .block(block),
            area,
        );
    }

    fn draw_person(&mut self, frame: &mut Frame, area: Rect) {
        let Some(person) = self.person.clone() else {
            self.view = View::Detail;
            return;
        };

        let mut lines: Vec<Line> = Vec::new();
        let span = match (person.birth_year, person.death_year) {
            (Some(birth), Some(death)) => format!("{} ({birth}-{death})", person.name),
            (Some(birth), None) => format!("{} (b. {birth})", person.name),
            _ => person.name.clone(),
        };
        lines.push(Line::from(Span::styled(
            span,
            Style::default().add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::default());
        for role in &person.roles {
            let mut entry = format!("{} ({})", role.movie_name, role.category);
            if !role.characters.is_empty() {
                entry.push_str(&format!(" as {}", role.characters.join(", ")));
            }
            if let Some(rating) = role.imdb_rating {
                entry.push_str(&format!("  ★{rating:.1}"));
            }
            lines.push(Line::from(entry));
        }

        let block = Block::default()
            .borders(Borders::ALL)
            .title("Person (Esc to go back)");
        frame.render_widget(
            Paragraph::new(Text::from(lines))
                .wrap(Wrap { trim: false })
                .block(block),
            area,
        );
    }

    fn draw_account(&mut self, frame: &mut Frame, area: Rect) {
        let form = &self.auth_form;
        let mode = match form.mode {
            AuthAction::SignIn => "Sign in",
            AuthAction::SignUp => "Sign up",
        };
        let mut lines = vec![
            Line::from(Span::styled(
                format!("{mode} (F2 to switch, Tab to move, Enter to submit)"),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::default(),
        ];
        if let Some(email) = self.session.user_email() {
            lines.push(Line::from(format!("Currently signed in as {email}.")));
            lines.push(Line::default());
        }

        let email_style = if form.field == AuthField::Email {
            Style::default().add_modifier(Modifier::REVERSED)
        } else {
            Style::default()
        };
        let password_style = if form.field == AuthField::Password {
            Style::default().add_modifier(Modifier::REVERSED)
        } else {
            Style::default()
        };
        lines.push(Line::from(vec![
            Span::raw("Email:    "),
            Span::styled(form.email.clone(), email_style),
        ]));
        lines.push(Line::from(vec![
            Span::raw("Password: "),
            Span::styled("*".repeat(form.password.len()), password_style),
        ]));

        if form.busy {
            lines.push(Line::default());
            lines.push(Line::from(format!("{} working...", self.spinner.frame())));
        }
        if let Some(error) = &form.error {
            lines.push(Line::default());
            lines.push(Line::from(Span::styled(
                error.clone(),
                Style::default().fg(Color::Red),
            )));
        }

        let block = Block::default()
            .borders(Borders::ALL)
            .title("Account (Esc to go back)");
        frame.render_widget(Paragraph::new(Text::from(lines)).block(block), area);
    }

    fn draw_status(&self, frame: &mut Frame, area: Rect) {
        let text = match self.controller.phase() {
            Phase::Loading | Phase::Debouncing => {
                format!("{} loading...", self.spinner.frame())
            }
            Phase::Error(message) => format!("Failed to load: {message}"),
            Phase::Ready if self.controller.display().is_empty() => "No results.".to_string(),
            _ => self.status_message.clone(),
        };
        frame.render_widget(
            Paragraph::new(text).style(Style::default().fg(Color::Gray)),
            area,
        );
    }
}

fn movie_row(movie: &EnrichedMovie) -> String {
    let mut row = movie.title().to_string();
    if let Some(year) = movie.year() {
        row.push_str(&format!(" ({year})"));
    }
    if let Some(rating) = movie.imdb_rating() {
        row.push_str(&format!("  ★{rating:.1}"));
    }
    if let Some(classification) = movie.stub.classification.as_deref() {
        if !classification.is_empty() {
            row.push_str(&format!("  [{classification}]"));
        }
    }
    row
}

fn parse_year(input: &str) -> Option<i32> {
    if input.len() == 4 {
        input.parse::<i32>().ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MovieDetail, MovieStub};
    use crate::controller::Options;
    use crate::{auth, data, enrich, storage};

    #[test]
    fn model_starts_with_a_wired_async_channel() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            storage::Store::open(storage::Options {
                path: Some(dir.path().join("state.db")),
            })
            .unwrap(),
        );
        let client = Arc::new(
            api::Client::new(api::ClientConfig {
                user_agent: "cinefyra-test/0.1".into(),
                base_url: None,
                http_client: None,
                rate_limit_backoff: None,
            })
            .unwrap(),
        );
        let flow = Arc::new(auth::Flow::new(
            client,
            store.clone(),
            Duration::from_secs(60),
        ));
        let manager = Arc::new(session::Manager::new(store, flow));
        let enricher = Arc::new(enrich::Enricher::new(
            Arc::new(data::MockDetailService),
            2,
            0,
            Duration::from_millis(1),
        ));
        let controller = Controller::new(
            Arc::new(data::MockCatalogService),
            enricher,
            Options {
                page_size: 10,
                debounce: Duration::from_millis(50),
                scroll_threshold: 3,
            },
        );
        let mut model = Model::new(controller, manager.clone(), Arc::new(data::MockPersonService));

        // a message sent on the model's own channel comes back out of
        // poll_async
        model
            .response_tx
            .send(AsyncResponse::Person {
                request_id: 7,
                result: Err(api::Error::Http { status: 404 }),
            })
            .unwrap();
        assert!(model.poll_async());
        manager.close();
    }

    fn movie(title: &str, year: Option<i32>, rating: Option<f64>) -> EnrichedMovie {
        EnrichedMovie {
            stub: MovieStub {
                imdb_id: "tt0000001".into(),
                title: title.into(),
                year,
                poster: String::new(),
                imdb_rating: rating,
                classification: Some("PG".into()),
            },
            detail: None,
        }
    }

    #[test]
    fn movie_row_includes_the_available_fields() {
        let row = movie_row(&movie("The Matrix", Some(1999), Some(8.7)));
        assert_eq!(row, "The Matrix (1999)  ★8.7  [PG]");
    }

    #[test]
    fn movie_row_degrades_without_metadata() {
        let row = movie_row(&movie("Unknown", None, None));
        assert_eq!(row, "Unknown  [PG]");
    }

    #[test]
    fn detail_title_prefers_the_enriched_record() {
        let mut enriched = movie("Stub Title", Some(1999), None);
        enriched.detail = Some(MovieDetail {
            title: "Detail Title".into(),
            ..MovieDetail::default()
        });
        assert_eq!(enriched.title(), "Detail Title");
    }

    #[test]
    fn year_input_requires_four_digits() {
        assert_eq!(parse_year("1999"), Some(1999));
        assert_eq!(parse_year("99"), None);
        assert_eq!(parse_year(""), None);
    }

    #[test]
    fn auth_form_cycles_fields_and_modes() {
        let mut form = AuthForm::new();
        assert_eq!(form.field, AuthField::Email);
        form.next_field();
        assert_eq!(form.field, AuthField::Password);
        form.next_field();
        assert_eq!(form.field, AuthField::Email);

        form.error = Some("bad".into());
        form.toggle_mode();
        assert_eq!(form.mode, AuthAction::SignUp);
        assert_eq!(form.error, None);
    }
}
