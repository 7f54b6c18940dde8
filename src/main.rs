mod ui;

use clap::{error::ErrorKind, CommandFactory, Parser, ValueEnum};
use crossterm::{
    event::{self, Event as CtEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    fs::OpenOptions,
    io::{self, stdin},
    path::PathBuf,
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};
use tracing::{info, warn};
use typetrial::{
    clock::{ClockTick, ThreadClock},
    config::{Config, ConfigStore, FileConfigStore},
    notify::{ChannelListener, Event},
    passage::PassageCatalog,
    records::RecordStore,
    runtime::SessionEvent,
    session::{Phase, Session, SessionContext, DURATION_CHOICES},
};

const POLL_INTERVAL_MS: u64 = 100;

/// timed typing test with per-tester best scores
#[derive(Parser, Debug, Clone)]
#[clap(version, about)]
pub struct Cli {
    /// number of seconds to run the test (default: last used, else 30)
    #[clap(short = 's', long)]
    secs: Option<u32>,

    /// language to pull passages from (default: last used, else english)
    #[clap(short = 'l', long, value_enum)]
    language: Option<SupportedLanguage>,

    /// tester name the best score is recorded under (default: $USER)
    #[clap(short = 'u', long)]
    tester: Option<String>,

    /// seed passage selection for a reproducible run
    #[clap(long)]
    seed: Option<u64>,

    /// write logs to this file; the terminal belongs to the UI
    #[clap(long)]
    log_file: Option<PathBuf>,

    /// log verbosity (-v info, -vv debug, -vvv trace)
    #[clap(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Copy, Clone, PartialEq, ValueEnum, strum_macros::Display)]
pub enum SupportedLanguage {
    English,
    Kazakh,
    Russian,
}

impl SupportedLanguage {
    fn from_tag(tag: &str) -> Option<Self> {
        Self::value_variants()
            .iter()
            .copied()
            .find(|l| l.to_string() == tag)
    }

    fn next(self) -> Self {
        match self {
            SupportedLanguage::English => SupportedLanguage::Kazakh,
            SupportedLanguage::Kazakh => SupportedLanguage::Russian,
            SupportedLanguage::Russian => SupportedLanguage::English,
        }
    }
}

/// Merge CLI flags over stored preferences.
fn resolve_config(cli: &Cli, stored: Config) -> Config {
    let tester = cli
        .tester
        .clone()
        .or(stored.tester)
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "guest".to_string());

    Config {
        duration_secs: cli.secs.unwrap_or(stored.duration_secs),
        language: cli
            .language
            .map(|l| l.to_string())
            .unwrap_or(stored.language),
        tester: Some(tester),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppState {
    Typing,
    Results,
    Records,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Flow {
    Continue,
    Quit,
}

#[derive(Debug)]
enum AppEvent {
    Key(KeyEvent),
    Resize,
    Clock(ClockTick),
}

impl From<ClockTick> for AppEvent {
    fn from(tick: ClockTick) -> Self {
        AppEvent::Clock(tick)
    }
}

pub struct App {
    pub session: Session,
    pub state: AppState,
    /// Latest scoreboard line, fed by the session's notifications.
    pub status: String,
    notifications: Receiver<Event>,
}

impl App {
    pub fn new(mut session: Session) -> Self {
        let (tx, rx) = mpsc::channel();
        session
            .bus_mut()
            .subscribe(Arc::new(ChannelListener::new(tx)));
        Self {
            session,
            state: AppState::Typing,
            status: String::from("start typing"),
            notifications: rx,
        }
    }

    fn on_key(&mut self, key: KeyEvent) -> Flow {
        if key.kind != KeyEventKind::Press {
            return Flow::Continue;
        }
        // AltGr arrives as CONTROL|ALT on Windows
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL)
            && !key.modifiers.contains(KeyModifiers::ALT);

        match key.code {
            KeyCode::Esc => return Flow::Quit,
            KeyCode::Char('c') if ctrl => return Flow::Quit,
            KeyCode::Char('t') if ctrl => self.cycle_duration(),
            KeyCode::Char('l') if ctrl => self.cycle_language(),
            KeyCode::Char(_) if ctrl => {}
            KeyCode::Left => self.restart(false),
            KeyCode::Right => self.restart(true),
            KeyCode::Char(c) => match self.state {
                AppState::Typing => self.session.submit_char(c),
                AppState::Results => match c {
                    'r' => self.restart(false),
                    'n' => self.restart(true),
                    'b' => self.state = AppState::Records,
                    _ => {}
                },
                AppState::Records => match c {
                    'r' => self.restart(false),
                    'n' => self.restart(true),
                    'b' => self.state = AppState::Results,
                    _ => {}
                },
            },
            KeyCode::Backspace if self.state == AppState::Records => {
                self.state = AppState::Results;
            }
            _ => {}
        }

        self.drain_notifications();
        Flow::Continue
    }

    fn on_clock(&mut self, tick: ClockTick) {
        self.session.handle(SessionEvent::Tick(tick));
        self.drain_notifications();
    }

    fn restart(&mut self, new_text: bool) {
        if new_text {
            self.session.retry();
        } else {
            self.session.restart_same();
        }
        self.state = AppState::Typing;
        self.status = String::from("start typing");
    }

    fn cycle_duration(&mut self) {
        let current = self.session.configured_duration();
        let next = DURATION_CHOICES
            .iter()
            .position(|d| *d == current)
            .map_or(DURATION_CHOICES[0], |i| {
                DURATION_CHOICES[(i + 1) % DURATION_CHOICES.len()]
            });
        if let Ok(true) = self.session.change_duration(next) {
            self.state = AppState::Typing;
            self.status = format!("duration set to {next}s");
        }
    }

    fn cycle_language(&mut self) {
        let next = SupportedLanguage::from_tag(self.session.language())
            .unwrap_or(SupportedLanguage::English)
            .next();
        if self.session.change_language(&next.to_string()) {
            self.state = AppState::Typing;
        }
    }

    fn drain_notifications(&mut self) {
        while let Ok(event) = self.notifications.try_recv() {
            match event {
                Event::ScoringUpdate { wpm } => {
                    self.status = format!("current wpm: {wpm:.1}");
                }
                Event::TestCompleted {
                    score, new_record, ..
                } => {
                    self.status = if new_record {
                        format!("new personal best: {:.2} wpm", score.wpm)
                    } else {
                        format!("{:.2} wpm", score.wpm)
                    };
                    self.state = AppState::Results;
                }
                Event::LanguageChanged { tag } => {
                    self.status = format!("language changed to {tag}");
                }
            }
        }
    }
}

fn init_logging(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let Some(path) = &cli.log_file else {
        return Ok(());
    };

    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();

    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    init_logging(&cli)?;

    let store = FileConfigStore::new();
    let config = resolve_config(&cli, store.load());
    config.validate()?;

    let catalog = Arc::new(PassageCatalog::builtin()?);
    let records = Arc::new(RecordStore::new());
    let (tx, rx) = mpsc::channel();

    let mut ctx = SessionContext::new(catalog, records, ThreadClock::new(tx.clone()));
    if let Some(seed) = cli.seed {
        ctx = ctx.with_seed(seed);
    }
    let tester = config.tester.clone().unwrap_or_default();
    let session = Session::start(ctx, &config.language, config.duration_secs, &tester)?;
    let mut app = App::new(session);

    spawn_terminal_events(tx);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = start_tui(&mut terminal, &mut app, &rx);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    app.session.end_session();
    let last_used = Config {
        duration_secs: app.session.configured_duration(),
        language: app.session.language().to_string(),
        tester: config.tester,
    };
    if let Err(err) = store.save(&last_used) {
        warn!(%err, "could not save preferences");
    }

    result
}

fn start_tui<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    events: &Receiver<AppEvent>,
) -> Result<(), Box<dyn Error>> {
    info!(tester = app.session.tester(), "terminal session started");

    loop {
        terminal.draw(|f| f.render_widget(&*app, f.area()))?;

        match events.recv_timeout(Duration::from_millis(POLL_INTERVAL_MS)) {
            Ok(AppEvent::Key(key)) => {
                if app.on_key(key) == Flow::Quit {
                    break;
                }
            }
            Ok(AppEvent::Clock(tick)) => app.on_clock(tick),
            Ok(AppEvent::Resize) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if app.session.phase() == Phase::Finished && app.state == AppState::Typing {
            app.state = AppState::Results;
        }
    }

    Ok(())
}

fn spawn_terminal_events(tx: Sender<AppEvent>) {
    thread::spawn(move || loop {
        let evt = match event::read() {
            Ok(CtEvent::Key(key)) => AppEvent::Key(key),
            Ok(CtEvent::Resize(_, _)) => AppEvent::Resize,
            Ok(_) => continue,
            Err(_) => break,
        };

        if tx.send(evt).is_err() {
            break;
        }
    });
}
