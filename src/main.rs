mod report;
mod ui;

use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use soundspan::{
    config::{Config, ConfigStore, FileConfigStore},
    ledger::{SessionLedger, SqliteLedgerStore},
    logging,
    playback::TerminalBell,
    upload::JsonlOutbox,
    runtime::{AppEvent, CrosstermEventSource, FixedTicker, Runner},
    stimulus::SoundId,
    Command, GameSession, Phase, SessionEvent,
};
use std::{
    error::Error,
    fs::File,
    io::{self, stdin},
    path::PathBuf,
};
use tracing::{error, info, warn};

/// auditory working-memory trainer
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Plays three sounds, holds them through a short pause, then asks you to pick them out of six. Results are kept locally and a caregiver alert is raised when recent trials look concerning."
)]
pub struct Cli {
    #[clap(subcommand)]
    command: Option<Cmd>,

    /// ledger database to read and write
    #[clap(long, global = true)]
    db: Option<PathBuf>,

    /// config file to load
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// seconds to hold the sounds in mind before recall
    #[clap(short = 'd', long)]
    delay_secs: Option<u32>,

    /// seed the sound selection for reproducible trials
    #[clap(long)]
    seed: Option<u64>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum Cmd {
    /// run trials in the terminal (default)
    Play,
    /// list recent trials, newest first
    History {
        /// number of trials to show
        #[clap(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },
    /// summary over every stored trial
    Stats,
    /// write every stored trial to a CSV file
    Export { path: PathBuf },
    /// delete every stored trial
    Clear {
        /// confirm the deletion
        #[clap(long)]
        yes: bool,
    },
}

impl Cli {
    fn load_config(&self) -> Config {
        let store = match &self.config {
            Some(path) => FileConfigStore::with_path(path),
            None => FileConfigStore::new(),
        };
        let mut config = store.load();
        if let Some(delay) = self.delay_secs {
            config.timing.delay_secs = delay;
        }
        config
    }

    fn open_ledger(&self, config: &Config) -> Result<SessionLedger, Box<dyn Error>> {
        let store = match &self.db {
            Some(path) => SqliteLedgerStore::open(path)?,
            None => SqliteLedgerStore::open_default()?,
        };
        Ok(SessionLedger::open(store, config.alert)?)
    }
}

/// Terminal front-end state around the session
#[derive(Debug)]
pub struct App {
    pub session: GameSession,
    /// One-line notice shown under the main panel
    pub status: Option<String>,
}

impl App {
    pub fn new(session: GameSession) -> Self {
        Self {
            session,
            status: None,
        }
    }

    /// Id of the sound at 1-based position `slot` in the recall display
    fn display_id(&self, slot: usize) -> Option<SoundId> {
        let trial = self.session.trial()?;
        slot.checked_sub(1)
            .and_then(|i| trial.stimuli.display_set.get(i))
            .map(|s| s.id)
    }

    /// Map a key to a session command. Returns true when the user wants out.
    pub fn on_key(&mut self, key: KeyEvent) -> bool {
        let ctrl_c =
            key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c');
        if key.code == KeyCode::Esc || ctrl_c {
            self.session.on_command(Command::Abandon);
            return true;
        }

        let command = match (self.session.phase(), key.code) {
            (Phase::Setup, KeyCode::Char('s')) => Some(Command::Start),
            (Phase::Instructions, KeyCode::Char('r')) => Some(Command::Ready),
            (Phase::Selection, KeyCode::Char(c)) => c
                .to_digit(10)
                .and_then(|d| self.display_id(d as usize))
                .map(Command::Toggle),
            (Phase::Selection, KeyCode::Enter) => Some(Command::Submit),
            (Phase::Feedback, KeyCode::Enter | KeyCode::Char(' ')) => Some(Command::Return),
            _ => None,
        };

        if let Some(command) = command {
            let event = self.session.on_command(command);
            self.observe(event);
        }
        false
    }

    /// Poll due phase timers. Returns true if anything changed.
    pub fn on_tick(&mut self) -> bool {
        let events = self.session.on_tick();
        let changed = !events.is_empty();
        for event in events {
            self.observe(event);
        }
        changed
    }

    fn observe(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::PhaseChanged(Phase::Instructions) => self.status = None,
            SessionEvent::Submitted {
                persisted: Err(e), ..
            } => {
                self.status = Some(format!("result kept for this run only: {e}"));
            }
            _ => {}
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let log_path = logging::init().ok();

    let config = cli.load_config();
    let mut ledger = cli.open_ledger(&config)?;

    match cli.command.clone().unwrap_or(Cmd::Play) {
        Cmd::Play => {
            if let Err(e) = config.timing.validate() {
                let mut cmd = Cli::command();
                cmd.error(ErrorKind::ValueValidation, format!("invalid trial timing: {e}"))
                    .exit();
            }
            if !stdin().is_tty() {
                let mut cmd = Cli::command();
                cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
            }

            let mut session = GameSession::new(ledger, config.timing)
                .with_player(TerminalBell::stdout());
            if let Some(seed) = cli.seed {
                session = session.with_seed(seed);
            }
            if let Some(user_id) = config.user_id {
                match JsonlOutbox::open_default() {
                    Ok(outbox) => {
                        info!(path = %outbox.path().display(), user_id, "queueing result uploads");
                        session = session.with_sink(outbox, user_id, config.difficulty.clone());
                    }
                    Err(e) => warn!(error = %e, "result uploads disabled"),
                }
            }
            info!(log = ?log_path, "starting interactive session");
            run_interactive(App::new(session))?;
        }
        Cmd::History { limit } => {
            for line in report::history_lines(&ledger, limit) {
                println!("{line}");
            }
        }
        Cmd::Stats => {
            for line in report::stats_lines(&ledger) {
                println!("{line}");
            }
        }
        Cmd::Export { path } => {
            ledger.export_csv(File::create(&path)?)?;
            println!("exported {} trials to {}", ledger.len(), path.display());
        }
        Cmd::Clear { yes } => {
            if !yes {
                let mut cmd = Cli::command();
                cmd.error(
                    ErrorKind::MissingRequiredArgument,
                    "clearing the history cannot be undone; pass --yes to confirm",
                )
                .exit();
            }
            let count = ledger.len();
            ledger.clear_all()?;
            println!("cleared {count} trials");
        }
    }

    Ok(())
}

fn run_interactive(mut app: App) -> Result<(), Box<dyn Error>> {
    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = event_loop(&mut terminal, &mut app);
    if let Err(e) = &result {
        error!(error = %e, "interactive session failed");
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn event_loop<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(CrosstermEventSource::new(), FixedTicker::default());
    terminal.draw(|f| ui::draw(app, f))?;

    loop {
        let redraw = match runner.step() {
            AppEvent::Tick => app.on_tick(),
            AppEvent::Resize => true,
            AppEvent::Key(key) => {
                if app.on_key(key) {
                    break;
                }
                true
            }
        };
        if redraw {
            terminal.draw(|f| ui::draw(app, f))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use soundspan::{
        clock::ManualClock,
        ledger::{LedgerError, LedgerStore},
        AlertPolicy, SessionRecord, TrialTiming,
    };

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn test_app(clock: &ManualClock) -> App {
        let session = GameSession::new(
            SessionLedger::in_memory(AlertPolicy::default()),
            TrialTiming::default(),
        )
        .with_clock(clock.clone())
        .with_seed(11);
        App::new(session)
    }

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::parse_from(["soundspan"]);
        assert_eq!(cli.command, None);
        assert_eq!(cli.db, None);
        assert_eq!(cli.delay_secs, None);
        assert_eq!(cli.seed, None);
    }

    #[test]
    fn test_cli_subcommands() {
        let cli = Cli::parse_from(["soundspan", "history", "-n", "3"]);
        assert_eq!(cli.command, Some(Cmd::History { limit: 3 }));

        let cli = Cli::parse_from(["soundspan", "history"]);
        assert_eq!(cli.command, Some(Cmd::History { limit: 10 }));

        let cli = Cli::parse_from(["soundspan", "clear", "--yes", "--db", "x.db"]);
        assert_eq!(cli.command, Some(Cmd::Clear { yes: true }));
        assert_eq!(cli.db, Some(PathBuf::from("x.db")));

        let cli = Cli::parse_from(["soundspan", "export", "out.csv"]);
        assert_eq!(
            cli.command,
            Some(Cmd::Export {
                path: PathBuf::from("out.csv")
            })
        );
    }

    #[test]
    fn test_cli_overrides_delay() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = dir.path().join("config.json");
        let cli = Cli::parse_from([
            "soundspan",
            "--config",
            cfg.to_str().unwrap(),
            "-d",
            "3",
            "--seed",
            "9",
        ]);
        let config = cli.load_config();
        assert_eq!(config.timing.delay_secs, 3);
        assert_eq!(config.timing.lead_in_ms, 800);
        assert_eq!(cli.seed, Some(9));
    }

    #[test]
    fn test_keys_drive_a_full_trial() {
        let clock = ManualClock::default();
        let mut app = test_app(&clock);

        assert!(!app.on_key(key(KeyCode::Char('r'))));
        assert_eq!(app.session.phase(), Phase::Setup);

        app.on_key(key(KeyCode::Char('s')));
        assert_eq!(app.session.phase(), Phase::Instructions);
        app.on_key(key(KeyCode::Char('r')));
        assert_eq!(app.session.phase(), Phase::Listen);

        clock.advance(TrialTiming::default().total_before_selection(3));
        assert!(app.on_tick());
        assert_eq!(app.session.phase(), Phase::Selection);

        let targets = app.session.trial().unwrap().stimuli.target_ids();
        let display: Vec<SoundId> = app
            .session
            .trial()
            .unwrap()
            .stimuli
            .display_set
            .iter()
            .map(|s| s.id)
            .collect();
        for target in &targets {
            let slot = display.iter().position(|id| id == target).unwrap() + 1;
            let digit = char::from_digit(slot as u32, 10).unwrap();
            app.on_key(key(KeyCode::Char(digit)));
        }
        app.on_key(key(KeyCode::Enter));
        assert_eq!(app.session.phase(), Phase::Feedback);
        assert_eq!(app.session.last_record().unwrap().accuracy, 100.0);

        app.on_key(key(KeyCode::Char(' ')));
        assert_eq!(app.session.phase(), Phase::Setup);
        assert_eq!(app.session.next_session_number(), 2);
    }

    struct ReadOnlyStore;

    impl LedgerStore for ReadOnlyStore {
        fn load(&self) -> Result<Vec<SessionRecord>, LedgerError> {
            Ok(Vec::new())
        }

        fn append(&mut self, _record: &SessionRecord) -> Result<(), LedgerError> {
            Err(LedgerError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "read-only file system",
            )))
        }

        fn clear(&mut self) -> Result<(), LedgerError> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_write_shows_status_and_trial_continues() {
        let clock = ManualClock::default();
        let ledger = SessionLedger::open(ReadOnlyStore, AlertPolicy::default()).unwrap();
        let mut app = App::new(
            GameSession::new(ledger, TrialTiming::default())
                .with_clock(clock.clone())
                .with_seed(11),
        );

        app.on_key(key(KeyCode::Char('s')));
        app.on_key(key(KeyCode::Char('r')));
        clock.advance(TrialTiming::default().total_before_selection(3));
        app.on_tick();
        for slot in ['1', '2', '3'] {
            app.on_key(key(KeyCode::Char(slot)));
        }
        app.on_key(key(KeyCode::Enter));

        assert_eq!(app.session.phase(), Phase::Feedback);
        let status = app.status.clone().unwrap();
        assert!(status.starts_with("result kept for this run only"));
        assert!(status.contains("read-only file system"));

        app.on_key(key(KeyCode::Enter));
        app.on_key(key(KeyCode::Char('s')));
        assert_eq!(app.status, None);
        assert_eq!(app.session.trial().unwrap().session_number, 2);
    }

    #[test]
    fn test_out_of_range_slot_is_ignored() {
        let clock = ManualClock::default();
        let mut app = test_app(&clock);
        app.on_key(key(KeyCode::Char('s')));
        app.on_key(key(KeyCode::Char('r')));
        clock.advance_ms(20_000);
        app.on_tick();

        app.on_key(key(KeyCode::Char('0')));
        app.on_key(key(KeyCode::Char('7')));
        assert!(app.session.trial().unwrap().selection.is_empty());
    }

    #[test]
    fn test_escape_quits_and_abandons() {
        let clock = ManualClock::default();
        let mut app = test_app(&clock);
        app.on_key(key(KeyCode::Char('s')));
        assert!(app.on_key(key(KeyCode::Esc)));
        assert_eq!(app.session.phase(), Phase::Setup);
        assert!(app.session.trial().is_none());
    }

    #[test]
    fn test_ctrl_c_quits() {
        let clock = ManualClock::default();
        let mut app = test_app(&clock);
        assert!(app.on_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)));
    }
}
