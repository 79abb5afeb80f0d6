use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyEvent, KeyEventKind};

/// Rate at which the front-end polls the session for due phase timers.
/// Well under the ~10 ms granularity that reaction times need.
pub const TICK_RATE_MS: u64 = 10;

/// Unified event type consumed by the front-end loop
#[derive(Clone, Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Resize,
    Tick,
}

/// Source of terminal events (keyboard, resize)
pub trait AppEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError>;
}

/// Production event source reading crossterm events on a background thread
pub struct CrosstermEventSource {
    rx: Receiver<AppEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || loop {
            let forwarded = match event::read() {
                // key release events would toggle selections twice on some terminals
                Ok(CtEvent::Key(key)) if key.kind != KeyEventKind::Release => {
                    tx.send(AppEvent::Key(key))
                }
                Ok(CtEvent::Resize(_, _)) => tx.send(AppEvent::Resize),
                Ok(_) => Ok(()),
                Err(_) => break,
            };
            if forwarded.is_err() {
                break;
            }
        });

        Self { rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AppEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Channel-fed event source for headless runs
pub struct TestEventSource {
    rx: Receiver<AppEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<AppEvent>) -> Self {
        Self { rx }
    }
}

impl AppEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for FixedTicker {
    fn default() -> Self {
        Self::new(Duration::from_millis(TICK_RATE_MS))
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Advances the front-end one event or tick at a time
pub struct Runner<E: AppEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: AppEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// Blocks up to one tick interval; yields Tick when nothing arrived
    pub fn step(&self) -> AppEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => AppEvent::Tick,
        }
    }
}
