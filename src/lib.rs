// Library surface for the terminal front-end and headless integration tests.
pub mod app_dirs;
pub mod clock;
pub mod config;
pub mod ledger;
pub mod logging;
pub mod playback;
pub mod runtime;
pub mod scoring;
pub mod session;
pub mod stimulus;
pub mod trial_clock;
pub mod upload;
pub mod util;

pub use ledger::{AlertPolicy, SessionLedger, SessionRecord};
pub use session::{Command, GameSession, SessionEvent};
pub use trial_clock::{Phase, TrialTiming};
