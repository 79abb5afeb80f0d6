use std::sync::mpsc;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use soundspan::{
    runtime::{AppEvent, FixedTicker, Runner, TestEventSource},
    AlertPolicy, Command, GameSession, Phase, SessionEvent, SessionLedger, TrialTiming,
};

fn quick_timing() -> TrialTiming {
    TrialTiming {
        lead_in_ms: 0,
        inter_stimulus_ms: 5,
        delay_secs: 0,
    }
}

// Drives a real-clock session through Runner/TestEventSource without a TTY
#[test]
fn headless_trial_reaches_selection_and_submits() {
    let mut session = GameSession::new(
        SessionLedger::in_memory(AlertPolicy::default()),
        quick_timing(),
    )
    .with_seed(11);

    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(
        TestEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(2)),
    );

    tx.send(AppEvent::Key(KeyEvent::new(KeyCode::Char('s'), KeyModifiers::NONE)))
        .unwrap();
    tx.send(AppEvent::Key(KeyEvent::new(KeyCode::Char('r'), KeyModifiers::NONE)))
        .unwrap();

    let mut played = 0;
    for _ in 0..500u32 {
        match runner.step() {
            AppEvent::Tick => {
                for event in session.on_tick() {
                    if let SessionEvent::SoundPlayed { .. } = event {
                        played += 1;
                    }
                }
            }
            AppEvent::Resize => {}
            AppEvent::Key(key) => match key.code {
                KeyCode::Char('s') => {
                    session.on_command(Command::Start);
                }
                KeyCode::Char('r') => {
                    session.on_command(Command::Ready);
                }
                _ => {}
            },
        }
        if session.phase() == Phase::Selection {
            break;
        }
    }

    assert_eq!(session.phase(), Phase::Selection, "trial should reach recall");
    assert_eq!(played, 3);
    let trial = session.trial().unwrap();
    assert!(trial.selection_window_started_at.is_some());

    let targets = trial.stimuli.target_ids();
    for id in targets {
        session.on_command(Command::Toggle(id));
    }
    match session.on_command(Command::Submit) {
        SessionEvent::Submitted { record, .. } => {
            assert!(record.is_correct);
            assert_eq!(record.accuracy, 100.0);
        }
        other => panic!("expected Submitted, got {other:?}"),
    }
}

#[test]
fn headless_abandon_mid_listen_returns_to_setup() {
    let mut session = GameSession::new(
        SessionLedger::in_memory(AlertPolicy::default()),
        quick_timing(),
    );
    session.on_command(Command::Start);
    session.on_command(Command::Ready);
    assert_eq!(session.phase(), Phase::Listen);

    session.on_command(Command::Abandon);
    assert_eq!(session.phase(), Phase::Setup);
    assert!(session.trial().is_none());

    std::thread::sleep(Duration::from_millis(30));
    assert!(session.on_tick().is_empty());
    assert!(session.ledger().is_empty());
}
