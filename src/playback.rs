use crate::stimulus::SoundKind;
use std::io::Write;

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("no audio output available")]
    Unavailable,
    #[error("audio output failed: {0}")]
    Io(#[from] std::io::Error),
}

/// "Play sound X now". Best effort: the caller logs failures and moves on.
pub trait SoundPlayer {
    fn play(&mut self, kind: SoundKind) -> Result<(), PlaybackError>;
}

/// Rings the terminal bell for every sound
pub struct TerminalBell<W: Write> {
    out: W,
}

impl<W: Write> TerminalBell<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl TerminalBell<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> SoundPlayer for TerminalBell<W> {
    fn play(&mut self, _kind: SoundKind) -> Result<(), PlaybackError> {
        self.out.write_all(b"\x07")?;
        self.out.flush()?;
        Ok(())
    }
}

/// Discards playback; keeps a log of what would have been played
#[derive(Debug, Default, Clone)]
pub struct SilentPlayer {
    pub played: Vec<SoundKind>,
}

impl SoundPlayer for SilentPlayer {
    fn play(&mut self, kind: SoundKind) -> Result<(), PlaybackError> {
        self.played.push(kind);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_bell_writes_bel() {
        let mut player = TerminalBell::new(Vec::new());
        player.play(SoundKind::Bell).unwrap();
        player.play(SoundKind::Dog).unwrap();
        assert_eq!(player.out, b"\x07\x07");
    }

    #[test]
    fn silent_player_records_order() {
        let mut player = SilentPlayer::default();
        player.play(SoundKind::Thunder).unwrap();
        player.play(SoundKind::Clap).unwrap();
        assert_eq!(player.played, vec![SoundKind::Thunder, SoundKind::Clap]);
    }
}
