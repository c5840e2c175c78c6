//! Audible feedback for the operator
//!
//! Tones are best-effort: the sequencer ignores (and only debug-logs) any
//! failure to play one.

use std::io::Write;

use crate::error::{DialerError, DialerResult};

/// Feedback tone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tone {
    /// A call is being placed
    Dial,
    /// A call completed
    Success,
    /// A call failed
    Error,
}

/// Something that can play feedback tones
pub trait FeedbackSink: Send + Sync {
    fn play(&self, tone: Tone) -> DialerResult<()>;
}

/// Plays nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFeedback;

impl FeedbackSink for NoFeedback {
    fn play(&self, _tone: Tone) -> DialerResult<()> {
        Ok(())
    }
}

/// Rings the terminal bell on success and error
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalBell;

impl FeedbackSink for TerminalBell {
    fn play(&self, tone: Tone) -> DialerResult<()> {
        let bells: &[u8] = match tone {
            Tone::Dial => return Ok(()),
            Tone::Success => b"\x07",
            Tone::Error => b"\x07\x07",
        };
        let mut stderr = std::io::stderr();
        stderr
            .write_all(bells)
            .and_then(|_| stderr.flush())
            .map_err(|e| DialerError::internal(format!("bell: {e}")))
    }
}

/// Play a tone, swallowing failures
pub(crate) fn play_best_effort(sink: &dyn FeedbackSink, tone: Tone) {
    if let Err(e) = sink.play(tone) {
        tracing::debug!(?tone, error = %e, "Feedback tone failed to play");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};
    use tracing_test::traced_test;

    struct BrokenSpeaker;

    impl FeedbackSink for BrokenSpeaker {
        fn play(&self, _tone: Tone) -> DialerResult<()> {
            Err(DialerError::internal("audio output unavailable"))
        }
    }

    #[test]
    fn test_silent_sinks() {
        assert_ok!(NoFeedback.play(Tone::Error));
        assert_ok!(TerminalBell.play(Tone::Dial));
        assert_err!(BrokenSpeaker.play(Tone::Success));
    }

    #[traced_test]
    #[test]
    fn test_failed_tone_is_only_logged() {
        play_best_effort(&BrokenSpeaker, Tone::Success);
        assert!(logs_contain("Feedback tone failed to play"));
    }
}
