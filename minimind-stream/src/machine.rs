//! Per-turn extraction state machine
//!
//! ```text
//! Idle -> AwaitingReasoningClose -> AccumulatingPostReasoning
//!      -> CommandDetected | CompletedWithoutEarlyDetection | Error
//! ```
//!
//! Callbacks are serialized by one mutex over the buffers. The detected slot
//! is a `OnceCell`, so a command is detected at most once per generation no
//! matter which callback finds it.

use crate::extract::{Extracted, Extractor};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingReasoningClose,
    AccumulatingPostReasoning,
    CommandDetected,
    CompletedWithoutEarlyDetection,
    Error,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Phase::CommandDetected | Phase::CompletedWithoutEarlyDetection | Phase::Error
        )
    }
}

/// The command a generation settled on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub command: String,
    pub rationale: Option<String>,
    pub reasoning: Option<String>,
    pub best_effort: bool,
}

impl Detection {
    fn new(found: Extracted, reasoning: Option<String>) -> Self {
        Self {
            command: found.command,
            rationale: found.rationale,
            reasoning,
            best_effort: found.best_effort,
        }
    }
}

/// What a chunk did to the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    /// First detection; the caller owns the hand-off
    Detected(Detection),
    /// Machine was already terminal
    Ignored,
}

#[derive(Debug)]
struct Buffers {
    phase: Phase,
    raw: String,
    post: String,
}

#[derive(Debug)]
pub struct PendingGeneration {
    extractor: Arc<Extractor>,
    buffers: Mutex<Buffers>,
    detected: OnceCell<Detection>,
}

impl PendingGeneration {
    pub fn new(extractor: Arc<Extractor>) -> Self {
        Self {
            extractor,
            buffers: Mutex::new(Buffers {
                phase: Phase::Idle,
                raw: String::new(),
                post: String::new(),
            }),
            detected: OnceCell::new(),
        }
    }

    /// Leave `Idle`. Without a reasoning close marker there is nothing to wait
    /// for and accumulation starts at once.
    pub fn begin(&self) {
        let mut buffers = self.buffers.lock();
        if buffers.phase == Phase::Idle {
            buffers.phase = self.initial_phase();
        }
    }

    pub fn phase(&self) -> Phase {
        self.buffers.lock().phase
    }

    pub fn detection(&self) -> Option<&Detection> {
        self.detected.get()
    }

    /// Everything received so far
    pub fn raw_text(&self) -> String {
        self.buffers.lock().raw.clone()
    }

    pub fn on_chunk(&self, text: &str) -> Verdict {
        if self.detected.get().is_some() {
            return Verdict::Ignored;
        }
        let mut buffers = self.buffers.lock();
        match buffers.phase {
            phase if phase.is_terminal() => return Verdict::Ignored,
            Phase::Idle => buffers.phase = self.initial_phase(),
            _ => {}
        }
        buffers.raw.push_str(text);

        if buffers.phase == Phase::AwaitingReasoningClose {
            let Some(end) = self.extractor.find_close(&buffers.raw) else {
                return Verdict::Continue;
            };
            let post = buffers.raw[end..].to_string();
            buffers.post = post;
            buffers.phase = Phase::AccumulatingPostReasoning;
            debug!(reasoning_len = end, "reasoning closed");
        } else {
            buffers.post.push_str(text);
        }

        let Some(found) = self.extractor.extract_complete_lines(&buffers.post, false) else {
            return Verdict::Continue;
        };
        let detection = Detection::new(found, self.extractor.reasoning_block(&buffers.raw));
        if self.detected.set(detection.clone()).is_err() {
            return Verdict::Ignored;
        }
        buffers.phase = Phase::CommandDetected;
        Verdict::Detected(detection)
    }

    /// Final pass over the full response. `None` when a command was already
    /// detected early, or when nothing at all can be used.
    pub fn on_complete(&self, full: &str) -> Option<Detection> {
        if self.detected.get().is_some() {
            return None;
        }
        let mut buffers = self.buffers.lock();
        if buffers.phase.is_terminal() {
            return None;
        }
        buffers.phase = Phase::CompletedWithoutEarlyDetection;
        let full = if full.is_empty() { buffers.raw.as_str() } else { full };

        let found = self.extractor.extract_final(full)?;
        let detection = Detection::new(found, self.extractor.reasoning_block(full));
        self.detected.set(detection.clone()).ok()?;
        Some(detection)
    }

    /// Returns false if the machine had already finished
    pub fn on_error(&self) -> bool {
        let mut buffers = self.buffers.lock();
        if buffers.phase.is_terminal() {
            return false;
        }
        buffers.phase = Phase::Error;
        true
    }

    fn initial_phase(&self) -> Phase {
        if self.extractor.expects_reasoning() {
            Phase::AwaitingReasoningClose
        } else {
            Phase::AccumulatingPostReasoning
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minimind_core::config::StreamingConfig;
    use minimind_core::CommandParser;

    fn machine(config: StreamingConfig) -> PendingGeneration {
        let machine = PendingGeneration::new(Arc::new(Extractor::new(
            CommandParser::default(),
            &config,
        )));
        machine.begin();
        machine
    }

    #[test]
    fn test_detects_after_reasoning_across_chunks() {
        let m = machine(StreamingConfig::default());
        assert_eq!(m.phase(), Phase::AwaitingReasoningClose);

        // a command inside the reasoning doesn't count
        assert_eq!(m.on_chunk("<think>SAY hi\nthen go</th"), Verdict::Continue);
        assert_eq!(m.on_chunk("ink>GO TO Kit"), Verdict::Continue);
        assert_eq!(m.phase(), Phase::AccumulatingPostReasoning);

        let Verdict::Detected(found) = m.on_chunk("chen | because hungry\njunk") else {
            panic!("expected a detection");
        };
        assert_eq!(found.command, "GO TO Kitchen");
        assert_eq!(found.rationale.as_deref(), Some("because hungry"));
        assert_eq!(found.reasoning.as_deref(), Some("SAY hi\nthen go"));
        assert_eq!(m.phase(), Phase::CommandDetected);
    }

    #[test]
    fn test_callbacks_after_detection_are_noops() {
        let m = machine(StreamingConfig::default());
        assert!(matches!(m.on_chunk("</think>LOOK\n"), Verdict::Detected(_)));

        assert_eq!(m.on_chunk("SAY again\n"), Verdict::Ignored);
        assert_eq!(m.on_complete("</think>SAY again\n"), None);
        assert!(!m.on_error());
        assert_eq!(m.detection().map(|d| d.command.as_str()), Some("LOOK"));
        assert!(!m.raw_text().contains("again"));
    }

    #[test]
    fn test_complete_without_early_detection() {
        let m = machine(StreamingConfig::default());
        assert_eq!(m.on_chunk("<think>x</think>\nSHOUT fire"), Verdict::Continue);

        let found = m.on_complete("<think>x</think>\nSHOUT fire").unwrap();
        assert_eq!(found.command, "SHOUT fire");
        assert!(!found.best_effort);
        assert_eq!(m.phase(), Phase::CompletedWithoutEarlyDetection);
        assert_eq!(m.on_chunk("LOOK\n"), Verdict::Ignored);
    }

    #[test]
    fn test_no_close_marker_starts_accumulating() {
        let m = machine(StreamingConfig {
            reasoning_close: None,
            ..StreamingConfig::default()
        });
        assert_eq!(m.phase(), Phase::AccumulatingPostReasoning);
        let Verdict::Detected(found) = m.on_chunk("EMOTE waves\n") else {
            panic!("expected a detection");
        };
        assert_eq!(found.reasoning, None);
    }

    #[test]
    fn test_error_is_terminal() {
        let m = machine(StreamingConfig::default());
        assert!(m.on_error());
        assert_eq!(m.phase(), Phase::Error);
        assert_eq!(m.on_chunk("</think>LOOK\n"), Verdict::Ignored);
        assert_eq!(m.on_complete("LOOK"), None);
    }
}
