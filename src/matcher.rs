//! Ordered-pattern matching over an interactive session stream.
//!
//! Access point shells signal their state with short literal markers (login
//! prompts, the `rkscli:` shell prompt, the `OK` acknowledgement). This
//! module waits on a stream of output chunks until one of a caller-supplied
//! pattern list appears, the stream ends, or a time budget elapses, and
//! reports which, together with the text that preceded the match.
//!
//! # Main Components
//!
//! - [`PromptMatcher`]: accumulates stream chunks and runs the match loop
//! - [`MatchEvent`]: the tagged outcome of one expect call
//! - [`scrub_output`]: strips terminal control noise from captured text

use std::mem;
use std::time::Duration;

use log::trace;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::mpsc::Receiver;
use tokio::time::{Instant, timeout_at};

/// Outcome of one expect call.
///
/// `before` always carries the text consumed ahead of the match point. On
/// end-of-stream and timeout the whole accumulated buffer is surrendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchEvent {
    /// A pattern matched. `index` is its position in the caller's list.
    Pattern { index: usize, before: String },
    /// The stream ended before any pattern matched.
    Eof { before: String },
    /// The time budget elapsed before any pattern matched.
    TimedOut { before: String },
}

impl MatchEvent {
    /// The captured text regardless of variant.
    pub fn before(&self) -> &str {
        match self {
            MatchEvent::Pattern { before, .. }
            | MatchEvent::Eof { before }
            | MatchEvent::TimedOut { before } => before,
        }
    }
}

/// Accumulates session output and matches prompt patterns against it.
///
/// Text that arrives after a matched pattern stays buffered, so a prompt
/// already on the wire is seen by the next [`PromptMatcher::expect`] call
/// before any further read. Patterns are plain substrings checked in list
/// order against the whole buffer; when several are present at once the
/// earliest-indexed one wins, independent of arrival order.
#[derive(Debug, Default)]
pub struct PromptMatcher {
    buffer: String,
}

impl PromptMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text retained from previous reads that no pattern has yet consumed.
    pub fn residual(&self) -> &str {
        &self.buffer
    }

    /// Waits until one of `patterns` appears, `chunks` ends, or `budget`
    /// elapses.
    ///
    /// The buffered residue from earlier calls is checked before any read,
    /// so the budget only bounds time spent waiting for new data.
    pub async fn expect(
        &mut self,
        chunks: &mut Receiver<String>,
        patterns: &[&str],
        budget: Duration,
    ) -> MatchEvent {
        let deadline = Instant::now() + budget;
        loop {
            if let Some(event) = self.scan(patterns) {
                return event;
            }
            match timeout_at(deadline, chunks.recv()).await {
                Ok(Some(chunk)) => {
                    trace!("recv {} bytes", chunk.len());
                    self.buffer.push_str(&chunk);
                }
                Ok(None) => {
                    trace!("stream ended without match");
                    return MatchEvent::Eof {
                        before: mem::take(&mut self.buffer),
                    };
                }
                Err(_) => {
                    trace!("match budget of {budget:?} elapsed");
                    return MatchEvent::TimedOut {
                        before: mem::take(&mut self.buffer),
                    };
                }
            }
        }
    }

    /// Checks the buffer against `patterns` in list order.
    ///
    /// On a hit, splits the buffer at the match: the prefix becomes the
    /// event's `before`, the suffix stays buffered for the next call.
    fn scan(&mut self, patterns: &[&str]) -> Option<MatchEvent> {
        let (index, pos, len) = patterns
            .iter()
            .enumerate()
            .find_map(|(index, pattern)| {
                self.buffer
                    .find(pattern)
                    .map(|pos| (index, pos, pattern.len()))
            })?;
        trace!("matched pattern {index} at byte {pos}");
        let before = self.buffer[..pos].to_string();
        self.buffer = self.buffer[pos + len..].to_string();
        Some(MatchEvent::Pattern { index, before })
    }
}

/// Carriage returns and backspace runs at the start of a line.
///
/// Device shells redraw their prompt with CR and backspace sequences that
/// would otherwise end up inside captured command output.
static LINE_CONTROL_PREFIX: Lazy<Regex> =
    Lazy::new(
        || match Regex::new(r"^(\r+(\s+\r+)*)|(\u{8}+(\s+\u{8}+)*)") {
            Ok(re) => re,
            Err(err) => panic!("invalid LINE_CONTROL_PREFIX regex: {err}"),
        },
    );

/// Removes terminal control noise from captured output, line by line.
pub fn scrub_output(text: &str) -> String {
    text.lines()
        .map(|line| LINE_CONTROL_PREFIX.replace(line, "").into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    async fn feed(chunks: &[&str]) -> (mpsc::Receiver<String>, mpsc::Sender<String>) {
        let (tx, rx) = mpsc::channel(16);
        for chunk in chunks {
            tx.send(chunk.to_string()).await.expect("feed chunk");
        }
        (rx, tx)
    }

    #[tokio::test]
    async fn matches_single_pattern_and_captures_before_text() {
        let (mut rx, _tx) = feed(&["Welcome to the AP\r\nPlease login: "]).await;
        let mut matcher = PromptMatcher::new();
        let event = matcher
            .expect(&mut rx, &["Please login:"], Duration::from_secs(1))
            .await;
        assert_eq!(
            event,
            MatchEvent::Pattern {
                index: 0,
                before: "Welcome to the AP\r\n".to_string()
            }
        );
    }

    #[tokio::test]
    async fn earlier_listed_pattern_wins_when_both_are_buffered() {
        // Both markers arrive in one chunk with the later-listed one first
        // in the byte stream. List order must decide, not position.
        let (mut rx, _tx) = feed(&["password: stuff Please login: "]).await;
        let mut matcher = PromptMatcher::new();
        let event = matcher
            .expect(
                &mut rx,
                &["Please login:", "password:"],
                Duration::from_secs(1),
            )
            .await;
        match event {
            MatchEvent::Pattern { index, .. } => assert_eq!(index, 0),
            other => panic!("expected pattern match, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pattern_split_across_chunks_is_found() {
        let (mut rx, _tx) = feed(&["rks", "cli", ": "]).await;
        let mut matcher = PromptMatcher::new();
        let event = matcher
            .expect(&mut rx, &["rkscli:"], Duration::from_secs(1))
            .await;
        match event {
            MatchEvent::Pattern { index, before } => {
                assert_eq!(index, 0);
                assert!(before.is_empty());
            }
            other => panic!("expected pattern match, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn text_after_match_is_retained_for_next_expect() {
        let (mut rx, _tx) = feed(&["OK\r\nrkscli: "]).await;
        let mut matcher = PromptMatcher::new();
        let first = matcher.expect(&mut rx, &["OK"], Duration::from_secs(1)).await;
        assert_eq!(
            first,
            MatchEvent::Pattern {
                index: 0,
                before: String::new()
            }
        );
        assert_eq!(matcher.residual(), "\r\nrkscli: ");

        // The retained prompt satisfies the next call without a new read.
        let second = matcher
            .expect(&mut rx, &["rkscli:"], Duration::from_millis(50))
            .await;
        assert_eq!(
            second,
            MatchEvent::Pattern {
                index: 0,
                before: "\r\n".to_string()
            }
        );
    }

    #[tokio::test]
    async fn closed_stream_yields_eof_with_buffered_text() {
        let (tx, mut rx) = mpsc::channel(4);
        tx.send("partial banner".to_string()).await.expect("send");
        drop(tx);
        let mut matcher = PromptMatcher::new();
        let event = matcher
            .expect(&mut rx, &["rkscli:"], Duration::from_secs(1))
            .await;
        assert_eq!(
            event,
            MatchEvent::Eof {
                before: "partial banner".to_string()
            }
        );
        assert!(matcher.residual().is_empty());
    }

    #[tokio::test]
    async fn silent_stream_yields_timeout() {
        let (mut rx, _tx) = feed(&[]).await;
        let mut matcher = PromptMatcher::new();
        let event = matcher
            .expect(&mut rx, &["rkscli:"], Duration::from_millis(25))
            .await;
        assert_eq!(
            event,
            MatchEvent::TimedOut {
                before: String::new()
            }
        );
    }

    #[tokio::test]
    async fn timeout_surrenders_partial_output() {
        let (mut rx, _tx) = feed(&["half a line"]).await;
        let mut matcher = PromptMatcher::new();
        let event = matcher
            .expect(&mut rx, &["rkscli:"], Duration::from_millis(25))
            .await;
        assert_eq!(
            event,
            MatchEvent::TimedOut {
                before: "half a line".to_string()
            }
        );
    }

    #[test]
    fn scrub_removes_leading_carriage_returns_and_backspaces() {
        let raw = "\rDevice Name: lobby-ap\n\u{8}\u{8}Uptime: 3 days";
        let clean = scrub_output(raw);
        assert_eq!(clean, "Device Name: lobby-ap\nUptime: 3 days");
    }

    #[test]
    fn scrub_keeps_interior_text_untouched() {
        let raw = "line one\nline two";
        assert_eq!(scrub_output(raw), raw);
    }
}
