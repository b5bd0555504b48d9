//! User-facing debug output
//!
//! When debug mode is on the widget shows one line of text next to the
//! camera view, starting with `debug on` and replaced by later notes and
//! shutdown reasons. Transitions and guard messages only go to the history.
//! A disabled channel drops everything it is given.

use barscan_core::CaptureState;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::debug;

/// Text shown as soon as debug mode is enabled
pub const DEBUG_ON: &str = "debug on";

/// Messages kept in the history before the oldest are discarded
pub const HISTORY_LIMIT: usize = 256;

/// What a debug message is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugKind {
    /// The channel was switched on
    Enabled,
    /// Capture shut down with a device error
    Shutdown,
    /// The capture state changed
    Transition,
    /// A start or stop call was ignored
    Guard,
    /// Anything else
    Note,
}

impl DebugKind {
    /// Whether messages of this kind replace the displayed text
    pub fn is_displayed(&self) -> bool {
        matches!(self, DebugKind::Enabled | DebugKind::Shutdown | DebugKind::Note)
    }
}

/// One line written to the debug channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugMessage {
    /// Message category
    pub kind: DebugKind,
    /// Displayed text
    pub text: String,
    /// When the message was written
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ChannelState {
    current: Option<String>,
    history: VecDeque<DebugMessage>,
}

/// Debug text surface of one scanner
#[derive(Debug)]
pub struct DebugChannel {
    enabled: bool,
    state: Mutex<ChannelState>,
}

impl DebugChannel {
    /// Create a channel; an enabled channel starts out showing [`DEBUG_ON`]
    pub fn new(enabled: bool) -> Self {
        let channel = Self {
            enabled,
            state: Mutex::new(ChannelState::default()),
        };
        channel.emit(DebugKind::Enabled, DEBUG_ON);
        channel
    }

    /// A channel that drops every message
    pub fn disabled() -> Self {
        Self::new(false)
    }

    /// Whether messages are kept
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record `text`. Returns `false` if the channel is disabled.
    pub fn emit(&self, kind: DebugKind, text: impl Into<String>) -> bool {
        if !self.enabled {
            return false;
        }

        let text = text.into();
        debug!(kind = ?kind, "{}", text);

        let mut state = self.state.lock();
        if kind.is_displayed() {
            state.current = Some(text.clone());
        }
        if state.history.len() == HISTORY_LIMIT {
            state.history.pop_front();
        }
        state.history.push_back(DebugMessage {
            kind,
            text,
            at: Utc::now(),
        });
        true
    }

    /// Report a capture shutdown as `Video capture error: <reason>`
    pub fn shutdown(&self, reason: &str) -> bool {
        self.emit(DebugKind::Shutdown, format!("Video capture error: {}", reason))
    }

    /// Report a state change
    pub fn transition(&self, from: CaptureState, to: CaptureState) -> bool {
        self.emit(DebugKind::Transition, format!("{} -> {}", from, to))
    }

    /// Text currently shown, `None` when disabled
    pub fn current(&self) -> Option<String> {
        self.state.lock().current.clone()
    }

    /// Every kept message, oldest first
    pub fn history(&self) -> Vec<DebugMessage> {
        self.state.lock().history.iter().cloned().collect()
    }

    /// Kept messages of one kind, oldest first
    pub fn messages_of(&self, kind: DebugKind) -> Vec<String> {
        self.state
            .lock()
            .history
            .iter()
            .filter(|message| message.kind == kind)
            .map(|message| message.text.clone())
            .collect()
    }
}

impl Default for DebugChannel {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_channel_starts_with_debug_on() {
        let channel = DebugChannel::new(true);
        assert!(channel.is_enabled());
        assert_eq!(channel.current().as_deref(), Some(DEBUG_ON));
        assert_eq!(channel.history().len(), 1);
        assert_eq!(channel.history()[0].kind, DebugKind::Enabled);
    }

    #[test]
    fn test_shutdown_message_replaces_current_text() {
        let channel = DebugChannel::new(true);
        assert!(channel.shutdown("NotAllowedError"));
        assert_eq!(
            channel.current().as_deref(),
            Some("Video capture error: NotAllowedError")
        );
        assert_eq!(
            channel.messages_of(DebugKind::Shutdown),
            vec!["Video capture error: NotAllowedError".to_string()]
        );
    }

    #[test]
    fn test_disabled_channel_drops_everything() {
        let channel = DebugChannel::disabled();
        assert!(!channel.shutdown("NotFoundError"));
        assert!(!channel.transition(CaptureState::Idle, CaptureState::Acquiring));
        assert!(channel.current().is_none());
        assert!(channel.history().is_empty());
    }

    #[test]
    fn test_transition_text() {
        let channel = DebugChannel::new(true);
        channel.transition(CaptureState::Acquiring, CaptureState::Capturing);
        let transitions = channel.messages_of(DebugKind::Transition);
        assert_eq!(transitions, vec!["Acquiring -> Capturing".to_string()]);
        assert_eq!(channel.current().as_deref(), Some(DEBUG_ON));
    }

    #[test]
    fn test_history_is_bounded() {
        let channel = DebugChannel::new(true);
        for i in 0..HISTORY_LIMIT + 10 {
            channel.emit(DebugKind::Note, format!("note {}", i));
        }
        let history = channel.history();
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(
            history.last().map(|m| m.text.as_str()),
            Some(format!("note {}", HISTORY_LIMIT + 9).as_str())
        );
    }
}
