//! Assembles barcode-scanner ("keyboard wedge") input into tracking numbers.
//!
//! A scanner types a whole code within a few milliseconds and usually ends
//! it with Enter. Keystrokes further apart than [`NEW_CODE_GAP`] start a new
//! code, and a code is complete on Enter or after [`FINISH_AFTER`] without
//! input.

use std::time::{Duration, Instant};

use crate::validation::sanitize_tracking_number;

pub const NEW_CODE_GAP: Duration = Duration::from_millis(120);
pub const FINISH_AFTER: Duration = Duration::from_millis(90);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub key: Key,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl KeyPress {
    pub fn char(c: char) -> Self {
        Self::plain(Key::Char(c))
    }

    pub fn enter() -> Self {
        Self::plain(Key::Enter)
    }

    pub fn plain(key: Key) -> Self {
        Self {
            key,
            ctrl: false,
            alt: false,
            meta: false,
        }
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    fn is_modified(&self) -> bool {
        self.ctrl || self.alt || self.meta
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Ignored,
    /// Code typed so far, whitespace removed.
    Partial(String),
    Complete(String),
}

#[derive(Debug, Clone)]
pub struct ScanBuffer {
    buffer: String,
    last_key_at: Option<Instant>,
    new_code_gap: Duration,
    finish_after: Duration,
}

impl Default for ScanBuffer {
    fn default() -> Self {
        Self::with_timing(NEW_CODE_GAP, FINISH_AFTER)
    }
}

impl ScanBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timing(new_code_gap: Duration, finish_after: Duration) -> Self {
        Self {
            buffer: String::new(),
            last_key_at: None,
            new_code_gap,
            finish_after,
        }
    }

    pub fn press(&mut self, press: KeyPress, at: Instant) -> ScanEvent {
        if press.is_modified() {
            return ScanEvent::Ignored;
        }

        match press.key {
            Key::Enter => self.finish().map_or(ScanEvent::Ignored, ScanEvent::Complete),
            Key::Char(c) if !c.is_whitespace() => {
                let stale = self
                    .last_key_at
                    .map_or(true, |last| at.saturating_duration_since(last) > self.new_code_gap);
                if stale {
                    self.buffer.clear();
                }
                self.buffer.push(c);
                self.last_key_at = Some(at);
                ScanEvent::Partial(sanitize_tracking_number(&self.buffer))
            }
            _ => ScanEvent::Ignored,
        }
    }

    /// Feeds raw terminal or pipe input that arrived at `at`. Line breaks
    /// act as Enter; returns the codes completed by this chunk.
    pub fn feed(&mut self, text: &str, at: Instant) -> Vec<String> {
        let mut completed = Vec::new();
        for c in text.chars() {
            let press = match c {
                '\n' | '\r' => KeyPress::enter(),
                other => KeyPress::char(other),
            };
            if let ScanEvent::Complete(code) = self.press(press, at) {
                completed.push(code);
            }
        }
        completed
    }

    /// Instant after which [`ScanBuffer::poll`] completes the pending code.
    pub fn deadline(&self) -> Option<Instant> {
        if self.buffer.is_empty() {
            return None;
        }
        self.last_key_at.map(|last| last + self.finish_after)
    }

    /// Completes the pending code once the scanner has gone quiet.
    pub fn poll(&mut self, now: Instant) -> Option<String> {
        match self.deadline() {
            Some(deadline) if now >= deadline => self.finish(),
            _ => None,
        }
    }

    /// Takes the pending code regardless of timing.
    pub fn finish(&mut self) -> Option<String> {
        let code = sanitize_tracking_number(&std::mem::take(&mut self.buffer));
        (!code.is_empty()).then_some(code)
    }

    pub fn pending(&self) -> &str {
        &self.buffer
    }
}
