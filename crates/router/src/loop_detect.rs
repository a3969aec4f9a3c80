//! Repeated-call detection.
//!
//! Keeps a rolling window of `(name, argument hash)` fingerprints for one
//! session. A call whose fingerprint already appears `threshold` times in
//! the window is refused.

use cairn_core::error::RouterError;
use cairn_core::tool::ToolCall;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;

type Fingerprint = [u8; 32];

#[derive(Debug, Clone)]
pub struct LoopDetector {
    threshold: usize,
    window: usize,
    recent: VecDeque<Fingerprint>,
}

impl LoopDetector {
    pub fn new(threshold: usize, window: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            window: window.max(1),
            recent: VecDeque::with_capacity(window),
        }
    }

    /// Record `call`, or refuse it if it has already repeated `threshold`
    /// times within the window. Refused calls are not recorded.
    pub fn check(&mut self, call: &ToolCall) -> Result<(), RouterError> {
        let fingerprint = fingerprint(call);
        let seen = self.recent.iter().filter(|f| **f == fingerprint).count();
        if seen >= self.threshold {
            return Err(RouterError::LoopDetected {
                tool_name: call.name.clone(),
                repeats: seen + 1,
            });
        }

        self.recent.push_back(fingerprint);
        while self.recent.len() > self.window {
            self.recent.pop_front();
        }
        Ok(())
    }

    /// Forget the window, e.g. when a new user message starts a turn.
    pub fn reset(&mut self) {
        self.recent.clear();
    }
}

fn fingerprint(call: &ToolCall) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(call.name.as_bytes());
    hasher.update([0u8]);
    hasher.update(call.arguments.canonical_string().as_bytes());
    hasher.finalize().into()
}
