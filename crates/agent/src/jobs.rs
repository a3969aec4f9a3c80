//! Session job queue feeding auto-continuation.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// FIFO of pending job prompts attached to a session.
///
/// Producers may push while a turn is running; the conversation loop pops
/// between user turns when auto-continuation is enabled.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: Mutex<VecDeque<String>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, job: impl Into<String>) {
        self.lock().push_back(job.into());
    }

    pub fn pop(&self) -> Option<String> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
