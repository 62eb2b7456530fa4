use std::collections::VecDeque;
use std::time::Duration;

use crate::sink::Sink;

/// Whether an entry stays on screen or is erased after its display duration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EntryKind {
    /// Written with a line terminator and never erased.
    #[default]
    Persistent,
    /// Written without a terminator and erased once its duration is over.
    Ephemeral,
}

/// A fully resolved print request, ready for the worker.
#[derive(Clone, Debug)]
pub struct QueueEntry {
    pub text: String,
    /// Always set for ephemeral entries; ignored for persistent ones.
    pub display_duration: Option<Duration>,
    pub flush: bool,
    /// `None` writes to the printer's default sink.
    pub sink: Option<Sink>,
    pub kind: EntryKind,
    pub pre_delay: Duration,
    pub post_delay: Duration,
}

/// The backlog of entries waiting for the worker, in processing order.
#[derive(Debug, Default)]
pub struct DisplayQueue {
    entries: VecDeque<QueueEntry>,
}

impl DisplayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: QueueEntry) {
        self.entries.push_back(entry);
    }

    /// Puts `entry` ahead of everything already queued.
    pub fn prepend(&mut self, entry: QueueEntry) {
        self.entries.push_front(entry);
    }

    pub fn pop_front(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    pub fn pop_back(&mut self) -> Option<QueueEntry> {
        self.entries.pop_back()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
