//! The single consumer of a printer's queue.
//!
//! A worker pops entries one at a time and owns the output while it runs: it is the only
//! thing writing to the sinks and the only thing touching the visible width. The printer
//! guarantees that at most one worker is alive by joining the previous one before spawning
//! another.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, trace};
use unicode_width::UnicodeWidthStr;

use crate::error::{Result, TempPrintError};
use crate::queue::{DisplayQueue, EntryKind, QueueEntry};
use crate::sink::Sink;
use crate::wait::{wait, Cadence, CancelToken, Clock};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WorkerState {
    Idle,
    Running,
    /// The worker finishes the entry it is on (with its waits cut short) and exits
    /// without popping another.
    StopRequested,
}

/// The queue together with the state of its consumer. Both live under one lock so that
/// "the queue ran dry, go idle" and "queued an entry, is anyone consuming?" can't interleave.
#[derive(Debug)]
pub(crate) struct Backlog {
    pub(crate) queue: DisplayQueue,
    pub(crate) state: WorkerState,
    /// Set when a worker gave up with entries left over; nothing drains them until the
    /// next worker starts.
    pub(crate) stalled: bool,
}

impl Backlog {
    fn settled(&self) -> bool {
        self.state == WorkerState::Idle && (self.queue.is_empty() || self.stalled)
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Settings {
    pub(crate) default_display_duration: Option<Duration>,
    pub(crate) refresh_cadence: Cadence,
}

/// Everything the printer and its worker share.
pub(crate) struct Shared {
    pub(crate) backlog: Mutex<Backlog>,
    /// Signalled whenever the backlog may have become settled.
    pub(crate) settled: Condvar,
    pub(crate) settings: Mutex<Settings>,
    pub(crate) cancel: CancelToken,
    pub(crate) visible_width: AtomicUsize,
    worker_error: Mutex<Option<TempPrintError>>,
    pub(crate) default_sink: Sink,
    pub(crate) clock: Arc<dyn Clock>,
}

impl Shared {
    pub(crate) fn new(settings: Settings, default_sink: Sink, clock: Arc<dyn Clock>) -> Self {
        Self {
            backlog: Mutex::new(Backlog {
                queue: DisplayQueue::new(),
                state: WorkerState::Idle,
                stalled: false,
            }),
            settled: Condvar::new(),
            settings: Mutex::new(settings),
            cancel: CancelToken::new(),
            visible_width: AtomicUsize::new(0),
            worker_error: Mutex::new(None),
            default_sink,
            clock,
        }
    }

    pub(crate) fn lock_backlog(&self) -> MutexGuard<'_, Backlog> {
        self.backlog.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_settings(&self) -> MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_error(&self) -> MutexGuard<'_, Option<TempPrintError>> {
        self.worker_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The first failure of a worker since the last call.
    pub(crate) fn take_error(&self) -> Option<TempPrintError> {
        self.lock_error().take()
    }

    /// Blocks until no worker is running and nothing is left that one would pick up.
    pub(crate) fn wait_settled(&self) {
        let mut backlog = self.lock_backlog();
        while !backlog.settled() {
            backlog = self
                .settled
                .wait(backlog)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    // The cadence is read per wait, so a change reaches entries that are already queued.
    fn pause(&self, duration: Duration) {
        let cadence = self.lock_settings().refresh_cadence;
        wait(self.clock.as_ref(), duration, &self.cancel, cadence);
    }

    fn next_entry(&self) -> Option<QueueEntry> {
        let mut backlog = self.lock_backlog();
        let entry = match backlog.state {
            WorkerState::StopRequested => None,
            _ => backlog.queue.pop_front(),
        };
        if entry.is_none() {
            self.cancel.reset();
            backlog.state = WorkerState::Idle;
            self.settled.notify_all();
        }
        entry
    }

    fn display(&self, entry: &QueueEntry) -> Result<()> {
        let sink = entry.sink.as_ref().unwrap_or(&self.default_sink);

        self.pause(entry.pre_delay);
        match entry.kind {
            EntryKind::Persistent => {
                trace!("writing persistent entry {:?}", entry.text);
                sink.write_str(&format!("{}\n", entry.text), entry.flush)?;
                self.pause(entry.post_delay);
            }
            EntryKind::Ephemeral => {
                let width = entry.text.width();
                trace!("showing {:?} ({} columns)", entry.text, width);
                sink.write_str(&entry.text, entry.flush)?;
                self.visible_width.store(width, Ordering::SeqCst);

                self.pause(entry.display_duration.unwrap_or_default());
                self.pause(entry.post_delay);

                sink.write_str(&erase_sequence(width), true)?;
                self.visible_width.store(0, Ordering::SeqCst);
                trace!("erased {:?}", entry.text);
            }
        }
        self.cancel.reset();
        Ok(())
    }

    /// Puts the backlog back to idle after the loop stopped early. The error is stored
    /// before the state flips, so whoever sees the worker idle also sees why.
    fn abandon(&self, err: TempPrintError) {
        error!("display worker stopped: {}", err);
        self.visible_width.store(0, Ordering::SeqCst);
        self.lock_error().get_or_insert(err);

        let mut backlog = self.lock_backlog();
        self.cancel.reset();
        backlog.state = WorkerState::Idle;
        backlog.stalled = !backlog.queue.is_empty();
        self.settled.notify_all();
    }
}

/// Returns the cursor to the start of the line, blanks `width` columns and returns again.
pub(crate) fn erase_sequence(width: usize) -> String {
    format!("\r{}\r", " ".repeat(width))
}

fn drain(shared: &Shared) -> Result<()> {
    while let Some(entry) = shared.next_entry() {
        shared.display(&entry)?;
    }
    Ok(())
}

/// Drains the queue until it is empty or a stop is requested. A sink failure or a panic
/// (say, in a caller's writer) stops the loop, leaves the entries still queued where they
/// are and is kept for [Shared::take_error].
pub(crate) fn run(shared: &Shared) {
    debug!("display worker started");
    match panic::catch_unwind(AssertUnwindSafe(|| drain(shared))) {
        Ok(Ok(())) => debug!("display worker idle"),
        Ok(Err(err)) => shared.abandon(err),
        Err(_) => shared.abandon(TempPrintError::WorkerPanicked),
    }
}

/// Handle to a running worker thread.
#[derive(Debug)]
pub(crate) struct DisplayWorker {
    handle: JoinHandle<()>,
}

impl DisplayWorker {
    /// Starts a worker. The caller must already have marked the backlog as running.
    pub(crate) fn spawn(shared: Arc<Shared>) -> Result<Self> {
        let handle = thread::Builder::new()
            .name("temp-print".to_string())
            .spawn(move || run(&shared))
            .map_err(TempPrintError::Spawn)?;
        Ok(Self { handle })
    }

    /// Blocks until the worker thread has exited.
    pub(crate) fn join(self) {
        if self.handle.join().is_err() {
            error!("display worker thread panicked while shutting down");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::line_replay::LineReplay;
    use crate::sink::MemorySink;
    use crate::wait::SystemClock;
    use std::io::{self, Write};
    use std::time::Instant;

    fn shared_with(memory: &MemorySink) -> Shared {
        Shared::new(
            Settings {
                default_display_duration: None,
                refresh_cadence: Cadence::Every(Duration::from_millis(5)),
            },
            Sink::Memory(memory.clone()),
            Arc::new(SystemClock::new()),
        )
    }

    fn entry(text: &str, kind: EntryKind, display_duration: Duration) -> QueueEntry {
        QueueEntry {
            text: text.to_string(),
            display_duration: Some(display_duration),
            flush: false,
            sink: None,
            kind,
            pre_delay: Duration::ZERO,
            post_delay: Duration::ZERO,
        }
    }

    fn enqueue(shared: &Shared, entries: Vec<QueueEntry>) {
        let mut backlog = shared.lock_backlog();
        for entry in entries {
            backlog.queue.append(entry);
        }
        backlog.state = WorkerState::Running;
    }

    #[test]
    fn writes_then_erases_ephemeral_entries() {
        let memory = MemorySink::new();
        let shared = shared_with(&memory);
        enqueue(
            &shared,
            vec![
                entry("hi", EntryKind::Ephemeral, Duration::ZERO),
                entry("there", EntryKind::Ephemeral, Duration::ZERO),
            ],
        );

        run(&shared);

        assert_eq!(memory.contents(), "hi\r  \rthere\r     \r");
        assert_eq!(shared.lock_backlog().state, WorkerState::Idle);
        assert_eq!(shared.visible_width.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn persistent_entries_get_a_terminator_and_stay() {
        let memory = MemorySink::new();
        let shared = shared_with(&memory);
        enqueue(
            &shared,
            vec![
                entry("kept", EntryKind::Persistent, Duration::ZERO),
                entry("gone", EntryKind::Ephemeral, Duration::ZERO),
            ],
        );

        run(&shared);

        let mut replay = LineReplay::new();
        replay.feed(&memory.bytes());
        assert_eq!(replay.committed(), ["kept"]);
        assert_eq!(replay.visible(), "");
    }

    #[test]
    fn erase_covers_wide_characters() {
        let memory = MemorySink::new();
        let shared = shared_with(&memory);
        enqueue(
            &shared,
            vec![entry("日本", EntryKind::Ephemeral, Duration::ZERO)],
        );

        run(&shared);

        assert_eq!(memory.contents(), "日本\r    \r");
    }

    #[test]
    fn cancellation_shortens_waits_but_still_writes() {
        let memory = MemorySink::new();
        let shared = shared_with(&memory);
        enqueue(
            &shared,
            vec![QueueEntry {
                pre_delay: Duration::from_secs(10),
                ..entry("late", EntryKind::Ephemeral, Duration::from_secs(10))
            }],
        );
        shared.cancel.cancel();

        let started = Instant::now();
        run(&shared);

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(memory.contents(), "late\r    \r");
        assert!(!shared.cancel.is_cancelled());
    }

    #[test]
    fn stop_request_leaves_the_queue_alone() {
        let memory = MemorySink::new();
        let shared = shared_with(&memory);
        enqueue(
            &shared,
            vec![entry("waiting", EntryKind::Ephemeral, Duration::ZERO)],
        );
        shared.lock_backlog().state = WorkerState::StopRequested;

        run(&shared);

        assert_eq!(memory.contents(), "");
        let backlog = shared.lock_backlog();
        assert_eq!(backlog.state, WorkerState::Idle);
        assert_eq!(backlog.queue.len(), 1);
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn sink_failure_stops_the_loop_and_keeps_the_rest() {
        let memory = MemorySink::new();
        let shared = shared_with(&memory);
        enqueue(
            &shared,
            vec![
                QueueEntry {
                    sink: Some(Sink::writer(BrokenPipe)),
                    ..entry("lost", EntryKind::Ephemeral, Duration::ZERO)
                },
                entry("next", EntryKind::Ephemeral, Duration::ZERO),
            ],
        );

        run(&shared);

        assert!(matches!(shared.take_error(), Some(TempPrintError::Sink(_))));
        let backlog = shared.lock_backlog();
        assert_eq!(backlog.state, WorkerState::Idle);
        assert!(backlog.stalled);
        assert_eq!(backlog.queue.len(), 1);
        assert_eq!(memory.contents(), "");
    }

    struct Exploding;

    impl Write for Exploding {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            panic!("writer exploded");
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn panicking_writer_leaves_the_worker_idle() {
        let memory = MemorySink::new();
        let shared = shared_with(&memory);
        enqueue(
            &shared,
            vec![QueueEntry {
                sink: Some(Sink::writer(Exploding)),
                ..entry("boom", EntryKind::Ephemeral, Duration::ZERO)
            }],
        );
        shared.cancel.cancel();

        run(&shared);

        assert!(matches!(
            shared.take_error(),
            Some(TempPrintError::WorkerPanicked)
        ));
        assert!(shared.take_error().is_none());
        assert!(!shared.cancel.is_cancelled());
        assert_eq!(shared.visible_width.load(Ordering::SeqCst), 0);
        let backlog = shared.lock_backlog();
        assert_eq!(backlog.state, WorkerState::Idle);
        assert!(!backlog.stalled);
        assert!(backlog.settled());
    }
}
