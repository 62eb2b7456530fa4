use std::fmt::Display;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::debug;

use crate::error::{Result, TempPrintError};
use crate::queue::{DisplayQueue, EntryKind, QueueEntry};
use crate::sink::Sink;
use crate::wait::{duration_from_secs, Cadence, Clock, SystemClock};
use crate::worker::{DisplayWorker, Settings, Shared, WorkerState};

/// How a single [EphemeralPrinter::print] call is laid out and scheduled.
///
/// The defaults print a persistent line: parts separated by a space, nothing appended,
/// no flush, no delays.
///
/// Standard output is line buffered, so ephemeral text sent there only shows up right
/// away with [PrintOptions::flush].
#[derive(Clone, Debug)]
pub struct PrintOptions {
    /// Seconds an ephemeral entry stays visible. Falls back to the printer's default.
    pub display_duration: Option<f64>,
    pub sep: String,
    pub end: String,
    pub flush: bool,
    /// `None` uses the printer's sink.
    pub sink: Option<Sink>,
    /// Process this entry next, without interrupting what is on screen.
    pub priority: bool,
    /// Process this entry next and cut the current display short.
    pub overwrite: bool,
    pub kind: EntryKind,
    /// Seconds to wait before writing.
    pub pre_delay: f64,
    /// Seconds to wait after the display duration, before erasing.
    pub post_delay: f64,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            display_duration: None,
            sep: " ".to_string(),
            end: String::new(),
            flush: false,
            sink: None,
            priority: false,
            overwrite: false,
            kind: EntryKind::Persistent,
            pre_delay: 0.0,
            post_delay: 0.0,
        }
    }
}

impl PrintOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ephemeral(mut self) -> Self {
        self.kind = EntryKind::Ephemeral;
        self
    }

    pub fn persistent(mut self) -> Self {
        self.kind = EntryKind::Persistent;
        self
    }

    pub fn duration(mut self, secs: f64) -> Self {
        self.display_duration = Some(secs);
        self
    }

    pub fn sep(mut self, sep: impl Into<String>) -> Self {
        self.sep = sep.into();
        self
    }

    pub fn end(mut self, end: impl Into<String>) -> Self {
        self.end = end.into();
        self
    }

    pub fn flush(mut self) -> Self {
        self.flush = true;
        self
    }

    pub fn sink(mut self, sink: Sink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn priority(mut self) -> Self {
        self.priority = true;
        self
    }

    pub fn overwrite(mut self) -> Self {
        self.overwrite = true;
        self
    }

    pub fn pre_delay(mut self, secs: f64) -> Self {
        self.pre_delay = secs;
        self
    }

    pub fn post_delay(mut self, secs: f64) -> Self {
        self.post_delay = secs;
        self
    }
}

/// Shows text on the current terminal line for a while and then erases it.
///
/// Prints are queued and displayed one after the other by a background worker. Only
/// that worker writes, so the printer can be shared between threads; ordinary writes to
/// the same stream while something is displayed will garble the line.
///
/// Dropping the printer discards whatever is still queued, cuts the current display
/// short and waits for it to be erased. Call [EphemeralPrinter::wait] first to let the
/// queue play out.
pub struct EphemeralPrinter {
    shared: Arc<Shared>,
    worker: Mutex<Option<DisplayWorker>>,
}

impl EphemeralPrinter {
    /// A printer on standard output with no default duration and uninterruptible waits.
    pub fn new() -> Self {
        Self::from_parts(
            Settings {
                default_display_duration: None,
                refresh_cadence: Cadence::Uninterruptible,
            },
            Sink::Stdout,
            Arc::new(SystemClock::new()),
        )
    }

    pub fn builder() -> EphemeralPrinterBuilder {
        EphemeralPrinterBuilder::default()
    }

    fn from_parts(settings: Settings, sink: Sink, clock: Arc<dyn Clock>) -> Self {
        Self {
            shared: Arc::new(Shared::new(settings, sink, clock)),
            worker: Mutex::new(None),
        }
    }

    /// Joins `parts` with `options.sep`, appends `options.end` and queues the result.
    ///
    /// Nothing is queued when the request is invalid, or when the worker thread can't be
    /// started for it. With `overwrite` the call blocks
    /// until the entry currently on screen has been cut short and erased, which takes up
    /// to one cadence step (or the rest of its duration with
    /// [Cadence::Uninterruptible]).
    pub fn print<I>(&self, parts: I, options: &PrintOptions) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Display,
    {
        let entry = self.entry_for(parts, options)?;
        let at_front = options.overwrite || options.priority;

        let mut worker = self.lock_worker();
        {
            let mut backlog = self.shared.lock_backlog();
            if at_front {
                backlog.queue.prepend(entry);
            } else {
                backlog.queue.append(entry);
            }
            match backlog.state {
                WorkerState::Idle => {}
                WorkerState::Running if options.overwrite => {
                    debug!("preempting the current display");
                    backlog.state = WorkerState::StopRequested;
                    self.shared.cancel.cancel();
                }
                WorkerState::Running | WorkerState::StopRequested => return Ok(()),
            }
        }

        if let Some(previous) = worker.take() {
            previous.join();
        }

        let mut backlog = self.shared.lock_backlog();
        if backlog.state == WorkerState::Idle && !backlog.queue.is_empty() {
            self.shared.cancel.reset();
            backlog.state = WorkerState::Running;
            backlog.stalled = false;
            match DisplayWorker::spawn(Arc::clone(&self.shared)) {
                Ok(started) => *worker = Some(started),
                Err(err) => {
                    // Other prints wait on the worker lock and no worker pops, so only
                    // clear() can have touched the queue: the entry is at its end or gone.
                    withdraw(&mut backlog.queue, at_front);
                    backlog.state = WorkerState::Idle;
                    backlog.stalled = !backlog.queue.is_empty();
                    self.shared.settled.notify_all();
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn entry_for<I>(&self, parts: I, options: &PrintOptions) -> Result<QueueEntry>
    where
        I: IntoIterator,
        I::Item: Display,
    {
        let mut text = parts
            .into_iter()
            .map(|part| part.to_string())
            .collect::<Vec<_>>()
            .join(&options.sep);
        text.push_str(&options.end);

        if options.kind == EntryKind::Ephemeral && text.contains(['\n', '\r']) {
            return Err(TempPrintError::Validation(
                "ephemeral text can't contain a line feed or carriage return".to_string(),
            ));
        }

        let display_duration = match options.display_duration {
            Some(secs) => Some(seconds("display duration", secs)?),
            None => self.shared.lock_settings().default_display_duration,
        };
        if options.kind == EntryKind::Ephemeral && display_duration.is_none() {
            return Err(TempPrintError::ConfigurationMissing);
        }

        Ok(QueueEntry {
            text,
            display_duration,
            flush: options.flush,
            sink: options.sink.clone(),
            kind: options.kind,
            pre_delay: seconds("pre-delay", options.pre_delay)?,
            post_delay: seconds("post-delay", options.post_delay)?,
        })
    }

    /// Cuts short the wait of whatever is currently displayed. Has no effect when
    /// nothing is running, and never interrupts a write that is already happening.
    pub fn skip(&self) {
        let backlog = self.shared.lock_backlog();
        if backlog.state != WorkerState::Idle {
            self.shared.cancel.cancel();
        }
    }

    /// Drops every entry that hasn't started yet. With `undisplay` the entry on screen
    /// is skipped as well.
    pub fn clear(&self, undisplay: bool) {
        let mut backlog = self.shared.lock_backlog();
        backlog.queue.clear();
        if undisplay && backlog.state != WorkerState::Idle {
            self.shared.cancel.cancel();
        }
        self.shared.settled.notify_all();
    }

    /// True while something is displayed or waiting to be.
    pub fn is_running(&self) -> bool {
        let backlog = self.shared.lock_backlog();
        backlog.state != WorkerState::Idle || !backlog.queue.is_empty()
    }

    /// Blocks until the queue has been worked through, or until a worker failure left
    /// entries behind, then reports the first failure since the last call, if any.
    ///
    /// Other threads can keep printing, skipping and overwriting while one waits here.
    pub fn wait(&self) -> Result<()> {
        self.shared.wait_settled();
        match self.shared.take_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Takes the failure of a finished worker without waiting for the current one.
    pub fn take_worker_error(&self) -> Option<TempPrintError> {
        self.shared.take_error()
    }

    pub fn set_default_display_duration(&self, secs: f64) -> Result<()> {
        let duration = default_duration(secs)?;
        self.shared.lock_settings().default_display_duration = Some(duration);
        Ok(())
    }

    pub fn default_display_duration(&self) -> Option<Duration> {
        self.shared.lock_settings().default_display_duration
    }

    /// Applies to every wait that starts from now on, including those of entries that
    /// are already queued.
    pub fn set_refresh_cadence(&self, cadence: impl Into<Cadence>) {
        self.shared.lock_settings().refresh_cadence = cadence.into();
    }

    pub fn refresh_cadence(&self) -> Cadence {
        self.shared.lock_settings().refresh_cadence
    }

    /// Width in columns of the text currently on screen, 0 when nothing is.
    pub fn visible_width(&self) -> usize {
        self.shared.visible_width.load(Ordering::SeqCst)
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<DisplayWorker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EphemeralPrinter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EphemeralPrinter {
    fn drop(&mut self) {
        self.clear(true);
        if let Some(running) = self.lock_worker().take() {
            running.join();
        }
    }
}

fn withdraw(queue: &mut DisplayQueue, at_front: bool) -> Option<QueueEntry> {
    if at_front {
        queue.pop_front()
    } else {
        queue.pop_back()
    }
}

fn seconds(what: &str, secs: f64) -> Result<Duration> {
    duration_from_secs(secs).ok_or_else(|| {
        TempPrintError::Validation(format!("{} must be finite, got {}", what, secs))
    })
}

fn default_duration(secs: f64) -> Result<Duration> {
    if secs < 0.0 {
        return Err(TempPrintError::Validation(format!(
            "display duration can't be negative, got {}",
            secs
        )));
    }
    seconds("display duration", secs)
}

/// Configures an [EphemeralPrinter] before it starts.
pub struct EphemeralPrinterBuilder {
    default_display_duration: Option<f64>,
    refresh_cadence: Cadence,
    sink: Sink,
    clock: Arc<dyn Clock>,
}

impl Default for EphemeralPrinterBuilder {
    fn default() -> Self {
        Self {
            default_display_duration: None,
            refresh_cadence: Cadence::Uninterruptible,
            sink: Sink::Stdout,
            clock: Arc::new(SystemClock::new()),
        }
    }
}

impl EphemeralPrinterBuilder {
    pub fn default_display_duration(mut self, secs: f64) -> Self {
        self.default_display_duration = Some(secs);
        self
    }

    pub fn refresh_cadence(mut self, cadence: impl Into<Cadence>) -> Self {
        self.refresh_cadence = cadence.into();
        self
    }

    pub fn sink(mut self, sink: Sink) -> Self {
        self.sink = sink;
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn build(self) -> Result<EphemeralPrinter> {
        let default_display_duration = self
            .default_display_duration
            .map(default_duration)
            .transpose()?;
        Ok(EphemeralPrinter::from_parts(
            Settings {
                default_display_duration,
                refresh_cadence: self.refresh_cadence,
            },
            self.sink,
            self.clock,
        ))
    }
}
