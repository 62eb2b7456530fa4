//! Interruptible waiting.
//!
//! Every suspension point of the display worker goes through [wait]: the pre-delay, the
//! visible duration and the post-delay. A wait ends when its duration has elapsed or when
//! the [CancelToken] is set, whichever comes first, but only as often as the [Cadence]
//! lets it look at the token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How often a wait checks for cancellation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Cadence {
    /// Sleep the full duration in one go. The wait can't be cut short.
    #[default]
    Uninterruptible,
    /// Spin on the token until the deadline. Reacts immediately but keeps a core busy
    /// for the whole wait, so only use it when even a short cadence is too slow.
    BusyPoll,
    /// Sleep in steps of this length, checking the token between steps. A cancelled
    /// wait may overshoot by up to one step.
    Every(Duration),
}

impl Cadence {
    /// Maps the seconds-based setting onto a cadence: `None` never checks, `<= 0` polls
    /// continuously and anything positive is the step length.
    pub fn from_secs(secs: Option<f64>) -> Self {
        match secs {
            None => Cadence::Uninterruptible,
            Some(secs) if secs.is_nan() || secs <= 0.0 => Cadence::BusyPoll,
            Some(secs) => match Duration::try_from_secs_f64(secs) {
                Ok(step) => Cadence::Every(step),
                // A step longer than any representable wait never gets to check.
                Err(_) => Cadence::Uninterruptible,
            },
        }
    }
}

impl From<Option<f64>> for Cadence {
    fn from(secs: Option<f64>) -> Self {
        Cadence::from_secs(secs)
    }
}

/// Cooperative cancellation flag shared between the printer and its worker.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Source of time for waits.
///
/// `now` is measured from an arbitrary fixed origin; only differences between two calls
/// are meaningful.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;

    fn sleep(&self, duration: Duration);

    /// One iteration of a busy poll.
    fn pause(&self) {
        std::hint::spin_loop();
    }
}

/// The wall clock: [Instant] and [std::thread::sleep].
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// How a [wait] ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Waited {
    Elapsed,
    Cancelled,
}

/// Blocks for roughly `duration`, returning early once `token` is cancelled and `cadence`
/// allows noticing it. A zero duration, or a token that is already cancelled, returns
/// without sleeping.
pub fn wait(
    clock: &dyn Clock,
    duration: Duration,
    token: &CancelToken,
    cadence: Cadence,
) -> Waited {
    if token.is_cancelled() {
        return Waited::Cancelled;
    }
    if duration.is_zero() {
        return Waited::Elapsed;
    }

    let deadline = clock.now() + duration;
    match cadence {
        Cadence::Uninterruptible => clock.sleep(duration),
        Cadence::BusyPoll => {
            while clock.now() < deadline {
                if token.is_cancelled() {
                    break;
                }
                clock.pause();
            }
        }
        Cadence::Every(step) if step.is_zero() => {
            return wait(clock, duration, token, Cadence::BusyPoll);
        }
        Cadence::Every(step) => {
            let steps = duration.as_nanos() / step.as_nanos();
            for _ in 0..steps {
                if token.is_cancelled() {
                    break;
                }
                clock.sleep(step);
            }
            if !token.is_cancelled() {
                let now = clock.now();
                if now < deadline {
                    clock.sleep(deadline - now);
                }
            }
        }
    }

    if token.is_cancelled() {
        Waited::Cancelled
    } else {
        Waited::Elapsed
    }
}

/// Converts caller-supplied seconds into a [Duration], clamping negatives to zero.
/// Returns `None` for NaN, infinite and out-of-range values.
pub(crate) fn duration_from_secs(secs: f64) -> Option<Duration> {
    if secs.is_nan() {
        return None;
    }
    Duration::try_from_secs_f64(secs.max(0.0)).ok()
}

#[cfg(test)]
mod test {
    use super::*;
    use mock_instant::{Instant as MockInstant, MockClock};
    use std::sync::Mutex;

    // MockClock may be process-wide, so tests that advance it take turns.
    static CLOCK_GUARD: Mutex<()> = Mutex::new(());

    struct MockedClock {
        origin: MockInstant,
        sleeps: Mutex<Vec<Duration>>,
        // Sleeps and busy-poll iterations alike.
        ticks: Mutex<usize>,
        cancel_after: Option<(usize, CancelToken)>,
    }

    impl MockedClock {
        fn new() -> Self {
            Self {
                origin: MockInstant::now(),
                sleeps: Mutex::new(Vec::new()),
                ticks: Mutex::new(0),
                cancel_after: None,
            }
        }

        fn cancelling_after(ticks: usize, token: &CancelToken) -> Self {
            Self {
                cancel_after: Some((ticks, token.clone())),
                ..Self::new()
            }
        }

        fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().unwrap().clone()
        }

        fn tick(&self) {
            let mut ticks = self.ticks.lock().unwrap();
            *ticks += 1;
            if let Some((after, token)) = &self.cancel_after {
                if *ticks == *after {
                    token.cancel();
                }
            }
        }
    }

    impl Clock for MockedClock {
        fn now(&self) -> Duration {
            MockInstant::now().duration_since(self.origin)
        }

        fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
            MockClock::advance(duration);
            self.tick();
        }

        fn pause(&self) {
            MockClock::advance(Duration::from_millis(1));
            self.tick();
        }
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn zero_duration_returns_immediately() {
        let _guard = CLOCK_GUARD.lock().unwrap_or_else(|e| e.into_inner());
        let clock = MockedClock::new();
        let waited = wait(
            &clock,
            Duration::ZERO,
            &CancelToken::new(),
            Cadence::Uninterruptible,
        );
        assert_eq!(waited, Waited::Elapsed);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn already_cancelled_token_skips_the_wait() {
        let _guard = CLOCK_GUARD.lock().unwrap_or_else(|e| e.into_inner());
        let clock = MockedClock::new();
        let token = CancelToken::new();
        token.cancel();
        let waited = wait(&clock, ms(500), &token, Cadence::Every(ms(100)));
        assert_eq!(waited, Waited::Cancelled);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn uninterruptible_sleeps_once_for_the_full_duration() {
        let _guard = CLOCK_GUARD.lock().unwrap_or_else(|e| e.into_inner());
        let clock = MockedClock::new();
        let waited = wait(&clock, ms(1500), &CancelToken::new(), Cadence::Uninterruptible);
        assert_eq!(waited, Waited::Elapsed);
        assert_eq!(clock.sleeps(), vec![ms(1500)]);
    }

    #[test]
    fn cadence_steps_then_sleeps_the_remainder() {
        let _guard = CLOCK_GUARD.lock().unwrap_or_else(|e| e.into_inner());
        let clock = MockedClock::new();
        let waited = wait(&clock, ms(1000), &CancelToken::new(), Cadence::Every(ms(300)));
        assert_eq!(waited, Waited::Elapsed);
        assert_eq!(clock.sleeps(), vec![ms(300), ms(300), ms(300), ms(100)]);
        assert!(clock.now() >= ms(1000));
    }

    #[test]
    fn cadence_stops_at_the_next_check_after_cancel() {
        let _guard = CLOCK_GUARD.lock().unwrap_or_else(|e| e.into_inner());
        let token = CancelToken::new();
        let clock = MockedClock::cancelling_after(2, &token);
        let waited = wait(&clock, ms(1000), &token, Cadence::Every(ms(300)));
        assert_eq!(waited, Waited::Cancelled);
        assert_eq!(clock.sleeps(), vec![ms(300), ms(300)]);
    }

    #[test]
    fn busy_poll_runs_until_the_deadline_without_sleeping() {
        let _guard = CLOCK_GUARD.lock().unwrap_or_else(|e| e.into_inner());
        let clock = MockedClock::new();
        let waited = wait(&clock, ms(5), &CancelToken::new(), Cadence::BusyPoll);
        assert_eq!(waited, Waited::Elapsed);
        assert!(clock.sleeps().is_empty());
        assert!(clock.now() >= ms(5));
    }

    #[test]
    fn busy_poll_notices_cancel_on_the_next_iteration() {
        let _guard = CLOCK_GUARD.lock().unwrap_or_else(|e| e.into_inner());
        let token = CancelToken::new();
        let clock = MockedClock::cancelling_after(3, &token);
        let waited = wait(&clock, ms(1000), &token, Cadence::BusyPoll);
        assert_eq!(waited, Waited::Cancelled);
        assert!(clock.sleeps().is_empty());
        assert_eq!(clock.now(), ms(3));
    }

    #[test]
    fn cadence_from_seconds() {
        assert_eq!(Cadence::from_secs(None), Cadence::Uninterruptible);
        assert_eq!(Cadence::from_secs(Some(0.0)), Cadence::BusyPoll);
        assert_eq!(Cadence::from_secs(Some(-1.0)), Cadence::BusyPoll);
        assert_eq!(Cadence::from_secs(Some(0.25)), Cadence::Every(ms(250)));
        assert_eq!(
            Cadence::from_secs(Some(f64::INFINITY)),
            Cadence::Uninterruptible
        );
    }

    #[test]
    fn seconds_are_clamped_and_checked() {
        assert_eq!(duration_from_secs(-3.0), Some(Duration::ZERO));
        assert_eq!(duration_from_secs(1.5), Some(ms(1500)));
        assert_eq!(duration_from_secs(f64::NAN), None);
        assert_eq!(duration_from_secs(f64::INFINITY), None);
    }
}
