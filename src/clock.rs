use std::sync::{Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Monotonic time source for trigger timing.
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;

    fn sleep(&self, duration: Duration);

    /// Sleep for `duration` unless `stop` fires first. Returns whether it fired.
    fn sleep_unless_stopped(&self, duration: Duration, stop: &StopSignal) -> bool;
}

/// One-shot flag that wakes sleepers as soon as it is raised.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.wake.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block for up to `timeout` of real time, returning early on [`stop`](Self::stop).
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let stopped = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        let (stopped, _) = self
            .wake
            .wait_timeout_while(stopped, timeout, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *stopped
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }

    fn sleep_unless_stopped(&self, duration: Duration, stop: &StopSignal) -> bool {
        stop.wait_timeout(duration)
    }
}

/// Virtual clock where sleeping advances time instantly.
#[derive(Debug, Default)]
pub struct VirtualClock {
    now: Mutex<Duration>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }

    pub fn set(&self, to: Duration) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
        // Let other threads observe the new time
        thread::yield_now();
    }

    fn sleep_unless_stopped(&self, duration: Duration, stop: &StopSignal) -> bool {
        if stop.is_stopped() {
            return true;
        }
        self.sleep(duration);
        stop.is_stopped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_clock_sleep_advances() {
        let clock = VirtualClock::new();
        clock.sleep(Duration::from_millis(42));
        clock.advance(Duration::from_millis(8));
        assert_eq!(clock.now(), Duration::from_millis(50));
        clock.set(Duration::ZERO);
        assert_eq!(clock.now(), Duration::ZERO);
    }

    #[test]
    fn test_stop_signal_wakes_long_sleep() {
        let clock = MonotonicClock::new();
        let stop = std::sync::Arc::new(StopSignal::new());
        let stopper = {
            let stop = std::sync::Arc::clone(&stop);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                stop.stop();
            })
        };

        let started = Instant::now();
        assert!(clock.sleep_unless_stopped(Duration::from_secs(30), &stop));
        assert!(started.elapsed() < Duration::from_secs(5));
        stopper.join().unwrap();
    }

    #[test]
    fn test_sleep_unless_stopped_runs_full_duration() {
        let clock = MonotonicClock::new();
        let stop = StopSignal::new();
        let before = clock.now();
        assert!(!clock.sleep_unless_stopped(Duration::from_millis(5), &stop));
        assert!(clock.now() >= before + Duration::from_millis(5));

        let virtual_clock = VirtualClock::new();
        assert!(!virtual_clock.sleep_unless_stopped(Duration::from_secs(60), &stop));
        assert_eq!(virtual_clock.now(), Duration::from_secs(60));
        stop.stop();
        assert!(virtual_clock.sleep_unless_stopped(Duration::from_secs(60), &stop));
        assert_eq!(virtual_clock.now(), Duration::from_secs(60));
    }

    #[test]
    fn test_monotonic_clock_moves_forward() {
        let clock = MonotonicClock::new();
        let before = clock.now();
        clock.sleep(Duration::from_millis(2));
        assert!(clock.now() >= before + Duration::from_millis(2));
    }
}
