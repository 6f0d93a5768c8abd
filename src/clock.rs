//! Time source and shutdown signal for the scheduler.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Monotonic time source used to pace measurement cycles
pub trait Clock {
    /// Current instant
    fn now(&self) -> Instant;

    /// Block until `deadline` or until `shutdown` is triggered.
    ///
    /// Returns `false` if the wait was cut short by shutdown.
    fn wait_until(&self, deadline: Instant, shutdown: &Shutdown) -> bool;
}

/// Real monotonic clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wait_until(&self, deadline: Instant, shutdown: &Shutdown) -> bool {
        let remaining = deadline.saturating_duration_since(Instant::now());
        !shutdown.wait_timeout(remaining)
    }
}

/// Cloneable one-shot shutdown signal
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Shutdown {
    /// Create an untriggered signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger shutdown and wake every waiter
    pub fn trigger(&self) {
        let (lock, cvar) = &*self.inner;
        let mut triggered = lock.lock().unwrap_or_else(|e| e.into_inner());
        *triggered = true;
        cvar.notify_all();
    }

    /// Whether shutdown has been triggered
    pub fn is_triggered(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait up to `timeout` for shutdown; returns `true` if triggered
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |triggered| !*triggered)
            .unwrap_or_else(|e| e.into_inner());
        *guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_wait_runs_to_deadline() {
        let clock = SystemClock;
        let shutdown = Shutdown::new();
        let start = clock.now();
        assert!(clock.wait_until(start + Duration::from_millis(30), &shutdown));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_past_deadline_returns_immediately() {
        let clock = SystemClock;
        let shutdown = Shutdown::new();
        let start = Instant::now();
        assert!(clock.wait_until(start, &shutdown));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_trigger_interrupts_wait() {
        let clock = SystemClock;
        let shutdown = Shutdown::new();
        let trigger = shutdown.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            trigger.trigger();
        });

        let start = Instant::now();
        assert!(!clock.wait_until(start + Duration::from_secs(30), &shutdown));
        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(shutdown.is_triggered());
        handle.join().unwrap();
    }

    #[test]
    fn test_triggered_before_wait() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        assert!(shutdown.wait_timeout(Duration::from_secs(30)));
    }
}
