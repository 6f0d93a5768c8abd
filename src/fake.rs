//! Scripted device and manual clock for exercising the scheduler without
//! hardware.

use crate::clock::{Clock, Shutdown};
use crate::device::{Device, Reading};
use crate::error::DeviceError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Device call recorded by [`FakeDevice`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCall {
    /// [`Device::is_awake`]
    IsAwake,
    /// [`Device::wake`]
    Wake,
    /// [`Device::sleep`]
    Sleep,
    /// [`Device::read`]
    Read,
}

/// Clock that only moves when told to
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
    waits: Arc<Mutex<Vec<Instant>>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// A clock frozen at the current instant
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
            waits: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }

    /// Time elapsed since the clock was created
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Deadlines passed to [`Clock::wait_until`] so far
    pub fn waits(&self) -> Vec<Instant> {
        self.waits.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }

    fn wait_until(&self, deadline: Instant, shutdown: &Shutdown) -> bool {
        self.waits
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(deadline);
        if shutdown.is_triggered() {
            return false;
        }
        let target = deadline.saturating_duration_since(self.base);
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        if target > *offset {
            *offset = target;
        }
        true
    }
}

/// Device that replays scripted readings and records every call
#[derive(Debug, Default)]
pub struct FakeDevice {
    awake: bool,
    readings: VecDeque<Result<Reading, DeviceError>>,
    calls: Vec<DeviceCall>,
    clock: Option<ManualClock>,
    read_latency: Duration,
    failing_query: bool,
    failing_power: bool,
    shutdown_after_reads: Option<(usize, Shutdown)>,
}

impl FakeDevice {
    /// A sensor that starts asleep
    pub fn asleep() -> Self {
        Self::default()
    }

    /// A sensor that starts awake
    pub fn awake() -> Self {
        Self {
            awake: true,
            ..Self::default()
        }
    }

    /// Queue a successful reading
    pub fn with_reading(mut self, reading: Reading) -> Self {
        self.readings.push_back(Ok(reading));
        self
    }

    /// Queue several successful readings
    pub fn with_readings(mut self, readings: impl IntoIterator<Item = Reading>) -> Self {
        self.readings.extend(readings.into_iter().map(Ok));
        self
    }

    /// Queue a failed reading
    pub fn with_failure(mut self, error: DeviceError) -> Self {
        self.readings.push_back(Err(error));
        self
    }

    /// Advance `clock` by `latency` on every read
    pub fn with_latency(mut self, clock: &ManualClock, latency: Duration) -> Self {
        self.clock = Some(clock.clone());
        self.read_latency = latency;
        self
    }

    /// Make `is_awake` fail
    pub fn with_failing_query(mut self) -> Self {
        self.failing_query = true;
        self
    }

    /// Make `wake` and `sleep` fail
    pub fn with_failing_power(mut self) -> Self {
        self.failing_power = true;
        self
    }

    /// Trigger `shutdown` once `reads` reads have been made
    pub fn with_shutdown_after(mut self, reads: usize, shutdown: &Shutdown) -> Self {
        self.shutdown_after_reads = Some((reads, shutdown.clone()));
        self
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    /// Number of calls of one kind
    pub fn count(&self, call: DeviceCall) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }

    /// Current simulated power state
    pub fn is_working(&self) -> bool {
        self.awake
    }

    fn power_error() -> DeviceError {
        DeviceError::MalformedFrame("no reply".to_string())
    }
}

impl Device for FakeDevice {
    fn is_awake(&mut self) -> Result<bool, DeviceError> {
        self.calls.push(DeviceCall::IsAwake);
        if self.failing_query {
            return Err(Self::power_error());
        }
        Ok(self.awake)
    }

    fn wake(&mut self) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::Wake);
        if self.failing_power {
            return Err(Self::power_error());
        }
        self.awake = true;
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::Sleep);
        if self.failing_power {
            return Err(Self::power_error());
        }
        self.awake = false;
        Ok(())
    }

    fn read(&mut self) -> Result<Reading, DeviceError> {
        self.calls.push(DeviceCall::Read);
        if let Some(clock) = &self.clock {
            clock.advance(self.read_latency);
        }
        if let Some((after, shutdown)) = &self.shutdown_after_reads {
            if self.count(DeviceCall::Read) >= *after {
                shutdown.trigger();
            }
        }
        self.readings
            .pop_front()
            .unwrap_or_else(|| Err(DeviceError::Timeout { timeout_ms: 0 }))
    }
}
