//! Measurement scheduler
//!
//! The [`Scheduler`] drives one measurement cycle at a time:
//!
//! 1. make sure the sensor is awake,
//! 2. record the cycle start,
//! 3. take `samples` readings, skipping failed ones,
//! 4. average them into a [`Measurement`],
//! 5. print the line and update the metrics sink,
//! 6. for intervals above one second, sleep the sensor until the next
//!    cycle start and wake it again.
//!
//! Cycle starts are anchored to the start of the previous cycle, so the
//! cadence does not drift with the time spent reading.
//!
//! Shutdown is checked before every reading and during the wait. A burst cut
//! short by shutdown is dropped: no line is printed and the sink keeps its
//! previous values.

use crate::aggregator::{Burst, Measurement};
use crate::clock::{Clock, Shutdown, SystemClock};
use crate::config::Config;
use crate::device::Device;
use crate::error::Result;
use crate::metrics::MetricsSink;
use crate::output::LineFormatter;
use std::io::{self, Write};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Tracked power state of the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerState {
    /// Not known yet, or a power command failed
    #[default]
    Unknown,
    /// Working mode
    Awake,
    /// Sleep mode
    Asleep,
}

/// Outcome of one cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    /// The averaged measurement
    pub measurement: Measurement,
    /// Readings that succeeded out of the configured burst
    pub successful: u32,
    /// When the cycle started
    pub started_at: Instant,
    /// Whether the measurement was printed and published
    pub published: bool,
    /// Whether shutdown cut the burst or the end-of-cycle wait short
    pub interrupted: bool,
}

/// Drives measurement cycles against a [`Device`]
pub struct Scheduler<D, C = SystemClock, W = io::Stdout> {
    device: D,
    clock: C,
    out: W,
    formatter: LineFormatter,
    metrics: Option<Arc<MetricsSink>>,
    samples: NonZeroU32,
    interval: Duration,
    duty_cycled: bool,
    power: PowerState,
    cycles: u64,
}

impl<D: Device> Scheduler<D> {
    /// Scheduler on the system clock printing to stdout
    pub fn with_stdout(device: D, config: &Config) -> Self {
        Self::new(device, config, SystemClock, io::stdout())
    }
}

impl<D: Device, C: Clock, W: Write> Scheduler<D, C, W> {
    /// Create a scheduler
    pub fn new(device: D, config: &Config, clock: C, out: W) -> Self {
        Self {
            device,
            clock,
            out,
            formatter: LineFormatter::new(config.timestamp_mode),
            metrics: None,
            samples: config.samples,
            interval: config.interval,
            duty_cycled: config.duty_cycled(),
            power: PowerState::Unknown,
            cycles: 0,
        }
    }

    /// Publish every measurement to `sink`
    pub fn with_metrics(mut self, sink: Arc<MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    /// Tracked power state
    pub fn power_state(&self) -> PowerState {
        self.power
    }

    /// Completed cycles
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// The driven device
    pub fn device(&self) -> &D {
        &self.device
    }

    /// The output writer
    pub fn output(&self) -> &W {
        &self.out
    }

    /// Stop scheduling and hand back the device
    pub fn into_device(self) -> D {
        self.device
    }

    /// Run cycles until `shutdown` is triggered.
    ///
    /// Only an output failure ends the loop with an error; device failures
    /// are logged and the loop carries on.
    pub fn run(&mut self, shutdown: &Shutdown) -> Result<()> {
        info!(
            samples = self.samples.get(),
            interval_ms = self.interval.as_millis() as u64,
            duty_cycled = self.duty_cycled,
            metrics = self.metrics.is_some(),
            "Starting measurement loop"
        );

        while !shutdown.is_triggered() {
            let report = self.run_cycle(shutdown)?;
            if report.interrupted {
                break;
            }
        }

        info!(cycles = self.cycles, "Measurement loop stopped");
        Ok(())
    }

    /// Run a single cycle, including the end-of-cycle wait
    pub fn run_cycle(&mut self, shutdown: &Shutdown) -> Result<CycleReport> {
        self.ensure_awake();

        let started_at = self.clock.now();
        let (burst, complete) = self.sample(shutdown);
        let measurement = burst.finish();

        if !complete {
            info!(
                successful = burst.successful(),
                samples = self.samples.get(),
                "Shutdown during burst, measurement dropped"
            );
            return Ok(CycleReport {
                measurement,
                successful: burst.successful(),
                started_at,
                published: false,
                interrupted: true,
            });
        }

        if burst.successful() == 0 {
            warn!(samples = self.samples.get(), "No successful readings in burst");
        }
        debug!(
            successful = burst.successful(),
            samples = self.samples.get(),
            pm25 = measurement.pm25,
            pm10 = measurement.pm10,
            "Burst complete"
        );

        self.formatter.write_to(&mut self.out, &measurement)?;
        if let Some(sink) = &self.metrics {
            sink.update(&measurement);
        }
        self.cycles += 1;

        let interrupted = !self.pause(started_at, shutdown);

        Ok(CycleReport {
            measurement,
            successful: burst.successful(),
            started_at,
            published: true,
            interrupted,
        })
    }

    /// Take the burst. The flag is `false` when shutdown stopped it early.
    fn sample(&mut self, shutdown: &Shutdown) -> (Burst, bool) {
        let mut burst = Burst::new(self.samples);
        for i in 0..self.samples.get() {
            if shutdown.is_triggered() {
                debug!(sample = i + 1, "Shutdown before reading");
                return (burst, false);
            }
            match self.device.read() {
                Ok(reading) => burst.add(reading),
                Err(e) => warn!(
                    sample = i + 1,
                    samples = self.samples.get(),
                    error = %e,
                    "Reading failed, skipping"
                ),
            }
        }
        (burst, true)
    }

    /// Sleep the sensor until the next cycle start. Returns `false` on shutdown.
    fn pause(&mut self, started_at: Instant, shutdown: &Shutdown) -> bool {
        if !self.duty_cycled {
            return true;
        }

        self.sleep();
        if !self.clock.wait_until(started_at + self.interval, shutdown) {
            return false;
        }
        self.wake();
        true
    }

    fn ensure_awake(&mut self) {
        if self.power == PowerState::Unknown {
            self.power = match self.device.is_awake() {
                Ok(true) => PowerState::Awake,
                Ok(false) => PowerState::Asleep,
                Err(e) => {
                    warn!(error = %e, "Cannot query sensor state, assuming asleep");
                    PowerState::Asleep
                }
            };
            debug!(state = ?self.power, "Resolved sensor power state");
        }

        if self.power == PowerState::Asleep {
            self.wake();
        }
    }

    fn wake(&mut self) {
        self.power = match self.device.wake() {
            Ok(()) => PowerState::Awake,
            Err(e) => {
                warn!(error = %e, "Wake command failed");
                PowerState::Unknown
            }
        };
    }

    fn sleep(&mut self) {
        self.power = match self.device.sleep() {
            Ok(()) => PowerState::Asleep,
            Err(e) => {
                warn!(error = %e, "Sleep command failed");
                PowerState::Unknown
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Reading;
    use crate::fake::{DeviceCall, FakeDevice, ManualClock};
    use chrono::{TimeZone, Utc};

    fn config(samples: u32, interval: Duration) -> Config {
        Config {
            samples: NonZeroU32::new(samples).unwrap(),
            interval,
            ..Config::default()
        }
    }

    fn reading(pm25: f64, pm10: f64) -> Reading {
        Reading::new(pm25, pm10, Utc.timestamp_opt(1_704_067_200, 0).unwrap())
    }

    #[test]
    fn test_first_cycle_wakes_sleeping_sensor() {
        let device = FakeDevice::asleep().with_reading(reading(1.0, 2.0));
        let mut scheduler =
            Scheduler::new(device, &config(1, Duration::ZERO), ManualClock::new(), Vec::new());
        assert_eq!(scheduler.power_state(), PowerState::Unknown);

        scheduler.run_cycle(&Shutdown::new()).unwrap();

        assert_eq!(
            scheduler.device().calls(),
            &[DeviceCall::IsAwake, DeviceCall::Wake, DeviceCall::Read]
        );
        assert_eq!(scheduler.power_state(), PowerState::Awake);
    }

    #[test]
    fn test_awake_sensor_is_only_queried_once() {
        let device = FakeDevice::awake().with_readings([reading(1.0, 1.0), reading(2.0, 2.0)]);
        let mut scheduler =
            Scheduler::new(device, &config(1, Duration::ZERO), ManualClock::new(), Vec::new());

        let shutdown = Shutdown::new();
        scheduler.run_cycle(&shutdown).unwrap();
        scheduler.run_cycle(&shutdown).unwrap();

        assert_eq!(
            scheduler.device().calls(),
            &[DeviceCall::IsAwake, DeviceCall::Read, DeviceCall::Read]
        );
        assert_eq!(scheduler.cycles(), 2);
    }

    #[test]
    fn test_failed_query_falls_back_to_wake() {
        let device = FakeDevice::awake()
            .with_failing_query()
            .with_reading(reading(1.0, 1.0));
        let mut scheduler =
            Scheduler::new(device, &config(1, Duration::ZERO), ManualClock::new(), Vec::new());

        scheduler.run_cycle(&Shutdown::new()).unwrap();

        assert_eq!(scheduler.device().count(DeviceCall::Wake), 1);
        assert_eq!(scheduler.power_state(), PowerState::Awake);
    }

    #[test]
    fn test_failed_power_commands_do_not_abort_cycle() {
        let device = FakeDevice::asleep()
            .with_failing_power()
            .with_reading(reading(4.0, 6.0));
        let clock = ManualClock::new();
        let mut scheduler =
            Scheduler::new(device, &config(1, Duration::from_secs(10)), clock, Vec::new());

        let report = scheduler.run_cycle(&Shutdown::new()).unwrap();

        assert_eq!(report.successful, 1);
        assert_eq!(report.measurement.pm25, 4.0);
        assert_eq!(scheduler.power_state(), PowerState::Unknown);
    }

    #[test]
    fn test_failed_power_commands_requery_next_cycle() {
        let device = FakeDevice::asleep()
            .with_failing_power()
            .with_readings([reading(1.0, 1.0), reading(2.0, 2.0)]);
        let mut scheduler = Scheduler::new(
            device,
            &config(1, Duration::from_secs(10)),
            ManualClock::new(),
            Vec::new(),
        );

        let shutdown = Shutdown::new();
        scheduler.run_cycle(&shutdown).unwrap();
        let first_cycle = scheduler.device().calls().len();
        scheduler.run_cycle(&shutdown).unwrap();

        let calls = scheduler.device().calls();
        assert_eq!(
            &calls[..first_cycle],
            &[
                DeviceCall::IsAwake,
                DeviceCall::Wake,
                DeviceCall::Read,
                DeviceCall::Sleep,
                DeviceCall::Wake
            ]
        );
        assert_eq!(calls[first_cycle], DeviceCall::IsAwake);
        assert_eq!(scheduler.device().count(DeviceCall::IsAwake), 2);
        assert_eq!(scheduler.power_state(), PowerState::Unknown);
    }

    #[test]
    fn test_duty_cycle_sleeps_and_wakes() {
        let device = FakeDevice::awake().with_reading(reading(1.0, 1.0));
        let clock = ManualClock::new();
        let mut scheduler =
            Scheduler::new(device, &config(1, Duration::from_secs(30)), clock.clone(), Vec::new());

        scheduler.run_cycle(&Shutdown::new()).unwrap();

        assert_eq!(
            scheduler.device().calls(),
            &[
                DeviceCall::IsAwake,
                DeviceCall::Read,
                DeviceCall::Sleep,
                DeviceCall::Wake
            ]
        );
        assert_eq!(clock.elapsed(), Duration::from_secs(30));
        assert_eq!(scheduler.power_state(), PowerState::Awake);
    }

    #[test]
    fn test_shutdown_during_wait_leaves_sensor_asleep() {
        let device = FakeDevice::awake().with_reading(reading(1.0, 1.0));
        let shutdown = Shutdown::new();
        let device = device.with_shutdown_after(1, &shutdown);
        let mut scheduler = Scheduler::new(
            device,
            &config(1, Duration::from_secs(30)),
            ManualClock::new(),
            Vec::new(),
        );

        let report = scheduler.run_cycle(&shutdown).unwrap();

        assert!(report.interrupted);
        assert_eq!(scheduler.power_state(), PowerState::Asleep);
        assert_eq!(scheduler.device().count(DeviceCall::Wake), 0);
    }

    #[test]
    fn test_interrupted_burst_is_not_published() {
        let shutdown = Shutdown::new();
        let device = FakeDevice::awake()
            .with_readings([reading(5.0, 5.0), reading(7.0, 7.0)])
            .with_shutdown_after(1, &shutdown);
        let mut scheduler =
            Scheduler::new(device, &config(3, Duration::ZERO), ManualClock::new(), Vec::new());

        let report = scheduler.run_cycle(&shutdown).unwrap();

        assert!(report.interrupted);
        assert!(!report.published);
        assert_eq!(report.successful, 1);
        assert_eq!(scheduler.device().count(DeviceCall::Read), 1);
        assert_eq!(scheduler.cycles(), 0);
        assert!(scheduler.output().is_empty());
    }

    #[test]
    fn test_metrics_sink_receives_measurement() {
        let sink = Arc::new(MetricsSink::new().unwrap());
        let device = FakeDevice::awake().with_readings([reading(10.0, 20.0), reading(20.0, 40.0)]);
        let mut scheduler =
            Scheduler::new(device, &config(2, Duration::ZERO), ManualClock::new(), Vec::new())
            .with_metrics(Arc::clone(&sink));

        scheduler.run_cycle(&Shutdown::new()).unwrap();

        let snap = sink.snapshot().unwrap();
        assert_eq!(snap.pm25, 15.0);
        assert_eq!(snap.pm10, 30.0);
    }
}
