use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::{
    client::ReadingSink,
    network::{LinkStatus, NetworkLink},
    reading::{MAX_WEIGHT_KG, MIN_WEIGHT_KG, Reading},
    scale::WeightSensor,
};

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Offline,
    SensorNotReady,
    SensorError,
    /// The reading could not be encoded and was discarded.
    Dropped,
    Sent(u16),
    Failed,
}

/// Reads the scale and reports to the server, one reading per tick.
///
/// A failed tick has no effect on the next one: nothing is retried or queued.
#[derive(Debug)]
pub struct Reporter<S, L, T> {
    sensor: S,
    link: L,
    sink: T,
    interval: Duration,
}

impl<S, L, T> Reporter<S, L, T>
where
    S: WeightSensor,
    L: NetworkLink,
    T: ReadingSink,
{
    pub fn new(sensor: S, link: L, sink: T, interval: Duration) -> Self {
        Reporter {
            sensor,
            link,
            sink,
            interval,
        }
    }

    pub async fn tick(&mut self) -> TickOutcome {
        let status = self.link.status();
        if status != LinkStatus::Connected {
            log::debug!("WiFi link is {status:?}, skipping report");
            return TickOutcome::Offline;
        }

        match self.sensor.is_ready() {
            Ok(true) => {}
            Ok(false) => {
                log::debug!("Scale not ready, skipping report");
                return TickOutcome::SensorNotReady;
            }
            Err(e) => {
                log::error!("Failed to poll scale: {e:#}");
                return TickOutcome::SensorError;
            }
        }

        let reading = match self.sensor.read_weight() {
            Ok(weight) => Reading::new(weight),
            Err(e) => {
                log::error!("Failed to read scale: {e:#}");
                return TickOutcome::SensorError;
            }
        };

        if !reading.weight.is_finite() {
            log::error!("Dropping reading {}", reading.weight);
            return TickOutcome::Dropped;
        }
        if !reading.in_expected_range() {
            log::warn!(
                "Weight {:.2} kg is outside {MIN_WEIGHT_KG}-{MAX_WEIGHT_KG} kg",
                reading.weight
            );
        }

        match self.sink.send(&reading).await {
            Ok(status) => {
                log::info!("HTTP Response: {status} ({reading})");
                TickOutcome::Sent(status)
            }
            Err(e) => {
                log::error!("HTTP Error: {e:#}");
                TickOutcome::Failed
            }
        }
    }

    /// Ticks forever. Attempts are at least `interval` apart.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Arc, Mutex,
            atomic::{AtomicBool, Ordering},
        },
    };

    use anyhow::anyhow;
    use tokio::time::Instant;

    use super::*;
    use crate::config::NetworkCredentials;

    #[derive(Default)]
    struct FakeSensor {
        not_ready: bool,
        weights: VecDeque<Result<f32, anyhow::Error>>,
    }

    impl FakeSensor {
        fn with(weights: impl IntoIterator<Item = f32>) -> FakeSensor {
            FakeSensor {
                not_ready: false,
                weights: weights.into_iter().map(Ok).collect(),
            }
        }
    }

    impl WeightSensor for FakeSensor {
        fn is_ready(&mut self) -> Result<bool, anyhow::Error> {
            Ok(!self.not_ready)
        }

        fn read_weight(&mut self) -> Result<f32, anyhow::Error> {
            self.weights.pop_front().unwrap_or(Ok(5.0))
        }
    }

    #[derive(Clone)]
    struct FakeLink(Arc<AtomicBool>);

    impl FakeLink {
        fn up() -> FakeLink {
            FakeLink(Arc::new(AtomicBool::new(true)))
        }

        fn down() -> FakeLink {
            FakeLink(Arc::new(AtomicBool::new(false)))
        }
    }

    impl NetworkLink for FakeLink {
        fn status(&self) -> LinkStatus {
            if self.0.load(Ordering::SeqCst) {
                LinkStatus::Connected
            } else {
                LinkStatus::Disconnected
            }
        }

        fn begin(&self, _credentials: &NetworkCredentials) -> Result<(), anyhow::Error> {
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        sent: Arc<Mutex<Vec<(Instant, f32)>>>,
        failures: Arc<Mutex<VecDeque<bool>>>,
        latency: Duration,
    }

    impl RecordingSink {
        fn sent(&self) -> Vec<(Instant, f32)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl ReadingSink for RecordingSink {
        async fn send(&self, reading: &Reading) -> Result<u16, anyhow::Error> {
            self.sent
                .lock()
                .unwrap()
                .push((Instant::now(), reading.weight));
            tokio::time::sleep(self.latency).await;
            let fail = self.failures.lock().unwrap().pop_front().unwrap_or(false);
            if fail {
                Err(anyhow!("connection reset"))
            } else {
                Ok(201)
            }
        }
    }

    const INTERVAL: Duration = Duration::from_millis(10_000);

    #[tokio::test]
    async fn test_sends_reading() {
        let sink = RecordingSink::default();
        let mut reporter =
            Reporter::new(FakeSensor::with([12.345]), FakeLink::up(), sink.clone(), INTERVAL);

        assert_eq!(reporter.tick().await, TickOutcome::Sent(201));
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, 12.345);
    }

    #[tokio::test]
    async fn test_never_sends_while_offline() {
        let sink = RecordingSink::default();
        let link = FakeLink::down();
        let mut reporter =
            Reporter::new(FakeSensor::with([1.0, 2.0]), link.clone(), sink.clone(), INTERVAL);

        assert_eq!(reporter.tick().await, TickOutcome::Offline);
        assert_eq!(reporter.tick().await, TickOutcome::Offline);
        assert!(sink.sent().is_empty());

        link.0.store(true, Ordering::SeqCst);
        assert_eq!(reporter.tick().await, TickOutcome::Sent(201));
        assert_eq!(sink.sent().len(), 1);
        assert_eq!(sink.sent()[0].1, 1.0);
    }

    #[tokio::test]
    async fn test_skips_when_sensor_not_ready() {
        let sink = RecordingSink::default();
        let sensor = FakeSensor {
            not_ready: true,
            ..FakeSensor::default()
        };
        let mut reporter = Reporter::new(sensor, FakeLink::up(), sink.clone(), INTERVAL);

        assert_eq!(reporter.tick().await, TickOutcome::SensorNotReady);
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_sensor_error_ends_tick() {
        let sink = RecordingSink::default();
        let sensor = FakeSensor {
            not_ready: false,
            weights: VecDeque::from([Err(anyhow!("HX711 not ready")), Ok(4.0)]),
        };
        let mut reporter = Reporter::new(sensor, FakeLink::up(), sink.clone(), INTERVAL);

        assert_eq!(reporter.tick().await, TickOutcome::SensorError);
        assert_eq!(reporter.tick().await, TickOutcome::Sent(201));
        assert_eq!(sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_does_not_affect_next_tick() {
        let sink = RecordingSink::default();
        sink.failures.lock().unwrap().extend([true, false]);
        let mut reporter =
            Reporter::new(FakeSensor::with([1.0, 2.0]), FakeLink::up(), sink.clone(), INTERVAL);

        assert_eq!(reporter.tick().await, TickOutcome::Failed);
        assert_eq!(reporter.tick().await, TickOutcome::Sent(201));
        let weights: Vec<f32> = sink.sent().into_iter().map(|(_, w)| w).collect();
        assert_eq!(weights, vec![1.0, 2.0]);
    }

    #[tokio::test]
    async fn test_non_finite_is_dropped_and_out_of_range_is_sent() {
        let sink = RecordingSink::default();
        let mut reporter = Reporter::new(
            FakeSensor::with([f32::NAN, 1500.0]),
            FakeLink::up(),
            sink.clone(),
            INTERVAL,
        );

        assert_eq!(reporter.tick().await, TickOutcome::Dropped);
        assert_eq!(reporter.tick().await, TickOutcome::Sent(201));
        assert_eq!(sink.sent().len(), 1);
        assert_eq!(sink.sent()[0].1, 1500.0);
    }

    fn assert_spacing(sent: &[(Instant, f32)]) {
        for pair in sent.windows(2) {
            assert!(pair[1].0 - pair[0].0 >= INTERVAL, "{:?}", pair[1].0 - pair[0].0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_reports_every_interval() {
        let sink = RecordingSink::default();
        let reporter = Reporter::new(FakeSensor::default(), FakeLink::up(), sink.clone(), INTERVAL);

        let handle = tokio::spawn(reporter.run());
        tokio::time::sleep(Duration::from_millis(35_000)).await;
        handle.abort();

        let sent = sink.sent();
        assert_eq!(sent.len(), 4);
        assert_spacing(&sent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_spacing_holds_with_slow_server() {
        let sink = RecordingSink {
            latency: Duration::from_millis(15_000),
            ..RecordingSink::default()
        };
        let reporter = Reporter::new(FakeSensor::default(), FakeLink::up(), sink.clone(), INTERVAL);

        let handle = tokio::spawn(reporter.run());
        tokio::time::sleep(Duration::from_millis(61_000)).await;
        handle.abort();

        let sent = sink.sent();
        assert!(sent.len() >= 3);
        assert_spacing(&sent);
    }
}
