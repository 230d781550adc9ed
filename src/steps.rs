use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use crate::clock::Clock;
use crate::config::{DebounceConfig, MetricsConfig};
use crate::error::AppError;
use crate::model::{
    day_key, parse_day_key, DropReason, StepEvent, StepMetrics, StepRecord, StepUpdate,
};
use crate::sensor::{StepSensor, StepSubscription};
use crate::store::{KeyValueStore, STEP_COUNT_KEY, STEP_DATE_KEY};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    Active,
    /// No sensor; the count stays where it is and events are ignored.
    Degraded,
    TornDown,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrackSummary {
    pub accepted: usize,
    pub dropped: usize,
}

/// Day-scoped step counter fed by raw cumulative sensor readings.
pub struct StepAccumulator<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    debounce: DebounceConfig,
    metrics: MetricsConfig,
    record: StepRecord,
    last_raw: u64,
    last_update: Option<DateTime<Utc>>,
    state: TrackerState,
}

impl<S: KeyValueStore> StepAccumulator<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        debounce: DebounceConfig,
        metrics: MetricsConfig,
    ) -> Self {
        let today = clock.today();
        Self {
            store,
            clock,
            debounce,
            metrics,
            record: StepRecord {
                date: today,
                count: 0,
            },
            last_raw: 0,
            last_update: None,
            state: TrackerState::Idle,
        }
    }

    pub fn count(&self) -> u64 {
        self.record.count
    }

    /// Checks the sensor, loads today's record and subscribes.
    ///
    /// Without a sensor the accumulator stays at zero in degraded mode and
    /// `SensorUnavailable` is returned for the caller to surface once.
    pub async fn initialize<T: StepSensor>(
        &mut self,
        sensor: &T,
    ) -> Result<StepSubscription, AppError> {
        if !sensor.is_available() {
            self.enter_degraded();
            return Err(AppError::SensorUnavailable(
                "no step sensor is available on this device".to_string(),
            ));
        }

        self.load_record().await;
        let started = self.clock.now();
        let subscription = match sensor.subscribe() {
            Ok(subscription) => subscription,
            Err(err) => {
                self.enter_degraded();
                return Err(err);
            }
        };
        self.set_baseline(0, started);
        self.state = TrackerState::Active;
        tracing::info!(count = self.record.count, date = %self.record.date, "step tracking started");
        Ok(subscription)
    }

    /// Loads the persisted record, resetting it when it belongs to another day.
    pub async fn load_record(&mut self) -> StepRecord {
        let today = self.clock.today();
        match self.read_stored().await {
            Ok((Some(date), count)) if date == today => {
                self.record = StepRecord {
                    date,
                    count: count.unwrap_or(0),
                };
            }
            Ok((stored, _)) => {
                tracing::info!(
                    stored = stored.map(day_key).as_deref().unwrap_or("none"),
                    "step record is not from today; resetting"
                );
                self.record = StepRecord {
                    date: today,
                    count: 0,
                };
                self.persist().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to read step record; using in-memory count");
                if self.roll_over_if_stale() {
                    self.persist().await;
                }
            }
        }
        self.record.clone()
    }

    pub fn set_baseline(&mut self, raw: u64, at: DateTime<Utc>) {
        self.last_raw = raw;
        self.last_update = Some(at);
    }

    /// Folds one raw reading into the count if it passes the noise filter.
    pub async fn on_step_event(&mut self, event: StepEvent) -> StepUpdate {
        if self.state != TrackerState::Active {
            return StepUpdate::Dropped(DropReason::Inactive);
        }
        if event.steps < self.last_raw {
            tracing::debug!(raw = event.steps, last = self.last_raw, "sensor counter restarted");
            self.last_raw = event.steps;
            return StepUpdate::Dropped(DropReason::BelowThreshold);
        }
        let delta = event.steps - self.last_raw;
        if delta < self.debounce.min_delta {
            return StepUpdate::Dropped(DropReason::BelowThreshold);
        }
        if let Some(last) = self.last_update {
            if (event.at - last).num_milliseconds() <= self.debounce.min_interval_ms {
                return StepUpdate::Dropped(DropReason::TooSoon);
            }
        }

        self.roll_over_if_stale();
        self.record.count = self.record.count.saturating_add(delta);
        self.last_raw = event.steps;
        self.last_update = Some(event.at);
        self.persist().await;
        StepUpdate::Accepted {
            delta,
            count: self.record.count,
        }
    }

    pub fn derive_metrics(&self, weight_kg: Option<f64>) -> StepMetrics {
        let steps = self.record.count;
        let count = steps as f64;
        let calories = match weight_kg {
            Some(weight) => count * self.metrics.kcal_per_step_per_kg * weight,
            None => count * self.metrics.fallback_kcal_per_step,
        };
        StepMetrics {
            steps,
            distance_km: count * self.metrics.km_per_step,
            calories,
        }
    }

    pub async fn reset(&mut self) {
        self.record = StepRecord {
            date: self.clock.today(),
            count: 0,
        };
        tracing::info!("step count reset");
        self.persist().await;
    }

    /// Drives events until the stream ends or `shutdown` resolves.
    ///
    /// The subscription is released and the accumulator torn down on every
    /// exit path, so nothing is written afterwards.
    pub async fn track<F, U>(
        &mut self,
        mut subscription: StepSubscription,
        shutdown: F,
        mut on_update: U,
    ) -> TrackSummary
    where
        F: Future<Output = ()>,
        U: FnMut(&StepEvent, StepUpdate),
    {
        let mut summary = TrackSummary::default();
        tokio::pin!(shutdown);
        loop {
            // Shutdown is polled first so it is armed before any event is handled.
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("step tracking interrupted");
                    break;
                }
                event = subscription.recv() => {
                    let Some(event) = event else {
                        tracing::debug!("step stream ended");
                        break;
                    };
                    let update = self.on_step_event(event).await;
                    match update {
                        StepUpdate::Accepted { .. } => summary.accepted += 1,
                        StepUpdate::Dropped(_) => summary.dropped += 1,
                    }
                    on_update(&event, update);
                }
            }
        }
        subscription.unsubscribe();
        self.teardown();
        summary
    }

    pub fn teardown(&mut self) {
        self.state = TrackerState::TornDown;
    }

    fn enter_degraded(&mut self) {
        self.state = TrackerState::Degraded;
        self.record = StepRecord {
            date: self.clock.today(),
            count: 0,
        };
        tracing::warn!("step sensor unavailable; tracking disabled");
    }

    fn roll_over_if_stale(&mut self) -> bool {
        let today = self.clock.today();
        if self.record.date == today {
            return false;
        }
        tracing::info!(from = %self.record.date, to = %today, "day rolled over; step count reset");
        self.record = StepRecord {
            date: today,
            count: 0,
        };
        true
    }

    async fn read_stored(&self) -> Result<(Option<NaiveDate>, Option<u64>), AppError> {
        let date = self
            .store
            .get(STEP_DATE_KEY)
            .await?
            .and_then(|raw| parse_day_key(&raw));
        let count = match self.store.get(STEP_COUNT_KEY).await? {
            Some(raw) => match serde_json::from_str::<u64>(&raw) {
                Ok(count) => Some(count),
                Err(err) => {
                    tracing::warn!(error = %err, "stored step count is unreadable");
                    None
                }
            },
            None => None,
        };
        Ok((date, count))
    }

    async fn persist(&self) {
        if self.state == TrackerState::TornDown {
            tracing::debug!("skipping step write after teardown");
            return;
        }
        let count = match serde_json::to_string(&self.record.count) {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(error = %err, "failed to encode step count");
                return;
            }
        };
        if let Err(err) = self.store.set(STEP_COUNT_KEY, count).await {
            tracing::warn!(error = %err, "failed to persist step count; keeping it in memory");
        }
        if let Err(err) = self
            .store
            .set(STEP_DATE_KEY, day_key(self.record.date))
            .await
        {
            tracing::warn!(error = %err, "failed to persist step date; keeping it in memory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::sensor::ScriptedSensor;
    use crate::store::MemoryStore;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn setup(store: MemoryStore) -> (Arc<MemoryStore>, Arc<ManualClock>, StepAccumulator<MemoryStore>) {
        let store = Arc::new(store);
        let clock = Arc::new(ManualClock::at_day(day(2026, 10, 17)));
        let accumulator = StepAccumulator::new(
            store.clone(),
            clock.clone(),
            DebounceConfig::default(),
            MetricsConfig::default(),
        );
        (store, clock, accumulator)
    }

    fn event(steps: u64, at: DateTime<Utc>) -> StepEvent {
        StepEvent { steps, at }
    }

    fn ms(base: DateTime<Utc>, offset: i64) -> DateTime<Utc> {
        base + chrono::Duration::milliseconds(offset)
    }

    #[tokio::test]
    async fn jittery_readings_are_filtered() {
        let (store, clock, mut steps) = setup(MemoryStore::new());
        let subscription = steps
            .initialize(&ScriptedSensor::new(Vec::new()))
            .await
            .expect("initialize");
        drop(subscription);
        let start = clock.now();
        steps.set_baseline(100, start);

        let updates = [
            steps.on_step_event(event(100, ms(start, 0))).await,
            steps.on_step_event(event(101, ms(start, 100))).await,
            steps.on_step_event(event(102, ms(start, 200))).await,
            steps.on_step_event(event(105, ms(start, 700))).await,
        ];

        assert_eq!(updates[0], StepUpdate::Dropped(DropReason::BelowThreshold));
        assert_eq!(updates[1], StepUpdate::Dropped(DropReason::BelowThreshold));
        assert_eq!(updates[2], StepUpdate::Dropped(DropReason::BelowThreshold));
        assert_eq!(updates[3], StepUpdate::Accepted { delta: 5, count: 5 });
        assert_eq!(steps.count(), 5);
        assert_eq!(store.peek(STEP_COUNT_KEY).as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn large_delta_inside_the_interval_is_dropped() {
        let (_store, clock, mut steps) = setup(MemoryStore::new());
        let _subscription = steps
            .initialize(&ScriptedSensor::new(Vec::new()))
            .await
            .expect("initialize");
        let start = clock.now();

        let early = steps.on_step_event(event(50, ms(start, 500))).await;
        assert_eq!(early, StepUpdate::Dropped(DropReason::TooSoon));

        let later = steps.on_step_event(event(50, ms(start, 501))).await;
        assert_eq!(later, StepUpdate::Accepted { delta: 50, count: 50 });

        let next = steps.on_step_event(event(60, ms(start, 900))).await;
        assert_eq!(next, StepUpdate::Dropped(DropReason::TooSoon));
        assert_eq!(steps.count(), 50);
    }

    #[tokio::test]
    async fn initialize_resets_yesterdays_record() {
        let store = MemoryStore::new()
            .with_entry(STEP_DATE_KEY, "2026-10-16")
            .with_entry(STEP_COUNT_KEY, "8000");
        let (store, _clock, mut steps) = setup(store);

        let _subscription = steps
            .initialize(&ScriptedSensor::new(Vec::new()))
            .await
            .expect("initialize");

        assert_eq!(steps.count(), 0);
        assert_eq!(store.peek(STEP_COUNT_KEY).as_deref(), Some("0"));
        assert_eq!(store.peek(STEP_DATE_KEY).as_deref(), Some("2026-10-17"));
    }

    #[tokio::test]
    async fn initialize_keeps_todays_record() {
        let store = MemoryStore::new()
            .with_entry(STEP_DATE_KEY, "2026-10-17")
            .with_entry(STEP_COUNT_KEY, "1234");
        let (store, _clock, mut steps) = setup(store);

        let _subscription = steps
            .initialize(&ScriptedSensor::new(Vec::new()))
            .await
            .expect("initialize");

        assert_eq!(steps.count(), 1234);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn missing_sensor_degrades_to_zero() {
        let store = MemoryStore::new()
            .with_entry(STEP_DATE_KEY, "2026-10-17")
            .with_entry(STEP_COUNT_KEY, "1234");
        let (store, clock, mut steps) = setup(store);

        let err = steps
            .initialize(&ScriptedSensor::unavailable())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::SensorUnavailable(_)));
        assert_eq!(steps.state, TrackerState::Degraded);
        assert_eq!(steps.count(), 0);
        let update = steps.on_step_event(event(500, ms(clock.now(), 1000))).await;
        assert_eq!(update, StepUpdate::Dropped(DropReason::Inactive));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn accepted_event_after_midnight_starts_a_new_day() {
        let (store, clock, mut steps) = setup(MemoryStore::new());
        let _subscription = steps
            .initialize(&ScriptedSensor::new(Vec::new()))
            .await
            .expect("initialize");
        let start = clock.now();
        steps.on_step_event(event(40, ms(start, 1000))).await;
        assert_eq!(steps.count(), 40);

        clock.set_day(day(2026, 10, 18));
        let update = steps.on_step_event(event(55, clock.now())).await;

        assert_eq!(update, StepUpdate::Accepted { delta: 15, count: 15 });
        assert_eq!(store.peek(STEP_DATE_KEY).as_deref(), Some("2026-10-18"));
        assert_eq!(store.peek(STEP_COUNT_KEY).as_deref(), Some("15"));
    }

    #[tokio::test]
    async fn counter_restart_becomes_the_new_baseline() {
        let (_store, clock, mut steps) = setup(MemoryStore::new());
        let _subscription = steps
            .initialize(&ScriptedSensor::new(Vec::new()))
            .await
            .expect("initialize");
        let start = clock.now();
        steps.on_step_event(event(300, ms(start, 1000))).await;

        let restarted = steps.on_step_event(event(2, ms(start, 2000))).await;
        assert_eq!(restarted, StepUpdate::Dropped(DropReason::BelowThreshold));
        let resumed = steps.on_step_event(event(12, ms(start, 3000))).await;

        assert_eq!(resumed, StepUpdate::Accepted { delta: 10, count: 310 });
    }

    #[tokio::test]
    async fn metrics_use_weight_when_known() {
        let store = MemoryStore::new()
            .with_entry(STEP_DATE_KEY, "2026-10-17")
            .with_entry(STEP_COUNT_KEY, "10000");
        let (_store, _clock, mut steps) = setup(store);
        steps.load_record().await;

        let metrics = steps.derive_metrics(Some(70.0));
        assert_eq!(metrics.steps, 10000);
        assert!((metrics.distance_km - 8.0).abs() < 1e-9);
        assert!((metrics.calories - 350.0).abs() < 1e-9);

        let fallback = steps.derive_metrics(None);
        assert!((fallback.calories - 400.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn reset_zeroes_and_persists() {
        let store = MemoryStore::new()
            .with_entry(STEP_DATE_KEY, "2026-10-17")
            .with_entry(STEP_COUNT_KEY, "900");
        let (store, _clock, mut steps) = setup(store);
        steps.load_record().await;
        assert_eq!(steps.count(), 900);

        steps.reset().await;

        assert_eq!(steps.count(), 0);
        assert_eq!(store.peek(STEP_COUNT_KEY).as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn write_failures_keep_counting_in_memory() {
        let (store, clock, mut steps) = setup(MemoryStore::new());
        store.fail_writes(true);
        let _subscription = steps
            .initialize(&ScriptedSensor::new(Vec::new()))
            .await
            .expect("initialize");
        let start = clock.now();

        steps.on_step_event(event(10, ms(start, 600))).await;
        steps.on_step_event(event(20, ms(start, 1200))).await;

        assert_eq!(steps.count(), 20);
        assert!(store.peek(STEP_COUNT_KEY).is_none());
    }

    #[tokio::test]
    async fn track_consumes_stream_and_tears_down() {
        let (store, clock, mut steps) = setup(MemoryStore::new());
        let start = clock.now();
        let sensor = ScriptedSensor::new(vec![
            event(1, ms(start, 100)),
            event(10, ms(start, 700)),
            event(11, ms(start, 1400)),
            event(30, ms(start, 2000)),
        ]);
        let subscription = steps.initialize(&sensor).await.expect("initialize");

        let mut seen = Vec::new();
        let summary = steps
            .track(subscription, std::future::pending(), |event, update| {
                seen.push((event.steps, update));
            })
            .await;

        assert_eq!(summary, TrackSummary { accepted: 2, dropped: 2 });
        assert_eq!(seen.len(), 4);
        assert_eq!(steps.count(), 30);
        assert_eq!(steps.state, TrackerState::TornDown);

        let writes = store.write_count();
        steps.reset().await;
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn track_stops_on_shutdown() {
        let (_store, _clock, mut steps) = setup(MemoryStore::new());
        let sensor = ScriptedSensor::new(Vec::new()).held_open();
        let subscription = steps.initialize(&sensor).await.expect("initialize");

        let summary = steps.track(subscription, async {}, |_, _| {}).await;

        assert_eq!(summary, TrackSummary::default());
        assert_eq!(steps.state, TrackerState::TornDown);
    }
}
