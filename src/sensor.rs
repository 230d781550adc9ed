use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::error::AppError;
use crate::model::StepEvent;

const EVENT_BUFFER: usize = 64;

pub trait StepSensor {
    fn is_available(&self) -> bool;

    /// Starts delivering raw cumulative readings counted from this call.
    fn subscribe(&self) -> Result<StepSubscription, AppError>;
}

#[derive(Debug)]
enum Producer {
    Task(JoinHandle<()>),
    /// Blocking reader that cannot be interrupted; it is detached and exits
    /// on its next send once the receiver is closed.
    Thread,
}

/// Live handle on a sensor stream; dropping it unsubscribes.
#[derive(Debug)]
pub struct StepSubscription {
    events: mpsc::Receiver<StepEvent>,
    producer: Option<Producer>,
}

impl StepSubscription {
    pub fn new(events: mpsc::Receiver<StepEvent>, producer: JoinHandle<()>) -> Self {
        Self {
            events,
            producer: Some(Producer::Task(producer)),
        }
    }

    fn from_thread(events: mpsc::Receiver<StepEvent>) -> Self {
        Self {
            events,
            producer: Some(Producer::Thread),
        }
    }

    pub async fn recv(&mut self) -> Option<StepEvent> {
        self.events.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let Some(producer) = self.producer.take() else {
            return;
        };
        self.events.close();
        match producer {
            Producer::Task(handle) => handle.abort(),
            Producer::Thread => {}
        }
        tracing::debug!("step sensor unsubscribed");
    }
}

impl Drop for StepSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Clone, Debug)]
pub enum ReplaySource {
    Stdin,
    File(PathBuf),
}

/// Replays recorded readings, one per line: `<steps>` or `<offset_ms> <steps>`.
///
/// Readings without an offset are stamped with the clock when read; offsets
/// are relative to the moment of subscription.
pub struct ReplaySensor {
    source: ReplaySource,
    clock: Arc<dyn Clock>,
}

impl ReplaySensor {
    pub fn new(source: ReplaySource, clock: Arc<dyn Clock>) -> Self {
        Self { source, clock }
    }
}

impl StepSensor for ReplaySensor {
    fn is_available(&self) -> bool {
        match &self.source {
            ReplaySource::Stdin => true,
            ReplaySource::File(path) => path.is_file(),
        }
    }

    fn subscribe(&self) -> Result<StepSubscription, AppError> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let decoder = LineDecoder::new(self.clock.clone());
        match &self.source {
            ReplaySource::Stdin => {
                thread::Builder::new()
                    .name("step-replay".to_string())
                    .spawn(move || read_blocking(std::io::stdin().lock(), tx, decoder))?;
                Ok(StepSubscription::from_thread(rx))
            }
            ReplaySource::File(path) => {
                let file = std::fs::File::open(path).map_err(|err| {
                    AppError::SensorUnavailable(format!("{}: {err}", path.display()))
                })?;
                let reader = BufReader::new(tokio::fs::File::from_std(file));
                let producer = tokio::spawn(pump_readings(reader, tx, decoder));
                Ok(StepSubscription::new(rx, producer))
            }
        }
    }
}

async fn pump_readings<R>(reader: R, tx: mpsc::Sender<StepEvent>, mut decoder: LineDecoder)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(error = %err, "step reading stream failed");
                break;
            }
        };
        let Some(event) = decoder.decode(&line) else {
            continue;
        };
        if tx.send(event).await.is_err() {
            break;
        }
    }
}

fn read_blocking<R: BufRead>(reader: R, tx: mpsc::Sender<StepEvent>, mut decoder: LineDecoder) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!(error = %err, "step reading stream failed");
                break;
            }
        };
        let Some(event) = decoder.decode(&line) else {
            continue;
        };
        if tx.blocking_send(event).is_err() {
            break;
        }
    }
}

/// Turns replay lines into stamped events, skipping anything malformed.
struct LineDecoder {
    clock: Arc<dyn Clock>,
    started: DateTime<Utc>,
    line_no: usize,
}

impl LineDecoder {
    fn new(clock: Arc<dyn Clock>) -> Self {
        let started = clock.now();
        Self {
            clock,
            started,
            line_no: 0,
        }
    }

    fn decode(&mut self, line: &str) -> Option<StepEvent> {
        self.line_no += 1;
        let reading = match parse_reading(line) {
            Ok(Some(reading)) => reading,
            Ok(None) => return None,
            Err(message) => {
                tracing::warn!(line = self.line_no, "skipping reading: {message}");
                return None;
            }
        };
        let at = match reading.offset_ms {
            Some(offset) => match offset_from(self.started, offset) {
                Some(at) => at,
                None => {
                    tracing::warn!(
                        line = self.line_no,
                        "skipping reading: offset `{offset}` is out of range"
                    );
                    return None;
                }
            },
            None => self.clock.now(),
        };
        Some(StepEvent {
            steps: reading.steps,
            at,
        })
    }
}

fn offset_from(started: DateTime<Utc>, offset_ms: i64) -> Option<DateTime<Utc>> {
    started.checked_add_signed(TimeDelta::try_milliseconds(offset_ms)?)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Reading {
    offset_ms: Option<i64>,
    steps: u64,
}

fn parse_reading(line: &str) -> Result<Option<Reading>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let fields: Vec<&str> = line.split_whitespace().collect();
    let (offset, steps) = match fields.as_slice() {
        [steps] => (None, *steps),
        [offset, steps] => (Some(*offset), *steps),
        _ => return Err(format!("expected `<steps>` or `<offset_ms> <steps>`, got `{line}`")),
    };
    let offset_ms = offset
        .map(|value| {
            value
                .parse::<i64>()
                .ok()
                .filter(|ms| *ms >= 0)
                .ok_or_else(|| format!("invalid offset `{value}`"))
        })
        .transpose()?;
    let steps = steps
        .parse::<u64>()
        .map_err(|_| format!("invalid step count `{steps}`"))?;
    Ok(Some(Reading { offset_ms, steps }))
}

#[cfg(test)]
pub use scripted::ScriptedSensor;

#[cfg(test)]
mod scripted {
    use tokio::sync::mpsc;

    use super::{StepSensor, StepSubscription, EVENT_BUFFER};
    use crate::error::AppError;
    use crate::model::StepEvent;

    pub struct ScriptedSensor {
        available: bool,
        events: Vec<StepEvent>,
        /// Keep the stream open after the last event until unsubscribed.
        hold_open: bool,
    }

    impl ScriptedSensor {
        pub fn new(events: Vec<StepEvent>) -> Self {
            Self {
                available: true,
                events,
                hold_open: false,
            }
        }

        pub fn unavailable() -> Self {
            Self {
                available: false,
                events: Vec::new(),
                hold_open: false,
            }
        }

        pub fn held_open(mut self) -> Self {
            self.hold_open = true;
            self
        }
    }

    impl StepSensor for ScriptedSensor {
        fn is_available(&self) -> bool {
            self.available
        }

        fn subscribe(&self) -> Result<StepSubscription, AppError> {
            if !self.available {
                return Err(AppError::SensorUnavailable("scripted".to_string()));
            }
            let (tx, rx) = mpsc::channel(EVENT_BUFFER);
            let events = self.events.clone();
            let hold_open = self.hold_open;
            let producer = tokio::spawn(async move {
                for event in events {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
                if hold_open {
                    std::future::pending::<()>().await;
                }
            });
            Ok(StepSubscription::new(rx, producer))
        }
    }
}
