// PARSIMONY TELEMETRY
// SAMPLE-AND-HOLD RINGS OF (TIMESTAMP, ACTUAL, ESTIMATED) TRIPLES
//
// TWO INDEPENDENT SERIES, POWER AND THROUGHPUT, EACH BOUNDED BY THE
// HISTORY WINDOW. THE PULLER RUNS ON THE CONTROL THREAD AT ITS OWN
// CADENCE. TELEMETRY FAILURES ARE SILENT -- A BAD PULL JUST MEANS THE
// SERIES GAINS NO SAMPLE THIS TICK.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use log::debug;

use crate::config::Configuration;
use crate::engine::{EngineClient, CTR_TASKS_FINISHED};
use crate::rapl::{RaplReader, RaplSnapshot};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_HISTORY_WINDOW: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub at: Instant,
    pub actual: f64,
    pub estimated: f64,
}

#[derive(Debug)]
pub struct Series {
    window: Duration,
    samples: VecDeque<Sample>,
}

impl Series {
    pub fn new(window: Duration) -> Self {
        Self { window, samples: VecDeque::new() }
    }

    pub fn push(&mut self, at: Instant, actual: f64, estimated: f64) {
        self.samples.push_back(Sample { at, actual, estimated });
        self.trim(at);
    }

    fn trim(&mut self, now: Instant) {
        while let Some(front) = self.samples.front() {
            if front.at + self.window < now {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    // EVICTS EXPIRED ENTRIES BEFORE HANDING OUT THE VIEW
    pub fn samples(&mut self, now: Instant) -> impl Iterator<Item = &Sample> {
        self.trim(now);
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

pub struct Telemetry {
    pub power: Series,
    pub throughput: Series,
    refresh: Duration,
    last_pull: Option<Instant>,
    rapl: Option<RaplReader>,
    last_rapl: Option<RaplSnapshot>,
}

impl Telemetry {
    pub fn new(refresh: Duration, window: Duration, rapl: Option<RaplReader>) -> Self {
        Self {
            power: Series::new(window),
            throughput: Series::new(window),
            refresh,
            last_pull: None,
            rapl,
            last_rapl: None,
        }
    }

    pub fn due(&self, now: Instant) -> bool {
        self.last_pull.map_or(true, |t| now.duration_since(t) >= self.refresh)
    }

    pub fn pull<E: EngineClient + ?Sized>(
        &mut self,
        now: Instant,
        engine: &mut E,
        active: Option<&Configuration>,
    ) {
        self.last_pull = Some(now);

        // THROUGHPUT: LATEST VALUE OF THE FINISHED-TASKS COUNTER
        let est_tps = active.map_or(0.0, |c| c.tps);
        match engine.counter_values(CTR_TASKS_FINISHED, true) {
            Ok(values) => {
                if let Some(last) = values.last() {
                    self.throughput.push(now, last.value, est_tps);
                }
            }
            Err(e) => debug!("telemetry: finished-counter pull failed: {e:#}"),
        }

        // POWER: RAPL DELTA SINCE THE PREVIOUS READING. WITHOUT RAPL THE
        // ACTUAL IS PINNED TO 0 SO THE SERIES KEEPS ITS CADENCE.
        let est_w = active.map_or(0.0, |c| c.power_w);
        match &self.rapl {
            Some(reader) => match reader.read() {
                Ok(snapshot) => {
                    if let Some(prev) = self.last_rapl.take() {
                        let delta = snapshot.diff(&prev);
                        let watts = delta.package_and_dram_watts();
                        self.power.push(delta.taken, watts, est_w);
                    }
                    self.last_rapl = Some(snapshot);
                }
                Err(e) => debug!("telemetry: rapl read failed: {e:#}"),
            },
            None => self.power.push(now, 0.0, est_w),
        }
    }
}
