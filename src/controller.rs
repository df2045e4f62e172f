// PARSIMONY CONTROLLER
// TICK-DRIVEN STATE MACHINE: EDGES -> RESELECT -> ADAPT -> TELEMETRY
//
// ONE TICK PER SECOND. THE WHOLE TICK BODY RUNS UNDER THE CONTROLLER
// MUTEX, SO API MUTATIONS LAND BETWEEN TICKS, NEVER INSIDE ONE. THE
// LOOP IS BEST-EFFORT AND SELF-HEALING: EVERY RECOVERABLE ERROR IS
// ABSORBED HERE AND RETRIED ON A LATER TICK.

use std::collections::HashSet;
use std::time::Instant;

use anyhow::Result;
use log::{debug, info, warn};

use crate::config::{Configuration, ConfigurationSet};
use crate::engine::{EngineClient, CTR_TASKS_ACTIVE, CTR_TASKS_STARTED};
use crate::model::HardwareModel;
use crate::policy::{adaptation_needed, select, synth_idle, synth_max};
use crate::telemetry::Telemetry;
use crate::watcher::{BenchmarkSnapshot, StateWatcher};

#[derive(Debug, Default)]
pub struct ControllerState {
    // DESIRED-MODE FLAG, TOGGLED BY THE API
    pub enabled: bool,
    // RAISED BY API MUTATORS AND FAILED COMMITS, CONSUMED AT THE NEXT
    // TICK BOUNDARY
    pub pending_update: bool,
    // ALWAYS EQUAL TO THE CONFIGURATION MOST RECENTLY COMMITTED TO THE
    // ENGINE, OR NONE BEFORE THE FIRST COMMIT
    pub active_config: Option<Configuration>,
    pub current_candidates: Vec<Configuration>,
    // NON-REDUCED SET, KEPT FOR THE /configurations VIEW
    pub all_candidates: Vec<Configuration>,
    pub last_state: Option<BenchmarkSnapshot>,
}

pub struct Controller<E: EngineClient> {
    engine: E,
    hw: HardwareModel,
    cache: ConfigurationSet,
    watcher: StateWatcher,
    pub telemetry: Telemetry,
    pub state: ControllerState,
}

impl<E: EngineClient> Controller<E> {
    pub fn new(engine: E, hw: HardwareModel, cache: ConfigurationSet, telemetry: Telemetry) -> Self {
        Self {
            engine,
            hw,
            cache,
            watcher: StateWatcher::new(),
            telemetry,
            state: ControllerState { enabled: true, ..Default::default() },
        }
    }

    pub fn hardware(&self) -> &HardwareModel {
        &self.hw
    }

    pub fn session_name(&self) -> &str {
        self.engine.session_name()
    }

    // ONE CONTROL-LOOP ITERATION
    pub fn tick(&mut self, now: Instant) {
        match self.watcher.refresh(&mut self.engine) {
            Ok(edges) => {
                self.state.last_state = Some(edges.snapshot);
                if edges.changed || self.state.pending_update {
                    // CLEAR BEFORE COMMIT: A FAILED COMMIT RE-RAISES IT
                    self.state.pending_update = false;
                    self.reselect();
                }
            }
            // ENGINE UNREACHABLE: KEEP pending_update, RETRY NEXT TICK
            Err(e) => warn!("tick: session refresh failed: {e:#}"),
        }

        self.adaptation_check();

        if self.telemetry.due(now) {
            self.telemetry
                .pull(now, &mut self.engine, self.state.active_config.as_ref());
        }
    }

    fn reselect(&mut self) {
        let snapshot = self.state.last_state.clone().unwrap_or_default();
        let (current, all) = self.candidates_for(&snapshot);
        self.state.current_candidates = current;
        self.state.all_candidates = all;

        if let Some(best) = select(&self.state.current_candidates, None, None) {
            self.commit(best);
        }
    }

    // THE MODE TABLE. DISABLED OR LOADING -> SYNTHETIC MAX; NOTHING
    // RUNNING -> SYNTHETIC IDLE (PLUS THE INCUMBENT FOR THE VIEW);
    // EXACTLY ONE BENCHMARK RUNNING -> ITS CACHED FRONTIER. TWO OR MORE
    // RUNNING IS OUTSIDE THE MODEL SPACE AND GETS MAX AS WELL.
    fn candidates_for(&self, snapshot: &BenchmarkSnapshot) -> (Vec<Configuration>, Vec<Configuration>) {
        let max = vec![synth_max(&self.hw)];

        if !self.state.enabled || snapshot.any_loading() {
            return (max.clone(), max);
        }

        match snapshot.running().as_slice() {
            [] => {
                let mut current = vec![synth_idle(&self.hw)];
                if let Some(active) = self.state.active_config {
                    if active != current[0] {
                        current.push(active);
                    }
                }
                (current.clone(), current)
            }
            [benchmark] => match self.cache.get(benchmark) {
                Some(cached) => (cached.pareto.clone(), cached.all.clone()),
                None => {
                    warn!("no cached configurations for '{benchmark}', using synthetic max");
                    (max.clone(), max)
                }
            },
            many => {
                debug!("{} benchmarks running at once, using synthetic max", many.len());
                (max.clone(), max)
            }
        }
    }

    // RESELECT AGAINST THE OFFERED TASK RATE WHEN THE ACTIVE POINT HAS
    // DRIFTED OUT OF THE TOLERANCE BAND. RUNS EVERY TICK, EVEN WITHOUT
    // AN EDGE.
    fn adaptation_check(&mut self) {
        let Some(active) = self.state.active_config else { return };
        if self.state.current_candidates.len() <= 1 {
            return;
        }

        let started = self.latest_counter(CTR_TASKS_STARTED);
        let in_flight = self.latest_counter(CTR_TASKS_ACTIVE);
        let needed = match (started, in_flight) {
            (Some(s), Some(a)) => s.max(a),
            (Some(s), None) => s,
            (None, Some(a)) => a,
            (None, None) => return,
        };

        if adaptation_needed(active.tps, needed) {
            if let Some(best) = select(&self.state.current_candidates, Some(needed), Some(active)) {
                self.commit(best);
            }
        }
    }

    fn latest_counter(&mut self, counter: &str) -> Option<f64> {
        match self.engine.counter_values(counter, true) {
            Ok(values) => values.last().map(|v| v.value),
            Err(e) => {
                debug!("counter '{counter}' unavailable: {e:#}");
                None
            }
        }
    }

    // IDEMPOTENT BY (freq, cores, ht): AN EQUAL TRIPLE ONLY REFRESHES
    // THE STORED RECORD, NO ENGINE COMMANDS GO OUT.
    fn commit(&mut self, new: Configuration) {
        if self.state.active_config == Some(new) {
            self.state.active_config = Some(new);
            return;
        }

        match self.push_to_engine(&new) {
            Ok(()) => {
                info!(
                    "commit: {} kHz x {} cores, ht={} (modelled {:.2} W, {:.0} tasks/s)",
                    new.freq_khz, new.cores, new.ht, new.power_w, new.tps
                );
                self.state.active_config = Some(new);
            }
            Err(e) => {
                warn!("commit failed, retrying next tick: {e:#}");
                self.state.pending_update = true;
            }
        }
    }

    // ENABLED WORKERS: PHYSICAL CORES 0..cores, PLUS THEIR SMT SIBLINGS
    // AT i + max_physical_cores WHEN HYPERTHREADING IS ON
    fn push_to_engine(&mut self, cfg: &Configuration) -> Result<()> {
        let max_physical = self.hw.max_cores();
        let mut enabled: HashSet<u32> = (0..cfg.cores).collect();
        if cfg.ht {
            enabled.extend((0..cfg.cores).map(|i| i + max_physical));
        }

        for worker in self.engine.workers()? {
            self.engine.set_frequency(worker.local_id, cfg.freq_khz)?;
            if enabled.contains(&worker.local_id) {
                self.engine.enable_worker(worker.local_id)?;
            } else {
                self.engine.disable_worker(worker.local_id)?;
            }
        }
        Ok(())
    }

    // --- API-FACING MUTATORS (CALLER HOLDS THE CONTROLLER MUTEX) ---

    pub fn set_enabled(&mut self, on: bool) {
        if self.state.enabled != on {
            info!("control loop {}", if on { "enabled" } else { "disabled" });
        }
        self.state.enabled = on;
        self.state.pending_update = true;
    }

    pub fn activate_benchmark(&mut self, session: &str, benchmark: &str) -> Result<()> {
        anyhow::ensure!(
            session == self.engine.session_name(),
            "unknown session '{session}'"
        );
        self.engine.activate_benchmark(benchmark)?;
        self.state.pending_update = true;
        Ok(())
    }

    pub fn activate_profile(&mut self, session: &str, profile: &str) -> Result<()> {
        anyhow::ensure!(
            session == self.engine.session_name(),
            "unknown session '{session}'"
        );
        self.engine.activate_profile(profile)?;
        self.state.pending_update = true;
        Ok(())
    }
}
