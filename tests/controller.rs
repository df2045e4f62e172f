// PARSIMONY CONTROLLER TESTS
// FULL TICKS AGAINST A SCRIPTED IN-MEMORY ENGINE
//
// THE SCRIPTED ENGINE RECORDS EVERY WORKER COMMAND AND LETS THE TEST
// FLIP BENCHMARK STATES AND COUNTER VALUES BETWEEN TICKS. NO NETWORK,
// NO RAPL. RUN OFFLINE.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{bail, Result};

use parsimony::config::ConfigurationSet;
use parsimony::controller::Controller;
use parsimony::engine::{
    BenchmarkPhase, BenchmarkStatus, CounterValue, EngineClient, Worker, CTR_TASKS_STARTED,
};
use parsimony::model::{Coefficients, HardwareModel, WorkloadModel};
use parsimony::policy::{synth_idle, synth_max};
use parsimony::telemetry::Telemetry;

// === SCRIPTED ENGINE ===

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Enable(u32),
    Disable(u32),
    Frequency(u32, u64),
}

#[derive(Default)]
struct Script {
    workers: Vec<u32>,
    benchmarks: BTreeMap<String, BenchmarkStatus>,
    counters: BTreeMap<String, f64>,
    commands: Vec<Command>,
    fail_worker_commands: bool,
}

#[derive(Clone)]
struct ScriptedEngine {
    script: Arc<Mutex<Script>>,
}

impl ScriptedEngine {
    fn new(workers: u32) -> (Self, Arc<Mutex<Script>>) {
        let script = Arc::new(Mutex::new(Script {
            workers: (0..workers).collect(),
            ..Default::default()
        }));
        (Self { script: script.clone() }, script)
    }
}

impl EngineClient for ScriptedEngine {
    fn session_name(&self) -> &str {
        "managed"
    }

    fn workers(&mut self) -> Result<Vec<Worker>> {
        let s = self.script.lock().unwrap();
        if s.fail_worker_commands {
            bail!("engine unreachable");
        }
        Ok(s.workers.iter().map(|&local_id| Worker { local_id }).collect())
    }

    fn enable_worker(&mut self, local_id: u32) -> Result<()> {
        let mut s = self.script.lock().unwrap();
        if s.fail_worker_commands {
            bail!("engine unreachable");
        }
        s.commands.push(Command::Enable(local_id));
        Ok(())
    }

    fn disable_worker(&mut self, local_id: u32) -> Result<()> {
        let mut s = self.script.lock().unwrap();
        if s.fail_worker_commands {
            bail!("engine unreachable");
        }
        s.commands.push(Command::Disable(local_id));
        Ok(())
    }

    fn set_frequency(&mut self, local_id: u32, freq_khz: u64) -> Result<()> {
        let mut s = self.script.lock().unwrap();
        if s.fail_worker_commands {
            bail!("engine unreachable");
        }
        s.commands.push(Command::Frequency(local_id, freq_khz));
        Ok(())
    }

    fn counters(&mut self) -> Result<Vec<String>> {
        Ok(self.script.lock().unwrap().counters.keys().cloned().collect())
    }

    fn counter_values(&mut self, counter: &str, _refresh: bool) -> Result<Vec<CounterValue>> {
        let s = self.script.lock().unwrap();
        Ok(s.counters
            .get(counter)
            .map(|&value| vec![CounterValue { timestamp: 0.0, value }])
            .unwrap_or_default())
    }

    fn benchmarks(&mut self) -> Result<Vec<String>> {
        Ok(self.script.lock().unwrap().benchmarks.keys().cloned().collect())
    }

    fn benchmark_status(&mut self, name: &str) -> Result<BenchmarkStatus> {
        match self.script.lock().unwrap().benchmarks.get(name) {
            Some(&status) => Ok(status),
            None => bail!("no benchmark '{name}'"),
        }
    }

    fn activate_benchmark(&mut self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn activate_profile(&mut self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn update_session(&mut self) -> Result<()> {
        Ok(())
    }

    fn energy_management(&mut self, _run_loop: bool, _adapt: bool) -> Result<()> {
        Ok(())
    }
}

// === FIXTURE ===
// FLAT MODEL: ipc == 1 PER CORE, PKG == cpus * 0.5 * (freq/2.4GHz), RAM == 1.
// BENCHMARK B (ipt 10_000) YIELDS THE PARETO FRONTIER
//   (1.2 GHz, 2 cores, no ht)  1.5 W  240k tasks/s
//   (1.2 GHz, 4 cores, no ht)  2.0 W  480k tasks/s
//   (2.4 GHz, 4 cores, no ht)  3.0 W  960k tasks/s

fn hw() -> HardwareModel {
    HardwareModel {
        freqs_khz: vec![1_200_000, 2_400_000],
        cores: vec![2, 4],
        smt: vec![false, true],
        nominal_freq_khz: 2_400_000,
        coefficients: Coefficients {
            ipc_base: 1.0,
            ipc_compute: 0.0,
            ipc_cache: 0.0,
            ipc_branch_penalty: 0.0,
            ipc_mem_stall: 0.0,
            smt_yield: 1.0,
            pkg_base: 0.0,
            pkg_per_cpu: 0.0,
            pkg_freq: 0.5,
            pkg_freq_exp: 1.0,
            pkg_avx_uplift: 0.0,
            core_per_cpu: 0.25,
            core_freq_exp: 1.0,
            ram_base: 1.0,
            ram_per_cpu: 0.0,
        },
    }
}

fn workloads() -> WorkloadModel {
    serde_json::from_value(serde_json::json!({
        "benchmarks": {
            "B": {
                "memory_heaviness": 0.0,
                "nomemory_heaviness": 1.0,
                "avx_heaviness": 0.0,
                "branch_heaviness": 0.0,
                "compute_heaviness": 0.0,
                "cache_heaviness": 0.0,
                "ipt": 10_000.0
            }
        }
    }))
    .unwrap()
}

fn telemetry() -> Telemetry {
    Telemetry::new(Duration::from_secs(1), Duration::from_secs(300), None)
}

fn controller_with_benchmark(
    phase: BenchmarkPhase,
    active: bool,
) -> (Controller<ScriptedEngine>, Arc<Mutex<Script>>) {
    let (engine, script) = ScriptedEngine::new(8);
    script
        .lock()
        .unwrap()
        .benchmarks
        .insert("B".to_string(), BenchmarkStatus { phase, active });

    let hw = hw();
    let cache = ConfigurationSet::build(&hw, &workloads(), &["B"]);
    let controller = Controller::new(engine, hw, cache, telemetry());
    (controller, script)
}

fn commands(script: &Arc<Mutex<Script>>) -> Vec<Command> {
    script.lock().unwrap().commands.clone()
}

fn clear_commands(script: &Arc<Mutex<Script>>) {
    script.lock().unwrap().commands.clear();
}

// === SCENARIOS ===

#[test]
fn startup_with_no_benchmark_running_idles_down() {
    let (mut ctl, script) = controller_with_benchmark(BenchmarkPhase::Ready, false);
    ctl.tick(Instant::now());

    // FIRST REFRESH IS ALWAYS AN EDGE; NOTHING RUNS -> SYNTHETIC IDLE
    let idle = synth_idle(ctl.hardware());
    assert_eq!(ctl.state.active_config, Some(idle));
    assert_eq!(ctl.state.current_candidates, vec![idle]);

    // MIN FREQUENCY EVERYWHERE, ONLY CORES 0..2 ENABLED
    let cmds = commands(&script);
    for id in 0..8 {
        assert!(cmds.contains(&Command::Frequency(id, 1_200_000)));
    }
    assert!(cmds.contains(&Command::Enable(0)));
    assert!(cmds.contains(&Command::Enable(1)));
    for id in 2..8 {
        assert!(cmds.contains(&Command::Disable(id)));
    }
}

#[test]
fn disabling_the_loop_commits_synth_max() {
    let (mut ctl, script) = controller_with_benchmark(BenchmarkPhase::Ready, false);
    ctl.tick(Instant::now());
    clear_commands(&script);

    // API TOGGLE, CONSUMED AT THE NEXT TICK BOUNDARY
    ctl.set_enabled(false);
    assert!(ctl.state.pending_update);
    ctl.tick(Instant::now());

    let max = synth_max(ctl.hardware());
    assert_eq!(ctl.state.active_config, Some(max));
    assert_eq!(ctl.state.current_candidates, vec![max]);
    assert!(!ctl.state.pending_update);

    // EVERY WORKER ENABLED AT MAX FREQUENCY
    let cmds = commands(&script);
    for id in 0..8 {
        assert!(cmds.contains(&Command::Frequency(id, 2_400_000)));
        assert!(cmds.contains(&Command::Enable(id)));
    }
}

#[test]
fn disabled_loop_ignores_benchmark_state() {
    let (mut ctl, script) = controller_with_benchmark(BenchmarkPhase::Running, true);
    ctl.set_enabled(false);
    ctl.tick(Instant::now());

    // MODE GATING: SYNTH MAX DESPITE A RUNNING BENCHMARK
    let max = synth_max(ctl.hardware());
    assert_eq!(ctl.state.active_config, Some(max));

    // AND A LOADING EDGE CHANGES NOTHING
    clear_commands(&script);
    script.lock().unwrap().benchmarks.insert(
        "B".to_string(),
        BenchmarkStatus { phase: BenchmarkPhase::Loading, active: true },
    );
    ctl.tick(Instant::now());
    assert_eq!(ctl.state.active_config, Some(max));
    assert!(commands(&script).is_empty());
}

#[test]
fn running_benchmark_selects_cheapest_pareto_point() {
    let (mut ctl, _script) = controller_with_benchmark(BenchmarkPhase::Running, true);
    ctl.tick(Instant::now());

    assert_eq!(ctl.state.current_candidates.len(), 3);
    assert_eq!(ctl.state.all_candidates.len(), 8);

    let active = ctl.state.active_config.unwrap();
    assert_eq!(active.key(), (1_200_000, 2, false));
    assert_eq!(active.power_w, 1.5);
    assert_eq!(active.tps, 240_000.0);
}

#[test]
fn offered_rate_above_band_adapts_up() {
    let (mut ctl, script) = controller_with_benchmark(BenchmarkPhase::Running, true);
    let t0 = Instant::now();
    ctl.tick(t0);
    assert_eq!(ctl.state.active_config.unwrap().key(), (1_200_000, 2, false));

    // ENGINE REPORTS 500K TASKS/S OFFERED: |500K - 240K| > 5% OF 500K
    script
        .lock()
        .unwrap()
        .counters
        .insert(CTR_TASKS_STARTED.to_string(), 500_000.0);
    ctl.tick(t0 + Duration::from_secs(1));

    // CHEAPEST POINT SUSTAINING THE RATE
    let active = ctl.state.active_config.unwrap();
    assert_eq!(active.key(), (2_400_000, 4, false));
    assert_eq!(active.tps, 960_000.0);
}

#[test]
fn offered_rate_inside_band_holds_position() {
    let (mut ctl, script) = controller_with_benchmark(BenchmarkPhase::Running, true);
    let t0 = Instant::now();
    ctl.tick(t0);
    clear_commands(&script);

    // 240K MODELLED, 245K OFFERED: INSIDE THE 5% BAND
    script
        .lock()
        .unwrap()
        .counters
        .insert(CTR_TASKS_STARTED.to_string(), 245_000.0);
    ctl.tick(t0 + Duration::from_secs(1));

    assert_eq!(ctl.state.active_config.unwrap().key(), (1_200_000, 2, false));
    assert!(commands(&script).is_empty());
}

#[test]
fn loading_benchmark_forces_synth_max_within_one_tick() {
    let (mut ctl, script) = controller_with_benchmark(BenchmarkPhase::Ready, false);
    let t0 = Instant::now();
    ctl.tick(t0);
    assert_eq!(ctl.state.active_config, Some(synth_idle(ctl.hardware())));

    script.lock().unwrap().benchmarks.insert(
        "B".to_string(),
        BenchmarkStatus { phase: BenchmarkPhase::Loading, active: true },
    );
    ctl.tick(t0 + Duration::from_secs(1));

    let max = synth_max(ctl.hardware());
    assert_eq!(ctl.state.active_config, Some(max));
    assert_eq!(ctl.state.current_candidates, vec![max]);
}

#[test]
fn recommitting_the_same_triple_issues_no_engine_commands() {
    let (mut ctl, script) = controller_with_benchmark(BenchmarkPhase::Ready, false);
    let t0 = Instant::now();
    ctl.tick(t0);
    clear_commands(&script);

    // FORCE A RESELECTION THAT LANDS ON THE SAME CONFIGURATION
    ctl.set_enabled(true);
    ctl.tick(t0 + Duration::from_secs(1));

    assert_eq!(ctl.state.active_config, Some(synth_idle(ctl.hardware())));
    assert!(commands(&script).is_empty());
}

#[test]
fn failed_commit_retries_on_the_next_tick() {
    let (mut ctl, script) = controller_with_benchmark(BenchmarkPhase::Ready, false);
    script.lock().unwrap().fail_worker_commands = true;

    let t0 = Instant::now();
    ctl.tick(t0);
    // NOTHING COMMITTED, RETRY FLAG RAISED
    assert_eq!(ctl.state.active_config, None);
    assert!(ctl.state.pending_update);

    script.lock().unwrap().fail_worker_commands = false;
    ctl.tick(t0 + Duration::from_secs(1));
    assert_eq!(ctl.state.active_config, Some(synth_idle(ctl.hardware())));
    assert!(!ctl.state.pending_update);
}

#[test]
fn unknown_running_benchmark_falls_back_to_synth_max() {
    let (mut ctl, script) = controller_with_benchmark(BenchmarkPhase::Ready, false);
    script.lock().unwrap().benchmarks.insert(
        "uncached".to_string(),
        BenchmarkStatus { phase: BenchmarkPhase::Running, active: true },
    );
    ctl.tick(Instant::now());

    assert_eq!(ctl.state.active_config, Some(synth_max(ctl.hardware())));
}

#[test]
fn two_running_benchmarks_fall_back_to_synth_max() {
    let (mut ctl, script) = controller_with_benchmark(BenchmarkPhase::Running, true);
    script.lock().unwrap().benchmarks.insert(
        "B2".to_string(),
        BenchmarkStatus { phase: BenchmarkPhase::Running, active: true },
    );
    ctl.tick(Instant::now());
    assert_eq!(ctl.state.active_config, Some(synth_max(ctl.hardware())));
}

#[test]
fn idle_candidates_keep_the_incumbent_for_the_view() {
    let (mut ctl, script) = controller_with_benchmark(BenchmarkPhase::Running, true);
    let t0 = Instant::now();
    ctl.tick(t0);

    // DRIVE THE CONTROLLER OFF THE IDLE TRIPLE FIRST
    script
        .lock()
        .unwrap()
        .counters
        .insert(CTR_TASKS_STARTED.to_string(), 500_000.0);
    ctl.tick(t0 + Duration::from_secs(1));
    let running_cfg = ctl.state.active_config.unwrap();
    assert_eq!(running_cfg.key(), (2_400_000, 4, false));

    // BENCHMARK FINISHES, LOAD GOES AWAY: IDLE PLUS THE PREVIOUS
    // ACTIVE CONFIGURATION
    {
        let mut s = script.lock().unwrap();
        s.counters.clear();
        s.benchmarks.insert(
            "B".to_string(),
            BenchmarkStatus { phase: BenchmarkPhase::Finished, active: false },
        );
    }
    ctl.tick(t0 + Duration::from_secs(2));

    let idle = synth_idle(ctl.hardware());
    assert_eq!(ctl.state.active_config, Some(idle));
    assert_eq!(ctl.state.current_candidates.len(), 2);
    assert_eq!(ctl.state.current_candidates[0], idle);
    assert_eq!(ctl.state.current_candidates[1], running_cfg);
}

#[test]
fn telemetry_series_stay_bounded_over_long_runs() {
    let (mut ctl, script) = controller_with_benchmark(BenchmarkPhase::Running, true);
    script
        .lock()
        .unwrap()
        .counters
        .insert("Tasks.Finished".to_string(), 1234.0);

    let t0 = Instant::now();
    for i in 0..400u64 {
        ctl.tick(t0 + Duration::from_secs(i));
    }

    // WINDOW IS 300 S AT A 1 S CADENCE
    assert!(ctl.telemetry.throughput.len() <= 301);
    assert!(ctl.telemetry.power.len() <= 301);
    assert!(!ctl.telemetry.throughput.is_empty());
}

#[test]
fn session_mutators_raise_pending_update() {
    let (mut ctl, _script) = controller_with_benchmark(BenchmarkPhase::Ready, false);
    ctl.tick(Instant::now());
    assert!(!ctl.state.pending_update);

    ctl.activate_benchmark("managed", "B").unwrap();
    assert!(ctl.state.pending_update);

    // WRONG SESSION NAME: REFUSED, NO FLAG
    let (mut fresh, _s) = controller_with_benchmark(BenchmarkPhase::Ready, false);
    fresh.tick(Instant::now());
    assert!(fresh.activate_benchmark("other", "B").is_err());
    assert!(!fresh.state.pending_update);
}
