// PARSIMONY ENGINE CLIENT INTERFACE
// THE SEAM BETWEEN THE CONTROLLER AND THE TASK-PROCESSING ENGINE
//
// THE ENGINE OWNS TASK ADMISSION AND EXECUTION; PARSIMONY ONLY ENABLES
// OR DISABLES WORKERS, SETS THEIR FREQUENCY, AND READS COUNTERS. ONE
// MANAGED SESSION IS OPEN PER CONNECTION. EVERYTHING BEHIND THIS TRAIT
// IS REPLACEABLE -- THE INTEGRATION TESTS SCRIPT IT IN MEMORY.

use anyhow::Result;
use serde::{Deserialize, Serialize};

// DISTRIBUTED COUNTER NAMES THE CONTROLLER CONSUMES
pub const CTR_TASKS_STARTED: &str = "Tasks.Started";
pub const CTR_TASKS_ACTIVE: &str = "Tasks.Active";
pub const CTR_TASKS_FINISHED: &str = "Tasks.Finished";
pub const CTR_TASKS_LATENCY_AVG: &str = "Tasks.LatencyAvg";

// A WORKER IS A SCHEDULABLE EXECUTION CONTEXT -- ONE PER LOGICAL CPU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    pub local_id: u32,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct CounterValue {
    pub timestamp: f64,
    pub value: f64,
}

// AN UNRECOGNISED PHASE STRING DESERIALISES AS AN ERROR; THE REMOTE
// CLIENT MAPS THAT TO Unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum BenchmarkPhase {
    Loading,
    Running,
    Ready,
    Finished,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchmarkStatus {
    pub phase: BenchmarkPhase,
    pub active: bool,
}

pub trait EngineClient: Send {
    // NAME OF THE MANAGED SESSION OPENED AT CONNECT
    fn session_name(&self) -> &str;

    fn workers(&mut self) -> Result<Vec<Worker>>;
    fn enable_worker(&mut self, local_id: u32) -> Result<()>;
    fn disable_worker(&mut self, local_id: u32) -> Result<()>;
    fn set_frequency(&mut self, local_id: u32, freq_khz: u64) -> Result<()>;

    fn counters(&mut self) -> Result<Vec<String>>;
    // ORDERED (TIMESTAMP, VALUE) SEQUENCE OF ONE COUNTER'S MONITOR
    fn counter_values(&mut self, counter: &str, refresh: bool) -> Result<Vec<CounterValue>>;

    fn benchmarks(&mut self) -> Result<Vec<String>>;
    fn benchmark_status(&mut self, name: &str) -> Result<BenchmarkStatus>;
    fn activate_benchmark(&mut self, name: &str) -> Result<()>;
    fn activate_profile(&mut self, name: &str) -> Result<()>;
    // FORCE THE ENGINE TO REFRESH ITS SESSION STATE
    fn update_session(&mut self) -> Result<()>;

    // DISABLE (OR RE-ENABLE) THE ENGINE'S BUILT-IN CONTROL LOOP.
    // CALLED WITH (false, false) AT STARTUP SO PARSIMONY IS IN CHARGE.
    fn energy_management(&mut self, run_loop: bool, adapt: bool) -> Result<()>;
}
