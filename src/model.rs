// PARSIMONY ANALYTICAL MODEL
// FITTED HARDWARE MODEL + PER-BENCHMARK WORKLOAD DESCRIPTORS
//
// BOTH HALVES ARE LOADED FROM JSON MODEL FILES AT STARTUP AND ARE PURE
// AFTERWARDS: SAME INPUTS, SAME OUTPUTS, NO SIDE EFFECTS. THE FORMULAS
// BELOW EVALUATE FITTED COEFFICIENTS -- TREAT THEM AS OPAQUE. A MISSING
// MODEL FILE IS FATAL AT STARTUP; AN UNKNOWN BENCHMARK IS A PER-ENTRY
// ERROR THE CACHE BUILDER SKIPS.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("unknown benchmark '{0}'")]
pub struct UnknownBenchmark(pub String);

// WORKLOAD DESCRIPTOR. HEAVINESS FIELDS ARE FRACTIONS IN [0, 1],
// ipt IS INSTRUCTIONS PER TASK.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkloadProfile {
    pub memory_heaviness: f64,
    pub nomemory_heaviness: f64,
    pub avx_heaviness: f64,
    pub branch_heaviness: f64,
    pub compute_heaviness: f64,
    pub cache_heaviness: f64,
    pub ipt: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkloadModel {
    benchmarks: HashMap<String, WorkloadProfile>,
}

impl WorkloadModel {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("workload model unavailable: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("workload model unparseable: {}", path.display()))
    }

    pub fn benchmark(&self, name: &str) -> Result<&WorkloadProfile, UnknownBenchmark> {
        self.benchmarks
            .get(name)
            .ok_or_else(|| UnknownBenchmark(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.benchmarks.keys().map(String::as_str)
    }
}

// FITTED COEFFICIENTS. PRODUCED BY THE OFFLINE CALIBRATION RUNS, NOT
// HAND-TUNED -- DO NOT EDIT INDIVIDUAL VALUES WITHOUT REFITTING.
#[derive(Debug, Clone, Deserialize)]
pub struct Coefficients {
    pub ipc_base: f64,
    pub ipc_compute: f64,
    pub ipc_cache: f64,
    pub ipc_branch_penalty: f64,
    pub ipc_mem_stall: f64,
    pub smt_yield: f64,
    pub pkg_base: f64,
    pub pkg_per_cpu: f64,
    pub pkg_freq: f64,
    pub pkg_freq_exp: f64,
    pub pkg_avx_uplift: f64,
    pub core_per_cpu: f64,
    pub core_freq_exp: f64,
    pub ram_base: f64,
    pub ram_per_cpu: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HardwareModel {
    // DISCRETE TUNING AXES: THE CONFIGURATION SPACE IS THEIR PRODUCT
    pub freqs_khz: Vec<u64>,
    pub cores: Vec<u32>,
    pub smt: Vec<bool>,
    pub nominal_freq_khz: u64,
    pub coefficients: Coefficients,
}

impl HardwareModel {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("hardware model unavailable: {}", path.display()))?;
        let model: HardwareModel = serde_json::from_str(&raw)
            .with_context(|| format!("hardware model unparseable: {}", path.display()))?;
        anyhow::ensure!(
            !model.freqs_khz.is_empty() && !model.cores.is_empty() && !model.smt.is_empty(),
            "hardware model has an empty tuning axis: {}",
            path.display()
        );
        Ok(model)
    }

    pub fn min_freq(&self) -> u64 {
        *self.freqs_khz.iter().min().unwrap_or(&0)
    }

    pub fn max_freq(&self) -> u64 {
        *self.freqs_khz.iter().max().unwrap_or(&0)
    }

    pub fn min_cores(&self) -> u32 {
        *self.cores.iter().min().unwrap_or(&1)
    }

    // MAX PHYSICAL CORES. SMT SIBLING OF CORE i IS WORKER i + max_cores().
    pub fn max_cores(&self) -> u32 {
        *self.cores.iter().max().unwrap_or(&1)
    }

    fn freq_ratio(&self, freq_khz: u64) -> f64 {
        freq_khz as f64 / self.nominal_freq_khz as f64
    }

    // AGGREGATE INSTRUCTIONS PER CYCLE ACROSS ALL ENABLED CPUS.
    // MEMORY STALLS GROW WITH FREQUENCY (CORE OUTPACES DRAM), SMT SIBLINGS
    // YIELD LESS THAN A FULL CORE.
    pub fn ipc(&self, w: &WorkloadProfile, cpus: u32, freq_khz: u64, ht: bool) -> f64 {
        let k = &self.coefficients;
        let f = self.freq_ratio(freq_khz);
        let per_cpu = k.ipc_base + k.ipc_compute * w.compute_heaviness
            + k.ipc_cache * w.cache_heaviness
            - k.ipc_branch_penalty * w.branch_heaviness
            - k.ipc_mem_stall * w.memory_heaviness * f;
        let effective = if ht {
            cpus as f64 / 2.0 * k.smt_yield
        } else {
            cpus as f64
        };
        (per_cpu * effective).max(0.0)
    }

    // PACKAGE WATTS. SUPERLINEAR IN FREQUENCY (DVFS), AVX PULLS EXTRA CURRENT.
    pub fn pkg_power(&self, w: &WorkloadProfile, cpus: u32, freq_khz: u64) -> f64 {
        let k = &self.coefficients;
        let f = self.freq_ratio(freq_khz);
        let per_cpu = k.pkg_per_cpu + k.pkg_freq * f.powf(k.pkg_freq_exp);
        let p = k.pkg_base + cpus as f64 * per_cpu * (1.0 + k.pkg_avx_uplift * w.avx_heaviness);
        p.max(0.0)
    }

    // CORE-ONLY SHARE OF THE PACKAGE
    pub fn core_power(&self, _w: &WorkloadProfile, cpus: u32, freq_khz: u64) -> f64 {
        let k = &self.coefficients;
        let f = self.freq_ratio(freq_khz);
        (cpus as f64 * k.core_per_cpu * f.powf(k.core_freq_exp)).max(0.0)
    }

    // DRAM WATTS. SCALES WITH THE MEMORY-BOUND SHARE OF THE WORKLOAD.
    pub fn ram_power(&self, w: &WorkloadProfile, cpus: u32, _freq_khz: u64) -> f64 {
        let k = &self.coefficients;
        (k.ram_base + k.ram_per_cpu * cpus as f64 * w.memory_heaviness).max(0.0)
    }
}
