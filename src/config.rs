// PARSIMONY CONFIGURATION SPACE
// CANDIDATE ENUMERATION OVER freqs x cores x smt + PER-BENCHMARK CACHE
//
// A Configuration IS IDENTIFIED BY ITS (freq, cores, ht) TRIPLE ALONE.
// THE MODELLED FIELDS (ipc, power, tps, epr) ARE DERIVED AND EXCLUDED
// FROM EQUALITY -- THE CONTROLLER COMPARES TRIPLES TO DECIDE WHETHER A
// RECONFIGURATION MUST BE PUSHED TO THE ENGINE, AND SYNTHETIC ENTRIES
// CARRY PLACEHOLDER TELEMETRY FIELDS THAT MUST NOT BREAK THAT MATCH.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use log::warn;

use crate::model::{HardwareModel, UnknownBenchmark, WorkloadModel};
use crate::pareto::{pareto_front, Objective, Polarity};

#[derive(Debug, Clone, Copy)]
pub struct Configuration {
    pub freq_khz: u64,
    pub cores: u32,
    pub ht: bool,
    pub cpus: u32,
    pub ipc: f64,
    pub power_w: f64,
    pub tps: f64,
    pub epr: f64,
}

impl Configuration {
    pub fn key(&self) -> (u64, u32, bool) {
        (self.freq_khz, self.cores, self.ht)
    }
}

impl PartialEq for Configuration {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Configuration {}

impl Hash for Configuration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

// EVALUATE THE MODEL FOR EVERY POINT OF THE CARTESIAN PRODUCT.
// ENUMERATION ORDER IS AN IMPLEMENTATION DETAIL -- NOBODY DOWNSTREAM
// MAY RELY ON IT.
pub fn enumerate_configurations(
    hw: &HardwareModel,
    wl: &WorkloadModel,
    benchmark: &str,
) -> Result<Vec<Configuration>, UnknownBenchmark> {
    let w = wl.benchmark(benchmark)?;

    let mut out = Vec::with_capacity(hw.freqs_khz.len() * hw.cores.len() * hw.smt.len());
    for &freq_khz in &hw.freqs_khz {
        for &cores in &hw.cores {
            for &ht in &hw.smt {
                let cpus = if ht { 2 * cores } else { cores };
                let ipc = hw.ipc(w, cpus, freq_khz, ht);
                let power_w = hw.pkg_power(w, cpus, freq_khz) + hw.ram_power(w, cpus, freq_khz);
                // CYCLES/S DIVIDED BY CYCLES/TASK
                let tps = if ipc > 0.0 {
                    (freq_khz as f64 * 1000.0) / (w.ipt / ipc)
                } else {
                    0.0
                };
                let epr = if tps > 0.0 { power_w / tps } else { f64::INFINITY };
                out.push(Configuration { freq_khz, cores, ht, cpus, ipc, power_w, tps, epr });
            }
        }
    }
    Ok(out)
}

const OBJECTIVES: [Objective<Configuration>; 2] = [
    Objective { value: |c: &Configuration| c.power_w, polarity: Polarity::Min },
    Objective { value: |c: &Configuration| c.tps, polarity: Polarity::Max },
];

#[derive(Debug, Clone)]
pub struct CachedConfigurations {
    pub all: Vec<Configuration>,
    pub pareto: Vec<Configuration>,
}

// BUILT ONCE AT STARTUP, READ-ONLY AFTERWARDS. A BENCHMARK THE WORKLOAD
// MODEL DOES NOT KNOW IS SKIPPED -- THE CONTROLLER FALLS BACK TO THE
// SYNTHETIC MAX CONFIGURATION FOR MISSING ENTRIES.
#[derive(Debug, Default)]
pub struct ConfigurationSet {
    entries: HashMap<String, CachedConfigurations>,
}

impl ConfigurationSet {
    pub fn build<S: AsRef<str>>(hw: &HardwareModel, wl: &WorkloadModel, benchmarks: &[S]) -> Self {
        let mut entries = HashMap::new();
        for name in benchmarks {
            let name = name.as_ref();
            match enumerate_configurations(hw, wl, name) {
                Ok(all) => {
                    let pareto = pareto_front(&all, &OBJECTIVES);
                    entries.insert(name.to_string(), CachedConfigurations { all, pareto });
                }
                Err(e) => warn!("configuration cache: skipping benchmark: {e}"),
            }
        }
        Self { entries }
    }

    pub fn get(&self, benchmark: &str) -> Option<&CachedConfigurations> {
        self.entries.get(benchmark)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
