// PARSIMONY RAPL READER
// POWERCAP SYSFS ENERGY COUNTERS, SNAPSHOT DIFFS, WRAPAROUND HANDLING
//
// ONE DOMAIN PER intel-rapl:N DIRECTORY; THE PACKAGE COUNTER SITS AT
// THE DOMAIN ROOT AND EACH intel-rapl:N:M SUBDIRECTORY ADDS A NAMED
// SUBCOUNTER (dram, core, uncore). COUNTERS ACCUMULATE MICROJOULES AND
// WRAP AT max_energy_range_uj -- THE DIFF COMPENSATES FOR ONE WRAP.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

const RAPL_ROOT: &str = "/sys/class/powercap/intel-rapl";

pub const CTR_PACKAGE: &str = "package-0";
pub const CTR_DRAM: &str = "dram";

fn read_trimmed(path: &Path) -> Result<String> {
    Ok(fs::read_to_string(path)
        .with_context(|| format!("read {}", path.display()))?
        .trim()
        .to_string())
}

fn read_u64(path: &Path) -> Result<u64> {
    read_trimmed(path)?
        .parse()
        .with_context(|| format!("parse {}", path.display()))
}

#[derive(Debug, Clone, Copy)]
pub struct CounterReading {
    pub uj: u64,
    pub max_uj: u64,
}

#[derive(Debug, Clone, Default)]
pub struct DomainReading {
    counters: BTreeMap<String, CounterReading>,
}

impl DomainReading {
    pub fn counter(&self, name: &str) -> Option<&CounterReading> {
        self.counters.get(name)
    }
}

#[derive(Debug, Clone)]
pub struct RaplSnapshot {
    pub taken: Instant,
    domains: BTreeMap<u32, DomainReading>,
}

impl RaplSnapshot {
    pub fn domain(&self, id: u32) -> Option<&DomainReading> {
        self.domains.get(&id)
    }

    // DELTA BETWEEN TWO SNAPSHOTS, ORDERED BY TIMESTAMP
    pub fn diff(&self, other: &RaplSnapshot) -> RaplDelta {
        let (earlier, later) = if self.taken < other.taken {
            (self, other)
        } else {
            (other, self)
        };

        let mut domains = BTreeMap::new();
        for (id, e_dom) in &earlier.domains {
            let Some(l_dom) = later.domains.get(id) else { continue };
            let mut counters = BTreeMap::new();
            for (name, e_ctr) in &e_dom.counters {
                let Some(l_ctr) = l_dom.counters.get(name) else { continue };
                // COUNTER WRAPPED AT MOST ONCE BETWEEN SNAPSHOTS
                let uj = if l_ctr.uj < e_ctr.uj {
                    l_ctr.max_uj - e_ctr.uj + l_ctr.uj
                } else {
                    l_ctr.uj - e_ctr.uj
                };
                counters.insert(name.clone(), CounterDelta { uj, elapsed: later.taken - earlier.taken });
            }
            domains.insert(*id, DomainDelta { counters });
        }

        RaplDelta {
            taken: later.taken,
            elapsed: later.taken - earlier.taken,
            domains,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CounterDelta {
    pub uj: u64,
    pub elapsed: Duration,
}

impl CounterDelta {
    pub fn joules(&self) -> f64 {
        self.uj as f64 / 1_000_000.0
    }

    pub fn watts(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.joules() / secs
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DomainDelta {
    counters: BTreeMap<String, CounterDelta>,
}

impl DomainDelta {
    pub fn counter(&self, name: &str) -> Option<&CounterDelta> {
        self.counters.get(name)
    }
}

#[derive(Debug, Clone)]
pub struct RaplDelta {
    pub taken: Instant,
    pub elapsed: Duration,
    domains: BTreeMap<u32, DomainDelta>,
}

impl RaplDelta {
    pub fn domain(&self, id: u32) -> Option<&DomainDelta> {
        self.domains.get(&id)
    }

    // PACKAGE + DRAM WATTS OF SOCKET 0 -- THE QUANTITY THE CONTROLLER
    // MODELS. MISSING COUNTERS CONTRIBUTE 0.
    pub fn package_and_dram_watts(&self) -> f64 {
        let Some(dom) = self.domain(0) else { return 0.0 };
        let pkg = dom.counter(CTR_PACKAGE).map_or(0.0, CounterDelta::watts);
        let dram = dom.counter(CTR_DRAM).map_or(0.0, CounterDelta::watts);
        pkg + dram
    }
}

pub struct RaplReader {
    root: PathBuf,
}

impl RaplReader {
    pub fn open() -> Result<Self> {
        Self::open_at(Path::new(RAPL_ROOT))
    }

    pub fn open_at(root: &Path) -> Result<Self> {
        anyhow::ensure!(root.exists(), "no RAPL sysfs interface at {}", root.display());
        Ok(Self { root: root.to_path_buf() })
    }

    fn read_counter(dir: &Path) -> Result<(String, CounterReading)> {
        let name = read_trimmed(&dir.join("name"))?;
        let uj = read_u64(&dir.join("energy_uj"))?;
        let max_uj = read_u64(&dir.join("max_energy_range_uj"))?;
        Ok((name, CounterReading { uj, max_uj }))
    }

    pub fn read(&self) -> Result<RaplSnapshot> {
        let taken = Instant::now();
        let mut domains = BTreeMap::new();

        for entry in fs::read_dir(&self.root).with_context(|| format!("scan {}", self.root.display()))? {
            let entry = entry?;
            let fname = entry.file_name();
            let fname = fname.to_string_lossy();
            let Some(rest) = fname.strip_prefix("intel-rapl:") else { continue };
            let Ok(id) = rest.parse::<u32>() else { continue };

            let mut reading = DomainReading::default();
            let (name, ctr) = Self::read_counter(&entry.path())?;
            reading.counters.insert(name, ctr);

            for sub in fs::read_dir(entry.path())? {
                let sub = sub?;
                if sub.file_name().to_string_lossy().starts_with("intel-rapl:")
                    && sub.path().is_dir()
                {
                    let (name, ctr) = Self::read_counter(&sub.path())?;
                    reading.counters.insert(name, ctr);
                }
            }
            domains.insert(id, reading);
        }

        Ok(RaplSnapshot { taken, domains })
    }
}
