// PARSIMONY BENCHMARK STATE WATCHER
// PER-TICK SNAPSHOT OF EVERY BENCHMARK'S (PHASE, ACTIVE) + EDGE FLAG
//
// THE CONTROLLER ONLY RESELECTS ON EDGES, SO "CHANGED SINCE LAST
// REFRESH" IS THE WATCHER'S WHOLE JOB. THE FIRST REFRESH AFTER STARTUP
// IS ALWAYS AN EDGE.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::engine::{BenchmarkPhase, BenchmarkStatus, EngineClient};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BenchmarkSnapshot {
    benchmarks: BTreeMap<String, BenchmarkStatus>,
}

impl BenchmarkSnapshot {
    pub fn get(&self, name: &str) -> Option<&BenchmarkStatus> {
        self.benchmarks.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BenchmarkStatus)> {
        self.benchmarks.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn any_loading(&self) -> bool {
        self.benchmarks.values().any(|s| s.phase == BenchmarkPhase::Loading)
    }

    pub fn running(&self) -> Vec<&str> {
        self.benchmarks
            .iter()
            .filter(|(_, s)| s.phase == BenchmarkPhase::Running)
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Edges {
    pub changed: bool,
    pub snapshot: BenchmarkSnapshot,
}

#[derive(Debug, Default)]
pub struct StateWatcher {
    last: Option<BenchmarkSnapshot>,
}

impl StateWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refresh<E: EngineClient + ?Sized>(&mut self, engine: &mut E) -> Result<Edges> {
        engine.update_session()?;

        let mut benchmarks = BTreeMap::new();
        for name in engine.benchmarks()? {
            let status = engine.benchmark_status(&name)?;
            benchmarks.insert(name, status);
        }
        let snapshot = BenchmarkSnapshot { benchmarks };

        let changed = self.last.as_ref() != Some(&snapshot);
        self.last = Some(snapshot.clone());
        Ok(Edges { changed, snapshot })
    }
}
