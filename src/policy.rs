// PARSIMONY OPERATING-POINT POLICY
// PURE DECISION LAYER: ZERO I/O, ZERO ENGINE DEPENDENCIES, RUNS OFFLINE
//
// THE SELECTION RULE: ABOVE THE TARGET RATE, MINIMISE POWER. BELOW IT,
// CLIMB THROUGHPUT GREEDILY UNTIL A FEASIBLE POINT APPEARS. WITH NO
// TARGET, JUST TAKE THE CHEAPEST CANDIDATE.

use crate::config::Configuration;
use crate::model::HardwareModel;

// RELATIVE BAND AROUND THE OFFERED RATE BEFORE THE CONTROLLER ADAPTS
pub const ADAPT_TOLERANCE: f64 = 0.05;

// SYNTHETIC CONFIGURATIONS EXIST TO COMMAND THE ENGINE, NOT TO BE
// RANKED -- THE MODELLED FIELDS ARE PLACEHOLDERS (1).

pub fn synth_max(hw: &HardwareModel) -> Configuration {
    let cores = hw.max_cores();
    Configuration {
        freq_khz: hw.max_freq(),
        cores,
        ht: true,
        cpus: 2 * cores,
        ipc: 1.0,
        power_w: 1.0,
        tps: 1.0,
        epr: 1.0,
    }
}

pub fn synth_idle(hw: &HardwareModel) -> Configuration {
    let cores = hw.min_cores();
    Configuration {
        freq_khz: hw.min_freq(),
        cores,
        ht: false,
        cpus: cores,
        ipc: 1.0,
        power_w: 1.0,
        tps: 1.0,
        epr: 1.0,
    }
}

// TRUE WHEN THE ACTIVE POINT'S MODELLED RATE IS OUTSIDE THE TOLERANCE
// BAND AROUND THE RATE THE ENGINE ACTUALLY NEEDS
pub fn adaptation_needed(active_tps: f64, needed: f64) -> bool {
    (needed - active_tps).abs() > ADAPT_TOLERANCE * needed
}

pub fn select(
    candidates: &[Configuration],
    target_tps: Option<f64>,
    seed: Option<Configuration>,
) -> Option<Configuration> {
    if candidates.len() == 1 {
        return Some(candidates[0]);
    }

    let mut best = seed;
    for &c in candidates {
        match target_tps {
            None => {
                // CHEAPEST WINS. ON A TIE KEEP THE INCUMBENT FOR STABILITY.
                if best.map_or(true, |b| c.power_w < b.power_w) {
                    best = Some(c);
                }
            }
            Some(target) => match best {
                None => best = Some(c),
                Some(b) => {
                    if c.tps >= target {
                        // FEASIBLE ALWAYS BEATS INFEASIBLE; AMONG FEASIBLE,
                        // CHEAPEST WINS
                        if b.tps < target || c.power_w < b.power_w {
                            best = Some(c);
                        }
                    } else if c.tps >= b.tps {
                        // NOT FEASIBLE YET: MOVE TOWARD THE TARGET
                        best = Some(c);
                    }
                }
            },
        }
    }
    best
}
