// PARSIMONY v1.0.0 -- ENERGY-UTILITY FEEDBACK CONTROLLER
// MODEL-DRIVEN CPU TOPOLOGY TUNING FOR A TASK-PROCESSING ENGINE
//
// THE ENGINE RUNS BENCHMARKS, PARSIMONY DECIDES HOW MANY CORES, WHICH
// FREQUENCY, AND WHETHER SMT. CANDIDATES COME FROM AN ANALYTICAL MODEL,
// GET REDUCED TO A POWER/THROUGHPUT PARETO FRONTIER, AND A 1 HZ CONTROL
// LOOP PICKS THE OPERATING POINT THAT SUSTAINS THE OFFERED TASK RATE
// FOR THE FEWEST WATTS.

pub mod api;
pub mod config;
pub mod controller;
pub mod engine;
pub mod model;
pub mod pareto;
pub mod policy;
pub mod rapl;
pub mod remote;
pub mod telemetry;
pub mod watcher;
