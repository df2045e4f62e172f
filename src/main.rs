// PARSIMONY v1.0.0 -- ENERGY-UTILITY FEEDBACK CONTROLLER
// MODEL-DRIVEN CORE/FREQUENCY/SMT TUNING FOR A TASK-PROCESSING ENGINE
//
// ONE CONTROL THREAD TICKS AT 1 HZ, ONE HTTP THREAD SERVES THE CONTROL
// API. BOTH SHARE THE CONTROLLER BEHIND A SINGLE MUTEX: THE TICK BODY
// HOLDS IT WHOLE, API HANDLERS HOLD IT FOR MICROSECONDS. SIGINT WAKES
// THE TICK SLEEP EARLY; THE API SOCKET CLOSES AFTER THE CONTROL THREAD
// HAS JOINED.

mod check;

use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use parsimony::api;
use parsimony::config::ConfigurationSet;
use parsimony::controller::Controller;
use parsimony::engine::EngineClient;
use parsimony::model::{HardwareModel, WorkloadModel};
use parsimony::rapl::RaplReader;
use parsimony::remote::RemoteEngine;
use parsimony::telemetry::{Telemetry, DEFAULT_HISTORY_WINDOW, DEFAULT_REFRESH_INTERVAL};

const TICK: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "parsimony")]
#[command(about = "PARSIMONY -- ENERGY-UTILITY FEEDBACK CONTROLLER")]
struct Cli {
    // ENGINE HOST (BARE HOST OR scheme://host)
    #[arg(long, default_value = "localhost")]
    url: String,

    // ENGINE CONTROL PORT
    #[arg(long, default_value_t = 4855)]
    port: u16,

    #[arg(long, default_value = "ctrl")]
    user: String,

    #[arg(long, default_value = "")]
    passwd: String,

    // ACCEPTED FOR CLI COMPATIBILITY; THIS BUILD IS ALWAYS HEADLESS
    #[arg(long)]
    nocurses: bool,

    // DIRECTORY HOLDING hardware.json AND workloads.json
    #[arg(long, default_value = "models")]
    models: PathBuf,

    // CONTROL API BIND ADDRESS
    #[arg(long, default_value = "localhost:5000")]
    listen: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    // PROBE THE ENVIRONMENT: RAPL SYSFS, ENGINE REACHABILITY
    Check,
}

// PROCESS-WIDE SHUTDOWN EVENT. TRIGGERING WAKES THE TICK SLEEP EARLY.
struct Shutdown {
    fired: Mutex<bool>,
    cv: Condvar,
}

impl Shutdown {
    fn new() -> Self {
        Self { fired: Mutex::new(false), cv: Condvar::new() }
    }

    fn trigger(&self) {
        *self.fired.lock().unwrap() = true;
        self.cv.notify_all();
    }

    fn is_set(&self) -> bool {
        *self.fired.lock().unwrap()
    }

    fn wait(&self, timeout: Duration) {
        let fired = self.fired.lock().unwrap();
        if !*fired {
            let _ = self
                .cv
                .wait_timeout_while(fired, timeout, |fired| !*fired)
                .unwrap();
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Some(Command::Check) = cli.command {
        return check::run(&cli.url, cli.port, &cli.user, &cli.passwd);
    }

    println!("PARSIMONY v1.0.0");

    // MODELS FIRST: A MISSING MODEL IS FATAL BEFORE WE TOUCH THE ENGINE
    let hw = HardwareModel::load(&cli.models.join("hardware.json"))?;
    let wl = WorkloadModel::load(&cli.models.join("workloads.json"))?;
    println!(
        "MODEL AXES:      {} freqs x {} core counts x {} smt",
        hw.freqs_khz.len(),
        hw.cores.len(),
        hw.smt.len()
    );

    let mut engine = RemoteEngine::connect(&cli.url, cli.port, &cli.user, &cli.passwd)?;
    println!(
        "ENGINE:          {}:{} (session '{}')",
        cli.url,
        cli.port,
        engine.session_name()
    );

    // TAKE OVER FROM THE ENGINE'S BUILT-IN CONTROL LOOP
    engine.energy_management(false, false)?;

    let benchmarks = engine.benchmarks()?;
    let cache = ConfigurationSet::build(&hw, &wl, &benchmarks);
    info!(
        "configuration cache ready for {} of {} session benchmarks",
        cache.len(),
        benchmarks.len()
    );

    let rapl = match RaplReader::open() {
        Ok(reader) => Some(reader),
        Err(e) => {
            warn!("rapl unavailable, power actuals will read 0: {e:#}");
            None
        }
    };
    let telemetry = Telemetry::new(DEFAULT_REFRESH_INTERVAL, DEFAULT_HISTORY_WINDOW, rapl);

    if !cli.nocurses {
        info!("no dashboard in this build, running headless");
    }

    let controller = Arc::new(Mutex::new(Controller::new(engine, hw, cache, telemetry)));
    let shutdown = Arc::new(Shutdown::new());

    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || shutdown.trigger()).context("install signal handler")?;
    }

    let server = Arc::new(
        tiny_http::Server::http(&cli.listen)
            .map_err(|e| anyhow::anyhow!("bind control api on {}: {e}", cli.listen))?,
    );

    let api_thread = {
        let controller = controller.clone();
        let shutdown = shutdown.clone();
        let server = server.clone();
        thread::spawn(move || api::serve(&server, controller, move || shutdown.is_set()))
    };

    let control_thread = {
        let controller = controller.clone();
        let shutdown = shutdown.clone();
        thread::spawn(move || control_loop(controller, shutdown))
    };

    println!("PARSIMONY IS ACTIVE (CTRL+C TO EXIT)");

    // CONTROL THREAD FIRST, THEN THE API SOCKET -- IN-FLIGHT HANDLERS
    // FINISH BEFORE THE LISTENER GOES AWAY
    control_thread.join().ok();
    server.unblock();
    api_thread.join().ok();

    println!("PARSIMONY OUT.");
    Ok(())
}

fn control_loop<E: EngineClient>(controller: Arc<Mutex<Controller<E>>>, shutdown: Arc<Shutdown>) {
    while !shutdown.is_set() {
        let started = Instant::now();
        controller.lock().unwrap().tick(started);
        shutdown.wait(TICK.saturating_sub(started.elapsed()));
    }
}
