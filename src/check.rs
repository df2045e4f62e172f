// PARSIMONY ENVIRONMENT CHECK
// PROBES THE PIECES THE CONTROLLER NEEDS BEFORE A REAL RUN

use anyhow::Result;

use parsimony::engine::EngineClient;
use parsimony::rapl::RaplReader;
use parsimony::remote::RemoteEngine;

pub fn run(url: &str, port: u16, user: &str, passwd: &str) -> Result<()> {
    println!("PARSIMONY ENVIRONMENT CHECK");
    println!();

    let mut ok = true;

    // RAPL IS OPTIONAL -- WITHOUT IT POWER ACTUALS READ 0
    match RaplReader::open() {
        Ok(reader) => match reader.read() {
            Ok(_) => println!("  {:<24}OK", "rapl sysfs"),
            Err(e) => println!("  {:<24}UNREADABLE ({e:#})", "rapl sysfs"),
        },
        Err(_) => println!("  {:<24}MISSING (power actuals will read 0)", "rapl sysfs"),
    }

    match RemoteEngine::connect(url, port, user, passwd) {
        Ok(mut engine) => {
            println!("  {:<24}OK (session '{}')", "engine", engine.session_name());
            match engine.workers() {
                Ok(workers) => println!("  {:<24}{}", "workers", workers.len()),
                Err(e) => {
                    println!("  {:<24}FAILED ({e:#})", "workers");
                    ok = false;
                }
            }
            match engine.benchmarks() {
                Ok(benchmarks) => println!("  {:<24}{}", "benchmarks", benchmarks.len()),
                Err(e) => {
                    println!("  {:<24}FAILED ({e:#})", "benchmarks");
                    ok = false;
                }
            }
        }
        Err(e) => {
            println!("  {:<24}UNREACHABLE ({e:#})", "engine");
            ok = false;
        }
    }

    println!();
    if ok {
        println!("ALL CHECKS PASSED");
        Ok(())
    } else {
        println!("SOME CHECKS FAILED");
        std::process::exit(1);
    }
}
