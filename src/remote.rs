// PARSIMONY REMOTE ENGINE CLIENT
// NEWLINE-DELIMITED JSON OVER TCP
//
// ONE REQUEST, ONE RESPONSE LINE. EVERY RESPONSE CARRIES "ok"; A FALSE
// "ok" TURNS THE ENGINE'S ERROR STRING INTO AN anyhow ERROR FOR THE
// CALLER TO ABSORB AT THE TICK BOUNDARY. CONNECT AUTHENTICATES AND
// OPENS THE ENGINE'S MANAGED SESSION -- FAILURE THERE IS FATAL.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};

use crate::engine::{BenchmarkPhase, BenchmarkStatus, CounterValue, EngineClient, Worker};

pub struct RemoteEngine {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    session: String,
}

impl RemoteEngine {
    pub fn connect(url: &str, port: u16, user: &str, passwd: &str) -> Result<Self> {
        // ACCEPT BOTH BARE HOSTS AND scheme://host URLS
        let host = url.rsplit("://").next().unwrap_or(url).trim_end_matches('/');

        let stream = TcpStream::connect((host, port))
            .with_context(|| format!("engine unreachable at {host}:{port}"))?;
        stream.set_nodelay(true).ok();
        let reader = BufReader::new(stream.try_clone().context("clone engine stream")?);

        let mut engine = Self {
            reader,
            writer: stream,
            session: String::new(),
        };

        engine
            .call(json!({"op": "hello", "user": user, "passwd": passwd}))
            .context("engine authentication failed")?;

        // THE ENGINE MANAGES EXACTLY ONE SESSION FOR US
        let resp = engine.call(json!({"op": "session.list"}))?;
        let name = resp["sessions"]
            .as_array()
            .and_then(|s| s.first())
            .and_then(|s| s["name"].as_str())
            .context("engine reports no session")?
            .to_string();
        engine.call(json!({"op": "session.open", "name": name}))?;
        engine.session = name;

        Ok(engine)
    }

    fn call(&mut self, request: Value) -> Result<Value> {
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).context("engine send")?;

        let mut reply = String::new();
        let n = self.reader.read_line(&mut reply).context("engine recv")?;
        if n == 0 {
            bail!("engine closed the connection");
        }
        let value: Value = serde_json::from_str(reply.trim()).context("engine reply unparseable")?;
        if !value["ok"].as_bool().unwrap_or(false) {
            let msg = value["error"].as_str().unwrap_or("unspecified engine error");
            bail!("engine refused {}: {msg}", request["op"].as_str().unwrap_or("?"));
        }
        Ok(value)
    }
}

impl EngineClient for RemoteEngine {
    fn session_name(&self) -> &str {
        &self.session
    }

    fn workers(&mut self) -> Result<Vec<Worker>> {
        let resp = self.call(json!({"op": "workers"}))?;
        let workers = serde_json::from_value(resp["workers"].clone()).context("workers payload")?;
        Ok(workers)
    }

    fn enable_worker(&mut self, local_id: u32) -> Result<()> {
        self.call(json!({"op": "worker.enable", "localId": local_id}))?;
        Ok(())
    }

    fn disable_worker(&mut self, local_id: u32) -> Result<()> {
        self.call(json!({"op": "worker.disable", "localId": local_id}))?;
        Ok(())
    }

    fn set_frequency(&mut self, local_id: u32, freq_khz: u64) -> Result<()> {
        self.call(json!({"op": "worker.frequency", "localId": local_id, "khz": freq_khz}))?;
        Ok(())
    }

    fn counters(&mut self) -> Result<Vec<String>> {
        let resp = self.call(json!({"op": "counters"}))?;
        let names = serde_json::from_value(resp["counters"].clone()).context("counters payload")?;
        Ok(names)
    }

    fn counter_values(&mut self, counter: &str, refresh: bool) -> Result<Vec<CounterValue>> {
        let resp = self.call(json!({"op": "monitor.values", "counter": counter, "refresh": refresh}))?;
        let values = serde_json::from_value(resp["values"].clone()).context("monitor payload")?;
        Ok(values)
    }

    fn benchmarks(&mut self) -> Result<Vec<String>> {
        let resp = self.call(json!({"op": "session.benchmarks"}))?;
        let names = serde_json::from_value(resp["benchmarks"].clone()).context("benchmarks payload")?;
        Ok(names)
    }

    fn benchmark_status(&mut self, name: &str) -> Result<BenchmarkStatus> {
        let resp = self.call(json!({"op": "benchmark.status", "name": name}))?;
        let phase: BenchmarkPhase =
            serde_json::from_value(resp["state"].clone()).unwrap_or(BenchmarkPhase::Unknown);
        Ok(BenchmarkStatus {
            phase,
            active: resp["active"].as_bool().unwrap_or(false),
        })
    }

    fn activate_benchmark(&mut self, name: &str) -> Result<()> {
        self.call(json!({"op": "session.activateBenchmark", "id": name}))?;
        Ok(())
    }

    fn activate_profile(&mut self, name: &str) -> Result<()> {
        self.call(json!({"op": "session.activateProfile", "id": name}))?;
        Ok(())
    }

    fn update_session(&mut self) -> Result<()> {
        self.call(json!({"op": "session.update"}))?;
        Ok(())
    }

    fn energy_management(&mut self, run_loop: bool, adapt: bool) -> Result<()> {
        self.call(json!({"op": "energyManagement", "loop": run_loop, "adapt": adapt}))?;
        Ok(())
    }
}
