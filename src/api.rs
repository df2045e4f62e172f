// PARSIMONY CONTROL API
// SMALL HTTP SURFACE: STATUS, ECL TOGGLE, CANDIDATE VIEW, BENCHMARK SWITCH
//
// SYNCHRONOUS REQUEST LOOP ON ITS OWN THREAD. EVERY HANDLER TAKES THE
// CONTROLLER MUTEX FOR THE DURATION OF ITS MUTATION OR SNAPSHOT READ,
// SO NOTHING EVER OBSERVES A HALF-FINISHED TICK. BAD PATH SEGMENTS AND
// DOWNSTREAM REFUSALS ARE 400 WITH NO STATE CHANGE.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{info, warn};
use serde_json::{json, Value};
use tiny_http::{Header, Method, Request, Response, ResponseBox, Server};

use crate::controller::{Controller, ControllerState};
use crate::engine::EngineClient;

const RECV_TIMEOUT: Duration = Duration::from_millis(250);

fn json_response(status: u16, value: Value) -> ResponseBox {
    let header = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
        .expect("static header");
    Response::from_string(value.to_string())
        .with_status_code(status)
        .with_header(header)
        .boxed()
}

fn ok() -> ResponseBox {
    json_response(200, json!({"ok": true}))
}

fn bad_request(reason: &str) -> ResponseBox {
    json_response(400, json!({"ok": false, "error": reason}))
}

// <0|1> PATH SEGMENT
fn parse_flag(segment: &str) -> Option<bool> {
    match segment.parse::<u8>() {
        Ok(0) => Some(false),
        Ok(1) => Some(true),
        _ => None,
    }
}

// LEVELS ARE 0-100: FREQUENCY LINEAR BETWEEN THE AXIS ENDPOINTS,
// PERFORMANCE AND EFFICIENCY SCALED TO THE BEST CANDIDATE IN THE LIST
pub fn configurations_payload(state: &ControllerState, freq_min: u64, freq_max: u64) -> Value {
    let candidates = &state.all_candidates;

    let max_tps = candidates.iter().map(|c| c.tps).fold(0.0_f64, f64::max);
    let ee = |epr: f64| if epr.is_finite() && epr > 0.0 { 1.0 / epr } else { 0.0 };
    let max_ee = candidates.iter().map(|c| ee(c.epr)).fold(0.0_f64, f64::max);
    let freq_span = freq_max.saturating_sub(freq_min);

    let list: Vec<Value> = candidates
        .iter()
        .map(|c| {
            let freq_level = if freq_span > 0 {
                100.0 * (c.freq_khz.saturating_sub(freq_min)) as f64 / freq_span as f64
            } else {
                100.0
            };
            let rel_perf = if max_tps > 0.0 { 100.0 * c.tps / max_tps } else { 0.0 };
            let rel_ee = if max_ee > 0.0 { 100.0 * ee(c.epr) / max_ee } else { 0.0 };
            json!({
                "cpuCount": c.cpus,
                "avgCoreFrequency": c.freq_khz,
                "avgCoreFrequencyLevel": freq_level,
                "uncoreFrequency": 2_400_000,
                "uncoreFrequencyLevel": 100,
                "relativePerformance": rel_perf,
                "relativeEE": rel_ee,
                "active": state.active_config.as_ref() == Some(c),
            })
        })
        .collect();

    json!({
        "sockets": [{
            "logicalId": 0,
            "adapting": false,
            "reevalLeft": 0,
            "configurations": list,
        }]
    })
}

fn route<E: EngineClient>(
    method: &Method,
    path: &[&str],
    controller: &Arc<Mutex<Controller<E>>>,
) -> ResponseBox {
    match (method, path) {
        (Method::Get, []) => {
            let location = Header::from_bytes(&b"Location"[..], &b"/servicestatus"[..])
                .expect("static header");
            Response::empty(302).with_header(location).boxed()
        }

        (Method::Get, ["servicestatus"]) => {
            let ctl = controller.lock().unwrap();
            json_response(200, json!({"adaptOn": false, "eclOn": ctl.state.enabled}))
        }

        (Method::Post, ["services", "eclon", flag]) => match parse_flag(flag) {
            Some(on) => {
                controller.lock().unwrap().set_enabled(on);
                ok()
            }
            None => bad_request("flag must be 0 or 1"),
        },

        // RESERVED: ACCEPTED AND VALIDATED, BUT A NO-OP
        (Method::Post, ["services", "adapton", flag]) => match parse_flag(flag) {
            Some(_) => ok(),
            None => bad_request("flag must be 0 or 1"),
        },

        (Method::Get, ["configurations"]) => {
            let ctl = controller.lock().unwrap();
            let (freq_min, freq_max) = (ctl.hardware().min_freq(), ctl.hardware().max_freq());
            json_response(200, configurations_payload(&ctl.state, freq_min, freq_max))
        }

        (Method::Get, ["benchmark", "sessions"]) => {
            let ctl = controller.lock().unwrap();
            json_response(
                200,
                json!({"managedBenchmarks": [{"name": ctl.session_name()}]}),
            )
        }

        (Method::Post, ["benchmark", "setbenchmark", session, bench]) => {
            let mut ctl = controller.lock().unwrap();
            match ctl.activate_benchmark(session, bench) {
                Ok(()) => ok(),
                Err(e) => bad_request(&format!("{e:#}")),
            }
        }

        (Method::Post, ["benchmark", "setprofile", session, profile]) => {
            let mut ctl = controller.lock().unwrap();
            match ctl.activate_profile(session, profile) {
                Ok(()) => ok(),
                Err(e) => bad_request(&format!("{e:#}")),
            }
        }

        _ => json_response(404, json!({"ok": false, "error": "no such route"})),
    }
}

// REQUEST LOOP. RETURNS WHEN should_stop FLIPS; THE IN-FLIGHT REQUEST
// (IF ANY) IS ANSWERED FIRST.
pub fn serve<E, F>(server: &Server, controller: Arc<Mutex<Controller<E>>>, should_stop: F)
where
    E: EngineClient,
    F: Fn() -> bool,
{
    info!("control api listening on {}", server.server_addr());
    loop {
        match server.recv_timeout(RECV_TIMEOUT) {
            Ok(Some(request)) => handle(request, &controller),
            Ok(None) => {
                if should_stop() {
                    break;
                }
            }
            Err(e) => {
                warn!("control api accept failed: {e}");
                break;
            }
        }
    }
}

fn handle<E: EngineClient>(request: Request, controller: &Arc<Mutex<Controller<E>>>) {
    let method = request.method().clone();
    let url = request.url().to_string();
    let path_only = url.split('?').next().unwrap_or("");
    let path: Vec<&str> = path_only.split('/').filter(|s| !s.is_empty()).collect();

    let response = route(&method, &path, controller);
    if let Err(e) = request.respond(response) {
        warn!("control api respond failed: {e}");
    }
}
