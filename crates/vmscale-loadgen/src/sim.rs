//! In-memory load generator.
//!
//! Answers the same endpoints as the real service. Each test runs for a
//! fixed virtual duration measured on the shared [`Clock`]; every `/log`
//! fetch appends one throughput sample proportional to the number of
//! registered endpoints.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use vmscale_core::Clock;

use crate::error::{LoadGenError, LoadGenResult};
use crate::transport::{HttpReply, LoadGenTransport};

const RPS_PER_ENDPOINT: f64 = 20.0;

#[derive(Debug)]
struct SimTest {
    kind: &'static str,
    started_at: DateTime<Utc>,
    endpoints: Vec<String>,
    samples: Vec<f64>,
}

#[derive(Debug, Default)]
struct SimLgState {
    next_id: u64,
    tests: BTreeMap<String, SimTest>,
    requests: Vec<String>,
    refuse_remaining: u32,
    reject_adds: bool,
}

/// Scripted load generator for tests and simulated runs.
pub struct SimLoadGenerator {
    clock: Arc<dyn Clock>,
    run_for: Duration,
    state: Mutex<SimLgState>,
}

impl SimLoadGenerator {
    /// Every test reports `[Test finished]` once `run_for` has elapsed.
    pub fn new(clock: Arc<dyn Clock>, run_for: Duration) -> Self {
        Self {
            clock,
            run_for,
            state: Mutex::new(SimLgState::default()),
        }
    }

    /// Refuse the next `n` requests at the connection level.
    pub fn refuse_connections(self, n: u32) -> Self {
        self.lock().refuse_remaining = n;
        self
    }

    /// Answer 503 to every `/test/horizontal/add` request.
    pub fn reject_additions(self) -> Self {
        self.lock().reject_adds = true;
        self
    }

    /// Every path-and-query received, in order.
    pub fn requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }

    /// Endpoints registered with a test.
    pub fn endpoints(&self, test_id: &str) -> Vec<String> {
        self.lock()
            .tests
            .get(test_id)
            .map(|t| t.endpoints.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimLgState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_finished(&self, test: &SimTest, now: DateTime<Utc>) -> bool {
        (now - test.started_at).to_std().unwrap_or_default() >= self.run_for
    }

    fn start_test(&self, state: &mut SimLgState, kind: &'static str, dns: &str) -> HttpReply {
        state.next_id += 1;
        let prefix = if kind == "warmup" { "warmup" } else { "test" };
        let test_id = format!("{prefix}.{}.log", state.next_id);
        state.tests.insert(
            test_id.clone(),
            SimTest {
                kind,
                started_at: self.clock.now(),
                endpoints: vec![dns.to_string()],
                samples: Vec::new(),
            },
        );
        HttpReply::new(
            200,
            format!("<a href='/log?name={test_id}'>Test</a> started against {dns}"),
        )
    }

    fn render_log(&self, test_id: &str, test: &mut SimTest) -> String {
        let now = self.clock.now();
        test.samples
            .push(RPS_PER_ENDPOINT * test.endpoints.len() as f64);

        let mut body = format!(
            "[Test]\ntype={}\ntestId={test_id}\nstartTime={}\n\n",
            test.kind,
            test.started_at.to_rfc3339_opts(SecondsFormat::Millis, false)
        );
        for (minute, rps) in test.samples.iter().enumerate() {
            body.push_str(&format!("[Minute {}]\n", minute + 1));
            for endpoint in &test.endpoints {
                body.push_str(&format!("{endpoint}={RPS_PER_ENDPOINT:.2}\n"));
            }
            body.push_str(&format!("[Current rps={rps:.1}]\n\n"));
        }
        if self.is_finished(test, now) {
            body.push_str("[Test finished]\n");
        }
        body
    }
}

fn query_param<'a>(path_and_query: &'a str, key: &str) -> Option<&'a str> {
    let (_, query) = path_and_query.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

#[async_trait]
impl LoadGenTransport for SimLoadGenerator {
    async fn get(&self, host: &str, path_and_query: &str) -> LoadGenResult<HttpReply> {
        let mut state = self.lock();
        state.requests.push(path_and_query.to_string());

        if state.refuse_remaining > 0 {
            state.refuse_remaining -= 1;
            return Err(LoadGenError::Transport(format!("connect {host}: connection refused")));
        }

        let path = path_and_query
            .split_once('?')
            .map_or(path_and_query, |(p, _)| p);
        let dns = query_param(path_and_query, "dns");

        let reply = match (path, dns) {
            ("/test/horizontal", Some(dns)) => self.start_test(&mut state, "horizontal", dns),
            ("/autoscaling", Some(dns)) => self.start_test(&mut state, "autoscaling", dns),
            ("/warmup", Some(dns)) => self.start_test(&mut state, "warmup", dns),
            ("/test/horizontal/add", Some(dns)) => {
                let now = self.clock.now();
                let reject = state.reject_adds;
                // Additions go to the most recent running horizontal test.
                let target = state
                    .tests
                    .values_mut()
                    .rev()
                    .find(|t| t.kind == "horizontal");
                match target {
                    Some(test) if !reject && !self.is_finished(test, now) => {
                        test.endpoints.push(dns.to_string());
                        HttpReply::new(200, format!("added {dns}"))
                    }
                    Some(_) => HttpReply::new(503, "cannot add instance"),
                    None => HttpReply::new(400, "no horizontal test running"),
                }
            }
            ("/log", _) => {
                let name = query_param(path_and_query, "name").unwrap_or_default().to_string();
                match state.tests.get_mut(&name) {
                    Some(test) => HttpReply::new(200, self.render_log(&name, test)),
                    None => HttpReply::new(404, format!("no such log {name}")),
                }
            }
            _ => HttpReply::new(404, "not found"),
        };
        Ok(reply)
    }
}
