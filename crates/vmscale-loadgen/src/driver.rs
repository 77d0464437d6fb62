//! Test session driver.
//!
//! Starts tests on the load generator, polls their logs, and submits
//! additional web-service endpoints while a horizontal test runs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use vmscale_core::{Clock, Probe, Transient, WaitPolicy, WaitSettings, retry_transient, wait_until};

use crate::error::{LoadGenError, LoadGenResult};
use crate::log_doc::{LogDocument, extract_test_id};
use crate::transport::LoadGenTransport;

/// The kinds of test the load generator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestKind {
    Horizontal,
    AutoScaling,
    Warmup,
}

impl TestKind {
    fn init_path(&self) -> &'static str {
        match self {
            TestKind::Horizontal => "/test/horizontal",
            TestKind::AutoScaling => "/autoscaling",
            TestKind::Warmup => "/warmup",
        }
    }
}

impl std::fmt::Display for TestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TestKind::Horizontal => "horizontal",
            TestKind::AutoScaling => "autoscaling",
            TestKind::Warmup => "warmup",
        };
        write!(f, "{s}")
    }
}

/// A running test. Only the driver mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct TestSession {
    pub kind: TestKind,
    pub test_id: String,
    pub started_at: DateTime<Utc>,
    pub last_throughput: f64,
    pub complete: bool,
}

/// One observation of a running test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollResult {
    pub throughput: f64,
    pub elapsed_since_start: Duration,
    pub complete: bool,
}

/// Outcome of submitting an extra endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Accepted,
    /// The test finished first; nothing was submitted.
    AlreadyComplete,
}

pub struct TestSessionDriver {
    transport: Arc<dyn LoadGenTransport>,
    clock: Arc<dyn Clock>,
    lg_host: String,
    init: WaitPolicy,
    retry: WaitPolicy,
    log_dir: Option<PathBuf>,
}

impl TestSessionDriver {
    pub fn new(
        transport: Arc<dyn LoadGenTransport>,
        clock: Arc<dyn Clock>,
        lg_host: impl Into<String>,
        waits: &WaitSettings,
    ) -> Self {
        Self {
            transport,
            clock,
            lg_host: lg_host.into(),
            init: waits.test_init,
            retry: waits.transient_retry,
            log_dir: None,
        }
    }

    /// Mirror every fetched log into `<dir>/<test id>.log`.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn lg_host(&self) -> &str {
        &self.lg_host
    }

    /// Start a test against `endpoint` and return its session.
    ///
    /// Connection failures and non-200 replies are retried under the
    /// initialization policy. Horizontal tests take their start time from
    /// the log's `[Test]` section; other kinds start at the local clock.
    pub async fn start(&self, kind: TestKind, endpoint: &str) -> LoadGenResult<TestSession> {
        let path = format!("{}?dns={endpoint}", kind.init_path());
        let what = format!("{kind} test initialization");

        let body = wait_until(self.clock.as_ref(), &self.init, &what, || {
            self.probe_initialized(kind, &path)
        })
        .await?;

        let test_id = extract_test_id(&body)?;

        let started_at = if kind == TestKind::Horizontal {
            let what = format!("start time of {test_id}");
            wait_until(self.clock.as_ref(), &self.init, &what, || {
                self.probe_start_time(&test_id)
            })
            .await?
        } else {
            self.clock.now()
        };

        info!(%kind, test_id = %test_id, %endpoint, %started_at, "test started");
        Ok(TestSession {
            kind,
            test_id,
            started_at,
            last_throughput: 0.0,
            complete: false,
        })
    }

    /// Fetch the log once and update the session from it.
    pub async fn poll(&self, session: &mut TestSession) -> LoadGenResult<PollResult> {
        let what = format!("log {}", session.test_id);
        let doc = retry_transient(self.clock.as_ref(), &self.retry, &what, || {
            self.fetch_log(&session.test_id)
        })
        .await?;
        self.apply(session, &doc)
    }

    /// Submit another endpoint to a running horizontal test.
    ///
    /// Retries until the load generator accepts it or the test completes.
    pub async fn register_additional_endpoint(
        &self,
        session: &mut TestSession,
        endpoint: &str,
    ) -> LoadGenResult<Submission> {
        if session.kind != TestKind::Horizontal {
            return Err(LoadGenError::Protocol(format!(
                "{} tests do not accept additional endpoints",
                session.kind
            )));
        }
        if session.complete {
            return Ok(Submission::AlreadyComplete);
        }

        let path = format!("/test/horizontal/add?dns={endpoint}");
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            match self.transport.get(&self.lg_host, &path).await {
                Ok(reply) if reply.is_ok() => {
                    info!(test_id = %session.test_id, %endpoint, "endpoint submitted");
                    return Ok(Submission::Accepted);
                }
                Ok(reply) => {
                    debug!(status = reply.status, %endpoint, "submission not accepted");
                }
                Err(e) if e.is_transient() => {
                    warn!(error = %e, %endpoint, attempts, "submission failed, retrying");
                }
                Err(e) => return Err(e),
            }

            if self.poll(session).await?.complete {
                info!(test_id = %session.test_id, %endpoint, "test complete, endpoint not submitted");
                return Ok(Submission::AlreadyComplete);
            }

            if let Some(max) = self.init.max_attempts
                && attempts >= max
            {
                return Err(LoadGenError::WaitExhausted {
                    what: format!("submission of {endpoint}"),
                    attempts,
                });
            }
            self.clock.sleep(self.init.poll_interval).await;
        }
    }

    /// Poll under `policy` until the test reports completion.
    pub async fn wait_complete(
        &self,
        session: &mut TestSession,
        policy: &WaitPolicy,
    ) -> LoadGenResult<PollResult> {
        let what = format!("completion of {}", session.test_id);
        let test_id = session.test_id.clone();

        let doc = wait_until(self.clock.as_ref(), policy, &what, || {
            self.probe_finished(&test_id)
        })
        .await?;

        self.apply(session, &doc)
    }

    async fn probe_initialized(&self, kind: TestKind, path: &str) -> LoadGenResult<Probe<String>> {
        let reply = self.transport.get(&self.lg_host, path).await?;
        if reply.is_ok() {
            Ok(Probe::Done(reply.body))
        } else {
            debug!(status = reply.status, %kind, "load generator not ready");
            Ok(Probe::NotYet)
        }
    }

    async fn probe_start_time(&self, test_id: &str) -> LoadGenResult<Probe<DateTime<Utc>>> {
        match self.fetch_log(test_id).await?.start_time()? {
            Some(ts) => Ok(Probe::Done(ts)),
            None => Ok(Probe::NotYet),
        }
    }

    async fn probe_finished(&self, test_id: &str) -> LoadGenResult<Probe<LogDocument>> {
        let doc = self.fetch_log(test_id).await?;
        if let Ok(Some(rps)) = doc.current_rps() {
            debug!(test_id = %test_id, rps, "test progress");
        }
        if doc.is_finished() {
            Ok(Probe::Done(doc))
        } else {
            Ok(Probe::NotYet)
        }
    }

    async fn fetch_log(&self, test_id: &str) -> LoadGenResult<LogDocument> {
        let reply = self
            .transport
            .get(&self.lg_host, &format!("/log?name={test_id}"))
            .await?;
        if !reply.is_ok() {
            return Err(LoadGenError::Protocol(format!(
                "log {test_id} returned status {}",
                reply.status
            )));
        }

        if let Some(dir) = &self.log_dir {
            tokio::fs::write(dir.join(test_id), &reply.body).await?;
        }
        Ok(LogDocument::parse(&reply.body))
    }

    fn apply(&self, session: &mut TestSession, doc: &LogDocument) -> LoadGenResult<PollResult> {
        if let Some(rps) = doc.current_rps()? {
            session.last_throughput = rps;
        }
        session.complete = doc.is_finished();

        Ok(PollResult {
            throughput: session.last_throughput,
            elapsed_since_start: (self.clock.now() - session.started_at)
                .to_std()
                .unwrap_or_default(),
            complete: session.complete,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimLoadGenerator;
    use crate::transport::HttpReply;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use vmscale_core::ManualClock;

    /// Replays canned replies in order.
    struct Scripted {
        replies: Mutex<VecDeque<LoadGenResult<HttpReply>>>,
    }

    impl Scripted {
        fn new(replies: Vec<LoadGenResult<HttpReply>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
            }
        }
    }

    #[async_trait]
    impl LoadGenTransport for Scripted {
        async fn get(&self, _host: &str, _path: &str) -> LoadGenResult<HttpReply> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(HttpReply::new(500, "script exhausted")))
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        ))
    }

    fn waits() -> WaitSettings {
        WaitSettings::immediate()
    }

    fn session(kind: TestKind) -> TestSession {
        TestSession {
            kind,
            test_id: "test.1.log".to_string(),
            started_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            last_throughput: 0.0,
            complete: false,
        }
    }

    #[tokio::test]
    async fn poll_reports_last_throughput_sample() {
        let log = "[Test]\nstartTime=2024-03-01T12:00:00Z\n\
                   [Current rps=10.0]\n[Current rps=25.5]\n[Current rps=40.2]\n";
        let transport = Arc::new(Scripted::new(vec![Ok(HttpReply::new(200, log))]));
        let clock = clock();
        clock.advance(Duration::from_secs(42));
        let driver = TestSessionDriver::new(transport, clock, "lg", &waits());

        let mut s = session(TestKind::Horizontal);
        let result = driver.poll(&mut s).await.unwrap();

        assert_eq!(result.throughput, 40.2);
        assert_eq!(result.elapsed_since_start, Duration::from_secs(42));
        assert!(!result.complete);
        assert_eq!(s.last_throughput, 40.2);
    }

    #[tokio::test]
    async fn poll_detects_completion() {
        let transport = Arc::new(Scripted::new(vec![
            Ok(HttpReply::new(200, "[Current rps=5.0]\n")),
            Ok(HttpReply::new(200, "[Current rps=5.0]\n[Test finished]\n")),
        ]));
        let driver = TestSessionDriver::new(transport, clock(), "lg", &waits());

        let mut s = session(TestKind::Horizontal);
        assert!(!driver.poll(&mut s).await.unwrap().complete);
        assert!(driver.poll(&mut s).await.unwrap().complete);
        assert!(s.complete);
    }

    #[tokio::test]
    async fn start_retries_until_initialized() {
        let transport = Arc::new(Scripted::new(vec![
            Err(LoadGenError::Transport("connection refused".into())),
            Ok(HttpReply::new(502, "bad gateway")),
            Ok(HttpReply::new(200, "<a href='/log?name=test.7.log'>Test</a>")),
            Ok(HttpReply::new(200, "[Test]\ntype=horizontal\n")),
            Ok(HttpReply::new(200, "[Test]\nstartTime=2024-03-01T11:59:30Z\n")),
        ]));
        let driver = TestSessionDriver::new(transport, clock(), "lg", &waits());

        let s = driver.start(TestKind::Horizontal, "ws-1").await.unwrap();
        assert_eq!(s.test_id, "test.7.log");
        assert_eq!(
            s.started_at,
            Utc.with_ymd_and_hms(2024, 3, 1, 11, 59, 30).unwrap()
        );
    }

    #[tokio::test]
    async fn start_without_test_id_is_protocol_error() {
        let transport = Arc::new(Scripted::new(vec![Ok(HttpReply::new(200, "ok"))]));
        let driver = TestSessionDriver::new(transport, clock(), "lg", &waits());

        let err = driver.start(TestKind::Warmup, "lb-1").await.unwrap_err();
        assert!(matches!(err, LoadGenError::Protocol(_)));
    }

    #[tokio::test]
    async fn start_gives_up_after_bound() {
        let mut waits = waits();
        waits.test_init = WaitPolicy::new(Duration::ZERO, 3);
        let transport = Arc::new(Scripted::new(vec![]));
        let driver = TestSessionDriver::new(transport, clock(), "lg", &waits);

        let err = driver.start(TestKind::AutoScaling, "ws-1").await.unwrap_err();
        assert!(matches!(err, LoadGenError::WaitExhausted { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn submission_after_completion_is_noop() {
        let transport = Arc::new(Scripted::new(vec![
            Ok(HttpReply::new(503, "busy")),
            Ok(HttpReply::new(200, "[Current rps=50.0]\n[Test finished]\n")),
        ]));
        let driver = TestSessionDriver::new(transport, clock(), "lg", &waits());

        let mut s = session(TestKind::Horizontal);
        let outcome = driver.register_additional_endpoint(&mut s, "ws-2").await.unwrap();
        assert_eq!(outcome, Submission::AlreadyComplete);
        assert!(s.complete);

        // A completed session short-circuits without any request.
        let outcome = driver.register_additional_endpoint(&mut s, "ws-3").await.unwrap();
        assert_eq!(outcome, Submission::AlreadyComplete);
    }

    #[tokio::test]
    async fn submission_only_for_horizontal_tests() {
        let transport = Arc::new(Scripted::new(vec![]));
        let driver = TestSessionDriver::new(transport, clock(), "lg", &waits());

        let mut s = session(TestKind::AutoScaling);
        let err = driver.register_additional_endpoint(&mut s, "ws-2").await.unwrap_err();
        assert!(matches!(err, LoadGenError::Protocol(_)));
    }

    #[tokio::test]
    async fn wait_complete_against_simulated_generator() {
        let clock = clock();
        let lg = Arc::new(SimLoadGenerator::new(clock.clone(), Duration::from_secs(30)));
        let mut waits = waits();
        waits.warmup_poll = WaitPolicy::from_secs(10, 10);
        let driver = TestSessionDriver::new(lg.clone(), clock.clone(), "lg", &waits);

        let mut s = driver.start(TestKind::Warmup, "lb-1").await.unwrap();
        assert_eq!(s.test_id, "warmup.1.log");

        let result = driver.wait_complete(&mut s, &waits.warmup_poll).await.unwrap();
        assert!(result.complete);
        assert_eq!(result.throughput, 20.0);
        assert_eq!(clock.total_slept(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn log_dir_mirrors_fetched_log() {
        let dir = tempfile::tempdir().unwrap();
        let body = "[Test]\ntype=horizontal\n[Current rps=12.0]\n";
        let transport = Arc::new(Scripted::new(vec![Ok(HttpReply::new(200, body))]));
        let driver =
            TestSessionDriver::new(transport, clock(), "lg", &waits()).with_log_dir(dir.path());

        let mut s = session(TestKind::Horizontal);
        driver.poll(&mut s).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("test.1.log")).unwrap();
        assert_eq!(written, body);
    }
}
