//! Bounded concurrent execution across a fleet of hosts.
//!
//! One worker task per target host, all throttled by a shared capacity
//! semaphore so that at most `max_concurrent` sessions hold an open
//! transport at any instant. Workers are fully isolated: any error is
//! captured into that host's result and never disturbs a sibling. A
//! dedicated closer task waits for every worker and then lets the result
//! stream end, so consumers simply read until the channel closes; results
//! arrive in completion order.

use std::future::Future;
use std::sync::Arc;

use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::sync::mpsc::{self, Receiver};

use crate::error::SessionError;
use crate::hosts::HostTarget;
use crate::session::DeviceSession;

/// Fleet-wide execution settings, built once at startup and passed in.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Maximum number of concurrently open sessions.
    pub max_concurrent: usize,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self { max_concurrent: 2 }
    }
}

/// Per-host outcome of one fleet run. Created once per host, consumed
/// exactly once by the result stream.
#[derive(Debug)]
pub struct ExecutionResult {
    pub hostname: String,
    /// Captured output; partial when `error` is set.
    pub output: String,
    pub error: Option<SessionError>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Serializable flattening of [`ExecutionResult`] for report export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionReport {
    pub hostname: String,
    pub output: String,
    pub error: Option<String>,
}

impl From<&ExecutionResult> for ExecutionReport {
    fn from(result: &ExecutionResult) -> Self {
        Self {
            hostname: result.hostname.clone(),
            output: result.output.clone(),
            error: result.error.as_ref().map(|err| err.to_string()),
        }
    }
}

/// Exports per-host results as pretty JSON.
pub fn report_json(results: &[ExecutionResult]) -> Result<String, serde_json::Error> {
    let reports: Vec<ExecutionReport> = results.iter().map(ExecutionReport::from).collect();
    serde_json::to_string_pretty(&reports)
}

/// Runs the standard device job on every host: connect, run or paste the
/// payload, persist when configuring, close.
///
/// Returns the stream of per-host results in completion order.
pub fn run(hosts: Vec<HostTarget>, config: FleetConfig) -> Receiver<ExecutionResult> {
    run_with(hosts, config, execute_host)
}

/// Same dispatch machinery with an injected per-host job.
///
/// The job owns its host entry and produces that host's result; the
/// executor only adds capacity bounding, isolation and stream plumbing.
pub fn run_with<J, F>(hosts: Vec<HostTarget>, config: FleetConfig, job: J) -> Receiver<ExecutionResult>
where
    J: Fn(HostTarget) -> F + Send + Sync + 'static,
    F: Future<Output = ExecutionResult> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
    let job = Arc::new(job);

    let mut workers = Vec::with_capacity(hosts.len());
    for host in hosts {
        let tx = tx.clone();
        let semaphore = Arc::clone(&semaphore);
        let job = Arc::clone(&job);
        workers.push(tokio::spawn(async move {
            // The permit is held for the whole session lifetime, so the
            // open-transport count never exceeds the configured cap.
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            let hostname = host.hostname.clone();
            debug!("{hostname}: session slot acquired");
            let result = job(host).await;
            debug!("{hostname}: finished, success: {}", result.is_success());
            let _ = tx.send(result).await;
        }));
    }

    // Closer: holds the original sender until every worker is done, then
    // drops it so the consumer sees the stream end.
    tokio::spawn(async move {
        for worker in workers {
            let _ = worker.await;
        }
        drop(tx);
        debug!("all workers finished");
    });

    rx
}

/// The standard per-host job.
async fn execute_host(host: HostTarget) -> ExecutionResult {
    let hostname = host.hostname.clone();

    let payload = match host.resolve_payload().await {
        Ok(payload) => payload,
        Err(err) => {
            return ExecutionResult {
                hostname,
                output: String::new(),
                error: Some(err),
            };
        }
    };

    let mut session = match DeviceSession::connect(&host).await {
        Ok(session) => session,
        Err(err) => {
            return ExecutionResult {
                hostname,
                output: String::new(),
                error: Some(err),
            };
        }
    };

    let outcome = run_payload(&mut session, &host, payload.as_deref()).await;
    let output = session.transcript().to_string();
    session.close();

    ExecutionResult {
        hostname,
        output,
        error: outcome.err(),
    }
}

async fn run_payload(
    session: &mut DeviceSession,
    host: &HostTarget,
    payload: Option<&str>,
) -> Result<(), SessionError> {
    let Some(payload) = payload else {
        return Ok(());
    };
    if host.exec_mode {
        session.run_commands(payload).await
    } else {
        session.paste_configuration(payload).await?;
        session.write_configuration().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn hosts(n: usize) -> Vec<HostTarget> {
        (0..n).map(|i| HostTarget::new(format!("host{i}"))).collect()
    }

    fn ok_result(hostname: String) -> ExecutionResult {
        ExecutionResult {
            hostname,
            output: String::new(),
            error: None,
        }
    }

    async fn collect(mut rx: Receiver<ExecutionResult>) -> Vec<ExecutionResult> {
        let mut results = Vec::new();
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        results
    }

    #[tokio::test]
    async fn capacity_limit_bounds_concurrent_jobs() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (active_probe, peak_probe) = (Arc::clone(&active), Arc::clone(&peak));

        let rx = run_with(
            hosts(8),
            FleetConfig { max_concurrent: 2 },
            move |host| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    ok_result(host.hostname)
                }
            },
        );

        let results = collect(rx).await;
        assert_eq!(results.len(), 8);
        assert!(peak_probe.load(Ordering::SeqCst) <= 2);
        assert_eq!(active_probe.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn single_slot_serializes_the_whole_fleet() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let peak_probe = Arc::clone(&peak);

        let rx = run_with(
            hosts(5),
            FleetConfig { max_concurrent: 1 },
            move |host| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    ok_result(host.hostname)
                }
            },
        );

        assert_eq!(collect(rx).await.len(), 5);
        assert_eq!(peak_probe.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn one_failing_worker_leaves_the_others_untouched() {
        let rx = run_with(hosts(3), FleetConfig { max_concurrent: 3 }, |host| async move {
            if host.hostname == "host1" {
                ExecutionResult {
                    hostname: host.hostname,
                    output: "partial".to_string(),
                    error: Some(SessionError::LoginFailure("bad secret".to_string())),
                }
            } else {
                ExecutionResult {
                    hostname: host.hostname,
                    output: "ok".to_string(),
                    error: None,
                }
            }
        });

        let results = collect(rx).await;
        assert_eq!(results.len(), 3);

        let failed: Vec<_> = results.iter().filter(|r| !r.is_success()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].hostname, "host1");
        assert_eq!(failed[0].output, "partial");
        assert!(
            results
                .iter()
                .filter(|r| r.is_success())
                .all(|r| r.output == "ok")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn results_arrive_in_completion_order() {
        let rx = run_with(hosts(3), FleetConfig { max_concurrent: 3 }, |host| async move {
            let delay = match host.hostname.as_str() {
                "host0" => Duration::from_millis(300),
                "host1" => Duration::from_millis(100),
                _ => Duration::from_millis(200),
            };
            tokio::time::sleep(delay).await;
            ok_result(host.hostname)
        });

        let order: Vec<String> = collect(rx).await.into_iter().map(|r| r.hostname).collect();
        assert_eq!(order, vec!["host1", "host2", "host0"]);
    }

    #[tokio::test]
    async fn empty_fleet_yields_an_exhausted_stream() {
        let results = collect(run(Vec::new(), FleetConfig::default())).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn unreachable_host_is_reported_not_fatal() {
        let mut host = HostTarget::new("unreachable");
        host.ssh_ip = Some("127.0.0.1".to_string());
        host.ssh_port = 1;
        host.read_timeout_secs = Some(2);

        let results = collect(run(vec![host], FleetConfig::default())).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].hostname, "unreachable");
        assert!(results[0].error.is_some());
        assert!(results[0].output.is_empty());
    }

    #[test]
    fn report_flattens_errors_to_strings() {
        let results = vec![
            ok_result("core1".to_string()),
            ExecutionResult {
                hostname: "edge1".to_string(),
                output: String::new(),
                error: Some(SessionError::LoginFailure("denied".to_string())),
            },
        ];

        let json = report_json(&results).expect("encode report");
        assert!(json.contains("\"core1\""));
        assert!(json.contains("privilege escalation failed: denied"));
    }
}
