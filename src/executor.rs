//! Concurrent executor: drive a request-plan sequence against the SUT
//! under a bounded in-flight count.
//!
//! Plans are pulled lazily, so at most N plans exist beyond the horizon.
//! Scheduling is work-preserving: a new request starts as soon as any
//! in-flight one completes; there is no pacing. Per-request failures are
//! classified into the Observation and never unwind this module. An
//! external shutdown signal stops issuance immediately, grants in-flight
//! requests a short grace period, then snapshots whatever was recorded.

use crate::metrics::{self, Observation, Outcome, SessionMetrics};
use crate::workload::RequestPlan;
use crate::catalog::HttpMethod;
use crate::{BenchError, BenchResult};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

/// Grace period granted to in-flight requests after a shutdown signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub base_url: String,
    pub db_prefix: Option<String>,
    pub concurrency: usize,
    pub timeout: Duration,
}

impl ExecutorConfig {
    fn url_for(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        match &self.db_prefix {
            Some(prefix) => format!("{}/{}{}", base, prefix.trim_matches('/'), path),
            None => format!("{base}{path}"),
        }
    }

    fn mailbox_capacity(&self) -> usize {
        (self.concurrency * 4).max(64)
    }
}

/// Run the plan sequence to completion (or cancellation) and return the
/// folded session metrics.
pub async fn drive(
    plans: impl Iterator<Item = RequestPlan>,
    cfg: &ExecutorConfig,
    mut shutdown: watch::Receiver<bool>,
) -> BenchResult<SessionMetrics> {
    let client = reqwest::Client::builder().timeout(cfg.timeout).build()?;
    let concurrency = cfg.concurrency.max(1);

    let (tx, rx) = mpsc::channel::<Observation>(cfg.mailbox_capacity());
    let folder = tokio::spawn(metrics::collect(rx));

    let session_start = Instant::now();
    let mut tasks: JoinSet<BenchResult<()>> = JoinSet::new();
    let mut interrupted = false;
    let mut fatal: Option<BenchError> = None;
    let mut shutdown_open = true;

    'issue: for plan in plans {
        if *shutdown.borrow() {
            interrupted = true;
            break;
        }
        // Wait for a slot; completion order is irrelevant.
        while tasks.len() >= concurrency {
            tokio::select! {
                joined = tasks.join_next() => {
                    if let Some(err) = check_joined(joined) {
                        fatal = Some(err);
                        break 'issue;
                    }
                }
                changed = shutdown.changed(), if shutdown_open => {
                    if changed.is_err() {
                        shutdown_open = false;
                    }
                }
            }
            if *shutdown.borrow() {
                interrupted = true;
                break 'issue;
            }
        }

        let url = cfg.url_for(&plan.path);
        let client = client.clone();
        let tx = tx.clone();
        tasks.spawn(execute_one(client, url, plan, session_start, tx));
    }

    // Drain in-flight requests. After an interrupt they get a bounded
    // grace period, then stragglers are aborted.
    if fatal.is_none() {
        if interrupted {
            let drained = tokio::time::timeout(SHUTDOWN_GRACE, drain(&mut tasks)).await;
            match drained {
                Ok(Some(err)) => fatal = Some(err),
                Ok(None) => {}
                Err(_) => tracing::warn!(
                    "shutdown grace period elapsed; aborting {} in-flight requests",
                    tasks.len()
                ),
            }
        } else if let Some(err) = drain(&mut tasks).await {
            fatal = Some(err);
        }
    }
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}

    drop(tx);
    let mut session = folder
        .await
        .map_err(|e| BenchError::Invariant(format!("metrics fold task failed: {e}")))?;

    if let Some(err) = fatal {
        return Err(err);
    }

    session.wall_clock_sec = session_start.elapsed().as_secs_f64();
    session.interrupted = interrupted;
    Ok(session)
}

async fn drain(tasks: &mut JoinSet<BenchResult<()>>) -> Option<BenchError> {
    while let Some(joined) = tasks.join_next().await {
        if let Some(err) = check_joined(Some(joined)) {
            return Some(err);
        }
    }
    None
}

fn check_joined(
    joined: Option<Result<BenchResult<()>, tokio::task::JoinError>>,
) -> Option<BenchError> {
    match joined {
        Some(Ok(Err(err))) => Some(err),
        Some(Err(join_err)) if join_err.is_panic() => Some(BenchError::Invariant(format!(
            "request task panicked: {join_err}"
        ))),
        _ => None,
    }
}

/// Issue one request, classify the outcome, and hand the observation to
/// the collector. `try_send` keeps the collector from ever applying
/// backpressure; a full mailbox is an invariant violation, not a drop.
async fn execute_one(
    client: reqwest::Client,
    url: String,
    plan: RequestPlan,
    session_start: Instant,
    tx: mpsc::Sender<Observation>,
) -> BenchResult<()> {
    let start = Instant::now();
    let start_ns = start.duration_since(session_start).as_nanos() as u64;

    let request = match plan.kind.method {
        HttpMethod::Get => client.get(&url),
        HttpMethod::Post => {
            let body = plan.body.unwrap_or_else(|| serde_json::json!({}));
            client.post(&url).json(&body)
        }
    };

    let outcome = match request.send().await {
        Ok(response) => {
            let status = response.status();
            if status.is_success() {
                // Read the body so latency covers the full response.
                match response.bytes().await {
                    Ok(body) => Outcome::Ok {
                        status: status.as_u16(),
                        bytes: body.len() as u64,
                    },
                    Err(e) => classify(e),
                }
            } else {
                Outcome::HttpError {
                    status: status.as_u16(),
                }
            }
        }
        Err(e) => classify(e),
    };

    let latency_ns = start.elapsed().as_nanos() as u64;
    tx.try_send(Observation {
        kind_id: plan.kind.id,
        start_ns,
        latency_ns,
        outcome,
    })
    .map_err(|_| BenchError::Invariant("metrics mailbox overflowed".into()))
}

fn classify(e: reqwest::Error) -> Outcome {
    if e.is_timeout() {
        Outcome::Timeout
    } else {
        tracing::debug!("transport error: {e}");
        Outcome::Transport
    }
}
