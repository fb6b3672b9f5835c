use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::models::{CheckResult, Message, Monitor};
use crate::probe::{Probe, ProbeError, ProbeOutcome, DEFAULT_TIMEOUT};
use crate::status::Status;
use crate::store::ResultSink;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub interval: Duration,
    /// Upper bound (exclusive) of the random delay before the first check.
    pub max_jitter: Duration,
    pub timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_jitter: Duration::from_secs(10),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// How one check result is read by the transition rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Healthy,
    Unhealthy,
    Error,
}

impl Classification {
    fn of(observed: &Result<ProbeOutcome, ProbeError>) -> Self {
        match observed {
            Ok(outcome) if outcome.healthy => Classification::Healthy,
            Ok(_) => Classification::Unhealthy,
            Err(_) => Classification::Error,
        }
    }
}

/// New status after `class` was observed in `current`, or `None` while the
/// target stays in the state it is already in.
pub fn transition(current: Status, class: Classification) -> Option<Status> {
    match class {
        Classification::Healthy if !current.is(Status::Ok) => Some(current.recovery()),
        // only a healthy target can go into alert; an unknown one stays unknown
        Classification::Unhealthy if current.is(Status::Ok) => Some(current.trigger()),
        Classification::Error if !current.is(Status::Unknown) => Some(current.unknown()),
        _ => None,
    }
}

pub struct Worker {
    monitor: Monitor,
    status: Status,
    probe: Probe,
    messages: mpsc::Sender<Message>,
    sink: Option<Arc<dyn ResultSink>>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        monitor: Monitor,
        messages: mpsc::Sender<Message>,
        sink: Option<Arc<dyn ResultSink>>,
        config: WorkerConfig,
    ) -> Result<Self, ProbeError> {
        let probe = Probe::new(&monitor, config.timeout)?;
        Ok(Self {
            monitor,
            status: Status::Ok,
            probe,
            messages,
            sink,
            config,
        })
    }

    fn jitter(&self) -> Duration {
        let max = self.config.max_jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::random_range(0..max))
    }

    /// Polls the target until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        let id = self.monitor.id;

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(self.jitter()) => {}
        }
        info!(worker_id = id, target = %self.monitor.url, "start worker");

        let mut ticker = interval_at(Instant::now() + self.config.interval, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            info!(worker_id = id, target = %self.monitor.url, "check");

            let observed = match self.probe.check(&cancel).await {
                Err(ProbeError::Cancelled) => return,
                observed => observed,
            };

            if let Some(msg) = self.observe(observed).await {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    sent = self.messages.send(msg) => {
                        if sent.is_err() {
                            warn!(worker_id = id, target = %self.monitor.url, "alert channel closed, dropping message");
                        }
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(worker_id = id, target = %self.monitor.url, "stop worker");
                    return;
                }
                _ = ticker.tick() => {}
            }
        }
    }

    /// Applies one check result; on a transition, stores it and returns the
    /// alert to send.
    async fn observe(&mut self, observed: Result<ProbeOutcome, ProbeError>) -> Option<Message> {
        let next = transition(self.status, Classification::of(&observed))?;
        self.status = next;

        let reason = match &observed {
            Ok(outcome) => outcome.reason.clone(),
            Err(e) => {
                warn!(worker_id = self.monitor.id, target = %self.monitor.url, error = %e, "check failed");
                e.reason().to_string()
            }
        };
        info!(
            worker_id = self.monitor.id,
            target = %self.monitor.url,
            status = %next,
            %reason,
            "status changed"
        );

        self.record(CheckResult::new(self.monitor.id, next, reason.clone())).await;
        Some(Message::transition(next, &self.monitor, &reason))
    }

    async fn record(&self, result: CheckResult) {
        let Some(sink) = self.sink.clone() else {
            return;
        };
        match tokio::task::spawn_blocking(move || sink.create_result(&result)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                error!(worker_id = self.monitor.id, target = %self.monitor.url, error = %e, "failed to store result")
            }
            Err(e) => {
                error!(worker_id = self.monitor.id, target = %self.monitor.url, error = %e, "result writer panicked")
            }
        }
    }
}

/// Starts one worker task per monitor.
pub fn spawn_workers(
    monitors: Vec<Monitor>,
    messages: &mpsc::Sender<Message>,
    sink: Option<Arc<dyn ResultSink>>,
    config: &WorkerConfig,
    cancel: &CancellationToken,
) -> Result<Vec<JoinHandle<()>>, ProbeError> {
    let mut handles = Vec::with_capacity(monitors.len());
    for monitor in monitors {
        let worker = Worker::new(monitor, messages.clone(), sink.clone(), config.clone())?;
        handles.push(tokio::spawn(worker.run(cancel.clone())));
    }
    info!("{} workers started", handles.len());
    Ok(handles)
}
