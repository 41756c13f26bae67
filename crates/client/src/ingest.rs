use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::ApiError;

pub const TIMEOUT_MESSAGE: &str = "Ingest timed out.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestStatus {
    Idle,
    Processing,
    Ready,
    Error,
}

impl IngestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, IngestStatus::Ready | IngestStatus::Error)
    }

    pub fn label(self) -> &'static str {
        match self {
            IngestStatus::Idle => "Idle",
            IngestStatus::Processing => "Working",
            IngestStatus::Ready => "Ready",
            IngestStatus::Error => "Error",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct IngestReport {
    pub status: IngestStatus,
    pub message: Option<String>,
}

impl IngestReport {
    pub fn new(status: IngestStatus) -> Self {
        Self { status, message: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: IngestStatus::Error,
            message: Some(message.into()),
        }
    }

    /// Read a health body: `ok`, `healthy` and `ready` count as ready.
    pub fn from_health(body: &Value) -> Self {
        let status = body.get("status").and_then(Value::as_str).unwrap_or_default();
        match status.to_ascii_lowercase().as_str() {
            "ok" | "healthy" | "ready" => IngestReport::new(IngestStatus::Ready),
            "error" | "failed" => IngestReport::error(format!("Backend reported status '{}'", status)),
            _ => IngestReport::new(IngestStatus::Processing),
        }
    }
}

/// Repeatedly fetches a status until it is terminal or the deadline passes.
#[derive(Clone, Debug)]
pub struct IngestPoll {
    pub interval: Duration,
    pub timeout: Option<Duration>,
}

impl IngestPoll {
    pub fn new(interval: Duration, timeout: Option<Duration>) -> Self {
        Self { interval, timeout }
    }

    pub async fn run<F, Fut, P>(&self, mut fetch: F, mut progress: P) -> IngestReport
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<IngestReport, ApiError>>,
        P: FnMut(&IngestReport),
    {
        let Some(timeout) = self.timeout else {
            return self.poll(&mut fetch, &mut progress).await;
        };

        let deadline = Instant::now() + timeout;
        let outcome = tokio::time::timeout_at(deadline, self.poll(&mut fetch, &mut progress)).await;
        match outcome {
            Ok(report) => report,
            Err(_) => {
                warn!(?timeout, "ingest poll deadline expired");
                let report = IngestReport::error(TIMEOUT_MESSAGE);
                progress(&report);
                report
            }
        }
    }

    async fn poll<F, Fut, P>(&self, fetch: &mut F, progress: &mut P) -> IngestReport
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<IngestReport, ApiError>>,
        P: FnMut(&IngestReport),
    {
        loop {
            let mut report = match fetch().await {
                Ok(report) => report,
                Err(e) => IngestReport::error(e.user_message()),
            };
            if report.status == IngestStatus::Idle {
                report.status = IngestStatus::Processing;
            }

            debug!(status = ?report.status, "ingest status");
            progress(&report);
            if report.status.is_terminal() {
                return report;
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}
