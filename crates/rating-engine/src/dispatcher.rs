//! Synchronous and detached execution of fetch jobs

use crate::error::Result;
use crate::orchestrator::{FetchJob, FetchOrchestrator, FetchPlan, FetchStatus};
use crate::scoring::ScoreEngine;
use rating_core::{Scope, Stock};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Response of a dispatched job
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchResponse {
    /// Synchronous run with updated stocks
    Stocks(Vec<Stock>),
    /// Synchronous run with nothing to report
    NoContent,
    /// Detached run accepted
    Accepted { job_id: Uuid },
}

impl DispatchResponse {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Stocks(_) => 200,
            Self::Accepted { .. } => 202,
            Self::NoContent => 204,
        }
    }
}

/// Runs fetch jobs synchronously or on background tasks
pub struct JobDispatcher {
    orchestrator: Arc<FetchOrchestrator>,
    scores: ScoreEngine,
    detached: Mutex<Vec<(Uuid, JoinHandle<()>)>>,
}

impl JobDispatcher {
    pub fn new(orchestrator: Arc<FetchOrchestrator>, scores: ScoreEngine) -> Self {
        Self {
            orchestrator,
            scores,
            detached: Mutex::new(Vec::new()),
        }
    }

    /// Run a fetch job
    ///
    /// A detached job is acknowledged once its work list is resolved; an unknown
    /// ticker still fails and an empty work list is answered with no content. Its
    /// outcome is only logged and visible by re-reading the stocks later. A
    /// synchronous job fails with the error of its most severe outcome.
    pub async fn dispatch(&self, job: FetchJob) -> Result<DispatchResponse> {
        if job.options.detach {
            let plan = self
                .orchestrator
                .prepare(&job.scope, job.provider, &job.options)
                .await?;
            if plan.is_empty() {
                tracing::info!(provider = %job.provider, scope = %job.scope, "nothing to fetch, detached job not started");
                return Ok(DispatchResponse::NoContent);
            }
            return Ok(self.spawn_detached(job, plan).await);
        }

        let outcome = self.orchestrator.run(&job).await?;
        if let Some(e) = outcome.error() {
            return Err(e);
        }

        Ok(match outcome.status() {
            FetchStatus::Success => DispatchResponse::Stocks(outcome.successful),
            _ => DispatchResponse::NoContent,
        })
    }

    async fn spawn_detached(&self, job: FetchJob, plan: FetchPlan) -> DispatchResponse {
        let job_id = Uuid::new_v4();
        let orchestrator = Arc::clone(&self.orchestrator);

        tracing::info!(job = %job_id, provider = %job.provider, scope = %job.scope, queued = plan.queued().len(), "detached fetch accepted");
        let handle = tokio::spawn(async move {
            match orchestrator.execute(plan).await {
                Ok(outcome) => tracing::info!(
                    job = %job_id,
                    provider = %job.provider,
                    status = ?outcome.status(),
                    successful = outcome.successful.len(),
                    failed = outcome.failed.len(),
                    "detached fetch finished"
                ),
                Err(e) => tracing::warn!(
                    job = %job_id,
                    provider = %job.provider,
                    error = %e,
                    "detached fetch failed"
                ),
            }
        });

        let mut detached = self.detached.lock().await;
        detached.retain(|(_, handle)| !handle.is_finished());
        detached.push((job_id, handle));

        DispatchResponse::Accepted { job_id }
    }

    /// Recompute the scores of one or all stocks
    pub async fn compute(&self, scope: &Scope) -> Result<DispatchResponse> {
        self.scores.recompute(scope).await?;
        Ok(DispatchResponse::NoContent)
    }

    /// Number of detached jobs still running
    pub async fn in_flight(&self) -> usize {
        self.detached
            .lock()
            .await
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .count()
    }

    /// Wait for every detached job, returning how many were awaited
    pub async fn drain(&self) -> usize {
        let jobs: Vec<_> = self.detached.lock().await.drain(..).collect();
        let count = jobs.len();

        let results = futures::future::join_all(jobs.into_iter().map(|(job_id, handle)| async move {
            (job_id, handle.await)
        }))
        .await;

        for (job_id, result) in results {
            if let Err(e) = result {
                tracing::error!(job = %job_id, error = %e, "detached fetch panicked");
            }
        }

        count
    }
}
