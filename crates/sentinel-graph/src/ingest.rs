//! Triple ingestion
//!
//! Maps each validated triple to two node upserts and one edge upsert and
//! runs them against a [`GraphStore`]. Triples are independent: a failed,
//! timed-out or cancelled triple is reported in its own outcome (with the
//! triple kept for retry) and never stops the rest of the batch.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use sentinel_core::{GraphConfig, Triple};
use thiserror::Error;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::GraphStore;

/// Per-triple ingestion failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestionError {
    #[error("Backend write failed during {operation}: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Ingestion cancelled before this triple completed")]
    Cancelled,
}

/// Outcome for one triple of a batch
#[derive(Debug, Clone)]
pub struct IngestionOutcome {
    /// Position in the input batch
    pub index: usize,
    pub triple: Triple,
    pub result: Result<(), IngestionError>,
}

impl IngestionOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&IngestionError> {
        self.result.as_ref().err()
    }
}

/// Outcomes of a batch, in input order
#[derive(Debug, Clone, Default)]
pub struct IngestionReport {
    pub outcomes: Vec<IngestionOutcome>,
}

impl IngestionReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn cancelled(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, Err(IngestionError::Cancelled)))
            .count()
    }

    /// Triples whose ingestion did not complete, for a retry batch
    pub fn retry_triples(&self) -> Vec<Triple> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_ok())
            .map(|o| o.triple.clone())
            .collect()
    }
}

/// Concurrent, idempotent triple ingestion
pub struct IngestionEngine {
    store: Arc<dyn GraphStore>,
    workers: usize,
    timeout: Duration,
}

impl IngestionEngine {
    pub fn new(store: Arc<dyn GraphStore>, config: &GraphConfig) -> Self {
        Self {
            store,
            workers: config.workers.max(1),
            timeout: config.timeout(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ingest a batch to completion
    pub async fn ingest(&self, triples: &[Triple]) -> IngestionReport {
        self.ingest_with_cancel(triples, &CancellationToken::new())
            .await
    }

    /// Ingest a batch until done or `cancel` fires. On cancellation the
    /// outcomes already completed are kept and every other triple is
    /// reported as [`IngestionError::Cancelled`].
    #[tracing::instrument(skip_all, fields(backend = self.store.name(), triples = triples.len(), workers = self.workers))]
    pub async fn ingest_with_cancel(
        &self,
        triples: &[Triple],
        cancel: &CancellationToken,
    ) -> IngestionReport {
        let mut results: Vec<Option<Result<(), IngestionError>>> =
            (0..triples.len()).map(|_| None).collect();

        {
            let mut pending = stream::iter(triples.iter().enumerate())
                .map(|(index, triple)| async move { (index, self.ingest_one(triple).await) })
                .buffer_unordered(self.workers);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        warn!("Ingestion cancelled");
                        break;
                    }
                    next = pending.next() => match next {
                        Some((index, result)) => results[index] = Some(result),
                        None => break,
                    },
                }
            }
        }

        let outcomes: Vec<IngestionOutcome> = triples
            .iter()
            .zip(results)
            .enumerate()
            .map(|(index, (triple, result))| IngestionOutcome {
                index,
                triple: triple.clone(),
                result: result.unwrap_or(Err(IngestionError::Cancelled)),
            })
            .collect();

        for outcome in &outcomes {
            if let Err(e) = &outcome.result {
                warn!(index = outcome.index, triple = %outcome.triple, "{e}");
            }
        }

        let report = IngestionReport { outcomes };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Ingestion batch finished"
        );
        report
    }

    async fn ingest_one(&self, triple: &Triple) -> Result<(), IngestionError> {
        let (subject, object, edge) = triple.graph_elements();

        self.bounded("subject upsert", self.store.upsert_node(&subject))
            .await?;
        self.bounded("object upsert", self.store.upsert_node(&object))
            .await?;
        self.bounded("edge upsert", self.store.upsert_edge(&edge))
            .await?;

        debug!(%triple, "Ingested triple");
        Ok(())
    }

    async fn bounded<F>(&self, operation: &'static str, call: F) -> Result<(), IngestionError>
    where
        F: std::future::Future<Output = sentinel_core::Result<()>>,
    {
        match timeout(self.timeout, call).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(IngestionError::Backend {
                operation,
                message: e.to_string(),
            }),
            Err(_) => Err(IngestionError::Timeout {
                operation,
                after: self.timeout,
            }),
        }
    }
}
