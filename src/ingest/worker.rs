use crate::ingest::{IngestError, IngestPipeline};
use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Default capacity of the ingestion channel.
pub const INGEST_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestJob {
    pub upload_id: String,
}

/// Sending half of the ingestion queue.
#[derive(Debug, Clone)]
pub struct IngestQueue {
    sender: mpsc::Sender<IngestJob>,
}

impl IngestQueue {
    pub async fn enqueue(&self, upload_id: &str) -> Result<(), IngestError> {
        self.sender
            .send(IngestJob {
                upload_id: upload_id.to_string(),
            })
            .await
            .map_err(|_| IngestError::QueueClosed)
    }
}

pub fn ingest_channel(capacity: usize) -> (IngestQueue, mpsc::Receiver<IngestJob>) {
    let (sender, receiver) = mpsc::channel(capacity);
    (IngestQueue { sender }, receiver)
}

/// Background worker that runs `process_file` for every queued upload.
///
/// Jobs for different uploads run concurrently; a job for an upload that is
/// already in flight is dropped. Failures are logged here, the pipeline has
/// already recorded them on the upload. A job that panics is recorded as
/// [`IngestError::Aborted`]. The worker stops accepting jobs when all
/// queue handles are dropped or the token is cancelled, then waits for running
/// jobs to finish.
pub struct IngestWorker {
    receiver: mpsc::Receiver<IngestJob>,
    pipeline: IngestPipeline,
    shutdown: CancellationToken,
}

impl IngestWorker {
    pub fn new(
        receiver: mpsc::Receiver<IngestJob>,
        pipeline: IngestPipeline,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            pipeline,
            shutdown,
        }
    }

    /// Create a queue and spawn a worker consuming it.
    pub fn spawn(
        pipeline: IngestPipeline,
        capacity: usize,
        shutdown: CancellationToken,
    ) -> (IngestQueue, JoinHandle<()>) {
        let (queue, receiver) = ingest_channel(capacity);
        let handle = tokio::spawn(Self::new(receiver, pipeline, shutdown).run());
        (queue, handle)
    }

    pub async fn run(mut self) {
        let mut tasks: JoinSet<String> = JoinSet::new();
        let mut in_flight: HashSet<String> = HashSet::new();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                job = self.receiver.recv() => match job {
                    Some(job) => {
                        if !in_flight.insert(job.upload_id.clone()) {
                            warn!(upload_id = %job.upload_id, "Upload already being processed, skipping");
                            continue;
                        }
                        tasks.spawn(run_job(self.pipeline.clone(), job));
                    }
                    None => break,
                },
                Some(finished) = tasks.join_next(), if !tasks.is_empty() => {
                    finish(finished, &mut in_flight);
                }
            }
        }

        while let Some(finished) = tasks.join_next().await {
            finish(finished, &mut in_flight);
        }
        info!("Ingestion worker stopped");
    }
}

fn finish(finished: Result<String, tokio::task::JoinError>, in_flight: &mut HashSet<String>) {
    match finished {
        Ok(upload_id) => {
            in_flight.remove(&upload_id);
        }
        Err(e) => error!(error = %e, "Ingestion task aborted"),
    }
}

async fn run_job(pipeline: IngestPipeline, job: IngestJob) -> String {
    let outcome = AssertUnwindSafe(pipeline.process_file(&job.upload_id))
        .catch_unwind()
        .await;
    match outcome {
        Ok(Ok(report)) => info!(
            upload_id = %job.upload_id,
            feature_count = report.feature_count,
            "Ingestion job finished"
        ),
        Ok(Err(e)) => error!(upload_id = %job.upload_id, error = %e, "Ingestion job failed"),
        Err(_) => {
            error!(upload_id = %job.upload_id, "Ingestion job panicked");
            pipeline
                .record_failure(&job.upload_id, &IngestError::Aborted)
                .await;
        }
    }
    job.upload_id
}
