//! # Chunk Pipeline
//!
//! Read -> process -> write loop over a single partition.
//!
//! Items are read until `chunk_size` items have been collected or the reader runs
//! dry, each item is processed, and the processed batch is handed to the writer in one
//! call. That write is the commit boundary: counters move only after it succeeds. Any
//! failure discards the chunk in flight, bumps the rollback count and fails the step,
//! leaving previously committed chunks in place.

use serde_json::json;
use tracing::{debug, error, info, instrument};

use super::traits::{ItemProcessor, ItemReader, ItemWriter};
use crate::constants::events;
use crate::error::{BatchError, BatchResult};
use crate::events::EventPublisher;
use crate::models::StepExecution;
use crate::state_machine::{BatchStatus, LifecycleEvent};

/// Phase of a chunk in which an item-level error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkPhase {
    Read,
    Process,
    Write,
}

impl std::fmt::Display for ChunkPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Process => write!(f, "process"),
            Self::Write => write!(f, "write"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChunkPipeline {
    chunk_size: usize,
    event_publisher: Option<EventPublisher>,
}

impl ChunkPipeline {
    pub fn new(chunk_size: usize) -> BatchResult<Self> {
        if chunk_size == 0 {
            return Err(BatchError::Configuration(
                "chunk size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            chunk_size,
            event_publisher: None,
        })
    }

    /// Publish `chunk.committed` events for every successful write
    pub fn with_event_publisher(mut self, publisher: EventPublisher) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Run the pipeline to completion, returning the step in a terminal status
    ///
    /// A step still in STARTING is started first. Item-level failures never surface as
    /// `Err`; they end up in the returned step's status and exit message.
    #[instrument(skip_all, fields(step_name = %step.step_name, step_id = step.id))]
    pub async fn run<I, O, R, P, W>(
        &self,
        mut step: StepExecution,
        reader: &mut R,
        processor: &P,
        writer: &W,
    ) -> StepExecution
    where
        I: Send,
        O: Send,
        R: ItemReader<I> + ?Sized,
        P: ItemProcessor<I, O> + ?Sized,
        W: ItemWriter<O> + ?Sized,
    {
        if step.status == BatchStatus::Starting {
            if let Err(e) = step.transition(LifecycleEvent::Start) {
                error!(error = %e, "❌ CHUNK: Could not start step");
                return step;
            }
        }

        let mut chunk_number: u64 = 0;
        loop {
            chunk_number += 1;

            let mut inputs = Vec::with_capacity(self.chunk_size);
            let mut exhausted = false;
            while inputs.len() < self.chunk_size {
                match reader.read().await {
                    Ok(Some(item)) => inputs.push(item),
                    Ok(None) => {
                        exhausted = true;
                        break;
                    }
                    Err(e) => return Self::roll_back(step, chunk_number, ChunkPhase::Read, e),
                }
            }

            if inputs.is_empty() {
                break;
            }

            let read = inputs.len() as u64;
            let mut outputs = Vec::with_capacity(inputs.len());
            let mut filtered: u64 = 0;
            for item in inputs {
                match processor.process(item).await {
                    Ok(Some(output)) => outputs.push(output),
                    Ok(None) => filtered += 1,
                    Err(e) => return Self::roll_back(step, chunk_number, ChunkPhase::Process, e),
                }
            }

            let written = outputs.len() as u64;
            if !outputs.is_empty() {
                if let Err(e) = writer.write(outputs).await {
                    return Self::roll_back(step, chunk_number, ChunkPhase::Write, e);
                }
            }

            step.record_commit(read, written, filtered);
            debug!(
                chunk = chunk_number,
                read = read,
                written = written,
                filtered = filtered,
                "✅ CHUNK: Committed"
            );
            if let Some(publisher) = &self.event_publisher {
                publisher.publish(
                    events::CHUNK_COMMITTED,
                    json!({
                        "step_execution_id": step.id,
                        "step_name": step.step_name,
                        "chunk": chunk_number,
                        "read": read,
                        "written": written,
                        "filtered": filtered,
                    }),
                );
            }

            if exhausted {
                break;
            }
        }

        if let Err(e) = step.transition(LifecycleEvent::Complete) {
            error!(error = %e, "❌ CHUNK: Could not complete step");
            return step;
        }

        info!(
            read_count = step.read_count,
            write_count = step.write_count,
            filter_count = step.filter_count,
            commit_count = step.commit_count,
            "🏁 CHUNK: Step completed"
        );
        step
    }

    fn roll_back(
        mut step: StepExecution,
        chunk_number: u64,
        phase: ChunkPhase,
        error: anyhow::Error,
    ) -> StepExecution {
        step.record_rollback();
        let message = format!("Chunk {chunk_number} failed during {phase}: {error:#}");
        error!(
            chunk = chunk_number,
            phase = %phase,
            error = %message,
            commit_count = step.commit_count,
            "🔄 CHUNK: Rolled back in-flight chunk"
        );

        if let Err(e) = step.transition(LifecycleEvent::fail_with_error(message)) {
            error!(error = %e, "❌ CHUNK: Could not mark step as failed");
        }
        step
    }
}
