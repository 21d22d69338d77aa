//! Unpartitioned person job.
//!
//! Reads the whole person table as a single partition, ten rows per page and ten
//! items per chunk, joining first and last names on the way to the writer.

use std::sync::Arc;

use super::person::{FullNameProcessor, Person, PersonAfterProcess};
use super::table::InMemoryTable;
use crate::chunk::{ChunkPipeline, ItemWriter};
use crate::error::BatchResult;
use crate::orchestration::{ChunkWorker, JobDefinition};

pub const SIMPLE_JOB_NAME: &str = "processPersonJob";
pub const SIMPLE_CHUNK_SIZE: usize = 10;
pub const SIMPLE_PAGE_SIZE: usize = 10;

/// Job covering every row of `table` with one partition
pub fn simple_person_job(table: &Arc<InMemoryTable<Person>>) -> JobDefinition {
    JobDefinition::new(SIMPLE_JOB_NAME, table.clone()).with_grid_size(1)
}

pub fn simple_person_worker(
    table: &Arc<InMemoryTable<Person>>,
    writer: Arc<dyn ItemWriter<PersonAfterProcess>>,
) -> BatchResult<ChunkWorker<Person, PersonAfterProcess>> {
    Ok(ChunkWorker::new(
        Arc::new(table.reader_factory().with_page_size(SIMPLE_PAGE_SIZE)),
        Arc::new(FullNameProcessor),
        writer,
        ChunkPipeline::new(SIMPLE_CHUNK_SIZE)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::LocalPoolDispatcher;
    use crate::events::EventPublisher;
    use crate::models::JobParameters;
    use crate::orchestration::{JobCoordinator, PartitionWorker};
    use crate::sample::TableWriter;
    use crate::state_machine::BatchStatus;
    use crate::store::{ExecutionStateStore, InMemoryExecutionStateStore};

    #[tokio::test]
    async fn test_whole_table_runs_as_one_partition() {
        let table = Arc::new(InMemoryTable::from_rows(
            (1..=12).map(|id| (id, Person::new(id, format!("First{id}"), format!("Last{id}")))),
        ));
        let output: Arc<TableWriter<PersonAfterProcess>> = Arc::new(TableWriter::new());
        let worker: Arc<dyn PartitionWorker> = Arc::new(simple_person_worker(&table, output.clone()).unwrap());
        let store = Arc::new(InMemoryExecutionStateStore::new());
        let publisher = EventPublisher::default();
        let dispatcher = LocalPoolDispatcher::new(worker.clone(), store.clone(), publisher.clone());
        let coordinator = JobCoordinator::new(store.clone(), Arc::new(dispatcher), worker, publisher);

        let job = coordinator
            .launch(&simple_person_job(&table), JobParameters::with_run_token(1_i64))
            .await
            .unwrap();

        assert_eq!(job.job_name, "processPersonJob");
        assert_eq!(job.status, BatchStatus::Completed);

        let steps = store.find_step_executions(job.id).await.unwrap();
        let partitions: Vec<_> = steps.iter().filter(|s| s.partition_number().is_some()).collect();
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0].read_count, 12);
        assert_eq!(partitions[0].commit_count, 2);

        let written = output.written();
        assert_eq!(written.len(), 12);
        assert!(written.iter().any(|p| p.full_name == "First12 Last12"));
    }

    #[tokio::test]
    async fn test_empty_table_completes_without_partitions() {
        let table: Arc<InMemoryTable<Person>> = Arc::new(InMemoryTable::new());
        let output: Arc<TableWriter<PersonAfterProcess>> = Arc::new(TableWriter::new());
        let worker: Arc<dyn PartitionWorker> = Arc::new(simple_person_worker(&table, output.clone()).unwrap());
        let store = Arc::new(InMemoryExecutionStateStore::new());
        let publisher = EventPublisher::default();
        let dispatcher = LocalPoolDispatcher::new(worker.clone(), store.clone(), publisher.clone());
        let coordinator = JobCoordinator::new(store.clone(), Arc::new(dispatcher), worker, publisher);

        let job = coordinator
            .launch(&simple_person_job(&table), JobParameters::with_run_token(2_i64))
            .await
            .unwrap();

        assert_eq!(job.status, BatchStatus::Completed);
        assert!(output.is_empty());
    }
}
