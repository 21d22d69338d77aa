//! # Sample Job Components
//!
//! Readers, processors and writers for the demo jobs the CLI runs:
//!
//! - `person`: rows of [`Person`] turned into [`PersonAfterProcess`] by joining names
//! - `table`: a keyed in-memory table with a paging range reader
//! - `synthetic`: five generated items per partition, uppercased
//! - `fault`: a worker decorator that fails chosen partitions
//! - `simple`: the person job run as one unpartitioned step

pub mod fault;
pub mod person;
pub mod simple;
pub mod synthetic;
pub mod table;

pub use fault::FaultInjectingWorker;
pub use person::{FullNameProcessor, Person, PersonAfterProcess};
pub use simple::{simple_person_job, simple_person_worker, SIMPLE_JOB_NAME};
pub use synthetic::{
    LoggingItemWriter, SyntheticItemReader, SyntheticReaderFactory, UppercaseProcessor,
};
pub use table::{InMemoryTable, PagingRangeReader, PagingReaderFactory, TableWriter};
