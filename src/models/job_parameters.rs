use serde::{Deserialize, Serialize};

use super::scalar::{ScalarMap, ScalarValue};
use crate::constants::params;
use crate::partition::PartitionRange;

/// Ordered job parameters supplied by the trigger
///
/// The run token (`timestamp`) makes each trigger a distinct job instance. Broker
/// worker jobs additionally carry the master's token as `correlation.token` plus the
/// partition they cover.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobParameters {
    entries: ScalarMap,
}

impl JobParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters holding just the run token
    pub fn with_run_token(token: impl Into<ScalarValue>) -> Self {
        Self::new().with(params::RUN_TOKEN, token)
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.put(key, value);
        self
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<ScalarValue>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ScalarValue> {
        self.entries.get(key)
    }

    pub fn get_long(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(ScalarValue::as_long)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ScalarValue)> {
        self.entries.iter()
    }

    /// Run token rendered as text, the identity half of a JobExecution
    pub fn run_token(&self) -> Option<String> {
        self.get(params::RUN_TOKEN).map(ToString::to_string)
    }

    /// Run token of the master job this execution was launched for
    pub fn correlation_token(&self) -> Option<String> {
        self.get(params::CORRELATION_TOKEN).map(ToString::to_string)
    }

    /// Partition carried by a broker worker job
    pub fn partition_range(&self) -> Option<PartitionRange> {
        let start = self.get_long(params::START)?;
        let end = self.get_long(params::END)?;
        let index = u32::try_from(self.get_long(params::PARTITION_NUMBER)?).ok()?;
        Some(PartitionRange::new(start, end, index))
    }
}
