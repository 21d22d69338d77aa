//! Person records and the full-name processor.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chunk::ItemProcessor;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
}

impl Person {
    pub fn new(id: i64, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            id,
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonAfterProcess {
    /// Key of the source row
    pub source_id: i64,
    pub full_name: String,
}

/// Joins first and last name with a single space
#[derive(Debug, Clone, Copy, Default)]
pub struct FullNameProcessor;

#[async_trait]
impl ItemProcessor<Person, PersonAfterProcess> for FullNameProcessor {
    async fn process(&self, person: Person) -> anyhow::Result<Option<PersonAfterProcess>> {
        Ok(Some(PersonAfterProcess {
            source_id: person.id,
            full_name: format!("{} {}", person.first_name, person.last_name),
        }))
    }
}
