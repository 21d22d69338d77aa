//! # Lifecycle Events
//!
//! Fire-and-forget notifications about job, step and partition progress. Event names
//! live in [`crate::constants::events`].

pub mod publisher;

pub use publisher::{EventPublisher, PublishedEvent};
