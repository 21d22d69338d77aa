//! # Messaging Module
//!
//! Envelopes and transports used by the channel and broker dispatch strategies.

pub mod envelope;
pub mod errors;
pub mod in_memory;
#[cfg(feature = "pgmq")]
pub mod pgmq_transport;
pub mod transport;

pub use envelope::{DispatchEnvelope, ReplyEnvelope};
pub use errors::{MessagingError, MessagingResult};
pub use in_memory::InMemoryTransport;
#[cfg(feature = "pgmq")]
pub use pgmq_transport::PgmqTransport;
pub use transport::{MessageTransport, ReceivedMessage};
