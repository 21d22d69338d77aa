// State machine module for job and step executions
//
// Both job and step executions walk STARTING -> STARTED -> {COMPLETED | FAILED}.
// The transition table lives here; persistence is left to the callers, which write
// the updated execution through the ExecutionStateStore.

pub mod errors;
pub mod events;
pub mod states;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::LifecycleEvent;
pub use states::BatchStatus;

/// Determine the target status for an event applied to the current status
///
/// A failure may be recorded before an execution has started (planning errors,
/// dispatch timeouts on partitions whose worker never picked them up).
pub fn determine_target_state(
    current: BatchStatus,
    event: &LifecycleEvent,
) -> StateMachineResult<BatchStatus> {
    let target = match (current, event) {
        (BatchStatus::Starting, LifecycleEvent::Start) => BatchStatus::Started,
        (BatchStatus::Started, LifecycleEvent::Complete) => BatchStatus::Completed,
        (BatchStatus::Starting, LifecycleEvent::Fail(_)) => BatchStatus::Failed,
        (BatchStatus::Started, LifecycleEvent::Fail(_)) => BatchStatus::Failed,

        (from, _) if from.is_terminal() => {
            return Err(StateMachineError::AlreadyTerminal {
                entity: event.event_type().to_string(),
                state: from.to_string(),
            })
        }
        (from, event) => {
            return Err(StateMachineError::InvalidTransition {
                from: from.to_string(),
                event: event.event_type().to_string(),
            })
        }
    };

    Ok(target)
}
