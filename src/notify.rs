//! Turn and outcome notifications
//!
//! Fired by the service after a transition has committed. Delivery is
//! best-effort: a failed notification is logged and swallowed, the committed
//! envelope state is the source of truth.

use crate::error::WorkflowError;

/// What happened, from the notified participant's point of view.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum EventKind {
    /// It is now this participant's turn to sign.
    TurnStarted,
    /// Every slot signed; the envelope is done.
    EnvelopeCompleted,
    /// A participant rejected; the envelope is dead.
    EnvelopeRejected,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::TurnStarted => "turn_started",
            EventKind::EnvelopeCompleted => "envelope_completed",
            EventKind::EnvelopeRejected => "envelope_rejected",
        }
    }
}

pub trait NotificationHook: Send + Sync {
    fn notify(
        &self,
        signer_id: &str,
        envelope_id: &str,
        event: EventKind,
    ) -> Result<(), WorkflowError>;
}

/// Hook that only emits a structured log line. Useful as a default and in
/// deployments where delivery runs off the audit log.
pub struct LoggingHook;

impl NotificationHook for LoggingHook {
    fn notify(
        &self,
        signer_id: &str,
        envelope_id: &str,
        event: EventKind,
    ) -> Result<(), WorkflowError> {
        tracing::info!(
            signer_id = %signer_id,
            envelope_id = %envelope_id,
            event = %event.name(),
            "notification sent"
        );
        Ok(())
    }
}
