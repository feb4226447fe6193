//! Pure transition logic for the signing chain
//!
//! Every transition takes an envelope by reference and returns the updated
//! envelope, so a failed precondition never leaves partial state behind.
//! All status derivation lives here; nothing else in the crate computes
//! "whose turn is it" or "what is the envelope's status" on its own.

use crate::artifact::ArtifactRef;
use crate::envelope::{Envelope, EnvelopeStatus, SignerSlot, SlotStatus, TimeStamp};
use crate::error::WorkflowError;

/// Derive the envelope status from its slots.
///
/// A rejected slot poisons the whole envelope. An envelope is complete only
/// when every slot has signed. Anything with at least one started slot is in
/// progress; a slot set nobody has touched is a draft.
pub fn derive_status(slots: &[SignerSlot]) -> EnvelopeStatus {
    if slots.is_empty() {
        return EnvelopeStatus::Draft;
    }
    if slots.iter().any(|s| s.status == SlotStatus::Rejected) {
        EnvelopeStatus::Rejected
    } else if slots.iter().all(|s| s.status == SlotStatus::Signed) {
        EnvelopeStatus::Completed
    } else if slots
        .iter()
        .any(|s| matches!(s.status, SlotStatus::Waiting | SlotStatus::Signed))
    {
        EnvelopeStatus::InProgress
    } else {
        EnvelopeStatus::Draft
    }
}

/// The slot whose turn it is: the lowest order with status Waiting.
///
/// At most one slot is ever Waiting, guaranteed by `sign` only promoting the
/// immediate next order. The lowest-order rule is the tie-break should a
/// hand-edited record ever violate that.
pub fn current_slot(envelope: &Envelope) -> Option<&SignerSlot> {
    envelope
        .slots()
        .iter()
        .filter(|s| s.status == SlotStatus::Waiting)
        .min_by_key(|s| s.order)
}

/// Signed slots over total slots, as a rounded percentage.
pub fn progress_percent(envelope: &Envelope) -> u8 {
    let total = envelope.slots().len();
    if total == 0 {
        return 0;
    }
    let signed = envelope.signed_count();
    ((signed as f64 / total as f64) * 100.0).round() as u8
}

/// Apply a signature by `signer_id` with the stored `artifact`.
///
/// The waiting slot must belong to the acting signer. On success the slot
/// becomes Signed, the next slot (if any) becomes Waiting and the envelope
/// status is re-derived; signing the last slot completes the envelope.
pub fn sign(
    envelope: &Envelope,
    signer_id: &str,
    artifact: &ArtifactRef,
    comment: Option<&str>,
) -> Result<Envelope, WorkflowError> {
    if envelope.status().is_final() {
        return Err(WorkflowError::AlreadyFinal(envelope.status()));
    }
    if artifact.is_empty() {
        return Err(WorkflowError::MissingArtifact);
    }

    let mut next = envelope.clone();
    let acted_order = {
        let slot = waiting_slot_mut(&mut next, signer_id)?;
        slot.status = SlotStatus::Signed;
        slot.artifact = Some(artifact.clone());
        slot.comment = comment.map(str::to_string);
        slot.acted_at = Some(TimeStamp::new());
        slot.order
    };

    // only ever promote the immediate next order, never more than one
    if let Some(upcoming) = next.slots.iter_mut().find(|s| s.order == acted_order + 1) {
        upcoming.status = SlotStatus::Waiting;
    }

    next.status = derive_status(&next.slots);
    Ok(next)
}

/// Apply a rejection by `signer_id` with a mandatory reason.
///
/// Rejection is terminal for the whole envelope: later slots are left
/// untouched and never become Waiting. Resubmission means a new envelope.
pub fn reject(
    envelope: &Envelope,
    signer_id: &str,
    reason: &str,
) -> Result<Envelope, WorkflowError> {
    if envelope.status().is_final() {
        return Err(WorkflowError::AlreadyFinal(envelope.status()));
    }
    if reason.trim().is_empty() {
        return Err(WorkflowError::EmptyReason);
    }

    let mut next = envelope.clone();
    {
        let slot = waiting_slot_mut(&mut next, signer_id)?;
        slot.status = SlotStatus::Rejected;
        slot.comment = Some(reason.to_string());
        slot.acted_at = Some(TimeStamp::new());
    }

    next.status = derive_status(&next.slots);
    Ok(next)
}

// resolve the waiting slot and check it belongs to the acting signer
fn waiting_slot_mut<'a>(
    envelope: &'a mut Envelope,
    signer_id: &str,
) -> Result<&'a mut SignerSlot, WorkflowError> {
    let slot = envelope
        .slots
        .iter_mut()
        .filter(|s| s.status == SlotStatus::Waiting)
        .min_by_key(|s| s.order)
        .ok_or(WorkflowError::NoWaitingSlot)?;

    if slot.signer_id != signer_id {
        return Err(WorkflowError::WrongSigner {
            expected: slot.signer_id.clone(),
            got: signer_id.to_string(),
        });
    }
    Ok(slot)
}
