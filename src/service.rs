//! Service layer API for co-signature workflow operations
//!
//! Thin orchestration over the pure engine: look the envelope up, check the
//! acting identity, store the upload, apply the transition, persist, notify.
//! Nothing here recomputes workflow state on its own.

use crate::artifact::{ArtifactRef, ArtifactStore, ArtifactUpload};
use crate::auth::{AuthorizationProvider, RequestContext};
use crate::engine;
use crate::envelope::{Envelope, EnvelopeStatus, SignerSpec};
use crate::error::WorkflowError;
use crate::notify::{EventKind, NotificationHook};
use crate::repository::EnvelopeRepository;
use std::sync::Arc;

/// Approval constraints for the service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// How often a transition is retried after losing a version race before
    /// the conflict is surfaced to the caller.
    pub max_retries: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

/// An envelope as handed to callers: the record itself plus the two derived
/// facts every screen needs.
#[derive(Debug, Clone)]
pub struct EnvelopeView {
    pub envelope: Envelope,
    /// Whose turn it is, `None` once the envelope is final.
    pub current_signer: Option<String>,
    pub progress_percent: u8,
}

impl From<Envelope> for EnvelopeView {
    fn from(envelope: Envelope) -> Self {
        let current_signer = engine::current_slot(&envelope).map(|s| s.signer_id.clone());
        let progress_percent = engine::progress_percent(&envelope);
        Self {
            envelope,
            current_signer,
            progress_percent,
        }
    }
}

pub struct EnvelopeService {
    repository: Arc<dyn EnvelopeRepository>,
    artifacts: Arc<dyn ArtifactStore>,
    auth: Arc<dyn AuthorizationProvider>,
    notifier: Arc<dyn NotificationHook>,
    config: ServiceConfig,
}

impl EnvelopeService {
    pub fn new(
        repository: Arc<dyn EnvelopeRepository>,
        artifacts: Arc<dyn ArtifactStore>,
        auth: Arc<dyn AuthorizationProvider>,
        notifier: Arc<dyn NotificationHook>,
    ) -> Self {
        Self {
            repository,
            artifacts,
            auth,
            notifier,
            config: ServiceConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Open a new envelope over already-stored source content, with the
    /// participants in signing order. The first signer's turn starts
    /// immediately.
    pub fn create_envelope(
        &self,
        title: &str,
        description: Option<&str>,
        source_artifact: ArtifactRef,
        signers: Vec<SignerSpec>,
    ) -> Result<EnvelopeView, WorkflowError> {
        let mut builder = Envelope::builder()
            .set_title(title)
            .set_source_artifact(source_artifact);
        if let Some(description) = description {
            builder = builder.set_description(description);
        }
        for spec in signers {
            builder = builder.add_signer(spec);
        }

        let envelope = builder.build()?;
        self.repository.create(&envelope)?;

        tracing::info!(envelope_id = %envelope.id, "envelope created");
        self.dispatch_notifications(&envelope);

        Ok(EnvelopeView::from(envelope))
    }

    /// Sign the waiting slot as `signer_id`, attaching the uploaded file.
    ///
    /// The upload is persisted before the transition; when storage fails the
    /// chain does not move. A lost version race is retried a bounded number
    /// of times against the re-read record.
    pub fn sign(
        &self,
        ctx: &RequestContext,
        envelope_id: &str,
        signer_id: &str,
        upload: &ArtifactUpload,
        comment: Option<&str>,
    ) -> Result<EnvelopeView, WorkflowError> {
        self.authorize(ctx, signer_id)?;

        if upload.content.is_empty() {
            return Err(WorkflowError::MissingArtifact);
        }
        let artifact = self.artifacts.store(&upload.content, &upload.meta())?;

        let committed = self.apply_with_retry(envelope_id, |envelope| {
            engine::sign(envelope, signer_id, &artifact, comment)
        })?;

        tracing::info!(
            envelope_id = %envelope_id,
            signer_id = %signer_id,
            status = %committed.status(),
            "slot signed"
        );
        self.dispatch_notifications(&committed);

        Ok(EnvelopeView::from(committed))
    }

    /// Reject the waiting slot as `signer_id`, killing the envelope.
    pub fn reject(
        &self,
        ctx: &RequestContext,
        envelope_id: &str,
        signer_id: &str,
        reason: &str,
    ) -> Result<EnvelopeView, WorkflowError> {
        self.authorize(ctx, signer_id)?;

        let committed = self.apply_with_retry(envelope_id, |envelope| {
            engine::reject(envelope, signer_id, reason)
        })?;

        tracing::info!(
            envelope_id = %envelope_id,
            signer_id = %signer_id,
            "slot rejected"
        );
        self.dispatch_notifications(&committed);

        Ok(EnvelopeView::from(committed))
    }

    /// Current state of an envelope, with the current signer and progress.
    pub fn status(&self, envelope_id: &str) -> Result<EnvelopeView, WorkflowError> {
        let stored = self.repository.load(envelope_id)?;
        Ok(EnvelopeView::from(stored.envelope))
    }

    // the claimed signer must be the identity behind the request
    fn authorize(&self, ctx: &RequestContext, signer_id: &str) -> Result<(), WorkflowError> {
        let actor = self.auth.current_actor(ctx)?;
        if actor != signer_id {
            return Err(WorkflowError::Forbidden);
        }
        Ok(())
    }

    // load-apply-save, re-reading and re-applying on a lost version race up
    // to the configured bound
    fn apply_with_retry(
        &self,
        envelope_id: &str,
        transition: impl Fn(&Envelope) -> Result<Envelope, WorkflowError>,
    ) -> Result<Envelope, WorkflowError> {
        let mut attempt = 0;
        loop {
            let stored = self.repository.load(envelope_id)?;
            let next = transition(&stored.envelope)?;

            match self.repository.save(&next, stored.version) {
                Ok(_) => return Ok(next),
                Err(WorkflowError::ConcurrentModification) if attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::debug!(
                        envelope_id = %envelope_id,
                        attempt,
                        "lost version race, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    // best-effort: a notification failure never rolls back a committed
    // transition
    fn dispatch_notifications(&self, envelope: &Envelope) {
        match envelope.status() {
            status if status.is_final() => {
                let event = if status == EnvelopeStatus::Completed {
                    EventKind::EnvelopeCompleted
                } else {
                    EventKind::EnvelopeRejected
                };
                for slot in envelope.slots() {
                    self.notify(&slot.signer_id, &envelope.id, event);
                }
            }
            _ => {
                if let Some(slot) = engine::current_slot(envelope) {
                    self.notify(&slot.signer_id, &envelope.id, EventKind::TurnStarted);
                }
            }
        }
    }

    fn notify(&self, signer_id: &str, envelope_id: &str, event: EventKind) {
        if let Err(e) = self.notifier.notify(signer_id, envelope_id, event) {
            tracing::warn!(
                signer_id = %signer_id,
                envelope_id = %envelope_id,
                event = %event.name(),
                error = %e,
                "notification failed"
            );
        }
    }
}
