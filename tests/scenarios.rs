//! End-to-end signing chain scenarios against the sled-backed service

use anyhow::Context;
use signoff::artifact::{ArtifactStore, ArtifactUpload, SledArtifactStore};
use signoff::auth::{RequestContext, StaticAuth};
use signoff::envelope::{EnvelopeStatus, SignerSpec, SlotStatus};
use signoff::error::WorkflowError;
use signoff::notify::LoggingHook;
use signoff::repository::{EnvelopeRepository, SledEnvelopeRepository};
use signoff::service::EnvelopeService;
use std::sync::Arc;
use tempfile::tempdir;

fn pdf_upload(name: &str) -> ArtifactUpload {
    ArtifactUpload {
        file_name: format!("{name}.pdf"),
        content_type: Some("application/pdf".into()),
        content: format!("%PDF {name}").into_bytes(),
    }
}

/// Service over a fresh sled db with tokens tok-<signer> mapped to each
/// given signer. Sled uses file-based locking to prevent concurrent access,
/// so each test gets its own database under a tempdir for simple cleanup.
fn service_with(
    db: Arc<sled::Db>,
    signers: &[&str],
) -> EnvelopeService {
    let mut auth = StaticAuth::new();
    for signer in signers {
        auth = auth.with_actor(format!("tok-{signer}"), *signer);
    }
    EnvelopeService::new(
        Arc::new(SledEnvelopeRepository::new(db.clone())),
        Arc::new(SledArtifactStore::new(db)),
        Arc::new(auth),
        Arc::new(LoggingHook),
    )
}

fn ctx(signer: &str) -> RequestContext {
    RequestContext::new(format!("tok-{signer}"))
}

#[test]
fn fresh_envelope_waits_on_the_first_signer() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = Arc::new(sled::open(temp_dir.path().join("fresh.db"))?);
    let service = service_with(db.clone(), &["a", "b", "c"]);

    let artifacts = SledArtifactStore::new(db);
    let source = artifacts.store(b"contract body", &pdf_upload("contract").meta())?;

    let view = service.create_envelope(
        "Rental contract",
        Some("Unit 4B"),
        source,
        vec![
            SignerSpec::new("a", "Account Manager"),
            SignerSpec::new("b", "Client"),
            SignerSpec::new("c", "Witness"),
        ],
    )?;

    assert_eq!(view.envelope.slots()[0].status, SlotStatus::Waiting);
    assert_eq!(view.envelope.slots()[1].status, SlotStatus::NotStarted);
    assert_eq!(view.envelope.slots()[2].status, SlotStatus::NotStarted);
    assert_eq!(view.envelope.status(), EnvelopeStatus::InProgress);
    assert_eq!(view.current_signer.as_deref(), Some("a"));
    assert_eq!(view.progress_percent, 0);

    Ok(())
}

#[test]
fn first_signature_advances_the_chain() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = Arc::new(sled::open(temp_dir.path().join("advance.db"))?);
    let service = service_with(db.clone(), &["a", "b", "c"]);

    let source = SledArtifactStore::new(db).store(b"contract body", &pdf_upload("contract").meta())?;
    let view = service.create_envelope(
        "Rental contract",
        None,
        source,
        vec![
            SignerSpec::new("a", "Account Manager"),
            SignerSpec::new("b", "Client"),
            SignerSpec::new("c", "Witness"),
        ],
    )?;

    let view = service
        .sign(&ctx("a"), &view.envelope.id, "a", &pdf_upload("signed-a"), None)
        .context("first signer failed to sign: ")?;

    assert_eq!(view.envelope.slots()[0].status, SlotStatus::Signed);
    assert!(view.envelope.slots()[0].artifact.is_some());
    assert!(view.envelope.slots()[0].acted_at.is_some());
    assert_eq!(view.envelope.slots()[1].status, SlotStatus::Waiting);
    assert_eq!(view.envelope.status(), EnvelopeStatus::InProgress);
    assert_eq!(view.current_signer.as_deref(), Some("b"));
    assert_eq!(view.progress_percent, 33);

    Ok(())
}

#[test]
fn rejection_kills_the_envelope_and_freezes_later_slots() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = Arc::new(sled::open(temp_dir.path().join("reject.db"))?);
    let service = service_with(db.clone(), &["a", "b", "c"]);

    let source = SledArtifactStore::new(db).store(b"contract body", &pdf_upload("contract").meta())?;
    let view = service.create_envelope(
        "Rental contract",
        None,
        source,
        vec![
            SignerSpec::new("a", "Account Manager"),
            SignerSpec::new("b", "Client"),
            SignerSpec::new("c", "Witness"),
        ],
    )?;
    let envelope_id = view.envelope.id.clone();

    service.sign(&ctx("a"), &envelope_id, "a", &pdf_upload("signed-a"), None)?;
    let view = service.reject(&ctx("b"), &envelope_id, "b", "incorrect data")?;

    assert_eq!(view.envelope.status(), EnvelopeStatus::Rejected);
    assert_eq!(view.envelope.slots()[1].status, SlotStatus::Rejected);
    assert_eq!(view.envelope.slots()[1].comment.as_deref(), Some("incorrect data"));
    assert_eq!(view.envelope.slots()[2].status, SlotStatus::NotStarted);
    assert_eq!(view.current_signer, None);
    assert_eq!(view.progress_percent, 33);

    // the third signer never gets a turn
    let late = service.sign(&ctx("c"), &envelope_id, "c", &pdf_upload("late"), None);
    assert!(matches!(late, Err(WorkflowError::AlreadyFinal(_))));

    Ok(())
}

#[test]
fn out_of_turn_signer_is_turned_away_without_state_change() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = Arc::new(sled::open(temp_dir.path().join("turn.db"))?);
    let service = service_with(db.clone(), &["a", "c"]);

    let source = SledArtifactStore::new(db).store(b"contract body", &pdf_upload("contract").meta())?;
    let view = service.create_envelope(
        "Two-party agreement",
        None,
        source,
        vec![
            SignerSpec::new("a", "Account Manager"),
            SignerSpec::new("c", "Witness"),
        ],
    )?;
    let envelope_id = view.envelope.id.clone();

    let result = service.sign(&ctx("c"), &envelope_id, "c", &pdf_upload("early"), None);
    assert!(matches!(
        result,
        Err(WorkflowError::WrongSigner { ref expected, ref got }) if expected == "a" && got == "c"
    ));

    let view = service.status(&envelope_id)?;
    assert_eq!(view.envelope.slots()[0].status, SlotStatus::Waiting);
    assert_eq!(view.envelope.slots()[1].status, SlotStatus::NotStarted);
    assert_eq!(view.current_signer.as_deref(), Some("a"));

    Ok(())
}

#[test]
fn sole_signer_completes_in_one_step() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = Arc::new(sled::open(temp_dir.path().join("solo.db"))?);
    let service = service_with(db.clone(), &["solo"]);

    let source = SledArtifactStore::new(db).store(b"timesheet", &pdf_upload("sheet").meta())?;
    let view = service.create_envelope(
        "Overtime sheet",
        None,
        source,
        vec![SignerSpec::new("solo", "Supervisor")],
    )?;

    let view = service.sign(&ctx("solo"), &view.envelope.id, "solo", &pdf_upload("signed"), None)?;

    assert_eq!(view.envelope.status(), EnvelopeStatus::Completed);
    assert_eq!(view.current_signer, None);
    assert_eq!(view.progress_percent, 100);

    Ok(())
}

#[test]
fn racing_writers_advance_the_chain_exactly_once() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = Arc::new(sled::open(temp_dir.path().join("race.db"))?);
    let service = service_with(db.clone(), &["a", "b"]);

    let repository = SledEnvelopeRepository::new(db.clone());
    let source = SledArtifactStore::new(db).store(b"contract body", &pdf_upload("contract").meta())?;
    let view = service.create_envelope(
        "Rental contract",
        None,
        source,
        vec![
            SignerSpec::new("a", "Account Manager"),
            SignerSpec::new("b", "Client"),
        ],
    )?;
    let envelope_id = view.envelope.id.clone();

    // a second writer reads the record, then the first signer commits
    let stale = repository.load(&envelope_id)?;
    service.sign(&ctx("a"), &envelope_id, "a", &pdf_upload("signed-a"), None)?;

    // the stale writer must lose its save
    let lost = repository.save(&stale.envelope, stale.version);
    assert!(matches!(lost, Err(WorkflowError::ConcurrentModification)));

    // and the chain advanced exactly once
    let view = service.status(&envelope_id)?;
    assert_eq!(view.envelope.signed_count(), 1);
    assert_eq!(view.current_signer.as_deref(), Some("b"));

    Ok(())
}

#[test]
fn concurrent_sign_calls_commit_a_single_signature() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = Arc::new(sled::open(temp_dir.path().join("threads.db"))?);
    let service = Arc::new(service_with(db.clone(), &["solo"]));

    let source = SledArtifactStore::new(db).store(b"timesheet", &pdf_upload("sheet").meta())?;
    let view = service.create_envelope(
        "Overtime sheet",
        None,
        source,
        vec![SignerSpec::new("solo", "Supervisor")],
    )?;
    let envelope_id = view.envelope.id.clone();

    let outcomes: Vec<bool> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|i| {
                let service = Arc::clone(&service);
                let envelope_id = envelope_id.clone();
                scope.spawn(move || {
                    service
                        .sign(
                            &ctx("solo"),
                            &envelope_id,
                            "solo",
                            &pdf_upload(&format!("attempt-{i}")),
                            None,
                        )
                        .is_ok()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // exactly one of the two calls wins the slot
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);

    let view = service.status(&envelope_id)?;
    assert_eq!(view.envelope.status(), EnvelopeStatus::Completed);
    assert_eq!(view.envelope.signed_count(), 1);

    Ok(())
}
