//! Walk a three-party envelope through its full signing chain.
//!
//! Run with: cargo run --example walkthrough

use signoff::artifact::{ArtifactMeta, ArtifactStore, ArtifactUpload, SledArtifactStore};
use signoff::auth::{RequestContext, StaticAuth};
use signoff::envelope::SignerSpec;
use signoff::notify::LoggingHook;
use signoff::repository::SledEnvelopeRepository;
use signoff::service::EnvelopeService;
use std::sync::Arc;

fn upload(name: &str) -> ArtifactUpload {
    ArtifactUpload {
        file_name: format!("{name}.pdf"),
        content_type: Some("application/pdf".into()),
        content: format!("%PDF {name}").into_bytes(),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    let temp_dir = tempfile::tempdir()?;
    let db = Arc::new(sled::open(temp_dir.path().join("walkthrough.db"))?);

    let auth = StaticAuth::new()
        .with_actor("tok-ana", "ana")
        .with_actor("tok-bruno", "bruno")
        .with_actor("tok-clara", "clara");

    let artifacts = Arc::new(SledArtifactStore::new(db.clone()));
    let service = EnvelopeService::new(
        Arc::new(SledEnvelopeRepository::new(db)),
        artifacts.clone(),
        Arc::new(auth),
        Arc::new(LoggingHook),
    );

    // store the original document, then open the envelope over it
    let source = artifacts.store(
        b"%PDF rental contract, unit 4B",
        &ArtifactMeta {
            file_name: "contract.pdf".into(),
            content_type: Some("application/pdf".into()),
        },
    )?;

    let view = service.create_envelope(
        "Rental contract - unit 4B",
        Some("Twelve month lease, starting August"),
        source,
        vec![
            SignerSpec::new("ana", "Account Manager"),
            SignerSpec::new("bruno", "Client"),
            SignerSpec::new("clara", "Witness").with_external_link("https://sign.example/clara"),
        ],
    )?;
    let envelope_id = view.envelope.id.clone();
    println!(
        "created {} - current signer: {:?}, progress {}%",
        envelope_id, view.current_signer, view.progress_percent
    );

    for signer in ["ana", "bruno", "clara"] {
        let view = service.sign(
            &RequestContext::new(format!("tok-{signer}")),
            &envelope_id,
            signer,
            &upload(&format!("contract-{signer}")),
            None,
        )?;
        println!(
            "{} signed - status: {}, progress {}%",
            signer,
            view.envelope.status(),
            view.progress_percent
        );
    }

    let view = service.status(&envelope_id)?;
    for slot in view.envelope.slots() {
        println!(
            "slot {} {} ({}) -> {:?}",
            slot.order, slot.signer_id, slot.role, slot.status
        );
    }

    Ok(())
}
