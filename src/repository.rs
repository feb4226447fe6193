//! Envelope persistence with optimistic concurrency
//!
//! Two callers racing on the same envelope must not both advance the chain.
//! Every save names the version it read; the store commits exactly one
//! writer per version and the loser gets `ConcurrentModification`.

use crate::engine;
use crate::envelope::Envelope;
use crate::error::WorkflowError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// An envelope as read from the store, together with the version to quote
/// back on save.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Eq, PartialEq)]
pub struct StoredEnvelope {
    #[n(0)]
    pub version: u64,
    #[n(1)]
    pub envelope: Envelope,
}

pub trait EnvelopeRepository: Send + Sync {
    /// Persist a freshly built envelope at version 1.
    fn create(&self, envelope: &Envelope) -> Result<(), WorkflowError>;

    /// Load an envelope and its current version.
    fn load(&self, envelope_id: &str) -> Result<StoredEnvelope, WorkflowError>;

    /// Persist an updated envelope, expecting the version read earlier.
    /// Returns the committed version.
    fn save(&self, envelope: &Envelope, expected_version: u64) -> Result<u64, WorkflowError>;
}

/// Sled-backed repository. The envelope id is the key; the value is the
/// CBOR-encoded record with the version counter embedded. Saves go through
/// `compare_and_swap` on the full record, so of two racing writers exactly
/// one commits.
pub struct SledEnvelopeRepository {
    instance: Arc<sled::Db>,
}

impl SledEnvelopeRepository {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self { instance }
    }
}

impl EnvelopeRepository for SledEnvelopeRepository {
    fn create(&self, envelope: &Envelope) -> Result<(), WorkflowError> {
        let record = StoredEnvelope {
            version: 1,
            envelope: envelope.clone(),
        };
        let cbor = minicbor::to_vec(&record)?;

        self.instance
            .compare_and_swap(
                envelope.id.as_bytes(),
                None as Option<&[u8]>,
                Some(cbor),
            )?
            .map_err(|_| WorkflowError::Storage(format!("envelope {} already exists", envelope.id)))
    }

    fn load(&self, envelope_id: &str) -> Result<StoredEnvelope, WorkflowError> {
        let bytes = self
            .instance
            .get(envelope_id.as_bytes())?
            .ok_or_else(|| WorkflowError::NotFound(format!("envelope {envelope_id}")))?;

        let mut record: StoredEnvelope = minicbor::decode(bytes.as_ref())?;
        // the status field is derived; repair it from the slots in case the
        // stored record predates a derivation change
        record.envelope.status = engine::derive_status(record.envelope.slots());
        Ok(record)
    }

    fn save(&self, envelope: &Envelope, expected_version: u64) -> Result<u64, WorkflowError> {
        let key = envelope.id.as_bytes();
        let current = self
            .instance
            .get(key)?
            .ok_or_else(|| WorkflowError::NotFound(format!("envelope {}", envelope.id)))?;

        let stored: StoredEnvelope = minicbor::decode(current.as_ref())?;
        if stored.version != expected_version {
            return Err(WorkflowError::ConcurrentModification);
        }

        let next = StoredEnvelope {
            version: expected_version + 1,
            envelope: envelope.clone(),
        };
        let cbor = minicbor::to_vec(&next)?;

        self.instance
            .compare_and_swap(key, Some(current), Some(cbor))?
            .map_err(|_| WorkflowError::ConcurrentModification)?;

        Ok(next.version)
    }
}

/// Versioned map-backed repository, for tests and demos. Same commit rule as
/// the sled adapter: one writer per version.
#[derive(Default)]
pub struct MemoryEnvelopeRepository {
    records: RwLock<HashMap<String, StoredEnvelope>>,
}

impl MemoryEnvelopeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EnvelopeRepository for MemoryEnvelopeRepository {
    fn create(&self, envelope: &Envelope) -> Result<(), WorkflowError> {
        let mut records = self.records.write().expect("lock poisoned");
        if records.contains_key(&envelope.id) {
            return Err(WorkflowError::Storage(format!(
                "envelope {} already exists",
                envelope.id
            )));
        }
        records.insert(
            envelope.id.clone(),
            StoredEnvelope {
                version: 1,
                envelope: envelope.clone(),
            },
        );
        Ok(())
    }

    fn load(&self, envelope_id: &str) -> Result<StoredEnvelope, WorkflowError> {
        let records = self.records.read().expect("lock poisoned");
        records
            .get(envelope_id)
            .cloned()
            .ok_or_else(|| WorkflowError::NotFound(format!("envelope {envelope_id}")))
    }

    fn save(&self, envelope: &Envelope, expected_version: u64) -> Result<u64, WorkflowError> {
        let mut records = self.records.write().expect("lock poisoned");
        let stored = records
            .get_mut(&envelope.id)
            .ok_or_else(|| WorkflowError::NotFound(format!("envelope {}", envelope.id)))?;

        if stored.version != expected_version {
            return Err(WorkflowError::ConcurrentModification);
        }
        stored.version = expected_version + 1;
        stored.envelope = envelope.clone();
        Ok(stored.version)
    }
}
