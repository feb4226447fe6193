//! Artifact storage: uploaded signed files and the original source content
//!
//! The store is content-addressed. The key *is* the sha256 of the bytes
//! encoded into hex, so storing the same upload twice yields the same
//! reference.

use crate::error::WorkflowError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Opaque reference to stored content. The workflow engine only ever checks
/// it for emptiness and carries it around.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Eq, PartialEq)]
#[cbor(transparent)]
pub struct ArtifactRef(#[n(0)] String);

impl ArtifactRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for ArtifactRef {
    fn from(value: &str) -> Self {
        ArtifactRef(value.to_string())
    }
}

impl From<String> for ArtifactRef {
    fn from(value: String) -> Self {
        ArtifactRef(value)
    }
}

impl std::fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Descriptive metadata kept next to the stored bytes.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Eq, PartialEq)]
pub struct ArtifactMeta {
    #[n(0)]
    pub file_name: String,
    #[n(1)]
    pub content_type: Option<String>,
}

/// An incoming file as handed over by the caller (upload form, CLI path).
#[derive(Debug, Clone)]
pub struct ArtifactUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub content: Vec<u8>,
}

impl ArtifactUpload {
    pub fn meta(&self) -> ArtifactMeta {
        ArtifactMeta {
            file_name: self.file_name.clone(),
            content_type: self.content_type.clone(),
        }
    }
}

/// A resolved artifact: the bytes plus their metadata.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Eq, PartialEq)]
pub struct StoredArtifact {
    #[n(0)]
    pub meta: ArtifactMeta,
    #[n(1)]
    #[cbor(with = "minicbor::bytes")]
    pub content: Vec<u8>,
}

/// Persists uploaded files and hands back a reference. Implemented by the
/// surrounding system; a sled-backed implementation ships for tests, demos
/// and single-node deployments.
pub trait ArtifactStore: Send + Sync {
    fn store(&self, content: &[u8], meta: &ArtifactMeta) -> Result<ArtifactRef, WorkflowError>;
    fn resolve(&self, artifact: &ArtifactRef) -> Result<StoredArtifact, WorkflowError>;
}

/// Content-addressed blob store on a sled tree. We first encode the record
/// into CBOR then hash the raw content; the hash becomes the key pointing to
/// the encoded record.
pub struct SledArtifactStore {
    instance: Arc<sled::Db>,
}

impl SledArtifactStore {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self { instance }
    }
}

impl ArtifactStore for SledArtifactStore {
    fn store(&self, content: &[u8], meta: &ArtifactMeta) -> Result<ArtifactRef, WorkflowError> {
        if content.is_empty() {
            return Err(WorkflowError::MissingArtifact);
        }

        let hash = sha256::digest(content);
        let record = StoredArtifact {
            meta: meta.clone(),
            content: content.to_vec(),
        };
        let cbor =
            minicbor::to_vec(&record).map_err(|e| WorkflowError::ArtifactStore(e.to_string()))?;

        self.instance
            .insert(hash.as_bytes(), cbor)
            .map_err(|e| WorkflowError::ArtifactStore(e.to_string()))?;

        Ok(ArtifactRef(hash))
    }

    fn resolve(&self, artifact: &ArtifactRef) -> Result<StoredArtifact, WorkflowError> {
        let bytes = self
            .instance
            .get(artifact.as_str().as_bytes())
            .map_err(|e| WorkflowError::ArtifactStore(e.to_string()))?
            .ok_or_else(|| WorkflowError::NotFound(format!("artifact {artifact}")))?;

        let record: StoredArtifact = minicbor::decode(bytes.as_ref())?;
        Ok(record)
    }
}

/// Content-addressed store over a plain map, for tests and demos.
#[derive(Default)]
pub struct MemoryArtifactStore {
    blobs: RwLock<HashMap<String, StoredArtifact>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn store(&self, content: &[u8], meta: &ArtifactMeta) -> Result<ArtifactRef, WorkflowError> {
        if content.is_empty() {
            return Err(WorkflowError::MissingArtifact);
        }

        let hash = sha256::digest(content);
        let mut blobs = self.blobs.write().expect("lock poisoned");
        blobs.insert(
            hash.clone(),
            StoredArtifact {
                meta: meta.clone(),
                content: content.to_vec(),
            },
        );
        Ok(ArtifactRef(hash))
    }

    fn resolve(&self, artifact: &ArtifactRef) -> Result<StoredArtifact, WorkflowError> {
        let blobs = self.blobs.read().expect("lock poisoned");
        blobs
            .get(artifact.as_str())
            .cloned()
            .ok_or_else(|| WorkflowError::NotFound(format!("artifact {artifact}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_ref_encoding() {
        let original = ArtifactRef::from("abc123");

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decode: ArtifactRef = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn stored_artifact_roundtrip() {
        let original = StoredArtifact {
            meta: ArtifactMeta {
                file_name: "contract-signed.pdf".into(),
                content_type: Some("application/pdf".into()),
            },
            content: vec![0x25, 0x50, 0x44, 0x46],
        };

        let encoded = minicbor::to_vec(&original).unwrap();
        let decoded: StoredArtifact = minicbor::decode(&encoded).unwrap();

        assert_eq!(original, decoded);
    }
}
