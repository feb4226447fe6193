//! Core envelope and signer-slot types
use crate::artifact::ArtifactRef;
use crate::error::WorkflowError;
use crate::utils;
use chrono::{DateTime, TimeZone, Utc};

/// Status of a single signer slot within an envelope's chain.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq)]
pub enum SlotStatus {
    #[n(0)]
    NotStarted,
    #[n(1)]
    Waiting,
    #[n(2)]
    Signed,
    #[n(3)]
    Rejected,
}

/// Envelope-level status, always derived from the slots. Never set directly
/// by callers.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq)]
pub enum EnvelopeStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    InProgress,
    #[n(2)]
    Completed,
    #[n(3)]
    Rejected,
}

impl EnvelopeStatus {
    /// Completed and Rejected envelopes accept no further transitions.
    pub fn is_final(&self) -> bool {
        matches!(self, EnvelopeStatus::Completed | EnvelopeStatus::Rejected)
    }
}

impl std::fmt::Display for EnvelopeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EnvelopeStatus::Draft => "draft",
            EnvelopeStatus::InProgress => "in progress",
            EnvelopeStatus::Completed => "completed",
            EnvelopeStatus::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// One ordered position in an envelope's signing chain.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Eq, PartialEq)]
pub struct SignerSlot {
    #[n(0)]
    pub order: u32, // 1-based, contiguous within the envelope
    #[n(1)]
    pub signer_id: String,
    #[n(2)]
    pub role: String, // display only, not used in transitions
    #[n(3)]
    pub status: SlotStatus,
    #[n(4)]
    pub artifact: Option<ArtifactRef>, // set only once the slot is Signed
    #[n(5)]
    pub acted_at: Option<TimeStamp<Utc>>,
    #[n(6)]
    pub comment: Option<String>, // signing note or rejection reason
    #[n(7)]
    pub external_link: Option<String>, // signing portal URL, informational
}

impl SignerSlot {
    fn from_spec(order: u32, spec: SignerSpec) -> Self {
        Self {
            order,
            signer_id: spec.signer_id,
            role: spec.role,
            status: SlotStatus::NotStarted,
            artifact: None,
            acted_at: None,
            comment: None,
            external_link: spec.external_link,
        }
    }
}

/// A participant to be placed in an envelope's chain, in submission order.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SignerSpec {
    pub signer_id: String,
    pub role: String,
    pub external_link: Option<String>,
}

impl SignerSpec {
    pub fn new(signer_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            signer_id: signer_id.into(),
            role: role.into(),
            external_link: None,
        }
    }
    pub fn with_external_link(mut self, link: impl Into<String>) -> Self {
        self.external_link = Some(link.into());
        self
    }
}

/// The document or record passing through the signing chain, together with
/// its ordered slots. Slots are owned exclusively by the envelope and only
/// the engine mutates them.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Eq, PartialEq)]
pub struct Envelope {
    #[n(0)]
    pub id: String, // uuid7, bech32 encoded
    #[n(1)]
    pub title: String,
    #[n(2)]
    pub description: Option<String>,
    #[n(3)]
    pub source_artifact: ArtifactRef, // the original, unsigned content
    #[n(4)]
    pub(crate) status: EnvelopeStatus,
    #[n(5)]
    pub(crate) slots: Vec<SignerSlot>,
}

impl Envelope {
    /// Construct a new builder object, this becomes the basis for a draft
    pub fn builder() -> EnvelopeBuilder {
        EnvelopeBuilder::default()
    }

    pub fn status(&self) -> EnvelopeStatus {
        self.status
    }

    pub fn slots(&self) -> &[SignerSlot] {
        &self.slots
    }

    pub fn signed_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.status == SlotStatus::Signed)
            .count()
    }
}

/// Builder for a new envelope. Signers are appended in chain order and get
/// their 1-based slot numbers on build.
#[derive(Debug, Default)]
pub struct EnvelopeBuilder {
    title: Option<String>,
    description: Option<String>,
    source_artifact: Option<ArtifactRef>,
    signers: Vec<SignerSpec>,
}

impl EnvelopeBuilder {
    pub fn set_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
    pub fn set_source_artifact(mut self, artifact: ArtifactRef) -> Self {
        self.source_artifact = Some(artifact);
        self
    }
    pub fn add_signer(mut self, spec: SignerSpec) -> Self {
        self.signers.push(spec);
        self
    }

    /// Checks fields, then produces the envelope with its first slot already
    /// promoted to Waiting. An envelope is never left with no slot started.
    pub fn build(self) -> Result<Envelope, WorkflowError> {
        let Some(title) = self.title else {
            return Err(WorkflowError::InvalidDefinition("title is not set".into()));
        };
        let Some(source_artifact) = self.source_artifact else {
            return Err(WorkflowError::InvalidDefinition(
                "source artifact is not set".into(),
            ));
        };
        if source_artifact.is_empty() {
            return Err(WorkflowError::InvalidDefinition(
                "source artifact is empty".into(),
            ));
        }
        if self.signers.is_empty() {
            return Err(WorkflowError::InvalidDefinition(
                "signer list is empty".into(),
            ));
        }
        if self.signers.iter().any(|s| s.signer_id.trim().is_empty()) {
            return Err(WorkflowError::InvalidDefinition(
                "signer id is empty".into(),
            ));
        }

        let mut slots: Vec<SignerSlot> = self
            .signers
            .into_iter()
            .enumerate()
            .map(|(i, spec)| SignerSlot::from_spec(i as u32 + 1, spec))
            .collect();

        // the chain starts immediately: slot #1 is waiting from creation
        slots[0].status = SlotStatus::Waiting;

        Ok(Envelope {
            id: utils::new_uuid_to_bech32("env_")?,
            title,
            description: self.description,
            source_artifact,
            status: crate::engine::derive_status(&slots),
            slots,
        })
    }
}
