//! # Core Domain Entities
//!
//! Defines the anchoring entities shared by the queue, the workers and the
//! transaction ledger.
//!
//! ## Clusters
//!
//! - **Jobs**: `AnchorRequest`, `AnchorJob`, `AnchorPayload`, `JobKind`
//! - **Ownership**: `EntityRef`, `EntityType`, `UserId`
//! - **Ledger outcome**: `LedgerReceipt`, `TransactionRecord`, `TxId`
//! - **Content addressing**: `ContentHash`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

use crate::errors::LedgerError;

// =============================================================================
// CLUSTER A: IDENTIFIERS
// =============================================================================

/// Queue-assigned job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the user that triggered a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of domain record that can own an anchoring job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Document,
    Consultation,
    Prescription,
    MedicalRecord,
    PointsAward,
    User,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Consultation => "consultation",
            Self::Prescription => "prescription",
            Self::MedicalRecord => "medical_record",
            Self::PointsAward => "points_award",
            Self::User => "user",
        }
    }
}

/// Reference to the domain record a job updates on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: EntityType,
    pub id: u64,
}

impl EntityRef {
    pub fn new(entity_type: EntityType, id: u64) -> Self {
        Self { entity_type, id }
    }

    pub fn document(id: u64) -> Self {
        Self::new(EntityType::Document, id)
    }

    pub fn consultation(id: u64) -> Self {
        Self::new(EntityType::Consultation, id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type.as_str(), self.id)
    }
}

/// A SHA-256 digest used as cache and dedup key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Hash arbitrary bytes.
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Self(out)
    }

    /// Hash several parts with length prefixes so `("ab","c")` and `("a","bc")` differ.
    pub fn of_parts(parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part);
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        Self(out)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..12])
    }
}

impl Serialize for ContentHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).ok_or_else(|| serde::de::Error::custom("invalid content hash"))
    }
}

/// Hex encoding for raw payload bytes in persisted jobs.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// CLUSTER B: JOBS
// =============================================================================

/// Operation family of a job. Each kind has its own worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    ConsensusSubmit,
    FileStore,
}

impl JobKind {
    pub const ALL: [JobKind; 2] = [JobKind::ConsensusSubmit, JobKind::FileStore];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConsensusSubmit => "consensus-submit",
            Self::FileStore => "file-store",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consensus topic reference (e.g. `0.0.4512`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicRef(pub String);

impl fmt::Display for TopicRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Domain event that is anchored on the consensus log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsensusEventType {
    ConsultationCreated,
    ConsultationCompleted,
    PrescriptionIssued,
    MedicalRecordUpdated,
    DocumentUploaded,
    PointsAwarded,
    AccessGranted,
}

/// Message submitted to the consensus log for a domain event.
///
/// Serialised to JSON; the JSON bytes are the submitted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusEnvelope {
    pub version: u16,
    pub event_type: ConsensusEventType,
    pub entity: EntityRef,
    pub requester_id: UserId,
    pub data_hash: ContentHash,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl ConsensusEnvelope {
    pub const VERSION: u16 = 1;

    pub fn new(
        event_type: ConsensusEventType,
        entity: EntityRef,
        requester_id: UserId,
        data_hash: ContentHash,
    ) -> Self {
        Self {
            version: Self::VERSION,
            event_type,
            entity,
            requester_id,
            data_hash,
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Payload of a consensus-log submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusPayload {
    pub topic: TopicRef,
    #[serde(with = "hex_bytes")]
    pub message: Vec<u8>,
}

impl ConsensusPayload {
    pub fn new(topic: TopicRef, message: Vec<u8>) -> Self {
        Self { topic, message }
    }

    /// Build a payload from a domain event envelope.
    pub fn from_envelope(
        topic: TopicRef,
        envelope: &ConsensusEnvelope,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(topic, serde_json::to_vec(envelope)?))
    }

    pub fn content_hash(&self) -> ContentHash {
        ContentHash::of_parts(&[self.topic.0.as_bytes(), &self.message])
    }
}

/// Payload of a file-storage upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePayload {
    #[serde(with = "hex_bytes")]
    pub bytes: Vec<u8>,
    pub content_hash: ContentHash,
    pub file_name: String,
    pub mime_type: String,
}

impl FilePayload {
    /// Build a payload, hashing the content.
    pub fn new(bytes: Vec<u8>, file_name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        let content_hash = ContentHash::of(&bytes);
        Self {
            bytes,
            content_hash,
            file_name: file_name.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Operation-specific payload, discriminated by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnchorPayload {
    ConsensusSubmit(ConsensusPayload),
    FileStore(FilePayload),
}

impl AnchorPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::ConsensusSubmit(_) => JobKind::ConsensusSubmit,
            Self::FileStore(_) => JobKind::FileStore,
        }
    }

    pub fn content_hash(&self) -> ContentHash {
        match self {
            Self::ConsensusSubmit(p) => p.content_hash(),
            Self::FileStore(p) => p.content_hash,
        }
    }
}

/// What a producer hands to the queue. The queue assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorRequest {
    pub payload: AnchorPayload,
    pub owner: EntityRef,
    pub requester_id: UserId,
}

impl AnchorRequest {
    pub fn new(payload: AnchorPayload, owner: EntityRef, requester_id: UserId) -> Self {
        Self {
            payload,
            owner,
            requester_id,
        }
    }

    pub fn kind(&self) -> JobKind {
        self.payload.kind()
    }
}

/// A unit of deferred anchoring work.
///
/// The payload is immutable once the job exists; only the attempt counter
/// changes while the job lives in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorJob {
    job_id: JobId,
    payload: AnchorPayload,
    owner: EntityRef,
    requester_id: UserId,
    attempt_count: u32,
    enqueued_at: DateTime<Utc>,
}

impl AnchorJob {
    /// Materialise a request into a job. Called by the queue only.
    pub fn from_request(job_id: JobId, request: AnchorRequest, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            job_id,
            payload: request.payload,
            owner: request.owner,
            requester_id: request.requester_id,
            attempt_count: 0,
            enqueued_at,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn kind(&self) -> JobKind {
        self.payload.kind()
    }

    pub fn payload(&self) -> &AnchorPayload {
        &self.payload
    }

    pub fn owner(&self) -> EntityRef {
        self.owner
    }

    pub fn requester_id(&self) -> UserId {
        self.requester_id
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }

    pub fn content_hash(&self) -> ContentHash {
        self.payload.content_hash()
    }

    /// Count a new attempt and return the updated count.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.attempt_count
    }

    /// Operator requeue from the dead-letter set.
    pub fn reset_attempts(&mut self) {
        self.attempt_count = 0;
    }
}

// =============================================================================
// CLUSTER C: LEDGER OUTCOME
// =============================================================================

/// Ledger transaction identifier, or a locally synthesized sentinel on failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub String);

impl TxId {
    pub const FAILED_PREFIX: &'static str = "failed-";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Sentinel id for a failed attempt. Never collides with ledger ids,
    /// which have the `shard.realm.num@seconds.nanos` shape.
    pub fn failed() -> Self {
        Self(format!("{}{}", Self::FAILED_PREFIX, Uuid::new_v4()))
    }

    pub fn is_sentinel(&self) -> bool {
        self.0.starts_with(Self::FAILED_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalised result of a successful ledger call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    /// Identifier stored on the owning entity: the file id for uploads,
    /// the transaction id for consensus submissions.
    pub ledger_id: String,
    pub tx_id: TxId,
    /// Cost in tinybars.
    pub cost: u64,
    pub consensus_timestamp: Option<String>,
}

/// Value kept in the result cache for a content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedAnchor {
    pub ledger_id: String,
    pub tx_id: TxId,
}

impl From<&LedgerReceipt> for CachedAnchor {
    fn from(receipt: &LedgerReceipt) -> Self {
        Self {
            ledger_id: receipt.ledger_id.clone(),
            tx_id: receipt.tx_id.clone(),
        }
    }
}

/// Terminal status of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Success,
    Failed,
}

/// Action tag of a transaction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// Message submitted to the consensus log.
    ConsensusMessage,
    /// Consensus submission satisfied from the result cache.
    ConsensusMessageReused,
    /// File uploaded to file storage.
    FileUpload,
    /// File upload satisfied from the result cache.
    FileUploadReused,
}

impl TransactionType {
    pub fn for_kind(kind: JobKind, reused: bool) -> Self {
        match (kind, reused) {
            (JobKind::ConsensusSubmit, false) => Self::ConsensusMessage,
            (JobKind::ConsensusSubmit, true) => Self::ConsensusMessageReused,
            (JobKind::FileStore, false) => Self::FileUpload,
            (JobKind::FileStore, true) => Self::FileUploadReused,
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            Self::ConsensusMessage | Self::ConsensusMessageReused => JobKind::ConsensusSubmit,
            Self::FileUpload | Self::FileUploadReused => JobKind::FileStore,
        }
    }

    /// Satisfied from the result cache rather than a ledger call.
    pub fn is_reused(&self) -> bool {
        matches!(self, Self::ConsensusMessageReused | Self::FileUploadReused)
    }
}

/// Append-only audit row for a terminal ledger attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub record_id: Uuid,
    pub tx_id: TxId,
    pub tx_type: TransactionType,
    pub job_id: JobId,
    pub requester_id: UserId,
    pub owner: EntityRef,
    pub content_hash: ContentHash,
    /// Identifier written to the owning entity. `None` on failure.
    pub ledger_id: Option<String>,
    /// Cost in tinybars, zero on failure or reuse.
    pub cost: u64,
    pub status: RecordStatus,
    pub metadata: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl TransactionRecord {
    fn base_metadata(job: &AnchorJob) -> serde_json::Map<String, serde_json::Value> {
        let mut meta = serde_json::Map::new();
        meta.insert("content_hash".into(), job.content_hash().to_hex().into());
        meta.insert("attempts".into(), job.attempt_count().into());
        if let AnchorPayload::FileStore(file) = job.payload() {
            meta.insert("file_name".into(), file.file_name.clone().into());
            meta.insert("file_size".into(), file.size().into());
            meta.insert("mime_type".into(), file.mime_type.clone().into());
        }
        if let AnchorPayload::ConsensusSubmit(msg) = job.payload() {
            meta.insert("topic".into(), msg.topic.0.clone().into());
        }
        meta
    }

    /// Record a successful ledger call.
    pub fn success(job: &AnchorJob, receipt: &LedgerReceipt) -> Self {
        let mut meta = Self::base_metadata(job);
        if let Some(ts) = &receipt.consensus_timestamp {
            meta.insert("consensus_timestamp".into(), ts.clone().into());
        }
        Self {
            record_id: Uuid::new_v4(),
            tx_id: receipt.tx_id.clone(),
            tx_type: TransactionType::for_kind(job.kind(), false),
            job_id: job.job_id(),
            requester_id: job.requester_id(),
            owner: job.owner(),
            content_hash: job.content_hash(),
            ledger_id: Some(receipt.ledger_id.clone()),
            cost: receipt.cost,
            status: RecordStatus::Success,
            metadata: serde_json::Value::Object(meta),
            recorded_at: Utc::now(),
        }
    }

    /// Record a job satisfied from the result cache. No ledger cost.
    pub fn reused(job: &AnchorJob, cached: &CachedAnchor) -> Self {
        let mut meta = Self::base_metadata(job);
        meta.insert("cache_hit".into(), true.into());
        Self {
            record_id: Uuid::new_v4(),
            tx_id: cached.tx_id.clone(),
            tx_type: TransactionType::for_kind(job.kind(), true),
            job_id: job.job_id(),
            requester_id: job.requester_id(),
            owner: job.owner(),
            content_hash: job.content_hash(),
            ledger_id: Some(cached.ledger_id.clone()),
            cost: 0,
            status: RecordStatus::Success,
            metadata: serde_json::Value::Object(meta),
            recorded_at: Utc::now(),
        }
    }

    /// Record a job that ended in the dead-letter set.
    pub fn failed(job: &AnchorJob, error: &LedgerError) -> Self {
        let mut meta = Self::base_metadata(job);
        meta.insert("error".into(), error.message.clone().into());
        meta.insert("error_code".into(), error.code.as_str().into());
        meta.insert("error_class".into(), error.class().as_str().into());
        Self {
            record_id: Uuid::new_v4(),
            tx_id: TxId::failed(),
            tx_type: TransactionType::for_kind(job.kind(), false),
            job_id: job.job_id(),
            requester_id: job.requester_id(),
            owner: job.owner(),
            content_hash: job.content_hash(),
            ledger_id: None,
            cost: 0,
            status: RecordStatus::Failed,
            metadata: serde_json::Value::Object(meta),
            recorded_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RecordStatus::Success
    }
}
