use crate::classification::Classification;
use crate::crypto;
use crate::error::{CHMError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Proof format version
pub const PROOF_VERSION: &str = "1.0";

/// Stands in for both artifact hashes when no artwork was supplied
pub const NO_ARTIFACT_HASH: &str = "placeholder_no_artwork_provided";

/// Summary of events in a session (aggregated, not raw events)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub total: usize,
    pub stroke_count: usize,
    /// Default layer plus every added layer
    pub layer_count: usize,
    pub import_count: usize,
    pub undo_redo_count: usize,
    /// Total session duration (first to last event, includes brief pauses)
    pub session_duration_secs: u64,
    /// Active drawing time (excludes AFK periods)
    pub drawing_time_secs: u64,
    pub plugins_used: Vec<String>,
}

/// Proof metadata; only the AI-tool fields are signed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProofMetadata {
    pub ai_tools_used: bool,
    pub ai_tools_list: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Signed statement of how an artwork was made.
///
/// Only the fields covered by `signing::critical_subset_bytes` are protected
/// by the signature; identity and timing fields may be rewritten freely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proof {
    pub version: String,
    pub session_id: String,
    pub document_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: u64,
    pub event_summary: EventSummary,
    /// SHA-256 over the serialized event sequence
    pub events_hash: String,
    /// SHA-256 of exact exported file bytes (for exact match verification)
    pub file_hash: String,
    /// Perceptual hash of visual content (base64, 256-bit, survives re-encoding)
    pub perceptual_hash: String,
    pub classification: Classification,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f64,
    pub metadata: ProofMetadata,
    /// Base64 signature, `null` when no key was configured
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_version: Option<String>,
}

impl Proof {
    /// Convert proof to shareable JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate a proof.
    ///
    /// Missing or mistyped fields are a `SchemaError`, never a verification
    /// failure.
    pub fn from_json(json: &str) -> Result<Self> {
        let proof: Proof =
            serde_json::from_str(json).map_err(|e| CHMError::schema(e.to_string()))?;
        proof.validate()?;
        Ok(proof)
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != PROOF_VERSION {
            return Err(CHMError::schema(format!(
                "unsupported proof version {:?}",
                self.version
            )));
        }
        if self.events_hash.is_empty() {
            return Err(CHMError::schema("events_hash is empty"));
        }
        Ok(())
    }

    /// SHA-256 over the compact JSON proof; the transparency log key
    pub fn proof_hash(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(crypto::sha256_hash(&bytes))
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// False when the artifact hashes are the placeholder sentinel
    pub fn has_artifact_hash(&self) -> bool {
        self.file_hash != NO_ARTIFACT_HASH
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "Classification: {}\nConfidence: {:.1}%\nEvents: {}\nStrokes: {}\nLayers: {}\nDuration: {}s\nPlugins: {}\nImports: {}\nSigned: {}",
            self.classification,
            self.confidence * 100.0,
            self.event_summary.total,
            self.event_summary.stroke_count,
            self.event_summary.layer_count,
            self.event_summary.session_duration_secs,
            self.event_summary.plugins_used.len(),
            self.event_summary.import_count,
            if self.is_signed() { "yes" } else { "no" }
        )
    }
}
