use crate::artifact::ArtifactHashes;
use crate::classification;
use crate::error::Result;
use crate::proof::{Proof, ProofMetadata, PROOF_VERSION};
use crate::session::Session;
use crate::tracing_detector::LayerSource;
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;

/// Metadata keys owned by the signed proof; host extras may not shadow them
const RESERVED_METADATA_KEYS: &[&str] = &["ai_tools_used", "ai_tools_list"];

fn host_extras(extra: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    extra
        .iter()
        .filter(|(key, _)| {
            let reserved = RESERVED_METADATA_KEYS.contains(&key.as_str());
            if reserved {
                log::warn!("Dropping host metadata key {:?}: reserved by the proof", key);
            }
            !reserved
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Assembles the unsigned proof of a session
#[derive(Debug, Clone, Copy, Default)]
pub struct ProofBuilder;

impl ProofBuilder {
    pub fn new() -> Self {
        ProofBuilder
    }

    /// Finalize `session` and build its proof.
    ///
    /// `layers`, when given, lets classification re-check import visibility.
    pub fn build(
        &self,
        session: &mut Session,
        artifact: &ArtifactHashes,
        layers: Option<&dyn LayerSource>,
    ) -> Result<Proof> {
        session.finalize()?;

        let end_time = Utc::now();
        let start_time = session.created_at();
        let classification = session.classify(layers);
        let event_summary = session.summary();
        let confidence = classification::confidence(
            classification,
            event_summary.total,
            session.undo_count(),
            event_summary.session_duration_secs,
        );

        let metadata = ProofMetadata {
            ai_tools_used: session.classifier().ai_tools_used(),
            ai_tools_list: session.classifier().ai_tools().to_vec(),
            extra: host_extras(&session.metadata.extra),
        };

        let proof = Proof {
            version: PROOF_VERSION.to_string(),
            session_id: session.id().to_string(),
            document_id: session.document().document_id(),
            start_time,
            end_time,
            duration_seconds: (end_time - start_time).num_seconds().max(0) as u64,
            event_summary,
            events_hash: session.events_hash()?,
            file_hash: artifact.file_hash.clone(),
            perceptual_hash: artifact.perceptual_hash.clone(),
            classification,
            confidence,
            metadata,
            signature: None,
            signature_version: None,
        };

        log::info!(
            "Proof built for session {}: {} (confidence: {:.1}%)",
            proof.session_id,
            proof.classification,
            proof.confidence * 100.0
        );
        Ok(proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::Classification;
    use crate::document::DocumentHandle;
    use crate::error::CHMError;
    use crate::events::PluginKind;

    #[test]
    fn test_build_finalizes_session() {
        let mut session = Session::new(DocumentHandle::persistent("/art/cat.kra"));
        for _ in 0..3 {
            session.record_stroke(0.7, None).unwrap();
        }
        session.record_layer_added("layer-2", "paintlayer").unwrap();

        let proof = ProofBuilder::new()
            .build(&mut session, &ArtifactHashes::placeholder(), None)
            .unwrap();

        assert!(session.is_finalized());
        assert_eq!(proof.document_id, "/art/cat.kra");
        assert_eq!(proof.session_id, session.id().to_string());
        assert_eq!(proof.event_summary.stroke_count, 3);
        assert_eq!(proof.event_summary.layer_count, 2);
        assert_eq!(proof.classification, Classification::HumanMade);
        assert_eq!(proof.events_hash, session.events_hash().unwrap());
        assert!(proof.signature.is_none());
        assert!(!proof.has_artifact_hash());

        let again = ProofBuilder::new().build(&mut session, &ArtifactHashes::placeholder(), None);
        assert!(matches!(again, Err(CHMError::AlreadyFinalized)));
    }

    #[test]
    fn test_ai_tools_reach_metadata() {
        let mut session = Session::new(DocumentHandle::new_ephemeral());
        session
            .record_plugin_used("Diffusion", PluginKind::AiGeneration)
            .unwrap();
        session
            .metadata
            .extra
            .insert("platform".to_string(), serde_json::Value::from("linux"));

        let proof = ProofBuilder::new()
            .build(&mut session, &ArtifactHashes::placeholder(), None)
            .unwrap();

        assert_eq!(proof.classification, Classification::AIAssisted);
        assert!(proof.metadata.ai_tools_used);
        assert_eq!(proof.metadata.ai_tools_list, vec!["Diffusion".to_string()]);
        assert_eq!(proof.metadata.extra["platform"], "linux");
        assert_eq!(proof.event_summary.plugins_used, vec!["Diffusion".to_string()]);
    }

    #[test]
    fn test_host_metadata_cannot_shadow_ai_fields() {
        use crate::signing::{KeyPair, SigningEngine};
        use crate::verify::Verifier;

        let mut session = Session::new(DocumentHandle::new_ephemeral());
        session.mark_ai_assisted("Diffusion").unwrap();
        let extra = &mut session.metadata.extra;
        extra.insert("ai_tools_used".to_string(), Value::from(false));
        extra.insert("ai_tools_list".to_string(), Value::Array(vec![]));
        extra.insert("platform".to_string(), Value::from("linux"));

        let mut proof = ProofBuilder::new()
            .build(&mut session, &ArtifactHashes::placeholder(), None)
            .unwrap();
        assert!(proof.metadata.ai_tools_used);
        assert_eq!(proof.metadata.extra.len(), 1);

        let keypair = KeyPair::from_seed([5u8; 32]);
        let verifier = Verifier::new(keypair.public_key());
        SigningEngine::new(Some(keypair)).sign_proof(&mut proof).unwrap();

        let json = proof.to_json().unwrap();
        assert_eq!(json.matches("\"ai_tools_used\"").count(), 1);
        assert_eq!(json.matches("\"ai_tools_list\"").count(), 1);

        let parsed = Proof::from_json(&json).unwrap();
        assert!(parsed.metadata.ai_tools_used);
        assert!(verifier.check_json(&json).is_ok());
    }
}
