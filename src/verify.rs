use crate::crypto::base64;
use crate::error::{CHMError, Result};
use crate::proof::Proof;
use crate::signing::{self, KeyPair, PublicKey, SIGNATURE_VERSION};

/// Checks proof signatures against one trusted public key
#[derive(Debug, Clone)]
pub struct Verifier {
    public_key: PublicKey,
}

impl Verifier {
    pub fn new(public_key: PublicKey) -> Self {
        Self { public_key }
    }

    pub fn from_keypair(keypair: &KeyPair) -> Self {
        Self::new(keypair.public_key())
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// True only if the signature matches the proof's critical fields.
    ///
    /// Never fails and never mutates the proof: unsigned proofs, unknown
    /// signature versions and undecodable signatures all yield `false`.
    pub fn verify(&self, proof: &Proof) -> bool {
        let Some(signature) = proof.signature.as_deref() else {
            log::debug!("Proof {} is unsigned", proof.session_id);
            return false;
        };
        if proof.signature_version.as_deref() != Some(SIGNATURE_VERSION) {
            log::warn!(
                "Unsupported signature version {:?} on proof {}",
                proof.signature_version,
                proof.session_id
            );
            return false;
        }
        let Ok(signature) = base64::decode(signature) else {
            return false;
        };
        let Ok(message) = signing::critical_subset_bytes(proof) else {
            return false;
        };

        let valid = signing::verify_signature(&self.public_key, &message, &signature);
        if !valid {
            log::warn!("Signature INVALID for proof {}", proof.session_id);
        }
        valid
    }

    /// Parse a proof and verify it.
    ///
    /// Separates a malformed document (`SchemaError`) from a well-formed
    /// one whose signature does not match (`VerificationFailure`).
    pub fn check_json(&self, json: &str) -> Result<Proof> {
        let proof = Proof::from_json(json)?;
        if self.verify(&proof) {
            Ok(proof)
        } else {
            Err(CHMError::VerificationFailure)
        }
    }
}
