// Certified Human-Made (CHM) - Core Library
// Signed, tamper-evident records of how a digital artwork was made

pub mod artifact;
pub mod builder;
pub mod classification;
pub mod config;
pub mod crypto;
pub mod curve;
pub mod document;
pub mod error;
pub mod events;
pub mod proof;
pub mod registry;
pub mod session;
pub mod signing;
pub mod storage;
pub mod tracing_detector;
pub mod transparency;
pub mod verify;

// Python bindings (PyO3)
#[cfg(feature = "python")]
pub mod python_bindings;

// Re-exports for convenience
pub use artifact::ArtifactHashes;
pub use builder::ProofBuilder;
pub use classification::{Classification, ClassificationEngine, ImportVisibility};
pub use config::{CoreConfig, TracingConfig};
pub use document::DocumentHandle;
pub use error::{CHMError, Result};
pub use events::{Event, PluginKind};
pub use proof::{EventSummary, Proof, ProofMetadata};
pub use registry::SessionRegistry;
pub use session::{Session, SessionMetadata};
pub use signing::{KeyPair, PublicKey, SecretKey, SigningEngine};
pub use storage::SessionStore;
pub use tracing_detector::{Fingerprint, LayerSnapshot, LayerSource, Thumbnail, TracingDetector};
pub use transparency::{LogContext, LogEntry, TransparencyLog};
pub use verify::Verifier;

use std::path::Path;

/// Builds, signs and verifies proofs with one key fixed at construction
#[derive(Debug, Clone, Default)]
pub struct Notary {
    builder: ProofBuilder,
    signer: SigningEngine,
}

impl Notary {
    /// `None` issues unsigned proofs
    pub fn new(keypair: Option<KeyPair>) -> Self {
        Self {
            builder: ProofBuilder::new(),
            signer: SigningEngine::new(keypair),
        }
    }

    /// Load the signing key named by `config`
    pub fn with_config(config: &CoreConfig) -> Result<Self> {
        Ok(Self::new(config.load_signing_key()?))
    }

    pub fn public_key(&self) -> Option<PublicKey> {
        self.signer.public_key()
    }

    /// Finalize `session` and return its signed proof.
    ///
    /// A missing key yields an unsigned proof rather than an error; callers
    /// that require signatures check `Proof::is_signed`.
    pub fn build_and_sign(&self, session: &mut Session, artifact: Option<&[u8]>) -> Result<Proof> {
        self.build_and_sign_inner(session, artifact, None)
    }

    /// As `build_and_sign`, re-checking import visibility against `layers`
    pub fn build_and_sign_with(
        &self,
        session: &mut Session,
        artifact: Option<&[u8]>,
        layers: &dyn LayerSource,
    ) -> Result<Proof> {
        self.build_and_sign_inner(session, artifact, Some(layers))
    }

    /// Hash an exported file; an unreadable file degrades to placeholder hashes
    pub fn build_and_sign_file(
        &self,
        session: &mut Session,
        artwork: &Path,
        layers: Option<&dyn LayerSource>,
    ) -> Result<Proof> {
        if session.is_finalized() {
            return Err(CHMError::AlreadyFinalized);
        }
        let hashes = ArtifactHashes::from_file(artwork);
        self.sign_built(session, &hashes, layers)
    }

    fn build_and_sign_inner(
        &self,
        session: &mut Session,
        artifact: Option<&[u8]>,
        layers: Option<&dyn LayerSource>,
    ) -> Result<Proof> {
        if session.is_finalized() {
            return Err(CHMError::AlreadyFinalized);
        }
        let hashes = match artifact {
            Some(bytes) => ArtifactHashes::from_bytes(bytes),
            None => {
                log::warn!("No artwork provided - using placeholder hashes");
                ArtifactHashes::placeholder()
            }
        };
        self.sign_built(session, &hashes, layers)
    }

    fn sign_built(
        &self,
        session: &mut Session,
        hashes: &ArtifactHashes,
        layers: Option<&dyn LayerSource>,
    ) -> Result<Proof> {
        let mut proof = self.builder.build(session, hashes, layers)?;
        match self.signer.sign_proof(&mut proof) {
            Ok(()) => {}
            Err(CHMError::SigningKeyMissing) => {
                log::warn!(
                    "No signing key configured; proof for session {} is unsigned",
                    proof.session_id
                );
            }
            Err(e) => return Err(e),
        }
        Ok(proof)
    }

    /// Verify `proof` against this notary's key; false without a key
    pub fn verify(&self, proof: &Proof) -> bool {
        match self.public_key() {
            Some(key) => Verifier::new(key).verify(proof),
            None => false,
        }
    }
}
