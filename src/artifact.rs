use crate::crypto;
use crate::error::{CHMError, Result};
use crate::proof::NO_ARTIFACT_HASH;
use std::path::Path;

/// Dual hash of an exported artwork
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHashes {
    /// `sha256:<hex>` of the exact bytes
    pub file_hash: String,
    /// Base64 gradient hash of the decoded image
    pub perceptual_hash: String,
}

impl ArtifactHashes {
    /// Both fields set to the placeholder sentinel
    pub fn placeholder() -> Self {
        Self {
            file_hash: NO_ARTIFACT_HASH.to_string(),
            perceptual_hash: NO_ARTIFACT_HASH.to_string(),
        }
    }

    /// Hash artwork bytes.
    ///
    /// Bytes that are not a decodable image still get a file hash; only the
    /// perceptual hash falls back to the placeholder.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let file_hash = format!("sha256:{}", crypto::sha256_hash(bytes));
        let perceptual_hash = match compute_perceptual_hash(bytes) {
            Ok(hash) => hash,
            Err(e) => {
                log::warn!("Perceptual hash unavailable, using placeholder: {}", e);
                NO_ARTIFACT_HASH.to_string()
            }
        };

        log::debug!("File hash: {}", file_hash);
        log::debug!("Perceptual hash: {}", perceptual_hash);

        Self {
            file_hash,
            perceptual_hash,
        }
    }

    /// Hash an exported file; an unreadable file degrades to the placeholder
    pub fn from_file(path: &Path) -> Self {
        match std::fs::read(path) {
            Ok(bytes) => {
                log::info!("Computing dual hashes for artwork: {}", path.display());
                Self::from_bytes(&bytes)
            }
            Err(e) => {
                log::warn!(
                    "Could not read artwork {} ({}); proof will carry placeholder hashes",
                    path.display(),
                    e
                );
                Self::placeholder()
            }
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.file_hash == NO_ARTIFACT_HASH
    }
}

/// Gradient hash (16x16 = 256 bits), resilient to re-encoding
fn compute_perceptual_hash(bytes: &[u8]) -> Result<String> {
    use img_hash::{HashAlg, HasherConfig};

    let img = image::load_from_memory(bytes)
        .map_err(|e| CHMError::image(format!("Failed to decode image for perceptual hashing: {}", e)))?;

    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::Gradient)
        .hash_size(16, 16)
        .to_hasher();

    Ok(hasher.hash_image(&img).to_base64())
}
