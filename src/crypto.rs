use crate::error::{CHMError, Result};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::io::{Read, Write};
use std::path::Path;

/// AES-256-GCM encryption key (32 bytes), used for sessions stored at rest
#[derive(Clone)]
pub struct EncryptionKey {
    key: [u8; 32],
}

impl EncryptionKey {
    /// Generate a new random encryption key
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        log::debug!("Generated new encryption key");
        Self { key }
    }

    /// Create from existing key bytes
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Get the raw key bytes (for internal use only)
    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }

    /// Export key as hex string (for storage)
    pub fn to_hex(&self) -> String {
        hex::encode(self.key)
    }

    /// Import key from hex string
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| CHMError::crypto(format!("Invalid hex string: {}", e)))?;

        let key: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            CHMError::crypto(format!("Invalid key length: {} (expected 32)", bytes.len()))
        })?;
        Ok(Self { key })
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

const NONCE_LEN: usize = 12;

/// AES-256-GCM ciphertext (tag appended) and the nonce it was sealed with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedBlob {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
}

fn cipher(key: &EncryptionKey) -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CHMError::crypto(format!("Failed to create cipher: {}", e)))
}

/// Seal `data` under a fresh random nonce
pub fn encrypt_data(data: &[u8], key: &EncryptionKey) -> Result<EncryptedBlob> {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let ciphertext = cipher(key)?
        .encrypt(Nonce::from_slice(&nonce), data)
        .map_err(|e| CHMError::crypto(format!("Encryption failed: {}", e)))?;

    log::debug!("Sealed {} bytes of session data", data.len());
    Ok(EncryptedBlob { ciphertext, nonce })
}

/// Open a blob; a wrong key or any modified byte fails authentication
pub fn decrypt_data(blob: &EncryptedBlob, key: &EncryptionKey) -> Result<Vec<u8>> {
    cipher(key)?
        .decrypt(Nonce::from_slice(&blob.nonce), blob.ciphertext.as_slice())
        .map_err(|_| CHMError::crypto("Session data failed authentication (wrong key or corrupted)"))
}

/// Compute SHA-256 hash, hex encoded
pub fn sha256_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// SHA-512 over the concatenation of `parts`
pub fn sha512(parts: &[&[u8]]) -> [u8; 64] {
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Compute SHA-256 hash of a file, hex encoded
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Write a secret to `path`, creating it readable by the owner only
pub fn write_secret_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

pub(crate) mod base64 {
    use base64::{engine::general_purpose, Engine as _};

    pub fn encode(data: &[u8]) -> String {
        general_purpose::STANDARD.encode(data)
    }

    pub fn decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
        general_purpose::STANDARD.decode(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encryption_key_hex_roundtrip() {
        let key1 = EncryptionKey::generate();
        let hex = key1.to_hex();
        let key2 = EncryptionKey::from_hex(&hex).unwrap();
        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_encryption_key_rejects_short_hex() {
        assert!(EncryptionKey::from_hex("abcd").is_err());
    }

    #[test]
    fn test_aes_gcm_encryption_decryption() {
        let key = EncryptionKey::generate();
        let plaintext = b"This is a secret message that needs encryption!";

        let encrypted = encrypt_data(plaintext, &key).unwrap();
        assert_ne!(encrypted.ciphertext, plaintext);
        assert_eq!(encrypted.ciphertext.len(), plaintext.len() + 16);

        let decrypted = decrypt_data(&encrypted, &key).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_aes_gcm_rejects_wrong_key_and_tampering() {
        let key = EncryptionKey::generate();
        let encrypted = encrypt_data(b"Secret data", &key).unwrap();
        assert!(decrypt_data(&encrypted, &EncryptionKey::generate()).is_err());

        let mut flipped = encrypted.clone();
        flipped.ciphertext[0] ^= 1;
        assert!(decrypt_data(&flipped, &key).is_err());
    }

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(
            sha256_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha512_concatenates_parts() {
        assert_eq!(sha512(&[b"ab", b"c"]), sha512(&[b"abc"]));
    }

    #[test]
    fn test_sha256_file_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artwork.png");
        std::fs::write(&path, b"not really a png").unwrap();

        assert_eq!(sha256_file(&path).unwrap(), sha256_hash(b"not really a png"));
        assert!(sha256_file(&dir.path().join("missing.png")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_secret_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(".secret");
        write_secret_file(&path, "s3cret").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "s3cret");
    }
}
