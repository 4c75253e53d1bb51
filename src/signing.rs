use crate::classification::Classification;
use crate::crypto::{self, base64};
use crate::curve::{self, EdwardsPoint, ENCODED_LEN};
use crate::error::{CHMError, Result};
use crate::proof::Proof;
use num_bigint::BigUint;
use rand::RngCore;
use serde::Serialize;
use std::io;
use std::path::Path;

/// Wire tag for signatures produced by this module
pub const SIGNATURE_VERSION: &str = "ed25519-v1";

pub const SIGNATURE_LEN: usize = 64;

/// 32-byte signing seed
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey([u8; 32]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// Encoded public point `A = [a]B`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; ENCODED_LEN]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; ENCODED_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ENCODED_LEN] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        base64::encode(&self.0)
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = base64::decode(encoded.trim())
            .map_err(|e| CHMError::crypto(format!("Invalid public key encoding: {}", e)))?;
        let bytes: [u8; ENCODED_LEN] = bytes.as_slice().try_into().map_err(|_| {
            CHMError::crypto(format!(
                "Invalid public key length: {} (expected {})",
                bytes.len(),
                ENCODED_LEN
            ))
        })?;
        Ok(Self(bytes))
    }
}

/// Signing key material derived from a seed.
///
/// `h = SHA-512(seed)`; the clamped low half of `h` is the secret scalar and
/// the high half seeds the deterministic nonce.
#[derive(Clone)]
pub struct KeyPair {
    secret: SecretKey,
    scalar: BigUint,
    prefix: [u8; 32],
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh key from the OS random source
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        log::debug!("Generated new signing key");
        Self::from_seed(seed)
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        let h = crypto::sha512(&[&seed]);

        let mut scalar_bytes = [0u8; 32];
        scalar_bytes.copy_from_slice(&h[..32]);
        scalar_bytes[0] &= 248;
        scalar_bytes[31] &= 127;
        scalar_bytes[31] |= 64;
        let scalar = BigUint::from_bytes_le(&scalar_bytes);

        let mut prefix = [0u8; 32];
        prefix.copy_from_slice(&h[32..]);

        let public = PublicKey(EdwardsPoint::base().mul_scalar(&scalar).encode());

        Self {
            secret: SecretKey(seed),
            scalar,
            prefix,
            public,
        }
    }

    /// Accepts exactly 32 seed bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let seed: [u8; 32] = bytes.try_into().map_err(|_| {
            CHMError::crypto(format!("Invalid signing key length: {} (expected 32)", bytes.len()))
        })?;
        Ok(Self::from_seed(seed))
    }

    /// Parse a base64 seed, the format of `signing_key.txt`
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = base64::decode(encoded.trim())
            .map_err(|e| CHMError::crypto(format!("Invalid signing key encoding: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_base64(&self) -> String {
        base64::encode(self.secret.as_bytes())
    }

    /// Write the base64 seed to `path` with owner-only permissions
    pub fn save(&self, path: &Path) -> Result<()> {
        crypto::write_secret_file(path, &self.to_base64())?;
        log::info!("Saved signing key to {}", path.display());
        Ok(())
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Deterministic signature `encode(R) || encode(S)` over `message`
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        let r = curve::scalar_from_le_bytes(&crypto::sha512(&[&self.prefix, message]));
        let big_r = EdwardsPoint::base().mul_scalar(&r).encode();

        let k = challenge(&big_r, &self.public.0, message);
        let s = (r + k * &self.scalar) % curve::group_order();

        let mut signature = [0u8; SIGNATURE_LEN];
        signature[..ENCODED_LEN].copy_from_slice(&big_r);
        signature[ENCODED_LEN..].copy_from_slice(&curve::scalar_to_bytes(&s));
        signature
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public.to_base64())
            .finish_non_exhaustive()
    }
}

fn challenge(big_r: &[u8], public: &[u8], message: &[u8]) -> BigUint {
    curve::scalar_from_le_bytes(&crypto::sha512(&[big_r, public, message]))
}

/// Check `[S]B == R + [k]A`. Any malformed input yields `false`.
pub fn verify_signature(public_key: &PublicKey, message: &[u8], signature: &[u8]) -> bool {
    if signature.len() != SIGNATURE_LEN {
        return false;
    }

    let Some(a) = EdwardsPoint::decode(public_key.as_bytes()) else {
        return false;
    };

    let mut r_bytes = [0u8; ENCODED_LEN];
    r_bytes.copy_from_slice(&signature[..ENCODED_LEN]);
    let Some(big_r) = EdwardsPoint::decode(&r_bytes) else {
        return false;
    };

    let s = BigUint::from_bytes_le(&signature[ENCODED_LEN..]);
    if &s >= curve::group_order() {
        return false;
    }

    let k = challenge(&r_bytes, public_key.as_bytes(), message);
    let lhs = EdwardsPoint::base().mul_scalar(&s);
    let rhs = big_r.add(&a.mul_scalar(&k));
    lhs.encode() == rhs.encode()
}

// Field order below is the sorted key order of the canonical form.

#[derive(Serialize)]
struct CriticalSubset<'a> {
    classification: Classification,
    event_summary: CriticalSummary,
    events_hash: &'a str,
    metadata: CriticalMetadata<'a>,
    signature_version: &'static str,
}

#[derive(Serialize)]
struct CriticalSummary {
    import_count: usize,
    layer_count: usize,
    stroke_count: usize,
}

#[derive(Serialize)]
struct CriticalMetadata<'a> {
    ai_tools_list: &'a [String],
    ai_tools_used: bool,
}

/// Compact JSON writer that escapes DEL and every non-ASCII character as `\uXXXX`
struct AsciiFormatter;

impl serde_json::ser::Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (i, c) in fragment.char_indices() {
            if c.is_ascii() && c != '\x7f' {
                continue;
            }
            writer.write_all(fragment[start..i].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = i + c.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

/// JSON string literal for `s`, non-ASCII escaped
pub(crate) fn ascii_json_string(s: &str) -> Result<String> {
    let mut out = Vec::with_capacity(s.len() + 2);
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, AsciiFormatter);
    s.serialize(&mut serializer)?;
    String::from_utf8(out).map_err(|e| CHMError::crypto(e.to_string()))
}

/// Canonical bytes of the signed fields of `proof`.
///
/// Identity and timing fields (`session_id`, `document_id`, `start_time`,
/// `end_time`, `duration_seconds`) are not covered.
pub fn critical_subset_bytes(proof: &Proof) -> Result<Vec<u8>> {
    let subset = CriticalSubset {
        classification: proof.classification,
        event_summary: CriticalSummary {
            import_count: proof.event_summary.import_count,
            layer_count: proof.event_summary.layer_count,
            stroke_count: proof.event_summary.stroke_count,
        },
        events_hash: &proof.events_hash,
        metadata: CriticalMetadata {
            ai_tools_list: &proof.metadata.ai_tools_list,
            ai_tools_used: proof.metadata.ai_tools_used,
        },
        signature_version: SIGNATURE_VERSION,
    };

    let mut out = Vec::with_capacity(256);
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, AsciiFormatter);
    subset.serialize(&mut serializer)?;
    Ok(out)
}

/// Signs proofs with the key injected at construction
#[derive(Debug, Clone, Default)]
pub struct SigningEngine {
    keypair: Option<KeyPair>,
}

impl SigningEngine {
    pub fn new(keypair: Option<KeyPair>) -> Self {
        Self { keypair }
    }

    pub fn has_key(&self) -> bool {
        self.keypair.is_some()
    }

    pub fn public_key(&self) -> Option<PublicKey> {
        self.keypair.as_ref().map(KeyPair::public_key)
    }

    /// Fill `signature` and `signature_version`.
    ///
    /// Without a key both fields are cleared and `SigningKeyMissing` is
    /// returned; the proof itself stays usable.
    pub fn sign_proof(&self, proof: &mut Proof) -> Result<()> {
        let Some(keypair) = &self.keypair else {
            proof.signature = None;
            proof.signature_version = None;
            return Err(CHMError::SigningKeyMissing);
        };

        let message = critical_subset_bytes(proof)?;
        let signature = keypair.sign(&message);
        proof.signature = Some(base64::encode(&signature));
        proof.signature_version = Some(SIGNATURE_VERSION.to_string());

        log::debug!(
            "Signed proof for session {} ({} byte message)",
            proof.session_id,
            message.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::tests::sample_proof;

    const RFC8032_SECRET: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";
    const RFC8032_PUBLIC: &str = "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";
    const RFC8032_SIGNATURE: &str = "e5564300c360ac729086e2cc806e828a84877f1eb8e5d974d873e065\
                                     224901555fb8821590a33bacc61e39701cf9b46bd25bf5f0595bbe24\
                                     655141438e7a100b";

    fn rfc_keypair() -> KeyPair {
        KeyPair::from_bytes(&hex::decode(RFC8032_SECRET).unwrap()).unwrap()
    }

    #[test]
    fn test_rfc8032_vector_one() {
        let keypair = rfc_keypair();
        assert_eq!(hex::encode(keypair.public_key().as_bytes()), RFC8032_PUBLIC);

        let signature = keypair.sign(b"");
        assert_eq!(hex::encode(signature), RFC8032_SIGNATURE);
        assert!(verify_signature(&keypair.public_key(), b"", &signature));
    }

    #[test]
    fn test_signatures_are_deterministic() {
        let keypair = KeyPair::generate();
        assert_eq!(keypair.sign(b"artwork"), keypair.sign(b"artwork"));
        assert_ne!(keypair.sign(b"artwork"), keypair.sign(b"artwork!"));
    }

    #[test]
    fn test_bit_flipped_signature_rejected() {
        let keypair = rfc_keypair();
        let signature = keypair.sign(b"hello");

        for byte in [0, 17, 31, 32, 50, 63] {
            let mut tampered = signature;
            tampered[byte] ^= 0x01;
            assert!(!verify_signature(&keypair.public_key(), b"hello", &tampered));
        }
    }

    #[test]
    fn test_wrong_key_and_length_rejected() {
        let signer = KeyPair::generate();
        let other = KeyPair::generate();
        let signature = signer.sign(b"msg");

        assert!(!verify_signature(&other.public_key(), b"msg", &signature));
        assert!(!verify_signature(&signer.public_key(), b"msg", &signature[..63]));
        assert!(!verify_signature(&signer.public_key(), b"msg", &[]));
    }

    #[test]
    fn test_non_canonical_s_rejected() {
        let keypair = rfc_keypair();
        let mut signature = keypair.sign(b"msg");
        signature[63] |= 0xf0;
        assert!(!verify_signature(&keypair.public_key(), b"msg", &signature));
    }

    #[test]
    fn test_key_base64_roundtrip() {
        let keypair = KeyPair::generate();
        let restored = KeyPair::from_base64(&keypair.to_base64()).unwrap();
        assert_eq!(keypair.public_key(), restored.public_key());
        assert!(KeyPair::from_base64("c2hvcnQ=").is_err());
        assert!(KeyPair::from_base64("not base64!").is_err());
    }

    #[test]
    fn test_debug_does_not_leak_seed() {
        let keypair = rfc_keypair();
        let debug = format!("{:?} {:?}", keypair, keypair.secret_key());
        assert!(!debug.contains(&base64::encode(keypair.secret_key().as_bytes())));
    }

    #[test]
    fn test_critical_subset_canonical_form() {
        let proof = sample_proof();
        let bytes = critical_subset_bytes(&proof).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            concat!(
                r#"{"classification":"HumanMade","#,
                r#""event_summary":{"import_count":0,"layer_count":2,"stroke_count":3},"#,
                r#""events_hash":"abc123","#,
                r#""metadata":{"ai_tools_list":[],"ai_tools_used":false},"#,
                r#""signature_version":"ed25519-v1"}"#
            )
        );
    }

    #[test]
    fn test_critical_subset_escapes_non_ascii() {
        let mut proof = sample_proof();
        proof.metadata.ai_tools_used = true;
        proof.metadata.ai_tools_list = vec!["café 🎨".to_string()];

        let text = String::from_utf8(critical_subset_bytes(&proof).unwrap()).unwrap();
        assert!(text.is_ascii());
        assert!(text.contains(r#""ai_tools_list":["caf\u00e9 \ud83c\udfa8"]"#));
    }

    #[test]
    fn test_delete_char_is_escaped() {
        assert_eq!(ascii_json_string("a\u{7f}b").unwrap(), r#""a\u007fb""#);
        assert_eq!(ascii_json_string("tab\there~").unwrap(), r#""tab\there~""#);

        let mut proof = sample_proof();
        proof.metadata.ai_tools_list = vec!["\u{7f}".to_string()];
        let text = String::from_utf8(critical_subset_bytes(&proof).unwrap()).unwrap();
        assert!(text.contains(r#"["\u007f"]"#));
    }

    #[test]
    fn test_sign_proof_without_key() {
        let mut proof = sample_proof();
        proof.signature = Some("stale".to_string());
        proof.signature_version = Some(SIGNATURE_VERSION.to_string());

        let engine = SigningEngine::default();
        let err = engine.sign_proof(&mut proof).unwrap_err();

        assert!(matches!(err, CHMError::SigningKeyMissing));
        assert!(proof.signature.is_none());
        assert!(proof.signature_version.is_none());
    }

    #[test]
    fn test_sign_proof_sets_fields() {
        let mut proof = sample_proof();
        let engine = SigningEngine::new(Some(rfc_keypair()));
        engine.sign_proof(&mut proof).unwrap();

        assert_eq!(proof.signature_version.as_deref(), Some(SIGNATURE_VERSION));
        let signature = base64::decode(proof.signature.as_deref().unwrap()).unwrap();
        let message = critical_subset_bytes(&proof).unwrap();
        assert!(verify_signature(&engine.public_key().unwrap(), &message, &signature));
    }
}
