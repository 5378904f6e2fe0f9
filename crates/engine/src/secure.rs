//! Secure serialization (component I, spec.md §4.9): a signed, encrypted
//! container wrapping a gzipped binary tree snapshot.
//!
//! SHA-256 checksumming and HMAC-SHA256 signing use `sha2`/`hmac`, both
//! already pulled in for the teacher's own `hashlib`-parity surface and
//! repurposed here for their direct cryptographic role. Confidentiality is
//! an XOR-keystream cipher: `scrypt` derives a 256-bit key from the caller's
//! secret and a random salt, which seeds `rand_chacha::ChaCha20Rng` (another
//! teacher dependency, there backing Python's `random` module) to produce a
//! deterministic keystream XORed against the payload. No AEAD crate
//! (`aes-gcm`, `chacha20poly1305`, ...) is available in this dependency set,
//! so this is a deliberate, non-production-grade substitute -- a real
//! embedder should swap in an audited AEAD construction behind the same
//! seal/open shape.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use scrypt::Params;
use sha2::{Digest, Sha256};

use crate::{
    config::TreeFormat,
    error::{EngineError, ErrorKind},
    tree::{arena::{NodeId, TreeArena}, serializer},
};

type HmacSha256 = Hmac<Sha256>;

const CONTAINER_VERSION: u32 = 1;
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// A sealed tree snapshot: everything needed to verify, decrypt, and
/// restore it, plus a free-form metadata map readable without the key
/// (spec.md §4.9: "Container metadata can be read without decryption").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SecureContainer {
    pub version: u32,
    /// RFC3339 UTC timestamp of sealing.
    pub timestamp: String,
    pub watermark: String,
    pub salt: [u8; SALT_LEN],
    pub checksum: [u8; 32],
    pub payload: Vec<u8>,
    pub signature: [u8; 32],
    pub signing_key_id: String,
    pub verification_key_id: String,
    pub metadata: HashMap<String, String>,
}

impl SecureContainer {
    /// Reads the free-form metadata map without touching `payload` --
    /// no key required.
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }
}

fn derive_key(secret: &[u8], salt: &[u8; SALT_LEN]) -> Result<[u8; KEY_LEN], EngineError> {
    let params = Params::new(14, 8, 1, KEY_LEN)
        .map_err(|e| EngineError::new(ErrorKind::Integrity, format!("invalid scrypt parameters: {e}")))?;
    let mut key = [0u8; KEY_LEN];
    scrypt::scrypt(secret, salt, &params, &mut key)
        .map_err(|e| EngineError::new(ErrorKind::Integrity, format!("key derivation failed: {e}")))?;
    Ok(key)
}

fn keystream_xor(key: &[u8; KEY_LEN], data: &[u8]) -> Vec<u8> {
    let mut rng = ChaCha20Rng::from_seed(*key);
    let mut stream = vec![0u8; data.len()];
    rng.fill_bytes(&mut stream);
    data.iter().zip(stream.iter()).map(|(a, b)| a ^ b).collect()
}

fn signing_message(version: u32, timestamp: &str, watermark: &str, checksum: &[u8; 32], payload: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(4 + timestamp.len() + watermark.len() + 32 + payload.len());
    msg.extend_from_slice(&version.to_le_bytes());
    msg.extend_from_slice(timestamp.as_bytes());
    msg.extend_from_slice(watermark.as_bytes());
    msg.extend_from_slice(checksum);
    msg.extend_from_slice(payload);
    msg
}

/// Serializes the tree rooted at `root` as a gzipped binary snapshot,
/// encrypts it, checksums and signs the result, and wraps everything in a
/// [`SecureContainer`].
#[allow(clippy::too_many_arguments)]
pub fn seal(
    arena: &TreeArena,
    root: NodeId,
    secret: &[u8],
    signing_key_id: &str,
    verification_key_id: &str,
    watermark: &str,
    metadata: HashMap<String, String>,
) -> Result<SecureContainer, EngineError> {
    let plaintext = serializer::serialize(arena, root, TreeFormat::Binary)?;

    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let key = derive_key(secret, &salt)?;
    let payload = keystream_xor(&key, &plaintext);

    let checksum: [u8; 32] = Sha256::digest(&payload).into();
    let timestamp = chrono::Utc::now().to_rfc3339();

    let message = signing_message(CONTAINER_VERSION, &timestamp, watermark, &checksum, &payload);
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| EngineError::new(ErrorKind::Integrity, format!("invalid signing key: {e}")))?;
    mac.update(&message);
    let signature: [u8; 32] = mac.finalize().into_bytes().into();

    Ok(SecureContainer {
        version: CONTAINER_VERSION,
        timestamp,
        watermark: watermark.to_string(),
        salt,
        checksum,
        payload,
        signature,
        signing_key_id: signing_key_id.to_string(),
        verification_key_id: verification_key_id.to_string(),
        metadata,
    })
}

/// Verifies (signature, if `require_signature`, then checksum), decrypts,
/// and restores the tree into `arena`, per spec.md §4.9's load sequence.
pub fn open(container: &SecureContainer, arena: &TreeArena, secret: &[u8], require_signature: bool) -> Result<NodeId, EngineError> {
    if require_signature {
        let message = signing_message(container.version, &container.timestamp, &container.watermark, &container.checksum, &container.payload);
        let mut mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| EngineError::new(ErrorKind::Integrity, format!("invalid verification key: {e}")))?;
        mac.update(&message);
        mac.verify_slice(&container.signature)
            .map_err(|_| EngineError::new(ErrorKind::Integrity, "signature verification failed"))?;
    }

    let actual_checksum: [u8; 32] = Sha256::digest(&container.payload).into();
    if actual_checksum != container.checksum {
        return Err(EngineError::new(ErrorKind::Integrity, "checksum mismatch"));
    }

    let key = derive_key(secret, &container.salt)?;
    let plaintext = keystream_xor(&key, &container.payload);

    serializer::deserialize(arena, TreeFormat::Binary, &plaintext)
}

/// Encodes a container to its opaque binary wire form (spec.md §6:
/// "Signed container: binary encoding of §4.9's fields; opaque").
pub fn encode(container: &SecureContainer) -> Result<Vec<u8>, EngineError> {
    postcard::to_allocvec(container).map_err(|e| EngineError::new(ErrorKind::Integrity, format!("encoding secure container: {e}")))
}

pub fn decode(bytes: &[u8]) -> Result<SecureContainer, EngineError> {
    postcard::from_bytes(bytes).map_err(|e| EngineError::new(ErrorKind::Integrity, format!("decoding secure container: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn sample_tree() -> (TreeArena, NodeId) {
        let arena = TreeArena::new();
        let root = arena.new_node("root");
        arena.set_attribute(root, "name", Value::string("alice"));
        (arena, root)
    }

    #[test]
    fn seal_then_open_restores_the_tree() {
        let (arena, root) = sample_tree();
        let secret = b"correct horse battery staple";
        let container = seal(&arena, root, secret, "kid-1", "kid-1", "nightly-backup", HashMap::new()).unwrap();

        let restore_arena = TreeArena::new();
        let restored = open(&container, &restore_arena, secret, true).unwrap();
        let Value::String(restored_name) = restore_arena.get_attribute(restored, "name") else { panic!("expected string") };
        assert_eq!(restored_name.as_ref(), "alice");
    }

    #[test]
    fn tampered_payload_fails_checksum() {
        let (arena, root) = sample_tree();
        let secret = b"secret";
        let mut container = seal(&arena, root, secret, "kid-1", "kid-1", "wm", HashMap::new()).unwrap();
        container.payload[0] ^= 0xFF;

        let restore_arena = TreeArena::new();
        let err = open(&container, &restore_arena, secret, false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Integrity);
    }

    #[test]
    fn wrong_key_fails_signature_verification() {
        let (arena, root) = sample_tree();
        let container = seal(&arena, root, b"right-secret", "kid-1", "kid-1", "wm", HashMap::new()).unwrap();

        let restore_arena = TreeArena::new();
        let err = open(&container, &restore_arena, b"wrong-secret", true).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Integrity);
    }

    #[test]
    fn metadata_is_readable_without_the_key() {
        let (arena, root) = sample_tree();
        let mut metadata = HashMap::new();
        metadata.insert("owner".to_string(), "alice".to_string());
        let container = seal(&arena, root, b"secret", "kid-1", "kid-1", "wm", metadata).unwrap();
        assert_eq!(container.metadata().get("owner").map(String::as_str), Some("alice"));
    }
}
