//! Ed25519 detached signatures for audit records.
//!
//! Each session owns one keypair, generated when the session first
//! appears and serialized as hex inside the session state. Signatures
//! cover arbitrary byte strings; verification returns a plain boolean
//! and never panics on malformed input.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use warden_types::error::{WardenError, WardenResult};
use warden_types::session::SigningIdentity;

/// Generates a fresh session signing identity.
pub fn generate_identity() -> SigningIdentity {
    let signing_key = SigningKey::generate(&mut OsRng);
    let public_key_hex = hex::encode(signing_key.verifying_key().to_bytes());
    SigningIdentity {
        private_key_hex: hex::encode(signing_key.to_bytes()),
        key_id: SigningIdentity::key_id_of(&public_key_hex),
        public_key_hex,
    }
}

/// Signs a message with a hex-encoded private key, returning the
/// hex-encoded detached signature.
pub fn sign(private_key_hex: &str, message: &[u8]) -> WardenResult<String> {
    let bytes = hex::decode(private_key_hex)
        .map_err(|e| WardenError::Signing(format!("invalid private key hex: {e}")))?;
    let key_bytes: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| WardenError::Signing("private key must be 32 bytes".to_string()))?;
    let signing_key = SigningKey::from_bytes(&key_bytes);
    Ok(hex::encode(signing_key.sign(message).to_bytes()))
}

/// Verifies a hex-encoded detached signature against a hex-encoded
/// public key. Malformed keys or signatures verify as `false`.
pub fn verify(public_key_hex: &str, message: &[u8], signature_hex: &str) -> bool {
    let pk_bytes: [u8; 32] = match hex::decode(public_key_hex)
        .ok()
        .and_then(|b| b.as_slice().try_into().ok())
    {
        Some(bytes) => bytes,
        None => return false,
    };
    let verifying_key = match VerifyingKey::from_bytes(&pk_bytes) {
        Ok(key) => key,
        Err(_) => return false,
    };
    let sig_bytes: [u8; 64] = match hex::decode(signature_hex)
        .ok()
        .and_then(|b| b.as_slice().try_into().ok())
    {
        Some(bytes) => bytes,
        None => return false,
    };
    verifying_key
        .verify(message, &Signature::from_bytes(&sig_bytes))
        .is_ok()
}
