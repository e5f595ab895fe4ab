/*
[INPUT]:  Message bytes and optional secret key bytes
[OUTPUT]: Ed25519 signatures and base58-encoded public keys
[POS]:    Auth layer - local keypair authorizing custody API calls
[UPDATE]: When changing signing algorithm or key serialization format
*/

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use rand::rngs::OsRng;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Local Ed25519 keypair that authorizes custody API requests.
///
/// This key never controls funds; the custody service holds the signing key
/// for the wallet itself. This keypair only proves that API calls come from
/// the session that created the organization.
#[derive(Clone)]
pub struct ApiKeypair {
    signing_key: SigningKey,
}

impl ApiKeypair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Create a keypair from existing secret key bytes (32 bytes)
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        Self { signing_key }
    }

    /// Sign a message and return the signature
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    /// Get the public key in base58 encoding
    pub fn public_key_base58(&self) -> String {
        bs58::encode(self.signing_key.verifying_key().as_bytes()).into_string()
    }

    /// Get the raw public key bytes
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Get the raw secret key bytes
    pub fn secret_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Verify a signature against a message
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.signing_key
            .verifying_key()
            .verify(message, signature)
            .is_ok()
    }
}

impl std::fmt::Debug for ApiKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeypair")
            .field("public_key", &self.public_key_base58())
            .finish_non_exhaustive()
    }
}

impl PartialEq for ApiKeypair {
    fn eq(&self, other: &Self) -> bool {
        self.secret_key_bytes() == other.secret_key_bytes()
    }
}

// Persisted inside the session record as the base64-encoded secret key.
impl Serialize for ApiKeypair {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(self.secret_key_bytes()))
    }
}

impl<'de> Deserialize<'de> for ApiKeypair {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| D::Error::custom(format!("invalid keypair base64: {e}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| D::Error::custom("keypair secret must be 32 bytes"))?;
        Ok(ApiKeypair::from_secret_bytes(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() {
        let keypair = ApiKeypair::generate();
        assert_eq!(keypair.public_key_bytes().len(), 32);
    }

    #[test]
    fn test_sign_and_verify() {
        let keypair = ApiKeypair::generate();
        let message = b"create organization";
        let signature = keypair.sign(message);
        assert!(keypair.verify(message, &signature));
    }

    #[test]
    fn test_base58_public_key() {
        let keypair = ApiKeypair::generate();
        let decoded = bs58::decode(keypair.public_key_base58()).into_vec().unwrap();
        assert_eq!(decoded.len(), 32);
    }

    #[test]
    fn test_serde_round_trip() {
        let keypair = ApiKeypair::generate();
        let json = serde_json::to_string(&keypair).unwrap();
        let back: ApiKeypair = serde_json::from_str(&json).unwrap();
        assert_eq!(back, keypair);
        assert_eq!(back.public_key_base58(), keypair.public_key_base58());
    }

    #[test]
    fn test_debug_does_not_leak_secret() {
        let keypair = ApiKeypair::generate();
        let secret = BASE64.encode(keypair.secret_key_bytes());
        let debug = format!("{keypair:?}");
        assert!(!debug.contains(&secret));
        assert!(debug.contains(&keypair.public_key_base58()));
    }
}
