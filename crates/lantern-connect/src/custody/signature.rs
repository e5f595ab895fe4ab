/*
[INPUT]:  Request payloads and the session's API keypair
[OUTPUT]: Signed request headers (x-request-signature)
[POS]:    Custody layer - request signing for authenticated endpoints
[UPDATE]: When changing signing scheme or header format
*/

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use uuid::Uuid;

use crate::keypair::ApiKeypair;

pub const SIGNATURE_VERSION: &str = "v1";

/// Signs custody request bodies with the session's local keypair
#[derive(Debug)]
pub struct RequestSigner {
    keypair: ApiKeypair,
}

impl RequestSigner {
    pub fn new(keypair: ApiKeypair) -> Self {
        Self { keypair }
    }

    /// Generate a request id for signing headers
    pub fn request_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Base58 public key identifying the signing keypair to the service
    pub fn public_key_base58(&self) -> String {
        self.keypair.public_key_base58()
    }

    /// Sign a request.
    ///
    /// Format: "{version},{request_id},{timestamp},{payload}"
    /// Returns base64-encoded signature
    pub fn sign_request(
        &self,
        version: &str,
        request_id: &str,
        timestamp: u64,
        payload: &str,
    ) -> String {
        let message = format!("{version},{request_id},{timestamp},{payload}");
        let signature = self.keypair.sign(message.as_bytes());
        BASE64.encode(signature.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_is_uuid() {
        let signer = RequestSigner::new(ApiKeypair::generate());
        assert!(Uuid::parse_str(&signer.request_id()).is_ok());
    }

    #[test]
    fn test_sign_request() {
        let signer = RequestSigner::new(ApiKeypair::generate());

        let signature = signer.sign_request(
            SIGNATURE_VERSION,
            "test-request-id",
            1_234_567_890,
            r#"{"name":"org-1"}"#,
        );

        assert!(!signature.is_empty());
        let decoded = BASE64.decode(&signature).unwrap();
        assert_eq!(decoded.len(), 64);
    }
}
