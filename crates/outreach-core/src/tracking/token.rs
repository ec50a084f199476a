//! Signed tracking tokens

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use outreach_common::{Error, Result};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Bytes of the MAC kept in a token
const TAG_LEN: usize = 6;

/// Issues and checks `base64url(uuid || mac[..6])` tokens
#[derive(Clone)]
pub struct TokenSigner {
    keyed: HmacSha256,
}

impl TokenSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self> {
        let keyed = HmacSha256::new_from_slice(secret.as_ref())
            .map_err(|e| Error::Config(format!("Invalid tracking secret: {}", e)))?;
        Ok(Self { keyed })
    }

    fn mac(&self) -> HmacSha256 {
        self.keyed.clone()
    }

    /// Fresh token for a new message
    pub fn generate(&self) -> String {
        self.sign(Uuid::new_v4())
    }

    pub fn sign(&self, id: Uuid) -> String {
        let mut mac = self.mac();
        mac.update(id.as_bytes());
        let tag = mac.finalize().into_bytes();

        let mut raw = Vec::with_capacity(16 + TAG_LEN);
        raw.extend_from_slice(id.as_bytes());
        raw.extend_from_slice(&tag[..TAG_LEN]);
        URL_SAFE_NO_PAD.encode(raw)
    }

    /// The embedded id when the token carries a valid MAC
    pub fn verify(&self, token: &str) -> Option<Uuid> {
        let raw = URL_SAFE_NO_PAD.decode(token).ok()?;
        if raw.len() != 16 + TAG_LEN {
            return None;
        }
        let (id, tag) = raw.split_at(16);

        let mut mac = self.mac();
        mac.update(id);
        mac.verify_truncated_left(tag).ok()?;
        Uuid::from_slice(id).ok()
    }
}

/// Check a hex HMAC-SHA256 signature of a webhook body
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim().trim_start_matches("sha256=")) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sign_and_verify() {
        let signer = TokenSigner::new("s3cret").unwrap();
        let id = Uuid::new_v4();
        let token = signer.sign(id);

        assert_eq!(token.len(), 30);
        assert!(!token.contains('='));
        assert_eq!(signer.verify(&token), Some(id));
    }

    #[test]
    fn test_rejects_forged_tokens() {
        let signer = TokenSigner::new("s3cret").unwrap();
        let token = TokenSigner::new("other").unwrap().generate();
        assert_eq!(signer.verify(&token), None);
        assert_eq!(signer.verify("abc123"), None);
        assert_eq!(signer.verify("not base64 !!"), None);

        let mut raw = URL_SAFE_NO_PAD.decode(signer.generate()).unwrap();
        raw[0] ^= 0xff;
        assert_eq!(signer.verify(&URL_SAFE_NO_PAD.encode(raw)), None);
    }

    #[test]
    fn test_webhook_signature() {
        let body = br#"{"messageId":"m1"}"#;
        let mut mac = HmacSha256::new_from_slice(b"hook").unwrap();
        mac.update(body);
        let signature = hex::encode(mac.finalize().into_bytes());

        assert!(verify_webhook_signature("hook", body, &signature));
        assert!(verify_webhook_signature("hook", body, &format!("sha256={}", signature)));
        assert!(!verify_webhook_signature("other", body, &signature));
        assert!(!verify_webhook_signature("hook", body, "zz"));
    }
}
