//! Signed, expiring account tokens
//!
//! Used for account activation and password reset links. A token is
//! `base64url(payload) "." base64url(hmac_sha256(payload))` where the payload
//! is the JSON object `{"user_id": .., "exp": ..}` and `exp` is a unix
//! timestamp in seconds.

use chrono::Utc;
use data_encoding::BASE64URL_NOPAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize, Deserialize)]
struct TokenPayload {
    user_id: i64,
    exp: i64,
}

/// Issues and checks tokens with one secret and lifetime
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    expires_in: i64,
}

impl TokenSigner {
    /// `expires_in` is the token lifetime in seconds
    pub fn new(secret: impl AsRef<[u8]>, expires_in: i64) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            expires_in,
        }
    }

    /// Issue a token for `user_id`, valid from now for the configured lifetime
    pub fn generate(&self, user_id: i64) -> String {
        self.generate_at(user_id, Utc::now().timestamp())
    }

    fn generate_at(&self, user_id: i64, now: i64) -> String {
        let payload = TokenPayload {
            user_id,
            exp: now.saturating_add(self.expires_in),
        };
        // Serializing two integers cannot fail
        let json = serde_json::to_vec(&payload).unwrap_or_default();
        let encoded = BASE64URL_NOPAD.encode(&json);
        let signature = BASE64URL_NOPAD.encode(&self.sign(encoded.as_bytes()));
        format!("{}.{}", encoded, signature)
    }

    /// The user id a token was issued for, or `None` when the token is
    /// malformed, forged or expired
    pub fn verify(&self, token: &str) -> Option<i64> {
        self.verify_at(token, Utc::now().timestamp())
    }

    fn verify_at(&self, token: &str, now: i64) -> Option<i64> {
        let (encoded, signature) = token.split_once('.')?;
        let signature = BASE64URL_NOPAD.decode(signature.as_bytes()).ok()?;

        let mut mac = self.mac();
        mac.update(encoded.as_bytes());
        mac.verify_slice(&signature).ok()?;

        let json = BASE64URL_NOPAD.decode(encoded.as_bytes()).ok()?;
        let payload: TokenPayload = serde_json::from_slice(&json).ok()?;
        if payload.exp < now {
            return None;
        }
        Some(payload.user_id)
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mut mac = self.mac();
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC takes keys of any length, an empty key included
        <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"))
    }
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}
