//! Session token signing (HMAC-SHA256 over the encoded payload).

use bastion_wire::{SessionTokenPayload, SignedSessionToken};
use hmac::{Hmac, Mac};
use prost::Message;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("no session token presented")]
    Missing,

    #[error("signing key rejected")]
    InvalidKey,

    #[error("token signature does not match")]
    BadSignature,

    #[error("token payload is malformed: {0}")]
    Malformed(String),

    #[error("token expired at {expires_at_ms} (now {now_ms})")]
    Expired { expires_at_ms: u64, now_ms: u64 },
}

fn mac(secret: &[u8], payload: &[u8]) -> Result<HmacSha256, TokenError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| TokenError::InvalidKey)?;
    mac.update(payload);
    Ok(mac)
}

pub fn sign(payload: &SessionTokenPayload, secret: &[u8]) -> Result<SignedSessionToken, TokenError> {
    let bytes = payload.encode_to_vec();
    let signature = mac(secret, &bytes)?.finalize().into_bytes().to_vec();
    Ok(SignedSessionToken {
        payload: bytes,
        signature,
    })
}

/// Check the signature in constant time, then decode and check expiry.
pub fn verify(
    token: &SignedSessionToken,
    secret: &[u8],
    now_ms: u64,
) -> Result<SessionTokenPayload, TokenError> {
    mac(secret, &token.payload)?
        .verify_slice(&token.signature)
        .map_err(|_| TokenError::BadSignature)?;
    let payload = SessionTokenPayload::decode(token.payload.as_slice())
        .map_err(|e| TokenError::Malformed(e.to_string()))?;
    if now_ms >= payload.expires_at_ms {
        return Err(TokenError::Expired {
            expires_at_ms: payload.expires_at_ms,
            now_ms,
        });
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret";

    fn payload() -> SessionTokenPayload {
        SessionTokenPayload {
            session_id: "s".to_string(),
            user_id: "u".to_string(),
            seed: 99,
            sim_version: "v".to_string(),
            start_wave: 5,
            audit_ticks: vec![10, 20],
            sim_config: None,
            issued_at_ms: 1_000,
            expires_at_ms: 5_000,
        }
    }

    #[test]
    fn test_sign_then_verify() {
        let token = sign(&payload(), SECRET).unwrap();
        assert_eq!(token.signature.len(), 32);
        assert_eq!(verify(&token, SECRET, 2_000), Ok(payload()));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let mut token = sign(&payload(), SECRET).unwrap();
        let mut forged = payload();
        forged.start_wave = 50;
        token.payload = forged.encode_to_vec();
        assert_eq!(verify(&token, SECRET, 2_000), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = sign(&payload(), SECRET).unwrap();
        assert_eq!(verify(&token, b"other", 2_000), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_expired() {
        let token = sign(&payload(), SECRET).unwrap();
        assert_eq!(
            verify(&token, SECRET, 5_000),
            Err(TokenError::Expired {
                expires_at_ms: 5_000,
                now_ms: 5_000
            })
        );
    }
}
