//! Bearer access tokens.
//!
//! The login service signs an [`AccessToken`] with its Ed25519 key and hands
//! the encoded string to the client, which presents it when opening the
//! real-time socket. The gateway only ever verifies.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::TokenError;
use crate::types::UserId;

// Token signed by the login service, client presents it at handshake time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub user_id: UserId,
    pub valid_until: DateTime<Utc>,
    pub signature: Vec<u8>,
}

impl AccessToken {
    /// Encode as the opaque bearer string (base64url of the JSON body).
    pub fn encode(&self) -> Result<String, TokenError> {
        let json = serde_json::to_vec(self)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    pub fn decode(bearer: &str) -> Result<Self, TokenError> {
        let bytes = URL_SAFE_NO_PAD.decode(bearer.trim())?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

// payload = user_id (8 bytes, big endian) || valid_until (rfc3339)
fn signing_payload(user_id: UserId, valid_until: &DateTime<Utc>) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&user_id.0.to_be_bytes());
    payload.extend_from_slice(valid_until.to_rfc3339().as_bytes());
    payload
}

/// Check signature and expiry, returning the authenticated user.
///
/// Uses strict verification: small-order issuer keys and signature `R`
/// points are refused, so no token verifies against a degenerate key such
/// as all zeros.
pub fn verify_access_token(
    token: &AccessToken,
    issuer_pubkey: &[u8; 32],
) -> Result<UserId, TokenError> {
    if Utc::now() > token.valid_until {
        return Err(TokenError::Expired);
    }

    let verifying_key =
        VerifyingKey::from_bytes(issuer_pubkey).map_err(|_| TokenError::InvalidKey)?;

    let signature =
        Signature::from_slice(&token.signature).map_err(|_| TokenError::BadSignature)?;

    verifying_key
        .verify_strict(&signing_payload(token.user_id, &token.valid_until), &signature)
        .map_err(|_| TokenError::BadSignature)?;

    Ok(token.user_id)
}

pub fn create_access_token(
    user_id: UserId,
    valid_until: DateTime<Utc>,
    issuer_signing_key: &ed25519_dalek::SigningKey,
) -> AccessToken {
    use ed25519_dalek::Signer;

    let signature = issuer_signing_key.sign(&signing_payload(user_id, &valid_until));

    AccessToken {
        user_id,
        valid_until,
        signature: signature.to_bytes().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    #[test]
    fn test_access_token_valid() {
        let issuer = SigningKey::generate(&mut OsRng);
        let pubkey = issuer.verifying_key().to_bytes();

        let token = create_access_token(UserId(7), Utc::now() + Duration::hours(1), &issuer);
        let bearer = token.encode().unwrap();

        let decoded = AccessToken::decode(&bearer).unwrap();
        assert_eq!(verify_access_token(&decoded, &pubkey).unwrap(), UserId(7));
    }

    #[test]
    fn test_access_token_expired() {
        let issuer = SigningKey::generate(&mut OsRng);
        let pubkey = issuer.verifying_key().to_bytes();

        let token = create_access_token(UserId(7), Utc::now() - Duration::minutes(1), &issuer);
        assert!(matches!(
            verify_access_token(&token, &pubkey),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn test_access_token_wrong_issuer() {
        let issuer = SigningKey::generate(&mut OsRng);
        let other = SigningKey::generate(&mut OsRng);

        let token = create_access_token(UserId(7), Utc::now() + Duration::hours(1), &issuer);
        assert!(verify_access_token(&token, &other.verifying_key().to_bytes()).is_err());
    }

    #[test]
    fn test_tampered_user_id_rejected() {
        let issuer = SigningKey::generate(&mut OsRng);
        let pubkey = issuer.verifying_key().to_bytes();

        let mut token = create_access_token(UserId(7), Utc::now() + Duration::hours(1), &issuer);
        token.user_id = UserId(9);
        assert!(matches!(
            verify_access_token(&token, &pubkey),
            Err(TokenError::BadSignature)
        ));
    }

    #[test]
    fn test_zero_key_rejects_identity_signature() {
        // R = identity, s = 0 satisfies the cofactored equation for the
        // all-zero key whenever the challenge scalar is a multiple of 4.
        let mut forged = [0u8; 64];
        forged[0] = 1;
        let base = Utc::now() + Duration::hours(1);

        for i in 0..64 {
            let token = AccessToken {
                user_id: UserId(7),
                valid_until: base + Duration::seconds(i),
                signature: forged.to_vec(),
            };
            assert!(
                verify_access_token(&token, &[0u8; 32]).is_err(),
                "forged token accepted at offset {i}"
            );
        }
    }

    #[test]
    fn test_garbage_bearer() {
        assert!(AccessToken::decode("not a token!").is_err());
        assert!(AccessToken::decode("e30").is_err()); // "{}"
    }
}
