//! Handshake authentication.
//!
//! The login service issues signed [`AccessToken`]s; the gateway only checks
//! them. Verification sits behind [`IdentityVerifier`] so the handshake code
//! does not care which scheme produced the credential.

use axum::http::HeaderMap;
use tracing::debug;

use parley_shared::token::{verify_access_token, AccessToken};
use parley_shared::UserId;

use crate::error::GatewayError;

/// Turns a bearer credential into the user it was issued for.
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, credential: &str) -> Result<UserId, GatewayError>;
}

/// Verifies Ed25519-signed access tokens against the login service key.
///
/// The all-zero key is the unconfigured default and refuses every token.
#[derive(Clone)]
pub struct SignedTokenVerifier {
    issuer_pubkey: [u8; 32],
}

impl SignedTokenVerifier {
    pub fn new(issuer_pubkey: [u8; 32]) -> Self {
        Self { issuer_pubkey }
    }
}

impl IdentityVerifier for SignedTokenVerifier {
    fn verify(&self, credential: &str) -> Result<UserId, GatewayError> {
        if self.issuer_pubkey == [0u8; 32] {
            return Err(GatewayError::AuthenticationFailed(
                "token verification key not configured".into(),
            ));
        }
        let token = AccessToken::decode(credential)?;
        let user = verify_access_token(&token, &self.issuer_pubkey)?;
        if user.is_system() {
            return Err(GatewayError::AuthenticationFailed("reserved user id".into()));
        }
        debug!(user = %user, "access token verified");
        Ok(user)
    }
}

/// Pull the bearer credential out of a handshake.
///
/// The `Authorization: Bearer` header wins; the `token` query parameter is
/// accepted for browser clients that cannot set headers on a WebSocket
/// upgrade.
pub fn bearer_credential<'a>(
    headers: &'a HeaderMap,
    query_token: Option<&'a str>,
) -> Option<&'a str> {
    let from_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    from_header.or_else(|| query_token.map(str::trim).filter(|t| !t.is_empty()))
}

/// Resolve the caller of an HTTP request, or fail with `AuthenticationFailed`.
pub fn authenticate(
    verifier: &dyn IdentityVerifier,
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Result<UserId, GatewayError> {
    let credential = bearer_credential(headers, query_token)
        .ok_or_else(|| GatewayError::AuthenticationFailed("missing credential".into()))?;
    verifier.verify(credential)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::{Duration, Utc};
    use ed25519_dalek::SigningKey;
    use parley_shared::token::create_access_token;
    use rand::rngs::OsRng;

    fn bearer_for(user: UserId, key: &SigningKey) -> String {
        create_access_token(user, Utc::now() + Duration::hours(1), key)
            .encode()
            .unwrap()
    }

    #[test]
    fn test_verify_valid_token() {
        let issuer = SigningKey::generate(&mut OsRng);
        let verifier = SignedTokenVerifier::new(issuer.verifying_key().to_bytes());

        let user = verifier.verify(&bearer_for(UserId(7), &issuer)).unwrap();
        assert_eq!(user, UserId(7));
    }

    #[test]
    fn test_verify_rejects_garbage_and_wrong_issuer() {
        let issuer = SigningKey::generate(&mut OsRng);
        let other = SigningKey::generate(&mut OsRng);
        let verifier = SignedTokenVerifier::new(issuer.verifying_key().to_bytes());

        assert!(matches!(
            verifier.verify("not-a-token"),
            Err(GatewayError::AuthenticationFailed(_))
        ));
        assert!(matches!(
            verifier.verify(&bearer_for(UserId(7), &other)),
            Err(GatewayError::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn test_verify_rejects_system_user() {
        let issuer = SigningKey::generate(&mut OsRng);
        let verifier = SignedTokenVerifier::new(issuer.verifying_key().to_bytes());

        assert!(verifier.verify(&bearer_for(UserId::SYSTEM, &issuer)).is_err());
    }

    #[test]
    fn test_unconfigured_key_refuses_forged_tokens() {
        let verifier = SignedTokenVerifier::new([0u8; 32]);
        let mut forged = [0u8; 64];
        forged[0] = 1;

        for i in 0..16 {
            let credential = AccessToken {
                user_id: UserId(7),
                valid_until: Utc::now() + Duration::hours(1) + Duration::seconds(i),
                signature: forged.to_vec(),
            }
            .encode()
            .unwrap();
            assert!(matches!(
                verifier.verify(&credential),
                Err(GatewayError::AuthenticationFailed(_))
            ));
        }
    }

    #[test]
    fn test_bearer_header_preferred_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );

        assert_eq!(
            bearer_credential(&headers, Some("from-query")),
            Some("from-header")
        );
        assert_eq!(
            bearer_credential(&HeaderMap::new(), Some("from-query")),
            Some("from-query")
        );
        assert_eq!(bearer_credential(&HeaderMap::new(), Some("  ")), None);
        assert_eq!(bearer_credential(&HeaderMap::new(), None), None);
    }

    #[test]
    fn test_authenticate_without_credential() {
        let verifier = SignedTokenVerifier::new([0u8; 32]);
        assert!(matches!(
            authenticate(&verifier, &HeaderMap::new(), None),
            Err(GatewayError::AuthenticationFailed(_))
        ));
    }
}
