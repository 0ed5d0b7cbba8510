//! Caller credential verification.
//!
//! Callers present `Bearer <token>` where the token is an HS256 JWT carrying a
//! `userId` claim. Only verification lives here; issuing tokens belongs to the
//! account service.

use async_trait::async_trait;
use jsonwebtoken::{decode, errors::ErrorKind as JwtErrorKind, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tracing::debug;

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};

/// Clock skew tolerated when checking `exp`, in seconds.
const LEEWAY_SECS: u64 = 60;

/// Resolves a bearer credential to a user id.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Verify `credential` and return the user id it was issued for.
    async fn verify(&self, credential: &str) -> AuthResult<String>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(rename = "userId")]
    user_id: String,
}

/// HS256 JWT verifier
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// Create a verifier for the configured secret
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = LEEWAY_SECS;
        // `exp` is checked when present but not required.
        validation.required_spec_claims.clear();

        Self {
            key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl CredentialVerifier for JwtVerifier {
    async fn verify(&self, credential: &str) -> AuthResult<String> {
        let token = bearer_token(credential)?;

        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                JwtErrorKind::InvalidSignature => AuthError::InvalidSignature,
                JwtErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Malformed {
                    reason: e.to_string(),
                },
            }
        })?;

        debug!(user_id = %data.claims.user_id, "Credential verified");
        Ok(data.claims.user_id)
    }
}

/// Strip the `Bearer ` scheme from an authorization value.
pub fn bearer_token(credential: &str) -> AuthResult<&str> {
    let credential = credential.trim();
    if credential.is_empty() {
        return Err(AuthError::MissingCredential);
    }

    match credential.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(AuthError::Malformed {
            reason: "authorization must use the Bearer scheme".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "unit-test-secret";

    fn sign(claims: serde_json::Value, secret: &str) -> String {
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();
        format!("Bearer {}", token)
    }

    fn verifier() -> JwtVerifier {
        JwtVerifier::new(&AuthConfig {
            jwt_secret: SECRET.to_string(),
        })
    }

    #[tokio::test]
    async fn test_valid_token() {
        let token = sign(json!({"userId": "user-42"}), SECRET);
        assert_eq!(verifier().verify(&token).await.unwrap(), "user-42");
    }

    #[tokio::test]
    async fn test_future_expiry_accepted() {
        let exp = Utc::now().timestamp() + 3600;
        let token = sign(json!({"userId": "user-42", "exp": exp}), SECRET);
        assert!(verifier().verify(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_token() {
        let exp = Utc::now().timestamp() - 3600;
        let token = sign(json!({"userId": "user-42", "exp": exp}), SECRET);
        assert!(matches!(
            verifier().verify(&token).await,
            Err(AuthError::Expired)
        ));
    }

    #[tokio::test]
    async fn test_expiry_within_leeway_accepted() {
        let exp = Utc::now().timestamp() - 10;
        let token = sign(json!({"userId": "user-42", "exp": exp}), SECRET);
        assert!(verifier().verify(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_wrong_secret() {
        let token = sign(json!({"userId": "user-42"}), "other-secret");
        assert!(matches!(
            verifier().verify(&token).await,
            Err(AuthError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn test_other_algorithm_rejected() {
        let token = encode(
            &Header::new(Algorithm::HS512),
            &json!({"userId": "user-42"}),
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(matches!(
            verifier().verify(&format!("Bearer {}", token)).await,
            Err(AuthError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_user_id_claim() {
        let token = sign(json!({"sub": "user-42"}), SECRET);
        assert!(matches!(
            verifier().verify(&token).await,
            Err(AuthError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn test_garbage_token() {
        assert!(matches!(
            verifier().verify("Bearer not-a-jwt").await,
            Err(AuthError::Malformed { .. })
        ));
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc").unwrap(), "abc");
        assert_eq!(bearer_token("bearer  abc ").unwrap(), "abc");
        assert!(matches!(bearer_token(""), Err(AuthError::MissingCredential)));
        assert!(matches!(
            bearer_token("Basic abc"),
            Err(AuthError::Malformed { .. })
        ));
        assert!(matches!(
            bearer_token("Bearer"),
            Err(AuthError::Malformed { .. })
        ));
    }
}
