use crate::configuration::JwtSettings;
use crate::middleware::authentication::{AuthError, Authenticator, RevocationSet};
use crate::models::Identity;
use actix_web::dev::ServiceRequest;
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// `users.id`
    pub sub: String,
    /// Login session.
    pub sid: String,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 tokens issued at login and carried in a cookie, checked against the
/// revocation set on every request.
pub struct JwtAuthenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl_hours: i64,
    cookie_name: String,
    revocations: Arc<dyn RevocationSet>,
}

impl JwtAuthenticator {
    pub fn new(settings: &JwtSettings, revocations: Arc<dyn RevocationSet>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // a revocation entry lives exactly until `exp`; no grace period after it
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.secret.as_bytes()),
            validation,
            ttl_hours: settings.token_ttl_hours,
            cookie_name: settings.cookie_name.clone(),
            revocations,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.ttl_hours)
    }

    pub fn issue(&self, user_id: i64, session_id: &str) -> Result<(String, Claims), AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            sid: session_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl()).timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| {
                tracing::error!("Failed to sign token: {:?}", err);
                AuthError::Invalid("token signing failed".to_string())
            })?;

        Ok((token, claims))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| AuthError::Invalid(format!("token rejected: {}", err)))
    }

    /// Put `token` on the revocation set until it would have expired anyway.
    pub async fn revoke(&self, token: &str) -> Result<(), AuthError> {
        let claims = self.verify(token)?;
        let remaining = (claims.exp - Utc::now().timestamp()).max(1);

        self.revocations
            .revoke(token, Duration::from_secs(remaining as u64))
            .await
            .map_err(|err| {
                tracing::error!("Failed to revoke token: {}", err);
                AuthError::Invalid("revocation failed".to_string())
            })
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    fn credential(&self, req: &ServiceRequest) -> Result<Option<String>, AuthError> {
        Ok(req
            .cookie(&self.cookie_name)
            .map(|cookie| cookie.value().to_string())
            .filter(|token| !token.is_empty()))
    }

    #[tracing::instrument(name = "Authenticate with cookie", skip_all)]
    async fn authenticate(&self, credential: &str) -> Result<Identity, AuthError> {
        let claims = self.verify(credential)?;

        let revoked = self.revocations.is_revoked(credential).await.map_err(|err| {
            tracing::error!("Revocation lookup failed: {}", err);
            AuthError::Invalid("revocation lookup failed".to_string())
        })?;
        if revoked {
            return Err(AuthError::Revoked);
        }

        let user_id = claims
            .sub
            .parse::<i64>()
            .map_err(|_| AuthError::Invalid("malformed subject".to_string()))?;

        Ok(Identity {
            user_id,
            session_id: claims.sid,
            email: String::new(),
            name: String::new(),
        })
    }
}
