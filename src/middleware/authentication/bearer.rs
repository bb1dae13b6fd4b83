use crate::configuration::OpaSettings;
use crate::middleware::authentication::{get_header, AuthError, Authenticator};
use crate::models::Identity;
use actix_web::dev::ServiceRequest;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::Instrument;

/// Successful validations, reused for `ttl` per token.
pub struct IdentityCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedIdentity>>,
}

struct CachedIdentity {
    identity: Identity,
    expires_at: Instant,
}

impl IdentityCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, token: &str) -> Option<Identity> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(token) {
                Some(entry) if entry.expires_at > now => return Some(entry.identity.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(token) {
            if entry.expires_at <= now {
                entries.remove(token);
            } else {
                return Some(entry.identity.clone());
            }
        }

        None
    }

    pub async fn insert(&self, token: String, identity: Identity) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            token,
            CachedIdentity {
                identity,
                expires_at: now + self.ttl,
            },
        );
    }
}

#[derive(Debug, Deserialize)]
struct OpaTokenResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    data: Option<OpaTokenData>,
}

#[derive(Debug, Deserialize)]
struct OpaTokenData {
    #[serde(deserialize_with = "user_id_from_value")]
    user_id: i64,
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: String,
}

fn user_id_from_value<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom("user_id out of range")),
        Value::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        other => Err(serde::de::Error::custom(format!("unexpected user_id {}", other))),
    }
}

/// Delegates bearer tokens to the OPA `validate-token` endpoint.
pub struct OpaAuthenticator {
    http_client: reqwest::Client,
    validate_url: String,
    cache: Option<IdentityCache>,
}

impl OpaAuthenticator {
    pub fn new(http_client: reqwest::Client, settings: &OpaSettings) -> Self {
        let cache = (settings.cache_ttl_secs > 0)
            .then(|| IdentityCache::new(Duration::from_secs(settings.cache_ttl_secs)));

        Self {
            http_client,
            validate_url: settings.validate_url(),
            cache,
        }
    }

    async fn validate(&self, token: &str) -> Result<Identity, AuthError> {
        let span = tracing::info_span!("opa_validate_token", url = %self.validate_url);
        let resp = self
            .http_client
            .post(&self.validate_url)
            .bearer_auth(token)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .send()
            .instrument(span)
            .await
            .map_err(|err| {
                tracing::error!(target: "auth", error = %err, "OPA request failed");
                AuthError::Invalid("no response from OPA".to_string())
            })?;

        if !resp.status().is_success() {
            tracing::info!(status = resp.status().as_u16(), "OPA rejected token");
            return Err(AuthError::Invalid(format!("OPA status {}", resp.status())));
        }

        let body = resp
            .json::<OpaTokenResponse>()
            .await
            .map_err(|err| AuthError::Invalid(format!("can't parse OPA response: {}", err)))?;

        if body.status != "success" {
            return Err(AuthError::Invalid(format!(
                "OPA validation failed: {}",
                body.message
            )));
        }

        let data = body
            .data
            .ok_or_else(|| AuthError::Invalid("OPA response without data".to_string()))?;

        Ok(Identity {
            user_id: data.user_id,
            session_id: data.session_id,
            email: data.email,
            name: data.name,
        })
    }
}

fn extract_bearer(authorization: &str) -> Result<String, AuthError> {
    let token = authorization
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::Invalid("Bearer missing scheme".to_string()))?
        .trim();
    if token.is_empty() {
        return Err(AuthError::Missing);
    }
    Ok(token.to_string())
}

#[async_trait]
impl Authenticator for OpaAuthenticator {
    fn credential(&self, req: &ServiceRequest) -> Result<Option<String>, AuthError> {
        get_header::<String>(req, "authorization")
            .map_err(AuthError::Invalid)?
            .map(|header| extract_bearer(&header))
            .transpose()
    }

    #[tracing::instrument(name = "Authenticate with bearer token", skip_all)]
    async fn authenticate(&self, credential: &str) -> Result<Identity, AuthError> {
        if let Some(cache) = &self.cache {
            if let Some(identity) = cache.get(credential).await {
                return Ok(identity);
            }
        }

        let identity = self.validate(credential).await?;
        if let Some(cache) = &self.cache {
            cache.insert(credential.to_string(), identity.clone()).await;
        }
        Ok(identity)
    }
}
