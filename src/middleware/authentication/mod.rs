//! Request authentication.
//!
//! Each protected scope is wrapped in a [`Manager`] holding one
//! [`Authenticator`] strategy: the OPA bearer check for the chat API, the
//! self-issued cookie token for account routes. A request that passes gets
//! an `Arc<Identity>` in its extensions; every failure gets the same 401.

mod bearer;
mod cookie;
mod getheader;
mod manager;
mod manager_middleware;
mod revocation;

pub use bearer::{IdentityCache, OpaAuthenticator};
pub use cookie::{Claims, JwtAuthenticator};
pub use getheader::get_header;
pub use manager::*;
pub use manager_middleware::*;
pub use revocation::{InMemoryRevocationSet, RedisRevocationSet, RevocationSet};

use crate::helpers::JsonResponse;
use crate::models::Identity;
use actix_web::dev::ServiceRequest;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("credential missing")]
    Missing,
    #[error("credential invalid: {0}")]
    Invalid(String),
    #[error("credential revoked")]
    Revoked,
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    // the body never says which check failed
    fn error_response(&self) -> HttpResponse {
        JsonResponse::<()>::build()
            .set_msg("Unauthorized")
            .respond(StatusCode::UNAUTHORIZED)
    }
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Pull this strategy's credential off the request, if present.
    fn credential(&self, req: &ServiceRequest) -> Result<Option<String>, AuthError>;

    async fn authenticate(&self, credential: &str) -> Result<Identity, AuthError>;
}
