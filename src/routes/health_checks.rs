use crate::helpers::JsonResponse;
use actix_web::{get, web, Responder};
use serde::Serialize;
use sqlx::PgPool;
use tracing::Instrument;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub database: &'static str,
    pub version: &'static str,
}

/// GET /health
#[tracing::instrument(name = "Health check.", skip_all)]
#[get("/health")]
pub async fn health_check(pg_pool: web::Data<PgPool>) -> impl Responder {
    let query_span = tracing::info_span!("Probing the database");
    let database = match sqlx::query("SELECT 1")
        .execute(pg_pool.get_ref())
        .instrument(query_span)
        .await
    {
        Ok(_) => "healthy",
        Err(err) => {
            tracing::error!("Database probe failed: {:?}", err);
            "unhealthy"
        }
    };

    JsonResponse::build()
        .set_data(HealthReport {
            database,
            version: env!("CARGO_PKG_VERSION"),
        })
        .ok("ok")
}
