use crate::configuration::Settings;
use crate::connectors::{ChatApiClient, ChatApiConnector};
use crate::helpers::{JsonResponse, UploadHandler};
use crate::middleware::authentication::{
    InMemoryRevocationSet, JwtAuthenticator, Manager, OpaAuthenticator, RedisRevocationSet,
    RevocationSet,
};
use crate::routes;
use crate::services::{ChatService, ExchangeStore, PgExchangeStore};
use actix_cors::Cors;
use actix_web::{dev::Server, error, web, App, HttpServer};
use sqlx::{Pool, Postgres};
use std::io;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;
use tracing_actix_web::TracingLogger;

fn startup_error<E: std::fmt::Display>(err: E) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

async fn revocation_set(settings: &Settings) -> Result<Arc<dyn RevocationSet>, io::Error> {
    match settings.redis_url.as_deref().filter(|url| !url.is_empty()) {
        Some(url) => {
            let set = RedisRevocationSet::new(url).await.map_err(startup_error)?;
            tracing::info!("Token revocation set backed by Redis");
            Ok(Arc::new(set))
        }
        None => {
            tracing::warn!("redis_url not set, revoked tokens are kept in process memory only");
            Ok(Arc::new(InMemoryRevocationSet::new()))
        }
    }
}

pub async fn run(
    listener: TcpListener,
    pg_pool: Pool<Postgres>,
    settings: Settings,
) -> Result<Server, io::Error> {
    let upload_handler = UploadHandler::new(&settings.uploads);
    std::fs::create_dir_all(upload_handler.root())?;

    let connector: Arc<dyn ChatApiConnector> =
        Arc::new(ChatApiClient::new(&settings.chat_api).map_err(startup_error)?);
    let store: Arc<dyn ExchangeStore> = Arc::new(PgExchangeStore::new(
        pg_pool.clone(),
        settings.chat.title_max_chars,
    ));
    let chat_service = web::Data::new(ChatService::new(
        connector,
        store,
        upload_handler.clone(),
        settings.chat.max_messages_per_conversation,
    ));

    let opa_http_client = reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(90))
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(startup_error)?;
    let opa = Arc::new(OpaAuthenticator::new(opa_http_client, &settings.opa));

    let jwt = Arc::new(JwtAuthenticator::new(
        &settings.jwt,
        revocation_set(&settings).await?,
    ));
    let jwt_data = web::Data::from(jwt.clone());

    let settings = web::Data::new(settings);
    let pg_pool = web::Data::new(pg_pool);

    let json_config = web::JsonConfig::default().error_handler(|err, _req| {
        let msg = match &err {
            error::JsonPayloadError::Deserialize(err) => format!(
                "Invalid JSON at line {}, column {}: {}",
                err.line(),
                err.column(),
                err
            ),
            other => other.to_string(),
        };
        JsonResponse::<()>::build().bad_request(msg)
    });

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(Cors::permissive())
            .service(routes::health_check)
            .service(
                web::scope("/api/chat")
                    .wrap(Manager::new(opa.clone()))
                    .service(routes::chat::send::handler)
                    .service(routes::chat::stream::handler)
                    .service(routes::chat::save::handler)
                    .service(routes::chat::delete::handler)
                    .service(routes::chat::get::handler),
            )
            .service(
                web::scope("/api/user")
                    .service(routes::user::register::handler)
                    .service(routes::user::login::handler)
                    .service(
                        web::scope("")
                            .wrap(Manager::new(jwt.clone()))
                            .service(routes::user::logout::handler)
                            .service(routes::user::profile::handler),
                    ),
            )
            .service(actix_files::Files::new(
                upload_handler.url_prefix(),
                upload_handler.root(),
            ))
            .app_data(json_config.clone())
            .app_data(pg_pool.clone())
            .app_data(settings.clone())
            .app_data(chat_service.clone())
            .app_data(jwt_data.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
