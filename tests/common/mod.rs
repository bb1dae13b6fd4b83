#![allow(dead_code)]

use chat_relay::configuration::{get_configuration, DatabaseSettings, Settings};
use serde_json::json;
use sqlx::{Connection, Executor, PgConnection, PgPool};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const REPLY: &str = concat!(
    "data: {\"token\": \"Halo \"}\n\n",
    "data: {\"token\": \"dunia\"}\n\n",
    "data: {\"status\": \"success\", \"data\": {\"message\": \"done\", \"conversation_id\": \"remote-1\", \"role\": \"assistant\"}}\n\n",
);

pub struct TestApp {
    pub address: String,
    pub db_pool: PgPool,
    pub chat_api: MockServer,
    pub opa: MockServer,
    pub client: reqwest::Client,
    _uploads: tempfile::TempDir,
}

impl TestApp {
    /// Bearer token the OPA mock accepts for `user_id`.
    pub fn token_for(user_id: i64) -> String {
        format!("user-{}", user_id)
    }

    pub async fn reply_with(&self, body: &str) {
        Mock::given(method("POST"))
            .and(path("/chat-stream/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&self.chat_api)
            .await;
    }

    pub async fn chat_calls(&self) -> usize {
        self.chat_api
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }

    pub fn post(&self, route: &str, user_id: i64) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.address, route))
            .bearer_auth(Self::token_for(user_id))
    }

    pub fn get(&self, route: &str, user_id: i64) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.address, route))
            .bearer_auth(Self::token_for(user_id))
    }

    pub fn delete(&self, route: &str, user_id: i64) -> reqwest::RequestBuilder {
        self.client
            .delete(format!("{}{}", self.address, route))
            .bearer_auth(Self::token_for(user_id))
    }
}

async fn mock_opa(users: &[i64]) -> MockServer {
    let opa = MockServer::start().await;
    for user_id in users {
        Mock::given(method("POST"))
            .and(path("/validate-token"))
            .and(header(
                "authorization",
                format!("Bearer {}", TestApp::token_for(*user_id)).as_str(),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "message": "Token valid",
                "data": {
                    "user_id": user_id,
                    "session_id": format!("sess-{}", user_id),
                    "email": format!("user{}@example.com", user_id),
                    "name": format!("User {}", user_id),
                }
            })))
            .mount(&opa)
            .await;
    }
    Mock::given(method("POST"))
        .and(path("/validate-token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "status": "error",
            "message": "Invalid token",
        })))
        .mount(&opa)
        .await;
    opa
}

pub async fn spawn_app_with_configuration(mut configuration: Settings) -> Option<TestApp> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    configuration.database.database_name = uuid::Uuid::new_v4().to_string();
    let connection_pool = match configure_database(&configuration.database).await {
        Ok(pool) => pool,
        Err(err) => {
            eprintln!("Skipping tests: failed to connect to postgres: {}", err);
            return None;
        }
    };

    let chat_api = MockServer::start().await;
    let opa = mock_opa(&[1, 2]).await;
    let uploads = tempfile::tempdir().expect("Failed to create upload dir");

    configuration.redis_url = None;
    configuration.chat_api.base_url = chat_api.uri();
    configuration.opa.base_url = opa.uri();
    configuration.opa.cache_ttl_secs = 0;
    configuration.uploads.dir = uploads.path().to_string_lossy().into_owned();

    let server = chat_relay::startup::run(listener, connection_pool.clone(), configuration)
        .await
        .expect("Failed to bind address.");
    let _ = tokio::spawn(server);

    Some(TestApp {
        address,
        db_pool: connection_pool,
        chat_api,
        opa,
        client: reqwest::Client::new(),
        _uploads: uploads,
    })
}

pub async fn spawn_app() -> Option<TestApp> {
    let configuration = get_configuration().expect("Failed to get configuration");
    spawn_app_with_configuration(configuration).await
}

pub async fn configure_database(config: &DatabaseSettings) -> Result<PgPool, sqlx::Error> {
    let mut connection = PgConnection::connect(&config.connection_string_without_db()).await?;

    connection
        .execute(format!(r#"CREATE DATABASE "{}""#, config.database_name).as_str())
        .await?;

    let connection_pool = PgPool::connect(&config.connection_string()).await?;

    sqlx::migrate!("./migrations").run(&connection_pool).await?;

    Ok(connection_pool)
}
