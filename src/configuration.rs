use serde;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub app_port: u16,
    pub app_host: String,
    #[serde(default)]
    pub redis_url: Option<String>,
    pub jwt: JwtSettings,
    pub chat_api: ChatApiSettings,
    #[serde(default)]
    pub opa: OpaSettings,
    #[serde(default)]
    pub chat: ChatSettings,
    #[serde(default)]
    pub uploads: UploadSettings,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database_name: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct JwtSettings {
    pub secret: String,
    #[serde(default = "JwtSettings::default_token_ttl_hours")]
    pub token_ttl_hours: i64,
    #[serde(default = "JwtSettings::default_cookie_name")]
    pub cookie_name: String,
}

impl JwtSettings {
    fn default_token_ttl_hours() -> i64 {
        24
    }

    fn default_cookie_name() -> String {
        "token".to_string()
    }
}

/// Remote chat API endpoint and the defaults applied to unset request fields.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ChatApiSettings {
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "ChatApiSettings::default_api_key_header")]
    pub api_key_header: String,
    #[serde(default = "ChatApiSettings::default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "ChatApiSettings::default_model")]
    pub default_model: String,
    #[serde(default = "ChatApiSettings::default_persona")]
    pub default_persona: String,
    #[serde(default = "ChatApiSettings::default_response_mode")]
    pub default_response_mode: String,
    #[serde(default = "ChatApiSettings::default_reranker")]
    pub default_reranker: String,
}

impl ChatApiSettings {
    fn default_api_key_header() -> String {
        "x-api-key".to_string()
    }

    fn default_timeout_secs() -> u64 {
        60
    }

    fn default_model() -> String {
        "llama-4".to_string()
    }

    fn default_persona() -> String {
        "Normal".to_string()
    }

    fn default_response_mode() -> String {
        "short".to_string()
    }

    fn default_reranker() -> String {
        "false".to_string()
    }

    /// Full URL of the streaming chat endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}/chat-stream/", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct OpaSettings {
    pub base_url: String,
    /// Seconds a successful token validation is reused. 0 disables the cache.
    #[serde(default)]
    pub cache_ttl_secs: u64,
}

impl Default for OpaSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.opa.co.id".to_string(),
            cache_ttl_secs: 0,
        }
    }
}

impl OpaSettings {
    pub fn validate_url(&self) -> String {
        format!("{}/validate-token", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ChatSettings {
    pub max_messages_per_conversation: i64,
    pub title_max_chars: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            max_messages_per_conversation: 50,
            title_max_chars: 100,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct UploadSettings {
    pub dir: String,
    pub url_prefix: String,
    pub max_bytes: usize,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            dir: "./uploads".to_string(),
            url_prefix: "/uploads".to_string(),
            max_bytes: 50 * 1024 * 1024,
        }
    }
}

impl DatabaseSettings {
    // Connection string: postgresql://<username>:<password>@<host>:<port>/<database_name>
    pub fn connection_string(&self) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name,
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgresql://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port,
        )
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // `configuration.yaml` first, then APP_* overrides, e.g. APP_CHAT_API__API_KEY
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration"))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
