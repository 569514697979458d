use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub app: AppConfig,
    pub session: SessionConfig,
    pub pikpak: PikPakConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Each browser session signs in with its own PikPak account.
    Session,
    /// Local accounts share one PikPak service account, isolated by folder.
    MultiTenant,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub mode: Mode,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub secret_key: String,
    pub idle_timeout_secs: u64, // cookie expiry and client eviction
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PikPakConfig {
    pub username: String,
    pub password: String,
    pub root_folder_id: String,
    pub auth_base_url: String,
    pub drive_base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

impl PikPakConfig {
    pub fn root_folder(&self) -> Option<&str> {
        Some(self.root_folder_id.as_str()).filter(|id| !id.is_empty())
    }

    pub fn has_service_account(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub bcrypt_cost: u32,
}

impl Config {
    /// Defaults, then `config/default.toml` if present, then `APP__*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Self::builder()?
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Built-in defaults only.
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::builder()?.build()?.try_deserialize()
    }

    fn builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        config::Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 5000_i64)?
            .set_default("server.static_dir", "static")?
            .set_default("app.mode", "session")?
            .set_default(
                "session.secret_key",
                "pikpak-torrent-downloader-secret-key-change-in-production",
            )?
            .set_default("session.idle_timeout_secs", 86_400_i64)?
            .set_default("session.sweep_interval_secs", 300_i64)?
            .set_default("pikpak.username", "")?
            .set_default("pikpak.password", "")?
            .set_default("pikpak.root_folder_id", "")?
            .set_default("pikpak.auth_base_url", "https://user.mypikpak.com")?
            .set_default("pikpak.drive_base_url", "https://api-drive.mypikpak.com")?
            .set_default("pikpak.client_id", "YNxT9w7GMdWvEOKa")?
            .set_default("pikpak.client_secret", "dbw2OtmVEeuUvIptb1Coyg")?
            .set_default("pikpak.user_agent", "ANDROID-com.pikcloud.pikpak/1.21.0")?
            .set_default("pikpak.request_timeout_secs", 30_i64)?
            .set_default("database.path", "data/pikpak.db")?
            .set_default("auth.bcrypt_cost", i64::from(bcrypt::DEFAULT_COST))
    }
}
