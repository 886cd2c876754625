use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// 缺少必需的环境变量
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// 环境变量无法解析
    #[error("Invalid value for environment variable {name}: {value}")]
    InvalidValue { name: String, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// 未配置时使用内存存储
    pub database_url: Option<String>,
    /// 未配置时关闭限流
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    /// 注册邮箱必须属于该域名
    pub allowed_email_domain: String,
    pub upload_dir: PathBuf,
    pub upload_base_url: String,
    pub client_urls: Vec<String>,
    pub client_dist_dir: Option<PathBuf>,
    pub bcrypt_cost: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            redis_url: None,
            jwt_secret: "unilink-development-secret".into(),
            jwt_expiration_secs: 168 * 3600,
            rate_limit_window_secs: 15 * 60,
            rate_limit_requests: 100,
            server_host: "0.0.0.0".into(),
            server_port: 5000,
            api_base_uri: "/api".into(),
            allowed_email_domain: "srishakthi.ac.in".into(),
            upload_dir: PathBuf::from("uploads"),
            upload_base_url: "/uploads".into(),
            client_urls: vec![
                "http://localhost:5173".into(),
                "http://localhost:5174".into(),
            ],
            client_dist_dir: None,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let defaults = Self::default();
        let jwt_expiration_hours = match optional("JWT_EXPIRATION") {
            Some(raw) => parse_value("JWT_EXPIRATION", raw.trim_end_matches('h'))?,
            None => defaults.jwt_expiration_secs / 3600,
        };

        Ok(Config {
            database_url: optional("DATABASE_URL"),
            redis_url: optional("REDIS_URL"),
            jwt_secret: required("JWT_SECRET")?,
            jwt_expiration_secs: jwt_expiration_hours * 3600,
            rate_limit_window_secs: parsed_or("RATE_LIMIT_WINDOW", defaults.rate_limit_window_secs)?,
            rate_limit_requests: parsed_or("RATE_LIMIT_REQUESTS", defaults.rate_limit_requests)?,
            server_host: optional("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parsed_or("SERVER_PORT", defaults.server_port)?,
            api_base_uri: optional("API_BASE_URI").unwrap_or(defaults.api_base_uri),
            allowed_email_domain: optional("ALLOWED_EMAIL_DOMAIN")
                .map(|domain| domain.trim_start_matches('@').to_lowercase())
                .unwrap_or(defaults.allowed_email_domain),
            upload_dir: optional("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            upload_base_url: optional("UPLOAD_BASE_URL").unwrap_or(defaults.upload_base_url),
            client_urls: optional("CLIENT_URLS")
                .map(|urls| {
                    urls.split(',')
                        .map(str::trim)
                        .filter(|url| !url.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or(defaults.client_urls),
            client_dist_dir: optional("CLIENT_DIST_DIR").map(PathBuf::from),
            bcrypt_cost: parsed_or("BCRYPT_COST", defaults.bcrypt_cost)?,
        })
    }

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn required(name: &str) -> Result<String, ConfigError> {
    optional(name).ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn parsed_or<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        Some(raw) => parse_value(name, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        value: raw.to_string(),
    })
}
