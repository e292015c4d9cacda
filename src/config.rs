use anyhow::Result;
use std::env;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Clone)]
pub struct Config {
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub request_timeout: Option<Duration>,
    pub http_port: u16,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let gemini_api_key = env::var("GEMINI_API_KEY")
            .or_else(|_| env::var("API_KEY"))
            .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY environment variable not set"))?;

        let request_timeout = match env::var("REQUEST_TIMEOUT_SECS") {
            Ok(raw) => {
                let secs: u64 = raw
                    .parse()
                    .map_err(|_| anyhow::anyhow!("REQUEST_TIMEOUT_SECS must be a whole number of seconds, got '{}'", raw))?;
                Some(Duration::from_secs(secs))
            }
            Err(_) => None,
        };

        let http_port = match env::var("HTTP_PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| anyhow::anyhow!("HTTP_PORT must be a valid port, got '{}'", raw))?,
            Err(_) => 8080,
        };

        Ok(Config {
            gemini_api_key,
            gemini_model: env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            gemini_base_url: env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            request_timeout,
            http_port,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

// The API key must never reach the logs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("gemini_api_key", &"<redacted>")
            .field("gemini_model", &self.gemini_model)
            .field("gemini_base_url", &self.gemini_base_url)
            .field("request_timeout", &self.request_timeout)
            .field("http_port", &self.http_port)
            .field("log_level", &self.log_level)
            .finish()
    }
}
