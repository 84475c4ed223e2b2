use crate::error::AppError;
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: usize,
}

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            client_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// `None` runs the service on the in-process store
    pub database: Option<DatabaseConfig>,
    pub jwt_public_key_pem: String,
    pub media_service_url: String,
    pub user_service_url: String,
    pub internal_api_token: Option<String>,
    pub websocket: WebSocketConfig,
    pub http_client_timeout: Duration,
    pub message_page_limit_max: usize,
}

fn required(name: &str) -> Result<String, AppError> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::Config(format!("{name} missing")))
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let port = parsed_or("PORT", 8085);

        let database = env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .map(|url| DatabaseConfig {
                url,
                max_connections: parsed_or("DATABASE_MAX_CONNECTIONS", 16),
            });

        // Allow escaped newlines so the key fits in a single env line
        let jwt_public_key_pem = required("JWT_PUBLIC_KEY_PEM")?.replace("\\n", "\n");

        let media_service_url = required("MEDIA_SERVICE_URL")?
            .trim_end_matches('/')
            .to_string();
        let user_service_url = required("USER_SERVICE_URL")?
            .trim_end_matches('/')
            .to_string();

        let internal_api_token = env::var("INTERNAL_API_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());

        let websocket = WebSocketConfig {
            heartbeat_interval: Duration::from_secs(parsed_or("WS_HEARTBEAT_INTERVAL_SECS", 5)),
            client_timeout: Duration::from_secs(parsed_or("WS_CLIENT_TIMEOUT_SECS", 30)),
        };
        if websocket.client_timeout <= websocket.heartbeat_interval {
            return Err(AppError::Config(
                "WS_CLIENT_TIMEOUT_SECS must exceed WS_HEARTBEAT_INTERVAL_SECS".into(),
            ));
        }

        let http_client_timeout = Duration::from_secs(parsed_or("HTTP_CLIENT_TIMEOUT_SECS", 15));
        let message_page_limit_max = parsed_or("MESSAGE_PAGE_LIMIT_MAX", 100usize).max(1);

        Ok(Config {
            port,
            database,
            jwt_public_key_pem,
            media_service_url,
            user_service_url,
            internal_api_token,
            websocket,
            http_client_timeout,
            message_page_limit_max,
        })
    }

    /// Settings for tests and local tooling; never reads the environment
    pub fn for_tests() -> Self {
        Config {
            port: 0,
            database: None,
            jwt_public_key_pem: String::new(),
            media_service_url: "http://media.invalid".into(),
            user_service_url: "http://users.invalid".into(),
            internal_api_token: Some("internal-test-token".into()),
            websocket: WebSocketConfig::default(),
            http_client_timeout: Duration::from_secs(5),
            message_page_limit_max: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsed_or_falls_back_on_garbage() {
        env::set_var("CHAT_TEST_PARSED_OR", "not-a-number");
        assert_eq!(parsed_or("CHAT_TEST_PARSED_OR", 7u64), 7);
        env::set_var("CHAT_TEST_PARSED_OR", "12");
        assert_eq!(parsed_or("CHAT_TEST_PARSED_OR", 7u64), 12);
        env::remove_var("CHAT_TEST_PARSED_OR");
    }

    #[test]
    fn test_required_rejects_blank() {
        env::set_var("CHAT_TEST_REQUIRED", "   ");
        assert!(matches!(
            required("CHAT_TEST_REQUIRED"),
            Err(AppError::Config(_))
        ));
        env::remove_var("CHAT_TEST_REQUIRED");
    }
}
