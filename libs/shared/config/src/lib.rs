use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    /// Base URL of the web client; video rooms live under `{client_url}/room/{id}`.
    pub client_url: String,
    pub payment_webhook_secret: String,
    pub mail_api_url: String,
    pub mail_api_key: String,
    pub mail_from: String,
    pub notification_queue_capacity: usize,
    pub notification_max_attempts: u32,
    pub notification_retry_delay_ms: u64,
    pub request_timeout_seconds: u64,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            client_url: env::var("CLIENT_URL")
                .unwrap_or_else(|_| {
                    warn!("CLIENT_URL not set, using default");
                    "http://localhost:3000".to_string()
                }),
            payment_webhook_secret: env::var("PAYMENT_WEBHOOK_SECRET")
                .unwrap_or_else(|_| {
                    warn!("PAYMENT_WEBHOOK_SECRET not set, payment callbacks will be rejected");
                    String::new()
                }),
            mail_api_url: env::var("MAIL_API_URL")
                .unwrap_or_else(|_| {
                    warn!("MAIL_API_URL not set, notifications will only be logged");
                    String::new()
                }),
            mail_api_key: env::var("MAIL_API_KEY").unwrap_or_default(),
            mail_from: env::var("MAIL_FROM")
                .unwrap_or_else(|_| "no-reply@clinic.local".to_string()),
            notification_queue_capacity: parse_env("NOTIFICATION_QUEUE_CAPACITY", 256),
            notification_max_attempts: parse_env("NOTIFICATION_MAX_ATTEMPTS", 3),
            notification_retry_delay_ms: parse_env("NOTIFICATION_RETRY_DELAY_MS", 2000),
            request_timeout_seconds: parse_env("REQUEST_TIMEOUT_SECONDS", 10),
            port: parse_env("PORT", 3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_mail_configured(&self) -> bool {
        !self.mail_api_url.is_empty()
    }
}

fn parse_env<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
