use std::time::Duration;

use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, InvalidHeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

use shared_config::AppConfig;
use shared_models::error::AppError;

#[derive(Error, Debug)]
pub enum SupabaseError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Unique or exclusion constraint violation reported by PostgREST.
    #[error("Constraint violation: {0}")]
    Conflict(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),
}

impl From<SupabaseError> for AppError {
    fn from(e: SupabaseError) -> Self {
        match e {
            SupabaseError::Auth(msg) => AppError::Auth(msg),
            SupabaseError::NotFound(msg) => AppError::NotFound(msg),
            SupabaseError::Conflict(msg) => AppError::Conflict(msg),
            other => AppError::Database(other.to_string()),
        }
    }
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds.max(1)))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client with timeout ({}), using defaults", e);
                Client::new()
            });

        Self {
            client,
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap, SupabaseError> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.anon_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }

        Ok(headers)
    }

    /// Headers asking PostgREST to echo written rows back.
    pub fn representation_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        headers
    }

    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
    ) -> Result<T, SupabaseError>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T, SupabaseError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url).headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => SupabaseError::Auth(error_text),
                404 => SupabaseError::NotFound(error_text),
                409 => SupabaseError::Conflict(error_text),
                code => SupabaseError::Api { status: code, message: error_text },
            });
        }

        let data = response.json::<T>().await?;
        Ok(data)
    }

    /// `POST /rest/v1/{table}` returning the inserted rows.
    pub async fn insert_returning<T>(
        &self,
        table: &str,
        auth_token: Option<&str>,
        body: Value,
    ) -> Result<Vec<T>, SupabaseError>
    where
        T: DeserializeOwned,
    {
        let path = format!("/rest/v1/{}", table);
        self.request_with_headers(
            Method::POST,
            &path,
            auth_token,
            Some(body),
            Some(Self::representation_headers()),
        )
        .await
    }

    /// `PATCH` against a filtered path returning the rows that matched the filter.
    /// An empty vector means no row satisfied the filter.
    pub async fn update_returning<T>(
        &self,
        path: &str,
        auth_token: Option<&str>,
        body: Value,
    ) -> Result<Vec<T>, SupabaseError>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(
            Method::PATCH,
            path,
            auth_token,
            Some(body),
            Some(Self::representation_headers()),
        )
        .await
    }

    pub async fn delete_returning<T>(
        &self,
        path: &str,
        auth_token: Option<&str>,
    ) -> Result<Vec<T>, SupabaseError>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(
            Method::DELETE,
            path,
            auth_token,
            None,
            Some(Self::representation_headers()),
        )
        .await
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}
