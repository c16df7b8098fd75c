use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

/// PostgreSQL codes for unique_violation and exclusion_violation.
const UNIQUE_VIOLATION: &str = "23505";
const EXCLUSION_VIOLATION: &str = "23P01";

#[derive(Error, Debug)]
pub enum SupabaseError {
    #[error("Authentication error ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Constraint violation ({code}): {message}")]
    Constraint { code: String, message: String },

    #[error("API error ({status}): {message}")]
    Api { status: u16, code: Option<String>, message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),
}

impl From<reqwest::Error> for SupabaseError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SupabaseError::Timeout
        } else if err.is_decode() {
            SupabaseError::Decode(err.to_string())
        } else {
            SupabaseError::Transport(err.to_string())
        }
    }
}

/// Error body returned by PostgREST.
#[derive(Debug, Default, Deserialize)]
struct PostgrestError {
    code: Option<String>,
    message: Option<String>,
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        let client = Client::builder()
            .timeout(config.storage_timeout())
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap, SupabaseError> {
        let mut headers = HeaderMap::new();

        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.anon_key)
                .map_err(|e| SupabaseError::InvalidHeader(e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let bearer = auth_token.unwrap_or(&self.anon_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", bearer))
                .map_err(|e| SupabaseError::InvalidHeader(e.to_string()))?,
        );

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> Result<T, SupabaseError>
    where T: DeserializeOwned {
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
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);
            return Err(Self::classify_error(status.as_u16(), &error_text));
        }

        let data = response.json::<T>().await?;
        Ok(data)
    }

    /// Mutating request that asks PostgREST to echo the affected rows.
    pub async fn request_returning(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Vec<Value>, SupabaseError> {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        self.request_with_headers(method, path, None, body, Some(headers)).await
    }

    fn classify_error(status: u16, body: &str) -> SupabaseError {
        let parsed: PostgrestError = serde_json::from_str(body).unwrap_or_default();
        let message = parsed.message.unwrap_or_else(|| body.to_string());

        match (status, parsed.code.as_deref()) {
            (_, Some(code)) if code == UNIQUE_VIOLATION || code == EXCLUSION_VIOLATION => {
                SupabaseError::Constraint { code: code.to_string(), message }
            }
            (409, code) => SupabaseError::Constraint {
                code: code.unwrap_or("409").to_string(),
                message,
            },
            (401 | 403, _) => SupabaseError::Auth { status, message },
            (404, _) => SupabaseError::NotFound(message),
            (_, code) => SupabaseError::Api {
                status,
                code: code.map(str::to_string),
                message,
            },
        }
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}
