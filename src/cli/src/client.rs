//! HTTP client for the CallMonitor API server.
//!
//! Every request carries the bearer token and the organization header
//! when they are configured.

use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Header the server reads the requested organization from.
pub const ORGANIZATION_HEADER: &str = "x-organization-id";

/// Success envelope used by most endpoints.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// An error reported by the server.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{message} ({code}, HTTP {status})")]
    Server {
        status: StatusCode,
        code: String,
        message: String,
    },

    #[error("HTTP {status}: {body}")]
    Unstructured { status: StatusCode, body: String },

    #[error("server returned success without data")]
    MissingData,
}

/// Credentials and tenant selection for outgoing requests.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub token: Option<String>,
    pub organization: Option<String>,
}

/// HTTP client for the CallMonitor API.
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: Session,
}

impl ApiClient {
    pub fn new(base_url: &str, session: Session) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn organization(&self) -> Option<&str> {
        self.session.organization.as_deref()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.client.request(method, url);
        if let Some(ref token) = self.session.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref org) = self.session.organization {
            builder = builder.header(ORGANIZATION_HEADER, org);
        }
        builder
    }

    async fn send(&self, method: Method, path: &str, body: Option<&serde_json::Value>) -> Result<reqwest::Response> {
        let mut builder = self.request(method.clone(), path);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let resp = builder
            .send()
            .await
            .with_context(|| format!("{} {} failed", method, path))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        let err = match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => ApiError::Server {
                status,
                code: envelope.error.code,
                message: envelope.error.message,
            },
            Err(_) => ApiError::Unstructured { status, body },
        };
        Err(err.into())
    }

    /// Send a request and unwrap the `data` field of the response.
    pub async fn call<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let body = body.map(serde_json::to_value).transpose()?;
        let resp = self.send(method, path, body.as_ref()).await?;
        let api_resp: ApiResponse<T> = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", path))?;

        match api_resp.data {
            Some(data) if api_resp.success => Ok(data),
            _ => Err(ApiError::MissingData.into()),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.call::<(), T>(Method::GET, path, None).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.call(Method::POST, path, Some(body)).await
    }

    pub async fn patch<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.call(Method::PATCH, path, Some(body)).await
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.call(Method::PUT, path, Some(body)).await
    }

    /// Send a request whose success response has no body.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(Method::DELETE, path, None).await?;
        Ok(())
    }

    /// GET a plain-text body, such as the Prometheus exposition.
    pub async fn get_text(&self, path: &str) -> Result<String> {
        let resp = self.send(Method::GET, path, None).await?;
        resp.text()
            .await
            .with_context(|| format!("Failed to read response from {}", path))
    }

    /// GET a response that is not wrapped in `data`.
    pub async fn get_raw(&self, path: &str) -> Result<serde_json::Value> {
        let resp = self.send(Method::GET, path, None).await?;
        resp.json()
            .await
            .with_context(|| format!("Failed to parse response from {}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ApiClient::new("http://localhost:8080/", Session::default()).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_server_error_envelope_parses() {
        let body = r#"{"success":false,"error":{"id":"x","code":"FORBIDDEN","message":"Missing capability","severity":"MEDIUM"}}"#;
        let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.error.code, "FORBIDDEN");

        let err = ApiError::Server {
            status: StatusCode::FORBIDDEN,
            code: envelope.error.code,
            message: envelope.error.message,
        };
        assert_eq!(err.to_string(), "Missing capability (FORBIDDEN, HTTP 403 Forbidden)");
    }
}
