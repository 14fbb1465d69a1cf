//! Bearer-token authentication.
//!
//! The layer turns an `Authorization: Bearer <JWT>` header into an
//! [`Identity`] in request extensions. A request without credentials
//! continues as [`Identity::Anonymous`] so that the resolver can answer
//! with `AUTH_REQUIRED`; a request with a bad token is rejected here.
//!
//! Only `sub` is trusted. An organization claim in the token is ignored:
//! the target organization always comes from the request itself.
//!
//! # Example
//!
//! ```rust,ignore
//! use callmonitor_core::middleware::auth::{AuthLayer, TokenVerifier};
//!
//! let verifier = Arc::new(TokenVerifier::new(&config.auth)?);
//! let app = Router::new()
//!     .route("/api/v1/rbac/context", get(get_context))
//!     .layer(AuthLayer::new(verifier));
//! ```

use axum::{
    body::Body,
    extract::{FromRequestParts, Request},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::{
    convert::Infallible,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::debug;
use uuid::Uuid;

use crate::config::AuthSettings;
use crate::error::{CallMonitorError, Result};
use crate::rbac::models::{AuthenticatedUser, Identity};

// ═══════════════════════════════════════════════════════════════════════════════
// Claims
// ═══════════════════════════════════════════════════════════════════════════════

/// JWT token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,

    /// User email (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Organization hint from the issuer. Never used for access decisions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,

    /// Session identifier
    #[serde(default = "generate_jti")]
    pub jti: String,

    /// Issued at timestamp
    pub iat: i64,

    /// Expiration timestamp
    pub exp: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

fn generate_jti() -> String {
    Uuid::new_v4().to_string()
}

impl Claims {
    /// Create claims with builder pattern.
    pub fn builder(user_id: impl Into<String>) -> ClaimsBuilder {
        ClaimsBuilder::new(user_id)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// The identity these claims prove. A blank `sub` proves nothing.
    pub fn into_identity(self) -> Identity {
        let expires_at = self.expires_at();
        match AuthenticatedUser::new(self.sub) {
            Some(mut user) => {
                if let Some(email) = self.email {
                    user = user.with_email(email);
                }
                if let Some(expires_at) = expires_at {
                    user = user.with_expiry(expires_at);
                }
                Identity::Authenticated(user.with_session(self.jti))
            }
            None => Identity::Anonymous,
        }
    }
}

/// Builder for JWT claims.
pub struct ClaimsBuilder {
    claims: Claims,
}

impl ClaimsBuilder {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            claims: Claims {
                sub: user_id.into(),
                email: None,
                org_id: None,
                jti: generate_jti(),
                iat: now.timestamp(),
                exp: (now + Duration::hours(1)).timestamp(),
                iss: None,
                aud: None,
            },
        }
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.claims.email = Some(email.into());
        self
    }

    pub fn org_id(mut self, org_id: impl Into<String>) -> Self {
        self.claims.org_id = Some(org_id.into());
        self
    }

    pub fn expires_in(mut self, duration: Duration) -> Self {
        self.claims.exp = (Utc::now() + duration).timestamp();
        self
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.claims.iss = Some(issuer.into());
        self
    }

    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.claims.aud = Some(audience.into());
        self
    }

    pub fn build(self) -> Claims {
        self.claims
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Token verifier
// ═══════════════════════════════════════════════════════════════════════════════

/// HS256 token issue and verification.
pub struct TokenVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("algorithm", &Algorithm::HS256)
            .finish_non_exhaustive()
    }
}

impl TokenVerifier {
    pub fn new(settings: &AuthSettings) -> Result<Self> {
        if settings.jwt_secret.is_empty() {
            return Err(CallMonitorError::configuration("auth.jwt_secret is required"));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = settings.leeway_secs;
        if let Some(ref issuer) = settings.issuer {
            validation.set_issuer(&[issuer]);
        }
        match settings.audience {
            Some(ref audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(settings.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.jwt_secret.as_bytes()),
            validation,
        })
    }

    /// Validate a token and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            debug!("JWT validation failed: {}", e);
            CallMonitorError::from(e)
        })?;
        Ok(data.claims)
    }

    /// Sign claims. Used by tests and local tooling.
    pub fn issue(&self, claims: &Claims) -> Result<String> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)?)
    }

    /// Build the identity for a request.
    ///
    /// No `Authorization` header yields `Anonymous`; a header that is
    /// present but unusable is an error.
    pub fn identify(&self, headers: &HeaderMap) -> Result<Identity> {
        let Some(value) = headers.get(AUTHORIZATION) else {
            return Ok(Identity::Anonymous);
        };
        let token = value
            .to_str()
            .ok()
            .and_then(|s| s.strip_prefix("Bearer ").or_else(|| s.strip_prefix("bearer ")))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                CallMonitorError::new(
                    crate::error::ErrorCode::InvalidToken,
                    "Malformed Authorization header",
                )
            })?;

        let identity = self.verify(token)?.into_identity();
        counter!("callmonitor_auth_success_total", "method" => "jwt").increment(1);
        Ok(identity)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer and Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Authentication layer for Tower.
#[derive(Clone)]
pub struct AuthLayer {
    verifier: Arc<TokenVerifier>,
}

impl AuthLayer {
    pub fn new(verifier: Arc<TokenVerifier>) -> Self {
        Self { verifier }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            verifier: self.verifier.clone(),
        }
    }
}

/// Authentication service.
#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    verifier: Arc<TokenVerifier>,
}

impl<S> Service<Request<Body>> for AuthService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, std::result::Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let verifier = self.verifier.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match verifier.identify(request.headers()) {
                Ok(identity) => {
                    request.extensions_mut().insert(identity);
                    inner.call(request).await
                }
                Err(e) => {
                    counter!("callmonitor_auth_errors_total", "error_type" => e.code().as_wire())
                        .increment(1);
                    Ok(e.into_response())
                }
            }
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Extractor
// ═══════════════════════════════════════════════════════════════════════════════

/// Handlers see `Anonymous` when no auth layer ran.
#[axum::async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Identity>().cloned().unwrap_or_default())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
