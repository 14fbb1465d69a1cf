//! Axum integration: resolve the access context per request and enforce
//! capabilities on route groups.
//!
//! The target organization is read from the `X-Organization-Id` header,
//! falling back to the `orgId` query parameter.

use axum::{
    body::Body,
    extract::{FromRef, FromRequestParts, Query, Request},
    http::{request::Parts, HeaderMap, Uri},
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use serde::Deserialize;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use super::capability::Capability;
use super::context::RbacContext;
use super::models::Identity;
use super::resolver::RbacContextResolver;
use crate::error::CallMonitorError;

/// Header naming the organization a request acts in.
pub const ORGANIZATION_HEADER: &str = "x-organization-id";

#[derive(Debug, Deserialize)]
struct OrganizationQuery {
    #[serde(rename = "orgId")]
    org_id: Option<String>,
}

/// The organization id the caller asked for, untrimmed.
pub fn requested_organization(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    headers
        .get(ORGANIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
        .or_else(|| {
            Query::<OrganizationQuery>::try_from_uri(uri)
                .ok()
                .and_then(|Query(q)| q.org_id)
        })
}

// ═══════════════════════════════════════════════════════════════════════════════
// Extractor
// ═══════════════════════════════════════════════════════════════════════════════

/// Resolves the context for the request, reusing one already placed in
/// extensions by [`RequireCapabilityLayer`].
#[axum::async_trait]
impl<S> FromRequestParts<S> for RbacContext
where
    S: Send + Sync,
    Arc<RbacContextResolver>: FromRef<S>,
{
    type Rejection = CallMonitorError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ctx) = parts.extensions.get::<RbacContext>() {
            return Ok(ctx.clone());
        }
        let resolver = Arc::<RbacContextResolver>::from_ref(state);
        let identity = parts.extensions.get::<Identity>().cloned().unwrap_or_default();
        let org = requested_organization(&parts.headers, &parts.uri);
        let ctx = resolver.resolve(&identity, org.as_deref()).await?;
        parts.extensions.insert(ctx.clone());
        Ok(ctx)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer
// ═══════════════════════════════════════════════════════════════════════════════

/// Layer that resolves the context and rejects requests lacking a
/// capability before they reach the handler.
///
/// # Example
///
/// ```rust,ignore
/// let audit = Router::new()
///     .route("/api/v1/audit", get(list_audit))
///     .route_layer(RequireCapabilityLayer::new(resolver.clone(), Capability::ViewAudit));
/// ```
#[derive(Clone)]
pub struct RequireCapabilityLayer {
    resolver: Arc<RbacContextResolver>,
    capability: Capability,
}

impl RequireCapabilityLayer {
    pub fn new(resolver: Arc<RbacContextResolver>, capability: Capability) -> Self {
        Self {
            resolver,
            capability,
        }
    }
}

impl<S> Layer<S> for RequireCapabilityLayer {
    type Service = RequireCapabilityService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequireCapabilityService {
            inner,
            resolver: self.resolver.clone(),
            capability: self.capability,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Service that enforces a required capability per request.
#[derive(Clone)]
pub struct RequireCapabilityService<S> {
    inner: S,
    resolver: Arc<RbacContextResolver>,
    capability: Capability,
}

impl<S> Service<Request<Body>> for RequireCapabilityService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let resolver = self.resolver.clone();
        let capability = self.capability;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let identity = request
                .extensions()
                .get::<Identity>()
                .cloned()
                .unwrap_or_default();
            let org = requested_organization(request.headers(), request.uri());

            let ctx = match resolver.resolve(&identity, org.as_deref()).await {
                Ok(ctx) => ctx,
                Err(e) => return Ok(e.into_response()),
            };
            if let Err(e) = resolver.policy().enforce(&ctx, capability) {
                return Ok(e.into_response());
            }

            request.extensions_mut().insert(ctx);
            inner.call(request).await
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_header_wins_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert(ORGANIZATION_HEADER, HeaderValue::from_static("org-header"));
        let uri: Uri = "/api/v1/calls?orgId=org-query".parse().unwrap();
        assert_eq!(
            requested_organization(&headers, &uri).as_deref(),
            Some("org-header")
        );
    }

    #[test]
    fn test_query_fallback() {
        let uri: Uri = "/api/v1/calls?orgId=org-query&limit=5".parse().unwrap();
        assert_eq!(
            requested_organization(&HeaderMap::new(), &uri).as_deref(),
            Some("org-query")
        );
    }

    #[test]
    fn test_blank_header_falls_through() {
        let mut headers = HeaderMap::new();
        headers.insert(ORGANIZATION_HEADER, HeaderValue::from_static("  "));
        let uri: Uri = "/api/v1/calls".parse().unwrap();
        assert_eq!(requested_organization(&headers, &uri), None);
    }
}
