//! HTTP middleware for the CallMonitor API.
pub mod auth;

pub use auth::{AuthLayer, AuthService, Claims, ClaimsBuilder, TokenVerifier};
