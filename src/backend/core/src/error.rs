//! Error handling for the CallMonitor access core.
//!
//! This module provides:
//! - A single error type carrying a stable, machine-readable code
//! - HTTP status mapping for API responses
//! - User-safe messages kept apart from internal detail (logged, never serialized)
//! - Severity-based logging with tracing
//! - Error counters via the metrics facade
//!
//! # Usage
//!
//! ```rust,ignore
//! use callmonitor_core::error::{CallMonitorError, Result};
//!
//! fn require_org(raw: Option<&str>) -> Result<&str> {
//!     raw.filter(|s| !s.trim().is_empty())
//!         .ok_or_else(CallMonitorError::org_required)
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for access-core operations.
pub type Result<T> = std::result::Result<T, CallMonitorError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes for API responses.
///
/// The serialized names are a stable contract with clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Access resolution (1000-1099)
    AuthRequired,
    OrgRequired,
    Unauthorized,
    RbacError,
    MembershipLookupFailed,
    Forbidden,
    InvalidToken,
    TokenExpired,

    // Tenancy (1100-1199)
    CrossTenantAccessDenied,
    ImmutableRecordViolation,

    // Database Errors (2000-2099)
    DatabaseError,
    DatabaseConnectionFailed,
    DatabaseQueryFailed,
    DatabaseTransactionFailed,
    RecordNotFound,
    DuplicateRecord,

    // Serialization Errors (2200-2299)
    SerializationError,
    DeserializationError,
    InvalidJson,

    // Validation Errors (4100-4199)
    ValidationError,
    InvalidInput,
    MissingRequiredField,

    // Configuration Errors (5000-5099)
    ConfigurationError,
    MissingConfiguration,
    InvalidConfiguration,

    // Internal Errors (9000-9099)
    InternalError,
    UnknownError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::AuthRequired => 1000,
            Self::OrgRequired => 1001,
            Self::Unauthorized => 1002,
            Self::RbacError => 1003,
            Self::MembershipLookupFailed => 1004,
            Self::Forbidden => 1005,
            Self::InvalidToken => 1006,
            Self::TokenExpired => 1007,

            Self::CrossTenantAccessDenied => 1100,
            Self::ImmutableRecordViolation => 1101,

            Self::DatabaseError => 2000,
            Self::DatabaseConnectionFailed => 2001,
            Self::DatabaseQueryFailed => 2002,
            Self::DatabaseTransactionFailed => 2003,
            Self::RecordNotFound => 2004,
            Self::DuplicateRecord => 2005,

            Self::SerializationError => 2200,
            Self::DeserializationError => 2201,
            Self::InvalidJson => 2202,

            Self::ValidationError => 4100,
            Self::InvalidInput => 4101,
            Self::MissingRequiredField => 4102,

            Self::ConfigurationError => 5000,
            Self::MissingConfiguration => 5001,
            Self::InvalidConfiguration => 5002,

            Self::InternalError => 9000,
            Self::UnknownError => 9099,
        }
    }

    /// Get the HTTP status code for this error.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::AuthRequired | Self::Unauthorized | Self::InvalidToken | Self::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }

            Self::OrgRequired => StatusCode::BAD_REQUEST,

            Self::Forbidden | Self::CrossTenantAccessDenied => StatusCode::FORBIDDEN,

            Self::RecordNotFound => StatusCode::NOT_FOUND,

            Self::ImmutableRecordViolation | Self::DuplicateRecord => StatusCode::CONFLICT,

            Self::ValidationError | Self::InvalidInput | Self::MissingRequiredField => {
                StatusCode::UNPROCESSABLE_ENTITY
            }

            Self::MembershipLookupFailed | Self::DatabaseConnectionFailed => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            Self::RbacError
            | Self::DatabaseError
            | Self::DatabaseQueryFailed
            | Self::DatabaseTransactionFailed
            | Self::SerializationError
            | Self::DeserializationError
            | Self::InvalidJson
            | Self::ConfigurationError
            | Self::MissingConfiguration
            | Self::InvalidConfiguration
            | Self::InternalError
            | Self::UnknownError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this error is retryable.
    ///
    /// Cross-tenant denials are security events and are never retryable.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::MembershipLookupFailed | Self::RbacError | Self::DatabaseConnectionFailed
        )
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "access",
            1100..=1199 => "tenancy",
            2000..=2099 => "database",
            2200..=2299 => "serialization",
            4100..=4199 => "validation",
            5000..=5099 => "configuration",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }

    /// The wire form of the code, e.g. `AUTH_REQUIRED`.
    pub fn as_wire(&self) -> String {
        serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "UNKNOWN_ERROR".to_string())
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging and alerting).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorSeverity {
    /// User errors (bad input, missing records)
    Low,
    /// Expected access denials
    Medium,
    /// Security events and system errors
    High,
    /// Errors requiring immediate attention
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::ValidationError
            | ErrorCode::InvalidInput
            | ErrorCode::MissingRequiredField
            | ErrorCode::RecordNotFound
            | ErrorCode::DuplicateRecord => Self::Low,

            ErrorCode::AuthRequired
            | ErrorCode::OrgRequired
            | ErrorCode::Unauthorized
            | ErrorCode::Forbidden
            | ErrorCode::InvalidToken
            | ErrorCode::TokenExpired => Self::Medium,

            ErrorCode::RbacError
            | ErrorCode::MembershipLookupFailed
            | ErrorCode::CrossTenantAccessDenied
            | ErrorCode::ImmutableRecordViolation
            | ErrorCode::DatabaseError
            | ErrorCode::DatabaseQueryFailed
            | ErrorCode::DatabaseTransactionFailed
            | ErrorCode::SerializationError
            | ErrorCode::DeserializationError
            | ErrorCode::InvalidJson
            | ErrorCode::ConfigurationError
            | ErrorCode::MissingConfiguration
            | ErrorCode::InvalidConfiguration => Self::High,

            ErrorCode::DatabaseConnectionFailed
            | ErrorCode::InternalError
            | ErrorCode::UnknownError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error. Logged, not serialized to clients.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Additional context key-value pairs
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Related entity ID (call, note, organization)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Related entity type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for the access core.
///
/// Carries a stable [`ErrorCode`], a message safe to show to clients, and an
/// optional internal message that only ever reaches the operational log.
#[derive(Error, Debug)]
pub struct CallMonitorError {
    /// Machine-readable error code
    code: ErrorCode,

    /// Correlation id, echoed to the client and written to the log
    id: String,

    /// User-friendly error message (safe to expose to clients)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// Additional structured details
    details: ErrorDetails,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for CallMonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl CallMonitorError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            id: format!("err_{}", Uuid::new_v4().simple()),
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error (500).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An internal error occurred", message)
    }

    /// Create a not found error.
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        let entity_type = entity_type.into();
        let entity_id = entity_id.into();
        Self::new(
            ErrorCode::RecordNotFound,
            format!("{} not found: {}", entity_type, entity_id),
        )
        .with_details(ErrorDetails::new().with_entity(&entity_type, &entity_id))
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message.into())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Access resolution
    // ─────────────────────────────────────────────────────────────────────────

    /// No authenticated identity was presented.
    pub fn auth_required() -> Self {
        Self::new(ErrorCode::AuthRequired, "Authentication required")
    }

    /// The request did not name a target organization.
    pub fn org_required() -> Self {
        Self::new(ErrorCode::OrgRequired, "Organization ID required")
    }

    /// The identity has no access to the requested organization.
    ///
    /// The message is identical whether or not the organization exists.
    pub fn unauthorized() -> Self {
        Self::new(ErrorCode::Unauthorized, "Not authorized for this organization")
    }

    /// Access could not be resolved because a dependency failed.
    pub fn rbac_error(internal: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::RbacError,
            "Unable to resolve access context",
            internal,
        )
    }

    /// A membership store lookup failed (distinct from "no membership").
    pub fn membership_lookup_failed(internal: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::MembershipLookupFailed,
            "Membership lookup failed",
            internal,
        )
    }

    /// The resolved context lacks a capability.
    pub fn forbidden(capability: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::Forbidden,
            format!("Missing required capability: {}", capability),
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tenancy
    // ─────────────────────────────────────────────────────────────────────────

    /// An operation tried to read or write another tenant's row.
    pub fn cross_tenant_access_denied(table: impl Into<String>) -> Self {
        let table = table.into();
        Self::with_internal(
            ErrorCode::CrossTenantAccessDenied,
            "Access to records outside the current organization is denied",
            format!("cross-tenant write rejected on {}", table),
        )
        .with_context("table", table)
    }

    /// An update or delete touched an append-only record.
    pub fn immutable_record_violation(table: impl Into<String>, detail: impl Into<String>) -> Self {
        let table = table.into();
        Self::with_internal(
            ErrorCode::ImmutableRecordViolation,
            format!("Records in {} are append-only; create a correction instead", table),
            detail,
        )
        .with_context("table", table)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add error details.
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    /// Add internal message.
    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        self.internal_message = Some(message.into());
        self
    }

    /// Add context to details.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();
        let status = self.http_status().as_u16();

        match self.severity() {
            ErrorSeverity::Critical => {
                error!(
                    error_id = %self.id,
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    details = ?self.details,
                    source = ?self.source,
                    "CRITICAL ERROR"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_id = %self.id,
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_id = %self.id,
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_id = %self.id,
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    "Low severity error"
                );
            }
        }
    }

    fn record_metrics(&self) {
        counter!(
            "callmonitor_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "severity" => format!("{:?}", self.severity()),
            "retryable" => self.is_retryable().to_string(),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

/// Error response for API clients: `{ success: false, error: {...} }`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always false for errors
    pub success: bool,

    /// Error information
    pub error: ErrorInfo,
}

/// Error information for API responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Correlation id
    pub id: String,

    /// Machine-readable error code
    pub code: ErrorCode,

    /// User-friendly error message
    pub message: String,

    /// Severity bucket
    pub severity: ErrorSeverity,
}

impl From<&CallMonitorError> for ErrorResponse {
    fn from(error: &CallMonitorError) -> Self {
        Self {
            success: false,
            error: ErrorInfo {
                id: error.id.clone(),
                code: error.code,
                message: error.user_message.to_string(),
                severity: error.severity(),
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Integration
// ═══════════════════════════════════════════════════════════════════════════════

impl IntoResponse for CallMonitorError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.http_status();
        let response = ErrorResponse::from(&self);

        (status, Json(response)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Context Extension Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Add context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with error code.
    fn with_error_code(self, code: ErrorCode) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| CallMonitorError::internal(message.into()).with_source(e))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.map_err(|e| CallMonitorError::new(code, e.to_string()).with_source(e))
    }
}

impl<T> ErrorContext<T> for Option<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| CallMonitorError::new(ErrorCode::RecordNotFound, message.into()))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.ok_or_else(|| CallMonitorError::new(code, "Resource not found"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

/// SQLSTATE raised when a row-level security `WITH CHECK` rejects a write.
pub(crate) const SQLSTATE_INSUFFICIENT_PRIVILEGE: &str = "42501";
/// SQLSTATE used by `RAISE EXCEPTION` in the append-only triggers.
pub(crate) const SQLSTATE_RAISE_EXCEPTION: &str = "P0001";
/// Message prefix the append-only triggers put on every rejection.
pub(crate) const IMMUTABLE_RECORD_PREFIX: &str = "IMMUTABLE_RECORD";

impl From<sqlx::Error> for CallMonitorError {
    fn from(error: sqlx::Error) -> Self {
        let (code, user_msg) = match &error {
            sqlx::Error::RowNotFound => (
                ErrorCode::RecordNotFound,
                "The requested record was not found",
            ),
            sqlx::Error::Database(db_err) => {
                let sqlstate = db_err.code().map(|c| c.into_owned()).unwrap_or_default();
                let message = db_err.message().to_string();

                if sqlstate == SQLSTATE_INSUFFICIENT_PRIVILEGE {
                    let table = db_err.table().unwrap_or("unknown").to_string();
                    return Self::cross_tenant_access_denied(table)
                        .with_internal_message(message)
                        .with_source(error);
                }
                if sqlstate == SQLSTATE_RAISE_EXCEPTION && message.starts_with(IMMUTABLE_RECORD_PREFIX) {
                    let table = db_err.table().unwrap_or("regulated table").to_string();
                    return Self::immutable_record_violation(table, message).with_source(error);
                }
                if db_err.is_unique_violation() {
                    return Self::with_internal(
                        ErrorCode::DuplicateRecord,
                        "A record with this identifier already exists",
                        format!("Constraint violation: {}", db_err.constraint().unwrap_or("unique")),
                    )
                    .with_source(error);
                }
                if db_err.is_foreign_key_violation() {
                    return Self::with_internal(
                        ErrorCode::RecordNotFound,
                        "A referenced record does not exist",
                        message,
                    )
                    .with_source(error);
                }
                (ErrorCode::DatabaseQueryFailed, "A database error occurred")
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => (
                ErrorCode::DatabaseConnectionFailed,
                "Unable to connect to the database",
            ),
            _ => (ErrorCode::DatabaseError, "A database error occurred"),
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<serde_json::Error> for CallMonitorError {
    fn from(error: serde_json::Error) -> Self {
        let code = if error.is_syntax() || error.is_data() {
            ErrorCode::DeserializationError
        } else if error.is_eof() {
            ErrorCode::InvalidJson
        } else {
            ErrorCode::SerializationError
        };

        Self::with_internal(code, "Failed to process JSON data", error.to_string()).with_source(error)
    }
}

impl From<jsonwebtoken::errors::Error> for CallMonitorError {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        let (code, user_msg) = match error.kind() {
            ErrorKind::ExpiredSignature => (ErrorCode::TokenExpired, "The authentication token has expired"),
            _ => (ErrorCode::InvalidToken, "The provided token is invalid"),
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<tokio::time::error::Elapsed> for CallMonitorError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        Self::rbac_error(format!("lookup deadline exceeded: {}", error))
    }
}

impl From<anyhow::Error> for CallMonitorError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<CallMonitorError>() {
            Ok(inner) => inner,
            Err(error) => Self::with_internal(
                ErrorCode::InternalError,
                "An internal error occurred",
                error.to_string(),
            ),
        }
    }
}

impl From<config::ConfigError> for CallMonitorError {
    fn from(error: config::ConfigError) -> Self {
        let (code, user_msg) = match &error {
            config::ConfigError::NotFound(_) => (
                ErrorCode::MissingConfiguration,
                "Required configuration not found",
            ),
            config::ConfigError::PathParse(_) | config::ConfigError::FileParse { .. } => (
                ErrorCode::InvalidConfiguration,
                "Configuration file is invalid",
            ),
            _ => (ErrorCode::ConfigurationError, "Configuration error occurred"),
        };

        Self::with_internal(code, user_msg, error.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
