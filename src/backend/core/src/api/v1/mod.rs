//! V1 API module for CallMonitor.
//!
//! This module contains the V1 endpoints for:
//! - Access context resolution
//! - Call records, notes and corrections
//! - Audit trail
//! - Organization and membership administration

pub mod routes;

pub use routes::{v1_router, V1_PREFIX};
