//! Tenant isolation for regulated call data.
//!
//! - **Records**: calls, notes and their write models
//! - **Scope**: scope tokens and the record-store contract
//! - **Guard**: `with_tenant_scope` / `with_system_scope` and the sessions they hand out
//! - **Memory**: in-process record store for tests and local runs

pub mod guard;
pub mod memory;
pub mod records;
pub mod scope;

pub use guard::{SystemSession, TenantGuard, TenantSession, MAX_AUDIT_PAGE};
pub use memory::InMemoryRecordStore;
pub use records::{CallNote, CallPatch, CallRecord, CallStatus, NewCall};
pub use scope::{RecordStore, Scope, ScopeToken, ScopedTx};
