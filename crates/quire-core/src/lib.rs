//! Quire Core - Operational Transform Engine and Document Binders
//!
//! This crate provides the core functionality for Quire:
//! - Operations over flat text and the transform/apply/compose rules
//! - Per-document binders that serialize edits and broadcast results
//! - The curator registry that shares and evicts binders by path
//! - Access control, audit and storage collaborator traits

pub mod acl;
pub mod audit;
pub mod binder;
pub mod curator;
pub mod document;
pub mod error;
pub mod operation;
pub mod replica;
pub mod session;
pub mod store;
pub mod transform;

pub use acl::{Access, Anarchy, Authorizer, Intent, PatternAcl};
pub use audit::{AuditRecord, Auditor, JsonAuditor, TracingAuditor};
pub use binder::{BinderConfig, BinderHandle, BinderSnapshot, BinderState};
pub use curator::{Curator, CuratorConfig, CuratorStats};
pub use document::{DocumentId, StoredDocument};
pub use error::{Error, Result};
pub use operation::{Action, Operation};
pub use replica::Replica;
pub use session::{Outbound, Session, SessionId};
pub use store::{Store, StoreError};
pub use transform::{apply, compose, transform, transform_pair};
