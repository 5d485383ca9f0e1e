//! gen-role core - request trace to RBAC permission inference
//!
//! This crate holds everything between "a line of kubectl output" and
//! "a Role that allows exactly that call". It does no I/O of its own;
//! storage backends implement [`PolicyStore`] and the CLI feeds lines in.

pub mod classify;
pub mod config;
pub mod infer;
pub mod rbac;
pub mod store;
pub mod trace;

pub use classify::{classify, ApiCall};
pub use config::{DocumentConfig, GenRoleConfig};
pub use infer::{CollectorStats, PermissionCollector};
pub use rbac::{merge_call, PolicyDocument, PolicyKind, PolicyRule};
pub use store::{Loaded, PolicyStore, StoreError};
pub use trace::{match_line, HttpVerb, TracedRequest};
