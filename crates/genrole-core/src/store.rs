//! Policy persistence seam
//!
//! The core only needs "give me the document from last time" and "keep this
//! document for next time". Backends live in their own crates.

use crate::rbac::{PolicyDocument, PolicyKind};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to serialize {kind}: {message}")]
    Serialize { kind: PolicyKind, message: String },
    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of loading a persisted document.
///
/// Loading never fails: a missing or unusable document still yields an
/// empty one to build on.
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded {
    /// Nothing was persisted yet
    Fresh(PolicyDocument),
    /// A previous document was found and parsed
    Existing(PolicyDocument),
    /// A previous document was found but could not be used
    Reset {
        document: PolicyDocument,
        reason: String,
    },
}

impl Loaded {
    pub fn document(&self) -> &PolicyDocument {
        match self {
            Self::Fresh(doc) | Self::Existing(doc) => doc,
            Self::Reset { document, .. } => document,
        }
    }

    pub fn into_document(self) -> PolicyDocument {
        match self {
            Self::Fresh(doc) | Self::Existing(doc) => doc,
            Self::Reset { document, .. } => document,
        }
    }
}

/// Storage backend for generated policies
pub trait PolicyStore {
    /// Load the document of the given kind, or an empty one
    fn load(&self, kind: PolicyKind) -> Loaded;

    /// Persist a document. Empty documents are not written; returns whether
    /// anything was saved.
    fn save(&self, document: &PolicyDocument) -> Result<bool, StoreError>;
}
