//! Trace-to-policy pipeline
//!
//! Feeds trace lines through matcher, classifier and merger into the Role
//! and ClusterRole of the current run.

use crate::classify::{classify, ApiCall};
use crate::rbac::{PolicyDocument, PolicyKind};
use crate::store::{Loaded, PolicyStore, StoreError};
use crate::trace::match_line;
use tracing::{debug, info, trace, warn};

/// Counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorStats {
    /// Lines seen
    pub lines: usize,
    /// Lines that were completed 2xx requests
    pub matched: usize,
    /// Matched requests that classified into an API call
    pub classified: usize,
}

/// Accumulates permissions from a trace stream
pub struct PermissionCollector {
    role: PolicyDocument,
    cluster_role: PolicyDocument,
    stats: CollectorStats,
    resumed: Vec<PolicyKind>,
}

impl PermissionCollector {
    pub fn new(role: PolicyDocument, cluster_role: PolicyDocument) -> Self {
        Self {
            role,
            cluster_role,
            stats: CollectorStats::default(),
            resumed: Vec::new(),
        }
    }

    /// Start from whatever the store kept from earlier runs
    pub fn from_store(store: &dyn PolicyStore) -> Self {
        let (role, role_resumed) = load_logged(store, PolicyKind::Role);
        let (cluster_role, cluster_resumed) = load_logged(store, PolicyKind::ClusterRole);

        let mut collector = Self::new(role, cluster_role);
        if role_resumed {
            collector.resumed.push(PolicyKind::Role);
        }
        if cluster_resumed {
            collector.resumed.push(PolicyKind::ClusterRole);
        }
        collector
    }

    /// Process one trace line. Returns the recorded call, if the line was one.
    pub fn observe_line(&mut self, line: &str) -> Option<ApiCall> {
        self.stats.lines += 1;

        let Some(request) = match_line(line) else {
            trace!(line, "not a completed request");
            return None;
        };
        self.stats.matched += 1;

        let Some(call) = classify(&request) else {
            debug!(verb = %request.verb, path = %request.path, "unrecognized request path");
            return None;
        };
        self.stats.classified += 1;

        self.record(&call);
        Some(call)
    }

    /// Merge a call into the document matching its scope
    pub fn record(&mut self, call: &ApiCall) {
        if !self.role.merge(call) {
            self.cluster_role.merge(call);
        }
    }

    pub fn stats(&self) -> CollectorStats {
        self.stats
    }

    /// Kinds whose previous document is being extended
    pub fn resumed(&self) -> &[PolicyKind] {
        &self.resumed
    }

    pub fn document(&self, kind: PolicyKind) -> &PolicyDocument {
        match kind {
            PolicyKind::Role => &self.role,
            PolicyKind::ClusterRole => &self.cluster_role,
        }
    }

    pub fn into_documents(self) -> (PolicyDocument, PolicyDocument) {
        (self.role, self.cluster_role)
    }

    /// Save both documents. Returns the kinds that were actually written.
    pub fn persist(&self, store: &dyn PolicyStore) -> Result<Vec<PolicyKind>, StoreError> {
        info!(
            lines = self.stats.lines,
            matched = self.stats.matched,
            classified = self.stats.classified,
            "trace processed"
        );

        let mut written = Vec::new();
        for kind in [PolicyKind::Role, PolicyKind::ClusterRole] {
            if store.save(self.document(kind))? {
                written.push(kind);
            }
        }
        Ok(written)
    }
}

/// Load one document. The flag is set when an earlier document carries over.
fn load_logged(store: &dyn PolicyStore, kind: PolicyKind) -> (PolicyDocument, bool) {
    match store.load(kind) {
        Loaded::Fresh(doc) => {
            debug!(%kind, "starting with an empty document");
            (doc, false)
        }
        Loaded::Existing(doc) => {
            info!(%kind, rules = doc.rules.len(), "adding permissions to existing document");
            (doc, true)
        }
        Loaded::Reset { document, reason } => {
            warn!(%kind, %reason, "starting with a fresh document");
            (document, false)
        }
    }
}
