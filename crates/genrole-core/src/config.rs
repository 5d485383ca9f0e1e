//! Run configuration
//!
//! Built once at startup from the command line and handed down by reference.

use crate::rbac::PolicyKind;
use std::path::PathBuf;

/// Default `-v` level passed to the wrapped client. Level 6 is the lowest
/// at which kubectl logs every request with its status.
pub const DEFAULT_TRACE_LEVEL: u8 = 6;

/// Where a document lives and what it is called
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentConfig {
    pub path: PathBuf,
    pub name: String,
    pub namespace: Option<String>,
}

impl DocumentConfig {
    /// Generated defaults, stored in the working directory
    pub fn for_kind(kind: PolicyKind) -> Self {
        Self {
            path: PathBuf::from(kind.default_file_name()),
            name: kind.default_name().to_string(),
            namespace: kind.default_namespace().map(str::to_string),
        }
    }
}

/// Configuration for one gen-role run
#[derive(Debug, Clone)]
pub struct GenRoleConfig {
    /// Wrapped client binary (name on PATH or a path)
    pub client: String,
    /// Arguments forwarded to the client as given
    pub client_args: Vec<String>,
    pub trace_level: u8,
    pub role: DocumentConfig,
    pub cluster_role: DocumentConfig,
    /// Echo matched requests and print the resulting documents
    pub show_matches: bool,
}

impl GenRoleConfig {
    pub fn new(client_args: Vec<String>) -> Self {
        Self {
            client: "kubectl".to_string(),
            client_args,
            trace_level: DEFAULT_TRACE_LEVEL,
            role: DocumentConfig::for_kind(PolicyKind::Role),
            cluster_role: DocumentConfig::for_kind(PolicyKind::ClusterRole),
            show_matches: true,
        }
    }

    pub fn document(&self, kind: PolicyKind) -> &DocumentConfig {
        match kind {
            PolicyKind::Role => &self.role,
            PolicyKind::ClusterRole => &self.cluster_role,
        }
    }

    /// Arguments for the client process: the forwarded arguments plus
    /// `-v<level>`, unless the caller already asked for at least that much.
    ///
    /// The flag goes before a `--` separator so it never reaches a command
    /// run through `kubectl exec`.
    pub fn client_invocation(&self) -> Vec<String> {
        let mut args = self.client_args.clone();
        let requested = requested_verbosity(&self.client_args);
        if requested.map(|level| level < self.trace_level).unwrap_or(true) {
            let at = args.iter().position(|a| a == "--").unwrap_or(args.len());
            args.insert(at, format!("-v{}", self.trace_level));
        }
        args
    }
}

/// Highest verbosity level already present in the forwarded arguments.
///
/// Understands `-v6`, `-v=6`, `--v=6`, `-v 6` and `--v 6`. Anything after
/// `--` belongs to the command the client runs and is not inspected.
fn requested_verbosity(args: &[String]) -> Option<u8> {
    let mut level: Option<u8> = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }
        let value = match arg.as_str() {
            "-v" | "--v" => iter.next().map(String::as_str),
            other => other
                .strip_prefix("--v=")
                .or_else(|| other.strip_prefix("-v="))
                .or_else(|| other.strip_prefix("-v")),
        };
        if let Some(parsed) = value.and_then(|v| v.parse::<u8>().ok()) {
            level = Some(level.map_or(parsed, |current| current.max(parsed)));
        }
    }
    level
}
