//! Request path classification
//!
//! Turns a traced request path into the API call it represents: which
//! group/version, which resource kind, and whether it was scoped to a
//! namespace.
//!
//! Recognized shapes:
//!
//! ```text
//! api/v1/namespaces/<ns>/<resource>[/<name>[/<subresource>]][?query]
//! apis/<group>/<version>/namespaces/<ns>/<resource>[/<name>[/<subresource>]][?query]
//! api/v1/<resource>[/<name>[/<subresource>]][?query]
//! apis/<group>/<version>/<resource>[/<name>[/<subresource>]][?query]
//! ```
//!
//! Discovery and other non-resource paths (`api`, `apis/apps/v1`,
//! `openapi/v2`, `version`) do not classify.

use crate::trace::{HttpVerb, TracedRequest};

/// One API call observed in the trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCall {
    /// RBAC verb (`get`, `list`, `watch`, `post`, ...)
    pub verb: String,
    /// `v1` for the core group, `<group>/<version>` otherwise
    pub api_group_version: String,
    /// Plural resource kind, e.g. `pods`
    pub resource: String,
    /// Set for namespaced requests only
    pub namespace: Option<String>,
}

impl ApiCall {
    pub fn is_namespaced(&self) -> bool {
        self.namespace.is_some()
    }

    /// The RBAC `apiGroups` entry for this call. The core `v1` API maps to `""`.
    pub fn api_group(&self) -> &str {
        if self.api_group_version == "v1" {
            ""
        } else {
            &self.api_group_version
        }
    }
}

/// Subresources of the `namespaces` kind itself. A path like
/// `api/v1/namespaces/foo/finalize` acts on the namespace object, not on a
/// resource inside it.
const NAMESPACE_SUBRESOURCES: &[&str] = &["status", "finalize"];

/// Classify a traced request. Returns `None` for paths that are not
/// resource requests.
pub fn classify(request: &TracedRequest) -> Option<ApiCall> {
    let (path, query) = match request.path.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (request.path.as_str(), None),
    };

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let (api_group_version, rest) = match segments.as_slice() {
        ["api", version, rest @ ..] => (version.to_string(), rest),
        ["apis", group, version, rest @ ..] => (format!("{}/{}", group, version), rest),
        _ => return None,
    };

    let (namespace, rest) = match rest {
        ["namespaces", _, sub] if NAMESPACE_SUBRESOURCES.contains(sub) => (None, rest),
        ["namespaces", ns, rest @ ..] if !rest.is_empty() => (Some(ns.to_string()), rest),
        _ => (None, rest),
    };

    let (resource, has_name) = match rest {
        [resource] => (resource.to_string(), false),
        [resource, _name, ..] => (resource.to_string(), true),
        _ => return None,
    };

    let verb = resolve_verb(request.verb, has_name, query);

    Some(ApiCall {
        verb,
        api_group_version,
        resource,
        namespace,
    })
}

/// Map the HTTP method onto an RBAC verb.
///
/// A GET on a collection is `list`, a GET with `watch=true` is `watch`.
/// Everything else keeps its lower-cased method name.
fn resolve_verb(verb: HttpVerb, has_name: bool, query: Option<&str>) -> String {
    if verb != HttpVerb::Get {
        return verb.as_str().to_string();
    }
    if query.map(is_watch_query).unwrap_or(false) {
        "watch".to_string()
    } else if has_name {
        "get".to_string()
    } else {
        "list".to_string()
    }
}

fn is_watch_query(query: &str) -> bool {
    query
        .split('&')
        .any(|param| param == "watch=true" || param == "watch=1")
}
