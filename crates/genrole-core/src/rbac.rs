//! RBAC policy documents and the permission merger

use crate::classify::ApiCall;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

pub const RBAC_API_VERSION: &str = "rbac.authorization.k8s.io/v1";

/// Which of the two generated documents a policy is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyKind {
    /// Namespace-scoped permissions
    Role,
    /// Cluster-scoped permissions
    ClusterRole,
}

impl PolicyKind {
    pub fn default_name(&self) -> &'static str {
        match self {
            Self::Role => "gen-role-generated-role",
            Self::ClusterRole => "gen-role-generated-clusterrole",
        }
    }

    /// ClusterRoles are cluster-scoped objects and carry no namespace
    pub fn default_namespace(&self) -> Option<&'static str> {
        match self {
            Self::Role => Some("gen-role-generated-role"),
            Self::ClusterRole => None,
        }
    }

    pub fn default_file_name(&self) -> &'static str {
        match self {
            Self::Role => "gen-role.yaml",
            Self::ClusterRole => "gen-cluster-role.yaml",
        }
    }

    /// Roles collect namespaced calls, ClusterRoles everything else
    pub fn accepts(&self, call: &ApiCall) -> bool {
        match self {
            Self::Role => call.is_namespaced(),
            Self::ClusterRole => !call.is_namespaced(),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Role => f.write_str("Role"),
            Self::ClusterRole => f.write_str("ClusterRole"),
        }
    }
}

/// A single grant of verbs over resource kinds within an API group.
///
/// The vectors are ordered sets: no duplicates, first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    #[serde(default)]
    pub api_groups: Vec<String>,
    /// Resource kinds. Older gen-role output stored these under
    /// `resourceNames`, which is still accepted on load.
    #[serde(default, alias = "resourceNames")]
    pub resources: Vec<String>,
    #[serde(default)]
    pub verbs: Vec<String>,
}

impl PolicyRule {
    pub fn new(api_group: &str, resource: &str, verb: &str) -> Self {
        Self {
            api_groups: vec![api_group.to_string()],
            resources: vec![resource.to_string()],
            verbs: vec![verb.to_string()],
        }
    }

    pub fn covers(&self, api_group: &str, resource: &str) -> bool {
        self.api_groups.iter().any(|g| g == api_group) && self.resources.iter().any(|r| r == resource)
    }

    /// Add a verb unless already present. Returns true if it was added.
    pub fn grant(&mut self, verb: &str) -> bool {
        if self.verbs.iter().any(|v| v == verb) {
            return false;
        }
        self.verbs.push(verb.to_string());
        true
    }
}

/// Identity fields of a policy document
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// A Role or ClusterRole manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDocument {
    pub api_version: String,
    pub kind: PolicyKind,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

impl PolicyDocument {
    /// An empty document with the given identity
    pub fn new(kind: PolicyKind, name: impl Into<String>, namespace: Option<String>) -> Self {
        Self {
            api_version: RBAC_API_VERSION.to_string(),
            kind,
            metadata: ObjectMeta {
                name: name.into(),
                namespace,
            },
            rules: Vec::new(),
        }
    }

    /// An empty document with the generated default identity
    pub fn empty(kind: PolicyKind) -> Self {
        Self::new(
            kind,
            kind.default_name(),
            kind.default_namespace().map(str::to_string),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Fold a call into this document if its scope fits.
    ///
    /// Returns false when the call belongs to the other document kind.
    pub fn merge(&mut self, call: &ApiCall) -> bool {
        if !self.kind.accepts(call) {
            return false;
        }
        merge_call(&mut self.rules, call);
        true
    }

    /// Verbs granted for `resource` in `api_group`, if any rule covers it
    pub fn verbs_for(&self, api_group: &str, resource: &str) -> Option<&[String]> {
        self.rules
            .iter()
            .find(|rule| rule.covers(api_group, resource))
            .map(|rule| rule.verbs.as_slice())
    }
}

/// Merge one call into an ordered rule set.
///
/// The first rule covering the call's (group, resource) gets the verb added.
/// Without one, a new rule is appended, so rule order is first-seen order.
pub fn merge_call(rules: &mut Vec<PolicyRule>, call: &ApiCall) {
    let group = call.api_group();

    if let Some(rule) = rules.iter_mut().find(|rule| rule.covers(group, &call.resource)) {
        if rule.grant(&call.verb) {
            debug!(group, resource = %call.resource, verb = %call.verb, "added verb to rule");
        }
        return;
    }

    debug!(group, resource = %call.resource, verb = %call.verb, "new rule");
    rules.push(PolicyRule::new(group, &call.resource, &call.verb));
}
