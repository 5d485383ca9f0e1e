//! File-backed policy store
//!
//! Each document is a plain Kubernetes manifest on disk, so the result can
//! be handed straight to `kubectl apply -f`. Documents written by older
//! gen-role versions (no `apiVersion`/`kind`, kinds under `resourceNames`)
//! still load.

use genrole_core::config::{DocumentConfig, GenRoleConfig};
use genrole_core::rbac::{PolicyDocument, PolicyKind, PolicyRule};
use genrole_core::store::{Loaded, PolicyStore, StoreError};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// On-disk shape, lenient about what older files may lack
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredDocument {
    #[serde(default)]
    kind: Option<PolicyKind>,
    #[serde(default)]
    rules: Option<Vec<PolicyRule>>,
}

/// YAML files at fixed paths, one per document kind
pub struct YamlPolicyStore {
    role: DocumentConfig,
    cluster_role: DocumentConfig,
}

impl YamlPolicyStore {
    pub fn new(role: DocumentConfig, cluster_role: DocumentConfig) -> Self {
        Self { role, cluster_role }
    }

    pub fn from_config(config: &GenRoleConfig) -> Self {
        Self::new(
            config.document(PolicyKind::Role).clone(),
            config.document(PolicyKind::ClusterRole).clone(),
        )
    }

    /// Default file names and identities inside `dir`
    pub fn in_dir(dir: &Path) -> Self {
        let mut role = DocumentConfig::for_kind(PolicyKind::Role);
        role.path = dir.join(&role.path);
        let mut cluster_role = DocumentConfig::for_kind(PolicyKind::ClusterRole);
        cluster_role.path = dir.join(&cluster_role.path);
        Self::new(role, cluster_role)
    }

    pub fn path(&self, kind: PolicyKind) -> &Path {
        &self.document_config(kind).path
    }

    fn document_config(&self, kind: PolicyKind) -> &DocumentConfig {
        match kind {
            PolicyKind::Role => &self.role,
            PolicyKind::ClusterRole => &self.cluster_role,
        }
    }

    /// Empty document carrying the configured identity
    fn fresh(&self, kind: PolicyKind) -> PolicyDocument {
        let config = self.document_config(kind);
        PolicyDocument::new(kind, config.name.clone(), config.namespace.clone())
    }

    fn parse(&self, kind: PolicyKind, content: &str) -> Result<PolicyDocument, String> {
        let stored: StoredDocument = serde_yaml::from_str(content).map_err(|e| e.to_string())?;

        if let Some(found) = stored.kind {
            if found != kind {
                return Err(format!("expected a {} but found a {}", kind, found));
            }
        }

        // identity always comes from configuration, only the rules carry over
        let mut document = self.fresh(kind);
        document.rules = stored.rules.unwrap_or_default();
        Ok(document)
    }
}

impl PolicyStore for YamlPolicyStore {
    fn load(&self, kind: PolicyKind) -> Loaded {
        let path = self.path(kind);

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no previous document");
                return Loaded::Fresh(self.fresh(kind));
            }
            Err(e) => {
                return Loaded::Reset {
                    document: self.fresh(kind),
                    reason: format!("can't read {}: {}", path.display(), e),
                };
            }
        };

        match self.parse(kind, &content) {
            Ok(document) => {
                debug!(path = %path.display(), rules = document.rules.len(), "loaded document");
                Loaded::Existing(document)
            }
            Err(e) => Loaded::Reset {
                document: self.fresh(kind),
                reason: format!("can't parse {}: {}", path.display(), e),
            },
        }
    }

    fn save(&self, document: &PolicyDocument) -> Result<bool, StoreError> {
        if document.is_empty() {
            debug!(kind = %document.kind, "no rules, nothing to write");
            return Ok(false);
        }

        let path = self.path(document.kind);
        let yaml = to_yaml(document)?;
        write_replace(path, yaml.as_bytes()).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        debug!(path = %path.display(), rules = document.rules.len(), "saved document");
        Ok(true)
    }
}

/// Render a document the way it is written to disk
pub fn to_yaml(document: &PolicyDocument) -> Result<String, StoreError> {
    serde_yaml::to_string(document).map_err(|e| StoreError::Serialize {
        kind: document.kind,
        message: e.to_string(),
    })
}

/// Write through a sibling temp file and rename it over the target, so an
/// interrupted write leaves the previous document intact.
fn write_replace(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = temp_path(path);
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        e
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use genrole_core::classify::ApiCall;
    use tempfile::TempDir;

    fn call(verb: &str, api: &str, resource: &str, namespace: Option<&str>) -> ApiCall {
        ApiCall {
            verb: verb.to_string(),
            api_group_version: api.to_string(),
            resource: resource.to_string(),
            namespace: namespace.map(str::to_string),
        }
    }

    #[test]
    fn test_missing_file_is_fresh() {
        let dir = TempDir::new().unwrap();
        let store = YamlPolicyStore::in_dir(dir.path());

        let loaded = store.load(PolicyKind::Role);
        assert!(matches!(loaded, Loaded::Fresh(_)));
        assert_eq!(loaded.document(), &PolicyDocument::empty(PolicyKind::Role));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = YamlPolicyStore::in_dir(dir.path());

        let mut role = PolicyDocument::empty(PolicyKind::Role);
        role.merge(&call("list", "v1", "pods", Some("default")));
        role.merge(&call("get", "v1", "pods", Some("default")));
        role.merge(&call("patch", "apps/v1", "deployments", Some("default")));

        assert!(store.save(&role).unwrap());
        assert!(dir.path().join("gen-role.yaml").exists());
        assert!(!dir.path().join("gen-role.yaml.tmp").exists());

        let loaded = store.load(PolicyKind::Role);
        assert!(matches!(loaded, Loaded::Existing(_)));
        let loaded = loaded.into_document();
        assert_eq!(loaded.verbs_for("", "pods"), role.verbs_for("", "pods"));
        assert_eq!(
            loaded.verbs_for("apps/v1", "deployments"),
            role.verbs_for("apps/v1", "deployments")
        );
        assert_eq!(loaded, role);
    }

    #[test]
    fn test_empty_document_not_written() {
        let dir = TempDir::new().unwrap();
        let store = YamlPolicyStore::in_dir(dir.path());

        assert!(!store.save(&PolicyDocument::empty(PolicyKind::ClusterRole)).unwrap());
        assert!(!dir.path().join("gen-cluster-role.yaml").exists());
    }

    #[test]
    fn test_corrupt_file_resets() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("gen-role.yaml"), "rules: [this is: {not valid").unwrap();
        let store = YamlPolicyStore::in_dir(dir.path());

        let loaded = store.load(PolicyKind::Role);
        assert!(matches!(loaded, Loaded::Reset { .. }));
        assert!(loaded.document().is_empty());
        assert_eq!(loaded.document().metadata.name, "gen-role-generated-role");
    }

    #[test]
    fn test_wrong_kind_resets() {
        let dir = TempDir::new().unwrap();
        let store = YamlPolicyStore::in_dir(dir.path());

        let mut cluster = PolicyDocument::empty(PolicyKind::ClusterRole);
        cluster.merge(&call("list", "v1", "nodes", None));
        fs::write(store.path(PolicyKind::Role), to_yaml(&cluster).unwrap()).unwrap();

        let loaded = store.load(PolicyKind::Role);
        match loaded {
            Loaded::Reset { document, reason } => {
                assert!(document.is_empty());
                assert!(reason.contains("ClusterRole"));
            }
            other => panic!("expected reset, got {:?}", other),
        }
    }

    #[test]
    fn test_loads_legacy_document() {
        let dir = TempDir::new().unwrap();
        let legacy = "\
metadata:
  creationTimestamp: null
  name: gen-role-generated-role
  namespace: gen-role-generated-role
rules:
- apiGroups:
  - \"\"
  resourceNames:
  - pods
  verbs:
  - list
  - get
";
        fs::write(dir.path().join("gen-role.yaml"), legacy).unwrap();
        let store = YamlPolicyStore::in_dir(dir.path());

        let doc = store.load(PolicyKind::Role).into_document();
        assert_eq!(doc.kind, PolicyKind::Role);
        assert_eq!(
            doc.verbs_for("", "pods"),
            Some(&["list".to_string(), "get".to_string()][..])
        );

        // rewritten in the current shape
        store.save(&doc).unwrap();
        let rewritten = fs::read_to_string(dir.path().join("gen-role.yaml")).unwrap();
        assert!(rewritten.contains("kind: Role"));
        assert!(rewritten.contains("resources:"));
        assert!(!rewritten.contains("resourceNames"));
    }

    #[test]
    fn test_identity_comes_from_config() {
        let dir = TempDir::new().unwrap();
        let role_config = DocumentConfig {
            path: dir.path().join("team").join("role.yaml"),
            name: "ci-deployer".to_string(),
            namespace: Some("ci".to_string()),
        };
        let store = YamlPolicyStore::new(
            role_config,
            DocumentConfig::for_kind(PolicyKind::ClusterRole),
        );

        // a document saved under another name keeps its rules but not its name
        let mut other = PolicyDocument::new(PolicyKind::Role, "old-name", Some("old".to_string()));
        other.merge(&call("get", "v1", "secrets", Some("ci")));
        assert!(store.save(&other).unwrap());

        let loaded = store.load(PolicyKind::Role).into_document();
        assert_eq!(loaded.metadata.name, "ci-deployer");
        assert_eq!(loaded.metadata.namespace.as_deref(), Some("ci"));
        assert_eq!(loaded.rules, other.rules);
    }

    #[test]
    fn test_incremental_runs_accumulate() {
        let dir = TempDir::new().unwrap();
        let store = YamlPolicyStore::in_dir(dir.path());

        let mut first = store.load(PolicyKind::ClusterRole).into_document();
        first.merge(&call("list", "apps/v1", "deployments", None));
        store.save(&first).unwrap();

        let mut second = store.load(PolicyKind::ClusterRole).into_document();
        second.merge(&call("delete", "rbac.authorization.k8s.io/v1", "clusterrolebindings", None));
        second.merge(&call("list", "apps/v1", "deployments", None));
        store.save(&second).unwrap();

        let last = store.load(PolicyKind::ClusterRole).into_document();
        assert_eq!(last.rules.len(), 2);
        assert_eq!(last.rules[0].resources, vec!["deployments"]);
        assert_eq!(last.rules[0].verbs, vec!["list"]);
        assert_eq!(last.rules[1].resources, vec!["clusterrolebindings"]);
    }
}
