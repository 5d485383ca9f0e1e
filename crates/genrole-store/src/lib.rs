//! gen-role store - policy documents on disk
//!
//! Plain YAML manifests in the working directory, read at the start of a
//! run and rewritten at the end.

pub mod yaml;

pub use yaml::{to_yaml, YamlPolicyStore};
