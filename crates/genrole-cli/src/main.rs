//! gen-role - find out which RBAC permissions a kubectl command needs
//!
//! Usage:
//!   gen-role get pods -n openshift-console
//!   gen-role --client oc delete clusterrolebinding foo
//!
//! Every successful API request the client makes is recorded in
//! gen-role.yaml (namespaced) or gen-cluster-role.yaml (cluster-scoped).
//! Repeated runs add to the same files.

mod runner;

use anyhow::Context;
use clap::Parser;
use genrole_core::{GenRoleConfig, PermissionCollector};
use genrole_store::{to_yaml, YamlPolicyStore};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "gen-role")]
#[command(version)]
#[command(about = "Generate a least-privilege Role from what a kubectl command actually does", long_about = None)]
struct Cli {
    /// Client binary to wrap
    #[arg(long, env = "GEN_ROLE_CLIENT", default_value = "kubectl")]
    client: String,

    /// Verbosity passed to the client as -v<N>; 6 or more logs every request
    #[arg(long, default_value_t = genrole_core::config::DEFAULT_TRACE_LEVEL)]
    trace_level: u8,

    /// Where to keep the namespaced permissions
    #[arg(long, env = "GEN_ROLE_ROLE_FILE", default_value = "gen-role.yaml")]
    role_file: PathBuf,

    /// Where to keep the cluster-scoped permissions
    #[arg(long, env = "GEN_ROLE_CLUSTER_ROLE_FILE", default_value = "gen-cluster-role.yaml")]
    cluster_role_file: PathBuf,

    /// metadata.name of the generated Role
    #[arg(long)]
    role_name: Option<String>,

    /// metadata.namespace of the generated Role
    #[arg(long)]
    role_namespace: Option<String>,

    /// metadata.name of the generated ClusterRole
    #[arg(long)]
    cluster_role_name: Option<String>,

    /// Don't echo matched requests or print the generated documents
    #[arg(long)]
    quiet: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Arguments for the client, forwarded as given
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    client_args: Vec<String>,
}

impl Cli {
    fn into_config(self) -> GenRoleConfig {
        let mut config = GenRoleConfig::new(self.client_args);
        config.client = self.client;
        config.trace_level = self.trace_level;
        config.show_matches = !self.quiet;

        config.role.path = self.role_file;
        if let Some(name) = self.role_name {
            config.role.name = name;
        }
        if let Some(namespace) = self.role_namespace {
            config.role.namespace = Some(namespace);
        }

        config.cluster_role.path = self.cluster_role_file;
        if let Some(name) = self.cluster_role_name {
            config.cluster_role.name = name;
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = cli.into_config();
    let store = YamlPolicyStore::from_config(&config);
    let mut collector = PermissionCollector::from_store(&store);

    if config.show_matches {
        for kind in collector.resumed() {
            eprintln!(
                "Adding permissions to {} in {}",
                kind,
                store.path(*kind).display()
            );
        }
    }

    let outcome = runner::run_client(&config, &mut collector)
        .await
        .with_context(|| format!("Failed to run {}", config.client))?;

    if config.show_matches && !outcome.matched_lines.is_empty() {
        println!("Matched requests:");
        for line in &outcome.matched_lines {
            println!("{}", line);
        }
    }

    let written = collector
        .persist(&store)
        .context("Failed to save generated policies")?;

    if config.show_matches {
        for kind in &written {
            let yaml = to_yaml(collector.document(*kind))?;
            println!("{} ({}):", kind, store.path(*kind).display());
            println!("{}", yaml);
        }
    }

    Ok(ExitCode::from(exit_byte(outcome.exit_code())))
}

/// Map the client's exit code onto ours. Codes outside 0..=255 become 1.
fn exit_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}
