//! Wrapped client execution
//!
//! Runs kubectl (or oc) with the forwarded arguments at trace verbosity.
//! stdout passes straight through; stderr is echoed to the terminal and
//! fed to the permission collector line by line.

use genrole_core::{GenRoleConfig, PermissionCollector};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::debug;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Client '{client}' not found: {source}")]
    NotFound {
        client: String,
        #[source]
        source: which::Error,
    },
    #[error("Failed to start {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What came out of one client run
#[derive(Debug)]
pub struct RunOutcome {
    pub status: ExitStatus,
    /// Trace lines that produced a permission, in order
    pub matched_lines: Vec<String>,
}

impl RunOutcome {
    /// Exit code to hand back to our caller. Signals count as failure.
    pub fn exit_code(&self) -> i32 {
        self.status.code().unwrap_or(1)
    }
}

/// Run the client to completion, collecting permissions from its trace.
///
/// A client that exits non-zero is not an error here: whatever it traced
/// before failing still counts.
pub async fn run_client(
    config: &GenRoleConfig,
    collector: &mut PermissionCollector,
) -> Result<RunOutcome, RunError> {
    let path = which::which(&config.client).map_err(|source| RunError::NotFound {
        client: config.client.clone(),
        source,
    })?;
    let args = config.client_invocation();

    if config.show_matches {
        eprintln!("Running {} \"{}\"", path.display(), args.join("\" \""));
    }

    let mut child = Command::new(&path)
        .args(&args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| RunError::Spawn {
            path: path.clone(),
            source,
        })?;

    let mut matched_lines = Vec::new();
    if let Some(stderr) = child.stderr.take() {
        let mut reader = BufReader::new(stderr);
        let mut terminal = tokio::io::stderr();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            terminal.write_all(&buf).await?;

            // kubectl output is UTF-8, but a stray byte should not end the run
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\n', '\r']);
            if collector.observe_line(line).is_some() {
                matched_lines.push(line.to_string());
            }
        }
        terminal.flush().await?;
    }

    let status = child.wait().await?;
    debug!(%status, matched = matched_lines.len(), "client exited");

    Ok(RunOutcome {
        status,
        matched_lines,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use genrole_core::{PolicyDocument, PolicyKind};

    fn collector() -> PermissionCollector {
        PermissionCollector::new(
            PolicyDocument::empty(PolicyKind::Role),
            PolicyDocument::empty(PolicyKind::ClusterRole),
        )
    }

    /// `sh -c <script>` stands in for kubectl. The appended `-v6` lands in `$0`.
    fn sh_config(script: &str) -> GenRoleConfig {
        let mut config = GenRoleConfig::new(vec!["-c".to_string(), script.to_string()]);
        config.client = "sh".to_string();
        config.show_matches = false;
        config
    }

    #[tokio::test]
    async fn test_collects_from_stderr() {
        let config = sh_config(
            "echo 'I1016 round_trippers.go:553] GET https://h:6443/api/v1/namespaces/default/pods?limit=500 200 OK in 3 milliseconds' >&2; \
             echo 'GET https://h:6443/api/v1/namespaces/default/secrets 403 Forbidden' >&2; \
             echo 'NAME READY STATUS'; \
             echo 'DELETE https://h:6443/api/v1/nodes/worker-1 200 OK' >&2",
        );
        let mut collector = collector();

        let outcome = run_client(&config, &mut collector).await.unwrap();
        assert!(outcome.status.success());
        assert_eq!(outcome.matched_lines.len(), 2);
        assert!(outcome.matched_lines[0].contains("pods?limit=500"));

        let (role, cluster) = collector.into_documents();
        assert_eq!(role.verbs_for("", "pods"), Some(&["list".to_string()][..]));
        assert_eq!(cluster.verbs_for("", "nodes"), Some(&["delete".to_string()][..]));
    }

    #[tokio::test]
    async fn test_exit_code_and_partial_trace() {
        let config = sh_config("echo 'GET https://h:6443/api/v1/namespaces/x/configmaps/y 200 OK' >&2; exit 3");
        let mut collector = collector();

        let outcome = run_client(&config, &mut collector).await.unwrap();
        assert_eq!(outcome.exit_code(), 3);
        assert_eq!(collector.stats().classified, 1);
    }

    #[tokio::test]
    async fn test_missing_client() {
        let mut config = sh_config("true");
        config.client = "gen-role-test-no-such-client".to_string();

        let err = run_client(&config, &mut collector()).await.unwrap_err();
        assert!(matches!(err, RunError::NotFound { .. }));
    }
}
