//! Cluster store adapter
//!
//! Reads and replaces the cluster configuration document through the cluster
//! resource manager's own administration tool (`cibadmin`), which provides
//! the commit-or-reject semantics and the version check this operator relies
//! on. Every invocation is bounded by a timeout; a hung cluster store turns
//! into a read or write error instead of a stuck operation.

use crate::cluster::config::parse_version;
use crate::domain::ports::{CibDocument, CibVersion, ClusterStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Exit status of `cibadmin` when the submitted document's version lags the
/// live configuration (pcmk_err_old_data)
const CIBADMIN_OLD_DATA: i32 = 205;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the cibadmin adapter
#[derive(Debug, Clone)]
pub struct CibAdminConfig {
    /// Command to invoke; found via PATH unless absolute
    pub command: String,
    /// Upper bound for one invocation
    pub timeout: Duration,
}

impl Default for CibAdminConfig {
    fn default() -> Self {
        Self {
            command: "cibadmin".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// Adapter
// =============================================================================

/// `ClusterStore` implementation shelling out to cibadmin.
pub struct CibAdminStore {
    config: CibAdminConfig,
}

impl CibAdminStore {
    pub fn new(config: CibAdminConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ClusterStore for CibAdminStore {
    async fn fetch(&self) -> Result<CibDocument> {
        debug!("Fetching cluster configuration via {} --query", self.config.command);

        let output = timeout(
            self.config.timeout,
            Command::new(&self.config.command).arg("--query").output(),
        )
        .await
        .map_err(|_| {
            Error::CibRead(format!(
                "{} --query timed out after {:?}",
                self.config.command, self.config.timeout
            ))
        })?
        .map_err(|e| Error::CibRead(format!("failed to run {}: {}", self.config.command, e)))?;

        if !output.status.success() {
            return Err(Error::CibRead(format!(
                "{} --query failed: {}",
                self.config.command,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let xml = String::from_utf8(output.stdout)
            .map_err(|e| Error::CibRead(format!("configuration is not valid UTF-8: {}", e)))?;
        let version = parse_version(&xml)?;

        debug!("Fetched cluster configuration at version {}", version);
        Ok(CibDocument { xml, version })
    }

    async fn replace(&self, xml: &str, expected: CibVersion) -> Result<()> {
        // The submitted document must carry the version it was derived from;
        // the store compares it against the live document.
        let carried = parse_version(xml)?;
        if carried != expected {
            return Err(Error::CibWrite(format!(
                "document carries version {} but was derived from {}",
                carried, expected
            )));
        }

        debug!(
            "Replacing cluster configuration, expected version {}",
            expected
        );

        let mut child = Command::new(&self.config.command)
            .args(["--replace", "--xml-pipe"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::CibWrite(format!("failed to run {}: {}", self.config.command, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Internal("child process has no stdin handle".into()))?;
        stdin
            .write_all(xml.as_bytes())
            .await
            .map_err(|e| Error::CibWrite(format!("failed to submit document: {}", e)))?;
        drop(stdin);

        let output = timeout(self.config.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::CibWrite(format!(
                    "{} --replace timed out after {:?}",
                    self.config.command, self.config.timeout
                ))
            })?
            .map_err(|e| Error::CibWrite(format!("failed to run {}: {}", self.config.command, e)))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        map_replace_status(output.status.code(), stderr.trim(), expected)
    }
}

/// Map the exit status of a replace invocation to the error taxonomy. The
/// version-mismatch rejection is singled out so callers can re-read and
/// retry; everything else is a write failure.
fn map_replace_status(code: Option<i32>, stderr: &str, expected: CibVersion) -> Result<()> {
    match code {
        Some(0) => Ok(()),
        Some(CIBADMIN_OLD_DATA) => Err(Error::CibConflict {
            expected: expected.to_string(),
            reason: if stderr.is_empty() {
                "update was older than existing configuration".to_string()
            } else {
                stderr.to_string()
            },
        }),
        Some(code) => Err(Error::CibWrite(format!(
            "replace rejected with status {}: {}",
            code, stderr
        ))),
        None => Err(Error::CibWrite(format!(
            "replace terminated by signal: {}",
            stderr
        ))),
    }
}
