//! Host-key reconciliation helper

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

use df_core::HostId;

/// How long the purge helper may run
const PURGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Removes a host's cached fingerprint from the local known-hosts store
#[async_trait]
pub trait KeyPurger: Send + Sync {
    async fn purge(&self, host: &HostId) -> Result<()>;
}

/// Runs `ssh-keygen -R <host>`
pub struct SshKeygenPurger {
    program: String,
    known_hosts: Option<PathBuf>,
}

impl SshKeygenPurger {
    pub fn new(program: impl Into<String>, known_hosts: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            known_hosts,
        }
    }

    fn args(&self, host: &HostId) -> Vec<String> {
        let mut args = vec!["-R".to_string(), host.to_string()];
        if let Some(path) = &self.known_hosts {
            args.push("-f".to_string());
            args.push(path.display().to_string());
        }
        args
    }
}

#[async_trait]
impl KeyPurger for SshKeygenPurger {
    async fn purge(&self, host: &HostId) -> Result<()> {
        let output = tokio::time::timeout(
            PURGE_TIMEOUT,
            Command::new(&self.program)
                .args(self.args(host))
                .kill_on_drop(true)
                .output(),
        )
        .await
        .context("Key purge timed out")?
        .with_context(|| format!("Failed to run {}", self.program))?;

        if !output.status.success() {
            bail!(
                "{} -R {} failed: {}",
                self.program,
                host,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        tracing::info!("Purged cached host key for {}", host);
        Ok(())
    }
}
