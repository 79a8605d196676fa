//! Child process termination

use std::time::Duration;

use tokio::process::Child;

/// A running tunnel child
#[derive(Debug)]
pub struct TunnelChild {
    child: Child,
}

impl TunnelChild {
    pub fn new(child: Child) -> Self {
        Self { child }
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// True once the process has exited
    pub fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }

    /// Ask the process to stop, then kill it after `grace`
    ///
    /// Returns once the process has been reaped.
    pub async fn terminate(&mut self, grace: Duration) {
        if self.has_exited() {
            return;
        }

        if self.signal_terminate() {
            if let Ok(Ok(status)) = tokio::time::timeout(grace, self.child.wait()).await {
                tracing::debug!("Tunnel process exited with {}", status);
                return;
            }
            tracing::warn!("Tunnel process ignored SIGTERM, killing it");
        }

        if let Err(e) = self.child.kill().await {
            tracing::warn!("Failed to kill tunnel process: {}", e);
        }
    }

    #[cfg(unix)]
    fn signal_terminate(&self) -> bool {
        let Some(pid) = self.child.id() else {
            return false;
        };
        // SAFETY: kill(2) with a pid we spawned and still own; no memory is shared.
        unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) == 0 }
    }

    #[cfg(not(unix))]
    fn signal_terminate(&self) -> bool {
        false
    }
}
