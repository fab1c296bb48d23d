//! Off-box archival of the data directory.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

#[async_trait]
pub trait ArchiveSink: Send + Sync {
    async fn sync(&self) -> anyhow::Result<()>;
}

/// Mirrors a local directory to an rclone remote with `rclone sync`.
#[derive(Debug, Clone)]
pub struct RcloneArchive {
    program: String,
    local_path: PathBuf,
    remote: String,
}

impl RcloneArchive {
    #[must_use]
    pub fn new(local_path: PathBuf, remote: String) -> Self {
        Self {
            program: "rclone".to_string(),
            local_path,
            remote,
        }
    }

    #[cfg(test)]
    fn with_program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("sync")
            .arg(&self.local_path)
            .arg(&self.remote)
            .args(["--transfers", "2", "-v"])
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl ArchiveSink for RcloneArchive {
    async fn sync(&self) -> anyhow::Result<()> {
        let output = self.command().output().await.map_err(|e| {
            anyhow::anyhow!("failed to start {}: {e}", self.program)
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "{} sync exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            );
        }
        Ok(())
    }
}
