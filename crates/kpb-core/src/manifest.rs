//! Rendering and applying component manifests.
//!
//! Both steps delegate to external tools invoked as subprocesses:
//! - `kustomize build <dir>` renders the component's kustomization, which is
//!   written to `<dir>/kustomization.yaml` for the duration of the build.
//! - `kubectl apply -f <tmp>` applies the rendered manifest.
//!
//! Subprocesses are spawned with `kill_on_drop`, so cancelling the run kills
//! them.

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output, Stdio};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::cancel::cancellable;
use crate::error::{PlaybookError, Result};
use crate::paths;
use crate::playbook::Manifest;

pub const KUSTOMIZE: &str = "kustomize";
pub const KUBECTL: &str = "kubectl";

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ManifestBuilder: Send + Sync {
    /// Render a kustomization into flat manifests.
    async fn build(&self, manifest: &Manifest, cancel: &CancellationToken) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait ManifestApplier: Send + Sync {
    async fn apply(&self, manifest: &[u8], cancel: &CancellationToken) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Tool detection
// ---------------------------------------------------------------------------

/// Locate `name` on `PATH`.
pub fn require_tool(name: &str) -> Result<PathBuf> {
    which::which(name).map_err(|_| PlaybookError::ToolNotFound(name.to_string()))
}

// ---------------------------------------------------------------------------
// KustomizeBuilder
// ---------------------------------------------------------------------------

pub struct KustomizeBuilder {
    program: PathBuf,
    dir: PathBuf,
}

impl KustomizeBuilder {
    /// `dir` is the playbook directory; resource paths in kustomizations are
    /// relative to it.
    pub fn new(program: impl Into<PathBuf>, dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            dir: dir.into(),
        }
    }
}

#[async_trait]
impl ManifestBuilder for KustomizeBuilder {
    async fn build(&self, manifest: &Manifest, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let path = paths::kustomization_path(&self.dir);
        // Checked before the run starts; reaching this means something else
        // created the file mid-run.
        if path.exists() {
            return Err(PlaybookError::InvariantViolation(format!(
                "{} was checked to not exist before the run",
                path.display()
            )));
        }

        let data = serde_yaml::to_string(manifest)?;
        tokio::fs::write(&path, data).await?;
        let _cleanup = RemoveOnDrop(path);

        let mut cmd = Command::new(&self.program);
        cmd.arg("build").arg(&self.dir);
        let output = run_tool(cmd, cancel).await?;

        if !output.status.success() {
            return Err(PlaybookError::Build(failure_message(
                KUSTOMIZE,
                output.status,
                &output.stderr,
            )));
        }
        tracing::debug!(bytes = output.stdout.len(), "kustomize build finished");
        Ok(output.stdout)
    }
}

/// Removes the generated kustomization when the build ends, whether it
/// succeeded, failed or was cancelled.
struct RemoveOnDrop(PathBuf);

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.0.display(), "failed to remove kustomization: {e}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// KubectlApplier
// ---------------------------------------------------------------------------

pub struct KubectlApplier {
    program: PathBuf,
    kubeconfig: Option<PathBuf>,
    context: Option<String>,
}

impl KubectlApplier {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            kubeconfig: None,
            context: None,
        }
    }

    pub fn kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }

    pub fn context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    fn command(&self, manifest_path: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(kubeconfig) = &self.kubeconfig {
            cmd.arg("--kubeconfig").arg(kubeconfig);
        }
        if let Some(context) = &self.context {
            cmd.arg("--context").arg(context);
        }
        cmd.arg("apply").arg("-f").arg(manifest_path);
        cmd
    }
}

#[async_trait]
impl ManifestApplier for KubectlApplier {
    async fn apply(&self, manifest: &[u8], cancel: &CancellationToken) -> Result<()> {
        let mut file = tempfile::Builder::new()
            .prefix("kpb-")
            .suffix(".yaml")
            .tempfile()?;
        file.write_all(manifest)?;
        file.flush()?;

        let output = run_tool(self.command(file.path()), cancel).await?;
        if !output.status.success() {
            return Err(PlaybookError::Apply(failure_message(
                KUBECTL,
                output.status,
                &output.stderr,
            )));
        }
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            tracing::info!("{line}");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Subprocess helpers
// ---------------------------------------------------------------------------

async fn run_tool(mut cmd: Command, cancel: &CancellationToken) -> Result<Output> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    tracing::debug!(command = ?cmd.as_std(), "spawning");

    let child = cmd.spawn()?;
    cancellable(cancel, async {
        child.wait_with_output().await.map_err(PlaybookError::from)
    })
    .await
}

/// Exit status plus the tail of stderr, capped at 4KB.
fn failure_message(tool: &str, status: ExitStatus, stderr: &[u8]) -> String {
    const MAX_STDERR: usize = 4 * 1024;
    let stderr = String::from_utf8_lossy(stderr);
    let trimmed = stderr.trim();
    let tail = if trimmed.len() > MAX_STDERR {
        let mut start = trimmed.len() - MAX_STDERR;
        while !trimmed.is_char_boundary(start) {
            start += 1;
        }
        &trimmed[start..]
    } else {
        trimmed
    };
    if tail.is_empty() {
        format!("{tool} exited with {status}")
    } else {
        format!("{tool} exited with {status}: {tail}")
    }
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[cfg(test)]
pub mod fake {
    //! Scripted builder and applier for engine tests.

    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Serializes the kustomization back to YAML instead of running kustomize.
    #[derive(Default)]
    pub struct EchoBuilder {
        pub built: Mutex<Vec<Manifest>>,
    }

    #[async_trait]
    impl ManifestBuilder for EchoBuilder {
        async fn build(&self, manifest: &Manifest, _cancel: &CancellationToken) -> Result<Vec<u8>> {
            self.built.lock().unwrap().push(manifest.clone());
            Ok(serde_yaml::to_string(manifest)?.into_bytes())
        }
    }

    /// Fails the first `failures` apply calls, then succeeds.
    #[derive(Default)]
    pub struct FlakyApplier {
        failures: AtomicU32,
        pub attempts: AtomicU32,
        pub applied: Mutex<Vec<Vec<u8>>>,
    }

    impl FlakyApplier {
        pub fn failing(failures: u32) -> Self {
            Self {
                failures: AtomicU32::new(failures),
                ..Default::default()
            }
        }

        pub fn always_failing() -> Self {
            Self::failing(u32::MAX)
        }

        pub fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ManifestApplier for FlakyApplier {
        async fn apply(&self, manifest: &[u8], _cancel: &CancellationToken) -> Result<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(PlaybookError::Apply(format!("attempt {attempt} rejected")));
            }
            self.applied.lock().unwrap().push(manifest.to_vec());
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
