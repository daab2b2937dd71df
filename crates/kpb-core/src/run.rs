//! Loading a playbook directory into a run that is ready to execute.
//!
//! Everything in [`LoadedRun::load`] is local: nothing touches the cluster
//! until [`LoadedRun::check_prerequisites`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::cancel::cancellable;
use crate::cluster::ClusterAccessor;
use crate::condition::ConditionEvaluator;
use crate::error::{PlaybookError, Result};
use crate::paths;
use crate::playbook::Playbook;
use crate::substitution;

const DEFAULT_PREREQUISITE_MESSAGE: &str = "Prerequisite check failed";

#[derive(Debug, Clone)]
pub struct LoadedRun {
    pub directory: PathBuf,
    pub playbook: Playbook,
}

impl LoadedRun {
    /// Pre-flight checks, parse, validate and substitute.
    ///
    /// Variables come from `envfile` when given; otherwise every reference in
    /// a substituted component expands to its default or the empty string.
    pub fn load(directory: &Path, envfile: Option<&Path>) -> Result<Self> {
        check_directory(directory)?;

        let playbook_path = paths::playbook_path(directory);
        if !playbook_path.exists() {
            return Err(PlaybookError::PlaybookNotFound(playbook_path));
        }
        if !playbook_path.is_file() {
            return Err(PlaybookError::PlaybookNotAFile(playbook_path));
        }

        let output_path = paths::kustomization_path(directory);
        if output_path.exists() {
            return Err(PlaybookError::OutputPathExists(output_path));
        }

        let data = std::fs::read(&playbook_path)?;
        let mut playbook = Playbook::parse(&data)?;

        let errors = playbook.validate();
        if !errors.is_empty() {
            return Err(PlaybookError::Validation(errors));
        }

        let vars = match envfile {
            Some(path) => substitution::load_variables(path)?,
            None => HashMap::new(),
        };
        playbook.substitute(&vars)?;

        tracing::debug!(
            directory = %directory.display(),
            components = playbook.components.len(),
            "playbook loaded"
        );
        Ok(Self {
            directory: directory.to_path_buf(),
            playbook,
        })
    }

    /// Evaluate the playbook's prerequisites in order. The first unmet one
    /// fails the run with its message.
    pub async fn check_prerequisites(
        &self,
        accessor: &dyn ClusterAccessor,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let evaluator = ConditionEvaluator::new(accessor, cancel.clone());
        match evaluator
            .first_unfulfilled(&self.playbook.prerequisites)
            .await?
        {
            None => Ok(()),
            Some(condition) => Err(PlaybookError::PrerequisiteFailed(
                condition
                    .message
                    .clone()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| DEFAULT_PREREQUISITE_MESSAGE.to_string()),
            )),
        }
    }
}

fn check_directory(directory: &Path) -> Result<()> {
    match std::fs::metadata(directory) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(PlaybookError::NotADirectory(directory.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(PlaybookError::DirectoryNotFound(directory.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Guard against running against the wrong cluster: `node` must exist.
pub async fn check_known_node(
    accessor: &dyn ClusterAccessor,
    node: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    let found = cancellable(cancel, accessor.has_node(node)).await?;
    if found {
        Ok(())
    } else {
        Err(PlaybookError::UnknownNode(node.to_string()))
    }
}
