use std::path::PathBuf;
use thiserror::Error;

use crate::playbook::ValidationError;

#[derive(Debug, Error)]
pub enum PlaybookError {
    #[error("directory {0} doesn't exist")]
    DirectoryNotFound(PathBuf),

    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("file {0} doesn't exist")]
    PlaybookNotFound(PathBuf),

    #[error("path {0} is not a regular file")]
    PlaybookNotAFile(PathBuf),

    #[error("there is already a file {0}, which is not supported")]
    OutputPathExists(PathBuf),

    #[error("error parsing playbook: {0}")]
    Parse(String),

    #[error("playbook is invalid ({} error(s))", .0.len())]
    Validation(Vec<ValidationError>),

    #[error("{0}")]
    PrerequisiteFailed(String),

    #[error("readiness conditions of component '{component}' are not fulfilled")]
    ReadinessNotFulfilled { component: String },

    #[error("envfile {0} doesn't exist")]
    VariablesFileNotFound(PathBuf),

    #[error("the known node '{0}' was not found")]
    UnknownNode(String),

    #[error("required tool '{0}' was not found on PATH")]
    ToolNotFound(String),

    #[error("resource apiVersion: {api_version}, kind: {kind} not found")]
    ResourceKindNotFound { api_version: String, kind: String },

    #[error("object {kind} '{name}' not found in namespace '{namespace}'")]
    ObjectNotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("run cancelled")]
    Cancelled,

    #[error("substitution failed for component '{component}': {reason}")]
    Substitution { component: String, reason: String },

    #[error("template error: {0}")]
    Template(String),

    #[error("cluster access failed: {0}")]
    Cluster(String),

    #[error("manifest build failed: {0}")]
    Build(String),

    #[error("applying component '{component}' failed after {attempts} attempt(s)")]
    ApplyFailed {
        component: String,
        attempts: u32,
        #[source]
        source: Box<PlaybookError>,
    },

    #[error("kubectl apply failed: {0}")]
    Apply(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PlaybookError {
    /// Known errors end the run with a plain message and exit code 1.
    /// Everything else is an unexpected fault.
    pub fn is_known(&self) -> bool {
        matches!(
            self,
            PlaybookError::DirectoryNotFound(_)
                | PlaybookError::NotADirectory(_)
                | PlaybookError::PlaybookNotFound(_)
                | PlaybookError::PlaybookNotAFile(_)
                | PlaybookError::OutputPathExists(_)
                | PlaybookError::Parse(_)
                | PlaybookError::Validation(_)
                | PlaybookError::PrerequisiteFailed(_)
                | PlaybookError::ReadinessNotFulfilled { .. }
                | PlaybookError::VariablesFileNotFound(_)
                | PlaybookError::UnknownNode(_)
                | PlaybookError::ToolNotFound(_)
                | PlaybookError::ResourceKindNotFound { .. }
                | PlaybookError::ObjectNotFound { .. }
                | PlaybookError::Cancelled
        )
    }
}

pub type Result<T> = std::result::Result<T, PlaybookError>;
