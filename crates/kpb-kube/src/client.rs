use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::Path;

use kpb_core::error::{PlaybookError, Result};

/// Build a client from an explicit kubeconfig file, optionally selecting a
/// context other than the file's current one.
pub async fn connect(kubeconfig: &Path, context: Option<&str>) -> Result<Client> {
    let file = Kubeconfig::read_from(kubeconfig).map_err(|e| {
        PlaybookError::Cluster(format!(
            "failed to read kubeconfig {}: {e}",
            kubeconfig.display()
        ))
    })?;
    let options = KubeConfigOptions {
        context: context.map(str::to_string),
        ..Default::default()
    };
    let config = Config::from_custom_kubeconfig(file, &options)
        .await
        .map_err(|e| PlaybookError::Cluster(format!("invalid kubeconfig: {e}")))?;

    tracing::debug!(cluster_url = %config.cluster_url, context, "connecting to cluster");
    Client::try_from(config).map_err(|e| PlaybookError::Cluster(e.to_string()))
}
