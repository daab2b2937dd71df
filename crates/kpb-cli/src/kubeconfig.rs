use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

/// Resolve the kubeconfig file.
///
/// Priority:
/// 1. `--kubeconfig` flag / `KUBECONFIG` env var. A `KUBECONFIG` list picks
///    the first entry that exists, else the first entry.
/// 2. `~/.kube/config`
pub fn resolve(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = explicit {
        let entries: Vec<PathBuf> = std::env::split_paths(p.as_os_str())
            .filter(|e| !e.as_os_str().is_empty())
            .collect();
        if let Some(found) = entries.iter().find(|e| e.exists()) {
            return Ok(found.clone());
        }
        if let Some(first) = entries.into_iter().next() {
            return Ok(first);
        }
    }

    home::home_dir()
        .map(|home| home.join(".kube").join("config"))
        .ok_or_else(|| anyhow!("cannot determine the home directory; pass --kubeconfig"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_path_is_used_even_if_missing() {
        let p = Path::new("/nonexistent/kubeconfig");
        assert_eq!(resolve(Some(p)).unwrap(), p);
    }

    #[test]
    fn first_existing_list_entry_wins() {
        let dir = TempDir::new().unwrap();
        let existing = dir.path().join("b.yaml");
        std::fs::write(&existing, "").unwrap();
        let list = std::env::join_paths([dir.path().join("a.yaml"), existing.clone()]).unwrap();
        assert_eq!(resolve(Some(Path::new(&list))).unwrap(), existing);
    }

    #[test]
    fn list_without_existing_entry_uses_the_first() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("a.yaml");
        let list = std::env::join_paths([first.clone(), dir.path().join("b.yaml")]).unwrap();
        assert_eq!(resolve(Some(Path::new(&list))).unwrap(), first);
    }

    #[test]
    fn defaults_to_home_kube_config() {
        if let Some(home) = home::home_dir() {
            assert_eq!(resolve(None).unwrap(), home.join(".kube").join("config"));
        }
    }
}
