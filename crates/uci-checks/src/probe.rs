//! Filesystem probe for dependency manifests.

use std::path::{Path, PathBuf};

use crate::ecosystem::Ecosystem;

/// Whether `path` names an existing regular file. Never fails.
pub async fn file_exists(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

/// Manifests present in `repo_path`, in probe order.
pub async fn discover_manifests(repo_path: &Path) -> Vec<(Ecosystem, PathBuf)> {
    let mut found = Vec::new();
    for eco in Ecosystem::ALL {
        let path = repo_path.join(eco.manifest());
        if file_exists(&path).await {
            found.push((eco, path));
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("go.sum");
        std::fs::write(&file, "").unwrap();

        assert!(file_exists(&file).await);
        assert!(!file_exists(dir.path()).await);
        assert!(!file_exists(&dir.path().join("missing")).await);
    }

    #[tokio::test]
    async fn test_discover_in_fixed_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        std::fs::write(dir.path().join("go.sum"), "").unwrap();

        let found: Vec<Ecosystem> = discover_manifests(dir.path())
            .await
            .into_iter()
            .map(|(eco, _)| eco)
            .collect();
        assert_eq!(found, vec![Ecosystem::GoModules, Ecosystem::NodeNpm]);
    }

    #[tokio::test]
    async fn test_manifest_directory_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("composer.lock")).unwrap();
        assert!(discover_manifests(dir.path()).await.is_empty());
    }
}
