//! Scripts directory scanner.
//!
//! Loading is all-or-nothing: one unreadable or malformed script
//! directory fails the whole load, so a corrupt script can never silently
//! shrink the command set.

use std::io;
use std::path::{Path, PathBuf};

use futures::future::try_join_all;
use serde::de::DeserializeOwned;

use super::types::{PackageDescriptor, ScriptDescriptor, ScriptManifest};
use super::{PACKAGE_FILE, SCRIPT_FILE};

/// Errors raised while building the manifest set. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to read scripts directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Package descriptor in {} has no name", directory.display())]
    MissingName { directory: PathBuf },

    #[error("Invalid argument '{argument}' in script '{script}': {reason}")]
    InvalidArgument {
        script: String,
        argument: String,
        reason: &'static str,
    },

    #[error(
        "Script name '{name}' is declared by both {} and {}",
        first.display(),
        second.display()
    )]
    DuplicateName {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },
}

/// Load every script found directly under `scripts_path`.
///
/// Non-directory entries are skipped. Descriptor reads run concurrently;
/// the first failure aborts the aggregate. The result is sorted by script
/// name and names must be unique.
pub async fn load_manifests(scripts_path: &Path) -> Result<Vec<ScriptManifest>, ManifestError> {
    let read_dir_err = |source| ManifestError::ReadDir {
        path: scripts_path.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(scripts_path).await.map_err(read_dir_err)?;
    let mut directories = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(read_dir_err)? {
        let path = entry.path();
        // `metadata` follows symlinks so linked script directories count.
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => directories.push(path),
            Ok(_) => tracing::debug!(path = %path.display(), "Skipping non-directory entry"),
            Err(source) => return Err(ManifestError::Read { path, source }),
        }
    }

    let mut manifests = try_join_all(directories.iter().map(|dir| load_manifest(dir))).await?;

    manifests.sort_by(|a, b| a.name.cmp(&b.name));
    if let Some(pair) = manifests.windows(2).find(|pair| pair[0].name == pair[1].name) {
        return Err(ManifestError::DuplicateName {
            name: pair[0].name.clone(),
            first: pair[0].directory.clone(),
            second: pair[1].directory.clone(),
        });
    }

    tracing::debug!(
        count = manifests.len(),
        path = %scripts_path.display(),
        "Loaded script manifests",
    );

    Ok(manifests)
}

/// Load the manifest of a single script directory.
pub async fn load_manifest(directory: &Path) -> Result<ScriptManifest, ManifestError> {
    let package: PackageDescriptor = read_json(&directory.join(PACKAGE_FILE)).await?;
    let script: ScriptDescriptor = read_json(&directory.join(SCRIPT_FILE)).await?;
    ScriptManifest::assemble(directory.to_path_buf(), package, script)
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ManifestError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    serde_json::from_slice(&bytes).map_err(|source| ManifestError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use assert_matches::assert_matches;

    use super::*;

    fn write_script(root: &Path, dir: &str, package: &str, script: &str) {
        let path = root.join(dir);
        fs::create_dir_all(&path).expect("create script dir");
        fs::write(path.join(PACKAGE_FILE), package).expect("write package.json");
        fs::write(path.join(SCRIPT_FILE), script).expect("write script.json");
    }

    #[tokio::test]
    async fn loads_every_script_directory_sorted_by_name() {
        let root = tempfile::tempdir().expect("tempdir");
        write_script(
            root.path(),
            "b",
            r#"{"name": "zeta", "description": "last"}"#,
            r#"{"useLockFile": true}"#,
        );
        write_script(
            root.path(),
            "a",
            r#"{"name": "alpha", "description": "first", "main": "run.sh"}"#,
            r#"{"arguments": [{"name": "source", "isArgument": true, "required": true}]}"#,
        );
        fs::write(root.path().join("README.md"), "not a script").expect("write file");

        let manifests = load_manifests(root.path()).await.expect("load");

        assert_eq!(manifests.len(), 2);
        assert_eq!(manifests[0].name, "alpha");
        assert_eq!(manifests[0].main.as_deref(), Some("run.sh"));
        assert_eq!(manifests[0].arguments.len(), 1);
        assert!(!manifests[0].use_lock_file);
        assert_eq!(manifests[1].name, "zeta");
        assert!(manifests[1].use_lock_file);
        assert!(manifests[1].arguments.is_empty());
    }

    #[tokio::test]
    async fn one_missing_descriptor_fails_the_whole_load() {
        let root = tempfile::tempdir().expect("tempdir");
        write_script(root.path(), "ok", r#"{"name": "ok"}"#, "{}");
        fs::create_dir_all(root.path().join("broken")).expect("mkdir");
        fs::write(root.path().join("broken").join(PACKAGE_FILE), r#"{"name": "broken"}"#)
            .expect("write");

        let result = load_manifests(root.path()).await;
        assert_matches!(result, Err(ManifestError::Read { path, .. }) if path.ends_with(SCRIPT_FILE));
    }

    #[tokio::test]
    async fn unparseable_descriptor_fails_the_whole_load() {
        let root = tempfile::tempdir().expect("tempdir");
        write_script(root.path(), "ok", r#"{"name": "ok"}"#, "{}");
        write_script(root.path(), "bad", r#"{"name": "bad"}"#, "{ not json");

        let result = load_manifests(root.path()).await;
        assert_matches!(result, Err(ManifestError::Parse { .. }));
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let root = tempfile::tempdir().expect("tempdir");
        write_script(root.path(), "one", r#"{"name": "sync"}"#, "{}");
        write_script(root.path(), "two", r#"{"name": "sync"}"#, "{}");

        let result = load_manifests(root.path()).await;
        assert_matches!(result, Err(ManifestError::DuplicateName { name, .. }) if name == "sync");
    }

    #[tokio::test]
    async fn missing_scripts_root_is_an_error() {
        let root = tempfile::tempdir().expect("tempdir");
        let result = load_manifests(&root.path().join("nope")).await;
        assert_matches!(result, Err(ManifestError::ReadDir { .. }));
    }

    #[tokio::test]
    async fn empty_scripts_root_loads_nothing() {
        let root = tempfile::tempdir().expect("tempdir");
        let manifests = load_manifests(root.path()).await.expect("load");
        assert!(manifests.is_empty());
    }
}
