//! Export sinks for rendered documents.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::definition::ExportKind;
use crate::error::{PipelineError, Result};

/// Write `contents` to `destination/file_name` through the `kind` sink.
///
/// Returns the written path.
pub async fn export(
    kind: ExportKind,
    destination: &str,
    file_name: &str,
    contents: &str,
) -> Result<PathBuf> {
    match kind {
        ExportKind::File => write_file(Path::new(destination), file_name, contents).await,
    }
}

/// File sink: creates parent directories and overwrites existing files.
pub async fn write_file(destination: &Path, file_name: &str, contents: &str) -> Result<PathBuf> {
    let file_name = file_name.trim();
    if file_name.is_empty() {
        return Err(PipelineError::Export("rendered file name is empty".into()));
    }
    let path = destination.join(file_name);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            PipelineError::Export(format!("cannot create '{}': {}", parent.display(), e))
        })?;
    }
    tokio::fs::write(&path, contents)
        .await
        .map_err(|e| PipelineError::Export(format!("cannot write '{}': {}", path.display(), e)))?;
    debug!(path = %path.display(), bytes = contents.len(), "Exported file");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("reports/2024");
        let path = write_file(&dest, "out.csv", "a,b\n").await.unwrap();
        assert_eq!(path, dest.join("out.csv"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a,b\n");
    }

    #[tokio::test]
    async fn test_write_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "x.txt", "one").await.unwrap();
        let path = write_file(dir.path(), "x.txt", "two").await.unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "two");
    }

    #[tokio::test]
    async fn test_empty_file_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_file(dir.path(), "  ", "x").await.unwrap_err();
        assert!(matches!(err, PipelineError::Export(_)));
    }

    #[tokio::test]
    async fn test_export_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().to_string_lossy().to_string();
        let path = export(ExportKind::File, &dest, "r.json", "{}").await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_write_into_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let err = write_file(&blocker, "x.txt", "data").await.unwrap_err();
        assert!(matches!(err, PipelineError::Export(_)));
    }
}
