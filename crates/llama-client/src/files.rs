//! File attachments.
//!
//! `-f SRC[:DEST]` exposes a local file to the remote command at the relative
//! path `DEST` (default: `SRC`). Content travels through the store; the mode
//! travels alongside so executables stay executable.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use futures::future::try_join_all;

use llama_protocol::{File, SpecError, validate_destination};
use llama_store::{Store, StoreError};

/// Error preparing attachments.
#[derive(Debug, thiserror::Error)]
pub enum FileSpecError {
    #[error("-file: {0}")]
    Destination(#[from] SpecError),

    #[error("reading file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stat {path:?}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("writing {path:?} to store: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: StoreError,
    },
}

/// One `SRC[:DEST]` attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSpec {
    pub source: PathBuf,
    pub dest: String,
}

impl FileSpec {
    /// Attachment with an explicit destination.
    pub fn new(source: impl Into<PathBuf>, dest: impl Into<String>) -> Result<Self, FileSpecError> {
        let dest = dest.into();
        validate_destination(&dest)?;
        Ok(Self {
            source: source.into(),
            dest,
        })
    }

    /// Parse `SRC[:DEST]`, splitting at the first `:` after position 0.
    pub fn parse(value: &str) -> Result<Self, FileSpecError> {
        match value.find(':') {
            Some(idx) if idx > 0 => Self::new(&value[..idx], &value[idx + 1..]),
            _ => Self::new(value, value),
        }
    }
}

impl FromStr for FileSpec {
    type Err = FileSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

async fn prepare_one(store: &dyn Store, spec: &FileSpec) -> Result<(String, File), FileSpecError> {
    let data = tokio::fs::read(&spec.source)
        .await
        .map_err(|source| FileSpecError::Read {
            path: spec.source.clone(),
            source,
        })?;
    let meta = tokio::fs::metadata(&spec.source)
        .await
        .map_err(|source| FileSpecError::Stat {
            path: spec.source.clone(),
            source,
        })?;
    let file = File::put(store, &data, File::mode_of(&meta))
        .await
        .map_err(|source| FileSpecError::Store {
            path: spec.source.clone(),
            source,
        })?;
    tracing::debug!(
        source = %spec.source.display(),
        dest = %spec.dest,
        size = file.blob.size,
        "prepared attachment"
    );
    Ok((spec.dest.clone(), file))
}

/// Check every attachment destination without touching any file.
pub fn validate_files(specs: &[FileSpec]) -> Result<(), FileSpecError> {
    for spec in specs {
        validate_destination(&spec.dest)?;
    }
    Ok(())
}

/// Read, stat, and store every attachment.
///
/// All destinations are validated before any file is touched. Entries are
/// prepared concurrently; the first failure aborts the batch and no map is
/// returned.
pub async fn prepare_files(
    store: &dyn Store,
    specs: &[FileSpec],
) -> Result<BTreeMap<String, File>, FileSpecError> {
    validate_files(specs)?;
    let prepared = try_join_all(specs.iter().map(|spec| prepare_one(store, spec))).await?;
    Ok(prepared.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use llama_store::MemoryStore;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_parse_default_dest() {
        let spec = FileSpec::parse("data/input.csv").unwrap();
        assert_eq!(spec.source, PathBuf::from("data/input.csv"));
        assert_eq!(spec.dest, "data/input.csv");
    }

    #[test]
    fn test_parse_split_at_first_colon() {
        let spec = FileSpec::parse("local.txt:remote/a:b.txt").unwrap();
        assert_eq!(spec.source, PathBuf::from("local.txt"));
        assert_eq!(spec.dest, "remote/a:b.txt");
    }

    #[test]
    fn test_parse_leading_colon_does_not_split() {
        let spec = FileSpec::parse(":odd").unwrap();
        assert_eq!(spec.source, PathBuf::from(":odd"));
        assert_eq!(spec.dest, ":odd");
    }

    #[test]
    fn test_parse_rejects_absolute_dest() {
        assert!(matches!(
            FileSpec::parse("/etc/passwd"),
            Err(FileSpecError::Destination(SpecError::AbsoluteDestination(_)))
        ));
        assert!(FileSpec::parse("passwd:/etc/passwd").is_err());
        // Absolute source with a relative destination is fine.
        assert!(FileSpec::parse("/etc/hosts:hosts").is_ok());
    }

    #[tokio::test]
    async fn test_prepare_captures_content_and_mode() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("run.sh");
        std::fs::write(&script, b"#!/bin/sh\necho ok\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let store = MemoryStore::new();
        let spec = FileSpec::new(&script, "bin/run.sh").unwrap();
        let files = prepare_files(&store, &[spec]).await.unwrap();

        let file = files.get("bin/run.sh").expect("attached");
        assert_eq!(file.mode.permissions(), 0o755);
        assert_eq!(store.get(&file.blob).await.unwrap(), b"#!/bin/sh\necho ok\n");
    }

    #[tokio::test]
    async fn test_absolute_dest_fails_before_any_read() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.txt");
        std::fs::write(&good, b"would be uploaded").unwrap();

        let store = MemoryStore::new();
        let specs = vec![
            FileSpec::new(&good, "good.txt").unwrap(),
            FileSpec {
                source: good.clone(),
                dest: "/etc/passwd".to_string(),
            },
        ];
        let err = prepare_files(&store, &specs).await.unwrap_err();
        assert!(matches!(err, FileSpecError::Destination(_)));
        assert!(store.is_empty(), "no upload may happen");
    }

    #[tokio::test]
    async fn test_missing_source_names_path() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.txt");
        std::fs::write(&good, b"ok").unwrap();
        let missing = dir.path().join("missing.txt");

        let store = MemoryStore::new();
        let specs = vec![
            FileSpec::new(&good, "good.txt").unwrap(),
            FileSpec::new(&missing, "missing.txt").unwrap(),
        ];
        match prepare_files(&store, &specs).await.unwrap_err() {
            FileSpecError::Read { path, .. } => assert_eq!(path, missing),
            other => panic!("expected read error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_list() {
        let store = MemoryStore::new();
        assert!(prepare_files(&store, &[]).await.unwrap().is_empty());
    }
}
