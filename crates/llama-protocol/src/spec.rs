//! Invocation request and response.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use llama_store::{Blob, File};

use crate::arg::Arg;

/// Error building an [`InvocationSpec`].
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    /// Attachment destinations must be relative.
    #[error("cannot expose file at absolute path: {0:?}")]
    AbsoluteDestination(String),
}

/// Full description of one remote call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvocationSpec {
    /// Buffered standard input, if requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<Blob>,
    /// Attached files keyed by relative destination path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    files: BTreeMap<String, File>,
    /// Encoded positional arguments, in command-line order.
    #[serde(default)]
    pub args: Vec<Arg>,
}

impl InvocationSpec {
    /// Empty spec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attached files.
    pub fn files(&self) -> &BTreeMap<String, File> {
        &self.files
    }

    /// Attach a file at `dest`, which must be a relative path.
    pub fn attach(&mut self, dest: impl Into<String>, file: File) -> Result<(), SpecError> {
        let dest = dest.into();
        validate_destination(&dest)?;
        self.files.insert(dest, file);
        Ok(())
    }
}

/// Check that an attachment destination is a relative path.
pub fn validate_destination(dest: &str) -> Result<(), SpecError> {
    if Path::new(dest).is_absolute() {
        return Err(SpecError::AbsoluteDestination(dest.to_string()));
    }
    Ok(())
}

/// What the backend returned for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvocationResponse {
    /// Exit status of the remote command.
    pub exit_status: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<Blob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<Blob>,
    /// Named results, keyed by output name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Blob>,
    /// Execution logs, when requested and available. Carried out of band.
    #[serde(skip)]
    pub logs: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use llama_store::FileMode;
    use serde_json::json;

    fn file() -> File {
        File {
            blob: Blob::describe(b"contents"),
            mode: FileMode(0o100644),
        }
    }

    #[test]
    fn test_attach_rejects_absolute() {
        let mut spec = InvocationSpec::new();
        let err = spec.attach("/etc/passwd", file()).unwrap_err();
        assert!(matches!(err, SpecError::AbsoluteDestination(_)));
        assert!(spec.files().is_empty());
    }

    #[test]
    fn test_attach_accepts_relative() {
        let mut spec = InvocationSpec::new();
        spec.attach("dir/inside.txt", file()).unwrap();
        spec.attach("../sibling.txt", file()).unwrap();
        assert_eq!(spec.files().len(), 2);
    }

    #[test]
    fn test_spec_wire_shape() {
        let mut spec = InvocationSpec::new();
        spec.args = vec![Arg::literal("-n"), Arg::Output("out".into())];
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json, json!({"args": ["-n", {"out": "out"}]}));
    }

    #[test]
    fn test_response_decodes_with_defaults() {
        let resp: InvocationResponse = serde_json::from_value(json!({"exit_status": 3})).unwrap();
        assert_eq!(resp.exit_status, 3);
        assert!(resp.outputs.is_empty());
        assert!(resp.stdout.is_none());
        assert!(resp.logs.is_none());
    }
}
