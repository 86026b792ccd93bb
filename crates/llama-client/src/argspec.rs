//! Argument grammar.
//!
//! Each positional argument is parsed on its own, left to right:
//!
//! | token        | encoded as                                   |
//! |--------------|----------------------------------------------|
//! | `plain`      | literal string (also when `@` is the first char) |
//! | `raw@STR`    | `STR` verbatim, no file access               |
//! | `i@PATH`     | file content, put into the store             |
//! | `o@PATH`     | named output, written to `PATH` afterwards   |
//! | `io@PATH`    | both of the above                            |
//!
//! Only the first `@` splits; everything after it belongs to the value.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use llama_protocol::Arg;
use llama_store::{Blob, Store, StoreError};

/// Error encoding an argument.
#[derive(Debug, thiserror::Error)]
pub enum ArgSpecError {
    /// Prefix before `@` is not part of the grammar.
    #[error("unrecognized argspec: {0}@...")]
    UnrecognizedPrefix(String),

    /// Input file could not be read.
    #[error("reading file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Input file could not be stored.
    #[error("writing {path:?} to store: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: StoreError,
    },
}

/// Output names registered while encoding, mapped to local destinations.
///
/// Client-local; never sent to the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputMap {
    entries: BTreeMap<String, PathBuf>,
}

impl OutputMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Destination for an output name.
    pub fn get(&self, name: &str) -> Option<&Path> {
        self.entries.get(name).map(PathBuf::as_path)
    }

    /// Register `dest` under its basename and return the name used.
    ///
    /// A name already taken becomes `<count>-<name>`, where `count` is the
    /// number of registered entries. If that is taken as well, the count is
    /// bumped until the name is free.
    pub fn register(&mut self, dest: &str) -> String {
        let base = basename(dest);
        let mut name = base.clone();
        let mut count = self.entries.len();
        while self.entries.contains_key(&name) {
            name = format!("{count}-{base}");
            count += 1;
        }
        self.entries.insert(name.clone(), PathBuf::from(dest));
        name
    }
}

/// Last element of a slash-separated path.
///
/// Trailing slashes are ignored; an empty path yields `.` and a path of only
/// slashes yields `/`.
pub fn basename(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    match trimmed.rfind('/') {
        Some(idx) => trimmed[idx + 1..].to_string(),
        None => trimmed.to_string(),
    }
}

async fn read_input(store: &dyn Store, path: &str) -> Result<Blob, ArgSpecError> {
    let data = tokio::fs::read(path).await.map_err(|source| ArgSpecError::Read {
        path: PathBuf::from(path),
        source,
    })?;
    store.put(&data).await.map_err(|source| ArgSpecError::Store {
        path: PathBuf::from(path),
        source,
    })
}

/// Encode one command-line token.
pub async fn encode_arg(
    store: &dyn Store,
    outputs: &mut OutputMap,
    token: &str,
) -> Result<Arg, ArgSpecError> {
    let Some((prefix, rest)) = token.split_once('@') else {
        return Ok(Arg::literal(token));
    };
    if prefix.is_empty() {
        return Ok(Arg::literal(token));
    }

    match prefix {
        "raw" => Ok(Arg::Raw(rest.to_string())),
        "i" => Ok(Arg::Input(read_input(store, rest).await?)),
        "io" => {
            let input = read_input(store, rest).await?;
            let output = outputs.register(rest);
            Ok(Arg::InputOutput { input, output })
        }
        "o" => Ok(Arg::Output(outputs.register(rest))),
        other => Err(ArgSpecError::UnrecognizedPrefix(other.to_string())),
    }
}

/// Encode every token, preserving order, and collect the output map.
pub async fn encode_args<S: AsRef<str>>(
    store: &dyn Store,
    tokens: &[S],
) -> Result<(Vec<Arg>, OutputMap), ArgSpecError> {
    let mut outputs = OutputMap::new();
    let mut args = Vec::with_capacity(tokens.len());
    for token in tokens {
        args.push(encode_arg(store, &mut outputs, token.as_ref()).await?);
    }
    tracing::debug!(args = args.len(), outputs = outputs.len(), "encoded arguments");
    Ok((args, outputs))
}
