//! Client configuration.
//!
//! Command-line flags win; otherwise `LLAMA_STORE` and `LLAMA_EXECUTOR` are
//! consulted. The store falls back to `<data dir>/llama/store`.

use std::path::PathBuf;

use crate::backend::CommandBackend;
use crate::constants::{EXECUTOR_ENV, STORE_ENV};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No backend to dispatch to.
    #[error("no executor configured: pass --executor or set {EXECUTOR_ENV}")]
    NoExecutor,
}

/// Resolved client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub store_dir: PathBuf,
    pub executor: Option<String>,
}

fn expand(value: &str) -> PathBuf {
    shellexpand::tilde(value).as_ref().into()
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn default_store_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("llama")
        .join("store")
}

impl Config {
    /// Resolve settings from explicit values, then the environment.
    pub fn resolve(store_dir: Option<PathBuf>, executor: Option<String>) -> Self {
        Self::resolve_with(store_dir, executor, non_empty_env)
    }

    /// Same as [`Config::resolve`] with an explicit environment lookup.
    pub fn resolve_with(
        store_dir: Option<PathBuf>,
        executor: Option<String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let store_dir = store_dir
            .map(|p| match p.to_str() {
                Some(s) => expand(s),
                None => p,
            })
            .or_else(|| env(STORE_ENV).map(|v| expand(&v)))
            .unwrap_or_else(default_store_dir);
        let executor = executor.or_else(|| env(EXECUTOR_ENV));
        Self {
            store_dir,
            executor,
        }
    }

    /// Backend running the configured executor.
    ///
    /// The executor value is split on whitespace; the first word is the
    /// program and the rest are passed before the function name.
    pub fn backend(&self) -> Result<CommandBackend, ConfigError> {
        let executor = self.executor.as_deref().ok_or(ConfigError::NoExecutor)?;
        let mut words = executor.split_whitespace();
        let program = words.next().ok_or(ConfigError::NoExecutor)?;
        Ok(CommandBackend::new(expand(program)).with_args(words))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_of(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_flags_beat_env() {
        let config = Config::resolve_with(
            Some(PathBuf::from("/flag/store")),
            Some("flag-exec".into()),
            env_of(&[(STORE_ENV, "/env/store"), (EXECUTOR_ENV, "env-exec")]),
        );
        assert_eq!(config.store_dir, PathBuf::from("/flag/store"));
        assert_eq!(config.executor.as_deref(), Some("flag-exec"));
    }

    #[test]
    fn test_env_fallback() {
        let config = Config::resolve_with(
            None,
            None,
            env_of(&[(STORE_ENV, "/env/store"), (EXECUTOR_ENV, "env-exec")]),
        );
        assert_eq!(config.store_dir, PathBuf::from("/env/store"));
        assert_eq!(config.executor.as_deref(), Some("env-exec"));
    }

    #[test]
    fn test_default_store_dir() {
        let config = Config::resolve_with(None, None, env_of(&[]));
        assert!(config.store_dir.ends_with("llama/store"));
        assert!(config.executor.is_none());
    }

    #[test]
    fn test_flag_store_dir_expands_tilde() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let config = Config::resolve_with(Some("~/stash".into()), None, env_of(&[]));
        assert_eq!(config.store_dir, home.join("stash"));
    }

    #[test]
    fn test_backend_requires_executor() {
        let config = Config::resolve_with(None, None, env_of(&[]));
        assert!(matches!(config.backend(), Err(ConfigError::NoExecutor)));
    }

    #[test]
    fn test_backend_splits_words() {
        let config = Config::resolve_with(None, Some("runner --fast".into()), env_of(&[]));
        let backend = config.backend().unwrap();
        let debug = format!("{backend:?}");
        assert!(debug.contains(r#"program: "runner""#), "{debug}");
        assert!(debug.contains(r#"args: ["--fast"]"#), "{debug}");
    }
}
