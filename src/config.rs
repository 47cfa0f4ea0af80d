use std::path::PathBuf;

pub const ENV_WORKSPACE: &str = "SCORECARD_WORKSPACE";
pub const ENV_LOG: &str = "SCORECARD_LOG";
pub const DEFAULT_LOG_DIRECTIVES: &str = "info";

/// Process-level settings read once at start-up. Workspace settings live in the db.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub workspace: Option<PathBuf>,
    pub log_directives: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Config {
            workspace: non_empty(ENV_WORKSPACE).map(PathBuf::from),
            log_directives: non_empty(ENV_LOG),
        }
    }
}
