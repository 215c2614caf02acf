//! On-disk layout configuration for client apps.

use std::env;
use std::path::PathBuf;

use crate::util::normalize_text_option;

const ENV_DATA_DIR: &str = "KEEPSAKE_DATA_DIR";
const DEFAULT_DATA_DIR: &str = ".keepsake";

/// Where the local database and media files live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// Resolve paths from the environment, defaulting to `.keepsake` in the
    /// current directory.
    #[must_use]
    pub fn from_env() -> Self {
        Self::resolve(|key| env::var(key).ok())
    }

    fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = normalize_text_option(lookup(ENV_DATA_DIR))
            .map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from);
        Self { data_dir }
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("keepsake.db")
    }

    #[must_use]
    pub fn media_dir(&self) -> PathBuf {
        self.data_dir.join("media")
    }
}
