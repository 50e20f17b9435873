// src/infra/paths.rs — Config and data locations
//
// ARCHER_HOME overrides everything. Otherwise config lives in ~/.archer/
// and data under the platform data dir (XDG_DATA_HOME/archer on Linux).

use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

fn archer_home() -> Option<PathBuf> {
    std::env::var_os("ARCHER_HOME").map(PathBuf::from)
}

/// Configuration directory: $ARCHER_HOME/ or ~/.archer/
pub fn config_dir() -> PathBuf {
    if let Some(home) = archer_home() {
        return home;
    }
    BaseDirs::new()
        .map(|b| b.home_dir().join(".archer"))
        .unwrap_or_else(|| PathBuf::from(".archer"))
}

/// Data directory: $ARCHER_HOME/data/ or the platform data dir.
pub fn data_dir() -> PathBuf {
    if let Some(home) = archer_home() {
        return home.join("data");
    }
    ProjectDirs::from("", "", "archer")
        .map(|p| p.data_local_dir().to_path_buf())
        .unwrap_or_else(|| config_dir().join("data"))
}

pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

pub fn db_path() -> PathBuf {
    data_dir().join("archer.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_is_toml_in_config_dir() {
        let path = config_file_path();
        assert_eq!(path.file_name().unwrap(), "config.toml");
        assert_eq!(path.parent().unwrap(), config_dir());
    }

    #[test]
    fn test_db_path_in_data_dir() {
        let path = db_path();
        assert_eq!(path.file_name().unwrap(), "archer.db");
        assert!(path.starts_with(data_dir()));
    }
}
