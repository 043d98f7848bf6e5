use std::path::{Path, PathBuf};

use directories_next::ProjectDirs;

pub const ENV_CONFIG_FILE: &str = "BINARY_DISSOLVE_CONFIG";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "BinaryDissolve";
const APPLICATION: &str = "binary-dissolve";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Location of the per-user config file, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Resolves `path` against the directory holding the config file that named
/// it. Absolute paths pass through unchanged.
pub fn relative_to_config(path: &Path, config_file: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match config_file.parent() {
        Some(dir) => dir.join(path),
        None => path.to_path_buf(),
    }
}
