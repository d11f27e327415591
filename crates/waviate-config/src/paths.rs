//! Platform-specific paths for patches and engine settings.
//!
//! - **User config**: `~/.config/waviate/` (Linux), `~/Library/Application Support/waviate/` (macOS), `%APPDATA%\waviate\` (Windows)
//! - **User patches**: `patches/` under the user config directory

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Application name used for directory paths.
const APP_NAME: &str = "waviate";

/// Subdirectory name for patches.
const PATCHES_SUBDIR: &str = "patches";

/// File name of the engine settings.
const ENGINE_FILE: &str = "engine.toml";

/// Returns the user-specific configuration directory.
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Returns the user-specific patches directory.
pub fn user_patches_dir() -> PathBuf {
    user_config_dir().join(PATCHES_SUBDIR)
}

/// Default location of the engine settings file.
pub fn engine_config_path() -> PathBuf {
    user_config_dir().join(ENGINE_FILE)
}

/// Ensure the user patches directory exists.
pub fn ensure_user_patches_dir() -> Result<PathBuf, ConfigError> {
    let dir = user_patches_dir();
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| ConfigError::create_dir(&dir, e))?;
    }
    Ok(dir)
}

/// Find a patch file by path or by name.
///
/// A name without `.toml` gets the extension added and is looked up in the
/// user patches directory.
pub fn find_patch(name: &str) -> Option<PathBuf> {
    let path = PathBuf::from(name);
    if path.is_file() {
        return Some(path);
    }

    let filename = if name.ends_with(".toml") {
        name.to_string()
    } else {
        format!("{name}.toml")
    };
    let user_path = user_patches_dir().join(filename);
    user_path.is_file().then_some(user_path)
}

/// TOML files directly inside `dir`, sorted by name.
///
/// Returns an empty vector if the directory doesn't exist or can't be read.
pub fn list_patches_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut patches: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    patches.sort();
    patches
}

/// Patch name from a file path (the file stem).
pub fn patch_name_from_path(path: &Path) -> Option<String> {
    path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
}
