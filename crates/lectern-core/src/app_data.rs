//! Where Lectern stores its own data (config, course stores).
//!
//! Uploaded course files stay wherever the caller keeps them. We only store the
//! derived indexes here.

use std::path::PathBuf;

/// Subdirectory of the app data directory holding one `course_{id}.json` per course.
pub const STORES_DIRNAME: &str = "stores";

/// Returns the directory where Lectern stores config and course indexes.
/// On Linux: `~/.local/share/lectern/`.
/// Creates the directory if it doesn't exist; returns `None` if we can't determine the path.
pub fn app_data_dir() -> Option<PathBuf> {
    let dir = directories::ProjectDirs::from("app", "Lectern", "Lectern")?
        .data_local_dir()
        .to_path_buf();
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

/// Default location of the per-course vector stores.
pub fn default_store_dir() -> Option<PathBuf> {
    app_data_dir().map(|d| d.join(STORES_DIRNAME))
}
