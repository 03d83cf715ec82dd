use std::path::{Path, PathBuf};

/// Check if a file should be filtered out (hidden files, editor temp files)
pub fn should_skip_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Base name of a path, used as the remote object name and the routing target name
pub fn base_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

/// Join a remote directory and a file name with exactly one `/`.
/// An empty directory yields the bare name (relative to the login directory).
pub fn remote_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        return name.to_string();
    }
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

/// Destination of a file relocated into `dir`, keeping its base name
pub fn relocation_target(dir: &Path, path: &Path) -> Option<PathBuf> {
    path.file_name().map(|name| dir.join(name))
}
