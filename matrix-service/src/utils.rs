// Utility Functions
// Common helpers for path resolution, config discovery, and job workspaces

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = ".travis.yml";

/// Find the root of a git repository by walking up from the given starting path.
///
/// Traverses ancestor directories looking for a `.git` directory, which indicates
/// the repository root. Returns `None` if no `.git` directory is found (e.g., the
/// path is not inside a git repository).
pub fn find_repo_root(start: &Path) -> Option<PathBuf> {
    // Canonicalize to resolve symlinks and get an absolute path
    let start = start.canonicalize().ok()?;
    for ancestor in start.ancestors() {
        if ancestor.join(".git").exists() {
            return Some(ancestor.to_path_buf());
        }
    }
    None
}

/// Resolve the directory jobs run in.
///
/// Attempts to find the git repository root from the current directory.
/// Falls back to the current directory if no repository root is found.
pub fn resolve_working_dir() -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_repo_root(&cwd).unwrap_or(cwd)
}

/// Default configuration path: `.travis.yml` at the repository root
/// containing `start`, else in `start` itself
pub fn default_config_path(start: &Path) -> PathBuf {
    find_repo_root(start)
        .map(|root| root.join(CONFIG_FILE_NAME))
        .filter(|path| path.is_file())
        .unwrap_or_else(|| start.join(CONFIG_FILE_NAME))
}

/// Directory for per-job log files when none is given
pub fn default_log_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("cimatrix")
        .join("logs")
}

/// Private workspace directory of a job
pub fn job_dir(root: &Path, number: usize) -> PathBuf {
    root.join(format!("job-{}", number))
}

/// Recursively copy `src` into `dst`, skipping `.git` and any path in `skip`
pub fn copy_tree(src: &Path, dst: &Path, skip: &[PathBuf]) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_name() == ".git" || skip.iter().any(|s| *s == path) {
            continue;
        }
        let target = dst.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            copy_tree(&path, &target, skip)?;
        } else if file_type.is_file() {
            fs::copy(&path, &target)?;
        } else if file_type.is_symlink() {
            copy_symlink(&path, &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(path: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(path)?, target)
}

#[cfg(not(unix))]
fn copy_symlink(path: &Path, target: &Path) -> io::Result<()> {
    fs::copy(path, target).map(|_| ())
}
