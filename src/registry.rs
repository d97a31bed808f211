//! Backup-script discovery.
//!
//! Scripts live in one flat directory. Anything executable there is a
//! candidate; non-executable files (READMEs, editor droppings) are skipped
//! silently. Discovery never reads script contents - that is the hook
//! runner's job.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::{Result, VaultrunError};

/// Enumerates candidate backup scripts in the configured directory.
pub struct ScriptRegistry {
    dir: PathBuf,
}

impl ScriptRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory this registry scans.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Return candidate script paths, sorted by file name for a stable order.
    ///
    /// With a name filter, the named file must exist and be executable; a
    /// missing named script is a fatal configuration error. Without a filter,
    /// an empty (or absent) directory simply yields no candidates.
    pub fn discover(&self, filter: Option<&str>) -> Result<Vec<PathBuf>> {
        if let Some(name) = filter {
            let path = self.dir.join(name);
            if !path.is_file() || !is_executable(&path) {
                return Err(VaultrunError::script(format!(
                    "Backup script not found or not executable: {}",
                    path.display()
                )));
            }
            return Ok(vec![path]);
        }

        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("Scripts directory {} does not exist", self.dir.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut scripts = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if !is_executable(&path) {
                log::debug!("Skipping non-executable file {}", path.display());
                continue;
            }
            scripts.push(path);
        }
        scripts.sort();
        Ok(scripts)
    }
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_script(dir: &Path, name: &str, mode: u32) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, "files=\"\"\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn test_discover_skips_non_executable() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "data.sh", 0o755);
        write_script(dir.path(), "README", 0o644);

        let registry = ScriptRegistry::new(dir.path());
        let scripts = registry.discover(None).unwrap();
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].ends_with("data.sh"));
    }

    #[test]
    fn test_discover_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "zz.sh", 0o755);
        write_script(dir.path(), "aa.sh", 0o755);

        let registry = ScriptRegistry::new(dir.path());
        let scripts = registry.discover(None).unwrap();
        assert!(scripts[0].ends_with("aa.sh"));
        assert!(scripts[1].ends_with("zz.sh"));
    }

    #[test]
    fn test_discover_named_missing_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ScriptRegistry::new(dir.path());
        let err = registry.discover(Some("nope.sh")).unwrap_err();
        assert!(err.to_string().contains("nope.sh"));
    }

    #[test]
    fn test_discover_named_present() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "etc.sh", 0o755);

        let registry = ScriptRegistry::new(dir.path());
        let scripts = registry.discover(Some("etc.sh")).unwrap();
        assert_eq!(scripts.len(), 1);
    }

    #[test]
    fn test_discover_empty_dir_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ScriptRegistry::new(dir.path());
        assert!(registry.discover(None).unwrap().is_empty());
    }

    #[test]
    fn test_discover_missing_dir_is_not_an_error() {
        let registry = ScriptRegistry::new("/nonexistent/vaultrun.d");
        assert!(registry.discover(None).unwrap().is_empty());
    }
}
