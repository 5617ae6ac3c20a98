use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use directories_next::ProjectDirs;

pub const ENV_CONFIG_DIR: &str = "SURFPROBE_CONFIG_DIR";
pub const CONFIG_FILE: &str = "surface.toml";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "GlSurface";
const APPLICATION: &str = "Surfprobe";

/// Directory searched for [`CONFIG_FILE`].
pub fn config_dir() -> Result<PathBuf> {
    if let Some(value) = env_override(ENV_CONFIG_DIR) {
        return Ok(value);
    }

    let project_dirs = ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
        .ok_or_else(|| anyhow!("failed to determine user directories"))?;
    Ok(project_dirs.config_dir().to_path_buf())
}

/// Picks the configuration file to load.
///
/// An explicit path is returned as-is so a missing file surfaces as a load
/// error; a discovered path is only returned when it exists.
pub fn resolve_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        return Ok(Some(path.to_path_buf()));
    }

    let candidate = config_dir()?.join(CONFIG_FILE);
    if candidate.is_file() {
        Ok(Some(candidate))
    } else {
        tracing::debug!(path = %candidate.display(), "no surface config found; using defaults");
        Ok(None)
    }
}

fn env_override(name: &str) -> Option<PathBuf> {
    match env::var_os(name) {
        Some(value) if !value.as_os_str().is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::fs;
    use std::sync::{Mutex, OnceLock};
    use tempfile::TempDir;

    fn env_lock() -> &'static Mutex<()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    struct EnvGuard {
        key: &'static str,
        previous: Option<OsString>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: &Path) -> Self {
            let previous = env::var_os(key);
            env::set_var(key, value);
            Self { key, previous }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = self.previous.take() {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    #[test]
    fn env_override_takes_precedence() {
        let _guard = env_lock().lock().unwrap();
        let root = TempDir::new().unwrap();
        let _config_guard = EnvGuard::set(ENV_CONFIG_DIR, root.path());

        assert_eq!(config_dir().unwrap(), root.path());
    }

    #[test]
    fn discovered_file_must_exist() {
        let _guard = env_lock().lock().unwrap();
        let root = TempDir::new().unwrap();
        let _config_guard = EnvGuard::set(ENV_CONFIG_DIR, root.path());

        assert_eq!(resolve_config_file(None).unwrap(), None);

        let path = root.path().join(CONFIG_FILE);
        fs::write(&path, "version = 1\n").unwrap();
        assert_eq!(resolve_config_file(None).unwrap(), Some(path));
    }

    #[test]
    fn explicit_path_is_returned_even_if_missing() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("elsewhere.toml");
        assert_eq!(resolve_config_file(Some(&path)).unwrap(), Some(path));
    }
}
