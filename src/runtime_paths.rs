use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;
use std::sync::{OnceLock, RwLock};

const APP_DIR: &str = "creator-pilot";

fn app_root_override_lock() -> &'static RwLock<Option<PathBuf>> {
    static OVERRIDE: OnceLock<RwLock<Option<PathBuf>>> = OnceLock::new();
    OVERRIDE.get_or_init(|| RwLock::new(None))
}

fn app_root_override() -> Option<PathBuf> {
    let lock = app_root_override_lock();
    let configured = match lock.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };
    configured.or_else(|| {
        std::env::var("CREATOR_PILOT_HOME")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    })
}

/// Points every runtime path at `path`; used by tests and the `--home` flag.
pub fn set_app_root_override(path: Option<PathBuf>) {
    let lock = app_root_override_lock();
    match lock.write() {
        Ok(mut guard) => *guard = path,
        Err(poisoned) => {
            let mut guard = poisoned.into_inner();
            *guard = path;
        }
    }
}

fn platform_app_root() -> PathBuf {
    if let Some(project_dirs) = ProjectDirs::from("", "", APP_DIR) {
        return project_dirs.data_dir().to_path_buf();
    }

    if let Some(base_dirs) = BaseDirs::new() {
        return base_dirs.data_local_dir().join(APP_DIR);
    }

    std::env::temp_dir().join(APP_DIR)
}

pub fn app_root() -> PathBuf {
    app_root_override().unwrap_or_else(platform_app_root)
}

pub fn secrets_dir() -> PathBuf {
    app_root().join("secrets")
}

pub fn default_db_path() -> String {
    app_root()
        .join("data")
        .join("creator-pilot.db")
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_redirects_db_and_secrets() {
        let root = std::env::temp_dir().join("creator-pilot-paths-test");
        set_app_root_override(Some(root.clone()));
        assert!(default_db_path().starts_with(root.to_string_lossy().as_ref()));
        assert_eq!(secrets_dir(), root.join("secrets"));
        set_app_root_override(None);
    }
}
