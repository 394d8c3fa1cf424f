use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "mrmusic";
const STORAGE_DIR: &str = "storage";
const LOG_DIR: &str = "logs";

pub const CONFIG_DIR_VAR: &str = "MRMUSIC_CONFIG_DIR";
pub const CATALOG_VAR: &str = "MRMUSIC_CATALOG";
pub const EXPORT_DIR_VAR: &str = "MRMUSIC_EXPORT_DIR";
pub const PREFIX_PATH_VAR: &str = "PREFIX_PATH";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub config_root: PathBuf,
    pub catalog_path: Option<PathBuf>,
    pub export_dir: PathBuf,
    pub prefix_path: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let config_root = match non_empty(CONFIG_DIR_VAR) {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = non_empty("HOME")
                    .or_else(|| non_empty("USERPROFILE"))
                    .context("neither HOME nor USERPROFILE is set")?;
                PathBuf::from(home).join(".config").join(APP_DIR)
            }
        };

        let export_dir = match non_empty(EXPORT_DIR_VAR) {
            Some(dir) => PathBuf::from(dir),
            None => env::current_dir().context("failed to resolve current directory")?,
        };

        Ok(Self {
            config_root,
            catalog_path: non_empty(CATALOG_VAR).map(PathBuf::from),
            export_dir,
            prefix_path: lookup(PREFIX_PATH_VAR).unwrap_or_default(),
        })
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.config_root.join(STORAGE_DIR)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.config_root.join(LOG_DIR)
    }
}

pub fn ensure_dir(path: &Path) -> Result<PathBuf> {
    fs::create_dir_all(path).with_context(|| format!("failed to create {}", path.display()))?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn explicit_dirs_override_defaults() {
        let config = AppConfig::from_lookup(lookup_from(&[
            (CONFIG_DIR_VAR, "/tmp/mr"),
            (EXPORT_DIR_VAR, "/tmp/out"),
            (CATALOG_VAR, "/tmp/music.json"),
            (PREFIX_PATH_VAR, "/site"),
        ]))
        .expect("config");

        assert_eq!(config.config_root, PathBuf::from("/tmp/mr"));
        assert_eq!(config.storage_dir(), PathBuf::from("/tmp/mr/storage"));
        assert_eq!(config.export_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.catalog_path, Some(PathBuf::from("/tmp/music.json")));
        assert_eq!(config.prefix_path, "/site");
    }

    #[test]
    fn home_is_used_when_no_override() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("HOME", "/home/listener"),
            (EXPORT_DIR_VAR, "/tmp/out"),
        ]))
        .expect("config");

        assert_eq!(
            config.config_root,
            PathBuf::from("/home/listener/.config/mrmusic")
        );
        assert_eq!(config.catalog_path, None);
        assert_eq!(config.prefix_path, "");
    }

    #[test]
    fn missing_home_is_an_error() {
        let result = AppConfig::from_lookup(lookup_from(&[(EXPORT_DIR_VAR, "/tmp/out")]));
        assert!(result.is_err());
    }

    #[test]
    fn ensure_dir_creates_nested_paths() {
        let dir = tempdir().expect("tempdir");
        let nested = dir.path().join("a").join("b");
        ensure_dir(&nested).expect("create");
        assert!(nested.is_dir());
    }
}
