use crate::error::Result;
use directories::ProjectDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

// Global cache for the loaded settings
static SETTINGS_CACHE: OnceLock<Settings> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Geo-located mirror list; `{country}` lists live next to it as `CC.txt`
    pub mirror_list_url: String,
    pub launchpad_url: String,
    pub probe_timeout_ms: u64,
    pub concurrency: usize,
    pub sources_path: PathBuf,
    pub output_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mirror_list_url: "http://mirrors.ubuntu.com/mirrors.txt".to_string(),
            launchpad_url: "https://launchpad.net/ubuntu/+archivemirrors".to_string(),
            probe_timeout_ms: 2500,
            concurrency: 64,
            sources_path: PathBuf::from("/etc/apt/sources.list"),
            output_path: PathBuf::from("sources.list"),
        }
    }
}

impl Settings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Mirror list for one country, e.g. `http://mirrors.ubuntu.com/DE.txt`
    pub fn country_list_url(&self, country: &str) -> String {
        let base = self
            .mirror_list_url
            .rsplit_once('/')
            .map(|(base, _)| base)
            .unwrap_or(&self.mirror_list_url);
        format!("{}/{}.txt", base, country.to_uppercase())
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn from_file(path: &Path) -> Option<Self> {
        let content = fs::read_to_string(path).ok()?;
        match Self::from_toml(&content) {
            Ok(settings) => Some(settings),
            Err(e) => {
                warn!(path = ?path, error = %e, "ignoring invalid settings file");
                None
            }
        }
    }
}

/// Load settings once per run
/// Strategy:
/// 1. Try the user config (~/.config/mirrorpick/settings.toml)
/// 2. Fallback to built-in defaults
pub fn settings() -> &'static Settings {
    SETTINGS_CACHE.get_or_init(|| {
        if let Some(proj_dirs) = ProjectDirs::from("", "", "mirrorpick") {
            let config_path = proj_dirs.config_dir().join("settings.toml");
            if let Some(settings) = Settings::from_file(&config_path) {
                debug!(path = ?config_path, "loaded settings");
                return settings;
            }
        }
        Settings::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_file_keeps_defaults() -> Result<()> {
        let settings = Settings::from_toml("concurrency = 8\nprobe_timeout_ms = 1000\n")?;
        assert_eq!(settings.concurrency, 8);
        assert_eq!(settings.probe_timeout(), Duration::from_millis(1000));
        assert_eq!(settings.launchpad_url, Settings::default().launchpad_url);
        assert_eq!(settings.output_path, PathBuf::from("sources.list"));
        Ok(())
    }

    #[test]
    fn test_invalid_file_is_ignored() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("settings.toml");
        fs::write(&path, "concurrency = \"lots\"")?;
        assert!(Settings::from_file(&path).is_none());
        assert!(Settings::from_file(&dir.path().join("missing.toml")).is_none());
        Ok(())
    }

    #[test]
    fn test_country_list_url() {
        let settings = Settings::default();
        assert_eq!(
            settings.country_list_url("de"),
            "http://mirrors.ubuntu.com/DE.txt"
        );
    }
}
