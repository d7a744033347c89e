// ============================================================================
// Settings: key=value config file in the platform config directory
// ============================================================================

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::gemini::{ClientConfig, DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS, ImageSize};
use crate::log_warn;
use crate::ops::guide::GuideMode;

/// Environment variables consulted for the API key, in order.
pub const API_KEY_ENV_VARS: &[&str] = &["GEMINI_API_KEY", "API_KEY"];

#[derive(Clone, Debug, PartialEq)]
pub struct AppSettings {
    /// Stored key. Empty = fall back to the environment.
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub image_size: ImageSize,
    pub guide_mode: GuideMode,
    pub timeout_secs: u64,
    /// Ask before "Start Over" throws the workspace away.
    pub confirm_on_reset: bool,
    pub dark_mode: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            image_size: ImageSize::TwoK,
            guide_mode: GuideMode::VisualGuide,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            confirm_on_reset: true,
            dark_mode: true,
        }
    }
}

impl AppSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/textinpaint/textinpaint_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\TextInpaint\textinpaint_settings.cfg
    /// On macOS:   ~/Library/Application Support/TextInpaint/textinpaint_settings.cfg
    pub(crate) fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("textinpaint");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("textinpaint_settings.cfg"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            let config_dir = PathBuf::from(appdata).join("TextInpaint");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("textinpaint_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            let config_dir = PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("TextInpaint");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("textinpaint_settings.cfg"));
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join("textinpaint_settings.cfg")))
        }
    }

    fn to_config_string(&self) -> String {
        format!(
            "api_key={}\n\
             model={}\n\
             endpoint={}\n\
             image_size={}\n\
             guide_mode={}\n\
             timeout_secs={}\n\
             confirm_on_reset={}\n\
             dark_mode={}\n",
            self.api_key,
            self.model,
            self.endpoint,
            self.image_size.as_str(),
            self.guide_mode.key(),
            self.timeout_secs,
            self.confirm_on_reset,
            self.dark_mode,
        )
    }

    fn from_config_str(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "api_key" => s.api_key = val.to_string(),
                "model" if !val.is_empty() => s.model = val.to_string(),
                "endpoint" if !val.is_empty() => s.endpoint = val.to_string(),
                "image_size" => s.image_size = ImageSize::parse(val).unwrap_or_default(),
                "guide_mode" => s.guide_mode = GuideMode::from_key(val).unwrap_or_default(),
                "timeout_secs" => s.timeout_secs = val.parse().unwrap_or(DEFAULT_TIMEOUT_SECS),
                "confirm_on_reset" => s.confirm_on_reset = val == "true",
                "dark_mode" => s.dark_mode = val == "true",
                _ => {}
            }
        }
        s
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_config_string())
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_config_str(&content),
            Err(_) => Self::default(),
        }
    }

    /// Save settings to disk
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = self.save_to(&path) {
            log_warn!("Could not write settings to {}: {}", path.display(), e);
        }
    }

    /// Load settings from disk (returns default if file missing or corrupt)
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Resolve the key: explicit override, stored key, then the environment.
    pub fn resolve_api_key(&self, cli: Option<&str>) -> Option<String> {
        self.resolve_api_key_with(cli, |name| std::env::var(name).ok())
    }

    pub fn resolve_api_key_with(
        &self,
        cli: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Option<String> {
        let non_empty = |s: &str| {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        };
        cli.and_then(non_empty)
            .or_else(|| non_empty(self.api_key.as_str()))
            .or_else(|| {
                API_KEY_ENV_VARS
                    .iter()
                    .find_map(|&name| env(name).as_deref().and_then(non_empty))
            })
    }

    pub fn client_config(&self, api_key: String) -> ClientConfig {
        ClientConfig {
            api_key,
            model: self.model.clone(),
            endpoint: self.endpoint.clone(),
            image_size: self.image_size,
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.cfg");
        let s = AppSettings {
            api_key: "abc".into(),
            image_size: ImageSize::FourK,
            guide_mode: GuideMode::BinaryMask,
            timeout_secs: 30,
            confirm_on_reset: false,
            ..Default::default()
        };
        s.save_to(&path).unwrap();
        assert_eq!(AppSettings::load_from(&path), s);
    }

    #[test]
    fn missing_or_corrupt_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(AppSettings::load_from(&dir.path().join("nope")), AppSettings::default());

        let s = AppSettings::from_config_str("garbage\nimage_size=9K\ntimeout_secs=soon\nmodel=\n");
        assert_eq!(s.image_size, ImageSize::TwoK);
        assert_eq!(s.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(s.model, DEFAULT_MODEL);
    }

    #[test]
    fn api_key_precedence() {
        let env = |name: &str| match name {
            "GEMINI_API_KEY" => Some("from-gemini-env".to_string()),
            "API_KEY" => Some("from-api-env".to_string()),
            _ => None,
        };
        let mut s = AppSettings::default();
        assert_eq!(s.resolve_api_key_with(None, env).as_deref(), Some("from-gemini-env"));
        assert_eq!(
            s.resolve_api_key_with(None, |n| (n == "API_KEY").then(|| "fallback".to_string())).as_deref(),
            Some("fallback")
        );
        s.api_key = "stored".into();
        assert_eq!(s.resolve_api_key_with(None, env).as_deref(), Some("stored"));
        assert_eq!(s.resolve_api_key_with(Some("cli"), env).as_deref(), Some("cli"));
        assert_eq!(s.resolve_api_key_with(Some("  "), env).as_deref(), Some("stored"));

        let empty = AppSettings::default();
        assert_eq!(empty.resolve_api_key_with(None, |_| None), None);
    }

    #[test]
    fn client_config_carries_settings() {
        let s = AppSettings { model: "m".into(), timeout_secs: 0, ..Default::default() };
        let cfg = s.client_config("k".into());
        assert_eq!(cfg.model, "m");
        assert_eq!(cfg.timeout, Duration::from_secs(1));
    }
}
