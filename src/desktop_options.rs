//! Persisted shell preferences plus environment overrides.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    append_desktop_log, CONFIG_FILE_ENV, DEFAULT_SESSION_HOST, SESSION_ARGS_ENV, SESSION_PATH_ENV,
};

const OPTIONS_FILE_NAME: &str = "desktop_options.json";
const ZOOM_LEVEL_FIELD: &str = "zoomLevel";
const FIXED_WIDTH_FONT_FIELD: &str = "fixedWidthFont";
const ENABLE_ACCESSIBILITY_FIELD: &str = "enableAccessibility";

#[cfg(windows)]
const DEFAULT_SESSION_BINARY: &str = "rsession.exe";
#[cfg(not(windows))]
const DEFAULT_SESSION_BINARY: &str = "rsession";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DesktopOptions {
    pub session_path: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub session_host: String,
    pub session_args: Vec<String>,
    pub max_reload_attempts: u32,
    pub reachability_attempts: u32,
    pub reachability_interval_ms: u64,
    pub reachability_timeout_ms: u64,
    pub prompt_on_quit: bool,
    pub zoom_level: f64,
    pub fixed_width_font: Option<String>,
    pub enable_accessibility: bool,
}

impl Default for DesktopOptions {
    fn default() -> Self {
        Self {
            session_path: None,
            config_file: None,
            session_host: DEFAULT_SESSION_HOST.to_string(),
            session_args: Vec::new(),
            max_reload_attempts: 1,
            reachability_attempts: 10,
            reachability_interval_ms: 200,
            reachability_timeout_ms: 1000,
            prompt_on_quit: false,
            zoom_level: 1.0,
            fixed_width_font: None,
            enable_accessibility: false,
        }
    }
}

impl DesktopOptions {
    /// Applies `WORKBENCH_*` overrides. `lookup` is `env::var` outside tests.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(path) = non_empty(SESSION_PATH_ENV) {
            self.session_path = Some(PathBuf::from(path));
        }
        if let Some(path) = non_empty(CONFIG_FILE_ENV) {
            self.config_file = Some(PathBuf::from(path));
        }
        if let Some(raw) = non_empty(SESSION_ARGS_ENV) {
            self.session_args = shlex::split(&raw)
                .ok_or_else(|| format!("{SESSION_ARGS_ENV} is not a valid argument list: {raw}"))?;
        }
        Ok(())
    }

    /// Session binary to launch; defaults to one next to the shell executable.
    pub fn resolved_session_path(&self) -> PathBuf {
        if let Some(path) = &self.session_path {
            return path.clone();
        }
        env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .map(|dir| dir.join(DEFAULT_SESSION_BINARY))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_BINARY))
    }
}

pub fn options_path(root_dir: Option<&Path>) -> Option<PathBuf> {
    root_dir.map(|root| root.join("data").join(OPTIONS_FILE_NAME))
}

pub fn read_options(path: &Path) -> DesktopOptions {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return DesktopOptions::default()
        }
        Err(error) => {
            append_desktop_log(&format!(
                "failed to read desktop options {}: {}. using defaults",
                path.display(),
                error
            ));
            return DesktopOptions::default();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(options) => options,
        Err(error) => {
            append_desktop_log(&format!(
                "failed to parse desktop options {}: {}. using defaults",
                path.display(),
                error
            ));
            DesktopOptions::default()
        }
    }
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Merges one field into the options file, leaving the other keys untouched.
fn persist_field(path: &Path, field: &str, value: Value) -> Result<(), String> {
    if let Some(parent_dir) = path.parent() {
        fs::create_dir_all(parent_dir).map_err(|error| {
            format!(
                "Failed to create desktop options directory {}: {}",
                parent_dir.display(),
                error
            )
        })?;
    }

    let parsed = match fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(value) => value,
            Err(error) => {
                append_desktop_log(&format!(
                    "failed to parse desktop options {}: {}. resetting options file",
                    path.display(),
                    error
                ));
                Value::Null
            }
        },
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Value::Null,
        Err(error) => {
            return Err(format!(
                "Failed to read desktop options {}: {}",
                path.display(),
                error
            ));
        }
    };
    let mut object = into_object(parsed);
    object.insert(field.to_string(), value);

    let serialized = serde_json::to_string_pretty(&Value::Object(object))
        .map_err(|error| format!("Failed to serialize desktop options: {error}"))?;
    fs::write(path, serialized).map_err(|error| {
        format!(
            "Failed to write desktop options {}: {}",
            path.display(),
            error
        )
    })
}

/// Effective options for this run. Preference setters also persist the
/// changed field; environment overrides are never written back.
#[derive(Debug)]
pub struct OptionsStore {
    path: Option<PathBuf>,
    current: RwLock<DesktopOptions>,
}

impl OptionsStore {
    pub fn new(path: Option<PathBuf>, options: DesktopOptions) -> Self {
        Self {
            path,
            current: RwLock::new(options),
        }
    }

    pub fn load(root_dir: Option<&Path>) -> Result<Self, String> {
        let path = options_path(root_dir);
        let mut options = path
            .as_deref()
            .map(read_options)
            .unwrap_or_default();
        options.apply_env_overrides(|key| env::var(key).ok())?;
        Ok(Self::new(path, options))
    }

    pub fn snapshot(&self) -> DesktopOptions {
        self.current.read().clone()
    }

    pub fn zoom_level(&self) -> f64 {
        self.current.read().zoom_level
    }

    pub fn fixed_width_font(&self) -> Option<String> {
        self.current.read().fixed_width_font.clone()
    }

    pub fn enable_accessibility(&self) -> bool {
        self.current.read().enable_accessibility
    }

    pub fn set_zoom_level(&self, zoom_level: f64) -> Result<(), String> {
        self.current.write().zoom_level = zoom_level;
        self.persist(ZOOM_LEVEL_FIELD, Value::from(zoom_level))
    }

    pub fn set_fixed_width_font(&self, font: &str) -> Result<(), String> {
        self.current.write().fixed_width_font = Some(font.to_string());
        self.persist(FIXED_WIDTH_FONT_FIELD, Value::from(font))
    }

    pub fn set_enable_accessibility(&self, enabled: bool) -> Result<(), String> {
        self.current.write().enable_accessibility = enabled;
        self.persist(ENABLE_ACCESSIBILITY_FIELD, Value::from(enabled))
    }

    fn persist(&self, field: &str, value: Value) -> Result<(), String> {
        let Some(path) = &self.path else {
            append_desktop_log("desktop options path is unavailable; skipping persistence");
            return Ok(());
        };
        persist_field(path, field, value)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| values.get(key).cloned()
    }

    #[test]
    fn read_options_falls_back_to_defaults_for_missing_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let options = read_options(&dir.path().join("missing.json"));
        assert_eq!(options, DesktopOptions::default());
        assert_eq!(options.max_reload_attempts, 1);
        assert_eq!(options.reachability_attempts, 10);
    }

    #[test]
    fn read_options_fills_unspecified_fields_with_defaults() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("options.json");
        fs::write(&path, r#"{"promptOnQuit": true, "zoomLevel": 1.5}"#).expect("write options");

        let options = read_options(&path);

        assert!(options.prompt_on_quit);
        assert_eq!(options.zoom_level, 1.5);
        assert_eq!(options.session_host, DEFAULT_SESSION_HOST);
    }

    #[test]
    fn read_options_ignores_malformed_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("options.json");
        fs::write(&path, "{not json").expect("write options");
        assert_eq!(read_options(&path), DesktopOptions::default());
    }

    #[test]
    fn apply_env_overrides_splits_session_args() {
        let mut options = DesktopOptions::default();
        options
            .apply_env_overrides(lookup_from(&[
                (SESSION_PATH_ENV, "/opt/workbench/bin/rsession"),
                (CONFIG_FILE_ENV, "  "),
                (SESSION_ARGS_ENV, "--log-level debug --title 'my session'"),
            ]))
            .expect("apply overrides");

        assert_eq!(
            options.session_path,
            Some(PathBuf::from("/opt/workbench/bin/rsession"))
        );
        assert_eq!(options.config_file, None);
        assert_eq!(
            options.session_args,
            vec!["--log-level", "debug", "--title", "my session"]
        );
        assert_eq!(
            options.resolved_session_path(),
            PathBuf::from("/opt/workbench/bin/rsession")
        );
    }

    #[test]
    fn apply_env_overrides_rejects_unbalanced_quotes() {
        let mut options = DesktopOptions::default();
        let result = options.apply_env_overrides(lookup_from(&[(SESSION_ARGS_ENV, "'open")]));
        assert!(result.is_err());
    }

    #[test]
    fn setters_persist_single_field_and_keep_other_keys() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("data").join(OPTIONS_FILE_NAME);
        fs::create_dir_all(path.parent().expect("parent")).expect("create data dir");
        fs::write(&path, r#"{"sessionHost": "localhost", "custom": 7}"#).expect("write options");

        let store = OptionsStore::new(Some(path.clone()), read_options(&path));
        store.set_zoom_level(1.25).expect("persist zoom");
        store
            .set_fixed_width_font("Fira Code")
            .expect("persist font");

        let written: Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read options"))
                .expect("parse options");
        assert_eq!(written["zoomLevel"], Value::from(1.25));
        assert_eq!(written["fixedWidthFont"], Value::from("Fira Code"));
        assert_eq!(written["custom"], Value::from(7));
        assert_eq!(written["sessionHost"], Value::from("localhost"));
        assert_eq!(store.zoom_level(), 1.25);
        assert_eq!(store.fixed_width_font().as_deref(), Some("Fira Code"));
    }

    #[test]
    fn setters_reset_non_object_options_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join(OPTIONS_FILE_NAME);
        fs::write(&path, "[1, 2, 3]").expect("write options");

        let store = OptionsStore::new(Some(path.clone()), DesktopOptions::default());
        store
            .set_enable_accessibility(true)
            .expect("persist accessibility");

        let written: Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read options"))
                .expect("parse options");
        assert_eq!(written, serde_json::json!({ "enableAccessibility": true }));
    }
}
