//! Cached font families for the synchronous font queries.

use std::{collections::BTreeSet, process::Command};

use parking_lot::RwLock;

use crate::logging::{log_message, DesktopLogCategory};

#[cfg(target_os = "macos")]
const MONOSPACE_DEFAULTS: &[&str] = &["Menlo", "Monaco", "Courier New"];
#[cfg(target_os = "windows")]
const MONOSPACE_DEFAULTS: &[&str] = &["Lucida Console", "Consolas", "Courier New"];
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const MONOSPACE_DEFAULTS: &[&str] = &["Ubuntu Mono", "Droid Sans Mono", "DejaVu Sans Mono", "Monospace"];

#[cfg(target_os = "macos")]
const PROPORTIONAL_DEFAULTS: &[&str] = &[
    "Lucida Grande",
    "Lucida Sans",
    "DejaVu Sans",
    "Segoe UI",
    "Verdana",
    "Helvetica",
];
#[cfg(target_os = "windows")]
const PROPORTIONAL_DEFAULTS: &[&str] = &[
    "Segoe UI",
    "Verdana",
    "Lucida Sans",
    "DejaVu Sans",
    "Lucida Grande",
    "Helvetica",
];
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const PROPORTIONAL_DEFAULTS: &[&str] = &[
    "Lucida Sans",
    "DejaVu Sans",
    "Lucida Grande",
    "Segoe UI",
    "Verdana",
    "Helvetica",
];

#[derive(Debug, Default)]
pub struct FontCatalog {
    monospace: RwLock<Vec<String>>,
    proportional: RwLock<Vec<String>>,
}

impl FontCatalog {
    pub fn replace(&self, monospace: Vec<String>, proportional: Vec<String>) {
        *self.monospace.write() = monospace;
        *self.proportional.write() = proportional;
    }

    pub fn monospace_list(&self) -> Vec<String> {
        self.monospace.read().clone()
    }

    /// The configured font wins; otherwise the first installed default.
    pub fn preferred_monospace(&self, configured: Option<&str>) -> String {
        if let Some(font) = configured.map(str::trim).filter(|font| !font.is_empty()) {
            return font.to_string();
        }
        pick_default(&self.monospace.read(), MONOSPACE_DEFAULTS)
    }

    pub fn preferred_proportional(&self) -> String {
        pick_default(&self.proportional.read(), PROPORTIONAL_DEFAULTS)
    }
}

fn pick_default(installed: &[String], defaults: &[&str]) -> String {
    defaults
        .iter()
        .find(|font| installed.iter().any(|family| family.as_str() == **font))
        .or_else(|| defaults.first())
        .map(|font| font.to_string())
        .unwrap_or_default()
}

/// Sorted, de-duplicated primary family names from `fc-list ... family` output.
pub fn parse_fc_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split(',').next())
        .map(|family| family.trim().replace("\\-", "-"))
        .filter(|family| !family.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn query_fc_list(pattern: &str) -> Vec<String> {
    match Command::new("fc-list").args([pattern, "family"]).output() {
        Ok(output) if output.status.success() => {
            parse_fc_list(&String::from_utf8_lossy(&output.stdout))
        }
        Ok(output) => {
            log_message(
                DesktopLogCategory::Startup,
                &format!("fc-list {pattern} exited with {}", output.status),
            );
            Vec::new()
        }
        Err(error) => {
            log_message(
                DesktopLogCategory::Startup,
                &format!("font enumeration unavailable: {error}"),
            );
            Vec::new()
        }
    }
}

/// Returns `(monospace, proportional)` families.
pub fn enumerate_system_fonts() -> (Vec<String>, Vec<String>) {
    if cfg!(any(target_os = "macos", target_os = "windows")) {
        return (Vec::new(), Vec::new());
    }
    (query_fc_list(":spacing=100"), query_fc_list(":spacing=0"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn parse_fc_list_keeps_primary_family_sorted_and_unique() {
        let output = "DejaVu Sans Mono,DejaVu Sans Mono Book\n\
                      Noto Mono\n\
                      DejaVu Sans Mono\n\
                      \n\
                      Fira\\-Code,Fira Code Retina\n";
        assert_eq!(
            parse_fc_list(output),
            strings(&["DejaVu Sans Mono", "Fira-Code", "Noto Mono"])
        );
    }

    #[test]
    fn preferred_monospace_uses_configured_font_first() {
        let catalog = FontCatalog::default();
        catalog.replace(strings(&["Fira Code"]), Vec::new());
        assert_eq!(catalog.preferred_monospace(Some("Fira Code")), "Fira Code");
        assert_eq!(catalog.preferred_monospace(Some("Not Installed")), "Not Installed");
    }

    #[test]
    fn preferred_fonts_fall_back_to_first_installed_default() {
        let catalog = FontCatalog::default();
        let installed_monospace = MONOSPACE_DEFAULTS[MONOSPACE_DEFAULTS.len() - 1];
        let installed_proportional = PROPORTIONAL_DEFAULTS[1];
        catalog.replace(
            strings(&["Zapf", installed_monospace]),
            strings(&[installed_proportional]),
        );

        assert_eq!(catalog.preferred_monospace(None), installed_monospace);
        assert_eq!(catalog.preferred_monospace(Some("  ")), installed_monospace);
        assert_eq!(catalog.preferred_proportional(), installed_proportional);
    }

    #[test]
    fn preferred_fonts_use_first_default_when_nothing_is_installed() {
        let catalog = FontCatalog::default();
        assert_eq!(catalog.preferred_monospace(None), MONOSPACE_DEFAULTS[0]);
        assert_eq!(catalog.preferred_proportional(), PROPORTIONAL_DEFAULTS[0]);
        assert!(catalog.monospace_list().is_empty());
    }
}
