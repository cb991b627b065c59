use std::{env, path::PathBuf};

use crate::DESKTOP_ROOT_ENV;

pub fn default_desktop_root_dir() -> Option<PathBuf> {
    if let Ok(root) = env::var(DESKTOP_ROOT_ENV) {
        let trimmed = root.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    home::home_dir().map(|home| home.join(".workbench-desktop"))
}
