use std::{
    hash::{DefaultHasher, Hash, Hasher},
    sync::Arc,
};

use parking_lot::Mutex;

use crate::{error::IpcError, BLANK_WINDOW_NAME};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    Main,
    Satellite,
    Minimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowEntry {
    pub label: String,
    pub name: String,
    pub kind: WindowKind,
    pub zoom: f64,
}

impl WindowEntry {
    pub fn new(label: impl Into<String>, name: impl Into<String>, kind: WindowKind) -> Self {
        Self {
            label: label.into(),
            name: name.into(),
            kind,
            zoom: 1.0,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        is_anonymous_name(&self.name)
    }
}

pub fn is_anonymous_name(name: &str) -> bool {
    name.is_empty() || name == BLANK_WINDOW_NAME
}

/// Window label derived from a logical window name. Anonymous windows always
/// get a fresh label; names that needed rewriting get a hash suffix so two
/// different names never share a label.
pub fn label_for_name(name: &str) -> String {
    if is_anonymous_name(name) {
        return format!("blank-{}", uuid::Uuid::new_v4().simple());
    }
    let sanitized: String = name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '-'
            }
        })
        .collect();
    if sanitized == name {
        return format!("window-{sanitized}");
    }
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    format!("window-{sanitized}-{:08x}", hasher.finish() as u32)
}

#[derive(Debug, Default)]
pub struct WindowRegistry {
    entries: Vec<WindowEntry>,
}

pub type SharedWindowRegistry = Arc<Mutex<WindowRegistry>>;

impl WindowRegistry {
    pub fn shared() -> SharedWindowRegistry {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Adds a window. Labels must be unique, and so must non-anonymous names.
    pub fn register(&mut self, entry: WindowEntry) -> Result<(), String> {
        if self.by_label(&entry.label).is_some() {
            return Err(format!("window '{}' is already registered", entry.label));
        }
        if !entry.is_anonymous() {
            if let Some(existing) = self.find(&entry.name) {
                return Err(format!(
                    "a window named '{}' is already open as '{}'",
                    entry.name, existing.label
                ));
            }
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Removes a window. The main window is never removed.
    pub fn unregister(&mut self, label: &str) -> Option<WindowEntry> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.label == label && entry.kind != WindowKind::Main)?;
        Some(self.entries.remove(index))
    }

    pub fn find(&self, name: &str) -> Option<&WindowEntry> {
        if is_anonymous_name(name) {
            return None;
        }
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn by_label(&self, label: &str) -> Option<&WindowEntry> {
        self.entries.iter().find(|entry| entry.label == label)
    }

    pub fn main(&self) -> Option<&WindowEntry> {
        self.entries
            .iter()
            .find(|entry| entry.kind == WindowKind::Main)
    }

    /// Maps the sender of a desktop callback back to its registered window.
    pub fn resolve_sender(&self, message: &str, label: &str) -> Result<WindowEntry, IpcError> {
        self.by_label(label)
            .cloned()
            .ok_or_else(|| IpcError::UnregisteredSender {
                message: message.to_string(),
                label: label.to_string(),
            })
    }

    /// Labels of every window other than `keep_label`, in opening order.
    pub fn labels_except(&self, keep_label: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.label != keep_label)
            .map(|entry| entry.label.clone())
            .collect()
    }

    pub fn set_zoom(&mut self, label: &str, zoom: f64) -> bool {
        match self.entries.iter_mut().find(|entry| entry.label == label) {
            Some(entry) => {
                entry.zoom = zoom;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
