//! Variables shown by the connection error page.

use std::collections::BTreeMap;

pub const RETRY_URL_VAR: &str = "retry_url";
pub const LAUNCH_FAILED_VAR: &str = "launch_failed";
pub const PROCESS_OUTPUT_VAR: &str = "process_output";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorPageData {
    vars: BTreeMap<String, String>,
}

impl ErrorPageData {
    pub fn for_unreachable_session(retry_url: &str) -> Self {
        let mut data = Self::default();
        data.insert(RETRY_URL_VAR, retry_url);
        data
    }

    pub fn for_boot_failure(retry_url: &str, message: &str, process_output: &str) -> Self {
        let mut data = Self::for_unreachable_session(retry_url);
        data.insert(LAUNCH_FAILED_VAR, message);
        data.insert(PROCESS_OUTPUT_VAR, process_output);
        data
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        self.vars.insert(name.to_string(), value.to_string());
    }

    /// Escaped value of `name`, or an empty string when it was never set.
    pub fn resolve(&self, name: &str) -> String {
        self.vars
            .get(name)
            .map(|value| escape_html(value))
            .unwrap_or_default()
    }
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
