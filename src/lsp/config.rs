use crate::document::{ControllerOptions, report::ErrorReporter};
use serde_json::Value;
use std::sync::Arc;

const SETTINGS_ROOT: &str = "sassyLanguageServer";

#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub enabled: bool,
    pub include_descriptions: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            include_descriptions: true,
        }
    }
}

impl CompletionConfig {
    fn apply_section(&mut self, value: &Value) {
        if let Some(enabled) = value.as_bool() {
            self.enabled = enabled;
            return;
        }
        let Some(obj) = value.as_object() else {
            return;
        };
        if let Some(enabled) = obj.get("enabled").and_then(Value::as_bool) {
            self.enabled = enabled;
        }
        if let Some(descriptions) = obj.get("includeDescriptions").and_then(Value::as_bool) {
            self.include_descriptions = descriptions;
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiagnosticsConfig {
    /// Log the item tree after each accepted parse.
    pub dump_tree: bool,
    pub log_timings: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            dump_tree: false,
            log_timings: true,
        }
    }
}

impl DiagnosticsConfig {
    fn apply_section(&mut self, value: &Value) {
        let Some(obj) = value.as_object() else {
            return;
        };
        if let Some(dump) = obj.get("dumpTree").and_then(Value::as_bool) {
            self.dump_tree = dump;
        }
        if let Some(timings) = obj.get("logTimings").and_then(Value::as_bool) {
            self.log_timings = timings;
        }
    }
}

/// Client-tunable settings. Unknown keys and ill-typed values are ignored.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    completion: CompletionConfig,
    diagnostics: DiagnosticsConfig,
}

impl ServerConfig {
    pub fn completion(&self) -> &CompletionConfig {
        &self.completion
    }

    pub fn diagnostics(&self) -> &DiagnosticsConfig {
        &self.diagnostics
    }

    pub fn apply_settings(&mut self, value: Value) {
        let root = settings_root(&value);
        if let Some(section) = section(root, "completion") {
            self.completion.apply_section(section);
        }
        if let Some(section) = section(root, "diagnostics") {
            self.diagnostics.apply_section(section);
        }
    }

    pub fn controller_options(&self, reporter: Arc<dyn ErrorReporter>) -> ControllerOptions {
        ControllerOptions {
            reporter,
            dump_tree: self.diagnostics.dump_tree,
            log_timings: self.diagnostics.log_timings,
        }
    }
}

fn settings_root(value: &Value) -> &Value {
    value
        .as_object()
        .and_then(|obj| obj.get(SETTINGS_ROOT))
        .unwrap_or(value)
}

fn section<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.as_object()?.get(key)
}
