//! Locale data keyed by language code, with a fixed fallback language.

use crate::utils::{FlowError, Logger, Result};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_LANG: &str = "en";

static MISSING: Value = Value::Null;

#[derive(Debug, Clone)]
pub struct LocaleTable {
    entries: HashMap<String, Value>,
    default_lang: String,
}

impl LocaleTable {
    /// Fails unless the default language has a non-empty entry, so lookups
    /// can always fall back to it.
    pub fn new(entries: HashMap<String, Value>, default_lang: impl Into<String>) -> Result<Self> {
        let default_lang = default_lang.into();
        match entries.get(&default_lang) {
            Some(Value::Object(map)) if !map.is_empty() => {}
            Some(_) => {
                return Err(FlowError::config(format!(
                    "locale '{}' must be a non-empty object",
                    default_lang
                )))
            }
            None => {
                return Err(FlowError::config(format!(
                    "default locale '{}' is missing",
                    default_lang
                )))
            }
        }
        Ok(Self {
            entries,
            default_lang,
        })
    }

    /// Reads every `<code>.json` file of `dir` as the entry for `<code>`.
    pub fn load_dir(dir: &Path, default_lang: &str) -> Result<Self> {
        let mut entries = HashMap::new();

        for entry in std::fs::read_dir(dir).map_err(|e| FlowError::transform_io(dir, e))? {
            let path = entry.map_err(FlowError::Io)?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(code) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };

            let content =
                std::fs::read_to_string(&path).map_err(|e| FlowError::transform_io(&path, e))?;
            let value: Value = serde_json::from_str(&content).map_err(|e| {
                FlowError::config(format!("invalid locale file {}: {}", path.display(), e))
            })?;
            Logger::debug(&format!("🌐 Loaded locale '{}'", code));
            entries.insert(code.to_string(), value);
        }

        Self::new(entries, default_lang)
    }

    pub fn default_lang(&self) -> &str {
        &self.default_lang
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// The entry for `lang`, or the default language's entry.
    pub fn get(&self, lang: &str) -> &Value {
        self.entries
            .get(lang)
            .or_else(|| self.entries.get(&self.default_lang))
            .unwrap_or(&MISSING)
    }
}

/// The process-wide language selection. The only write path is
/// [`LocaleContext::set_lang`].
#[derive(Debug)]
pub struct LocaleContext {
    lang: RwLock<String>,
}

impl LocaleContext {
    pub fn new(lang: impl Into<String>) -> Self {
        Self {
            lang: RwLock::new(lang.into()),
        }
    }

    pub fn lang(&self) -> String {
        self.lang.read().clone()
    }

    pub fn set_lang(&self, lang: impl Into<String>) {
        *self.lang.write() = lang.into();
    }
}

impl Default for LocaleContext {
    fn default() -> Self {
        Self::new(DEFAULT_LANG)
    }
}

/// Locale data for the selected language. Unknown codes never fail.
pub fn resolve_locale<'a>(table: &'a LocaleTable, context: &LocaleContext) -> &'a Value {
    table.get(&context.lang())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table() -> LocaleTable {
        let mut entries = HashMap::new();
        entries.insert("en".to_string(), json!({"toolbar": {"undo": "Undo"}}));
        entries.insert("zh".to_string(), json!({"toolbar": {"undo": "撤销"}}));
        LocaleTable::new(entries, DEFAULT_LANG).unwrap()
    }

    #[test]
    fn known_language_is_selected() {
        let context = LocaleContext::new("zh");
        assert_eq!(resolve_locale(&table(), &context)["toolbar"]["undo"], "撤销");
    }

    #[test]
    fn unknown_language_falls_back_to_default() {
        let table = table();
        let context = LocaleContext::default();
        context.set_lang("fr");
        let data = resolve_locale(&table, &context);
        assert_eq!(data["toolbar"]["undo"], "Undo");
        assert!(data.as_object().is_some_and(|map| !map.is_empty()));
    }

    #[test]
    fn missing_default_is_rejected() {
        let mut entries = HashMap::new();
        entries.insert("zh".to_string(), json!({"a": 1}));
        assert!(matches!(LocaleTable::new(entries, "en"), Err(FlowError::Config(_))));

        let mut empty = HashMap::new();
        empty.insert("en".to_string(), json!({}));
        assert!(LocaleTable::new(empty, "en").is_err());
    }

    #[test]
    fn loads_json_files_from_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("en.json"), r#"{"ok": "OK"}"#).unwrap();
        std::fs::write(dir.path().join("zh.json"), r#"{"ok": "确定"}"#).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let table = LocaleTable::load_dir(dir.path(), "en").unwrap();
        let mut languages: Vec<&str> = table.languages().collect();
        languages.sort();
        assert_eq!(languages, vec!["en", "zh"]);
        assert_eq!(table.get("zh")["ok"], "确定");
    }
}
