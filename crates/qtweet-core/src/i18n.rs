//! Localized strings.
//!
//! Catalogs are flat `key → template` JSON objects compiled into the binary.
//! Templates use `{name}` placeholders. Lookup falls back to the default
//! language, then to the key itself, so an unknown key or language never
//! fails.

use std::collections::HashMap;

use tracing::warn;

const BUILTIN_CATALOGS: &[(&str, &str)] = &[
    ("en", include_str!("../locales/en.json")),
    ("fr", include_str!("../locales/fr.json")),
];

/// Default language used when a guild never chose one.
pub const DEFAULT_LANG: &str = "en";

pub struct Localizer {
    catalogs: HashMap<String, HashMap<String, String>>,
    fallback: String,
}

impl Localizer {
    /// Localizer over the catalogs shipped with the crate.
    pub fn builtin() -> Self {
        let mut catalogs = HashMap::new();
        for (lang, raw) in BUILTIN_CATALOGS {
            match serde_json::from_str::<HashMap<String, String>>(raw) {
                Ok(table) => {
                    catalogs.insert(lang.to_string(), table);
                }
                Err(e) => warn!(lang = %lang, error = %e, "invalid language catalog, skipping"),
            }
        }
        Self::from_catalogs(catalogs, DEFAULT_LANG)
    }

    pub fn from_catalogs(
        catalogs: HashMap<String, HashMap<String, String>>,
        fallback: impl Into<String>,
    ) -> Self {
        Self {
            catalogs,
            fallback: fallback.into(),
        }
    }

    /// Use `lang` as the fallback language. Ignored (with a warning) when no
    /// catalog exists for it.
    pub fn with_fallback(mut self, lang: &str) -> Self {
        if self.has_language(lang) {
            self.fallback = lang.to_string();
        } else {
            warn!(lang = %lang, fallback = %self.fallback, "no catalog for default language, keeping fallback");
        }
        self
    }

    /// Language used when a lookup misses.
    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    pub fn translate(&self, lang: &str, key: &str) -> String {
        self.translate_with(lang, key, &[])
    }

    /// Look up `key` in `lang` and substitute `{name}` placeholders.
    pub fn translate_with(&self, lang: &str, key: &str, params: &[(&str, &str)]) -> String {
        let template = self
            .lookup(lang, key)
            .or_else(|| self.lookup(&self.fallback, key));

        let mut text = match template {
            Some(t) => t.to_string(),
            None => {
                warn!(lang = %lang, key = %key, "missing translation");
                key.to_string()
            }
        };

        for (name, value) in params {
            text = text.replace(&format!("{{{name}}}"), value);
        }
        text
    }

    pub fn has_language(&self, lang: &str) -> bool {
        self.catalogs.contains_key(lang)
    }

    /// Available language codes, sorted.
    pub fn languages(&self) -> Vec<String> {
        let mut langs: Vec<String> = self.catalogs.keys().cloned().collect();
        langs.sort();
        langs
    }

    fn lookup(&self, lang: &str, key: &str) -> Option<&str> {
        self.catalogs
            .get(lang)
            .and_then(|table| table.get(key))
            .map(String::as_str)
    }
}

impl Default for Localizer {
    fn default() -> Self {
        Self::builtin()
    }
}
