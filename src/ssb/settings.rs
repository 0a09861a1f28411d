//! Setting definitions with defaults from defaults.json
//!
//! defaults.json is embedded at compile time so every default lives in ONE place.
//! User values come from `SSB_*` environment variables or command line overrides
//! and are validated against the registry before use.

use serde::Deserialize;
use std::collections::HashMap;

/// defaults.json embedded at compile time
const DEFAULTS_JSON: &str = include_str!("../../defaults.json");

/// Environment variable prefix for setting overrides
pub const ENV_PREFIX: &str = "SSB_";

/// Setting definition from defaults.json
#[derive(Debug, Clone, Deserialize)]
pub struct SettingDef {
    pub name: String,
    pub kind: SettingKind,
    #[serde(rename = "default", default)]
    pub default_value: String,
    #[serde(default)]
    pub description: String,
    /// For enumerated settings, the valid values
    #[serde(rename = "values", default)]
    pub valid_values: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingKind {
    String,
    Integer,
    List,
    #[serde(rename = "enum")]
    Enumerated,
}

#[derive(Deserialize)]
struct DefaultsFile {
    settings: Vec<SettingDef>,
}

/// Registry of all settings with their defaults from defaults.json
pub struct SettingRegistry {
    settings: HashMap<String, SettingDef>,
}

impl SettingRegistry {
    /// Build the registry from the embedded defaults.json
    ///
    /// # Panics
    ///
    /// When the embedded document does not match the setting schema.
    pub fn from_defaults_json() -> Self {
        let file: DefaultsFile = serde_json::from_str(DEFAULTS_JSON)
            .unwrap_or_else(|e| panic!("embedded setting defaults are unusable: {}", e));

        let settings = file
            .settings
            .into_iter()
            .map(|def| (def.name.clone(), def))
            .collect();

        Self { settings }
    }

    pub fn get_default(&self, name: &str) -> Option<&str> {
        self.settings.get(name).map(|s| s.default_value.as_str())
    }

    pub fn get_setting(&self, name: &str) -> Option<&SettingDef> {
        self.settings.get(name)
    }

    /// All setting definitions, sorted by name
    pub fn settings(&self) -> Vec<&SettingDef> {
        let mut defs: Vec<&SettingDef> = self.settings.values().collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Check if a value is valid for an enumerated setting
    pub fn is_valid_enum_value(&self, name: &str, value: &str) -> bool {
        self.settings
            .get(name)
            .and_then(|s| s.valid_values.as_ref())
            .map(|values| values.iter().any(|v| v.eq_ignore_ascii_case(value)))
            .unwrap_or(true)
    }
}

/// Global registry instance (initialized lazily)
static REGISTRY: std::sync::OnceLock<SettingRegistry> = std::sync::OnceLock::new();

/// Get the global setting registry
pub fn registry() -> &'static SettingRegistry {
    REGISTRY.get_or_init(SettingRegistry::from_defaults_json)
}

/// Environment variable name for a setting: `row.ceiling` -> `SSB_ROW_CEILING`
pub fn env_var_name(setting: &str) -> String {
    format!(
        "{}{}",
        ENV_PREFIX,
        setting.replace('.', "_").to_ascii_uppercase()
    )
}

/// Typed setting reader
///
/// Reads user values, falling back to defaults from defaults.json.
pub struct SettingReader {
    user_values: HashMap<String, String>,
}

impl SettingReader {
    /// Reader with no user values (defaults only)
    pub fn defaults() -> Self {
        Self {
            user_values: HashMap::new(),
        }
    }

    /// Reader over `SSB_*` environment variables
    pub fn from_env() -> Self {
        let user_values = registry()
            .settings()
            .into_iter()
            .filter_map(|def| {
                std::env::var(env_var_name(&def.name))
                    .ok()
                    .filter(|v| !v.is_empty())
                    .map(|v| (def.name.clone(), v))
            })
            .collect();

        Self { user_values }
    }

    /// Reader over explicit (name, value) pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::defaults().with_overrides(pairs)
    }

    /// Layer more user values on top; later values win. Empty values are ignored.
    pub fn with_overrides<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in pairs {
            let value = value.into();
            if !value.is_empty() {
                self.user_values.insert(name.into(), value);
            }
        }
        self
    }

    /// Get string setting (user value or default)
    pub fn get_string(&self, name: &str) -> String {
        if let Some(value) = self.user_values.get(name) {
            return value.clone();
        }

        registry().get_default(name).unwrap_or("").to_string()
    }

    /// Get optional string setting (None if empty)
    pub fn get_optional_string(&self, name: &str) -> Option<String> {
        let value = self.get_string(name);
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    /// Get enumerated setting, lowercased, with validation
    pub fn get_enum(&self, name: &str) -> String {
        let reg = registry();
        let default = reg.get_default(name).unwrap_or("");

        if let Some(value) = self.user_values.get(name) {
            if reg.is_valid_enum_value(name, value) {
                return value.to_lowercase();
            }
            let valid_values = reg
                .get_setting(name)
                .and_then(|s| s.valid_values.as_ref())
                .map(|v| v.join(", "))
                .unwrap_or_default();
            tracing::warn!(
                setting = name,
                value = value.as_str(),
                "Invalid value, valid values: [{}]. Using default: '{}'",
                valid_values,
                default
            );
        }

        default.to_string()
    }

    /// Get unsigned integer setting, falling back to the default on parse errors
    pub fn get_u64(&self, name: &str) -> u64 {
        let default = registry()
            .get_default(name)
            .and_then(|d| d.parse().ok())
            .unwrap_or(0);

        match self.user_values.get(name) {
            Some(value) => match value.trim().replace('_', "").parse::<u64>() {
                Ok(v) => v,
                Err(_) => {
                    tracing::warn!(
                        setting = name,
                        value = value.as_str(),
                        "Not an unsigned integer. Using default: {}",
                        default
                    );
                    default
                }
            },
            None => default,
        }
    }

    /// Get comma-separated list setting, empty entries dropped
    pub fn get_list(&self, name: &str) -> Vec<String> {
        self.get_string(name)
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_embedded_json() {
        let reader = SettingReader::defaults();
        assert_eq!(reader.get_u64("row.ceiling"), 800_000);
        assert_eq!(reader.get_u64("periods"), 5);
        assert_eq!(reader.get_enum("failure.policy"), "abort");
        assert_eq!(
            reader.get_list("classifications"),
            vec!["131", "104", "214", "231"]
        );
        assert_eq!(reader.get_optional_string("recipes.file"), None);
    }

    #[test]
    fn test_user_values_override_defaults() {
        let reader = SettingReader::from_pairs([
            ("row.ceiling", "100_000"),
            ("failure.policy", "SKIP"),
            ("classifications", "131, ,104"),
        ]);
        assert_eq!(reader.get_u64("row.ceiling"), 100_000);
        assert_eq!(reader.get_enum("failure.policy"), "skip");
        assert_eq!(reader.get_list("classifications"), vec!["131", "104"]);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let reader = SettingReader::from_pairs([
            ("row.ceiling", "lots"),
            ("failure.policy", "retry-forever"),
        ]);
        assert_eq!(reader.get_u64("row.ceiling"), 800_000);
        assert_eq!(reader.get_enum("failure.policy"), "abort");
    }

    #[test]
    fn test_enumerated_defaults_are_valid_values() {
        let registry = SettingRegistry::from_defaults_json();
        for def in registry.settings() {
            if def.kind == SettingKind::Enumerated {
                assert!(
                    registry.is_valid_enum_value(&def.name, &def.default_value),
                    "{} defaults to {}",
                    def.name,
                    def.default_value
                );
            } else {
                assert!(def.valid_values.is_none(), "{} lists values", def.name);
            }
        }
        assert_eq!(
            registry.get_setting("request.backoff.ms").map(|d| &d.kind),
            Some(&SettingKind::Integer)
        );
    }

    #[test]
    fn test_env_var_name() {
        assert_eq!(env_var_name("row.ceiling"), "SSB_ROW_CEILING");
        assert_eq!(env_var_name("request.interval.ms"), "SSB_REQUEST_INTERVAL_MS");
    }

    #[test]
    fn test_later_overrides_win() {
        let reader = SettingReader::from_pairs([("periods", "3")])
            .with_overrides([("periods", "7"), ("naming", "")]);
        assert_eq!(reader.get_u64("periods"), 7);
        assert_eq!(reader.get_enum("naming"), "id");
    }
}
