//! Environment fixtures for settings tests.

use std::collections::HashMap;

/// Values for every variable the settings loader requires.
pub const REQUIRED_VARS: [(&str, &str); 7] = [
    ("AZURE_OPENAI_ENDPOINT", "https://scribe-test.openai.azure.com/"),
    ("AZURE_OPENAI_API_KEY", "test-azure-key"),
    ("AZURE_OPENAI_DEPLOYMENT_NAME", "gpt-4o"),
    ("AZURE_OPENAI_API_VERSION", "2024-08-01-preview"),
    ("AZURE_WHISPER_DEPLOYMENT_NAME", "whisper"),
    ("AZURE_OPENAI_API_VERSION_2", "2024-06-01"),
    ("SECRET_KEY", "test-secret-key"),
];

/// An in-memory stand-in for the process environment.
///
/// Starts with [`REQUIRED_VARS`] set and `APP_ENV=testing`; tests add or
/// remove variables and hand [`EnvFixture::get`] to the settings loader.
#[derive(Debug, Clone)]
pub struct EnvFixture {
    vars: HashMap<String, String>,
}

impl EnvFixture {
    pub fn new() -> Self {
        let vars = REQUIRED_VARS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .chain([("APP_ENV".to_string(), "testing".to_string())])
            .collect();
        Self { vars }
    }

    /// No variables at all.
    pub fn empty() -> Self {
        Self {
            vars: HashMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_all(mut self, pairs: &[(&str, &str)]) -> Self {
        for (k, v) in pairs {
            self.vars.insert(k.to_string(), v.to_string());
        }
        self
    }

    pub fn without(mut self, key: &str) -> Self {
        self.vars.remove(key);
        self
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Default for EnvFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_starts_with_required_vars() {
        let env = EnvFixture::new();
        for (key, _) in REQUIRED_VARS {
            assert!(env.get(key).is_some(), "{key}");
        }
        assert_eq!(env.get("APP_ENV").as_deref(), Some("testing"));
    }

    #[test]
    fn fixture_overrides_and_removals() {
        let env = EnvFixture::new()
            .with("DEBUG", "true")
            .without("SECRET_KEY");
        assert_eq!(env.get("DEBUG").as_deref(), Some("true"));
        assert!(env.get("SECRET_KEY").is_none());
    }
}
