//! Application settings loaded from the process environment and `.env`.
//!
//! Variable names are case-sensitive and match the field names upper-cased
//! (`DATABASE_URL`, `CORS_ORIGINS`, ...). Every problem found while reading is
//! collected so a single error names all missing or malformed variables.

use std::fmt;
use std::str::FromStr;

use db_infra::sanitize_db_url;
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::error::AppError;

static SETTINGS: OnceCell<Settings> = OnceCell::new();

/// Process-wide settings, built on first call and shared afterwards.
///
/// A failed build is not cached; the next call tries again.
pub fn get_settings() -> Result<&'static Settings, AppError> {
    SETTINGS.get_or_try_init(Settings::from_env)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Staging,
    Production,
    Testing,
}

impl AppEnv {
    pub fn as_str(self) -> &'static str {
        match self {
            AppEnv::Development => "development",
            AppEnv::Staging => "staging",
            AppEnv::Production => "production",
            AppEnv::Testing => "testing",
        }
    }
}

impl FromStr for AppEnv {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(AppEnv::Development),
            "staging" => Ok(AppEnv::Staging),
            "production" => Ok(AppEnv::Production),
            "testing" => Ok(AppEnv::Testing),
            other => Err(format!(
                "'{other}' is not one of development, staging, production, testing"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Console,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "console" | "text" | "pretty" => Ok(LogFormat::Console),
            other => Err(format!("'{other}' is not one of json, console")),
        }
    }
}

/// A credential that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Clone)]
pub struct Settings {
    // Application
    pub app_name: String,
    pub app_env: AppEnv,
    pub debug: bool,
    pub log_level: String,

    // API
    pub api_host: String,
    pub api_port: u16,
    pub api_prefix: String,

    // OpenAI
    pub openai_api_key: Option<Secret>,
    pub openai_model: String,
    pub openai_whisper_model: String,
    pub use_openai: bool,

    // Azure OpenAI
    pub llm_provider: String,
    pub azure_openai_endpoint: String,
    pub azure_openai_api_key: Secret,
    pub azure_openai_deployment_name: String,
    pub azure_openai_api_version: String,
    pub azure_whisper_deployment_name: String,
    pub azure_openai_api_version_2: String,

    // Database
    pub database_url: String,
    pub database_pool_size: u32,
    pub database_max_overflow: u32,

    // Security
    pub secret_key: Secret,
    pub jwt_algorithm: String,
    pub access_token_expire_minutes: u32,
    pub refresh_token_expire_days: u32,

    // Compliance
    pub audit_log_enabled: bool,
    pub audit_log_retention_days: u32,
    pub phi_encryption_enabled: bool,

    // CORS
    pub cors_origins: Vec<String>,
    pub cors_allow_credentials: bool,

    // Rate limiting
    pub rate_limit_requests: u32,
    /// Window length in seconds.
    pub rate_limit_period: u32,

    // Feature flags
    pub enable_real_time_transcription: bool,
    pub enable_icd10_suggestions: bool,
    pub enable_soap_generation: bool,

    // Medical NLP models
    pub spacy_model: String,
    pub medcat_model_path: Option<String>,

    // Audio
    pub max_audio_file_size_mb: u32,
    pub supported_audio_formats: Vec<String>,

    // Storage
    pub storage_type: String,
    pub local_storage_path: String,
    pub recordings_folder: String,

    // Logging
    pub log_format: LogFormat,
    pub log_file_path: Option<String>,
    pub log_rotation: String,
    pub log_retention: String,
}

impl Settings {
    /// Load `.env` (process variables win) and read the environment.
    pub fn from_env() -> Result<Self, AppError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "settings=dotenv_loaded"),
            Err(e) if e.not_found() => {}
            Err(e) => {
                return Err(AppError::config(format!("failed to read .env file: {e}")));
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut r = Reader::new(lookup);

        let settings = Settings {
            app_name: r.string("APP_NAME", "medical-scribe-ai"),
            app_env: r.parse("APP_ENV", AppEnv::Development),
            debug: r.flag("DEBUG", false),
            log_level: r.string("LOG_LEVEL", "INFO"),

            api_host: r.string("API_HOST", "0.0.0.0"),
            api_port: r.parse("API_PORT", 8000),
            api_prefix: r.string("API_PREFIX", "/api/v1"),

            openai_api_key: r.optional("OPENAI_API_KEY").map(Secret::new),
            openai_model: r.string("OPENAI_MODEL", "gpt-4o"),
            openai_whisper_model: r.string("OPENAI_WHISPER_MODEL", "whisper-1"),
            use_openai: r.flag("USE_OPENAI", false),

            llm_provider: r.string("LLM_PROVIDER", "azure_openai"),
            azure_openai_endpoint: r.required("AZURE_OPENAI_ENDPOINT"),
            azure_openai_api_key: Secret::new(r.required("AZURE_OPENAI_API_KEY")),
            azure_openai_deployment_name: r.required("AZURE_OPENAI_DEPLOYMENT_NAME"),
            azure_openai_api_version: r.required("AZURE_OPENAI_API_VERSION"),
            azure_whisper_deployment_name: r.required("AZURE_WHISPER_DEPLOYMENT_NAME"),
            azure_openai_api_version_2: r.required("AZURE_OPENAI_API_VERSION_2"),

            database_url: r.string("DATABASE_URL", "sqlite:///./medicalscribe.db"),
            database_pool_size: r.parse("DATABASE_POOL_SIZE", 5),
            database_max_overflow: r.parse("DATABASE_MAX_OVERFLOW", 10),

            secret_key: Secret::new(r.required("SECRET_KEY")),
            jwt_algorithm: r.string("JWT_ALGORITHM", "HS256"),
            access_token_expire_minutes: r.parse("ACCESS_TOKEN_EXPIRE_MINUTES", 30),
            refresh_token_expire_days: r.parse("REFRESH_TOKEN_EXPIRE_DAYS", 7),

            audit_log_enabled: r.flag("AUDIT_LOG_ENABLED", false),
            audit_log_retention_days: r.parse("AUDIT_LOG_RETENTION_DAYS", 365),
            phi_encryption_enabled: r.flag("PHI_ENCRYPTION_ENABLED", false),

            cors_origins: r.list("CORS_ORIGINS", &["http://localhost:3000"]),
            cors_allow_credentials: r.flag("CORS_ALLOW_CREDENTIALS", true),

            rate_limit_requests: r.parse("RATE_LIMIT_REQUESTS", 100),
            rate_limit_period: r.parse("RATE_LIMIT_PERIOD", 60),

            enable_real_time_transcription: r.flag("ENABLE_REAL_TIME_TRANSCRIPTION", true),
            enable_icd10_suggestions: r.flag("ENABLE_ICD10_SUGGESTIONS", true),
            enable_soap_generation: r.flag("ENABLE_SOAP_GENERATION", true),

            spacy_model: r.string("SPACY_MODEL", "en_core_sci_lg"),
            medcat_model_path: r.disableable("MEDCAT_MODEL_PATH", "./models/medcat"),

            max_audio_file_size_mb: r.parse("MAX_AUDIO_FILE_SIZE_MB", 100),
            supported_audio_formats: r.list(
                "SUPPORTED_AUDIO_FORMATS",
                &["wav", "mp3", "m4a", "flac"],
            ),

            storage_type: r.string("STORAGE_TYPE", "local"),
            local_storage_path: r.string("LOCAL_STORAGE_PATH", "./data/uploads"),
            recordings_folder: r.string("RECORDINGS_FOLDER", "./data/recordings"),

            log_format: r.parse("LOG_FORMAT", LogFormat::Json),
            log_file_path: r.disableable("LOG_FILE_PATH", "./logs/app.log"),
            log_rotation: r.string("LOG_ROTATION", "1 day"),
            log_retention: r.string("LOG_RETENTION", "30 days"),
        };

        r.finish()?;
        Ok(settings)
    }

    pub fn is_production(&self) -> bool {
        self.app_env == AppEnv::Production
    }

    pub fn is_development(&self) -> bool {
        self.app_env == AppEnv::Development
    }

    pub fn is_testing(&self) -> bool {
        self.app_env == AppEnv::Testing
    }

    pub fn max_audio_file_size_bytes(&self) -> u64 {
        u64::from(self.max_audio_file_size_mb) * 1024 * 1024
    }

    /// Case-insensitive; a leading dot is ignored (`".WAV"` matches `wav`).
    pub fn supports_audio_format(&self, extension: &str) -> bool {
        let ext = extension.trim().trim_start_matches('.');
        self.supported_audio_formats
            .iter()
            .any(|f| f.eq_ignore_ascii_case(ext))
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("app_name", &self.app_name)
            .field("app_env", &self.app_env)
            .field("debug", &self.debug)
            .field("api_host", &self.api_host)
            .field("api_port", &self.api_port)
            .field("api_prefix", &self.api_prefix)
            .field("database_url", &sanitize_db_url(&self.database_url))
            .field("database_pool_size", &self.database_pool_size)
            .field("database_max_overflow", &self.database_max_overflow)
            .field("cors_origins", &self.cors_origins)
            .field("log_format", &self.log_format)
            .field("log_file_path", &self.log_file_path)
            .finish_non_exhaustive()
    }
}

/// Reads typed values out of a lookup function, recording every missing or
/// malformed variable instead of stopping at the first.
struct Reader<F> {
    lookup: F,
    missing: Vec<&'static str>,
    invalid: Vec<String>,
}

impl<F> Reader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn new(lookup: F) -> Self {
        Self {
            lookup,
            missing: Vec::new(),
            invalid: Vec::new(),
        }
    }

    /// Set and non-blank value.
    fn value(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn string(&mut self, key: &str, default: &str) -> String {
        self.value(key).unwrap_or_else(|| default.to_string())
    }

    fn optional(&mut self, key: &str) -> Option<String> {
        self.value(key)
    }

    /// Unset falls back to `default`; set-but-empty turns the feature off.
    fn disableable(&mut self, key: &str, default: &str) -> Option<String> {
        match (self.lookup)(key) {
            None => Some(default.to_string()),
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(v),
        }
    }

    fn required(&mut self, key: &'static str) -> String {
        match self.value(key) {
            Some(v) => v,
            None => {
                self.missing.push(key);
                String::new()
            }
        }
    }

    fn parse<T>(&mut self, key: &str, default: T) -> T
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let Some(raw) = self.value(key) else {
            return default;
        };
        match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(e) => {
                self.invalid.push(format!("{key} ({e})"));
                default
            }
        }
    }

    fn flag(&mut self, key: &str, default: bool) -> bool {
        let Some(raw) = self.value(key) else {
            return default;
        };
        match parse_flag(&raw) {
            Some(v) => v,
            None => {
                self.invalid.push(format!("{key} ('{raw}' is not a boolean)"));
                default
            }
        }
    }

    fn list(&mut self, key: &str, default: &[&str]) -> Vec<String> {
        let Some(raw) = self.value(key) else {
            return default.iter().map(|s| s.to_string()).collect();
        };
        match parse_list(&raw) {
            Ok(items) => items,
            Err(e) => {
                self.invalid.push(format!("{key} ({e})"));
                default.iter().map(|s| s.to_string()).collect()
            }
        }
    }

    fn finish(self) -> Result<(), AppError> {
        if self.missing.is_empty() && self.invalid.is_empty() {
            return Ok(());
        }

        let mut problems = Vec::new();
        if !self.missing.is_empty() {
            problems.push(format!(
                "missing required settings: {}",
                self.missing.join(", ")
            ));
        }
        if !self.invalid.is_empty() {
            problems.push(format!("invalid settings: {}", self.invalid.join(", ")));
        }
        Err(AppError::config(problems.join("; ")))
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "t" | "y" => Some(true),
        "0" | "false" | "no" | "off" | "f" | "n" => Some(false),
        _ => None,
    }
}

/// Accepts a JSON array of strings or a comma-separated string. Items are
/// trimmed, blanks dropped, order kept.
pub fn parse_list(raw: &str) -> Result<Vec<String>, String> {
    let raw = raw.trim();
    let items: Vec<String> = if raw.starts_with('[') {
        serde_json::from_str::<Vec<String>>(raw).map_err(|e| format!("not a JSON list: {e}"))?
    } else {
        raw.split(',').map(str::to_string).collect()
    };

    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const REQUIRED: [(&str, &str); 7] = [
        ("AZURE_OPENAI_ENDPOINT", "https://scribe.openai.azure.com/"),
        ("AZURE_OPENAI_API_KEY", "azure-key"),
        ("AZURE_OPENAI_DEPLOYMENT_NAME", "gpt-4o"),
        ("AZURE_OPENAI_API_VERSION", "2024-08-01-preview"),
        ("AZURE_WHISPER_DEPLOYMENT_NAME", "whisper"),
        ("AZURE_OPENAI_API_VERSION_2", "2024-06-01"),
        ("SECRET_KEY", "not-so-secret"),
    ];

    fn load(extra: &[(&str, &str)]) -> Result<Settings, AppError> {
        let vars: HashMap<String, String> = REQUIRED
            .iter()
            .chain(extra.iter())
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = load(&[]).unwrap();
        assert_eq!(s.app_name, "medical-scribe-ai");
        assert_eq!(s.app_env, AppEnv::Development);
        assert!(!s.debug);
        assert_eq!(s.api_port, 8000);
        assert_eq!(s.api_prefix, "/api/v1");
        assert_eq!(s.database_url, "sqlite:///./medicalscribe.db");
        assert_eq!(s.database_pool_size, 5);
        assert_eq!(s.database_max_overflow, 10);
        assert_eq!(s.cors_origins, vec!["http://localhost:3000"]);
        assert!(s.cors_allow_credentials);
        assert_eq!(s.supported_audio_formats, vec!["wav", "mp3", "m4a", "flac"]);
        assert_eq!(s.medcat_model_path.as_deref(), Some("./models/medcat"));
        assert_eq!(s.log_format, LogFormat::Json);
        assert_eq!(s.log_file_path.as_deref(), Some("./logs/app.log"));
        assert!(s.openai_api_key.is_none());
        assert!(s.is_development());
    }

    #[test]
    fn test_every_missing_required_variable_is_named() {
        let err = Settings::from_lookup(|key| {
            (key == "SECRET_KEY").then(|| "present".to_string())
        })
        .unwrap_err();

        let msg = err.to_string();
        for (key, _) in REQUIRED.iter().filter(|(k, _)| *k != "SECRET_KEY") {
            assert!(msg.contains(key), "{key} not named in: {msg}");
        }
        assert!(!msg.contains("SECRET_KEY"));
        assert!(matches!(err, AppError::Config { .. }));
    }

    #[test]
    fn test_empty_environment_names_every_required_variable() {
        let env = backend_test_support::EnvFixture::empty();
        let msg = Settings::from_lookup(|k| env.get(k)).unwrap_err().to_string();
        for (key, _) in backend_test_support::settings::REQUIRED_VARS {
            assert!(msg.contains(key), "{key} not named in: {msg}");
        }
    }

    #[test]
    fn test_comma_separated_origins_are_trimmed_in_order() {
        let s = load(&[(
            "CORS_ORIGINS",
            "https://a.example.com , https://b.example.com,  https://c.example.com",
        )])
        .unwrap();
        assert_eq!(
            s.cors_origins,
            vec![
                "https://a.example.com",
                "https://b.example.com",
                "https://c.example.com"
            ]
        );
    }

    #[test]
    fn test_json_list_form() {
        let s = load(&[("SUPPORTED_AUDIO_FORMATS", r#"["ogg", " webm "]"#)]).unwrap();
        assert_eq!(s.supported_audio_formats, vec!["ogg", "webm"]);
    }

    #[test]
    fn test_malformed_json_list_is_invalid() {
        let err = load(&[("CORS_ORIGINS", "[\"https://a.example.com\"")]).unwrap_err();
        assert!(err.to_string().contains("CORS_ORIGINS"));
    }

    #[test]
    fn test_app_env_values() {
        for (raw, env) in [
            ("development", AppEnv::Development),
            ("staging", AppEnv::Staging),
            ("production", AppEnv::Production),
            ("testing", AppEnv::Testing),
        ] {
            assert_eq!(load(&[("APP_ENV", raw)]).unwrap().app_env, env);
        }

        let err = load(&[("APP_ENV", "Production")]).unwrap_err();
        assert!(err.to_string().contains("APP_ENV"));
    }

    #[test]
    fn test_flag_spellings() {
        for raw in ["1", "true", "YES", "on", "t", "Y"] {
            assert!(load(&[("DEBUG", raw)]).unwrap().debug, "{raw}");
        }
        for raw in ["0", "False", "no", "OFF", "f", "n"] {
            assert!(!load(&[("DEBUG", raw)]).unwrap().debug, "{raw}");
        }
        assert!(load(&[("DEBUG", "maybe")]).is_err());
    }

    #[test]
    fn test_unparsable_integer_names_the_variable() {
        let err = load(&[("DATABASE_POOL_SIZE", "five"), ("API_PORT", "99999")]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("DATABASE_POOL_SIZE"));
        assert!(msg.contains("API_PORT"));
    }

    #[test]
    fn test_empty_optional_values_are_unset() {
        let s = load(&[("OPENAI_API_KEY", ""), ("LOG_FILE_PATH", "")]).unwrap();
        assert!(s.openai_api_key.is_none());
        assert!(s.log_file_path.is_none());
    }

    #[test]
    fn test_audio_helpers() {
        let s = load(&[("MAX_AUDIO_FILE_SIZE_MB", "2")]).unwrap();
        assert_eq!(s.max_audio_file_size_bytes(), 2 * 1024 * 1024);
        assert!(s.supports_audio_format("wav"));
        assert!(s.supports_audio_format(".MP3"));
        assert!(!s.supports_audio_format("ogg"));
    }

    #[test]
    fn test_debug_output_hides_credentials() {
        let s = load(&[("DATABASE_URL", "postgresql://scribe:hunter2@db:5432/scribe")]).unwrap();
        let rendered = format!("{s:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("not-so-secret"));
        assert!(!rendered.contains("azure-key"));
    }

    #[test]
    fn test_log_format_aliases() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Console);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Console);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
