use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;
use crate::instructions::{InstructionProfile, SlotSpec};

/// Default endpoint path appended to the backend base URL
pub const DEFAULT_PROMPT_PATH: &str = "/prompt";

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// System directive used when every instruction slot is blank
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Acknowledgement used when a 2xx response carries no reply
pub const DEFAULT_FALLBACK_REPLY: &str = "I received your prompt.";

/// Longest prompt accepted by the submission guard
pub const DEFAULT_MAX_PROMPT_CHARS: usize = 20_000;

/// Completion backend selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Remote HTTP completion endpoint
    Http {
        /// Scheme and host, e.g. "https://chat.example.com"
        base_url: String,
        /// Path appended to base_url
        #[serde(default = "default_prompt_path")]
        path: String,
        /// Seconds before an outstanding request is abandoned
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    /// Scripted responses for offline use and tests
    Mock {
        /// TOML file with `[[responses]]` entries
        #[serde(default)]
        responses_file: Option<PathBuf>,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_prompt_path() -> String {
    DEFAULT_PROMPT_PATH.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl BackendConfig {
    /// Request timeout for this backend
    pub fn timeout(&self) -> Duration {
        match self {
            BackendConfig::Http { timeout_secs, .. } | BackendConfig::Mock { timeout_secs, .. } => {
                Duration::from_secs(*timeout_secs)
            }
        }
    }

    /// Full endpoint URL for HTTP backends
    pub fn endpoint(&self) -> Option<String> {
        match self {
            BackendConfig::Http { base_url, path, .. } => Some(format!("{}{}", base_url.trim_end_matches('/'), path)),
            BackendConfig::Mock { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::Http { .. } => "http",
            BackendConfig::Mock { .. } => "mock",
        }
    }
}

/// Conversation defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversationConfig {
    #[serde(default = "default_system_prompt")]
    pub default_system_prompt: String,
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_fallback_reply() -> String {
    DEFAULT_FALLBACK_REPLY.to_string()
}

fn default_max_prompt_chars() -> usize {
    DEFAULT_MAX_PROMPT_CHARS
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            default_system_prompt: default_system_prompt(),
            fallback_reply: default_fallback_reply(),
            max_prompt_chars: default_max_prompt_chars(),
        }
    }
}

/// Profile configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    /// Profile name
    pub name: String,

    /// Completion backend
    pub backend: BackendConfig,

    /// Conversation defaults
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Instruction slot layout, in display order
    #[serde(default = "InstructionProfile::default_layout")]
    pub slots: Vec<SlotSpec>,

    /// Where transcript and instructions are stored (absolute path)
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
}

impl Profile {
    /// Empty instruction profile for this layout
    pub fn instruction_profile(&self) -> Result<InstructionProfile> {
        InstructionProfile::from_layout(&self.slots)
    }

    /// Storage directory, falling back to the platform data dir
    pub fn storage_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.storage_dir {
            return Ok(dir.clone());
        }

        dirs::data_dir()
            .map(|base| base.join("parley").join(&self.name))
            .ok_or_else(|| crate::Error::Config("Could not determine data directory".to_string()))
    }
}

/// `[logging.file]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileLoggingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_file_level")]
    pub level: String,
}

fn default_file_level() -> String {
    "debug".to_string()
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        Self { enabled: false, level: default_file_level() }
    }
}

/// `[logging.privacy]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrivacyLoggingConfig {
    /// "none", "truncate" or "full"
    #[serde(default = "default_log_content")]
    pub log_content: String,
    #[serde(default = "default_truncate_length")]
    pub truncate_length: usize,
}

fn default_log_content() -> String {
    "truncate".to_string()
}

fn default_truncate_length() -> usize {
    200
}

impl Default for PrivacyLoggingConfig {
    fn default() -> Self {
        Self { log_content: default_log_content(), truncate_length: default_truncate_length() }
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub file: FileLoggingConfig,
    #[serde(default)]
    pub privacy: PrivacyLoggingConfig,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: FileLoggingConfig::default(),
            privacy: PrivacyLoggingConfig::default(),
        }
    }
}

/// Root configuration structure for config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Default profile name
    #[serde(default = "default_profile")]
    pub default_profile: String,

    /// Named profiles
    pub profiles: HashMap<String, Profile>,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_profile() -> String {
    "default".to_string()
}

impl Config {
    /// Load configuration from a TOML string
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(toml_str).map_err(|e| crate::Error::Config(format!("TOML parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Get the default profile
    pub fn default_profile(&self) -> Result<&Profile> {
        self.profile(&self.default_profile)
    }

    /// Get a profile by name
    pub fn profile(&self, name: &str) -> Result<&Profile> {
        use crate::Error;

        self.profiles
            .get(name)
            .ok_or_else(|| Error::Config(ConfigError::ProfileNotFound(name.to_string()).to_string()))
    }

    /// Get all profile names, sorted
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        use crate::Error;

        if !self.profiles.contains_key(&self.default_profile) {
            return Err(Error::Config(
                ConfigError::ProfileNotFound(self.default_profile.clone()).to_string(),
            ));
        }

        for (name, profile) in &self.profiles {
            Self::validate_profile(name, profile).map_err(|e| Error::Config(e.to_string()))?;
        }

        Ok(())
    }

    fn validate_profile(name: &str, profile: &Profile) -> std::result::Result<(), ConfigError> {
        match &profile.backend {
            BackendConfig::Http { base_url, path, .. } => {
                let parsed = url::Url::parse(base_url)
                    .map_err(|e| ConfigError::InvalidBaseUrl(format!("{} ({}) in profile '{}'", base_url, e, name)))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(ConfigError::InvalidBaseUrl(format!(
                        "{} (scheme must be http or https) in profile '{}'",
                        base_url, name
                    )));
                }
                if !path.starts_with('/') {
                    return Err(ConfigError::InvalidPath(format!("{} in profile '{}'", path, name)));
                }
            }
            BackendConfig::Mock { responses_file, .. } => {
                if let Some(file) = responses_file
                    && !file.is_absolute()
                {
                    return Err(ConfigError::AbsolutePathRequired(format!("responses_file in profile '{}'", name)));
                }
            }
        }

        if profile.backend.timeout().is_zero() {
            return Err(ConfigError::InvalidValue(format!("timeout_secs must be positive in profile '{}'", name)));
        }

        if profile.conversation.max_prompt_chars == 0 {
            return Err(ConfigError::InvalidValue(format!(
                "max_prompt_chars must be positive in profile '{}'",
                name
            )));
        }

        if profile.slots.is_empty() {
            return Err(ConfigError::InvalidSlots(format!("profile '{}' declares no slots", name)));
        }

        let mut keys = HashSet::new();
        for slot in &profile.slots {
            if slot.key.trim().is_empty() {
                return Err(ConfigError::InvalidSlots(format!("empty slot key in profile '{}'", name)));
            }
            if !keys.insert(slot.key.as_str()) {
                return Err(ConfigError::InvalidSlots(format!(
                    "duplicate slot key '{}' in profile '{}'",
                    slot.key, name
                )));
            }
        }

        if let Some(dir) = &profile.storage_dir
            && !dir.is_absolute()
        {
            return Err(ConfigError::AbsolutePathRequired(format!("storage_dir for profile '{}'", name)));
        }

        Ok(())
    }

    /// Get example configuration (as a string)
    pub fn example() -> &'static str {
        r#"# Parley Configuration Example
# Copy this file to config.toml and customize as needed

# Default profile to use when no profile is specified
default_profile = "default"

[profiles.default]
name = "default"
# Directory for the saved transcript and instructions (optional, absolute path)
# storage_dir = "/path/to/state"

# Completion backend
[profiles.default.backend]
# Backend type: "http" or "mock"
backend = "http"
# Base URL of the completion service
base_url = "https://example.invalid"
# Endpoint path (optional, default "/prompt")
path = "/prompt"
# Seconds to wait for a reply (optional, default 60)
timeout_secs = 60

# Conversation defaults (optional)
[profiles.default.conversation]
default_system_prompt = "You are a helpful assistant."
fallback_reply = "I received your prompt."
max_prompt_chars = 20000

# Instruction slots, combined into the system message in this order
[[profiles.default.slots]]
key = "instructions"
title = ""

# Logging (optional)
[logging]
# Level: "error", "warn", "info", "debug", "trace"
level = "warn"
# Format: "pretty", "json" or "compact"
format = "pretty"

[logging.file]
enabled = false
level = "debug"

[logging.privacy]
# Message content in logs: "none", "truncate" or "full"
log_content = "truncate"
truncate_length = 200
"#
    }
}

impl Default for Config {
    fn default() -> Self {
        Config { default_profile: default_profile(), profiles: HashMap::new(), logging: LoggingConfig::default() }
    }
}

/// Configuration-specific errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Profile not found
    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    /// Base URL is not an absolute http(s) URL
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    /// Endpoint path must start with '/'
    #[error("invalid endpoint path: {0}")]
    InvalidPath(String),

    /// Slot layout problems
    #[error("invalid instruction slots: {0}")]
    InvalidSlots(String),

    /// Out-of-range numeric setting
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// Absolute path required
    #[error("absolute path required: {0}")]
    AbsolutePathRequired(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlParse(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::TomlParse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
default_profile = "default"

[profiles.default]
name = "default"

[profiles.default.backend]
backend = "http"
base_url = "https://chat.example.com"
"#;

    #[test]
    fn test_config_from_toml_str_applies_defaults() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        let profile = config.default_profile().unwrap();

        assert_eq!(profile.name, "default");
        assert_eq!(
            profile.backend,
            BackendConfig::Http {
                base_url: "https://chat.example.com".to_string(),
                path: "/prompt".to_string(),
                timeout_secs: 60,
            }
        );
        assert_eq!(profile.conversation, ConversationConfig::default());
        assert_eq!(profile.slots, InstructionProfile::default_layout());
        assert!(profile.storage_dir.is_none());
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_backend_endpoint_and_timeout() {
        let backend = BackendConfig::Http {
            base_url: "https://chat.example.com/".to_string(),
            path: "/prompt".to_string(),
            timeout_secs: 5,
        };
        assert_eq!(backend.endpoint().as_deref(), Some("https://chat.example.com/prompt"));
        assert_eq!(backend.timeout(), Duration::from_secs(5));
        assert_eq!(backend.kind(), "http");

        let mock = BackendConfig::Mock { responses_file: None, timeout_secs: 1 };
        assert_eq!(mock.endpoint(), None);
        assert_eq!(mock.kind(), "mock");
    }

    #[test]
    fn test_config_with_slots_and_conversation() {
        let toml = r#"
default_profile = "work"

[profiles.work]
name = "work"
storage_dir = "/var/lib/parley"

[profiles.work.backend]
backend = "http"
base_url = "http://localhost:8080"
path = "/v1/prompt"
timeout_secs = 15

[profiles.work.conversation]
default_system_prompt = "Je bent een behulpzame assistent."
fallback_reply = "Ik heb je prompt ontvangen."
max_prompt_chars = 2000

[[profiles.work.slots]]
key = "persona"
title = "Persona"

[[profiles.work.slots]]
key = "style"
title = "Style"
"#;

        let config = Config::from_toml_str(toml).unwrap();
        let profile = config.profile("work").unwrap();

        assert_eq!(profile.conversation.max_prompt_chars, 2000);
        assert_eq!(profile.conversation.fallback_reply, "Ik heb je prompt ontvangen.");
        assert_eq!(profile.slots.len(), 2);
        assert_eq!(profile.slots[1], SlotSpec::new("style", "Style"));
        assert_eq!(profile.storage_dir().unwrap(), PathBuf::from("/var/lib/parley"));
        assert_eq!(profile.backend.endpoint().as_deref(), Some("http://localhost:8080/v1/prompt"));

        let instructions = profile.instruction_profile().unwrap();
        assert_eq!(instructions.slots().len(), 2);
    }

    #[test]
    fn test_config_mock_backend() {
        let toml = r#"
[profiles.default]
name = "default"

[profiles.default.backend]
backend = "mock"
responses_file = "/tmp/mock.toml"
"#;

        let config = Config::from_toml_str(toml).unwrap();
        let profile = config.default_profile().unwrap();
        assert_eq!(
            profile.backend,
            BackendConfig::Mock { responses_file: Some(PathBuf::from("/tmp/mock.toml")), timeout_secs: 60 }
        );
    }

    #[test]
    fn test_config_validation_missing_default_profile() {
        let toml = MINIMAL.replace("default_profile = \"default\"", "default_profile = \"nonexistent\"");
        let result = Config::from_toml_str(&toml);
        assert!(result.unwrap_err().to_string().contains("profile not found"));
    }

    #[test]
    fn test_config_validation_bad_base_url() {
        let toml = MINIMAL.replace("https://chat.example.com", "chat.example.com");
        let result = Config::from_toml_str(&toml);
        assert!(result.unwrap_err().to_string().contains("invalid base URL"));

        let toml = MINIMAL.replace("https://chat.example.com", "ftp://chat.example.com");
        let result = Config::from_toml_str(&toml);
        assert!(result.unwrap_err().to_string().contains("scheme must be http"));
    }

    #[test]
    fn test_config_validation_bad_path() {
        let toml = format!("{}path = \"prompt\"\n", MINIMAL);
        let result = Config::from_toml_str(&toml);
        assert!(result.unwrap_err().to_string().contains("invalid endpoint path"));
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let toml = format!("{}timeout_secs = 0\n", MINIMAL);
        let result = Config::from_toml_str(&toml);
        assert!(result.unwrap_err().to_string().contains("timeout_secs"));
    }

    #[test]
    fn test_config_validation_duplicate_slots() {
        let toml = format!(
            "{}\n[[profiles.default.slots]]\nkey = \"a\"\n\n[[profiles.default.slots]]\nkey = \"a\"\n",
            MINIMAL
        );
        let result = Config::from_toml_str(&toml);
        assert!(result.unwrap_err().to_string().contains("duplicate slot key"));
    }

    #[test]
    fn test_config_validation_relative_storage_dir() {
        let toml = MINIMAL.replace("name = \"default\"", "name = \"default\"\nstorage_dir = \"state\"");
        let result = Config::from_toml_str(&toml);
        assert!(result.unwrap_err().to_string().contains("absolute path required"));
    }

    #[test]
    fn test_config_rejects_unknown_fields() {
        let toml = MINIMAL.replace("name = \"default\"", "name = \"default\"\napi_key = \"secret\"");
        assert!(Config::from_toml_str(&toml).is_err());
    }

    #[test]
    fn test_config_logging_section() {
        let toml = format!(
            "{}\n[logging]\nlevel = \"debug\"\nformat = \"json\"\n\n[logging.file]\nenabled = true\n",
            MINIMAL
        );
        let config = Config::from_toml_str(&toml).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert!(config.logging.file.enabled);
        assert_eq!(config.logging.file.level, "debug");
        assert_eq!(config.logging.privacy, PrivacyLoggingConfig::default());
    }

    #[test]
    fn test_config_example_parses() {
        let config = Config::from_toml_str(Config::example()).unwrap();
        assert_eq!(config.default_profile, "default");
        assert_eq!(config.profile_names(), vec!["default".to_string()]);
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.default_profile, "default");
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::ProfileNotFound("missing".to_string());
        assert_eq!(err.to_string(), "profile not found: missing");

        let err = ConfigError::InvalidPath("prompt".to_string());
        assert_eq!(err.to_string(), "invalid endpoint path: prompt");

        let err = ConfigError::TomlParse("parse error".to_string());
        assert_eq!(err.to_string(), "TOML parse error: parse error");
    }
}
