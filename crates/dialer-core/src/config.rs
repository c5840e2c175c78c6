//! Dialer configuration
//!
//! Configuration is layered the usual way: defaults, then an optional TOML
//! file, then `DIALER__*` environment variables (`__` separates sections,
//! e.g. `DIALER__CAMPAIGN__FROM_NUMBER`).
//!
//! ```toml
//! [campaign]
//! from_number = "+15550001111"
//! intro_message = "Hi, this is a reminder about your appointment tomorrow."
//! country_code = "+1"
//!
//! [sequencer]
//! mode = "ivr_blast"
//! call_delay_ms = 3000
//!
//! [backend]
//! base_url = "https://api.example.com/api"
//! ```
//!
//! Campaign fields are plain scalars read once per call attempt; nothing
//! here has a lifecycle of its own.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DialerError, DialerResult};
use crate::logging::LoggingConfig;
use crate::phone::CountryCode;
use crate::recovery::RetryConfig;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "DIALER";

/// How each contact is called
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallMode {
    /// Server-initiated call playing an IVR script; outcome polled
    #[default]
    IvrBlast,
    /// Browser-mediated live call with an IVR menu for routing
    PowerDialer,
    /// Browser-mediated live call with no IVR step
    DirectCall,
}

impl CallMode {
    /// Resolve the operator's two toggles into a single mode
    ///
    /// The toggles are mutually exclusive in the console; if both are
    /// somehow set, direct call wins.
    pub fn from_flags(power_dialer: bool, direct_call: bool) -> Self {
        match (power_dialer, direct_call) {
            (_, true) => CallMode::DirectCall,
            (true, false) => CallMode::PowerDialer,
            (false, false) => CallMode::IvrBlast,
        }
    }

    /// Whether this mode dials through the operator's voice device
    pub fn uses_device(&self) -> bool {
        matches!(self, CallMode::PowerDialer | CallMode::DirectCall)
    }
}

impl fmt::Display for CallMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallMode::IvrBlast => write!(f, "ivr_blast"),
            CallMode::PowerDialer => write!(f, "power_dialer"),
            CallMode::DirectCall => write!(f, "direct_call"),
        }
    }
}

impl FromStr for CallMode {
    type Err = DialerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "ivr_blast" | "ivr" => Ok(CallMode::IvrBlast),
            "power_dialer" | "power" => Ok(CallMode::PowerDialer),
            "direct_call" | "direct" => Ok(CallMode::DirectCall),
            other => Err(DialerError::config("mode", format!("unknown call mode '{other}'"))),
        }
    }
}

/// Campaign / IVR script fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    /// Caller-ID number calls are placed from
    pub from_number: Option<String>,
    /// Message played when the callee answers
    pub intro_message: String,
    /// Instructions for the AI agent handling the IVR conversation
    pub ai_prompt: Option<String>,
    /// Number the callee is forwarded to on request
    pub forward_number: Option<String>,
    /// Agent number for live transfers
    pub agent_number: Option<String>,
    /// Music played while a transfer is connecting
    pub hold_music_url: Option<String>,
    /// Record calls
    pub record: bool,
    /// Prefix for 10-digit numbers in uploaded sheets
    pub country_code: CountryCode,
}

impl CampaignConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_from_number(mut self, number: impl Into<String>) -> Self {
        self.from_number = Some(number.into());
        self
    }

    pub fn with_intro_message(mut self, message: impl Into<String>) -> Self {
        self.intro_message = message.into();
        self
    }

    pub fn with_ai_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.ai_prompt = Some(prompt.into());
        self
    }

    pub fn with_forward_number(mut self, number: impl Into<String>) -> Self {
        self.forward_number = Some(number.into());
        self
    }

    pub fn with_agent_number(mut self, number: impl Into<String>) -> Self {
        self.agent_number = Some(number.into());
        self
    }

    pub fn with_hold_music_url(mut self, url: impl Into<String>) -> Self {
        self.hold_music_url = Some(url.into());
        self
    }

    pub fn with_record(mut self, record: bool) -> Self {
        self.record = record;
        self
    }

    pub fn with_country_code(mut self, code: CountryCode) -> Self {
        self.country_code = code;
        self
    }

    /// Selected caller ID, ignoring blank values
    pub fn caller_id(&self) -> Option<&str> {
        self.from_number
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }

    /// Check the fields the given mode needs before any call is placed
    pub fn validate_for(&self, mode: CallMode) -> DialerResult<()> {
        if self.caller_id().is_none() {
            return Err(DialerError::MissingCallerId);
        }
        if mode == CallMode::IvrBlast && self.intro_message.trim().is_empty() {
            return Err(DialerError::MissingPrompt);
        }
        Ok(())
    }
}

/// Pacing of the sequencer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    pub mode: CallMode,
    /// Pause between one contact settling and the next being dialed
    pub call_delay_ms: u64,
    /// How often IVR blast call status is polled
    pub poll_interval_ms: u64,
    /// Give up polling an IVR blast call after this long
    pub max_poll_duration_secs: u64,
    /// Interval of live duration updates during direct calls
    pub duration_tick_ms: u64,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            mode: CallMode::IvrBlast,
            call_delay_ms: 3000,
            poll_interval_ms: 2000,
            max_poll_duration_secs: 600,
            duration_tick_ms: 1000,
        }
    }
}

impl SequencerConfig {
    pub fn with_mode(mut self, mode: CallMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_max_poll_duration(mut self, duration: Duration) -> Self {
        self.max_poll_duration_secs = duration.as_secs();
        self
    }

    pub fn call_delay(&self) -> Duration {
        Duration::from_millis(self.call_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn max_poll_duration(&self) -> Duration {
        Duration::from_secs(self.max_poll_duration_secs)
    }

    pub fn duration_tick(&self) -> Duration {
        Duration::from_millis(self.duration_tick_ms.max(1))
    }
}

/// Retry settings for page-level backend reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub use_jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        RetryConfig {
            max_attempts: settings.max_attempts.max(1),
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            backoff_multiplier: settings.backoff_multiplier,
            use_jitter: settings.use_jitter,
        }
    }
}

/// Where the campaign backend lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base API path, e.g. `https://api.example.com/api`
    pub base_url: String,
    /// Bearer token sent with every request
    pub api_token: Option<String>,
    pub request_timeout_secs: u64,
    pub retry: RetrySettings,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000/api".to_string(),
            api_token: None,
            request_timeout_secs: 30,
            retry: RetrySettings::default(),
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Logging section of the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
    /// Include source file and line numbers
    pub file_info: bool,
    /// Log span enter/exit for each call attempt
    pub spans: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_info: false,
            spans: false,
        }
    }
}

impl LoggingSettings {
    pub fn to_logging_config(&self) -> DialerResult<LoggingConfig> {
        LoggingConfig::try_from(self)
    }
}

/// Complete dialer configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialerConfig {
    pub campaign: CampaignConfig,
    pub sequencer: SequencerConfig,
    pub backend: BackendConfig,
    pub logging: LoggingSettings,
}

impl DialerConfig {
    /// Load defaults, then the optional file, then environment overrides
    pub fn load(path: Option<&Path>) -> DialerResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            debug!(path = %path.display(), "Loading dialer configuration file");
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        let config: DialerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string (no environment overlay)
    pub fn from_toml_str(content: &str) -> DialerResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Toml))
            .build()?;
        let config: DialerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks that do not depend on the chosen mode
    pub fn validate(&self) -> DialerResult<()> {
        if self.backend.base_url.trim().is_empty() {
            return Err(DialerError::config("backend.base_url", "must not be empty"));
        }
        if self.sequencer.poll_interval_ms == 0 {
            return Err(DialerError::config("sequencer.poll_interval_ms", "must be positive"));
        }
        if self.backend.retry.backoff_multiplier < 1.0 {
            return Err(DialerError::config(
                "backend.retry.backoff_multiplier",
                "must be at least 1.0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_flags() {
        assert_eq!(CallMode::from_flags(false, false), CallMode::IvrBlast);
        assert_eq!(CallMode::from_flags(true, false), CallMode::PowerDialer);
        assert_eq!(CallMode::from_flags(false, true), CallMode::DirectCall);
        assert_eq!(CallMode::from_flags(true, true), CallMode::DirectCall);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("power-dialer".parse::<CallMode>().unwrap(), CallMode::PowerDialer);
        assert_eq!("DIRECT".parse::<CallMode>().unwrap(), CallMode::DirectCall);
        assert!("robocall".parse::<CallMode>().is_err());
    }

    #[test]
    fn test_validate_for_mode() {
        let campaign = CampaignConfig::new();
        assert_eq!(campaign.validate_for(CallMode::DirectCall), Err(DialerError::MissingCallerId));

        let campaign = campaign.with_from_number("  ");
        assert_eq!(campaign.validate_for(CallMode::DirectCall), Err(DialerError::MissingCallerId));

        let campaign = CampaignConfig::new().with_from_number("+15550001111");
        assert_eq!(campaign.validate_for(CallMode::IvrBlast), Err(DialerError::MissingPrompt));
        assert!(campaign.validate_for(CallMode::PowerDialer).is_ok());

        let campaign = campaign.with_intro_message("Hello");
        assert!(campaign.validate_for(CallMode::IvrBlast).is_ok());
    }

    #[test]
    fn test_toml_loading_with_defaults() {
        let config = DialerConfig::from_toml_str(
            r#"
            [campaign]
            from_number = "+15550001111"
            intro_message = "Reminder"
            country_code = "44"
            record = true

            [sequencer]
            mode = "power_dialer"
            call_delay_ms = 1500

            [backend]
            base_url = "https://api.example.com/api"
            "#,
        )
        .unwrap();

        assert_eq!(config.campaign.caller_id(), Some("+15550001111"));
        assert_eq!(config.campaign.country_code.as_str(), "+44");
        assert!(config.campaign.record);
        assert_eq!(config.sequencer.mode, CallMode::PowerDialer);
        assert_eq!(config.sequencer.call_delay(), Duration::from_millis(1500));
        assert_eq!(config.sequencer.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.backend.retry.max_attempts, 3);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = DialerConfig::from_toml_str("[campaign]\ncountry_code = \"abc\"\n").unwrap_err();
        assert_eq!(err.category(), "configuration");

        let err = DialerConfig::from_toml_str("[backend]\nbase_url = \"\"\n").unwrap_err();
        assert!(matches!(err, DialerError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_retry_settings_conversion() {
        let retry = RetryConfig::from(&RetrySettings::default());
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_logging_section_flags() {
        let config = DialerConfig::from_toml_str(
            r#"
            [logging]
            level = "debug"
            file_info = true
            spans = true
            "#,
        )
        .unwrap();

        assert!(!config.logging.json);
        let logging = config.logging.to_logging_config().unwrap();
        assert_eq!(logging.level, tracing::Level::DEBUG);
        assert!(logging.file_info);
        assert!(logging.spans);
    }

    #[test]
    fn test_environment_overrides_file() {
        let path = std::env::temp_dir().join(format!("dialer-config-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[campaign]\nfrom_number = \"+15550001111\"\nintro_message = \"From file\"\n",
        )
        .unwrap();

        // Only this test reads the process environment
        std::env::set_var("DIALER__CAMPAIGN__FROM_NUMBER", "+15559990000");
        std::env::set_var("DIALER__LOGGING__LEVEL", "warn");
        let loaded = DialerConfig::load(Some(path.as_path()));
        std::env::remove_var("DIALER__CAMPAIGN__FROM_NUMBER");
        std::env::remove_var("DIALER__LOGGING__LEVEL");
        std::fs::remove_file(&path).unwrap();

        let config = loaded.unwrap();
        assert_eq!(config.campaign.caller_id(), Some("+15559990000"));
        assert_eq!(config.campaign.intro_message, "From file");
        assert_eq!(config.logging.level, "warn");
    }
}
