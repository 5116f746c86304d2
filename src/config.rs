use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Engine behaviour configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Business calendar configuration
    #[serde(default)]
    pub calendar: CalendarConfig,

    /// Breach scanner configuration
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/default.toml".to_string());

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: TICKET_SLA_)
            .add_source(
                config::Environment::with_prefix("TICKET_SLA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Retry attempts for key allocation conflicts
    #[serde(default = "default_retry_limit")]
    pub allocation_retries: u32,

    /// Retry attempts for optimistic-lock conflicts on SLA targets
    #[serde(default = "default_retry_limit")]
    pub conflict_retries: u32,

    /// Width of the zero-padded ticket sequence
    #[serde(default = "default_key_pad_width")]
    pub key_pad_width: usize,

    /// Event queue capacity
    #[serde(default = "default_event_queue_size")]
    pub event_queue_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            allocation_retries: default_retry_limit(),
            conflict_retries: default_retry_limit(),
            key_pad_width: default_key_pad_width(),
            event_queue_size: default_event_queue_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Daily window start, "HH:MM"
    #[serde(default = "default_window_start")]
    pub window_start: String,

    /// Daily window end, "HH:MM"
    #[serde(default = "default_window_end")]
    pub window_end: String,

    /// Working days, Mon..Sun
    #[serde(default = "default_business_days")]
    pub business_days: Vec<String>,

    /// Default tenant timezone for business-hours interpretation
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            window_start: default_window_start(),
            window_end: default_window_end(),
            business_days: default_business_days(),
            timezone: default_timezone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Enable the periodic breach scan
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between breach scans
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,

    /// Warning horizon before a due instant (seconds)
    #[serde(default = "default_warning_horizon")]
    pub warning_horizon_secs: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            scan_interval_secs: default_scan_interval(),
            warning_horizon_secs: default_warning_horizon(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Service name
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            service_name: default_service_name(),
        }
    }
}

// Default value functions
fn default_retry_limit() -> u32 {
    3
}

fn default_key_pad_width() -> usize {
    4
}

fn default_event_queue_size() -> usize {
    10000
}

fn default_window_start() -> String {
    "09:00".to_string()
}

fn default_window_end() -> String {
    "18:00".to_string()
}

fn default_business_days() -> Vec<String> {
    vec![
        "Mon".to_string(),
        "Tue".to_string(),
        "Wed".to_string(),
        "Thu".to_string(),
        "Fri".to_string(),
    ]
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_scan_interval() -> u64 {
    300 // 5 minutes
}

fn default_warning_horizon() -> u64 {
    3600 // 1 hour
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "ticket-sla-engine".to_string()
}

fn default_true() -> bool {
    true
}
