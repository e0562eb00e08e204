use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

fn empty_path_none<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<PathBuf>::deserialize(deserializer)?;
    Ok(opt.filter(|path| !path.as_os_str().is_empty()))
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "config io error: {}", err),
            ConfigError::Parse(err) => write!(f, "config parse error: {}", err),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Which packet fields identify a flow for retransmission tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FlowKeyGranularity {
    /// (src addr, dst addr). Sequence numbers of every connection between
    /// the two hosts share one set.
    HostPair,
    /// (src addr, dst addr, src port, dst port).
    Connection,
}

impl fmt::Display for FlowKeyGranularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowKeyGranularity::HostPair => write!(f, "host-pair"),
            FlowKeyGranularity::Connection => write!(f, "connection"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RateUnit {
    Bps,
    Mbps,
}

impl RateUnit {
    /// Scale a bits-per-second value into this unit.
    pub fn scale(self, bits_per_sec: f64) -> f64 {
        match self {
            RateUnit::Bps => bits_per_sec,
            RateUnit::Mbps => bits_per_sec / 1_000_000.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RateUnit::Bps => "bits/s",
            RateUnit::Mbps => "Mbps",
        }
    }
}

/// How the headline goodput figure is normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GoodputNormalization {
    /// First-occurrence payload bits over the observed duration.
    Rate,
    /// First-occurrence payload in megabits, not divided by the duration.
    Megabits,
}

/// Rule sets of the three experiment analyzers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    /// Congestion-control / window experiments: host-pair keys, every frame
    /// counted, bits/s.
    Window,
    /// SYN-flood experiments: connection lifecycle tracking and a traffic
    /// volume series around the attack window.
    SynFlood,
    /// Nagle / delayed-ACK experiments: iperf data segments only, Mbps.
    Nagle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Csv,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub profile: Option<Profile>,
    pub analysis: AnalysisConfig,
    pub lifecycle: LifecycleConfig,
    pub batch: BatchConfig,
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            profile: None,
            analysis: AnalysisConfig::default(),
            lifecycle: LifecycleConfig::default(),
            batch: BatchConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&raw)
    }

    /// Parse a TOML document. A `profile` key seeds the analysis and
    /// lifecycle sections; keys present in the document override the seed.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Self::from_toml_with_profile(raw, None)
    }

    /// Like [`Config::from_toml`], with `profile` taking precedence over the
    /// document's own `profile` key.
    pub fn from_toml_with_profile(
        raw: &str,
        profile: Option<Profile>,
    ) -> Result<Self, ConfigError> {
        let parsed: Config = toml::from_str(raw).map_err(ConfigError::Parse)?;
        let Some(profile) = profile.or(parsed.profile) else {
            return Ok(parsed);
        };

        let mut seeded = Config::default();
        profile.apply(&mut seeded);
        let mut seeded_value = toml::Value::try_from(&seeded)
            .map_err(|e| ConfigError::Invalid(format!("profile seed: {}", e)))?;
        let overrides: toml::Value = toml::from_str(raw).map_err(ConfigError::Parse)?;
        merge_toml(&mut seeded_value, overrides);
        let mut config: Config = seeded_value.try_into().map_err(ConfigError::Parse)?;
        config.profile = Some(profile);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.analysis.validate()?;
        self.lifecycle.validate()
    }
}

fn merge_toml(base: &mut toml::Value, overrides: toml::Value) {
    match (base, overrides) {
        (toml::Value::Table(base), toml::Value::Table(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(&key) {
                    Some(slot) => merge_toml(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

impl Profile {
    /// Overwrite the analysis and lifecycle sections with this profile's
    /// rules.
    pub fn apply(self, config: &mut Config) {
        config.profile = Some(self);
        match self {
            Profile::Window => {
                config.analysis = AnalysisConfig::default();
                config.lifecycle = LifecycleConfig::default();
            }
            Profile::SynFlood => {
                config.analysis = AnalysisConfig {
                    traffic_interval: 0.1,
                    ..AnalysisConfig::default()
                };
                config.lifecycle = LifecycleConfig {
                    enabled: true,
                    attack_window: Some(AttackWindow {
                        start: 20.0,
                        end: 120.0,
                    }),
                    ..LifecycleConfig::default()
                };
            }
            Profile::Nagle => {
                config.analysis = AnalysisConfig {
                    flow_key: FlowKeyGranularity::Connection,
                    destination_port: Some(5201),
                    require_nonzero_payload: true,
                    rate_unit: RateUnit::Mbps,
                    goodput_normalization: GoodputNormalization::Megabits,
                    min_capture_secs: 100.0,
                    ..AnalysisConfig::default()
                };
                config.lifecycle = LifecycleConfig::default();
            }
        }
    }
}

/// Per-file analysis rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Width of throughput/goodput bins in seconds.
    pub bin_duration: f64,
    pub flow_key: FlowKeyGranularity,
    /// Count only TCP segments sent to this port.
    pub destination_port: Option<u16>,
    /// Count only TCP segments that carry payload.
    pub require_nonzero_payload: bool,
    pub rate_unit: RateUnit,
    pub goodput_normalization: GoodputNormalization,
    /// Width of the non-overlapping traffic volume slots in seconds.
    pub traffic_interval: f64,
    /// Warn when the capture file spans less than this (0 = off).
    pub min_capture_secs: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            bin_duration: 0.2,
            flow_key: FlowKeyGranularity::HostPair,
            destination_port: None,
            require_nonzero_payload: false,
            rate_unit: RateUnit::Bps,
            goodput_normalization: GoodputNormalization::Rate,
            traffic_interval: 0.1,
            min_capture_secs: 0.0,
        }
    }
}

impl AnalysisConfig {
    /// True when some frames may be excluded from every counter.
    pub fn filters_frames(&self) -> bool {
        self.destination_port.is_some() || self.require_nonzero_payload
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.bin_duration.is_finite() && self.bin_duration > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "bin_duration must be positive, got {}",
                self.bin_duration
            )));
        }
        if !(self.traffic_interval.is_finite() && self.traffic_interval > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "traffic_interval must be positive, got {}",
                self.traffic_interval
            )));
        }
        if self.min_capture_secs < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "min_capture_secs must not be negative, got {}",
                self.min_capture_secs
            )));
        }
        Ok(())
    }
}

/// Start and end of an attack, in seconds since the first frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttackWindow {
    pub start: f64,
    pub end: f64,
}

impl AttackWindow {
    pub fn contains(&self, offset: f64) -> bool {
        self.start <= offset && offset <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub enabled: bool,
    /// Duration assigned to connections never seen closing.
    pub default_unclosed_duration: f64,
    pub attack_window: Option<AttackWindow>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        LifecycleConfig {
            enabled: false,
            default_unclosed_duration: 100.0,
            attack_window: None,
        }
    }
}

impl LifecycleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.default_unclosed_duration.is_finite() && self.default_unclosed_duration >= 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "default_unclosed_duration must be a non-negative number, got {}",
                self.default_unclosed_duration
            )));
        }
        if let Some(window) = &self.attack_window {
            if window.end < window.start {
                return Err(ConfigError::Invalid(format!(
                    "attack_window ends ({}) before it starts ({})",
                    window.end, window.start
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Worker threads (0 = derive from CPU count).
    pub workers: usize,
    /// Pending jobs per worker before the dispatcher blocks.
    pub queue_depth: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            workers: 0,
            queue_depth: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for report files. Nothing is written when unset.
    #[serde(deserialize_with = "empty_path_none")]
    pub dir: Option<PathBuf>,
    pub formats: Vec<OutputFormat>,
    pub quiet: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            dir: None,
            formats: vec![OutputFormat::Json, OutputFormat::Csv, OutputFormat::Text],
            quiet: false,
        }
    }
}
