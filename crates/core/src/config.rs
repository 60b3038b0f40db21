use crate::types::Channel;
use serde::Deserialize;

/// Root engine configuration. Loaded from environment variables with the
/// prefix `MARKETMIX__` and an optional TOML config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub attribution: AttributionConfig,
    #[serde(default)]
    pub mmm: MmmConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    #[serde(default)]
    pub versions: VersionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttributionConfig {
    /// Minimum number of touch paths before the Markov override activates.
    #[serde(default = "default_min_sequences")]
    pub min_sequences: usize,
    /// When set, spend closer to the order date counts more.
    #[serde(default)]
    pub recency_half_life_days: Option<f64>,
    /// Feed paths synthesized from the fractional pass into the Markov model.
    #[serde(default)]
    pub synthesize_paths: bool,
    /// Path count at which diagnostics consider the sample sufficient.
    #[serde(default = "default_target_paths")]
    pub target_paths: usize,
    #[serde(default = "default_attribution_seed")]
    pub seed: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MmmConfig {
    #[serde(default = "default_mmm_channels")]
    pub channels: Vec<Channel>,
    #[serde(default = "default_adstock_half_life")]
    pub adstock_half_life: f64,
    #[serde(default = "default_ridge_alpha")]
    pub ridge_alpha: f64,
    #[serde(default = "default_n_boot")]
    pub n_boot: usize,
    #[serde(default = "default_mmm_seed")]
    pub seed: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OptimizerConfig {
    /// Number of increments the budget is split into.
    #[serde(default = "default_optimizer_steps")]
    pub steps: usize,
    /// Lookback for "current spend" when none is supplied.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconciliationConfig {
    #[serde(default = "default_instability_threshold")]
    pub instability_threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionConfig {
    #[serde(default = "default_mta_version")]
    pub mta_version: String,
    #[serde(default = "default_mmm_version")]
    pub mmm_version: String,
    #[serde(default = "default_data_snapshot_id")]
    pub data_snapshot_id: String,
}

// Default functions
fn default_min_sequences() -> usize {
    10
}
fn default_target_paths() -> usize {
    100
}
fn default_attribution_seed() -> u64 {
    7
}
fn default_mmm_channels() -> Vec<Channel> {
    Channel::DEFAULT_SET.to_vec()
}
fn default_adstock_half_life() -> f64 {
    7.0
}
fn default_ridge_alpha() -> f64 {
    1.0
}
fn default_n_boot() -> usize {
    500
}
fn default_mmm_seed() -> u64 {
    42
}
fn default_optimizer_steps() -> usize {
    1000
}
fn default_lookback_days() -> i64 {
    30
}
fn default_instability_threshold() -> f64 {
    0.25
}
fn default_mta_version() -> String {
    "mta-1.0.0".to_string()
}
fn default_mmm_version() -> String {
    "mmm-1.0.0".to_string()
}
fn default_data_snapshot_id() -> String {
    "live".to_string()
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            min_sequences: default_min_sequences(),
            recency_half_life_days: None,
            synthesize_paths: false,
            target_paths: default_target_paths(),
            seed: default_attribution_seed(),
        }
    }
}

impl Default for MmmConfig {
    fn default() -> Self {
        Self {
            channels: default_mmm_channels(),
            adstock_half_life: default_adstock_half_life(),
            ridge_alpha: default_ridge_alpha(),
            n_boot: default_n_boot(),
            seed: default_mmm_seed(),
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            steps: default_optimizer_steps(),
            lookback_days: default_lookback_days(),
        }
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            instability_threshold: default_instability_threshold(),
        }
    }
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self {
            mta_version: default_mta_version(),
            mmm_version: default_mmm_version(),
            data_snapshot_id: default_data_snapshot_id(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            attribution: AttributionConfig::default(),
            mmm: MmmConfig::default(),
            optimizer: OptimizerConfig::default(),
            reconciliation: ReconciliationConfig::default(),
            versions: VersionConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and an optional config file.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("MARKETMIX")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("mmm.channels"),
        );

        let config = builder.build()?;
        let parsed: Self = config.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.mmm.channels.is_empty() {
            return Err(config::ConfigError::Message(
                "mmm.channels must name at least one channel".into(),
            ));
        }
        if self.mmm.ridge_alpha < 0.0 {
            return Err(config::ConfigError::Message(
                "mmm.ridge_alpha must be non-negative".into(),
            ));
        }
        if self.optimizer.steps == 0 {
            return Err(config::ConfigError::Message(
                "optimizer.steps must be positive".into(),
            ));
        }
        Ok(())
    }
}
