use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceloomError};
use crate::time::DEFAULT_TICKS_PER_MILLISECOND;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PercentileMethod {
    /// Nearest-rank on the sorted sample: rank = ceil(p * n), 1-indexed.
    #[default]
    NearestRank,
    /// Linear interpolation between closest ranks.
    Linear,
}

impl FromStr for PercentileMethod {
    type Err = TraceloomError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nearest_rank" | "nearest-rank" => Ok(Self::NearestRank),
            "linear" => Ok(Self::Linear),
            _ => Err(TraceloomError::Parse(format!(
                "unknown percentile method: {s}"
            ))),
        }
    }
}

/// Per-model pricing, dollars per thousand tokens.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ModelRate {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostConfig {
    pub default_rate: ModelRate,
    pub rates: BTreeMap<String, ModelRate>,
}

impl Default for CostConfig {
    fn default() -> Self {
        let mut rates = BTreeMap::new();
        rates.insert(
            "gpt-4".to_string(),
            ModelRate {
                input_per_1k: 0.03,
                output_per_1k: 0.06,
            },
        );
        rates.insert(
            "gpt-4o".to_string(),
            ModelRate {
                input_per_1k: 0.0025,
                output_per_1k: 0.01,
            },
        );
        rates.insert(
            "gpt-35-turbo".to_string(),
            ModelRate {
                input_per_1k: 0.0005,
                output_per_1k: 0.0015,
            },
        );
        Self {
            default_rate: ModelRate {
                input_per_1k: 0.001,
                output_per_1k: 0.002,
            },
            rates,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub ticks_per_millisecond: i64,
    pub late_arrival_window: Duration,
    pub retention_ttl: Duration,
    pub percentile_method: PercentileMethod,
    pub cost: CostConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ticks_per_millisecond: DEFAULT_TICKS_PER_MILLISECOND,
            late_arrival_window: Duration::from_secs(5 * 60),
            retention_ttl: Duration::from_secs(60 * 60 * 24),
            percentile_method: PercentileMethod::NearestRank,
            cost: CostConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = config_file_path();
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides();
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        apply_overrides(&mut cfg, load_env_overrides(), "environment")?;
        Ok(cfg)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    ticks_per_millisecond: Option<i64>,
    late_arrival_window: Option<String>,
    retention_ttl: Option<String>,
    percentile_method: Option<String>,
    default_rate: Option<ModelRate>,
    rates: Option<BTreeMap<String, ModelRate>>,
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("TRACELOOM_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("traceloom/config.toml")
}

fn load_file_overrides(path: &PathBuf) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| TraceloomError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed: ConfigOverrides = toml::from_str(&raw)
        .map_err(|e| TraceloomError::Config(format!("failed parsing {}: {e}", path.display())))?;
    Ok(Some(parsed))
}

fn load_env_overrides() -> ConfigOverrides {
    ConfigOverrides {
        ticks_per_millisecond: env::var("TRACELOOM_TICKS_PER_MS")
            .ok()
            .and_then(|v| v.parse().ok()),
        late_arrival_window: env::var("TRACELOOM_LATE_ARRIVAL_WINDOW").ok(),
        retention_ttl: env::var("TRACELOOM_RETENTION_TTL").ok(),
        percentile_method: env::var("TRACELOOM_PERCENTILE_METHOD").ok(),
        default_rate: None,
        rates: None,
    }
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.ticks_per_millisecond {
        if v <= 0 {
            return Err(TraceloomError::Config(format!(
                "ticks_per_millisecond in {source} must be positive (value={v})"
            )));
        }
        cfg.ticks_per_millisecond = v;
    }
    if let Some(v) = overrides.late_arrival_window {
        cfg.late_arrival_window = humantime::parse_duration(&v).map_err(|e| {
            TraceloomError::Config(format!(
                "bad late_arrival_window in {source}: {e} (value={v})"
            ))
        })?;
    }
    if let Some(v) = overrides.retention_ttl {
        cfg.retention_ttl = humantime::parse_duration(&v).map_err(|e| {
            TraceloomError::Config(format!("bad retention_ttl in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.percentile_method {
        cfg.percentile_method = v.parse()?;
    }
    if let Some(v) = overrides.default_rate {
        cfg.cost.default_rate = v;
    }
    if let Some(v) = overrides.rates {
        cfg.cost.rates.extend(v);
    }
    Ok(())
}
