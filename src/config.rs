//! Optional `config.toml` in the data directory.
//!
//! Every field has a default, so a missing file or a partial file is fine:
//!
//! ```toml
//! [tasks]
//! daily_count = 4
//!
//! [steps]
//! min_delta = 3
//! min_interval_ms = 500
//!
//! [metrics]
//! km_per_step = 0.0008
//! kcal_per_step_per_kg = 0.0005
//! fallback_kcal_per_step = 0.04
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::tasks::TASK_POOL;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tasks: TaskConfig,
    #[serde(default)]
    pub steps: DebounceConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Number of system tasks drawn from the pool each day.
    #[serde(default = "default_daily_count")]
    pub daily_count: usize,
}

/// Noise filter for raw sensor readings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DebounceConfig {
    #[serde(default = "default_min_delta")]
    pub min_delta: u64,
    /// An event must arrive strictly later than this after the last accepted one.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_km_per_step")]
    pub km_per_step: f64,
    #[serde(default = "default_kcal_per_step_per_kg")]
    pub kcal_per_step_per_kg: f64,
    #[serde(default = "default_fallback_kcal_per_step")]
    pub fallback_kcal_per_step: f64,
}

fn default_daily_count() -> usize {
    4
}
fn default_min_delta() -> u64 {
    3
}
fn default_min_interval_ms() -> i64 {
    500
}
fn default_km_per_step() -> f64 {
    0.0008
}
fn default_kcal_per_step_per_kg() -> f64 {
    0.0005
}
fn default_fallback_kcal_per_step() -> f64 {
    0.04
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            daily_count: default_daily_count(),
        }
    }
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            min_delta: default_min_delta(),
            min_interval_ms: default_min_interval_ms(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            km_per_step: default_km_per_step(),
            kcal_per_step_per_kg: default_kcal_per_step_per_kg(),
            fallback_kcal_per_step: default_fallback_kcal_per_step(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.tasks.daily_count == 0 || self.tasks.daily_count > TASK_POOL.len() {
            return Err(AppError::InvalidInput(format!(
                "tasks.daily_count must be between 1 and {}",
                TASK_POOL.len()
            )));
        }
        if self.steps.min_interval_ms < 0 {
            return Err(AppError::InvalidInput(
                "steps.min_interval_ms must not be negative".to_string(),
            ));
        }
        let coefficients = [
            ("metrics.km_per_step", self.metrics.km_per_step),
            (
                "metrics.kcal_per_step_per_kg",
                self.metrics.kcal_per_step_per_kg,
            ),
            (
                "metrics.fallback_kcal_per_step",
                self.metrics.fallback_kcal_per_step,
            ),
        ];
        for (name, value) in coefficients {
            if !value.is_finite() || value < 0.0 {
                return Err(AppError::InvalidInput(format!(
                    "{name} must be a non-negative number"
                )));
            }
        }
        Ok(())
    }
}
