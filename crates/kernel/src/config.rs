use serde::{Deserialize, Serialize};

use crate::SpawnerError;

/// Tunables for a [`Spawner`](crate::Spawner). Loaded from JSON; every field
/// has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnerConfig {
    /// Entities created per second.
    pub creation_rate: f64,
    /// Entities destroyed per second.
    pub destruction_rate: f64,
    /// Levels selectable with [`Spawner::select_level`](crate::Spawner::select_level).
    pub level_count: i32,
    /// Distinct shapes the factory can produce.
    pub kind_count: i32,
    /// Distinct materials the factory can produce.
    pub variant_count: i32,
    /// Pool reclaimed entities for reuse.
    pub recycle: bool,
    /// RNG seed; random when absent.
    pub seed: Option<u64>,
    /// Uniform scale range for newly created entities.
    pub scale_range: (f32, f32),
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            creation_rate: 0.0,
            destruction_rate: 0.0,
            level_count: 2,
            kind_count: 3,
            variant_count: 3,
            recycle: true,
            seed: None,
            scale_range: (0.1, 1.0),
        }
    }
}

impl SpawnerConfig {
    pub fn from_json(json: &str) -> Result<Self, SpawnerError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| SpawnerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SpawnerError> {
        for (name, rate) in [
            ("creation_rate", self.creation_rate),
            ("destruction_rate", self.destruction_rate),
        ] {
            if !rate.is_finite() || rate < 0.0 {
                return Err(SpawnerError::Config(format!(
                    "{name} must be a finite non-negative number, got {rate}"
                )));
            }
        }
        if self.level_count < 1 {
            return Err(SpawnerError::Config("level_count must be at least 1".into()));
        }
        if self.kind_count < 1 || self.variant_count < 1 {
            return Err(SpawnerError::Config(
                "kind_count and variant_count must be at least 1".into(),
            ));
        }
        let (lo, hi) = self.scale_range;
        if !(lo.is_finite() && hi.is_finite() && 0.0 < lo && lo <= hi) {
            return Err(SpawnerError::Config(format!(
                "scale_range must satisfy 0 < min <= max, got ({lo}, {hi})"
            )));
        }
        Ok(())
    }
}
