//! Tracking request configuration.
//!
//! Mirrors the location request the tracker asks the platform for: a target
//! interval, the fastest interval it will accept, how long the platform may
//! hold fixes back to batch them, and an accuracy/power tier.

use crate::error::{TrackerError, TrackerResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Platform power/precision trade-off requested for the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccuracyTier {
    HighAccuracy,
    Balanced,
    LowPower,
    Passive,
}

impl fmt::Display for AccuracyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccuracyTier::HighAccuracy => "HIGH_ACCURACY",
            AccuracyTier::Balanced => "BALANCED",
            AccuracyTier::LowPower => "LOW_POWER",
            AccuracyTier::Passive => "PASSIVE",
        };
        f.write_str(name)
    }
}

impl FromStr for AccuracyTier {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "high_accuracy" | "high" => Ok(AccuracyTier::HighAccuracy),
            "balanced" => Ok(AccuracyTier::Balanced),
            "low_power" | "low" => Ok(AccuracyTier::LowPower),
            "passive" => Ok(AccuracyTier::Passive),
            other => Err(TrackerError::InvalidConfig(format!(
                "unknown accuracy tier '{}'",
                other
            ))),
        }
    }
}

/// Location request parameters, fixed for the lifetime of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Desired interval between fixes
    pub min_interval_ms: u64,
    /// Fastest rate the tracker can handle fixes
    pub fastest_interval_ms: u64,
    /// Maximum time the platform may delay delivery to batch fixes (0 = no batching)
    pub max_batch_delay_ms: u64,
    pub accuracy_tier: AccuracyTier,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        TrackingConfig {
            min_interval_ms: 20_000,
            fastest_interval_ms: 10_000,
            max_batch_delay_ms: 40_000,
            accuracy_tier: AccuracyTier::HighAccuracy,
        }
    }
}

impl TrackingConfig {
    pub fn validate(&self) -> TrackerResult<()> {
        if self.min_interval_ms == 0 {
            return Err(TrackerError::InvalidConfig(
                "min_interval_ms must be positive".to_string(),
            ));
        }
        if self.fastest_interval_ms > self.min_interval_ms {
            return Err(TrackerError::InvalidConfig(format!(
                "fastest_interval_ms ({}) exceeds min_interval_ms ({})",
                self.fastest_interval_ms, self.min_interval_ms
            )));
        }
        if self.max_batch_delay_ms != 0 && self.max_batch_delay_ms < self.min_interval_ms {
            return Err(TrackerError::InvalidConfig(format!(
                "max_batch_delay_ms ({}) is below min_interval_ms ({})",
                self.max_batch_delay_ms, self.min_interval_ms
            )));
        }
        Ok(())
    }

    /// Upper bound on fixes per delivered batch
    pub fn max_fixes_per_batch(&self) -> usize {
        if self.max_batch_delay_ms == 0 {
            return 1;
        }
        let fastest = self.fastest_interval_ms.max(1);
        ((self.max_batch_delay_ms / fastest) as usize).max(1)
    }

    /// Parse and validate a JSON config; missing fields take their defaults
    pub fn from_json_str(json: &str) -> TrackerResult<Self> {
        let config: TrackingConfig = serde_json::from_str(json)
            .map_err(|e| TrackerError::Config(format!("invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> TrackerResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            TrackerError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_json_str(&contents)?;
        log::info!(
            "Loaded tracking config from {} ({} ms, {})",
            path.display(),
            config.min_interval_ms,
            config.accuracy_tier
        );
        Ok(config)
    }

    pub fn to_json(&self) -> TrackerResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| TrackerError::Internal(format!("JSON serialization failed: {}", e)))
    }
}
