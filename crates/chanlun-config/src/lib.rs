//! Configuration management for chanlun.
//!
//! Settings are plain TOML. Algorithm selectors stay strings here; the
//! structure crate validates them into closed enums when a pipeline is built.

use std::fs;
use std::path::{Path, PathBuf};

use chanlun_indicators::IndicatorSetConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Root settings structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChanSettings {
    pub stroke: StrokeSettings,
    pub segment: SegmentSettings,
    pub pivot: PivotSettings,
    /// Stroke-level signal classification.
    pub signal: SignalSection,
    /// Segment-level signal classification.
    pub segment_signal: SignalSection,
    pub indicators: IndicatorSetConfig,
    pub driver: DriverSettings,
}

impl Default for ChanSettings {
    fn default() -> Self {
        Self {
            stroke: StrokeSettings::default(),
            segment: SegmentSettings::default(),
            pivot: PivotSettings::default(),
            signal: SignalSection::default(),
            segment_signal: SignalSection::segment_default(),
            indicators: IndicatorSetConfig::default(),
            driver: DriverSettings::default(),
        }
    }
}

impl ChanSettings {
    /// Load settings from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let settings: ChanSettings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from default locations.
    ///
    /// Searches in order:
    /// 1. `./chanlun.toml`
    /// 2. `~/.config/chanlun/config.toml`
    ///
    /// Returns defaults if no file is found.
    pub fn load_default() -> Self {
        if let Ok(settings) = Self::load(Self::default_path()) {
            return settings;
        }

        if let Some(config_dir) = dirs::config_dir() {
            let path = config_dir.join("chanlun").join("config.toml");
            if let Ok(settings) = Self::load(&path) {
                return settings;
            }
        }

        Self::default()
    }

    /// Save settings to a file path.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default settings file path.
    pub fn default_path() -> PathBuf {
        PathBuf::from("chanlun.toml")
    }
}

/// Stroke builder options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrokeSettings {
    /// `normal` or `fx`.
    pub algorithm: String,
    /// Require four merged candles between fractals instead of three.
    pub strict: bool,
    /// `strict`, `loss`, `half` or `totally`.
    pub fx_check: String,
    /// Count a price gap between merged candles as one extra candle.
    pub gap_as_candle: bool,
    /// The ending fractal must be the extreme of the stroke.
    pub end_is_peak: bool,
    pub allow_sub_peak: bool,
}

impl Default for StrokeSettings {
    fn default() -> Self {
        Self {
            algorithm: "normal".to_string(),
            strict: true,
            fx_check: "strict".to_string(),
            gap_as_candle: false,
            end_is_peak: true,
            allow_sub_peak: true,
        }
    }
}

/// Segment builder options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentSettings {
    /// `chan`, `break` or `1+1`.
    pub algorithm: String,
    /// `peak` or `all`.
    pub left_method: String,
}

impl Default for SegmentSettings {
    fn default() -> Self {
        Self {
            algorithm: "chan".to_string(),
            left_method: "peak".to_string(),
        }
    }
}

/// Pivot detector options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PivotSettings {
    pub combine: bool,
    /// `zs` or `peak`.
    pub combine_mode: String,
    pub one_leg_pivot: bool,
    pub algorithm: String,
}

impl Default for PivotSettings {
    fn default() -> Self {
        Self {
            combine: true,
            combine_mode: "zs".to_string(),
            one_leg_pivot: false,
            algorithm: "normal".to_string(),
        }
    }
}

/// Signal classifier options for one side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalSettings {
    /// Maximum exit/enter metric ratio for a divergence. `inf` disables the test.
    pub divergence_rate: f64,
    pub min_pivot_count: usize,
    pub bsp1_only_multileg_pivot: bool,
    pub max_bsp2_rate: f64,
    pub divergence_algo: String,
    pub bsp1_peak: bool,
    /// Any of `1`, `1p`, `2`, `2s`, `3a`, `3b`.
    pub types: Vec<String>,
    pub bsp2_follows_1: bool,
    pub bsp3_follows_1: bool,
    pub bsp3_peak: bool,
    pub bsp2s_follows_2: bool,
    pub max_bsp2s_level: Option<usize>,
    pub strict_bsp3: bool,
}

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            divergence_rate: f64::INFINITY,
            min_pivot_count: 1,
            bsp1_only_multileg_pivot: true,
            max_bsp2_rate: 0.9999,
            divergence_algo: "peak".to_string(),
            bsp1_peak: true,
            types: ["1", "1p", "2", "2s", "3a", "3b"].iter().map(|s| s.to_string()).collect(),
            bsp2_follows_1: true,
            bsp3_follows_1: true,
            bsp3_peak: false,
            bsp2s_follows_2: false,
            max_bsp2s_level: None,
            strict_bsp3: false,
        }
    }
}

impl SignalSettings {
    /// Merge with an override, using override values where present.
    pub fn merge(&self, o: &SignalOverride) -> Self {
        Self {
            divergence_rate: o.divergence_rate.unwrap_or(self.divergence_rate),
            min_pivot_count: o.min_pivot_count.unwrap_or(self.min_pivot_count),
            bsp1_only_multileg_pivot: o
                .bsp1_only_multileg_pivot
                .unwrap_or(self.bsp1_only_multileg_pivot),
            max_bsp2_rate: o.max_bsp2_rate.unwrap_or(self.max_bsp2_rate),
            divergence_algo: o
                .divergence_algo
                .clone()
                .unwrap_or_else(|| self.divergence_algo.clone()),
            bsp1_peak: o.bsp1_peak.unwrap_or(self.bsp1_peak),
            types: o.types.clone().unwrap_or_else(|| self.types.clone()),
            bsp2_follows_1: o.bsp2_follows_1.unwrap_or(self.bsp2_follows_1),
            bsp3_follows_1: o.bsp3_follows_1.unwrap_or(self.bsp3_follows_1),
            bsp3_peak: o.bsp3_peak.unwrap_or(self.bsp3_peak),
            bsp2s_follows_2: o.bsp2s_follows_2.unwrap_or(self.bsp2s_follows_2),
            max_bsp2s_level: o.max_bsp2s_level.or(self.max_bsp2s_level),
            strict_bsp3: o.strict_bsp3.unwrap_or(self.strict_bsp3),
        }
    }
}

/// Partial signal options (all fields optional).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalOverride {
    pub divergence_rate: Option<f64>,
    pub min_pivot_count: Option<usize>,
    pub bsp1_only_multileg_pivot: Option<bool>,
    pub max_bsp2_rate: Option<f64>,
    pub divergence_algo: Option<String>,
    pub bsp1_peak: Option<bool>,
    pub types: Option<Vec<String>>,
    pub bsp2_follows_1: Option<bool>,
    pub bsp3_follows_1: Option<bool>,
    pub bsp3_peak: Option<bool>,
    pub bsp2s_follows_2: Option<bool>,
    pub max_bsp2s_level: Option<usize>,
    pub strict_bsp3: Option<bool>,
}

/// Shared signal options with per-side overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalSection {
    #[serde(flatten)]
    pub base: SignalSettings,
    pub buy: SignalOverride,
    pub sell: SignalOverride,
}

impl SignalSection {
    /// Effective options for one side.
    pub fn for_side(&self, is_buy: bool) -> SignalSettings {
        if is_buy {
            self.base.merge(&self.buy)
        } else {
            self.base.merge(&self.sell)
        }
    }

    /// Default for the segment-level classifier, which compares slopes.
    pub fn segment_default() -> Self {
        Self {
            base: SignalSettings {
                divergence_algo: "slope".to_string(),
                ..SignalSettings::default()
            },
            ..Default::default()
        }
    }
}

/// Level driver options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    /// Recompute after every coarsest-level bar and yield snapshots.
    pub step: bool,
    /// Suppress the first N stepwise snapshots.
    pub skip_step: usize,
    /// Check cross-level alignment and date consistency.
    pub data_check: bool,
    pub max_misalign_count: usize,
    pub max_inconsistent_count: usize,
    pub auto_skip_missing_sub_level: bool,
    /// Clamp inconsistent low/high instead of failing.
    pub autofix: bool,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            step: false,
            skip_step: 0,
            data_check: true,
            max_misalign_count: 2,
            max_inconsistent_count: 5,
            auto_skip_missing_sub_level: false,
            autofix: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ChanSettings::default();
        assert_eq!(settings.segment.algorithm, "chan");
        assert!(settings.signal.base.divergence_rate.is_infinite());
        assert_eq!(settings.driver.max_misalign_count, 2);
        assert_eq!(settings.signal.base.types.len(), 6);
        assert_eq!(settings.segment_signal.base.divergence_algo, "slope");
    }

    #[test]
    fn test_side_override() {
        let mut section = SignalSection::default();
        section.sell.divergence_rate = Some(0.8);
        section.sell.types = Some(vec!["1".to_string()]);

        let buy = section.for_side(true);
        let sell = section.for_side(false);
        assert!(buy.divergence_rate.is_infinite());
        assert_eq!(sell.divergence_rate, 0.8);
        assert_eq!(sell.types, vec!["1".to_string()]);
        assert_eq!(sell.min_pivot_count, buy.min_pivot_count);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[stroke]
strict = false
fx_check = "half"

[segment]
algorithm = "break"

[signal]
divergence_rate = 0.9
divergence_algo = "area"

[signal.buy]
min_pivot_count = 2

[driver]
step = true
skip_step = 10
"#;
        let settings: ChanSettings = toml::from_str(toml).unwrap();
        assert!(!settings.stroke.strict);
        assert_eq!(settings.stroke.fx_check, "half");
        assert_eq!(settings.segment.algorithm, "break");
        assert_eq!(settings.signal.base.divergence_algo, "area");
        assert_eq!(settings.signal.for_side(true).min_pivot_count, 2);
        assert_eq!(settings.signal.for_side(false).min_pivot_count, 1);
        assert!(settings.driver.step);
        assert_eq!(settings.driver.skip_step, 10);
        // untouched sections keep defaults
        assert_eq!(settings.pivot.combine_mode, "zs");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chanlun.toml");

        let mut settings = ChanSettings::default();
        settings.pivot.combine_mode = "peak".to_string();
        settings.signal.sell.bsp3_peak = Some(true);
        settings.save(&path).unwrap();

        let loaded = ChanSettings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = ChanSettings::load("/nonexistent/chanlun.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read(_)));
    }
}
