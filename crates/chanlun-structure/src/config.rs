//! Typed pipeline configuration.
//!
//! [`ChanSettings`] keeps algorithm selectors as strings so that it stays a
//! plain TOML mirror. [`ChanConfig::from_settings`] turns every selector into a
//! closed enum once, before any hierarchy is built; an unknown selector is a
//! [`ChanError::Config`].

use std::str::FromStr;

use chanlun_config::{ChanSettings, DriverSettings, SignalSection, SignalSettings};
use chanlun_indicators::IndicatorSetConfig;

use crate::error::{ChanError, Result};

/// How stroke endpoints are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrokeAlgorithm {
    /// Fractal pair plus a minimum merged-candle span.
    #[default]
    Normal,
    /// Any valid opposite fractal pair, no span requirement.
    Fx,
}

/// Fractal validity check between the two ends of a stroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FxCheck {
    /// Compare against the full three-candle windows of both fractals.
    #[default]
    Strict,
    /// Compare only the two fractal candles.
    Loss,
    /// Compare the fractal candle with its neighbor on the stroke side.
    Half,
    /// The ranges of the two fractal candles must not overlap at all.
    Totally,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrokeConfig {
    pub algorithm: StrokeAlgorithm,
    pub strict: bool,
    pub fx_check: FxCheck,
    pub gap_as_candle: bool,
    pub end_is_peak: bool,
    pub allow_sub_peak: bool,
}

impl Default for StrokeConfig {
    fn default() -> Self {
        Self {
            algorithm: StrokeAlgorithm::Normal,
            strict: true,
            fx_check: FxCheck::Strict,
            gap_as_candle: false,
            end_is_peak: true,
            allow_sub_peak: true,
        }
    }
}

/// Segment grouping algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentAlgorithm {
    /// Feature-sequence fractal.
    #[default]
    Chan,
    /// Legacy peak alternation.
    Break,
    /// Legacy fixed pairwise grouping.
    OnePlusOne,
}

/// How the unconfirmed tail after the last segment is grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeftMethod {
    #[default]
    Peak,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentConfig {
    pub algorithm: SegmentAlgorithm,
    pub left_method: LeftMethod,
}

/// When two adjacent pivots of one segment merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CombineMode {
    /// The pivot bands overlap (touching counts).
    #[default]
    Zs,
    /// The peak ranges overlap.
    Peak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PivotConfig {
    pub combine: bool,
    pub combine_mode: CombineMode,
    pub one_leg_pivot: bool,
}

impl Default for PivotConfig {
    fn default() -> Self {
        Self {
            combine: true,
            combine_mode: CombineMode::Zs,
            one_leg_pivot: false,
        }
    }
}

/// Metric used to compare the entering and exiting legs of a pivot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DivergenceAlgo {
    /// MACD histogram area of the leading same-sign run.
    Area,
    /// Largest same-sign MACD histogram value.
    Peak,
    /// Whole-leg same-sign MACD histogram area.
    FullArea,
    /// MACD histogram max minus min.
    Diff,
    Slope,
    Amp,
    Volume,
    VolumeAvg,
    Amount,
    AmountAvg,
    TurnrateAvg,
    Rsi,
}

impl DivergenceAlgo {
    /// Whether a segment (as opposed to a stroke) can compute this metric.
    pub fn supports_segments(self) -> bool {
        matches!(self, DivergenceAlgo::Slope | DivergenceAlgo::Amp)
    }
}

impl FromStr for DivergenceAlgo {
    type Err = ChanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "area" | "half" => Ok(DivergenceAlgo::Area),
            "peak" => Ok(DivergenceAlgo::Peak),
            "full_area" => Ok(DivergenceAlgo::FullArea),
            "diff" => Ok(DivergenceAlgo::Diff),
            "slope" => Ok(DivergenceAlgo::Slope),
            "amp" | "amplitude" => Ok(DivergenceAlgo::Amp),
            "volume" | "volumn" => Ok(DivergenceAlgo::Volume),
            "volume_avg" | "volumn_avg" => Ok(DivergenceAlgo::VolumeAvg),
            "amount" | "turnover" => Ok(DivergenceAlgo::Amount),
            "amount_avg" | "turnover_avg" => Ok(DivergenceAlgo::AmountAvg),
            "turnrate_avg" => Ok(DivergenceAlgo::TurnrateAvg),
            "rsi" => Ok(DivergenceAlgo::Rsi),
            _ => Err(ChanError::Config(format!("unknown divergence algorithm: {s}"))),
        }
    }
}

/// Signal point type taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignalType {
    /// First class: leaves the last pivot of a trend segment with divergence.
    T1,
    /// First class without a pivot, compared against the previous same-direction leg.
    T1P,
    /// Second class: the retrace right after a first-class leg.
    T2,
    /// Second-class-like: later retraces overlapping the second-class one.
    T2S,
    /// Third class after the first class, on the first pivot of the next segment.
    T3A,
    /// Third class before the first class, against the last pivot of the segment.
    T3B,
}

impl SignalType {
    pub fn label(&self) -> &'static str {
        match self {
            SignalType::T1 => "1",
            SignalType::T1P => "1p",
            SignalType::T2 => "2",
            SignalType::T2S => "2s",
            SignalType::T3A => "3a",
            SignalType::T3B => "3b",
        }
    }

    pub fn all() -> &'static [SignalType] {
        &[
            SignalType::T1,
            SignalType::T1P,
            SignalType::T2,
            SignalType::T2S,
            SignalType::T3A,
            SignalType::T3B,
        ]
    }

    #[inline]
    pub fn is_first_class(&self) -> bool {
        matches!(self, SignalType::T1 | SignalType::T1P)
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SignalType {
    type Err = ChanError;

    fn from_str(s: &str) -> Result<Self> {
        SignalType::all()
            .iter()
            .find(|t| t.label().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| ChanError::Config(format!("unknown signal type: {s}")))
    }
}

/// Signal options for one side.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalConfig {
    pub divergence_rate: f64,
    pub min_pivot_count: usize,
    pub bsp1_only_multileg_pivot: bool,
    pub max_bsp2_rate: f64,
    pub divergence_algo: DivergenceAlgo,
    pub bsp1_peak: bool,
    pub types: Vec<SignalType>,
    pub bsp2_follows_1: bool,
    pub bsp3_follows_1: bool,
    pub bsp3_peak: bool,
    pub bsp2s_follows_2: bool,
    pub max_bsp2s_level: Option<usize>,
    pub strict_bsp3: bool,
}

impl SignalConfig {
    fn from_settings(s: &SignalSettings) -> Result<Self> {
        Ok(Self {
            divergence_rate: s.divergence_rate,
            min_pivot_count: s.min_pivot_count,
            bsp1_only_multileg_pivot: s.bsp1_only_multileg_pivot,
            max_bsp2_rate: s.max_bsp2_rate,
            divergence_algo: s.divergence_algo.parse()?,
            bsp1_peak: s.bsp1_peak,
            types: s
                .types
                .iter()
                .map(|t| t.parse())
                .collect::<Result<Vec<SignalType>>>()?,
            bsp2_follows_1: s.bsp2_follows_1,
            bsp3_follows_1: s.bsp3_follows_1,
            bsp3_peak: s.bsp3_peak,
            bsp2s_follows_2: s.bsp2s_follows_2,
            max_bsp2s_level: s.max_bsp2s_level,
            strict_bsp3: s.strict_bsp3,
        })
    }

    #[inline]
    pub fn wants(&self, ty: SignalType) -> bool {
        self.types.contains(&ty)
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            divergence_rate: f64::INFINITY,
            min_pivot_count: 1,
            bsp1_only_multileg_pivot: true,
            max_bsp2_rate: 0.9999,
            divergence_algo: DivergenceAlgo::Peak,
            bsp1_peak: true,
            types: SignalType::all().to_vec(),
            bsp2_follows_1: true,
            bsp3_follows_1: true,
            bsp3_peak: false,
            bsp2s_follows_2: false,
            max_bsp2s_level: None,
            strict_bsp3: false,
        }
    }
}

/// Buy and sell signal options.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignalSides {
    pub buy: SignalConfig,
    pub sell: SignalConfig,
}

impl SignalSides {
    fn from_section(section: &SignalSection) -> Result<Self> {
        Ok(Self {
            buy: SignalConfig::from_settings(&section.for_side(true))?,
            sell: SignalConfig::from_settings(&section.for_side(false))?,
        })
    }

    /// Same options on both sides.
    pub fn both(config: SignalConfig) -> Self {
        Self {
            buy: config.clone(),
            sell: config,
        }
    }

    #[inline]
    pub fn side(&self, is_buy: bool) -> &SignalConfig {
        if is_buy {
            &self.buy
        } else {
            &self.sell
        }
    }

    fn segment_default() -> Self {
        Self::both(SignalConfig {
            divergence_algo: DivergenceAlgo::Slope,
            ..SignalConfig::default()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    pub step: bool,
    pub skip_step: usize,
    pub data_check: bool,
    pub max_misalign_count: usize,
    pub max_inconsistent_count: usize,
    pub auto_skip_missing_sub_level: bool,
    pub autofix: bool,
}

impl From<&DriverSettings> for DriverConfig {
    fn from(s: &DriverSettings) -> Self {
        Self {
            step: s.step,
            skip_step: s.skip_step,
            data_check: s.data_check,
            max_misalign_count: s.max_misalign_count,
            max_inconsistent_count: s.max_inconsistent_count,
            auto_skip_missing_sub_level: s.auto_skip_missing_sub_level,
            autofix: s.autofix,
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::from(&DriverSettings::default())
    }
}

/// Validated configuration for a whole hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct ChanConfig {
    pub stroke: StrokeConfig,
    pub segment: SegmentConfig,
    pub pivot: PivotConfig,
    /// Stroke-level signal options.
    pub signal: SignalSides,
    /// Segment-level signal options.
    pub segment_signal: SignalSides,
    pub indicators: IndicatorSetConfig,
    pub driver: DriverConfig,
}

impl Default for ChanConfig {
    fn default() -> Self {
        Self {
            stroke: StrokeConfig::default(),
            segment: SegmentConfig::default(),
            pivot: PivotConfig::default(),
            signal: SignalSides::default(),
            segment_signal: SignalSides::segment_default(),
            indicators: IndicatorSetConfig::default(),
            driver: DriverConfig::default(),
        }
    }
}

impl ChanConfig {
    /// Validate raw settings.
    pub fn from_settings(settings: &ChanSettings) -> Result<Self> {
        let stroke = &settings.stroke;
        let stroke = StrokeConfig {
            algorithm: match stroke.algorithm.as_str() {
                "normal" => StrokeAlgorithm::Normal,
                "fx" => StrokeAlgorithm::Fx,
                other => return Err(ChanError::Config(format!("unknown stroke algorithm: {other}"))),
            },
            strict: stroke.strict,
            fx_check: match stroke.fx_check.as_str() {
                "strict" => FxCheck::Strict,
                "loss" => FxCheck::Loss,
                "half" => FxCheck::Half,
                "totally" => FxCheck::Totally,
                other => return Err(ChanError::Config(format!("unknown fx check: {other}"))),
            },
            gap_as_candle: stroke.gap_as_candle,
            end_is_peak: stroke.end_is_peak,
            allow_sub_peak: stroke.allow_sub_peak,
        };

        let segment = SegmentConfig {
            algorithm: match settings.segment.algorithm.as_str() {
                "chan" => SegmentAlgorithm::Chan,
                "break" => SegmentAlgorithm::Break,
                "1+1" => SegmentAlgorithm::OnePlusOne,
                other => return Err(ChanError::Config(format!("unknown segment algorithm: {other}"))),
            },
            left_method: match settings.segment.left_method.as_str() {
                "peak" => LeftMethod::Peak,
                "all" => LeftMethod::All,
                other => return Err(ChanError::Config(format!("unknown left method: {other}"))),
            },
        };

        let pivot = &settings.pivot;
        if pivot.algorithm != "normal" {
            return Err(ChanError::Config(format!("unknown pivot algorithm: {}", pivot.algorithm)));
        }
        let pivot = PivotConfig {
            combine: pivot.combine,
            combine_mode: match pivot.combine_mode.as_str() {
                "zs" => CombineMode::Zs,
                "peak" => CombineMode::Peak,
                other => return Err(ChanError::Config(format!("unknown pivot combine mode: {other}"))),
            },
            one_leg_pivot: pivot.one_leg_pivot,
        };

        let signal = SignalSides::from_section(&settings.signal)?;
        let segment_signal = SignalSides::from_section(&settings.segment_signal)?;
        for side in [&segment_signal.buy, &segment_signal.sell] {
            if !side.divergence_algo.supports_segments() {
                return Err(ChanError::Config(format!(
                    "segment signals support slope or amp divergence, got {:?}",
                    side.divergence_algo
                )));
            }
        }

        Ok(Self {
            stroke,
            segment,
            pivot,
            signal,
            segment_signal,
            indicators: settings.indicators.clone(),
            driver: DriverConfig::from(&settings.driver),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_default_settings_convert() {
        let config = ChanConfig::from_settings(&ChanSettings::default()).unwrap();
        assert_eq!(config, ChanConfig::default());
        assert_eq!(config.segment_signal.buy.divergence_algo, DivergenceAlgo::Slope);
        assert_eq!(config.signal.sell.types.len(), 6);
    }

    #[test]
    fn test_unknown_segment_algorithm() {
        let mut settings = ChanSettings::default();
        settings.segment.algorithm = "zigzag".to_string();
        let err = ChanConfig::from_settings(&settings).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_side_override_types() {
        let mut settings = ChanSettings::default();
        settings.signal.sell.types = Some(vec!["1".into(), "3b".into()]);
        let config = ChanConfig::from_settings(&settings).unwrap();
        assert_eq!(config.signal.sell.types, vec![SignalType::T1, SignalType::T3B]);
        assert!(config.signal.buy.wants(SignalType::T2S));
    }

    #[test]
    fn test_segment_level_rejects_macd_metrics() {
        let mut settings = ChanSettings::default();
        settings.segment_signal.base.divergence_algo = "area".to_string();
        assert!(ChanConfig::from_settings(&settings).is_err());
    }

    #[test]
    fn test_divergence_aliases() {
        assert_eq!("full-area".parse::<DivergenceAlgo>().unwrap(), DivergenceAlgo::FullArea);
        assert_eq!("turnover_avg".parse::<DivergenceAlgo>().unwrap(), DivergenceAlgo::AmountAvg);
        assert_eq!("RSI".parse::<DivergenceAlgo>().unwrap(), DivergenceAlgo::Rsi);
        assert!("macd".parse::<DivergenceAlgo>().is_err());
    }
}
