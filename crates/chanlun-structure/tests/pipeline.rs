//! End-to-end scenarios through the public API.

use std::collections::HashMap;
use std::io::Write;

use chanlun_core::{aggregate_bars, Bar, Timeframe};
use chanlun_data::{MemorySource, SourceHandle, SourceParams, SourceRegistry};
use chanlun_structure::{
    ChanConfig, ChanError, CombineMode, Direction, ErrorKind, Fractal, Hierarchy, Leg, LevelDriver,
    Pivot, SignalType,
};

const DAY: f64 = 86_400.0;

fn make_bar(time: f64, price: f64) -> Bar {
    Bar::new(time, price, price + 0.5, price - 0.5, price, 1.0)
}

/// One bar per unit move through the given turning points.
fn zigzag_bars(points: &[f64], spacing: f64) -> Vec<Bar> {
    let mut prices = vec![points[0]];
    for w in points.windows(2) {
        let steps = (w[1] - w[0]).abs().round() as usize;
        let step = (w[1] - w[0]) / steps as f64;
        prices.extend((1..=steps).map(|i| w[0] + step * i as f64));
    }
    prices
        .iter()
        .enumerate()
        .map(|(i, &p)| make_bar((i + 1) as f64 * spacing, p))
        .collect()
}

/// A wave with drifting swings, long enough to produce pivots and signals.
fn wave_bars(count: usize) -> Vec<Bar> {
    (0..count)
        .map(|i| {
            let x = i as f64;
            let price = 100.0 + (x * 0.15).sin() * 12.0 + (x * 0.031).sin() * 20.0;
            make_bar((i + 1) as f64 * 60.0, price)
        })
        .collect()
}

fn run(config: &ChanConfig, bars: &[Bar]) -> Hierarchy {
    let mut h = Hierarchy::new(Timeframe::Min1, config);
    for bar in bars {
        h.add_bar(*bar).unwrap();
    }
    if !config.driver.step {
        h.recompute().unwrap();
    }
    h
}

fn memory_handle(source: MemorySource) -> SourceHandle {
    SourceHandle::open(Box::new(source)).unwrap()
}

#[test]
fn test_v_shape_marks_the_bottom() {
    // 25 falling bars then 25 rising ones, no inclusion anywhere
    let bars: Vec<Bar> = (0..50)
        .map(|i| {
            let price = if i < 25 { 50.0 - i as f64 } else { 27.0 + (i - 25) as f64 };
            make_bar((i + 1) as f64 * 60.0, price)
        })
        .collect();
    let h = run(&ChanConfig::default(), &bars);

    assert_eq!(h.candles().len(), bars.len());
    let bottoms = h.candles().iter().filter(|c| c.fractal == Fractal::Bottom).count();
    let tops = h.candles().iter().filter(|c| c.fractal == Fractal::Top).count();
    assert_eq!((bottoms, tops), (1, 0));
    assert_eq!(h.strokes().len(), 2);
    let first = &h.strokes()[0];
    assert_eq!(first.direction, Direction::Down);
    assert_eq!(first.end_bar(), 24);
    let last = h.strokes().last().unwrap();
    assert!(last.is_up());
    assert!(!last.is_sure());

    let point = h.signals().get(0).expect("buy at the bottom");
    assert!(point.is_buy);
    assert!(point.has_type(SignalType::T1P));
    assert_eq!(point.bar, 24);
}

#[test]
fn test_batch_and_step_agree_on_sure_strokes() {
    let bars = zigzag_bars(&[20.0, 10.0, 22.0, 12.0, 25.0, 14.0, 21.0, 9.0, 18.0, 11.0, 24.0], 60.0);
    let batch = run(&ChanConfig::default(), &bars);
    let mut config = ChanConfig::default();
    config.driver.step = true;
    let step = run(&config, &bars);

    assert_eq!(batch.candles(), step.candles());
    let sure = |h: &Hierarchy| -> Vec<_> {
        h.strokes()
            .iter()
            .filter(|s| s.is_sure())
            .map(|s| (s.begin_candle, s.end_candle, s.direction))
            .collect()
    };
    assert_eq!(sure(&batch), sure(&step));
}

#[test]
fn test_recompute_is_idempotent() {
    let mut h = run(&ChanConfig::default(), &wave_bars(600));
    let before = h.clone();
    h.recompute().unwrap();
    assert_eq!(h.strokes(), before.strokes());
    assert_eq!(h.segments(), before.segments());
    assert_eq!(h.pivots(), before.pivots());
    let points = |h: &Hierarchy| h.signals().points().cloned().collect::<Vec<_>>();
    assert_eq!(points(&h), points(&before));
}

#[test]
fn test_pivot_combining_only_reduces_count() {
    let bars = wave_bars(800);
    let combined = run(&ChanConfig::default(), &bars);
    let mut config = ChanConfig::default();
    config.pivot.combine = false;
    let separate = run(&config, &bars);

    assert!(combined.pivots().len() <= separate.pivots().len());
    for pivot in combined.pivots().iter().filter(|p| !p.sub_pivots.is_empty()) {
        assert!(pivot.sub_pivots.len() >= 2);
        assert_eq!(pivot.begin_leg, pivot.sub_pivots[0].begin_leg);
        assert_eq!(pivot.end_leg, pivot.sub_pivots.last().unwrap().end_leg);
    }
}

/// Leg ranges of the pivots before any merging.
fn constituents(pivots: &[Pivot]) -> Vec<(usize, usize)> {
    pivots
        .iter()
        .flat_map(|p| {
            if p.sub_pivots.is_empty() {
                vec![(p.begin_leg, p.end_leg)]
            } else {
                p.sub_pivots.iter().map(|s| (s.begin_leg, s.end_leg)).collect()
            }
        })
        .collect()
}

#[test]
fn test_peak_and_zs_combine_share_constituents() {
    let bars = wave_bars(1200);
    let mut config = ChanConfig::default();
    config.pivot.combine_mode = CombineMode::Zs;
    let zs = run(&config, &bars);
    config.pivot.combine_mode = CombineMode::Peak;
    let peak = run(&config, &bars);

    assert_eq!(zs.strokes(), peak.strokes());
    assert!(!zs.pivots().is_empty());
    assert_eq!(constituents(zs.pivots()), constituents(peak.pivots()));

    // Merged pivots span exactly their constituents.
    for pivot in zs.pivots().iter().chain(peak.pivots()) {
        if let (Some(first), Some(last)) = (pivot.sub_pivots.first(), pivot.sub_pivots.last()) {
            assert_eq!((pivot.begin_leg, pivot.end_leg), (first.begin_leg, last.end_leg));
        }
    }
}

#[test]
fn test_signals_carry_indicator_values() {
    let h = run(&ChanConfig::default(), &wave_bars(800));
    let mut settled = 0;
    for point in h.signals().points() {
        let metrics = &h.bars()[point.bar].metrics;
        if metrics.settled {
            settled += 1;
            assert_eq!(point.feature("boll_mid"), metrics.boll.map(|b| b.mid));
            assert_eq!(point.feature("kdj_k"), metrics.kdj.map(|k| k.k));
            assert_eq!(point.feature("rsi"), Some(metrics.rsi));
        } else {
            assert_eq!(point.feature("boll_mid"), None);
        }
        assert!(point.feature("leg_amp").is_some());
    }
    assert!(settled > 0);
}

#[test]
fn test_segments_tile_the_strokes() {
    let h = run(&ChanConfig::default(), &wave_bars(800));
    let segments = h.segments();
    assert!(!segments.is_empty());
    for w in segments.windows(2) {
        assert_eq!(w[1].start_leg, w[0].end_leg + 1);
    }
    for seg in segments {
        for stroke in &h.strokes()[seg.start_leg..=seg.end_leg] {
            assert_eq!(stroke.segment_index(), Some(seg.index));
        }
    }
}

#[test]
fn test_invalid_bar_stops_the_load() {
    let mut bars = zigzag_bars(&[20.0, 10.0, 22.0], DAY);
    bars[5].high = bars[5].low - 1.0;
    let source = MemorySource::new().with_series("X", Timeframe::Day1, bars);
    let mut driver = LevelDriver::new("X", vec![Timeframe::Day1], ChanConfig::default()).unwrap();
    let err = driver.load(&memory_handle(source)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataValidity);
}

#[test]
fn test_missing_sub_level() {
    let daily = zigzag_bars(&[20.0, 10.0, 22.0], DAY);
    let source = MemorySource::new().with_series("X", Timeframe::Day1, daily);
    let handle = memory_handle(source);
    let levels = vec![Timeframe::Day1, Timeframe::Min30];

    let mut strict = LevelDriver::new("X", levels.clone(), ChanConfig::default()).unwrap();
    let err = strict.load(&handle).unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.kind(), ErrorKind::Source);

    let mut config = ChanConfig::default();
    config.driver.auto_skip_missing_sub_level = true;
    let mut lenient = LevelDriver::new("X", levels, config).unwrap();
    lenient.load(&handle).unwrap();
    assert_eq!(lenient.timeframes(), &[Timeframe::Day1]);
    assert!(lenient.level_by_timeframe(Timeframe::Min30).is_none());
}

#[test]
fn test_missing_coarsest_level_is_fatal_even_with_auto_skip() {
    let source = MemorySource::new().with_series("X", Timeframe::Min30, vec![make_bar(1800.0, 1.0)]);
    let mut config = ChanConfig::default();
    config.driver.auto_skip_missing_sub_level = true;
    let mut driver = LevelDriver::new("X", vec![Timeframe::Day1, Timeframe::Min30], config).unwrap();
    assert!(driver.load(&memory_handle(source)).unwrap_err().is_not_found());
}

#[test]
fn test_misaligned_parent_hits_the_limit() {
    // the middle day has no 60m bars
    let daily: Vec<Bar> = (0..3).map(|d| make_bar((d + 1) as f64 * DAY - 60.0, 10.0 + d as f64)).collect();
    let hourly: Vec<Bar> = [0.0, 2.0]
        .iter()
        .flat_map(|&d| (1..=4).map(move |h| make_bar(d * DAY + h as f64 * 3600.0, 10.0 + h as f64)))
        .collect();
    let source = MemorySource::new()
        .with_series("X", Timeframe::Day1, daily)
        .with_series("X", Timeframe::Min60, hourly);
    let handle = memory_handle(source);
    let levels = vec![Timeframe::Day1, Timeframe::Min60];

    let mut config = ChanConfig::default();
    config.driver.max_misalign_count = 1;
    let mut driver = LevelDriver::new("X", levels.clone(), config).unwrap();
    let err = driver.load(&handle).unwrap_err();
    assert!(matches!(err, ChanError::Misaligned { count: 1, limit: 1, .. }));

    let mut tolerant = LevelDriver::new("X", levels, ChanConfig::default()).unwrap();
    tolerant.load(&handle).unwrap();
    assert_eq!(tolerant.misaligned_count(), 1);
    assert!(tolerant.level(0).unwrap().bars()[1].children.is_empty());
}

#[test]
fn test_children_on_another_day_are_inconsistent() {
    // each daily bar claims the first 60m bar of the following day
    let daily: Vec<Bar> = (0..4).map(|d| make_bar((d + 1) as f64 * DAY + 3600.0, 10.0 + d as f64)).collect();
    let hourly: Vec<Bar> = (0..4)
        .flat_map(|d| (1..=3).map(move |h| make_bar(d as f64 * DAY + h as f64 * 3600.0, 10.0 + h as f64)))
        .collect();
    let source = MemorySource::new()
        .with_series("X", Timeframe::Day1, daily)
        .with_series("X", Timeframe::Min60, hourly);
    let mut config = ChanConfig::default();
    config.driver.max_inconsistent_count = 2;
    let mut driver = LevelDriver::new("X", vec![Timeframe::Day1, Timeframe::Min60], config).unwrap();
    let err = driver.load(&memory_handle(source)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Alignment);
    assert!(matches!(err, ChanError::Inconsistent { count: 2, limit: 2 }));
}

#[test]
fn test_trigger_load_matches_batch_load() {
    let bars = zigzag_bars(&[20.0, 10.0, 22.0, 12.0, 25.0, 14.0, 21.0], DAY);
    let source = MemorySource::new().with_series("X", Timeframe::Day1, bars.clone());
    let mut batch = LevelDriver::new("X", vec![Timeframe::Day1], ChanConfig::default()).unwrap();
    batch.load(&memory_handle(source)).unwrap();

    let mut pushed = LevelDriver::new("X", vec![Timeframe::Day1], ChanConfig::default()).unwrap();
    for chunk in bars.chunks(10) {
        let mut input = HashMap::new();
        input.insert(Timeframe::Day1, chunk.to_vec());
        pushed.trigger_load(input).unwrap();
    }

    let (a, b) = (batch.level(0).unwrap(), pushed.level(0).unwrap());
    assert_eq!(a.candles(), b.candles());
    assert_eq!(a.strokes(), b.strokes());
}

#[test]
fn test_csv_source_through_registry() {
    let dir = tempfile::tempdir().unwrap();
    let bars = zigzag_bars(&[20.0, 10.0, 22.0, 12.0, 25.0], DAY);
    let mut file = std::fs::File::create(dir.path().join("TEST_1d.csv")).unwrap();
    writeln!(file, "time,open,high,low,close,volume").unwrap();
    for bar in &bars {
        writeln!(file, "{},{},{},{},{},{}", bar.timestamp, bar.open, bar.high, bar.low, bar.close, bar.volume).unwrap();
    }
    drop(file);

    let registry = SourceRegistry::with_defaults();
    let source = registry.create("csv", &SourceParams::with_root(dir.path())).unwrap();
    let mut handle = SourceHandle::open(source).unwrap();
    let mut driver = LevelDriver::new("TEST", vec![Timeframe::Day1], ChanConfig::default()).unwrap();
    driver.load(&handle).unwrap();
    handle.close();

    let level = driver.level(0).unwrap();
    assert_eq!(level.bars().len(), bars.len());
    assert!(level.strokes().len() >= 3);
    assert!(matches!(driver.load(&handle), Err(ChanError::Source(_))));
}

#[test]
fn test_every_fine_bar_lands_under_its_aggregate() {
    // six 60m bars per day, daily bars built from them
    let hourly: Vec<Bar> = wave_bars(600)
        .into_iter()
        .enumerate()
        .map(|(i, mut bar)| {
            bar.timestamp = (i / 6) as f64 * DAY + ((i % 6) + 10) as f64 * 3600.0;
            bar
        })
        .collect();
    let daily = aggregate_bars(&hourly, Timeframe::Day1);
    let source = MemorySource::new()
        .with_series("X", Timeframe::Day1, daily.clone())
        .with_series("X", Timeframe::Min60, hourly.clone());
    let mut driver =
        LevelDriver::new("X", vec![Timeframe::Day1, Timeframe::Min60], ChanConfig::default()).unwrap();
    driver.load(&memory_handle(source)).unwrap();

    let (coarse, fine) = (driver.level(0).unwrap(), driver.level(1).unwrap());
    assert_eq!(coarse.bars().len(), daily.len());
    assert_eq!(fine.bars().len(), hourly.len());
    assert_eq!(driver.misaligned_count(), 0);
    assert_eq!(driver.inconsistent_count(), 0);
    for unit in coarse.bars() {
        assert_eq!(unit.children.len(), 6);
        for &child in &unit.children {
            assert_eq!(fine.bars()[child].parent, Some(unit.index));
            assert!(fine.bars()[child].timestamp() <= unit.timestamp());
        }
    }
    assert!(!fine.strokes().is_empty());
    let times: Vec<f64> = driver.signals(1).iter().map(|p| p.time).collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
}
