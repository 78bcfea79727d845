//! Scan CSV bars for strokes, segments, pivots and signal points.
//!
//! Loads one symbol at one or more timeframes from a directory of CSV files,
//! runs the structural pipeline and prints a summary per level along with
//! the most recent signal points.
//!
//! Usage: chanlun-scan <CSV_DIR> <SYMBOL> [--levels 1d,30m] [--config PATH]
//!        [--begin YYYY-MM-DD] [--end YYYY-MM-DD] [--step] [--skip N] [--last N]

use std::collections::HashSet;
use std::env;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chanlun_config::ChanSettings;
use chanlun_core::Timeframe;
use chanlun_data::{SourceHandle, SourceParams, SourceRegistry};
use chanlun_structure::{ChanConfig, Hierarchy, LevelDriver, SignalPoint};
use chrono::{DateTime, NaiveDate};
use log::info;

struct Args {
    csv_dir: String,
    symbol: String,
    levels: Vec<Timeframe>,
    config_path: Option<String>,
    begin: Option<NaiveDate>,
    end: Option<NaiveDate>,
    step: bool,
    skip: Option<usize>,
    last: usize,
}

fn usage() -> ! {
    eprintln!(
        "Usage: chanlun-scan <CSV_DIR> <SYMBOL> [--levels 1d,30m] [--config PATH] \
         [--begin YYYY-MM-DD] [--end YYYY-MM-DD] [--step] [--skip N] [--last N]"
    );
    std::process::exit(2);
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date: {s}"))
}

fn parse_args() -> Result<Args> {
    let args: Vec<String> = env::args().collect();
    let mut positional = Vec::new();
    let mut levels = vec![Timeframe::Day1];
    let mut config_path = None;
    let mut begin = None;
    let mut end = None;
    let mut step = false;
    let mut skip = None;
    let mut last = 5;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--levels" if i + 1 < args.len() => {
                levels = args[i + 1]
                    .split(',')
                    .map(|s| s.trim().parse::<Timeframe>())
                    .collect::<Result<Vec<_>, _>>()?;
                i += 2;
            }
            "--config" if i + 1 < args.len() => {
                config_path = Some(args[i + 1].clone());
                i += 2;
            }
            "--begin" if i + 1 < args.len() => {
                begin = Some(parse_date(&args[i + 1])?);
                i += 2;
            }
            "--end" if i + 1 < args.len() => {
                end = Some(parse_date(&args[i + 1])?);
                i += 2;
            }
            "--skip" if i + 1 < args.len() => {
                skip = Some(args[i + 1].parse().context("--skip expects a count")?);
                i += 2;
            }
            "--last" if i + 1 < args.len() => {
                last = args[i + 1].parse().context("--last expects a count")?;
                i += 2;
            }
            "--step" => {
                step = true;
                i += 1;
            }
            "-h" | "--help" => usage(),
            other if other.starts_with("--") => bail!("unknown option: {other}"),
            other => {
                positional.push(other.to_string());
                i += 1;
            }
        }
    }

    let [csv_dir, symbol] = <[String; 2]>::try_from(positional).unwrap_or_else(|_| usage());
    // Coarsest first
    levels.sort_by(|a, b| b.cmp(a));
    levels.dedup();

    Ok(Args {
        csv_dir,
        symbol,
        levels,
        config_path,
        begin,
        end,
        step,
        skip,
        last,
    })
}

fn load_config(args: &Args) -> Result<ChanConfig> {
    let settings = match &args.config_path {
        Some(path) => ChanSettings::load(path).with_context(|| format!("loading {path}"))?,
        None => ChanSettings::load_default(),
    };
    let mut config = ChanConfig::from_settings(&settings)?;
    if args.step {
        config.driver.step = true;
    }
    if let Some(skip) = args.skip {
        config.driver.skip_step = skip;
    }
    Ok(config)
}

fn format_time(ts: f64) -> String {
    DateTime::from_timestamp(ts as i64, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| format!("{ts}"))
}

fn format_point(point: &SignalPoint) -> String {
    let mut line = format!(
        "{} {:<5} {:<4} leg {:>4} bar {:>6}",
        format_time(point.time),
        point.type_label(),
        if point.is_buy { "buy" } else { "sell" },
        point.leg,
        point.bar,
    );
    if let Some(rate) = point.feature("divergence_rate") {
        line.push_str(&format!("  divergence {rate:.3}"));
    }
    line
}

fn print_level(level: &Hierarchy) {
    println!(
        "[{}] {} bars, {} candles, {} strokes, {} segments, {} pivots, {} signals",
        level.timeframe(),
        level.bars().len(),
        level.candles().len(),
        level.strokes().len(),
        level.segments().len(),
        level.pivots().len(),
        level.signals().len(),
    );
    println!(
        "     {} segments of segments, {} segment pivots, {} segment signals",
        level.segment_segments().len(),
        level.segment_pivots().len(),
        level.segment_signals().len(),
    );
}

fn main() -> Result<()> {
    env_logger::init();
    let start_time = Instant::now();

    let args = parse_args()?;
    let config = load_config(&args)?;

    let registry = SourceRegistry::with_defaults();
    let source = registry.create("csv", &SourceParams::with_root(&args.csv_dir))?;
    let mut handle = SourceHandle::open(source)?;

    let mut driver = LevelDriver::new(args.symbol.clone(), args.levels.clone(), config)?
        .with_range(args.begin, args.end);

    if driver.config().driver.step {
        let mut steps = driver.step_load(&handle)?;
        let mut reported = HashSet::new();
        while let Some(snapshot) = steps.next_snapshot() {
            let snapshot = snapshot?;
            for point in snapshot.signals(0) {
                if reported.insert((point.leg, point.is_buy, point.type_label())) {
                    println!("{}", format_point(point));
                }
            }
        }
        info!("stepped through {} bars", steps.steps());
    } else {
        driver.load(&handle)?;
    }
    handle.close();

    println!();
    for level in driver.levels() {
        print_level(level);
    }
    for (index, tf) in driver.timeframes().iter().enumerate() {
        let points = driver.latest_signals(index, args.last);
        if points.is_empty() {
            continue;
        }
        println!();
        println!("Latest {tf} signals:");
        for point in points {
            println!("  {}", format_point(point));
        }
    }

    info!("done in {:.2?}", start_time.elapsed());
    Ok(())
}
