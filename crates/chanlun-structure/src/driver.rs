//! Multi-timeframe loading.
//!
//! The [`LevelDriver`] owns one [`Hierarchy`] per timeframe, coarsest first.
//! Each coarse bar pulls the finer bars whose timestamps do not exceed its
//! own, recursively, before the next coarse bar is read. A finer bar that
//! belongs to a later parent is held back and offered again on the next
//! coarse step, so no level ever sees data from after its parent.
//!
//! Alignment is counted as bars are linked: a coarse bar without children is
//! a misalignment, and a child stamped on a different calendar day than its
//! parent is an inconsistency. Both are logged and become fatal once their
//! configured limit is reached.

use std::collections::{BTreeMap, HashMap, VecDeque};

use chanlun_core::{Bar, Timeframe};
use chanlun_data::{BarIter, BarQuery, SourceHandle};
use chrono::NaiveDate;
use log::{info, warn};

use crate::config::{ChanConfig, DriverConfig};
use crate::error::{ChanError, Result};
use crate::hierarchy::Hierarchy;
use crate::signal::SignalPoint;

/// Loads bars into a stack of timeframes and keeps them in sync.
#[derive(Debug)]
pub struct LevelDriver {
    symbol: String,
    begin: Option<NaiveDate>,
    end: Option<NaiveDate>,
    config: ChanConfig,
    timeframes: Vec<Timeframe>,
    levels: Vec<Hierarchy>,
    feeds: Vec<VecDeque<Feed>>,
    /// Bar read ahead of its parent, per level.
    pending: Vec<Option<Bar>>,
    misaligned: usize,
    /// Children on another calendar day, keyed by (level, parent bar).
    inconsistent: BTreeMap<(usize, usize), Vec<f64>>,
}

/// One queued bar sequence.
struct Feed(BarIter);

impl std::fmt::Debug for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Feed")
    }
}

impl LevelDriver {
    /// `timeframes` must run from coarsest to finest.
    pub fn new(symbol: impl Into<String>, timeframes: Vec<Timeframe>, config: ChanConfig) -> Result<Self> {
        if timeframes.is_empty() {
            return Err(ChanError::Config("at least one timeframe is required".to_string()));
        }
        if let Some(w) = timeframes.windows(2).find(|w| w[0] <= w[1]) {
            return Err(ChanError::Config(format!(
                "timeframes must run from coarsest to finest, got {} before {}",
                w[0], w[1]
            )));
        }
        let mut driver = Self {
            symbol: symbol.into(),
            begin: None,
            end: None,
            config,
            timeframes,
            levels: Vec::new(),
            feeds: Vec::new(),
            pending: Vec::new(),
            misaligned: 0,
            inconsistent: BTreeMap::new(),
        };
        driver.reset();
        Ok(driver)
    }

    /// Restrict loads to calendar days within `[begin, end]`.
    pub fn with_range(mut self, begin: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.begin = begin;
        self.end = end;
        self
    }

    /// Drop all loaded state.
    pub fn reset(&mut self) {
        let n = self.timeframes.len();
        self.levels = self.timeframes.iter().map(|&tf| Hierarchy::new(tf, &self.config)).collect();
        self.feeds = (0..n).map(|_| VecDeque::new()).collect();
        self.pending = vec![None; n];
        self.misaligned = 0;
        self.inconsistent.clear();
    }

    fn driver_config(&self) -> &DriverConfig {
        &self.config.driver
    }

    /// Load everything `handle` has for the configured levels, then compute.
    pub fn load(&mut self, handle: &SourceHandle) -> Result<()> {
        self.open_feeds(handle)?;
        info!("loading {} at {:?} from {}", self.symbol, self.timeframes, handle.name());
        while self.ingest(0, None)? {}
        self.finish()?;
        info!("loaded {} {} bars", self.levels[0].bars().len(), self.timeframes[0]);
        Ok(())
    }

    /// Start a stepwise load. Each snapshot follows one coarsest-level bar.
    pub fn step_load(&mut self, handle: &SourceHandle) -> Result<StepLoad<'_>> {
        if !self.driver_config().step {
            return Err(ChanError::Config("stepwise loading requires driver.step".to_string()));
        }
        self.open_feeds(handle)?;
        info!("stepping {} at {:?} from {}", self.symbol, self.timeframes, handle.name());
        Ok(StepLoad {
            driver: self,
            steps: 0,
            yielded: false,
            finished: false,
        })
    }

    /// Feed caller-owned bars for one synchronized step.
    ///
    /// Levels missing from `bars` are skipped, except the coarsest, which
    /// must be present. State carries over between calls.
    pub fn trigger_load(&mut self, mut bars: HashMap<Timeframe, Vec<Bar>>) -> Result<()> {
        for (level, tf) in self.timeframes.iter().enumerate() {
            match bars.remove(tf) {
                Some(list) => self.feeds[level].push_back(Feed(Box::new(list.into_iter()))),
                None if level == 0 => {
                    return Err(ChanError::NoData(format!("{} got no bars for {tf}", self.symbol)));
                }
                None => {}
            }
        }
        while self.ingest(0, None)? {}
        if !self.driver_config().step {
            for level in &mut self.levels {
                level.recompute()?;
            }
        }
        Ok(())
    }

    fn open_feeds(&mut self, handle: &SourceHandle) -> Result<()> {
        self.reset();
        let mut kept = Vec::with_capacity(self.timeframes.len());
        let mut feeds = Vec::with_capacity(self.timeframes.len());
        for (level, &tf) in self.timeframes.iter().enumerate() {
            let query = BarQuery::new(self.symbol.clone(), tf).with_range(self.begin, self.end);
            match handle.bars(&query) {
                Ok(iter) => {
                    kept.push(tf);
                    feeds.push(iter);
                }
                Err(e) if e.is_not_found() && level > 0 && self.config.driver.auto_skip_missing_sub_level => {
                    warn!("{}: no {tf} data, skipping the level", self.symbol);
                }
                Err(e) => return Err(e.into()),
            }
        }
        if kept.len() != self.timeframes.len() {
            self.timeframes = kept;
            self.reset();
        }
        for (queue, iter) in self.feeds.iter_mut().zip(feeds) {
            queue.push_back(Feed(iter));
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if !self.driver_config().step {
            for level in &mut self.levels {
                level.recompute()?;
            }
        }
        if self.levels[0].bars().is_empty() {
            return Err(ChanError::NoData(format!("{} at {}", self.symbol, self.timeframes[0])));
        }
        Ok(())
    }

    fn next_bar(&mut self, level: usize) -> Option<Bar> {
        let queue = &mut self.feeds[level];
        while let Some(feed) = queue.front_mut() {
            if let Some(bar) = feed.0.next() {
                return Some(bar);
            }
            queue.pop_front();
        }
        None
    }

    /// Ingest the next bar of `level` and, below it, every finer bar it covers.
    ///
    /// Returns false when the level is exhausted or its next bar belongs to a
    /// later parent than `parent`.
    fn ingest(&mut self, level: usize, parent: Option<(usize, f64)>) -> Result<bool> {
        let Some(bar) = self.pending[level].take().or_else(|| self.next_bar(level)) else {
            return Ok(false);
        };
        if let Some((_, parent_time)) = parent {
            if bar.timestamp > parent_time {
                self.pending[level] = Some(bar);
                return Ok(false);
            }
        }
        let index = self.levels[level].add_bar(bar)?;
        if let Some((parent_index, _)) = parent {
            self.link(level, parent_index, index)?;
        }
        if level + 1 < self.levels.len() {
            let time = bar.timestamp;
            while self.ingest(level + 1, Some((index, time)))? {}
            self.check_aligned(level, index)?;
        }
        Ok(true)
    }

    fn link(&mut self, level: usize, parent: usize, child: usize) -> Result<()> {
        let (tf, parent_tf) = (self.timeframes[level], self.timeframes[level - 1]);
        if self.config.driver.data_check && tf.is_day_or_finer() && parent_tf.is_day_or_finer() {
            let parent_bar = self.levels[level - 1].bars()[parent].bar;
            let child_bar = self.levels[level].bars()[child].bar;
            if parent_bar.day_number() != child_bar.day_number() {
                warn!(
                    "{}: {parent_tf} bar at {} has a {tf} child at {}",
                    self.symbol, parent_bar.timestamp, child_bar.timestamp
                );
                self.inconsistent
                    .entry((level - 1, parent))
                    .or_default()
                    .push(child_bar.timestamp);
                let limit = self.config.driver.max_inconsistent_count;
                if self.inconsistent.len() >= limit {
                    return Err(ChanError::Inconsistent {
                        count: self.inconsistent.len(),
                        limit,
                    });
                }
            }
        }
        self.levels[level - 1].attach_child(parent, child);
        self.levels[level].set_parent(child, parent);
        Ok(())
    }

    fn check_aligned(&mut self, level: usize, index: usize) -> Result<()> {
        if !self.config.driver.data_check || !self.levels[level].bars()[index].children.is_empty() {
            return Ok(());
        }
        self.misaligned += 1;
        let (tf, sub_tf) = (self.timeframes[level], self.timeframes[level + 1]);
        warn!(
            "{}: {tf} bar at {} has no {sub_tf} bars",
            self.symbol,
            self.levels[level].bars()[index].timestamp()
        );
        let limit = self.config.driver.max_misalign_count;
        if self.misaligned >= limit {
            return Err(ChanError::Misaligned {
                timeframe: tf,
                sub_timeframe: sub_tf,
                count: self.misaligned,
                limit,
            });
        }
        Ok(())
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn config(&self) -> &ChanConfig {
        &self.config
    }

    /// Loaded timeframes, coarsest first. Skipped levels are not listed.
    pub fn timeframes(&self) -> &[Timeframe] {
        &self.timeframes
    }

    pub fn level(&self, index: usize) -> Option<&Hierarchy> {
        self.levels.get(index)
    }

    pub fn level_by_timeframe(&self, timeframe: Timeframe) -> Option<&Hierarchy> {
        let index = self.timeframes.iter().position(|&tf| tf == timeframe)?;
        self.levels.get(index)
    }

    pub fn levels(&self) -> &[Hierarchy] {
        &self.levels
    }

    /// Stroke-level signals of a level, oldest first.
    pub fn signals(&self, level: usize) -> Vec<&SignalPoint> {
        let mut points: Vec<&SignalPoint> = self
            .levels
            .get(level)
            .map(|h| h.signals().points().collect())
            .unwrap_or_default();
        points.sort_by(|a, b| a.time.total_cmp(&b.time));
        points
    }

    /// Segment-level signals of a level, oldest first.
    pub fn segment_signals(&self, level: usize) -> Vec<&SignalPoint> {
        let mut points: Vec<&SignalPoint> = self
            .levels
            .get(level)
            .map(|h| h.segment_signals().points().collect())
            .unwrap_or_default();
        points.sort_by(|a, b| a.time.total_cmp(&b.time));
        points
    }

    /// The `n` most recent stroke-level signals of a level, oldest first.
    pub fn latest_signals(&self, level: usize, n: usize) -> Vec<&SignalPoint> {
        let points = self.signals(level);
        let skip = points.len().saturating_sub(n);
        points.into_iter().skip(skip).collect()
    }

    /// Coarse bars found without children so far.
    pub fn misaligned_count(&self) -> usize {
        self.misaligned
    }

    /// Parent bars found with children on another day so far.
    pub fn inconsistent_count(&self) -> usize {
        self.inconsistent.len()
    }
}

/// A stepwise load in progress.
///
/// Call [`StepLoad::next_snapshot`] until it returns `None`. The first
/// `skip_step` snapshots are consumed silently; if every one was skipped, the
/// final state is still returned once.
pub struct StepLoad<'a> {
    driver: &'a mut LevelDriver,
    steps: usize,
    yielded: bool,
    finished: bool,
}

impl StepLoad<'_> {
    pub fn next_snapshot(&mut self) -> Option<Result<&LevelDriver>> {
        if self.finished {
            return None;
        }
        let skip = self.driver.config.driver.skip_step;
        loop {
            match self.driver.ingest(0, None) {
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                Ok(true) => {
                    self.steps += 1;
                    if self.steps <= skip {
                        continue;
                    }
                    self.yielded = true;
                    return Some(Ok(&*self.driver));
                }
                Ok(false) => {
                    self.finished = true;
                    if let Err(e) = self.driver.finish() {
                        return Some(Err(e));
                    }
                    if self.yielded {
                        return None;
                    }
                    self.yielded = true;
                    return Some(Ok(&*self.driver));
                }
            }
        }
    }

    /// Snapshots taken so far, skipped ones included.
    pub fn steps(&self) -> usize {
        self.steps
    }
}
