#![crate_type = "cdylib"]
#![crate_type = "lib"]

use float_ord::FloatOrd;
use fxhash::FxHashMap as HashMap;
use lazy_static::lazy_static;
use num::bigint::BigInt;
use num::rational::BigRational;
use num::ToPrimitive;
use serde::Serialize;
use std::hash::Hash;
use std::io::Write;
use std::{fmt, io, time};
use thiserror::Error;

pub mod bincheck;
pub mod combin;
pub mod tree;

#[cfg(target_arch = "wasm32")]
mod js;

pub use bincheck::{BinarySearchSimulator, CostEstimator, TrialSimulator, TRIAL_COUNT};
pub use combin::FactorialCache;
pub use tree::Evaluator;

lazy_static! {
    static ref REFERENCE_INSTANT: time::Instant = time::Instant::now();
}

#[cfg(not(target_arch = "wasm32"))]
fn now() -> f64 {
    let reference = *REFERENCE_INSTANT; // This must run first!
    time::Instant::now().duration_since(reference).as_secs_f64()
}

#[cfg(target_arch = "wasm32")]
fn now() -> f64 {
    js::now() / 1e3
}

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Error {
    #[error("option count must be at least 1, got {0}")]
    InvalidOptionCount(usize),
    #[error("trial count must be at least 1")]
    InvalidTrialCount,
    #[error("empty target range: k min {k_min} must be below k max {k_max}")]
    EmptyRange { k_min: usize, k_max: usize },
    #[error("target score must be at least 1")]
    ZeroTarget,
    #[error("argument {value} outside the cached range [0, {limit})")]
    OutOfRange { value: usize, limit: usize },
    #[error("cannot choose {r} out of {n}")]
    InvalidCombination { n: usize, r: usize },
    #[error("target size {target} exceeds pool size {pool}")]
    TargetExceedsPool { target: usize, pool: usize },
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        io::Error::new(io::ErrorKind::InvalidInput, err)
    }
}

/// Write-once cache. An entry, once computed, is never replaced.
#[derive(Clone, Debug)]
pub struct Memo<K, V> {
    entries: HashMap<K, V>,
    hits: u32,
}

impl<K, V> Default for Memo<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::default(),
            hits: 0,
        }
    }
}

impl<K: Eq + Hash, V: Clone> Memo<K, V> {
    pub fn get_or_compute<E>(
        &mut self,
        key: K,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.entries.get(&key) {
            self.hits += 1;
            return Ok(value.clone());
        }
        let value = compute()?;
        self.entries.insert(key, value.clone());
        Ok(value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u32 {
        self.hits
    }
}

fn render_duration_secs(secs: f64) -> String {
    if !secs.is_finite() {
        format!("??")
    } else if secs >= 86400.0 {
        format!("{:.0}d", secs / 86400.0)
    } else if secs >= 3600.0 {
        format!("{:.0}h", secs / 3600.0)
    } else if secs >= 60.0 {
        format!("{:.0}min", secs / 60.0)
    } else {
        format!("{:.0}s", secs)
    }
}

pub type ProgressSink<'a> = dyn FnMut(f64, String) + 'a;

/// Fraction of a tree walk completed, given the (position, weight) of each
/// enclosing branch.
fn tree_progress(stack: &[(f64, f64)]) -> f64 {
    stack.iter().rfold(0.0, |subprogress, &(progress, weight)| {
        progress + weight * subprogress
    })
}

pub fn update_stderr_progress(progress: f64, message: String) {
    StderrLog.log(&format!("\x1b[2K\r{:6.2}%\t{}", progress * 100.0, message));
}

struct ProgressTracker<'a> {
    progress_sink: &'a mut ProgressSink<'a>,
    ticks_before_render: u32,
    ticks_total: u64,
    render_frequency: u32,
    t_start: f64,
}

impl<'a> ProgressTracker<'a> {
    const RENDER_INTERVAL: time::Duration = time::Duration::from_millis(50);

    fn new(progress_sink: &'a mut ProgressSink<'a>) -> Self {
        Self {
            progress_sink,
            ticks_before_render: 1,
            ticks_total: 1,
            render_frequency: 1,
            t_start: now(),
        }
    }

    fn tick(&mut self, query_progress: &mut dyn FnMut() -> (f64, String)) {
        self.ticks_before_render -= 1;
        if self.ticks_before_render != 0 {
            return;
        }
        let (progress, message) = query_progress();
        let elapsed = now() - self.t_start;
        let remaining = elapsed * (1.0 - progress) / progress;
        self.render_frequency = ((Self::RENDER_INTERVAL.as_secs_f64() / elapsed
            * self.ticks_total as f64) as u32)
            .clamp(self.render_frequency / 2, self.render_frequency * 2)
            .clamp(1, 1000000);
        self.ticks_before_render = self.render_frequency;
        self.ticks_total += self.render_frequency as u64;
        (self.progress_sink)(
            progress,
            format!(
                "{} elapsed | {} left | {}",
                render_duration_secs(elapsed),
                render_duration_secs(remaining),
                message,
            ),
        );
    }
}

pub trait Log {
    fn log(&self, message: &str);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StderrLog;

impl Log for StderrLog {
    fn log(&self, message: &str) {
        if message.starts_with("\x1b[2K\r") {
            eprint!("{}", message);
            io::stderr().flush().expect("flush failed");
        } else {
            eprintln!("{}", message);
        }
    }
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullLog;

impl Log for NullLog {
    fn log(&self, _message: &str) {}
}

/// Expected attempts for one target score.
#[derive(Clone, Debug, Serialize)]
pub struct SweepRow {
    pub k: usize,
    pub expected_attempts: f64,
    /// Expected attempts per correct answer.
    pub normalized: f64,
    #[serde(skip)]
    pub normalized_exact: BigRational,
}

impl SweepRow {
    fn new(k: usize, expected_attempts: &BigRational) -> Self {
        let normalized_exact = expected_attempts / BigRational::from_integer(BigInt::from(k));
        Self {
            k,
            expected_attempts: expected_attempts.to_f64().unwrap_or(f64::NAN),
            normalized: normalized_exact.to_f64().unwrap_or(f64::NAN),
            normalized_exact,
        }
    }
}

impl fmt::Display for SweepRow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.k, self.normalized)
    }
}

/// Evaluates every target score in `[k_min, k_max)` against one set of
/// caches.
#[derive(Clone, Copy, Debug)]
pub struct Sweep {
    pub k_min: usize,
    /// Exclusive. Also bounds every factorial and pool size computed.
    pub k_max: usize,
    pub option_count: usize,
    pub trial_count: u32,
    /// Seeds the binary-search simulator. `None` draws from entropy, so
    /// simulated costs differ between runs.
    pub seed: Option<u64>,
}

impl Default for Sweep {
    fn default() -> Self {
        Self {
            k_min: 1,
            k_max: 2,
            option_count: 4,
            trial_count: TRIAL_COUNT,
            seed: None,
        }
    }
}

impl Sweep {
    pub fn validate(&self) -> Result<(), Error> {
        if self.k_min == 0 {
            return Err(Error::ZeroTarget);
        }
        if self.k_max <= self.k_min {
            return Err(Error::EmptyRange {
                k_min: self.k_min,
                k_max: self.k_max,
            });
        }
        if self.option_count == 0 {
            return Err(Error::InvalidOptionCount(self.option_count));
        }
        if self.trial_count == 0 {
            return Err(Error::InvalidTrialCount);
        }
        Ok(())
    }

    pub fn run(
        &self,
        progress_sink: &mut ProgressSink,
        log: &dyn Log,
    ) -> Result<Vec<SweepRow>, Error> {
        let simulator = match self.seed {
            Some(seed) => BinarySearchSimulator::seeded(seed),
            None => BinarySearchSimulator::from_entropy(),
        };
        self.run_with(simulator, progress_sink, log)
    }

    pub fn run_with<S: TrialSimulator>(
        &self,
        simulator: S,
        progress_sink: &mut ProgressSink,
        log: &dyn Log,
    ) -> Result<Vec<SweepRow>, Error> {
        self.validate()?;
        let costs = CostEstimator::with_trial_count(simulator, self.k_max, self.trial_count)?;
        let mut evaluator = Evaluator::new(self.option_count, costs)?;
        let num_targets = (self.k_max - self.k_min) as f64;
        let mut rows = Vec::default();
        for (i, k) in (self.k_min..self.k_max).enumerate() {
            let t0 = now();
            let expected_attempts =
                evaluator.expected_attempts_with_progress(k, &mut |progress, message| {
                    (progress_sink)(
                        (i as f64 + progress) / num_targets,
                        format!("[k={}] {}", k, message),
                    )
                })?;
            let row = SweepRow::new(k, &expected_attempts);
            log.log(&format!(
                "\x1b[2K\rk = {}: {:.6} ({})\n",
                k,
                row.normalized,
                render_duration_secs(now() - t0),
            ));
            rows.push(row);
        }
        SweepStats {
            rows: &rows,
            evaluator: &evaluator,
        }
        .log_summary(log);
        Ok(rows)
    }
}

struct SweepStats<'a, S> {
    rows: &'a [SweepRow],
    evaluator: &'a Evaluator<S>,
}

impl<'a, S: TrialSimulator> SweepStats<'a, S> {
    fn log_summary(&self, log: &dyn Log) {
        let costs = self.evaluator.costs();
        log.log(&format!(
            "cache: {} factorials ({} hits), {} pool/target pairs ({} simulated, {} hits)",
            self.evaluator.factorials().len(),
            self.evaluator.factorials().hits(),
            costs.len(),
            costs.simulated_pairs(),
            costs.cache_hits(),
        ));
        log.log(&format!("tree nodes visited: {}", self.evaluator.nodes_visited()));
        let lowest = self.rows.iter().min_by_key(|row| FloatOrd(row.normalized));
        let highest = self.rows.iter().max_by_key(|row| FloatOrd(row.normalized));
        if let (Some(lowest), Some(highest)) = (lowest, highest) {
            log.log(&format!(
                "normalized attempts range from {:.4} (k = {}) to {:.4} (k = {})",
                lowest.normalized, lowest.k, highest.normalized, highest.k,
            ));
        }
    }
}
