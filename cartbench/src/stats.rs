//! Latency statistics over recorded runs, and comparison of two runs.
//!
//! All latency statistics are computed over *successful* operations only. Empty inputs produce
//! the [`MISSING`] sentinel instead of an error, so that a run without any successes can still be
//! reported.

use crate::recorder::Record;
use crate::workload::Operation;

/// Sentinel returned by [`mean`] and [`percentile`] for empty samples.
pub const MISSING: f64 = -1.0;

/// Mean latency differences up to this many milliseconds are considered a tie.
pub const TIE_THRESHOLD_MS: f64 = 1.0;

/// Arithmetic mean of the samples, or [`MISSING`] if there are none.
pub fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return MISSING;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// The `p`-th percentile of sorted samples, linearly interpolated between order statistics.
///
/// `p` is clamped to `[0, 100]`. Returns [`MISSING`] if there are no samples.
///
/// ```
/// use cartbench::stats::percentile;
///
/// let samples = [10.0, 20.0, 30.0, 40.0];
/// assert_eq!(percentile(&samples, 0.0), 10.0);
/// assert_eq!(percentile(&samples, 50.0), 25.0);
/// assert_eq!(percentile(&samples, 100.0), 40.0);
/// ```
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    let Some(last) = sorted.len().checked_sub(1) else {
        return MISSING;
    };

    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 100.0) };
    let rank = p / 100.0 * last as f64;
    let lower = (rank.floor() as usize).min(last);
    let fraction = rank - lower as f64;

    match sorted.get(lower + 1) {
        Some(upper) => sorted[lower] + fraction * (upper - sorted[lower]),
        None => sorted[lower],
    }
}

/// Counts and sorted latencies of a group of records.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Aggregate {
    count: usize,
    successes: usize,
    latencies: Vec<f64>,
    success_latencies: Vec<f64>,
}

impl Aggregate {
    fn push(&mut self, record: &Record) {
        self.count += 1;
        self.latencies.push(record.latency_ms);
        if record.success {
            self.successes += 1;
            self.success_latencies.push(record.latency_ms);
        }
    }

    fn finish(&mut self) {
        self.latencies.sort_by(f64::total_cmp);
        self.success_latencies.sort_by(f64::total_cmp);
    }

    /// Number of records.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Number of successful records.
    pub fn successes(&self) -> usize {
        self.successes
    }

    /// Latencies of all records, sorted ascending.
    pub fn latencies(&self) -> &[f64] {
        &self.latencies
    }

    /// Latencies of successful records, sorted ascending.
    pub fn success_latencies(&self) -> &[f64] {
        &self.success_latencies
    }

    /// Mean latency of successful records, or [`MISSING`].
    pub fn mean(&self) -> f64 {
        mean(&self.success_latencies)
    }

    /// Latency percentile of successful records, or [`MISSING`].
    pub fn percentile(&self, p: f64) -> f64 {
        percentile(&self.success_latencies, p)
    }

    /// Share of successful records in percent, `0` if there are no records.
    pub fn success_rate(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        100.0 * self.successes as f64 / self.count as f64
    }
}

/// Aggregates of one run, overall and per operation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunStats {
    overall: Aggregate,
    operations: [Aggregate; 3],
}

fn slot(operation: Operation) -> usize {
    match operation {
        Operation::CreateCart => 0,
        Operation::AddItems => 1,
        Operation::GetCart => 2,
    }
}

impl RunStats {
    /// Computes the aggregates of a run.
    pub fn from_records(records: &[Record]) -> Self {
        let mut stats = Self::default();
        for record in records {
            stats.overall.push(record);
            stats.operations[slot(record.operation)].push(record);
        }

        stats.overall.finish();
        for aggregate in &mut stats.operations {
            aggregate.finish();
        }
        stats
    }

    /// The aggregate over all records.
    pub fn overall(&self) -> &Aggregate {
        &self.overall
    }

    /// The aggregate over records of a single operation.
    pub fn operation(&self, operation: Operation) -> &Aggregate {
        &self.operations[slot(operation)]
    }

    /// The aggregate for an operation, or the overall aggregate for `None`.
    pub fn scope(&self, operation: Option<Operation>) -> &Aggregate {
        match operation {
            Some(operation) => self.operation(operation),
            None => self.overall(),
        }
    }
}

/// A latency statistic reported for every run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Metric {
    /// Mean latency.
    Avg,
    /// Median latency.
    P50,
    /// 95th percentile latency.
    P95,
    /// 99th percentile latency.
    P99,
}

impl Metric {
    /// All metrics in reporting order.
    pub const ALL: [Metric; 4] = [Self::Avg, Self::P50, Self::P95, Self::P99];

    /// Short, lowercase name used in summaries.
    pub fn name(self) -> &'static str {
        match self {
            Self::Avg => "avg",
            Self::P50 => "p50",
            Self::P95 => "p95",
            Self::P99 => "p99",
        }
    }

    /// Evaluates the metric on an aggregate.
    pub fn of(self, aggregate: &Aggregate) -> f64 {
        match self {
            Self::Avg => aggregate.mean(),
            Self::P50 => aggregate.percentile(50.0),
            Self::P95 => aggregate.percentile(95.0),
            Self::P99 => aggregate.percentile(99.0),
        }
    }
}

/// The same metric measured on a baseline and a candidate run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MetricDelta {
    /// Value in the baseline run.
    pub baseline: f64,
    /// Value in the candidate run.
    pub candidate: f64,
}

impl MetricDelta {
    /// `candidate - baseline`. Negative values mean the candidate is faster.
    pub fn diff(&self) -> f64 {
        self.candidate - self.baseline
    }

    /// The difference relative to the baseline in percent.
    ///
    /// Returns `None` if the baseline is not positive, which includes [`MISSING`].
    pub fn pct_diff(&self) -> Option<f64> {
        (self.baseline > 0.0).then(|| self.diff() / self.baseline * 100.0)
    }
}

/// Which run performed better for an operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verdict {
    /// The baseline has the lower mean latency.
    Baseline,
    /// The candidate has the lower mean latency.
    Candidate,
    /// The mean latencies differ by at most [`TIE_THRESHOLD_MS`].
    Tie,
}

impl Verdict {
    /// Compares two mean latencies.
    ///
    /// The means are compared as they are, so a [`MISSING`] mean counts as the lower one.
    pub fn from_means(baseline: f64, candidate: f64) -> Self {
        let diff = candidate - baseline;
        if diff < -TIE_THRESHOLD_MS {
            Self::Candidate
        } else if diff > TIE_THRESHOLD_MS {
            Self::Baseline
        } else {
            Self::Tie
        }
    }
}

/// Number of operations won by either run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Tally {
    /// Operations where the baseline was faster.
    pub baseline_wins: usize,
    /// Operations where the candidate was faster.
    pub candidate_wins: usize,
    /// Operations without a significant difference.
    pub ties: usize,
}

/// Side-by-side view of two independently recorded runs.
#[derive(Clone, Copy, Debug)]
pub struct Comparison<'a> {
    baseline: &'a RunStats,
    candidate: &'a RunStats,
}

impl<'a> Comparison<'a> {
    /// Compares `candidate` against `baseline`.
    pub fn new(baseline: &'a RunStats, candidate: &'a RunStats) -> Self {
        Self {
            baseline,
            candidate,
        }
    }

    /// The metric for an operation, or overall for `None`, in both runs.
    pub fn metric(&self, operation: Option<Operation>, metric: Metric) -> MetricDelta {
        MetricDelta {
            baseline: metric.of(self.baseline.scope(operation)),
            candidate: metric.of(self.candidate.scope(operation)),
        }
    }

    /// The success rate for an operation, or overall for `None`, in both runs.
    pub fn success_rate(&self, operation: Option<Operation>) -> MetricDelta {
        MetricDelta {
            baseline: self.baseline.scope(operation).success_rate(),
            candidate: self.candidate.scope(operation).success_rate(),
        }
    }

    /// Which run had the lower mean latency for the operation.
    pub fn verdict(&self, operation: Operation) -> Verdict {
        let delta = self.metric(Some(operation), Metric::Avg);
        Verdict::from_means(delta.baseline, delta.candidate)
    }

    /// Counts the verdicts over all operations.
    pub fn tally(&self) -> Tally {
        let mut tally = Tally::default();
        for operation in Operation::ALL {
            match self.verdict(operation) {
                Verdict::Baseline => tally.baseline_wins += 1,
                Verdict::Candidate => tally.candidate_wins += 1,
                Verdict::Tie => tally.ties += 1,
            }
        }
        tally
    }
}
