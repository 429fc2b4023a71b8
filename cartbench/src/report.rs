//! Persisting records and rendering analyses of one or two runs.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use yansi::{Color, Paint};

use crate::error::{Error, Result};
use crate::recorder::Record;
use crate::stats::{Comparison, MISSING, Metric, MetricDelta, RunStats, Verdict};
use crate::workload::{Operation, Workload};

/// Writes records as a pretty-printed JSON array.
pub fn write_records(path: &Path, records: &[Record]) -> Result<()> {
    write_json(path, records)
}

/// Reads records written by [`write_records`].
pub fn read_records(path: &Path) -> Result<Vec<Record>> {
    let file = File::open(path).map_err(|err| Error::io(path, err))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| Error::Decode {
        path: path.into(),
        source,
    })
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).map_err(|err| Error::io(path, err))?;
    let mut writer = BufWriter::new(file);

    serde_json::to_writer_pretty(&mut writer, value).map_err(Error::Encode)?;
    writeln!(writer).map_err(|err| Error::io(path, err))?;
    writer.flush().map_err(|err| Error::io(path, err))
}

/// Overall latency and success figures of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverallSummary {
    /// Mean latency of successful operations in milliseconds.
    pub avg: f64,
    /// Median latency of successful operations.
    pub p50: f64,
    /// 95th percentile latency of successful operations.
    pub p95: f64,
    /// 99th percentile latency of successful operations.
    pub p99: f64,
    /// Share of successful operations in percent.
    pub success_rate: f64,
    /// Number of recorded operations.
    pub total_ops: usize,
}

/// Latency figures of a single operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationSummary {
    /// Mean latency of successful operations in milliseconds.
    pub avg: f64,
    /// Median latency of successful operations.
    pub p50: f64,
    /// 95th percentile latency of successful operations.
    pub p95: f64,
}

/// The persisted summary of a single run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    #[allow(missing_docs)]
    pub overall: OverallSummary,
    #[allow(missing_docs)]
    pub create_cart: OperationSummary,
    #[allow(missing_docs)]
    pub add_items: OperationSummary,
    #[allow(missing_docs)]
    pub get_cart: OperationSummary,
}

impl From<&RunStats> for RunSummary {
    fn from(stats: &RunStats) -> Self {
        let overall = stats.overall();
        let operation = |operation| {
            let aggregate = stats.operation(operation);
            OperationSummary {
                avg: aggregate.mean(),
                p50: aggregate.percentile(50.0),
                p95: aggregate.percentile(95.0),
            }
        };

        Self {
            overall: OverallSummary {
                avg: overall.mean(),
                p50: overall.percentile(50.0),
                p95: overall.percentile(95.0),
                p99: overall.percentile(99.0),
                success_rate: overall.success_rate(),
                total_ops: overall.count(),
            },
            create_cart: operation(Operation::CreateCart),
            add_items: operation(Operation::AddItems),
            get_cart: operation(Operation::GetCart),
        }
    }
}

/// Summaries of several runs, keyed by run label.
pub type Summary = BTreeMap<String, RunSummary>;

/// Builds the summary of labelled runs.
pub fn summarize<'a>(runs: impl IntoIterator<Item = (&'a str, &'a RunStats)>) -> Summary {
    runs.into_iter()
        .map(|(label, stats)| (label.to_owned(), RunSummary::from(stats)))
        .collect()
}

/// Writes the summary as a pretty-printed JSON object.
pub fn write_summary(path: &Path, summary: &Summary) -> Result<()> {
    write_json(path, summary)
}

/// Formats a latency, showing missing values as `-`.
fn ms(value: f64) -> String {
    if value == MISSING {
        "-".to_owned()
    } else {
        format!("{value:.2}")
    }
}

fn rule(out: &mut impl Write, width: usize) -> io::Result<()> {
    writeln!(out, "{}", "-".repeat(width))
}

/// Renders the analysis of a single run.
///
/// Prints a warning if the per-operation counts differ from what `expected` configures.
pub fn write_analysis(
    out: &mut impl Write,
    label: &str,
    stats: &RunStats,
    expected: &Workload,
) -> io::Result<()> {
    let overall = stats.overall();
    let count = |operation| stats.operation(operation).count();

    writeln!(out)?;
    writeln!(out, "{} {}", "## Analysis".bold(), label.bold().blue())?;
    writeln!(
        out,
        "Records: {}  (create={}, add={}, get={})",
        overall.count().bold(),
        count(Operation::CreateCart),
        count(Operation::AddItems),
        count(Operation::GetCart),
    )?;

    if Operation::ALL
        .iter()
        .any(|operation| count(*operation) != expected.count(*operation))
    {
        let message = format!(
            "WARNING: counts are not {}/{}/{}, check the loader run",
            expected.count(Operation::CreateCart),
            expected.count(Operation::AddItems),
            expected.count(Operation::GetCart),
        );
        writeln!(out, "{}", message.bold().yellow())?;
    }

    writeln!(out)?;
    writeln!(out, "{:<30} | {:>12}", "Metric", label)?;
    rule(out, 45)?;
    for metric in Metric::ALL {
        let name = format!("{} Response Time", metric.name().to_uppercase());
        writeln!(out, "{name:<30} | {:>9} ms", ms(metric.of(overall)))?;
    }
    writeln!(out, "{:<30} | {:>11.2}%", "Success Rate", overall.success_rate())?;
    writeln!(out, "{:<30} | {:>12}", "Total Operations", overall.count())?;

    writeln!(out)?;
    writeln!(out, "{}", "Per-Operation Breakdown:".bold())?;
    writeln!(
        out,
        "{:<15} | {:>12} | {:>12} | {:>12} | {:>9}",
        "Operation", "Avg (ms)", "P50 (ms)", "P95 (ms)", "Success"
    )?;
    rule(out, 72)?;
    for operation in Operation::ALL {
        let aggregate = stats.operation(operation);
        writeln!(
            out,
            "{:<15} | {:>12} | {:>12} | {:>12} | {:>8.2}%",
            operation.as_str(),
            ms(aggregate.mean()),
            ms(aggregate.percentile(50.0)),
            ms(aggregate.percentile(95.0)),
            aggregate.success_rate(),
        )?;
    }

    Ok(())
}

fn write_delta_row(out: &mut impl Write, name: &str, delta: MetricDelta, unit: &str) -> io::Result<()> {
    let diff = delta.diff();
    let relative = match delta.pct_diff() {
        Some(pct) => format!(" ({pct:+.1}%)"),
        None => String::new(),
    };
    let (difference, color) = if delta.baseline == MISSING || delta.candidate == MISSING {
        ("n/a".to_owned(), Color::Primary)
    } else if diff < 0.0 {
        (format!("{diff:+.2}{relative}"), Color::Green)
    } else if diff > 0.0 {
        (format!("{diff:+.2}{relative}"), Color::Red)
    } else {
        ("0.00".to_owned(), Color::Primary)
    };

    writeln!(
        out,
        "{name:<30} | {:>9}{unit} | {:>9}{unit} | {}",
        ms(delta.baseline),
        ms(delta.candidate),
        difference.fg(color),
    )
}

/// Renders the comparison of a candidate run against a baseline run.
///
/// Negative differences mean that the candidate was faster.
pub fn write_comparison(
    out: &mut impl Write,
    baseline: &str,
    candidate: &str,
    comparison: &Comparison<'_>,
) -> io::Result<()> {
    writeln!(out)?;
    writeln!(
        out,
        "{} {} vs {}",
        "## Comparison".bold(),
        baseline.bold().blue(),
        candidate.bold().blue()
    )?;

    let scopes = std::iter::once(None).chain(Operation::ALL.map(Some));
    for scope in scopes {
        writeln!(out)?;
        match scope {
            None => writeln!(out, "{}", "Overall:".bold())?,
            Some(operation) => writeln!(out, "{}", format!("{operation}:").bold())?,
        }
        writeln!(
            out,
            "{:<30} | {:>12} | {:>12} | Difference",
            "Metric", baseline, candidate
        )?;
        rule(out, 75)?;

        for metric in Metric::ALL {
            let name = format!("{} Response Time (ms)", metric.name().to_uppercase());
            write_delta_row(out, &name, comparison.metric(scope, metric), " ms")?;
        }
        write_delta_row(out, "Success Rate (%)", comparison.success_rate(scope), "  %")?;
    }

    writeln!(out)?;
    writeln!(out, "{}", "Winner Summary:".bold())?;
    rule(out, 60)?;
    for operation in Operation::ALL {
        let delta = comparison.metric(Some(operation), Metric::Avg);
        let winner = match comparison.verdict(operation) {
            Verdict::Baseline => baseline.green(),
            Verdict::Candidate => candidate.green(),
            Verdict::Tie => "tie".yellow(),
        };
        let both_present = delta.baseline != MISSING && delta.candidate != MISSING;
        match delta.pct_diff().filter(|_| both_present) {
            Some(pct) => writeln!(out, "{:<15}: {winner} ({pct:+.1}% difference)", operation.as_str())?,
            None => writeln!(out, "{:<15}: {winner}", operation.as_str())?,
        }
    }

    let tally = comparison.tally();
    writeln!(
        out,
        "\nOverall: {baseline} wins {}, {candidate} wins {}, ties {}",
        tally.baseline_wins.bold(),
        tally.candidate_wins.bold(),
        tally.ties.bold()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::Comparison;

    fn record(operation: Operation, latency_ms: f64, success: bool) -> Record {
        Record {
            operation,
            latency_ms,
            success,
            status_code: if success { operation.expected_status() } else { 404 },
            timestamp: "2025-01-01T12:00:00Z".into(),
        }
    }

    fn stats(latencies: [f64; 3]) -> RunStats {
        RunStats::from_records(&[
            record(Operation::CreateCart, latencies[0], true),
            record(Operation::AddItems, latencies[1], true),
            record(Operation::GetCart, latencies[2], true),
            record(Operation::GetCart, 1000.0, false),
        ])
    }

    #[test]
    fn records_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let records = vec![record(Operation::CreateCart, 4.0, true)];

        write_records(&path, &records).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("[\n  {\n    \"operation\": \"create_cart\""));
        assert!(contents.ends_with("]\n"));
        assert_eq!(read_records(&path).unwrap(), records);
    }

    #[test]
    fn unwritable_output_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("results.json");

        let err = write_records(&path, &[]).unwrap_err();
        assert!(matches!(err, Error::Io { .. }), "{err}");
    }

    #[test]
    fn malformed_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        std::fs::write(&path, r#"[{"operation": "delete_cart"}]"#).unwrap();

        let err = read_records(&path).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }), "{err}");
    }

    #[test]
    fn summary_shape() {
        let baseline = stats([10.0, 20.0, 30.0]);
        let candidate = stats([12.0, 12.0, 12.0]);
        let summary = summarize([("mysql", &baseline), ("dynamodb", &candidate)]);

        let json = serde_json::to_value(&summary).unwrap();
        let mysql = &json["mysql"];
        assert_eq!(mysql["overall"]["total_ops"], 4);
        assert_eq!(mysql["overall"]["success_rate"], 75.0);
        assert_eq!(mysql["overall"]["avg"], 20.0);
        assert_eq!(mysql["create_cart"]["p50"], 10.0);
        assert_eq!(json["dynamodb"]["get_cart"]["avg"], 12.0);
        assert!(mysql["add_items"].get("p99").is_none());
    }

    #[test]
    fn summary_of_empty_run() {
        let summary = RunSummary::from(&RunStats::from_records(&[]));
        assert_eq!(summary.overall.avg, MISSING);
        assert_eq!(summary.overall.success_rate, 0.0);
        assert_eq!(summary.get_cart.p95, MISSING);
    }

    #[test]
    fn analysis_warns_about_counts() {
        yansi::disable();
        let workload = Workload::builder().operation_counts(1, 1, 2).build();

        let mut out = Vec::new();
        write_analysis(&mut out, "mysql", &stats([1.0, 2.0, 3.0]), &workload).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Records: 4  (create=1, add=1, get=2)"), "{text}");
        assert!(!text.contains("WARNING"), "{text}");

        let workload = Workload::builder().build();
        let mut out = Vec::new();
        write_analysis(&mut out, "mysql", &stats([1.0, 2.0, 3.0]), &workload).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("WARNING: counts are not 50/50/50"), "{text}");
    }

    #[test]
    fn comparison_names_winners() {
        yansi::disable();
        let baseline = stats([12.0, 20.0, 8.0]);
        let candidate = stats([13.2, 12.5, 8.5]);
        let comparison = Comparison::new(&baseline, &candidate);

        let mut out = Vec::new();
        write_comparison(&mut out, "mysql", "dynamodb", &comparison).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("create_cart    : mysql"), "{text}");
        assert!(text.contains("add_items      : dynamodb"), "{text}");
        assert!(text.contains("get_cart       : tie"), "{text}");
        assert!(text.contains("Overall: mysql wins 1, dynamodb wins 1, ties 1"), "{text}");
    }

    #[test]
    fn winner_without_successes_has_no_percentage() {
        yansi::disable();
        let baseline = stats([12.0, 20.0, 8.0]);
        let candidate = RunStats::from_records(&[
            record(Operation::CreateCart, 12.0, false),
            record(Operation::AddItems, 20.0, true),
            record(Operation::GetCart, 8.0, true),
        ]);
        let comparison = Comparison::new(&baseline, &candidate);

        let mut out = Vec::new();
        write_comparison(&mut out, "mysql", "dynamodb", &comparison).unwrap();
        let text = String::from_utf8(out).unwrap();

        let line = text
            .lines()
            .find(|line| line.starts_with("create_cart    :"))
            .unwrap();
        assert_eq!(line, "create_cart    : dynamodb");
        assert!(text.contains("add_items      : tie (+0.0% difference)"), "{text}");
    }
}
