//! Command line interface of the `cartbench` binary.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use argh::FromArgs;

use crate::config::Config;
use crate::http::HttpRemote;
use crate::stats::{Comparison, RunStats};
use crate::{driver, observability, report};

/// Benchmark harness for the shopping cart service.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunCommand),
    Analyze(AnalyzeCommand),
    Compare(CompareCommand),
    Version(VersionCommand),
}

/// run the create, add-items and get phases against the service and record the results
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "run")]
struct RunCommand {
    /// base URL, e.g. http://localhost:8080 (defaults to the BASE environment variable)
    #[argh(option)]
    base: Option<String>,

    /// output JSON file
    #[argh(option)]
    out: Option<PathBuf>,

    /// concurrent operations per phase
    #[argh(option)]
    concurrency: Option<usize>,

    /// overall deadline of the run, e.g. 5m
    #[argh(option, from_str_fn(parse_duration))]
    timeout: Option<Duration>,

    #[argh(option)]
    /// number of create_cart operations
    create: Option<usize>,

    #[argh(option)]
    /// number of add_items operations
    add: Option<usize>,

    #[argh(option)]
    /// number of get_cart operations
    get: Option<usize>,

    /// retries per create operation
    #[argh(option)]
    create_retries: Option<u32>,
}

/// print the analysis of a recorded run
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "analyze")]
struct AnalyzeCommand {
    /// result file written by `run`
    #[argh(positional)]
    results: PathBuf,

    #[argh(option)]
    /// expected number of create_cart records
    create: Option<usize>,

    #[argh(option)]
    /// expected number of add_items records
    add: Option<usize>,

    #[argh(option)]
    /// expected number of get_cart records
    get: Option<usize>,
}

/// compare two recorded runs and write a combined summary
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "compare")]
struct CompareCommand {
    /// result file of the baseline run
    #[argh(positional)]
    baseline: PathBuf,

    /// result file of the candidate run
    #[argh(positional)]
    candidate: PathBuf,

    /// label of the baseline run (defaults to the file name)
    #[argh(option)]
    baseline_label: Option<String>,

    /// label of the candidate run (defaults to the file name)
    #[argh(option)]
    candidate_label: Option<String>,

    /// summary JSON file
    #[argh(option, default = "PathBuf::from(\"combined_results.json\")")]
    out: PathBuf,
}

/// print the cartbench version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|err| err.to_string())
}

impl RunCommand {
    /// Applies the command line flags on top of the loaded configuration.
    fn apply(self, config: &mut Config) {
        if let Some(base) = self.base {
            config.base_url = Some(base);
        }
        if let Some(out) = self.out {
            config.output = out;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(create) = self.create {
            config.operations.create = create;
        }
        if let Some(add) = self.add {
            config.operations.add = add;
        }
        if let Some(get) = self.get {
            config.operations.get = get;
        }
        if let Some(retries) = self.create_retries {
            config.retry.max_retries = retries;
        }
    }
}

impl AnalyzeCommand {
    fn apply(&self, config: &mut Config) {
        if let Some(create) = self.create {
            config.operations.create = create;
        }
        if let Some(add) = self.add {
            config.operations.add = add;
        }
        if let Some(get) = self.get {
            config.operations.get = get;
        }
    }
}

/// Derives a run label from the stem of a result file name.
fn label_for(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

async fn run(config: Config) -> Result<()> {
    let base_url = config
        .base_url
        .as_deref()
        .filter(|url| !url.is_empty())
        .context("missing base URL, pass --base or set BASE (e.g. --base http://localhost:8080)")?;

    let remote = HttpRemote::new(base_url, config.request_timeout)
        .context("failed to create HTTP client")?;
    let workload = config.workload();

    tracing::info!(base_url, expected = workload.expected_records(), "starting run");
    let outcome = driver::run(Arc::new(remote), &workload, config.timeout).await;

    report::write_records(&config.output, &outcome.records)
        .context("failed to write output")?;

    println!(
        "Done. Wrote {} results to {}",
        outcome.records.len(),
        config.output.display()
    );
    if !outcome.is_complete() {
        println!(
            "Run was cut short by the deadline: expected {} results",
            outcome.expected_records
        );
    }

    Ok(())
}

fn analyze(mut config: Config, command: AnalyzeCommand) -> Result<()> {
    command.apply(&mut config);
    let records = report::read_records(&command.results)?;
    let stats = RunStats::from_records(&records);

    let mut out = io::stdout().lock();
    report::write_analysis(&mut out, &label_for(&command.results), &stats, &config.workload())?;
    out.flush()?;

    Ok(())
}

fn compare(config: &Config, command: CompareCommand) -> Result<()> {
    let baseline_label = command
        .baseline_label
        .unwrap_or_else(|| label_for(&command.baseline));
    let candidate_label = command
        .candidate_label
        .unwrap_or_else(|| label_for(&command.candidate));
    anyhow::ensure!(
        baseline_label != candidate_label,
        "both runs are labelled `{baseline_label}`, pass --baseline-label or --candidate-label"
    );

    let baseline = RunStats::from_records(
        &report::read_records(&command.baseline).context("failed to load baseline results")?,
    );
    let candidate = RunStats::from_records(
        &report::read_records(&command.candidate).context("failed to load candidate results")?,
    );

    let workload = config.workload();
    let mut out = io::stdout().lock();
    report::write_analysis(&mut out, &baseline_label, &baseline, &workload)?;
    report::write_analysis(&mut out, &candidate_label, &candidate, &workload)?;
    report::write_comparison(
        &mut out,
        &baseline_label,
        &candidate_label,
        &Comparison::new(&baseline, &candidate),
    )?;

    let summary = report::summarize([
        (baseline_label.as_str(), &baseline),
        (candidate_label.as_str(), &candidate),
    ]);
    report::write_summary(&command.out, &summary).context("failed to save combined results")?;
    writeln!(out, "\nCombined results saved to {}", command.out.display())?;
    out.flush()?;

    Ok(())
}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    // Special switch to just print the version and exit.
    if let Command::Version(_) = args.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut config = Config::load(args.config.as_deref())?;
    observability::init_tracing();

    match args.command {
        Command::Run(command) => {
            command.apply(&mut config);
            tracing::debug!(?config);

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .thread_name("cartbench-rt")
                .enable_all()
                .build()?;
            runtime.block_on(run(config))
        }
        Command::Analyze(command) => analyze(config, command),
        Command::Compare(command) => compare(&config, command),
        Command::Version(VersionCommand {}) => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_from_file_names() {
        assert_eq!(
            label_for(Path::new("out/mysql_test_results.json")),
            "mysql_test_results"
        );
        assert_eq!(label_for(Path::new("dynamodb.json")), "dynamodb");
    }

    #[test]
    fn flags_override_config() {
        let args = RunCommand::from_args(
            &["cartbench", "run"],
            &[
                "--base",
                "http://localhost:9000",
                "--timeout",
                "90s",
                "--add",
                "3",
                "--create-retries",
                "1",
            ],
        )
        .unwrap();

        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.base_url.as_deref(), Some("http://localhost:9000"));
        assert_eq!(config.timeout, Duration::from_secs(90));
        assert_eq!(config.operations.add, 3);
        assert_eq!(config.operations.create, 50);
        assert_eq!(config.retry.max_retries, 1);
    }

    #[test]
    fn analyze_expectations() {
        let args = AnalyzeCommand::from_args(
            &["cartbench", "analyze"],
            &["results.json", "--get", "10"],
        )
        .unwrap();
        assert_eq!(args.results, PathBuf::from("results.json"));

        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.operations.get, 10);
        assert_eq!(config.operations.add, 50);
    }
}
