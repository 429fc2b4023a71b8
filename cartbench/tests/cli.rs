use std::path::Path;
use std::process::{Command, Output};
use std::sync::Arc;
use std::time::Duration;

use cartbench::Workload;
use cartbench::http::HttpRemote;
use cartbench::report::{self, Summary};
use cartbench::workload::Operation;
use cartbench_test::server::{Behavior, TestServer};

const CARTBENCH_EXE: &str = env!("CARGO_BIN_EXE_cartbench");

async fn cartbench(args: &[&str], base_url: Option<String>) -> Output {
    let mut command = Command::new(CARTBENCH_EXE);
    command.args(args).env_remove("BASE");
    if let Some(base_url) = base_url {
        command.env("BASE", base_url);
    }

    let output = tokio::task::spawn_blocking(move || command.output())
        .await
        .unwrap()
        .expect("Failed to spawn cartbench");

    assert!(
        output.status.success(),
        "cartbench {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

async fn run_into(server: &TestServer, out: &Path) {
    let out = out.to_str().unwrap();
    let args = ["run", "--out", out, "--create", "5", "--add", "4", "--get", "3"];
    let output = cartbench(&args, Some(server.base_url())).await;

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Done. Wrote 12 results"), "{stdout}");
}

#[tokio::test(flavor = "multi_thread")]
async fn run_then_compare() {
    let tempdir = tempfile::tempdir().unwrap();
    let mysql = tempdir.path().join("mysql.json");
    let dynamodb = tempdir.path().join("dynamodb.json");
    let combined = tempdir.path().join("combined.json");

    let server = TestServer::new().await;
    run_into(&server, &mysql).await;
    let server = TestServer::with_behavior(Behavior {
        create_failures: 1,
        ..Default::default()
    })
    .await;
    run_into(&server, &dynamodb).await;

    let records = report::read_records(&mysql).unwrap();
    assert_eq!(records.len(), 12);
    assert_eq!(
        records
            .iter()
            .filter(|r| r.operation == Operation::AddItems)
            .count(),
        4
    );

    let output = cartbench(
        &[
            "compare",
            mysql.to_str().unwrap(),
            dynamodb.to_str().unwrap(),
            "--out",
            combined.to_str().unwrap(),
        ],
        None,
    )
    .await;
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("mysql"), "{stdout}");
    assert!(stdout.contains("Overall:"), "{stdout}");

    let summary: Summary = serde_json::from_slice(&std::fs::read(&combined).unwrap()).unwrap();
    let labels: Vec<_> = summary.keys().map(String::as_str).collect();
    assert_eq!(labels, ["dynamodb", "mysql"]);
    assert_eq!(summary["mysql"].overall.total_ops, 12);
    assert_eq!(summary["mysql"].overall.success_rate, 100.0);
}

#[tokio::test]
async fn analyze_warns_about_counts() {
    let tempdir = tempfile::tempdir().unwrap();
    let results = tempdir.path().join("results.json");

    let server = TestServer::new().await;
    let remote = HttpRemote::new(&server.base_url(), Duration::from_secs(5)).unwrap();
    let workload = Workload::builder().operation_counts(2, 2, 2).build();
    let outcome = cartbench::run(Arc::new(remote), &workload, Duration::from_secs(30)).await;
    report::write_records(&results, &outcome.records).unwrap();

    let path = results.to_str().unwrap();
    let args = ["analyze", path, "--create", "2", "--add", "2", "--get", "2"];
    let output = cartbench(&args, None).await;
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("WARNING"), "{stdout}");

    let output = cartbench(&["analyze", path], None).await;
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("WARNING"), "{stdout}");
}

#[tokio::test]
async fn run_requires_base_url() {
    let output = Command::new(CARTBENCH_EXE)
        .arg("run")
        .env_remove("BASE")
        .env_remove("CARTBENCH__BASE_URL")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing base URL"), "{stderr}");
}
