use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use cartbench::http::HttpRemote;
use cartbench::retry::RetryPolicy;
use cartbench::workload::{CartId, Operation};
use cartbench::{RunOutcome, Workload};
use cartbench_test::server::{Behavior, RequestCounts, TestServer};

const TIMEOUT: Duration = Duration::from_secs(30);

fn fast_retries(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base: Duration::from_millis(1),
        cap: Duration::from_millis(4),
    }
}

async fn run(base_url: &str, workload: &Workload, timeout: Duration) -> RunOutcome {
    let remote = HttpRemote::new(base_url, Duration::from_secs(5)).unwrap();
    cartbench::run(Arc::new(remote), workload, timeout).await
}

#[tokio::test]
async fn records_every_operation() {
    cartbench_test::tracing::init();
    let server = TestServer::with_behavior(Behavior {
        fixed_cart_id: Some(7),
        ..Default::default()
    })
    .await;

    let workload = Workload::builder()
        .concurrency(2)
        .operation_counts(2, 1, 1)
        .build();
    let outcome = run(&server.base_url(), &workload, TIMEOUT).await;

    assert!(outcome.is_complete());
    assert_eq!(outcome.records.len(), 4);
    assert!(outcome.records.iter().all(|record| record.success));
    assert_eq!(outcome.cart_ids, [CartId(7), CartId(7)]);
    assert_eq!(outcome.fallback, None);

    let statuses: Vec<_> = Operation::ALL
        .iter()
        .map(|&operation| {
            let record = outcome.records.iter().find(|r| r.operation == operation);
            record.unwrap().status_code
        })
        .collect();
    assert_eq!(statuses, [201, 204, 200]);
    assert_eq!(server.item_count(7), Some(1));
}

#[tokio::test]
async fn retries_until_created() {
    let server = TestServer::with_behavior(Behavior {
        create_failures: 2,
        ..Default::default()
    })
    .await;

    let workload = Workload::builder()
        .operation_counts(1, 0, 0)
        .retry_policy(fast_retries(3))
        .build();
    let outcome = run(&server.base_url(), &workload, TIMEOUT).await;

    assert_eq!(outcome.records.len(), 1);
    let record = &outcome.records[0];
    assert_eq!(record.operation, Operation::CreateCart);
    assert_eq!(record.status_code, 201);
    assert!(record.success);
    assert_eq!(outcome.cart_ids.len(), 1);

    assert_eq!(server.requests().create, 3);
}

#[tokio::test]
async fn total_failure_keeps_counts() {
    let server = TestServer::with_behavior(Behavior {
        reject_creates: true,
        ..Default::default()
    })
    .await;

    let workload = Workload::builder()
        .operation_counts(2, 3, 4)
        .retry_policy(fast_retries(1))
        .build();
    let outcome = run(&server.base_url(), &workload, TIMEOUT).await;

    assert!(outcome.is_complete());
    assert_eq!(outcome.count(Operation::CreateCart), 2);
    assert_eq!(outcome.count(Operation::AddItems), 3);
    assert_eq!(outcome.count(Operation::GetCart), 4);
    assert!(outcome.records.iter().all(|record| !record.success));
    assert!(outcome.cart_ids.is_empty());
    assert_eq!(outcome.fallback, None);

    for record in &outcome.records {
        let expected = match record.operation {
            Operation::CreateCart => 500,
            _ => 404,
        };
        assert_eq!(record.status_code, expected);
    }

    // Two attempts per create, followed by a single fallback attempt.
    assert_eq!(
        server.requests(),
        RequestCounts {
            create: 5,
            add: 3,
            get: 4,
        }
    );
}

#[tokio::test]
async fn fallback_cart_is_not_recorded() {
    let server = TestServer::with_behavior(Behavior {
        create_failures: 2,
        ..Default::default()
    })
    .await;

    let workload = Workload::builder()
        .operation_counts(1, 2, 1)
        .retry_policy(fast_retries(1))
        .build();
    let outcome = run(&server.base_url(), &workload, TIMEOUT).await;

    assert_eq!(outcome.records.len(), 4);
    assert_eq!(outcome.count(Operation::CreateCart), 1);
    assert!(outcome.cart_ids.is_empty());

    let fallback = outcome.fallback.expect("fallback cart");
    assert_eq!(server.item_count(fallback.0), Some(2));

    let mut later = outcome
        .records
        .iter()
        .filter(|record| record.operation != Operation::CreateCart);
    assert!(later.all(|record| record.success));
}

#[tokio::test]
async fn exact_counts_with_default_workload() {
    let server = TestServer::new().await;

    let workload = Workload::builder().build();
    let outcome = run(&server.base_url(), &workload, TIMEOUT).await;

    assert_eq!(outcome.records.len(), 150);
    for operation in Operation::ALL {
        assert_eq!(outcome.count(operation), 50, "{operation}");
    }
    assert!(outcome.records.iter().all(|record| record.success));
    assert_eq!(outcome.cart_ids.len(), 50);

    // Items are spread across all carts.
    for cart_id in &outcome.cart_ids {
        assert_eq!(server.item_count(cart_id.0), Some(1));
    }
}

#[tokio::test]
async fn unreachable_service_records_failures() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let workload = Workload::builder()
        .operation_counts(2, 1, 1)
        .retry_policy(fast_retries(0))
        .build();
    let outcome = run(&format!("http://127.0.0.1:{port}"), &workload, TIMEOUT).await;

    assert_eq!(outcome.records.len(), 4);
    for record in &outcome.records {
        assert_eq!(record.status_code, 0);
        assert!(!record.success);
    }
}

#[tokio::test]
async fn deadline_cuts_run_short() {
    let server = TestServer::with_behavior(Behavior {
        latency: Some(Duration::from_millis(200)),
        ..Default::default()
    })
    .await;

    let workload = Workload::builder()
        .concurrency(1)
        .operation_counts(4, 4, 4)
        .build();
    let outcome = run(&server.base_url(), &workload, Duration::from_millis(300)).await;

    assert!(!outcome.is_complete());
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.count(Operation::CreateCart), 1);
}
