//! Run a [`Workload`] against a remote, phase by phase.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use crate::http::Remote;
use crate::recorder::{Record, Recorder};
use crate::retry;
use crate::scheduler::run_bounded;
use crate::workload::{CartId, Operation, Request, Workload};

const PROGRESS_TEMPLATE: &str = "{spinner} {msg:<12} {wide_bar} {pos}/{len} {elapsed}";

type Unit = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Everything that was collected during a run.
#[derive(Debug)]
pub struct RunOutcome {
    /// One record per completed logical operation, in completion order.
    pub records: Vec<Record>,
    /// Carts created by the create phase, in creation order.
    pub cart_ids: Vec<CartId>,
    /// The untracked cart created because the create phase produced no carts.
    pub fallback: Option<CartId>,
    /// The number of records the workload produces if it is not cut short.
    pub expected_records: usize,
}

impl RunOutcome {
    /// Returns `true` if every configured operation produced a record.
    ///
    /// This is `false` if the run deadline fired before the workload was finished.
    pub fn is_complete(&self) -> bool {
        self.records.len() == self.expected_records
    }

    /// The number of records for the given operation.
    pub fn count(&self, operation: Operation) -> usize {
        self.records
            .iter()
            .filter(|record| record.operation == operation)
            .count()
    }
}

/// Runs the workload against the remote, giving up on unfinished work after `timeout`.
///
/// The create, add-items and get phases run strictly one after another. When the timeout elapses,
/// no further operations are started and the run returns with fewer records than configured.
pub async fn run<R>(remote: Arc<R>, workload: &Workload, timeout: Duration) -> RunOutcome
where
    R: Remote + 'static,
{
    let cancel = CancellationToken::new();
    let deadline = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(timeout).await;
            tracing::warn!(?timeout, "run deadline reached");
            cancel.cancel();
        }
    });

    let outcome = run_until(remote, workload, &cancel).await;
    deadline.abort();

    outcome
}

/// Runs the workload against the remote until it is done or `cancel` fires.
pub async fn run_until<R>(remote: Arc<R>, workload: &Workload, cancel: &CancellationToken) -> RunOutcome
where
    R: Remote + 'static,
{
    let recorder = Arc::new(Recorder::new());

    run_phase(Operation::CreateCart, workload, cancel, {
        let remote = Arc::clone(&remote);
        let recorder = Arc::clone(&recorder);
        let cancel = cancel.clone();
        let request = workload.create_request();
        let policy = workload.retry;

        move |_index| {
            let remote = Arc::clone(&remote);
            let recorder = Arc::clone(&recorder);
            let cancel = cancel.clone();
            let request = request.clone();

            async move {
                let Some(outcome) = retry::create_cart(&*remote, &request, &policy, &cancel).await
                else {
                    return;
                };

                recorder.record(Record::new(
                    Operation::CreateCart,
                    &outcome.exchange,
                    outcome.is_success(),
                ));
                if let Some(cart_id) = outcome.cart_id {
                    recorder.push_cart_id(cart_id);
                }
            }
        }
    })
    .await;

    let fallback = if recorder.has_cart_ids() {
        None
    } else {
        fallback_create(&*remote, workload, cancel).await
    };
    let fallback_target = fallback.unwrap_or(CartId::SENTINEL);

    run_phase(
        Operation::AddItems,
        workload,
        cancel,
        single_request_unit(&remote, &recorder, cancel, fallback_target, Request::add_items),
    )
    .await;

    run_phase(
        Operation::GetCart,
        workload,
        cancel,
        single_request_unit(&remote, &recorder, cancel, fallback_target, |_index, cart_id| {
            Request::GetCart { cart_id }
        }),
    )
    .await;

    let (records, cart_ids) = recorder.take();
    let outcome = RunOutcome {
        records,
        cart_ids,
        fallback,
        expected_records: workload.expected_records(),
    };

    if !outcome.is_complete() {
        tracing::warn!(
            records = outcome.records.len(),
            expected = outcome.expected_records,
            "run finished with missing records"
        );
    }

    outcome
}

/// Creates one cart outside of the recorded workload, without retries.
async fn fallback_create<R>(remote: &R, workload: &Workload, cancel: &CancellationToken) -> Option<CartId>
where
    R: Remote + ?Sized,
{
    let exchange = remote.send(&workload.create_request(), cancel).await;

    match retry::decode_cart_id(&exchange) {
        Some(cart_id) => {
            tracing::info!(%cart_id, "created fallback cart, which is not part of the results");
            Some(cart_id)
        }
        None => {
            tracing::warn!(
                status = exchange.status_code(),
                "no cart could be created, remaining operations target cart {}",
                CartId::SENTINEL
            );
            None
        }
    }
}

/// A unit that sends one request against a created cart and records the result.
///
/// These units never retry.
fn single_request_unit<R, M>(
    remote: &Arc<R>,
    recorder: &Arc<Recorder>,
    cancel: &CancellationToken,
    fallback: CartId,
    make_request: M,
) -> impl Fn(usize) -> Unit + use<R, M>
where
    R: Remote + 'static,
    M: Fn(usize, CartId) -> Request,
{
    let remote = Arc::clone(remote);
    let recorder = Arc::clone(recorder);
    let cancel = cancel.clone();

    move |index| -> Unit {
        let request = make_request(index, recorder.target(index, fallback));
        let remote = Arc::clone(&remote);
        let recorder = Arc::clone(&recorder);
        let cancel = cancel.clone();

        Box::pin(async move {
            let exchange = remote.send(&request, &cancel).await;
            if exchange.is_canceled() {
                return;
            }

            let operation = request.operation();
            let success = exchange.status_code() == operation.expected_status();
            recorder.record(Record::new(operation, &exchange, success));
        })
    }
}

async fn run_phase<F, Fut>(operation: Operation, workload: &Workload, cancel: &CancellationToken, unit: F)
where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let n = workload.count(operation);
    tracing::info!(%operation, n, concurrency = workload.concurrency, "starting phase");

    let style = ProgressStyle::with_template(PROGRESS_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    let bar = ProgressBar::new(n as u64)
        .with_style(style)
        .with_message(operation.as_str());
    bar.enable_steady_tick(Duration::from_millis(100));

    let started = run_bounded(n, workload.concurrency, cancel, |index| {
        let task = unit(index);
        let bar = bar.clone();
        async move {
            task.await;
            bar.inc(1);
        }
    })
    .await;

    bar.finish_and_clear();
    tracing::info!(%operation, started, "phase done");
}
