use std::{
    cell::RefCell,
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use rstest::rstest;
use tokio::time::Instant;

use super::{BackoffStrategy, RetryPolicy, Retryable, WaitOrStart, retry_with_mitigation};

#[derive(Debug, PartialEq, Eq)]
enum TestError {
    Transient(u32),
    Fatal,
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient(n) => write!(f, "transient failure {n}"),
            Self::Fatal => f.write_str("fatal failure"),
        }
    }
}

impl Retryable for TestError {
    fn is_retryable(&self) -> bool { matches!(self, Self::Transient(_)) }
}

fn policy(attempts: u32, strategy: BackoffStrategy) -> RetryPolicy {
    RetryPolicy {
        attempts,
        base_backoff: Duration::from_millis(100),
        max_backoff: Duration::from_millis(300),
        strategy,
    }
}

#[rstest]
#[case(BackoffStrategy::Fixed, [100, 100, 100, 100])]
#[case(BackoffStrategy::Exponential, [100, 200, 300, 300])]
fn delay_schedule(#[case] strategy: BackoffStrategy, #[case] expected: [u64; 4]) {
    let policy = policy(5, strategy);
    let delays: Vec<u64> = (1..=4)
        .map(|retry| u64::try_from(policy.delay_for(retry).as_millis()).expect("fits"))
        .collect();
    assert_eq!(delays, expected);
}

#[test]
fn exponential_delay_saturates() {
    let policy = policy(5, BackoffStrategy::Exponential);
    assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(300));
}

#[test]
fn normalized_clamps_bounds() {
    let policy = RetryPolicy {
        attempts: 0,
        base_backoff: Duration::from_secs(2),
        max_backoff: Duration::from_secs(1),
        strategy: BackoffStrategy::Fixed,
    }
    .normalized();
    assert_eq!(policy.attempts, 1);
    assert_eq!(policy.max_backoff, Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn retries_with_mitigation_then_backoff() {
    let events = RefCell::new(Vec::new());
    let mut attempt = 0;
    let start = Instant::now();
    let result = retry_with_mitigation(
        &policy(4, BackoffStrategy::Exponential),
        || {
            attempt += 1;
            events.borrow_mut().push(format!("attempt {attempt}"));
            let outcome = if attempt < 3 {
                Err(TestError::Transient(attempt))
            } else {
                Ok(attempt)
            };
            async move { outcome }
        },
        |err| {
            events.borrow_mut().push(format!("mitigate {err}"));
            async {}
        },
    )
    .await;

    assert_eq!(result, Ok(3));
    assert_eq!(
        events.into_inner(),
        [
            "attempt 1",
            "mitigate transient failure 1",
            "attempt 2",
            "mitigate transient failure 2",
            "attempt 3",
        ]
    );
    assert_eq!(start.elapsed(), Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn fatal_error_skips_mitigation() {
    let mitigations = AtomicUsize::new(0);
    let result: Result<(), TestError> = retry_with_mitigation(
        &policy(5, BackoffStrategy::Fixed),
        || async { Err(TestError::Fatal) },
        |_| {
            mitigations.fetch_add(1, Ordering::SeqCst);
            async {}
        },
    )
    .await;
    assert_eq!(result, Err(TestError::Fatal));
    assert_eq!(mitigations.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn exhausted_policy_returns_last_error() {
    let mut attempt = 0;
    let mut mitigations = 0;
    let result: Result<(), TestError> = retry_with_mitigation(
        &policy(3, BackoffStrategy::Fixed),
        || {
            attempt += 1;
            let n = attempt;
            async move { Err(TestError::Transient(n)) }
        },
        |_| {
            mitigations += 1;
            async {}
        },
    )
    .await;
    assert_eq!(result, Err(TestError::Transient(3)));
    assert_eq!(mitigations, 2, "no mitigation after the final attempt");
}

#[tokio::test]
async fn wait_or_start_runs_once_for_concurrent_callers() {
    let single_flight = WaitOrStart::new();
    let counter = AtomicUsize::new(0);
    let runs = &counter;
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

    let leader = single_flight.run(move || async move {
        runs.fetch_add(1, Ordering::SeqCst);
        let _ = release_rx.await;
    });
    let follower = async {
        // `join!` polls the leader first, so it already holds the slot.
        assert!(single_flight.is_running());
        single_flight
            .run(move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
            })
            .await
    };
    let release = async {
        tokio::task::yield_now().await;
        release_tx.send(()).expect("release leader");
    };
    let (led, followed, ()) = tokio::join!(leader, follower, release);

    assert!(led);
    assert!(!followed);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(single_flight.run(|| async {}).await, "idle instance starts");
}
