//! Integration tests for client retries and shared reconnects.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use futures::future::join_all;
use rstest::{fixture, rstest};
use streamwire::{
    ClientError,
    ConnectionState,
    CountingProbe,
    Probe,
    RpcClient,
    retry::{BackoffStrategy, RetryPolicy},
};
use streamwire_testing::{STEP_TIMEOUT, TestBroker};
use tokio::time::{Instant, sleep, timeout};

#[fixture]
fn probe() -> Arc<CountingProbe> { Arc::new(CountingProbe::default()) }

fn fast_policy(attempts: u32) -> RetryPolicy {
    RetryPolicy {
        attempts,
        base_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(50),
        strategy: BackoffStrategy::Fixed,
    }
}

async fn wait_for_state(client: &RpcClient, state: ConnectionState) {
    timeout(STEP_TIMEOUT, async {
        while client.connection().state() != state {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("connection reached the expected state");
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_reconnect(probe: Arc<CountingProbe>) {
    let broker = TestBroker::bind().await;
    let client = RpcClient::builder(broker.config())
        .retry_policy(fast_policy(5))
        .probe(Arc::clone(&probe) as Arc<dyn Probe>)
        .build();
    client.connect().await.expect("initial connect");

    drop(broker.accept().await);
    wait_for_state(&client, ConnectionState::Closed).await;
    let echo = broker.spawn_echo();

    let calls = (0..8_u8).map(|i| client.call_raw(Bytes::from(vec![i; 4])));
    let replies = join_all(calls).await;
    for (i, reply) in (0_u8..).zip(replies) {
        assert_eq!(reply.expect("call succeeds after reconnect"), vec![i; 4]);
    }
    assert_eq!(probe.snapshot().connects, 2, "exactly one reconnect");

    client.stop().await;
    echo.abort();
}

#[rstest]
#[tokio::test]
async fn stop_rejects_calls_without_retrying(probe: Arc<CountingProbe>) {
    let broker = TestBroker::bind().await;
    let client = RpcClient::builder(broker.config())
        .retry_policy(fast_policy(3))
        .probe(Arc::clone(&probe) as Arc<dyn Probe>)
        .build();
    client.connect().await.expect("connect");
    let _session = broker.accept().await;

    client.stop().await;
    let err = client
        .call_raw(Bytes::from_static(b"late"))
        .await
        .expect_err("client stopped");
    assert!(matches!(err, ClientError::ShuttingDown), "{err:?}");
    assert_eq!(probe.snapshot().connects, 1);
    assert_eq!(client.connection().state(), ConnectionState::Closed);
}

#[rstest]
#[tokio::test]
async fn unreachable_broker_exhausts_the_policy(probe: Arc<CountingProbe>) {
    let addr = {
        let broker = TestBroker::bind().await;
        broker.addr()
    };
    let client = RpcClient::builder(streamwire::ConnectionConfig::new(addr.to_string()))
        .retry_policy(fast_policy(3))
        .probe(Arc::clone(&probe) as Arc<dyn Probe>)
        .build();

    let err = client
        .call_raw(Bytes::from_static(b"nobody home"))
        .await
        .expect_err("no broker listening");
    assert!(
        matches!(
            err,
            ClientError::Request(streamwire::RequestError::Send(
                streamwire::SendError::NotConnected { .. }
            ))
        ),
        "{err:?}"
    );
    assert_eq!(probe.snapshot().requests_sent, 0);
    assert_eq!(probe.snapshot().connection_errors, 2, "one reconnect per retry");

    client.stop().await;
}

fn slow_policy() -> RetryPolicy {
    RetryPolicy {
        attempts: 3,
        base_backoff: Duration::from_secs(2),
        max_backoff: Duration::from_secs(2),
        strategy: BackoffStrategy::Fixed,
    }
}

#[rstest]
#[tokio::test]
async fn stop_interrupts_a_call_awaiting_its_reply(probe: Arc<CountingProbe>) {
    let broker = TestBroker::bind().await;
    let client = RpcClient::builder(broker.config())
        .retry_policy(slow_policy())
        .probe(Arc::clone(&probe) as Arc<dyn Probe>)
        .build();
    client.connect().await.expect("connect");
    let mut session = broker.accept().await;

    let call = client.call_raw(Bytes::from_static(b"unanswered"));
    let stop = async {
        session.recv().await;
        let started = Instant::now();
        client.stop().await;
        started.elapsed()
    };
    let (result, stop_took) = tokio::join!(call, stop);

    assert!(matches!(result, Err(ClientError::ShuttingDown)), "{result:?}");
    assert!(
        stop_took < Duration::from_millis(500),
        "stop waited out the backoff: {stop_took:?}"
    );
    assert_eq!(probe.snapshot().requests_sent, 1, "no second attempt");
}

#[rstest]
#[tokio::test]
async fn stop_interrupts_a_call_sleeping_between_attempts(probe: Arc<CountingProbe>) {
    let addr = {
        let broker = TestBroker::bind().await;
        broker.addr()
    };
    let client = RpcClient::builder(streamwire::ConnectionConfig::new(addr.to_string()))
        .retry_policy(slow_policy())
        .probe(Arc::clone(&probe) as Arc<dyn Probe>)
        .build();

    let call = client.call_raw(Bytes::from_static(b"nobody home"));
    let stop = async {
        timeout(STEP_TIMEOUT, async {
            while probe.snapshot().connection_errors == 0 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("first reconnect failed");
        let started = Instant::now();
        client.stop().await;
        started.elapsed()
    };
    let (result, stop_took) = tokio::join!(call, stop);

    assert!(matches!(result, Err(ClientError::ShuttingDown)), "{result:?}");
    assert!(
        stop_took < Duration::from_millis(500),
        "stop waited out the backoff: {stop_took:?}"
    );
    assert_eq!(probe.snapshot().connection_errors, 1);
}
