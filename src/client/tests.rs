use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use rstest::{fixture, rstest};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::codec::Framed;

use super::{ClientError, RpcClient};
use crate::{
    config::ConnectionConfig,
    connection::ConnectionState,
    error::{RequestError, SendError},
    frame::{Frame, FrameCodec},
    probe::{CountingProbe, Probe},
    retry::{BackoffStrategy, RetryPolicy},
};

#[derive(bincode::Encode, bincode::BorrowDecode, Debug, PartialEq)]
struct Produce {
    topic: String,
    records: Vec<u32>,
}

#[derive(bincode::Encode, bincode::BorrowDecode, Debug, PartialEq)]
struct ProduceAck {
    offset: u64,
}

#[fixture]
fn probe() -> Arc<CountingProbe> { Arc::new(CountingProbe::default()) }

fn policy(attempts: u32) -> RetryPolicy {
    RetryPolicy {
        attempts,
        base_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
        strategy: BackoffStrategy::Exponential,
    }
}

fn client(addr: &str, attempts: u32, probe: &Arc<CountingProbe>) -> RpcClient {
    RpcClient::builder(ConnectionConfig::new(addr))
        .retry_policy(policy(attempts))
        .probe(Arc::clone(probe) as Arc<dyn Probe>)
        .build()
}

/// Accept connections and echo every request back, dropping the first
/// `drop_first` connections after reading one request from each.
async fn spawn_broker(drop_first: usize) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr").to_string();
    let task = tokio::spawn(async move {
        let mut dropped = 0;
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let mut framed = Framed::new(stream, FrameCodec::default());
            if dropped < drop_first {
                dropped += 1;
                let _ = framed.next().await;
                continue;
            }
            tokio::spawn(async move {
                while let Some(Ok(frame)) = framed.next().await {
                    if framed.send(frame).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    (addr, task)
}

#[rstest]
#[tokio::test]
async fn call_encodes_and_decodes_bodies(probe: Arc<CountingProbe>) {
    let (addr, broker) = spawn_broker(0).await;
    let client = client(&addr, 1, &probe);
    client.connect().await.expect("connect");

    let request = Produce {
        topic: "orders".into(),
        records: vec![1, 2, 3],
    };
    let echoed: Produce = client.call(&request).await.expect("call");
    assert_eq!(echoed, request);

    client.stop().await;
    broker.abort();
}

#[rstest]
#[tokio::test]
async fn reply_of_the_wrong_shape_is_not_retried(probe: Arc<CountingProbe>) {
    let (addr, broker) = spawn_broker(0).await;
    let client = client(&addr, 5, &probe);
    client.connect().await.expect("connect");

    let err = client
        .call::<_, Produce>(&ProduceAck { offset: u64::MAX })
        .await
        .expect_err("ack does not decode as a produce request");
    assert!(matches!(err, ClientError::Deserialize(_)), "{err:?}");
    assert_eq!(probe.snapshot().requests_sent, 1);

    client.stop().await;
    broker.abort();
}

#[rstest]
#[tokio::test]
async fn reconnects_after_the_session_drops(probe: Arc<CountingProbe>) {
    let (addr, broker) = spawn_broker(1).await;
    let client = client(&addr, 4, &probe);
    client.connect().await.expect("connect");

    let reply = client
        .call_raw(Bytes::from_static(b"fetch"))
        .await
        .expect("retried on a fresh session");
    assert_eq!(reply, Bytes::from_static(b"fetch"));
    assert_eq!(client.connection().state(), ConnectionState::Connected);
    assert_eq!(probe.snapshot().connects, 2);

    client.stop().await;
    broker.abort();
}

#[rstest]
#[tokio::test]
async fn first_call_connects_on_demand(probe: Arc<CountingProbe>) {
    let (addr, broker) = spawn_broker(0).await;
    let client = client(&addr, 2, &probe);

    let reply = client
        .call_raw(Bytes::from_static(b"api-versions"))
        .await
        .expect("mitigation connects");
    assert_eq!(reply, Bytes::from_static(b"api-versions"));

    client.stop().await;
    broker.abort();
}

#[rstest]
#[tokio::test]
async fn exhausted_retries_surface_the_last_error(probe: Arc<CountingProbe>) {
    let client = client("127.0.0.1:9", 1, &probe);
    let err = client
        .call_raw(Bytes::from_static(b"fetch"))
        .await
        .expect_err("never connected");
    assert!(
        matches!(
            err,
            ClientError::Request(RequestError::Send(SendError::NotConnected { .. }))
        ),
        "{err:?}"
    );
}

#[rstest]
#[tokio::test]
async fn stopped_client_rejects_calls_until_reconnected(probe: Arc<CountingProbe>) {
    let (addr, broker) = spawn_broker(0).await;
    let client = client(&addr, 3, &probe);
    client.connect().await.expect("connect");
    client.stop().await;

    let err = client
        .call_raw(Bytes::from_static(b"late"))
        .await
        .expect_err("stopped");
    assert!(matches!(err, ClientError::ShuttingDown));

    client.connect().await.expect("reconnect");
    let reply = client
        .call_raw(Bytes::from_static(b"again"))
        .await
        .expect("call after reconnect");
    assert_eq!(reply, Bytes::from_static(b"again"));

    client.stop().await;
    broker.abort();
}

#[rstest]
#[case::not_connected(SendError::NotConnected { addr: "b:9092".into() }, true)]
#[case::stopping(SendError::Stopping, true)]
#[case::too_large(SendError::PayloadTooLarge { len: usize::MAX }, false)]
#[case::collision(SendError::CorrelationCollision { id: 7 }, false)]
fn send_errors_are_retried_unless_fatal(#[case] error: SendError, #[case] retryable: bool) {
    use crate::retry::Retryable;

    let error = ClientError::Request(RequestError::Send(error));
    assert_eq!(error.is_retryable(), retryable);
}
