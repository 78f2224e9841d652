//! Utilities for exercising `streamwire` connections in integration tests.
//!
//! [`TestBroker`] stands in for a broker on a loopback socket and lets tests
//! script replies frame by frame; [`logger`] captures log records emitted by
//! the transport.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use streamwire::{Connection, NoopProbe};
//! use streamwire_testing::TestBroker;
//!
//! # async fn example() {
//! let broker = TestBroker::bind().await;
//! let connection = Connection::new(broker.config(), Arc::new(NoopProbe));
//! connection.connect().await.expect("connect");
//! let mut session = broker.accept().await;
//! let pending = connection.send("ping".into()).await.expect("send");
//! let request = session.recv().await;
//! session.reply(request.correlation_id, "pong").await;
//! assert_eq!(&pending.await.expect("reply")[..], b"pong");
//! connection.stop().await;
//! # }
//! ```

pub mod broker;
pub mod logging;

pub use broker::{BrokerSession, STEP_TIMEOUT, TestBroker};
pub use logging::{LoggerHandle, logger};
