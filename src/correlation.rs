//! Correlation table routing replies to their waiting callers.
//!
//! Each request on a connection is tagged with a correlation id that the
//! peer echoes in its reply. [`CorrelationTable`] hands out ids, owns one
//! single-assignment completion per outstanding id, and resolves it exactly
//! once: either with the matching reply or with the error passed to
//! [`CorrelationTable::fail_all`].
//!
//! Requests must be registered before their bytes reach the wire so a reply
//! racing the write path is never lost.

use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll},
};

use bytes::Bytes;
use log::{debug, error, warn};
use tokio::sync::oneshot;

use crate::{
    admission::AdmissionGuard,
    error::{SendError, TransportError},
    probe::Probe,
};

type Completion = oneshot::Sender<Result<Bytes, TransportError>>;

struct Pending {
    completion: Completion,
    // Released when the entry is removed, whichever way it completes.
    _admission: Option<AdmissionGuard>,
}

#[derive(Default)]
struct TableState {
    last_id: u32,
    pending: HashMap<u32, Pending>,
    sealed: bool,
}

/// Map of outstanding correlation ids to their completions.
pub struct CorrelationTable {
    state: Mutex<TableState>,
    probe: Arc<dyn Probe>,
}

impl std::fmt::Debug for CorrelationTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("CorrelationTable")
            .field("last_id", &state.last_id)
            .field("pending", &state.pending.len())
            .field("sealed", &state.sealed)
            .finish()
    }
}

impl CorrelationTable {
    /// Create an empty, open table.
    #[must_use]
    pub fn new(probe: Arc<dyn Probe>) -> Self {
        Self {
            state: Mutex::new(TableState::default()),
            probe,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the next correlation id.
    ///
    /// Ids increase by one per call, wrapping at `u32::MAX`.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::CorrelationCollision`] when the next id is still
    /// outstanding. The id is never silently reassigned: a collision means the
    /// id space was exhausted or reused and the caller must not retry.
    pub fn reserve_id(&self) -> Result<u32, SendError> {
        let mut state = self.lock();
        let candidate = state.last_id.wrapping_add(1);
        if state.pending.contains_key(&candidate) {
            drop(state);
            return Err(self.collision(candidate));
        }
        state.last_id = candidate;
        Ok(candidate)
    }

    /// Register the completion for `id`, holding `admission` until it resolves.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Stopping`] if the table was sealed by
    /// [`fail_all`](Self::fail_all), or [`SendError::CorrelationCollision`]
    /// if `id` is already outstanding.
    pub fn register(
        &self,
        id: u32,
        admission: Option<AdmissionGuard>,
    ) -> Result<ResponseFuture, SendError> {
        let mut state = self.lock();
        if state.sealed {
            return Err(SendError::Stopping);
        }
        if state.pending.contains_key(&id) {
            drop(state);
            return Err(self.collision(id));
        }
        // Receiver exists before the entry is visible to the read loop.
        let (completion, rx) = oneshot::channel();
        state.pending.insert(
            id,
            Pending {
                completion,
                _admission: admission,
            },
        );
        Ok(ResponseFuture {
            correlation_id: id,
            rx,
        })
    }

    /// Resolve `id` with `payload`.
    ///
    /// Returns `false` and logs a protocol anomaly if `id` is not outstanding.
    pub fn complete(&self, id: u32, payload: Bytes) -> bool {
        let Some(pending) = self.lock().pending.remove(&id) else {
            warn!("protocol anomaly: reply for unknown correlation id {id}");
            return false;
        };
        if pending.completion.send(Ok(payload)).is_err() {
            debug!("reply for correlation id {id} arrived after its caller went away");
        }
        true
    }

    /// Resolve `id` with `error` without sealing the table.
    ///
    /// Returns `false` if `id` is not outstanding.
    pub fn fail(&self, id: u32, error: TransportError) -> bool {
        let Some(pending) = self.lock().pending.remove(&id) else {
            return false;
        };
        let _ = pending.completion.send(Err(error));
        true
    }

    /// Seal the table and fail every outstanding completion with `error`.
    ///
    /// Registrations after this call are rejected until
    /// [`reopen`](Self::reopen). Returns the number of requests failed.
    pub fn fail_all(&self, error: &TransportError) -> usize {
        let drained: Vec<(u32, Pending)> = {
            let mut state = self.lock();
            state.sealed = true;
            state.pending.drain().collect()
        };
        let failed = drained.len();
        for (id, pending) in drained {
            if pending.completion.send(Err(error.clone())).is_err() {
                debug!("caller for correlation id {id} went away before failure");
            }
        }
        if failed > 0 {
            debug!("failed {failed} outstanding request(s): {error}");
        }
        failed
    }

    /// Unseal the table and restart ids for a new session.
    pub fn reopen(&self) {
        let mut state = self.lock();
        debug_assert!(
            state.pending.is_empty(),
            "reopening a correlation table with outstanding requests"
        );
        state.sealed = false;
        state.last_id = 0;
    }

    /// Number of outstanding requests.
    #[must_use]
    pub fn len(&self) -> usize { self.lock().pending.len() }

    /// Whether no request is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.lock().pending.is_empty() }

    #[cfg(test)]
    pub(crate) fn seed_last_id(&self, last_id: u32) { self.lock().last_id = last_id; }

    fn collision(&self, id: u32) -> SendError {
        error!("invalid client state: doubly registered correlation id {id}");
        self.probe.client_correlation_error();
        SendError::CorrelationCollision { id }
    }
}

/// Handle resolving to the reply for one registered request.
#[derive(Debug)]
#[must_use = "the reply is lost if the future is dropped"]
pub struct ResponseFuture {
    correlation_id: u32,
    rx: oneshot::Receiver<Result<Bytes, TransportError>>,
}

impl ResponseFuture {
    /// Correlation id the request was sent with.
    #[must_use]
    pub fn correlation_id(&self) -> u32 { self.correlation_id }
}

impl Future for ResponseFuture {
    type Output = Result<Bytes, TransportError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A dropped sender means the table itself went away.
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(TransportError::Stopping)))
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use bytes::Bytes;
    use rstest::{fixture, rstest};

    use super::CorrelationTable;
    use crate::{
        admission::MemoryAdmission,
        error::{SendError, TransportError},
        probe::{CountingProbe, Probe},
    };

    #[fixture]
    fn probe() -> Arc<CountingProbe> { Arc::new(CountingProbe::default()) }

    fn table(probe: &Arc<CountingProbe>) -> CorrelationTable {
        CorrelationTable::new(Arc::clone(probe) as Arc<dyn Probe>)
    }

    #[rstest]
    fn ids_start_at_one_and_are_distinct(probe: Arc<CountingProbe>) {
        let table = table(&probe);
        let ids: Vec<u32> = (0..64)
            .map(|_| table.reserve_id().expect("reserve id"))
            .collect();
        assert_eq!(ids[0], 1);
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[rstest]
    #[tokio::test]
    async fn replies_route_by_id_not_position(probe: Arc<CountingProbe>) {
        let table = table(&probe);
        let futures: Vec<_> = (0..3)
            .map(|_| {
                let id = table.reserve_id().expect("reserve id");
                table.register(id, None).expect("register")
            })
            .collect();

        for id in [3_u32, 1, 2] {
            assert!(table.complete(id, Bytes::from(format!("reply-{id}"))));
        }

        for fut in futures {
            let id = fut.correlation_id();
            let payload = fut.await.expect("reply");
            assert_eq!(payload, Bytes::from(format!("reply-{id}")));
        }
        assert!(table.is_empty());
    }

    #[rstest]
    fn unknown_id_is_reported_not_completed(probe: Arc<CountingProbe>) {
        let table = table(&probe);
        assert!(!table.complete(42, Bytes::new()));
    }

    #[rstest]
    #[tokio::test]
    async fn fail_all_resolves_each_waiter_once_and_seals(probe: Arc<CountingProbe>) {
        let table = table(&probe);
        let first = table.register(1, None).expect("register");
        let second = table.register(2, None).expect("register");

        assert_eq!(table.fail_all(&TransportError::Stopping), 2);
        assert!(first.await.expect_err("failed").is_stopping());
        assert!(second.await.expect_err("failed").is_stopping());

        assert!(!table.complete(1, Bytes::new()), "no second completion");
        assert_eq!(table.register(3, None).err(), Some(SendError::Stopping));

        table.reopen();
        assert_eq!(table.reserve_id().expect("reserve after reopen"), 1);
    }

    #[rstest]
    fn colliding_id_fails_fast(probe: Arc<CountingProbe>) {
        let table = table(&probe);
        let _outstanding = table.register(5, None).expect("register");
        table.seed_last_id(4);

        assert_eq!(
            table.reserve_id(),
            Err(SendError::CorrelationCollision { id: 5 })
        );
        assert_eq!(
            table.register(5, None).err(),
            Some(SendError::CorrelationCollision { id: 5 })
        );
        assert_eq!(probe.snapshot().client_correlation_errors, 2);
    }

    #[rstest]
    fn ids_wrap_at_u32_max(probe: Arc<CountingProbe>) {
        let table = table(&probe);
        table.seed_last_id(u32::MAX);
        assert_eq!(table.reserve_id().expect("wrapped id"), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn completion_releases_admission(probe: Arc<CountingProbe>) {
        let admission = MemoryAdmission::new(100, Arc::clone(&probe) as Arc<dyn Probe>);
        let table = table(&probe);
        let guard = admission.reserve(40).await.expect("admitted");
        let fut = table.register(1, Some(guard)).expect("register");
        assert_eq!(admission.reserved(), 40);

        assert!(table.complete(1, Bytes::from_static(b"ok")));
        assert_eq!(admission.reserved(), 0);
        assert_eq!(fut.await.expect("reply"), Bytes::from_static(b"ok"));
    }

    #[rstest]
    #[tokio::test]
    async fn dropped_caller_does_not_block_completion(probe: Arc<CountingProbe>) {
        let table = table(&probe);
        drop(table.register(9, None).expect("register"));
        assert!(table.complete(9, Bytes::new()));
        assert!(table.is_empty());
    }
}
