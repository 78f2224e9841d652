//! Single-flight execution of a recovery action.

use std::future::Future;

use tokio::sync::Mutex;

/// Runs an action, or waits for the instance that is already running.
///
/// Concurrent callers that find an action in progress do not start their
/// own; they wait for the running one to finish and return. A caller
/// arriving after it finished starts a fresh run.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use streamwire::retry::WaitOrStart;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let counter = AtomicUsize::new(0);
/// let runs = &counter;
/// let single_flight = WaitOrStart::new();
/// let action = move || async move {
///     runs.fetch_add(1, Ordering::SeqCst);
///     tokio::task::yield_now().await;
/// };
/// let (a, b) = tokio::join!(single_flight.run(action), single_flight.run(action));
/// assert!(a ^ b);
/// assert_eq!(runs.load(Ordering::SeqCst), 1);
/// # }
/// ```
#[derive(Debug, Default)]
pub struct WaitOrStart {
    running: Mutex<()>,
}

impl WaitOrStart {
    /// Create an idle instance.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Start `action` unless another run is in progress, in which case wait
    /// for that run instead.
    ///
    /// Returns `true` if this call ran the action.
    pub async fn run<F, Fut>(&self, action: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        if let Ok(_running) = self.running.try_lock() {
            action().await;
            return true;
        }
        drop(self.running.lock().await);
        false
    }

    /// Whether an action is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool { self.running.try_lock().is_err() }
}
