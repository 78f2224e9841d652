//! Retrying operations with a recovery step between attempts.
//!
//! [`retry_with_mitigation`] re-runs a fallible operation under a
//! [`RetryPolicy`]. After each retryable failure it first awaits a
//! mitigation (typically a reconnect) and then the policy's backoff before
//! the next attempt. [`WaitOrStart`] keeps concurrent mitigations from
//! stampeding: only one reconnect runs while the others wait for it.

mod policy;
mod wait_or_start;

use std::{fmt::Display, future::Future};

use log::debug;
pub use policy::{BackoffStrategy, RetryPolicy};
pub use wait_or_start::WaitOrStart;

/// Classifies errors for [`retry_with_mitigation`].
pub trait Retryable {
    /// Whether another attempt could succeed.
    fn is_retryable(&self) -> bool;
}

/// Run `op` until it succeeds, fails permanently, or the policy is spent.
///
/// After a retryable failure with attempts remaining, `mitigate` is awaited
/// with the error and then the backoff for that retry elapses. Errors whose
/// [`Retryable::is_retryable`] is `false` are returned at once without
/// mitigation, as is the error from the final attempt.
///
/// # Errors
///
/// Returns the error from the last attempt made.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use streamwire::retry::{BackoffStrategy, RetryPolicy, Retryable, retry_with_mitigation};
///
/// #[derive(Debug)]
/// struct Flaky;
///
/// impl std::fmt::Display for Flaky {
///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str("flaky") }
/// }
///
/// impl Retryable for Flaky {
///     fn is_retryable(&self) -> bool { true }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let policy = RetryPolicy {
///     attempts: 3,
///     base_backoff: Duration::from_millis(1),
///     max_backoff: Duration::from_millis(1),
///     strategy: BackoffStrategy::Fixed,
/// };
/// let mut calls = 0;
/// let result = retry_with_mitigation(
///     &policy,
///     || {
///         calls += 1;
///         let outcome = if calls < 3 { Err(Flaky) } else { Ok(calls) };
///         async move { outcome }
///     },
///     |_err| async {},
/// )
/// .await;
/// assert_eq!(result.expect("third attempt succeeds"), 3);
/// # }
/// ```
pub async fn retry_with_mitigation<T, E, Op, OpFut, Mit, MitFut>(
    policy: &RetryPolicy,
    mut op: Op,
    mut mitigate: Mit,
) -> Result<T, E>
where
    E: Retryable + Display,
    Op: FnMut() -> OpFut,
    OpFut: Future<Output = Result<T, E>>,
    Mit: FnMut(&E) -> MitFut,
    MitFut: Future<Output = ()>,
{
    let policy = policy.normalized();
    let mut retry = 0;
    loop {
        let error = match op().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        if !error.is_retryable() {
            return Err(error);
        }
        retry += 1;
        if retry >= policy.attempts {
            debug!("giving up after {retry} attempt(s): {error}");
            return Err(error);
        }
        let delay = policy.delay_for(retry);
        debug!(
            "attempt {retry}/{} failed, retrying in {delay:?}: {error}",
            policy.attempts
        );
        mitigate(&error).await;
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests;
