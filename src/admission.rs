//! Admission control over in-flight request bytes.
//!
//! [`MemoryAdmission`] is a FIFO counting gate sized to the connection's
//! `max_queued_bytes`. A request reserves its payload size before it is
//! queued for writing and keeps the [`AdmissionGuard`] until its reply (or
//! failure) arrives, so a slow peer cannot let request bytes accumulate
//! without bound.

use std::sync::Arc;

use log::debug;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::{error::SendError, probe::Probe};

/// Counting admission gate over request bytes.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use streamwire::{admission::MemoryAdmission, probe::NoopProbe};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let admission = MemoryAdmission::new(100, Arc::new(NoopProbe));
/// let guard = admission.reserve(60).await.expect("admitted");
/// assert_eq!(admission.reserved(), 60);
/// drop(guard);
/// assert_eq!(admission.reserved(), 0);
/// # }
/// ```
pub struct MemoryAdmission {
    semaphore: Arc<Semaphore>,
    max: u32,
    probe: Arc<dyn Probe>,
}

impl std::fmt::Debug for MemoryAdmission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAdmission")
            .field("max", &self.max)
            .field("available", &self.available())
            .finish_non_exhaustive()
    }
}

impl MemoryAdmission {
    /// Create a gate admitting at most `max_queued_bytes` reserved units.
    ///
    /// The budget is clamped to `1..=u32::MAX`.
    #[must_use]
    pub fn new(max_queued_bytes: usize, probe: Arc<dyn Probe>) -> Self {
        let max = u32::try_from(max_queued_bytes).unwrap_or(u32::MAX).max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max as usize)),
            max,
            probe,
        }
    }

    /// Reserve `units` bytes, waiting in arrival order until they are free.
    ///
    /// Reservations larger than the whole budget are clamped to the budget so
    /// they proceed once every other reservation has been released.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Stopping`] if the underlying semaphore has been
    /// closed.
    pub async fn reserve(&self, units: usize) -> Result<AdmissionGuard, SendError> {
        let units = self.clamp(units);
        let permit = match Arc::clone(&self.semaphore).try_acquire_many_owned(units) {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => {
                debug!(
                    "waiting for available memory: requested={units}, available={}",
                    self.available()
                );
                self.probe.waiting_for_available_memory();
                Arc::clone(&self.semaphore)
                    .acquire_many_owned(units)
                    .await
                    .map_err(|_| SendError::Stopping)?
            }
            Err(TryAcquireError::Closed) => return Err(SendError::Stopping),
        };
        Ok(AdmissionGuard { permit })
    }

    /// Units currently reserved.
    #[must_use]
    pub fn reserved(&self) -> usize { self.max as usize - self.available() }

    /// Units that can be reserved without waiting.
    #[must_use]
    pub fn available(&self) -> usize { self.semaphore.available_permits() }

    /// Configured budget.
    #[must_use]
    pub fn max(&self) -> usize { self.max as usize }

    fn clamp(&self, units: usize) -> u32 {
        u32::try_from(units).unwrap_or(u32::MAX).min(self.max)
    }
}

/// Scoped reservation returned by [`MemoryAdmission::reserve`].
///
/// Dropping the guard returns its units to the pool. Because the guard is
/// moved rather than copied, the units can only be released once.
#[derive(Debug)]
#[must_use = "dropping the guard releases the reservation immediately"]
pub struct AdmissionGuard {
    permit: OwnedSemaphorePermit,
}

impl AdmissionGuard {
    /// Units held by this reservation.
    #[must_use]
    pub fn units(&self) -> usize { self.permit.num_permits() }
}
