//! Completion polling for offset-lens motion.
//!
//! Changing the objective starts an asynchronous lens move. The controller
//! raises no completion event; it only exposes a busy flag (`LENS$`). The
//! [`MotionPoller`] queries that flag at a fixed interval until it clears.
//!
//! Two entry points share the same contract (finish only when the lens
//! reports idle):
//!
//! - [`MotionPoller::wait_until_idle`] waits indefinitely.
//! - [`MotionPoller::wait_until_idle_or_cancel`] also stops when a cancel
//!   future resolves. Cancellation is only observed between polls, so a query
//!   is never abandoned halfway through its response.

use async_trait::async_trait;
use autofocus_core::FocusResult;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Something that can report whether the offset lens is moving.
#[async_trait]
pub trait LensProbe: Send {
    async fn lens_moving(&mut self) -> FocusResult<bool>;
}

/// Result of a completed wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settled {
    /// Number of busy-flag queries issued
    pub polls: u32,
    pub elapsed: Duration,
}

/// Result of a cancellable wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionOutcome {
    Settled(Settled),
    /// The cancel future resolved while the lens was still moving.
    Cancelled { polls: u32 },
}

/// Fixed-interval busy-flag poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionPoller {
    interval: Duration,
}

impl Default for MotionPoller {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL)
    }
}

impl MotionPoller {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll until the lens reports idle. No timeout.
    pub async fn wait_until_idle<P>(&self, probe: &mut P) -> FocusResult<Settled>
    where
        P: LensProbe + ?Sized,
    {
        let start = Instant::now();
        let mut polls = 0u32;

        loop {
            polls += 1;
            if !probe.lens_moving().await? {
                return Ok(self.settled(polls, start));
            }
            tracing::trace!(polls, "Lens still moving");
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Poll until the lens reports idle or `cancel` resolves.
    pub async fn wait_until_idle_or_cancel<P, C>(
        &self,
        probe: &mut P,
        cancel: C,
    ) -> FocusResult<MotionOutcome>
    where
        P: LensProbe + ?Sized,
        C: Future<Output = ()>,
    {
        let start = Instant::now();
        let mut polls = 0u32;
        tokio::pin!(cancel);

        loop {
            polls += 1;
            if !probe.lens_moving().await? {
                return Ok(MotionOutcome::Settled(self.settled(polls, start)));
            }
            tracing::trace!(polls, "Lens still moving");

            tokio::select! {
                biased;
                _ = &mut cancel => {
                    tracing::debug!(polls, "Lens wait cancelled");
                    return Ok(MotionOutcome::Cancelled { polls });
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    fn settled(&self, polls: u32, start: Instant) -> Settled {
        let elapsed = start.elapsed();
        tracing::debug!(polls, ?elapsed, "Lens settled");
        Settled { polls, elapsed }
    }
}
