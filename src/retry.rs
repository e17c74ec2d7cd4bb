//! Bounded retries with exponential backoff and jitter.

use std::{fmt::Display, ops::ControlFlow, time::Duration};

use bon::Builder;
use rand::Rng;
use tokio::{select, time::sleep};
use tokio_util::sync::CancellationToken;

use crate::prelude::*;

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E: Display> {
    #[error("gave up after {attempts} attempts: {last:#}")]
    Exhausted { attempts: u32, last: E },

    #[error("cancelled")]
    Cancelled,
}

#[must_use]
#[derive(Copy, Clone, Debug, Builder)]
pub struct Backoff {
    #[builder(default = 10)]
    attempts: u32,

    #[builder(default = Duration::from_millis(500))]
    base: Duration,

    #[builder(default = Duration::from_secs(15))]
    max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Backoff {
    /// Retry without sleeping in between.
    #[cfg(test)]
    pub fn immediate(attempts: u32) -> Self {
        Self::builder().attempts(attempts).base(Duration::ZERO).max(Duration::ZERO).build()
    }

    /// Delay before the given retry, starting with zero: full jitter over the exponential ceiling.
    #[must_use]
    pub fn delay(self, retry: u32) -> Duration {
        let ceiling = self.base.saturating_mul(1_u32 << retry.min(16)).min(self.max);
        ceiling.mul_f64(rand::thread_rng().gen_range(0.5..=1.0))
    }

    /// Run the attempt until it breaks out, the attempts run out, or the run gets cancelled.
    ///
    /// The attempt returns [`ControlFlow::Break`] with the final result,
    /// or [`ControlFlow::Continue`] with the error that caused it to be retried.
    pub async fn run<T, E, F, Fut>(
        self,
        cancellation: &CancellationToken,
        mut attempt: F,
    ) -> Result<Result<T, E>, RetryError<E>>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ControlFlow<Result<T, E>, E>>,
    {
        let mut n_attempt = 0;
        loop {
            if cancellation.is_cancelled() {
                return Err(RetryError::Cancelled);
            }
            match attempt(n_attempt).await {
                ControlFlow::Break(result) => return Ok(result),
                ControlFlow::Continue(error) => {
                    n_attempt += 1;
                    if n_attempt >= self.attempts {
                        return Err(RetryError::Exhausted { attempts: n_attempt, last: error });
                    }
                    let delay = self.delay(n_attempt - 1);
                    debug!(n_attempt, ?delay, "retrying: {error:#}");
                    select! {
                        () = cancellation.cancelled() => return Err(RetryError::Cancelled),
                        () = sleep(delay) => {}
                    }
                }
            }
        }
    }
}
