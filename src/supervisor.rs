//! Reconnect supervisor.
//!
//! Runs an attempt function and retries transient failures with
//! exponential backoff. Fatal errors pass through untouched; an exhausted
//! budget becomes [`ChatError::ExhaustedRetries`].

use crate::error::ChatError;
use crate::protocol::RetryPolicy;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Run `attempt` under `policy`.
///
/// `attempt` receives the 1-based attempt number. Each call must build its
/// own connections; nothing is shared between attempts by the supervisor.
pub async fn supervise<T, F, Fut>(policy: &RetryPolicy, mut attempt: F) -> Result<T, ChatError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ChatError>>,
{
    let mut delay = policy.initial_delay;
    let mut remaining = policy.max_retries;
    let mut number = 1;

    loop {
        let started = Instant::now();
        let err = match attempt(number).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_transient() {
            return Err(err);
        }

        if let Some(healthy_after) = policy.healthy_after {
            if started.elapsed() >= healthy_after {
                info!("Connection was healthy for {:?}, resetting retry budget", started.elapsed());
                delay = policy.initial_delay;
                remaining = policy.max_retries;
            }
        }

        if remaining == 0 {
            error!("Attempt {} failed: {}. No retries left", number, err);
            return Err(ChatError::ExhaustedRetries {
                attempts: number,
                last: Box::new(err),
            });
        }

        warn!(
            "Attempt {} failed: {}. Retrying in {:?} ({} left)",
            number, err, delay, remaining
        );
        tokio::time::sleep(delay).await;

        delay = Duration::try_from_secs_f64(delay.as_secs_f64() * policy.backoff_factor)
            .unwrap_or(Duration::MAX);
        remaining -= 1;
        number += 1;
    }
}
