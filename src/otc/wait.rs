//! Status polling shared by every OTC wait operation.

use std::future::Future;
use std::time::Instant;

use tokio::time::sleep;
use tracing::debug;

use crate::provider::{ProviderError, WaitPolicy, status};

/// Polls `fetch` until it reports `target`.
///
/// `fetch` returns the current status string; its errors propagate
/// unchanged, so a [`ProviderError::NotFound`] ends the wait and lets the
/// caller decide whether "gone" is success. Statuses compare
/// case-insensitively. An `ERROR` status ends the wait early.
pub(super) async fn poll_status<F, Fut>(
    policy: WaitPolicy,
    kind: &str,
    id: &str,
    target: &str,
    mut fetch: F,
) -> Result<(), ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, ProviderError>>,
{
    let deadline = Instant::now() + policy.timeout;
    while Instant::now() <= deadline {
        let current = fetch().await?;
        debug!(%kind, %id, %current, %target, "polled status");
        if current.eq_ignore_ascii_case(target) {
            return Ok(());
        }
        if current.eq_ignore_ascii_case(status::ERROR) {
            return Err(ProviderError::FailedStatus {
                kind: kind.to_owned(),
                id: id.to_owned(),
                status: current,
            });
        }
        sleep(policy.poll_interval).await;
    }

    Err(ProviderError::Timeout {
        kind: kind.to_owned(),
        id: id.to_owned(),
        status: target.to_owned(),
    })
}
