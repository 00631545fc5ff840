//! Immediate, bounded retries around fallible pipeline steps.

use std::future::Future;

use tracing::warn;

use crate::error::MemeError;

/// Runs `op` up to `attempts` times, stopping early on success or on an
/// error `is_retryable` rejects. Attempts are numbered from 1 and there is
/// no delay between them.
///
/// Failed attempts are logged under `cid`. Returns the last error when every
/// attempt fails.
pub async fn with_retry<T, F, Fut, R>(
    cid: &str,
    label: &str,
    attempts: u32,
    is_retryable: R,
    mut op: F,
) -> Result<T, MemeError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, MemeError>>,
    R: Fn(&MemeError) -> bool,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!(
                    "cid={} step={}_error attempt={} error={}",
                    cid, label, attempt, err
                );
                if attempt >= attempts || !is_retryable(&err) {
                    return Err(err);
                }
            }
        }
        attempt += 1;
    }
}

/// Classifier that retries everything.
pub fn always(_: &MemeError) -> bool {
    true
}
