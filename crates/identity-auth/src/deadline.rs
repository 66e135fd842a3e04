//! Per-call deadlines for collaborator calls.

use crate::error::{AuthError, AuthResult};
use std::future::Future;
use std::time::Duration;

/// Run a collaborator call under a deadline.
///
/// An elapsed deadline becomes [`AuthError::Timeout`] naming the operation.
pub async fn bounded<T, F>(timeout: Duration, operation: &str, fut: F) -> AuthResult<T>
where
    F: Future<Output = AuthResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                operation,
                timeout_ms = timeout.as_millis() as u64,
                "Collaborator call timed out"
            );
            Err(AuthError::Timeout(operation.to_string()))
        }
    }
}
