//! HTTP surface of the agora service: session auth, Discord OAuth, the
//! proposal lifecycle, and the registry, notification and admin endpoints.

pub mod admin;
pub mod auth;
pub mod discord;
pub mod error;
pub mod middleware;
pub mod notifications;
pub mod proposals;
pub mod registry;
pub mod validate;

use error::ApiError;

/// Run blocking store work off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(err) => Err(ApiError::Internal(anyhow::anyhow!(
            "blocking task failed: {err}"
        ))),
    }
}
